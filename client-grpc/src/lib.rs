//! Exposes the `helloworld.Greeter` gRPC contract.
//!
//! The messages and the client are generated from `proto/helloworld.proto`.
//! The server half is only compiled with the `stub_server` feature, so test
//! suites can stand up an in-process Greeter without pulling it into
//! production builds.

pub mod prelude;

/// Client Library: Client Functions, Structs
pub mod client {
    #![allow(unused_qualifications)]
    include!("grpc.rs");
}

pub use client::greeter_client::GreeterClient;
pub use client::{HelloReply, HelloRequest};
