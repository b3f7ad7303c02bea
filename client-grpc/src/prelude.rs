//! Re-export of used objects

pub use super::client as greeter;
pub use super::client::greeter_client::GreeterClient;
pub use super::client::{HelloReply, HelloRequest};

#[cfg(feature = "stub_server")]
pub use super::client::greeter_server::{Greeter, GreeterServer};
