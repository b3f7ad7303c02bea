//! gRPC
//! provides the Greeter channel and request loop

#[macro_use]
pub mod macros;
pub mod channel;
pub mod greeter;

pub use channel::{dial, DialError, DialTarget, GreeterChannel, LoadBalancingPolicy, Mode};
pub use greeter::{run, say_hello, Client, GreeterError, LoopSettings, DEFAULT_NAME};
