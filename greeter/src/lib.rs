#![doc = include_str!("../README.md")]

#[cfg(test)]
#[macro_use]
pub mod test_util;

#[macro_use]
pub mod grpc;
#[macro_use]
pub mod resolver;

pub mod balancer;
pub mod config;
pub mod logger;

pub use crate::config::Config;
pub use clap::Parser;

/// struct holding cli configuration options
#[derive(Parser, Debug)]
#[command(about = "Periodically greets a helloworld.Greeter server")]
pub struct Cli {
    /// Name to greet, fixed for the lifetime of the process
    #[arg(default_value = grpc::DEFAULT_NAME)]
    pub name: String,
}

/// Tokio signal handler that will wait for a user to press CTRL+C.
/// Resolves instead when `shutdown_rx` is given and receives a message;
/// a dropped sender never triggers shutdown.
///
/// # Examples
///
/// ```
/// use greeter_client::shutdown_signal;
/// async fn example() {
///     let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
///     let waiter = tokio::spawn(shutdown_signal("greeter", Some(shutdown_rx)));
///
///     shutdown_tx.send(()).expect("Could not stop client.");
///     waiter.await.expect("shutdown task failed");
/// }
/// ```
pub async fn shutdown_signal(name: &str, shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>) {
    match shutdown_rx {
        Some(receiver) => {
            if receiver.await.is_err() {
                log::debug!("(shutdown_signal) sender for [{}] dropped.", name);
                std::future::pending::<()>().await;
            }
        }
        None => {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("(shutdown_signal) could not listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }

    log::warn!("(shutdown_signal) shutdown for [{}].", name);
}
