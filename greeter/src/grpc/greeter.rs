//! Greeter request loop

use super::channel::GreeterChannel;
use crate::config::Config;
use greeter_client_grpc::prelude::*;
use snafu::prelude::Snafu;
use std::future::Future;
use std::time::Duration;

/// Name greeted when none is given on the command line
pub const DEFAULT_NAME: &str = "world";

/// Client type driven by the loop
pub type Client = GreeterClient<GreeterChannel>;

/// Custom Error type for the request loop
#[derive(Debug, Snafu)]
pub enum GreeterError {
    /// The server answered with an error status
    #[snafu(display("SayHello failed: {source}"))]
    Rpc {
        /// status returned for the call
        source: tonic::Status,
    },

    /// No answer within the request deadline
    #[snafu(display("SayHello did not complete within {timeout:?}."))]
    DeadlineExceeded {
        /// the deadline that expired
        timeout: Duration,
    },
}

/// Fixed inputs of the request loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSettings {
    /// name sent in every request
    pub name: String,
    /// deadline of a single request
    pub timeout: Duration,
    /// pause after a successful request
    pub interval: Duration,
}

impl LoopSettings {
    /// Settings for greeting `name` with the timings from `config`
    pub fn new(name: impl Into<String>, config: &Config) -> Self {
        LoopSettings {
            name: name.into(),
            timeout: config.request_timeout(),
            interval: config.request_interval(),
        }
    }
}

/// Send one SayHello request, bounded by `settings.timeout`.
///
/// The deadline is announced to the server through `grpc-timeout` and also
/// enforced locally, so a stalled connection cannot hold the loop.
pub async fn say_hello(client: &mut Client, settings: &LoopSettings) -> Result<String, GreeterError> {
    let mut request = tonic::Request::new(HelloRequest {
        name: settings.name.clone(),
    });
    request.set_timeout(settings.timeout);
    grpc_debug!("(say_hello) greeting '{}'.", settings.name);

    match tokio::time::timeout(settings.timeout, client.say_hello(request)).await {
        Ok(Ok(response)) => Ok(response.into_inner().message),
        Ok(Err(status)) => {
            grpc_warn!("(say_hello) server answered {:?}.", status.code());
            Err(GreeterError::Rpc { source: status })
        }
        Err(_) => {
            grpc_warn!("(say_hello) no reply within {:?}.", settings.timeout);
            Err(GreeterError::DeadlineExceeded {
                timeout: settings.timeout,
            })
        }
    }
}

/// Greet until a request fails or `shutdown` resolves.
///
/// Returns `Ok(())` only on shutdown; the first failed request ends the loop
/// with its error. What to do with the error is up to the caller.
pub async fn run(
    client: &mut Client,
    settings: &LoopSettings,
    shutdown: impl Future<Output = ()>,
) -> Result<(), GreeterError> {
    grpc_info!("(run) greeting '{}' every {:?}.", settings.name, settings.interval);

    tokio::select! {
        result = greet_forever(client, settings) => result,
        _ = shutdown => {
            grpc_info!("(run) shutdown requested, leaving request loop.");
            Ok(())
        }
    }
}

async fn greet_forever(client: &mut Client, settings: &LoopSettings) -> Result<(), GreeterError> {
    loop {
        let message = say_hello(client, settings).await?;
        grpc_info!("Greeting: {}", message);

        tokio::time::sleep(settings.interval).await;
    }
}
