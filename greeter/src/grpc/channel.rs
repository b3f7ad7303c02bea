//! Connection establishment
//!
//! Turns the configured server address and mode into a channel: either a
//! plain tonic channel dialed straight at the address, or a round-robin
//! channel fed by a resolver taken from the [`ResolverRegistry`].

use crate::balancer::RoundRobinChannel;
use crate::resolver::target::KUBERNETES_SCHEME;
use crate::resolver::{ResolverError, ResolverHandle, ResolverRegistry, Target};
use futures::future::BoxFuture;
use snafu::prelude::Snafu;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::watch;
use tonic::body::BoxBody;
use tonic::transport::{Channel, Endpoint};
use tower::{BoxError, Service};

/// Value of `MODE` selecting Kubernetes discovery
pub const KUBERNETES_MODE: &str = "k8s";

/// How the server address is turned into backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// the address names a Kubernetes service, discovered through the API server
    Kubernetes,
    /// the address is dialed as is
    Direct,
}

impl From<&str> for Mode {
    fn from(mode: &str) -> Self {
        match mode {
            KUBERNETES_MODE => Mode::Kubernetes,
            _ => Mode::Direct,
        }
    }
}

/// Load balancing policy requested for a dial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBalancingPolicy {
    /// one sub-channel per resolved address, used in turn
    RoundRobin,
}

/// Custom Error type for dial errors
#[derive(Debug, Snafu, Clone, PartialEq)]
pub enum DialError {
    /// The address is not a valid URI
    #[snafu(display("Invalid address '{address}': {reason}."))]
    InvalidAddress {
        /// the address that was dialed
        address: String,
        /// parser message
        reason: String,
    },

    /// Name resolution could not be started
    #[snafu(display("Could not resolve target: {source}"))]
    Resolver {
        /// resolver failure
        source: ResolverError,
    },
}

impl From<ResolverError> for DialError {
    fn from(source: ResolverError) -> Self {
        DialError::Resolver { source }
    }
}

/// What to dial and how to balance it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialTarget {
    /// target string handed to the dial step
    pub target: String,
    /// balancing policy, `None` for a single direct connection
    pub policy: Option<LoadBalancingPolicy>,
}

impl DialTarget {
    /// Select the target for `server` according to `mode`
    pub fn new(server: &str, mode: Mode) -> Self {
        match mode {
            Mode::Kubernetes => DialTarget {
                target: format!("{}:///{}", KUBERNETES_SCHEME, server),
                policy: Some(LoadBalancingPolicy::RoundRobin),
            },
            Mode::Direct => DialTarget {
                target: server.to_owned(),
                policy: None,
            },
        }
    }
}

/// Channel used by the Greeter client, one type for both dial modes
#[derive(Debug, Clone)]
pub enum GreeterChannel {
    /// single connection to a literal address
    Direct(Channel),
    /// round-robin over resolved addresses
    Balanced {
        /// the balancing channel
        channel: RoundRobinChannel,
        /// resolver feeding `channel`, stopped with the last clone
        resolver: Arc<ResolverHandle>,
    },
}

impl Service<http::Request<BoxBody>> for GreeterChannel {
    type Response = http::Response<hyper::Body>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        match self {
            GreeterChannel::Direct(channel) => channel.poll_ready(cx).map_err(Into::into),
            GreeterChannel::Balanced { channel, .. } => channel.poll_ready(cx),
        }
    }

    fn call(&mut self, request: http::Request<BoxBody>) -> Self::Future {
        match self {
            GreeterChannel::Direct(channel) => {
                let response = channel.call(request);
                Box::pin(async move {
                    let response = response.await?;
                    Ok::<_, BoxError>(response)
                })
            }
            GreeterChannel::Balanced { channel, .. } => channel.call(request),
        }
    }
}

/// Open a channel for `target`.
///
/// Dialing does not wait for a connection: a direct channel connects on
/// first use, a balanced one as soon as the resolver reports addresses.
/// Must be called from within a tokio runtime.
pub fn dial(target: &DialTarget, registry: &ResolverRegistry) -> Result<GreeterChannel, DialError> {
    grpc_info!("(dial) dialing {} with policy {:?}.", target.target, target.policy);

    match target.policy {
        Some(LoadBalancingPolicy::RoundRobin) => {
            let parsed = Target::parse(&target.target);
            let Some(scheme) = parsed.scheme.as_deref() else {
                return Err(DialError::Resolver {
                    source: ResolverError::InvalidTarget {
                        target: target.target.clone(),
                        reason: String::from("balanced targets need a scheme"),
                    },
                });
            };

            let builder = registry.get(scheme)?;
            let (addresses_tx, addresses_rx) = watch::channel(Vec::new());
            let resolver = builder.build(&parsed, addresses_tx)?;

            Ok(GreeterChannel::Balanced {
                channel: RoundRobinChannel::new(addresses_rx),
                resolver: Arc::new(resolver),
            })
        }
        None => {
            let uri = if target.target.contains("://") {
                target.target.clone()
            } else {
                format!("http://{}", target.target)
            };

            let endpoint = Endpoint::from_shared(uri).map_err(|e| {
                grpc_error!("(dial) invalid address {}.", target.target);
                DialError::InvalidAddress {
                    address: target.target.clone(),
                    reason: e.to_string(),
                }
            })?;

            Ok(GreeterChannel::Direct(endpoint.connect_lazy()))
        }
    }
}
