//! Name resolution for dial targets
//!
//! A [`ResolverRegistry`] is created once at startup and handed to the dial
//! step. Each registered [`ResolverBuilder`] owns a URI scheme; building it
//! for a [`Target`] starts a background task publishing the complete list of
//! backend addresses every time it changes.

#[macro_use]
pub mod macros;
pub mod kubernetes;
pub mod target;

pub use target::{KubernetesTarget, PortSpec, Target};

use snafu::prelude::Snafu;
use std::collections::HashMap;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Custom Error type for resolver errors
#[derive(Debug, Snafu, Clone, PartialEq)]
pub enum ResolverError {
    /// No resolver registered for the scheme
    #[snafu(display("No resolver registered for scheme '{scheme}'."))]
    UnsupportedScheme {
        /// the scheme that was looked up
        scheme: String,
    },

    /// Target could not be understood by the resolver
    #[snafu(display("Invalid target '{target}': {reason}."))]
    InvalidTarget {
        /// the offending target
        target: String,
        /// what is wrong with it
        reason: String,
    },

    /// Could not load the in-cluster Kubernetes configuration
    #[snafu(display("Could not configure Kubernetes client: {reason}."))]
    ClusterConfig {
        /// underlying error message
        reason: String,
    },
}

/// Creates resolvers for one URI scheme
pub trait ResolverBuilder: Send + Sync + Debug {
    /// The scheme this builder handles, without `://`
    fn scheme(&self) -> &'static str;

    /// Start resolving `target`, publishing address lists into `addresses`
    fn build(
        &self,
        target: &Target,
        addresses: watch::Sender<Vec<SocketAddr>>,
    ) -> Result<ResolverHandle, ResolverError>;
}

/// Keeps a running resolver alive, stops it when dropped
#[derive(Debug)]
pub struct ResolverHandle {
    task: JoinHandle<()>,
}

impl ResolverHandle {
    /// Wrap the task driving a resolver
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }
}

impl Drop for ResolverHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Resolver builders by scheme
#[derive(Debug, Clone, Default)]
pub struct ResolverRegistry {
    builders: HashMap<&'static str, Arc<dyn ResolverBuilder>>,
}

impl ResolverRegistry {
    /// Empty registry, only plain addresses can be dialed
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the Kubernetes resolver, configured from the
    /// service account of the pod we run in.
    #[cfg(not(tarpaulin_include))]
    // no_coverage: needs to run inside a cluster
    pub async fn in_cluster() -> Result<Self, ResolverError> {
        let builder = kubernetes::KubernetesResolverBuilder::in_cluster().await?;
        let mut registry = Self::new();
        registry.register(builder);
        Ok(registry)
    }

    /// Register a builder, replacing any earlier one for the same scheme
    pub fn register(&mut self, builder: impl ResolverBuilder + 'static) -> &mut Self {
        let scheme = builder.scheme();
        resolver_debug!("(register) resolver for scheme '{}'.", scheme);
        self.builders.insert(scheme, Arc::new(builder));
        self
    }

    /// Look up the builder for `scheme`
    pub fn get(&self, scheme: &str) -> Result<Arc<dyn ResolverBuilder>, ResolverError> {
        self.builders
            .get(scheme)
            .cloned()
            .ok_or_else(|| ResolverError::UnsupportedScheme {
                scheme: scheme.to_owned(),
            })
    }
}
