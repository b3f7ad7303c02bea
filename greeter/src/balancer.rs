//! Round-robin load balancing
//!
//! [`RoundRobinChannel`] keeps one lazily connected tonic [`Channel`] per
//! address published by a resolver and hands requests to them in turn.

use futures::future::BoxFuture;
use snafu::prelude::Snafu;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::watch;
use tonic::body::BoxBody;
use tonic::transport::{Channel, Endpoint};
use tower::{BoxError, Service, ServiceExt};

/// Writes a debug! message to the app::balancer logger
macro_rules! balancer_debug {
    ($($arg:tt)+) => {
        log::debug!(target: "app::balancer", $($arg)+);
    };
}

/// Writes an info! message to the app::balancer logger
macro_rules! balancer_info {
    ($($arg:tt)+) => {
        log::info!(target: "app::balancer", $($arg)+);
    };
}

/// Writes a warn! message to the app::balancer logger
macro_rules! balancer_warn {
    ($($arg:tt)+) => {
        log::warn!(target: "app::balancer", $($arg)+);
    };
}

/// Custom Error type for balancer errors
#[derive(Debug, Snafu, Clone, Copy, PartialEq)]
pub enum BalancerError {
    /// The resolver stopped and left no address to send to
    #[snafu(display("No endpoints available."))]
    NoEndpoints,
}

#[derive(Debug, Clone)]
struct SubChannel {
    addr: SocketAddr,
    channel: Channel,
}

#[derive(Debug)]
struct Picker {
    subchannels: Mutex<Vec<SubChannel>>,
    cursor: AtomicUsize,
    resolving: AtomicBool,
    // bumped after every update of `subchannels`
    generation: watch::Sender<u64>,
}

impl Picker {
    fn pick(&self) -> Option<SubChannel> {
        let Ok(subchannels) = self.subchannels.lock() else {
            balancer_warn!("(pick) sub-channel list is poisoned.");
            return None;
        };

        if subchannels.is_empty() {
            return None;
        }

        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % subchannels.len();
        Some(subchannels[index].clone())
    }

    /// Wait until there is a channel to send to, or until no update can come anymore
    async fn wait_for_channel(&self) -> Result<Channel, BalancerError> {
        let mut updates = self.generation.subscribe();
        loop {
            if let Some(picked) = self.pick() {
                return Ok(picked.channel);
            }

            if !self.resolving.load(Ordering::Acquire) {
                return Err(BalancerError::NoEndpoints);
            }

            balancer_debug!("(wait_for_channel) no endpoints yet, waiting for resolver.");
            if updates.changed().await.is_err() {
                return Err(BalancerError::NoEndpoints);
            }
        }
    }

    fn update(&self, addresses: &[SocketAddr]) {
        let Ok(mut subchannels) = self.subchannels.lock() else {
            balancer_warn!("(update) sub-channel list is poisoned, update dropped.");
            return;
        };

        let mut next: Vec<SubChannel> = Vec::with_capacity(addresses.len());
        for addr in addresses {
            if next.iter().any(|s| s.addr == *addr) {
                continue;
            }

            if let Some(existing) = subchannels.iter().find(|s| s.addr == *addr) {
                next.push(existing.clone());
                continue;
            }

            match Endpoint::from_shared(format!("http://{}", addr)) {
                Ok(endpoint) => {
                    balancer_debug!("(update) adding sub-channel for {}.", addr);
                    next.push(SubChannel {
                        addr: *addr,
                        channel: endpoint.connect_lazy(),
                    });
                }
                Err(e) => {
                    balancer_warn!("(update) invalid endpoint {}: {}", addr, e);
                }
            }
        }

        balancer_info!(
            "(update) {} sub-channel(s): {:?}.",
            next.len(),
            next.iter().map(|s| s.addr).collect::<Vec<_>>()
        );
        *subchannels = next;
        drop(subchannels);

        self.generation.send_modify(|generation| *generation += 1);
    }

    fn close(&self) {
        self.resolving.store(false, Ordering::Release);
        self.generation.send_modify(|generation| *generation += 1);
    }
}

/// A channel spreading requests round-robin over resolved addresses
#[derive(Debug, Clone)]
pub struct RoundRobinChannel {
    picker: Arc<Picker>,
}

impl RoundRobinChannel {
    /// Follow the address lists published on `addresses`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(mut addresses: watch::Receiver<Vec<SocketAddr>>) -> Self {
        let (generation, _) = watch::channel(0);
        let picker = Arc::new(Picker {
            subchannels: Mutex::new(Vec::new()),
            cursor: AtomicUsize::new(0),
            resolving: AtomicBool::new(true),
            generation,
        });

        let initial = addresses.borrow_and_update().clone();
        picker.update(&initial);

        let updater = Arc::downgrade(&picker);
        tokio::spawn(async move {
            while addresses.changed().await.is_ok() {
                let Some(picker) = updater.upgrade() else {
                    return;
                };
                let update = addresses.borrow_and_update().clone();
                picker.update(&update);
            }

            balancer_debug!("(RoundRobinChannel) resolver went away.");
            if let Some(picker) = updater.upgrade() {
                picker.close();
            }
        });

        Self { picker }
    }

    /// Addresses currently balanced over, in picking order
    pub fn addresses(&self) -> Vec<SocketAddr> {
        match self.picker.subchannels.lock() {
            Ok(subchannels) => subchannels.iter().map(|s| s.addr).collect(),
            Err(_) => vec![],
        }
    }
}

impl Service<http::Request<BoxBody>> for RoundRobinChannel {
    type Response = http::Response<hyper::Body>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // readiness is checked on the picked sub-channel
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<BoxBody>) -> Self::Future {
        let picker = self.picker.clone();
        Box::pin(async move {
            let mut channel = picker.wait_for_channel().await?;
            channel.ready().await?;
            let response = channel.call(request).await?;
            Ok::<_, BoxError>(response)
        })
    }
}
