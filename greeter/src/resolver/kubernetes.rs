//! Kubernetes endpoint discovery
//!
//! Watches the `v1/Endpoints` object backing a service through the API
//! server and publishes the ready pod addresses. Authentication uses the
//! service account mounted into the pod.

use super::target::{KubernetesTarget, PortSpec, Target, KUBERNETES_SCHEME};
use super::{ResolverBuilder, ResolverError, ResolverHandle};
use futures::{pin_mut, TryStreamExt};
use k8s_openapi::api::core::v1::{EndpointPort, Endpoints};
use kube::runtime::watcher::{self, watcher, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client};
use std::net::{IpAddr, SocketAddr};
use tokio::sync::watch;

/// Resolves `kubernetes://` targets against the cluster we run in
#[derive(Clone)]
pub struct KubernetesResolverBuilder {
    client: Client,
}

impl std::fmt::Debug for KubernetesResolverBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubernetesResolverBuilder")
            .field("default_namespace", &self.client.default_namespace())
            .finish()
    }
}

impl KubernetesResolverBuilder {
    /// Use an already configured client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Configure a client from the pod's service account
    #[cfg(not(tarpaulin_include))]
    // no_coverage: needs to run inside a cluster
    pub async fn in_cluster() -> Result<Self, ResolverError> {
        resolver_info!("(in_cluster) loading in-cluster configuration.");
        let config = kube::Config::incluster().map_err(|e| {
            resolver_error!("(in_cluster) could not load in-cluster configuration.");
            resolver_debug!("(in_cluster) error: {:?}", e);
            ResolverError::ClusterConfig {
                reason: e.to_string(),
            }
        })?;

        let client = Client::try_from(config).map_err(|e| {
            resolver_error!("(in_cluster) could not create kubernetes client.");
            resolver_debug!("(in_cluster) error: {:?}", e);
            ResolverError::ClusterConfig {
                reason: e.to_string(),
            }
        })?;

        Ok(Self::new(client))
    }
}

impl ResolverBuilder for KubernetesResolverBuilder {
    fn scheme(&self) -> &'static str {
        KUBERNETES_SCHEME
    }

    fn build(
        &self,
        target: &Target,
        addresses: watch::Sender<Vec<SocketAddr>>,
    ) -> Result<ResolverHandle, ResolverError> {
        let target = KubernetesTarget::try_from(target)?;
        let namespace = target
            .namespace
            .clone()
            .unwrap_or_else(|| self.client.default_namespace().to_owned());

        resolver_info!(
            "(build) watching endpoints of service '{}' in namespace '{}'.",
            target.service,
            namespace
        );

        let api: Api<Endpoints> = Api::namespaced(self.client.clone(), &namespace);
        let task = tokio::spawn(watch_endpoints(api, target, addresses));
        Ok(ResolverHandle::new(task))
    }
}

/// Follow the Endpoints object of `target` until the receiving side goes away
async fn watch_endpoints(
    api: Api<Endpoints>,
    target: KubernetesTarget,
    addresses: watch::Sender<Vec<SocketAddr>>,
) {
    let config = watcher::Config::default().fields(&format!("metadata.name={}", target.service));
    let events = watcher(api, config).default_backoff();
    pin_mut!(events);

    loop {
        let update = match events.try_next().await {
            Ok(Some(event)) => {
                if let Event::Deleted(_) = event {
                    resolver_warn!("(watch_endpoints) endpoints of '{}' deleted.", target.service);
                }
                event_addresses(&event, &target.port)
            }
            Ok(None) => {
                resolver_warn!("(watch_endpoints) watch on '{}' ended.", target.service);
                return;
            }
            Err(e) => {
                resolver_warn!("(watch_endpoints) watch on '{}' failed: {}", target.service, e);
                continue;
            }
        };

        resolver_debug!(
            "(watch_endpoints) '{}' resolved to {:?}.",
            target.service,
            update
        );

        if addresses.is_closed() {
            resolver_debug!("(watch_endpoints) no more listeners, stopping.");
            return;
        }
        addresses.send_replace(update);
    }
}

/// Complete address list after a watch event on the Endpoints object.
///
/// A restart lists every matching object again, their addresses are merged.
/// A deletion leaves nothing to dial.
pub fn event_addresses(event: &Event<Endpoints>, port: &PortSpec) -> Vec<SocketAddr> {
    match event {
        Event::Applied(endpoints) => endpoint_addresses(endpoints, port),
        Event::Deleted(_) => Vec::new(),
        Event::Restarted(list) => list
            .iter()
            .flat_map(|endpoints| endpoint_addresses(endpoints, port))
            .collect(),
    }
}

/// Ready addresses of an Endpoints object, paired with the port selected by `port`
pub fn endpoint_addresses(endpoints: &Endpoints, port: &PortSpec) -> Vec<SocketAddr> {
    let mut result = vec![];

    for subset in endpoints.subsets.iter().flatten() {
        let ports = subset.ports.as_deref().unwrap_or_default();
        let Some(number) = select_port(ports, port) else {
            continue;
        };

        for address in subset.addresses.iter().flatten() {
            match address.ip.parse::<IpAddr>() {
                Ok(ip) => result.push(SocketAddr::new(ip, number)),
                Err(_) => {
                    resolver_warn!("(endpoint_addresses) skipping invalid ip '{}'.", address.ip);
                }
            }
        }
    }

    result
}

fn select_port(ports: &[EndpointPort], wanted: &PortSpec) -> Option<u16> {
    let first = || ports.first().and_then(|p| u16::try_from(p.port).ok());

    match wanted {
        PortSpec::Number(number) => Some(*number),
        PortSpec::First => first(),
        PortSpec::Name(name) => ports
            .iter()
            .find(|p| p.name.as_deref() == Some(name.as_str()))
            .and_then(|p| u16::try_from(p.port).ok())
            .or_else(first),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{EndpointAddress, EndpointSubset};

    fn address(ip: &str) -> EndpointAddress {
        EndpointAddress {
            ip: ip.to_owned(),
            ..Default::default()
        }
    }

    fn port(name: &str, port: i32) -> EndpointPort {
        EndpointPort {
            name: Some(name.to_owned()),
            port,
            ..Default::default()
        }
    }

    fn endpoints() -> Endpoints {
        Endpoints {
            subsets: Some(vec![
                EndpointSubset {
                    addresses: Some(vec![address("10.0.0.1"), address("10.0.0.2")]),
                    not_ready_addresses: Some(vec![address("10.0.0.9")]),
                    ports: Some(vec![port("metrics", 9090), port("grpc", 50051)]),
                    ..Default::default()
                },
                EndpointSubset {
                    addresses: Some(vec![address("10.0.1.1")]),
                    ports: Some(vec![port("grpc", 50052)]),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }
    }

    fn addrs(list: &[&str]) -> Vec<SocketAddr> {
        list.iter().map(|a| a.parse().unwrap()).collect()
    }

    #[test]
    fn test_numeric_port() {
        let result = endpoint_addresses(&endpoints(), &PortSpec::Number(8080));
        assert_eq!(
            result,
            addrs(&["10.0.0.1:8080", "10.0.0.2:8080", "10.0.1.1:8080"])
        );
    }

    #[test]
    fn test_named_port() {
        let result = endpoint_addresses(&endpoints(), &PortSpec::Name("grpc".to_owned()));
        assert_eq!(
            result,
            addrs(&["10.0.0.1:50051", "10.0.0.2:50051", "10.0.1.1:50052"])
        );
    }

    #[test]
    fn test_first_port() {
        let result = endpoint_addresses(&endpoints(), &PortSpec::First);
        assert_eq!(
            result,
            addrs(&["10.0.0.1:9090", "10.0.0.2:9090", "10.0.1.1:50052"])
        );
    }

    #[test]
    fn test_unknown_port_name_falls_back_to_first() {
        let result = endpoint_addresses(&endpoints(), &PortSpec::Name("http".to_owned()));
        assert_eq!(
            result,
            addrs(&["10.0.0.1:9090", "10.0.0.2:9090", "10.0.1.1:50052"])
        );
    }

    #[test]
    fn test_not_ready_and_invalid_addresses_skipped() {
        let endpoints = Endpoints {
            subsets: Some(vec![EndpointSubset {
                addresses: Some(vec![address("not-an-ip"), address("fd00::1")]),
                not_ready_addresses: Some(vec![address("10.0.0.9")]),
                ports: Some(vec![port("grpc", 50051)]),
                ..Default::default()
            }]),
            ..Default::default()
        };

        let result = endpoint_addresses(&endpoints, &PortSpec::First);
        assert_eq!(result, addrs(&["[fd00::1]:50051"]));
    }

    #[test]
    fn test_applied_event() {
        let event = Event::Applied(endpoints());
        let result = event_addresses(&event, &PortSpec::Number(50051));
        assert_eq!(
            result,
            addrs(&["10.0.0.1:50051", "10.0.0.2:50051", "10.0.1.1:50051"])
        );
    }

    #[test]
    fn test_deleted_event_clears_addresses() {
        let event = Event::Deleted(endpoints());
        assert!(event_addresses(&event, &PortSpec::First).is_empty());
    }

    #[test]
    fn test_restarted_event_merges_objects() {
        let other = Endpoints {
            subsets: Some(vec![EndpointSubset {
                addresses: Some(vec![address("10.0.2.1")]),
                ports: Some(vec![port("grpc", 50053)]),
                ..Default::default()
            }]),
            ..Default::default()
        };

        let event = Event::Restarted(vec![endpoints(), other]);
        let result = event_addresses(&event, &PortSpec::Name("grpc".to_owned()));
        assert_eq!(
            result,
            addrs(&[
                "10.0.0.1:50051",
                "10.0.0.2:50051",
                "10.0.1.1:50052",
                "10.0.2.1:50053",
            ])
        );
    }

    #[test]
    fn test_restarted_without_objects() {
        let event: Event<Endpoints> = Event::Restarted(vec![]);
        assert!(event_addresses(&event, &PortSpec::First).is_empty());
    }

    #[test]
    fn test_no_subsets() {
        let result = endpoint_addresses(&Endpoints::default(), &PortSpec::First);
        assert!(result.is_empty());
    }
}
