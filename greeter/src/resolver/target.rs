//! Parsing of dial targets
//!
//! Targets follow the gRPC naming convention `scheme://authority/endpoint`.
//! A target without `://` carries no scheme and is dialed as a plain address.

use super::ResolverError;
use std::fmt;

/// Scheme handled by the Kubernetes resolver
pub const KUBERNETES_SCHEME: &str = "kubernetes";

/// A dial target split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// URI scheme, selects the resolver
    pub scheme: Option<String>,
    /// authority part, may be empty
    pub authority: String,
    /// everything after the authority
    pub endpoint: String,
}

impl Target {
    /// Split a target string. Never fails: anything that isn't
    /// `scheme://...` is treated as a bare endpoint.
    pub fn parse(target: &str) -> Self {
        let Some((scheme, rest)) = target.split_once("://") else {
            return Target {
                scheme: None,
                authority: String::new(),
                endpoint: target.to_owned(),
            };
        };

        let (authority, endpoint) = rest.split_once('/').unwrap_or((rest, ""));
        Target {
            scheme: Some(scheme.to_owned()),
            authority: authority.to_owned(),
            endpoint: endpoint.to_owned(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scheme {
            Some(scheme) => write!(f, "{}://{}/{}", scheme, self.authority, self.endpoint),
            None => write!(f, "{}", self.endpoint),
        }
    }
}

/// How the port of a Kubernetes endpoint is chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    /// no port in the target, use the first port of each subset
    First,
    /// a literal port number
    Number(u16),
    /// a named port, looked up in each subset
    Name(String),
}

impl From<&str> for PortSpec {
    fn from(port: &str) -> Self {
        if port.is_empty() {
            return PortSpec::First;
        }

        match port.parse::<u16>() {
            Ok(number) => PortSpec::Number(number),
            Err(_) => PortSpec::Name(port.to_owned()),
        }
    }
}

/// A `kubernetes://` target resolved to service, namespace and port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubernetesTarget {
    /// name of the Kubernetes service (and of its Endpoints object)
    pub service: String,
    /// namespace of the service, `None` means the client's default namespace
    pub namespace: Option<String>,
    /// port selection
    pub port: PortSpec,
}

impl TryFrom<&Target> for KubernetesTarget {
    type Error = ResolverError;

    /// Accepted forms:
    /// * `kubernetes:///service:port`
    /// * `kubernetes:///service.namespace:port`
    /// * `kubernetes://namespace/service:port`
    /// * `kubernetes://service:port/`
    fn try_from(target: &Target) -> Result<Self, Self::Error> {
        match target.scheme.as_deref() {
            Some(KUBERNETES_SCHEME) => (),
            Some(scheme) => {
                return Err(ResolverError::InvalidTarget {
                    target: target.to_string(),
                    reason: format!("unexpected scheme '{}'", scheme),
                })
            }
            None => {
                return Err(ResolverError::InvalidTarget {
                    target: target.to_string(),
                    reason: String::from("missing scheme"),
                })
            }
        }

        let parsed = if target.authority.is_empty() {
            split_service_namespace_port(&target.endpoint)
        } else if !target.authority.contains(':') && !target.endpoint.is_empty() {
            let mut parsed = split_service_namespace_port(&target.endpoint);
            parsed.namespace = Some(first_label(&target.authority).to_owned());
            parsed
        } else {
            split_service_namespace_port(&target.authority)
        };

        if parsed.service.is_empty() {
            return Err(ResolverError::InvalidTarget {
                target: target.to_string(),
                reason: String::from("empty service name"),
            });
        }

        Ok(parsed)
    }
}

/// `service[.namespace[.svc.cluster.local]][:port]`
fn split_service_namespace_port(host_port: &str) -> KubernetesTarget {
    let host_port = host_port.trim_end_matches('/');
    let (host, port) = host_port.rsplit_once(':').unwrap_or((host_port, ""));

    let (service, namespace) = match host.split_once('.') {
        Some((service, rest)) => (service, Some(first_label(rest).to_owned())),
        None => (host, None),
    };

    KubernetesTarget {
        service: service.to_owned(),
        namespace: namespace.filter(|ns| !ns.is_empty()),
        port: PortSpec::from(port),
    }
}

fn first_label(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}
