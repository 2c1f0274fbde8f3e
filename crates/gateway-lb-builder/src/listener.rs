//! Listeners: protocol merge, certificates, mutual TLS and default actions.

use std::collections::BTreeSet;
use std::sync::Arc;

use gateway_lb_core::{NamespacedName, StringToken};
use gateway_lb_model::crd::{GatewaySpec, ListenerConfiguration, LoadBalancerConfigurationSpec, ProtocolPort};
use gateway_lb_model::elbv2::{Certificate, MutualAuthenticationAttributes, MutualAuthenticationMode};
use gateway_lb_model::{Action, Listener, ListenerSpec, LoadBalancerType, Protocol, Stack};
use tracing::{debug, warn};

use crate::config::BuilderConfig;
use crate::error::{BuildError, ProviderContext, Result};
use crate::providers::{CertificateDiscovery, TrustStoreResolver};
use crate::routes::RouteDescriptor;
use crate::tags::TagHelper;
use crate::target_group::TargetGroupBuilder;

/// ALPN policies accepted on TLS listeners of network load balancers.
pub const ALPN_POLICIES: [&str; 5] = ["HTTP1Only", "HTTP2Only", "HTTP2Optional", "HTTP2Preferred", "None"];

const TCP: u8 = 0b001;
const UDP: u8 = 0b010;
const QUIC: u8 = 0b100;

const fn transport_bits(protocol: Protocol) -> Option<u8> {
    match protocol {
        Protocol::Tcp => Some(TCP),
        Protocol::Udp => Some(UDP),
        Protocol::Quic => Some(QUIC),
        Protocol::TcpUdp => Some(TCP | UDP),
        Protocol::TcpQuic => Some(TCP | QUIC),
        _ => None,
    }
}

const fn from_transport_bits(bits: u8) -> Protocol {
    let tcp = bits & TCP != 0;
    let udp = bits & UDP != 0;
    let quic = bits & QUIC != 0;
    match (tcp, udp, quic) {
        (true, _, true) => Protocol::TcpQuic,
        (false, _, true) => Protocol::Quic,
        (true, true, false) => Protocol::TcpUdp,
        (false, true, false) => Protocol::Udp,
        _ => Protocol::Tcp,
    }
}

/// Merge two protocols sharing a port.
///
/// TCP, UDP and QUIC combine (QUIC carries UDP); any other pair must match.
///
/// # Errors
///
/// Returns a configuration error for incompatible protocols.
pub fn merge_protocols(a: Protocol, b: Protocol) -> Result<Protocol> {
    if a == b {
        return Ok(a);
    }
    match (transport_bits(a), transport_bits(b)) {
        (Some(x), Some(y)) => Ok(from_transport_bits(x | y)),
        _ => Err(BuildError::config(format!(
            "protocols {a} and {b} cannot share a listener port"
        ))),
    }
}

/// Upgrade a UDP-carrying protocol to its QUIC form.
///
/// # Errors
///
/// Returns a configuration error for protocols without a QUIC form.
pub fn upgrade_to_quic(protocol: Protocol) -> Result<Protocol> {
    match protocol {
        Protocol::Udp | Protocol::Quic => Ok(Protocol::Quic),
        Protocol::TcpUdp | Protocol::TcpQuic => Ok(Protocol::TcpQuic),
        other => Err(BuildError::config(format!("QUIC cannot be enabled on {other} listeners"))),
    }
}

/// Gateway-wide inputs of listener construction.
#[derive(Debug, Clone, Copy)]
pub struct ListenerContext<'a> {
    /// Owning Gateway.
    pub gateway: &'a NamespacedName,
    /// Gateway spec, for listener protocols and hostnames.
    pub gateway_spec: &'a GatewaySpec,
    /// Load balancer type.
    pub load_balancer_type: LoadBalancerType,
    /// Deferred load balancer ARN.
    pub load_balancer_arn: &'a StringToken,
    /// Load balancer configuration.
    pub lb_config: &'a LoadBalancerConfigurationSpec,
    /// Whether any load balancer subnet is in a local zone or outpost.
    pub local_zone_or_outpost: bool,
}

/// A listener added to the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltListener {
    /// Deferred listener ARN.
    pub arn: StringToken,
    /// Effective protocol.
    pub protocol: Protocol,
}

/// Builds one listener per port with attached routes.
pub struct ListenerBuilder<'a> {
    config: &'a BuilderConfig,
    certificates: &'a dyn CertificateDiscovery,
    trust_stores: &'a dyn TrustStoreResolver,
    context: ListenerContext<'a>,
}

impl<'a> ListenerBuilder<'a> {
    /// Create a builder.
    #[must_use]
    pub fn new(
        config: &'a BuilderConfig,
        certificates: &'a dyn CertificateDiscovery,
        trust_stores: &'a dyn TrustStoreResolver,
        context: ListenerContext<'a>,
    ) -> Self {
        Self {
            config,
            certificates,
            trust_stores,
            context,
        }
    }

    /// Effective protocol of `port` and the listener configuration that applies.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the Gateway has no listener on the
    /// port, or its listeners' protocols cannot be merged or upgraded.
    pub fn listener_protocol(&self, port: i32) -> Result<(Protocol, Option<&'a ListenerConfiguration>)> {
        let mut merged: Option<Protocol> = None;
        for listener in self.context.gateway_spec.listeners.iter().filter(|l| l.port == port) {
            let protocol: Protocol = listener
                .protocol
                .parse()
                .map_err(|e| BuildError::config(format!("listener {}: {e}", listener.name)))?;
            merged = Some(match merged {
                Some(current) => merge_protocols(current, protocol)?,
                None => protocol,
            });
        }
        let protocol = merged.ok_or_else(|| {
            BuildError::config(format!("gateway {} has no listener on port {port}", self.context.gateway))
        })?;
        if protocol.is_application() != self.context.load_balancer_type.is_application() {
            return Err(BuildError::config(format!(
                "{protocol} listeners are not supported on {:?} load balancers",
                self.context.load_balancer_type
            )));
        }

        let listener_config = self
            .context
            .lb_config
            .listener_configuration(ProtocolPort { protocol, port });
        let protocol = match listener_config {
            Some(cfg) if cfg.quic_enabled => upgrade_to_quic(protocol)?,
            _ => protocol,
        };
        Ok((protocol, listener_config))
    }

    /// Build the listener for `port`.
    ///
    /// Returns `None` when the port has no routes, or when a network load
    /// balancer's only backend cannot receive traffic.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid listener settings, and a
    /// provider error (with the port as context) when a lookup fails.
    pub async fn build(
        &self,
        stack: &mut Stack,
        port: i32,
        routes: &[Arc<dyn RouteDescriptor>],
        targets: &dyn TargetGroupBuilder,
    ) -> Result<Option<BuiltListener>> {
        if routes.is_empty() {
            debug!(gateway = %self.context.gateway, port, "no routes attached; skipping listener");
            return Ok(None);
        }
        let (protocol, listener_config) = self.listener_protocol(port)?;
        let cfg = listener_config.cloned().unwrap_or_default();

        let default_actions = if self.context.load_balancer_type.is_application() {
            vec![Action::fixed_response(404)]
        } else {
            match self.network_default_action(stack, port, routes, targets).await? {
                Some(action) => vec![action],
                None => return Ok(None),
            }
        };

        let certificates = if protocol.is_secure() {
            self.certificates(port, routes, &cfg).await?
        } else {
            Vec::new()
        };
        let ssl_policy = protocol
            .is_secure()
            .then(|| cfg.ssl_policy.clone().unwrap_or_else(|| self.config.default_ssl_policy.clone()));
        let alpn_policy = self.alpn_policy(protocol, &cfg)?;
        let mutual_authentication = self.mutual_authentication(port, protocol, &cfg).await?;

        debug!(
            gateway = %self.context.gateway,
            port,
            protocol = %protocol,
            certificates = certificates.len(),
            "building listener"
        );
        let listener = Listener::new(
            port.to_string(),
            ListenerSpec {
                load_balancer_arn: self.context.load_balancer_arn.clone(),
                port,
                protocol,
                default_actions,
                certificates,
                ssl_policy,
                alpn_policy,
                mutual_authentication,
                listener_attributes: cfg.listener_attributes.clone(),
                tags: TagHelper::new(self.config).resolve(self.context.lb_config.tags.as_ref())?,
            },
        );
        let arn = listener.arn();
        stack.add(listener)?;
        Ok(Some(BuiltListener { arn, protocol }))
    }

    async fn network_default_action(
        &self,
        stack: &mut Stack,
        port: i32,
        routes: &[Arc<dyn RouteDescriptor>],
        targets: &dyn TargetGroupBuilder,
    ) -> Result<Option<Action>> {
        let [route] = routes else {
            return Err(BuildError::config(format!(
                "port {port} of a network load balancer accepts one route, got {}",
                routes.len()
            )));
        };
        let route_nn = route.route_namespaced_name();
        let backends = route.backends();
        let backend = match backends.as_slice() {
            [] => {
                warn!(gateway = %self.context.gateway, route = %route_nn, port, "route has no backends; skipping listener");
                return Ok(None);
            }
            [backend] => *backend,
            _ => {
                return Err(BuildError::config(format!(
                    "route {route_nn} on network load balancer port {port} has {} backends, expected one",
                    backends.len()
                )))
            }
        };
        if backend.weight() == 0 {
            warn!(gateway = %self.context.gateway, route = %route_nn, port, "only backend has weight 0; skipping listener");
            return Ok(None);
        }
        let arn = targets
            .build_target_group(stack, &**route, backend)
            .await?;
        Ok(Some(Action::forward_to(arn)))
    }

    async fn certificates(
        &self,
        port: i32,
        routes: &[Arc<dyn RouteDescriptor>],
        cfg: &ListenerConfiguration,
    ) -> Result<Vec<Certificate>> {
        let explicit: Vec<String> = cfg
            .default_certificate
            .iter()
            .chain(cfg.certificates.iter())
            .cloned()
            .collect();
        if !explicit.is_empty() {
            let mut seen = BTreeSet::new();
            return Ok(explicit
                .into_iter()
                .filter(|arn| seen.insert(arn.clone()))
                .map(|certificate_arn| Certificate { certificate_arn })
                .collect());
        }

        let hostnames = self.discovery_hostnames(port, routes);
        if hostnames.is_empty() {
            return Err(BuildError::config(format!(
                "no hostnames to discover certificates for port {port}"
            )));
        }
        let arns = self
            .certificates
            .discover(&hostnames)
            .await
            .context(|| format!("discovering certificates for port {port}"))?;
        if arns.is_empty() {
            return Err(BuildError::config(format!(
                "no certificate found for {hostnames:?} on port {port}"
            )));
        }
        Ok(arns
            .into_iter()
            .map(|certificate_arn| Certificate { certificate_arn })
            .collect())
    }

    /// Route hostnames compatible with the listener, else raw route hostnames,
    /// else the Gateway listener hostnames.
    fn discovery_hostnames(&self, port: i32, routes: &[Arc<dyn RouteDescriptor>]) -> Vec<String> {
        let compatible: BTreeSet<String> = routes
            .iter()
            .filter_map(|r| r.compatible_hostnames_by_port().get(&port))
            .flatten()
            .cloned()
            .collect();
        if !compatible.is_empty() {
            return compatible.into_iter().collect();
        }
        let raw: BTreeSet<String> = routes.iter().flat_map(|r| r.hostnames().iter().cloned()).collect();
        if !raw.is_empty() {
            return raw.into_iter().collect();
        }
        self.context
            .gateway_spec
            .listeners
            .iter()
            .filter(|l| l.port == port)
            .filter_map(|l| l.hostname.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn alpn_policy(&self, protocol: Protocol, cfg: &ListenerConfiguration) -> Result<Vec<String>> {
        let Some(policy) = cfg.alpn_policy.as_deref() else {
            return Ok(Vec::new());
        };
        if self.context.load_balancer_type != LoadBalancerType::Network || protocol != Protocol::Tls {
            debug!(port = ?cfg.protocol_port, "ALPN policy only applies to TLS listeners; ignored");
            return Ok(Vec::new());
        }
        if !ALPN_POLICIES.contains(&policy) {
            return Err(BuildError::config(format!("invalid ALPN policy {policy:?}")));
        }
        Ok(vec![policy.to_string()])
    }

    async fn mutual_authentication(
        &self,
        port: i32,
        protocol: Protocol,
        cfg: &ListenerConfiguration,
    ) -> Result<Option<MutualAuthenticationAttributes>> {
        if protocol != Protocol::Https || self.context.local_zone_or_outpost {
            return Ok(None);
        }
        let Some(mtls) = cfg.mutual_authentication.as_ref() else {
            return Ok(Some(MutualAuthenticationAttributes::off()));
        };
        match mtls.mode {
            MutualAuthenticationMode::Off => Ok(Some(MutualAuthenticationAttributes::off())),
            MutualAuthenticationMode::Passthrough => Ok(Some(MutualAuthenticationAttributes {
                mode: MutualAuthenticationMode::Passthrough,
                ..MutualAuthenticationAttributes::off()
            })),
            MutualAuthenticationMode::Verify => {
                let trust_store = mtls.trust_store.as_deref().ok_or_else(|| {
                    BuildError::config(format!("mutual TLS verify on port {port} requires a trust store"))
                })?;
                let trust_store_arn = if trust_store.starts_with("arn:") {
                    trust_store.to_string()
                } else {
                    self.trust_stores
                        .trust_store_arn(trust_store)
                        .await
                        .context(|| format!("resolving trust store {trust_store} for port {port}"))?
                };
                Ok(Some(MutualAuthenticationAttributes {
                    mode: MutualAuthenticationMode::Verify,
                    trust_store_arn: Some(trust_store_arn),
                    ignore_client_certificate_expiry: Some(
                        mtls.ignore_client_certificate_expiry.unwrap_or(false),
                    ),
                    advertise_trust_store_ca_names: mtls.advertise_trust_store_ca_names,
                }))
            }
        }
    }
}
