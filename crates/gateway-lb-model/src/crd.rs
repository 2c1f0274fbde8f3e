//! Kubernetes configuration objects consumed by the builders.
//!
//! `Gateway` is a minimal projection of the Gateway API object: only the fields
//! the builders read. The `gateway.k8s.aws` resources carry per-gateway,
//! per-target-group and per-rule overrides.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use kube::CustomResource;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use serde::{Deserialize, Serialize};

use crate::elbv2::{
    AdvertiseTrustStoreCaNames, Attribute, IpAddressType, MutualAuthenticationMode, Protocol,
    ProtocolVersion, RuleCondition, Scheme, TargetGroupIpAddressType, TargetGroupStickinessConfig,
    TargetType,
};
use crate::error::ParseError;

// ============================================================================
// Gateway
// ============================================================================

/// Minimal Gateway API `Gateway` spec.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1",
    kind = "Gateway",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    /// Gateway class.
    pub gateway_class_name: String,
    /// Declared listeners.
    #[serde(default)]
    pub listeners: Vec<GatewayListener>,
}

/// A listener declared on a Gateway.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayListener {
    /// Section name.
    pub name: String,
    /// Hostname restriction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Port.
    pub port: i32,
    /// Gateway API protocol: HTTP, HTTPS, TLS, TCP, UDP.
    pub protocol: String,
}

// ============================================================================
// LoadBalancerConfiguration
// ============================================================================

/// Per-subnet placement and address allocation.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubnetConfiguration {
    /// Subnet ID or Name tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Elastic IP allocation ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eip_allocation: Option<String>,
    /// Private IPv4 address.
    #[serde(rename = "privateIPv4Allocation", default, skip_serializing_if = "Option::is_none")]
    pub private_ipv4_allocation: Option<String>,
    /// IPv6 address.
    #[serde(rename = "ipv6Allocation", default, skip_serializing_if = "Option::is_none")]
    pub ipv6_allocation: Option<String>,
    /// Source NAT IPv6 prefix, or `auto_assigned`.
    #[serde(rename = "sourceNatIPv6Prefix", default, skip_serializing_if = "Option::is_none")]
    pub source_nat_ipv6_prefix: Option<String>,
}

/// Mutual TLS configuration of an HTTPS listener.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MutualAuthenticationConfig {
    /// Mode.
    #[serde(default)]
    pub mode: MutualAuthenticationMode,
    /// Trust store name or ARN (verify mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_store: Option<String>,
    /// Accept expired client certificates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_client_certificate_expiry: Option<bool>,
    /// CA name advertisement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_trust_store_ca_names: Option<AdvertiseTrustStoreCaNames>,
}

/// A `PROTOCOL:PORT` listener key such as `HTTPS:443`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolPort {
    /// Protocol.
    pub protocol: Protocol,
    /// Port.
    pub port: i32,
}

impl fmt::Display for ProtocolPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.protocol, self.port)
    }
}

impl FromStr for ProtocolPort {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (protocol, port) = s
            .split_once(':')
            .ok_or_else(|| ParseError::InvalidProtocolPort(s.to_string()))?;
        let port = port
            .parse()
            .map_err(|_| ParseError::InvalidProtocolPort(s.to_string()))?;
        Ok(Self {
            protocol: protocol.parse()?,
            port,
        })
    }
}

/// Per-listener overrides.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListenerConfiguration {
    /// `PROTOCOL:PORT` of the listener this applies to.
    pub protocol_port: String,
    /// Default certificate ARN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_certificate: Option<String>,
    /// Additional certificate ARNs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificates: Vec<String>,
    /// TLS negotiation policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_policy: Option<String>,
    /// ALPN policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpn_policy: Option<String>,
    /// Mutual TLS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutual_authentication: Option<MutualAuthenticationConfig>,
    /// Listener attributes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listener_attributes: Vec<Attribute>,
    /// Enable QUIC on UDP and TCP_UDP listeners.
    #[serde(default)]
    pub quic_enabled: bool,
}

/// Minimum capacity reservation.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MinimumCapacity {
    /// Load balancer capacity units.
    pub capacity_units: i32,
}

/// Per-gateway load balancer overrides.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[kube(
    group = "gateway.k8s.aws",
    version = "v1beta1",
    kind = "LoadBalancerConfiguration",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerConfigurationSpec {
    /// Explicit load balancer name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_name: Option<String>,
    /// Scheme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<Scheme>,
    /// IP address type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address_type: Option<IpAddressType>,
    /// Explicit subnets with optional allocations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_subnets: Option<Vec<SubnetConfiguration>>,
    /// Subnet tag selector: tag key to allowed values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_subnets_selector: Option<BTreeMap<String, Vec<String>>>,
    /// Listener overrides.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listener_configurations: Vec<ListenerConfiguration>,
    /// Explicit security groups, by name or ID.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<String>,
    /// Managed prefix lists allowed to reach the load balancer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_group_prefixes: Vec<String>,
    /// CIDRs allowed to reach the load balancer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_ranges: Vec<String>,
    /// Allow path-MTU discovery ICMP for UDP listeners.
    #[serde(default, rename = "enableICMP")]
    pub enable_icmp: bool,
    /// Manage backend security group rules with explicit security groups.
    #[serde(default)]
    pub manage_backend_security_group_rules: bool,
    /// Run a network load balancer without security groups.
    #[serde(default)]
    pub disable_security_group: bool,
    /// Customer-owned IPv4 pool.
    #[serde(rename = "customerOwnedIpv4Pool", default, skip_serializing_if = "Option::is_none")]
    pub customer_owned_ipv4_pool: Option<String>,
    /// IPAM pool for IPv4 addresses.
    #[serde(rename = "ipv4IPAMPoolId", default, skip_serializing_if = "Option::is_none")]
    pub ipv4_ipam_pool_id: Option<String>,
    /// Minimum capacity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_load_balancer_capacity: Option<MinimumCapacity>,
    /// Load balancer attributes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub load_balancer_attributes: Vec<Attribute>,
    /// Tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
}

impl LoadBalancerConfigurationSpec {
    /// Find the listener configuration for a protocol and port.
    ///
    /// Malformed `protocolPort` keys never match.
    #[must_use]
    pub fn listener_configuration(&self, key: ProtocolPort) -> Option<&ListenerConfiguration> {
        self.listener_configurations
            .iter()
            .find(|cfg| cfg.protocol_port.parse::<ProtocolPort>().ok() == Some(key))
    }
}

// ============================================================================
// TargetGroupConfiguration
// ============================================================================

/// Health check overrides.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckConfiguration {
    /// `traffic-port`, a number, or a named Service port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_port: Option<String>,
    /// Protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_protocol: Option<Protocol>,
    /// Path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_path: Option<String>,
    /// Interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_interval: Option<i32>,
    /// Timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_timeout: Option<i32>,
    /// Healthy threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthy_threshold_count: Option<i32>,
    /// Unhealthy threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unhealthy_threshold_count: Option<i32>,
    /// Expected codes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcher: Option<HealthCheckMatcherConfig>,
}

/// Expected health check codes; exactly one should be set.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckMatcherConfig {
    /// HTTP codes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_code: Option<String>,
    /// gRPC codes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_code: Option<String>,
}

/// Target group overrides. Unset fields fall through to defaults.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupProps {
    /// Explicit target group name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_group_name: Option<String>,
    /// Target address family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address_type: Option<TargetGroupIpAddressType>,
    /// Health checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_config: Option<HealthCheckConfiguration>,
    /// Node selector for instance targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<LabelSelector>,
    /// Protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    /// Protocol version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<ProtocolVersion>,
    /// Target type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<TargetType>,
    /// Target group attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_group_attributes: Option<Vec<Attribute>>,
    /// Tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    /// Allow registering targets from other clusters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_multi_cluster: Option<bool>,
}

impl TargetGroupProps {
    /// Overlay `other` on top of `self`, field by field.
    #[must_use]
    pub fn overlay(&self, other: &Self) -> Self {
        Self {
            target_group_name: other
                .target_group_name
                .clone()
                .or_else(|| self.target_group_name.clone()),
            ip_address_type: other.ip_address_type.or(self.ip_address_type),
            health_check_config: other
                .health_check_config
                .clone()
                .or_else(|| self.health_check_config.clone()),
            node_selector: other
                .node_selector
                .clone()
                .or_else(|| self.node_selector.clone()),
            protocol: other.protocol.or(self.protocol),
            protocol_version: other.protocol_version.or(self.protocol_version),
            target_type: other.target_type.or(self.target_type),
            target_group_attributes: other
                .target_group_attributes
                .clone()
                .or_else(|| self.target_group_attributes.clone()),
            tags: other.tags.clone().or_else(|| self.tags.clone()),
            enable_multi_cluster: other.enable_multi_cluster.or(self.enable_multi_cluster),
        }
    }
}

/// Which routes a route configuration applies to.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RouteIdentifier {
    /// Route kind, e.g. `HTTPRoute`.
    pub kind: String,
    /// Route namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Route name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl RouteIdentifier {
    /// Match score: `None` if not matching, higher is more specific.
    fn specificity(&self, kind: &str, namespace: &str, name: &str) -> Option<u8> {
        if self.kind != kind {
            return None;
        }
        let ns_ok = self.namespace.as_deref().map_or(true, |ns| ns == namespace);
        let name_ok = self.name.as_deref().map_or(true, |n| n == name);
        if !ns_ok || !name_ok {
            return None;
        }
        Some(u8::from(self.namespace.is_some()) + u8::from(self.name.is_some()) * 2)
    }
}

/// Overrides for target groups built from a specific kind of route.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfiguration {
    /// Route selector.
    pub route_identifier: RouteIdentifier,
    /// Overrides.
    pub target_group_props: TargetGroupProps,
}

/// The Service a target group configuration applies to.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TargetReference {
    /// Service name, in the configuration's namespace.
    pub name: String,
    /// Kind; only `Service` is supported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Per-Service target group overrides.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "gateway.k8s.aws",
    version = "v1beta1",
    kind = "TargetGroupConfiguration",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupConfigurationSpec {
    /// Target Service.
    pub target_reference: TargetReference,
    /// Overrides for every route.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_configuration: Option<TargetGroupProps>,
    /// Overrides for specific routes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route_configurations: Vec<RouteConfiguration>,
}

impl TargetGroupConfigurationSpec {
    /// Effective props for a route: defaults overlaid by the most specific
    /// matching route configuration.
    #[must_use]
    pub fn props_for_route(&self, kind: &str, namespace: &str, name: &str) -> TargetGroupProps {
        let defaults = self.default_configuration.clone().unwrap_or_default();
        let best = self
            .route_configurations
            .iter()
            .filter_map(|cfg| {
                cfg.route_identifier
                    .specificity(kind, namespace, name)
                    .map(|score| (score, cfg))
            })
            // first declared wins among equal scores
            .fold(None::<(u8, &RouteConfiguration)>, |best, (score, cfg)| match best {
                Some((top, _)) if top >= score => best,
                _ => Some((score, cfg)),
            });
        match best {
            Some((_, cfg)) => defaults.overlay(&cfg.target_group_props),
            None => defaults,
        }
    }
}

// ============================================================================
// ListenerRuleConfiguration
// ============================================================================

/// Redirect parameters, shared with route redirect filters.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RedirectConfig {
    /// Scheme: `http` or `https`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    /// Host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    /// Full path replacement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// 301 or 302.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

/// A fixed response override.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FixedResponseConfig {
    /// Status code.
    pub status_code: u16,
    /// Content type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_body: Option<String>,
}

/// Forward tuning for the synthesized forward action.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ForwardConfig {
    /// Stickiness across target groups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_group_stickiness_config: Option<TargetGroupStickinessConfig>,
}

/// A reference to a Kubernetes Secret.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SecretReference {
    /// Secret name.
    pub name: String,
    /// Secret namespace; defaults to the configuration's namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// OIDC authentication; client credentials come from a Secret.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateOidcConfig {
    /// Issuer.
    pub issuer: String,
    /// Authorization endpoint.
    pub authorization_endpoint: String,
    /// Token endpoint.
    pub token_endpoint: String,
    /// User info endpoint.
    pub user_info_endpoint: String,
    /// Secret with `clientID` and `clientSecret` keys.
    pub secret: SecretReference,
    /// Extra authorization request parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub authentication_request_extra_params: BTreeMap<String, String>,
    /// Behaviour for unauthenticated requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_unauthenticated_request: Option<String>,
    /// Scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Session cookie name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_cookie_name: Option<String>,
    /// Session timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_timeout: Option<i64>,
}

/// Cognito authentication.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateCognitoConfig {
    /// User pool ARN.
    #[serde(rename = "userPoolARN")]
    pub user_pool_arn: String,
    /// User pool client ID.
    #[serde(rename = "userPoolClientID")]
    pub user_pool_client_id: String,
    /// User pool domain.
    pub user_pool_domain: String,
    /// Extra authorization request parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub authentication_request_extra_params: BTreeMap<String, String>,
    /// Behaviour for unauthenticated requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_unauthenticated_request: Option<String>,
    /// Scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Session cookie name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_cookie_name: Option<String>,
    /// Session timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_timeout: Option<i64>,
}

/// A rule action override.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RuleActionConfig {
    /// Replace routing with a fixed response.
    FixedResponse(FixedResponseConfig),
    /// Replace routing with a redirect.
    Redirect(RedirectConfig),
    /// Tune the synthesized forward action.
    Forward(ForwardConfig),
    /// Authenticate with OIDC before routing.
    AuthenticateOidc(AuthenticateOidcConfig),
    /// Authenticate with Cognito before routing.
    AuthenticateCognito(AuthenticateCognitoConfig),
}

impl RuleActionConfig {
    /// Whether this is a pre-routing (authentication) action.
    #[must_use]
    pub const fn is_pre_routing(&self) -> bool {
        matches!(self, Self::AuthenticateOidc(_) | Self::AuthenticateCognito(_))
    }
}

/// Per-rule listener rule overrides.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[kube(
    group = "gateway.k8s.aws",
    version = "v1beta1",
    kind = "ListenerRuleConfiguration",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ListenerRuleConfigurationSpec {
    /// Action overrides, at most one pre-routing and one routing action.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<RuleActionConfig>,
    /// Extra conditions appended to the route's conditions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<RuleCondition>,
    /// Tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_port_parses() {
        let key: ProtocolPort = "https:443".parse().unwrap();
        assert_eq!(key.protocol, Protocol::Https);
        assert_eq!(key.port, 443);
        assert_eq!(key.to_string(), "HTTPS:443");
        assert!("HTTPS".parse::<ProtocolPort>().is_err());
        assert!("HTTPS:abc".parse::<ProtocolPort>().is_err());
    }

    #[test]
    fn listener_configuration_lookup() {
        let spec: LoadBalancerConfigurationSpec = serde_json::from_value(serde_json::json!({
            "listenerConfigurations": [
                {"protocolPort": "bogus"},
                {"protocolPort": "UDP:53", "quicEnabled": true}
            ]
        }))
        .unwrap();
        let key = ProtocolPort {
            protocol: Protocol::Udp,
            port: 53,
        };
        assert!(spec.listener_configuration(key).unwrap().quic_enabled);
    }

    fn tg_config() -> TargetGroupConfigurationSpec {
        serde_json::from_value(serde_json::json!({
            "targetReference": {"name": "svc"},
            "defaultConfiguration": {"targetType": "ip", "protocol": "HTTP"},
            "routeConfigurations": [
                {
                    "routeIdentifier": {"kind": "HTTPRoute"},
                    "targetGroupProps": {"protocolVersion": "HTTP2"}
                },
                {
                    "routeIdentifier": {"kind": "HTTPRoute", "namespace": "web", "name": "shop"},
                    "targetGroupProps": {"protocolVersion": "GRPC", "targetType": "instance"}
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn most_specific_route_configuration_wins() {
        let cfg = tg_config();
        let props = cfg.props_for_route("HTTPRoute", "web", "shop");
        assert_eq!(props.protocol_version, Some(ProtocolVersion::Grpc));
        assert_eq!(props.target_type, Some(TargetType::Instance));
        assert_eq!(props.protocol, Some(Protocol::Http));

        let props = cfg.props_for_route("HTTPRoute", "web", "other");
        assert_eq!(props.protocol_version, Some(ProtocolVersion::Http2));
        assert_eq!(props.target_type, Some(TargetType::Ip));

        let props = cfg.props_for_route("TCPRoute", "web", "shop");
        assert_eq!(props.protocol_version, None);
    }

    #[test]
    fn rule_action_config_is_type_tagged() {
        let action: RuleActionConfig = serde_json::from_value(serde_json::json!({
            "type": "fixed-response",
            "statusCode": 404
        }))
        .unwrap();
        assert!(matches!(action, RuleActionConfig::FixedResponse(ref f) if f.status_code == 404));
        assert!(!action.is_pre_routing());
    }
}
