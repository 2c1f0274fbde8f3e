//! ELBv2 resource specifications.
//!
//! These types describe the desired state of a load balancer, its listeners,
//! listener rules and target groups. Cross-references are [`StringToken`]s.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use gateway_lb_core::{ResourceId, StringToken};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Resource type of a load balancer.
pub const LOAD_BALANCER_TYPE: &str = "AWS::ElasticLoadBalancingV2::LoadBalancer";
/// Resource type of a listener.
pub const LISTENER_TYPE: &str = "AWS::ElasticLoadBalancingV2::Listener";
/// Resource type of a listener rule.
pub const LISTENER_RULE_TYPE: &str = "AWS::ElasticLoadBalancingV2::ListenerRule";
/// Resource type of a target group.
pub const TARGET_GROUP_TYPE: &str = "AWS::ElasticLoadBalancingV2::TargetGroup";

/// Kind of load balancer being compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadBalancerType {
    /// Layer-7 application load balancer.
    Application,
    /// Layer-4 network load balancer.
    Network,
}

impl LoadBalancerType {
    /// Whether this is an application (L7) load balancer.
    #[must_use]
    pub const fn is_application(self) -> bool {
        matches!(self, Self::Application)
    }
}

/// Load balancer scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scheme {
    /// Only reachable from inside the VPC.
    #[default]
    Internal,
    /// Reachable from the internet.
    InternetFacing,
}

impl Scheme {
    /// The AWS string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::InternetFacing => "internet-facing",
        }
    }
}

/// Load balancer IP address type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IpAddressType {
    /// IPv4 only.
    #[default]
    Ipv4,
    /// IPv4 and IPv6.
    Dualstack,
    /// IPv6 public addresses with private IPv4 only.
    DualstackWithoutPublicIpv4,
}

impl IpAddressType {
    /// Whether IPv6 traffic reaches the load balancer.
    #[must_use]
    pub const fn supports_ipv6(self) -> bool {
        matches!(self, Self::Dualstack | Self::DualstackWithoutPublicIpv4)
    }
}

/// Listener and target group protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Protocol {
    /// HTTP.
    #[serde(rename = "HTTP")]
    Http,
    /// HTTPS.
    #[serde(rename = "HTTPS")]
    Https,
    /// TCP.
    #[serde(rename = "TCP")]
    Tcp,
    /// TLS.
    #[serde(rename = "TLS")]
    Tls,
    /// UDP.
    #[serde(rename = "UDP")]
    Udp,
    /// TCP and UDP on the same port.
    #[serde(rename = "TCP_UDP")]
    TcpUdp,
    /// QUIC.
    #[serde(rename = "QUIC")]
    Quic,
    /// TCP and QUIC on the same port.
    #[serde(rename = "TCP_QUIC")]
    TcpQuic,
}

impl Protocol {
    /// The AWS string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
            Self::Tcp => "TCP",
            Self::Tls => "TLS",
            Self::Udp => "UDP",
            Self::TcpUdp => "TCP_UDP",
            Self::Quic => "QUIC",
            Self::TcpQuic => "TCP_QUIC",
        }
    }

    /// Whether the listener terminates TLS.
    #[must_use]
    pub const fn is_secure(self) -> bool {
        matches!(self, Self::Https | Self::Tls)
    }

    /// Whether this protocol is served by application load balancers.
    #[must_use]
    pub const fn is_application(self) -> bool {
        matches!(self, Self::Http | Self::Https)
    }

    /// Whether the protocol carries UDP datagrams.
    #[must_use]
    pub const fn carries_udp(self) -> bool {
        matches!(self, Self::Udp | Self::TcpUdp | Self::Quic | Self::TcpQuic)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HTTP" => Ok(Self::Http),
            "HTTPS" => Ok(Self::Https),
            "TCP" => Ok(Self::Tcp),
            "TLS" => Ok(Self::Tls),
            "UDP" => Ok(Self::Udp),
            "TCP_UDP" => Ok(Self::TcpUdp),
            "QUIC" => Ok(Self::Quic),
            "TCP_QUIC" => Ok(Self::TcpQuic),
            _ => Err(ParseError::UnknownProtocol(s.to_string())),
        }
    }
}

/// How targets are registered with a target group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    /// Nodes, addressed by node port.
    #[default]
    Instance,
    /// Pods, addressed by pod IP.
    Ip,
    /// Another application load balancer.
    Alb,
}

impl TargetType {
    /// The AWS string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Instance => "instance",
            Self::Ip => "ip",
            Self::Alb => "alb",
        }
    }
}

/// Address family of target group targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetGroupIpAddressType {
    /// IPv4 targets.
    #[default]
    Ipv4,
    /// IPv6 targets.
    Ipv6,
}

/// Application protocol version spoken to targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// HTTP/1.1.
    #[serde(rename = "HTTP1")]
    Http1,
    /// HTTP/2.
    #[serde(rename = "HTTP2")]
    Http2,
    /// gRPC.
    #[serde(rename = "GRPC")]
    Grpc,
}

impl ProtocolVersion {
    /// The AWS string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http1 => "HTTP1",
            Self::Http2 => "HTTP2",
            Self::Grpc => "GRPC",
        }
    }
}

/// A key/value attribute on a load balancer, listener or target group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute key.
    pub key: String,
    /// Attribute value.
    pub value: String,
}

impl Attribute {
    /// Create a new attribute.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

// ============================================================================
// Load balancer
// ============================================================================

/// Subnet placement of the load balancer and optional per-subnet addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetMapping {
    /// Subnet ID.
    #[serde(rename = "subnetID")]
    pub subnet_id: String,
    /// Elastic IP allocation ID.
    #[serde(rename = "allocationID", default, skip_serializing_if = "Option::is_none")]
    pub allocation_id: Option<String>,
    /// Static private IPv4 address.
    #[serde(
        rename = "privateIPv4Address",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub private_ipv4_address: Option<String>,
    /// Static IPv6 address.
    #[serde(rename = "ipv6Address", default, skip_serializing_if = "Option::is_none")]
    pub ipv6_address: Option<String>,
    /// Source NAT IPv6 prefix.
    #[serde(
        rename = "sourceNatIPv6Prefix",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_nat_ipv6_prefix: Option<String>,
}

impl SubnetMapping {
    /// A mapping with no allocations.
    #[must_use]
    pub fn new(subnet_id: impl Into<String>) -> Self {
        Self {
            subnet_id: subnet_id.into(),
            allocation_id: None,
            private_ipv4_address: None,
            ipv6_address: None,
            source_nat_ipv6_prefix: None,
        }
    }
}

/// Minimum provisioned capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimumLoadBalancerCapacity {
    /// Load balancer capacity units.
    pub capacity_units: i32,
}

/// Desired state of a load balancer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerSpec {
    /// Load balancer name.
    pub name: String,
    /// Application or network.
    #[serde(rename = "type")]
    pub load_balancer_type: LoadBalancerType,
    /// Scheme.
    pub scheme: Scheme,
    /// IP address type.
    pub ip_address_type: IpAddressType,
    /// Subnet placement.
    pub subnet_mappings: Vec<SubnetMapping>,
    /// Security groups attached to the load balancer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<StringToken>,
    /// Load balancer attributes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub load_balancer_attributes: Vec<Attribute>,
    /// Tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Customer-owned IPv4 pool (outposts, ALB only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_owned_ipv4_pool: Option<String>,
    /// IPAM pool for IPv4 addresses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_ipam_pool: Option<String>,
    /// Minimum capacity reservation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_load_balancer_capacity: Option<MinimumLoadBalancerCapacity>,
}

/// A load balancer registered in a stack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadBalancer {
    #[serde(skip)]
    id: String,
    /// Desired state.
    pub spec: LoadBalancerSpec,
}

impl LoadBalancer {
    /// Create a load balancer resource.
    #[must_use]
    pub fn new(id: impl Into<String>, spec: LoadBalancerSpec) -> Self {
        Self {
            id: id.into(),
            spec,
        }
    }

    /// Logical ID within the stack.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Deferred ARN of the deployed load balancer.
    #[must_use]
    pub fn arn(&self) -> StringToken {
        StringToken::reference(ResourceId::new(LOAD_BALANCER_TYPE, &self.id), "loadBalancerARN")
    }

    /// Deferred DNS name of the deployed load balancer.
    #[must_use]
    pub fn dns_name(&self) -> StringToken {
        StringToken::reference(ResourceId::new(LOAD_BALANCER_TYPE, &self.id), "dnsName")
    }
}

// ============================================================================
// Actions and conditions
// ============================================================================

/// A target group participating in a forward action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupTuple {
    /// Deferred target group ARN.
    #[serde(rename = "targetGroupARN")]
    pub target_group_arn: StringToken,
    /// Relative weight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}

/// Stickiness across the target groups of a forward action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupStickinessConfig {
    /// Whether stickiness is enabled.
    pub enabled: bool,
    /// Stickiness duration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i32>,
}

/// Forward traffic to one or more target groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardActionConfig {
    /// Weighted target groups.
    pub target_groups: Vec<TargetGroupTuple>,
    /// Optional stickiness.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_group_stickiness_config: Option<TargetGroupStickinessConfig>,
}

/// Return a fixed HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedResponseActionConfig {
    /// Content type of the body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_body: Option<String>,
    /// HTTP status code, as a string.
    pub status_code: String,
}

/// Redirect the client.
///
/// Unset components keep the ELB `#{...}` placeholders meaning "same as request".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectActionConfig {
    /// Target host.
    pub host: String,
    /// Target path.
    pub path: String,
    /// Target port.
    pub port: String,
    /// Target protocol.
    pub protocol: String,
    /// Target query.
    pub query: String,
    /// `HTTP_301` or `HTTP_302`.
    pub status_code: String,
}

/// Authenticate users through an OIDC identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateOidcActionConfig {
    /// Issuer URL.
    pub issuer: String,
    /// Authorization endpoint.
    pub authorization_endpoint: String,
    /// Token endpoint.
    pub token_endpoint: String,
    /// User info endpoint.
    pub user_info_endpoint: String,
    /// OAuth client ID.
    #[serde(rename = "clientID")]
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Extra query parameters for the authorization request.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub authentication_request_extra_params: BTreeMap<String, String>,
    /// `deny`, `allow` or `authenticate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_unauthenticated_request: Option<String>,
    /// Requested scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Session cookie name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_cookie_name: Option<String>,
    /// Session timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_timeout: Option<i64>,
}

/// Authenticate users through an Amazon Cognito user pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateCognitoActionConfig {
    /// User pool ARN.
    #[serde(rename = "userPoolARN")]
    pub user_pool_arn: String,
    /// User pool client ID.
    #[serde(rename = "userPoolClientID")]
    pub user_pool_client_id: String,
    /// User pool domain.
    pub user_pool_domain: String,
    /// Extra query parameters for the authorization request.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub authentication_request_extra_params: BTreeMap<String, String>,
    /// `deny`, `allow` or `authenticate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_unauthenticated_request: Option<String>,
    /// Requested scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Session cookie name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_cookie_name: Option<String>,
    /// Session timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_timeout: Option<i64>,
}

/// A listener or listener-rule action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Action {
    /// Forward to target groups.
    Forward(ForwardActionConfig),
    /// Fixed response.
    FixedResponse(FixedResponseActionConfig),
    /// Redirect.
    Redirect(RedirectActionConfig),
    /// OIDC authentication (pre-routing).
    AuthenticateOidc(AuthenticateOidcActionConfig),
    /// Cognito authentication (pre-routing).
    AuthenticateCognito(AuthenticateCognitoActionConfig),
}

impl Action {
    /// A forward action to a single target group.
    #[must_use]
    pub fn forward_to(target_group_arn: StringToken) -> Self {
        Self::Forward(ForwardActionConfig {
            target_groups: vec![TargetGroupTuple {
                target_group_arn,
                weight: None,
            }],
            target_group_stickiness_config: None,
        })
    }

    /// A plain-text fixed response.
    #[must_use]
    pub fn fixed_response(status_code: u16) -> Self {
        Self::FixedResponse(FixedResponseActionConfig {
            content_type: Some("text/plain".to_string()),
            message_body: None,
            status_code: status_code.to_string(),
        })
    }

    /// Whether the action runs before the routing action.
    #[must_use]
    pub const fn is_pre_routing(&self) -> bool {
        matches!(self, Self::AuthenticateOidc(_) | Self::AuthenticateCognito(_))
    }
}

/// A key/value pair in a query-string condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryStringKeyValuePair {
    /// Optional key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Value.
    pub value: String,
}

/// A listener-rule condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "kebab-case")]
pub enum RuleCondition {
    /// Match on the Host header.
    HostHeader {
        /// Host patterns.
        values: Vec<String>,
    },
    /// Match on the request path.
    PathPattern {
        /// Path patterns.
        values: Vec<String>,
    },
    /// Match on an arbitrary header.
    HttpHeader {
        /// Header name.
        #[serde(rename = "httpHeaderName")]
        http_header_name: String,
        /// Header values.
        values: Vec<String>,
    },
    /// Match on the request method.
    HttpRequestMethod {
        /// Methods.
        values: Vec<String>,
    },
    /// Match on query-string parameters.
    QueryString {
        /// Key/value pairs.
        values: Vec<QueryStringKeyValuePair>,
    },
    /// Match on the client source IP.
    SourceIp {
        /// CIDR blocks.
        values: Vec<String>,
    },
}

// ============================================================================
// Listener
// ============================================================================

/// A server certificate reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Certificate {
    /// Certificate ARN.
    #[serde(rename = "certificateARN")]
    pub certificate_arn: String,
}

/// Mutual TLS mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutualAuthenticationMode {
    /// No client certificates.
    #[default]
    Off,
    /// Client certificates forwarded to targets unverified.
    Passthrough,
    /// Client certificates verified against a trust store.
    Verify,
}

/// Whether trust store CA names are advertised to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvertiseTrustStoreCaNames {
    /// Advertise.
    On,
    /// Do not advertise.
    Off,
}

/// Resolved mutual TLS settings of an HTTPS listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutualAuthenticationAttributes {
    /// Mode.
    pub mode: MutualAuthenticationMode,
    /// Trust store ARN (verify mode).
    #[serde(rename = "trustStoreArn", default, skip_serializing_if = "Option::is_none")]
    pub trust_store_arn: Option<String>,
    /// Accept expired client certificates (verify mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_client_certificate_expiry: Option<bool>,
    /// CA name advertisement (verify mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_trust_store_ca_names: Option<AdvertiseTrustStoreCaNames>,
}

impl MutualAuthenticationAttributes {
    /// The `off` setting.
    #[must_use]
    pub const fn off() -> Self {
        Self {
            mode: MutualAuthenticationMode::Off,
            trust_store_arn: None,
            ignore_client_certificate_expiry: None,
            advertise_trust_store_ca_names: None,
        }
    }
}

/// Desired state of a listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerSpec {
    /// Owning load balancer.
    #[serde(rename = "loadBalancerARN")]
    pub load_balancer_arn: StringToken,
    /// Listening port.
    pub port: i32,
    /// Listener protocol.
    pub protocol: Protocol,
    /// Default actions.
    pub default_actions: Vec<Action>,
    /// Certificates; the first one is the default certificate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificates: Vec<Certificate>,
    /// TLS negotiation policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_policy: Option<String>,
    /// ALPN policy (TLS listeners on network load balancers).
    #[serde(rename = "alpnPolicy", default, skip_serializing_if = "Vec::is_empty")]
    pub alpn_policy: Vec<String>,
    /// Mutual TLS (HTTPS listeners).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutual_authentication: Option<MutualAuthenticationAttributes>,
    /// Listener attributes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listener_attributes: Vec<Attribute>,
    /// Tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// A listener registered in a stack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listener {
    #[serde(skip)]
    id: String,
    /// Desired state.
    pub spec: ListenerSpec,
}

impl Listener {
    /// Create a listener resource.
    #[must_use]
    pub fn new(id: impl Into<String>, spec: ListenerSpec) -> Self {
        Self {
            id: id.into(),
            spec,
        }
    }

    /// Logical ID within the stack.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Deferred ARN of the deployed listener.
    #[must_use]
    pub fn arn(&self) -> StringToken {
        StringToken::reference(ResourceId::new(LISTENER_TYPE, &self.id), "listenerARN")
    }
}

/// Desired state of a listener rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerRuleSpec {
    /// Owning listener.
    #[serde(rename = "listenerARN")]
    pub listener_arn: StringToken,
    /// Evaluation priority, 1-based.
    pub priority: i32,
    /// Conditions, all of which must match.
    pub conditions: Vec<RuleCondition>,
    /// Actions, pre-routing first.
    pub actions: Vec<Action>,
    /// Tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// A listener rule registered in a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenerRule {
    #[serde(skip)]
    id: String,
    /// Desired state.
    pub spec: ListenerRuleSpec,
}

impl ListenerRule {
    /// Create a listener rule resource.
    #[must_use]
    pub fn new(id: impl Into<String>, spec: ListenerRuleSpec) -> Self {
        Self {
            id: id.into(),
            spec,
        }
    }

    /// Logical ID within the stack.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

// ============================================================================
// Target group
// ============================================================================

/// Expected health check response codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HealthCheckMatcher {
    /// HTTP status codes, e.g. `200-399`.
    HttpCode(String),
    /// gRPC status codes, e.g. `12`.
    GrpcCode(String),
}

/// Health check settings of a target group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckConfig {
    /// Port: a number or `traffic-port`.
    pub port: IntOrString,
    /// Protocol.
    pub protocol: Protocol,
    /// Path (HTTP/HTTPS health checks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Expected response codes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcher: Option<HealthCheckMatcher>,
    /// Seconds between checks.
    pub interval_seconds: i32,
    /// Seconds before a check times out.
    pub timeout_seconds: i32,
    /// Consecutive successes before healthy.
    pub healthy_threshold_count: i32,
    /// Consecutive failures before unhealthy.
    pub unhealthy_threshold_count: i32,
}

/// Desired state of a target group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupSpec {
    /// Target group name.
    pub name: String,
    /// Target type.
    pub target_type: TargetType,
    /// Port targets receive traffic on; `1` for named IP-mode ports.
    pub port: i32,
    /// Protocol.
    pub protocol: Protocol,
    /// Protocol version (application load balancers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<ProtocolVersion>,
    /// Address family of targets.
    pub ip_address_type: TargetGroupIpAddressType,
    /// Health checks.
    pub health_check_config: HealthCheckConfig,
    /// Target group attributes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_group_attributes: Vec<Attribute>,
    /// Tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// A target group registered in a stack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetGroup {
    #[serde(skip)]
    id: String,
    /// Desired state.
    pub spec: TargetGroupSpec,
}

impl TargetGroup {
    /// Create a target group resource.
    #[must_use]
    pub fn new(id: impl Into<String>, spec: TargetGroupSpec) -> Self {
        Self {
            id: id.into(),
            spec,
        }
    }

    /// Logical ID within the stack.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Deferred ARN of the deployed target group.
    #[must_use]
    pub fn arn(&self) -> StringToken {
        StringToken::reference(ResourceId::new(TARGET_GROUP_TYPE, &self.id), "targetGroupARN")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_parse_and_display() {
        assert_eq!("tcp_udp".parse::<Protocol>().unwrap(), Protocol::TcpUdp);
        assert_eq!(Protocol::TcpQuic.to_string(), "TCP_QUIC");
        assert!("SCTP".parse::<Protocol>().is_err());
    }

    #[test]
    fn protocol_families() {
        assert!(Protocol::Https.is_secure());
        assert!(Protocol::Tls.is_secure());
        assert!(!Protocol::Quic.is_secure());
        assert!(Protocol::TcpUdp.carries_udp());
        assert!(!Protocol::Tcp.carries_udp());
    }

    #[test]
    fn action_serializes_with_type_tag() {
        let json = serde_json::to_value(Action::fixed_response(503)).unwrap();
        assert_eq!(json["type"], "fixed-response");
        assert_eq!(json["statusCode"], "503");
    }

    #[test]
    fn condition_serializes_with_field_tag() {
        let cond = RuleCondition::PathPattern {
            values: vec!["/api/*".to_string()],
        };
        let json = serde_json::to_value(cond).unwrap();
        assert_eq!(json["field"], "path-pattern");
    }

    #[test]
    fn target_group_arn_is_reference() {
        let tg = TargetGroup::new(
            "ns/gw:ns/route:http-ns:svc:80",
            TargetGroupSpec {
                name: "k8s-ns-svc-0123456789".to_string(),
                target_type: TargetType::Ip,
                port: 8080,
                protocol: Protocol::Http,
                protocol_version: Some(ProtocolVersion::Http1),
                ip_address_type: TargetGroupIpAddressType::Ipv4,
                health_check_config: HealthCheckConfig {
                    port: IntOrString::String("traffic-port".to_string()),
                    protocol: Protocol::Http,
                    path: Some("/".to_string()),
                    matcher: Some(HealthCheckMatcher::HttpCode("200-399".to_string())),
                    interval_seconds: 15,
                    timeout_seconds: 5,
                    healthy_threshold_count: 3,
                    unhealthy_threshold_count: 3,
                },
                target_group_attributes: Vec::new(),
                tags: BTreeMap::new(),
            },
        );
        let reference = tg.arn();
        let reference = reference.as_reference().unwrap();
        assert_eq!(reference.resource.resource_type, TARGET_GROUP_TYPE);
        assert_eq!(reference.attribute, "targetGroupARN");
    }
}
