//! Route descriptors consumed by the listener and rule builders.
//!
//! Route matching and precedence sorting happen upstream; the builders only
//! read the already-resolved rules, conditions and backends exposed here.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use gateway_lb_core::NamespacedName;
use gateway_lb_model::crd::{ListenerRuleConfigurationSpec, RedirectConfig, TargetGroupConfigurationSpec};
use gateway_lb_model::elbv2::RuleCondition;
use k8s_openapi::api::core::v1::Service;
use serde::{Deserialize, Serialize};

/// Gateway API route kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RouteKind {
    /// `HTTPRoute`.
    #[serde(rename = "HTTPRoute")]
    Http,
    /// `GRPCRoute`.
    #[serde(rename = "GRPCRoute")]
    Grpc,
    /// `TCPRoute`.
    #[serde(rename = "TCPRoute")]
    Tcp,
    /// `UDPRoute`.
    #[serde(rename = "UDPRoute")]
    Udp,
    /// `TLSRoute`.
    #[serde(rename = "TLSRoute")]
    Tls,
}

impl RouteKind {
    /// The Kubernetes kind name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "HTTPRoute",
            Self::Grpc => "GRPCRoute",
            Self::Tcp => "TCPRoute",
            Self::Udp => "UDPRoute",
            Self::Tls => "TLSRoute",
        }
    }

    /// Short lowercase form used in resource IDs.
    #[must_use]
    pub const fn short(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Grpc => "grpc",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Tls => "tls",
        }
    }

    /// Whether traffic for this route arrives over UDP.
    #[must_use]
    pub const fn is_udp(self) -> bool {
        matches!(self, Self::Udp)
    }
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const fn default_weight() -> i32 {
    1
}

/// A Service backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBackend {
    /// The Service object.
    pub service: Service,
    /// Referenced Service port number.
    pub port: i32,
    /// Relative weight.
    #[serde(default = "default_weight")]
    pub weight: i32,
    /// Target group overrides attached to the Service.
    #[serde(default)]
    pub target_group_config: Option<TargetGroupConfigurationSpec>,
}

impl ServiceBackend {
    /// Namespace and name of the Service.
    ///
    /// A Service without a namespace lives in the referencing route's
    /// namespace.
    #[must_use]
    pub fn service_name(&self, route_namespace: &str) -> NamespacedName {
        NamespacedName::new(
            self.service.metadata.namespace.as_deref().unwrap_or(route_namespace),
            self.service.metadata.name.as_deref().unwrap_or_default(),
        )
    }
}

/// A pre-existing target group referenced by name.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticTargetGroupBackend {
    /// Target group name.
    pub name: String,
    /// Relative weight.
    #[serde(default = "default_weight")]
    pub weight: i32,
}

/// Another Gateway's application load balancer, fronted by this one.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayBackend {
    /// The fronted Gateway.
    pub gateway: NamespacedName,
    /// Listener port on the fronted load balancer.
    pub port: i32,
    /// Relative weight.
    #[serde(default = "default_weight")]
    pub weight: i32,
}

/// A backend of a route rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Backend {
    /// Kubernetes Service.
    Service(ServiceBackend),
    /// Existing target group by name.
    TargetGroupName(StaticTargetGroupBackend),
    /// Another Gateway.
    Gateway(GatewayBackend),
}

impl Backend {
    /// Relative weight.
    #[must_use]
    pub const fn weight(&self) -> i32 {
        match self {
            Self::Service(b) => b.weight,
            Self::TargetGroupName(b) => b.weight,
            Self::Gateway(b) => b.weight,
        }
    }
}

/// One rule of a route, already matched against the listener.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRule {
    /// Listener rule conditions derived from the route matches.
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
    /// Backends.
    #[serde(default)]
    pub backends: Vec<Backend>,
    /// Redirect filter.
    #[serde(default)]
    pub redirect: Option<RedirectConfig>,
    /// Attached listener rule configuration.
    #[serde(default)]
    pub listener_rule_config: Option<ListenerRuleConfigurationSpec>,
}

/// Read-only view of a route attached to a Gateway.
pub trait RouteDescriptor: Send + Sync + fmt::Debug {
    /// Namespace and name of the route.
    fn route_namespaced_name(&self) -> NamespacedName;

    /// Route kind.
    fn route_kind(&self) -> RouteKind;

    /// Hostnames declared on the route.
    fn hostnames(&self) -> &[String];

    /// Hostnames compatible with the Gateway listener on each port.
    fn compatible_hostnames_by_port(&self) -> &BTreeMap<i32, Vec<String>>;

    /// Rules in declaration order.
    fn attached_rules(&self) -> &[RouteRule];

    /// All backends across rules.
    fn backends(&self) -> Vec<&Backend> {
        self.attached_rules()
            .iter()
            .flat_map(|rule| rule.backends.iter())
            .collect()
    }
}

/// A route loaded from JSON.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedRoute {
    /// Namespace.
    pub namespace: String,
    /// Name.
    pub name: String,
    /// Kind.
    pub kind: RouteKind,
    /// Declared hostnames.
    #[serde(default)]
    pub hostnames: Vec<String>,
    /// Compatible hostnames per listener port.
    #[serde(default)]
    pub compatible_hostnames_by_port: BTreeMap<i32, Vec<String>>,
    /// Rules.
    #[serde(default)]
    pub rules: Vec<RouteRule>,
}

impl RouteDescriptor for LoadedRoute {
    fn route_namespaced_name(&self) -> NamespacedName {
        NamespacedName::new(&self.namespace, &self.name)
    }

    fn route_kind(&self) -> RouteKind {
        self.kind
    }

    fn hostnames(&self) -> &[String] {
        &self.hostnames
    }

    fn compatible_hostnames_by_port(&self) -> &BTreeMap<i32, Vec<String>> {
        &self.compatible_hostnames_by_port
    }

    fn attached_rules(&self) -> &[RouteRule] {
        &self.rules
    }
}

/// A rule placed at a given precedence.
#[derive(Debug, Clone)]
pub struct RankedRule {
    /// Owning route.
    pub route: Arc<dyn RouteDescriptor>,
    /// The rule.
    pub rule: RouteRule,
}

/// Orders the rules of all routes on one listener port.
pub trait RulePrecedenceSorter: Send + Sync {
    /// Return the rules of `routes` in evaluation order.
    fn sort(&self, port: i32, routes: &[Arc<dyn RouteDescriptor>]) -> Vec<RankedRule>;
}

/// Keeps routes and their rules in the order given.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclarationOrder;

impl RulePrecedenceSorter for DeclarationOrder {
    fn sort(&self, _port: i32, routes: &[Arc<dyn RouteDescriptor>]) -> Vec<RankedRule> {
        routes
            .iter()
            .flat_map(|route| {
                route.attached_rules().iter().map(|rule| RankedRule {
                    route: Arc::clone(route),
                    rule: rule.clone(),
                })
            })
            .collect()
    }
}
