//! Target groups and their target group bindings.
//!
//! One target group exists per distinct (gateway, route, route kind, service,
//! port). Later references to the same tuple reuse the stack entry, so callers
//! can invoke [`TargetGroupBuilder::build_target_group`] once per backend
//! occurrence without tracking what was built.

use std::collections::BTreeMap;

use async_trait::async_trait;
use gateway_lb_core::{NamespacedName, StringToken};
use gateway_lb_model::binding::{BindingTemplate, ServiceReference};
use gateway_lb_model::crd::HealthCheckConfiguration;
use gateway_lb_model::elbv2::{
    HealthCheckConfig, HealthCheckMatcher, ProtocolVersion, TargetGroupIpAddressType,
};
use gateway_lb_model::{
    IpAddressType, LoadBalancerType, Protocol, Stack, TargetGroup, TargetGroupBinding,
    TargetGroupBindingSpec, TargetGroupSpec, TargetType,
};
use k8s_openapi::api::core::v1::ServicePort;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use tracing::debug;

use crate::config::BuilderConfig;
use crate::error::{BuildError, ProviderContext, Result};
use crate::naming::hashed_name;
use crate::providers::TargetGroupArnResolver;
use crate::routes::{Backend, GatewayBackend, RouteDescriptor, RouteKind, ServiceBackend};
use crate::tags::TagHelper;
use crate::tgb_network::{TgbNetworkBuilder, TgbNetworkInput, TRAFFIC_PORT};

/// Label carrying the owning Gateway's namespace on bindings.
pub const STACK_NAMESPACE_LABEL: &str = "gateway.k8s.aws/stack-namespace";
/// Label carrying the owning Gateway's name on bindings.
pub const STACK_NAME_LABEL: &str = "gateway.k8s.aws/stack-name";

const GRPC_HEALTH_CHECK_PATH: &str = "/AWS.ALB/healthcheck";
const LOCAL_POLICY_HEALTH_CHECK_PATH: &str = "/healthz";

/// Health check thresholds: interval, timeout, healthy, unhealthy.
const DEFAULT_THRESHOLDS: (i32, i32, i32, i32) = (15, 5, 3, 3);
const LOCAL_POLICY_THRESHOLDS: (i32, i32, i32, i32) = (10, 6, 2, 2);

/// Builds (or reuses) the target group for one backend of a route.
#[async_trait]
pub trait TargetGroupBuilder: Send + Sync {
    /// Return the ARN token of the backend's target group, adding the target
    /// group and its binding to `stack` the first time the tuple is seen.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unsupported backend settings and a
    /// provider error when a lookup fails.
    async fn build_target_group(
        &self,
        stack: &mut Stack,
        route: &dyn RouteDescriptor,
        backend: &Backend,
    ) -> Result<StringToken>;
}

/// Gateway-wide inputs of target group construction.
#[derive(Debug, Clone, Copy)]
pub struct TargetGroupContext<'a> {
    /// Owning Gateway.
    pub gateway: &'a NamespacedName,
    /// Load balancer type.
    pub load_balancer_type: LoadBalancerType,
    /// Load balancer IP address type.
    pub ip_address_type: IpAddressType,
}

/// The stock [`TargetGroupBuilder`].
pub struct DefaultTargetGroupBuilder<'a> {
    config: &'a BuilderConfig,
    context: TargetGroupContext<'a>,
    arns: &'a dyn TargetGroupArnResolver,
    network: TgbNetworkBuilder<'a>,
}

impl<'a> DefaultTargetGroupBuilder<'a> {
    /// Create a builder.
    #[must_use]
    pub fn new(
        config: &'a BuilderConfig,
        context: TargetGroupContext<'a>,
        arns: &'a dyn TargetGroupArnResolver,
        network: TgbNetworkBuilder<'a>,
    ) -> Self {
        Self {
            config,
            context,
            arns,
            network,
        }
    }

    fn is_application(&self) -> bool {
        self.context.load_balancer_type.is_application()
    }

    async fn service_target_group(
        &self,
        stack: &mut Stack,
        route: &dyn RouteDescriptor,
        backend: &ServiceBackend,
    ) -> Result<StringToken> {
        let route_nn = route.route_namespaced_name();
        let kind = route.route_kind();
        let svc = backend.service_name(&route_nn.namespace);
        let id = format!(
            "{}:{}:{}-{}:{}:{}",
            self.context.gateway,
            route_nn,
            kind.short(),
            svc.namespace,
            svc.name,
            backend.port
        );
        if let Some(existing) = stack.get_as::<TargetGroup>(&id) {
            return Ok(existing.arn());
        }

        let props = backend
            .target_group_config
            .as_ref()
            .map(|cfg| cfg.props_for_route(kind.as_str(), &route_nn.namespace, &route_nn.name))
            .unwrap_or_default();

        let target_type = props.target_type.unwrap_or(self.config.default_target_type);
        if target_type == TargetType::Alb {
            return Err(BuildError::config(format!(
                "target type alb is not supported for service {svc}"
            )));
        }

        let spec = backend.service.spec.clone().unwrap_or_default();
        let ports = spec.ports.clone().unwrap_or_default();
        let service_port = ports
            .iter()
            .find(|p| p.port == backend.port)
            .ok_or_else(|| BuildError::config(format!("service {svc} has no port {}", backend.port)))?;

        let ip_address_type = props.ip_address_type.unwrap_or_else(|| {
            let primary_v6 = spec
                .ip_families
                .as_ref()
                .and_then(|families| families.first())
                .is_some_and(|family| family == "IPv6");
            if primary_v6 && self.context.ip_address_type.supports_ipv6() {
                TargetGroupIpAddressType::Ipv6
            } else {
                TargetGroupIpAddressType::Ipv4
            }
        });
        if ip_address_type == TargetGroupIpAddressType::Ipv6 && target_type == TargetType::Instance {
            return Err(BuildError::config(format!(
                "service {svc}: IPv6 target groups require ip targets"
            )));
        }

        let protocol = self.target_protocol(kind, props.protocol)?;
        let protocol_version = self.is_application().then(|| {
            props.protocol_version.unwrap_or(if kind == RouteKind::Grpc {
                ProtocolVersion::Grpc
            } else {
                ProtocolVersion::Http1
            })
        });

        let (tg_port, binding_port) = target_ports(&svc, service_port, target_type)?;

        let local_policy = !self.is_application()
            && target_type == TargetType::Instance
            && spec.external_traffic_policy.as_deref() == Some("Local");
        let health_check = HealthCheckSettings {
            application: self.is_application(),
            grpc: kind == RouteKind::Grpc,
            local_policy,
            target_protocol: protocol,
            target_type,
            health_check_node_port: spec.health_check_node_port,
        }
        .resolve(props.health_check_config.as_ref(), &svc, &ports)?;

        let target_type_str = target_type.as_str();
        let port_str = backend.port.to_string();
        let version_str = protocol_version.map_or("", ProtocolVersion::as_str);
        let name = props.target_group_name.clone().unwrap_or_else(|| {
            hashed_name(
                &svc.namespace,
                &svc.name,
                &[
                    &self.config.cluster_name,
                    &self.context.gateway.to_string(),
                    &route_nn.to_string(),
                    kind.as_str(),
                    &svc.to_string(),
                    &port_str,
                    target_type_str,
                    protocol.as_str(),
                    version_str,
                ],
            )
        });
        debug!(
            gateway = %self.context.gateway,
            route = %route_nn,
            target_group = %name,
            protocol = %protocol,
            target_type = target_type_str,
            "building target group"
        );

        let tags = TagHelper::new(self.config).resolve(props.tags.as_ref())?;
        let attributes = props.target_group_attributes.clone().unwrap_or_default();
        let networking = self
            .network
            .build(&TgbNetworkInput {
                protocol,
                target_type,
                target_port: binding_port,
                health_check_port: health_check.port.clone(),
                attributes: &attributes,
                ip_address_type,
            })
            .await?;

        let target_group = TargetGroup::new(
            id.clone(),
            TargetGroupSpec {
                name: name.clone(),
                target_type,
                port: tg_port,
                protocol,
                protocol_version,
                ip_address_type,
                health_check_config: health_check,
                target_group_attributes: attributes,
                tags,
            },
        );
        let arn = target_group.arn();
        stack.add(target_group)?;

        let binding = TargetGroupBinding::new(
            id,
            TargetGroupBindingSpec {
                template: BindingTemplate {
                    name: name.clone(),
                    namespace: svc.namespace.clone(),
                    labels: stack_labels(self.context.gateway),
                },
                target_group_arn: arn.clone(),
                target_group_name: name,
                target_type,
                service_ref: ServiceReference {
                    name: svc.name.clone(),
                    port: IntOrString::Int(backend.port),
                },
                networking,
                node_selector: if target_type == TargetType::Instance {
                    props.node_selector.clone()
                } else {
                    None
                },
                ip_address_type,
                vpc_id: self.config.vpc_id.clone(),
                multi_cluster_target_group: props.enable_multi_cluster.unwrap_or(false),
            },
        );
        stack.add(binding)?;
        Ok(arn)
    }

    fn target_protocol(&self, kind: RouteKind, requested: Option<Protocol>) -> Result<Protocol> {
        if let Some(protocol) = requested {
            let allowed: &[Protocol] = if self.is_application() {
                &[Protocol::Http, Protocol::Https]
            } else {
                &[Protocol::Tcp, Protocol::Tls, Protocol::Udp, Protocol::TcpUdp]
            };
            if !allowed.contains(&protocol) {
                return Err(BuildError::config(format!(
                    "target group protocol {protocol} is not supported for {:?} load balancers",
                    self.context.load_balancer_type
                )));
            }
            return Ok(protocol);
        }
        Ok(match kind {
            RouteKind::Tcp => Protocol::Tcp,
            RouteKind::Udp => Protocol::Udp,
            RouteKind::Http | RouteKind::Grpc => Protocol::Http,
            RouteKind::Tls if self.is_application() => Protocol::Https,
            RouteKind::Tls => Protocol::Tls,
        })
    }

    fn gateway_target_group(
        &self,
        stack: &mut Stack,
        route: &dyn RouteDescriptor,
        backend: &GatewayBackend,
    ) -> Result<StringToken> {
        if self.is_application() {
            return Err(BuildError::config(format!(
                "gateway backend {} is only supported on network load balancers",
                backend.gateway
            )));
        }
        let route_nn = route.route_namespaced_name();
        let kind = route.route_kind();
        let id = format!(
            "{}:{}:{}-gateway-{}:{}:{}",
            self.context.gateway,
            route_nn,
            kind.short(),
            backend.gateway.namespace,
            backend.gateway.name,
            backend.port
        );
        if let Some(existing) = stack.get_as::<TargetGroup>(&id) {
            return Ok(existing.arn());
        }

        let port_str = backend.port.to_string();
        let name = hashed_name(
            &backend.gateway.namespace,
            &backend.gateway.name,
            &[
                &self.config.cluster_name,
                &self.context.gateway.to_string(),
                &route_nn.to_string(),
                kind.as_str(),
                &backend.gateway.to_string(),
                &port_str,
                TargetType::Alb.as_str(),
                Protocol::Tcp.as_str(),
            ],
        );
        let (interval, timeout, healthy, unhealthy) = DEFAULT_THRESHOLDS;
        let target_group = TargetGroup::new(
            id,
            TargetGroupSpec {
                name,
                target_type: TargetType::Alb,
                port: backend.port,
                protocol: Protocol::Tcp,
                protocol_version: None,
                ip_address_type: TargetGroupIpAddressType::Ipv4,
                health_check_config: HealthCheckConfig {
                    port: IntOrString::String(TRAFFIC_PORT.to_string()),
                    protocol: Protocol::Http,
                    path: Some("/".to_string()),
                    matcher: Some(HealthCheckMatcher::HttpCode("200-399".to_string())),
                    interval_seconds: interval,
                    timeout_seconds: timeout,
                    healthy_threshold_count: healthy,
                    unhealthy_threshold_count: unhealthy,
                },
                target_group_attributes: Vec::new(),
                tags: TagHelper::new(self.config).resolve(None)?,
            },
        );
        let arn = target_group.arn();
        stack.add(target_group)?;
        Ok(arn)
    }
}

#[async_trait]
impl TargetGroupBuilder for DefaultTargetGroupBuilder<'_> {
    async fn build_target_group(
        &self,
        stack: &mut Stack,
        route: &dyn RouteDescriptor,
        backend: &Backend,
    ) -> Result<StringToken> {
        match backend {
            Backend::Service(svc) => self.service_target_group(stack, route, svc).await,
            Backend::TargetGroupName(tg) => {
                let arn = self
                    .arns
                    .target_group_arn(&tg.name)
                    .await
                    .context(|| format!("resolving target group {}", tg.name))?;
                Ok(StringToken::Literal(arn))
            }
            Backend::Gateway(gw) => self.gateway_target_group(stack, route, gw),
        }
    }
}

fn stack_labels(gateway: &NamespacedName) -> BTreeMap<String, String> {
    BTreeMap::from([
        (STACK_NAMESPACE_LABEL.to_string(), gateway.namespace.clone()),
        (STACK_NAME_LABEL.to_string(), gateway.name.clone()),
    ])
}

/// Target group port and the port bindings open on targets.
fn target_ports(
    svc: &NamespacedName,
    service_port: &ServicePort,
    target_type: TargetType,
) -> Result<(i32, IntOrString)> {
    match target_type {
        TargetType::Instance => {
            let node_port = service_port.node_port.ok_or_else(|| {
                BuildError::config(format!(
                    "service {svc} port {} has no node port; use ip targets",
                    service_port.port
                ))
            })?;
            Ok((node_port, IntOrString::Int(node_port)))
        }
        _ => match &service_port.target_port {
            Some(IntOrString::Int(port)) => Ok((*port, IntOrString::Int(*port))),
            // named pod ports are resolved per endpoint
            Some(named @ IntOrString::String(_)) => Ok((1, named.clone())),
            None => Ok((service_port.port, IntOrString::Int(service_port.port))),
        },
    }
}

struct HealthCheckSettings {
    application: bool,
    grpc: bool,
    local_policy: bool,
    target_protocol: Protocol,
    target_type: TargetType,
    health_check_node_port: Option<i32>,
}

impl HealthCheckSettings {
    fn resolve(
        &self,
        overrides: Option<&HealthCheckConfiguration>,
        svc: &NamespacedName,
        ports: &[ServicePort],
    ) -> Result<HealthCheckConfig> {
        let overrides = overrides.cloned().unwrap_or_default();

        let port = match overrides.health_check_port.as_deref() {
            None if self.local_policy => self
                .health_check_node_port
                .map_or_else(|| IntOrString::String(TRAFFIC_PORT.to_string()), IntOrString::Int),
            None | Some(TRAFFIC_PORT) => IntOrString::String(TRAFFIC_PORT.to_string()),
            Some(raw) => match raw.parse::<i32>() {
                Ok(number) => IntOrString::Int(number),
                Err(_) => self.named_port(raw, svc, ports)?,
            },
        };

        let protocol = overrides.health_check_protocol.unwrap_or(if self.application {
            self.target_protocol
        } else if self.local_policy {
            Protocol::Http
        } else {
            Protocol::Tcp
        });

        let http = matches!(protocol, Protocol::Http | Protocol::Https);
        let path = overrides.health_check_path.clone().or_else(|| {
            http.then(|| {
                if self.application && self.grpc {
                    GRPC_HEALTH_CHECK_PATH
                } else if self.local_policy {
                    LOCAL_POLICY_HEALTH_CHECK_PATH
                } else {
                    "/"
                }
                .to_string()
            })
        });

        let matcher = match overrides.matcher {
            Some(m) => m
                .grpc_code
                .map(HealthCheckMatcher::GrpcCode)
                .or_else(|| m.http_code.map(HealthCheckMatcher::HttpCode)),
            None if self.application && self.grpc => Some(HealthCheckMatcher::GrpcCode("12".to_string())),
            None if http => Some(HealthCheckMatcher::HttpCode("200-399".to_string())),
            None => None,
        };

        let (interval, timeout, healthy, unhealthy) = if self.local_policy {
            LOCAL_POLICY_THRESHOLDS
        } else {
            DEFAULT_THRESHOLDS
        };
        Ok(HealthCheckConfig {
            port,
            protocol,
            path,
            matcher,
            interval_seconds: overrides.health_check_interval.unwrap_or(interval),
            timeout_seconds: overrides.health_check_timeout.unwrap_or(timeout),
            healthy_threshold_count: overrides.healthy_threshold_count.unwrap_or(healthy),
            unhealthy_threshold_count: overrides.unhealthy_threshold_count.unwrap_or(unhealthy),
        })
    }

    fn named_port(&self, name: &str, svc: &NamespacedName, ports: &[ServicePort]) -> Result<IntOrString> {
        let port = ports
            .iter()
            .find(|p| p.name.as_deref() == Some(name))
            .ok_or_else(|| BuildError::config(format!("service {svc} has no port named {name:?}")))?;
        match self.target_type {
            TargetType::Instance => port.node_port.map(IntOrString::Int).ok_or_else(|| {
                BuildError::config(format!("service {svc} port {name:?} has no node port"))
            }),
            _ => match &port.target_port {
                Some(IntOrString::Int(number)) => Ok(IntOrString::Int(*number)),
                None => Ok(IntOrString::Int(port.port)),
                Some(IntOrString::String(_)) => Err(BuildError::config(format!(
                    "health check port {name:?} of service {svc} maps to a named target port"
                ))),
            },
        }
    }
}
