//! Compiles one Gateway into a stack.
//!
//! Subnets and security groups resolve first, then the load balancer, then
//! every port with attached routes gets a listener (and, for application load
//! balancers, its rules). Target groups are created on demand while building
//! listeners and rules.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use gateway_lb_core::{NamespacedName, StringToken};
use gateway_lb_model::crd::{Gateway, LoadBalancerConfigurationSpec};
use gateway_lb_model::{LoadBalancerType, Stack, TargetGroup};
use tracing::info;

use crate::config::BuilderConfig;
use crate::error::{BuildError, Result};
use crate::listener::{ListenerBuilder, ListenerContext};
use crate::loadbalancer::{build_load_balancer, effective_scheme_and_ip_type, LoadBalancerInput};
use crate::providers::Providers;
use crate::routes::{DeclarationOrder, RouteDescriptor, RulePrecedenceSorter};
use crate::rules::{RuleBuilder, RuleListener};
use crate::security_group::{SecurityGroupBuilder, SecurityGroupInput};
use crate::subnets::{ExistingLoadBalancer, SubnetBuilder, SubnetInput};
use crate::target_group::{DefaultTargetGroupBuilder, TargetGroupContext};
use crate::tgb_network::{NetworkingMode, TgbNetworkBuilder};

/// Everything needed to compile one Gateway.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// The Gateway.
    pub gateway: Gateway,
    /// Load balancer type implied by the Gateway's class.
    pub load_balancer_type: LoadBalancerType,
    /// Attached load balancer configuration.
    pub lb_config: Option<LoadBalancerConfigurationSpec>,
    /// Routes attached to each listener port.
    pub routes_by_port: BTreeMap<i32, Vec<Arc<dyn RouteDescriptor>>>,
    /// The currently deployed load balancer, if any.
    pub existing: Option<ExistingLoadBalancer>,
}

/// Result of a compilation.
#[derive(Debug)]
pub struct BuildOutput {
    /// The compiled resources.
    pub stack: Stack,
    /// Secrets read by authentication actions.
    pub secrets: BTreeSet<NamespacedName>,
    /// Target group name to deferred ARN, for every target group in the stack.
    pub target_group_arns_by_name: BTreeMap<String, StringToken>,
}

/// Compiles Gateways into stacks.
///
/// Holds no per-build state; concurrent builds share only the injected
/// collaborators.
#[derive(Clone)]
pub struct GatewayModelBuilder {
    config: Arc<BuilderConfig>,
    providers: Providers,
    sorter: Arc<dyn RulePrecedenceSorter>,
}

impl std::fmt::Debug for GatewayModelBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayModelBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GatewayModelBuilder {
    /// Create a builder that keeps rules in declaration order.
    #[must_use]
    pub fn new(config: BuilderConfig, providers: Providers) -> Self {
        Self {
            config: Arc::new(config),
            providers,
            sorter: Arc::new(DeclarationOrder),
        }
    }

    /// Use `sorter` to order listener rules.
    #[must_use]
    pub fn with_sorter(mut self, sorter: Arc<dyn RulePrecedenceSorter>) -> Self {
        self.sorter = sorter;
        self
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Compile a Gateway.
    ///
    /// # Errors
    ///
    /// Returns the first configuration or provider error; no partial stack
    /// is returned.
    pub async fn build(&self, request: BuildRequest) -> Result<BuildOutput> {
        let config = self.config.as_ref();
        let providers = &self.providers;
        let gateway = gateway_name(&request.gateway)?;
        let lb_config = request.lb_config.clone().unwrap_or_default();
        let lb_type = request.load_balancer_type;
        let (scheme, ip_address_type) = effective_scheme_and_ip_type(config, &lb_config);

        let mut stack = Stack::new(gateway.clone());

        let subnet_configs = lb_config.load_balancer_subnets.clone().unwrap_or_default();
        let subnets = SubnetBuilder::new(providers.subnets.as_ref())
            .build(SubnetInput {
                load_balancer_type: lb_type,
                scheme,
                ip_address_type,
                configs: &subnet_configs,
                selector: lb_config.load_balancer_subnets_selector.as_ref(),
                existing: request.existing.as_ref(),
            })
            .await?;

        let port_kinds: BTreeSet<_> = request
            .routes_by_port
            .iter()
            .flat_map(|(port, routes)| routes.iter().map(|r| (*port, r.route_kind())))
            .collect();
        let security_groups = SecurityGroupBuilder::new(
            config,
            providers.security_groups.as_ref(),
            providers.backend_security_groups.as_ref(),
        )
        .build(
            &mut stack,
            SecurityGroupInput {
                gateway: &gateway,
                load_balancer_type: lb_type,
                ip_address_type,
                lb_config: &lb_config,
                port_kinds: &port_kinds,
            },
        )
        .await?;

        let load_balancer_arn = build_load_balancer(
            config,
            &mut stack,
            LoadBalancerInput {
                gateway: &gateway,
                load_balancer_type: lb_type,
                scheme,
                ip_address_type,
                lb_config: &lb_config,
                subnet_mappings: subnets.mappings.clone(),
                security_groups: security_groups.security_group_tokens.clone(),
            },
        )?;

        let network = TgbNetworkBuilder::new(
            NetworkingMode::select(config, &security_groups),
            scheme,
            &config.vpc_id,
            &lb_config.source_ranges,
            &subnets,
            providers.vpc.as_ref(),
        );
        let targets = DefaultTargetGroupBuilder::new(
            config,
            TargetGroupContext {
                gateway: &gateway,
                load_balancer_type: lb_type,
                ip_address_type,
            },
            providers.target_groups.as_ref(),
            network,
        );
        let listeners = ListenerBuilder::new(
            config,
            providers.certificates.as_ref(),
            providers.trust_stores.as_ref(),
            ListenerContext {
                gateway: &gateway,
                gateway_spec: &request.gateway.spec,
                load_balancer_type: lb_type,
                load_balancer_arn: &load_balancer_arn,
                lb_config: &lb_config,
                local_zone_or_outpost: subnets.is_local_zone_or_outpost(),
            },
        );
        let rules = RuleBuilder::new(
            config,
            self.sorter.as_ref(),
            providers.secrets.as_ref(),
            &targets,
        );

        let mut secrets = BTreeSet::new();
        let mut listener_count = 0usize;
        for (port, routes) in &request.routes_by_port {
            let Some(listener) = listeners.build(&mut stack, *port, routes, &targets).await? else {
                continue;
            };
            listener_count += 1;
            if lb_type.is_application() {
                rules
                    .build(
                        &mut stack,
                        RuleListener {
                            port: *port,
                            protocol: listener.protocol,
                            arn: &listener.arn,
                        },
                        routes,
                        &mut secrets,
                    )
                    .await?;
            }
        }

        let target_group_arns_by_name: BTreeMap<String, StringToken> = stack
            .list::<TargetGroup>()
            .into_iter()
            .map(|tg| (tg.spec.name.clone(), tg.arn()))
            .collect();

        info!(
            gateway = %gateway,
            load_balancer_type = ?lb_type,
            listeners = listener_count,
            target_groups = target_group_arns_by_name.len(),
            resources = stack.len(),
            "compiled gateway"
        );
        Ok(BuildOutput {
            stack,
            secrets,
            target_group_arns_by_name,
        })
    }
}

fn gateway_name(gateway: &Gateway) -> Result<NamespacedName> {
    let name = match gateway.metadata.name.as_deref() {
        Some(name) if !name.is_empty() => name,
        _ => return Err(BuildError::config("gateway has no name")),
    };
    let namespace = gateway.metadata.namespace.as_deref().unwrap_or("default");
    Ok(NamespacedName::new(namespace, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Inventory, Subnet, ZoneType};
    use crate::routes::{Backend, LoadedRoute, RouteKind, RouteRule, ServiceBackend};
    use gateway_lb_model::crd::{
        GatewayListener, GatewaySpec, ListenerConfiguration, MutualAuthenticationConfig, SubnetConfiguration,
    };
    use gateway_lb_model::elbv2::MutualAuthenticationMode;
    use gateway_lb_model::elbv2::RuleCondition;
    use gateway_lb_model::{
        Listener, ListenerRule, LoadBalancer, NetworkingPeer, Scheme, SecurityGroup, TargetGroupBinding,
    };
    use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

    fn subnet(id: &str, az: &str, cidr: &str) -> Subnet {
        Subnet {
            id: id.into(),
            availability_zone: az.into(),
            zone_type: ZoneType::AvailabilityZone,
            ipv4_cidr: Some(cidr.parse().unwrap()),
            ipv6_cidr: None,
            tags: BTreeMap::from([
                ("kubernetes.io/role/elb".to_string(), "1".to_string()),
                ("kubernetes.io/role/internal-elb".to_string(), "1".to_string()),
            ]),
        }
    }

    fn inventory() -> Arc<Inventory> {
        Arc::new(
            Inventory::new()
                .with_subnet(subnet("subnet-b", "us-east-1b", "10.0.2.0/24"))
                .with_subnet(subnet("subnet-a", "us-east-1a", "10.0.1.0/24"))
                .with_backend_security_group("sg-backend")
                .with_certificate("arn:cert/shop", &["shop.example.com"]),
        )
    }

    fn gateway(listeners: Vec<GatewayListener>) -> Gateway {
        let mut gw = Gateway::new(
            "public",
            GatewaySpec {
                gateway_class_name: "aws".into(),
                listeners,
            },
        );
        gw.metadata.namespace = Some("shop".into());
        gw
    }

    fn listener(name: &str, port: i32, protocol: &str) -> GatewayListener {
        GatewayListener {
            name: name.into(),
            hostname: None,
            port,
            protocol: protocol.into(),
        }
    }

    fn service_backend() -> Backend {
        Backend::Service(ServiceBackend {
            service: Service {
                metadata: ObjectMeta {
                    name: Some("cart".into()),
                    namespace: Some("shop".into()),
                    ..Default::default()
                },
                spec: Some(ServiceSpec {
                    ports: Some(vec![ServicePort {
                        port: 80,
                        node_port: Some(30080),
                        target_port: Some(IntOrString::Int(8080)),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
                ..Default::default()
            },
            port: 80,
            weight: 1,
            target_group_config: None,
        })
    }

    fn http_route(kind: RouteKind, rules: Vec<RouteRule>) -> Arc<dyn RouteDescriptor> {
        Arc::new(LoadedRoute {
            namespace: "shop".into(),
            name: "cart".into(),
            kind,
            hostnames: vec!["shop.example.com".into()],
            compatible_hostnames_by_port: BTreeMap::new(),
            rules,
        })
    }

    #[tokio::test]
    async fn application_gateway_end_to_end() {
        let inventory = inventory();
        let builder = GatewayModelBuilder::new(
            BuilderConfig::new("prod", "vpc-1"),
            Providers::from_inventory(Arc::clone(&inventory)),
        );
        let rule = |path: &str| RouteRule {
            conditions: vec![RuleCondition::PathPattern {
                values: vec![path.to_string()],
            }],
            backends: vec![service_backend()],
            ..Default::default()
        };
        let route = http_route(RouteKind::Http, vec![rule("/cart"), rule("/checkout")]);
        let request = BuildRequest {
            gateway: gateway(vec![listener("http", 80, "HTTP"), listener("https", 443, "HTTPS")]),
            load_balancer_type: LoadBalancerType::Application,
            lb_config: None,
            routes_by_port: BTreeMap::from([(80, vec![Arc::clone(&route)]), (443, vec![route]), (8080, Vec::new())]),
            existing: None,
        };

        let output = builder.build(request).await.unwrap();
        let stack = &output.stack;
        assert_eq!(stack.id(), &NamespacedName::new("shop", "public"));

        let lb = stack.get_as::<LoadBalancer>("LoadBalancer").unwrap();
        let subnet_ids: Vec<_> = lb.spec.subnet_mappings.iter().map(|m| m.subnet_id.as_str()).collect();
        assert_eq!(subnet_ids, vec!["subnet-a", "subnet-b"]);
        assert_eq!(lb.spec.scheme, Scheme::Internal);
        assert_eq!(lb.spec.security_groups.len(), 2);

        assert_eq!(stack.list::<SecurityGroup>().len(), 1);
        assert_eq!(stack.list::<Listener>().len(), 2);
        assert!(stack.get_as::<Listener>("8080").is_none());
        assert_eq!(stack.list::<ListenerRule>().len(), 4);

        // every rule forwards to the same (route, service, port) target group
        assert_eq!(stack.list::<TargetGroup>().len(), 1);
        assert_eq!(stack.list::<TargetGroupBinding>().len(), 1);
        assert_eq!(output.target_group_arns_by_name.len(), 1);
        assert!(output.secrets.is_empty());

        let https = stack.get_as::<Listener>("443").unwrap();
        assert_eq!(https.spec.certificates[0].certificate_arn, "arn:cert/shop");
        assert_eq!(https.spec.load_balancer_arn, lb.arn());
    }

    #[tokio::test]
    async fn zero_security_group_network_gateway() {
        let inventory = inventory();
        let builder = GatewayModelBuilder::new(
            BuilderConfig::new("prod", "vpc-1"),
            Providers::from_inventory(Arc::clone(&inventory)),
        );
        let route = http_route(
            RouteKind::Tcp,
            vec![RouteRule {
                backends: vec![service_backend()],
                ..Default::default()
            }],
        );
        let request = BuildRequest {
            gateway: gateway(vec![listener("tcp", 80, "TCP")]),
            load_balancer_type: LoadBalancerType::Network,
            lb_config: Some(LoadBalancerConfigurationSpec {
                scheme: Some(Scheme::InternetFacing),
                disable_security_group: true,
                ..Default::default()
            }),
            routes_by_port: BTreeMap::from([(80, vec![route])]),
            existing: None,
        };

        let output = builder.build(request).await.unwrap();
        let stack = &output.stack;
        assert!(stack.list::<SecurityGroup>().is_empty());
        assert!(stack.list::<ListenerRule>().is_empty());
        assert!(stack
            .get_as::<LoadBalancer>("LoadBalancer")
            .unwrap()
            .spec
            .security_groups
            .is_empty());

        let binding = stack.list::<TargetGroupBinding>()[0];
        let ingress = &binding.spec.networking.as_ref().unwrap().ingress;
        assert_eq!(ingress.len(), 1);
        assert_eq!(
            ingress[0].from,
            vec![NetworkingPeer::IpBlock {
                cidr: "0.0.0.0/0".into()
            }]
        );
    }

    #[tokio::test]
    async fn local_zone_subnets_disable_mutual_tls() {
        let mut local = subnet("subnet-lz", "us-east-1-bos-1a", "10.0.3.0/24");
        local.zone_type = ZoneType::LocalZone;
        let inventory = Arc::new(
            Inventory::new()
                .with_subnet(subnet("subnet-a", "us-east-1a", "10.0.1.0/24"))
                .with_subnet(local)
                .with_backend_security_group("sg-backend")
                .with_trust_store("corp", "arn:truststore/corp"),
        );
        let builder = GatewayModelBuilder::new(
            BuilderConfig::new("prod", "vpc-1"),
            Providers::from_inventory(inventory),
        );
        let subnet_ref = |id: &str| SubnetConfiguration {
            identifier: Some(id.to_string()),
            ..Default::default()
        };
        let request = BuildRequest {
            gateway: gateway(vec![listener("https", 443, "HTTPS")]),
            load_balancer_type: LoadBalancerType::Application,
            lb_config: Some(LoadBalancerConfigurationSpec {
                load_balancer_subnets: Some(vec![subnet_ref("subnet-a"), subnet_ref("subnet-lz")]),
                listener_configurations: vec![ListenerConfiguration {
                    protocol_port: "HTTPS:443".into(),
                    default_certificate: Some("arn:cert/shop".into()),
                    mutual_authentication: Some(MutualAuthenticationConfig {
                        mode: MutualAuthenticationMode::Verify,
                        trust_store: Some("corp".into()),
                        ignore_client_certificate_expiry: None,
                        advertise_trust_store_ca_names: None,
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            routes_by_port: BTreeMap::from([(443, vec![http_route(RouteKind::Http, vec![RouteRule::default()])])]),
            existing: None,
        };

        let output = builder.build(request).await.unwrap();
        let https = output.stack.get_as::<Listener>("443").unwrap();
        assert_eq!(https.spec.certificates[0].certificate_arn, "arn:cert/shop");
        assert!(https.spec.mutual_authentication.is_none());
    }

    #[tokio::test]
    async fn errors_leave_no_output() {
        let inventory = inventory();
        let builder = GatewayModelBuilder::new(
            BuilderConfig::default(),
            Providers::from_inventory(inventory),
        );
        let request = BuildRequest {
            gateway: gateway(vec![listener("http", 80, "HTTP")]),
            load_balancer_type: LoadBalancerType::Application,
            lb_config: None,
            // no gateway listener on 81
            routes_by_port: BTreeMap::from([(81, vec![http_route(RouteKind::Http, vec![RouteRule::default()])])]),
            existing: None,
        };
        let err = builder.build(request).await.unwrap_err();
        assert!(err.is_configuration_error());
        assert!(!err.is_retriable());
    }
}
