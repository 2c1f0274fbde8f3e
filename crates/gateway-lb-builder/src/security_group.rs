//! Load balancer and backend security groups.

use std::collections::BTreeSet;

use gateway_lb_core::{NamespacedName, StringToken};
use gateway_lb_model::crd::LoadBalancerConfigurationSpec;
use gateway_lb_model::{IpAddressType, IpPermission, LoadBalancerType, SecurityGroup, SecurityGroupSpec, Stack};
use ipnet::IpNet;
use tracing::debug;

use crate::config::BuilderConfig;
use crate::error::{BuildError, ProviderContext, Result};
use crate::naming::hashed_name;
use crate::providers::{BackendSecurityGroupProvider, SecurityGroupResolver};
use crate::routes::RouteKind;
use crate::tags::TagHelper;

/// Logical ID of the managed load balancer security group.
pub const MANAGED_SECURITY_GROUP_ID: &str = "ManagedLBSecurityGroup";

/// Owner type passed to the backend security group provider.
pub const BACKEND_SG_OWNER_TYPE: &str = "gateway";

const IPV4_ANY: &str = "0.0.0.0/0";
const IPV6_ANY: &str = "::/0";

// Path MTU discovery: destination unreachable / fragmentation needed (v4),
// packet too big (v6).
const ICMPV4_FRAG_NEEDED: (i32, i32) = (3, 4);
const ICMPV6_PACKET_TOO_BIG: (i32, i32) = (2, 0);

/// Security groups resolved for one Gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityGroupOutput {
    /// Groups attached to the load balancer.
    pub security_group_tokens: Vec<StringToken>,
    /// The backend group targets allow traffic from.
    pub backend_security_group_token: Option<StringToken>,
    /// Whether the backend group came from the provider.
    pub backend_security_group_allocated: bool,
}

impl SecurityGroupOutput {
    /// Whether the load balancer runs without security groups.
    #[must_use]
    pub fn is_zero_security_group(&self) -> bool {
        self.security_group_tokens.is_empty()
    }
}

/// Inputs of security group resolution.
#[derive(Debug, Clone, Copy)]
pub struct SecurityGroupInput<'a> {
    /// Owning Gateway.
    pub gateway: &'a NamespacedName,
    /// Load balancer type.
    pub load_balancer_type: LoadBalancerType,
    /// Load balancer IP address type.
    pub ip_address_type: IpAddressType,
    /// Load balancer configuration.
    pub lb_config: &'a LoadBalancerConfigurationSpec,
    /// Every (listener port, route kind) with an attached route.
    pub port_kinds: &'a BTreeSet<(i32, RouteKind)>,
}

/// Resolves or allocates security groups.
pub struct SecurityGroupBuilder<'a> {
    config: &'a BuilderConfig,
    resolver: &'a dyn SecurityGroupResolver,
    backend: &'a dyn BackendSecurityGroupProvider,
}

impl<'a> SecurityGroupBuilder<'a> {
    /// Create a builder.
    #[must_use]
    pub fn new(
        config: &'a BuilderConfig,
        resolver: &'a dyn SecurityGroupResolver,
        backend: &'a dyn BackendSecurityGroupProvider,
    ) -> Self {
        Self {
            config,
            resolver,
            backend,
        }
    }

    /// Resolve the load balancer's groups and the backend group.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unsupported combinations and a
    /// provider error when a lookup fails.
    pub async fn build(&self, stack: &mut Stack, input: SecurityGroupInput<'_>) -> Result<SecurityGroupOutput> {
        let cfg = input.lb_config;

        if cfg.disable_security_group {
            if input.load_balancer_type != LoadBalancerType::Network {
                return Err(BuildError::config(
                    "disableSecurityGroup is only supported for network load balancers",
                ));
            }
            debug!(gateway = %input.gateway, "load balancer runs without security groups");
            return Ok(SecurityGroupOutput::default());
        }

        if !cfg.security_groups.is_empty() {
            let ids = self
                .resolver
                .resolve_names_or_ids(&cfg.security_groups)
                .await
                .context(|| format!("resolving security groups {:?}", cfg.security_groups))?;
            let security_group_tokens = ids.into_iter().map(StringToken::Literal).collect();

            if !cfg.manage_backend_security_group_rules {
                return Ok(SecurityGroupOutput {
                    security_group_tokens,
                    backend_security_group_token: None,
                    backend_security_group_allocated: false,
                });
            }
            if !self.config.enable_backend_security_group {
                return Err(BuildError::config(
                    "manageBackendSecurityGroupRules requires the backend security group feature",
                ));
            }
            let backend = self.backend_token(input.gateway).await?;
            return Ok(SecurityGroupOutput {
                security_group_tokens,
                backend_security_group_token: Some(backend),
                backend_security_group_allocated: true,
            });
        }

        let managed = self.managed_security_group(input)?;
        let mut security_group_tokens = vec![managed.group_id()];
        stack.add(managed)?;

        let mut output = SecurityGroupOutput::default();
        if self.config.enable_backend_security_group {
            let backend = self.backend_token(input.gateway).await?;
            security_group_tokens.push(backend.clone());
            output.backend_security_group_token = Some(backend);
            output.backend_security_group_allocated = true;
        }
        output.security_group_tokens = security_group_tokens;
        Ok(output)
    }

    async fn backend_token(&self, gateway: &NamespacedName) -> Result<StringToken> {
        let id = self
            .backend
            .backend_security_group(BACKEND_SG_OWNER_TYPE, std::slice::from_ref(gateway))
            .await
            .context(|| format!("allocating backend security group for {gateway}"))?;
        Ok(StringToken::Literal(id))
    }

    fn managed_security_group(&self, input: SecurityGroupInput<'_>) -> Result<SecurityGroup> {
        let gw = input.gateway;
        let tags = TagHelper::new(self.config).resolve(input.lb_config.tags.as_ref())?;
        Ok(SecurityGroup::new(
            MANAGED_SECURITY_GROUP_ID,
            SecurityGroupSpec {
                group_name: hashed_name(
                    &gw.namespace,
                    &gw.name,
                    &[&self.config.cluster_name, &gw.namespace, &gw.name],
                ),
                description: "[k8s] Managed SecurityGroup for LoadBalancer".to_string(),
                tags,
                ingress: ingress_permissions(input)?,
            },
        ))
    }
}

/// Ingress permissions for the managed load balancer security group.
///
/// One permission per distinct (protocol, port) and source; IPv6 sources only
/// when the load balancer supports IPv6.
///
/// # Errors
///
/// Returns a configuration error for malformed source ranges.
pub fn ingress_permissions(input: SecurityGroupInput<'_>) -> Result<Vec<IpPermission>> {
    let cfg = input.lb_config;
    let mut v4 = Vec::new();
    let mut v6 = Vec::new();
    for raw in &cfg.source_ranges {
        match raw.parse::<IpNet>() {
            Ok(IpNet::V4(net)) => v4.push(net.to_string()),
            Ok(IpNet::V6(net)) => v6.push(net.to_string()),
            Err(_) => {
                return Err(BuildError::config(format!("invalid source range {raw:?}")));
            }
        }
    }
    if cfg.source_ranges.is_empty() && cfg.security_group_prefixes.is_empty() {
        v4.push(IPV4_ANY.to_string());
        v6.push(IPV6_ANY.to_string());
    }
    if !input.ip_address_type.supports_ipv6() {
        v6.clear();
    }

    let pairs: BTreeSet<(&str, i32)> = input
        .port_kinds
        .iter()
        .map(|(port, kind)| (if kind.is_udp() { "udp" } else { "tcp" }, *port))
        .collect();

    let mut permissions = BTreeSet::new();
    for (protocol, port) in &pairs {
        for cidr in &v4 {
            permissions.insert(IpPermission::ipv4(protocol, *port, *port, cidr));
        }
        for cidr in &v6 {
            permissions.insert(IpPermission::ipv6(protocol, *port, *port, cidr));
        }
        for prefix in &cfg.security_group_prefixes {
            permissions.insert(IpPermission::prefix_list(protocol, *port, *port, prefix));
        }
    }

    if cfg.enable_icmp && pairs.iter().any(|(protocol, _)| *protocol == "udp") {
        let (v4_type, v4_code) = ICMPV4_FRAG_NEEDED;
        let (v6_type, v6_code) = ICMPV6_PACKET_TOO_BIG;
        for cidr in &v4 {
            permissions.insert(IpPermission::ipv4("icmp", v4_type, v4_code, cidr));
        }
        for cidr in &v6 {
            permissions.insert(IpPermission::ipv6("icmpv6", v6_type, v6_code, cidr));
        }
    }

    Ok(permissions.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Inventory;

    fn gw() -> NamespacedName {
        NamespacedName::new("default", "edge")
    }

    fn input<'a>(
        gateway: &'a NamespacedName,
        cfg: &'a LoadBalancerConfigurationSpec,
        port_kinds: &'a BTreeSet<(i32, RouteKind)>,
    ) -> SecurityGroupInput<'a> {
        SecurityGroupInput {
            gateway,
            load_balancer_type: LoadBalancerType::Network,
            ip_address_type: IpAddressType::Ipv4,
            lb_config: cfg,
            port_kinds,
        }
    }

    #[test]
    fn duplicate_protocol_ports_collapse() {
        let gateway = gw();
        let cfg = LoadBalancerConfigurationSpec::default();
        let kinds: BTreeSet<_> = [(443, RouteKind::Http), (443, RouteKind::Grpc), (443, RouteKind::Tls)].into();
        let perms = ingress_permissions(input(&gateway, &cfg, &kinds)).unwrap();
        assert_eq!(perms, vec![IpPermission::ipv4("tcp", 443, 443, IPV4_ANY)]);
    }

    #[test]
    fn sources_by_family_and_icmp() {
        let gateway = gw();
        let cfg = LoadBalancerConfigurationSpec {
            source_ranges: vec!["10.0.0.0/8".into(), "2001:db8::/32".into()],
            security_group_prefixes: vec!["pl-123".into()],
            enable_icmp: true,
            ..Default::default()
        };
        let kinds: BTreeSet<_> = [(53, RouteKind::Udp)].into();
        let mut sg_input = input(&gateway, &cfg, &kinds);

        let perms = ingress_permissions(sg_input).unwrap();
        // ipv6 source dropped for an ipv4 load balancer
        assert_eq!(perms.len(), 3);
        assert!(perms.contains(&IpPermission::ipv4("icmp", 3, 4, "10.0.0.0/8")));
        assert!(perms.contains(&IpPermission::prefix_list("udp", 53, 53, "pl-123")));

        sg_input.ip_address_type = IpAddressType::Dualstack;
        let perms = ingress_permissions(sg_input).unwrap();
        assert_eq!(perms.len(), 5);
        assert!(perms.contains(&IpPermission::ipv6("icmpv6", 2, 0, "2001:db8::/32")));
    }

    #[test]
    fn invalid_source_range() {
        let gateway = gw();
        let cfg = LoadBalancerConfigurationSpec {
            source_ranges: vec!["10.0.0.0/33".into()],
            ..Default::default()
        };
        let kinds = BTreeSet::new();
        assert!(ingress_permissions(input(&gateway, &cfg, &kinds)).unwrap_err().is_configuration_error());
    }

    #[tokio::test]
    async fn managed_group_with_backend() {
        let config = BuilderConfig::new("prod", "vpc-1");
        let inventory = Inventory::new().with_backend_security_group("sg-backend");
        let builder = SecurityGroupBuilder::new(&config, &inventory, &inventory);
        let gateway = gw();
        let cfg = LoadBalancerConfigurationSpec::default();
        let kinds: BTreeSet<_> = [(80, RouteKind::Tcp)].into();
        let mut stack = Stack::new(gateway.clone());

        let out = builder.build(&mut stack, input(&gateway, &cfg, &kinds)).await.unwrap();
        assert_eq!(out.security_group_tokens.len(), 2);
        assert_eq!(out.backend_security_group_token, Some(StringToken::literal("sg-backend")));
        assert!(out.backend_security_group_allocated);
        assert!(out.security_group_tokens[0].as_reference().is_some());
        assert_eq!(stack.list::<SecurityGroup>().len(), 1);
    }

    #[tokio::test]
    async fn explicit_groups() {
        let mut config = BuilderConfig::new("prod", "vpc-1");
        let inventory = Inventory::new()
            .with_security_group("sg-1", "web")
            .with_backend_security_group("sg-backend");
        let gateway = gw();
        let kinds = BTreeSet::new();
        let mut stack = Stack::new(gateway.clone());

        let mut cfg = LoadBalancerConfigurationSpec {
            security_groups: vec!["web".into()],
            ..Default::default()
        };
        let out = SecurityGroupBuilder::new(&config, &inventory, &inventory)
            .build(&mut stack, input(&gateway, &cfg, &kinds))
            .await
            .unwrap();
        assert_eq!(out.security_group_tokens, vec![StringToken::literal("sg-1")]);
        assert!(out.backend_security_group_token.is_none());
        assert!(stack.is_empty());

        cfg.manage_backend_security_group_rules = true;
        config.enable_backend_security_group = false;
        let err = SecurityGroupBuilder::new(&config, &inventory, &inventory)
            .build(&mut stack, input(&gateway, &cfg, &kinds))
            .await
            .unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[tokio::test]
    async fn disabled_security_group_is_network_only() {
        let config = BuilderConfig::default();
        let inventory = Inventory::new();
        let gateway = gw();
        let kinds = BTreeSet::new();
        let cfg = LoadBalancerConfigurationSpec {
            disable_security_group: true,
            ..Default::default()
        };
        let mut stack = Stack::new(gateway.clone());
        let builder = SecurityGroupBuilder::new(&config, &inventory, &inventory);

        let out = builder.build(&mut stack, input(&gateway, &cfg, &kinds)).await.unwrap();
        assert!(out.is_zero_security_group());

        let mut alb = input(&gateway, &cfg, &kinds);
        alb.load_balancer_type = LoadBalancerType::Application;
        assert!(builder.build(&mut stack, alb).await.is_err());
    }
}
