//! Ingress rules carried by target group bindings.
//!
//! Targets must accept load balancer traffic and health checks. When a backend
//! security group is managed the rules name it as the source; when the load
//! balancer has no security groups at all the sources are CIDR blocks derived
//! from client-IP preservation.

use gateway_lb_core::StringToken;
use gateway_lb_model::binding::TargetGroupBindingNetworking;
use gateway_lb_model::elbv2::{Attribute, TargetGroupIpAddressType};
use gateway_lb_model::{
    NetworkingIngressRule, NetworkingPeer, NetworkingPort, NetworkingProtocol, Protocol, Scheme,
    TargetType,
};
use ipnet::IpNet;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use tracing::debug;

use crate::config::BuilderConfig;
use crate::error::{BuildError, ProviderContext, Result};
use crate::providers::{FetchMode, VpcInfoProvider};
use crate::security_group::SecurityGroupOutput;
use crate::subnets::SubnetOutput;

/// Health check port sentinel meaning "same as the traffic port".
pub const TRAFFIC_PORT: &str = "traffic-port";

/// Target group attribute controlling client IP preservation.
pub const PRESERVE_CLIENT_IP_ATTRIBUTE: &str = "preserve_client_ip.enabled";

/// How binding ingress rules are sourced, chosen once per Gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkingMode {
    /// Explicit security groups without managed backend rules.
    Unmanaged,
    /// Rules allow the backend security group.
    SecurityGroup {
        /// Backend security group.
        backend: StringToken,
        /// Scope rules to the target and health check ports.
        restricted: bool,
    },
    /// Rules allow CIDR blocks (load balancer without security groups).
    Cidr,
}

impl NetworkingMode {
    /// Select the mode from the resolved security groups.
    #[must_use]
    pub fn select(config: &BuilderConfig, security_groups: &SecurityGroupOutput) -> Self {
        if let Some(backend) = &security_groups.backend_security_group_token {
            Self::SecurityGroup {
                backend: backend.clone(),
                restricted: !config.disable_restricted_sg_rules,
            }
        } else if security_groups.is_zero_security_group() {
            Self::Cidr
        } else {
            Self::Unmanaged
        }
    }
}

/// Per-target-group inputs.
#[derive(Debug, Clone)]
pub struct TgbNetworkInput<'a> {
    /// Target group protocol.
    pub protocol: Protocol,
    /// Target type.
    pub target_type: TargetType,
    /// Port targets receive traffic on (node port or pod port).
    pub target_port: IntOrString,
    /// Resolved health check port or the traffic-port sentinel.
    pub health_check_port: IntOrString,
    /// Target group attributes.
    pub attributes: &'a [Attribute],
    /// Target address family.
    pub ip_address_type: TargetGroupIpAddressType,
}

/// Builds binding ingress rules for one Gateway.
pub struct TgbNetworkBuilder<'a> {
    mode: NetworkingMode,
    scheme: Scheme,
    vpc_id: &'a str,
    source_ranges: &'a [String],
    subnets: &'a SubnetOutput,
    vpc: &'a dyn VpcInfoProvider,
}

impl<'a> TgbNetworkBuilder<'a> {
    /// Create a builder.
    #[must_use]
    pub fn new(
        mode: NetworkingMode,
        scheme: Scheme,
        vpc_id: &'a str,
        source_ranges: &'a [String],
        subnets: &'a SubnetOutput,
        vpc: &'a dyn VpcInfoProvider,
    ) -> Self {
        Self {
            mode,
            scheme,
            vpc_id,
            source_ranges,
            subnets,
            vpc,
        }
    }

    /// The selected mode.
    #[must_use]
    pub fn mode(&self) -> &NetworkingMode {
        &self.mode
    }

    /// Build the ingress rules, or `None` when rules are unmanaged.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed source ranges or when no
    /// CIDR of the target family is available, and a provider error when the
    /// VPC lookup fails.
    pub async fn build(&self, input: &TgbNetworkInput<'_>) -> Result<Option<TargetGroupBindingNetworking>> {
        let ingress = match &self.mode {
            NetworkingMode::Unmanaged => return Ok(None),
            NetworkingMode::SecurityGroup {
                backend,
                restricted: true,
            } => restricted_rules(backend, input),
            NetworkingMode::SecurityGroup {
                backend,
                restricted: false,
            } => unrestricted_rules(backend, input),
            NetworkingMode::Cidr => self.cidr_rules(input).await?,
        };
        Ok(Some(TargetGroupBindingNetworking { ingress }))
    }

    async fn cidr_rules(&self, input: &TgbNetworkInput<'_>) -> Result<Vec<NetworkingIngressRule>> {
        let family = input.ip_address_type;
        let preserve = preserve_client_ip(input);
        let traffic_sources = if preserve {
            if !self.source_ranges.is_empty() {
                filter_family(self.source_ranges.iter().map(String::as_str), family)?
            } else if self.scheme == Scheme::InternetFacing {
                vec![any_cidr(family).to_string()]
            } else {
                let cidrs = self
                    .vpc
                    .cidr_blocks(self.vpc_id, FetchMode::Uncached)
                    .await
                    .context(|| format!("fetching CIDR blocks of {}", self.vpc_id))?;
                match family {
                    TargetGroupIpAddressType::Ipv4 => cidrs.ipv4.iter().map(ToString::to_string).collect(),
                    TargetGroupIpAddressType::Ipv6 => cidrs.ipv6.iter().map(ToString::to_string).collect(),
                }
            }
        } else {
            self.subnet_cidrs(family)
        };
        debug!(preserve, sources = traffic_sources.len(), "target group ingress from CIDRs");
        if traffic_sources.is_empty() {
            return Err(BuildError::config(format!(
                "no {family:?} CIDR blocks available for target ingress"
            )));
        }

        let mut rules: Vec<NetworkingIngressRule> = transport_protocols(input.protocol)
            .iter()
            .map(|proto| NetworkingIngressRule {
                from: ip_blocks(&traffic_sources),
                ports: vec![NetworkingPort {
                    protocol: Some(*proto),
                    port: Some(input.target_port.clone()),
                }],
            })
            .collect();

        if health_check_differs(&input.target_port, &input.health_check_port)
            && input.protocol != Protocol::Udp
        {
            let hc_sources = self.subnet_cidrs(family);
            if !hc_sources.is_empty() {
                rules.push(NetworkingIngressRule {
                    from: ip_blocks(&hc_sources),
                    ports: vec![NetworkingPort {
                        protocol: Some(NetworkingProtocol::Tcp),
                        port: Some(input.health_check_port.clone()),
                    }],
                });
            }
        }
        Ok(rules)
    }

    fn subnet_cidrs(&self, family: TargetGroupIpAddressType) -> Vec<String> {
        match family {
            TargetGroupIpAddressType::Ipv4 => self.subnets.ipv4_cidrs().iter().map(ToString::to_string).collect(),
            TargetGroupIpAddressType::Ipv6 => self.subnets.ipv6_cidrs().iter().map(ToString::to_string).collect(),
        }
    }
}

fn restricted_rules(backend: &StringToken, input: &TgbNetworkInput<'_>) -> Vec<NetworkingIngressRule> {
    let from = vec![NetworkingPeer::SecurityGroup {
        group_id: backend.clone(),
    }];
    let mut rules = vec![NetworkingIngressRule {
        from: from.clone(),
        ports: transport_protocols(input.protocol)
            .iter()
            .map(|proto| NetworkingPort {
                protocol: Some(*proto),
                port: Some(input.target_port.clone()),
            })
            .collect(),
    }];
    if health_check_differs(&input.target_port, &input.health_check_port) {
        rules.push(NetworkingIngressRule {
            from,
            ports: vec![NetworkingPort {
                protocol: Some(NetworkingProtocol::Tcp),
                port: Some(input.health_check_port.clone()),
            }],
        });
    }
    rules
}

fn unrestricted_rules(backend: &StringToken, input: &TgbNetworkInput<'_>) -> Vec<NetworkingIngressRule> {
    let mut protocols = vec![NetworkingProtocol::Tcp];
    if input.protocol.carries_udp() {
        protocols.push(NetworkingProtocol::Udp);
    }
    vec![NetworkingIngressRule {
        from: vec![NetworkingPeer::SecurityGroup {
            group_id: backend.clone(),
        }],
        ports: protocols
            .into_iter()
            .map(|proto| NetworkingPort {
                protocol: Some(proto),
                port: None,
            })
            .collect(),
    }]
}

/// Transport protocols carrying target traffic.
fn transport_protocols(protocol: Protocol) -> &'static [NetworkingProtocol] {
    match protocol {
        Protocol::Udp | Protocol::Quic => &[NetworkingProtocol::Udp],
        Protocol::TcpUdp | Protocol::TcpQuic => &[NetworkingProtocol::Tcp, NetworkingProtocol::Udp],
        _ => &[NetworkingProtocol::Tcp],
    }
}

/// Whether health checks need their own port rule.
#[must_use]
pub fn health_check_differs(target_port: &IntOrString, health_check_port: &IntOrString) -> bool {
    match health_check_port {
        IntOrString::String(s) if s == TRAFFIC_PORT => false,
        hc => hc != target_port,
    }
}

fn preserve_client_ip(input: &TgbNetworkInput<'_>) -> bool {
    if matches!(input.protocol, Protocol::Udp | Protocol::TcpUdp) {
        return true;
    }
    if let Some(attr) = input.attributes.iter().find(|a| a.key == PRESERVE_CLIENT_IP_ATTRIBUTE) {
        return attr.value.eq_ignore_ascii_case("true");
    }
    input.target_type == TargetType::Instance
}

const fn any_cidr(family: TargetGroupIpAddressType) -> &'static str {
    match family {
        TargetGroupIpAddressType::Ipv4 => "0.0.0.0/0",
        TargetGroupIpAddressType::Ipv6 => "::/0",
    }
}

fn filter_family<'s>(
    ranges: impl Iterator<Item = &'s str>,
    family: TargetGroupIpAddressType,
) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for raw in ranges {
        let net: IpNet = raw
            .parse()
            .map_err(|_| BuildError::config(format!("invalid source range {raw:?}")))?;
        let matches = matches!(
            (&net, family),
            (IpNet::V4(_), TargetGroupIpAddressType::Ipv4) | (IpNet::V6(_), TargetGroupIpAddressType::Ipv6)
        );
        if matches {
            out.push(net.to_string());
        }
    }
    Ok(out)
}

fn ip_blocks(cidrs: &[String]) -> Vec<NetworkingPeer> {
    cidrs
        .iter()
        .map(|cidr| NetworkingPeer::IpBlock { cidr: cidr.clone() })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Inventory, Subnet, VpcCidrs, ZoneType};

    fn subnets() -> SubnetOutput {
        SubnetOutput {
            mappings: Vec::new(),
            subnets: vec![Subnet {
                id: "subnet-a".into(),
                availability_zone: "us-east-1a".into(),
                zone_type: ZoneType::AvailabilityZone,
                ipv4_cidr: Some("10.0.1.0/24".parse().unwrap()),
                ipv6_cidr: None,
                tags: Default::default(),
            }],
        }
    }

    fn tgb_input(protocol: Protocol, target: i32, hc: IntOrString) -> TgbNetworkInput<'static> {
        TgbNetworkInput {
            protocol,
            target_type: TargetType::Instance,
            target_port: IntOrString::Int(target),
            health_check_port: hc,
            attributes: &[],
            ip_address_type: TargetGroupIpAddressType::Ipv4,
        }
    }

    fn sg_mode(restricted: bool) -> NetworkingMode {
        NetworkingMode::SecurityGroup {
            backend: StringToken::literal("sg-backend"),
            restricted,
        }
    }

    #[tokio::test]
    async fn restricted_same_port_single_rule() {
        let subnets = subnets();
        let inventory = Inventory::new();
        let builder = TgbNetworkBuilder::new(sg_mode(true), Scheme::Internal, "vpc-1", &[], &subnets, &inventory);

        let net = builder
            .build(&tgb_input(Protocol::Tcp, 80, IntOrString::Int(80)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(net.ingress.len(), 1);
        assert_eq!(
            net.ingress[0].ports,
            vec![NetworkingPort {
                protocol: Some(NetworkingProtocol::Tcp),
                port: Some(IntOrString::Int(80)),
            }]
        );

        let net = builder
            .build(&tgb_input(Protocol::Tcp, 80, IntOrString::String(TRAFFIC_PORT.into())))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(net.ingress.len(), 1);
    }

    #[tokio::test]
    async fn restricted_udp_with_tcp_health_check() {
        let subnets = subnets();
        let inventory = Inventory::new();
        let builder = TgbNetworkBuilder::new(sg_mode(true), Scheme::Internal, "vpc-1", &[], &subnets, &inventory);

        let net = builder
            .build(&tgb_input(Protocol::Udp, 80, IntOrString::Int(85)))
            .await
            .unwrap()
            .unwrap();
        let ports: Vec<_> = net.ingress.iter().map(|r| r.ports.clone()).collect();
        assert_eq!(
            ports,
            vec![
                vec![NetworkingPort {
                    protocol: Some(NetworkingProtocol::Udp),
                    port: Some(IntOrString::Int(80)),
                }],
                vec![NetworkingPort {
                    protocol: Some(NetworkingProtocol::Tcp),
                    port: Some(IntOrString::Int(85)),
                }],
            ]
        );
    }

    #[tokio::test]
    async fn unrestricted_has_no_ports() {
        let subnets = subnets();
        let inventory = Inventory::new();
        let builder = TgbNetworkBuilder::new(sg_mode(false), Scheme::Internal, "vpc-1", &[], &subnets, &inventory);
        let net = builder
            .build(&tgb_input(Protocol::TcpUdp, 53, IntOrString::Int(8080)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(net.ingress.len(), 1);
        assert_eq!(net.ingress[0].ports.len(), 2);
        assert!(net.ingress[0].ports.iter().all(|p| p.port.is_none()));
    }

    #[tokio::test]
    async fn zero_sg_internet_facing_allows_all() {
        let subnets = subnets();
        let inventory = Inventory::new();
        let builder = TgbNetworkBuilder::new(NetworkingMode::Cidr, Scheme::InternetFacing, "vpc-1", &[], &subnets, &inventory);
        let net = builder
            .build(&tgb_input(Protocol::Tcp, 30080, IntOrString::String(TRAFFIC_PORT.into())))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(net.ingress.len(), 1);
        assert_eq!(
            net.ingress[0].from,
            vec![NetworkingPeer::IpBlock {
                cidr: "0.0.0.0/0".into()
            }]
        );
    }

    #[tokio::test]
    async fn zero_sg_internal_fetches_vpc_uncached() {
        let subnets = subnets();
        let inventory = Inventory::new().with_vpc(
            "vpc-1",
            VpcCidrs {
                ipv4: vec!["10.0.0.0/16".parse().unwrap()],
                ipv6: Vec::new(),
            },
        );
        let builder = TgbNetworkBuilder::new(NetworkingMode::Cidr, Scheme::Internal, "vpc-1", &[], &subnets, &inventory);
        let net = builder
            .build(&tgb_input(Protocol::Tcp, 30080, IntOrString::Int(30081)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(net.ingress.len(), 2);
        assert_eq!(net.ingress[0].from, vec![NetworkingPeer::IpBlock { cidr: "10.0.0.0/16".into() }]);
        assert_eq!(net.ingress[1].from, vec![NetworkingPeer::IpBlock { cidr: "10.0.1.0/24".into() }]);
        assert_eq!(inventory.calls().vpc_lookups, vec![FetchMode::Uncached]);
    }

    #[tokio::test]
    async fn zero_sg_without_preservation_uses_subnets() {
        let subnets = subnets();
        let inventory = Inventory::new();
        let ranges = vec!["192.168.0.0/16".to_string()];
        let builder = TgbNetworkBuilder::new(NetworkingMode::Cidr, Scheme::InternetFacing, "vpc-1", &ranges, &subnets, &inventory);
        let mut input = tgb_input(Protocol::Tcp, 8080, IntOrString::Int(8080));
        input.target_type = TargetType::Ip;

        let net = builder.build(&input).await.unwrap().unwrap();
        assert_eq!(net.ingress[0].from, vec![NetworkingPeer::IpBlock { cidr: "10.0.1.0/24".into() }]);

        let attrs = [Attribute::new(PRESERVE_CLIENT_IP_ATTRIBUTE, "true")];
        input.attributes = &attrs;
        let net = builder.build(&input).await.unwrap().unwrap();
        assert_eq!(net.ingress[0].from, vec![NetworkingPeer::IpBlock { cidr: "192.168.0.0/16".into() }]);
    }

    #[tokio::test]
    async fn udp_skips_health_check_rule_and_tcp_udp_emits_both() {
        let subnets = subnets();
        let inventory = Inventory::new();
        let builder = TgbNetworkBuilder::new(NetworkingMode::Cidr, Scheme::InternetFacing, "vpc-1", &[], &subnets, &inventory);

        let net = builder
            .build(&tgb_input(Protocol::Udp, 53, IntOrString::Int(8080)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(net.ingress.len(), 1);

        let net = builder
            .build(&tgb_input(Protocol::TcpUdp, 53, IntOrString::Int(8080)))
            .await
            .unwrap()
            .unwrap();
        // TCP traffic, UDP traffic, TCP health check
        assert_eq!(net.ingress.len(), 3);
    }

    #[test]
    fn mode_selection() {
        let config = BuilderConfig::default();
        let zero = SecurityGroupOutput::default();
        assert_eq!(NetworkingMode::select(&config, &zero), NetworkingMode::Cidr);

        let explicit = SecurityGroupOutput {
            security_group_tokens: vec![StringToken::literal("sg-1")],
            ..Default::default()
        };
        assert_eq!(NetworkingMode::select(&config, &explicit), NetworkingMode::Unmanaged);
    }
}
