//! Load balancer subnet resolution.
//!
//! Subnets are resolved from explicit identifiers, a tag selector, the subnets
//! of the currently deployed load balancer (same scheme only), or discovery, in
//! that order. Network load balancers then run the resolved mappings through an
//! ordered chain of [`SubnetMutator`]s that attach per-subnet allocations.

use std::net::{Ipv4Addr, Ipv6Addr};

use gateway_lb_model::crd::SubnetConfiguration;
use gateway_lb_model::{IpAddressType, LoadBalancerType, Scheme, SubnetMapping};
use ipnet::{Ipv4Net, Ipv6Net};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{BuildError, ProviderContext, Result};
use crate::providers::{Subnet, SubnetResolver};

/// `sourceNatIPv6Prefix` value asking AWS to pick the prefix.
pub const SOURCE_NAT_AUTO_ASSIGNED: &str = "auto_assigned";

/// Prefix length required for source NAT prefixes.
const SOURCE_NAT_PREFIX_LEN: u8 = 80;

/// The load balancer currently deployed for a Gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingLoadBalancer {
    /// Its scheme.
    pub scheme: Scheme,
    /// Its subnet IDs.
    pub subnet_ids: Vec<String>,
}

/// Inputs of subnet resolution.
#[derive(Debug, Clone, Copy)]
pub struct SubnetInput<'a> {
    /// Load balancer type.
    pub load_balancer_type: LoadBalancerType,
    /// Desired scheme.
    pub scheme: Scheme,
    /// Desired IP address type.
    pub ip_address_type: IpAddressType,
    /// Per-subnet configuration.
    pub configs: &'a [SubnetConfiguration],
    /// Tag selector.
    pub selector: Option<&'a BTreeMap<String, Vec<String>>>,
    /// Deployed load balancer, if any.
    pub existing: Option<&'a ExistingLoadBalancer>,
}

/// Resolved subnets and their mappings, index-aligned.
#[derive(Debug, Clone, Default)]
pub struct SubnetOutput {
    /// Mappings for the load balancer spec.
    pub mappings: Vec<SubnetMapping>,
    /// Resolved subnets.
    pub subnets: Vec<Subnet>,
}

impl SubnetOutput {
    /// Whether any subnet is in a local zone or outpost.
    #[must_use]
    pub fn is_local_zone_or_outpost(&self) -> bool {
        self.subnets.iter().any(Subnet::is_local_zone_or_outpost)
    }

    /// IPv4 CIDR blocks of the subnets.
    #[must_use]
    pub fn ipv4_cidrs(&self) -> Vec<Ipv4Net> {
        self.subnets.iter().filter_map(|s| s.ipv4_cidr).collect()
    }

    /// IPv6 CIDR blocks of the subnets.
    #[must_use]
    pub fn ipv6_cidrs(&self) -> Vec<Ipv6Net> {
        self.subnets.iter().filter_map(|s| s.ipv6_cidr).collect()
    }
}

type FieldGetter = fn(&SubnetConfiguration) -> Option<&String>;

const SUBNET_FIELDS: [(&str, FieldGetter); 5] = [
    ("identifier", |c| c.identifier.as_ref()),
    ("eipAllocation", |c| c.eip_allocation.as_ref()),
    ("privateIPv4Allocation", |c| c.private_ipv4_allocation.as_ref()),
    ("ipv6Allocation", |c| c.ipv6_allocation.as_ref()),
    ("sourceNatIPv6Prefix", |c| c.source_nat_ipv6_prefix.as_ref()),
];

/// Check that each optional field is set on every entry or on none.
///
/// # Errors
///
/// Returns `BuildError::Config` naming the first partially specified field.
pub fn validate_subnet_configs(configs: &[SubnetConfiguration]) -> Result<()> {
    for (field, get) in SUBNET_FIELDS {
        let set = configs.iter().filter(|c| get(c).is_some()).count();
        if set != 0 && set != configs.len() {
            return Err(BuildError::config(format!(
                "{field} must be specified for all subnets or none ({set} of {} set)",
                configs.len()
            )));
        }
    }
    Ok(())
}

fn validate_feature_gates(input: &SubnetInput<'_>) -> Result<()> {
    let Some(first) = input.configs.first() else {
        return Ok(());
    };
    let network = input.load_balancer_type == LoadBalancerType::Network;
    if first.eip_allocation.is_some() && !(network && input.scheme == Scheme::InternetFacing) {
        return Err(BuildError::config(
            "eipAllocation requires an internet-facing network load balancer",
        ));
    }
    if first.ipv6_allocation.is_some() && !(network && input.ip_address_type.supports_ipv6()) {
        return Err(BuildError::config(
            "ipv6Allocation requires a dualstack network load balancer",
        ));
    }
    if first.private_ipv4_allocation.is_some() && !(network && input.scheme == Scheme::Internal) {
        return Err(BuildError::config(
            "privateIPv4Allocation requires an internal network load balancer",
        ));
    }
    if first.source_nat_ipv6_prefix.is_some() && !network {
        return Err(BuildError::config(
            "sourceNatIPv6Prefix requires a network load balancer",
        ));
    }
    Ok(())
}

fn has_allocations(configs: &[SubnetConfiguration]) -> bool {
    configs.first().is_some_and(|c| {
        c.eip_allocation.is_some()
            || c.private_ipv4_allocation.is_some()
            || c.ipv6_allocation.is_some()
            || c.source_nat_ipv6_prefix.is_some()
    })
}

/// Adds allocation data to subnet mappings. Never removes or reorders entries.
pub trait SubnetMutator: Send + Sync {
    /// Mutate `mappings` in place; all slices are index-aligned.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::Config` when an allocation does not fit its subnet.
    fn mutate(
        &self,
        mappings: &mut [SubnetMapping],
        subnets: &[Subnet],
        configs: &[SubnetConfiguration],
    ) -> Result<()>;
}

/// Elastic IP allocations.
#[derive(Debug, Clone, Copy)]
pub struct EipMutator;

impl SubnetMutator for EipMutator {
    fn mutate(
        &self,
        mappings: &mut [SubnetMapping],
        _subnets: &[Subnet],
        configs: &[SubnetConfiguration],
    ) -> Result<()> {
        for (mapping, config) in mappings.iter_mut().zip(configs) {
            if let Some(eip) = &config.eip_allocation {
                mapping.allocation_id = Some(eip.clone());
            }
        }
        Ok(())
    }
}

/// Static private IPv4 addresses.
#[derive(Debug, Clone, Copy)]
pub struct PrivateIpv4Mutator;

impl SubnetMutator for PrivateIpv4Mutator {
    fn mutate(
        &self,
        mappings: &mut [SubnetMapping],
        subnets: &[Subnet],
        configs: &[SubnetConfiguration],
    ) -> Result<()> {
        for ((mapping, subnet), config) in mappings.iter_mut().zip(subnets).zip(configs) {
            let Some(raw) = &config.private_ipv4_allocation else {
                continue;
            };
            let addr: Ipv4Addr = raw.parse().map_err(|_| {
                BuildError::config(format!("privateIPv4Allocation {raw:?} is not an IPv4 address"))
            })?;
            if let Some(cidr) = subnet.ipv4_cidr {
                if !cidr.contains(&addr) {
                    return Err(BuildError::config(format!(
                        "privateIPv4Allocation {addr} is outside subnet {} ({cidr})",
                        subnet.id
                    )));
                }
            }
            mapping.private_ipv4_address = Some(addr.to_string());
        }
        Ok(())
    }
}

/// Static IPv6 addresses.
#[derive(Debug, Clone, Copy)]
pub struct Ipv6Mutator;

impl SubnetMutator for Ipv6Mutator {
    fn mutate(
        &self,
        mappings: &mut [SubnetMapping],
        subnets: &[Subnet],
        configs: &[SubnetConfiguration],
    ) -> Result<()> {
        for ((mapping, subnet), config) in mappings.iter_mut().zip(subnets).zip(configs) {
            let Some(raw) = &config.ipv6_allocation else {
                continue;
            };
            let addr: Ipv6Addr = raw.parse().map_err(|_| {
                BuildError::config(format!("ipv6Allocation {raw:?} is not an IPv6 address"))
            })?;
            let cidr = subnet.ipv6_cidr.ok_or_else(|| {
                BuildError::config(format!("subnet {} has no IPv6 CIDR block", subnet.id))
            })?;
            if !cidr.contains(&addr) {
                return Err(BuildError::config(format!(
                    "ipv6Allocation {addr} is outside subnet {} ({cidr})",
                    subnet.id
                )));
            }
            mapping.ipv6_address = Some(addr.to_string());
        }
        Ok(())
    }
}

/// Source NAT IPv6 prefixes.
#[derive(Debug, Clone, Copy)]
pub struct SourceNatMutator;

impl SubnetMutator for SourceNatMutator {
    fn mutate(
        &self,
        mappings: &mut [SubnetMapping],
        subnets: &[Subnet],
        configs: &[SubnetConfiguration],
    ) -> Result<()> {
        for ((mapping, subnet), config) in mappings.iter_mut().zip(subnets).zip(configs) {
            let Some(raw) = &config.source_nat_ipv6_prefix else {
                continue;
            };
            if raw != SOURCE_NAT_AUTO_ASSIGNED {
                let prefix: Ipv6Net = raw.parse().map_err(|_| {
                    BuildError::config(format!("sourceNatIPv6Prefix {raw:?} is not an IPv6 prefix"))
                })?;
                if prefix.prefix_len() != SOURCE_NAT_PREFIX_LEN {
                    return Err(BuildError::config(format!(
                        "sourceNatIPv6Prefix {prefix} must be a /{SOURCE_NAT_PREFIX_LEN}"
                    )));
                }
                if let Some(cidr) = subnet.ipv6_cidr {
                    if !cidr.contains(&prefix) {
                        return Err(BuildError::config(format!(
                            "sourceNatIPv6Prefix {prefix} is outside subnet {} ({cidr})",
                            subnet.id
                        )));
                    }
                }
            }
            mapping.source_nat_ipv6_prefix = Some(raw.clone());
        }
        Ok(())
    }
}

/// Mutators applied to network load balancer subnets, in order.
#[must_use]
pub fn network_mutators() -> [&'static dyn SubnetMutator; 4] {
    [&EipMutator, &PrivateIpv4Mutator, &Ipv6Mutator, &SourceNatMutator]
}

/// Resolves subnets for one load balancer.
pub struct SubnetBuilder<'a> {
    resolver: &'a dyn SubnetResolver,
}

impl<'a> SubnetBuilder<'a> {
    /// Create a builder.
    #[must_use]
    pub fn new(resolver: &'a dyn SubnetResolver) -> Self {
        Self { resolver }
    }

    /// Validate, resolve and mutate.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid per-subnet configuration or
    /// when no subnets resolve, and a provider error when a lookup fails.
    pub async fn build(&self, input: SubnetInput<'_>) -> Result<SubnetOutput> {
        validate_subnet_configs(input.configs)?;
        validate_feature_gates(&input)?;

        let subnets = self.resolve(&input).await?;
        if subnets.is_empty() {
            return Err(BuildError::config("unable to resolve any subnets"));
        }
        if has_allocations(input.configs) && input.configs.len() != subnets.len() {
            return Err(BuildError::config(format!(
                "{} subnet configurations for {} resolved subnets",
                input.configs.len(),
                subnets.len()
            )));
        }

        let mut mappings: Vec<SubnetMapping> =
            subnets.iter().map(|s| SubnetMapping::new(&s.id)).collect();
        if input.load_balancer_type == LoadBalancerType::Network {
            for mutator in network_mutators() {
                mutator.mutate(&mut mappings, &subnets, input.configs)?;
            }
        }

        Ok(SubnetOutput { mappings, subnets })
    }

    async fn resolve(&self, input: &SubnetInput<'_>) -> Result<Vec<Subnet>> {
        let ids: Vec<String> = input
            .configs
            .iter()
            .filter_map(|c| c.identifier.clone())
            .collect();
        if !ids.is_empty() {
            debug!(count = ids.len(), "resolving subnets by identifier");
            return self
                .resolver
                .resolve_by_ids(&ids)
                .await
                .context(|| format!("resolving subnets {ids:?}"));
        }

        if let Some(selector) = input.selector {
            debug!("resolving subnets by tag selector");
            return self
                .resolver
                .resolve_by_selector(selector)
                .await
                .context(|| "resolving subnets by selector".to_string());
        }

        if let Some(existing) = input.existing.filter(|e| e.scheme == input.scheme) {
            if !existing.subnet_ids.is_empty() {
                debug!("reusing subnets of the deployed load balancer");
                return self
                    .resolver
                    .resolve_by_ids(&existing.subnet_ids)
                    .await
                    .context(|| "resolving subnets of the deployed load balancer".to_string());
            }
        }

        debug!(scheme = input.scheme.as_str(), "discovering subnets");
        self.resolver
            .discover_subnets(input.load_balancer_type, input.scheme)
            .await
            .context(|| format!("discovering {} subnets", input.scheme.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Inventory, ZoneType};

    fn subnet(id: &str, az: &str, v4: &str, v6: Option<&str>, role: &str) -> Subnet {
        Subnet {
            id: id.to_string(),
            availability_zone: az.to_string(),
            zone_type: ZoneType::AvailabilityZone,
            ipv4_cidr: Some(v4.parse().unwrap()),
            ipv6_cidr: v6.map(|c| c.parse().unwrap()),
            tags: [(role.to_string(), "1".to_string())].into(),
        }
    }

    fn inventory() -> Inventory {
        Inventory::new()
            .with_subnet(subnet("subnet-b", "us-east-1b", "10.0.2.0/24", Some("2600:1f18:0:2::/64"), "kubernetes.io/role/elb"))
            .with_subnet(subnet("subnet-a", "us-east-1a", "10.0.1.0/24", Some("2600:1f18:0:1::/64"), "kubernetes.io/role/elb"))
            .with_subnet(subnet("subnet-i", "us-east-1a", "10.0.9.0/24", None, "kubernetes.io/role/internal-elb"))
    }

    fn input(configs: &[SubnetConfiguration]) -> SubnetInput<'_> {
        SubnetInput {
            load_balancer_type: LoadBalancerType::Network,
            scheme: Scheme::InternetFacing,
            ip_address_type: IpAddressType::Dualstack,
            configs,
            selector: None,
            existing: None,
        }
    }

    #[test]
    fn partial_fields_rejected() {
        let configs = vec![
            SubnetConfiguration {
                identifier: Some("subnet-a".into()),
                eip_allocation: Some("eipalloc-1".into()),
                ..Default::default()
            },
            SubnetConfiguration {
                identifier: Some("subnet-b".into()),
                ..Default::default()
            },
        ];
        let err = validate_subnet_configs(&configs).unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("eipAllocation"));

        let full: Vec<_> = configs
            .iter()
            .map(|c| SubnetConfiguration {
                eip_allocation: Some("eipalloc-x".into()),
                ..c.clone()
            })
            .collect();
        assert!(validate_subnet_configs(&full).is_ok());
        assert!(validate_subnet_configs(&[]).is_ok());
    }

    #[tokio::test]
    async fn discovery_is_sorted_and_unmutated() {
        let inventory = inventory();
        let out = SubnetBuilder::new(&inventory).build(input(&[])).await.unwrap();
        let ids: Vec<_> = out.mappings.iter().map(|m| m.subnet_id.as_str()).collect();
        assert_eq!(ids, ["subnet-a", "subnet-b"]);
        assert!(out.mappings.iter().all(|m| m.allocation_id.is_none()));
    }

    #[tokio::test]
    async fn explicit_ids_keep_order_and_get_allocations() {
        let inventory = inventory();
        let configs = vec![
            SubnetConfiguration {
                identifier: Some("subnet-b".into()),
                eip_allocation: Some("eipalloc-b".into()),
                ipv6_allocation: Some("2600:1f18:0:2::10".into()),
                ..Default::default()
            },
            SubnetConfiguration {
                identifier: Some("subnet-a".into()),
                eip_allocation: Some("eipalloc-a".into()),
                ipv6_allocation: Some("2600:1f18:0:1::10".into()),
                ..Default::default()
            },
        ];
        let out = SubnetBuilder::new(&inventory).build(input(&configs)).await.unwrap();
        assert_eq!(out.mappings[0].subnet_id, "subnet-b");
        assert_eq!(out.mappings[0].allocation_id.as_deref(), Some("eipalloc-b"));
        assert_eq!(out.mappings[1].ipv6_address.as_deref(), Some("2600:1f18:0:1::10"));
    }

    #[tokio::test]
    async fn ipv6_outside_subnet_rejected() {
        let inventory = inventory();
        let configs = vec![SubnetConfiguration {
            identifier: Some("subnet-a".into()),
            ipv6_allocation: Some("2600:1f18:0:2::10".into()),
            ..Default::default()
        }];
        let err = SubnetBuilder::new(&inventory).build(input(&configs)).await.unwrap_err();
        assert!(err.to_string().contains("outside subnet"));
    }

    #[tokio::test]
    async fn feature_gates() {
        let inventory = inventory();
        let configs = vec![SubnetConfiguration {
            identifier: Some("subnet-i".into()),
            private_ipv4_allocation: Some("10.0.9.5".into()),
            ..Default::default()
        }];
        // private IPv4 requires internal scheme
        let err = SubnetBuilder::new(&inventory).build(input(&configs)).await.unwrap_err();
        assert!(err.is_configuration_error());

        let mut internal = input(&configs);
        internal.scheme = Scheme::Internal;
        let out = SubnetBuilder::new(&inventory).build(internal).await.unwrap();
        assert_eq!(out.mappings[0].private_ipv4_address.as_deref(), Some("10.0.9.5"));

        let mut alb = input(&configs);
        alb.load_balancer_type = LoadBalancerType::Application;
        alb.scheme = Scheme::Internal;
        assert!(SubnetBuilder::new(&inventory).build(alb).await.is_err());
    }

    #[tokio::test]
    async fn allocation_gates_by_type_scheme_and_family() {
        let inventory = inventory();
        let builder = SubnetBuilder::new(&inventory);

        let ipv6 = vec![SubnetConfiguration {
            identifier: Some("subnet-a".into()),
            ipv6_allocation: Some("2600:1f18:0:1::10".into()),
            ..Default::default()
        }];
        let mut ipv4_only = input(&ipv6);
        ipv4_only.ip_address_type = IpAddressType::Ipv4;
        let err = builder.build(ipv4_only).await.unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("ipv6Allocation"));

        let eip = vec![SubnetConfiguration {
            identifier: Some("subnet-a".into()),
            eip_allocation: Some("eipalloc-a".into()),
            ..Default::default()
        }];
        let mut internal = input(&eip);
        internal.scheme = Scheme::Internal;
        let err = builder.build(internal).await.unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("eipAllocation"));

        let source_nat = vec![SubnetConfiguration {
            identifier: Some("subnet-a".into()),
            source_nat_ipv6_prefix: Some(SOURCE_NAT_AUTO_ASSIGNED.into()),
            ..Default::default()
        }];
        let mut alb = input(&source_nat);
        alb.load_balancer_type = LoadBalancerType::Application;
        let err = builder.build(alb).await.unwrap_err();
        assert!(err.to_string().contains("sourceNatIPv6Prefix"));
    }

    #[tokio::test]
    async fn selector_wins_over_deployed_subnets() {
        let inventory = inventory();
        let existing = ExistingLoadBalancer {
            scheme: Scheme::InternetFacing,
            subnet_ids: vec!["subnet-b".into()],
        };
        let selector = BTreeMap::from([(
            "kubernetes.io/role/internal-elb".to_string(),
            vec!["1".to_string()],
        )]);
        let mut by_selector = input(&[]);
        by_selector.selector = Some(&selector);
        by_selector.existing = Some(&existing);

        let out = SubnetBuilder::new(&inventory).build(by_selector).await.unwrap();
        let ids: Vec<_> = out.mappings.iter().map(|m| m.subnet_id.as_str()).collect();
        assert_eq!(ids, ["subnet-i"]);
    }

    #[test]
    fn local_zone_or_outpost_if_any_subnet_is() {
        let mut out = SubnetOutput {
            mappings: Vec::new(),
            subnets: vec![subnet("subnet-a", "us-east-1a", "10.0.1.0/24", None, "kubernetes.io/role/elb")],
        };
        assert!(!out.is_local_zone_or_outpost());

        let mut outpost = subnet("subnet-o", "us-east-1a", "10.0.5.0/24", None, "kubernetes.io/role/elb");
        outpost.zone_type = ZoneType::Outpost;
        out.subnets.push(outpost);
        assert!(out.is_local_zone_or_outpost());
    }

    #[tokio::test]
    async fn existing_subnets_reused_only_for_same_scheme() {
        let inventory = inventory();
        let existing = ExistingLoadBalancer {
            scheme: Scheme::InternetFacing,
            subnet_ids: vec!["subnet-b".into()],
        };
        let mut with_existing = input(&[]);
        with_existing.existing = Some(&existing);
        let out = SubnetBuilder::new(&inventory).build(with_existing).await.unwrap();
        assert_eq!(out.subnets.len(), 1);

        let other = ExistingLoadBalancer {
            scheme: Scheme::Internal,
            subnet_ids: vec!["subnet-i".into()],
        };
        with_existing.existing = Some(&other);
        let out = SubnetBuilder::new(&inventory).build(with_existing).await.unwrap();
        assert_eq!(out.subnets.len(), 2);
    }

    #[tokio::test]
    async fn allocations_without_identifiers_must_match_count() {
        let inventory = inventory();
        let configs = vec![SubnetConfiguration {
            source_nat_ipv6_prefix: Some(SOURCE_NAT_AUTO_ASSIGNED.into()),
            ..Default::default()
        }];
        let err = SubnetBuilder::new(&inventory).build(input(&configs)).await.unwrap_err();
        assert!(err.to_string().contains("1 subnet configurations for 2"));
    }
}
