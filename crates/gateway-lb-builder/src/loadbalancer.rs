//! The load balancer resource itself.

use gateway_lb_core::{NamespacedName, StringToken};
use gateway_lb_model::crd::LoadBalancerConfigurationSpec;
use gateway_lb_model::elbv2::MinimumLoadBalancerCapacity;
use gateway_lb_model::{IpAddressType, LoadBalancer, LoadBalancerSpec, LoadBalancerType, Scheme, Stack, SubnetMapping};

use crate::config::BuilderConfig;
use crate::error::{BuildError, Result};
use crate::naming::hashed_name;
use crate::tags::TagHelper;

/// Logical ID of the load balancer in every stack.
pub const LOAD_BALANCER_ID: &str = "LoadBalancer";

const MAX_NAME_LEN: usize = 32;

/// Scheme and IP address type after applying configured defaults.
#[must_use]
pub fn effective_scheme_and_ip_type(
    config: &BuilderConfig,
    lb_config: &LoadBalancerConfigurationSpec,
) -> (Scheme, IpAddressType) {
    (
        lb_config.scheme.unwrap_or(config.default_scheme),
        lb_config.ip_address_type.unwrap_or(config.default_ip_address_type),
    )
}

/// Inputs of load balancer construction.
#[derive(Debug, Clone)]
pub struct LoadBalancerInput<'a> {
    /// Owning Gateway.
    pub gateway: &'a NamespacedName,
    /// Load balancer type.
    pub load_balancer_type: LoadBalancerType,
    /// Scheme.
    pub scheme: Scheme,
    /// IP address type.
    pub ip_address_type: IpAddressType,
    /// Load balancer configuration.
    pub lb_config: &'a LoadBalancerConfigurationSpec,
    /// Resolved subnet mappings.
    pub subnet_mappings: Vec<SubnetMapping>,
    /// Resolved security groups.
    pub security_groups: Vec<StringToken>,
}

/// Validate the configuration and add the load balancer to `stack`.
///
/// Returns the deferred load balancer ARN.
///
/// # Errors
///
/// Returns a configuration error for an invalid name or a setting the load
/// balancer type or scheme does not support.
pub fn build_load_balancer(
    config: &BuilderConfig,
    stack: &mut Stack,
    input: LoadBalancerInput<'_>,
) -> Result<StringToken> {
    let cfg = input.lb_config;
    let application = input.load_balancer_type.is_application();

    if input.ip_address_type == IpAddressType::DualstackWithoutPublicIpv4
        && !(application && input.scheme == Scheme::InternetFacing)
    {
        return Err(BuildError::config(
            "dualstack-without-public-ipv4 requires an internet-facing application load balancer",
        ));
    }
    if cfg.customer_owned_ipv4_pool.is_some() && !application {
        return Err(BuildError::config(
            "customerOwnedIpv4Pool is only supported for application load balancers",
        ));
    }

    let name = match cfg.load_balancer_name.as_deref() {
        Some(name) => validate_name(name)?,
        None => hashed_name(
            &input.gateway.namespace,
            &input.gateway.name,
            &[
                &config.cluster_name,
                &input.gateway.to_string(),
                input.scheme.as_str(),
            ],
        ),
    };

    let load_balancer = LoadBalancer::new(
        LOAD_BALANCER_ID,
        LoadBalancerSpec {
            name,
            load_balancer_type: input.load_balancer_type,
            scheme: input.scheme,
            ip_address_type: input.ip_address_type,
            subnet_mappings: input.subnet_mappings,
            security_groups: input.security_groups,
            load_balancer_attributes: cfg.load_balancer_attributes.clone(),
            tags: TagHelper::new(config).resolve(cfg.tags.as_ref())?,
            customer_owned_ipv4_pool: cfg.customer_owned_ipv4_pool.clone(),
            ipv4_ipam_pool: cfg.ipv4_ipam_pool_id.clone(),
            minimum_load_balancer_capacity: cfg.minimum_load_balancer_capacity.map(|c| {
                MinimumLoadBalancerCapacity {
                    capacity_units: c.capacity_units,
                }
            }),
        },
    );
    let arn = load_balancer.arn();
    stack.add(load_balancer)?;
    Ok(arn)
}

fn validate_name(name: &str) -> Result<String> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
        && !name.starts_with("internal-");
    if valid {
        Ok(name.to_string())
    } else {
        Err(BuildError::config(format!("invalid load balancer name {name:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn input<'a>(
        gateway: &'a NamespacedName,
        lb_config: &'a LoadBalancerConfigurationSpec,
        lb_type: LoadBalancerType,
        scheme: Scheme,
        ip: IpAddressType,
    ) -> LoadBalancerInput<'a> {
        LoadBalancerInput {
            gateway,
            load_balancer_type: lb_type,
            scheme,
            ip_address_type: ip,
            lb_config,
            subnet_mappings: vec![SubnetMapping::new("subnet-a")],
            security_groups: vec![StringToken::literal("sg-1")],
        }
    }

    #[test]
    fn hashed_name_and_tags() {
        let mut config = BuilderConfig::new("prod", "vpc-1");
        config.default_tags = BTreeMap::from([("team".to_string(), "edge".to_string())]);
        let gateway = NamespacedName::new("shop", "public");
        let lb_config = LoadBalancerConfigurationSpec::default();
        let mut stack = Stack::new(gateway.clone());

        let arn = build_load_balancer(
            &config,
            &mut stack,
            input(&gateway, &lb_config, LoadBalancerType::Application, Scheme::Internal, IpAddressType::Ipv4),
        )
        .unwrap();
        assert!(arn.as_reference().is_some());

        let lb = stack.get_as::<LoadBalancer>(LOAD_BALANCER_ID).unwrap();
        assert!(lb.spec.name.starts_with("k8s-shop-public-"));
        assert_eq!(lb.spec.tags["team"], "edge");
        assert_eq!(lb.arn(), arn);
    }

    #[test]
    fn unsupported_combinations() {
        let config = BuilderConfig::default();
        let gateway = NamespacedName::new("shop", "public");
        let mut stack = Stack::new(gateway.clone());

        let plain = LoadBalancerConfigurationSpec::default();
        let err = build_load_balancer(
            &config,
            &mut stack,
            input(
                &gateway,
                &plain,
                LoadBalancerType::Network,
                Scheme::InternetFacing,
                IpAddressType::DualstackWithoutPublicIpv4,
            ),
        )
        .unwrap_err();
        assert!(err.is_configuration_error());

        let coip = LoadBalancerConfigurationSpec {
            customer_owned_ipv4_pool: Some("ipv4pool-coip-1".into()),
            ..Default::default()
        };
        assert!(build_load_balancer(
            &config,
            &mut stack,
            input(&gateway, &coip, LoadBalancerType::Network, Scheme::Internal, IpAddressType::Ipv4),
        )
        .is_err());

        let bad_name = LoadBalancerConfigurationSpec {
            load_balancer_name: Some("internal-shop".into()),
            ..Default::default()
        };
        assert!(build_load_balancer(
            &config,
            &mut stack,
            input(&gateway, &bad_name, LoadBalancerType::Application, Scheme::Internal, IpAddressType::Ipv4),
        )
        .is_err());
        assert!(stack.is_empty());
    }

    #[test]
    fn explicit_name_and_pools() {
        let config = BuilderConfig::default();
        let gateway = NamespacedName::new("shop", "public");
        let lb_config = LoadBalancerConfigurationSpec {
            load_balancer_name: Some("shop-public".into()),
            ipv4_ipam_pool_id: Some("ipam-pool-1".into()),
            ..Default::default()
        };
        let mut stack = Stack::new(gateway.clone());
        build_load_balancer(
            &config,
            &mut stack,
            input(
                &gateway,
                &lb_config,
                LoadBalancerType::Application,
                Scheme::InternetFacing,
                IpAddressType::DualstackWithoutPublicIpv4,
            ),
        )
        .unwrap();
        let lb = stack.get_as::<LoadBalancer>(LOAD_BALANCER_ID).unwrap();
        assert_eq!(lb.spec.name, "shop-public");
        assert_eq!(lb.spec.ipv4_ipam_pool.as_deref(), Some("ipam-pool-1"));
    }
}
