//! Controller-wide defaults injected into every builder.

use std::collections::{BTreeMap, BTreeSet};

use gateway_lb_model::{IpAddressType, Scheme, TargetType};
use serde::{Deserialize, Serialize};

/// Which side wins when default tags and object tags share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TagPrecedence {
    /// Object tags override defaults.
    #[default]
    OverridesWin,
    /// Default tags override object tags.
    DefaultsWin,
}

/// Immutable configuration shared by one compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuilderConfig {
    /// Cluster name, mixed into generated resource names.
    pub cluster_name: String,
    /// VPC the cluster runs in.
    pub vpc_id: String,
    /// SSL policy for secure listeners without an explicit one.
    pub default_ssl_policy: String,
    /// Target type when neither the Service nor a configuration sets one.
    pub default_target_type: TargetType,
    /// Scheme when the load balancer configuration does not set one.
    pub default_scheme: Scheme,
    /// IP address type when the load balancer configuration does not set one.
    pub default_ip_address_type: IpAddressType,
    /// Tags applied to every resource.
    pub default_tags: BTreeMap<String, String>,
    /// Tag keys owned by external tooling; user tags may not use them.
    pub external_managed_tags: BTreeSet<String>,
    /// Merge direction of default and object tags.
    pub tag_precedence: TagPrecedence,
    /// Allocate a shared backend security group for target access.
    pub enable_backend_security_group: bool,
    /// Emit port-agnostic backend ingress rules.
    pub disable_restricted_sg_rules: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            cluster_name: "default".to_string(),
            vpc_id: String::new(),
            default_ssl_policy: "ELBSecurityPolicy-2016-08".to_string(),
            default_target_type: TargetType::Instance,
            default_scheme: Scheme::Internal,
            default_ip_address_type: IpAddressType::Ipv4,
            default_tags: BTreeMap::new(),
            external_managed_tags: BTreeSet::new(),
            tag_precedence: TagPrecedence::OverridesWin,
            enable_backend_security_group: true,
            disable_restricted_sg_rules: false,
        }
    }
}

impl BuilderConfig {
    /// Create a config for the given cluster and VPC.
    #[must_use]
    pub fn new(cluster_name: impl Into<String>, vpc_id: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            vpc_id: vpc_id.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `GATEWAY_LB_CLUSTER_NAME`: cluster name
    /// - `GATEWAY_LB_VPC_ID`: VPC ID
    /// - `GATEWAY_LB_DEFAULT_SSL_POLICY`: default SSL policy
    /// - `GATEWAY_LB_DEFAULT_TARGET_TYPE`: `instance` or `ip`
    /// - `GATEWAY_LB_DEFAULT_SCHEME`: `internal` or `internet-facing`
    /// - `GATEWAY_LB_DEFAULT_TAGS`: `key=value,key=value`
    /// - `GATEWAY_LB_EXTERNAL_MANAGED_TAGS`: `key,key`
    /// - `GATEWAY_LB_TAG_PRECEDENCE`: `overrides-win` or `defaults-win`
    /// - `GATEWAY_LB_ENABLE_BACKEND_SG`: `true` or `false`
    /// - `GATEWAY_LB_DISABLE_RESTRICTED_SG_RULES`: `true` or `false`
    ///
    /// Unparseable values keep the default.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("GATEWAY_LB_CLUSTER_NAME") {
            config.cluster_name = val;
        }
        if let Ok(val) = std::env::var("GATEWAY_LB_VPC_ID") {
            config.vpc_id = val;
        }
        if let Ok(val) = std::env::var("GATEWAY_LB_DEFAULT_SSL_POLICY") {
            config.default_ssl_policy = val;
        }
        if let Ok(val) = std::env::var("GATEWAY_LB_DEFAULT_TARGET_TYPE") {
            config.default_target_type = match val.to_lowercase().as_str() {
                "ip" => TargetType::Ip,
                "instance" => TargetType::Instance,
                _ => config.default_target_type,
            };
        }
        if let Ok(val) = std::env::var("GATEWAY_LB_DEFAULT_SCHEME") {
            config.default_scheme = match val.to_lowercase().as_str() {
                "internet-facing" => Scheme::InternetFacing,
                "internal" => Scheme::Internal,
                _ => config.default_scheme,
            };
        }
        if let Ok(val) = std::env::var("GATEWAY_LB_DEFAULT_TAGS") {
            config.default_tags = parse_tag_list(&val);
        }
        if let Ok(val) = std::env::var("GATEWAY_LB_EXTERNAL_MANAGED_TAGS") {
            config.external_managed_tags = parse_key_list(&val);
        }
        if let Ok(val) = std::env::var("GATEWAY_LB_TAG_PRECEDENCE") {
            config.tag_precedence = match val.to_lowercase().as_str() {
                "defaults-win" => TagPrecedence::DefaultsWin,
                "overrides-win" => TagPrecedence::OverridesWin,
                _ => config.tag_precedence,
            };
        }
        if let Ok(val) = std::env::var("GATEWAY_LB_ENABLE_BACKEND_SG") {
            if let Ok(b) = val.parse() {
                config.enable_backend_security_group = b;
            }
        }
        if let Ok(val) = std::env::var("GATEWAY_LB_DISABLE_RESTRICTED_SG_RULES") {
            if let Ok(b) = val.parse() {
                config.disable_restricted_sg_rules = b;
            }
        }

        config
    }
}

/// Parse `k=v,k2=v2`; entries without `=` are ignored.
fn parse_tag_list(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

fn parse_key_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}
