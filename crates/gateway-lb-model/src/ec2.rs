//! EC2 security group specifications.

use std::collections::BTreeMap;

use gateway_lb_core::{ResourceId, StringToken};
use serde::{Deserialize, Serialize};

/// Resource type of a managed security group.
pub const SECURITY_GROUP_TYPE: &str = "AWS::EC2::SecurityGroup";

/// An IPv4 source range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpRange {
    /// CIDR block.
    #[serde(rename = "cidrIP")]
    pub cidr_ip: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An IPv6 source range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ipv6Range {
    /// CIDR block.
    #[serde(rename = "cidrIPv6")]
    pub cidr_ipv6: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A managed prefix list source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrefixListId {
    /// Prefix list ID.
    #[serde(rename = "prefixListID")]
    pub prefix_list_id: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One ingress permission on a security group.
///
/// Each permission carries exactly one source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpPermission {
    /// `tcp`, `udp`, `icmp` or `icmpv6`.
    pub ip_protocol: String,
    /// First port, or ICMP type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_port: Option<i32>,
    /// Last port, or ICMP code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_port: Option<i32>,
    /// IPv4 sources.
    #[serde(rename = "ipRanges", default, skip_serializing_if = "Vec::is_empty")]
    pub ip_ranges: Vec<IpRange>,
    /// IPv6 sources.
    #[serde(rename = "ipv6Ranges", default, skip_serializing_if = "Vec::is_empty")]
    pub ipv6_ranges: Vec<Ipv6Range>,
    /// Prefix list sources.
    #[serde(rename = "prefixLists", default, skip_serializing_if = "Vec::is_empty")]
    pub prefix_lists: Vec<PrefixListId>,
}

impl IpPermission {
    fn ports(ip_protocol: &str, from: i32, to: i32) -> Self {
        Self {
            ip_protocol: ip_protocol.to_string(),
            from_port: Some(from),
            to_port: Some(to),
            ip_ranges: Vec::new(),
            ipv6_ranges: Vec::new(),
            prefix_lists: Vec::new(),
        }
    }

    /// A permission from an IPv4 CIDR.
    #[must_use]
    pub fn ipv4(ip_protocol: &str, from: i32, to: i32, cidr: impl Into<String>) -> Self {
        let mut perm = Self::ports(ip_protocol, from, to);
        perm.ip_ranges.push(IpRange {
            cidr_ip: cidr.into(),
            description: None,
        });
        perm
    }

    /// A permission from an IPv6 CIDR.
    #[must_use]
    pub fn ipv6(ip_protocol: &str, from: i32, to: i32, cidr: impl Into<String>) -> Self {
        let mut perm = Self::ports(ip_protocol, from, to);
        perm.ipv6_ranges.push(Ipv6Range {
            cidr_ipv6: cidr.into(),
            description: None,
        });
        perm
    }

    /// A permission from a managed prefix list.
    #[must_use]
    pub fn prefix_list(ip_protocol: &str, from: i32, to: i32, id: impl Into<String>) -> Self {
        let mut perm = Self::ports(ip_protocol, from, to);
        perm.prefix_lists.push(PrefixListId {
            prefix_list_id: id.into(),
            description: None,
        });
        perm
    }
}

/// Desired state of a managed security group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupSpec {
    /// Group name.
    pub group_name: String,
    /// Group description.
    pub description: String,
    /// Tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Ingress permissions.
    pub ingress: Vec<IpPermission>,
}

/// A security group registered in a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityGroup {
    #[serde(skip)]
    id: String,
    /// Desired state.
    pub spec: SecurityGroupSpec,
}

impl SecurityGroup {
    /// Create a security group resource.
    #[must_use]
    pub fn new(id: impl Into<String>, spec: SecurityGroupSpec) -> Self {
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

    /// Deferred ID of the deployed group.
    #[must_use]
    pub fn group_id(&self) -> StringToken {
        StringToken::reference(ResourceId::new(SECURITY_GROUP_TYPE, &self.id), "groupID")
    }
}
