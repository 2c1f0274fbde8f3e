//! Kubernetes-side target group bindings.
//!
//! A binding associates a deployed target group with a Service so that the
//! in-cluster controller can register pods or nodes as targets, and carries the
//! ingress rules the backend security group needs for load balancer traffic.

use std::collections::BTreeMap;

use gateway_lb_core::StringToken;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::{Deserialize, Serialize};

use crate::elbv2::{TargetGroupIpAddressType, TargetType};

/// Resource type of a target group binding.
pub const TARGET_GROUP_BINDING_TYPE: &str = "K8S::ElasticLoadBalancingV2::TargetGroupBinding";

/// Transport protocol of an ingress rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NetworkingProtocol {
    /// TCP.
    #[serde(rename = "TCP")]
    Tcp,
    /// UDP.
    #[serde(rename = "UDP")]
    Udp,
}

/// Source of an ingress rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NetworkingPeer {
    /// A CIDR block.
    IpBlock {
        /// IPv4 or IPv6 CIDR.
        cidr: String,
    },
    /// A security group.
    SecurityGroup {
        /// Group ID, possibly deferred.
        #[serde(rename = "groupID")]
        group_id: StringToken,
    },
}

/// A port an ingress rule applies to. `port = None` means all ports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkingPort {
    /// Protocol; `None` means all protocols.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<NetworkingProtocol>,
    /// Port number or named port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<IntOrString>,
}

/// One ingress rule on the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkingIngressRule {
    /// Allowed sources.
    pub from: Vec<NetworkingPeer>,
    /// Allowed ports.
    pub ports: Vec<NetworkingPort>,
}

/// Ingress rules of a binding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetGroupBindingNetworking {
    /// Ingress rules.
    pub ingress: Vec<NetworkingIngressRule>,
}

/// The Service and port targets are taken from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceReference {
    /// Service name.
    pub name: String,
    /// Service port, by number or name.
    pub port: IntOrString,
}

/// Metadata of the binding object to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingTemplate {
    /// Object name.
    pub name: String,
    /// Object namespace (the Service's namespace).
    pub namespace: String,
    /// Labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Desired state of a target group binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupBindingSpec {
    /// Binding object metadata.
    pub template: BindingTemplate,
    /// Deferred target group ARN.
    #[serde(rename = "targetGroupARN")]
    pub target_group_arn: StringToken,
    /// Target group name, for diagnostics.
    pub target_group_name: String,
    /// Target type.
    pub target_type: TargetType,
    /// Service providing targets.
    pub service_ref: ServiceReference,
    /// Ingress rules; `None` when security group rules are unmanaged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networking: Option<TargetGroupBindingNetworking>,
    /// Node selector (instance targets only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<LabelSelector>,
    /// Address family of targets.
    pub ip_address_type: TargetGroupIpAddressType,
    /// VPC of the targets.
    #[serde(rename = "vpcID")]
    pub vpc_id: String,
    /// Whether targets outside this cluster may be registered.
    #[serde(default)]
    pub multi_cluster_target_group: bool,
}

/// A target group binding registered in a stack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetGroupBinding {
    #[serde(skip)]
    id: String,
    /// Desired state.
    pub spec: TargetGroupBindingSpec,
}

impl TargetGroupBinding {
    /// Create a binding resource.
    #[must_use]
    pub fn new(id: impl Into<String>, spec: TargetGroupBindingSpec) -> Self {
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
