//! External collaborators the builders consume.
//!
//! Every lookup that leaves the process (ACM, EC2, ELBv2, Kubernetes Secrets)
//! goes through one of these traits. Implementations own caching, retries and
//! pagination; the builders only wrap their errors with context.
//!
//! [`inventory::Inventory`] implements all of them over static data.

pub mod inventory;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use gateway_lb_core::NamespacedName;
use gateway_lb_model::{LoadBalancerType, Scheme};
use ipnet::{Ipv4Net, Ipv6Net};
use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;

pub use inventory::Inventory;

/// Placement class of a subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ZoneType {
    /// Regular availability zone.
    #[default]
    AvailabilityZone,
    /// Local zone.
    LocalZone,
    /// Outpost.
    Outpost,
}

/// A resolved VPC subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    /// Subnet ID.
    pub id: String,
    /// Availability zone name.
    pub availability_zone: String,
    /// Zone placement.
    #[serde(default)]
    pub zone_type: ZoneType,
    /// IPv4 CIDR block.
    #[serde(default)]
    pub ipv4_cidr: Option<Ipv4Net>,
    /// IPv6 CIDR block.
    #[serde(default)]
    pub ipv6_cidr: Option<Ipv6Net>,
    /// Subnet tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Subnet {
    /// Whether the subnet is in a local zone or outpost.
    #[must_use]
    pub fn is_local_zone_or_outpost(&self) -> bool {
        self.zone_type != ZoneType::AvailabilityZone
    }

    /// Value of the `Name` tag.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.tags.get("Name").map(String::as_str)
    }
}

/// CIDR blocks associated with a VPC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcCidrs {
    /// IPv4 blocks.
    #[serde(default)]
    pub ipv4: Vec<Ipv4Net>,
    /// IPv6 blocks.
    #[serde(default)]
    pub ipv6: Vec<Ipv6Net>,
}

/// Whether a lookup may be served from cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Cached values are acceptable.
    Cached,
    /// Always fetch fresh values.
    Uncached,
}

/// Finds certificates covering a set of hostnames.
#[async_trait]
pub trait CertificateDiscovery: Send + Sync {
    /// Return the ARNs of certificates matching `hostnames`.
    async fn discover(&self, hostnames: &[String]) -> ProviderResult<Vec<String>>;
}

/// Resolves trust store names to ARNs.
#[async_trait]
pub trait TrustStoreResolver: Send + Sync {
    /// Return the ARN of the named trust store.
    async fn trust_store_arn(&self, name: &str) -> ProviderResult<String>;
}

/// VPC metadata.
#[async_trait]
pub trait VpcInfoProvider: Send + Sync {
    /// Return the CIDR blocks of a VPC.
    async fn cidr_blocks(&self, vpc_id: &str, mode: FetchMode) -> ProviderResult<VpcCidrs>;
}

/// Subnet lookups.
#[async_trait]
pub trait SubnetResolver: Send + Sync {
    /// Resolve subnets by ID or `Name` tag, preserving order.
    ///
    /// The result must be index-aligned with `ids`: subnet mutators pair the
    /// i-th subnet with the i-th subnet configuration.
    async fn resolve_by_ids(&self, ids: &[String]) -> ProviderResult<Vec<Subnet>>;

    /// Resolve subnets whose tags match every selector key.
    async fn resolve_by_selector(
        &self,
        selector: &BTreeMap<String, Vec<String>>,
    ) -> ProviderResult<Vec<Subnet>>;

    /// Discover subnets suitable for a load balancer.
    async fn discover_subnets(
        &self,
        load_balancer_type: LoadBalancerType,
        scheme: Scheme,
    ) -> ProviderResult<Vec<Subnet>>;
}

/// Security group name/ID resolution.
#[async_trait]
pub trait SecurityGroupResolver: Send + Sync {
    /// Resolve names or IDs to IDs, preserving order.
    async fn resolve_names_or_ids(&self, names_or_ids: &[String]) -> ProviderResult<Vec<String>>;
}

/// Allocates or fetches the shared backend security group.
#[async_trait]
pub trait BackendSecurityGroupProvider: Send + Sync {
    /// Return the backend security group ID for the given owners.
    async fn backend_security_group(
        &self,
        resource_type: &str,
        owners: &[NamespacedName],
    ) -> ProviderResult<String>;
}

/// Resolves existing target groups by name.
#[async_trait]
pub trait TargetGroupArnResolver: Send + Sync {
    /// Return the ARN of the named target group.
    async fn target_group_arn(&self, name: &str) -> ProviderResult<String>;
}

/// Reads Kubernetes Secrets.
#[async_trait]
pub trait SecretReader: Send + Sync {
    /// Return the decoded data of a Secret.
    async fn read_secret(&self, secret: &NamespacedName) -> ProviderResult<BTreeMap<String, String>>;
}

/// The full set of collaborators handed to a builder.
#[derive(Clone)]
pub struct Providers {
    /// Certificate discovery.
    pub certificates: Arc<dyn CertificateDiscovery>,
    /// Trust store lookup.
    pub trust_stores: Arc<dyn TrustStoreResolver>,
    /// VPC metadata.
    pub vpc: Arc<dyn VpcInfoProvider>,
    /// Subnet lookup.
    pub subnets: Arc<dyn SubnetResolver>,
    /// Security group lookup.
    pub security_groups: Arc<dyn SecurityGroupResolver>,
    /// Backend security group allocation.
    pub backend_security_groups: Arc<dyn BackendSecurityGroupProvider>,
    /// Static target group lookup.
    pub target_groups: Arc<dyn TargetGroupArnResolver>,
    /// Secret access.
    pub secrets: Arc<dyn SecretReader>,
}

impl Providers {
    /// Serve every lookup from one inventory.
    #[must_use]
    pub fn from_inventory(inventory: Arc<Inventory>) -> Self {
        Self {
            certificates: Arc::clone(&inventory) as Arc<dyn CertificateDiscovery>,
            trust_stores: Arc::clone(&inventory) as Arc<dyn TrustStoreResolver>,
            vpc: Arc::clone(&inventory) as Arc<dyn VpcInfoProvider>,
            subnets: Arc::clone(&inventory) as Arc<dyn SubnetResolver>,
            security_groups: Arc::clone(&inventory) as Arc<dyn SecurityGroupResolver>,
            backend_security_groups: Arc::clone(&inventory) as Arc<dyn BackendSecurityGroupProvider>,
            target_groups: Arc::clone(&inventory) as Arc<dyn TargetGroupArnResolver>,
            secrets: inventory as Arc<dyn SecretReader>,
        }
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers").finish_non_exhaustive()
    }
}
