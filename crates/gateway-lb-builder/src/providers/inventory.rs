//! Static, in-memory implementation of every collaborator.
//!
//! Used by the offline compiler and by tests. Lookups are answered from data
//! loaded at construction; calls that matter for assertions are recorded.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use gateway_lb_core::NamespacedName;
use gateway_lb_model::{LoadBalancerType, Scheme};
use parking_lot::Mutex;
use serde::Deserialize;

use super::{
    BackendSecurityGroupProvider, CertificateDiscovery, FetchMode, SecretReader,
    SecurityGroupResolver, Subnet, SubnetResolver, TargetGroupArnResolver, TrustStoreResolver,
    VpcCidrs, VpcInfoProvider,
};
use crate::error::{ProviderError, ProviderResult};

const ELB_ROLE_TAG: &str = "kubernetes.io/role/elb";
const INTERNAL_ELB_ROLE_TAG: &str = "kubernetes.io/role/internal-elb";

/// A certificate and the domains it covers.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRecord {
    /// Certificate ARN.
    pub arn: String,
    /// Covered domains, possibly wildcards.
    pub domains: Vec<String>,
}

/// A security group known by ID and name.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityGroupRecord {
    /// Group ID.
    pub id: String,
    /// Group name.
    pub name: String,
}

/// Calls recorded by an [`Inventory`].
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    /// Hostname sets passed to certificate discovery.
    pub certificate_discoveries: Vec<Vec<String>>,
    /// Fetch modes of VPC CIDR lookups.
    pub vpc_lookups: Vec<FetchMode>,
    /// Secrets read.
    pub secret_reads: Vec<NamespacedName>,
}

/// Collaborator data loaded from JSON or built in code.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    #[serde(default)]
    subnets: Vec<Subnet>,
    #[serde(default)]
    certificates: Vec<CertificateRecord>,
    #[serde(default)]
    trust_stores: BTreeMap<String, String>,
    #[serde(default)]
    vpcs: BTreeMap<String, VpcCidrs>,
    #[serde(default)]
    security_groups: Vec<SecurityGroupRecord>,
    #[serde(default)]
    backend_security_group: Option<String>,
    #[serde(default)]
    target_groups: BTreeMap<String, String>,
    /// Keyed by `namespace/name`.
    #[serde(default)]
    secrets: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(skip)]
    calls: Mutex<CallLog>,
}

impl Inventory {
    /// Create an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subnet.
    #[must_use]
    pub fn with_subnet(mut self, subnet: Subnet) -> Self {
        self.subnets.push(subnet);
        self
    }

    /// Add a certificate.
    #[must_use]
    pub fn with_certificate(mut self, arn: &str, domains: &[&str]) -> Self {
        self.certificates.push(CertificateRecord {
            arn: arn.to_string(),
            domains: domains.iter().map(ToString::to_string).collect(),
        });
        self
    }

    /// Add a trust store.
    #[must_use]
    pub fn with_trust_store(mut self, name: &str, arn: &str) -> Self {
        self.trust_stores.insert(name.to_string(), arn.to_string());
        self
    }

    /// Set the CIDR blocks of a VPC.
    #[must_use]
    pub fn with_vpc(mut self, vpc_id: &str, cidrs: VpcCidrs) -> Self {
        self.vpcs.insert(vpc_id.to_string(), cidrs);
        self
    }

    /// Add a security group.
    #[must_use]
    pub fn with_security_group(mut self, id: &str, name: &str) -> Self {
        self.security_groups.push(SecurityGroupRecord {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// Set the backend security group.
    #[must_use]
    pub fn with_backend_security_group(mut self, id: &str) -> Self {
        self.backend_security_group = Some(id.to_string());
        self
    }

    /// Add an existing target group.
    #[must_use]
    pub fn with_target_group(mut self, name: &str, arn: &str) -> Self {
        self.target_groups.insert(name.to_string(), arn.to_string());
        self
    }

    /// Add a Secret.
    #[must_use]
    pub fn with_secret(mut self, secret: &NamespacedName, data: &[(&str, &str)]) -> Self {
        self.secrets.insert(
            secret.to_string(),
            data.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        );
        self
    }

    /// Snapshot of the recorded calls.
    #[must_use]
    pub fn calls(&self) -> CallLog {
        self.calls.lock().clone()
    }
}

fn domain_matches(domain: &str, hostname: &str) -> bool {
    if domain.eq_ignore_ascii_case(hostname) {
        return true;
    }
    match (domain.strip_prefix("*."), hostname.split_once('.')) {
        (Some(suffix), Some((label, rest))) => label != "*" && rest.eq_ignore_ascii_case(suffix),
        _ => false,
    }
}

#[async_trait]
impl CertificateDiscovery for Inventory {
    async fn discover(&self, hostnames: &[String]) -> ProviderResult<Vec<String>> {
        self.calls.lock().certificate_discoveries.push(hostnames.to_vec());
        let mut seen = BTreeSet::new();
        Ok(self
            .certificates
            .iter()
            .filter(|cert| {
                hostnames
                    .iter()
                    .any(|host| cert.domains.iter().any(|d| domain_matches(d, host)))
            })
            .filter(|cert| seen.insert(cert.arn.clone()))
            .map(|cert| cert.arn.clone())
            .collect())
    }
}

#[async_trait]
impl TrustStoreResolver for Inventory {
    async fn trust_store_arn(&self, name: &str) -> ProviderResult<String> {
        self.trust_stores
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("trust store {name}")))
    }
}

#[async_trait]
impl VpcInfoProvider for Inventory {
    async fn cidr_blocks(&self, vpc_id: &str, mode: FetchMode) -> ProviderResult<VpcCidrs> {
        self.calls.lock().vpc_lookups.push(mode);
        self.vpcs
            .get(vpc_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("vpc {vpc_id}")))
    }
}

#[async_trait]
impl SubnetResolver for Inventory {
    async fn resolve_by_ids(&self, ids: &[String]) -> ProviderResult<Vec<Subnet>> {
        ids.iter()
            .map(|id| {
                self.subnets
                    .iter()
                    .find(|s| &s.id == id || s.name() == Some(id.as_str()))
                    .cloned()
                    .ok_or_else(|| ProviderError::NotFound(format!("subnet {id}")))
            })
            .collect()
    }

    async fn resolve_by_selector(
        &self,
        selector: &BTreeMap<String, Vec<String>>,
    ) -> ProviderResult<Vec<Subnet>> {
        let mut matched: Vec<Subnet> = self
            .subnets
            .iter()
            .filter(|s| {
                selector.iter().all(|(key, values)| match s.tags.get(key) {
                    Some(v) => values.is_empty() || values.contains(v),
                    None => false,
                })
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matched)
    }

    async fn discover_subnets(
        &self,
        _load_balancer_type: LoadBalancerType,
        scheme: Scheme,
    ) -> ProviderResult<Vec<Subnet>> {
        let role = match scheme {
            Scheme::InternetFacing => ELB_ROLE_TAG,
            Scheme::Internal => INTERNAL_ELB_ROLE_TAG,
        };
        let mut candidates: Vec<&Subnet> = self
            .subnets
            .iter()
            .filter(|s| matches!(s.tags.get(role).map(String::as_str), Some("" | "1")))
            .collect();
        candidates.sort_by(|a, b| a.id.cmp(&b.id));

        // one subnet per zone
        let mut zones = BTreeSet::new();
        Ok(candidates
            .into_iter()
            .filter(|s| zones.insert(s.availability_zone.clone()))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SecurityGroupResolver for Inventory {
    async fn resolve_names_or_ids(&self, names_or_ids: &[String]) -> ProviderResult<Vec<String>> {
        names_or_ids
            .iter()
            .map(|key| {
                self.security_groups
                    .iter()
                    .find(|sg| &sg.id == key || &sg.name == key)
                    .map(|sg| sg.id.clone())
                    .ok_or_else(|| ProviderError::NotFound(format!("security group {key}")))
            })
            .collect()
    }
}

#[async_trait]
impl BackendSecurityGroupProvider for Inventory {
    async fn backend_security_group(
        &self,
        _resource_type: &str,
        _owners: &[NamespacedName],
    ) -> ProviderResult<String> {
        self.backend_security_group
            .clone()
            .ok_or_else(|| ProviderError::NotFound("backend security group".to_string()))
    }
}

#[async_trait]
impl TargetGroupArnResolver for Inventory {
    async fn target_group_arn(&self, name: &str) -> ProviderResult<String> {
        self.target_groups
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("target group {name}")))
    }
}

#[async_trait]
impl SecretReader for Inventory {
    async fn read_secret(&self, secret: &NamespacedName) -> ProviderResult<BTreeMap<String, String>> {
        self.calls.lock().secret_reads.push(secret.clone());
        self.secrets
            .get(&secret.to_string())
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("secret {secret}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ZoneType;

    fn subnet(id: &str, az: &str, tags: &[(&str, &str)]) -> Subnet {
        Subnet {
            id: id.to_string(),
            availability_zone: az.to_string(),
            zone_type: ZoneType::AvailabilityZone,
            ipv4_cidr: None,
            ipv6_cidr: None,
            tags: tags
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    #[test]
    fn wildcard_domains() {
        assert!(domain_matches("*.example.com", "shop.example.com"));
        assert!(!domain_matches("*.example.com", "a.b.example.com"));
        assert!(!domain_matches("*.example.com", "example.com"));
        assert!(domain_matches("*.example.com", "*.example.com"));
        assert!(domain_matches("Example.com", "example.com"));
    }

    #[tokio::test]
    async fn discovery_filters_by_role_and_zone() {
        let inventory = Inventory::new()
            .with_subnet(subnet("subnet-c", "us-east-1a", &[(ELB_ROLE_TAG, "1")]))
            .with_subnet(subnet("subnet-b", "us-east-1a", &[(ELB_ROLE_TAG, "1")]))
            .with_subnet(subnet("subnet-a", "us-east-1b", &[(ELB_ROLE_TAG, "")]))
            .with_subnet(subnet("subnet-d", "us-east-1c", &[(INTERNAL_ELB_ROLE_TAG, "1")]));

        let found = inventory
            .discover_subnets(LoadBalancerType::Network, Scheme::InternetFacing)
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["subnet-a", "subnet-b"]);
    }

    #[tokio::test]
    async fn resolves_by_name_tag_and_records_calls() {
        let inventory = Inventory::new()
            .with_subnet(subnet("subnet-1", "us-east-1a", &[("Name", "public-a")]))
            .with_certificate("arn:cert/1", &["*.example.com"]);

        let found = inventory
            .resolve_by_ids(&["public-a".to_string()])
            .await
            .unwrap();
        assert_eq!(found[0].id, "subnet-1");
        assert!(inventory.resolve_by_ids(&["nope".to_string()]).await.is_err());

        let arns = inventory
            .discover(&["shop.example.com".to_string()])
            .await
            .unwrap();
        assert_eq!(arns, ["arn:cert/1"]);
        assert_eq!(inventory.calls().certificate_discoveries.len(), 1);
    }
}
