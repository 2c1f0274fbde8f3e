//! JSON input bundles.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use gateway_lb_builder::{
    BuildRequest, BuilderConfig, ExistingLoadBalancer, Inventory, LoadedRoute, RouteDescriptor,
};
use gateway_lb_model::crd::{Gateway, LoadBalancerConfigurationSpec};
use gateway_lb_model::LoadBalancerType;
use serde::Deserialize;

/// A route and the listener ports it is attached to.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedRoute {
    /// Listener ports.
    pub ports: Vec<i32>,
    /// The route.
    #[serde(flatten)]
    pub route: LoadedRoute,
}

/// Everything needed to compile one Gateway offline.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    /// Builder settings; falls back to the environment when absent.
    #[serde(default)]
    pub config: Option<BuilderConfig>,
    /// The Gateway.
    pub gateway: Gateway,
    /// Load balancer type implied by the Gateway's class.
    pub load_balancer_type: LoadBalancerType,
    /// Attached `LoadBalancerConfiguration` spec.
    #[serde(default)]
    pub lb_config: Option<LoadBalancerConfigurationSpec>,
    /// Attached routes.
    #[serde(default)]
    pub routes: Vec<AttachedRoute>,
    /// Cloud state the providers answer from.
    #[serde(default)]
    pub inventory: Inventory,
    /// The currently deployed load balancer.
    #[serde(default)]
    pub existing: Option<ExistingLoadBalancer>,
}

impl Bundle {
    /// Read a bundle from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading bundle {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing bundle {}", path.display()))
    }

    /// Split into builder config, inventory and request.
    ///
    /// Every port a route names gets an entry, so ports whose routes were
    /// all filtered upstream still show up as empty.
    pub fn into_parts(self) -> (BuilderConfig, Arc<Inventory>, BuildRequest) {
        let config = self.config.unwrap_or_else(BuilderConfig::from_env);

        let mut routes_by_port: BTreeMap<i32, Vec<Arc<dyn RouteDescriptor>>> = BTreeMap::new();
        for attached in self.routes {
            let route: Arc<dyn RouteDescriptor> = Arc::new(attached.route);
            for port in attached.ports {
                routes_by_port.entry(port).or_default().push(Arc::clone(&route));
            }
        }

        let request = BuildRequest {
            gateway: self.gateway,
            load_balancer_type: self.load_balancer_type,
            lb_config: self.lb_config,
            routes_by_port,
            existing: self.existing,
        };
        (config, Arc::new(self.inventory), request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_fan_out_by_port() {
        let bundle: Bundle = serde_json::from_value(serde_json::json!({
            "gateway": {
                "apiVersion": "gateway.networking.k8s.io/v1",
                "kind": "Gateway",
                "metadata": { "name": "public", "namespace": "shop" },
                "spec": { "gatewayClassName": "aws-alb", "listeners": [] }
            },
            "loadBalancerType": "application",
            "config": { "clusterName": "prod" },
            "routes": [
                { "ports": [80, 443], "namespace": "shop", "name": "cart", "kind": "HTTPRoute" },
                { "ports": [80], "namespace": "shop", "name": "search", "kind": "HTTPRoute" }
            ]
        }))
        .unwrap();

        let (config, _inventory, request) = bundle.into_parts();
        assert_eq!(config.cluster_name, "prod");
        assert_eq!(request.routes_by_port[&80].len(), 2);
        assert_eq!(request.routes_by_port[&443].len(), 1);
        assert!(request.lb_config.is_none());
    }
}
