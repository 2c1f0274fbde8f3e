//! End-to-end tests for the `gwlb` binary.

use std::io::Write;
use std::process::Command;

use serde_json::{json, Value};

fn run(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_gwlb"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run gwlb")
}

fn write_bundle(bundle: &Value) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(bundle.to_string().as_bytes()).unwrap();
    file
}

fn subnet(id: &str, az: &str, cidr: &str) -> Value {
    json!({
        "id": id,
        "availabilityZone": az,
        "ipv4Cidr": cidr,
        "tags": { "kubernetes.io/role/internal-elb": "1" }
    })
}

fn bundle() -> Value {
    json!({
        "config": { "clusterName": "prod", "vpcId": "vpc-1" },
        "gateway": {
            "apiVersion": "gateway.networking.k8s.io/v1",
            "kind": "Gateway",
            "metadata": { "name": "public", "namespace": "shop" },
            "spec": {
                "gatewayClassName": "aws-alb",
                "listeners": [{ "name": "http", "port": 80, "protocol": "HTTP" }]
            }
        },
        "loadBalancerType": "application",
        "routes": [{
            "ports": [80],
            "namespace": "shop",
            "name": "cart",
            "kind": "HTTPRoute",
            "rules": [{
                "conditions": [{ "field": "path-pattern", "values": ["/cart"] }],
                "backends": [{
                    "type": "service",
                    "service": {
                        "metadata": { "name": "cart", "namespace": "shop" },
                        "spec": { "ports": [{ "port": 80, "nodePort": 30080, "targetPort": 8080 }] }
                    },
                    "port": 80
                }]
            }]
        }],
        "inventory": {
            "subnets": [
                subnet("subnet-a", "us-east-1a", "10.0.1.0/24"),
                subnet("subnet-b", "us-east-1b", "10.0.2.0/24")
            ],
            "backendSecurityGroup": "sg-backend"
        }
    })
}

#[test]
fn compiles_bundle_to_stack_json() {
    let file = write_bundle(&bundle());
    let output = run(&["compile", "--bundle", file.path().to_str().unwrap()]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let rendered: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rendered["stack"]["id"], "shop/public");
    let resources = rendered["stack"]["resources"].as_object().unwrap();
    assert!(resources.contains_key("AWS::ElasticLoadBalancingV2::LoadBalancer"));
    assert!(resources.contains_key("AWS::ElasticLoadBalancingV2::Listener"));
    assert_eq!(rendered["targetGroupArns"].as_object().unwrap().len(), 1);
}

#[test]
fn configuration_errors_fail_the_command() {
    let mut broken = bundle();
    broken["routes"][0]["ports"] = json!([81]);
    let file = write_bundle(&broken);

    let output = run(&["compile", "--bundle", file.path().to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("port 81"));
}

#[test]
fn prints_configuration_crds() {
    let output = run(&["crds"]);
    assert!(output.status.success());
    let crds: Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<_> = crds
        .as_array()
        .unwrap()
        .iter()
        .map(|crd| crd["metadata"]["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "loadbalancerconfigurations.gateway.k8s.aws",
            "targetgroupconfigurations.gateway.k8s.aws",
            "listenerruleconfigurations.gateway.k8s.aws",
        ]
    );
}
