//! Resource model for gateway-lb.
//!
//! This crate defines what a compilation produces and what it reads:
//!
//! - **Stack**: the typed resource graph ([`Stack`]) that builders register
//!   resources into
//! - **ELBv2 / EC2 specs**: load balancers, listeners, rules, target groups and
//!   security groups, cross-referenced through deferred string tokens
//! - **Bindings**: Kubernetes-side target group bindings with their ingress rules
//! - **CRDs**: the Gateway projection and the `gateway.k8s.aws` configuration
//!   resources
//!
//! # Example
//!
//! ```
//! use gateway_lb_core::NamespacedName;
//! use gateway_lb_model::{SecurityGroup, SecurityGroupSpec, Stack};
//!
//! let mut stack = Stack::new(NamespacedName::new("default", "web"));
//! let sg = SecurityGroup::new(
//!     "ManagedLBSecurityGroup",
//!     SecurityGroupSpec {
//!         group_name: "k8s-default-web-0123456789".to_string(),
//!         description: "[k8s] Managed SecurityGroup for LoadBalancer".to_string(),
//!         tags: Default::default(),
//!         ingress: Vec::new(),
//!     },
//! );
//! let group_id = sg.group_id();
//! stack.add(sg).unwrap();
//!
//! assert_eq!(stack.list::<SecurityGroup>().len(), 1);
//! assert!(group_id.as_reference().is_some());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod binding;
pub mod crd;
pub mod ec2;
pub mod elbv2;
pub mod error;
pub mod stack;

pub use binding::{
    NetworkingIngressRule, NetworkingPeer, NetworkingPort, NetworkingProtocol, TargetGroupBinding,
    TargetGroupBindingSpec,
};
pub use ec2::{IpPermission, SecurityGroup, SecurityGroupSpec};
pub use elbv2::{
    Action, IpAddressType, Listener, ListenerRule, ListenerRuleSpec, ListenerSpec, LoadBalancer,
    LoadBalancerSpec, LoadBalancerType, Protocol, Scheme, SubnetMapping, TargetGroup,
    TargetGroupSpec, TargetType,
};
pub use error::ParseError;
pub use stack::{Resource, Stack, StackResource};
