//! Gateway to load balancer compilation.
//!
//! This crate turns one Gateway, its attached routes and its configuration
//! resources into a [`Stack`](gateway_lb_model::Stack) describing the load
//! balancer that should exist. It handles:
//!
//! - Subnet resolution, explicit or tag-based, with per-subnet address options
//! - The managed security group and the shared backend security group
//! - Listeners with certificates, ALPN and mutual TLS
//! - Listener rules with authentication, redirect, fixed-response and forward
//!   actions
//! - Target groups and target group bindings, deduplicated per route, service
//!   and port
//!
//! Cloud lookups go through the traits in [`providers`]. [`Inventory`] backs
//! all of them with static data for tests and offline compilation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     GatewayModelBuilder                       │
//! │  ┌──────────┐  ┌────────────────┐  ┌───────────────────────┐ │
//! │  │ Subnets  │  │ SecurityGroups │  │     LoadBalancer      │ │
//! │  └──────────┘  └────────────────┘  └───────────────────────┘ │
//! │                         │                                     │
//! │          ┌──────────────┴──────────────┐                      │
//! │          ▼                             ▼                      │
//! │   ┌─────────────┐               ┌─────────────┐               │
//! │   │  Listeners  │──────────────▶│    Rules    │               │
//! │   └─────────────┘               └─────────────┘               │
//! │          │                             │                      │
//! │          └──────────────┬──────────────┘                      │
//! │                         ▼                                     │
//! │              ┌─────────────────────┐                          │
//! │              │ TargetGroups + TGBs │                          │
//! │              └─────────────────────┘                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! use gateway_lb_builder::{BuildRequest, BuilderConfig, GatewayModelBuilder, Inventory, Providers};
//! use gateway_lb_model::crd::{Gateway, GatewaySpec};
//! use gateway_lb_model::LoadBalancerType;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let inventory: Inventory = serde_json::from_str(&std::fs::read_to_string("inventory.json")?)?;
//! let builder = GatewayModelBuilder::new(
//!     BuilderConfig::from_env(),
//!     Providers::from_inventory(Arc::new(inventory)),
//! );
//!
//! let gateway = Gateway::new(
//!     "public",
//!     GatewaySpec {
//!         gateway_class_name: "aws-alb".to_string(),
//!         listeners: Vec::new(),
//!     },
//! );
//! let output = builder
//!     .build(BuildRequest {
//!         gateway,
//!         load_balancer_type: LoadBalancerType::Application,
//!         lb_config: None,
//!         routes_by_port: BTreeMap::new(),
//!         existing: None,
//!     })
//!     .await?;
//! println!("{} resources", output.stack.len());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod listener;
pub mod loadbalancer;
pub mod model;
pub mod naming;
pub mod providers;
pub mod routes;
pub mod rules;
pub mod security_group;
pub mod subnets;
pub mod tags;
pub mod target_group;
pub mod tgb_network;

pub use config::{BuilderConfig, TagPrecedence};
pub use error::{BuildError, ProviderError, Result};
pub use model::{BuildOutput, BuildRequest, GatewayModelBuilder};
pub use providers::{Inventory, Providers};
pub use routes::{
    Backend, DeclarationOrder, GatewayBackend, LoadedRoute, RouteDescriptor, RouteKind, RouteRule,
    RulePrecedenceSorter, ServiceBackend, StaticTargetGroupBackend,
};
pub use subnets::ExistingLoadBalancer;
