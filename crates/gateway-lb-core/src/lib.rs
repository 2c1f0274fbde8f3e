//! Core types and utilities for gateway-lb.
//!
//! This crate provides the foundational types shared by the model and builder crates:
//!
//! - **Identifiers**: Kubernetes namespaced names and stack resource IDs
//! - **String tokens**: literal values or deferred references to attributes of
//!   other resources that are only known after deployment
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use gateway_lb_core::{NamespacedName, ResourceId, StringToken};
//!
//! let gateway = NamespacedName::new("default", "web");
//! assert_eq!(gateway.to_string(), "default/web");
//!
//! let tg = ResourceId::new("AWS::ElasticLoadBalancingV2::TargetGroup", "default/web:80");
//! let arn = StringToken::reference(tg, "targetGroupARN");
//! assert!(arn.as_literal().is_none());
//!
//! let literal = StringToken::literal("sg-0123");
//! assert_eq!(literal.as_literal(), Some("sg-0123"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod token;

pub use error::{CoreError, Result};
pub use ids::{NamespacedName, ResourceId};
pub use token::{ResourceRef, StringToken, TokenResolver};
