//! Deferred string tokens.
//!
//! Many attributes of the compiled resource graph (target group ARNs, security
//! group IDs, the load balancer ARN) only exist after deployment. Cross-references
//! between resources are therefore expressed as [`StringToken`]s: either a literal
//! value known at compile time, or a reference to an attribute of another resource
//! in the same stack.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::{CoreError, Result};
use crate::ids::ResourceId;

const REF_PREFIX: &str = "#/resources/";

/// A reference to an attribute of a stack resource.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceRef {
    /// The referenced resource.
    pub resource: ResourceId,
    /// Attribute name on the resource's status, e.g. `targetGroupARN`.
    pub attribute: String,
}

impl ResourceRef {
    /// JSON-pointer style path used when serializing the reference.
    #[must_use]
    pub fn pointer(&self) -> String {
        format!(
            "{REF_PREFIX}{}/{}/status/{}",
            self.resource.resource_type, self.resource.id, self.attribute
        )
    }

    fn from_pointer(pointer: &str) -> Option<Self> {
        let rest = pointer.strip_prefix(REF_PREFIX)?;
        let (head, attribute) = rest.rsplit_once("/status/")?;
        // resource types never contain '/', ids may
        let (resource_type, id) = head.split_once('/')?;
        Some(Self {
            resource: ResourceId::new(resource_type, id),
            attribute: attribute.to_string(),
        })
    }
}

impl fmt::Debug for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceRef({})", self.pointer())
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pointer())
    }
}

/// Looks up the deployed value of a referenced attribute.
///
/// Implemented by the deployment engine once resources exist.
pub trait TokenResolver {
    /// Return the value for the reference, or `None` if not yet known.
    fn resolve_reference(&self, reference: &ResourceRef) -> Option<String>;
}

impl<F> TokenResolver for F
where
    F: Fn(&ResourceRef) -> Option<String>,
{
    fn resolve_reference(&self, reference: &ResourceRef) -> Option<String> {
        self(reference)
    }
}

/// An immutable string that is either known now or resolved at deployment.
///
/// Equality is by value: two references to the same attribute of the same
/// resource are equal regardless of where they were created.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StringToken {
    /// A value known at compile time.
    Literal(String),
    /// A value produced by another resource in the stack.
    Reference(ResourceRef),
}

impl StringToken {
    /// Create a literal token.
    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    /// Create a reference token to `attribute` of `resource`.
    #[must_use]
    pub fn reference(resource: ResourceId, attribute: impl Into<String>) -> Self {
        Self::Reference(ResourceRef {
            resource,
            attribute: attribute.into(),
        })
    }

    /// Return the literal value, if this token is a literal.
    #[must_use]
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(value) => Some(value),
            Self::Reference(_) => None,
        }
    }

    /// Return the reference, if this token is deferred.
    #[must_use]
    pub const fn as_reference(&self) -> Option<&ResourceRef> {
        match self {
            Self::Literal(_) => None,
            Self::Reference(reference) => Some(reference),
        }
    }

    /// Resolve the token to its final value.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::UnresolvedReference` if the resolver has no value for
    /// a referenced attribute.
    pub fn resolve(&self, resolver: &impl TokenResolver) -> Result<String> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Reference(reference) => resolver
                .resolve_reference(reference)
                .ok_or_else(|| CoreError::UnresolvedReference(reference.clone())),
        }
    }
}

impl fmt::Debug for StringToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "Literal({value:?})"),
            Self::Reference(reference) => write!(f, "Reference({})", reference.pointer()),
        }
    }
}

impl From<&str> for StringToken {
    fn from(value: &str) -> Self {
        Self::literal(value)
    }
}

impl From<String> for StringToken {
    fn from(value: String) -> Self {
        Self::Literal(value)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum TokenRepr {
    Literal(String),
    Reference {
        #[serde(rename = "$ref")]
        pointer: String,
    },
}

impl Serialize for StringToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let repr = match self {
            Self::Literal(value) => TokenRepr::Literal(value.clone()),
            Self::Reference(reference) => TokenRepr::Reference {
                pointer: reference.pointer(),
            },
        };
        repr.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StringToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match TokenRepr::deserialize(deserializer)? {
            TokenRepr::Literal(value) => Ok(Self::Literal(value)),
            TokenRepr::Reference { pointer } => ResourceRef::from_pointer(&pointer)
                .map(Self::Reference)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid $ref: {pointer}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tg_ref() -> StringToken {
        StringToken::reference(
            ResourceId::new(
                "AWS::ElasticLoadBalancingV2::TargetGroup",
                "default/gw:default/route:http-default:svc:80",
            ),
            "targetGroupARN",
        )
    }

    #[test]
    fn references_compare_by_value() {
        assert_eq!(tg_ref(), tg_ref());
        assert_ne!(tg_ref(), StringToken::literal("arn:aws:elasticloadbalancing:tg"));
    }

    #[test]
    fn literal_resolves_without_lookup() {
        let token = StringToken::literal("sg-123");
        let resolved = token.resolve(&|_: &ResourceRef| -> Option<String> { None }).unwrap();
        assert_eq!(resolved, "sg-123");
    }

    #[test]
    fn reference_requires_resolver_value() {
        let token = tg_ref();
        let err = token.resolve(&|_: &ResourceRef| -> Option<String> { None }).unwrap_err();
        assert!(matches!(err, CoreError::UnresolvedReference(_)));

        let resolved = token
            .resolve(&|r: &ResourceRef| -> Option<String> {
                (r.attribute == "targetGroupARN").then(|| "arn:tg/1".to_string())
            })
            .unwrap();
        assert_eq!(resolved, "arn:tg/1");
    }

    #[test]
    fn serde_json_shapes() {
        let literal = serde_json::to_string(&StringToken::literal("x")).unwrap();
        assert_eq!(literal, "\"x\"");

        let json = serde_json::to_value(tg_ref()).unwrap();
        assert_eq!(
            json["$ref"],
            "#/resources/AWS::ElasticLoadBalancingV2::TargetGroup/default/gw:default/route:http-default:svc:80/status/targetGroupARN"
        );
        let parsed: StringToken = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, tg_ref());
    }
}
