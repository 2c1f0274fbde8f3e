//! The resource graph produced by one compilation.
//!
//! A [`Stack`] owns every resource built for a Gateway. Resources are keyed by
//! [`ResourceId`] and may be added exactly once; cross-references between them
//! are [`StringToken`](gateway_lb_core::StringToken)s rather than pointers.

use std::collections::BTreeMap;

use gateway_lb_core::{CoreError, NamespacedName, ResourceId, Result};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::binding::{TargetGroupBinding, TARGET_GROUP_BINDING_TYPE};
use crate::ec2::{SecurityGroup, SECURITY_GROUP_TYPE};
use crate::elbv2::{
    Listener, ListenerRule, LoadBalancer, TargetGroup, LISTENER_RULE_TYPE, LISTENER_TYPE,
    LOAD_BALANCER_TYPE, TARGET_GROUP_TYPE,
};

/// Any resource that can live in a stack.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Resource {
    /// Load balancer.
    LoadBalancer(LoadBalancer),
    /// Listener.
    Listener(Listener),
    /// Listener rule.
    ListenerRule(ListenerRule),
    /// Target group.
    TargetGroup(TargetGroup),
    /// Target group binding.
    TargetGroupBinding(TargetGroupBinding),
    /// Security group.
    SecurityGroup(SecurityGroup),
}

/// Typed access to resources stored in a stack.
pub trait StackResource: Sized {
    /// Resource type string, the first half of a [`ResourceId`].
    const RESOURCE_TYPE: &'static str;

    /// Logical ID within the stack.
    fn logical_id(&self) -> &str;

    /// Wrap into the stack's resource enum.
    fn into_resource(self) -> Resource;

    /// Borrow back out of the stack's resource enum.
    fn from_resource(resource: &Resource) -> Option<&Self>;

    /// Full resource ID.
    fn resource_id(&self) -> ResourceId {
        ResourceId::new(Self::RESOURCE_TYPE, self.logical_id())
    }
}

macro_rules! stack_resource {
    ($ty:ident, $const:ident) => {
        impl StackResource for $ty {
            const RESOURCE_TYPE: &'static str = $const;

            fn logical_id(&self) -> &str {
                self.id()
            }

            fn into_resource(self) -> Resource {
                Resource::$ty(self)
            }

            fn from_resource(resource: &Resource) -> Option<&Self> {
                match resource {
                    Resource::$ty(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

stack_resource!(LoadBalancer, LOAD_BALANCER_TYPE);
stack_resource!(Listener, LISTENER_TYPE);
stack_resource!(ListenerRule, LISTENER_RULE_TYPE);
stack_resource!(TargetGroup, TARGET_GROUP_TYPE);
stack_resource!(TargetGroupBinding, TARGET_GROUP_BINDING_TYPE);
stack_resource!(SecurityGroup, SECURITY_GROUP_TYPE);

/// All resources compiled for one Gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    id: NamespacedName,
    resources: BTreeMap<ResourceId, Resource>,
}

impl Stack {
    /// Create an empty stack for a Gateway.
    #[must_use]
    pub fn new(id: NamespacedName) -> Self {
        Self {
            id,
            resources: BTreeMap::new(),
        }
    }

    /// The Gateway this stack was compiled for.
    #[must_use]
    pub fn id(&self) -> &NamespacedName {
        &self.id
    }

    /// Register a resource.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::DuplicateResource` if a resource with the same type
    /// and logical ID is already present.
    pub fn add<R: StackResource>(&mut self, resource: R) -> Result<()> {
        let key = resource.resource_id();
        if self.resources.contains_key(&key) {
            return Err(CoreError::DuplicateResource(key));
        }
        self.resources.insert(key, resource.into_resource());
        Ok(())
    }

    /// Whether a resource with this ID exists.
    #[must_use]
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    /// Look up any resource by ID.
    #[must_use]
    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Look up a resource of a known type by logical ID.
    #[must_use]
    pub fn get_as<R: StackResource>(&self, logical_id: &str) -> Option<&R> {
        self.resources
            .get(&ResourceId::new(R::RESOURCE_TYPE, logical_id))
            .and_then(R::from_resource)
    }

    /// All resources of one type, ordered by logical ID.
    #[must_use]
    pub fn list<R: StackResource>(&self) -> Vec<&R> {
        self.resources
            .iter()
            .filter(|(id, _)| id.resource_type == R::RESOURCE_TYPE)
            .filter_map(|(_, resource)| R::from_resource(resource))
            .collect()
    }

    /// Number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the stack has no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Iterate over all resources in ID order.
    pub fn iter(&self) -> impl Iterator<Item = (&ResourceId, &Resource)> {
        self.resources.iter()
    }
}

struct ResourcesByType<'a>(&'a BTreeMap<ResourceId, Resource>);

impl Serialize for ResourcesByType<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut grouped: BTreeMap<&str, BTreeMap<&str, &Resource>> = BTreeMap::new();
        for (id, resource) in self.0 {
            grouped
                .entry(id.resource_type.as_str())
                .or_default()
                .insert(id.id.as_str(), resource);
        }
        let mut map = serializer.serialize_map(Some(grouped.len()))?;
        for (resource_type, resources) in &grouped {
            map.serialize_entry(resource_type, resources)?;
        }
        map.end()
    }
}

impl Serialize for Stack {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("id", &self.id.to_string())?;
        map.serialize_entry("resources", &ResourcesByType(&self.resources))?;
        map.end()
    }
}
