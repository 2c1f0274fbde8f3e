//! Tag resolution shared by every builder.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::{BuilderConfig, TagPrecedence};
use crate::error::{BuildError, Result};

/// Merge default and object tags.
///
/// Keys of the second merged map win, so precedence is expressed purely by
/// argument order. `None` object tags yield the defaults.
///
/// # Errors
///
/// Returns `BuildError::ReservedTagKey` if an object tag uses a reserved key,
/// in either direction.
pub fn resolve_tags(
    defaults: &BTreeMap<String, String>,
    object: Option<&BTreeMap<String, String>>,
    precedence: TagPrecedence,
    reserved: &BTreeSet<String>,
) -> Result<BTreeMap<String, String>> {
    let Some(object) = object else {
        return Ok(defaults.clone());
    };
    if let Some(key) = object.keys().find(|k| reserved.contains(*k)) {
        return Err(BuildError::ReservedTagKey(key.clone()));
    }
    Ok(match precedence {
        TagPrecedence::DefaultsWin => merge(object, defaults),
        TagPrecedence::OverridesWin => merge(defaults, object),
    })
}

fn merge(
    base: &BTreeMap<String, String>,
    winner: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut out = base.clone();
    out.extend(winner.iter().map(|(k, v)| (k.clone(), v.clone())));
    out
}

/// Tag resolution bound to one [`BuilderConfig`].
#[derive(Debug, Clone, Copy)]
pub struct TagHelper<'a> {
    config: &'a BuilderConfig,
}

impl<'a> TagHelper<'a> {
    /// Bind to a config.
    #[must_use]
    pub const fn new(config: &'a BuilderConfig) -> Self {
        Self { config }
    }

    /// Resolve object tags against the configured defaults.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::ReservedTagKey` on a reserved key.
    pub fn resolve(&self, object: Option<&BTreeMap<String, String>>) -> Result<BTreeMap<String, String>> {
        resolve_tags(
            &self.config.default_tags,
            object,
            self.config.tag_precedence,
            &self.config.external_managed_tags,
        )
    }
}
