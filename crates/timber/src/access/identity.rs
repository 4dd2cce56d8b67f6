//! Identities, access groups and per-request access resolution.
//!
//! Both tables are built once from configuration and never mutated afterwards,
//! so they can be shared across connection tasks without locking.

use std::collections::HashMap;

use serde::Serialize;

/// An authenticated user and the access groups it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    name: String,
    groups: Vec<String>,
}

impl Identity {
    /// Create a new identity.
    pub fn new(name: impl Into<String>, groups: Vec<String>) -> Self {
        Self {
            name: name.into(),
            groups,
        }
    }

    /// User name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Access-group names, in configured order.
    pub fn groups(&self) -> &[String] {
        &self.groups
    }
}

/// A named, ordered list of glob patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGroup {
    name: String,
    patterns: Vec<String>,
}

impl AccessGroup {
    /// Create a new access group.
    pub fn new(name: impl Into<String>, patterns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            patterns,
        }
    }

    /// Group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Patterns in configured order.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// The flattened pattern list of one identity for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAccess {
    patterns: Vec<String>,
}

impl ResolvedAccess {
    /// Build resolved access directly from patterns.
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Access that matches nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Patterns in evaluation order.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Consume into the raw pattern list.
    pub fn into_patterns(self) -> Vec<String> {
        self.patterns
    }
}

/// Process-wide table of access groups.
#[derive(Debug, Clone, Default)]
pub struct AccessTable {
    groups: HashMap<String, AccessGroup>,
}

impl AccessTable {
    /// Build the table from a set of groups. Later duplicates replace earlier ones.
    pub fn new(groups: impl IntoIterator<Item = AccessGroup>) -> Self {
        Self {
            groups: groups
                .into_iter()
                .map(|g| (g.name.clone(), g))
                .collect(),
        }
    }

    /// Look up a group by name.
    pub fn group(&self, name: &str) -> Option<&AccessGroup> {
        self.groups.get(name)
    }

    /// Number of configured groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Resolve an identity into its flattened pattern list.
    ///
    /// Patterns are concatenated in the identity's group order. Unknown group
    /// names contribute nothing. Duplicates are kept.
    pub fn resolve(&self, identity: &Identity) -> ResolvedAccess {
        let patterns = identity
            .groups
            .iter()
            .filter_map(|name| self.groups.get(name))
            .flat_map(|group| group.patterns.iter().cloned())
            .collect();
        ResolvedAccess { patterns }
    }

    /// Group names referenced by `identity` that do not exist in this table.
    pub fn unknown_groups<'a>(&self, identity: &'a Identity) -> Vec<&'a str> {
        identity
            .groups
            .iter()
            .filter(|name| !self.groups.contains_key(name.as_str()))
            .map(String::as_str)
            .collect()
    }
}
