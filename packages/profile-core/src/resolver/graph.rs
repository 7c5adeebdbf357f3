//! The resolved dependency set: a flat, name-keyed map of activated
//! specs. A full graph with edges isn't needed by any consumer in this
//! crate (the CLI only needs "what versions were chosen"), so this stays
//! a thin wrapper rather than a general graph structure.

use indexmap::IndexMap;
use semver::Version;

use crate::vendor::LocalSpec;

#[derive(Debug, Default)]
pub struct DependencyGraph {
    activated: IndexMap<String, LocalSpec>,
}

impl DependencyGraph {
    pub fn from_activated(activated: IndexMap<String, LocalSpec>) -> Self {
        Self { activated }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.activated.contains_key(name)
    }

    pub fn version_of(&self, name: &str) -> Option<&Version> {
        self.activated.get(name).map(|s| &s.version)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &LocalSpec)> {
        self.activated.iter()
    }

    pub fn len(&self) -> usize {
        self.activated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activated.is_empty()
    }
}
