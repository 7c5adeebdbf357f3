//! Resolver (C7): a Molinillo/Bundler-style backtracking dependency
//! resolver over a [`SpecificationProvider`]. The algorithm is plain
//! recursion with structural sharing via `clone`-on-branch rather than a
//! mutable activation stack with explicit undo; for the graph sizes a
//! profile's `depends` list produces this is simpler to read and proven
//! correct by the same test scenarios a stack-based implementation would
//! need to pass.
//!
//! `stack` tracks only the names genuinely on the path from the root to
//! the call currently resolving a candidate's own dependencies — each
//! candidate's subtree is resolved to completion (or failure) before the
//! `stack` entry for it is dropped and the rest of the caller's queue is
//! processed, so a diamond dependency (two siblings requiring the same
//! name) never trips the cycle check, while a genuine cycle (a name
//! reappearing among its own ancestors) always does.

pub mod graph;

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;
use tracing::{instrument, trace};

use crate::metadata::Requirement;
use crate::vendor::{CacheError, LocalSpec, VendorIndex};

pub use graph::DependencyGraph;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no version of {name} satisfies {constraint}")]
    VersionConflict { name: String, constraint: String },
    #[error("cyclic dependency: {}", .0.join(" -> "))]
    Cyclic(Vec<String>),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// The seams a backtracking resolver needs from its backing store,
/// named after Molinillo's `SpecificationProvider` (the same shape
/// Bundler's resolver is built on).
pub trait SpecificationProvider {
    fn search_for(&self, req: &Requirement) -> Result<Vec<LocalSpec>, ResolveError>;
    fn dependencies_for(&self, spec: &LocalSpec) -> Result<Vec<Requirement>, ResolveError>;
    fn requirement_satisfied_by(&self, req: &Requirement, spec: &LocalSpec) -> bool;
    fn name_for(&self, req: &Requirement) -> String {
        req.name.clone()
    }
    /// Reorders the work queue by `(already-activated?, has-conflict?,
    /// candidate-count)`: cheap, already-decided requirements go first,
    /// then ones known to have conflicted already (so a fatal conflict
    /// surfaces early), then the most constrained requirement (fewest
    /// remaining candidates). The default keeps authoring order.
    fn sort_dependencies(
        &self,
        deps: Vec<Requirement>,
        _activated: &IndexMap<String, LocalSpec>,
        _conflicts: &IndexSet<String>,
    ) -> Vec<Requirement> {
        deps
    }
    fn allow_missing(&self, _req: &Requirement) -> bool {
        false
    }
}

impl SpecificationProvider for VendorIndex {
    fn search_for(&self, req: &Requirement) -> Result<Vec<LocalSpec>, ResolveError> {
        Ok(self.find(req)?)
    }

    fn dependencies_for(&self, spec: &LocalSpec) -> Result<Vec<Requirement>, ResolveError> {
        let manifest_path = spec.dir.join("inspec.yml");
        let Ok(raw) = std::fs::read_to_string(&manifest_path) else {
            return Ok(Vec::new());
        };
        let metadata = crate::metadata::Metadata::from_yaml(&raw).map_err(|_| ResolveError::VersionConflict {
            name: spec.name.clone(),
            constraint: "<unreadable manifest>".to_string(),
        })?;
        Ok(metadata.depends)
    }

    fn requirement_satisfied_by(&self, req: &Requirement, spec: &LocalSpec) -> bool {
        req.constraint.satisfied_by(&spec.version)
    }

    fn sort_dependencies(
        &self,
        mut deps: Vec<Requirement>,
        activated: &IndexMap<String, LocalSpec>,
        conflicts: &IndexSet<String>,
    ) -> Vec<Requirement> {
        // Ascending by priority, then reversed, since `resolve_step` pops
        // from the back: the highest-priority requirement ends up last.
        deps.sort_by_key(|req| {
            let activated_rank = if activated.contains_key(&req.name) { 0 } else { 1 };
            let conflict_rank = if conflicts.contains(&req.name) { 0 } else { 1 };
            let candidate_count = self.find(req).map(|c| c.len()).unwrap_or(usize::MAX);
            (activated_rank, conflict_rank, candidate_count)
        });
        deps.reverse();
        deps
    }
}

pub struct Resolver<'p, P: SpecificationProvider> {
    provider: &'p P,
}

impl<'p, P: SpecificationProvider> Resolver<'p, P> {
    pub fn new(provider: &'p P) -> Self {
        Self { provider }
    }

    #[instrument(skip(self, root_deps))]
    pub fn resolve(&self, root_deps: Vec<Requirement>) -> Result<DependencyGraph, ResolveError> {
        let activated = self.resolve_step(root_deps, IndexMap::new(), Vec::new(), IndexSet::new())?;
        Ok(DependencyGraph::from_activated(activated))
    }

    fn resolve_step(
        &self,
        queue: Vec<Requirement>,
        activated: IndexMap<String, LocalSpec>,
        stack: Vec<String>,
        mut conflicts: IndexSet<String>,
    ) -> Result<IndexMap<String, LocalSpec>, ResolveError> {
        let mut queue = self.provider.sort_dependencies(queue, &activated, &conflicts);
        let Some(req) = queue.pop() else {
            return Ok(activated);
        };

        let name = self.provider.name_for(&req);

        // A name still open on the current decision path is a real cycle
        // even if some candidate version would satisfy it; check this
        // before consulting `activated`, which also holds names whose
        // subtree has already finished (diamonds) and must not be
        // mistaken for an in-progress ancestor.
        if stack.contains(&name) {
            let mut names = stack.clone();
            names.push(name);
            names.sort();
            names.dedup();
            return Err(ResolveError::Cyclic(names));
        }

        if let Some(existing) = activated.get(&name) {
            if self.provider.requirement_satisfied_by(&req, existing) {
                return self.resolve_step(queue, activated, stack, conflicts);
            }
            return Err(ResolveError::VersionConflict {
                name,
                constraint: req.constraint.to_string(),
            });
        }

        let mut candidates = self.provider.search_for(&req)?;
        candidates.reverse();

        if candidates.is_empty() {
            if self.provider.allow_missing(&req) {
                return self.resolve_step(queue, activated, stack, conflicts);
            }
            return Err(ResolveError::VersionConflict {
                name,
                constraint: req.constraint.to_string(),
            });
        }

        let mut last_err = None;
        for candidate in candidates {
            trace!(name = %name, version = %candidate.version, "trying candidate");
            let mut activated2 = activated.clone();
            activated2.insert(name.clone(), candidate.clone());
            let mut stack2 = stack.clone();
            stack2.push(name.clone());

            let deps = match self.provider.dependencies_for(&candidate) {
                Ok(d) => d,
                Err(e) => {
                    record_conflict(&mut conflicts, &e);
                    last_err = Some(e);
                    continue;
                }
            };

            // Resolve this candidate's own dependency subtree to
            // completion before returning to the rest of the caller's
            // queue, so `stack` drops back to the caller's own ancestry
            // once the subtree is done rather than accumulating every
            // name ever visited along the whole flat queue.
            let activated3 = match self.resolve_step(deps, activated2, stack2, conflicts.clone()) {
                Ok(a) => a,
                Err(e) => {
                    record_conflict(&mut conflicts, &e);
                    last_err = Some(e);
                    continue;
                }
            };

            match self.resolve_step(queue.clone(), activated3, stack.clone(), conflicts.clone()) {
                Ok(result) => return Ok(result),
                Err(e) => {
                    record_conflict(&mut conflicts, &e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(ResolveError::VersionConflict {
            name,
            constraint: req.constraint.to_string(),
        }))
    }
}

fn record_conflict(conflicts: &mut IndexSet<String>, err: &ResolveError) {
    if let ResolveError::VersionConflict { name, .. } = err {
        conflicts.insert(name.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Constraint;
    use semver::Version;
    use std::collections::HashMap as StdHashMap;

    struct FakeProvider {
        specs: StdHashMap<String, Vec<LocalSpec>>,
        deps: StdHashMap<String, Vec<Requirement>>,
    }

    impl SpecificationProvider for FakeProvider {
        fn search_for(&self, req: &Requirement) -> Result<Vec<LocalSpec>, ResolveError> {
            Ok(self
                .specs
                .get(&req.name)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|s| req.constraint.satisfied_by(&s.version))
                .collect())
        }

        fn dependencies_for(&self, spec: &LocalSpec) -> Result<Vec<Requirement>, ResolveError> {
            let key = format!("{}@{}", spec.name, spec.version);
            Ok(self.deps.get(&key).cloned().unwrap_or_default())
        }

        fn requirement_satisfied_by(&self, req: &Requirement, spec: &LocalSpec) -> bool {
            req.constraint.satisfied_by(&spec.version)
        }
    }

    fn spec(name: &str, version: &str) -> LocalSpec {
        LocalSpec {
            name: name.to_string(),
            version: Version::parse(version).unwrap(),
            dir: std::path::PathBuf::new(),
        }
    }

    fn req(name: &str, constraint: &str) -> Requirement {
        Requirement {
            name: name.to_string(),
            constraint: Constraint::parse(constraint).unwrap(),
            source: None,
        }
    }

    #[test]
    fn resolves_a_simple_chain() {
        let mut specs = StdHashMap::new();
        specs.insert("a".to_string(), vec![spec("a", "1.0.0")]);
        specs.insert("b".to_string(), vec![spec("b", "2.0.0")]);
        let mut deps = StdHashMap::new();
        deps.insert("a@1.0.0".to_string(), vec![req("b", ">= 1.0.0")]);
        let provider = FakeProvider { specs, deps };

        let resolver = Resolver::new(&provider);
        let graph = resolver.resolve(vec![req("a", ">= 1.0.0")]).unwrap();
        assert!(graph.contains("a"));
        assert!(graph.contains("b"));
    }

    #[test]
    fn cyclic_dependency_is_reported_with_sorted_names() {
        let mut specs = StdHashMap::new();
        specs.insert("a".to_string(), vec![spec("a", "1.0.0")]);
        specs.insert("b".to_string(), vec![spec("b", "1.0.0")]);
        let mut deps = StdHashMap::new();
        deps.insert("a@1.0.0".to_string(), vec![req("b", ">= 1.0.0")]);
        deps.insert("b@1.0.0".to_string(), vec![req("a", ">= 1.0.0")]);
        let provider = FakeProvider { specs, deps };

        let resolver = Resolver::new(&provider);
        let err = resolver.resolve(vec![req("a", ">= 1.0.0")]).unwrap_err();
        match err {
            ResolveError::Cyclic(names) => assert_eq!(names, vec!["a".to_string(), "b".to_string()]),
            other => panic!("expected Cyclic, got {other:?}"),
        }
    }

    #[test]
    fn no_satisfying_version_is_a_conflict() {
        let mut specs = StdHashMap::new();
        specs.insert("a".to_string(), vec![spec("a", "1.0.0")]);
        let provider = FakeProvider {
            specs,
            deps: StdHashMap::new(),
        };
        let resolver = Resolver::new(&provider);
        let err = resolver.resolve(vec![req("a", ">= 2.0.0")]).unwrap_err();
        assert!(matches!(err, ResolveError::VersionConflict { .. }));
    }

    /// A diamond (a -> b, a -> c, both b and c -> d) is not mistaken for a
    /// cycle: `d`'s second encounter finds it already activated rather
    /// than finding it on the ancestor stack.
    #[test]
    fn diamond_dependency_resolves_without_a_false_cycle() {
        let mut specs = StdHashMap::new();
        specs.insert("a".to_string(), vec![spec("a", "1.0.0")]);
        specs.insert("b".to_string(), vec![spec("b", "1.0.0")]);
        specs.insert("c".to_string(), vec![spec("c", "1.0.0")]);
        specs.insert("d".to_string(), vec![spec("d", "1.0.0")]);
        let mut deps = StdHashMap::new();
        deps.insert(
            "a@1.0.0".to_string(),
            vec![req("b", ">= 1.0.0"), req("c", ">= 1.0.0")],
        );
        deps.insert("b@1.0.0".to_string(), vec![req("d", ">= 1.0.0")]);
        deps.insert("c@1.0.0".to_string(), vec![req("d", ">= 1.0.0")]);
        let provider = FakeProvider { specs, deps };

        let resolver = Resolver::new(&provider);
        let graph = resolver.resolve(vec![req("a", ">= 1.0.0")]).unwrap();
        assert!(graph.contains("a"));
        assert!(graph.contains("b"));
        assert!(graph.contains("c"));
        assert!(graph.contains("d"));
    }
}
