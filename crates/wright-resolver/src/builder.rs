//! Breadth-first graph expansion from the root requirements.
//!
//! The builder is pure: given the roots, the metadata fetched so far, and
//! the solver's current version decisions, it produces the graph those
//! decisions imply plus the metadata it could not find in the cache.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use petgraph::graph::NodeIndex;
use wright_core::requirement::PackageName;
use wright_core::version::Version;
use wright_util::errors::ResolveError;

use crate::graph::{ConstraintRecord, DepEdge, DependencyGraph, Origin, PackageNode, RequirementEdge};
use crate::metadata::{MetadataCache, MetadataKey, PackageVersion};
use crate::source::{Pin, ResolvedRequirement, ResolvedSource};

/// Result of one expansion.
#[derive(Debug, Clone)]
pub struct Expansion {
    pub graph: DependencyGraph,
    /// Every requirement edge encountered.
    pub edges: BTreeSet<RequirementEdge>,
    /// Metadata needed to expand further.
    pub missing: BTreeSet<MetadataKey>,
}

/// Entry in the BFS queue.
struct QueueEntry<'a> {
    requirement: &'a ResolvedRequirement,
    origin: Origin,
    parent: Option<NodeIndex>,
    /// Packages on the expansion chain that led here.
    path: Vec<PackageName>,
}

/// Outcome of a single pass.
enum Pass {
    Done(Expansion),
    /// A pin arrived for a package already placed as a registry node.
    LatePin(PackageName, Pin),
}

pub struct GraphBuilder<'a> {
    roots: &'a [ResolvedRequirement],
    cache: &'a MetadataCache,
    decisions: &'a BTreeMap<PackageName, Version>,
    enabled: Option<&'a BTreeSet<RequirementEdge>>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        roots: &'a [ResolvedRequirement],
        cache: &'a MetadataCache,
        decisions: &'a BTreeMap<PackageName, Version>,
    ) -> Self {
        Self {
            roots,
            cache,
            decisions,
            enabled: None,
        }
    }

    /// Ignore every requirement edge outside `enabled`.
    pub fn with_enabled(mut self, enabled: &'a BTreeSet<RequirementEdge>) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Expand the graph.
    ///
    /// Fails with `ConflictingPin` when two different fixed artifacts claim
    /// one name, and with `CyclicDependency` when a mandatory requirement
    /// leads back to a package on its own expansion chain.
    pub fn build(&self) -> Result<Expansion, ResolveError> {
        let mut pins: BTreeMap<PackageName, Pin> = BTreeMap::new();
        loop {
            match self.expand(&pins)? {
                Pass::Done(expansion) => return Ok(expansion),
                Pass::LatePin(name, pin) => {
                    tracing::debug!(package = %name, %pin, "pin overrides registry node, re-expanding");
                    pins.insert(name, pin);
                }
            }
        }
    }

    fn expand(&self, pins: &BTreeMap<PackageName, Pin>) -> Result<Pass, ResolveError> {
        let mut graph = DependencyGraph::new();
        let mut edges = BTreeSet::new();
        let mut missing = BTreeSet::new();
        let mut optional: Vec<(Origin, &ResolvedRequirement)> = Vec::new();
        let mut expanded: HashSet<NodeIndex> = HashSet::new();

        let mut queue: VecDeque<QueueEntry<'_>> = self
            .roots
            .iter()
            .map(|r| QueueEntry {
                requirement: r,
                origin: Origin::Root(r.requirement.profile),
                parent: None,
                path: Vec::new(),
            })
            .collect();

        while let Some(entry) = queue.pop_front() {
            let req = entry.requirement;
            let edge = RequirementEdge::new(&entry.origin, req);
            if self.enabled.is_some_and(|enabled| !enabled.contains(&edge)) {
                continue;
            }
            edges.insert(edge);

            if req.requirement.optional {
                optional.push((entry.origin, req));
                continue;
            }

            let name = &req.requirement.name;
            if let Some(pos) = entry.path.iter().position(|p| p == name) {
                let mut cycle: Vec<String> =
                    entry.path[pos..].iter().map(ToString::to_string).collect();
                cycle.push(name.to_string());
                return Err(ResolveError::CyclicDependency { cycle });
            }

            let idx = match graph.index_of(name) {
                Some(idx) => {
                    match &req.source {
                        ResolvedSource::Pinned(pin) => match &graph.node(idx).pin {
                            Some(existing) if existing != pin => {
                                return Err(conflicting_pin(name, existing, pin));
                            }
                            Some(_) => {}
                            None => return Ok(Pass::LatePin(name.clone(), pin.clone())),
                        },
                        ResolvedSource::Registry(constraint) => {
                            graph.node_mut(idx).constraints.push(ConstraintRecord {
                                origin: entry.origin.clone(),
                                constraint: constraint.clone(),
                                optional: false,
                            });
                        }
                    }
                    idx
                }
                None => {
                    let pin = match &req.source {
                        ResolvedSource::Pinned(pin) => {
                            if let Some(seeded) = pins.get(name).filter(|p| *p != pin) {
                                return Err(conflicting_pin(name, seeded, pin));
                            }
                            Some(pin.clone())
                        }
                        ResolvedSource::Registry(_) => pins.get(name).cloned(),
                    };
                    let mut node = PackageNode::new(name.clone(), pin);
                    if let ResolvedSource::Registry(constraint) = &req.source {
                        node.constraints.push(ConstraintRecord {
                            origin: entry.origin.clone(),
                            constraint: constraint.clone(),
                            optional: false,
                        });
                    }
                    graph.add_node(node)
                }
            };

            if let Origin::Root(profile) = entry.origin {
                graph.node_mut(idx).profiles.insert(profile);
            }
            if let Some(parent) = entry.parent {
                graph.add_edge(
                    parent,
                    idx,
                    DepEdge {
                        requirement: req.source.describe(),
                    },
                );
            }

            if !expanded.insert(idx) {
                continue;
            }

            let version = match &graph.node(idx).pin {
                Some(pin) => PackageVersion::Pinned(pin.clone()),
                None => match self.decisions.get(name) {
                    Some(v) => PackageVersion::Release(v.clone()),
                    // Undecided: children wait for the solver.
                    None => continue,
                },
            };
            graph.node_mut(idx).version = Some(version.clone());

            match self.cache.requirements(name, &version) {
                Some(children) => {
                    let mut path = entry.path.clone();
                    path.push(name.clone());
                    let origin = Origin::Package {
                        name: name.clone(),
                        version,
                    };
                    for child in children {
                        queue.push_back(QueueEntry {
                            requirement: child,
                            origin: origin.clone(),
                            parent: Some(idx),
                            path: path.clone(),
                        });
                    }
                }
                None => {
                    missing.insert(MetadataKey::Requirements(name.clone(), version));
                }
            }
        }

        // Optional requirements only constrain packages something else pulled in.
        for (origin, req) in optional {
            let name = &req.requirement.name;
            let Some(idx) = graph.index_of(name) else {
                continue;
            };
            match &req.source {
                ResolvedSource::Registry(constraint) => {
                    graph.node_mut(idx).constraints.push(ConstraintRecord {
                        origin,
                        constraint: constraint.clone(),
                        optional: true,
                    });
                }
                ResolvedSource::Pinned(pin) => match &graph.node(idx).pin {
                    Some(existing) if existing != pin => {
                        return Err(conflicting_pin(name, existing, pin));
                    }
                    Some(_) => {}
                    None => return Ok(Pass::LatePin(name.clone(), pin.clone())),
                },
            }
        }

        for idx in graph.indices() {
            let node = graph.node_mut(idx);
            if node.is_pinned() {
                if !node.constraints.is_empty() {
                    tracing::debug!(
                        package = %node.name,
                        constraint = %node.constraint(),
                        "version constraint on pinned package not enforced"
                    );
                }
                continue;
            }
            match self.cache.versions(&node.name) {
                Some(available) => {
                    let candidates = available
                        .iter()
                        .filter(|v| node.constraints.iter().all(|c| c.constraint.matches(v)))
                        .cloned()
                        .collect();
                    node.candidates = Some(candidates);
                }
                None => {
                    missing.insert(MetadataKey::Versions(node.name.clone()));
                }
            }
        }

        Ok(Pass::Done(Expansion {
            graph,
            edges,
            missing,
        }))
    }
}

fn conflicting_pin(name: &PackageName, first: &Pin, second: &Pin) -> ResolveError {
    ResolveError::ConflictingPin {
        name: name.to_string(),
        first: first.to_string(),
        second: second.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wright_core::requirement::{RawRequirement, Requirement};

    fn name(s: &str) -> PackageName {
        PackageName::parse(s).unwrap()
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn resolved(raw: RawRequirement) -> ResolvedRequirement {
        ResolvedRequirement::new(Requirement::from_raw(&raw).unwrap()).unwrap()
    }

    fn release(cache: &mut MetadataCache, n: &str, version: &str, requires: &[&str]) {
        let raw: Vec<RawRequirement> = requires.iter().map(|r| RawRequirement::from_short(r)).collect();
        cache
            .insert_requirements(name(n), PackageVersion::Release(v(version)), &raw)
            .unwrap();
    }

    #[test]
    fn undecided_nodes_request_versions() {
        let roots = vec![resolved(RawRequirement::registry("foo", ">=1.0"))];
        let cache = MetadataCache::new();
        let decisions = BTreeMap::new();
        let exp = GraphBuilder::new(&roots, &cache, &decisions).build().unwrap();

        assert_eq!(exp.graph.len(), 1);
        assert_eq!(exp.missing, BTreeSet::from([MetadataKey::Versions(name("foo"))]));
        assert_eq!(exp.edges.len(), 1);
    }

    #[test]
    fn candidates_narrow_by_every_constraint() {
        let roots = vec![
            resolved(RawRequirement::registry("foo", ">=1.0")),
            resolved(RawRequirement::registry("foo", "<2.0").with_profile("test")),
        ];
        let mut cache = MetadataCache::new();
        cache.insert_versions(name("foo"), vec![v("0.9"), v("1.0"), v("1.5"), v("2.0")]);
        let decisions = BTreeMap::new();
        let exp = GraphBuilder::new(&roots, &cache, &decisions).build().unwrap();

        let node = exp.graph.node(exp.graph.find("foo").unwrap());
        assert_eq!(node.candidates, Some(vec![v("1.5"), v("1.0")]));
        assert_eq!(node.constraints.len(), 2);
        assert_eq!(node.profiles.len(), 2);
        assert!(exp.missing.is_empty());
    }

    #[test]
    fn decided_nodes_expand_children() {
        let roots = vec![resolved(RawRequirement::registry("foo", ""))];
        let mut cache = MetadataCache::new();
        cache.insert_versions(name("foo"), vec![v("1.0")]);
        release(&mut cache, "foo", "1.0", &["bar==1.2"]);
        let decisions = BTreeMap::from([(name("foo"), v("1.0"))]);
        let exp = GraphBuilder::new(&roots, &cache, &decisions).build().unwrap();

        let foo = exp.graph.find("foo").unwrap();
        let bar = exp.graph.find("bar").unwrap();
        assert_eq!(exp.graph.dependencies_of(foo)[0].0, bar);
        assert_eq!(exp.missing, BTreeSet::from([MetadataKey::Versions(name("bar"))]));
    }

    #[test]
    fn optional_requirement_does_not_pull_package_in() {
        let roots = vec![
            resolved(RawRequirement::registry("foo", "")),
            resolved(RawRequirement::registry("bar", "<1.0").optional()),
        ];
        let mut cache = MetadataCache::new();
        cache.insert_versions(name("foo"), vec![v("1.0")]);
        let decisions = BTreeMap::new();
        let exp = GraphBuilder::new(&roots, &cache, &decisions).build().unwrap();
        assert!(exp.graph.find("bar").is_none());
    }

    #[test]
    fn optional_requirement_constrains_present_package() {
        let roots = vec![
            resolved(RawRequirement::registry("bar", "")),
            resolved(RawRequirement::registry("bar", "<1.0").with_profile("test").optional()),
        ];
        let mut cache = MetadataCache::new();
        cache.insert_versions(name("bar"), vec![v("0.5"), v("1.5")]);
        let decisions = BTreeMap::new();
        let exp = GraphBuilder::new(&roots, &cache, &decisions).build().unwrap();
        let node = exp.graph.node(exp.graph.find("bar").unwrap());
        assert_eq!(node.candidates, Some(vec![v("0.5")]));
        // Optional edges add no profiles.
        assert_eq!(node.profiles.len(), 1);
    }

    #[test]
    fn pin_overrides_registry_requirement() {
        let roots = vec![
            resolved(RawRequirement::registry("m2x", ">=9.0")),
            resolved(RawRequirement::editable("m2x", "../m2x").with_profile("develop")),
        ];
        let mut cache = MetadataCache::new();
        cache
            .insert_requirements(
                name("m2x"),
                PackageVersion::Pinned(Pin::Editable {
                    path: "../m2x".into(),
                    options: Vec::new(),
                }),
                &[],
            )
            .unwrap();
        let decisions = BTreeMap::new();
        let exp = GraphBuilder::new(&roots, &cache, &decisions).build().unwrap();
        let node = exp.graph.node(exp.graph.find("m2x").unwrap());
        assert!(node.is_pinned());
        assert!(!node.has_conflicting_constraints());
        assert!(exp.missing.is_empty());
    }

    #[test]
    fn two_different_pins_conflict() {
        let roots = vec![
            resolved(RawRequirement::editable("m2x", "../m2x")),
            resolved(RawRequirement::editable("m2x", "../other").with_profile("test")),
        ];
        let cache = MetadataCache::new();
        let decisions = BTreeMap::new();
        let err = GraphBuilder::new(&roots, &cache, &decisions).build().unwrap_err();
        assert!(matches!(err, ResolveError::ConflictingPin { name, .. } if name == "m2x"));
    }

    #[test]
    fn cycle_on_expansion_chain() {
        let roots = vec![resolved(RawRequirement::registry("a", ""))];
        let mut cache = MetadataCache::new();
        release(&mut cache, "a", "1.0", &["b"]);
        release(&mut cache, "b", "1.0", &["a"]);
        let decisions = BTreeMap::from([(name("a"), v("1.0")), (name("b"), v("1.0"))]);
        let err = GraphBuilder::new(&roots, &cache, &decisions).build().unwrap_err();
        assert_eq!(
            err,
            ResolveError::CyclicDependency {
                cycle: vec!["a".into(), "b".into(), "a".into()]
            }
        );
    }

    #[test]
    fn disabled_edges_are_skipped() {
        let roots = vec![
            resolved(RawRequirement::registry("foo", "")),
            resolved(RawRequirement::registry("bar", "")),
        ];
        let cache = MetadataCache::new();
        let decisions = BTreeMap::new();
        let all = GraphBuilder::new(&roots, &cache, &decisions).build().unwrap();
        let only_foo: BTreeSet<RequirementEdge> = all
            .edges
            .into_iter()
            .filter(|e| e.target == name("foo"))
            .collect();
        let exp = GraphBuilder::new(&roots, &cache, &decisions)
            .with_enabled(&only_foo)
            .build()
            .unwrap();
        assert_eq!(exp.graph.len(), 1);
        assert!(exp.graph.find("bar").is_none());
    }
}
