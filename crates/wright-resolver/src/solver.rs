//! Version selection by deterministic backtracking search.
//!
//! Registry nodes are decided one at a time in discovery order, trying each
//! node's candidates from highest to lowest. After every decision the graph is
//! re-expanded; an empty candidate set, or a decided version that no longer
//! satisfies its node's constraints, sends the search back to the most recent
//! decision with untried candidates.
//!
//! The search itself never waits on I/O. When it needs metadata that is not
//! cached yet it stops and reports the missing keys; the caller fetches them
//! as one concurrent batch and runs the search again. The cache only grows,
//! so every rerun gets further than the last.
//!
//! When the search space is exhausted, the requirement edges it saw are
//! shrunk by deletion to a minimal unsatisfiable core.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use wright_core::requirement::PackageName;
use wright_core::version::Version;
use wright_util::errors::ResolveError;

use crate::builder::{Expansion, GraphBuilder};
use crate::cancel::CancelSignal;
use crate::conflict::UnsatisfiableCore;
use crate::fetch::{Batch, Fetcher};
use crate::graph::{DependencyGraph, RequirementEdge};
use crate::metadata::{MetadataCache, MetadataKey, MetadataProvider, PackageVersion};
use crate::source::ResolvedRequirement;

/// A decision point: the package decided and the candidates not yet tried.
#[derive(Debug)]
struct Frame {
    name: PackageName,
    untried: VecDeque<Version>,
}

/// Outcome of one search over the cached metadata.
#[derive(Debug)]
pub enum SearchOutcome {
    /// Every node has a version and every constraint holds.
    Solved(DependencyGraph),
    /// The search cannot continue without these lookups.
    NeedMetadata(Batch),
    /// No assignment exists. Carries every requirement edge seen.
    Unsatisfiable(BTreeSet<RequirementEdge>),
}

/// One search run over a fixed cache.
pub struct Search<'a> {
    roots: &'a [ResolvedRequirement],
    cache: &'a MetadataCache,
    enabled: Option<&'a BTreeSet<RequirementEdge>>,
    max_steps: usize,
}

impl<'a> Search<'a> {
    pub fn new(roots: &'a [ResolvedRequirement], cache: &'a MetadataCache, max_steps: usize) -> Self {
        Self {
            roots,
            cache,
            enabled: None,
            max_steps,
        }
    }

    /// Restrict the search to a subset of requirement edges.
    pub fn with_enabled(mut self, enabled: &'a BTreeSet<RequirementEdge>) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn run(&self) -> Result<SearchOutcome, ResolveError> {
        let mut stack: Vec<Frame> = Vec::new();
        let mut decisions: BTreeMap<PackageName, Version> = BTreeMap::new();
        let mut seen: BTreeSet<RequirementEdge> = BTreeSet::new();
        let mut steps = 0usize;

        loop {
            steps += 1;
            if steps > self.max_steps {
                return Err(ResolveError::SearchLimit {
                    steps: self.max_steps,
                });
            }

            let expansion = self.expand(&decisions)?;
            seen.extend(expansion.edges.iter().cloned());

            if let Some(culprit) = first_conflict(&expansion.graph, &decisions) {
                tracing::debug!(package = %culprit, depth = stack.len(), "conflict, backtracking");
                loop {
                    let Some(frame) = stack.last_mut() else {
                        return Ok(SearchOutcome::Unsatisfiable(seen));
                    };
                    if let Some(next) = frame.untried.pop_front() {
                        decisions.insert(frame.name.clone(), next);
                        break;
                    }
                    decisions.remove(&frame.name);
                    stack.pop();
                }
                continue;
            }

            if !expansion.missing.is_empty() {
                let speculative = frontier(&expansion.graph, &decisions, self.cache)
                    .into_iter()
                    .filter(|k| !expansion.missing.contains(k))
                    .collect();
                return Ok(SearchOutcome::NeedMetadata(Batch {
                    required: expansion.missing,
                    speculative,
                }));
            }

            match next_undecided(&expansion.graph, &decisions) {
                Some((name, mut candidates)) => {
                    let Some(first) = candidates.pop_front() else {
                        // Empty candidate sets are caught as conflicts above.
                        continue;
                    };
                    tracing::debug!(package = %name, version = %first, "deciding");
                    decisions.insert(name.clone(), first);
                    stack.push(Frame {
                        name,
                        untried: candidates,
                    });
                }
                None => {
                    tracing::debug!(steps, packages = expansion.graph.len(), "search solved");
                    return Ok(SearchOutcome::Solved(expansion.graph));
                }
            }
        }
    }

    fn expand(&self, decisions: &BTreeMap<PackageName, Version>) -> Result<Expansion, ResolveError> {
        let builder = GraphBuilder::new(self.roots, self.cache, decisions);
        match self.enabled {
            Some(enabled) => builder.with_enabled(enabled).build(),
            None => builder.build(),
        }
    }
}

/// The first node, in discovery order, whose constraints cannot hold.
fn first_conflict(
    graph: &DependencyGraph,
    decisions: &BTreeMap<PackageName, Version>,
) -> Option<PackageName> {
    graph
        .all_nodes()
        .into_iter()
        .find(|node| {
            if node.has_conflicting_constraints() {
                return true;
            }
            match (&node.candidates, decisions.get(&node.name)) {
                (Some(candidates), Some(decided)) if !node.is_pinned() => {
                    !candidates.contains(decided)
                }
                _ => false,
            }
        })
        .map(|node| node.name.clone())
}

/// The first undecided registry node, in discovery order, with its candidates.
fn next_undecided(
    graph: &DependencyGraph,
    decisions: &BTreeMap<PackageName, Version>,
) -> Option<(PackageName, VecDeque<Version>)> {
    graph
        .all_nodes()
        .into_iter()
        .find(|node| !node.is_pinned() && !decisions.contains_key(&node.name))
        .map(|node| {
            let candidates = node.candidates.clone().unwrap_or_default();
            (node.name.clone(), candidates.into())
        })
}

/// Requirement lookups for the likeliest choice of every undecided node, so
/// they can be fetched in the same batch as the keys the search is blocked on.
fn frontier(
    graph: &DependencyGraph,
    decisions: &BTreeMap<PackageName, Version>,
    cache: &MetadataCache,
) -> Vec<MetadataKey> {
    graph
        .all_nodes()
        .into_iter()
        .filter(|node| !node.is_pinned() && !decisions.contains_key(&node.name))
        .filter_map(|node| {
            let best = node.candidates.as_ref()?.first()?;
            let key = MetadataKey::Requirements(
                node.name.clone(),
                PackageVersion::Release(best.clone()),
            );
            (!cache.contains(&key)).then_some(key)
        })
        .collect()
}

/// Drives searches, fetching metadata between runs.
pub struct Solver<'a, P> {
    roots: &'a [ResolvedRequirement],
    fetcher: &'a Fetcher<P>,
    cancel: &'a CancelSignal,
    max_steps: usize,
}

impl<'a, P: MetadataProvider> Solver<'a, P> {
    pub fn new(
        roots: &'a [ResolvedRequirement],
        fetcher: &'a Fetcher<P>,
        cancel: &'a CancelSignal,
        max_steps: usize,
    ) -> Self {
        Self {
            roots,
            fetcher,
            cancel,
            max_steps,
        }
    }

    /// Find a graph where every node has exactly one version and every
    /// mandatory and optional constraint holds.
    pub async fn solve(&self, cache: &mut MetadataCache) -> Result<DependencyGraph, ResolveError> {
        let mut skipped = BTreeSet::new();
        let mut round = 0usize;
        loop {
            if self.cancel.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }
            let outcome = Search::new(self.roots, cache, self.max_steps).run()?;
            match outcome {
                SearchOutcome::Solved(graph) => {
                    check_acyclic(&graph)?;
                    tracing::info!(rounds = round, packages = graph.len(), "resolved");
                    return Ok(graph);
                }
                SearchOutcome::NeedMetadata(batch) => {
                    round += 1;
                    tracing::debug!(round, lookups = batch.len(), "fetching metadata");
                    self.fetch(batch, cache, &mut skipped).await?;
                }
                SearchOutcome::Unsatisfiable(seen) => {
                    tracing::info!(edges = seen.len(), "unsatisfiable, computing minimal core");
                    let core = self.minimize(seen, cache, &mut skipped).await?;
                    return Err(core.into_error());
                }
            }
        }
    }

    /// Fetch a batch, leaving out guesses that already failed once.
    async fn fetch(
        &self,
        mut batch: Batch,
        cache: &mut MetadataCache,
        skipped: &mut BTreeSet<MetadataKey>,
    ) -> Result<(), ResolveError> {
        batch.speculative.retain(|k| !skipped.contains(k));
        let failed = self.fetcher.fetch(batch, cache, self.cancel).await?;
        skipped.extend(failed);
        Ok(())
    }

    /// Shrink an unsatisfiable edge set by deletion: drop each edge in turn
    /// and keep it out if the rest is still unsatisfiable.
    ///
    /// An edge stays in the core whenever its trial is inconclusive, so the
    /// result is unsatisfiable even if some trial fails.
    async fn minimize(
        &self,
        seen: BTreeSet<RequirementEdge>,
        cache: &mut MetadataCache,
        skipped: &mut BTreeSet<MetadataKey>,
    ) -> Result<UnsatisfiableCore, ResolveError> {
        let mut core: Vec<RequirementEdge> = seen.into_iter().collect();
        let mut i = 0;
        while i < core.len() {
            let trial: BTreeSet<RequirementEdge> = core
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, e)| e.clone())
                .collect();
            match self.trial(&trial, cache, skipped).await? {
                Trial::Unsatisfiable => {
                    core.remove(i);
                }
                Trial::Satisfiable | Trial::Inconclusive => i += 1,
            }
        }
        Ok(UnsatisfiableCore::new(core))
    }

    async fn trial(
        &self,
        enabled: &BTreeSet<RequirementEdge>,
        cache: &mut MetadataCache,
        skipped: &mut BTreeSet<MetadataKey>,
    ) -> Result<Trial, ResolveError> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }
            let outcome = Search::new(self.roots, cache, self.max_steps)
                .with_enabled(enabled)
                .run();
            let batch = match outcome {
                Ok(SearchOutcome::Solved(graph)) => {
                    return Ok(match check_acyclic(&graph) {
                        Ok(()) => Trial::Satisfiable,
                        Err(_) => Trial::Inconclusive,
                    });
                }
                Ok(SearchOutcome::Unsatisfiable(_)) => return Ok(Trial::Unsatisfiable),
                Ok(SearchOutcome::NeedMetadata(batch)) => batch,
                Err(e) => {
                    tracing::debug!(error = %e, "core trial failed, keeping edge");
                    return Ok(Trial::Inconclusive);
                }
            };
            match self.fetch(batch, cache, skipped).await {
                Ok(()) => {}
                Err(ResolveError::Cancelled) => return Err(ResolveError::Cancelled),
                Err(e) => {
                    tracing::debug!(error = %e, "core trial failed, keeping edge");
                    return Ok(Trial::Inconclusive);
                }
            }
        }
    }
}

/// Result of one minimization trial.
enum Trial {
    Satisfiable,
    Unsatisfiable,
    /// The trial hit a cycle or an error; the edge under test is kept.
    Inconclusive,
}

/// Reject graphs whose mandatory edges form a cycle.
pub fn check_acyclic(graph: &DependencyGraph) -> Result<(), ResolveError> {
    match graph.cycles().into_iter().next() {
        Some(members) => {
            let mut cycle: Vec<String> = members.iter().map(ToString::to_string).collect();
            cycle.push(cycle[0].clone());
            Err(ResolveError::CyclicDependency { cycle })
        }
        None => Ok(()),
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

    fn root(raw: RawRequirement) -> ResolvedRequirement {
        ResolvedRequirement::new(Requirement::from_raw(&raw).unwrap()).unwrap()
    }

    /// A cache holding a whole index up front.
    fn cache(packages: &[(&str, &str, &[&str])]) -> MetadataCache {
        let mut versions: BTreeMap<PackageName, Vec<Version>> = BTreeMap::new();
        let mut cache = MetadataCache::new();
        for (n, version, requires) in packages {
            versions.entry(name(n)).or_default().push(v(version));
            let raw: Vec<RawRequirement> =
                requires.iter().map(|r| RawRequirement::from_short(r)).collect();
            cache
                .insert_requirements(name(n), PackageVersion::Release(v(version)), &raw)
                .unwrap();
        }
        for (n, list) in versions {
            cache.insert_versions(n, list);
        }
        cache
    }

    fn chosen(graph: &DependencyGraph, n: &str) -> String {
        graph
            .node(graph.find(n).unwrap())
            .version
            .as_ref()
            .unwrap()
            .to_string()
    }

    #[test]
    fn picks_highest_satisfying_versions() {
        let roots = vec![root(RawRequirement::registry("foo", "<3.0"))];
        let cache = cache(&[
            ("foo", "1.0", &["bar>=1.0"]),
            ("foo", "2.0", &["bar>=1.5"]),
            ("foo", "3.0", &[]),
            ("bar", "1.0", &[]),
            ("bar", "1.6", &[]),
        ]);
        match Search::new(&roots, &cache, 1000).run().unwrap() {
            SearchOutcome::Solved(graph) => {
                assert_eq!(chosen(&graph, "foo"), "2.0");
                assert_eq!(chosen(&graph, "bar"), "1.6");
            }
            other => panic!("expected a solution, got {other:?}"),
        }
    }

    #[test]
    fn backtracks_past_a_conflicting_choice() {
        // foo 2.0 needs bar>=2, but the root caps bar below 2.
        let roots = vec![
            root(RawRequirement::registry("foo", "")),
            root(RawRequirement::registry("bar", "<2.0")),
        ];
        let cache = cache(&[
            ("foo", "1.0", &["bar>=1.0"]),
            ("foo", "2.0", &["bar>=2.0"]),
            ("bar", "1.0", &[]),
            ("bar", "2.0", &[]),
        ]);
        match Search::new(&roots, &cache, 1000).run().unwrap() {
            SearchOutcome::Solved(graph) => {
                assert_eq!(chosen(&graph, "foo"), "1.0");
                assert_eq!(chosen(&graph, "bar"), "1.0");
            }
            other => panic!("expected a solution, got {other:?}"),
        }
    }

    #[test]
    fn reports_missing_metadata_with_frontier() {
        let roots = vec![
            root(RawRequirement::registry("foo", "")),
            root(RawRequirement::registry("bar", "")),
        ];
        let mut cache = MetadataCache::new();
        cache.insert_versions(name("foo"), vec![v("1.0")]);
        cache.insert_versions(name("bar"), vec![v("2.0")]);
        match Search::new(&roots, &cache, 1000).run().unwrap() {
            SearchOutcome::NeedMetadata(batch) => {
                // foo is decided first and blocks; bar's best candidate is prefetched.
                assert_eq!(
                    batch.required,
                    BTreeSet::from([MetadataKey::Requirements(
                        name("foo"),
                        PackageVersion::Release(v("1.0"))
                    )])
                );
                assert!(batch.speculative.contains(&MetadataKey::Requirements(
                    name("bar"),
                    PackageVersion::Release(v("2.0"))
                )));
            }
            other => panic!("expected missing metadata, got {other:?}"),
        }
    }

    #[test]
    fn exhausted_search_is_unsatisfiable() {
        let roots = vec![
            root(RawRequirement::registry("foo", ">=2.0,<3.0")),
            root(RawRequirement::registry("foo", ">=3.0").with_profile("test")),
        ];
        let cache = cache(&[("foo", "2.5", &[]), ("foo", "3.1", &[])]);
        match Search::new(&roots, &cache, 1000).run().unwrap() {
            SearchOutcome::Unsatisfiable(seen) => assert_eq!(seen.len(), 2),
            other => panic!("expected unsatisfiable, got {other:?}"),
        }
    }

    #[test]
    fn step_bound_is_enforced() {
        let roots = vec![root(RawRequirement::registry("foo", ""))];
        let cache = cache(&[("foo", "1.0", &[])]);
        let err = Search::new(&roots, &cache, 1).run().unwrap_err();
        assert_eq!(err, ResolveError::SearchLimit { steps: 1 });
    }

    #[test]
    fn search_is_deterministic() {
        let roots = vec![
            root(RawRequirement::registry("app", "")),
            root(RawRequirement::registry("lib", "")),
        ];
        let cache = cache(&[
            ("app", "1.0", &["lib<2", "util"]),
            ("app", "2.0", &["lib>=3"]),
            ("lib", "1.0", &["util>=1"]),
            ("lib", "2.0", &[]),
            ("util", "1.0", &[]),
            ("util", "1.1", &[]),
        ]);
        let render = || match Search::new(&roots, &cache, 1000).run().unwrap() {
            SearchOutcome::Solved(graph) => graph
                .all_nodes()
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<_>>(),
            other => panic!("expected a solution, got {other:?}"),
        };
        let first = render();
        assert_eq!(first, render());
        assert_eq!(first, ["app 1.0", "lib 1.0", "util 1.1"]);
    }
}
