//! End-to-end resolution: raw manifest records in, install plan out.

use std::collections::BTreeMap;
use std::sync::Arc;

use wright_core::config::ResolverConfig;
use wright_core::requirement::{validate_all, PackageName, RawRequirement, Requirement};
use wright_util::errors::{RequirementError, ResolveError};

use crate::cancel::CancelSignal;
use crate::fetch::Fetcher;
use crate::graph::DependencyGraph;
use crate::metadata::{MetadataCache, MetadataProvider};
use crate::plan::{self, InstallPlan, ProfileFilter};
use crate::solver::Solver;
use crate::source::{self, Pin, ResolvedRequirement, ResolvedSource};

/// Validate manifest records and resolve their sources.
///
/// Every record is checked and all failures come back together as `Invalid`.
/// Pins are compared across every record that parses, duplicates included:
/// a lone pin conflict is reported as `ConflictingPin`, and one found next to
/// other record errors joins them in `Invalid`.
pub fn prepare_roots(raw: &[RawRequirement]) -> Result<Vec<ResolvedRequirement>, ResolveError> {
    let (requirements, mut errors) = validate_all(raw);
    let mut roots = Vec::with_capacity(requirements.len());
    for requirement in requirements {
        match ResolvedRequirement::new(requirement) {
            Ok(root) => roots.push(root),
            Err(e) => errors.push(e),
        }
    }

    let mut conflicts = pin_conflicts(raw);
    // A differing pin explains a repeated name better than the repeat does.
    errors.retain(|e| match e {
        RequirementError::Duplicate { name, .. } => !conflicts.iter().any(|c| c.name == *name),
        _ => true,
    });

    if errors.is_empty() {
        match conflicts.len() {
            0 => return Ok(roots),
            1 => {
                if let Some(conflict) = conflicts.pop() {
                    return Err(ResolveError::ConflictingPin {
                        name: conflict.name,
                        first: conflict.first,
                        second: conflict.second,
                    });
                }
            }
            _ => {}
        }
    }
    errors.extend(conflicts.into_iter().map(PinConflict::into_record_error));
    Err(ResolveError::Invalid { errors })
}

/// Two manifest records pinning one package to different artifacts.
struct PinConflict {
    name: String,
    first: String,
    second: String,
}

impl PinConflict {
    fn into_record_error(self) -> RequirementError {
        RequirementError::ConflictingPin {
            name: self.name,
            first: self.first,
            second: self.second,
        }
    }
}

/// The first differing pin of every package, in name order.
fn pin_conflicts(raw: &[RawRequirement]) -> Vec<PinConflict> {
    let mut pins: BTreeMap<PackageName, Pin> = BTreeMap::new();
    let mut conflicts: BTreeMap<PackageName, PinConflict> = BTreeMap::new();
    for record in raw {
        let Ok(requirement) = Requirement::from_raw(record) else {
            continue;
        };
        let Ok(ResolvedSource::Pinned(pin)) = source::resolve(&requirement) else {
            continue;
        };
        let name = requirement.name;
        match pins.get(&name) {
            Some(first) if *first != pin && !conflicts.contains_key(&name) => {
                let conflict = PinConflict {
                    name: name.to_string(),
                    first: first.to_string(),
                    second: pin.to_string(),
                };
                conflicts.insert(name, conflict);
            }
            Some(_) => {}
            None => {
                pins.insert(name, pin);
            }
        }
    }
    conflicts.into_values().collect()
}

/// Resolve manifest records to a solved dependency graph.
pub async fn resolve_graph<P: MetadataProvider>(
    raw: &[RawRequirement],
    provider: Arc<P>,
    config: &ResolverConfig,
    cancel: &CancelSignal,
) -> Result<DependencyGraph, ResolveError> {
    let roots = prepare_roots(raw)?;
    tracing::debug!(roots = roots.len(), "resolving");

    let fetcher = Fetcher::from_config(provider, config);
    let mut cache = MetadataCache::new();
    Solver::new(&roots, &fetcher, cancel, config.max_search_steps)
        .solve(&mut cache)
        .await
}

/// Resolve manifest records to an install plan covering `filter`'s profiles.
///
/// All profiles are solved together, so a package shared between profiles
/// gets one version everywhere; the filter only decides which steps are kept.
pub async fn resolve<P: MetadataProvider>(
    raw: &[RawRequirement],
    provider: Arc<P>,
    config: &ResolverConfig,
    filter: &ProfileFilter,
    cancel: &CancelSignal,
) -> Result<InstallPlan, ResolveError> {
    let graph = resolve_graph(raw, provider, config, cancel).await?;
    let plan = plan::plan(&graph)?;
    Ok(plan.filter(filter))
}
