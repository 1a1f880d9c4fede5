//! Install plans: a solved graph flattened into executable order.
//!
//! Steps are ordered so that every package comes after everything it
//! requires. Among packages whose dependencies are all placed, the
//! lexicographically smallest name goes first, which makes the order a pure
//! function of the graph.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::path::PathBuf;

use petgraph::graph::NodeIndex;
use serde::{Serialize, Serializer};
use wright_core::profile::Profile;
use wright_core::requirement::PackageName;
use wright_core::version::Version;
use wright_util::errors::ResolveError;

use crate::graph::DependencyGraph;
use crate::metadata::PackageVersion;
use crate::source::Pin;

/// Which profiles a plan should cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileFilter(BTreeSet<Profile>);

impl ProfileFilter {
    pub fn all() -> Self {
        Self(Profile::ALL.iter().copied().collect())
    }

    pub fn only<I: IntoIterator<Item = Profile>>(profiles: I) -> Self {
        Self(profiles.into_iter().collect())
    }

    pub fn includes(&self, profile: Profile) -> bool {
        self.0.contains(&profile)
    }

    pub fn profiles(&self) -> &BTreeSet<Profile> {
        &self.0
    }
}

impl Default for ProfileFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// How to obtain a step's artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StepSource {
    Registry {
        version: Version,
    },
    Editable {
        path: PathBuf,
        options: Vec<String>,
    },
    Vcs {
        locator: String,
        revision: Option<String>,
        options: Vec<String>,
    },
}

impl From<&PackageVersion> for StepSource {
    fn from(version: &PackageVersion) -> Self {
        match version {
            PackageVersion::Release(v) => StepSource::Registry { version: v.clone() },
            PackageVersion::Pinned(Pin::Editable { path, options }) => StepSource::Editable {
                path: path.clone(),
                options: options.clone(),
            },
            PackageVersion::Pinned(Pin::Vcs {
                locator,
                revision,
                options,
            }) => StepSource::Vcs {
                locator: locator.clone(),
                revision: revision.clone(),
                options: options.clone(),
            },
        }
    }
}

impl fmt::Display for StepSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepSource::Registry { version } => write!(f, "{version}"),
            StepSource::Editable { path, options } => {
                write!(f, "(editable {})", path.display())?;
                write_options(f, options)
            }
            StepSource::Vcs {
                locator,
                revision,
                options,
            } => {
                match revision {
                    Some(rev) => write!(f, "({locator}@{rev})")?,
                    None => write!(f, "({locator})")?,
                }
                write_options(f, options)
            }
        }
    }
}

fn write_options(f: &mut fmt::Formatter<'_>, options: &[String]) -> fmt::Result {
    if options.is_empty() {
        Ok(())
    } else {
        write!(f, " options: {}", options.join(" "))
    }
}

/// The version a step installs: a registry release, or `fixed` for an
/// editable or VCS artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepVersion {
    Release(Version),
    Fixed,
}

impl From<&StepSource> for StepVersion {
    fn from(source: &StepSource) -> Self {
        match source {
            StepSource::Registry { version } => StepVersion::Release(version.clone()),
            StepSource::Editable { .. } | StepSource::Vcs { .. } => StepVersion::Fixed,
        }
    }
}

impl fmt::Display for StepVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepVersion::Release(v) => write!(f, "{v}"),
            StepVersion::Fixed => f.write_str("fixed"),
        }
    }
}

impl Serialize for StepVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One package to install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallStep {
    pub name: PackageName,
    pub version: StepVersion,
    pub source: StepSource,
    /// Profiles whose root requirements reach this package.
    pub profiles: BTreeSet<Profile>,
    /// Direct mandatory dependencies, sorted by name.
    pub dependencies: Vec<PackageName>,
}

impl InstallStep {
    pub fn version(&self) -> Option<&Version> {
        match &self.version {
            StepVersion::Release(version) => Some(version),
            StepVersion::Fixed => None,
        }
    }
}

impl fmt::Display for InstallStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let profiles: Vec<&str> = self.profiles.iter().map(|p| p.as_str()).collect();
        write!(f, "{} {} [{}]", self.name, self.source, profiles.join(", "))
    }
}

/// Ordered install steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallPlan {
    pub steps: Vec<InstallStep>,
}

impl InstallPlan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, name: &str) -> Option<&InstallStep> {
        let name = PackageName::parse(name).ok()?;
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        let name = PackageName::parse(name).ok()?;
        self.steps.iter().position(|s| s.name == name)
    }

    /// Keep the steps some selected profile needs, preserving order.
    ///
    /// A dependency's profiles always include its dependents' profiles, so
    /// the filtered plan is still dependency-closed.
    pub fn filter(&self, filter: &ProfileFilter) -> InstallPlan {
        InstallPlan {
            steps: self
                .steps
                .iter()
                .filter(|s| s.profiles.iter().any(|p| filter.includes(*p)))
                .cloned()
                .collect(),
        }
    }

    /// Pretty JSON for machine consumers.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for InstallPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.steps.len().to_string().len();
        for (i, step) in self.steps.iter().enumerate() {
            writeln!(f, "{:>width$}. {step}", i + 1)?;
        }
        Ok(())
    }
}

/// Order a solved graph into an install plan.
pub fn plan(graph: &DependencyGraph) -> Result<InstallPlan, ResolveError> {
    let indices = graph.indices();

    let mut sources: BTreeMap<NodeIndex, StepSource> = BTreeMap::new();
    for &idx in &indices {
        let node = graph.node(idx);
        match &node.version {
            Some(version) => {
                sources.insert(idx, StepSource::from(version));
            }
            None => {
                return Err(ResolveError::Planning {
                    message: format!("package '{}' has no chosen version", node.name),
                })
            }
        }
    }

    let profiles = effective_profiles(graph);

    // Kahn's algorithm over "depends on" edges, smallest name first.
    let mut remaining: BTreeMap<NodeIndex, usize> = indices
        .iter()
        .map(|&idx| (idx, graph.dependencies_of(idx).len()))
        .collect();
    let mut ready: BTreeSet<(PackageName, NodeIndex)> = remaining
        .iter()
        .filter(|(_, &count)| count == 0)
        .map(|(&idx, _)| (graph.node(idx).name.clone(), idx))
        .collect();

    let mut steps = Vec::with_capacity(indices.len());
    while let Some((name, idx)) = ready.pop_first() {
        remaining.remove(&idx);

        let mut dependencies: Vec<PackageName> = graph
            .dependencies_of(idx)
            .into_iter()
            .map(|(dep, _)| graph.node(dep).name.clone())
            .collect();
        dependencies.sort();

        let source = sources.remove(&idx).ok_or_else(|| ResolveError::Planning {
            message: "package visited twice while ordering".to_string(),
        })?;
        steps.push(InstallStep {
            name,
            version: StepVersion::from(&source),
            source,
            profiles: profiles.get(&idx).cloned().unwrap_or_default(),
            dependencies,
        });

        for (dependent, _) in graph.dependents_of(idx) {
            if let Some(count) = remaining.get_mut(&dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert((graph.node(dependent).name.clone(), dependent));
                }
            }
        }
    }

    if !remaining.is_empty() {
        let mut stuck: Vec<String> = remaining
            .keys()
            .map(|&idx| graph.node(idx).name.to_string())
            .collect();
        stuck.sort();
        return Err(ResolveError::Planning {
            message: format!("cannot order packages in a cycle: {}", stuck.join(", ")),
        });
    }

    Ok(InstallPlan { steps })
}

/// Each node's profiles: the union of the profiles of every root requirement
/// that reaches it.
fn effective_profiles(graph: &DependencyGraph) -> BTreeMap<NodeIndex, BTreeSet<Profile>> {
    let mut result: BTreeMap<NodeIndex, BTreeSet<Profile>> = BTreeMap::new();
    for profile in Profile::ALL {
        let mut queue: VecDeque<NodeIndex> = graph.roots(profile).into();
        while let Some(idx) = queue.pop_front() {
            if !result.entry(idx).or_default().insert(profile) {
                continue;
            }
            for (dep, _) in graph.dependencies_of(idx) {
                queue.push_back(dep);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DepEdge, PackageNode};

    fn name(s: &str) -> PackageName {
        PackageName::parse(s).unwrap()
    }

    fn node(n: &str, version: &str, profiles: &[Profile]) -> PackageNode {
        let mut node = PackageNode::new(name(n), None);
        node.version = Some(PackageVersion::Release(Version::parse(version).unwrap()));
        node.profiles = profiles.iter().copied().collect();
        node
    }

    fn edge() -> DepEdge {
        DepEdge {
            requirement: "*".to_string(),
        }
    }

    fn order(plan: &InstallPlan) -> Vec<&str> {
        plan.steps.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn dependencies_come_first() {
        let mut g = DependencyGraph::new();
        let foo = g.add_node(node("foo", "1.0", &[Profile::Runtime]));
        let bar = g.add_node(node("bar", "1.2", &[]));
        g.add_edge(foo, bar, edge());

        let plan = plan(&g).unwrap();
        assert_eq!(order(&plan), ["bar", "foo"]);
        assert_eq!(plan.steps[1].dependencies, vec![name("bar")]);
    }

    #[test]
    fn ties_break_by_name() {
        let mut g = DependencyGraph::new();
        let z = g.add_node(node("zeta", "1.0", &[Profile::Runtime]));
        let a = g.add_node(node("alpha", "1.0", &[Profile::Runtime]));
        let m = g.add_node(node("mid", "1.0", &[]));
        g.add_edge(z, m, edge());
        g.add_edge(a, m, edge());

        assert_eq!(order(&plan(&g).unwrap()), ["mid", "alpha", "zeta"]);
    }

    #[test]
    fn profiles_propagate_to_dependencies() {
        let mut g = DependencyGraph::new();
        let app = g.add_node(node("app", "1.0", &[Profile::Runtime]));
        let pytest = g.add_node(node("pytest", "8.0", &[Profile::Test]));
        let shared = g.add_node(node("shared", "1.0", &[]));
        g.add_edge(app, shared, edge());
        g.add_edge(pytest, shared, edge());

        let plan = plan(&g).unwrap();
        assert_eq!(
            plan.step("shared").unwrap().profiles,
            BTreeSet::from([Profile::Runtime, Profile::Test])
        );

        let runtime = plan.filter(&ProfileFilter::only([Profile::Runtime]));
        assert_eq!(order(&runtime), ["shared", "app"]);
    }

    #[test]
    fn unsolved_graph_is_a_planning_error() {
        let mut g = DependencyGraph::new();
        g.add_node(PackageNode::new(name("foo"), None));
        assert!(matches!(plan(&g), Err(ResolveError::Planning { .. })));
    }

    #[test]
    fn cycle_is_a_planning_error() {
        let mut g = DependencyGraph::new();
        let a = g.add_node(node("a", "1.0", &[Profile::Runtime]));
        let b = g.add_node(node("b", "1.0", &[]));
        g.add_edge(a, b, edge());
        g.add_edge(b, a, edge());
        let err = plan(&g).unwrap_err();
        assert!(err.to_string().contains("a, b"));
    }

    #[test]
    fn display_and_json() {
        let mut g = DependencyGraph::new();
        let mut m2x = PackageNode::new(
            name("m2x"),
            Some(Pin::Editable {
                path: "../m2x".into(),
                options: vec!["build_ext".into()],
            }),
        );
        m2x.profiles.insert(Profile::Develop);
        g.add_node(m2x);

        let plan = plan(&g).unwrap();
        assert_eq!(
            plan.to_string(),
            "1. m2x (editable ../m2x) options: build_ext [develop]\n"
        );
        let json: serde_json::Value = serde_json::from_str(&plan.to_json().unwrap()).unwrap();
        assert_eq!(json["steps"][0]["source"]["kind"], "editable");
        assert_eq!(json["steps"][0]["source"]["options"][0], "build_ext");
        assert_eq!(json["steps"][0]["profiles"][0], "develop");
        assert_eq!(json["steps"][0]["version"], "fixed");
    }

    #[test]
    fn registry_steps_carry_their_version() {
        let mut g = DependencyGraph::new();
        g.add_node(node("six", "1.16.0", &[Profile::Runtime]));

        let plan = plan(&g).unwrap();
        assert_eq!(plan.steps[0].version, StepVersion::Release(Version::parse("1.16.0").unwrap()));
        let json: serde_json::Value = serde_json::from_str(&plan.to_json().unwrap()).unwrap();
        assert_eq!(json["steps"][0]["version"], "1.16.0");
        assert_eq!(json["steps"][0]["source"]["version"], "1.16.0");
    }
}
