//! Dependency graph storage and traversal.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use wright_core::profile::Profile;
use wright_core::requirement::PackageName;
use wright_core::version::{Version, VersionConstraint};

use crate::metadata::PackageVersion;
use crate::source::{Pin, ResolvedRequirement};

/// Who declared a requirement.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Origin {
    /// A manifest requirement in the given profile.
    Root(Profile),
    /// A requirement declared by a chosen release or pinned artifact.
    Package {
        name: PackageName,
        version: PackageVersion,
    },
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Root(profile) => write!(f, "<root:{profile}>"),
            Origin::Package {
                name,
                version: PackageVersion::Release(v),
            } => write!(f, "{name}=={v}"),
            Origin::Package {
                name,
                version: PackageVersion::Pinned(pin),
            } => write!(f, "{name} @ {pin}"),
        }
    }
}

/// Identity of one requirement edge: who asked for which package, and how.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequirementEdge {
    pub origin: Origin,
    pub target: PackageName,
    /// The constraint text, or `@ <pin>` for pinned sources.
    pub requirement: String,
    pub optional: bool,
}

impl RequirementEdge {
    pub fn new(origin: &Origin, req: &ResolvedRequirement) -> Self {
        Self {
            origin: origin.clone(),
            target: req.requirement.name.clone(),
            requirement: req.source.describe(),
            optional: req.requirement.optional,
        }
    }
}

impl fmt::Display for RequirementEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} requires {} {}", self.origin, self.target, self.requirement)?;
        if self.optional {
            f.write_str(" (optional)")?;
        }
        Ok(())
    }
}

/// A registry constraint as it reached a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintRecord {
    pub origin: Origin,
    pub constraint: VersionConstraint,
    pub optional: bool,
}

/// One package in the graph.
///
/// Registry nodes carry their candidate set: every available version that
/// satisfies all constraints recorded so far, highest first. Pinned nodes
/// have no candidates; their artifact is fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageNode {
    pub name: PackageName,
    pub pin: Option<Pin>,
    /// The chosen version. Set for pinned nodes and decided registry nodes.
    pub version: Option<PackageVersion>,
    /// `None` until the version list has been fetched.
    pub candidates: Option<Vec<Version>>,
    pub constraints: Vec<ConstraintRecord>,
    /// Profiles whose manifest requirements name this package directly.
    pub profiles: BTreeSet<Profile>,
}

impl PackageNode {
    pub fn new(name: PackageName, pin: Option<Pin>) -> Self {
        let version = pin.clone().map(PackageVersion::Pinned);
        Self {
            name,
            pin,
            version,
            candidates: None,
            constraints: Vec::new(),
            profiles: BTreeSet::new(),
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.pin.is_some()
    }

    /// Intersection of every recorded constraint.
    pub fn constraint(&self) -> VersionConstraint {
        self.constraints
            .iter()
            .fold(VersionConstraint::any(), |acc, c| acc.intersect(&c.constraint))
    }

    /// Known to have no version satisfying every constraint.
    pub fn has_conflicting_constraints(&self) -> bool {
        !self.is_pinned() && matches!(&self.candidates, Some(c) if c.is_empty())
    }
}

impl fmt::Display for PackageNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(PackageVersion::Release(v)) => write!(f, "{} {v}", self.name),
            Some(PackageVersion::Pinned(pin)) => write!(f, "{} ({pin})", self.name),
            None => write!(f, "{} (unresolved)", self.name),
        }
    }
}

/// Edge label: the requirement text that created the edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepEdge {
    pub requirement: String,
}

/// A dependency graph keyed by package name, backed by petgraph.
///
/// Edges point from a package to the packages it requires. Only mandatory
/// requirements create edges.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<PackageNode, DepEdge>,
    index: HashMap<PackageName, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or retrieve a node. If the name already exists, returns the existing index.
    pub fn add_node(&mut self, node: PackageNode) -> NodeIndex {
        if let Some(&idx) = self.index.get(&node.name) {
            return idx;
        }
        let name = node.name.clone();
        let idx = self.graph.add_node(node);
        self.index.insert(name, idx);
        idx
    }

    /// Add a dependency edge from `from` to `to`.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, edge: DepEdge) {
        if !self.graph.edges(from).any(|e| e.target() == to) {
            self.graph.add_edge(from, to, edge);
        }
    }

    pub fn index_of(&self, name: &PackageName) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    /// Look up a node by name as a user typed it; the name is normalized first.
    pub fn find(&self, name: &str) -> Option<NodeIndex> {
        let name = PackageName::parse(name).ok()?;
        self.index_of(&name)
    }

    pub fn node(&self, idx: NodeIndex) -> &PackageNode {
        &self.graph[idx]
    }

    pub fn node_mut(&mut self, idx: NodeIndex) -> &mut PackageNode {
        &mut self.graph[idx]
    }

    /// Node indices in discovery order.
    pub fn indices(&self) -> Vec<NodeIndex> {
        self.graph.node_indices().collect()
    }

    /// All nodes in discovery order.
    pub fn all_nodes(&self) -> Vec<&PackageNode> {
        self.graph.node_indices().map(|idx| &self.graph[idx]).collect()
    }

    /// Direct dependencies of a node.
    pub fn dependencies_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &DepEdge)> {
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.target(), e.weight()))
            .collect()
    }

    /// Reverse dependencies (who depends on this node).
    pub fn dependents_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &DepEdge)> {
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (e.source(), e.weight()))
            .collect()
    }

    /// Nodes required directly by a profile, sorted by name.
    pub fn roots(&self, profile: Profile) -> Vec<NodeIndex> {
        let mut roots: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&idx| self.graph[idx].profiles.contains(&profile))
            .collect();
        roots.sort_by(|a, b| self.graph[*a].name.cmp(&self.graph[*b].name));
        roots
    }

    /// Strongly connected components that form cycles, each sorted by name.
    pub fn cycles(&self) -> Vec<Vec<PackageName>> {
        let mut cycles: Vec<Vec<PackageName>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || self.graph.edges(scc[0]).any(|e| e.target() == scc[0])
            })
            .map(|scc| {
                let mut names: Vec<PackageName> =
                    scc.iter().map(|&idx| self.graph[idx].name.clone()).collect();
                names.sort();
                names
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Print the dependency tree to a string, grouping by profile.
    pub fn print_tree(&self, max_depth: Option<usize>) -> String {
        let mut output = String::new();

        let sections: Vec<(Profile, Vec<NodeIndex>)> = Profile::ALL
            .iter()
            .map(|&p| (p, self.roots(p)))
            .filter(|(_, roots)| !roots.is_empty())
            .collect();
        let show_headers =
            sections.len() > 1 || sections.iter().any(|(p, _)| *p != Profile::Runtime);

        let mut visited = HashSet::new();
        let total_sections = sections.len();
        for (i, (profile, roots)) in sections.iter().enumerate() {
            if show_headers {
                output.push_str(&format!("[{profile}]\n"));
            }
            let is_last_section = i == total_sections - 1;
            let count = roots.len();
            for (j, idx) in roots.iter().enumerate() {
                let is_last = j == count - 1 && is_last_section;
                self.print_subtree(&mut output, *idx, "", is_last, 1, max_depth, &mut visited);
            }
        }

        output
    }

    #[allow(clippy::too_many_arguments)]
    fn print_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        prefix: &str,
        is_last: bool,
        depth: usize,
        max_depth: Option<usize>,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        let node = &self.graph[idx];
        output.push_str(&format!("{prefix}{connector}{node}\n"));

        if let Some(max) = max_depth {
            if depth >= max {
                return;
            }
        }

        if !visited.insert(idx) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let mut deps = self.dependencies_of(idx);
        deps.sort_by(|a, b| self.graph[a.0].name.cmp(&self.graph[b.0].name));
        let count = deps.len();
        for (i, (child, _)) in deps.iter().enumerate() {
            let is_last = i == count - 1;
            self.print_subtree(
                output,
                *child,
                &child_prefix,
                is_last,
                depth + 1,
                max_depth,
                visited,
            );
        }

        visited.remove(&idx);
    }

    /// Find a path from a direct requirement to `target`.
    ///
    /// Direct requirements are tried in name order, so the answer is stable.
    pub fn find_path(&self, target: &str) -> Option<Vec<&PackageNode>> {
        let target = self.find(target)?;
        let mut starts: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&idx| !self.graph[idx].profiles.is_empty())
            .collect();
        starts.sort_by(|a, b| self.graph[*a].name.cmp(&self.graph[*b].name));

        for start in starts {
            let mut path = Vec::new();
            let mut visited = HashSet::new();
            if self.dfs_path(start, target, &mut path, &mut visited) {
                return Some(path.iter().map(|&idx| &self.graph[idx]).collect());
            }
        }
        None
    }

    fn dfs_path(
        &self,
        current: NodeIndex,
        target: NodeIndex,
        path: &mut Vec<NodeIndex>,
        visited: &mut HashSet<NodeIndex>,
    ) -> bool {
        path.push(current);
        if current == target {
            return true;
        }
        if !visited.insert(current) {
            path.pop();
            return false;
        }
        let mut next: Vec<NodeIndex> = self.graph.edges(current).map(|e| e.target()).collect();
        next.sort_by(|a, b| self.graph[*a].name.cmp(&self.graph[*b].name));
        for child in next {
            if self.dfs_path(child, target, path, visited) {
                return true;
            }
        }
        path.pop();
        false
    }

    /// Build an inverted dependency tree (reverse edges) for one package.
    pub fn print_inverted_tree(&self, target: &str) -> String {
        let mut output = String::new();
        let Some(idx) = self.find(target) else {
            return output;
        };

        output.push_str(&self.inverted_line(idx));

        let mut visited = HashSet::new();
        visited.insert(idx);

        let dependents = self.dependents_of(idx);
        let count = dependents.len();
        for (i, (dep_idx, _)) in dependents.iter().enumerate() {
            let is_last = i == count - 1;
            self.print_inverted_subtree(&mut output, *dep_idx, "", is_last, &mut visited);
        }

        output
    }

    fn print_inverted_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        prefix: &str,
        is_last: bool,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        output.push_str(&format!("{prefix}{connector}{}", self.inverted_line(idx)));

        if !visited.insert(idx) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let dependents = self.dependents_of(idx);
        let count = dependents.len();
        for (i, (dep_idx, _)) in dependents.iter().enumerate() {
            let is_last = i == count - 1;
            self.print_inverted_subtree(output, *dep_idx, &child_prefix, is_last, visited);
        }

        visited.remove(&idx);
    }

    fn inverted_line(&self, idx: NodeIndex) -> String {
        let node = &self.graph[idx];
        if node.profiles.is_empty() {
            format!("{node}\n")
        } else {
            let profiles: Vec<&str> = node.profiles.iter().map(|p| p.as_str()).collect();
            format!("{node} [{}]\n", profiles.join(", "))
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
