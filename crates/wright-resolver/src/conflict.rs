//! Unsatisfiable-core reporting.

use std::fmt;

use wright_util::errors::{ConflictEntry, ResolveError};

use crate::graph::RequirementEdge;

/// A minimal set of requirement edges that cannot all hold at once.
///
/// Removing any single edge makes the rest satisfiable.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UnsatisfiableCore {
    pub edges: Vec<RequirementEdge>,
}

impl UnsatisfiableCore {
    pub fn new(mut edges: Vec<RequirementEdge>) -> Self {
        edges.sort();
        edges.dedup();
        Self { edges }
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn entries(&self) -> Vec<ConflictEntry> {
        self.edges
            .iter()
            .map(|e| ConflictEntry {
                required_by: e.origin.to_string(),
                package: e.target.to_string(),
                constraint: if e.optional {
                    format!("{} (optional)", e.requirement)
                } else {
                    e.requirement.clone()
                },
            })
            .collect()
    }

    pub fn into_error(self) -> ResolveError {
        ResolveError::Unsatisfiable {
            core: self.entries(),
        }
    }
}

impl fmt::Display for UnsatisfiableCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Unsatisfiable requirements ({}):", self.edges.len())?;
        for e in &self.edges {
            writeln!(f, "  {e}")?;
        }
        Ok(())
    }
}
