//! Dependency resolution engine: source resolution, breadth-first graph
//! expansion, backtracking version selection with minimal conflict cores,
//! and install plan generation.

pub mod builder;
pub mod cancel;
pub mod conflict;
pub mod fetch;
pub mod graph;
pub mod metadata;
pub mod pipeline;
pub mod plan;
pub mod solver;
pub mod source;

pub use cancel::CancelSignal;
pub use metadata::{MetadataError, MetadataProvider, PackageVersion, StaticIndex};
pub use pipeline::{resolve, resolve_graph};
pub use plan::{InstallPlan, InstallStep, ProfileFilter, StepSource, StepVersion};
