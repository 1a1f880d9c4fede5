use std::fmt;

use miette::Diagnostic;
use thiserror::Error;

/// A problem with one manifest record.
///
/// Record errors never stop validation of the remaining records; they are
/// gathered into [`ResolveError::Invalid`] and reported together.
#[derive(Debug, Clone, Error, Diagnostic, PartialEq, Eq)]
pub enum RequirementError {
    /// Bad name, bad constraint syntax, or a field combination that cannot hold.
    #[error("Malformed requirement '{name}': {reason}")]
    #[diagnostic(code(wright::malformed_requirement))]
    Malformed { name: String, reason: String },

    /// The editable path or VCS locator does not follow its grammar.
    #[error("Unresolvable source for '{name}' ({location}): {reason}")]
    #[diagnostic(
        code(wright::unresolvable_source),
        help("Editable sources take a local path; VCS sources take a locator such as git+https://host/repo.git")
    )]
    UnresolvableSource {
        name: String,
        location: String,
        reason: String,
    },

    /// The same package declared twice as a direct requirement of one profile.
    #[error("Duplicate requirement '{name}' in profile '{profile}'")]
    #[diagnostic(
        code(wright::duplicate_requirement),
        help("Declare each package at most once per profile")
    )]
    Duplicate { name: String, profile: String },

    /// Two manifest records pin one package to different artifacts.
    #[error("Conflicting pins for '{name}': {first} vs {second}")]
    #[diagnostic(
        code(wright::conflicting_pin),
        help("Keep a single editable or VCS source per package")
    )]
    ConflictingPin {
        name: String,
        first: String,
        second: String,
    },
}

/// One requirement edge taking part in an unsatisfiable core.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ConflictEntry {
    /// `<root:profile>` for manifest requirements, `name==version` otherwise.
    pub required_by: String,
    pub package: String,
    pub constraint: String,
}

impl fmt::Display for ConflictEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} requires {} {}",
            self.required_by, self.package, self.constraint
        )
    }
}

fn render_core(core: &[ConflictEntry]) -> String {
    core.iter()
        .map(|c| format!("  {c}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Failure of a whole resolve call.
#[derive(Debug, Clone, Error, Diagnostic, PartialEq, Eq)]
pub enum ResolveError {
    /// One or more manifest records failed validation.
    #[error("{} invalid requirement(s) in manifest", .errors.len())]
    #[diagnostic(code(wright::invalid_manifest))]
    Invalid {
        #[related]
        errors: Vec<RequirementError>,
    },

    /// Two different fixed artifacts claim the same package name.
    #[error("Conflicting pins for '{name}': {first} vs {second}")]
    #[diagnostic(
        code(wright::conflicting_pin),
        help("Keep a single editable or VCS source per package")
    )]
    ConflictingPin {
        name: String,
        first: String,
        second: String,
    },

    /// Mandatory requirements form a cycle.
    #[error("Cyclic dependency: {}", .cycle.join(" -> "))]
    #[diagnostic(code(wright::cyclic_dependency))]
    CyclicDependency { cycle: Vec<String> },

    /// No assignment satisfies every requirement. `core` is a minimal
    /// unsatisfiable subset of the requirement edges.
    #[error("No installable set satisfies the requirements:\n{}", render_core(.core))]
    #[diagnostic(
        code(wright::unsatisfiable),
        help("Relax or remove one of the listed requirements")
    )]
    Unsatisfiable { core: Vec<ConflictEntry> },

    /// The metadata provider has no record of a release it advertised.
    #[error("Metadata for {name} {version} not found")]
    #[diagnostic(code(wright::metadata_not_found))]
    MetadataNotFound { name: String, version: String },

    /// Transient lookup failures outlasted the retry budget.
    #[error("Fetching metadata for {name} {version} failed after {attempts} attempts: {message}")]
    #[diagnostic(code(wright::fetch_exhausted))]
    FetchExhausted {
        name: String,
        version: String,
        attempts: u32,
        message: String,
    },

    /// The solver hit its step bound before finishing.
    #[error("Resolution gave up after {steps} search steps")]
    #[diagnostic(
        code(wright::search_limit),
        help("Raise max-search-steps or tighten version constraints")
    )]
    SearchLimit { steps: usize },

    /// Planning was asked to order a graph that is not fully solved.
    #[error("Planning error: {message}")]
    #[diagnostic(code(wright::planning))]
    Planning { message: String },

    /// A lookup task died before reporting a result.
    #[error("Internal error: {message}")]
    #[diagnostic(code(wright::internal))]
    Internal { message: String },

    #[error("Resolution cancelled")]
    #[diagnostic(code(wright::cancelled))]
    Cancelled,
}

/// Unified error type for the wright binary.
#[derive(Debug, Error, Diagnostic)]
pub enum WrightError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest file could not be read or parsed.
    #[error("Manifest error: {message}")]
    #[diagnostic(help("Check your manifest for TOML syntax errors"))]
    Manifest { message: String },

    /// Metadata index file could not be read or parsed.
    #[error("Index error: {message}")]
    Index { message: String },

    /// Resolver configuration could not be read or parsed.
    #[error("Config error: {message}")]
    Config { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Resolve(#[from] ResolveError),

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

/// Convenience alias for `miette::Result<T>`.
pub type WrightResult<T> = miette::Result<T>;
