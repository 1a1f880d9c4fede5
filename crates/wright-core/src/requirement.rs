//! Typed dependency declarations.
//!
//! Raw records from a manifest or from package metadata arrive as
//! [`RawRequirement`]s with loosely typed string fields. They are validated
//! once, here, into [`Requirement`]s with a closed [`SourceDescriptor`];
//! nothing downstream branches on untyped strings.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use wright_util::errors::RequirementError;

use crate::profile::Profile;
use crate::version::VersionConstraint;

/// A normalized package name.
///
/// Comparison is case-insensitive and treats runs of `-`, `_` and `.` as a
/// single `-`, so `Foo_Bar` and `foo-bar` name the same package.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageName(String);

impl PackageName {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let name = raw.trim();
        if name.is_empty() {
            return Err("package name is empty".to_string());
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(format!("invalid character '{bad}' in package name"));
        }
        let first_last = [name.chars().next(), name.chars().last()];
        if first_last
            .iter()
            .flatten()
            .any(|c| !c.is_ascii_alphanumeric())
        {
            return Err("package name must start and end with a letter or digit".to_string());
        }

        let mut normalized = String::with_capacity(name.len());
        let mut in_separator = false;
        for c in name.chars() {
            if matches!(c, '-' | '_' | '.') {
                if !in_separator {
                    normalized.push('-');
                }
                in_separator = true;
            } else {
                normalized.push(c.to_ascii_lowercase());
                in_separator = false;
            }
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for PackageName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// A requirement record as supplied by a manifest or a metadata provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRequirement {
    pub name: String,
    /// Constraint text such as `>=2.0,<3.0`.
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    /// `registry` (default), `editable`, or `vcs` / `git`.
    #[serde(default)]
    pub source: Option<String>,
    /// Local path for editable sources, repository locator for VCS sources.
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub revision: Option<String>,
    /// Build options handed to the executor verbatim, in order.
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub optional: bool,
}

impl RawRequirement {
    /// A registry record, e.g. `RawRequirement::registry("foo", ">=1.0")`.
    pub fn registry(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: Some(version.to_string()).filter(|v| !v.is_empty()),
            ..Self::default()
        }
    }

    pub fn editable(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            source: Some("editable".to_string()),
            location: Some(path.to_string()),
            ..Self::default()
        }
    }

    pub fn vcs(name: &str, locator: &str, revision: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            source: Some("vcs".to_string()),
            location: Some(locator.to_string()),
            revision: revision.map(str::to_string),
            ..Self::default()
        }
    }

    /// Parse the short `name<constraint>` form, e.g. `bar==1.2` or `six`.
    pub fn from_short(spec: &str) -> Self {
        let spec = spec.trim();
        let split = spec
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
            .unwrap_or(spec.len());
        let (name, version) = spec.split_at(split);
        Self::registry(name, version.trim())
    }

    pub fn with_profile(mut self, profile: &str) -> Self {
        self.profile = Some(profile.to_string());
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// A requirement entry that is either `"name<constraint>"` or a full table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RequirementSpec {
    Short(String),
    Detailed(RawRequirement),
}

impl RequirementSpec {
    pub fn into_raw(self) -> RawRequirement {
        match self {
            RequirementSpec::Short(s) => RawRequirement::from_short(&s),
            RequirementSpec::Detailed(raw) => raw,
        }
    }
}

/// Where a package comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// Hosted in the registry; the version is negotiated by the solver.
    Registry(VersionConstraint),
    /// A local source tree, installed in place.
    Editable { location: String, options: Vec<String> },
    /// A version-control checkout at an optional revision.
    Vcs {
        locator: String,
        revision: Option<String>,
        options: Vec<String>,
    },
}

impl SourceDescriptor {
    /// Editable and VCS sources are pinned: they have no version to negotiate.
    pub fn is_pinned(&self) -> bool {
        !matches!(self, SourceDescriptor::Registry(_))
    }
}

/// A validated dependency declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: PackageName,
    pub profile: Profile,
    pub source: SourceDescriptor,
    /// Optional requirements constrain a package without pulling it in.
    pub optional: bool,
}

impl Requirement {
    /// Validate a raw record.
    pub fn from_raw(raw: &RawRequirement) -> Result<Self, RequirementError> {
        let malformed = |reason: String| RequirementError::Malformed {
            name: raw.name.clone(),
            reason,
        };

        let name = PackageName::parse(&raw.name).map_err(malformed)?;
        let profile = match raw.profile.as_deref() {
            Some(p) => p.parse::<Profile>().map_err(malformed)?,
            None => Profile::default(),
        };
        let version = raw.version.as_deref().map(str::trim).filter(|v| !v.is_empty());
        let location = raw.location.as_deref().map(str::trim).filter(|l| !l.is_empty());

        let kind = raw
            .source
            .as_deref()
            .map(|s| s.trim().to_ascii_lowercase())
            .unwrap_or_else(|| "registry".to_string());

        if kind != "vcs" && kind != "git" && raw.revision.is_some() {
            return Err(malformed("only VCS sources take a revision".to_string()));
        }

        let source = match kind.as_str() {
            "registry" => {
                if !raw.options.is_empty() {
                    return Err(malformed(
                        "build options are only allowed on editable or VCS sources".to_string(),
                    ));
                }
                if location.is_some() {
                    return Err(malformed("registry sources take no location".to_string()));
                }
                let constraint = VersionConstraint::parse(version.unwrap_or(""))
                    .map_err(|e| malformed(e.to_string()))?;
                SourceDescriptor::Registry(constraint)
            }
            "editable" | "vcs" | "git" => {
                if let Some(v) = version {
                    return Err(malformed(format!(
                        "pinned {kind} source cannot also require version '{v}'"
                    )));
                }
                let location = location
                    .ok_or_else(|| malformed(format!("{kind} source needs a location")))?
                    .to_string();
                if kind == "editable" {
                    SourceDescriptor::Editable {
                        location,
                        options: raw.options.clone(),
                    }
                } else {
                    SourceDescriptor::Vcs {
                        locator: location,
                        revision: raw
                            .revision
                            .as_deref()
                            .map(str::trim)
                            .filter(|r| !r.is_empty())
                            .map(str::to_string),
                        options: raw.options.clone(),
                    }
                }
            }
            other => {
                return Err(malformed(format!(
                    "unknown source kind '{other}' (expected registry, editable, or vcs)"
                )))
            }
        };

        Ok(Self {
            name,
            profile,
            source,
            optional: raw.optional,
        })
    }

    /// The negotiable constraint; `None` for pinned sources.
    pub fn constraint(&self) -> Option<&VersionConstraint> {
        match &self.source {
            SourceDescriptor::Registry(c) => Some(c),
            _ => None,
        }
    }

    pub fn build_options(&self) -> &[String] {
        match &self.source {
            SourceDescriptor::Registry(_) => &[],
            SourceDescriptor::Editable { options, .. } | SourceDescriptor::Vcs { options, .. } => {
                options.as_slice()
            }
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.source.is_pinned()
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            SourceDescriptor::Registry(c) if c.is_any() => write!(f, "{}", self.name),
            SourceDescriptor::Registry(c) => write!(f, "{}{c}", self.name),
            SourceDescriptor::Editable { location, .. } => {
                write!(f, "{} @ editable {location}", self.name)
            }
            SourceDescriptor::Vcs {
                locator, revision, ..
            } => match revision {
                Some(rev) => write!(f, "{} @ {locator}@{rev}", self.name),
                None => write!(f, "{} @ {locator}", self.name),
            },
        }
    }
}

/// Validate every record, keeping declaration order.
///
/// Errors are collected rather than returned on the first failure, so a
/// caller can report every bad record at once. A package declared twice
/// within the same profile is an error; the same package in two different
/// profiles is fine.
pub fn validate_all(raw: &[RawRequirement]) -> (Vec<Requirement>, Vec<RequirementError>) {
    let mut requirements = Vec::new();
    let mut errors = Vec::new();
    let mut seen: HashSet<(PackageName, Profile)> = HashSet::new();

    for record in raw {
        match Requirement::from_raw(record) {
            Ok(req) => {
                if seen.insert((req.name.clone(), req.profile)) {
                    requirements.push(req);
                } else {
                    errors.push(RequirementError::Duplicate {
                        name: req.name.to_string(),
                        profile: req.profile.to_string(),
                    });
                }
            }
            Err(e) => errors.push(e),
        }
    }

    (requirements, errors)
}
