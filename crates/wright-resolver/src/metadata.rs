//! Package metadata: the provider seam, the per-resolve cache, and a static
//! index backed by TOML.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use wright_core::requirement::{PackageName, RawRequirement, Requirement, RequirementSpec};
use wright_core::version::Version;
use wright_util::errors::{RequirementError, WrightError};

use crate::source::{Pin, ResolvedRequirement};

/// Which artifact of a package to look up requirements for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PackageVersion {
    Release(Version),
    Pinned(Pin),
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageVersion::Release(v) => write!(f, "{v}"),
            PackageVersion::Pinned(pin) => write!(f, "({pin})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    /// The provider has no record of the package or release.
    #[error("not found")]
    NotFound,
    /// A failure worth retrying: timeouts, connection resets, throttling.
    #[error("{0}")]
    Transient(String),
}

impl MetadataError {
    pub fn is_transient(&self) -> bool {
        matches!(self, MetadataError::Transient(_))
    }
}

/// Source of package metadata.
///
/// Implementations are shared across concurrent lookups, so they must be
/// `Send + Sync`. Both calls should be pure for a given input over the
/// duration of one resolve.
pub trait MetadataProvider: Send + Sync + 'static {
    /// Every published version of a registry package, in any order.
    fn versions(
        &self,
        name: &PackageName,
    ) -> impl Future<Output = Result<Vec<Version>, MetadataError>> + Send;

    /// Requirements declared by one release or pinned artifact.
    fn lookup(
        &self,
        name: &PackageName,
        version: &PackageVersion,
    ) -> impl Future<Output = Result<Vec<RawRequirement>, MetadataError>> + Send;
}

/// One piece of metadata the solver is waiting on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum MetadataKey {
    Versions(PackageName),
    Requirements(PackageName, PackageVersion),
}

impl MetadataKey {
    pub fn name(&self) -> &PackageName {
        match self {
            MetadataKey::Versions(name) | MetadataKey::Requirements(name, _) => name,
        }
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataKey::Versions(name) => write!(f, "{name} (versions)"),
            MetadataKey::Requirements(name, version) => write!(f, "{name} {version}"),
        }
    }
}

/// Metadata fetched so far during one resolve. Grows monotonically.
#[derive(Debug, Default)]
pub struct MetadataCache {
    /// Available versions, highest first.
    versions: BTreeMap<PackageName, Vec<Version>>,
    requirements: BTreeMap<(PackageName, PackageVersion), Vec<ResolvedRequirement>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn versions(&self, name: &PackageName) -> Option<&[Version]> {
        self.versions.get(name).map(Vec::as_slice)
    }

    pub fn requirements(
        &self,
        name: &PackageName,
        version: &PackageVersion,
    ) -> Option<&[ResolvedRequirement]> {
        self.requirements
            .get(&(name.clone(), version.clone()))
            .map(Vec::as_slice)
    }

    pub fn contains(&self, key: &MetadataKey) -> bool {
        match key {
            MetadataKey::Versions(name) => self.versions.contains_key(name),
            MetadataKey::Requirements(name, version) => self
                .requirements
                .contains_key(&(name.clone(), version.clone())),
        }
    }

    /// Record a version list. Duplicates are dropped and the list sorted
    /// highest first.
    pub fn insert_versions(&mut self, name: PackageName, mut versions: Vec<Version>) {
        versions.sort_by(|a, b| b.cmp(a));
        versions.dedup();
        self.versions.insert(name, versions);
    }

    /// Validate and record the requirements one artifact declares.
    pub fn insert_requirements(
        &mut self,
        name: PackageName,
        version: PackageVersion,
        raw: &[RawRequirement],
    ) -> Result<(), Vec<RequirementError>> {
        let mut resolved = Vec::with_capacity(raw.len());
        let mut errors = Vec::new();
        for record in raw {
            match Requirement::from_raw(record).and_then(ResolvedRequirement::new) {
                Ok(req) => resolved.push(req),
                Err(e) => errors.push(e),
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        self.requirements.insert((name, version), resolved);
        Ok(())
    }
}

/// An in-memory metadata provider.
///
/// Releases map `name -> version -> requirements`. Pinned artifacts are keyed
/// by name only: whatever editable tree or checkout a pin points at, the
/// index answers with the same requirement list.
#[derive(Debug, Clone, Default)]
pub struct StaticIndex {
    releases: BTreeMap<PackageName, BTreeMap<Version, Vec<RawRequirement>>>,
    pinned: BTreeMap<PackageName, Vec<RawRequirement>>,
}

#[derive(Debug, Deserialize)]
struct IndexFile {
    #[serde(default, rename = "package")]
    packages: Vec<IndexEntry>,
}

#[derive(Debug, Deserialize)]
struct IndexEntry {
    name: String,
    /// Absent for entries describing a pinned artifact.
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    requires: Vec<RequirementSpec>,
}

impl StaticIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_release(
        &mut self,
        name: PackageName,
        version: Version,
        requires: Vec<RawRequirement>,
    ) {
        self.releases
            .entry(name)
            .or_default()
            .insert(version, requires);
    }

    pub fn insert_pinned(&mut self, name: PackageName, requires: Vec<RawRequirement>) {
        self.pinned.insert(name, requires);
    }

    /// Load an index file.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| WrightError::Index {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        Self::parse_toml(&content)
    }

    /// Parse index TOML made of `[[package]]` tables.
    pub fn parse_toml(content: &str) -> miette::Result<Self> {
        let file: IndexFile = toml::from_str(content).map_err(|e| WrightError::Index {
            message: format!("Failed to parse index: {e}"),
        })?;

        let mut index = Self::new();
        for entry in file.packages {
            let name = PackageName::parse(&entry.name).map_err(|e| WrightError::Index {
                message: format!("Bad package name '{}': {e}", entry.name),
            })?;
            let requires = entry
                .requires
                .into_iter()
                .map(RequirementSpec::into_raw)
                .collect();
            match entry.version {
                Some(text) => {
                    let version = Version::parse(&text).map_err(|e| WrightError::Index {
                        message: format!("Bad version for '{name}': {e}"),
                    })?;
                    index.insert_release(name, version, requires);
                }
                None => index.insert_pinned(name, requires),
            }
        }
        Ok(index)
    }

    pub fn package_count(&self) -> usize {
        self.releases
            .keys()
            .chain(self.pinned.keys())
            .collect::<BTreeSet<_>>()
            .len()
    }
}

impl MetadataProvider for StaticIndex {
    fn versions(
        &self,
        name: &PackageName,
    ) -> impl Future<Output = Result<Vec<Version>, MetadataError>> + Send {
        let found = self
            .releases
            .get(name)
            .map(|releases| releases.keys().cloned().collect())
            .ok_or(MetadataError::NotFound);
        async move { found }
    }

    fn lookup(
        &self,
        name: &PackageName,
        version: &PackageVersion,
    ) -> impl Future<Output = Result<Vec<RawRequirement>, MetadataError>> + Send {
        let found = match version {
            PackageVersion::Release(v) => self.releases.get(name).and_then(|r| r.get(v)),
            PackageVersion::Pinned(_) => self.pinned.get(name),
        }
        .cloned()
        .ok_or(MetadataError::NotFound);
        async move { found }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> PackageName {
        PackageName::parse(s).unwrap()
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn cache_sorts_versions_highest_first() {
        let mut cache = MetadataCache::new();
        cache.insert_versions(name("foo"), vec![v("1.0"), v("2.0"), v("1.5"), v("2.0.0")]);
        let versions: Vec<String> = cache
            .versions(&name("foo"))
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(versions, ["2.0", "1.5", "1.0"]);
    }

    #[test]
    fn cache_rejects_malformed_requirements() {
        let mut cache = MetadataCache::new();
        let errors = cache
            .insert_requirements(
                name("foo"),
                PackageVersion::Release(v("1.0")),
                &[RawRequirement::registry("bar", ">>1"), RawRequirement::registry("baz", "")],
            )
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(!cache.contains(&MetadataKey::Requirements(
            name("foo"),
            PackageVersion::Release(v("1.0"))
        )));
    }

    #[test]
    fn index_from_toml() {
        let index = StaticIndex::parse_toml(
            r#"
[[package]]
name = "foo"
version = "1.0"
requires = ["bar==1.2"]

[[package]]
name = "bar"
version = "1.2"

[[package]]
name = "m2x"
requires = [{ name = "six", version = ">=1.16" }]
"#,
        )
        .unwrap();
        assert_eq!(index.package_count(), 3);
        assert_eq!(index.releases[&name("foo")][&v("1.0")][0].name, "bar");
        assert_eq!(index.pinned[&name("m2x")][0].version.as_deref(), Some(">=1.16"));
    }

    #[test]
    fn index_rejects_bad_version() {
        let err = StaticIndex::parse_toml("[[package]]\nname = \"foo\"\nversion = \"one\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("Bad version"));
    }

    #[tokio::test]
    async fn index_lookup() {
        let mut index = StaticIndex::new();
        index.insert_release(name("foo"), v("1.0"), vec![RawRequirement::from_short("bar")]);

        assert_eq!(index.versions(&name("foo")).await.unwrap(), vec![v("1.0")]);
        assert_eq!(index.versions(&name("nope")).await, Err(MetadataError::NotFound));

        let reqs = index
            .lookup(&name("foo"), &PackageVersion::Release(v("1.0")))
            .await
            .unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(
            index
                .lookup(&name("foo"), &PackageVersion::Release(v("2.0")))
                .await,
            Err(MetadataError::NotFound)
        );
    }
}
