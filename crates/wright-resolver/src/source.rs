//! Source resolution: where each requirement's package comes from.
//!
//! Registry requirements pass their constraint through to the solver. Editable
//! and VCS requirements are checked against their path or locator grammar and
//! become [`Pin`]s. Nothing is fetched or read here.

use std::fmt;
use std::path::{Component, PathBuf};

use serde::Serialize;
use wright_core::requirement::{Requirement, SourceDescriptor};
use wright_core::version::VersionConstraint;
use wright_util::errors::RequirementError;

/// VCS systems accepted as a `vcs+transport://` prefix.
const VCS_PREFIXES: &[&str] = &["git", "hg", "svn", "bzr"];

/// Transports accepted in a locator URL.
const TRANSPORTS: &[&str] = &["https", "http", "ssh", "git", "file"];

/// A fixed artifact: always installs exactly what it references.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Pin {
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

impl Pin {
    /// Build options recorded for the executor, verbatim and in order.
    pub fn options(&self) -> &[String] {
        match self {
            Pin::Editable { options, .. } | Pin::Vcs { options, .. } => options.as_slice(),
        }
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pin::Editable { path, .. } => write!(f, "editable {}", path.display()),
            Pin::Vcs {
                locator,
                revision: Some(rev),
                ..
            } => write!(f, "{locator}@{rev}"),
            Pin::Vcs { locator, .. } => f.write_str(locator),
        }
    }
}

/// The routing decision for one requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    /// Deferred to the solver.
    Registry(VersionConstraint),
    Pinned(Pin),
}

impl ResolvedSource {
    /// Text naming what this source asks for, e.g. `>=1.0` or `editable ../m2x`.
    pub fn describe(&self) -> String {
        match self {
            ResolvedSource::Registry(c) => c.to_string(),
            ResolvedSource::Pinned(pin) => format!("@ {pin}"),
        }
    }
}

/// A requirement together with its resolved source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRequirement {
    pub requirement: Requirement,
    pub source: ResolvedSource,
}

impl ResolvedRequirement {
    pub fn new(requirement: Requirement) -> Result<Self, RequirementError> {
        let source = resolve(&requirement)?;
        Ok(Self {
            requirement,
            source,
        })
    }
}

/// Decide where a requirement's package comes from.
pub fn resolve(requirement: &Requirement) -> Result<ResolvedSource, RequirementError> {
    let unresolvable = |location: &str, reason: &str| RequirementError::UnresolvableSource {
        name: requirement.name.to_string(),
        location: location.to_string(),
        reason: reason.to_string(),
    };

    match &requirement.source {
        SourceDescriptor::Registry(constraint) => Ok(ResolvedSource::Registry(constraint.clone())),
        SourceDescriptor::Editable { location, options } => {
            let path = parse_local_path(location).map_err(|r| unresolvable(location, &r))?;
            Ok(ResolvedSource::Pinned(Pin::Editable {
                path,
                options: options.clone(),
            }))
        }
        SourceDescriptor::Vcs {
            locator,
            revision,
            options,
        } => {
            let (locator_text, inline_rev) =
                parse_locator(locator).map_err(|r| unresolvable(locator, &r))?;
            let revision = match (revision, inline_rev) {
                (Some(_), Some(_)) => {
                    return Err(unresolvable(locator, "revision given both inline and separately"))
                }
                (Some(rev), None) => Some(rev.clone()),
                (None, inline) => inline,
            };
            if let Some(rev) = &revision {
                if !is_valid_revision(rev) {
                    return Err(unresolvable(locator, &format!("invalid revision '{rev}'")));
                }
            }
            Ok(ResolvedSource::Pinned(Pin::Vcs {
                locator: locator_text,
                revision,
                options: options.clone(),
            }))
        }
    }
}

/// Lexically normalize a local path. `file://` prefixes are stripped; any
/// other URL scheme is rejected.
fn parse_local_path(location: &str) -> Result<PathBuf, String> {
    let text = location.trim();
    let text = text.strip_prefix("file://").unwrap_or(text);
    if text.is_empty() {
        return Err("empty path".to_string());
    }
    if text.contains("://") {
        return Err("editable sources must be local paths".to_string());
    }
    if text.chars().any(char::is_control) {
        return Err("control character in path".to_string());
    }

    let mut path = PathBuf::new();
    for component in PathBuf::from(text).components() {
        match component {
            Component::CurDir => {}
            other => path.push(other.as_os_str()),
        }
    }
    if path.as_os_str().is_empty() {
        path.push(".");
    }
    Ok(path)
}

/// Check a repository locator and split off an inline `@revision`.
///
/// Accepted forms: `vcs+transport://host/path`, `transport://host/path`,
/// and scp-style `user@host:path`.
fn parse_locator(locator: &str) -> Result<(String, Option<String>), String> {
    let text = locator.trim();
    if text.is_empty() {
        return Err("empty locator".to_string());
    }
    if text.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err("whitespace in locator".to_string());
    }

    let Some((scheme, rest)) = text.split_once("://") else {
        return parse_scp_locator(text);
    };

    let transport = match scheme.split_once('+') {
        Some((vcs, transport)) => {
            if !VCS_PREFIXES.contains(&vcs) {
                return Err(format!("unknown VCS '{vcs}'"));
            }
            transport
        }
        None => scheme,
    };
    if !TRANSPORTS.contains(&transport) {
        return Err(format!("unsupported transport '{transport}'"));
    }

    let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
    if host.is_empty() && transport != "file" {
        return Err("missing host".to_string());
    }
    let (path, revision) = split_inline_revision(path);
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        return Err("missing repository path".to_string());
    }

    Ok((format!("{scheme}://{host}/{path}"), revision))
}

fn parse_scp_locator(text: &str) -> Result<(String, Option<String>), String> {
    let (user_host, path) = text
        .split_once(':')
        .ok_or_else(|| "expected a URL or user@host:path".to_string())?;
    let (user, host) = user_host
        .split_once('@')
        .ok_or_else(|| "expected a URL or user@host:path".to_string())?;
    if user.is_empty() || host.is_empty() {
        return Err("missing user or host".to_string());
    }
    let (path, revision) = split_inline_revision(path);
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        return Err("missing repository path".to_string());
    }
    Ok((format!("{user}@{host}:{path}"), revision))
}

fn split_inline_revision(path: &str) -> (&str, Option<String>) {
    match path.rsplit_once('@') {
        Some((head, rev)) if !rev.is_empty() => (head, Some(rev.to_string())),
        _ => (path, None),
    }
}

fn is_valid_revision(rev: &str) -> bool {
    !rev.is_empty()
        && rev
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/' | '+'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wright_core::requirement::RawRequirement;

    fn resolve_raw(raw: RawRequirement) -> Result<ResolvedSource, RequirementError> {
        resolve(&Requirement::from_raw(&raw).unwrap())
    }

    fn pin(raw: RawRequirement) -> Pin {
        match resolve_raw(raw).unwrap() {
            ResolvedSource::Pinned(pin) => pin,
            other => panic!("expected a pin, got {other:?}"),
        }
    }

    #[test]
    fn registry_passes_constraint_through() {
        let source = resolve_raw(RawRequirement::registry("foo", ">=1.0")).unwrap();
        assert_eq!(
            source,
            ResolvedSource::Registry(VersionConstraint::parse(">=1.0").unwrap())
        );
    }

    #[test]
    fn editable_path_is_normalized() {
        let a = pin(RawRequirement::editable("m2x", "./vendor/m2x/"));
        let b = pin(RawRequirement::editable("m2x", "file://vendor/./m2x"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "editable vendor/m2x");
    }

    #[test]
    fn editable_keeps_options() {
        let p = pin(RawRequirement::editable("m2x", "../m2x").with_options(["build_ext"]));
        assert_eq!(p.options(), ["build_ext"]);
    }

    #[test]
    fn editable_rejects_remote_url() {
        let err = resolve_raw(RawRequirement::editable("m2x", "https://example.com/m2x")).unwrap_err();
        assert!(matches!(err, RequirementError::UnresolvableSource { .. }));
    }

    #[test]
    fn vcs_url_forms() {
        let p = pin(RawRequirement::vcs("lint", "git+https://example.com/org/lint.git/", None));
        assert_eq!(p.to_string(), "git+https://example.com/org/lint.git");

        let p = pin(RawRequirement::vcs("lint", "git@example.com:org/lint.git", Some("main")));
        assert_eq!(p.to_string(), "git@example.com:org/lint.git@main");
    }

    #[test]
    fn vcs_inline_revision() {
        match pin(RawRequirement::vcs("lint", "git+ssh://example.com/lint.git@v2.1", None)) {
            Pin::Vcs {
                locator, revision, ..
            } => {
                assert_eq!(locator, "git+ssh://example.com/lint.git");
                assert_eq!(revision.as_deref(), Some("v2.1"));
            }
            other => panic!("expected VCS pin, got {other:?}"),
        }
    }

    #[test]
    fn vcs_rejects_bad_locators() {
        for bad in [
            "ftp://example.com/x",
            "cvs+https://example.com/x",
            "https://",
            "https://example.com/",
            "not a url",
            "just-a-name",
        ] {
            let err = resolve_raw(RawRequirement::vcs("x", bad, None)).unwrap_err();
            assert!(
                matches!(err, RequirementError::UnresolvableSource { .. }),
                "{bad}: {err:?}"
            );
        }
    }

    #[test]
    fn vcs_rejects_double_revision() {
        let err = resolve_raw(RawRequirement::vcs(
            "x",
            "https://example.com/x.git@v1",
            Some("v2"),
        ))
        .unwrap_err();
        assert!(matches!(err, RequirementError::UnresolvableSource { .. }));
    }

    #[test]
    fn vcs_rejects_bad_revision() {
        let err = resolve_raw(RawRequirement::vcs("x", "https://example.com/x.git", Some("a;b")))
            .unwrap_err();
        assert!(matches!(err, RequirementError::UnresolvableSource { .. }));
    }
}
