//! Release version parsing, comparison, and constraint matching.
//!
//! Versions follow the common subset of PEP 440:
//! - Release segments are split on `.` and compare numerically
//! - Trailing zero segments are insignificant (`1.0 == 1.0.0`)
//! - Suffixes have a fixed ordering:
//!   `.devN` (alone) < `aN` < `bN` < `rcN` < release < `.postN`
//! - A `.devN` suffix sorts before the same version without it

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A version string that does not follow the grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version '{text}': {reason}")]
pub struct VersionError {
    pub text: String,
    pub reason: String,
}

/// A constraint string that does not follow the grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid constraint '{text}': {reason}")]
pub struct ConstraintError {
    pub text: String,
    pub reason: String,
}

/// A parsed release version with comparable parts.
#[derive(Debug, Clone)]
pub struct Version {
    original: String,
    release: Vec<u64>,
    pre: Option<(PreKind, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
}

/// Pre-release phases in ascending order.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub enum PreKind {
    Alpha,
    Beta,
    Rc,
}

/// Where a version sits relative to its release: dev-only builds first,
/// then pre-releases, then the final release.
#[derive(Eq, PartialEq, Ord, PartialOrd)]
enum Phase {
    DevOnly,
    Pre(PreKind, u64),
    Final,
}

impl Version {
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let fail = |reason: &str| VersionError {
            text: text.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = text.trim();
        let lowered = trimmed.to_ascii_lowercase();
        let body = lowered.strip_prefix('v').unwrap_or(&lowered);

        let mut release = Vec::new();
        let mut rest = body;
        loop {
            let (digits, tail) = split_digits(rest);
            if digits.is_empty() {
                return Err(fail("expected a release number"));
            }
            release.push(number(digits).ok_or_else(|| fail("release number too large"))?);
            match tail.strip_prefix('.') {
                Some(next) if next.starts_with(|c: char| c.is_ascii_digit()) => rest = next,
                _ => {
                    rest = tail;
                    break;
                }
            }
        }

        let mut version = Version {
            original: trimmed.to_string(),
            release,
            pre: None,
            post: None,
            dev: None,
        };

        while !rest.is_empty() {
            let unseparated = rest.strip_prefix(['.', '-', '_']).unwrap_or(rest);
            let (word, tail) = split_alpha(unseparated);
            let tail = match tail.strip_prefix(['.', '-', '_']) {
                Some(t) if t.starts_with(|c: char| c.is_ascii_digit()) => t,
                _ => tail,
            };
            let (digits, tail) = split_digits(tail);
            let n = if digits.is_empty() {
                0
            } else {
                number(digits).ok_or_else(|| fail("suffix number too large"))?
            };

            match word {
                "a" | "alpha" | "b" | "beta" | "c" | "rc" | "pre" | "preview" => {
                    if version.pre.is_some() || version.post.is_some() || version.dev.is_some() {
                        return Err(fail("pre-release suffix out of order"));
                    }
                    let kind = match word {
                        "a" | "alpha" => PreKind::Alpha,
                        "b" | "beta" => PreKind::Beta,
                        _ => PreKind::Rc,
                    };
                    version.pre = Some((kind, n));
                }
                "post" | "rev" | "r" => {
                    if version.post.is_some() || version.dev.is_some() {
                        return Err(fail("post-release suffix out of order"));
                    }
                    version.post = Some(n);
                }
                "dev" => {
                    if version.dev.is_some() {
                        return Err(fail("duplicate dev suffix"));
                    }
                    version.dev = Some(n);
                }
                "" => return Err(fail("unexpected character")),
                other => return Err(fail(&format!("unknown suffix '{other}'"))),
            }
            rest = tail;
        }

        Ok(version)
    }

    /// Release segments, e.g. `[1, 2, 0]` for `1.2.0rc1`.
    pub fn release(&self) -> &[u64] {
        &self.release
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    /// True when the release segments start with `prefix`, treating missing
    /// segments as zero.
    fn release_starts_with(&self, prefix: &[u64]) -> bool {
        prefix
            .iter()
            .enumerate()
            .all(|(i, seg)| self.release.get(i).copied().unwrap_or(0) == *seg)
    }

    fn phase(&self) -> Phase {
        match (self.pre, self.post, self.dev) {
            (Some((kind, n)), _, _) => Phase::Pre(kind, n),
            (None, None, Some(_)) => Phase::DevOnly,
            _ => Phase::Final,
        }
    }
}

fn split_digits(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}

fn split_alpha(s: &str) -> (&str, &str) {
    let end = s
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(s.len());
    s.split_at(end)
}

fn number(digits: &str) -> Option<u64> {
    digits.parse().ok()
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let max_len = self.release.len().max(other.release.len());
        for i in 0..max_len {
            let a = self.release.get(i).copied().unwrap_or(0);
            let b = other.release.get(i).copied().unwrap_or(0);
            if a != b {
                return a.cmp(&b);
            }
        }
        // `None` dev sorts after every `Some(n)`
        let dev_key = |v: &Version| v.dev.map_or((1, 0), |n| (0, n));
        self.phase()
            .cmp(&other.phase())
            .then_with(|| self.post.cmp(&other.post))
            .then_with(|| dev_key(self).cmp(&dev_key(other)))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Version::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Comparison operator of a single specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Ge,
    Le,
    Gt,
    Lt,
    /// `~=`: at least this version, within the same release series.
    Compatible,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::NotEq => "!=",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Compatible => "~=",
        }
    }
}

/// One `op version` clause, e.g. `>=2.0` or `==1.2.*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
    pub op: Operator,
    pub version: Version,
    /// `==X.*` / `!=X.*` prefix form.
    pub wildcard: bool,
}

impl Specifier {
    pub fn parse(text: &str) -> Result<Self, ConstraintError> {
        let fail = |reason: String| ConstraintError {
            text: text.to_string(),
            reason,
        };
        let s = text.trim();

        // Two-character operators first so `>=` is not read as `>`.
        let (op, rest) = [
            ("~=", Operator::Compatible),
            ("==", Operator::Eq),
            ("!=", Operator::NotEq),
            (">=", Operator::Ge),
            ("<=", Operator::Le),
            (">", Operator::Gt),
            ("<", Operator::Lt),
        ]
        .into_iter()
        .find_map(|(token, op)| s.strip_prefix(token).map(|rest| (op, rest.trim())))
        .ok_or_else(|| fail("missing comparison operator".to_string()))?;

        let (version_text, wildcard) = match rest.strip_suffix(".*") {
            Some(prefix) => (prefix, true),
            None => (rest, false),
        };
        if wildcard && !matches!(op, Operator::Eq | Operator::NotEq) {
            return Err(fail(format!("'.*' is not allowed with '{}'", op.as_str())));
        }

        let version = Version::parse(version_text).map_err(|e| fail(e.reason))?;
        if op == Operator::Compatible && version.release.len() < 2 {
            return Err(fail("'~=' needs at least two release segments".to_string()));
        }

        Ok(Self {
            op,
            version,
            wildcard,
        })
    }

    pub fn matches(&self, candidate: &Version) -> bool {
        match self.op {
            Operator::Eq if self.wildcard => candidate.release_starts_with(&self.version.release),
            Operator::Eq => candidate == &self.version,
            Operator::NotEq if self.wildcard => {
                !candidate.release_starts_with(&self.version.release)
            }
            Operator::NotEq => candidate != &self.version,
            Operator::Ge => candidate >= &self.version,
            Operator::Le => candidate <= &self.version,
            Operator::Gt => candidate > &self.version,
            Operator::Lt => candidate < &self.version,
            Operator::Compatible => {
                let series = &self.version.release[..self.version.release.len() - 1];
                candidate >= &self.version && candidate.release_starts_with(series)
            }
        }
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.as_str(), self.version)?;
        if self.wildcard {
            f.write_str(".*")?;
        }
        Ok(())
    }
}

/// A conjunction of specifiers. No specifiers means "any version".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionConstraint {
    specifiers: Vec<Specifier>,
}

impl VersionConstraint {
    /// Parse `">=2.0,<3.0"`. Empty text and `*` mean "any version".
    pub fn parse(text: &str) -> Result<Self, ConstraintError> {
        let s = text.trim();
        if s.is_empty() || s == "*" {
            return Ok(Self::any());
        }
        let specifiers = s
            .split(',')
            .map(|part| {
                if part.trim().is_empty() {
                    Err(ConstraintError {
                        text: text.to_string(),
                        reason: "empty specifier".to_string(),
                    })
                } else {
                    Specifier::parse(part)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { specifiers })
    }

    pub fn any() -> Self {
        Self::default()
    }

    pub fn is_any(&self) -> bool {
        self.specifiers.is_empty()
    }

    pub fn specifiers(&self) -> &[Specifier] {
        &self.specifiers
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.specifiers.iter().all(|s| s.matches(version))
    }

    /// Versions allowed by both `self` and `other`.
    pub fn intersect(&self, other: &VersionConstraint) -> VersionConstraint {
        let mut specifiers = self.specifiers.clone();
        for spec in &other.specifiers {
            if !specifiers.contains(spec) {
                specifiers.push(spec.clone());
            }
        }
        VersionConstraint { specifiers }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.specifiers.is_empty() {
            return f.write_str("*");
        }
        let parts: Vec<String> = self.specifiers.iter().map(|s| s.to_string()).collect();
        f.write_str(&parts.join(","))
    }
}

impl FromStr for VersionConstraint {
    type Err = ConstraintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for VersionConstraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
