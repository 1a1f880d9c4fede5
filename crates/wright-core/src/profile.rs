use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Install profile a direct requirement belongs to.
///
/// Profiles are ordered `runtime < test < develop`, which is also the order
/// they are listed in plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Baseline runtime dependencies.
    Runtime,
    /// Extra packages needed to run the test suite.
    Test,
    /// Tooling for working on the project itself.
    Develop,
}

impl Profile {
    pub const ALL: [Profile; 3] = [Profile::Runtime, Profile::Test, Profile::Develop];

    pub fn as_str(self) -> &'static str {
        match self {
            Profile::Runtime => "runtime",
            Profile::Test => "test",
            Profile::Develop => "develop",
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::Runtime
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = String;

    /// Accepts the canonical names plus the spellings common in requirement
    /// files (`install`, `tests`, `dev`, `development`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "runtime" | "install" | "main" => Ok(Profile::Runtime),
            "test" | "tests" => Ok(Profile::Test),
            "develop" | "dev" | "development" => Ok(Profile::Develop),
            other => Err(format!(
                "unknown profile '{other}' (expected runtime, test, or develop)"
            )),
        }
    }
}
