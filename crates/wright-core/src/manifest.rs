use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::requirement::RawRequirement;

/// The parsed representation of a requirements manifest.
///
/// Requirements are an ordered array of tables so declaration order, and
/// accidental duplicates, survive parsing:
///
/// ```toml
/// [[requirement]]
/// name = "requests"
/// version = ">=2.0"
///
/// [[requirement]]
/// name = "m2x"
/// source = "editable"
/// location = "../m2x"
/// options = ["build_ext"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Free-form project name, for display only.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, rename = "requirement")]
    pub requirements: Vec<RawRequirement>,
}

impl Manifest {
    /// Read and parse a manifest file.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            wright_util::errors::WrightError::Manifest {
                message: format!("Failed to read {}: {e}", path.display()),
            }
        })?;
        Self::parse_toml(&content)
    }

    /// Parse a manifest from a string.
    pub fn parse_toml(content: &str) -> miette::Result<Self> {
        toml::from_str(content).map_err(|e| {
            wright_util::errors::WrightError::Manifest {
                message: format!("Failed to parse manifest: {e}"),
            }
            .into()
        })
    }
}
