//! CLI argument definitions for wright.
//!
//! Uses `clap` derive macros to define the command surface. Each command
//! corresponds to a handler in the [`super::commands`] module.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "wright",
    version,
    about = "Resolve package requirements into an ordered install plan",
    long_about = "wright reads a manifest of package requirements grouped by profile, \
                  solves them against a metadata index, and prints the install plan: \
                  one version per package, dependencies before dependents."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Resolver configuration file (defaults to ~/.wright/config.toml)
    #[arg(long, global = true, env = "WRIGHT_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Inputs shared by every resolving command.
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Manifest listing the requirements
    #[arg(default_value = "wright.toml")]
    pub manifest: PathBuf,

    /// Metadata index to resolve against
    #[arg(short, long, env = "WRIGHT_INDEX")]
    pub index: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the install plan
    Plan {
        #[command(flatten)]
        inputs: ResolveArgs,
        /// Only include steps needed by these profiles (runtime, test, develop)
        #[arg(short, long, value_delimiter = ',')]
        profile: Vec<String>,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the resolved dependency tree
    Tree {
        #[command(flatten)]
        inputs: ResolveArgs,
        /// Maximum depth
        #[arg(long)]
        depth: Option<u32>,
    },

    /// Explain why a package is part of the resolution
    Why {
        /// Package to explain
        package: String,
        #[command(flatten)]
        inputs: ResolveArgs,
        /// Show every dependent instead of a single path
        #[arg(long)]
        inverted: bool,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}
