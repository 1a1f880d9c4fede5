//! Command dispatch and handler modules.

mod plan;
mod tree;
mod why;

use std::sync::Arc;

use miette::Result;
use wright_core::config::ResolverConfig;
use wright_core::manifest::Manifest;
use wright_resolver::graph::DependencyGraph;
use wright_resolver::{CancelSignal, StaticIndex};
use wright_util::errors::WrightError;
use wright_util::progress;

use crate::cli::{Cli, Command, ResolveArgs};

/// Route a parsed CLI invocation to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ResolverConfig::from_path(path)?,
        None => ResolverConfig::load()?,
    };

    match cli.command {
        Command::Plan {
            inputs,
            profile,
            json,
        } => plan::exec(&inputs, &config, &profile, json).await,
        Command::Tree { inputs, depth } => tree::exec(&inputs, &config, depth).await,
        Command::Why {
            package,
            inputs,
            inverted,
        } => why::exec(&package, &inputs, &config, inverted).await,
    }
}

/// Manifest and index loaded from the command's input paths.
pub(crate) struct Inputs {
    pub manifest: Manifest,
    pub index: Arc<StaticIndex>,
}

pub(crate) fn load_inputs(args: &ResolveArgs) -> Result<Inputs> {
    if !args.manifest.is_file() {
        return Err(WrightError::Manifest {
            message: format!("Could not find {}", args.manifest.display()),
        }
        .into());
    }
    let manifest = Manifest::from_path(&args.manifest)?;
    let index = StaticIndex::from_path(&args.index)?;
    tracing::debug!(
        requirements = manifest.requirements.len(),
        packages = index.package_count(),
        "loaded inputs"
    );
    Ok(Inputs {
        manifest,
        index: Arc::new(index),
    })
}

/// A cancel signal that fires on Ctrl-C.
pub(crate) fn interrupt_signal() -> CancelSignal {
    let cancel = CancelSignal::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

/// Resolve the manifest to a solved graph behind a spinner.
pub(crate) async fn solve_graph(
    inputs: &Inputs,
    config: &ResolverConfig,
) -> Result<DependencyGraph> {
    let count = inputs.manifest.requirements.len();
    progress::status("Resolving", &format!("{count} requirements"));
    let pb = progress::spinner("Solving...");
    let result = wright_resolver::resolve_graph(
        &inputs.manifest.requirements,
        Arc::clone(&inputs.index),
        config,
        &interrupt_signal(),
    )
    .await;
    pb.finish_and_clear();
    Ok(result.map_err(WrightError::from)?)
}
