//! Handler for `wright tree`.

use miette::Result;
use wright_core::config::ResolverConfig;

use crate::cli::ResolveArgs;

pub async fn exec(args: &ResolveArgs, config: &ResolverConfig, depth: Option<u32>) -> Result<()> {
    let inputs = super::load_inputs(args)?;
    let graph = super::solve_graph(&inputs, config).await?;

    let output = graph.print_tree(depth.map(|d| d as usize));
    if output.is_empty() {
        println!("No dependencies.");
    } else {
        print!("{output}");
    }
    Ok(())
}
