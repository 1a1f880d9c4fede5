//! Handler for `wright why`.

use miette::Result;
use wright_core::config::ResolverConfig;

use crate::cli::ResolveArgs;

pub async fn exec(
    package: &str,
    args: &ResolveArgs,
    config: &ResolverConfig,
    inverted: bool,
) -> Result<()> {
    let inputs = super::load_inputs(args)?;
    let graph = super::solve_graph(&inputs, config).await?;

    if inverted {
        let output = graph.print_inverted_tree(package);
        if output.is_empty() {
            println!("Package '{package}' not found in the graph.");
        } else {
            print!("{output}");
        }
        return Ok(());
    }

    if let Some(path) = graph.find_path(package) {
        println!("Path to {package}:");
        for (i, node) in path.iter().enumerate() {
            let indent = "  ".repeat(i);
            println!("{indent}{node}");
        }
    } else {
        println!("Package '{package}' not found in the graph.");
    }
    Ok(())
}
