//! Handler for `wright plan`.

use miette::Result;
use wright_core::config::ResolverConfig;
use wright_core::profile::Profile;
use wright_resolver::plan::{self, ProfileFilter};
use wright_util::errors::WrightError;
use wright_util::progress;

use crate::cli::ResolveArgs;

pub async fn exec(
    args: &ResolveArgs,
    config: &ResolverConfig,
    profiles: &[String],
    json: bool,
) -> Result<()> {
    let filter = parse_filter(profiles)?;
    let inputs = super::load_inputs(args)?;
    let graph = super::solve_graph(&inputs, config).await?;
    let plan = plan::plan(&graph).map_err(WrightError::from)?.filter(&filter);

    if json {
        let rendered = plan.to_json().map_err(|e| WrightError::Generic {
            message: format!("Failed to serialize plan: {e}"),
        })?;
        println!("{rendered}");
        return Ok(());
    }

    if plan.is_empty() {
        println!("Nothing to install.");
        return Ok(());
    }
    print!("{plan}");
    progress::status_info(
        "Planned",
        &format!(
            "{} packages for {}",
            plan.len(),
            filter
                .profiles()
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    );
    Ok(())
}

fn parse_filter(profiles: &[String]) -> Result<ProfileFilter> {
    if profiles.is_empty() {
        return Ok(ProfileFilter::all());
    }
    let parsed = profiles
        .iter()
        .map(|p| {
            p.parse::<Profile>()
                .map_err(|message| WrightError::Generic { message })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ProfileFilter::only(parsed))
}
