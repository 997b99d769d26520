use anyhow::Result;

use epl_dashboard::aggregate;
use epl_dashboard::config::PipelineConfig;

/// Stage 4: aggregate the cleaned tables into dashboard_data.json.
/// Requires the cleaned match table; enrichment tables are optional and
/// their absence nulls the dependent sections.
fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    let config = PipelineConfig::from_env();

    let summary = aggregate::run(&config)?;
    println!(
        "Transform complete: {} sections populated.",
        summary.sections_populated
    );
    Ok(())
}
