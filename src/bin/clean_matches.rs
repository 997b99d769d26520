use anyhow::Result;

use epl_dashboard::config::PipelineConfig;
use epl_dashboard::match_dataset;

/// Stage 1: download, clean and concatenate the season match CSVs.
/// A failure here is fatal -- without the primary table there is nothing
/// for the rest of the pipeline to do.
fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    let config = PipelineConfig::from_env();

    let summary = match_dataset::run(&config)?;
    if summary.dropped_bad_dates + summary.dropped_null_goals > 0 {
        println!(
            "Dropped rows: {} bad dates, {} null goals",
            summary.dropped_bad_dates, summary.dropped_null_goals
        );
    }
    println!("Cleaning complete.");
    Ok(())
}
