use std::process::ExitCode;

use epl_dashboard::config::PipelineConfig;
use epl_dashboard::understat;

/// Stage 3 (optional): fetch Understat xG data.
/// Any failure exits cleanly -- the pipeline works without this output.
fn main() -> ExitCode {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    let config = PipelineConfig::from_env();

    match understat::run(&config) {
        Ok(summary) => {
            if !summary.used_fresh_cache && summary.players_dropped > 0 {
                println!(
                    "  {} player rows dropped for missing identity",
                    summary.players_dropped
                );
            }
            println!("xG data fetch complete.");
        }
        Err(err) => {
            println!("WARNING: xG fetch failed: {err:#}");
            println!("Skipping xG data. Pipeline will continue without it.");
        }
    }
    ExitCode::SUCCESS
}
