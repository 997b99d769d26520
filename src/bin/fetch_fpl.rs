use std::process::ExitCode;

use epl_dashboard::config::PipelineConfig;
use epl_dashboard::fpl;

/// Stage 2 (optional): fetch FPL player and fixture data.
/// Any failure exits cleanly -- the pipeline works without this output.
fn main() -> ExitCode {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    let config = PipelineConfig::from_env();

    match fpl::run(&config) {
        Ok(summary) => {
            if summary.players_dropped > 0 {
                println!(
                    "  {} rows dropped for missing player identity",
                    summary.players_dropped
                );
            }
            println!("FPL data fetch complete.");
        }
        Err(err) => {
            println!("WARNING: FPL fetch failed: {err:#}");
            println!("Skipping FPL data. Pipeline will continue without it.");
        }
    }
    ExitCode::SUCCESS
}
