use std::process::ExitCode;

use epl_dashboard::config::PipelineConfig;
use epl_dashboard::{aggregate, fpl, match_dataset, understat};

/// Run the whole pipeline in order. The two enrichment stages are optional:
/// their failure downgrades the dashboard but never fails the run. The
/// cleaner and the aggregator are required.
fn main() -> ExitCode {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    let config = PipelineConfig::from_env();

    println!("== Stage 1/4: clean match data ==");
    if let Err(err) = match_dataset::run(&config) {
        eprintln!("ERROR: match cleaning failed: {err:#}");
        return ExitCode::FAILURE;
    }

    println!("\n== Stage 2/4: FPL player data (optional) ==");
    if let Err(err) = fpl::run(&config) {
        println!("WARNING: FPL fetch failed: {err:#}");
        println!("Skipping FPL data. Pipeline will continue without it.");
    }

    println!("\n== Stage 3/4: Understat xG data (optional) ==");
    if let Err(err) = understat::run(&config) {
        println!("WARNING: xG fetch failed: {err:#}");
        println!("Skipping xG data. Pipeline will continue without it.");
    }

    println!("\n== Stage 4/4: build dashboard data ==");
    match aggregate::run(&config) {
        Ok(summary) => {
            println!(
                "Pipeline complete: {} matches aggregated into {}",
                summary.total_matches,
                summary.output_path.display()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("ERROR: aggregation failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}
