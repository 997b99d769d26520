use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use csv::StringRecord;
use serde::{Deserialize, Serialize};

use crate::config::{self, FOOTBALL_DATA_NAME_MAP, FplMode, PipelineConfig, map_team_name};
use crate::http_client::{get_bytes, http_client};

/// One cleaned match. Field order is the output column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanMatch {
    pub match_id: u32,
    pub season: String,
    pub date: String,
    pub time: String,
    pub home_team: String,
    pub away_team: String,
    pub home_goals: u32,
    pub away_goals: u32,
    pub result: String,
    pub ht_home_goals: u32,
    pub ht_away_goals: u32,
    pub ht_result: String,
    pub referee: String,
    pub home_shots: u32,
    pub away_shots: u32,
    pub home_shots_on_target: u32,
    pub away_shots_on_target: u32,
    pub home_fouls: u32,
    pub away_fouls: u32,
    pub home_corners: u32,
    pub away_corners: u32,
    pub home_yellows: u32,
    pub away_yellows: u32,
    pub home_reds: u32,
    pub away_reds: u32,
    pub total_goals: u32,
    pub total_shots: u32,
    pub total_fouls: u32,
    pub total_cards: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SeasonCleanCounts {
    pub rows_raw: usize,
    pub dropped_bad_dates: usize,
    pub dropped_null_goals: usize,
}

#[derive(Debug, Clone)]
pub struct SeasonLoad {
    pub label: String,
    pub rows_raw: usize,
    pub rows_kept: usize,
}

#[derive(Debug, Clone)]
pub struct CleanSummary {
    pub output_path: PathBuf,
    pub seasons: Vec<SeasonLoad>,
    pub rows_raw: usize,
    pub rows_kept: usize,
    pub dropped_bad_dates: usize,
    pub dropped_null_goals: usize,
    pub teams: Vec<String>,
}

/// Download each season CSV (cached for finished seasons, always fresh for
/// the live one), clean and concatenate, and write matches_clean.csv.
/// Any download or parse failure here is fatal: without the primary table
/// there is nothing downstream to analyze.
pub fn run(config: &PipelineConfig) -> Result<CleanSummary> {
    config::ensure_dir(&config.raw_dir()).context("create raw data dir")?;
    config::ensure_dir(&config.cleaned_dir()).context("create cleaned data dir")?;
    let client = http_client()?;

    let mut rows: Vec<CleanMatch> = Vec::new();
    let mut seasons = Vec::with_capacity(config.seasons.len());
    let mut totals = SeasonCleanCounts::default();

    println!("Loading raw match data...");
    for season in config.seasons {
        let url = config::football_data_url(season.code);
        let path = config.raw_dir().join(format!("matches_{}.csv", season.code));

        // The live season's CSV grows weekly; finished seasons are static.
        let is_live = season.label == config.current_season && season.fpl_mode == FplMode::Live;
        if is_live {
            println!("  Downloading latest: {url}");
            download_to(client, &url, &path)?;
        } else if path.exists() {
            println!(
                "  Using cached: {}",
                path.file_name().and_then(|n| n.to_str()).unwrap_or("?")
            );
        } else {
            println!("  Downloading: {url}");
            download_to(client, &url, &path)?;
        }

        let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        let text = String::from_utf8_lossy(&bytes);
        let (mut season_rows, counts) = clean_season_csv(&text, season.label)
            .with_context(|| format!("clean season {}", season.label))?;

        println!(
            "  {}: {} matches kept of {} rows",
            season.label,
            season_rows.len(),
            counts.rows_raw
        );
        seasons.push(SeasonLoad {
            label: season.label.to_string(),
            rows_raw: counts.rows_raw,
            rows_kept: season_rows.len(),
        });
        totals.rows_raw += counts.rows_raw;
        totals.dropped_bad_dates += counts.dropped_bad_dates;
        totals.dropped_null_goals += counts.dropped_null_goals;
        rows.append(&mut season_rows);
    }

    if totals.dropped_bad_dates > 0 {
        println!(
            "  WARNING: {} dates could not be parsed -- dropped those rows",
            totals.dropped_bad_dates
        );
    }
    if totals.dropped_null_goals > 0 {
        println!(
            "  Dropping {} rows with null goal counts",
            totals.dropped_null_goals
        );
    }

    // Synthetic sequential identity across the concatenated table.
    for (i, row) in rows.iter_mut().enumerate() {
        row.match_id = (i + 1) as u32;
    }

    let mut team_set = BTreeSet::new();
    for row in &rows {
        team_set.insert(row.home_team.clone());
        team_set.insert(row.away_team.clone());
    }
    println!("Teams found across all seasons: {}", team_set.len());

    let output_path = config.matches_clean_path();
    write_clean_csv(&output_path, &rows)?;
    println!(
        "Final cleaned dataset: {} matches -> {}",
        rows.len(),
        output_path.display()
    );

    Ok(CleanSummary {
        output_path,
        seasons,
        rows_raw: totals.rows_raw,
        rows_kept: rows.len(),
        dropped_bad_dates: totals.dropped_bad_dates,
        dropped_null_goals: totals.dropped_null_goals,
        teams: team_set.into_iter().collect(),
    })
}

fn download_to(client: &reqwest::blocking::Client, url: &str, path: &Path) -> Result<()> {
    let body = get_bytes(client, url)?;
    fs::write(path, body).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Standardize DD/MM/YYYY and DD/MM/YY to ISO 8601 (YYYY-MM-DD).
pub fn parse_match_date(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    for fmt in ["%d/%m/%Y", "%d/%m/%y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    None
}

// Raw files carry 107-120 columns per season; ~96 are bookmaker odds with no
// bearing on match analysis. Everything outside this allow-list is dropped.
const COL_DATE: &str = "Date";
const COL_TIME: &str = "Time";
const COL_HOME: &str = "HomeTeam";
const COL_AWAY: &str = "AwayTeam";
const COL_REFEREE: &str = "Referee";
const COL_FTHG: &str = "FTHG";
const COL_FTAG: &str = "FTAG";
const COL_FTR: &str = "FTR";
const COL_HTR: &str = "HTR";

// Peripheral count stats, zero-filled when absent: a missing corner count
// means "not recorded", not a corrupt row.
const PERIPHERAL_COLS: &[&str] = &[
    "HTHG", "HTAG", "HS", "AS", "HST", "AST", "HF", "AF", "HC", "AC", "HY", "AY", "HR", "AR",
];

struct HeaderIndex {
    positions: Vec<Option<usize>>,
    names: Vec<&'static str>,
}

impl HeaderIndex {
    fn new(headers: &StringRecord) -> Self {
        let names: Vec<&'static str> = [
            COL_DATE, COL_TIME, COL_HOME, COL_AWAY, COL_REFEREE, COL_FTHG, COL_FTAG, COL_FTR,
            COL_HTR,
        ]
        .into_iter()
        .chain(PERIPHERAL_COLS.iter().copied())
        .collect();
        let positions = names
            .iter()
            .map(|name| headers.iter().position(|h| h.trim() == *name))
            .collect();
        Self { positions, names }
    }

    fn get<'r>(&self, record: &'r StringRecord, name: &str) -> &'r str {
        let slot = self.names.iter().position(|n| *n == name);
        slot.and_then(|i| self.positions[i])
            .and_then(|col| record.get(col))
            .unwrap_or("")
    }
}

/// Parse a non-negative count that may arrive as "2", "2.0" or blank.
fn parse_count(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(v) = trimmed.parse::<u32>() {
        return Some(v);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.round() as u32)
}

/// Clean one season's raw CSV text. Pure with respect to the filesystem and
/// network, so the whole null/rename/derive policy is testable offline.
///
/// match_id is left at 0 here; the caller assigns identities across the
/// concatenated multi-season table.
pub fn clean_season_csv(raw: &str, season: &str) -> Result<(Vec<CleanMatch>, SeasonCleanCounts)> {
    // football-data.co.uk prepends a UTF-8 BOM.
    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader
        .headers()
        .context("raw csv has no header row")?
        .clone();
    if !headers.iter().any(|h| h.trim() == COL_HOME) {
        return Err(anyhow!("raw csv missing {COL_HOME} column"));
    }
    let index = HeaderIndex::new(&headers);

    let mut rows = Vec::new();
    let mut counts = SeasonCleanCounts::default();

    for record in reader.records() {
        let record = record.context("read raw csv record")?;
        let home_raw = index.get(&record, COL_HOME).trim();
        let away_raw = index.get(&record, COL_AWAY).trim();
        // Trailing blank lines parse as empty records; skip them silently.
        if home_raw.is_empty() && away_raw.is_empty() {
            continue;
        }
        counts.rows_raw += 1;

        let Some(date) = parse_match_date(index.get(&record, COL_DATE)) else {
            counts.dropped_bad_dates += 1;
            continue;
        };

        // Goals cannot be imputed: a null goal column means bad data.
        let (Some(home_goals), Some(away_goals)) = (
            parse_count(index.get(&record, COL_FTHG)),
            parse_count(index.get(&record, COL_FTAG)),
        ) else {
            counts.dropped_null_goals += 1;
            continue;
        };

        let stat = |name: &str| parse_count(index.get(&record, name)).unwrap_or(0);
        let ht_home_goals = stat("HTHG");
        let ht_away_goals = stat("HTAG");
        let home_shots = stat("HS");
        let away_shots = stat("AS");
        let home_fouls = stat("HF");
        let away_fouls = stat("AF");
        let home_yellows = stat("HY");
        let away_yellows = stat("AY");
        let home_reds = stat("HR");
        let away_reds = stat("AR");

        // Trailing whitespace would split one referee into duplicate groups.
        let referee_raw = index.get(&record, COL_REFEREE).trim();
        let referee = if referee_raw.is_empty() {
            "Unknown".to_string()
        } else {
            referee_raw.to_string()
        };

        rows.push(CleanMatch {
            match_id: 0,
            season: season.to_string(),
            date,
            time: index.get(&record, COL_TIME).trim().to_string(),
            home_team: map_team_name(FOOTBALL_DATA_NAME_MAP, home_raw).to_string(),
            away_team: map_team_name(FOOTBALL_DATA_NAME_MAP, away_raw).to_string(),
            home_goals,
            away_goals,
            result: index.get(&record, COL_FTR).trim().to_string(),
            ht_home_goals,
            ht_away_goals,
            ht_result: index.get(&record, COL_HTR).trim().to_string(),
            referee,
            home_shots,
            away_shots,
            home_shots_on_target: stat("HST"),
            away_shots_on_target: stat("AST"),
            home_fouls,
            away_fouls,
            home_corners: stat("HC"),
            away_corners: stat("AC"),
            home_yellows,
            away_yellows,
            home_reds,
            away_reds,
            total_goals: home_goals + away_goals,
            total_shots: home_shots + away_shots,
            total_fouls: home_fouls + away_fouls,
            total_cards: home_yellows + away_yellows + home_reds + away_reds,
        });
    }

    Ok((rows, counts))
}

fn write_clean_csv(path: &Path, rows: &[CleanMatch]) -> Result<()> {
    let tmp = path.with_extension("csv.tmp");
    let mut writer = csv::Writer::from_path(&tmp)
        .with_context(|| format!("create {}", tmp.display()))?;
    for row in rows {
        writer.serialize(row).context("write cleaned match row")?;
    }
    writer.flush().context("flush cleaned csv")?;
    fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
    Ok(())
}

/// Load the cleaned match table back for aggregation.
pub fn load_clean_matches(path: &Path) -> Result<Vec<CleanMatch>> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("open {}", path.display()))?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let row: CleanMatch = record.context("parse cleaned match row")?;
        rows.push(row);
    }
    Ok(rows)
}
