use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use csv::StringRecord;
use serde::{Deserialize, Serialize};

use crate::config::{
    self, FPL_LIVE_API, FPL_NAME_MAP, FplMode, PipelineConfig, SeasonConfig, map_team_name,
};
use crate::http_client::{get_text, http_client};

// Fixed courtesy delay between outbound calls; not adaptive.
const REQUEST_DELAY: Duration = Duration::from_secs(1);

/// One player's season totals, written to players.csv.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRow {
    pub player_name: String,
    pub full_name: String,
    pub team: String,
    pub position: String,
    pub goals: u32,
    pub assists: u32,
    pub clean_sheets: u32,
    pub minutes: u32,
    pub yellow_cards: u32,
    pub red_cards: u32,
    pub total_points: i32,
    pub price: f64,
    pub bonus: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureRow {
    pub match_date: String,
    pub home_team: String,
    pub away_team: String,
    pub home_score: u32,
    pub away_score: u32,
}

#[derive(Debug, Clone)]
pub struct FplSummary {
    pub mode: FplMode,
    pub players_written: usize,
    pub players_dropped: usize,
    pub fixtures_written: usize,
    pub players_path: PathBuf,
}

/// Fetch player and fixture data for the current season. Everything in this
/// module is best-effort from the pipeline's perspective: the caller prints
/// a warning and moves on when it fails.
pub fn run(config: &PipelineConfig) -> Result<FplSummary> {
    config::ensure_dir(&config.cleaned_dir()).context("create cleaned data dir")?;
    let season = config.current_season_config();
    match season.fpl_mode {
        FplMode::Live => fetch_live(config),
        FplMode::Historical => fetch_historical(config, season),
    }
}

fn position_label(element_type: u32) -> &'static str {
    match element_type {
        1 => "GK",
        2 => "DEF",
        3 => "MID",
        4 => "FWD",
        _ => "UNK",
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// FPL prices are tenths of a million. Historical archive files sometimes
/// already carry the raw integer form, so only values above 100 are scaled.
fn normalize_price(raw: f64) -> f64 {
    let price = if raw > 100.0 { raw / 10.0 } else { raw };
    round1(price)
}

fn canonical_team(name: &str) -> String {
    map_team_name(FPL_NAME_MAP, name).to_string()
}

// -- live mode -------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Bootstrap {
    #[serde(default)]
    elements: Vec<Element>,
    #[serde(default)]
    teams: Vec<ApiTeam>,
}

#[derive(Debug, Deserialize)]
struct ApiTeam {
    id: u32,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Element {
    #[serde(default)]
    web_name: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    second_name: String,
    #[serde(default)]
    team: u32,
    #[serde(default)]
    element_type: u32,
    #[serde(default)]
    goals_scored: u32,
    #[serde(default)]
    assists: u32,
    #[serde(default)]
    clean_sheets: u32,
    #[serde(default)]
    minutes: u32,
    #[serde(default)]
    yellow_cards: u32,
    #[serde(default)]
    red_cards: u32,
    #[serde(default)]
    total_points: i32,
    #[serde(default)]
    now_cost: f64,
    #[serde(default)]
    bonus: u32,
}

#[derive(Debug, Deserialize)]
struct ApiFixture {
    #[serde(default)]
    finished: bool,
    kickoff_time: Option<String>,
    #[serde(default)]
    team_h: u32,
    #[serde(default)]
    team_a: u32,
    team_h_score: Option<i64>,
    team_a_score: Option<i64>,
}

fn fetch_live(config: &PipelineConfig) -> Result<FplSummary> {
    println!(
        "Fetching FPL data for season {} (live mode)...",
        config.current_season
    );
    let client = http_client()?;

    let body = get_text(client, &format!("{FPL_LIVE_API}/bootstrap-static/"))
        .context("bootstrap-static fetch failed")?;
    thread::sleep(REQUEST_DELAY);

    let bootstrap: Bootstrap =
        serde_json::from_str(&body).context("invalid bootstrap-static json")?;
    let team_lookup: HashMap<u32, String> = bootstrap
        .teams
        .into_iter()
        .map(|t| (t.id, t.name))
        .collect();

    let (players, dropped) = build_live_players(&bootstrap.elements, &team_lookup);
    let players_path = config.players_path();
    write_players_csv(&players_path, &players)?;
    println!(
        "Saved: {} ({} rows)",
        players_path.display(),
        players.len()
    );

    // Fixtures are a nice-to-have; failure here must not undo the player file.
    let mut fixtures_written = 0;
    match get_text(client, &format!("{FPL_LIVE_API}/fixtures/")) {
        Ok(body) => {
            thread::sleep(REQUEST_DELAY);
            match serde_json::from_str::<Vec<ApiFixture>>(&body) {
                Ok(fixtures) => {
                    let rows = build_live_fixtures(&fixtures, &team_lookup);
                    if !rows.is_empty() {
                        let path = config.fixtures_path();
                        write_fixtures_csv(&path, &rows)?;
                        println!("  Saved: {} ({} rows)", path.display(), rows.len());
                        fixtures_written = rows.len();
                    }
                }
                Err(err) => println!("  WARNING: fixtures response unusable -- {err}"),
            }
        }
        Err(err) => println!("  WARNING: fixtures fetch failed -- {err}"),
    }

    Ok(FplSummary {
        mode: FplMode::Live,
        players_written: players.len(),
        players_dropped: dropped,
        fixtures_written,
        players_path,
    })
}

fn build_live_players(
    elements: &[Element],
    team_lookup: &HashMap<u32, String>,
) -> (Vec<PlayerRow>, usize) {
    let mut rows = Vec::with_capacity(elements.len());
    let mut dropped = 0usize;
    for p in elements {
        let full_name = format!("{} {}", p.first_name.trim(), p.second_name.trim())
            .trim()
            .to_string();
        let Some(player_name) = identity_name(&p.web_name, &full_name) else {
            // Downstream JSON cannot represent a player without a name.
            dropped += 1;
            continue;
        };
        let team_name = team_lookup
            .get(&p.team)
            .map(String::as_str)
            .unwrap_or("Unknown");
        rows.push(PlayerRow {
            player_name,
            full_name,
            team: canonical_team(team_name),
            position: position_label(p.element_type).to_string(),
            goals: p.goals_scored,
            assists: p.assists,
            clean_sheets: p.clean_sheets,
            minutes: p.minutes,
            yellow_cards: p.yellow_cards,
            red_cards: p.red_cards,
            total_points: p.total_points,
            // Live now_cost is always the raw integer form.
            price: round1(p.now_cost / 10.0),
            bonus: p.bonus,
        });
    }
    (rows, dropped)
}

fn build_live_fixtures(
    fixtures: &[ApiFixture],
    team_lookup: &HashMap<u32, String>,
) -> Vec<FixtureRow> {
    let mut rows = Vec::new();
    for f in fixtures {
        if !f.finished {
            continue;
        }
        let team_name = |id: u32| {
            canonical_team(
                team_lookup
                    .get(&id)
                    .map(String::as_str)
                    .unwrap_or("Unknown"),
            )
        };
        rows.push(FixtureRow {
            match_date: truncate_date(f.kickoff_time.as_deref().unwrap_or("")),
            home_team: team_name(f.team_h),
            away_team: team_name(f.team_a),
            home_score: f.team_h_score.unwrap_or(0).max(0) as u32,
            away_score: f.team_a_score.unwrap_or(0).max(0) as u32,
        });
    }
    rows
}

// -- historical mode -------------------------------------------------------

fn fetch_historical(config: &PipelineConfig, season: &SeasonConfig) -> Result<FplSummary> {
    println!(
        "Fetching FPL data for season {} (historical mode)...",
        season.label
    );
    let client = http_client()?;
    let base = config::fpl_github_base(season.label);

    let players_body = get_text(client, &format!("{base}/cleaned_players.csv"))
        .context("cleaned_players.csv fetch failed")?;
    thread::sleep(REQUEST_DELAY);

    let teams_body = get_text(client, &format!("{base}/teams.csv"))
        .context("teams.csv fetch failed")?;
    thread::sleep(REQUEST_DELAY);

    let team_lookup = parse_team_lookup(&teams_body)?;
    let (players, dropped) = parse_archive_players(&players_body, &team_lookup)?;
    if players.is_empty() {
        return Err(anyhow!("archive player file produced no usable rows"));
    }

    let players_path = config.players_path();
    write_players_csv(&players_path, &players)?;
    println!(
        "Saved: {} ({} rows)",
        players_path.display(),
        players.len()
    );

    // The archive's fixture list is optional in both senses.
    let mut fixtures_written = 0;
    match get_text(client, &format!("{base}/fixtures.csv")) {
        Ok(body) => {
            thread::sleep(REQUEST_DELAY);
            let rows = parse_archive_fixtures(&body, &team_lookup)?;
            if !rows.is_empty() {
                let path = config.fixtures_path();
                write_fixtures_csv(&path, &rows)?;
                println!("  Saved: {} ({} rows)", path.display(), rows.len());
                fixtures_written = rows.len();
            }
        }
        Err(err) => println!("  Fixtures file not available -- {err}"),
    }

    Ok(FplSummary {
        mode: FplMode::Historical,
        players_written: players.len(),
        players_dropped: dropped,
        fixtures_written,
        players_path,
    })
}

/// teams.csv maps numeric team ids to display names.
fn parse_team_lookup(raw: &str) -> Result<HashMap<u32, String>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(raw.as_bytes());
    let headers = reader.headers().context("teams.csv has no header")?.clone();
    let id_col = headers.iter().position(|h| h == "id");
    let name_col = headers.iter().position(|h| h == "name");
    let (Some(id_col), Some(name_col)) = (id_col, name_col) else {
        return Err(anyhow!("teams.csv missing id/name columns"));
    };

    let mut lookup = HashMap::new();
    for record in reader.records() {
        let record = record.context("read teams.csv record")?;
        let Some(id) = record.get(id_col).and_then(|v| v.trim().parse::<u32>().ok()) else {
            continue;
        };
        let name = record.get(name_col).unwrap_or("").trim().to_string();
        if !name.is_empty() {
            lookup.insert(id, name);
        }
    }
    Ok(lookup)
}

/// The vaastav archive's column set drifts between seasons, so rows are
/// read through a header index with per-field defaults rather than a strict
/// schema.
pub fn parse_archive_players(
    raw: &str,
    team_lookup: &HashMap<u32, String>,
) -> Result<(Vec<PlayerRow>, usize)> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(raw.as_bytes());
    let headers = reader
        .headers()
        .context("players csv has no header")?
        .clone();
    let col = |name: &str| headers.iter().position(|h| h == name);
    let cols: HashMap<&str, Option<usize>> = [
        "web_name",
        "first_name",
        "second_name",
        "team",
        "element_type",
        "goals_scored",
        "assists",
        "clean_sheets",
        "minutes",
        "yellow_cards",
        "red_cards",
        "total_points",
        "now_cost",
        "bonus",
    ]
    .into_iter()
    .map(|name| (name, col(name)))
    .collect();

    let field = |record: &StringRecord, name: &str| -> String {
        cols.get(name)
            .copied()
            .flatten()
            .and_then(|i| record.get(i))
            .unwrap_or("")
            .trim()
            .to_string()
    };
    let int_field = |record: &StringRecord, name: &str| -> i64 {
        field(record, name).parse::<f64>().map(|v| v as i64).unwrap_or(0)
    };

    let mut rows = Vec::new();
    let mut dropped = 0usize;
    for record in reader.records() {
        let record = record.context("read players csv record")?;
        let web_name = field(&record, "web_name");
        let full_name = format!(
            "{} {}",
            field(&record, "first_name"),
            field(&record, "second_name")
        )
        .trim()
        .to_string();
        let Some(player_name) = identity_name(&web_name, &full_name) else {
            dropped += 1;
            continue;
        };

        let team_name = field(&record, "team")
            .parse::<u32>()
            .ok()
            .and_then(|id| team_lookup.get(&id).cloned())
            .unwrap_or_else(|| field(&record, "team"));
        let element_type = int_field(&record, "element_type").max(0) as u32;

        rows.push(PlayerRow {
            player_name,
            full_name,
            team: canonical_team(&team_name),
            position: position_label(element_type).to_string(),
            goals: int_field(&record, "goals_scored").max(0) as u32,
            assists: int_field(&record, "assists").max(0) as u32,
            clean_sheets: int_field(&record, "clean_sheets").max(0) as u32,
            minutes: int_field(&record, "minutes").max(0) as u32,
            yellow_cards: int_field(&record, "yellow_cards").max(0) as u32,
            red_cards: int_field(&record, "red_cards").max(0) as u32,
            total_points: int_field(&record, "total_points") as i32,
            price: normalize_price(field(&record, "now_cost").parse::<f64>().unwrap_or(0.0)),
            bonus: int_field(&record, "bonus").max(0) as u32,
        });
    }
    Ok((rows, dropped))
}

pub fn parse_archive_fixtures(
    raw: &str,
    team_lookup: &HashMap<u32, String>,
) -> Result<Vec<FixtureRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(raw.as_bytes());
    let headers = reader
        .headers()
        .context("fixtures csv has no header")?
        .clone();
    let col = |name: &str| headers.iter().position(|h| h == name);
    let finished_col = col("finished");
    let kickoff_col = col("kickoff_time");
    let home_col = col("team_h");
    let away_col = col("team_a");
    let home_score_col = col("team_h_score");
    let away_score_col = col("team_a_score");

    let get = |record: &StringRecord, col: Option<usize>| -> String {
        col.and_then(|i| record.get(i)).unwrap_or("").trim().to_string()
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context("read fixtures csv record")?;
        let finished = get(&record, finished_col);
        if !finished.eq_ignore_ascii_case("true") {
            continue;
        }
        let team_name = |raw_id: String| {
            raw_id
                .parse::<u32>()
                .ok()
                .and_then(|id| team_lookup.get(&id).cloned())
                .map(|name| canonical_team(&name))
                .unwrap_or(raw_id)
        };
        let score = |raw: String| raw.parse::<f64>().map(|v| v.max(0.0) as u32).unwrap_or(0);
        rows.push(FixtureRow {
            match_date: truncate_date(&get(&record, kickoff_col)),
            home_team: team_name(get(&record, home_col)),
            away_team: team_name(get(&record, away_col)),
            home_score: score(get(&record, home_score_col)),
            away_score: score(get(&record, away_score_col)),
        });
    }
    Ok(rows)
}

// -- shared helpers --------------------------------------------------------

/// The join identity for a player row. Prefer the short display name, fall
/// back to the full name; a row with neither is unusable.
fn identity_name(web_name: &str, full_name: &str) -> Option<String> {
    let web = web_name.trim();
    if !web.is_empty() {
        return Some(web.to_string());
    }
    let full = full_name.trim();
    if !full.is_empty() {
        return Some(full.to_string());
    }
    None
}

fn truncate_date(raw: &str) -> String {
    raw.chars().take(10).collect()
}

fn write_players_csv(path: &Path, rows: &[PlayerRow]) -> Result<()> {
    let tmp = path.with_extension("csv.tmp");
    let mut writer =
        csv::Writer::from_path(&tmp).with_context(|| format!("create {}", tmp.display()))?;
    for row in rows {
        writer.serialize(row).context("write player row")?;
    }
    writer.flush().context("flush players csv")?;
    fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
    Ok(())
}

fn write_fixtures_csv(path: &Path, rows: &[FixtureRow]) -> Result<()> {
    let tmp = path.with_extension("csv.tmp");
    let mut writer =
        csv::Writer::from_path(&tmp).with_context(|| format!("create {}", tmp.display()))?;
    for row in rows {
        writer.serialize(row).context("write fixture row")?;
    }
    writer.flush().context("flush fixtures csv")?;
    fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
    Ok(())
}

/// Load players.csv back for aggregation.
pub fn load_players(path: &Path) -> Result<Vec<PlayerRow>> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("open {}", path.display()))?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let row: PlayerRow = record.context("parse player row")?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_labels_cover_the_four_roles() {
        assert_eq!(position_label(1), "GK");
        assert_eq!(position_label(2), "DEF");
        assert_eq!(position_label(3), "MID");
        assert_eq!(position_label(4), "FWD");
        assert_eq!(position_label(9), "UNK");
    }

    #[test]
    fn price_scaling_only_applies_to_raw_integer_form() {
        assert_eq!(normalize_price(55.0), 5.5);
        assert_eq!(normalize_price(1130.0), 113.0);
        assert_eq!(normalize_price(5.5), 5.5);
        assert_eq!(normalize_price(0.0), 0.0);
    }

    #[test]
    fn identity_prefers_web_name_then_full_name() {
        assert_eq!(identity_name("Haaland", "Erling Haaland").as_deref(), Some("Haaland"));
        assert_eq!(identity_name("", "Erling Haaland").as_deref(), Some("Erling Haaland"));
        assert_eq!(identity_name("  ", ""), None);
    }

    #[test]
    fn archive_players_parse_with_drifted_schema() {
        let teams: HashMap<u32, String> = [(1, "Man City".to_string())].into_iter().collect();
        let raw = "first_name,second_name,web_name,team,element_type,goals_scored,assists,minutes,now_cost,total_points,clean_sheets,yellow_cards,red_cards,bonus\n\
                   Erling,Haaland,Haaland,1,4,27,5,2580,1510,230,9,3,0,40\n\
                   ,,,1,4,1,0,90,45,10,0,0,0,0\n";
        let (rows, dropped) = parse_archive_players(raw, &teams).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(dropped, 1);
        let p = &rows[0];
        assert_eq!(p.player_name, "Haaland");
        assert_eq!(p.full_name, "Erling Haaland");
        assert_eq!(p.team, "Manchester City");
        assert_eq!(p.position, "FWD");
        assert_eq!(p.goals, 27);
        assert_eq!(p.price, 151.0);
    }

    #[test]
    fn archive_fixtures_keep_only_finished_rows() {
        let teams: HashMap<u32, String> =
            [(1, "Arsenal".to_string()), (2, "Spurs".to_string())]
                .into_iter()
                .collect();
        let raw = "finished,kickoff_time,team_h,team_a,team_h_score,team_a_score\n\
                   True,2025-08-17T14:00:00Z,1,2,2,1\n\
                   False,2025-08-24T14:00:00Z,2,1,,\n";
        let rows = parse_archive_fixtures(raw, &teams).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].match_date, "2025-08-17");
        assert_eq!(rows[0].home_team, "Arsenal");
        assert_eq!(rows[0].away_team, "Tottenham Hotspur");
        assert_eq!(rows[0].home_score, 2);
    }
}
