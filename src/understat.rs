use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{self, PipelineConfig, normalize_understat_team};
use crate::http_client::{get_text, http_client};

const REQUEST_DELAY: Duration = Duration::from_millis(500);
const CACHE_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
// A finished season has 380 matches; far fewer means the source was truncated.
const HISTORICAL_MATCH_FLOOR: usize = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XgMatchRow {
    pub match_id: String,
    pub date: String,
    pub home_team: String,
    pub away_team: String,
    pub home_goals: u32,
    pub away_goals: u32,
    pub home_xg: f64,
    pub away_xg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XgTeamRow {
    pub team: String,
    pub matches: u32,
    pub xg_for: f64,
    pub xg_against: f64,
    pub goals_for: u32,
    pub goals_against: u32,
    pub npxg_for: f64,
    pub npxg_against: f64,
    pub xg_difference: f64,
    pub ppda: f64,
    pub deep_completions: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XgPlayerRow {
    pub player_name: String,
    pub team: String,
    pub position: String,
    pub games: u32,
    pub minutes: u32,
    pub goals: u32,
    pub xg: f64,
    pub assists: u32,
    pub xa: f64,
    pub shots: u32,
    pub key_passes: u32,
    pub npg: u32,
    pub npxg: f64,
}

#[derive(Debug, Clone)]
pub struct XgSummary {
    pub used_fresh_cache: bool,
    pub matches_written: usize,
    pub teams_written: usize,
    pub players_written: usize,
    pub players_dropped: usize,
}

/// Fetch Understat xG data for the current season. Best-effort: the caller
/// prints a warning and moves on when this fails.
pub fn run(config: &PipelineConfig) -> Result<XgSummary> {
    config::ensure_dir(&config.cleaned_dir()).context("create cleaned data dir")?;
    let season = config.current_season_config();

    let cache_files = [
        config.xg_matches_path(),
        config.xg_teams_path(),
        config.xg_players_path(),
    ];
    if cache_files.iter().all(|p| is_cache_fresh(p, CACHE_MAX_AGE)) {
        println!("Using cached xG data (less than 24 hours old).");
        return Ok(XgSummary {
            used_fresh_cache: true,
            matches_written: 0,
            teams_written: 0,
            players_written: 0,
            players_dropped: 0,
        });
    }

    println!(
        "Fetching xG data for season {} (Understat year: {})...",
        season.label, season.understat_year
    );
    let html = fetch_league_page(season.understat_year)?;

    let matches = extract_embedded_json(&html, "datesData")
        .ok_or_else(|| anyhow!("league page has no datesData payload"))?;
    let teams = extract_embedded_json(&html, "teamsData")
        .ok_or_else(|| anyhow!("league page has no teamsData payload"))?;
    let players = extract_embedded_json(&html, "playersData")
        .ok_or_else(|| anyhow!("league page has no playersData payload"))?;

    let match_rows = process_matches(&matches)?;
    let team_rows = process_teams(&teams)?;
    let (player_rows, players_dropped) = process_players(&players)?;

    write_rows(&config.xg_matches_path(), &match_rows)?;
    println!("  Saved: xg_matches.csv ({} rows)", match_rows.len());
    if match_rows.len() < HISTORICAL_MATCH_FLOOR
        && season.fpl_mode == config::FplMode::Historical
    {
        println!(
            "  WARNING: only {} matches found -- expected ~380 for a complete season",
            match_rows.len()
        );
    }

    write_rows(&config.xg_teams_path(), &team_rows)?;
    println!("  Saved: xg_teams.csv ({} rows)", team_rows.len());

    write_rows(&config.xg_players_path(), &player_rows)?;
    println!("  Saved: xg_players.csv ({} rows)", player_rows.len());

    Ok(XgSummary {
        used_fresh_cache: false,
        matches_written: match_rows.len(),
        teams_written: team_rows.len(),
        players_written: player_rows.len(),
        players_dropped,
    })
}

/// True when the file exists and was modified within the freshness window.
pub fn is_cache_fresh(path: &Path, max_age: Duration) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = meta.modified() else {
        return false;
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age < max_age,
        // Clock skew puts the mtime in the future; treat as fresh.
        Err(_) => true,
    }
}

fn fetch_league_page(year: &str) -> Result<String> {
    let client = http_client()?;
    let url = config::understat_league_url(year);
    match get_text(client, &url) {
        Ok(body) => Ok(body),
        Err(first_err) => {
            // One retry after the fixed delay before giving up.
            thread::sleep(REQUEST_DELAY);
            get_text(client, &url).with_context(|| format!("retry failed after: {first_err}"))
        }
    }
}

/// Pull an embedded JSON payload out of the league page. Understat ships its
/// data as script variables; two formats are tried in fixed priority order:
/// `var X = JSON.parse('<escaped>')`, then a bare `var X = {...};` literal.
pub fn extract_embedded_json(html: &str, var_name: &str) -> Option<serde_json::Value> {
    let parse_call = Regex::new(&format!(
        r"var\s+{var_name}\s*=\s*JSON\.parse\('(.+?)'\)"
    ))
    .ok()?;
    if let Some(caps) = parse_call.captures(html) {
        let decoded = decode_js_string(caps.get(1)?.as_str());
        if let Ok(value) = serde_json::from_str(&decoded) {
            return Some(value);
        }
    }

    let literal = Regex::new(&format!(r"var\s+{var_name}\s*=\s*([\[{{].*?[\]}}])\s*;")).ok()?;
    let caps = literal.captures(html)?;
    serde_json::from_str(caps.get(1)?.as_str()).ok()
}

/// Decode the single-quoted JS string literal Understat embeds: hex (\xHH),
/// unicode (\uHHHH) and the usual single-character escapes.
pub fn decode_js_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\x");
                        out.push_str(&hex);
                    }
                }
            }
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

// Understat serializes most numbers as strings; every numeric field goes
// through these tolerant readers.
fn value_f64(value: &serde_json::Value) -> f64 {
    match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn value_u32(value: &serde_json::Value) -> u32 {
    value_f64(value).max(0.0) as u32
}

fn value_str(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn field<'v>(obj: &'v serde_json::Value, key: &str) -> &'v serde_json::Value {
    obj.get(key).unwrap_or(&serde_json::Value::Null)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn process_matches(data: &serde_json::Value) -> Result<Vec<XgMatchRow>> {
    let list = data
        .as_array()
        .ok_or_else(|| anyhow!("datesData is not an array"))?;
    let mut rows = Vec::new();
    for m in list {
        if !field(m, "isResult").as_bool().unwrap_or(true) {
            continue;
        }
        let home = normalize_understat_team(&value_str(field(field(m, "h"), "title")));
        let away = normalize_understat_team(&value_str(field(field(m, "a"), "title")));
        let datetime = value_str(field(m, "datetime"));
        rows.push(XgMatchRow {
            match_id: value_str(field(m, "id")),
            date: datetime.chars().take(10).collect(),
            home_team: home,
            away_team: away,
            home_goals: value_u32(field(field(m, "goals"), "h")),
            away_goals: value_u32(field(field(m, "goals"), "a")),
            home_xg: round2(value_f64(field(field(m, "xG"), "h"))),
            away_xg: round2(value_f64(field(field(m, "xG"), "a"))),
        });
    }
    Ok(rows)
}

pub fn process_teams(data: &serde_json::Value) -> Result<Vec<XgTeamRow>> {
    let map = data
        .as_object()
        .ok_or_else(|| anyhow!("teamsData is not an object"))?;
    let mut rows = Vec::new();
    for team_info in map.values() {
        let title = value_str(field(team_info, "title"));
        let Some(history) = field(team_info, "history").as_array() else {
            continue;
        };
        if history.is_empty() {
            continue;
        }

        let matches = history.len();
        let mut xg_for = 0.0;
        let mut xg_against = 0.0;
        let mut goals_for = 0u32;
        let mut goals_against = 0u32;
        let mut npxg_for = 0.0;
        let mut npxg_against = 0.0;
        let mut ppda_sum = 0.0;
        let mut deep = 0u32;
        for h in history {
            xg_for += value_f64(field(h, "xG"));
            xg_against += value_f64(field(h, "xGA"));
            goals_for += value_u32(field(h, "scored"));
            goals_against += value_u32(field(h, "missed"));
            npxg_for += value_f64(field(h, "npxG"));
            npxg_against += value_f64(field(h, "npxGA"));
            if let Some(ppda) = field(h, "ppda").as_object() {
                let att = ppda.get("att").map(value_f64).unwrap_or(0.0);
                let def = ppda.get("def").map(value_f64).unwrap_or(1.0).max(1.0);
                ppda_sum += att / def;
            }
            deep += value_u32(field(h, "deep"));
        }

        rows.push(XgTeamRow {
            team: normalize_understat_team(&title),
            matches: matches as u32,
            xg_for: round2(xg_for),
            xg_against: round2(xg_against),
            goals_for,
            goals_against,
            npxg_for: round2(npxg_for),
            npxg_against: round2(npxg_against),
            xg_difference: round2(xg_for - xg_against),
            ppda: round2(ppda_sum / matches as f64),
            deep_completions: deep,
        });
    }
    rows.sort_by(|a, b| a.team.cmp(&b.team));
    Ok(rows)
}

pub fn process_players(data: &serde_json::Value) -> Result<(Vec<XgPlayerRow>, usize)> {
    let list = data
        .as_array()
        .ok_or_else(|| anyhow!("playersData is not an array"))?;
    let mut rows = Vec::new();
    let mut dropped = 0usize;
    for p in list {
        let player_name = value_str(field(p, "player_name"));
        if player_name.is_empty() {
            // No identity, nothing downstream can join on.
            dropped += 1;
            continue;
        }
        let team_raw = value_str(field(p, "team_title"));
        rows.push(XgPlayerRow {
            player_name,
            team: normalize_understat_team(&team_raw),
            position: value_str(field(p, "position")),
            games: value_u32(field(p, "games")),
            minutes: value_u32(field(p, "time")),
            goals: value_u32(field(p, "goals")),
            xg: round2(value_f64(field(p, "xG"))),
            assists: value_u32(field(p, "assists")),
            xa: round2(value_f64(field(p, "xA"))),
            shots: value_u32(field(p, "shots")),
            key_passes: value_u32(field(p, "key_passes")),
            npg: value_u32(field(p, "npg")),
            npxg: round2(value_f64(field(p, "npxG"))),
        });
    }
    Ok((rows, dropped))
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let tmp = path.with_extension("csv.tmp");
    let mut writer =
        csv::Writer::from_path(&tmp).with_context(|| format!("create {}", tmp.display()))?;
    for row in rows {
        writer.serialize(row).context("write xg row")?;
    }
    writer.flush().context("flush xg csv")?;
    fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
    Ok(())
}

/// Load the xG team table back for aggregation.
pub fn load_xg_teams(path: &Path) -> Result<Vec<XgTeamRow>> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("open {}", path.display()))?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let row: XgTeamRow = record.context("parse xg team row")?;
        rows.push(row);
    }
    Ok(rows)
}

/// Load the xG player table back for aggregation.
pub fn load_xg_players(path: &Path) -> Result<Vec<XgPlayerRow>> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("open {}", path.display()))?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let row: XgPlayerRow = record.context("parse xg player row")?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_hex_and_unicode_escapes() {
        assert_eq!(decode_js_string(r"\x7b\x22a\x22:1\x7d"), "{\"a\":1}");
        assert_eq!(decode_js_string(r"Ekitiké"), "Ekitiké");
        assert_eq!(decode_js_string(r"plain"), "plain");
        assert_eq!(decode_js_string(r"a\'b"), "a'b");
    }

    #[test]
    fn extracts_json_parse_payload() {
        let html = r#"<script>var datesData = JSON.parse('\x5b\x7b\x22id\x22:\x221\x22\x7d\x5d');</script>"#;
        let value = extract_embedded_json(html, "datesData").unwrap();
        assert_eq!(value[0]["id"], "1");
    }

    #[test]
    fn extracts_bare_literal_payload_as_fallback() {
        let html = r#"<script>var teamsData = {"82":{"title":"Arsenal","history":[]}};</script>"#;
        let value = extract_embedded_json(html, "teamsData").unwrap();
        assert_eq!(value["82"]["title"], "Arsenal");
    }

    #[test]
    fn match_processing_skips_unplayed_fixtures() {
        let data = serde_json::json!([
            {
                "id": "100",
                "isResult": true,
                "h": {"title": "Wolverhampton_Wanderers"},
                "a": {"title": "Tottenham"},
                "goals": {"h": "1", "a": "2"},
                "xG": {"h": "0.84", "a": "2.13"},
                "datetime": "2025-08-17 14:00:00"
            },
            {
                "id": "101",
                "isResult": false,
                "h": {"title": "Arsenal"},
                "a": {"title": "Chelsea"},
                "goals": {"h": null, "a": null},
                "xG": {"h": null, "a": null},
                "datetime": "2026-05-20 15:00:00"
            }
        ]);
        let rows = process_matches(&data).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].home_team, "Wolverhampton");
        assert_eq!(rows[0].away_team, "Tottenham Hotspur");
        assert_eq!(rows[0].date, "2025-08-17");
        assert_eq!(rows[0].away_xg, 2.13);
    }

    #[test]
    fn team_processing_aggregates_history() {
        let data = serde_json::json!({
            "89": {
                "title": "Manchester_City",
                "history": [
                    {"xG": "2.2", "xGA": "0.6", "scored": 3, "missed": 0,
                     "npxG": "1.9", "npxGA": "0.6", "ppda": {"att": 200, "def": 25}, "deep": 12},
                    {"xG": "1.4", "xGA": "1.2", "scored": 1, "missed": 1,
                     "npxG": "1.4", "npxGA": "1.2", "ppda": {"att": 150, "def": 30}, "deep": 8}
                ]
            }
        });
        let rows = process_teams(&data).unwrap();
        assert_eq!(rows.len(), 1);
        let t = &rows[0];
        assert_eq!(t.team, "Manchester City");
        assert_eq!(t.matches, 2);
        assert_eq!(t.xg_for, 3.6);
        assert_eq!(t.goals_for, 4);
        assert_eq!(t.xg_difference, 1.8);
        assert_eq!(t.ppda, 6.5);
        assert_eq!(t.deep_completions, 20);
    }

    #[test]
    fn player_processing_drops_nameless_rows() {
        let data = serde_json::json!([
            {"player_name": "Erling Haaland", "team_title": "Manchester City",
             "position": "F", "games": "10", "time": "900", "goals": "11",
             "xG": "9.13", "assists": "2", "xA": "1.2", "shots": "40",
             "key_passes": "8", "npg": "9", "npxG": "7.5"},
            {"player_name": "", "team_title": "Arsenal", "position": "M"}
        ]);
        let (rows, dropped) = process_players(&data).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(dropped, 1);
        assert_eq!(rows[0].goals, 11);
        assert_eq!(rows[0].minutes, 900);
        assert_eq!(rows[0].xg, 9.13);
    }

    #[test]
    fn stale_and_missing_files_are_not_fresh() {
        assert!(!is_cache_fresh(Path::new("/nonexistent/file.csv"), CACHE_MAX_AGE));
    }
}
