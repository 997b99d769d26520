use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::fpl::{self, PlayerRow};
use crate::match_dataset::{self, CleanMatch};
use crate::understat::{self, XgPlayerRow, XgTeamRow};

const FULL_SEASON_MATCHES: u32 = 380;
const MATCHDAYS_TOTAL: u32 = 38;
const MIN_REFEREE_MATCHES: usize = 3;
// Value leaderboard only considers players with a real body of minutes.
const MIN_VALUE_MINUTES: u32 = 450;

/// Both xG tables must load for the xG sections to be available.
#[derive(Debug, Clone)]
pub struct XgData {
    pub teams: Vec<XgTeamRow>,
    pub players: Vec<XgPlayerRow>,
}

// -- output document -------------------------------------------------------
// Struct field order is the serialized key order; the dashboard and the
// idempotence contract both rely on it being stable.

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardData {
    pub generated_at: String,
    pub season: String,
    pub source: String,
    pub total_matches: u32,
    pub total_goals: u32,
    pub goals_per_match: f64,
    pub season_status: SeasonStatus,
    pub league_table: Vec<TableRow>,
    pub cumulative_points: BTreeMap<String, Vec<CumulativePoint>>,
    pub monthly_trends: Vec<MonthlyTrend>,
    pub home_away: HomeAwaySplit,
    pub referee_stats: Vec<RefereeStat>,
    pub scoreline_frequency: Vec<ScorelineCount>,
    pub season_comparison: Vec<SeasonComparison>,
    // Optional sections -- always present, null when the source was missing.
    pub xg_table: Option<Vec<XgTableRow>>,
    pub xg_vs_actual: Option<Vec<XgScatterPoint>>,
    pub top_scorers: Option<Vec<TopScorer>>,
    pub shot_quality: Option<Vec<ShotQualityRow>>,
    pub player_value: Option<Vec<PlayerValueRow>>,
    pub player_leaderboards: Option<PlayerLeaderboards>,
    pub money_vs_points: Option<MoneyVsPoints>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonStatus {
    pub matches_played: u32,
    pub matches_total: u32,
    pub matchdays_played: u32,
    pub matchdays_total: u32,
    pub is_complete: bool,
    pub last_match_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub team: String,
    pub played: u32,
    pub won: u32,
    pub drawn: u32,
    pub lost: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub goal_difference: i64,
    pub points: u32,
    pub home_won: u32,
    pub home_drawn: u32,
    pub home_lost: u32,
    pub away_won: u32,
    pub away_drawn: u32,
    pub away_lost: u32,
    pub clean_sheets: u32,
    pub total_shots: u32,
    pub total_shots_on_target: u32,
    pub shot_accuracy: f64,
    pub goals_per_game: f64,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativePoint {
    pub matchday: u32,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTrend {
    pub month: String,
    pub matches: u32,
    pub total_goals: u32,
    pub avg_goals: f64,
    pub home_wins: u32,
    pub draws: u32,
    pub away_wins: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HomeAwaySplit {
    pub home_wins: u32,
    pub draws: u32,
    pub away_wins: u32,
    pub home_goals_avg: f64,
    pub away_goals_avg: f64,
    pub total_matches: u32,
    pub home_win_pct: f64,
    pub draw_pct: f64,
    pub away_win_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefereeStat {
    pub referee: String,
    pub matches: u32,
    pub avg_goals: f64,
    pub avg_fouls: f64,
    pub avg_cards: f64,
    pub total_reds: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScorelineCount {
    pub score: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonComparison {
    pub season: String,
    pub matches: u32,
    pub avg_goals: f64,
    pub avg_cards: f64,
    pub home_win_pct: f64,
    pub avg_fouls: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XgTableRow {
    pub team: String,
    pub xg_for: f64,
    pub xg_against: f64,
    pub goals_for: u32,
    pub goals_against: u32,
    pub xg_difference: f64,
    pub actual_points: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XgScatterPoint {
    pub team: String,
    pub total_xg: f64,
    pub actual_goals: u32,
    pub difference: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShotQualityRow {
    pub team: String,
    pub total_shots: u32,
    pub xg_per_shot: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopScorer {
    pub player_name: String,
    pub team: String,
    pub goals: u32,
    pub assists: u32,
    pub xg: f64,
    pub xa: f64,
    pub minutes: u32,
    pub goals_minus_xg: f64,
    pub position: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerValueRow {
    pub player_name: String,
    pub team: String,
    pub price: f64,
    pub goals: u32,
    pub goals_per_million: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerLeaderboards {
    pub goal_scorers: Vec<GoalScorer>,
    pub assist_leaders: Vec<AssistLeader>,
    pub iron_men: Vec<IronMan>,
    pub goals_by_position: Vec<PositionGoals>,
    pub best_value: Vec<ValuePlayer>,
    pub most_cards: Vec<CardLeader>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalScorer {
    pub rank: u32,
    pub player_name: String,
    pub team: String,
    pub position: String,
    pub goals: u32,
    pub assists: u32,
    pub minutes: u32,
    pub goals_per_90: f64,
    pub price: f64,
    pub xg: Option<f64>,
    pub shots: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistLeader {
    pub rank: u32,
    pub player_name: String,
    pub team: String,
    pub position: String,
    pub assists: u32,
    pub goals: u32,
    pub minutes: u32,
    pub assists_per_90: f64,
    pub xa: Option<f64>,
    pub key_passes: Option<u32>,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IronMan {
    pub player_name: String,
    pub team: String,
    pub position: String,
    pub minutes: u32,
    pub games_equivalent: f64,
    pub goals: u32,
    pub assists: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionGoals {
    pub position: String,
    pub total_goals: u32,
    pub total_assists: u32,
    pub player_count: u32,
    pub avg_goals: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuePlayer {
    pub rank: u32,
    pub player_name: String,
    pub team: String,
    pub position: String,
    pub price: f64,
    pub goals: u32,
    pub assists: u32,
    pub ga_per_million: f64,
    pub minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardLeader {
    pub player_name: String,
    pub team: String,
    pub position: String,
    pub yellows: u32,
    pub reds: u32,
    pub total_cards: u32,
    pub minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoneyVsPoints {
    pub teams: Vec<MoneyRow>,
    pub regression: Regression,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoneyRow {
    pub team: String,
    pub squad_value: f64,
    pub points: u32,
    pub played: u32,
    pub points_per_match: f64,
    pub expected_points: f64,
    pub over_under: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

#[derive(Debug, Clone)]
pub struct AggregateSummary {
    pub output_path: PathBuf,
    pub total_matches: u32,
    pub sections_populated: usize,
}

// -- entry point -----------------------------------------------------------

/// Load the required match table and whatever enrichment tables exist, build
/// the dashboard document and write it. Failure here is fatal for the run.
pub fn run(config: &PipelineConfig) -> Result<AggregateSummary> {
    let matches_path = config.matches_clean_path();
    if !matches_path.exists() {
        return Err(anyhow!(
            "{} not found -- run clean_matches first",
            matches_path.display()
        ));
    }
    let matches = match_dataset::load_clean_matches(&matches_path)?;
    println!("Loaded match data: {} rows", matches.len());

    // Enrichment tables are optional: a load failure just marks the source
    // unavailable and the dependent sections null.
    let players = match fpl::load_players(&config.players_path()) {
        Ok(rows) => {
            println!("Loaded FPL player data: {} rows", rows.len());
            Some(rows)
        }
        Err(_) => {
            println!("FPL player data not available -- skipping player enrichment");
            None
        }
    };
    let xg = match (
        understat::load_xg_teams(&config.xg_teams_path()),
        understat::load_xg_players(&config.xg_players_path()),
    ) {
        (Ok(teams), Ok(xg_players)) => {
            println!("Loaded xG team data: {} rows", teams.len());
            println!("Loaded xG player data: {} rows", xg_players.len());
            Some(XgData {
                teams,
                players: xg_players,
            })
        }
        _ => {
            println!("xG data not available -- skipping xG enrichment");
            None
        }
    };

    let generated_at = Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
    let data = build_dashboard(
        &matches,
        players.as_deref(),
        xg.as_ref(),
        config,
        &generated_at,
    );

    let output_path = config.dashboard_output_path();
    write_json(&output_path, &data)?;

    let sections_populated = 7
        + [
            data.xg_table.is_some(),
            data.xg_vs_actual.is_some(),
            data.top_scorers.is_some(),
            data.shot_quality.is_some(),
            data.player_value.is_some(),
            data.player_leaderboards.is_some(),
            data.money_vs_points.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count();

    println!("Saved: {}", output_path.display());
    println!("Sections populated: {sections_populated}");

    Ok(AggregateSummary {
        output_path,
        total_matches: data.total_matches,
        sections_populated,
    })
}

fn write_json(path: &Path, data: &DashboardData) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).ok();
    }
    // serde_json writes null for any non-finite float, so the output is
    // strict JSON even if a ratio guard is ever missed.
    let json = serde_json::to_string_pretty(data).context("serialize dashboard data")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
    Ok(())
}

// -- document assembly -----------------------------------------------------

/// Pure assembly of the whole document: same inputs and timestamp produce an
/// identical document.
pub fn build_dashboard(
    matches: &[CleanMatch],
    players: Option<&[PlayerRow]>,
    xg: Option<&XgData>,
    config: &PipelineConfig,
    generated_at: &str,
) -> DashboardData {
    let current: Vec<&CleanMatch> = matches
        .iter()
        .filter(|m| m.season == config.current_season)
        .collect();
    // Top-level totals cover the whole cleaned table; per-season figures
    // live in season_status and season_comparison.
    let total_matches = matches.len() as u32;
    let total_goals: u32 = matches.iter().map(|m| m.total_goals).sum();
    let denominator = total_matches.max(1) as f64;

    let league_table = build_league_table(&current);
    let season_status = build_season_status(&current);

    let xg_sections = xg.map(|xg| build_xg_sections(xg, &league_table));
    let (xg_table, xg_vs_actual, shot_quality) = match xg_sections {
        Some((table, scatter, quality)) => (Some(table), Some(scatter), Some(quality)),
        None => (None, None, None),
    };

    DashboardData {
        generated_at: generated_at.to_string(),
        season: config.current_season.to_string(),
        source: "football-data.co.uk".to_string(),
        total_matches,
        total_goals,
        goals_per_match: round2(total_goals as f64 / denominator),
        season_status,
        cumulative_points: build_cumulative_points(&current),
        monthly_trends: build_monthly_trends(&current),
        home_away: build_home_away(&current),
        referee_stats: build_referee_stats(&current),
        scoreline_frequency: build_scoreline_frequency(&current),
        season_comparison: build_season_comparison(matches, config),
        xg_table,
        xg_vs_actual,
        top_scorers: xg.map(|xg| build_top_scorers(&xg.players)),
        shot_quality,
        player_value: players.map(build_player_value),
        player_leaderboards: players.map(|p| build_player_leaderboards(p, xg)),
        money_vs_points: players.and_then(|p| build_money_vs_points(p, &league_table)),
        league_table,
    }
}

/// Derived generically from row counts and per-team match counts, never
/// hardcoded per season: partial data yields a coherent partial descriptor.
fn build_season_status(current: &[&CleanMatch]) -> SeasonStatus {
    let mut games_per_team: HashMap<&str, u32> = HashMap::new();
    for m in current {
        *games_per_team.entry(m.home_team.as_str()).or_default() += 1;
        *games_per_team.entry(m.away_team.as_str()).or_default() += 1;
    }
    let matchdays_played = games_per_team.values().copied().max().unwrap_or(0);
    let matches_played = current.len() as u32;
    let last_match_date = current
        .iter()
        .map(|m| m.date.as_str())
        .max()
        .unwrap_or("")
        .to_string();

    SeasonStatus {
        matches_played,
        matches_total: FULL_SEASON_MATCHES,
        matchdays_played,
        matchdays_total: MATCHDAYS_TOTAL,
        is_complete: matches_played >= FULL_SEASON_MATCHES,
        last_match_date,
    }
}

fn season_teams<'m>(current: &[&'m CleanMatch]) -> Vec<&'m str> {
    let mut teams: Vec<&str> = current
        .iter()
        .flat_map(|m| [m.home_team.as_str(), m.away_team.as_str()])
        .collect();
    teams.sort_unstable();
    teams.dedup();
    teams
}

fn build_league_table(current: &[&CleanMatch]) -> Vec<TableRow> {
    let mut rows: Vec<TableRow> = season_teams(current)
        .into_iter()
        .map(|team| build_team_row(current, team))
        .collect();
    rows.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then(b.goal_difference.cmp(&a.goal_difference))
            .then(b.goals_for.cmp(&a.goals_for))
    });
    for (i, row) in rows.iter_mut().enumerate() {
        row.position = (i + 1) as u32;
    }
    rows
}

fn build_team_row(current: &[&CleanMatch], team: &str) -> TableRow {
    let mut home_won = 0u32;
    let mut home_drawn = 0u32;
    let mut home_lost = 0u32;
    let mut away_won = 0u32;
    let mut away_drawn = 0u32;
    let mut away_lost = 0u32;
    let mut goals_for = 0u32;
    let mut goals_against = 0u32;
    let mut shots = 0u32;
    let mut shots_on_target = 0u32;
    let mut clean_sheets = 0u32;

    for m in current {
        if m.home_team == team {
            match m.result.as_str() {
                "H" => home_won += 1,
                "D" => home_drawn += 1,
                "A" => home_lost += 1,
                _ => {}
            }
            goals_for += m.home_goals;
            goals_against += m.away_goals;
            shots += m.home_shots;
            shots_on_target += m.home_shots_on_target;
            if m.away_goals == 0 {
                clean_sheets += 1;
            }
        } else if m.away_team == team {
            match m.result.as_str() {
                "A" => away_won += 1,
                "D" => away_drawn += 1,
                "H" => away_lost += 1,
                _ => {}
            }
            goals_for += m.away_goals;
            goals_against += m.home_goals;
            shots += m.away_shots;
            shots_on_target += m.away_shots_on_target;
            if m.home_goals == 0 {
                clean_sheets += 1;
            }
        }
    }

    let played = home_won + home_drawn + home_lost + away_won + away_drawn + away_lost;
    let won = home_won + away_won;
    let drawn = home_drawn + away_drawn;
    let lost = home_lost + away_lost;
    let points = won * 3 + drawn;
    let shot_accuracy = if shots > 0 {
        round2(shots_on_target as f64 / shots as f64 * 100.0)
    } else {
        0.0
    };
    let goals_per_game = if played > 0 {
        round2(goals_for as f64 / played as f64)
    } else {
        0.0
    };

    TableRow {
        team: team.to_string(),
        played,
        won,
        drawn,
        lost,
        goals_for,
        goals_against,
        goal_difference: goals_for as i64 - goals_against as i64,
        points,
        home_won,
        home_drawn,
        home_lost,
        away_won,
        away_drawn,
        away_lost,
        clean_sheets,
        total_shots: shots,
        total_shots_on_target: shots_on_target,
        shot_accuracy,
        goals_per_game,
        position: 0,
    }
}

/// Matchday-by-matchday running points for the points race chart.
fn build_cumulative_points(current: &[&CleanMatch]) -> BTreeMap<String, Vec<CumulativePoint>> {
    let mut by_date: Vec<&CleanMatch> = current.to_vec();
    by_date.sort_by(|a, b| a.date.cmp(&b.date).then(a.match_id.cmp(&b.match_id)));

    let mut out = BTreeMap::new();
    for team in season_teams(current) {
        let mut running = 0u32;
        let mut series = Vec::new();
        for m in &by_date {
            let pts = if m.home_team == team {
                match m.result.as_str() {
                    "H" => 3,
                    "D" => 1,
                    _ => 0,
                }
            } else if m.away_team == team {
                match m.result.as_str() {
                    "A" => 3,
                    "D" => 1,
                    _ => 0,
                }
            } else {
                continue;
            };
            running += pts;
            series.push(CumulativePoint {
                matchday: series.len() as u32 + 1,
                points: running,
            });
        }
        out.insert(team.to_string(), series);
    }
    out
}

fn build_monthly_trends(current: &[&CleanMatch]) -> Vec<MonthlyTrend> {
    #[derive(Default)]
    struct MonthAcc {
        matches: u32,
        total_goals: u32,
        home_wins: u32,
        draws: u32,
        away_wins: u32,
    }

    let mut months: BTreeMap<String, MonthAcc> = BTreeMap::new();
    for m in current {
        let month: String = m.date.chars().take(7).collect();
        let acc = months.entry(month).or_default();
        acc.matches += 1;
        acc.total_goals += m.total_goals;
        match m.result.as_str() {
            "H" => acc.home_wins += 1,
            "D" => acc.draws += 1,
            "A" => acc.away_wins += 1,
            _ => {}
        }
    }

    months
        .into_iter()
        .map(|(month, acc)| MonthlyTrend {
            month,
            matches: acc.matches,
            total_goals: acc.total_goals,
            avg_goals: round2(acc.total_goals as f64 / acc.matches.max(1) as f64),
            home_wins: acc.home_wins,
            draws: acc.draws,
            away_wins: acc.away_wins,
        })
        .collect()
}

fn build_home_away(current: &[&CleanMatch]) -> HomeAwaySplit {
    let home_wins = current.iter().filter(|m| m.result == "H").count() as u32;
    let draws = current.iter().filter(|m| m.result == "D").count() as u32;
    let away_wins = current.iter().filter(|m| m.result == "A").count() as u32;
    let matches_played = current.len() as u32;
    let total = matches_played.max(1) as f64;
    let mean = |pick: fn(&CleanMatch) -> u32| {
        if current.is_empty() {
            0.0
        } else {
            round2(current.iter().map(|m| pick(m) as f64).sum::<f64>() / current.len() as f64)
        }
    };

    HomeAwaySplit {
        home_wins,
        draws,
        away_wins,
        home_goals_avg: mean(|m| m.home_goals),
        away_goals_avg: mean(|m| m.away_goals),
        total_matches: matches_played,
        home_win_pct: round2(home_wins as f64 / total * 100.0),
        draw_pct: round2(draws as f64 / total * 100.0),
        away_win_pct: round2(away_wins as f64 / total * 100.0),
    }
}

fn build_referee_stats(current: &[&CleanMatch]) -> Vec<RefereeStat> {
    let mut groups: BTreeMap<&str, Vec<&CleanMatch>> = BTreeMap::new();
    for m in current {
        groups.entry(m.referee.as_str()).or_default().push(m);
    }

    let mut rows: Vec<RefereeStat> = groups
        .into_iter()
        .filter(|(_, group)| group.len() >= MIN_REFEREE_MATCHES)
        .map(|(referee, group)| {
            let n = group.len() as f64;
            let sum = |pick: fn(&CleanMatch) -> u32| {
                group.iter().map(|m| pick(m) as f64).sum::<f64>()
            };
            RefereeStat {
                referee: referee.to_string(),
                matches: group.len() as u32,
                avg_goals: round2(sum(|m| m.total_goals) / n),
                avg_fouls: round2(sum(|m| m.total_fouls) / n),
                avg_cards: round2(sum(|m| m.total_cards) / n),
                total_reds: group.iter().map(|m| m.home_reds + m.away_reds).sum(),
            }
        })
        .collect();
    rows.sort_by(|a, b| b.avg_cards.total_cmp(&a.avg_cards));
    rows
}

fn build_scoreline_frequency(current: &[&CleanMatch]) -> Vec<ScorelineCount> {
    // First-seen order breaks count ties, so reruns are stable.
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, u32> = HashMap::new();
    for m in current {
        let score = format!("{}-{}", m.home_goals, m.away_goals);
        if !counts.contains_key(&score) {
            order.push(score.clone());
        }
        *counts.entry(score).or_default() += 1;
    }

    let mut rows: Vec<ScorelineCount> = order
        .into_iter()
        .map(|score| {
            let count = counts[&score];
            ScorelineCount { score, count }
        })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count));
    rows.truncate(10);
    rows
}

fn build_season_comparison(matches: &[CleanMatch], config: &PipelineConfig) -> Vec<SeasonComparison> {
    let mut rows = Vec::new();
    for season in config.seasons {
        let subset: Vec<&CleanMatch> = matches
            .iter()
            .filter(|m| m.season == season.label)
            .collect();
        if subset.is_empty() {
            continue;
        }
        let n = subset.len() as f64;
        let sum = |pick: fn(&CleanMatch) -> u32| subset.iter().map(|m| pick(m) as f64).sum::<f64>();
        let home_wins = subset.iter().filter(|m| m.result == "H").count() as f64;
        rows.push(SeasonComparison {
            season: season.label.to_string(),
            matches: subset.len() as u32,
            avg_goals: round2(sum(|m| m.total_goals) / n),
            avg_cards: round2(sum(|m| m.total_cards) / n),
            home_win_pct: round2(home_wins / n * 100.0),
            avg_fouls: round2(sum(|m| m.total_fouls) / n),
        });
    }
    rows
}

// -- xG sections -----------------------------------------------------------

fn build_xg_sections(
    xg: &XgData,
    table: &[TableRow],
) -> (Vec<XgTableRow>, Vec<XgScatterPoint>, Vec<ShotQualityRow>) {
    let points_by_team: HashMap<&str, u32> =
        table.iter().map(|t| (t.team.as_str(), t.points)).collect();
    let shots_by_team: HashMap<&str, u32> = table
        .iter()
        .map(|t| (t.team.as_str(), t.total_shots))
        .collect();

    let mut xg_table = Vec::with_capacity(xg.teams.len());
    let mut scatter = Vec::with_capacity(xg.teams.len());
    let mut quality = Vec::new();
    for row in &xg.teams {
        let actual_points = points_by_team.get(row.team.as_str()).copied().unwrap_or(0);
        xg_table.push(XgTableRow {
            team: row.team.clone(),
            xg_for: round2(row.xg_for),
            xg_against: round2(row.xg_against),
            goals_for: row.goals_for,
            goals_against: row.goals_against,
            xg_difference: round2(row.xg_for - row.xg_against),
            actual_points,
        });
        scatter.push(XgScatterPoint {
            team: row.team.clone(),
            total_xg: round2(row.xg_for),
            actual_goals: row.goals_for,
            difference: round2(row.goals_for as f64 - row.xg_for),
        });
        // Shot quality uses league-table shots for the denominator.
        if let Some(&shots) = shots_by_team.get(row.team.as_str()) {
            if shots > 0 {
                quality.push(ShotQualityRow {
                    team: row.team.clone(),
                    total_shots: shots,
                    // 3 decimals: the spread across teams is ~0.10-0.15, so
                    // 2dp collapses half the league to the same value.
                    xg_per_shot: round3(row.xg_for / shots as f64),
                });
            }
        }
    }

    xg_table.sort_by(|a, b| b.xg_difference.total_cmp(&a.xg_difference));
    quality.sort_by(|a, b| b.xg_per_shot.total_cmp(&a.xg_per_shot));
    (xg_table, scatter, quality)
}

fn build_top_scorers(xg_players: &[XgPlayerRow]) -> Vec<TopScorer> {
    let mut scorers: Vec<&XgPlayerRow> = xg_players.iter().filter(|p| p.goals > 0).collect();
    scorers.sort_by(|a, b| b.goals.cmp(&a.goals));
    scorers.truncate(10);

    scorers
        .into_iter()
        .map(|p| TopScorer {
            player_name: p.player_name.clone(),
            team: p.team.clone(),
            goals: p.goals,
            assists: p.assists,
            xg: round2(p.xg),
            xa: round2(p.xa),
            minutes: p.minutes,
            goals_minus_xg: round2(p.goals as f64 - p.xg),
            position: p.position.clone(),
        })
        .collect()
}

// -- FPL sections ----------------------------------------------------------

fn build_player_value(players: &[PlayerRow]) -> Vec<PlayerValueRow> {
    let mut rows: Vec<PlayerValueRow> = players
        .iter()
        .filter(|p| p.goals > 0 && p.price > 0.0)
        .map(|p| PlayerValueRow {
            player_name: p.player_name.clone(),
            team: p.team.clone(),
            price: round1(p.price),
            goals: p.goals,
            goals_per_million: round2(p.goals as f64 / p.price),
        })
        .collect();
    rows.sort_by(|a, b| b.goals_per_million.total_cmp(&a.goals_per_million));
    rows.truncate(10);
    rows
}

/// Per-90-minute rate; players under one full match report zero.
fn per90(stat: u32, minutes: u32) -> f64 {
    if minutes < 90 {
        return 0.0;
    }
    round2(stat as f64 / minutes as f64 * 90.0)
}

fn build_player_leaderboards(players: &[PlayerRow], xg: Option<&XgData>) -> PlayerLeaderboards {
    let index = xg.map(|xg| XgNameIndex::build(&xg.players));
    let enrich = |p: &PlayerRow| {
        index
            .as_ref()
            .and_then(|idx| idx.lookup(&p.player_name, &p.full_name, &p.team))
    };

    // Goal scorers, top 20.
    let mut scorers: Vec<&PlayerRow> = players.iter().filter(|p| p.goals > 0).collect();
    scorers.sort_by(|a, b| b.goals.cmp(&a.goals));
    scorers.truncate(20);
    let goal_scorers = scorers
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let xg_data = enrich(p);
            GoalScorer {
                rank: (i + 1) as u32,
                player_name: p.player_name.clone(),
                team: p.team.clone(),
                position: p.position.clone(),
                goals: p.goals,
                assists: p.assists,
                minutes: p.minutes,
                goals_per_90: per90(p.goals, p.minutes),
                price: round1(p.price),
                xg: xg_data.map(|d| d.xg),
                shots: xg_data.map(|d| d.shots),
            }
        })
        .collect();

    // Assist leaders, top 15.
    let mut assisters: Vec<&PlayerRow> = players.iter().filter(|p| p.assists > 0).collect();
    assisters.sort_by(|a, b| b.assists.cmp(&a.assists));
    assisters.truncate(15);
    let assist_leaders = assisters
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let xg_data = enrich(p);
            AssistLeader {
                rank: (i + 1) as u32,
                player_name: p.player_name.clone(),
                team: p.team.clone(),
                position: p.position.clone(),
                assists: p.assists,
                goals: p.goals,
                minutes: p.minutes,
                assists_per_90: per90(p.assists, p.minutes),
                xa: xg_data.map(|d| d.xa),
                key_passes: xg_data.map(|d| d.key_passes),
                price: round1(p.price),
            }
        })
        .collect();

    // Most minutes per team.
    let mut teams: Vec<&str> = players.iter().map(|p| p.team.as_str()).collect();
    teams.sort_unstable();
    teams.dedup();
    let mut iron_men: Vec<IronMan> = teams
        .into_iter()
        .filter_map(|team| {
            players
                .iter()
                .filter(|p| p.team == team)
                .max_by_key(|p| p.minutes)
                .map(|p| IronMan {
                    player_name: p.player_name.clone(),
                    team: team.to_string(),
                    position: p.position.clone(),
                    minutes: p.minutes,
                    games_equivalent: round1(p.minutes as f64 / 90.0),
                    goals: p.goals,
                    assists: p.assists,
                })
        })
        .collect();
    iron_men.sort_by(|a, b| b.minutes.cmp(&a.minutes));

    // Goals by position, fixed order.
    let goals_by_position = ["FWD", "MID", "DEF", "GK"]
        .into_iter()
        .map(|pos| {
            let group: Vec<&PlayerRow> = players.iter().filter(|p| p.position == pos).collect();
            let total_goals: u32 = group.iter().map(|p| p.goals).sum();
            let total_assists: u32 = group.iter().map(|p| p.assists).sum();
            let player_count = group.iter().filter(|p| p.minutes > 0).count() as u32;
            PositionGoals {
                position: pos.to_string(),
                total_goals,
                total_assists,
                player_count,
                avg_goals: if player_count > 0 {
                    round2(total_goals as f64 / player_count as f64)
                } else {
                    0.0
                },
            }
        })
        .collect();

    // Best value: goals + assists per million, with a minutes floor.
    let mut active: Vec<(&PlayerRow, f64)> = players
        .iter()
        .filter(|p| p.minutes >= MIN_VALUE_MINUTES && p.price > 0.0)
        .map(|p| (p, round2((p.goals + p.assists) as f64 / p.price)))
        .collect();
    active.sort_by(|a, b| b.1.total_cmp(&a.1));
    active.truncate(15);
    let best_value = active
        .iter()
        .enumerate()
        .map(|(i, (p, ga_per_million))| ValuePlayer {
            rank: (i + 1) as u32,
            player_name: p.player_name.clone(),
            team: p.team.clone(),
            position: p.position.clone(),
            price: round1(p.price),
            goals: p.goals,
            assists: p.assists,
            ga_per_million: *ga_per_million,
            minutes: p.minutes,
        })
        .collect();

    // Disciplinary, top 10 by total cards.
    let mut carded: Vec<&PlayerRow> = players
        .iter()
        .filter(|p| p.yellow_cards + p.red_cards > 0)
        .collect();
    carded.sort_by(|a, b| {
        (b.yellow_cards + b.red_cards).cmp(&(a.yellow_cards + a.red_cards))
    });
    carded.truncate(10);
    let most_cards = carded
        .into_iter()
        .map(|p| CardLeader {
            player_name: p.player_name.clone(),
            team: p.team.clone(),
            position: p.position.clone(),
            yellows: p.yellow_cards,
            reds: p.red_cards,
            total_cards: p.yellow_cards + p.red_cards,
            minutes: p.minutes,
        })
        .collect();

    PlayerLeaderboards {
        goal_scorers,
        assist_leaders,
        iron_men,
        goals_by_position,
        best_value,
        most_cards,
    }
}

/// Squad spending vs league position: FPL prices summed per team as a market
/// value proxy, with a closed-form least-squares fit of points on value.
fn build_money_vs_points(players: &[PlayerRow], table: &[TableRow]) -> Option<MoneyVsPoints> {
    let mut squad_values: BTreeMap<&str, f64> = BTreeMap::new();
    for p in players {
        *squad_values.entry(p.team.as_str()).or_default() += p.price;
    }

    let mut rows: Vec<MoneyRow> = Vec::new();
    for (team, value) in squad_values {
        let Some(entry) = table.iter().find(|t| t.team == team) else {
            continue;
        };
        let points_per_match = if entry.played > 0 {
            round2(entry.points as f64 / entry.played as f64)
        } else {
            0.0
        };
        rows.push(MoneyRow {
            team: team.to_string(),
            squad_value: round1(value),
            points: entry.points,
            played: entry.played,
            points_per_match,
            expected_points: 0.0,
            over_under: 0.0,
        });
    }
    if rows.is_empty() {
        return None;
    }

    let values: Vec<f64> = rows.iter().map(|r| r.squad_value).collect();
    let points: Vec<f64> = rows.iter().map(|r| r.points as f64).collect();
    let fit = ols_fit(&values, &points);

    for row in &mut rows {
        let expected = fit.slope * row.squad_value + fit.intercept;
        row.expected_points = round2(expected);
        row.over_under = round2(row.points as f64 - expected);
    }
    rows.sort_by(|a, b| b.over_under.total_cmp(&a.over_under));

    Some(MoneyVsPoints {
        teams: rows,
        regression: Regression {
            slope: round4(fit.slope),
            intercept: round2(fit.intercept),
            r_squared: round3(fit.r_squared),
        },
    })
}

pub struct OlsFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

/// Single-variable ordinary least squares, closed form.
pub fn ols_fit(x: &[f64], y: &[f64]) -> OlsFit {
    let n = x.len() as f64;
    if n == 0.0 {
        return OlsFit {
            slope: 0.0,
            intercept: 0.0,
            r_squared: 0.0,
        };
    }
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;
    let cov: f64 = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| (xi - mean_x) * (yi - mean_y))
        .sum();
    let var: f64 = x.iter().map(|xi| (xi - mean_x).powi(2)).sum();
    let ss_y: f64 = y.iter().map(|yi| (yi - mean_y).powi(2)).sum();

    let slope = if var > 0.0 { cov / var } else { 0.0 };
    let intercept = mean_y - slope * mean_x;
    let r_squared = if var > 0.0 && ss_y > 0.0 {
        (cov * cov) / (var * ss_y)
    } else {
        0.0
    };
    OlsFit {
        slope,
        intercept,
        r_squared,
    }
}

// -- FPL/Understat name matching -------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct XgNameRef {
    pub xg: f64,
    pub xa: f64,
    pub shots: u32,
    pub key_passes: u32,
}

/// Lookup indexes from Understat player rows. FPL uses short names
/// ("Haaland"), Understat full names ("Erling Haaland"), and transferred
/// players carry comma-separated teams on the Understat side.
pub struct XgNameIndex {
    by_name: HashMap<(String, String), XgNameRef>,
    by_last: HashMap<(String, String), XgNameRef>,
    by_team: HashMap<String, Vec<(String, XgNameRef)>>,
}

impl XgNameIndex {
    pub fn build(xg_players: &[XgPlayerRow]) -> Self {
        let mut by_name = HashMap::new();
        let mut by_last = HashMap::new();
        let mut by_team: HashMap<String, Vec<(String, XgNameRef)>> = HashMap::new();

        for p in xg_players {
            if p.player_name.is_empty() {
                continue;
            }
            let data = XgNameRef {
                xg: round2(p.xg),
                xa: round2(p.xa),
                shots: p.shots,
                key_passes: p.key_passes,
            };
            let name_norm = fold_name(&p.player_name);
            let last = name_norm
                .split_whitespace()
                .last()
                .unwrap_or(&name_norm)
                .to_string();

            for team in p.team.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                by_name.insert((p.player_name.clone(), team.to_string()), data);
                by_last.insert((last.clone(), team.to_string()), data);
                by_team
                    .entry(team.to_string())
                    .or_default()
                    .push((name_norm.clone(), data));
            }
        }

        Self {
            by_name,
            by_last,
            by_team,
        }
    }

    /// Strategy chain: exact short name, exact full name, folded last name,
    /// dot-split parts, then substring within the team's players.
    pub fn lookup(&self, player_name: &str, full_name: &str, team: &str) -> Option<XgNameRef> {
        let key = |name: &str| (name.to_string(), team.to_string());
        if let Some(data) = self.by_name.get(&key(player_name)) {
            return Some(*data);
        }
        if !full_name.is_empty() {
            if let Some(data) = self.by_name.get(&key(full_name)) {
                return Some(*data);
            }
        }

        let name_norm = fold_name(player_name);
        if let Some(data) = self.by_last.get(&key(&name_norm)) {
            return Some(*data);
        }

        // FPL renders some players as "B.Fernandes" or "Kroupi.Jr".
        if player_name.contains('.') {
            for part in player_name.split('.') {
                if part.len() <= 2 {
                    continue;
                }
                if let Some(data) = self.by_last.get(&key(&fold_name(part))) {
                    return Some(*data);
                }
            }
        }

        // "Enzo" should still find "enzo fernandez".
        let clean = name_norm.trim_end_matches('.');
        if !clean.is_empty() {
            for (candidate, data) in self.by_team.get(team).map(Vec::as_slice).unwrap_or(&[]) {
                if candidate.contains(clean) {
                    return Some(*data);
                }
            }
        }
        None
    }
}

/// Accent-folded, lowercased form used for name joins, so Ekitiké matches
/// Ekitike.
pub fn fold_name(name: &str) -> String {
    name.chars().map(fold_char).collect::<String>().to_lowercase()
}

fn fold_char(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' | 'Ā' => 'A',
        'é' | 'è' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' | 'Ė' => 'E',
        'í' | 'ì' | 'î' | 'ï' | 'ī' | 'ı' => 'i',
        'Í' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'ø' | 'ō' | 'ő' => 'o',
        'Ó' | 'Ô' | 'Ö' | 'Ø' => 'O',
        'ú' | 'ù' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => 'u',
        'Ú' | 'Ü' => 'U',
        'ç' | 'ć' | 'č' => 'c',
        'Ç' | 'Č' => 'C',
        'ñ' | 'ń' | 'ň' => 'n',
        'Ñ' => 'N',
        'š' | 'ś' | 'ş' | 'ș' => 's',
        'Š' | 'Ş' => 'S',
        'ž' | 'ź' | 'ż' => 'z',
        'Ž' => 'Z',
        'ý' | 'ÿ' => 'y',
        'ď' | 'đ' => 'd',
        'Đ' => 'D',
        'ğ' | 'ģ' => 'g',
        'ķ' => 'k',
        'ľ' | 'ļ' | 'ł' => 'l',
        'Ł' => 'L',
        'ŕ' | 'ř' => 'r',
        'ť' | 'ţ' | 'ț' => 't',
        other => other,
    }
}

// -- rounding --------------------------------------------------------------

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

fn round4(v: f64) -> f64 {
    (v * 10000.0).round() / 10000.0
}
