use chrono::{Duration, NaiveDate};

use epl_dashboard::aggregate::{XgData, build_dashboard};
use epl_dashboard::config::{CURRENT_SEASON, PipelineConfig, canonical_teams};
use epl_dashboard::fpl::PlayerRow;
use epl_dashboard::match_dataset::CleanMatch;
use epl_dashboard::understat::{XgPlayerRow, XgTeamRow};

fn config() -> PipelineConfig {
    // build_dashboard never touches the filesystem; the dir is unused.
    PipelineConfig::with_data_dir("unused")
}

/// A deterministic full double round-robin: 20 teams, 380 matches.
fn synthetic_season(label: &str, start: NaiveDate) -> Vec<CleanMatch> {
    let teams = canonical_teams(label).expect("season has a team list");
    let mut rows = Vec::with_capacity(380);
    let mut idx = 0u32;
    for (i, home) in teams.iter().enumerate() {
        for (j, away) in teams.iter().enumerate() {
            if i == j {
                continue;
            }
            let home_goals = ((i + 2 * j) % 5) as u32;
            let away_goals = ((i + j) % 3) as u32;
            let result = if home_goals > away_goals {
                "H"
            } else if home_goals < away_goals {
                "A"
            } else {
                "D"
            };
            let date = start + Duration::days((idx / 10) as i64 * 7);
            let home_shots = 8 + (i as u32 % 9);
            let away_shots = 6 + (j as u32 % 7);
            let home_fouls = 9 + (j as u32 % 4);
            let away_fouls = 10 + (i as u32 % 5);
            let home_yellows = (i as u32) % 3;
            let away_yellows = (j as u32) % 4;
            let home_reds = if (i + j) % 17 == 0 { 1 } else { 0 };
            let away_reds = 0;
            rows.push(CleanMatch {
                match_id: 0,
                season: label.to_string(),
                date: date.format("%Y-%m-%d").to_string(),
                time: "15:00".to_string(),
                home_team: home.to_string(),
                away_team: away.to_string(),
                home_goals,
                away_goals,
                result: result.to_string(),
                ht_home_goals: home_goals.min(1),
                ht_away_goals: away_goals.min(1),
                ht_result: "D".to_string(),
                referee: format!("Referee {}", idx % 8),
                home_shots,
                away_shots,
                home_shots_on_target: home_shots / 2,
                away_shots_on_target: away_shots / 2,
                home_fouls,
                away_fouls,
                home_corners: 4 + (i as u32 % 5),
                away_corners: 3 + (j as u32 % 4),
                home_yellows,
                away_yellows,
                home_reds,
                away_reds,
                total_goals: home_goals + away_goals,
                total_shots: home_shots + away_shots,
                total_fouls: home_fouls + away_fouls,
                total_cards: home_yellows + away_yellows + home_reds + away_reds,
            });
            idx += 1;
        }
    }
    for (i, row) in rows.iter_mut().enumerate() {
        row.match_id = (i + 1) as u32;
    }
    rows
}

fn two_full_seasons() -> Vec<CleanMatch> {
    let mut rows = synthetic_season("2024-25", NaiveDate::from_ymd_opt(2024, 8, 2).unwrap());
    rows.extend(synthetic_season(
        CURRENT_SEASON,
        NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
    ));
    for (i, row) in rows.iter_mut().enumerate() {
        row.match_id = (i + 1) as u32;
    }
    rows
}

fn sample_players() -> Vec<PlayerRow> {
    let player = |name: &str, full: &str, team: &str, pos: &str, goals, assists, minutes, price| {
        PlayerRow {
            player_name: name.to_string(),
            full_name: full.to_string(),
            team: team.to_string(),
            position: pos.to_string(),
            goals,
            assists,
            clean_sheets: 3,
            minutes,
            yellow_cards: 2,
            red_cards: 0,
            total_points: 120,
            price,
            bonus: 10,
        }
    };
    vec![
        player("Haaland", "Erling Haaland", "Manchester City", "FWD", 18, 3, 2400, 14.2),
        player("Saka", "Bukayo Saka", "Arsenal", "MID", 9, 8, 2300, 10.1),
        player("B.Fernandes", "Bruno Borges Fernandes", "Manchester United", "MID", 6, 7, 2500, 8.9),
        player("Welbeck", "Danny Welbeck", "Brighton", "FWD", 5, 1, 1600, 5.6),
        player("Raya", "David Raya", "Arsenal", "GK", 0, 0, 2520, 5.5),
    ]
}

fn sample_xg() -> XgData {
    let team = |name: &str, xg_for: f64, xg_against: f64, gf, ga| XgTeamRow {
        team: name.to_string(),
        matches: 38,
        xg_for,
        xg_against,
        goals_for: gf,
        goals_against: ga,
        npxg_for: xg_for * 0.9,
        npxg_against: xg_against * 0.9,
        xg_difference: xg_for - xg_against,
        ppda: 10.0,
        deep_completions: 250,
    };
    let player = |name: &str, team: &str, goals, xg: f64| XgPlayerRow {
        player_name: name.to_string(),
        team: team.to_string(),
        position: "F".to_string(),
        games: 30,
        minutes: 2400,
        goals,
        xg,
        assists: 4,
        xa: 3.1,
        shots: 80,
        key_passes: 30,
        npg: goals,
        npxg: xg * 0.9,
    };
    XgData {
        teams: vec![
            team("Manchester City", 72.4, 30.2, 78, 31),
            team("Arsenal", 68.9, 28.7, 70, 27),
            team("Brighton", 52.3, 49.0, 55, 51),
        ],
        players: vec![
            player("Erling Haaland", "Manchester City", 18, 16.4),
            player("Bukayo Saka", "Arsenal", 9, 7.8),
            player("Bruno Fernandes", "Manchester United", 6, 5.2),
        ],
    }
}

#[test]
fn two_full_seasons_aggregate_as_specified() {
    let matches = two_full_seasons();
    let doc = build_dashboard(&matches, None, None, &config(), "2026-06-01T00:00:00");

    assert_eq!(doc.total_matches, 760);
    assert_eq!(doc.league_table.len(), 20);
    for row in &doc.league_table {
        assert_eq!(row.played, 38);
        assert_eq!(row.won + row.drawn + row.lost, 38);
        assert_eq!(row.points, row.won * 3 + row.drawn);
    }
    // positions are 1..=20 in sorted order
    let positions: Vec<u32> = doc.league_table.iter().map(|r| r.position).collect();
    assert_eq!(positions, (1..=20).collect::<Vec<u32>>());
    for pair in doc.league_table.windows(2) {
        assert!(pair[0].points >= pair[1].points);
    }

    let status = &doc.season_status;
    assert!(status.is_complete);
    assert_eq!(status.matches_played, 380);
    assert_eq!(status.matchdays_played, 38);

    // every team has a full 38-point cumulative series
    assert_eq!(doc.cumulative_points.len(), 20);
    for series in doc.cumulative_points.values() {
        assert_eq!(series.len(), 38);
        assert_eq!(series.last().unwrap().matchday, 38);
        for pair in series.windows(2) {
            assert!(pair[0].points <= pair[1].points);
        }
    }

    assert_eq!(doc.season_comparison.len(), 2);
    assert!(doc.scoreline_frequency.len() <= 10);
    for stat in &doc.referee_stats {
        assert!(stat.matches >= 3);
    }
}

#[test]
fn partial_season_produces_coherent_status() {
    let full = synthetic_season(CURRENT_SEASON, NaiveDate::from_ymd_opt(2025, 8, 1).unwrap());
    let partial: Vec<CleanMatch> = full.into_iter().take(40).collect();
    let doc = build_dashboard(&partial, None, None, &config(), "2025-09-15T00:00:00");

    let status = &doc.season_status;
    assert!(!status.is_complete);
    assert_eq!(status.matches_played, 40);
    assert_eq!(status.matches_total, 380);
    assert_eq!(status.matchdays_total, 38);
    // matchdays_played is the max per-team match count, derived generically
    let expected_max = doc
        .league_table
        .iter()
        .map(|r| r.played)
        .max()
        .unwrap_or(0);
    assert_eq!(status.matchdays_played, expected_max);
    assert!(!status.last_match_date.is_empty());
}

#[test]
fn missing_enrichment_nulls_exactly_the_dependent_sections() {
    let matches = two_full_seasons();
    let full = build_dashboard(
        &matches,
        Some(&sample_players()),
        Some(&sample_xg()),
        &config(),
        "2026-06-01T00:00:00",
    );
    let degraded = build_dashboard(&matches, None, None, &config(), "2026-06-01T00:00:00");

    let full_json = serde_json::to_value(&full).unwrap();
    let degraded_json = serde_json::to_value(&degraded).unwrap();

    for key in [
        "xg_table",
        "xg_vs_actual",
        "top_scorers",
        "shot_quality",
        "player_value",
        "player_leaderboards",
        "money_vs_points",
    ] {
        assert!(
            degraded_json.get(key).is_some(),
            "optional key {key} must always be present"
        );
        assert!(degraded_json[key].is_null(), "{key} should be null");
        assert!(!full_json[key].is_null(), "{key} should be populated");
    }

    // sections independent of enrichment are byte-identical
    for key in [
        "season_status",
        "league_table",
        "cumulative_points",
        "monthly_trends",
        "home_away",
        "referee_stats",
        "scoreline_frequency",
        "season_comparison",
    ] {
        assert_eq!(full_json[key], degraded_json[key], "{key} changed");
    }
}

#[test]
fn rebuilds_differ_only_in_generated_at() {
    let matches = two_full_seasons();
    let players = sample_players();
    let xg = sample_xg();

    let a = build_dashboard(&matches, Some(&players), Some(&xg), &config(), "t1");
    let b = build_dashboard(&matches, Some(&players), Some(&xg), &config(), "t1");
    assert_eq!(a, b);

    let c = build_dashboard(&matches, Some(&players), Some(&xg), &config(), "t2");
    let mut a_json = serde_json::to_value(&a).unwrap();
    let mut c_json = serde_json::to_value(&c).unwrap();
    assert_ne!(a_json["generated_at"], c_json["generated_at"]);
    a_json["generated_at"] = serde_json::Value::Null;
    c_json["generated_at"] = serde_json::Value::Null;
    assert_eq!(a_json, c_json);
}

#[test]
fn enrichment_sections_join_on_canonical_names() {
    let matches = two_full_seasons();
    let doc = build_dashboard(
        &matches,
        Some(&sample_players()),
        Some(&sample_xg()),
        &config(),
        "2026-06-01T00:00:00",
    );

    let xg_table = doc.xg_table.as_ref().unwrap();
    // xg table is sorted by xG difference and joined to real points
    assert_eq!(xg_table[0].team, "Manchester City");
    let city_points = doc
        .league_table
        .iter()
        .find(|t| t.team == "Manchester City")
        .unwrap()
        .points;
    assert_eq!(xg_table[0].actual_points, city_points);

    let boards = doc.player_leaderboards.as_ref().unwrap();
    let top = &boards.goal_scorers[0];
    assert_eq!(top.player_name, "Haaland");
    assert_eq!(top.rank, 1);
    // short FPL name matched to the Understat full name
    assert_eq!(top.xg, Some(16.4));
    // dot-form name matched through the dot-split strategy
    let bruno = boards
        .goal_scorers
        .iter()
        .find(|p| p.player_name == "B.Fernandes")
        .unwrap();
    assert_eq!(bruno.xg, Some(5.2));
    // player without an Understat row stays unenriched, not zeroed
    let welbeck = boards
        .goal_scorers
        .iter()
        .find(|p| p.player_name == "Welbeck")
        .unwrap();
    assert_eq!(welbeck.xg, None);

    let money = doc.money_vs_points.as_ref().unwrap();
    assert!(money.regression.r_squared >= 0.0 && money.regression.r_squared <= 1.0);
    for pair in money.teams.windows(2) {
        assert!(pair[0].over_under >= pair[1].over_under);
    }
    for row in &money.teams {
        let expected = money.regression.slope * row.squad_value + money.regression.intercept;
        // rounding differs slightly between the stored fit and the rounded
        // regression coefficients
        assert!((row.expected_points - expected).abs() < 0.1);
    }
}

#[test]
fn goals_by_position_counts_only_players_with_minutes() {
    let mut players = sample_players();
    players.push(PlayerRow {
        player_name: "Benchwarmer".to_string(),
        full_name: "Bench Warmer".to_string(),
        team: "Arsenal".to_string(),
        position: "FWD".to_string(),
        goals: 0,
        assists: 0,
        clean_sheets: 0,
        minutes: 0,
        yellow_cards: 0,
        red_cards: 0,
        total_points: 0,
        price: 4.0,
        bonus: 0,
    });
    let matches = two_full_seasons();
    let doc = build_dashboard(&matches, Some(&players), None, &config(), "t");
    let boards = doc.player_leaderboards.as_ref().unwrap();
    let fwd = boards
        .goals_by_position
        .iter()
        .find(|g| g.position == "FWD")
        .unwrap();
    assert_eq!(fwd.player_count, 2); // Haaland + Welbeck, not the bench player
    assert_eq!(fwd.total_goals, 23);
}
