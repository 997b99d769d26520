use epl_dashboard::config::{CURRENT_SEASON, canonical_teams};
use epl_dashboard::match_dataset::{CleanMatch, clean_season_csv, load_clean_matches};

const HEADER: &str = "Div,Date,Time,HomeTeam,AwayTeam,FTHG,FTAG,FTR,HTHG,HTAG,HTR,Referee,HS,AS,HST,AST,HF,AF,HC,AC,HY,AY,HR,AR,B365H,B365D,B365A";

fn sample_raw() -> String {
    let rows = [
        "E0,15/08/2025,20:00,Liverpool,Bournemouth,4,2,H,1,1,D,A Taylor ,18,9,8,4,10,12,7,3,1,2,0,0,1.3,5.5,9.0",
        "E0,16/08/2025,12:30,Aston Villa,Newcastle,0,0,D,0,0,D,C Pawson,12,14,3,5,11,13,5,6,2,3,1,0,2.9,3.2,2.6",
        "E0,16/08/2025,15:00,Tottenham,Burnley,3,0,H,2,0,H, J Gillett,22,6,9,2,8,10,9,2,0,1,0,0,1.4,4.8,8.0",
        "E0,17/08/25,14:00,Man United,Arsenal,0,1,A,0,0,D,M Oliver,11,15,4,6,12,9,4,7,3,2,0,0,3.4,3.3,2.2",
        // unparsable date: dropped
        "E0,????,15:00,Chelsea,Fulham,2,0,H,1,0,H,S Hooper,16,8,7,3,9,11,6,4,1,1,0,0,1.6,4.0,6.0",
        // null home goals: dropped
        "E0,18/08/2025,15:00,Wolves,Everton,,1,A,0,1,A,T Bramall,9,12,2,5,13,10,3,6,2,2,0,0,3.1,3.2,2.4",
    ];
    let mut out = String::from("\u{feff}");
    out.push_str(HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(row);
        out.push('\n');
    }
    out
}

#[test]
fn cleaned_rows_satisfy_schema_invariants() {
    let (rows, counts) = clean_season_csv(&sample_raw(), CURRENT_SEASON).unwrap();
    assert_eq!(counts.rows_raw, 6);
    assert_eq!(counts.dropped_bad_dates, 1);
    assert_eq!(counts.dropped_null_goals, 1);
    assert_eq!(rows.len(), 4);

    let teams = canonical_teams(CURRENT_SEASON).unwrap();
    for row in &rows {
        // ISO date: YYYY-MM-DD
        assert_eq!(row.date.len(), 10);
        assert!(row.date.as_bytes()[4] == b'-' && row.date.as_bytes()[7] == b'-');
        assert!(row.date.starts_with("2025-"));
        // referee is trimmed and never empty
        assert_eq!(row.referee, row.referee.trim());
        assert!(!row.referee.is_empty());
        // every emitted team name is canonical for the season
        assert!(teams.contains(&row.home_team.as_str()), "{}", row.home_team);
        assert!(teams.contains(&row.away_team.as_str()), "{}", row.away_team);
        // derived sums are consistent
        assert_eq!(row.total_goals, row.home_goals + row.away_goals);
        assert_eq!(row.total_shots, row.home_shots + row.away_shots);
    }

    // two-digit year form lands on the same ISO shape
    assert!(rows.iter().any(|r| r.date == "2025-08-17"));
}

#[test]
fn cleaned_table_round_trips_through_csv() {
    let (mut rows, _) = clean_season_csv(&sample_raw(), CURRENT_SEASON).unwrap();
    for (i, row) in rows.iter_mut().enumerate() {
        row.match_id = (i + 1) as u32;
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("matches_clean.csv");
    let mut writer = csv::Writer::from_path(&path).unwrap();
    for row in &rows {
        writer.serialize(row).unwrap();
    }
    writer.flush().unwrap();
    drop(writer);

    let reloaded: Vec<CleanMatch> = load_clean_matches(&path).unwrap();
    assert_eq!(reloaded, rows);
}
