use std::path::{Path, PathBuf};

/// How FPL player data is sourced for a season: the vaastav GitHub archive
/// for completed seasons, the live FPL API for the season in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FplMode {
    Historical,
    Live,
}

#[derive(Debug, Clone, Copy)]
pub struct SeasonConfig {
    pub label: &'static str,
    /// football-data.co.uk URL path segment, e.g. "2526".
    pub code: &'static str,
    /// Understat season parameter (season start year).
    pub understat_year: &'static str,
    pub fpl_mode: FplMode,
}

pub const ACTIVE_SEASONS: &[SeasonConfig] = &[
    SeasonConfig {
        label: "2022-23",
        code: "2223",
        understat_year: "2022",
        fpl_mode: FplMode::Historical,
    },
    SeasonConfig {
        label: "2023-24",
        code: "2324",
        understat_year: "2023",
        fpl_mode: FplMode::Historical,
    },
    SeasonConfig {
        label: "2024-25",
        code: "2425",
        understat_year: "2024",
        fpl_mode: FplMode::Historical,
    },
    SeasonConfig {
        label: "2025-26",
        code: "2526",
        understat_year: "2025",
        fpl_mode: FplMode::Live,
    },
];

/// The primary season shown in the dashboard hero and league table.
pub const CURRENT_SEASON: &str = "2025-26";

pub const FPL_LIVE_API: &str = "https://fantasy.premierleague.com/api";

pub fn football_data_url(code: &str) -> String {
    format!("https://www.football-data.co.uk/mmz4281/{code}/E0.csv")
}

pub fn fpl_github_base(season: &str) -> String {
    format!(
        "https://raw.githubusercontent.com/vaastav/Fantasy-Premier-League/master/data/{season}"
    )
}

pub fn understat_league_url(year: &str) -> String {
    format!("https://understat.com/league/EPL/{year}")
}

pub fn season_config(label: &str) -> Option<&'static SeasonConfig> {
    ACTIVE_SEASONS.iter().find(|s| s.label == label)
}

pub fn current_season() -> &'static SeasonConfig {
    season_config(CURRENT_SEASON).expect("CURRENT_SEASON missing from ACTIVE_SEASONS")
}

/// Master team lists per season. Every extractor normalizes to these exact
/// strings; merges across data sources depend on this being consistent.
pub fn canonical_teams(season: &str) -> Option<&'static [&'static str]> {
    match season {
        "2022-23" => Some(&[
            "Arsenal",
            "Aston Villa",
            "Bournemouth",
            "Brentford",
            "Brighton",
            "Chelsea",
            "Crystal Palace",
            "Everton",
            "Fulham",
            "Leeds United",
            "Leicester City",
            "Liverpool",
            "Manchester City",
            "Manchester United",
            "Newcastle United",
            "Nottingham Forest",
            "Southampton",
            "Tottenham Hotspur",
            "West Ham United",
            "Wolverhampton",
        ]),
        "2023-24" => Some(&[
            "Arsenal",
            "Aston Villa",
            "Bournemouth",
            "Brentford",
            "Brighton",
            "Burnley",
            "Chelsea",
            "Crystal Palace",
            "Everton",
            "Fulham",
            "Liverpool",
            "Luton Town",
            "Manchester City",
            "Manchester United",
            "Newcastle United",
            "Nottingham Forest",
            "Sheffield United",
            "Tottenham Hotspur",
            "West Ham United",
            "Wolverhampton",
        ]),
        "2024-25" => Some(&[
            "Arsenal",
            "Aston Villa",
            "Bournemouth",
            "Brentford",
            "Brighton",
            "Chelsea",
            "Crystal Palace",
            "Everton",
            "Fulham",
            "Ipswich",
            "Leicester City",
            "Liverpool",
            "Manchester City",
            "Manchester United",
            "Newcastle United",
            "Nottingham Forest",
            "Southampton",
            "Tottenham Hotspur",
            "West Ham United",
            "Wolverhampton",
        ]),
        "2025-26" => Some(&[
            "Arsenal",
            "Aston Villa",
            "Bournemouth",
            "Brentford",
            "Brighton",
            "Burnley",
            "Chelsea",
            "Crystal Palace",
            "Everton",
            "Fulham",
            "Leeds United",
            "Liverpool",
            "Manchester City",
            "Manchester United",
            "Newcastle United",
            "Nottingham Forest",
            "Sunderland",
            "Tottenham Hotspur",
            "West Ham United",
            "Wolverhampton",
        ]),
        _ => None,
    }
}

/// football-data.co.uk uses short names and abbreviations.
pub const FOOTBALL_DATA_NAME_MAP: &[(&str, &str)] = &[
    ("Man United", "Manchester United"),
    ("Man City", "Manchester City"),
    ("Nott'm Forest", "Nottingham Forest"),
    ("Tottenham", "Tottenham Hotspur"),
    ("Newcastle", "Newcastle United"),
    ("West Ham", "West Ham United"),
    ("Wolves", "Wolverhampton"),
    ("Luton", "Luton Town"),
    ("Leicester", "Leicester City"),
    ("Sheffield United", "Sheffield United"),
    ("Leeds", "Leeds United"),
    ("Sunderland", "Sunderland"),
];

/// FPL uses its own short forms.
pub const FPL_NAME_MAP: &[(&str, &str)] = &[
    ("Man Utd", "Manchester United"),
    ("Man City", "Manchester City"),
    ("Nott'm Forest", "Nottingham Forest"),
    ("Spurs", "Tottenham Hotspur"),
    ("Newcastle", "Newcastle United"),
    ("West Ham", "West Ham United"),
    ("Wolves", "Wolverhampton"),
    ("Luton", "Luton Town"),
    ("Leicester", "Leicester City"),
    ("Sheffield Utd", "Sheffield United"),
    ("Leeds", "Leeds United"),
];

/// Understat uses full names but with inconsistent spacing/suffixes.
pub const UNDERSTAT_NAME_MAP: &[(&str, &str)] = &[
    ("Manchester United", "Manchester United"),
    ("Manchester City", "Manchester City"),
    ("Nottingham Forest", "Nottingham Forest"),
    ("Tottenham", "Tottenham Hotspur"),
    ("Newcastle United", "Newcastle United"),
    ("West Ham", "West Ham United"),
    ("Wolverhampton Wanderers", "Wolverhampton"),
    ("Luton Town", "Luton Town"),
    ("Leicester City", "Leicester City"),
    ("Leicester", "Leicester City"),
    ("Sheffield United", "Sheffield United"),
    ("Leeds United", "Leeds United"),
    ("Leeds", "Leeds United"),
];

/// Rewrite a source team name to its canonical form. Names absent from the
/// map pass through unchanged.
pub fn map_team_name<'a>(map: &[(&str, &'static str)], name: &'a str) -> &'a str {
    for (from, to) in map {
        if *from == name {
            return to;
        }
    }
    name
}

/// Understat team names arrive with underscores in place of spaces.
pub fn normalize_understat_team(name: &str) -> String {
    let clean = name.replace('_', " ");
    map_team_name(UNDERSTAT_NAME_MAP, &clean).to_string()
}

/// Immutable run configuration, built once per process and passed into every
/// stage entry point.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub seasons: &'static [SeasonConfig],
    pub current_season: &'static str,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("EPL_DATA_DIR")
            .ok()
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));
        Self::with_data_dir(data_dir)
    }

    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            seasons: ACTIVE_SEASONS,
            current_season: CURRENT_SEASON,
        }
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn cleaned_dir(&self) -> PathBuf {
        self.data_dir.join("cleaned")
    }

    pub fn matches_clean_path(&self) -> PathBuf {
        self.cleaned_dir().join("matches_clean.csv")
    }

    pub fn players_path(&self) -> PathBuf {
        self.cleaned_dir().join("players.csv")
    }

    pub fn fixtures_path(&self) -> PathBuf {
        self.cleaned_dir().join("fixtures_detailed.csv")
    }

    pub fn xg_matches_path(&self) -> PathBuf {
        self.cleaned_dir().join("xg_matches.csv")
    }

    pub fn xg_teams_path(&self) -> PathBuf {
        self.cleaned_dir().join("xg_teams.csv")
    }

    pub fn xg_players_path(&self) -> PathBuf {
        self.cleaned_dir().join("xg_players.csv")
    }

    pub fn dashboard_output_path(&self) -> PathBuf {
        self.data_dir.join("dashboard_data.json")
    }

    pub fn current_season_config(&self) -> &'static SeasonConfig {
        season_config(self.current_season).expect("current season missing from season table")
    }
}

pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_active_season_has_a_canonical_team_list() {
        for season in ACTIVE_SEASONS {
            let teams = canonical_teams(season.label)
                .unwrap_or_else(|| panic!("no team list for {}", season.label));
            assert_eq!(teams.len(), 20, "{} should list 20 clubs", season.label);
        }
    }

    #[test]
    fn current_season_is_active() {
        assert_eq!(current_season().label, CURRENT_SEASON);
        assert_eq!(current_season().fpl_mode, FplMode::Live);
    }

    #[test]
    fn football_data_map_targets_are_canonical() {
        let teams = canonical_teams(CURRENT_SEASON).unwrap();
        for (from, to) in FOOTBALL_DATA_NAME_MAP {
            // Mapped values must be canonical somewhere, though not every
            // mapped club plays in every season.
            let known = ACTIVE_SEASONS.iter().any(|s| {
                canonical_teams(s.label)
                    .map(|list| list.contains(to))
                    .unwrap_or(false)
            });
            assert!(known, "{from} maps to unknown club {to}");
        }
        assert!(teams.contains(&"Arsenal"));
    }

    #[test]
    fn mapping_is_idempotent() {
        for (from, _) in FOOTBALL_DATA_NAME_MAP {
            let once = map_team_name(FOOTBALL_DATA_NAME_MAP, from);
            let twice = map_team_name(FOOTBALL_DATA_NAME_MAP, once);
            assert_eq!(once, twice);
        }
        for (from, _) in FPL_NAME_MAP {
            let once = map_team_name(FPL_NAME_MAP, from);
            assert_eq!(once, map_team_name(FPL_NAME_MAP, once));
        }
    }

    #[test]
    fn unknown_names_pass_through() {
        assert_eq!(map_team_name(FPL_NAME_MAP, "Arsenal"), "Arsenal");
        assert_eq!(normalize_understat_team("Crystal_Palace"), "Crystal Palace");
        assert_eq!(
            normalize_understat_team("Wolverhampton_Wanderers"),
            "Wolverhampton"
        );
    }

    #[test]
    fn data_dir_paths_nest_under_root() {
        let config = PipelineConfig::with_data_dir("/tmp/epl");
        assert_eq!(config.raw_dir(), PathBuf::from("/tmp/epl/raw"));
        assert_eq!(
            config.matches_clean_path(),
            PathBuf::from("/tmp/epl/cleaned/matches_clean.csv")
        );
        assert_eq!(
            config.dashboard_output_path(),
            PathBuf::from("/tmp/epl/dashboard_data.json")
        );
    }
}
