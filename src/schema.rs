use polars::prelude::{DataFrame, DataType};
use thiserror::Error;

use crate::frame::{self, FrameError, INT_KEYS};

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("{table} (schema v{version}) is missing required columns: {}", missing.join(", "))]
    MissingColumns {
        table: &'static str,
        version: u32,
        missing: Vec<String>,
    },
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Column contract for one external or intermediate table.
#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub name: &'static str,
    pub version: u32,
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

impl TableSchema {
    pub fn missing(&self, df: &DataFrame) -> Vec<String> {
        self.required
            .iter()
            .filter(|col| !frame::has(df, col))
            .map(|col| col.to_string())
            .collect()
    }

    pub fn validate(&self, df: &DataFrame) -> Result<(), SchemaError> {
        let missing = self.missing(df);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::MissingColumns {
                table: self.name,
                version: self.version,
                missing,
            })
        }
    }

    /// Validates, then adds any absent optional column as all null.
    pub fn conform(&self, df: &mut DataFrame) -> Result<(), SchemaError> {
        self.validate(df)?;
        for col in self.optional {
            let dtype = if INT_KEYS.contains(col) { DataType::Int64 } else { DataType::Float64 };
            frame::ensure_column(df, col, &dtype)?;
        }
        Ok(())
    }
}

pub const SCHEDULES: TableSchema = TableSchema {
    name: "schedules",
    version: 1,
    required: &["game_id", "season", "week", "home_team", "away_team"],
    optional: &["game_type"],
};

pub const WEEKLY_ROSTERS: TableSchema = TableSchema {
    name: "weekly_rosters",
    version: 1,
    required: &["week", "position", "player_name", "player_id", "team", "status"],
    optional: &["season"],
};

pub const DEPTH_CHARTS: TableSchema = TableSchema {
    name: "depth_charts",
    version: 1,
    required: &[
        "season",
        "week",
        "club_code",
        "gsis_id",
        "position",
        "depth_position",
        "depth_team",
        "formation",
    ],
    optional: &["game_type", "full_name"],
};

pub const PLAY_BY_PLAY: TableSchema = TableSchema {
    name: "play_by_play",
    version: 1,
    required: &[
        "play_id",
        "game_id",
        "season",
        "week",
        "home_team",
        "away_team",
        "posteam",
        "defteam",
        "qtr",
        "play_type",
        "yardline_100",
        "game_seconds_remaining",
        "score_differential",
        "yards_gained",
        "air_yards",
        "yards_after_catch",
        "epa",
        "complete_pass",
        "incomplete_pass",
        "interception",
        "pass_attempt",
        "rush_attempt",
        "touchdown",
        "pass_touchdown",
        "rush_touchdown",
        "two_point_conv_result",
        "first_down",
        "fumble_lost",
        "fumbled_1_team",
        "fumbled_1_player_id",
        "fumbled_2_team",
        "fumbled_2_player_id",
        "passer_player_id",
        "passing_yards",
        "receiver_player_id",
        "receiving_yards",
        "rusher_player_id",
        "rushing_yards",
    ],
    optional: PARTICIPATION_COLUMNS,
};

/// Columns only present when play-by-play is fetched with participation.
pub const PARTICIPATION_COLUMNS: &[&str] = &["offense_players", "players_on_play"];

pub const NGS_RECEIVING: TableSchema = TableSchema {
    name: "ngs_receiving",
    version: 1,
    required: &["season", "week", "player_gsis_id", "team_abbr"],
    optional: &[
        "avg_cushion",
        "avg_separation",
        "avg_intended_air_yards",
        "percent_share_of_intended_air_yards",
        "avg_yac",
        "avg_expected_yac",
        "avg_yac_above_expectation",
        "catch_percentage",
    ],
};

pub const PFR_RECEIVING: TableSchema = TableSchema {
    name: "pfr_receiving",
    version: 1,
    required: &["game_id", "season", "week", "pfr_player_id"],
    optional: &[
        "receiving_broken_tackles",
        "receiving_drop",
        "receiving_drop_pct",
        "receiving_int",
        "receiving_rat",
    ],
};

pub const PLAYER_IDS: TableSchema = TableSchema {
    name: "player_ids",
    version: 1,
    required: &["gsis_id", "pfr_id", "name", "position"],
    optional: &[
        "team",
        "age",
        "height",
        "weight",
        "college",
        "draft_year",
        "draft_round",
        "draft_pick",
        "draft_ovr",
        "twitter_username",
    ],
};

pub const INJURIES: TableSchema = TableSchema {
    name: "injuries",
    version: 1,
    required: &["season", "week", "team", "gsis_id", "report_status"],
    optional: &["position"],
};

/// Per-game receiving features, one row per player-game.
pub const RECEIVING: TableSchema = TableSchema {
    name: "receiving",
    version: 1,
    required: &[
        "player_id",
        "game_id",
        "season",
        "week",
        "team",
        "opp_team",
        "position",
        "college",
        "age",
        "height",
        "weight",
        "depth_team",
        "receiving_yards",
        "avg_yac",
        "receptions",
        "receiving_touchdowns",
        "targets_1",
        "targets_2",
        "targets_3",
        "targets_4",
        "total_targets",
        "rz_targets",
        "garbage_time_fpoints",
        "receiving_fpoints",
        "avg_depth_of_target",
        "air_yards",
        "max_target_depth",
        "fumble_lost",
        "receiving_first_downs",
        "receiving_epa",
        "receiving_2pt_conversions",
        "unrealized_air_yards",
        "racr",
        "snap_count_1",
        "snap_count_2",
        "snap_count_3",
        "snap_count_4",
        "total_relevant_snaps",
        "snap_percentage_1",
        "snap_percentage_2",
        "snap_percentage_3",
        "snap_percentage",
        "target_share_1",
        "target_share_2",
        "target_share_3",
        "target_share",
        "air_yards_share",
        "wopr",
    ],
    optional: &["ESPN_projection", "player_name", "status"],
};

pub const DEF_POINTS: TableSchema = TableSchema {
    name: "def_points",
    version: 1,
    required: &[
        "game_id",
        "week",
        "defteam",
        "total_qb_fpoints_given_up",
        "total_wr_fpoints_given_up",
    ],
    optional: &[],
};

pub const DEF_INJURIES: TableSchema = TableSchema {
    name: "def_injuries",
    version: 1,
    required: &["game_id", "week", "team", "num_injured_starters"],
    optional: &[],
};

pub const QB_STATS: TableSchema = TableSchema {
    name: "qb_stats",
    version: 1,
    required: &[
        "game_id",
        "week",
        "posteam",
        "passer_player_id",
        "completions",
        "attempts",
        "passing_yards",
        "touchdowns",
        "interceptions",
        "completion_percentage",
        "yards_per_attempt",
        "td_percentage",
        "interception_percentage",
        "qb_num_snaps",
    ],
    optional: &["QBR"],
};

/// Rosters with depth, as written by ingest.
pub const ROSTERS: TableSchema = TableSchema {
    name: "rosters",
    version: 1,
    required: &[
        "game_id",
        "season",
        "week",
        "team",
        "player_id",
        "position",
        "depth_position",
        "depth_team",
    ],
    optional: &["player_name", "status"],
};

pub const GAME_BY_GAME: TableSchema = TableSchema {
    name: "game_by_game",
    version: 1,
    required: &[
        "player_id",
        "player_name",
        "team",
        "position",
        "season",
        "week",
        "receiving_yards",
        "receptions",
        "total_targets",
    ],
    optional: &[],
};

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn empty_with(columns: &[&str]) -> DataFrame {
        DataFrame::new(
            columns
                .iter()
                .map(|c| Column::new((*c).into(), Vec::<Option<f64>>::new()))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn reports_every_missing_column() {
        let df = empty_with(&["game_id", "week"]);
        let err = SCHEDULES.validate(&df).unwrap_err();
        let SchemaError::MissingColumns { table, missing, .. } = &err else {
            panic!("unexpected error {err}");
        };
        assert_eq!(*table, "schedules");
        assert_eq!(missing, &["season", "home_team", "away_team"]);
        assert!(err.to_string().contains("schema v1"));
    }

    #[test]
    fn conform_adds_optional_columns() {
        let mut df = empty_with(QB_STATS.required);
        QB_STATS.conform(&mut df).unwrap();
        assert!(frame::has(&df, "QBR"));
    }
}
