use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::*;
use tracing::info;

use crate::config::{DataFiles, PipelineConfig};
use crate::frame;
use crate::impute::{self, FallbackImputer, ImputeReport};
use crate::qb::{self, QbFillReport};
use crate::rolling::{self, RollingWindow, TARGET_WEEK};
use crate::schema::{self, TableSchema};
use crate::table_io;
use crate::teams::{COMPOSITE_COLUMNS, TEAM_COLUMNS, TeamCodeMap};
use crate::top_n::TopNFilter;

/// Mostly-empty columns dropped before imputation.
pub const DROP_COLUMNS: &[&str] = &[
    "avg_cushion",
    "avg_separation",
    "twitter_username",
    "receiving_drop",
    "receiving_broken_tackles",
    "receiving_rat",
    "receiving_int",
    "receiving_drop_pct",
    "draft_year",
    "draft_round",
    "draft_pick",
    "draft_ovr",
    "target_share_4",
    "snap_percentage_4",
];

/// Columns averaged over the trailing window.
pub const LAG_COLUMNS: &[&str] = &[
    "player_id",
    "game_id",
    "receiving_yards",
    "avg_yac",
    "receptions",
    "receiving_touchdowns",
    "season",
    "week",
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
];

/// Columns taken from the current week as-is.
pub const NON_LAG_COLUMNS: &[&str] = &[
    "player_id",
    "game_id",
    "team",
    "week",
    "season",
    "position",
    "receiving_fpoints",
    "age",
    "height",
    "weight",
    "depth_team",
    "opp_team",
    "ESPN_projection",
];

pub const NON_NUMERIC: &[&str] = &[
    "player_id",
    "game_id",
    "status",
    "position",
    "player_name",
    "team",
    "twitter_username",
    "college",
    "opp_team",
];

pub const PAST_POINTS: &str = "past_fpoints";

const DEF_FEATURES: &[&str] = &["total_qb_fpoints_given_up", "total_wr_fpoints_given_up"];

/// The ingested CSVs, schema-checked and team-normalized.
#[derive(Debug, Clone)]
pub struct RawInputs {
    pub receiving: DataFrame,
    pub def_points: DataFrame,
    pub def_injuries: DataFrame,
    pub qb_stats: DataFrame,
    pub rosters: DataFrame,
}

impl RawInputs {
    pub fn read(data_dir: &Path, files: &DataFiles) -> Result<Self> {
        let teams = TeamCodeMap::common();
        let load = |file: &str, schema: &TableSchema| -> Result<DataFrame> {
            let path = data_dir.join(file);
            let mut df = table_io::read_csv(&path)?;
            schema
                .conform(&mut df)
                .with_context(|| format!("validate {}", path.display()))?;
            teams.normalize_table(&mut df, TEAM_COLUMNS, COMPOSITE_COLUMNS)?;
            Ok(df)
        };
        let inputs = Self {
            receiving: load(&files.receiving, &schema::RECEIVING)?,
            def_points: load(&files.def_points, &schema::DEF_POINTS)?,
            def_injuries: load(&files.def_injuries, &schema::DEF_INJURIES)?,
            qb_stats: load(&files.qb_stats, &schema::QB_STATS)?,
            rosters: load(&files.rosters, &schema::ROSTERS)?,
        };
        info!(
            receiving = inputs.receiving.height(),
            def_points = inputs.def_points.height(),
            def_injuries = inputs.def_injuries.height(),
            qb_stats = inputs.qb_stats.height(),
            rosters = inputs.rosters.height(),
            "prepare inputs read"
        );
        Ok(inputs)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PrepareReport {
    pub cleaned_rows: usize,
    pub top_n_rows: usize,
    pub windowed_rows: usize,
    pub imputed: ImputeReport,
    pub qb_fill: QbFillReport,
}

/// Turns per-game receiving lines into a windowed training set.
#[derive(Debug, Clone)]
pub struct PrepData {
    window: usize,
    top_n: usize,
    position: String,
}

impl PrepData {
    pub fn new(window: usize, top_n: usize) -> Self {
        Self {
            window: window.max(1),
            top_n,
            position: "WR".to_string(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.window, config.top_n).position(&config.position)
    }

    pub fn position(mut self, position: &str) -> Self {
        self.position = position.to_string();
        self
    }

    /// Position subset, sparse-column drop, college filter, infinities to
    /// zero, depth backfill, then fallback imputation of the numeric columns.
    pub fn clean_receiving(&self, receiving: &DataFrame) -> Result<(DataFrame, ImputeReport)> {
        frame::require(receiving, "college")?;
        let subset = receiving
            .clone()
            .lazy()
            .filter(
                col("position")
                    .cast(DataType::String)
                    .eq(lit(self.position.as_str()))
                    .and(col("college").is_not_null()),
            )
            .collect()?;
        let mut stats = frame::drop_present(&subset, DROP_COLUMNS);
        let infinities = frame::replace_infinite(&mut stats, 0.0)?;

        impute::fill_group_mode(&mut stats, "depth_team", &["player_id", "season"])?;
        impute::fill_with_max(&mut stats, "depth_team")?;

        let mut exclude = vec!["ESPN_projection", "week"];
        exclude.extend_from_slice(NON_NUMERIC);
        let columns = frame::names(&stats);
        let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
        let report = FallbackImputer::new("player_id", "season")
            .exclude(&exclude)
            .league_wide(true)
            .impute(&mut stats, &columns)?;
        info!(
            rows = stats.height(),
            dropped_columns = DROP_COLUMNS.len(),
            infinities,
            filled = report.filled(),
            "receiving cleaned"
        );
        Ok((stats, report))
    }

    pub fn top_n(&self, stats: &DataFrame) -> Result<DataFrame> {
        TopNFilter::new(self.top_n, self.window).apply(stats)
    }

    /// Current-week columns joined to the latest earlier window of each
    /// player's lag columns. Rows without a complete window are dropped.
    pub fn window_data(&self, stats: &DataFrame) -> Result<DataFrame> {
        let current = frame::select_present(stats, NON_LAG_COLUMNS)?;
        let features: Vec<&str> = LAG_COLUMNS
            .iter()
            .copied()
            .filter(|c| !matches!(*c, "player_id" | "game_id" | "season" | "week"))
            .filter(|c| frame::has(stats, c))
            .collect();

        let rolling = RollingWindow::new(&["player_id"], self.window);
        let mut windows = rolling.means(stats, &features)?;
        frame::rename_present(&mut windows, &[("receiving_fpoints", PAST_POINTS)])?;
        let aligned = rolling.align(&windows, &current)?;
        info!(rows = current.height(), "dataset before windowing");

        let windowed = frame::join(
            &current,
            &aligned,
            &["player_id", rolling::SEASON, rolling::WEEK],
            &["player_id", rolling::SEASON, TARGET_WEEK],
            JoinType::Inner,
        )?;
        let window_columns: Vec<String> = frame::names(&windows)
            .into_iter()
            .filter(|c| frame::has(&windowed, c))
            .collect();
        let window_columns: Vec<&str> = window_columns.iter().map(String::as_str).collect();
        let windowed = windowed
            .lazy()
            .filter(frame::all_present(&window_columns))
            .collect()?;
        info!(rows = windowed.height(), "dataset after windowing");
        Ok(windowed)
    }

    /// Opponent defense windows, opponent injured starters, and the starting
    /// quarterback's passing history with its fallback backfill.
    pub fn add_external_stats(&self, windowed: &DataFrame, inputs: &RawInputs) -> Result<(DataFrame, QbFillReport)> {
        let mut def_points = inputs.def_points.clone();
        season_from_game_id(&mut def_points)?;
        frame::rename_present(&mut def_points, &[("defteam", "team")])?;
        let def_points = frame::sort_asc(&def_points, &["team", "season", "week"])?;

        let mut def_injuries = inputs.def_injuries.clone();
        season_from_game_id(&mut def_injuries)?;

        let mut qb_stats = inputs.qb_stats.clone();
        season_from_game_id(&mut qb_stats)?;
        let qb_stats = frame::sort_asc(&qb_stats, &["posteam", "passer_player_id", "season", "week"])?;

        // a defense's window feeds its own next game
        let defense = RollingWindow::new(&["team"], self.window);
        let def_windows = defense.means(&def_points, DEF_FEATURES)?;
        let def_windows = defense.align(&def_windows, &def_points)?;
        let mut slim_columns = vec![TARGET_WEEK, "season", "team"];
        slim_columns.extend_from_slice(DEF_FEATURES);
        let def_slim = def_windows.select(slim_columns)?;
        let mut out = frame::join(
            windowed,
            &def_slim,
            &["opp_team", "week", "season"],
            &["team", TARGET_WEEK, "season"],
            JoinType::Left,
        )?;

        let mut injuries = def_injuries.select(["week", "season", "team", "num_injured_starters"])?;
        frame::rename_present(&mut injuries, &[("num_injured_starters", "def_inj_starters")])?;
        out = frame::join(
            &out,
            &injuries,
            &["opp_team", "week", "season"],
            &["team", "week", "season"],
            JoinType::Left,
        )?;

        let mut starters = qb::starters(&inputs.rosters)?;
        qb::flag_new_starters(&mut starters)?;
        let history = qb::attach_history(&starters, &qb_stats, self.window)?;
        let mut qb_columns = vec!["team".to_string(), "game_id".to_string(), qb::QB_ID.to_string()];
        qb_columns.push(qb::NEW_STARTER.to_string());
        qb_columns.extend(qb::available_features(&qb_stats).iter().map(|f| qb::history_column(f)));
        let history = history.select(qb_columns)?;
        out = frame::join(&out, &history, &["game_id", "team"], &["game_id", "team"], JoinType::Left)?;

        let qb_fill = qb::fill_missing_history(&mut out, &qb_stats)?;
        Ok((out, qb_fill))
    }

    pub fn run(&self, inputs: &RawInputs) -> Result<(DataFrame, PrepareReport)> {
        let (cleaned, imputed) = self.clean_receiving(&inputs.receiving)?;
        let top = self.top_n(&cleaned)?;
        let windowed = self.window_data(&top)?;
        let (out, qb_fill) = self.add_external_stats(&windowed, inputs)?;
        let report = PrepareReport {
            cleaned_rows: cleaned.height(),
            top_n_rows: top.height(),
            windowed_rows: out.height(),
            imputed,
            qb_fill,
        };
        Ok((out, report))
    }
}

pub fn write_windowed(df: &DataFrame, config: &PipelineConfig) -> Result<()> {
    let path = config.data_path(&config.windowed_output);
    table_io::write_csv(df, &path)?;
    table_io::write_xlsx(df, &path.with_extension("xlsx"), "windowed")?;
    info!(path = %path.display(), rows = df.height(), "windowed set written");
    Ok(())
}

/// Sets `season` from the first four characters of `game_id`.
pub fn season_from_game_id(df: &mut DataFrame) -> Result<()> {
    let seasons: Vec<Option<i64>> = frame::texts(df, "game_id")?
        .into_iter()
        .map(|id| id.and_then(|id| id.get(..4).and_then(|year| year.parse().ok())))
        .collect();
    df.with_column(Series::new("season".into(), seasons))?;
    Ok(())
}
