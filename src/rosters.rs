use anyhow::{Context, Result};
use polars::prelude::*;
use tracing::info;

use crate::frame;
use crate::game_key::GameKeyIndex;
use crate::provider::StatsSource;
use crate::teams::{COMPOSITE_COLUMNS, TEAM_COLUMNS, TeamCodeMap};

const ROSTER_COLUMNS: &[&str] = &["week", "position", "player_name", "player_id", "team", "status"];

/// Depth used for players missing from the depth chart.
pub const UNLISTED_DEPTH: f64 = 4.0;

/// The regular season grew to 18 weeks in 2021.
pub fn last_regular_week(season: i32) -> i64 {
    if season < 2021 { 17 } else { 18 }
}

/// Weekly active rosters keyed by game, with each player's offensive depth.
pub fn get_rosters(source: &dyn StatsSource, years: &[i32], teams: &TeamCodeMap) -> Result<DataFrame> {
    let rosters = load_weekly(source, years, teams)?;

    let mut schedule = source.import_schedules(years)?;
    teams.normalize_table(&mut schedule, TEAM_COLUMNS, COMPOSITE_COLUMNS)?;
    let games = GameKeyIndex::from_schedule(&schedule)?;

    let depth = offense_depth(source, years, teams, &games)?;
    assemble(&rosters, &depth, &games)
}

pub fn load_weekly(source: &dyn StatsSource, years: &[i32], teams: &TeamCodeMap) -> Result<DataFrame> {
    // the roster endpoint only answers one season per request
    let mut parts = Vec::with_capacity(years.len());
    for &year in years {
        let raw = source
            .import_weekly_rosters(year)
            .with_context(|| format!("weekly rosters {year}"))?;
        let roster = raw
            .select(ROSTER_COLUMNS.iter().copied())?
            .lazy()
            .with_columns([
                col("week").cast(DataType::Int64),
                lit(year as i64).alias("season"),
            ])
            .filter(col("week").lt_eq(lit(last_regular_week(year))))
            .collect()?;
        parts.push(roster);
    }
    let mut rosters = frame::concat(parts)?;
    teams.normalize_table(&mut rosters, TEAM_COLUMNS, COMPOSITE_COLUMNS)?;
    Ok(rosters)
}

/// Offensive depth chart rows with `game_id` attached and `club_code`
/// renamed to `team`.
pub fn offense_depth(
    source: &dyn StatsSource,
    years: &[i32],
    teams: &TeamCodeMap,
    games: &GameKeyIndex,
) -> Result<DataFrame> {
    let mut depth = source.import_depth_charts(years)?;
    prepare_depth(&mut depth, teams)?;
    let offense = depth
        .lazy()
        .filter(col("formation").cast(DataType::String).eq(lit("Offense")))
        .collect()?;
    keyed_depth(&offense, games)
}

pub fn keyed_depth(depth: &DataFrame, games: &GameKeyIndex) -> Result<DataFrame> {
    let mut depth = games.attach(depth, "week", "club_code", "season")?;
    frame::rename_present(&mut depth, &[("club_code", "team")])?;
    Ok(depth)
}

/// Unlisted depth becomes 4; a blank depth position falls back to the
/// listed position.
pub fn prepare_depth(depth: &mut DataFrame, teams: &TeamCodeMap) -> Result<()> {
    let positions = frame::texts(depth, "position")?;
    let depth_positions: Vec<Option<String>> = frame::texts(depth, "depth_position")?
        .into_iter()
        .zip(positions)
        .map(|(listed, position)| match listed {
            Some(p) if !p.trim().is_empty() => Some(p),
            _ => position,
        })
        .collect();
    depth.with_column(Series::new("depth_position".into(), depth_positions))?;
    *depth = depth
        .clone()
        .lazy()
        .with_column(
            col("depth_team")
                .cast(DataType::Float64)
                .fill_null(lit(UNLISTED_DEPTH)),
        )
        .collect()?;
    teams.normalize_table(depth, TEAM_COLUMNS, COMPOSITE_COLUMNS)?;
    Ok(())
}

/// Joins rosters to depth charts. Both inputs must already carry normalized
/// team codes; `depth` must carry `game_id`.
pub fn assemble(rosters: &DataFrame, depth: &DataFrame, games: &GameKeyIndex) -> Result<DataFrame> {
    let rosters = games
        .attach(rosters, "week", "team", "season")?
        .lazy()
        .filter(
            frame::any_of("status", &["ACT", "RES"]).and(col("week").lt_eq(lit(18i64))),
        )
        .collect()?;
    // ACT sorts ahead of RES
    let rosters = frame::sort_asc(&rosters, &["game_id", "player_id", "status"])?;
    let rosters = frame::dedup_by(&rosters, &["game_id", "player_id", "status"])?;

    let mut slim = depth.select(["position", "depth_position", "depth_team", "game_id", "gsis_id"])?;
    frame::rename_present(&mut slim, &[("gsis_id", "player_id"), ("position", "dc_position")])?;
    let joined = frame::join(&rosters, &slim, &["game_id", "player_id"], &["game_id", "player_id"], JoinType::Left)?
        .lazy()
        .with_columns([
            col("depth_position")
                .cast(DataType::String)
                .fill_null(col("position").cast(DataType::String)),
            col("depth_team").cast(DataType::Float64).fill_null(lit(UNLISTED_DEPTH)),
        ])
        .collect()?;
    let out = frame::sort_asc(&joined, &["game_id", "team", "position", "depth_team", "player_id"])?;
    info!(rows = out.height(), "rosters assembled");
    Ok(out)
}
