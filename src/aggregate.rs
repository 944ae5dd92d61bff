use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use polars::prelude::*;
use tracing::info;

use crate::frame;
use crate::game_key::GameKeyIndex;
use crate::scoring::{ReceivingLine, Scoring, passing_points};

const QUARTERS: usize = 4;
const RED_ZONE_YARDLINE: f64 = 20.0;

/// Fourth-quarter score margin at which production counts as garbage time.
pub const GARBAGE_TIME_MARGIN: f64 = 17.0;

/// Injury report statuses that keep a player out of the game.
pub const INACTIVE_STATUSES: &[&str] = &["Out", "Doubtful"];

const ROSTER_COLUMNS: &[&str] = &["player_id", "game_id", "position", "player_name", "status", "depth_team"];

const ID_COLUMNS: &[&str] = &[
    "gsis_id",
    "college",
    "age",
    "height",
    "weight",
    "draft_year",
    "draft_round",
    "draft_pick",
    "draft_ovr",
    "twitter_username",
];

// avg_yac is computed from play-by-play, not taken from next-gen stats
const NGS_COLUMNS: &[&str] = &[
    "player_id",
    "game_id",
    "avg_cushion",
    "avg_separation",
    "avg_intended_air_yards",
    "percent_share_of_intended_air_yards",
    "avg_expected_yac",
    "avg_yac_above_expectation",
    "catch_percentage",
];

const PFR_COLUMNS: &[&str] = &[
    "player_id",
    "game_id",
    "receiving_broken_tackles",
    "receiving_drop",
    "receiving_drop_pct",
    "receiving_int",
    "receiving_rat",
];

type TeamGameKey = (String, String);
type PlayerGameKey = (String, String, String);

const PLAY_TEXT_COLUMNS: &[&str] = &[
    "game_id",
    "posteam",
    "defteam",
    "play_type",
    "two_point_conv_result",
    "receiver_player_id",
    "offense_players",
];

const PLAY_NUM_COLUMNS: &[&str] = &[
    "qtr",
    "score_differential",
    "is_two_point_conversion",
    "complete_pass",
    "pass_touchdown",
    "receiving_yards",
    "receiver_fumble_lost",
    "yards_after_catch",
    "first_down",
    "yardline_100",
    "air_yards",
    "epa",
];

/// Play-by-play columns pulled out once for the per-play loops. Absent
/// columns read as null.
struct Plays {
    len: usize,
    season: Vec<Option<i64>>,
    week: Vec<Option<i64>>,
    text: HashMap<&'static str, Vec<Option<String>>>,
    num: HashMap<&'static str, Vec<Option<f64>>>,
}

impl Plays {
    fn from_frame(pbp: &DataFrame) -> Result<Self> {
        let mut text = HashMap::with_capacity(PLAY_TEXT_COLUMNS.len());
        for &name in PLAY_TEXT_COLUMNS {
            text.insert(name, frame::texts_or_null(pbp, name)?);
        }
        let mut num = HashMap::with_capacity(PLAY_NUM_COLUMNS.len());
        for &name in PLAY_NUM_COLUMNS {
            num.insert(name, frame::floats_or_null(pbp, name)?);
        }
        let ints = |name: &str| -> Result<Vec<Option<i64>>> {
            if frame::has(pbp, name) {
                Ok(frame::ints(pbp, name)?)
            } else {
                Ok(vec![None; pbp.height()])
            }
        };
        Ok(Self {
            len: pbp.height(),
            season: ints("season")?,
            week: ints("week")?,
            text,
            num,
        })
    }

    fn rows(&self) -> impl Iterator<Item = Play<'_>> {
        (0..self.len).map(move |r| Play { plays: self, r })
    }
}

#[derive(Clone, Copy)]
struct Play<'a> {
    plays: &'a Plays,
    r: usize,
}

impl<'a> Play<'a> {
    fn num(&self, col: &str) -> Option<f64> {
        self.plays.num.get(col).and_then(|values| values[self.r])
    }

    fn text(&self, col: &str) -> Option<&'a str> {
        self.plays
            .text
            .get(col)
            .and_then(|values| values[self.r].as_deref())
    }

    fn flag(&self, col: &str) -> bool {
        self.num(col).is_some_and(|v| v == 1.0)
    }

    fn value(&self, col: &str) -> f64 {
        self.num(col).unwrap_or(0.0)
    }

    /// Zero-based quarter; overtime counts toward the fourth.
    fn quarter_slot(&self) -> Option<usize> {
        self.num("qtr").map(|q| (q.max(1.0) as usize).min(QUARTERS) - 1)
    }

    fn is_two_point_attempt(&self) -> bool {
        self.text("two_point_conv_result").is_some()
    }

    fn is_garbage_time(&self) -> bool {
        self.num("qtr").is_some_and(|q| q >= QUARTERS as f64)
            && self
                .num("score_differential")
                .is_some_and(|diff| diff.abs() >= GARBAGE_TIME_MARGIN)
    }

    fn is_scrimmage_snap(&self) -> bool {
        matches!(self.text("play_type"), Some("pass") | Some("run")) && !self.is_two_point_attempt()
    }

    fn team_game_key(&self) -> Option<TeamGameKey> {
        Some((self.text("game_id")?.to_string(), self.text("posteam")?.to_string()))
    }
}

fn known(v: f64) -> Option<f64> {
    (!v.is_nan()).then_some(v)
}

fn ratio(num: f64, den: f64) -> Option<f64> {
    known(num / den)
}

#[derive(Debug, Default)]
struct TeamSnaps {
    by_quarter: [f64; QUARTERS],
    participation: bool,
}

/// Offensive snaps on scrimmage plays, from the participation lists.
#[derive(Debug, Default)]
struct SnapCounts {
    teams: HashMap<TeamGameKey, TeamSnaps>,
    players: HashMap<PlayerGameKey, [f64; QUARTERS]>,
}

impl SnapCounts {
    fn from_plays(plays: &Plays) -> Self {
        let mut counts = Self::default();
        for row in plays.rows() {
            if !row.is_scrimmage_snap() {
                continue;
            }
            let (Some((game, team)), Some(q)) = (row.team_game_key(), row.quarter_slot()) else {
                continue;
            };
            let on_field: Vec<&str> = match row.text("offense_players") {
                Some(raw) => raw.split(';').map(str::trim).filter(|p| !p.is_empty()).collect(),
                None => Vec::new(),
            };
            let team_snaps = counts.teams.entry((game.clone(), team.clone())).or_default();
            team_snaps.by_quarter[q] += 1.0;
            if on_field.is_empty() {
                continue;
            }
            team_snaps.participation = true;
            for player in on_field {
                counts
                    .players
                    .entry((game.clone(), team.clone(), player.to_string()))
                    .or_default()[q] += 1.0;
            }
        }
        counts
    }

    /// `None` when the team-game has no participation data at all.
    fn team(&self, game: &str, team: &str) -> Option<[f64; QUARTERS]> {
        self.teams
            .get(&(game.to_string(), team.to_string()))
            .filter(|snaps| snaps.participation)
            .map(|snaps| snaps.by_quarter)
    }

    fn player(&self, game: &str, team: &str, player: &str) -> Option<[f64; QUARTERS]> {
        self.team(game, team)?;
        Some(
            self.players
                .get(&(game.to_string(), team.to_string(), player.to_string()))
                .copied()
                .unwrap_or_default(),
        )
    }
}

#[derive(Debug, Clone, Default)]
struct GameContext {
    season: Option<i64>,
    week: Option<i64>,
    opponent: Option<String>,
}

impl GameContext {
    fn from_row(row: &Play<'_>) -> Self {
        Self {
            season: row.plays.season[row.r],
            week: row.plays.week[row.r],
            opponent: row.text("defteam").map(str::to_string),
        }
    }
}

#[derive(Debug, Default)]
struct TeamTargets {
    context: GameContext,
    by_quarter: [f64; QUARTERS],
    air_yards: f64,
}

#[derive(Debug, Default)]
struct ReceiverGame {
    targets: [f64; QUARTERS],
    receptions: f64,
    yards: f64,
    touchdowns: f64,
    rz_targets: f64,
    air_yards: f64,
    depth_targets: f64,
    max_depth: Option<f64>,
    unrealized_air_yards: f64,
    yac: f64,
    yac_catches: f64,
    first_downs: f64,
    epa: f64,
    two_point_conversions: f64,
    fumbles_lost: f64,
    garbage_fpoints: f64,
}

impl ReceiverGame {
    fn total_targets(&self) -> f64 {
        self.targets.iter().sum()
    }

    fn line(&self) -> ReceivingLine {
        ReceivingLine {
            yards: self.yards,
            receptions: self.receptions,
            touchdowns: self.touchdowns,
            two_point_conversions: self.two_point_conversions,
            fumbles_lost: self.fumbles_lost,
        }
    }
}

/// Output columns of [`receiving`], in order.
pub const RECEIVING_COLUMNS: &[&str] = &[
    "player_id",
    "game_id",
    "season",
    "week",
    "team",
    "opp_team",
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
    "snap_percentage_4",
    "snap_percentage",
    "target_share_1",
    "target_share_2",
    "target_share_3",
    "target_share_4",
    "target_share",
    "air_yards_share",
    "wopr",
];

/// Per player-game receiving lines from cleaned play-by-play. Expects the
/// `is_two_point_conversion` and `receiver_fumble_lost` columns added during
/// cleaning. Only players with at least one target or two-point try appear.
pub fn receiving(pbp: &DataFrame, scoring: &Scoring) -> Result<DataFrame> {
    let plays = Plays::from_frame(pbp)?;
    let snaps = SnapCounts::from_plays(&plays);
    let mut teams: HashMap<TeamGameKey, TeamTargets> = HashMap::new();
    let mut receivers: BTreeMap<PlayerGameKey, ReceiverGame> = BTreeMap::new();

    for row in plays.rows() {
        let Some((game, team)) = row.team_game_key() else {
            continue;
        };
        let Some(receiver) = row.text("receiver_player_id") else {
            continue;
        };
        let team_targets = teams
            .entry((game.clone(), team.clone()))
            .or_insert_with(|| TeamTargets {
                context: GameContext::from_row(&row),
                ..TeamTargets::default()
            });
        let line = receivers
            .entry((game, team, receiver.to_string()))
            .or_default();

        if row.is_two_point_attempt() {
            if row.flag("is_two_point_conversion") {
                line.two_point_conversions += 1.0;
                if row.is_garbage_time() {
                    line.garbage_fpoints += scoring.two_point_conversion_points;
                }
            }
            continue;
        }
        if row.text("play_type") != Some("pass") {
            continue;
        }

        let q = row.quarter_slot().unwrap_or(0);
        line.targets[q] += 1.0;
        team_targets.by_quarter[q] += 1.0;

        let complete = row.flag("complete_pass");
        let mut play = ReceivingLine {
            fumbles_lost: row.value("receiver_fumble_lost"),
            ..ReceivingLine::default()
        };
        if complete {
            play.receptions = 1.0;
            play.yards = row.value("receiving_yards");
            if row.flag("pass_touchdown") {
                play.touchdowns = 1.0;
            }
            if let Some(yac) = row.num("yards_after_catch") {
                line.yac += yac;
                line.yac_catches += 1.0;
            }
            if row.flag("first_down") {
                line.first_downs += 1.0;
            }
        }
        line.receptions += play.receptions;
        line.yards += play.yards;
        line.touchdowns += play.touchdowns;
        line.fumbles_lost += play.fumbles_lost;
        if row.is_garbage_time() {
            line.garbage_fpoints += scoring.receiving(&play);
        }

        if row.num("yardline_100").is_some_and(|y| y <= RED_ZONE_YARDLINE) {
            line.rz_targets += 1.0;
        }
        if let Some(air) = row.num("air_yards") {
            line.air_yards += air;
            line.depth_targets += 1.0;
            line.max_depth = Some(line.max_depth.map_or(air, |max| max.max(air)));
            if !complete {
                line.unrealized_air_yards += air;
            }
            team_targets.air_yards += air;
        }
        line.epa += row.value("epa");
    }

    let mut rows = Vec::with_capacity(receivers.len());
    for ((game, team, player), line) in &receivers {
        let Some(team_targets) = teams.get(&(game.clone(), team.clone())) else {
            continue;
        };
        let total_targets = line.total_targets();
        let team_total: f64 = team_targets.by_quarter.iter().sum();
        let target_share = total_targets / team_total;
        let air_yards_share = line.air_yards / team_targets.air_yards;

        let mut row = OutputRow {
            text: vec![
                ("player_id", Some(player.clone())),
                ("game_id", Some(game.clone())),
                ("team", Some(team.clone())),
                ("opp_team", team_targets.context.opponent.clone()),
            ],
            ints: vec![
                ("season", team_targets.context.season),
                ("week", team_targets.context.week),
            ],
            num: vec![
                ("receiving_yards", Some(line.yards)),
                ("avg_yac", ratio(line.yac, line.yac_catches)),
                ("receptions", Some(line.receptions)),
                ("receiving_touchdowns", Some(line.touchdowns)),
                ("total_targets", Some(total_targets)),
                ("rz_targets", Some(line.rz_targets)),
                ("garbage_time_fpoints", Some(line.garbage_fpoints)),
                ("receiving_fpoints", Some(scoring.receiving(&line.line()))),
                ("avg_depth_of_target", ratio(line.air_yards, line.depth_targets)),
                ("air_yards", Some(line.air_yards)),
                ("max_target_depth", line.max_depth),
                ("fumble_lost", Some(line.fumbles_lost)),
                ("receiving_first_downs", Some(line.first_downs)),
                ("receiving_epa", Some(line.epa)),
                ("receiving_2pt_conversions", Some(line.two_point_conversions)),
                ("unrealized_air_yards", Some(line.unrealized_air_yards)),
                ("racr", ratio(line.yards, line.air_yards)),
                ("target_share", ratio(total_targets, team_total)),
                ("air_yards_share", ratio(line.air_yards, team_targets.air_yards)),
                ("wopr", known(1.5 * target_share + 0.7 * air_yards_share)),
            ],
        };
        for q in 0..QUARTERS {
            row.num.push((TARGET_COLUMNS[q], Some(line.targets[q])));
            row.num.push((
                TARGET_SHARE_COLUMNS[q],
                ratio(line.targets[q], team_targets.by_quarter[q]),
            ));
        }

        let team_snaps = snaps.team(game, team);
        let player_snaps = snaps.player(game, team, player);
        if let (Some(team_snaps), Some(player_snaps)) = (team_snaps, player_snaps) {
            let total: f64 = player_snaps.iter().sum();
            let team_total: f64 = team_snaps.iter().sum();
            for q in 0..QUARTERS {
                row.num.push((SNAP_COLUMNS[q], Some(player_snaps[q])));
                row.num.push((SNAP_SHARE_COLUMNS[q], ratio(player_snaps[q], team_snaps[q])));
            }
            row.num.push(("total_relevant_snaps", Some(total)));
            row.num.push(("snap_percentage", ratio(total, team_total)));
        }
        rows.push(row);
    }
    let out = OutputRow::into_frame(RECEIVING_COLUMNS, &rows)?;
    info!(rows = out.height(), "receiving lines aggregated");
    Ok(out)
}

/// One output line before it becomes a frame. Columns it does not name are
/// null.
#[derive(Debug, Default)]
struct OutputRow {
    text: Vec<(&'static str, Option<String>)>,
    ints: Vec<(&'static str, Option<i64>)>,
    num: Vec<(&'static str, Option<f64>)>,
}

impl OutputRow {
    fn find<T: Clone>(values: &[(&'static str, Option<T>)], name: &str) -> Option<T> {
        values
            .iter()
            .find(|(n, _)| *n == name)
            .and_then(|(_, v)| v.clone())
    }

    fn into_frame(columns: &[&str], rows: &[OutputRow]) -> Result<DataFrame> {
        let mut out = Vec::with_capacity(columns.len());
        for &name in columns {
            let first = rows.first();
            let column = if first.is_some_and(|r| r.text.iter().any(|(n, _)| *n == name)) {
                let values: Vec<Option<String>> = rows.iter().map(|r| Self::find(&r.text, name)).collect();
                Column::new(name.into(), values)
            } else if first.is_some_and(|r| r.ints.iter().any(|(n, _)| *n == name)) {
                let values: Vec<Option<i64>> = rows.iter().map(|r| Self::find(&r.ints, name)).collect();
                Column::new(name.into(), values)
            } else {
                let values: Vec<Option<f64>> = rows.iter().map(|r| Self::find(&r.num, name)).collect();
                Column::new(name.into(), values)
            };
            out.push(column);
        }
        Ok(DataFrame::new(out)?)
    }
}

const TARGET_COLUMNS: [&str; QUARTERS] = ["targets_1", "targets_2", "targets_3", "targets_4"];
const TARGET_SHARE_COLUMNS: [&str; QUARTERS] =
    ["target_share_1", "target_share_2", "target_share_3", "target_share_4"];
const SNAP_COLUMNS: [&str; QUARTERS] = ["snap_count_1", "snap_count_2", "snap_count_3", "snap_count_4"];
const SNAP_SHARE_COLUMNS: [&str; QUARTERS] = [
    "snap_percentage_1",
    "snap_percentage_2",
    "snap_percentage_3",
    "snap_percentage_4",
];

/// Lookup tables merged onto the receiving lines.
#[derive(Debug, Clone, Copy)]
pub struct ReceivingSources<'a> {
    pub rosters: &'a DataFrame,
    pub ids: &'a DataFrame,
    pub ngs: &'a DataFrame,
    pub pfr: &'a DataFrame,
}

/// Left-merges roster, biographical, next-gen and PFR columns onto the
/// receiving lines by player and game.
pub fn enrich_receiving(lines: &DataFrame, sources: ReceivingSources<'_>) -> Result<DataFrame> {
    let keys = ["player_id", "game_id"];

    let roster = frame::dedup_by(&frame::select_present(sources.rosters, ROSTER_COLUMNS)?, &keys)?;
    let mut out = frame::join(lines, &roster, &keys, &keys, JoinType::Left)?;

    let ids = frame::dedup_by(&frame::select_present(sources.ids, ID_COLUMNS)?, &["gsis_id"])?;
    out = frame::join(&out, &ids, &["player_id"], &["gsis_id"], JoinType::Left)?;

    for (source, columns) in [(sources.ngs, NGS_COLUMNS), (sources.pfr, PFR_COLUMNS)] {
        let slim = frame::select_present(source, columns)?;
        if !(frame::has(&slim, "player_id") && frame::has(&slim, "game_id")) {
            continue;
        }
        let slim = frame::dedup_by(&slim, &keys)?;
        out = frame::join(&out, &slim, &keys, &keys, JoinType::Left)?;
    }
    Ok(out)
}

/// Summed passing lines per (game_id, posteam, passer_player_id), in first
/// appearance order. Two-point tries count only toward conversions.
fn passer_lines(pbp: &DataFrame) -> Result<DataFrame> {
    let two_point = col("two_point_conv_result").is_not_null();
    let regular = two_point.clone().not();
    let is = |c: &str| col(c).cast(DataType::Float64).eq(lit(1.0));
    let tally = |cond: Expr| cond.fill_null(lit(false)).cast(DataType::Float64).sum();
    let passes = is("complete_pass").or(is("interception")).or(is("incomplete_pass"));

    Ok(pbp
        .clone()
        .lazy()
        .filter(frame::all_present(&["game_id", "posteam", "passer_player_id"]))
        .group_by_stable([col("game_id"), col("posteam"), col("passer_player_id")])
        .agg([
            col("week").cast(DataType::Int64).first(),
            col("defteam").cast(DataType::String).first(),
            tally(regular.clone().and(is("complete_pass"))).alias("completions"),
            tally(regular.clone().and(passes)).alias("attempts"),
            col("passing_yards")
                .cast(DataType::Float64)
                .fill_null(lit(0.0))
                .filter(regular.clone())
                .sum()
                .alias("passing_yards"),
            tally(regular.clone().and(is("pass_touchdown"))).alias("touchdowns"),
            tally(regular.and(is("interception"))).alias("interceptions"),
            tally(
                two_point
                    .and(is("is_two_point_conversion"))
                    .and(col("play_type").cast(DataType::String).eq(lit("pass"))),
            )
            .alias("two_point_conversions"),
            col("passer_fumble_lost")
                .cast(DataType::Float64)
                .fill_null(lit(0.0))
                .sum()
                .alias("fumbles_lost"),
        ])
        .collect()?)
}

const QB_COLUMNS: &[&str] = &[
    "game_id",
    "week",
    "posteam",
    "defteam",
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
];

/// Per passer-game passing lines. Passers with no attempts are skipped.
pub fn qb_stats(pbp: &DataFrame) -> Result<DataFrame> {
    let snaps = SnapCounts::from_plays(&Plays::from_frame(pbp)?);
    let per_attempt = |c: &str, scale: f64| lit(scale) * col(c) / col("attempts");
    let mut lines = passer_lines(pbp)?
        .lazy()
        .filter(col("attempts").gt(lit(0.0)))
        .with_columns([
            per_attempt("completions", 100.0).alias("completion_percentage"),
            per_attempt("passing_yards", 1.0).alias("yards_per_attempt"),
            per_attempt("touchdowns", 100.0).alias("td_percentage"),
            per_attempt("interceptions", 100.0).alias("interception_percentage"),
        ])
        .collect()?;

    let games = frame::texts(&lines, "game_id")?;
    let teams = frame::texts(&lines, "posteam")?;
    let passers = frame::texts(&lines, "passer_player_id")?;
    let num_snaps: Vec<Option<f64>> = games
        .iter()
        .zip(&teams)
        .zip(&passers)
        .map(|((game, team), passer)| match (game, team, passer) {
            (Some(game), Some(team), Some(passer)) => snaps
                .player(game, team, passer)
                .map(|by_quarter| by_quarter.iter().sum::<f64>()),
            _ => None,
        })
        .collect();
    lines.with_column(Series::new("qb_num_snaps".into(), num_snaps))?;

    let out = frame::sort_asc(
        &lines.select(QB_COLUMNS.iter().copied())?,
        &["game_id", "posteam", "passer_player_id"],
    )?;
    info!(rows = out.height(), "qb lines aggregated");
    Ok(out)
}

/// Fantasy points each defense allowed per game: all passers' points and the
/// receiving points of wide receivers. `receiving` must carry `position`.
pub fn def_points_allowed(pbp: &DataFrame, receiving: &DataFrame, scoring: &Scoring) -> Result<DataFrame> {
    frame::require(receiving, "position")?;
    let qb = passer_lines(pbp)?
        .lazy()
        .filter(col("defteam").is_not_null())
        .select([
            col("game_id"),
            col("defteam"),
            col("week"),
            passing_points(scoring).alias("qb"),
            lit(0.0).alias("wr"),
        ]);
    let wr = receiving
        .clone()
        .lazy()
        .filter(
            col("position")
                .cast(DataType::String)
                .eq(lit("WR"))
                .and(frame::all_present(&["game_id", "opp_team"])),
        )
        .select([
            col("game_id").cast(DataType::String),
            col("opp_team").cast(DataType::String).alias("defteam"),
            col("week").cast(DataType::Int64),
            lit(0.0).alias("qb"),
            col("receiving_fpoints")
                .cast(DataType::Float64)
                .fill_null(lit(0.0))
                .alias("wr"),
        ]);
    let allowed = concat([qb, wr], UnionArgs::default())?
        .group_by([col("game_id"), col("defteam")])
        .agg([
            col("week").drop_nulls().first(),
            col("qb").sum().alias("total_qb_fpoints_given_up"),
            col("wr").sum().alias("total_wr_fpoints_given_up"),
        ])
        .select([
            col("game_id"),
            col("week"),
            col("defteam"),
            col("total_qb_fpoints_given_up"),
            col("total_wr_fpoints_given_up"),
        ])
        .collect()?;
    let out = frame::sort_asc(&allowed, &["game_id", "defteam"])?;
    info!(rows = out.height(), "defensive points allowed aggregated");
    Ok(out)
}

/// Defensive starters (depth 1) listed out or doubtful, for every scheduled
/// team-game. `depth` is the prepared depth chart with `club_code`.
pub fn def_injuries(injuries: &DataFrame, depth: &DataFrame, games: &GameKeyIndex) -> Result<DataFrame> {
    frame::require(injuries, "report_status")?;
    frame::require(depth, "formation")?;
    let keys = ["season", "week", "team", "gsis_id"];
    let keyed = |team: &str| {
        [
            col("season").cast(DataType::Int64),
            col("week").cast(DataType::Int64),
            col(team).cast(DataType::String).alias("team"),
            col("gsis_id").cast(DataType::String),
        ]
    };

    let starters = depth
        .clone()
        .lazy()
        .filter(
            col("formation")
                .cast(DataType::String)
                .eq(lit("Defense"))
                .and(col("depth_team").cast(DataType::Float64).eq(lit(1.0))),
        )
        .select(keyed("club_code"))
        .filter(frame::all_present(&keys))
        .collect()?;
    let sidelined = injuries
        .clone()
        .lazy()
        .filter(frame::any_of("report_status", INACTIVE_STATUSES))
        .select(keyed("team"))
        .filter(frame::all_present(&keys))
        .collect()?;

    let hurt_starters = frame::join(
        &frame::dedup(&sidelined)?,
        &frame::dedup(&starters)?,
        &keys,
        &keys,
        JoinType::Inner,
    )?;
    let counts = hurt_starters
        .lazy()
        .group_by([col("season"), col("week"), col("team")])
        .agg([col("gsis_id").count().cast(DataType::Float64).alias("num_injured_starters")])
        .collect()?;

    let out = frame::join(
        &games.to_frame()?,
        &counts,
        &["season", "week", "team_abbr"],
        &["season", "week", "team"],
        JoinType::Left,
    )?
    .lazy()
    .select([
        col("game_id"),
        col("week"),
        col("team_abbr").alias("team"),
        col("num_injured_starters").fill_null(lit(0.0)),
    ])
    .collect()?;
    Ok(frame::sort_asc(&out, &["game_id", "team"])?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAME: &str = "2019_01_LV_DEN";

    /// Four plays: two R1 targets (one in overtime), an R2 catch in garbage
    /// time, and a run.
    fn sample_pbp() -> DataFrame {
        let none = None::<f64>;
        let mut pbp = df!(
            "play_id" => [1i64, 2, 3, 4],
            "game_id" => [GAME; 4],
            "season" => [2019i64; 4],
            "week" => [1i64; 4],
            "posteam" => ["LV"; 4],
            "defteam" => ["DEN"; 4],
            "qtr" => [1.0, 5.0, 4.0, 1.0],
            "play_type" => ["pass", "pass", "pass", "run"],
            "yardline_100" => [30.0, 15.0, 40.0, 25.0],
            "score_differential" => [0.0, 0.0, 21.0, 0.0],
            "air_yards" => [Some(8.0), Some(15.0), Some(2.0), none],
            "yards_after_catch" => [Some(4.0), none, Some(3.0), none],
            "epa" => [0.5; 4],
            "complete_pass" => [1.0, 0.0, 1.0, 0.0],
            "incomplete_pass" => [0.0, 1.0, 0.0, 0.0],
            "interception" => [0.0; 4],
            "pass_touchdown" => [0.0; 4],
            "is_two_point_conversion" => [0.0; 4],
            "first_down" => [Some(1.0), none, none, none],
            "receiver_player_id" => [Some("R1"), Some("R1"), Some("R2"), None],
            "receiving_yards" => [12.0, 0.0, 5.0, 0.0],
            "receiver_fumble_lost" => [0.0; 4],
            "passer_player_id" => [Some("Q1"), Some("Q1"), Some("Q1"), None],
            "passing_yards" => [12.0, 0.0, 5.0, 0.0],
            "passer_fumble_lost" => [0.0; 4],
            "offense_players" => ["Q1;R1;R2", "Q1;R1", "Q1;R2", "Q1;R1;R2"],
        )
        .unwrap();
        frame::ensure_column(&mut pbp, "two_point_conv_result", &DataType::String).unwrap();
        pbp
    }

    fn player(df: &DataFrame, id: &str) -> usize {
        frame::texts(df, "player_id")
            .unwrap()
            .iter()
            .position(|p| p.as_deref() == Some(id))
            .unwrap()
    }

    fn close(value: Option<f64>, expected: f64) -> bool {
        value.is_some_and(|v| (v - expected).abs() < 1e-9)
    }

    #[test]
    fn receiving_lines_count_targets_snaps_and_shares() {
        let out = receiving(&sample_pbp(), &Scoring::ppr()).unwrap();
        assert_eq!(out.height(), 2);
        assert_eq!(frame::names(&out), RECEIVING_COLUMNS);
        let r1 = player(&out, "R1");
        let num = |name: &str| frame::f64_at(&out, name, r1);
        assert_eq!(num("targets_1"), Some(1.0));
        assert_eq!(num("targets_4"), Some(1.0));
        assert_eq!(num("total_targets"), Some(2.0));
        assert_eq!(num("rz_targets"), Some(1.0));
        assert_eq!(num("unrealized_air_yards"), Some(15.0));
        assert_eq!(num("max_target_depth"), Some(15.0));
        assert_eq!(num("avg_depth_of_target"), Some(11.5));
        assert_eq!(num("receiving_first_downs"), Some(1.0));
        assert!(close(num("receiving_fpoints"), 2.2));
        assert!(close(num("target_share"), 2.0 / 3.0));
        assert!(close(num("air_yards_share"), 23.0 / 25.0));
        assert!(close(num("wopr"), 1.5 * 2.0 / 3.0 + 0.7 * 23.0 / 25.0));
        assert_eq!(num("snap_count_1"), Some(2.0));
        assert_eq!(num("snap_count_4"), Some(1.0));
        assert_eq!(num("snap_percentage_1"), Some(1.0));
        assert_eq!(num("snap_percentage"), Some(0.75));
        assert_eq!(frame::str_at(&out, "opp_team", r1).as_deref(), Some("DEN"));
        assert_eq!(frame::ints(&out, "week").unwrap()[r1], Some(1));

        let r2 = player(&out, "R2");
        assert!(close(frame::f64_at(&out, "garbage_time_fpoints", r2), 1.5));
        assert_eq!(frame::f64_at(&out, "avg_yac", r2), Some(3.0));
    }

    #[test]
    fn missing_participation_leaves_snaps_missing() {
        let mut pbp = sample_pbp();
        pbp.with_column(Series::full_null("offense_players".into(), pbp.height(), &DataType::String))
            .unwrap();
        let out = receiving(&pbp, &Scoring::ppr()).unwrap();
        let r1 = player(&out, "R1");
        assert_eq!(frame::f64_at(&out, "snap_count_1", r1), None);
        assert_eq!(frame::f64_at(&out, "snap_percentage", r1), None);
        assert_eq!(frame::f64_at(&out, "total_targets", r1), Some(2.0));
    }

    #[test]
    fn two_point_tries_only_count_as_conversions() {
        let mut pbp = sample_pbp();
        let results = vec![None, None, Some("success"), None];
        pbp.with_column(Series::new("two_point_conv_result".into(), results)).unwrap();
        pbp.with_column(Series::new("is_two_point_conversion".into(), [0.0, 0.0, 1.0, 0.0]))
            .unwrap();
        let qbs = qb_stats(&pbp).unwrap();
        assert_eq!(frame::f64_at(&qbs, "attempts", 0), Some(2.0));
        assert_eq!(frame::f64_at(&qbs, "passing_yards", 0), Some(12.0));

        let out = receiving(&pbp, &Scoring::ppr()).unwrap();
        let r2 = player(&out, "R2");
        assert_eq!(frame::f64_at(&out, "receiving_2pt_conversions", r2), Some(1.0));
        assert_eq!(frame::f64_at(&out, "total_targets", r2), Some(0.0));
    }

    #[test]
    fn qb_lines_and_points_allowed() {
        let pbp = sample_pbp();
        let qbs = qb_stats(&pbp).unwrap();
        assert_eq!(qbs.height(), 1);
        assert_eq!(frame::names(&qbs), QB_COLUMNS);
        assert_eq!(frame::f64_at(&qbs, "attempts", 0), Some(3.0));
        assert_eq!(frame::f64_at(&qbs, "completions", 0), Some(2.0));
        assert_eq!(frame::f64_at(&qbs, "passing_yards", 0), Some(17.0));
        assert_eq!(frame::f64_at(&qbs, "qb_num_snaps", 0), Some(4.0));
        assert!(close(frame::f64_at(&qbs, "completion_percentage", 0), 200.0 / 3.0));

        let lines = receiving(&pbp, &Scoring::ppr()).unwrap();
        let rosters = df!(
            "player_id" => ["R1", "R2"],
            "game_id" => [GAME, GAME],
            "position" => ["WR", "TE"],
            "player_name" => ["One", "Two"],
        )
        .unwrap();
        let empty = df!(
            "player_id" => Vec::<String>::new(),
            "game_id" => Vec::<String>::new(),
        )
        .unwrap();
        let ids = df!(
            "gsis_id" => ["R1"],
            "college" => ["State"],
            "age" => [24.0],
        )
        .unwrap();
        let enriched = enrich_receiving(&lines, ReceivingSources {
            rosters: &rosters,
            ids: &ids,
            ngs: &empty,
            pfr: &empty,
        })
        .unwrap();
        assert!(!frame::has(&enriched, "gsis_id"));
        assert_eq!(
            frame::str_at(&enriched, "college", player(&enriched, "R1")).as_deref(),
            Some("State")
        );

        let allowed = def_points_allowed(&pbp, &enriched, &Scoring::ppr()).unwrap();
        assert_eq!(allowed.height(), 1);
        assert_eq!(frame::str_at(&allowed, "defteam", 0).as_deref(), Some("DEN"));
        assert!(close(frame::f64_at(&allowed, "total_qb_fpoints_given_up", 0), 17.0 / 25.0));
        assert!(close(frame::f64_at(&allowed, "total_wr_fpoints_given_up", 0), 2.2));
    }

    #[test]
    fn injured_defensive_starters_per_team_game() {
        let schedule = df!(
            "game_id" => [GAME],
            "season" => [2019i64],
            "week" => [1i64],
            "home_team" => ["DEN"],
            "away_team" => ["LV"],
        )
        .unwrap();
        let games = GameKeyIndex::from_schedule(&schedule).unwrap();
        let depth = df!(
            "season" => [2019i64, 2019],
            "week" => [1i64, 1],
            "club_code" => ["DEN", "DEN"],
            "gsis_id" => ["D1", "D2"],
            "formation" => ["Defense", "Defense"],
            "depth_team" => [1.0, 2.0],
        )
        .unwrap();
        let injuries = df!(
            "season" => [2019i64, 2019, 2019],
            "week" => [1i64, 1, 1],
            "team" => ["DEN", "DEN", "DEN"],
            "gsis_id" => ["D1", "D1", "D2"],
            "report_status" => ["Out", "Out", "Doubtful"],
        )
        .unwrap();
        let out = def_injuries(&injuries, &depth, &games).unwrap();
        assert_eq!(out.height(), 2);
        assert_eq!(frame::str_at(&out, "team", 0).as_deref(), Some("DEN"));
        assert_eq!(frame::f64_at(&out, "num_injured_starters", 0), Some(1.0));
        assert_eq!(frame::str_at(&out, "team", 1).as_deref(), Some("LV"));
        assert_eq!(frame::f64_at(&out, "num_injured_starters", 1), Some(0.0));
    }
}
