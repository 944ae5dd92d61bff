use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::*;
use tracing::info;

use crate::aggregate::{self, ReceivingSources};
use crate::config::PipelineConfig;
use crate::frame;
use crate::game_key::GameKeyIndex;
use crate::provider::{NgsStat, PfrStat, StatsSource};
use crate::rosters;
use crate::schema;
use crate::scoring::Scoring;
use crate::table_io;
use crate::teams::{COMPOSITE_COLUMNS, TEAM_COLUMNS, TeamCodeMap};

/// Player ids the id map has crossed; applied simultaneously.
pub const PLAYER_ID_FIXES: &[(&str, &str)] = &[("00-0034439", "00-0034270"), ("00-0034270", "11-1111111")];

/// Last week kept from play-by-play; later weeks are postseason.
pub const LAST_REGULAR_WEEK: i64 = 18;

/// Counting columns where a missing value means the event did not happen.
pub const ZERO_FILL_COLUMNS: &[&str] = &[
    "touchdown",
    "interception",
    "fumble_lost",
    "passing_yards",
    "pass_touchdown",
    "rushing_yards",
    "rush_touchdown",
    "receiving_yards",
];

/// Play-by-play columns kept after cleaning.
pub const PBP_COLUMNS: &[&str] = &[
    "play_id",
    "game_id",
    "season",
    "home_team",
    "away_team",
    "week",
    "posteam",
    "defteam",
    "yardline_100",
    "game_date",
    "game_seconds_remaining",
    "qtr",
    "down",
    "time",
    "desc",
    "play_type",
    "yards_gained",
    "air_yards",
    "yards_after_catch",
    "score_differential",
    "epa",
    "incomplete_pass",
    "interception",
    "penalty",
    "rush_attempt",
    "pass_attempt",
    "touchdown",
    "pass_touchdown",
    "rush_touchdown",
    "two_point_attempt",
    "two_point_conv_result",
    "fumble",
    "fumbled_1_team",
    "fumbled_1_player_id",
    "fumbled_1_player_name",
    "fumbled_2_player_id",
    "fumbled_2_player_name",
    "fumbled_2_team",
    "fumble_lost",
    "complete_pass",
    "passer_player_id",
    "passer_player_name",
    "passing_yards",
    "receiver_player_id",
    "receiver_player_name",
    "receiving_yards",
    "rusher_player_id",
    "rusher_player_name",
    "rushing_yards",
    "penalty_player_id",
    "penalty_yards",
    "replay_or_challenge",
    "replay_or_challenge_result",
    "penalty_type",
    "offense_players",
    "players_on_play",
    "timeout",
    "is_two_point_conversion",
    "first_down",
];

/// Provider tables exactly as fetched.
#[derive(Debug, Clone)]
pub struct RawData {
    pub ids: DataFrame,
    pub depth_charts: DataFrame,
    pub ngs_receiving: DataFrame,
    pub pfr_receiving: DataFrame,
    pub schedules: DataFrame,
    pub pbp: DataFrame,
    pub weekly_rosters: DataFrame,
    pub injuries: DataFrame,
}

/// Provider tables with canonical team codes and game keys attached.
#[derive(Debug, Clone)]
pub struct CleanData {
    pub ids: DataFrame,
    pub games: GameKeyIndex,
    /// Every formation, still keyed by `club_code`.
    pub depth_charts: DataFrame,
    pub ngs_receiving: DataFrame,
    pub pfr_receiving: DataFrame,
    pub pbp: DataFrame,
    pub rosters: DataFrame,
    pub injuries: DataFrame,
}

/// The tables written by an ingest run.
#[derive(Debug, Clone)]
pub struct IngestOutput {
    pub receiving: DataFrame,
    pub def_points: DataFrame,
    pub def_injuries: DataFrame,
    pub qb_stats: DataFrame,
    pub rosters: DataFrame,
}

/// Builds the per-game intermediate tables for a set of seasons.
#[derive(Debug, Clone)]
pub struct DataCreator {
    years: Vec<i32>,
    teams: TeamCodeMap,
    scoring: Scoring,
}

impl DataCreator {
    pub fn new(years: &[i32]) -> Self {
        Self {
            years: years.to_vec(),
            teams: TeamCodeMap::common(),
            scoring: Scoring::ppr(),
        }
    }

    pub fn with_scoring(mut self, scoring: Scoring) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn years(&self) -> &[i32] {
        &self.years
    }

    pub fn load(&self, source: &dyn StatsSource) -> Result<RawData> {
        let years = &self.years;
        info!(?years, "loading provider tables");
        let raw = RawData {
            ids: source.import_ids().context("player ids")?,
            depth_charts: source.import_depth_charts(years).context("depth charts")?,
            ngs_receiving: source
                .import_ngs(NgsStat::Receiving, years)
                .context("next-gen receiving")?,
            pfr_receiving: source
                .import_weekly_pfr(PfrStat::Rec, years)
                .context("pfr receiving")?,
            schedules: source.import_schedules(years).context("schedules")?,
            pbp: source.import_pbp(years, true).context("play-by-play")?,
            weekly_rosters: rosters::load_weekly(source, years, &self.teams)?,
            injuries: source.import_injuries(years).context("injuries")?,
        };
        info!(
            plays = raw.pbp.height(),
            roster_rows = raw.weekly_rosters.height(),
            "provider tables loaded"
        );
        Ok(raw)
    }

    pub fn clean(&self, raw: RawData) -> Result<CleanData> {
        let teams = &self.teams;

        let mut ids = raw.ids;
        fix_player_ids(&mut ids)?;
        teams.normalize_table(&mut ids, TEAM_COLUMNS, COMPOSITE_COLUMNS)?;

        let mut schedules = raw.schedules;
        teams.normalize_table(&mut schedules, TEAM_COLUMNS, COMPOSITE_COLUMNS)?;
        let games = GameKeyIndex::from_schedule(&schedules)?;

        let mut ngs = raw.ngs_receiving;
        teams.normalize_table(&mut ngs, TEAM_COLUMNS, COMPOSITE_COLUMNS)?;
        // season-level rows carry week 0 and find no game
        let mut ngs = games.attach(&ngs, "week", "team_abbr", "season")?;
        frame::rename_present(&mut ngs, &[("player_gsis_id", "player_id")])?;

        let mut pfr = raw.pfr_receiving;
        teams.normalize_table(&mut pfr, TEAM_COLUMNS, COMPOSITE_COLUMNS)?;
        let id_pairs = ids.select(["pfr_id", "gsis_id"])?;
        let mut pfr = frame::join(&pfr, &id_pairs, &["pfr_player_id"], &["pfr_id"], JoinType::Inner)?;
        frame::rename_present(&mut pfr, &[("gsis_id", "player_id")])?;

        let mut depth_charts = raw.depth_charts;
        rosters::prepare_depth(&mut depth_charts, teams)?;
        let offense = depth_charts
            .clone()
            .lazy()
            .filter(col("formation").cast(DataType::String).eq(lit("Offense")))
            .collect()?;
        let offense = rosters::keyed_depth(&offense, &games)?;
        let rosters = rosters::assemble(&raw.weekly_rosters, &offense, &games)?;

        let mut injuries = raw.injuries;
        teams.normalize_table(&mut injuries, TEAM_COLUMNS, COMPOSITE_COLUMNS)?;

        let pbp = clean_pbp(raw.pbp, teams)?;
        info!(
            plays = pbp.height(),
            games = games.len(),
            ngs = ngs.height(),
            pfr = pfr.height(),
            rosters = rosters.height(),
            "provider tables cleaned"
        );
        Ok(CleanData {
            ids,
            games,
            depth_charts,
            ngs_receiving: ngs,
            pfr_receiving: pfr,
            pbp,
            rosters,
            injuries,
        })
    }

    /// Adds `receiver_fumble_lost`, `rusher_fumble_lost` and
    /// `passer_fumble_lost` to cleaned play-by-play.
    pub fn engineer_features(pbp: &mut DataFrame) -> Result<()> {
        for column in FUMBLE_TEXT_COLUMNS {
            frame::ensure_column(pbp, column, &DataType::String)?;
        }
        frame::ensure_column(pbp, "fumble_lost", &DataType::Float64)?;
        let mut charged = Vec::with_capacity(3);
        for (role, column) in [
            ("receiver_player_id", "receiver_fumble_lost"),
            ("rusher_player_id", "rusher_fumble_lost"),
            ("passer_player_id", "passer_fumble_lost"),
        ] {
            frame::require(pbp, role)?;
            charged.push(fumble_charged(role).alias(column));
        }
        *pbp = pbp.clone().lazy().with_columns(charged).collect()?;
        Ok(())
    }

    pub fn aggregate(&self, data: &CleanData) -> Result<IngestOutput> {
        let lines = aggregate::receiving(&data.pbp, &self.scoring)?;
        let mut receiving = aggregate::enrich_receiving(&lines, ReceivingSources {
            rosters: &data.rosters,
            ids: &data.ids,
            ngs: &data.ngs_receiving,
            pfr: &data.pfr_receiving,
        })?;
        schema::RECEIVING.conform(&mut receiving)?;

        let def_points = aggregate::def_points_allowed(&data.pbp, &receiving, &self.scoring)?;
        schema::DEF_POINTS.validate(&def_points)?;
        let mut qb_stats = aggregate::qb_stats(&data.pbp)?;
        schema::QB_STATS.conform(&mut qb_stats)?;
        let def_injuries = aggregate::def_injuries(&data.injuries, &data.depth_charts, &data.games)?;
        schema::DEF_INJURIES.validate(&def_injuries)?;

        Ok(IngestOutput {
            receiving,
            def_points,
            def_injuries,
            qb_stats,
            rosters: data.rosters.clone(),
        })
    }

    pub fn run(&self, source: &dyn StatsSource) -> Result<IngestOutput> {
        let raw = self.load(source)?;
        let mut clean = self.clean(raw)?;
        Self::engineer_features(&mut clean.pbp)?;
        self.aggregate(&clean)
    }
}

impl IngestOutput {
    /// Writes every table as CSV under the data directory, plus the
    /// game-by-game workbook.
    pub fn write(&self, config: &PipelineConfig) -> Result<()> {
        let dir = &config.data_dir;
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        let files = &config.files;
        for (table, file) in [
            (&self.receiving, &files.receiving),
            (&self.def_points, &files.def_points),
            (&self.def_injuries, &files.def_injuries),
            (&self.qb_stats, &files.qb_stats),
            (&self.rosters, &files.rosters),
            (&self.receiving, &config.game_by_game),
        ] {
            table_io::write_csv(table, &config.data_path(file))?;
        }
        let workbook = config.game_by_game_path().with_extension("xlsx");
        table_io::write_xlsx(&self.receiving, &workbook, "game_by_game")?;
        info!(dir = %dir.display(), "ingest tables written");
        Ok(())
    }

    pub fn summary_lines(&self, dir: &Path) -> Vec<String> {
        vec![
            format!("Dir: {}", dir.display()),
            format!("Receiving rows: {}", self.receiving.height()),
            format!("Defense rows: {}", self.def_points.height()),
            format!("Injury rows: {}", self.def_injuries.height()),
            format!("QB rows: {}", self.qb_stats.height()),
            format!("Roster rows: {}", self.rosters.height()),
        ]
    }
}

const FUMBLE_TEXT_COLUMNS: [&str; 5] = [
    "posteam",
    "fumbled_1_player_id",
    "fumbled_1_team",
    "fumbled_2_player_id",
    "fumbled_2_team",
];

fn fix_player_ids(ids: &mut DataFrame) -> Result<()> {
    let fixed: Vec<Option<String>> = frame::texts(ids, "gsis_id")?
        .into_iter()
        .map(|id| {
            id.map(|id| match PLAYER_ID_FIXES.iter().find(|(from, _)| *from == id) {
                Some((_, to)) => to.to_string(),
                None => id,
            })
        })
        .collect();
    ids.with_column(Series::new("gsis_id".into(), fixed))?;
    Ok(())
}

fn clean_pbp(mut pbp: DataFrame, teams: &TeamCodeMap) -> Result<DataFrame> {
    teams.normalize_table(&mut pbp, TEAM_COLUMNS, COMPOSITE_COLUMNS)?;
    frame::require(&pbp, "week")?;
    frame::ensure_column(&mut pbp, "two_point_conv_result", &DataType::String)?;

    let mut casts = vec![col("week").cast(DataType::Int64)];
    if frame::has(&pbp, "season") {
        casts.push(col("season").cast(DataType::Int64));
    }
    if frame::has(&pbp, "qtr") {
        casts.push(col("qtr").cast(DataType::Float64));
    }
    let zero_filled: Vec<Expr> = ZERO_FILL_COLUMNS
        .iter()
        .filter(|c| frame::has(&pbp, c))
        .map(|c| col(*c).cast(DataType::Float64).fill_null(lit(0.0)))
        .collect();

    let cleaned = pbp
        .lazy()
        .with_columns(casts)
        .filter(col("week").lt_eq(lit(LAST_REGULAR_WEEK)))
        .with_columns(zero_filled)
        .with_column(
            col("two_point_conv_result")
                .cast(DataType::String)
                .eq(lit("success"))
                .fill_null(lit(false))
                .cast(DataType::Float64)
                .alias("is_two_point_conversion"),
        )
        .collect()?;
    Ok(frame::select_present(&cleaned, PBP_COLUMNS)?)
}

/// 1 when the lost fumble on a play belongs to the player in `role`. A
/// fumbler whose teammate recovered and then lost it is not charged.
fn fumble_charged(role: &str) -> Expr {
    let text = |c: &str| col(c).cast(DataType::String).fill_null(lit(""));
    let player = col(role).cast(DataType::String);
    let first = text("fumbled_1_player_id");
    let second = text("fumbled_2_player_id");
    let offense = text("posteam");

    let involved = first.clone().eq(player.clone()).or(second.clone().eq(player.clone()));
    let teammate_lost = first
        .eq(player.clone())
        .and(second.neq(player.clone()))
        .and(text("fumbled_1_team").eq(offense.clone()))
        .and(text("fumbled_2_team").eq(offense));
    when(
        player
            .is_not_null()
            .and(col("fumble_lost").cast(DataType::Float64).eq(lit(1.0)))
            .and(involved)
            .and(teammate_lost.not()),
    )
    .then(lit(1.0))
    .otherwise(lit(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fumble_play(first: &str, second: Option<&str>, second_team: Option<&str>) -> DataFrame {
        df!(
            "posteam" => ["KC"],
            "fumble_lost" => [1.0],
            "fumbled_1_player_id" => [first],
            "fumbled_1_team" => ["KC"],
            "fumbled_2_player_id" => [second],
            "fumbled_2_team" => [second_team],
            "receiver_player_id" => [Some("R1")],
            "rusher_player_id" => [None::<&str>],
            "passer_player_id" => [Some("Q1")],
        )
        .unwrap()
    }

    #[test]
    fn lost_fumble_goes_to_the_fumbler() {
        let mut pbp = fumble_play("R1", None, None);
        DataCreator::engineer_features(&mut pbp).unwrap();
        assert_eq!(frame::f64_at(&pbp, "receiver_fumble_lost", 0), Some(1.0));
        assert_eq!(frame::f64_at(&pbp, "rusher_fumble_lost", 0), Some(0.0));
        assert_eq!(frame::f64_at(&pbp, "passer_fumble_lost", 0), Some(0.0));
    }

    #[test]
    fn teammate_who_loses_the_recovery_is_charged() {
        let mut pbp = fumble_play("R1", Some("Q1"), Some("KC"));
        DataCreator::engineer_features(&mut pbp).unwrap();
        assert_eq!(frame::f64_at(&pbp, "receiver_fumble_lost", 0), Some(0.0));
        assert_eq!(frame::f64_at(&pbp, "passer_fumble_lost", 0), Some(1.0));
    }

    #[test]
    fn id_fixes_apply_simultaneously() {
        let mut ids = df!("gsis_id" => ["00-0034439", "00-0034270", "00-1"]).unwrap();
        fix_player_ids(&mut ids).unwrap();
        assert_eq!(
            frame::texts(&ids, "gsis_id").unwrap(),
            vec![
                Some("00-0034270".to_string()),
                Some("11-1111111".to_string()),
                Some("00-1".to_string()),
            ]
        );
    }

    #[test]
    fn cleaning_keeps_regular_season_and_flags_conversions() {
        let pbp = df!(
            "game_id" => ["2019_01_OAK_DEN", "2019_01_OAK_DEN", "2019_21_KC_SF"],
            "week" => [1i64, 1, 21],
            "posteam" => ["OAK", "DEN", "KC"],
            "two_point_conv_result" => [Some("success"), None, None],
            "touchdown" => [None, Some(1.0), None],
            "extra" => [1.0, 1.0, 1.0],
        )
        .unwrap();
        let out = clean_pbp(pbp, &TeamCodeMap::common()).unwrap();
        assert_eq!(out.height(), 2);
        assert!(!frame::has(&out, "extra"));
        assert_eq!(frame::str_at(&out, "game_id", 0).as_deref(), Some("2019_01_LV_DEN"));
        assert_eq!(frame::str_at(&out, "posteam", 0).as_deref(), Some("LV"));
        assert_eq!(frame::f64_at(&out, "is_two_point_conversion", 0), Some(1.0));
        assert_eq!(frame::f64_at(&out, "touchdown", 0), Some(0.0));
        assert_eq!(frame::f64_at(&out, "is_two_point_conversion", 1), Some(0.0));
    }
}
