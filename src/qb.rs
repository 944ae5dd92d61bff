use std::collections::HashMap;

use anyhow::Result;
use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::frame;
use crate::rolling::RollingWindow;

/// Per-game passing columns rolled into quarterback history.
pub const QB_FEATURES: &[&str] = &[
    "completions",
    "attempts",
    "passing_yards",
    "touchdowns",
    "interceptions",
    "completion_percentage",
    "yards_per_attempt",
    "td_percentage",
    "interception_percentage",
    "QBR",
    "qb_num_snaps",
];

pub const QB_ID: &str = "qb_player_id";
pub const NEW_STARTER: &str = "is_new_qb_starter";

/// `passing_yards` -> `hist_qb_passing_yards`, `qb_num_snaps` -> `hist_qb_num_snaps`.
pub fn history_column(feature: &str) -> String {
    let stem = feature.strip_prefix("qb_").unwrap_or(feature);
    format!("hist_qb_{stem}")
}

/// The QB features `qb_stats` actually carries values for.
pub fn available_features(qb_stats: &DataFrame) -> Vec<&'static str> {
    QB_FEATURES
        .iter()
        .copied()
        .filter(|f| {
            qb_stats
                .column(f)
                .is_ok_and(|c| c.null_count() < qb_stats.height())
        })
        .collect()
}

/// One starter per team-game: the QB depth chart entry with the best depth,
/// first listed on ties. Sorted by team, season and week.
pub fn starters(rosters: &DataFrame) -> Result<DataFrame> {
    frame::require(rosters, "depth_team")?;
    let qbs = rosters
        .clone()
        .lazy()
        .filter(col("depth_position").cast(DataType::String).eq(lit("QB")))
        .collect()?;
    let ranked = frame::sort_asc(&qbs, &["game_id", "team", "depth_team"])?;
    let best = frame::dedup_by(&ranked, &["game_id", "team"])?
        .select(["game_id", "team", "player_id", "season", "week"])?;
    Ok(frame::sort_asc(&best, &["team", "season", "week"])?)
}

/// Adds `is_new_qb_starter`: 1 when the starter differs from the team's
/// previous game that season, 0 otherwise and for a team's first game.
pub fn flag_new_starters(starters: &mut DataFrame) -> Result<()> {
    let sorted = frame::sort_asc(starters, &["team", "season", "week"])?;
    let previous = col("player_id").shift(lit(1)).over([col("team"), col("season")]);
    *starters = sorted
        .lazy()
        .with_column(
            col("player_id")
                .neq(previous)
                .fill_null(lit(false))
                .cast(DataType::Int64)
                .alias(NEW_STARTER),
        )
        .collect()?;
    Ok(())
}

pub fn attach_history(starters: &DataFrame, qb_stats: &DataFrame, window: usize) -> Result<DataFrame> {
    let features = available_features(qb_stats);
    let mut source = qb_stats.clone();
    frame::rename_present(&mut source, &[("passer_player_id", "player_id")])?;
    let rolling = RollingWindow::new(&["player_id"], window);
    let mut out = rolling.attach(starters, &source, &features, JoinType::Left)?;

    let renamed: Vec<(&str, String)> = features.iter().map(|f| (*f, history_column(f))).collect();
    let mut pairs: Vec<(&str, &str)> = renamed.iter().map(|(f, h)| (*f, h.as_str())).collect();
    pairs.push(("player_id", QB_ID));
    frame::rename_present(&mut out, &pairs)?;
    Ok(out)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QbFillReport {
    pub season: usize,
    pub career: usize,
    pub league_season: usize,
    pub unfilled: usize,
}

struct PasserGame {
    season: f64,
    week: f64,
    values: Vec<Option<f64>>,
}

/// Backfills `hist_qb_*` for rows whose starter had no usable window. Each
/// row takes the first non-empty tier: the starter's earlier games that
/// season, the starter's games at any earlier point, then every passer's
/// earlier games that season.
pub fn fill_missing_history(windowed: &mut DataFrame, qb_stats: &DataFrame) -> Result<QbFillReport> {
    let features = available_features(qb_stats);
    let hist_names: Vec<String> = features.iter().map(|f| history_column(f)).collect();
    let mut hist = Vec::with_capacity(hist_names.len());
    for name in &hist_names {
        hist.push(frame::floats(windowed, name)?);
    }

    let stat_columns = features
        .iter()
        .map(|f| frame::floats(qb_stats, f))
        .collect::<Result<Vec<_>, _>>()?;
    let passers = frame::texts_or_null(qb_stats, "passer_player_id")?;
    let stat_seasons = frame::floats(qb_stats, "season")?;
    let stat_weeks = frame::floats(qb_stats, "week")?;

    let mut by_passer: HashMap<String, Vec<usize>> = HashMap::new();
    let mut by_season: HashMap<i64, Vec<usize>> = HashMap::new();
    let mut games = Vec::with_capacity(qb_stats.height());
    for r in 0..qb_stats.height() {
        let (Some(season), Some(week)) = (stat_seasons[r], stat_weeks[r]) else {
            continue;
        };
        let idx = games.len();
        if let Some(passer) = &passers[r] {
            by_passer.entry(passer.clone()).or_default().push(idx);
        }
        by_season.entry(season as i64).or_default().push(idx);
        games.push(PasserGame {
            season,
            week,
            values: stat_columns.iter().map(|values| values[r]).collect(),
        });
    }

    let seasons = frame::floats(windowed, "season")?;
    let weeks = frame::floats(windowed, "week")?;
    let qbs = frame::texts_or_null(windowed, QB_ID)?;
    let mut report = QbFillReport::default();
    for r in 0..windowed.height() {
        if hist.iter().all(|values| values[r].is_some()) {
            continue;
        }
        let (Some(season), Some(week)) = (seasons[r], weeks[r]) else {
            report.unfilled += 1;
            continue;
        };
        let passer_games = qbs[r]
            .as_ref()
            .and_then(|id| by_passer.get(id))
            .map(Vec::as_slice)
            .unwrap_or_default();
        let season_games = by_season
            .get(&(season as i64))
            .map(Vec::as_slice)
            .unwrap_or_default();

        let tiers: [(&[usize], fn(&PasserGame, f64, f64) -> bool); 3] = [
            (passer_games, earlier_this_season),
            (passer_games, any_time_before),
            (season_games, earlier_this_season),
        ];
        let mut filled_from = None;
        for (tier, (candidates, earlier)) in tiers.iter().enumerate() {
            let pool: Vec<&PasserGame> = candidates
                .iter()
                .map(|&i| &games[i])
                .filter(|g| earlier(g, season, week))
                .collect();
            if !pool.is_empty() {
                filled_from = Some((tier, means(&pool, features.len())));
                break;
            }
        }
        let Some((tier, averages)) = filled_from else {
            debug!(row = r, qb = qbs[r].as_deref().unwrap_or("unknown"), season, week, "no earlier passing games");
            report.unfilled += 1;
            continue;
        };
        for (values, mean) in hist.iter_mut().zip(averages) {
            if values[r].is_none() {
                values[r] = mean;
            }
        }
        match tier {
            0 => report.season += 1,
            1 => report.career += 1,
            _ => report.league_season += 1,
        }
    }
    for (name, values) in hist_names.iter().zip(hist) {
        windowed.with_column(Series::new(name.as_str().into(), values))?;
    }
    info!(
        season = report.season,
        career = report.career,
        league_season = report.league_season,
        "qb history backfilled"
    );
    if report.unfilled > 0 {
        warn!(rows = report.unfilled, "qb history left missing");
    }
    Ok(report)
}

fn earlier_this_season(game: &PasserGame, season: f64, week: f64) -> bool {
    game.season == season && game.week < week
}

fn any_time_before(game: &PasserGame, season: f64, week: f64) -> bool {
    game.season < season || earlier_this_season(game, season, week)
}

fn means(pool: &[&PasserGame], width: usize) -> Vec<Option<f64>> {
    (0..width)
        .map(|i| {
            let present: Vec<f64> = pool.iter().filter_map(|g| g.values[i]).collect();
            if present.is_empty() {
                None
            } else {
                Some(present.iter().sum::<f64>() / present.len() as f64)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rolling::TARGET_WEEK;

    fn qb_stats() -> DataFrame {
        df!(
            "passer_player_id" => ["Q1", "Q1", "Q1", "Q2"],
            "season" => [2022i64, 2023, 2023, 2023],
            "week" => [5i64, 1, 2, 1],
            "passing_yards" => [300.0, 200.0, 250.0, 100.0],
            "touchdowns" => [3.0, 1.0, 2.0, 0.0],
        )
        .unwrap()
    }

    #[test]
    fn starter_is_best_listed_qb() {
        let rosters = df!(
            "game_id" => ["g1", "g1", "g1", "g2"],
            "team" => ["KC", "KC", "KC", "KC"],
            "player_id" => ["Q2", "Q1", "W1", "Q2"],
            "season" => [2023i64, 2023, 2023, 2023],
            "week" => [1i64, 1, 1, 2],
            "depth_position" => ["QB", "QB", "WR", "QB"],
            "depth_team" => [2.0, 1.0, 1.0, 1.0],
        )
        .unwrap();
        let mut out = starters(&rosters).unwrap();
        assert_eq!(out.height(), 2);
        assert_eq!(frame::str_at(&out, "player_id", 0).as_deref(), Some("Q1"));
        flag_new_starters(&mut out).unwrap();
        assert_eq!(frame::f64_at(&out, NEW_STARTER, 0), Some(0.0));
        assert_eq!(frame::f64_at(&out, NEW_STARTER, 1), Some(1.0));
    }

    #[test]
    fn history_uses_prior_window() {
        let starters = df!(
            "game_id" => ["g3"],
            "team" => ["KC"],
            "player_id" => ["Q1"],
            "season" => [2023i64],
            "week" => [3i64],
        )
        .unwrap();
        let out = attach_history(&starters, &qb_stats(), 2).unwrap();
        assert_eq!(frame::str_at(&out, QB_ID, 0).as_deref(), Some("Q1"));
        assert_eq!(frame::f64_at(&out, "hist_qb_passing_yards", 0), Some(225.0));
        assert_eq!(frame::f64_at(&out, "hist_qb_touchdowns", 0), Some(1.5));
        assert!(!frame::has(&out, TARGET_WEEK));
    }

    fn windowed(qb: Option<&str>, season: i64, week: i64) -> DataFrame {
        df!(
            "season" => [season],
            "week" => [week],
            QB_ID => [qb],
            "hist_qb_passing_yards" => [None::<f64>],
            "hist_qb_touchdowns" => [None::<f64>],
        )
        .unwrap()
    }

    #[test]
    fn fallback_prefers_same_season_then_career_then_league() {
        let stats = qb_stats();

        let mut season = windowed(Some("Q1"), 2023, 3);
        let report = fill_missing_history(&mut season, &stats).unwrap();
        assert_eq!(report.season, 1);
        assert_eq!(frame::f64_at(&season, "hist_qb_passing_yards", 0), Some(225.0));

        let mut career = windowed(Some("Q1"), 2023, 1);
        let report = fill_missing_history(&mut career, &stats).unwrap();
        assert_eq!(report.career, 1);
        assert_eq!(frame::f64_at(&career, "hist_qb_passing_yards", 0), Some(300.0));

        let mut league = windowed(None, 2023, 2);
        let report = fill_missing_history(&mut league, &stats).unwrap();
        assert_eq!(report.league_season, 1);
        assert_eq!(frame::f64_at(&league, "hist_qb_passing_yards", 0), Some(150.0));

        let mut none = windowed(Some("Q3"), 2023, 1);
        let report = fill_missing_history(&mut none, &stats).unwrap();
        assert_eq!(report.unfilled, 1);
        assert_eq!(frame::f64_at(&none, "hist_qb_touchdowns", 0), None);
    }
}
