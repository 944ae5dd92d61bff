use std::collections::HashMap;

use anyhow::Result;
use polars::prelude::*;
use tracing::{debug, warn};

use crate::frame;
use crate::schema;

/// (season, week, team) -> game_id, built by unpivoting a schedule.
#[derive(Debug, Clone, Default)]
pub struct GameKeyIndex {
    entries: Vec<(i64, i64, String, String)>,
    lookup: HashMap<(i64, i64, String), usize>,
}

impl GameKeyIndex {
    pub fn from_schedule(schedule: &DataFrame) -> Result<Self> {
        schema::SCHEDULES.validate(schedule)?;
        let seasons = frame::ints(schedule, "season")?;
        let weeks = frame::ints(schedule, "week")?;
        let game_ids = frame::texts(schedule, "game_id")?;
        let sides = [frame::texts(schedule, "home_team")?, frame::texts(schedule, "away_team")?];

        let mut index = Self::default();
        let mut duplicates = 0usize;
        for r in 0..schedule.height() {
            let (Some(season), Some(week), Some(game_id)) = (seasons[r], weeks[r], &game_ids[r]) else {
                continue;
            };
            for side in &sides {
                let Some(team) = &side[r] else {
                    continue;
                };
                let key = (season, week, team.clone());
                if index.lookup.contains_key(&key) {
                    duplicates += 1;
                    continue;
                }
                index.lookup.insert(key, index.entries.len());
                index.entries.push((season, week, team.clone(), game_id.clone()));
            }
        }
        if duplicates > 0 {
            warn!(duplicates, "schedule lists a team more than once in a week; kept the first game");
        }
        Ok(index)
    }

    pub fn lookup(&self, season: i64, week: i64, team: &str) -> Option<&str> {
        self.lookup
            .get(&(season, week, team.to_string()))
            .map(|&idx| self.entries[idx].3.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_frame(&self) -> Result<DataFrame> {
        let game_ids: Vec<&str> = self.entries.iter().map(|e| e.3.as_str()).collect();
        let teams: Vec<&str> = self.entries.iter().map(|e| e.2.as_str()).collect();
        let weeks: Vec<i64> = self.entries.iter().map(|e| e.1).collect();
        let seasons: Vec<i64> = self.entries.iter().map(|e| e.0).collect();
        Ok(df!(
            "game_id" => game_ids,
            "team_abbr" => teams,
            "week" => weeks,
            "season" => seasons,
        )?)
    }

    /// Inner-joins `game_id` onto `df` by week, team and season. Rows that
    /// find no game are dropped; an existing `game_id` is replaced.
    pub fn attach(&self, df: &DataFrame, week_col: &str, team_col: &str, season_col: &str) -> Result<DataFrame> {
        let base = frame::drop_present(df, &["game_id"]);
        let joined = frame::join(
            &base,
            &self.to_frame()?,
            &[week_col, team_col, season_col],
            &["week", "team_abbr", "season"],
            JoinType::Inner,
        )?;
        let dropped = df.height().saturating_sub(joined.height());
        if dropped > 0 {
            debug!(dropped, kept = joined.height(), "rows without a scheduled game");
        }
        Ok(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> DataFrame {
        df!(
            "game_id" => ["2023_01_DET_KC", "2023_02_KC_JAX"],
            "season" => [2023i64, 2023],
            "week" => [1i64, 2],
            "home_team" => ["KC", "JAX"],
            "away_team" => ["DET", "KC"],
        )
        .unwrap()
    }

    #[test]
    fn one_game_per_team_week() {
        let index = GameKeyIndex::from_schedule(&schedule()).unwrap();
        assert_eq!(index.len(), 4);
        assert_eq!(index.lookup(2023, 1, "DET"), Some("2023_01_DET_KC"));
        // DET is off in week 2
        assert_eq!(index.lookup(2023, 2, "DET"), None);
    }

    #[test]
    fn attach_drops_unscheduled_rows() {
        let index = GameKeyIndex::from_schedule(&schedule()).unwrap();
        let stats = df!(
            "team" => ["KC", "DET"],
            "week" => [2i64, 2],
            "season" => [2023i64, 2023],
            "yards" => [80.0, 12.0],
            "game_id" => ["stale", "stale"],
        )
        .unwrap();
        let out = index.attach(&stats, "week", "team", "season").unwrap();
        assert_eq!(out.height(), 1);
        assert_eq!(frame::str_at(&out, "game_id", 0).as_deref(), Some("2023_02_KC_JAX"));
        assert_eq!(frame::f64_at(&out, "yards", 0), Some(80.0));
        assert!(!frame::has(&out, "team_abbr"));
    }
}
