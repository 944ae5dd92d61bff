use anyhow::Result;
use polars::prelude::*;
use tracing::debug;

use crate::frame;

pub const SEASON: &str = "season";
pub const WEEK: &str = "week";
/// The later week a window row feeds.
pub const TARGET_WEEK: &str = "new_week";

const WINDOW_WEEK: &str = "__window_week";
const MATCHED_WEEK: &str = "__matched_week";
const ASOF_KEY: &str = "__asof_key";
const TARGET_ROW: &str = "__target_row";

/// Trailing means over `window` rows per entity and season, ordered by week.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    entity: Vec<String>,
    window: usize,
}

impl RollingWindow {
    pub fn new(entity: &[&str], window: usize) -> Self {
        Self {
            entity: entity.iter().map(|s| s.to_string()).collect(),
            window: window.max(1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    fn group_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entity.iter().map(String::as_str).collect();
        keys.push(SEASON);
        keys
    }

    fn partition(&self) -> Vec<Expr> {
        self.group_keys().into_iter().map(col).collect()
    }

    /// One row per input row with a week, sorted by group and week. A mean is
    /// null until the group has `window` rows, and while any of them is null.
    pub fn means(&self, df: &DataFrame, features: &[&str]) -> Result<DataFrame> {
        let keys = self.group_keys();
        for key in keys.iter().chain([&WEEK]) {
            frame::require(df, key)?;
        }
        let features: Vec<&str> = features
            .iter()
            .copied()
            .filter(|f| !keys.contains(f) && *f != WEEK)
            .collect();
        for feature in &features {
            frame::require(df, feature)?;
        }

        let options = RollingOptionsFixedWindow {
            window_size: self.window,
            min_periods: self.window,
            ..Default::default()
        };
        let mut sort_by = keys.clone();
        sort_by.push(WEEK);
        let mut exprs: Vec<Expr> = sort_by.iter().map(|k| col(*k)).collect();
        exprs.extend(features.iter().map(|f| {
            col(*f)
                .cast(DataType::Float64)
                .rolling_mean(options.clone())
                .over(self.partition())
                .alias(*f)
        }));

        let sorted = frame::sort_asc(df, &sort_by)?;
        Ok(sorted
            .lazy()
            .filter(col(WEEK).is_not_null())
            .select(exprs)
            .collect()?)
    }

    /// As-of alignment. Window rows at the latest week strictly before a
    /// target's week, within the same entity and season, get that target's
    /// week in `new_week`. The last listed target wins a shared window.
    pub fn align(&self, windows: &DataFrame, targets: &DataFrame) -> Result<DataFrame> {
        let keys = self.group_keys();
        for key in keys.iter().chain([&WEEK]) {
            frame::require(windows, key)?;
            frame::require(targets, key)?;
        }
        let key_exprs: Vec<Expr> = keys.iter().map(|k| col(*k)).collect();
        let by: Vec<PlSmallStr> = keys.iter().map(|k| (*k).into()).collect();

        let mut window_cols = key_exprs.clone();
        window_cols.push(col(WEEK).cast(DataType::Int64).alias(WINDOW_WEEK));
        let mut window_keys = keys.clone();
        window_keys.push(WINDOW_WEEK);
        let window_weeks = windows
            .clone()
            .lazy()
            .select(window_cols)
            .filter(col(WINDOW_WEEK).is_not_null())
            .collect()?;
        let window_weeks = frame::dedup_by(&window_weeks, &window_keys)?
            .lazy()
            .with_columns([
                col(WINDOW_WEEK).alias(MATCHED_WEEK),
                col(WINDOW_WEEK).cast(DataType::Float64).alias(ASOF_KEY),
            ])
            .sort([ASOF_KEY], SortMultipleOptions::default().with_maintain_order(true));

        let mut target_cols = key_exprs.clone();
        target_cols.push(col(WEEK).cast(DataType::Int64).alias(TARGET_WEEK));
        // half a week back turns the backward as-of match into a strict one
        let queries = targets
            .clone()
            .lazy()
            .select(target_cols)
            .filter(col(TARGET_WEEK).is_not_null())
            .with_row_index(TARGET_ROW, None)
            .with_column((col(TARGET_WEEK).cast(DataType::Float64) - lit(0.5)).alias(ASOF_KEY))
            .sort([ASOF_KEY], SortMultipleOptions::default().with_maintain_order(true));

        let options = AsOfOptions {
            strategy: AsofStrategy::Backward,
            left_by: Some(by.clone()),
            right_by: Some(by),
            ..Default::default()
        };
        let matched = queries
            .join(
                window_weeks.select([key_exprs.clone(), vec![col(MATCHED_WEEK), col(ASOF_KEY)]].concat()),
                [col(ASOF_KEY)],
                [col(ASOF_KEY)],
                JoinArgs::new(JoinType::AsOf(options)),
            )
            .collect()?;

        let unmatched = matched.column(MATCHED_WEEK)?.null_count();
        if unmatched > 0 {
            debug!(unmatched, "targets with no earlier window");
        }

        let mut mapping_keys = key_exprs;
        mapping_keys.push(col(MATCHED_WEEK));
        let mut mapping_cols: Vec<Expr> = keys.iter().map(|k| col(*k)).collect();
        mapping_cols.push(col(MATCHED_WEEK));
        mapping_cols.push(col(TARGET_WEEK));
        let mapping = matched
            .lazy()
            .filter(col(MATCHED_WEEK).is_not_null())
            .filter(col(TARGET_ROW).eq(col(TARGET_ROW).max().over(mapping_keys)))
            .select(mapping_cols)
            .collect()?;

        let mut left_on = keys.clone();
        left_on.push(WEEK);
        let mut right_on = keys;
        right_on.push(MATCHED_WEEK);
        let base = frame::drop_present(windows, &[TARGET_WEEK]);
        Ok(frame::join(&base, &mapping, &left_on, &right_on, JoinType::Left)?)
    }

    /// `means` over `source`, aligned to `targets`, joined back on
    /// (entity, season, week) = (entity, season, new_week). Window columns
    /// that collide with a target column are dropped.
    pub fn attach(&self, targets: &DataFrame, source: &DataFrame, features: &[&str], how: JoinType) -> Result<DataFrame> {
        let windows = self.means(source, features)?;
        let aligned = self.align(&windows, targets)?;
        let keys = self.group_keys();
        let mut left_on = keys.clone();
        left_on.push(WEEK);
        let mut right_on = keys;
        right_on.push(TARGET_WEEK);
        Ok(frame::join(targets, &aligned, &left_on, &right_on, how)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weekly(points: &[(i64, Option<f64>)]) -> DataFrame {
        let weeks: Vec<i64> = points.iter().map(|p| p.0).collect();
        let values: Vec<Option<f64>> = points.iter().map(|p| p.1).collect();
        df!(
            "player_id" => vec!["P1"; points.len()],
            "season" => vec![2023i64; points.len()],
            "week" => weeks,
            "points" => values,
        )
        .unwrap()
    }

    #[test]
    fn means_need_a_full_window() {
        let df = weekly(&[(2, Some(4.0)), (1, Some(2.0)), (3, None), (4, Some(8.0))]);
        let out = RollingWindow::new(&["player_id"], 2).means(&df, &["points"]).unwrap();
        assert_eq!(frame::floats(&out, "points").unwrap(), vec![None, Some(3.0), None, None]);
        assert_eq!(
            frame::ints(&out, "week").unwrap(),
            vec![Some(1), Some(2), Some(3), Some(4)]
        );
    }

    #[test]
    fn groups_do_not_share_windows() {
        let df = df!(
            "player_id" => ["P1", "P2", "P1", "P2"],
            "season" => [2023i64, 2023, 2023, 2023],
            "week" => [1i64, 1, 2, 2],
            "points" => [1.0, 10.0, 3.0, 30.0],
        )
        .unwrap();
        let out = RollingWindow::new(&["player_id"], 2).means(&df, &["points"]).unwrap();
        assert_eq!(
            frame::floats(&out, "points").unwrap(),
            vec![None, Some(2.0), None, Some(20.0)]
        );
    }

    #[test]
    fn align_skips_bye_weeks() {
        let df = weekly(&[(1, Some(2.0)), (2, Some(4.0)), (5, Some(6.0))]);
        let rolling = RollingWindow::new(&["player_id"], 2);
        let windows = rolling.means(&df, &["points"]).unwrap();
        let aligned = rolling.align(&windows, &df).unwrap();
        // week 2's window feeds week 5; nothing precedes week 1
        assert_eq!(
            frame::ints(&aligned, TARGET_WEEK).unwrap(),
            vec![Some(2), Some(5), None]
        );
    }

    #[test]
    fn last_target_wins() {
        let source = weekly(&[(1, Some(2.0)), (2, Some(4.0))]);
        let targets = weekly(&[(4, None), (3, None)]);
        let rolling = RollingWindow::new(&["player_id"], 1);
        let windows = rolling.means(&source, &["points"]).unwrap();
        let aligned = rolling.align(&windows, &targets).unwrap();
        assert_eq!(frame::ints(&aligned, TARGET_WEEK).unwrap(), vec![None, Some(3)]);
    }

    #[test]
    fn attach_drops_colliding_columns() {
        let df = weekly(&[(1, Some(2.0)), (2, Some(4.0)), (3, Some(9.0))]);
        let out = RollingWindow::new(&["player_id"], 2)
            .attach(&df, &df, &["points"], JoinType::Inner)
            .unwrap();
        assert_eq!(out.height(), 2);
        assert!(!frame::names(&out).iter().any(|c| c.ends_with(frame::REMOVE_SUFFIX)));
        // the target keeps its own points; the window copy was a collision
        assert_eq!(frame::f64_at(&out, "points", 1), Some(9.0));
        assert_eq!(frame::f64_at(&out, "week", 1), Some(3.0));
        assert!(!frame::has(&out, TARGET_WEEK));
    }
}
