use std::collections::HashSet;

use anyhow::Result;
use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::frame;

/// Fill counts per tier, summed over all imputed columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImputeReport {
    pub entity_season: usize,
    pub entity_career: usize,
    pub season: usize,
    pub league: usize,
    /// Columns still holding gaps, with their missing counts.
    pub remaining: Vec<(String, usize)>,
}

impl ImputeReport {
    pub fn filled(&self) -> usize {
        self.entity_season + self.entity_career + self.season + self.league
    }

    pub fn remaining_total(&self) -> usize {
        self.remaining.iter().map(|(_, n)| n).sum()
    }
}

/// Backfills numeric gaps from progressively coarser group means:
/// entity and season, entity, season, then (optionally) every row.
#[derive(Debug, Clone)]
pub struct FallbackImputer {
    entity: String,
    season: String,
    exclude: HashSet<String>,
    league_wide: bool,
}

impl FallbackImputer {
    pub fn new(entity: &str, season: &str) -> Self {
        Self {
            entity: entity.to_string(),
            season: season.to_string(),
            exclude: HashSet::new(),
            league_wide: false,
        }
    }

    pub fn exclude(mut self, columns: &[&str]) -> Self {
        self.exclude.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    pub fn league_wide(mut self, enabled: bool) -> Self {
        self.league_wide = enabled;
        self
    }

    fn skips(&self, df: &DataFrame, column: &str) -> bool {
        if column == self.entity || column == self.season || self.exclude.contains(column) {
            return true;
        }
        match df.column(column) {
            Ok(c) => *c.dtype() == DataType::String,
            Err(_) => true,
        }
    }

    pub fn impute(&self, df: &mut DataFrame, columns: &[&str]) -> Result<ImputeReport> {
        let mut report = ImputeReport::default();
        for &column in columns {
            if self.skips(df, column) {
                debug!(column, "not imputed");
                continue;
            }
            if null_count(df, column)? == 0 {
                continue;
            }
            report.entity_season +=
                fill_group_mean(df, column, &[self.entity.as_str(), self.season.as_str()])?;
            report.entity_career += fill_group_mean(df, column, &[self.entity.as_str()])?;
            report.season += fill_group_mean(df, column, &[self.season.as_str()])?;
            if self.league_wide {
                report.league += fill_group_mean(df, column, &[])?;
            }
            let left = null_count(df, column)?;
            if left > 0 {
                report.remaining.push((column.to_string(), left));
            }
        }
        info!(
            entity_season = report.entity_season,
            entity_career = report.entity_career,
            season = report.season,
            league = report.league,
            "imputed missing values"
        );
        for (column, left) in &report.remaining {
            warn!(column = column.as_str(), left, "fallbacks exhausted; values left missing");
        }
        Ok(report)
    }
}

fn null_count(df: &DataFrame, column: &str) -> Result<usize> {
    frame::require(df, column)?;
    Ok(df.column(column)?.null_count())
}

/// Replaces `column` by `expr` and returns how many nulls that closed.
fn fill_with_expr(df: &mut DataFrame, column: &str, expr: Expr) -> Result<usize> {
    let before = null_count(df, column)?;
    *df = df.clone().lazy().with_column(expr.alias(column)).collect()?;
    Ok(before - null_count(df, column)?)
}

/// Fills gaps in `column` with the mean of its group; an empty `keys` groups
/// every row together. Rows with a null key are left alone.
pub fn fill_group_mean(df: &mut DataFrame, column: &str, keys: &[&str]) -> Result<usize> {
    for key in keys {
        frame::require(df, key)?;
    }
    let value = col(column).cast(DataType::Float64);
    let expr = if keys.is_empty() {
        value.clone().fill_null(value.mean())
    } else {
        let partition: Vec<Expr> = keys.iter().map(|k| col(*k)).collect();
        when(frame::all_present(keys))
            .then(value.clone().fill_null(value.clone().mean().over(partition)))
            .otherwise(value)
    };
    fill_with_expr(df, column, expr)
}

/// Fills gaps with the most frequent value of the row's group; ties go to
/// the smallest value.
pub fn fill_group_mode(df: &mut DataFrame, column: &str, group: &[&str]) -> Result<usize> {
    frame::require(df, column)?;
    for key in group {
        frame::require(df, key)?;
    }
    const MODE: &str = "__mode";
    const COUNT: &str = "__count";
    let mut counted_by: Vec<Expr> = group.iter().map(|k| col(*k)).collect();
    counted_by.push(col(column));
    let mut order: Vec<&str> = group.to_vec();
    order.extend([COUNT, MODE]);
    let mut descending = vec![false; group.len()];
    descending.extend([true, false]);

    let counts = df
        .clone()
        .lazy()
        .filter(col(column).is_not_null())
        .group_by(counted_by)
        .agg([col(column).count().alias(COUNT)])
        .with_column(col(column).alias(MODE))
        .collect()?;
    let counts = frame::sort(&counts, &order, &descending)?;
    let modes = frame::dedup_by(&counts, group)?.select(group.iter().copied().chain([MODE]))?;

    let mut out = frame::join(df, &modes, group, group, JoinType::Left)?;
    let filled = fill_with_expr(&mut out, column, col(column).fill_null(col(MODE)))?;
    *df = out.drop(MODE)?;
    Ok(filled)
}

pub fn fill_with_max(df: &mut DataFrame, column: &str) -> Result<usize> {
    fill_with_expr(df, column, col(column).fill_null(col(column).max()))
}
