use anyhow::Result;
use polars::prelude::*;
use tracing::info;

use crate::frame;

/// Keeps the best `n` rows per season-week by a metric, plus each kept
/// entity's rows from the `window` weeks before so trailing means can still
/// be computed for them.
#[derive(Debug, Clone)]
pub struct TopNFilter {
    n: usize,
    window: usize,
    metric: String,
    entity: String,
}

impl TopNFilter {
    pub fn new(n: usize, window: usize) -> Self {
        Self {
            n,
            window,
            metric: "receiving_fpoints".to_string(),
            entity: "player_id".to_string(),
        }
    }

    pub fn metric(mut self, metric: &str) -> Self {
        self.metric = metric.to_string();
        self
    }

    pub fn entity(mut self, entity: &str) -> Self {
        self.entity = entity.to_string();
        self
    }

    pub fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        let entity = self.entity.as_str();
        for column in [self.metric.as_str(), entity, "season", "week"] {
            frame::require(df, column)?;
        }

        // nulls rank last within their week
        let rank = col(self.metric.as_str())
            .cast(DataType::Float64)
            .fill_null(lit(f64::NEG_INFINITY))
            .rank(
                RankOptions {
                    method: RankMethod::Ordinal,
                    descending: true,
                },
                None,
            )
            .over([col("season"), col("week")]);
        let kept = df
            .clone()
            .lazy()
            .filter(
                col("week")
                    .gt(lit(1i64))
                    .and(rank.lt_eq(lit(self.n as u32))),
            )
            .collect()?;
        let ranked_in = kept.height();

        let week_keys = kept.select(["season", entity, "week"])?;
        let history_keys = (1..=self.window as i64)
            .map(|back| {
                week_keys
                    .clone()
                    .lazy()
                    .with_column((col("week") - lit(back)).alias("week"))
            })
            .collect::<Vec<_>>();
        let history = if history_keys.is_empty() {
            kept.clear()
        } else {
            let wanted = concat(history_keys, UnionArgs::default())?.filter(col("week").gt_eq(lit(1i64)));
            let keys = [col("season"), col(entity), col("week")];
            df.clone()
                .lazy()
                .join(wanted, keys.clone(), keys, JoinArgs::new(JoinType::Semi))
                .collect()?
        };

        let combined = frame::concat(vec![kept, history])?;
        let sorted = frame::sort_asc(&combined, &["season", entity, "week"])?;
        let out = frame::dedup_by(&sorted, &["season", entity, "week"])?;
        info!(
            ranked_in,
            total = out.height(),
            n = self.n,
            window = self.window,
            "top-n weekly filter"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weekly(rows: &[(&str, i64, Option<f64>)]) -> DataFrame {
        df!(
            "player_id" => rows.iter().map(|r| r.0).collect::<Vec<_>>(),
            "season" => vec![2023i64; rows.len()],
            "week" => rows.iter().map(|r| r.1).collect::<Vec<_>>(),
            "receiving_fpoints" => rows.iter().map(|r| r.2).collect::<Vec<_>>(),
        )
        .unwrap()
    }

    fn keys(df: &DataFrame) -> Vec<(String, i64)> {
        let ids = frame::texts(df, "player_id").unwrap();
        let weeks = frame::ints(df, "week").unwrap();
        ids.into_iter()
            .zip(weeks)
            .map(|(id, week)| (id.unwrap(), week.unwrap()))
            .collect()
    }

    #[test]
    fn keeps_top_two_and_their_history() {
        let df = weekly(&[
            ("A", 1, Some(3.0)),
            ("B", 1, Some(2.0)),
            ("C", 1, Some(9.0)),
            ("A", 2, Some(10.0)),
            ("B", 2, Some(8.0)),
            ("C", 2, Some(5.0)),
        ]);
        let out = TopNFilter::new(2, 2).apply(&df).unwrap();
        assert_eq!(
            keys(&out),
            vec![
                ("A".to_string(), 1),
                ("A".to_string(), 2),
                ("B".to_string(), 1),
                ("B".to_string(), 2),
            ]
        );
    }

    #[test]
    fn missing_metric_ranks_last() {
        let df = weekly(&[("A", 2, None), ("B", 2, Some(1.0)), ("C", 2, Some(0.5))]);
        let out = TopNFilter::new(2, 0).apply(&df).unwrap();
        assert_eq!(keys(&out), vec![("B".to_string(), 2), ("C".to_string(), 2)]);
    }

    #[test]
    fn week_one_is_never_ranked() {
        let df = weekly(&[("A", 1, Some(30.0))]);
        assert_eq!(TopNFilter::new(5, 2).apply(&df).unwrap().height(), 0);
    }
}
