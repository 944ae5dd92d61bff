use polars::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scoring {
    pub passing_yd_per_point: f64,
    pub passing_td_points: f64,
    pub interception_points: f64,
    pub rushing_yd_per_point: f64,
    pub rushing_td_points: f64,
    pub reception_points: f64,
    pub receiving_yd_per_point: f64,
    pub receiving_td_points: f64,
    pub fumble_lost_points: f64,
    pub two_point_conversion_points: f64,
}

impl Scoring {
    pub fn ppr() -> Self {
        Self {
            passing_yd_per_point: 25.0,
            passing_td_points: 4.0,
            interception_points: -2.0,
            rushing_yd_per_point: 10.0,
            rushing_td_points: 6.0,
            reception_points: 1.0,
            receiving_yd_per_point: 10.0,
            receiving_td_points: 6.0,
            fumble_lost_points: -2.0,
            two_point_conversion_points: 2.0,
        }
    }

    pub fn half_ppr() -> Self {
        let mut scoring = Self::ppr();
        scoring.reception_points = 0.5;
        scoring
    }

    pub fn receiving(&self, line: &ReceivingLine) -> f64 {
        line.yards / self.receiving_yd_per_point
            + line.receptions * self.reception_points
            + line.touchdowns * self.receiving_td_points
            + line.two_point_conversions * self.two_point_conversion_points
            + line.fumbles_lost * self.fumble_lost_points
    }
}

/// Passing points over a frame of summed passer lines with `passing_yards`,
/// `touchdowns`, `interceptions`, `two_point_conversions` and `fumbles_lost`.
pub fn passing_points(scoring: &Scoring) -> Expr {
    col("passing_yards").fill_null(lit(0.0)) / lit(scoring.passing_yd_per_point)
        + col("touchdowns").fill_null(lit(0.0)) * lit(scoring.passing_td_points)
        + col("interceptions").fill_null(lit(0.0)) * lit(scoring.interception_points)
        + col("two_point_conversions").fill_null(lit(0.0)) * lit(scoring.two_point_conversion_points)
        + col("fumbles_lost").fill_null(lit(0.0)) * lit(scoring.fumble_lost_points)
}

impl Default for Scoring {
    fn default() -> Self {
        Self::ppr()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReceivingLine {
    pub yards: f64,
    pub receptions: f64,
    pub touchdowns: f64,
    pub two_point_conversions: f64,
    pub fumbles_lost: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ppr_receiving_line() {
        let line = ReceivingLine {
            yards: 112.0,
            receptions: 7.0,
            touchdowns: 1.0,
            two_point_conversions: 0.0,
            fumbles_lost: 1.0,
        };
        let points = Scoring::ppr().receiving(&line);
        assert!((points - 22.2).abs() < 1e-9);
        assert!((Scoring::half_ppr().receiving(&line) - 18.7).abs() < 1e-9);
    }

    #[test]
    fn passing_points_match_the_line_formula() {
        let df = df!(
            "passing_yards" => [300.0],
            "touchdowns" => [2.0],
            "interceptions" => [1.0],
            "two_point_conversions" => [None::<f64>],
            "fumbles_lost" => [0.0],
        )
        .unwrap();
        let out = df
            .lazy()
            .select([passing_points(&Scoring::ppr()).alias("points")])
            .collect()
            .unwrap();
        let points = out.column("points").unwrap().f64().unwrap().get(0).unwrap();
        assert!((points - 18.0).abs() < 1e-9);
    }
}
