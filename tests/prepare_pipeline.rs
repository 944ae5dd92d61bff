use std::path::Path;

use polars::prelude::*;
use wr_features::config::DataFiles;
use wr_features::frame;
use wr_features::prepare::{PAST_POINTS, PrepData, RawInputs};
use wr_features::qb;
use wr_features::schema;
use wr_features::table_io;

const POINTS: [f64; 3] = [10.0, 20.0, 5.0];

fn game_id(week: i64) -> String {
    format!("2019_{week:02}_OAK_DEN")
}

/// One column per schema name; `value` picks each column's cells by week.
fn frame_for(columns: &[&str], weeks: &[i64], value: impl Fn(&str, i64) -> AnyValue<'static>) -> DataFrame {
    let columns: Vec<Column> = columns
        .iter()
        .map(|name| {
            let cells: Vec<AnyValue> = weeks.iter().map(|&week| value(name, week)).collect();
            Series::from_any_values((*name).into(), &cells, true)
                .expect("cells should share a type")
                .into()
        })
        .collect();
    DataFrame::new(columns).expect("columns should line up")
}

fn text(value: &str) -> AnyValue<'static> {
    AnyValue::StringOwned(value.into())
}

fn receiving() -> DataFrame {
    frame_for(schema::RECEIVING.required, &[1, 2, 3], |column, week| match column {
        "player_id" => text("00-0000001"),
        "game_id" => text(&game_id(week)),
        "season" => AnyValue::Int64(2019),
        "week" => AnyValue::Int64(week),
        "team" => text("OAK"),
        "opp_team" => text("DEN"),
        "position" => text("WR"),
        "college" => text("Iowa"),
        "receiving_fpoints" => AnyValue::Float64(POINTS[week as usize - 1]),
        "receiving_yards" => AnyValue::Float64(10.0 * week as f64),
        _ => AnyValue::Float64(1.0),
    })
}

fn def_points() -> DataFrame {
    df!(
        "game_id" => (1..=3).map(game_id).collect::<Vec<_>>(),
        "week" => [1i64, 2, 3],
        "defteam" => ["DEN"; 3],
        "total_qb_fpoints_given_up" => [1.0, 2.0, 3.0],
        "total_wr_fpoints_given_up" => [2.0, 4.0, 6.0],
    )
    .expect("def points frame")
}

fn def_injuries() -> DataFrame {
    df!(
        "game_id" => (1..=3).map(game_id).collect::<Vec<_>>(),
        "week" => [1i64, 2, 3],
        "team" => ["DEN"; 3],
        "num_injured_starters" => [1.0, 0.0, 1.0],
    )
    .expect("def injuries frame")
}

fn qb_stats() -> DataFrame {
    frame_for(schema::QB_STATS.required, &[1, 2], |column, week| match column {
        "game_id" => text(&game_id(week)),
        "week" => AnyValue::Int64(week),
        "posteam" => text("OAK"),
        "passer_player_id" => text("00-0000009"),
        "passing_yards" => AnyValue::Float64(200.0 + 100.0 * week as f64),
        _ => AnyValue::Float64(1.0),
    })
}

fn rosters() -> DataFrame {
    df!(
        "game_id" => (1..=3).map(game_id).collect::<Vec<_>>(),
        "season" => [2019i64; 3],
        "week" => [1i64, 2, 3],
        "team" => ["OAK"; 3],
        "player_id" => ["00-0000009"; 3],
        "position" => ["QB"; 3],
        "depth_position" => ["QB"; 3],
        "depth_team" => [1.0; 3],
    )
    .expect("rosters frame")
}

fn write_inputs(dir: &Path, files: &DataFiles) {
    for (df, file) in [
        (receiving(), &files.receiving),
        (def_points(), &files.def_points),
        (def_injuries(), &files.def_injuries),
        (qb_stats(), &files.qb_stats),
        (rosters(), &files.rosters),
    ] {
        table_io::write_csv(&df, &dir.join(file)).expect("fixture csv should write");
    }
}

#[test]
fn week_three_carries_the_mean_of_weeks_one_and_two() {
    let dir = tempfile::tempdir().expect("tempdir");
    let files = DataFiles::default();
    write_inputs(dir.path(), &files);

    let inputs = RawInputs::read(dir.path(), &files).expect("inputs should read");
    let (out, report) = PrepData::new(2, 40).run(&inputs).expect("prepare should run");

    assert_eq!(report.windowed_rows, 1);
    let num = |name: &str| frame::f64_at(&out, name, 0);
    let text = |name: &str| frame::str_at(&out, name, 0);
    assert_eq!(num("week"), Some(3.0));
    assert_eq!(num(PAST_POINTS), Some(15.0));
    assert_eq!(num("receiving_fpoints"), Some(5.0));
    assert_eq!(num("receiving_yards"), Some(15.0));
    assert_eq!(text("team").as_deref(), Some("LV"));
    assert_eq!(text("game_id").as_deref(), Some("2019_03_LV_DEN"));

    // opponent windows and injuries line up on DEN's week 3
    assert_eq!(num("total_qb_fpoints_given_up"), Some(1.5));
    assert_eq!(num("total_wr_fpoints_given_up"), Some(3.0));
    assert_eq!(num("def_inj_starters"), Some(1.0));

    assert_eq!(text(qb::QB_ID).as_deref(), Some("00-0000009"));
    assert_eq!(num(qb::NEW_STARTER), Some(0.0));
    assert_eq!(num(&qb::history_column("passing_yards")), Some(350.0));
    assert_eq!(report.qb_fill.unfilled, 0);
}

#[test]
fn missing_schema_columns_fail_the_read() {
    let dir = tempfile::tempdir().expect("tempdir");
    let files = DataFiles::default();
    write_inputs(dir.path(), &files);
    let broken = def_points().drop("total_wr_fpoints_given_up").expect("column exists");
    table_io::write_csv(&broken, &dir.path().join(&files.def_points)).expect("csv should write");

    let err = RawInputs::read(dir.path(), &files).expect_err("read should fail");
    assert!(format!("{err:#}").contains("total_wr_fpoints_given_up"));
}
