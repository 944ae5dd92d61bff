use polars::prelude::*;
use wr_features::frame;
use wr_features::game_key::GameKeyIndex;
use wr_features::impute::FallbackImputer;
use wr_features::rolling::{RollingWindow, TARGET_WEEK};
use wr_features::teams::{COMMON_CLUB_CODES, COMPOSITE_COLUMNS, TEAM_COLUMNS, TeamCodeMap};
use wr_features::top_n::TopNFilter;

fn weekly_points(weeks: &[(i64, f64)]) -> DataFrame {
    df!(
        "player_id" => vec!["P1"; weeks.len()],
        "season" => vec![2022i64; weeks.len()],
        "week" => weeks.iter().map(|w| w.0).collect::<Vec<_>>(),
        "receiving_fpoints" => weeks.iter().map(|w| w.1).collect::<Vec<_>>(),
    )
    .expect("frame should build")
}

#[test]
fn canonical_codes_are_never_aliases() {
    let map = TeamCodeMap::new(&[("OAK", "LV"), ("SD", "LAC"), ("STL", "LA"), ("LAR", "LA")])
        .expect("map should build");
    let mut df = df!(
        "team" => ["OAK", "LAR"],
        "opp_team" => ["SD", "KC"],
        "game_id" => ["2019_01_OAK_SD", "2019_02_LAR_KC"],
    )
    .expect("frame should build");
    map.normalize_table(&mut df, TEAM_COLUMNS, COMPOSITE_COLUMNS)
        .expect("normalize");
    for column in ["team", "opp_team"] {
        for code in frame::texts(&df, column).expect("texts").into_iter().flatten() {
            assert!(!map.is_alias(&code), "{code} is still an alias");
        }
    }
    assert_eq!(frame::str_at(&df, "game_id", 0).as_deref(), Some("2019_01_LV_LAC"));
    assert_eq!(frame::str_at(&df, "game_id", 1).as_deref(), Some("2019_02_LA_KC"));

    let common = TeamCodeMap::common();
    for (from, _) in COMMON_CLUB_CODES {
        assert!(!common.is_alias(common.canonical(from)));
    }
}

#[test]
fn chained_aliases_resolve_to_the_final_code() {
    let map = TeamCodeMap::new(&[("STL", "LAR"), ("LAR", "LA")]).expect("map should build");
    assert_eq!(map.canonical("STL"), "LA");
    assert!(TeamCodeMap::new(&[("A", "B"), ("B", "A")]).is_err());
}

#[test]
fn one_game_per_team_week_and_no_bye_rows() {
    let schedule = df!(
        "game_id" => ["2021_01_BUF_KC", "2021_02_KC_DEN"],
        "season" => [2021i64, 2021],
        "week" => [1i64, 2],
        "home_team" => ["KC", "DEN"],
        "away_team" => ["BUF", "KC"],
    )
    .expect("frame should build");
    let games = GameKeyIndex::from_schedule(&schedule).expect("schedule should index");
    assert_eq!(games.len(), 4);

    // BUF is on bye in week 2
    let players = df!(
        "player_id" => ["a", "a", "b"],
        "team" => ["KC", "KC", "BUF"],
        "week" => [1i64, 2, 2],
        "season" => [2021i64, 2021, 2021],
    )
    .expect("frame should build");
    let keyed = games.attach(&players, "week", "team", "season").expect("attach should work");
    assert_eq!(keyed.height(), 2);
    let ids: Vec<String> = frame::texts(&keyed, "game_id").expect("texts").into_iter().flatten().collect();
    assert_eq!(ids, vec!["2021_01_BUF_KC", "2021_02_KC_DEN"]);
}

#[test]
fn week_four_window_is_the_mean_of_weeks_two_and_three() {
    let df = weekly_points(&[(1, 2.0), (2, 4.0), (3, 10.0), (4, 30.0)]);
    let rolling = RollingWindow::new(&["player_id"], 2);
    let mut windows = rolling.means(&df, &["receiving_fpoints"]).expect("means");
    frame::rename_present(&mut windows, &[("receiving_fpoints", "past")]).expect("rename");
    let aligned = rolling.align(&windows, &df).expect("align");
    let with_past = frame::join(
        &df,
        &aligned,
        &["player_id", "season", "week"],
        &["player_id", "season", TARGET_WEEK],
        JoinType::Left,
    )
    .expect("join");

    assert_eq!(
        frame::floats(&with_past, "past").expect("past"),
        vec![None, None, Some(3.0), Some(7.0)]
    );
}

#[test]
fn imputation_keeps_observed_values_and_closes_gaps() {
    let mut df = df!(
        "player_id" => ["A", "A", "B", "C"],
        "season" => [2020i64, 2020, 2021, 2022],
        "yards" => [Some(12.0), None, None, Some(40.0)],
    )
    .expect("frame should build");
    let before = frame::floats(&df, "yards").expect("yards");
    let report = FallbackImputer::new("player_id", "season")
        .league_wide(true)
        .impute(&mut df, &["yards"])
        .expect("impute");
    let after = frame::floats(&df, "yards").expect("yards");
    for (new, old) in after.iter().zip(before) {
        if let Some(value) = old {
            assert_eq!(*new, Some(value));
        }
    }
    assert!(after.iter().all(Option::is_some));
    assert_eq!(report.remaining_total(), 0);
    assert_eq!(after[1], Some(12.0));
}

#[test]
fn top_two_rank_in_with_their_history() {
    let mut players = Vec::new();
    let mut weeks = Vec::new();
    let mut points = Vec::new();
    for (player, week3) in [("p10", 10.0), ("p8", 8.0), ("p5", 5.0)] {
        for (week, value) in [(1i64, 1.0), (2, 2.0), (3, week3)] {
            players.push(player);
            weeks.push(week);
            points.push(value);
        }
    }
    let df = df!(
        "player_id" => players,
        "season" => vec![2022i64; 9],
        "week" => weeks,
        "receiving_fpoints" => points,
    )
    .expect("frame should build");
    let kept = TopNFilter::new(2, 2).apply(&df).expect("filter");
    let ids = frame::texts(&kept, "player_id").expect("ids");
    let kept_weeks = frame::ints(&kept, "week").expect("weeks");
    let has = |player: &str, week: i64| {
        ids.iter()
            .zip(&kept_weeks)
            .any(|(p, w)| p.as_deref() == Some(player) && *w == Some(week))
    };

    assert!(has("p10", 3) && has("p8", 3));
    assert_eq!(kept_weeks.iter().filter(|w| **w == Some(3)).count(), 2);
    for player in ["p10", "p8"] {
        for week in [1, 2] {
            assert!(has(player, week), "{player} week {week} history missing");
        }
    }
    assert!(!has("p5", 3));
}
