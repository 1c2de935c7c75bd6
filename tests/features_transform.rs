use nhlproj::{
    assert_schema_compatible, build_feature_schema, build_goalie_features, build_skater_features,
    build_team_features, normalize_team_code, parse_game_date, read_csv_from, write_parquet,
    FeatureBuild, FeatureError, RollingConfig, Table, FEATURE_SCHEMA_VERSION,
};

const TEAM_GAMES: &str = "\
gameId,gameDate,season,team,situation,goalsFor,goalsAgainst
6,2023-10-20,2023,BOS,all,99,3
3,2023-10-14,2023,BOS,all,6,3
1,2023-10-10,2023,BOS,all,2,3
1,2023-10-10,2023,BOS,5on5,1,1
2,2023-10-12,2023,BOS,all,4,3
5,2023-10-18,2023,BOS,all,10,3
4,2023-10-16,2023,BOS,all,8,3
2,2023-10-12,2023,NJ,all,1,4
7,2023-10-15,2023,NJ,all,3,2
";

fn table(csv: &str) -> Table {
    read_csv_from(csv.as_bytes()).expect("csv should parse")
}

fn team_build(csv: &str) -> FeatureBuild {
    build_team_features(&table(csv), &RollingConfig::default()).expect("team features build")
}

fn floats(build: &FeatureBuild, column: &str) -> Vec<Option<f64>> {
    let column = build
        .table
        .column(column)
        .unwrap_or_else(|| panic!("missing column {column}"));
    (0..column.len()).map(|row| column.f64_at(row)).collect()
}

fn texts(build: &FeatureBuild, column: &str) -> Vec<Option<String>> {
    let column = build
        .table
        .column(column)
        .unwrap_or_else(|| panic!("missing column {column}"));
    (0..column.len()).map(|row| column.text_at(row)).collect()
}

#[test]
fn rows_are_sorted_by_team_then_date_and_filtered_to_all_situation() {
    let build = team_build(TEAM_GAMES);
    assert_eq!(build.report.input_rows, 9);
    assert_eq!(build.report.situation_rows_dropped, 1);
    assert_eq!(build.table.num_rows(), 8);

    let teams = texts(&build, "team");
    assert_eq!(teams[..6], vec![Some("BOS".to_string()); 6][..]);
    assert_eq!(teams[6..], vec![Some("NJD".to_string()); 2][..]);

    let dates = texts(&build, "gameDate");
    assert_eq!(dates[0].as_deref(), Some("2023-10-10"));
    assert_eq!(dates[5].as_deref(), Some("2023-10-20"));
}

#[test]
fn first_appearance_has_null_features_and_window_uses_prior_games_only() {
    let build = team_build(TEAM_GAMES);
    let gf5 = floats(&build, "team_5_goalsFor");

    assert_eq!(gf5[0], None);
    assert_eq!(gf5[1], Some(2.0));
    assert_eq!(gf5[2], Some(3.0));
    // Five prior BOS games: 2, 4, 6, 8, 10.
    assert_eq!(gf5[5], Some(6.0));
    assert_eq!(gf5[6], None);
    assert_eq!(gf5[7], Some(1.0));
}

#[test]
fn current_game_outcome_never_reaches_its_own_features() {
    let baseline = team_build(TEAM_GAMES);
    let altered = team_build(&TEAM_GAMES.replace(
        "6,2023-10-20,2023,BOS,all,99,3",
        "6,2023-10-20,2023,BOS,all,0,3",
    ));

    for column in baseline.schema.column_names() {
        assert_eq!(
            floats(&baseline, column),
            floats(&altered, column),
            "{column} changed when only the last game's outcome changed"
        );
    }
}

#[test]
fn constant_history_yields_constant_means_for_every_window() {
    let build = team_build(TEAM_GAMES);
    for window in [5, 10, 20] {
        let values = floats(&build, &format!("team_{window}_goalsAgainst"));
        assert_eq!(values[0], None);
        assert!(values[1..6].iter().all(|v| *v == Some(3.0)));
    }
}

#[test]
fn rest_days_are_rolled_from_the_previous_gap() {
    let build = team_build(TEAM_GAMES);
    let rest5 = floats(&build, "team_5_days_since_prev_game");
    assert_eq!(rest5[0], None);
    assert_eq!(rest5[1], None);
    assert_eq!(rest5[2], Some(2.0));
    assert_eq!(rest5[7], None);
}

#[test]
fn repeated_builds_are_byte_identical_on_disk() {
    let first = team_build(TEAM_GAMES);
    let second = team_build(TEAM_GAMES);
    assert_eq!(first.table, second.table);
    assert_eq!(first.schema, second.schema);

    let dir = tempfile::tempdir().expect("tempdir");
    let a = dir.path().join("a/team_features.parquet");
    let b = dir.path().join("b/team_features.parquet");
    write_parquet(&a, &first.table).expect("write first");
    write_parquet(&b, &second.table).expect("write second");
    assert_eq!(
        std::fs::read(&a).expect("read first"),
        std::fs::read(&b).expect("read second")
    );
}

#[test]
fn schema_fingerprint_is_stable_and_guards_window_changes() {
    let cfg = RollingConfig::default();
    let columns = vec!["goalsFor".to_string(), "goalsAgainst".to_string()];
    let schema = build_feature_schema("team_", &columns, &cfg);
    assert_eq!(schema.version, FEATURE_SCHEMA_VERSION);
    assert_eq!(schema.columns[0].name, "team_5_goalsFor");
    assert_eq!(schema.columns[5].name, "team_20_goalsAgainst");
    assert_eq!(schema.fingerprint.len(), 64);
    assert_schema_compatible(FEATURE_SCHEMA_VERSION, &schema.fingerprint, &schema)
        .expect("same schema is compatible");

    let narrower = RollingConfig {
        windows: vec![5, 10],
        ..RollingConfig::default()
    };
    let other = build_feature_schema("team_", &columns, &narrower);
    let err = assert_schema_compatible(FEATURE_SCHEMA_VERSION, &schema.fingerprint, &other)
        .expect_err("different windows change the fingerprint");
    assert!(matches!(err, FeatureError::SchemaFingerprintMismatch { .. }));
}

#[test]
fn skater_rates_guard_zero_ice_time() {
    let csv = "\
gameId,gameDate,season,team,playerId,situation,icetime,goals
1,2023-10-10,2023,LA,8478,all,0,1
2,2023-10-12,2023,LA,8478,all,1200,1
3,2023-10-14,2023,LA,8478,all,1200,2
";
    let build = build_skater_features(&table(csv), &RollingConfig::default())
        .expect("skater features build");
    assert_eq!(texts(&build, "team")[0].as_deref(), Some("LAK"));
    assert_eq!(texts(&build, "playerId")[0].as_deref(), Some("8478"));

    let goals = floats(&build, "sk_5_goals_per60");
    assert_eq!(goals, vec![None, None, Some(3.0)]);
    let toi = floats(&build, "sk_5_icetime_min");
    assert_eq!(toi, vec![None, Some(0.0), Some(10.0)]);
}

fn assert_close(actual: &[Option<f64>], expected: &[Option<f64>]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        match (a, e) {
            (Some(a), Some(e)) => assert!((a - e).abs() < 1e-9, "{actual:?} vs {expected:?}"),
            _ => assert_eq!(a, e, "{actual:?} vs {expected:?}"),
        }
    }
}

#[test]
fn goalie_save_pct_is_rolled_from_prior_games() {
    let csv = "\
gameId,gameDate,season,playerTeam,player_id,situation,goalsAgainst,sa,icetime
3,2023-10-14,2023,BOS,8471,all,1,20,3600
1,2023-10-10,2023,BOS,8471,all,2,30,3600
1,2023-10-10,2023,BOS,8471,5on5,1,12,2400
2,2023-10-12,2023,BOS,8471,all,3,0,3600
4,2023-10-16,2023,BOS,8471,all,0,25,3600
";
    let build = build_goalie_features(&table(csv), &RollingConfig::default())
        .expect("goalie features build");
    assert_eq!(build.table.num_rows(), 4);
    assert!(!build.table.has_column("player_id"));
    assert_eq!(texts(&build, "playerId"), vec![Some("8471".to_string()); 4]);
    assert_eq!(texts(&build, "team")[0].as_deref(), Some("BOS"));

    // Per-game save_pct: 1 - 2/30, null (no shots against), 1 - 1/20, 1.
    let first = 1.0 - 2.0 / 30.0;
    assert_close(
        &floats(&build, "go_5_save_pct"),
        &[None, Some(first), Some(first), Some((first + 0.95) / 2.0)],
    );
    assert_close(
        &floats(&build, "go_5_goalsAgainst"),
        &[None, Some(2.0), Some(2.5), Some(2.0)],
    );
    assert_close(
        &floats(&build, "go_5_sa"),
        &[None, Some(30.0), Some(15.0), Some(50.0 / 3.0)],
    );
    assert_close(
        &floats(&build, "go_10_icetime_min"),
        &[None, Some(60.0), Some(60.0), Some(60.0)],
    );
}

#[test]
fn provider_aliases_resolve_in_priority_order() {
    let csv = "\
game_id,date,playerTeam,situation,gf,goalsFor
1,20231010,NJ,all,9,2
2,20231012,NJ,all,9,4
";
    let build = team_build(csv);
    assert!(build.table.has_column("team_5_goalsFor"));
    assert!(!build.table.has_column("team_5_gf"));
    assert_eq!(floats(&build, "team_5_goalsFor"), vec![None, Some(2.0)]);
    assert_eq!(texts(&build, "team")[0].as_deref(), Some("NJD"));
    assert_eq!(texts(&build, "gameDate")[1].as_deref(), Some("2023-10-12"));
}

#[test]
fn team_codes_and_dates_normalize() {
    assert_eq!(normalize_team_code(" LA "), "LAK");
    assert_eq!(normalize_team_code("NJ"), "NJD");
    assert_eq!(normalize_team_code("BOS"), "BOS");

    let expected = chrono::NaiveDate::from_ymd_opt(2023, 10, 10);
    assert_eq!(parse_game_date("20231010"), expected);
    assert_eq!(parse_game_date("2023-10-10"), expected);
    assert_eq!(parse_game_date("2023-10-10T19:00:00Z"), expected);
    assert_eq!(parse_game_date("not a date"), None);
    assert_eq!(parse_game_date(""), None);
}
