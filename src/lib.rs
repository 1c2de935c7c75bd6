//! NHL projection core crate.
//!
//! Current implemented scope:
//! - raw game-by-game CSV collation into processed team/skater/goalie tables
//! - schema normalization and leakage-free rolling features per entity
//! - model-table assembly, season-holdout training and model selection
//! - upcoming-game projections from the latest team snapshots

mod config;
mod features;
mod ingest;
mod model_table;
mod normalize;
mod observability;
mod projection;
mod regressors;
mod schedule;
mod storage;
mod table;
mod training;

pub use config::{
    current_season_start, pipeline_config_from_env, pipeline_config_from_sources,
    validate_pipeline_config, ConfigError, DataLayout, PipelineConfig, PlayerKind,
    DEFAULT_NHL_ROOT, DEFAULT_PROJECTION_DAYS, DEFAULT_SEASON_TYPE, DEFAULT_START_SEASON,
};
pub use features::{
    assert_schema_compatible, build_feature_schema, build_goalie_features, build_skater_features,
    build_team_features, days_since_previous, per60, rolling_column_name, rolling_features,
    shift_by_one, sort_by_entity, trailing_mean, EntityKind, FeatureBuild, FeatureBuildReport,
    FeatureColumn, FeatureDType, FeatureError, FeatureSchema, RollingConfig, RollingSpec,
    DEFAULT_WINDOWS, FEATURE_SCHEMA_VERSION, GOALIE_GOALS_AGAINST_ALIASES, GOALIE_SAVES_ALIASES,
    GOALIE_SHOTS_AGAINST_ALIASES, REST_DAYS_COLUMN, SAVE_PCT_COLUMN, SKATER_COUNT_COLUMNS,
    TEAM_STAT_ALIASES,
};
pub use ingest::{
    list_csv_files, load_player_games, load_team_games, IngestBuild, IngestError, IngestReport,
    SeasonRange,
};
pub use model_table::{
    assemble_model_table, target_specs, ModelTableBuild, ModelTableError, ModelTableReport,
    TargetSpec, TARGET_PREFIX,
};
pub use normalize::{
    coerce_integer_column, dedup_rows, ensure_minutes, first_present, first_row_mask,
    header_base, median, normalize_game_table, normalize_team_code, normalize_team_columns, parse_date_column,
    parse_game_date, require_column, retain_situation_all, standardize_game_columns,
    strip_and_dedup_columns, DedupReport, SchemaError, GAME_DATE_ALIASES, GAME_ID_ALIASES,
    HOME_OR_AWAY_ALIASES, ICE_TIME_ALIASES, ICE_TIME_MINUTES, ID_COLUMNS, PLAYER_ID_ALIASES,
    SITUATION_ALL, TEAM_ALIASES, TEAM_OPP_ALIASES,
};
pub use observability::{
    init_logging, log_stage_finish, log_stage_output, log_stage_start, logging_config_from_env,
    logging_config_from_lookup, LogFormat, LoggingConfig, LoggingInitError,
};
pub use projection::{
    blend, build_matchup_table, latest_team_snapshots, leg_features, project_games,
    projection_path, snapshot_feature_columns, ProjectionError, ProjectionRow, Side, TeamModels,
    GOALS_AGAINST, GOALS_FOR, LAST_GAME_DATE, SOG_AGAINST, SOG_FOR, TEAM_PROJECTION_TARGETS,
    XG_AGAINST, XG_FOR,
};
pub use regressors::{
    feature_rows, mean_absolute_error, root_mean_squared_error, Binner, BoostedTrees,
    CandidateParams, FittedModel, FittedPipeline, ForestParams, HgbParams, MedianImputer,
    RandomForest, RegressionTree, Regressor, RegressorError, RidgeModel, RidgeParams, StdScaler,
    Strategy, TreeNode,
};
pub use schedule::{
    is_regular_season, load_schedule, parse_schedule_json, read_schedule_csv, ScheduleEntry,
    ScheduleError,
};
pub use storage::{
    read_csv_from, read_csv_table, read_parquet, write_atomic, write_csv_rows, write_json,
    write_parquet, StorageError,
};
pub use table::{Column, ColumnData, ColumnKind, KeyCell, Table, TableError};
pub use training::{
    artifact_path, feature_columns, load_artifact, report_path, save_training_outcome,
    target_columns, train_entity_models, ModelArtifact, ModelReportRow, TrainConfig, TrainError,
    TrainingOutcome,
};
