use std::time::Instant;

use nhlproj::{
    build_goalie_features, build_skater_features, build_team_features, init_logging,
    log_stage_finish, log_stage_output, log_stage_start, logging_config_from_env,
    pipeline_config_from_env, read_parquet, write_parquet, EntityKind, FeatureBuild, FeatureError,
    RollingConfig, Table,
};

const STAGE: &str = "build_features";

type Builder = fn(&Table, &RollingConfig) -> Result<FeatureBuild, FeatureError>;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging = logging_config_from_env();
    init_logging(&logging)?;
    let config = pipeline_config_from_env()?;
    let started = Instant::now();
    log_stage_start(STAGE, &logging, &config.layout.root);

    let rolling = config.rolling_config();
    let builders: [(EntityKind, Builder); 3] = [
        (EntityKind::Team, build_team_features),
        (EntityKind::Skater, build_skater_features),
        (EntityKind::Goalie, build_goalie_features),
    ];

    for (entity, build) in builders {
        let raw = read_parquet(&config.layout.processed_path(entity))?;
        let features = build(&raw, &rolling)?;
        let path = config.layout.features_path(entity);
        write_parquet(&path, &features.table)?;
        log_stage_output(
            STAGE,
            &path,
            features.table.num_rows(),
            Some(features.table.num_columns()),
        );
    }

    log_stage_finish(STAGE, started.elapsed().as_millis());
    Ok(())
}
