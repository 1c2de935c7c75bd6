use std::time::Instant;

use nhlproj::{
    assemble_model_table, init_logging, log_stage_finish, log_stage_output, log_stage_start,
    logging_config_from_env, pipeline_config_from_env, read_parquet, write_parquet, EntityKind,
};

const STAGE: &str = "build_model_tables";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging = logging_config_from_env();
    init_logging(&logging)?;
    let config = pipeline_config_from_env()?;
    let started = Instant::now();
    log_stage_start(STAGE, &logging, &config.layout.root);

    for entity in [EntityKind::Team, EntityKind::Skater, EntityKind::Goalie] {
        let raw = read_parquet(&config.layout.processed_path(entity))?;
        let features = read_parquet(&config.layout.features_path(entity))?;
        let model = assemble_model_table(entity, &features, &raw)?;
        let path = config.layout.model_table_path(entity);
        write_parquet(&path, &model.table)?;
        log_stage_output(
            STAGE,
            &path,
            model.table.num_rows(),
            Some(model.table.num_columns()),
        );
    }

    log_stage_finish(STAGE, started.elapsed().as_millis());
    Ok(())
}
