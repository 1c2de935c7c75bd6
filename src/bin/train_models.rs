use std::time::Instant;

use nhlproj::{
    init_logging, log_stage_finish, log_stage_output, log_stage_start, logging_config_from_env,
    pipeline_config_from_env, read_parquet, report_path, save_training_outcome,
    train_entity_models, TrainConfig,
};

const STAGE: &str = "train_models";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging = logging_config_from_env();
    init_logging(&logging)?;
    let config = pipeline_config_from_env()?;
    let started = Instant::now();
    log_stage_start(STAGE, &logging, &config.layout.root);

    let train_cfg = TrainConfig::default();
    let models_dir = config.layout.models_dir();
    for entity in &config.train_entities {
        let table = read_parquet(&config.layout.model_table_path(*entity))?;
        let outcome = train_entity_models(*entity, &table, &train_cfg)?;
        save_training_outcome(&models_dir, &outcome)?;
        log_stage_output(
            STAGE,
            &report_path(&models_dir, *entity),
            outcome.report.len(),
            None,
        );
    }

    log_stage_finish(STAGE, started.elapsed().as_millis());
    Ok(())
}
