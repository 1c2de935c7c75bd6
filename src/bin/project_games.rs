use std::time::Instant;

use chrono::{Days, Utc};
use nhlproj::{
    init_logging, load_schedule, log_stage_finish, log_stage_output, log_stage_start,
    logging_config_from_env, pipeline_config_from_env, project_games, projection_path,
    read_parquet, write_csv_rows, EntityKind, TeamModels,
};
use tracing::warn;

const STAGE: &str = "project_games";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging = logging_config_from_env();
    init_logging(&logging)?;
    let config = pipeline_config_from_env()?;
    let started = Instant::now();
    log_stage_start(STAGE, &logging, &config.layout.root);

    let team_features = read_parquet(&config.layout.features_path(EntityKind::Team))?;
    let models = TeamModels::load(&config.layout.models_dir())?;

    let today = Utc::now().date_naive();
    let until = today
        .checked_add_days(Days::new(u64::from(config.projection_days)))
        .ok_or("projection window overflows the calendar")?;
    let schedule = load_schedule(&config.schedule_path_or_default(), today, until)?;
    if schedule.is_empty() {
        warn!(
            component = "projection",
            event = "projection.schedule.empty",
            from = %today,
            to = %until
        );
        log_stage_finish(STAGE, started.elapsed().as_millis());
        return Ok(());
    }

    let rows = project_games(&schedule, &team_features, &models)?;
    let path = projection_path(&config.layout.preds_dir(), config.projection_days);
    write_csv_rows(&path, &rows)?;
    log_stage_output(STAGE, &path, rows.len(), None);

    log_stage_finish(STAGE, started.elapsed().as_millis());
    Ok(())
}
