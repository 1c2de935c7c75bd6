use std::time::Instant;

use chrono::Utc;
use nhlproj::{
    init_logging, load_player_games, load_team_games, log_stage_finish, log_stage_output,
    log_stage_start, logging_config_from_env, pipeline_config_from_env, write_parquet, EntityKind,
    PlayerKind, SeasonRange,
};

const STAGE: &str = "ingest_raw";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging = logging_config_from_env();
    init_logging(&logging)?;
    let config = pipeline_config_from_env()?;
    let started = Instant::now();
    log_stage_start(STAGE, &logging, &config.layout.root);

    let seasons = SeasonRange {
        start: config.start_season,
        end: config.resolved_end_season(Utc::now().date_naive()),
    };
    if seasons.end < seasons.start {
        return Err(format!(
            "invalid season range: start={} end={}",
            seasons.start, seasons.end
        )
        .into());
    }

    let team = load_team_games(&config.layout, &config.season_type, seasons)?;
    let team_path = config.layout.processed_path(EntityKind::Team);
    write_parquet(&team_path, &team.table)?;
    log_stage_output(STAGE, &team_path, team.table.num_rows(), Some(team.table.num_columns()));

    for kind in [PlayerKind::Skaters, PlayerKind::Goalies] {
        let build = load_player_games(&config.layout, &config.season_type, seasons, kind)?;
        let path = config.layout.processed_path(kind.entity());
        write_parquet(&path, &build.table)?;
        log_stage_output(STAGE, &path, build.table.num_rows(), Some(build.table.num_columns()));
    }

    log_stage_finish(STAGE, started.elapsed().as_millis());
    Ok(())
}
