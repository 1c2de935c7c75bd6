//! Projects upcoming games from each team's latest feature snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::features::EntityKind;
use crate::normalize::{require_column, SchemaError, ID_COLUMNS};
use crate::regressors::{FittedPipeline, RegressorError};
use crate::schedule::ScheduleEntry;
use crate::table::{Column, Table, TableError};
use crate::training::{artifact_path, load_artifact, TrainError};

pub const GOALS_FOR: &str = "y_goalsFor";
pub const GOALS_AGAINST: &str = "y_goalsAgainst";
pub const SOG_FOR: &str = "y_shotsOnGoalFor";
pub const SOG_AGAINST: &str = "y_shotsOnGoalAgainst";
pub const XG_FOR: &str = "y_xGoalsFor";
pub const XG_AGAINST: &str = "y_xGoalsAgainst";

pub const TEAM_PROJECTION_TARGETS: [&str; 6] =
    [GOALS_FOR, GOALS_AGAINST, SOG_FOR, SOG_AGAINST, XG_FOR, XG_AGAINST];

pub const LAST_GAME_DATE: &str = "last_gameDate";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Home => "home_",
            Self::Away => "away_",
        }
    }
}

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Regressor(#[from] RegressorError),
    #[error(transparent)]
    Train(#[from] TrainError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRow {
    #[serde(rename = "gameId")]
    pub game_id: i64,
    #[serde(rename = "scheduleDate")]
    pub schedule_date: String,
    #[serde(rename = "homeTeam")]
    pub home_team: String,
    #[serde(rename = "awayTeam")]
    pub away_team: String,
    pub home_rest_days: Option<i64>,
    pub away_rest_days: Option<i64>,
    pub home_goals: Option<f64>,
    pub away_goals: Option<f64>,
    pub home_sog: Option<f64>,
    pub away_sog: Option<f64>,
    pub home_xg: Option<f64>,
    pub away_xg: Option<f64>,
    pub proj_total_goals: Option<f64>,
    pub proj_total_sog: Option<f64>,
}

/// Trained team pipelines keyed by target name.
#[derive(Debug, Clone, Default)]
pub struct TeamModels {
    pub by_target: HashMap<String, FittedPipeline>,
}

impl TeamModels {
    /// Loads every projection target's artifact. A missing file leaves that
    /// target out with a warning; a corrupt one is an error.
    pub fn load(models_dir: &Path) -> Result<Self, ProjectionError> {
        let mut by_target = HashMap::new();
        for target in TEAM_PROJECTION_TARGETS {
            let path = artifact_path(models_dir, EntityKind::Team, target);
            if !path.exists() {
                warn!(
                    component = "projection",
                    event = "projection.model.missing",
                    target,
                    path = %path.display()
                );
                continue;
            }
            let artifact = load_artifact(&path)?;
            by_target.insert(target.to_string(), artifact.pipeline);
        }
        info!(
            component = "projection",
            event = "projection.models.loaded",
            loaded = by_target.len(),
            expected = TEAM_PROJECTION_TARGETS.len()
        );
        Ok(Self { by_target })
    }
}

/// Team feature columns used for snapshots: the `team_` role prefix minus
/// identifiers.
pub fn snapshot_feature_columns(features: &Table) -> Vec<String> {
    let prefix = EntityKind::Team.feature_prefix();
    features
        .column_names()
        .into_iter()
        .filter(|c| c.starts_with(prefix) && !ID_COLUMNS.contains(c))
        .map(str::to_string)
        .collect()
}

/// Each team's most recent feature row, as `team`, `last_gameDate` and the
/// snapshot feature columns. Rows with a null team or date are ignored.
pub fn latest_team_snapshots(features: &Table) -> Result<Table, ProjectionError> {
    let team = require_column(features, "team_features", "team", &["team"])?;
    let date = require_column(features, "team_features", "gameDate", &["gameDate"])?;
    let (Some(teams), Some(dates)) = (features.column(team), features.column(date)) else {
        return Ok(Table::new());
    };

    let mut latest: HashMap<String, usize> = HashMap::new();
    for row in 0..features.num_rows() {
        let (Some(code), Some(day)) = (teams.text_at(row), dates.date_at(row)) else {
            continue;
        };
        let code = code.trim().to_string();
        match latest.get(&code) {
            Some(prev) if dates.date_at(*prev).is_some_and(|d| d > day) => {}
            _ => {
                latest.insert(code, row);
            }
        }
    }

    let mut order = latest.into_iter().collect::<Vec<_>>();
    order.sort();
    let rows = order.iter().map(|(_, row)| *row).collect::<Vec<_>>();

    let mut keep = vec![team.to_string(), date.to_string()];
    keep.extend(snapshot_feature_columns(features));
    let mut snapshots = features.select(&keep)?.take(&rows)?;
    snapshots.rename_column(date, LAST_GAME_DATE)?;
    snapshots.set_column(Column::string(
        "team",
        order.into_iter().map(|(code, _)| Some(code)).collect(),
    ))?;
    Ok(snapshots)
}

/// Schedule rows joined with the home and away snapshots, snapshot columns
/// renamed `home_<col>` / `away_<col>`.
pub fn build_matchup_table(
    schedule: &[ScheduleEntry],
    snapshots: &Table,
) -> Result<Table, ProjectionError> {
    let mut table = Table::from_columns(vec![
        Column::int("gameId", schedule.iter().map(|g| Some(g.game_id)).collect()),
        Column::date(
            "scheduleDate",
            schedule.iter().map(|g| Some(g.schedule_date)).collect(),
        ),
        Column::string(
            "homeTeam",
            schedule.iter().map(|g| Some(g.home_team.clone())).collect(),
        ),
        Column::string(
            "awayTeam",
            schedule.iter().map(|g| Some(g.away_team.clone())).collect(),
        ),
    ])?;

    if !snapshots.has_column("team") {
        return Ok(table);
    }
    for (side, key) in [(Side::Home, "homeTeam"), (Side::Away, "awayTeam")] {
        let mut leg = snapshots.clone();
        leg.rename_all(|name| format!("{}{name}", side.prefix()))?;
        leg.rename_column(&format!("{}team", side.prefix()), key)?;
        table = table.left_join(&leg, &[key])?;
    }
    Ok(table)
}

/// Features of one side with the side prefix removed, ready for a pipeline
/// trained on un-prefixed team feature names.
pub fn leg_features(matchups: &Table, side: Side) -> Result<Table, TableError> {
    let prefix = side.prefix();
    let mut leg = matchups.clone();
    leg.retain_columns(|name| name.starts_with(prefix))?;
    leg.rename_all(|name| name.strip_prefix(prefix).unwrap_or(name).to_string())?;
    Ok(leg)
}

/// `0.5 * a + 0.5 * b`, null if either side is null.
pub fn blend(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    Some(0.5 * a? + 0.5 * b?)
}

pub fn project_games(
    schedule: &[ScheduleEntry],
    team_features: &Table,
    models: &TeamModels,
) -> Result<Vec<ProjectionRow>, ProjectionError> {
    let snapshots = latest_team_snapshots(team_features)?;
    let matchups = build_matchup_table(schedule, &snapshots)?;
    let home_leg = leg_features(&matchups, Side::Home)?;
    let away_leg = leg_features(&matchups, Side::Away)?;

    let mut home_pred: HashMap<&str, Vec<f64>> = HashMap::new();
    let mut away_pred: HashMap<&str, Vec<f64>> = HashMap::new();
    for target in TEAM_PROJECTION_TARGETS {
        let Some(pipeline) = models.by_target.get(target) else {
            warn!(
                component = "projection",
                event = "projection.target.unavailable",
                target
            );
            continue;
        };
        home_pred.insert(target, pipeline.predict_table(&home_leg)?);
        away_pred.insert(target, pipeline.predict_table(&away_leg)?);
    }
    let at = |preds: &HashMap<&str, Vec<f64>>, target: &str, row: usize| {
        preds.get(target).map(|values| values[row])
    };

    let home_last = matchups.column("home_last_gameDate");
    let away_last = matchups.column("away_last_gameDate");
    let rest_days = |last: Option<&Column>, row: usize, day: chrono::NaiveDate| {
        last.and_then(|c| c.date_at(row)).map(|d| (day - d).num_days())
    };

    let mut out = schedule
        .iter()
        .enumerate()
        .map(|(row, game)| {
            let home_goals = blend(
                at(&home_pred, GOALS_FOR, row),
                at(&away_pred, GOALS_AGAINST, row),
            );
            let away_goals = blend(
                at(&away_pred, GOALS_FOR, row),
                at(&home_pred, GOALS_AGAINST, row),
            );
            let home_sog = blend(at(&home_pred, SOG_FOR, row), at(&away_pred, SOG_AGAINST, row));
            let away_sog = blend(at(&away_pred, SOG_FOR, row), at(&home_pred, SOG_AGAINST, row));
            let home_xg = blend(at(&home_pred, XG_FOR, row), at(&away_pred, XG_AGAINST, row));
            let away_xg = blend(at(&away_pred, XG_FOR, row), at(&home_pred, XG_AGAINST, row));
            ProjectionRow {
                game_id: game.game_id,
                schedule_date: game.schedule_date.format("%Y-%m-%d").to_string(),
                home_team: game.home_team.clone(),
                away_team: game.away_team.clone(),
                home_rest_days: rest_days(home_last.as_ref(), row, game.schedule_date),
                away_rest_days: rest_days(away_last.as_ref(), row, game.schedule_date),
                home_goals,
                away_goals,
                home_sog,
                away_sog,
                home_xg,
                away_xg,
                proj_total_goals: home_goals.zip(away_goals).map(|(h, a)| h + a),
                proj_total_sog: home_sog.zip(away_sog).map(|(h, a)| h + a),
            }
        })
        .collect::<Vec<_>>();

    out.sort_by(|a, b| {
        (&a.schedule_date, &a.home_team, &a.away_team).cmp(&(
            &b.schedule_date,
            &b.home_team,
            &b.away_team,
        ))
    });

    let without_snapshot = out
        .iter()
        .filter(|r| r.home_rest_days.is_none() || r.away_rest_days.is_none())
        .count();
    if without_snapshot > 0 {
        warn!(
            component = "projection",
            event = "projection.snapshot.missing",
            games = without_snapshot
        );
    }
    info!(
        component = "projection",
        event = "projection.finish",
        games = out.len(),
        teams_with_snapshot = snapshots.num_rows(),
        targets = home_pred.len()
    );
    Ok(out)
}

pub fn projection_path(preds_dir: &Path, days: u32) -> PathBuf {
    preds_dir.join(format!("team_game_projections_next{days}.csv"))
}
