//! Season-holdout training and best-by-MAE model selection.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::features::EntityKind;
use crate::model_table::TARGET_PREFIX;
use crate::normalize::ID_COLUMNS;
use crate::regressors::{
    feature_rows, mean_absolute_error, root_mean_squared_error, CandidateParams, FittedPipeline,
    RegressorError, Strategy,
};
use crate::storage::{write_csv_rows, write_json, StorageError};
use crate::table::{ColumnKind, Table};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub params: CandidateParams,
    pub strategies: Vec<Strategy>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            params: CandidateParams::default(),
            strategies: Strategy::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("{entity} model table has no {column} column")]
    MissingColumn { entity: String, column: String },
    #[error("{entity} model table has no rows with a season")]
    NoSeasons { entity: String },
    #[error("no candidate strategies configured")]
    NoStrategies,
    #[error(transparent)]
    Regressor(#[from] RegressorError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to read model artifact {path}: {source}")]
    ArtifactRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode model artifact {path}: {source}")]
    ArtifactDecode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One candidate's holdout result, as written to the report CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReportRow {
    pub target: String,
    pub model: Strategy,
    pub holdout_season: i64,
    #[serde(rename = "MAE")]
    pub mae: f64,
    #[serde(rename = "RMSE")]
    pub rmse: f64,
    pub n_train: usize,
    pub n_test: usize,
    pub n_features: usize,
}

/// Persisted best pipeline for one (entity, target).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub entity: EntityKind,
    pub target: String,
    pub holdout_season: i64,
    pub mae: f64,
    pub rmse: f64,
    pub n_train: usize,
    pub n_test: usize,
    pub pipeline: FittedPipeline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOutcome {
    pub entity: EntityKind,
    pub holdout_season: i64,
    pub feature_columns: Vec<String>,
    pub dropped_non_numeric: Vec<String>,
    pub skipped_targets: Vec<String>,
    pub artifacts: Vec<ModelArtifact>,
    pub report: Vec<ModelReportRow>,
}

/// Numeric columns carrying the entity's role prefix, excluding identifiers.
/// Returns (usable, dropped non-numeric).
pub fn feature_columns(table: &Table, entity: EntityKind) -> (Vec<String>, Vec<String>) {
    let prefix = entity.feature_prefix();
    let mut usable = Vec::new();
    let mut dropped = Vec::new();
    for name in table.column_names() {
        if !name.starts_with(prefix) || ID_COLUMNS.contains(&name) {
            continue;
        }
        if matches!(table.kind(name), Some(ColumnKind::Int | ColumnKind::Float)) {
            usable.push(name.to_string());
        } else {
            dropped.push(name.to_string());
        }
    }
    (usable, dropped)
}

pub fn target_columns(table: &Table) -> Vec<String> {
    table
        .column_names()
        .into_iter()
        .filter(|c| c.starts_with(TARGET_PREFIX))
        .map(str::to_string)
        .collect()
}

pub fn train_entity_models(
    entity: EntityKind,
    table: &Table,
    cfg: &TrainConfig,
) -> Result<TrainingOutcome, TrainError> {
    if cfg.strategies.is_empty() {
        return Err(TrainError::NoStrategies);
    }
    let seasons = table
        .column("season")
        .map(|c| c.to_integer())
        .ok_or_else(|| TrainError::MissingColumn {
            entity: entity.as_str().to_string(),
            column: "season".to_string(),
        })?;
    let holdout_season = seasons
        .iter()
        .flatten()
        .copied()
        .max()
        .ok_or_else(|| TrainError::NoSeasons {
            entity: entity.as_str().to_string(),
        })?;

    let (features, dropped_non_numeric) = feature_columns(table, entity);
    if !dropped_non_numeric.is_empty() {
        warn!(
            component = "training",
            event = "training.features.non_numeric_dropped",
            entity = entity.as_str(),
            columns = ?dropped_non_numeric
        );
    }
    info!(
        component = "training",
        event = "training.start",
        entity = entity.as_str(),
        rows = table.num_rows(),
        features = features.len(),
        holdout_season
    );

    let x = feature_rows(table, &features);
    let mut outcome = TrainingOutcome {
        entity,
        holdout_season,
        feature_columns: features.clone(),
        dropped_non_numeric,
        skipped_targets: Vec::new(),
        artifacts: Vec::new(),
        report: Vec::new(),
    };

    for target in target_columns(table) {
        let y = table
            .column(&target)
            .map(|c| c.to_numeric())
            .unwrap_or_default();
        let (mut train_x, mut train_y, mut test_x, mut test_y) =
            (Vec::new(), Vec::new(), Vec::new(), Vec::new());
        for (row, (season, value)) in seasons.iter().zip(&y).enumerate() {
            let (Some(season), Some(value)) = (season, value) else {
                continue;
            };
            match season.cmp(&holdout_season) {
                Ordering::Less => {
                    train_x.push(x[row].clone());
                    train_y.push(*value);
                }
                Ordering::Equal => {
                    test_x.push(x[row].clone());
                    test_y.push(*value);
                }
                Ordering::Greater => {}
            }
        }

        if train_y.is_empty() || test_y.is_empty() {
            warn!(
                component = "training",
                event = "training.target.skipped",
                entity = entity.as_str(),
                target = %target,
                reason = "empty_split",
                n_train = train_y.len(),
                n_test = test_y.len()
            );
            outcome.skipped_targets.push(target);
            continue;
        }

        let mut best: Option<ModelArtifact> = None;
        for strategy in &cfg.strategies {
            let fitted = FittedPipeline::fit(*strategy, &cfg.params, &features, &train_x, &train_y)
                .and_then(|pipe| pipe.predict(&test_x).map(|pred| (pipe, pred)));
            let (pipeline, pred) = match fitted {
                Ok(fitted) => fitted,
                Err(err) => {
                    warn!(
                        component = "training",
                        event = "training.candidate.failed",
                        entity = entity.as_str(),
                        target = %target,
                        model = strategy.as_str(),
                        error = %err
                    );
                    continue;
                }
            };
            let mae = mean_absolute_error(&test_y, &pred);
            let rmse = root_mean_squared_error(&test_y, &pred);
            info!(
                component = "training",
                event = "training.candidate.evaluated",
                entity = entity.as_str(),
                target = %target,
                model = strategy.as_str(),
                mae,
                rmse
            );
            outcome.report.push(ModelReportRow {
                target: target.clone(),
                model: *strategy,
                holdout_season,
                mae,
                rmse,
                n_train: train_y.len(),
                n_test: test_y.len(),
                n_features: features.len(),
            });

            if best.as_ref().map_or(true, |b| mae < b.mae) {
                best = Some(ModelArtifact {
                    entity,
                    target: target.clone(),
                    holdout_season,
                    mae,
                    rmse,
                    n_train: train_y.len(),
                    n_test: test_y.len(),
                    pipeline,
                });
            }
        }

        match best {
            Some(artifact) => {
                info!(
                    component = "training",
                    event = "training.target.selected",
                    entity = entity.as_str(),
                    target = %target,
                    model = artifact.pipeline.strategy.as_str(),
                    mae = artifact.mae,
                    rmse = artifact.rmse
                );
                outcome.artifacts.push(artifact);
            }
            None => {
                warn!(
                    component = "training",
                    event = "training.target.skipped",
                    entity = entity.as_str(),
                    target = %target,
                    reason = "all_candidates_failed"
                );
                outcome.skipped_targets.push(target);
            }
        }
    }

    outcome.report.sort_by(|a, b| {
        a.target
            .cmp(&b.target)
            .then_with(|| a.mae.total_cmp(&b.mae))
    });
    Ok(outcome)
}

pub fn artifact_path(models_dir: &Path, entity: EntityKind, target: &str) -> PathBuf {
    models_dir.join(format!("{}_{target}.json", entity.as_str()))
}

pub fn report_path(models_dir: &Path, entity: EntityKind) -> PathBuf {
    models_dir.join(format!("{}_model_report.csv", entity.as_str()))
}

/// Overwrites one artifact per trained target and the entity's report.
pub fn save_training_outcome(
    models_dir: &Path,
    outcome: &TrainingOutcome,
) -> Result<(), TrainError> {
    for artifact in &outcome.artifacts {
        let path = artifact_path(models_dir, outcome.entity, &artifact.target);
        write_json(&path, artifact)?;
        info!(
            component = "training",
            event = "training.artifact.saved",
            entity = outcome.entity.as_str(),
            target = %artifact.target,
            path = %path.display()
        );
    }
    write_csv_rows(&report_path(models_dir, outcome.entity), &outcome.report)?;
    Ok(())
}

pub fn load_artifact(path: &Path) -> Result<ModelArtifact, TrainError> {
    let bytes = fs::read(path).map_err(|source| TrainError::ArtifactRead {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| TrainError::ArtifactDecode {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    #[test]
    fn feature_columns_skip_identifiers_and_strings() {
        let table = Table::from_columns(vec![
            Column::string("team", vec![Some("BOS".into())]),
            Column::string("team_opp", vec![Some("NYR".into())]),
            Column::float("team_5_goalsFor", vec![Some(3.0)]),
            Column::string("team_5_note", vec![Some("x".into())]),
            Column::float("y_goalsFor", vec![Some(2.0)]),
        ])
        .expect("table");
        let (usable, dropped) = feature_columns(&table, EntityKind::Team);
        assert_eq!(usable, vec!["team_5_goalsFor".to_string()]);
        assert_eq!(dropped, vec!["team_5_note".to_string()]);
        assert_eq!(target_columns(&table), vec!["y_goalsFor".to_string()]);
    }

    #[test]
    fn artifact_names_follow_entity_and_target() {
        let dir = Path::new("/models");
        assert_eq!(
            artifact_path(dir, EntityKind::Team, "y_goalsFor"),
            PathBuf::from("/models/team_y_goalsFor.json")
        );
        assert_eq!(
            report_path(dir, EntityKind::Goalie),
            PathBuf::from("/models/goalie_model_report.csv")
        );
    }

    #[test]
    fn missing_season_is_an_error() {
        let table = Table::from_columns(vec![Column::float("y_goalsFor", vec![Some(1.0)])])
            .expect("table");
        let err = train_entity_models(EntityKind::Team, &table, &TrainConfig::default()).unwrap_err();
        assert!(matches!(err, TrainError::MissingColumn { .. }));
    }
}
