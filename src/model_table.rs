//! Joins rolling feature rows with the same game's unshifted outcomes.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::features::EntityKind;
use crate::normalize::{
    coerce_integer_column, first_present, first_row_mask, normalize_game_table, require_column,
    retain_situation_all, strip_and_dedup_columns, SchemaError, ICE_TIME_ALIASES, ID_COLUMNS,
    PLAYER_ID_ALIASES,
};
use crate::table::{Column, Table, TableError};

pub const TARGET_PREFIX: &str = "y_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
}

const TEAM_TARGETS: [TargetSpec; 6] = [
    TargetSpec {
        name: "y_goalsFor",
        aliases: &["goalsFor", "gf", "teamGoalsFor", "goals_for"],
    },
    TargetSpec {
        name: "y_goalsAgainst",
        aliases: &["goalsAgainst", "ga", "teamGoalsAgainst", "goals_against"],
    },
    TargetSpec {
        name: "y_shotsOnGoalFor",
        aliases: &["shotsOnGoalFor", "shotsFor", "sf", "sogFor"],
    },
    TargetSpec {
        name: "y_shotsOnGoalAgainst",
        aliases: &["shotsOnGoalAgainst", "shotsAgainst", "sa", "sogAgainst"],
    },
    TargetSpec {
        name: "y_xGoalsFor",
        aliases: &["xGoalsFor", "xgf", "expectedGoalsFor", "xgoalsFor"],
    },
    TargetSpec {
        name: "y_xGoalsAgainst",
        aliases: &["xGoalsAgainst", "xga", "expectedGoalsAgainst", "xgoalsAgainst"],
    },
];

const SKATER_TARGETS: [TargetSpec; 4] = [
    TargetSpec {
        name: "y_goals",
        aliases: &["goals"],
    },
    TargetSpec {
        name: "y_assists",
        aliases: &["assists"],
    },
    TargetSpec {
        name: "y_points",
        aliases: &["points"],
    },
    TargetSpec {
        name: "y_toi",
        aliases: &ICE_TIME_ALIASES,
    },
];

const GOALIE_TARGETS: [TargetSpec; 4] = [
    TargetSpec {
        name: "y_goalsAgainst",
        aliases: &["goalsAgainst", "ga", "goals_against"],
    },
    TargetSpec {
        name: "y_shotsAgainst",
        aliases: &["shotsAgainst", "sa", "shots_against"],
    },
    TargetSpec {
        name: "y_saves",
        aliases: &["saves", "sv"],
    },
    TargetSpec {
        name: "y_toi",
        aliases: &ICE_TIME_ALIASES,
    },
];

pub fn target_specs(entity: EntityKind) -> &'static [TargetSpec] {
    match entity {
        EntityKind::Team => &TEAM_TARGETS,
        EntityKind::Skater => &SKATER_TARGETS,
        EntityKind::Goalie => &GOALIE_TARGETS,
    }
}

#[derive(Debug, Error)]
pub enum ModelTableError {
    #[error("{table}: join key {column} is missing")]
    MissingKey { table: String, column: String },
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Table(#[from] TableError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTableReport {
    pub feature_rows: usize,
    pub matched_rows: usize,
    pub duplicate_keys: usize,
    pub targets: Vec<String>,
    pub missing_targets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelTableBuild {
    pub entity: EntityKind,
    pub table: Table,
    pub report: ModelTableReport,
}

const MATCHED_MARKER: &str = "__matched";

/// Left join of `features` with target columns taken from `raw` on
/// `gameId` plus the entity keys. Output row count equals the feature row count.
pub fn assemble_model_table(
    entity: EntityKind,
    features: &Table,
    raw: &Table,
) -> Result<ModelTableBuild, ModelTableError> {
    let label = format!("{}_game", entity.as_str());
    let mut right = raw.clone();
    normalize_game_table(&mut right, &label)?;
    let mut right = retain_situation_all(&right)?;
    if entity != EntityKind::Team {
        let player = require_column(&right, &label, "playerId", &PLAYER_ID_ALIASES)?;
        coerce_integer_column(&mut right, player)?;
        right.rename_column(player, "playerId")?;
    }

    let keys = std::iter::once("gameId")
        .chain(entity.entity_keys().iter().copied())
        .collect::<Vec<_>>();
    let left_label = format!("{}_features", entity.as_str());
    require_keys(features, &keys, &left_label)?;
    require_keys(&right, &keys, &label)?;

    let prefix = entity.feature_prefix();
    let mut keep = ID_COLUMNS
        .iter()
        .filter(|c| entity != EntityKind::Team || **c != "playerId")
        .map(|c| c.to_string())
        .collect::<Vec<_>>();
    keep.extend(
        features
            .column_names()
            .into_iter()
            .filter(|c| c.starts_with(prefix) && !ID_COLUMNS.contains(c))
            .map(str::to_string),
    );
    let mut left = features.select(&keep)?;
    align_keys(&mut left, &keys)?;

    let mut targets = right.select(&keys)?;
    align_keys(&mut targets, &keys)?;
    let mut report = ModelTableReport {
        feature_rows: features.num_rows(),
        ..ModelTableReport::default()
    };
    for target in target_specs(entity) {
        let Some(source) = first_present(&right, target.aliases) else {
            report.missing_targets.push(target.name.to_string());
            continue;
        };
        let values = right
            .column(source)
            .map(|c| c.to_numeric())
            .unwrap_or_default();
        targets.set_column(Column::float(target.name, values))?;
        report.targets.push(target.name.to_string());
    }
    targets.set_column(Column::int(
        MATCHED_MARKER,
        vec![Some(1); targets.num_rows()],
    ))?;

    if let Some((first_rows, duplicate_keys)) = first_row_mask(&targets, &keys) {
        report.duplicate_keys = duplicate_keys;
        targets = targets.filter(&first_rows)?;
    }
    if report.duplicate_keys > 0 {
        warn!(
            component = "model_table",
            event = "model_table.join.duplicate_keys",
            entity = entity.as_str(),
            keys = ?keys,
            duplicate_keys = report.duplicate_keys
        );
    }

    let mut out = left.left_join(&targets, &keys)?;
    report.matched_rows = out
        .drop_column(MATCHED_MARKER)
        .map(|marker| marker.len() - marker.data.null_count())
        .unwrap_or(0);
    if !report.missing_targets.is_empty() {
        warn!(
            component = "model_table",
            event = "model_table.targets.missing",
            entity = entity.as_str(),
            missing = ?report.missing_targets
        );
    }

    strip_and_dedup_columns(&mut out, &format!("{}_model_out", entity.as_str()))?;

    info!(
        component = "model_table",
        event = "model_table.assembled",
        entity = entity.as_str(),
        rows = out.num_rows(),
        columns = out.num_columns(),
        matched_rows = report.matched_rows,
        targets = ?report.targets
    );

    Ok(ModelTableBuild {
        entity,
        table: out,
        report,
    })
}

fn require_keys(table: &Table, keys: &[&str], label: &str) -> Result<(), ModelTableError> {
    match keys.iter().find(|key| !table.has_column(key)) {
        Some(key) => Err(ModelTableError::MissingKey {
            table: label.to_string(),
            column: key.to_string(),
        }),
        None => Ok(()),
    }
}

/// Gives both join sides the same key types: ids as integers, team codes as
/// trimmed text.
fn align_keys(table: &mut Table, keys: &[&str]) -> Result<(), TableError> {
    for key in keys {
        let Some(column) = table.column(key) else {
            continue;
        };
        let aligned = if *key == "team" {
            let codes = (0..column.len())
                .map(|idx| column.text_at(idx).map(|s| s.trim().to_string()))
                .collect();
            Column::string(*key, codes)
        } else {
            Column::int(*key, column.to_integer())
        };
        table.set_column(aligned)?;
    }
    Ok(())
}
