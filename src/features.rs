//! Leakage-free rolling features per entity (team, or team + player).
//!
//! Every rolling value attached to a game is computed from the entity's
//! strictly earlier games: the history is shifted by one row before any
//! window is applied.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::normalize::{
    coerce_integer_column, dedup_rows, ensure_minutes, first_present, normalize_game_table,
    require_column, retain_situation_all, strip_and_dedup_columns, SchemaError, ICE_TIME_ALIASES,
    ICE_TIME_MINUTES, ID_COLUMNS, PLAYER_ID_ALIASES,
};
use crate::table::{Column, KeyCell, Table, TableError};

pub const FEATURE_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_WINDOWS: [usize; 3] = [5, 10, 20];
pub const REST_DAYS_COLUMN: &str = "days_since_prev_game";

/// Team statistics tracked by the team feature builder, with provider aliases.
pub const TEAM_STAT_ALIASES: [(&str, &[&str]); 6] = [
    ("goalsFor", &["goalsFor", "gf", "teamGoalsFor", "goals_for"]),
    (
        "goalsAgainst",
        &["goalsAgainst", "ga", "teamGoalsAgainst", "goals_against"],
    ),
    (
        "shotsFor",
        &[
            "shotsFor",
            "sf",
            "shots_for",
            "teamShotsFor",
            "shotsOnGoalFor",
            "sogFor",
        ],
    ),
    (
        "shotsAgainst",
        &[
            "shotsAgainst",
            "sa",
            "shots_against",
            "teamShotsAgainst",
            "shotsOnGoalAgainst",
            "sogAgainst",
        ],
    ),
    (
        "xGoalsFor",
        &["xGoalsFor", "xgf", "expectedGoalsFor", "xgoalsFor"],
    ),
    (
        "xGoalsAgainst",
        &["xGoalsAgainst", "xga", "expectedGoalsAgainst", "xgoalsAgainst"],
    ),
];

/// Skater count statistics normalized to per-60 rates when present.
pub const SKATER_COUNT_COLUMNS: [&str; 14] = [
    "goals",
    "assists",
    "points",
    "shotsOnGoal",
    "shots",
    "shots_on_goal",
    "ixG",
    "iXG",
    "xGoals",
    "xGoalsFor",
    "xG",
    "iFenwick",
    "iCorsi",
    "shotAttempts",
];

pub const GOALIE_GOALS_AGAINST_ALIASES: [&str; 3] = ["goalsAgainst", "ga", "goals_against"];
pub const GOALIE_SHOTS_AGAINST_ALIASES: [&str; 3] = ["shotsAgainst", "sa", "shots_against"];
pub const GOALIE_SAVES_ALIASES: [&str; 2] = ["saves", "sv"];
pub const SAVE_PCT_COLUMN: &str = "save_pct";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Team,
    Skater,
    Goalie,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Team => "team",
            Self::Skater => "skater",
            Self::Goalie => "goalie",
        }
    }

    /// Role prefix carried by every rolling feature column of this entity.
    pub fn feature_prefix(self) -> &'static str {
        match self {
            Self::Team => "team_",
            Self::Skater => "sk_",
            Self::Goalie => "go_",
        }
    }

    /// Entity key columns as they appear in feature and model tables.
    pub fn entity_keys(self) -> &'static [&'static str] {
        match self {
            Self::Team => &["team"],
            Self::Skater | Self::Goalie => &["team", "playerId"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureDType {
    F64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub source: String,
    pub window: usize,
    pub dtype: FeatureDType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub prefix: String,
    pub fingerprint: String,
    pub columns: Vec<FeatureColumn>,
}

impl FeatureSchema {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingConfig {
    pub windows: Vec<usize>,
    pub schema_version: u32,
}

impl Default for RollingConfig {
    fn default() -> Self {
        Self {
            windows: DEFAULT_WINDOWS.to_vec(),
            schema_version: FEATURE_SCHEMA_VERSION,
        }
    }
}

/// What to roll: entity keys, chronological column, value columns, role prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollingSpec {
    pub group_keys: Vec<String>,
    pub order_column: String,
    pub value_columns: Vec<String>,
    pub prefix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureBuildReport {
    pub input_rows: usize,
    pub output_rows: usize,
    pub situation_rows_dropped: usize,
    pub duplicate_rows_dropped: usize,
    pub duplicate_columns_dropped: usize,
    pub value_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBuild {
    pub entity: EntityKind,
    pub table: Table,
    pub schema: FeatureSchema,
    pub report: FeatureBuildReport,
}

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("invalid rolling config: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("schema version mismatch: expected {expected}, got {actual}")]
    SchemaVersionMismatch { expected: u32, actual: u32 },
    #[error("schema fingerprint mismatch: expected {expected}, got {actual}")]
    SchemaFingerprintMismatch { expected: String, actual: String },
}

/// `{prefix}{window}_{column}`; the window digits end at the first `_`, so
/// distinct (window, column) pairs never collide.
pub fn rolling_column_name(prefix: &str, window: usize, column: &str) -> String {
    format!("{prefix}{window}_{column}")
}

pub fn build_feature_schema(
    prefix: &str,
    value_columns: &[String],
    cfg: &RollingConfig,
) -> FeatureSchema {
    let mut columns = Vec::with_capacity(value_columns.len() * cfg.windows.len());
    for source in value_columns {
        for window in &cfg.windows {
            columns.push(FeatureColumn {
                name: rolling_column_name(prefix, *window, source),
                source: source.clone(),
                window: *window,
                dtype: FeatureDType::F64,
            });
        }
    }

    let fingerprint = schema_fingerprint(cfg, prefix, &columns);
    info!(
        component = "features",
        event = "features.schema.built",
        version = cfg.schema_version,
        prefix,
        windows = ?cfg.windows,
        column_count = columns.len(),
        fingerprint = %fingerprint
    );

    FeatureSchema {
        version: cfg.schema_version,
        prefix: prefix.to_string(),
        fingerprint,
        columns,
    }
}

pub fn assert_schema_compatible(
    expected_version: u32,
    expected_fingerprint: &str,
    actual: &FeatureSchema,
) -> Result<(), FeatureError> {
    if expected_version != actual.version {
        return Err(FeatureError::SchemaVersionMismatch {
            expected: expected_version,
            actual: actual.version,
        });
    }
    if expected_fingerprint != actual.fingerprint {
        return Err(FeatureError::SchemaFingerprintMismatch {
            expected: expected_fingerprint.to_string(),
            actual: actual.fingerprint.clone(),
        });
    }
    Ok(())
}

/// Value at position `i` becomes the value at `i - 1`; the first slot is null.
pub fn shift_by_one(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut shifted = Vec::with_capacity(values.len());
    if values.is_empty() {
        return shifted;
    }
    shifted.push(None);
    shifted.extend_from_slice(&values[..values.len() - 1]);
    shifted
}

/// Mean of the non-null values among the last `window` entries (inclusive of
/// the current position); null when none are present.
pub fn trailing_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|idx| {
            let start = (idx + 1).saturating_sub(window);
            let (sum, count) = values[start..=idx]
                .iter()
                .flatten()
                .fold((0.0_f64, 0usize), |(s, c), v| (s + v, c + 1));
            (count > 0).then(|| sum / count as f64)
        })
        .collect()
}

/// Rows sorted by (entity keys, order column); nulls last, ties keep their
/// input order. Absent columns are left out of the sort.
pub fn sort_by_entity(
    table: &Table,
    keys: &[String],
    order_column: &str,
) -> Result<Table, TableError> {
    let by = keys
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(order_column))
        .filter(|name| table.has_column(name))
        .collect::<Vec<_>>();
    table.sort_by(&by)
}

/// Per-60-minute rate; zero, missing or non-finite results are null.
pub fn per60(values: &[Option<f64>], toi_minutes: &[Option<f64>]) -> Vec<Option<f64>> {
    values
        .iter()
        .zip(toi_minutes)
        .map(|(x, toi)| match (x, toi) {
            (Some(x), Some(toi)) if *toi != 0.0 => Some(60.0 * x / toi).filter(|v| v.is_finite()),
            _ => None,
        })
        .collect()
}

/// Calendar days since the same entity's previous row; null on the first row
/// of each entity. Expects a table already sorted by entity then date.
pub fn days_since_previous(table: &Table, keys: &[String], date_column: &str) -> Vec<Option<f64>> {
    let n = table.num_rows();
    let Some(dates) = table.column(date_column) else {
        return vec![None; n];
    };
    let groups = entity_groups(table, keys);
    let mut out = vec![None; n];
    for group in groups.iter().filter(|g| g.keyed) {
        for idx in group.start + 1..group.end {
            if let (Some(prev), Some(cur)) = (dates.date_at(idx - 1), dates.date_at(idx)) {
                out[idx] = Some((cur - prev).num_days() as f64);
            }
        }
    }
    out
}

/// Sorts by entity and date and appends one rolling-mean column per
/// (value column, window). Value columns missing from the table are skipped.
pub fn rolling_features(
    table: &Table,
    spec: &RollingSpec,
    cfg: &RollingConfig,
) -> Result<(Table, FeatureSchema), FeatureError> {
    validate_config(cfg)?;
    for key in spec.group_keys.iter().chain(std::iter::once(&spec.order_column)) {
        if !table.has_column(key) {
            return Err(SchemaError::MissingColumn {
                table: spec.prefix.clone(),
                column: key.clone(),
                candidates: vec![key.clone()],
            }
            .into());
        }
    }

    let value_columns = spec
        .value_columns
        .iter()
        .filter(|c| table.has_column(c))
        .cloned()
        .collect::<Vec<_>>();

    info!(
        component = "features",
        event = "features.rolling.start",
        prefix = %spec.prefix,
        rows = table.num_rows(),
        group_keys = ?spec.group_keys,
        value_columns = ?value_columns,
        windows = ?cfg.windows
    );

    let mut sorted = sort_by_entity(table, &spec.group_keys, &spec.order_column)?;
    let groups = entity_groups(&sorted, &spec.group_keys);
    let schema = build_feature_schema(&spec.prefix, &value_columns, cfg);

    let mut rolled = Vec::with_capacity(schema.columns.len());
    for source in &value_columns {
        let numeric = sorted
            .column(source)
            .map(|c| c.to_numeric())
            .unwrap_or_default();
        let mut per_window = vec![vec![None; sorted.num_rows()]; cfg.windows.len()];

        for group in groups.iter().filter(|g| g.keyed) {
            let shifted = shift_by_one(&numeric[group.start..group.end]);
            for (slot, window) in cfg.windows.iter().enumerate() {
                let means = trailing_mean(&shifted, *window);
                per_window[slot][group.start..group.end].copy_from_slice(&means);
            }
        }

        sorted.set_column(Column::float(source.clone(), numeric))?;
        for (slot, window) in cfg.windows.iter().enumerate() {
            rolled.push(Column::float(
                rolling_column_name(&spec.prefix, *window, source),
                std::mem::take(&mut per_window[slot]),
            ));
        }
    }
    for column in rolled {
        sorted.set_column(column)?;
    }

    info!(
        component = "features",
        event = "features.rolling.finish",
        prefix = %spec.prefix,
        rows = sorted.num_rows(),
        entities = groups.iter().filter(|g| g.keyed).count(),
        feature_columns = schema.columns.len()
    );

    Ok((sorted, schema))
}

pub fn build_team_features(raw: &Table, cfg: &RollingConfig) -> Result<FeatureBuild, FeatureError> {
    let mut table = raw.clone();
    let mut report = FeatureBuildReport {
        input_rows: raw.num_rows(),
        ..FeatureBuildReport::default()
    };
    report.duplicate_columns_dropped = normalize_game_table(&mut table, "team")?.dropped;
    require_column(&table, "team", "team", &["team"])?;
    require_column(&table, "team", "gameDate", &["gameDate"])?;

    let table = situation_and_rows(table, &["gameId", "team"], "team", &mut report)?;

    let mut value_columns = Vec::new();
    let mut detected = Vec::new();
    for (canonical, aliases) in TEAM_STAT_ALIASES {
        if let Some(column) = first_present(&table, aliases) {
            detected.push(format!("{canonical}={column}"));
            value_columns.push(column.to_string());
        }
    }
    info!(
        component = "features",
        event = "features.team.columns_detected",
        detected = ?detected
    );

    let keys = vec!["team".to_string()];
    let mut sorted = sort_by_entity(&table, &keys, "gameDate")?;
    let rest = days_since_previous(&sorted, &keys, "gameDate");
    sorted.set_column(Column::float(REST_DAYS_COLUMN, rest))?;
    value_columns.push(REST_DAYS_COLUMN.to_string());

    let spec = RollingSpec {
        group_keys: keys,
        order_column: "gameDate".to_string(),
        value_columns,
        prefix: EntityKind::Team.feature_prefix().to_string(),
    };
    finish_build(EntityKind::Team, &sorted, &spec, cfg, None, report)
}

pub fn build_skater_features(
    raw: &Table,
    cfg: &RollingConfig,
) -> Result<FeatureBuild, FeatureError> {
    let mut table = raw.clone();
    let mut report = FeatureBuildReport {
        input_rows: raw.num_rows(),
        ..FeatureBuildReport::default()
    };
    report.duplicate_columns_dropped = normalize_game_table(&mut table, "skater")?.dropped;
    let player = require_column(&table, "skater", "playerId", &PLAYER_ID_ALIASES)?;
    require_column(&table, "skater", "icetime", &ICE_TIME_ALIASES)?;
    coerce_integer_column(&mut table, player)?;
    let toi = ensure_minutes(&mut table)?.unwrap_or(ICE_TIME_MINUTES);

    let mut table =
        situation_and_rows(table, &["gameId", "team", player], "skater", &mut report)?;

    let toi_values = table
        .column(toi)
        .map(|c| c.to_numeric())
        .unwrap_or_default();
    let mut value_columns = vec![toi.to_string()];
    for count in SKATER_COUNT_COLUMNS {
        let Some(values) = table.column(count).map(|c| c.to_numeric()) else {
            continue;
        };
        let name = format!("{count}_per60");
        table.set_column(Column::float(name.clone(), per60(&values, &toi_values)))?;
        value_columns.push(name);
    }

    let spec = RollingSpec {
        group_keys: vec!["team".to_string(), player.to_string()],
        order_column: "gameDate".to_string(),
        value_columns,
        prefix: EntityKind::Skater.feature_prefix().to_string(),
    };
    finish_build(EntityKind::Skater, &table, &spec, cfg, Some(player), report)
}

pub fn build_goalie_features(
    raw: &Table,
    cfg: &RollingConfig,
) -> Result<FeatureBuild, FeatureError> {
    let mut table = raw.clone();
    let mut report = FeatureBuildReport {
        input_rows: raw.num_rows(),
        ..FeatureBuildReport::default()
    };
    report.duplicate_columns_dropped = normalize_game_table(&mut table, "goalie")?.dropped;
    let player = require_column(&table, "goalie", "playerId", &PLAYER_ID_ALIASES)?;
    coerce_integer_column(&mut table, player)?;
    let toi = ensure_minutes(&mut table)?;

    let mut table =
        situation_and_rows(table, &["gameId", "team", player], "goalie", &mut report)?;

    let ga = first_present(&table, &GOALIE_GOALS_AGAINST_ALIASES);
    let sa = first_present(&table, &GOALIE_SHOTS_AGAINST_ALIASES);
    let sv = first_present(&table, &GOALIE_SAVES_ALIASES);

    let save_pct = match (ga, sa) {
        (Some(ga), Some(sa)) => {
            let goals = table.column(ga).map(|c| c.to_numeric()).unwrap_or_default();
            let shots = table.column(sa).map(|c| c.to_numeric()).unwrap_or_default();
            goals
                .iter()
                .zip(&shots)
                .map(|(g, s)| match (g, s) {
                    (Some(g), Some(s)) if *s != 0.0 => Some(1.0 - g / s),
                    _ => None,
                })
                .collect()
        }
        _ => vec![None; table.num_rows()],
    };
    table.set_column(Column::float(SAVE_PCT_COLUMN, save_pct))?;

    let value_columns = [ga, sa, sv, Some(SAVE_PCT_COLUMN), toi]
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let spec = RollingSpec {
        group_keys: vec!["team".to_string(), player.to_string()],
        order_column: "gameDate".to_string(),
        value_columns,
        prefix: EntityKind::Goalie.feature_prefix().to_string(),
    };
    finish_build(EntityKind::Goalie, &table, &spec, cfg, Some(player), report)
}

fn situation_and_rows(
    table: Table,
    keys: &[&str],
    label: &str,
    report: &mut FeatureBuildReport,
) -> Result<Table, TableError> {
    let filtered = retain_situation_all(&table)?;
    report.situation_rows_dropped = table.num_rows() - filtered.num_rows();
    let (deduped, removed) = dedup_rows(&filtered, keys, label)?;
    report.duplicate_rows_dropped = removed;
    Ok(deduped)
}

fn finish_build(
    entity: EntityKind,
    table: &Table,
    spec: &RollingSpec,
    cfg: &RollingConfig,
    player_column: Option<&str>,
    mut report: FeatureBuildReport,
) -> Result<FeatureBuild, FeatureError> {
    let (rolled, schema) = rolling_features(table, spec, cfg)?;

    let mut keep = ID_COLUMNS
        .iter()
        .filter(|c| **c != "playerId")
        .map(|c| c.to_string())
        .collect::<Vec<_>>();
    if let Some(player) = player_column {
        keep.push(player.to_string());
    }
    keep.extend(schema.columns.iter().map(|c| c.name.clone()));

    let mut out = rolled.select(&keep)?;
    if let Some(player) = player_column {
        if player != "playerId" {
            out.rename_column(player, "playerId")?;
        }
    }
    let label = format!("{}_out", entity.as_str());
    strip_and_dedup_columns(&mut out, &label)?;

    report.output_rows = out.num_rows();
    report.value_columns = schema.columns.iter().map(|c| c.source.clone()).collect();
    report.value_columns.dedup();

    info!(
        component = "features",
        event = "features.build.finish",
        entity = entity.as_str(),
        input_rows = report.input_rows,
        output_rows = report.output_rows,
        situation_rows_dropped = report.situation_rows_dropped,
        duplicate_rows_dropped = report.duplicate_rows_dropped,
        feature_columns = schema.columns.len()
    );

    Ok(FeatureBuild {
        entity,
        table: out,
        schema,
        report,
    })
}

#[derive(Debug, Clone, Copy)]
struct EntityGroup {
    start: usize,
    end: usize,
    keyed: bool,
}

/// Contiguous runs of equal entity keys in an already sorted table. Rows with
/// any null key form unkeyed single-row groups.
fn entity_groups(table: &Table, keys: &[String]) -> Vec<EntityGroup> {
    let key_columns = keys
        .iter()
        .filter_map(|k| table.column(k))
        .collect::<Vec<_>>();
    let key_at = |idx: usize| {
        key_columns
            .iter()
            .map(|c| c.key_at(idx))
            .collect::<Option<Vec<KeyCell>>>()
    };

    let mut groups: Vec<EntityGroup> = Vec::new();
    let mut current: Option<Vec<KeyCell>> = None;
    for idx in 0..table.num_rows() {
        let key = key_at(idx);
        let extends = key.is_some() && key == current;
        match groups.last_mut() {
            Some(last) if extends => last.end = idx + 1,
            _ => {
                let keyed = key.is_some();
                groups.push(EntityGroup {
                    start: idx,
                    end: idx + 1,
                    keyed,
                });
            }
        }
        current = key;
    }
    groups
}

fn validate_config(cfg: &RollingConfig) -> Result<(), FeatureError> {
    if cfg.schema_version != FEATURE_SCHEMA_VERSION {
        return Err(FeatureError::InvalidConfig(format!(
            "schema_version must equal FEATURE_SCHEMA_VERSION ({FEATURE_SCHEMA_VERSION})"
        )));
    }
    if cfg.windows.is_empty() {
        return Err(FeatureError::InvalidConfig(
            "at least one window is required".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for window in &cfg.windows {
        if *window == 0 {
            return Err(FeatureError::InvalidConfig(
                "window lengths must be > 0".to_string(),
            ));
        }
        if !seen.insert(*window) {
            return Err(FeatureError::InvalidConfig(
                "window lengths must be unique".to_string(),
            ));
        }
    }
    Ok(())
}

fn schema_fingerprint(cfg: &RollingConfig, prefix: &str, columns: &[FeatureColumn]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{};", cfg.schema_version));
    hasher.update(format!("prefix:{prefix};"));
    hasher.update("windows:");
    for window in &cfg.windows {
        hasher.update(format!("{window},"));
    }
    hasher.update(";columns:");
    for column in columns {
        hasher.update(column.name.as_bytes());
        hasher.update(":f64;");
    }
    hex::encode(hasher.finalize())
}
