//! On-disk layout and run parameters, read from `NHL_*` environment variables
//! with a small set of command-line overrides.

use std::env;
use std::path::PathBuf;

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

use crate::features::{EntityKind, RollingConfig, DEFAULT_WINDOWS, FEATURE_SCHEMA_VERSION};

pub const DEFAULT_NHL_ROOT: &str = "./data/NHL";
pub const DEFAULT_SEASON_TYPE: &str = "regular";
pub const DEFAULT_START_SEASON: i32 = 2019;
pub const DEFAULT_PROJECTION_DAYS: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerKind {
    Skaters,
    Goalies,
}

impl PlayerKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Skaters => "skaters",
            Self::Goalies => "goalies",
        }
    }

    pub fn entity(self) -> EntityKind {
        match self {
            Self::Skaters => EntityKind::Skater,
            Self::Goalies => EntityKind::Goalie,
        }
    }
}

/// Path roles under the data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    pub root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("MoneyPuck_Data").join("raw")
    }

    pub fn team_raw_dir(&self, season_type: &str) -> PathBuf {
        self.raw_dir()
            .join("careers")
            .join("gameByGame")
            .join(season_type)
            .join("teams")
    }

    pub fn player_raw_dir(&self, season: i32, season_type: &str, kind: PlayerKind) -> PathBuf {
        self.raw_dir()
            .join("teamPlayerGameByGame")
            .join(season.to_string())
            .join(season_type)
            .join(kind.dir_name())
    }

    pub fn processed_path(&self, entity: EntityKind) -> PathBuf {
        self.root
            .join("MoneyPuck_Data")
            .join("processed")
            .join(format!("{}_game.parquet", entity.as_str()))
    }

    pub fn features_path(&self, entity: EntityKind) -> PathBuf {
        self.root
            .join("features")
            .join(format!("{}_features.parquet", entity.as_str()))
    }

    pub fn model_table_path(&self, entity: EntityKind) -> PathBuf {
        self.root
            .join("model_data")
            .join(format!("{}_model_table.parquet", entity.as_str()))
    }

    pub fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    pub fn preds_dir(&self) -> PathBuf {
        self.root.join("preds")
    }
}

impl Default for DataLayout {
    fn default() -> Self {
        Self::new(DEFAULT_NHL_ROOT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub layout: DataLayout,
    pub season_type: String,
    pub start_season: i32,
    /// `None` means the season in progress.
    pub end_season: Option<i32>,
    pub windows: Vec<usize>,
    pub projection_days: u32,
    pub schedule_path: Option<PathBuf>,
    pub train_entities: Vec<EntityKind>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            layout: DataLayout::default(),
            season_type: DEFAULT_SEASON_TYPE.to_string(),
            start_season: DEFAULT_START_SEASON,
            end_season: None,
            windows: DEFAULT_WINDOWS.to_vec(),
            projection_days: DEFAULT_PROJECTION_DAYS,
            schedule_path: None,
            train_entities: vec![EntityKind::Team],
        }
    }
}

impl PipelineConfig {
    pub fn rolling_config(&self) -> RollingConfig {
        RollingConfig {
            windows: self.windows.clone(),
            schema_version: FEATURE_SCHEMA_VERSION,
        }
    }

    pub fn resolved_end_season(&self, today: NaiveDate) -> i32 {
        self.end_season.unwrap_or_else(|| current_season_start(today))
    }

    pub fn schedule_path_or_default(&self) -> PathBuf {
        self.schedule_path
            .clone()
            .unwrap_or_else(|| self.layout.root.join("schedule").join("upcoming.json"))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name}={value:?} is invalid: {reason}")]
    InvalidVar {
        name: String,
        value: String,
        reason: String,
    },
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A season is labelled by the year it starts; it rolls over in July.
pub fn current_season_start(today: NaiveDate) -> i32 {
    if today.month() >= 7 {
        today.year()
    } else {
        today.year() - 1
    }
}

pub fn pipeline_config_from_env() -> Result<PipelineConfig, ConfigError> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    pipeline_config_from_sources(|name| env::var(name).ok(), &args)
}

/// Environment first, then `--nhl-root`, `--days` and `--schedule` overrides.
pub fn pipeline_config_from_sources(
    var: impl Fn(&str) -> Option<String>,
    args: &[String],
) -> Result<PipelineConfig, ConfigError> {
    let mut config = PipelineConfig::default();
    let present = |name: &str| {
        var(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    if let Some(root) = present("NHL_ROOT") {
        config.layout = DataLayout::new(root);
    }
    if let Some(season_type) = present("NHL_SEASON_TYPE") {
        config.season_type = season_type;
    }
    if let Some(raw) = present("NHL_START_SEASON") {
        config.start_season = parse_number("NHL_START_SEASON", &raw)?;
    }
    if let Some(raw) = present("NHL_END_SEASON") {
        config.end_season = Some(parse_number("NHL_END_SEASON", &raw)?);
    }
    if let Some(raw) = present("NHL_WINDOWS") {
        config.windows = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| parse_number("NHL_WINDOWS", s))
            .collect::<Result<Vec<usize>, _>>()?;
    }
    if let Some(raw) = present("NHL_PROJECTION_DAYS") {
        config.projection_days = parse_number("NHL_PROJECTION_DAYS", &raw)?;
    }
    if let Some(path) = present("NHL_SCHEDULE_PATH") {
        config.schedule_path = Some(PathBuf::from(path));
    }
    if let Some(raw) = present("NHL_TRAIN_ENTITIES") {
        config.train_entities = raw
            .split(',')
            .map(|s| parse_entity("NHL_TRAIN_ENTITIES", s))
            .collect::<Result<Vec<_>, _>>()?;
    }

    apply_args(&mut config, args)?;
    validate_pipeline_config(&config)?;
    Ok(config)
}

pub fn validate_pipeline_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    if config.windows.is_empty() || config.windows.contains(&0) {
        return Err(ConfigError::Invalid(
            "windows must be a non-empty list of positive lengths".to_string(),
        ));
    }
    if let Some(end) = config.end_season {
        if end < config.start_season {
            return Err(ConfigError::Invalid(format!(
                "end season {end} precedes start season {}",
                config.start_season
            )));
        }
    }
    if config.projection_days == 0 {
        return Err(ConfigError::Invalid(
            "projection days must be > 0".to_string(),
        ));
    }
    if config.train_entities.is_empty() {
        return Err(ConfigError::Invalid(
            "at least one training entity is required".to_string(),
        ));
    }
    Ok(())
}

fn apply_args(config: &mut PipelineConfig, args: &[String]) -> Result<(), ConfigError> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag, Some(value.to_string())),
            None => (arg.as_str(), None),
        };
        let mut value = || {
            inline
                .clone()
                .or_else(|| iter.next().cloned())
                .ok_or_else(|| ConfigError::InvalidArgs(format!("{flag} needs a value")))
        };
        match flag {
            "--nhl-root" => config.layout = DataLayout::new(value()?),
            "--days" => config.projection_days = parse_number("--days", &value()?)?,
            "--schedule" => config.schedule_path = Some(PathBuf::from(value()?)),
            other => return Err(ConfigError::InvalidArgs(format!("unknown argument {other}"))),
        }
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidVar {
        name: name.to_string(),
        value: raw.to_string(),
        reason: "expected a non-negative integer".to_string(),
    })
}

fn parse_entity(name: &str, raw: &str) -> Result<EntityKind, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "team" => Ok(EntityKind::Team),
        "skater" => Ok(EntityKind::Skater),
        "goalie" => Ok(EntityKind::Goalie),
        _ => Err(ConfigError::InvalidVar {
            name: name.to_string(),
            value: raw.to_string(),
            reason: "expected team, skater or goalie".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |name| map.get(name).cloned()
    }

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = pipeline_config_from_sources(vars(&[]), &[]).expect("config");
        assert_eq!(cfg, PipelineConfig::default());
        assert_eq!(
            cfg.layout.features_path(EntityKind::Team),
            PathBuf::from("./data/NHL/features/team_features.parquet")
        );
    }

    #[test]
    fn env_values_and_root_argument_apply() {
        let cfg = pipeline_config_from_sources(
            vars(&[
                ("NHL_ROOT", "/srv/nhl"),
                ("NHL_WINDOWS", "3, 7"),
                ("NHL_END_SEASON", "2023"),
                ("NHL_TRAIN_ENTITIES", "team,goalie"),
            ]),
            &args(&["--nhl-root", "/tmp/override", "--days=3"]),
        )
        .expect("config");
        assert_eq!(cfg.layout.root, PathBuf::from("/tmp/override"));
        assert_eq!(cfg.windows, vec![3, 7]);
        assert_eq!(cfg.end_season, Some(2023));
        assert_eq!(cfg.projection_days, 3);
        assert_eq!(cfg.train_entities, vec![EntityKind::Team, EntityKind::Goalie]);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            pipeline_config_from_sources(vars(&[("NHL_WINDOWS", "5,x")]), &[]),
            Err(ConfigError::InvalidVar { .. })
        ));
        assert!(matches!(
            pipeline_config_from_sources(
                vars(&[("NHL_START_SEASON", "2022"), ("NHL_END_SEASON", "2020")]),
                &[]
            ),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            pipeline_config_from_sources(vars(&[]), &args(&["--bogus"])),
            Err(ConfigError::InvalidArgs(_))
        ));
    }

    #[test]
    fn season_rolls_over_in_july() {
        let june = NaiveDate::from_ymd_opt(2025, 6, 30).expect("date");
        let july = NaiveDate::from_ymd_opt(2025, 7, 1).expect("date");
        assert_eq!(current_season_start(june), 2024);
        assert_eq!(current_season_start(july), 2025);
    }

    #[test]
    fn player_paths_follow_season_layout() {
        let layout = DataLayout::new("/d");
        assert_eq!(
            layout.player_raw_dir(2023, "regular", PlayerKind::Goalies),
            PathBuf::from("/d/MoneyPuck_Data/raw/teamPlayerGameByGame/2023/regular/goalies")
        );
    }
}
