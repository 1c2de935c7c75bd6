//! Canonical schema for provider game tables.
//!
//! Rules implemented:
//! - every canonical column resolves through an ordered alias list, first present wins
//! - `gameDate` accepts `YYYYMMDD` and ISO/locale date strings, unparsable -> null
//! - short team codes map onto three-letter codes (`LA` -> `LAK`)
//! - repeated column names keep the first occurrence
//! - only `situation == "all"` rows reach aggregation

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::{info, warn};

use crate::table::{Column, ColumnData, KeyCell, Table, TableError};

pub const TEAM_ALIASES: [&str; 4] = ["team", "playerTeam", "teamAbbrev", "teamCode"];
pub const TEAM_OPP_ALIASES: [&str; 5] = [
    "team_opp",
    "opposingTeam",
    "opponentTeam",
    "oppTeam",
    "opponent",
];
pub const GAME_ID_ALIASES: [&str; 4] = ["gameId", "game_id", "gamePk", "id"];
pub const GAME_DATE_ALIASES: [&str; 2] = ["gameDate", "date"];
pub const HOME_OR_AWAY_ALIASES: [&str; 3] = ["home_or_away", "homeOrAway", "homeAway"];
pub const PLAYER_ID_ALIASES: [&str; 4] = ["playerId", "player_id", "id", "nhlPlayerId"];
pub const ICE_TIME_ALIASES: [&str; 4] = ["icetime_min", "icetime", "timeOnIce", "toi"];

pub const SITUATION_ALL: &str = "all";
pub const ICE_TIME_MINUTES: &str = "icetime_min";

/// Columns that identify a game row; never treated as features.
pub const ID_COLUMNS: [&str; 7] = [
    "gameId",
    "gameDate",
    "season",
    "team",
    "team_opp",
    "home_or_away",
    "playerId",
];

const TEAM_CODE_MAP: [(&str, &str); 5] = [
    ("LA", "LAK"),
    ("NJ", "NJD"),
    ("SJ", "SJS"),
    ("TB", "TBL"),
    ("WAS", "WSH"),
];

const MAX_REPORTED_DUPLICATES: usize = 20;
const READER_DUPLICATE_SUFFIX: &str = "_duplicated_";
const SECONDS_MEDIAN_THRESHOLD: f64 = 200.0;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("{table}: required column {column} not found (tried {candidates:?})")]
    MissingColumn {
        table: String,
        column: String,
        candidates: Vec<String>,
    },
    #[error("{table}: still has duplicate columns after dedupe: {columns:?}")]
    DuplicateColumns { table: String, columns: Vec<String> },
    #[error(transparent)]
    Table(#[from] TableError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupReport {
    pub dropped: usize,
    pub dropped_names: Vec<String>,
}

/// Ordered-fallback lookup over an explicit alias list.
pub fn first_present<'a>(table: &Table, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .copied()
        .find(|name| table.has_column(name))
}

pub fn require_column<'a>(
    table: &Table,
    label: &str,
    column: &str,
    candidates: &[&'a str],
) -> Result<&'a str, SchemaError> {
    first_present(table, candidates).ok_or_else(|| SchemaError::MissingColumn {
        table: label.to_string(),
        column: column.to_string(),
        candidates: candidates.iter().map(|c| c.to_string()).collect(),
    })
}

pub fn normalize_team_code(raw: &str) -> String {
    let trimmed = raw.trim();
    TEAM_CODE_MAP
        .iter()
        .find(|(short, _)| *short == trimmed)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Parses a game date. Never fails: unparsable input is `None`.
pub fn parse_game_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(s, "%Y%m%d").ok();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%b-%Y", "%b %d, %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }
    None
}

pub fn parse_date_column(column: &Column) -> Vec<Option<NaiveDate>> {
    match &column.data {
        ColumnData::Date(values) => values.clone(),
        _ => (0..column.len())
            .map(|idx| column.text_at(idx).and_then(|s| parse_game_date(&s)))
            .collect(),
    }
}

/// Name a header had before the reader disambiguated it: trimmed, with any
/// `_duplicated_<n>` suffix removed.
pub fn header_base(name: &str) -> &str {
    let trimmed = name.trim();
    match trimmed.rfind(READER_DUPLICATE_SUFFIX) {
        Some(pos)
            if pos > 0
                && trimmed[pos + READER_DUPLICATE_SUFFIX.len()..]
                    .bytes()
                    .all(|b| b.is_ascii_digit())
                && trimmed.len() > pos + READER_DUPLICATE_SUFFIX.len() =>
        {
            &trimmed[..pos]
        }
        _ => trimmed,
    }
}

/// Trims column names and drops repeated names, keeping the first occurrence.
pub fn strip_and_dedup_columns(table: &mut Table, label: &str) -> Result<DedupReport, SchemaError> {
    let mut seen = HashSet::new();
    let mut dropped_names = Vec::new();
    table.retain_columns(|name| {
        let base = header_base(name);
        if seen.insert(base.to_string()) {
            true
        } else {
            dropped_names.push(base.to_string());
            false
        }
    })?;

    if !dropped_names.is_empty() {
        let shown = &dropped_names[..dropped_names.len().min(MAX_REPORTED_DUPLICATES)];
        warn!(
            component = "normalize",
            event = "normalize.columns.duplicates_dropped",
            table = label,
            dropped = dropped_names.len(),
            names = ?shown
        );
    }

    let mut check = HashSet::new();
    let remaining = table
        .column_names()
        .into_iter()
        .map(header_base)
        .filter(|name| !check.insert(*name))
        .map(str::to_string)
        .collect::<Vec<_>>();
    if !remaining.is_empty() {
        return Err(SchemaError::DuplicateColumns {
            table: label.to_string(),
            columns: remaining,
        });
    }
    table.rename_all(|name| header_base(name).to_string())?;

    Ok(DedupReport {
        dropped: dropped_names.len(),
        dropped_names,
    })
}

/// Materializes the canonical id columns from whatever aliases are present.
pub fn standardize_game_columns(table: &mut Table) -> Result<(), SchemaError> {
    copy_alias(table, "team", &TEAM_ALIASES)?;
    copy_alias(table, "team_opp", &TEAM_OPP_ALIASES)?;
    copy_alias(table, "home_or_away", &HOME_OR_AWAY_ALIASES)?;

    if let Some(source) = first_present(table, &GAME_ID_ALIASES) {
        let ids = table
            .column(source)
            .map(|c| c.to_integer())
            .unwrap_or_default();
        table.set_column(Column::int("gameId", ids))?;
    }

    if let Some(source) = first_present(table, &GAME_DATE_ALIASES) {
        let dates = table
            .column(source)
            .map(|c| parse_date_column(&c))
            .unwrap_or_default();
        table.set_column(Column::date("gameDate", dates))?;
    }

    if let Some(season) = table.column("season").map(|c| c.to_integer()) {
        table.set_column(Column::int("season", season))?;
    }

    if !table.has_column("situation") {
        let fill = vec![Some(SITUATION_ALL.to_string()); table.num_rows()];
        table.set_column(Column::string("situation", fill))?;
    }

    Ok(())
}

pub fn normalize_team_columns(table: &mut Table) -> Result<(), SchemaError> {
    for name in ["team", "team_opp"] {
        let Some(column) = table.column(name) else {
            continue;
        };
        let codes = (0..column.len())
            .map(|idx| column.text_at(idx).map(|s| normalize_team_code(&s)))
            .collect::<Vec<_>>();
        table.set_column(Column::string(name, codes))?;
    }
    Ok(())
}

/// Full normalization pass applied to every provider table.
pub fn normalize_game_table(table: &mut Table, label: &str) -> Result<DedupReport, SchemaError> {
    let report = strip_and_dedup_columns(table, label)?;
    standardize_game_columns(table)?;
    normalize_team_columns(table)?;
    Ok(report)
}

pub fn retain_situation_all(table: &Table) -> Result<Table, TableError> {
    let Some(column) = table.column("situation") else {
        return Ok(table.clone());
    };
    let mask = (0..table.num_rows())
        .map(|idx| {
            column
                .text_at(idx)
                .is_some_and(|s| s.trim().eq_ignore_ascii_case(SITUATION_ALL))
        })
        .collect::<Vec<_>>();
    table.filter(&mask)
}

/// Row mask keeping the first row of every key tuple plus every row with a
/// null key, and the number of repeated rows it drops. `None` when a key
/// column is absent.
pub fn first_row_mask(table: &Table, keys: &[&str]) -> Option<(Vec<bool>, usize)> {
    let key_columns = keys
        .iter()
        .map(|k| table.column(k))
        .collect::<Option<Vec<_>>>()?;

    let mut seen = HashSet::new();
    let mut keep = Vec::with_capacity(table.num_rows());
    for idx in 0..table.num_rows() {
        let key = key_columns
            .iter()
            .map(|c| c.key_at(idx))
            .collect::<Option<Vec<KeyCell>>>();
        keep.push(match key {
            Some(key) => seen.insert(key),
            None => true,
        });
    }
    let removed = keep.iter().filter(|k| !**k).count();
    Some((keep, removed))
}

/// Keeps the first row for each (key columns) tuple. Rows with a null key are kept.
pub fn dedup_rows(table: &Table, keys: &[&str], label: &str) -> Result<(Table, usize), TableError> {
    let Some((keep, removed)) = first_row_mask(table, keys) else {
        return Ok((table.clone(), 0));
    };
    if removed > 0 {
        warn!(
            component = "normalize",
            event = "normalize.rows.duplicates_dropped",
            table = label,
            keys = ?keys,
            removed
        );
    }
    Ok((table.filter(&keep)?, removed))
}

pub fn coerce_integer_column(table: &mut Table, name: &str) -> Result<(), SchemaError> {
    if let Some(values) = table.column(name).map(|c| c.to_integer()) {
        table.set_column(Column::int(name, values))?;
    }
    Ok(())
}

/// Writes `icetime_min` from the first ice-time alias. A median above 200
/// means the provider reported seconds.
pub fn ensure_minutes(table: &mut Table) -> Result<Option<&'static str>, SchemaError> {
    let Some(source) = first_present(table, &ICE_TIME_ALIASES) else {
        return Ok(None);
    };
    if source == ICE_TIME_MINUTES {
        return Ok(Some(ICE_TIME_MINUTES));
    }
    let values = table
        .column(source)
        .map(|c| c.to_numeric())
        .unwrap_or_default();
    let minutes = match median(&values) {
        Some(med) if med > SECONDS_MEDIAN_THRESHOLD => {
            info!(
                component = "normalize",
                event = "normalize.icetime.seconds_detected",
                source,
                median = med
            );
            values.iter().map(|v| v.map(|s| s / 60.0)).collect()
        }
        _ => values,
    };
    table.set_column(Column::float(ICE_TIME_MINUTES, minutes))?;
    Ok(Some(ICE_TIME_MINUTES))
}

/// Median of the non-null values.
pub fn median(values: &[Option<f64>]) -> Option<f64> {
    let mut present = values.iter().flatten().copied().collect::<Vec<_>>();
    if present.is_empty() {
        return None;
    }
    present.sort_by(f64::total_cmp);
    let mid = present.len() / 2;
    if present.len() % 2 == 0 {
        Some((present[mid - 1] + present[mid]) / 2.0)
    } else {
        Some(present[mid])
    }
}

fn copy_alias(table: &mut Table, canonical: &str, aliases: &[&str]) -> Result<(), SchemaError> {
    if table.has_column(canonical) {
        return Ok(());
    }
    if let Some(source) = first_present(table, aliases) {
        if let Some(column) = table.column(source) {
            table.set_column(Column::new(canonical, column.data))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::read_csv_from;

    fn strings(values: &[&str]) -> Vec<Option<String>> {
        values.iter().map(|s| Some(s.to_string())).collect()
    }

    #[test]
    fn first_present_respects_alias_order() {
        let table = Table::from_columns(vec![
            Column::string("teamCode", strings(&["BOS"])),
            Column::string("playerTeam", strings(&["TOR"])),
        ])
        .expect("table");
        assert_eq!(first_present(&table, &TEAM_ALIASES), Some("playerTeam"));
        assert_eq!(first_present(&table, &TEAM_OPP_ALIASES), None);
    }

    #[test]
    fn required_column_absence_is_a_schema_error() {
        let table = Table::from_columns(vec![Column::int("gameId", vec![Some(1)])]).expect("table");
        let err = require_column(&table, "skater", "playerId", &PLAYER_ID_ALIASES)
            .expect_err("missing");
        assert!(matches!(err, SchemaError::MissingColumn { ref column, .. } if column == "playerId"));
        assert!(err.to_string().contains("skater"));
    }

    #[test]
    fn team_codes_map_to_canonical() {
        assert_eq!(normalize_team_code("LA"), "LAK");
        assert_eq!(normalize_team_code(" NJ "), "NJD");
        assert_eq!(normalize_team_code("WAS"), "WSH");
        assert_eq!(normalize_team_code("BOS"), "BOS");
    }

    #[test]
    fn dates_accept_both_encodings_and_never_fail() {
        let expected = NaiveDate::from_ymd_opt(2023, 10, 10);
        assert_eq!(parse_game_date("20231010"), expected);
        assert_eq!(parse_game_date("2023-10-10"), expected);
        assert_eq!(parse_game_date("2023-10-10T23:00:00Z"), expected);
        assert_eq!(parse_game_date("2023-10-10 19:00:00"), expected);
        assert_eq!(parse_game_date("10/10/2023"), expected);
        assert_eq!(parse_game_date("20231399"), None);
        assert_eq!(parse_game_date("yesterday"), None);
        assert_eq!(parse_game_date(""), None);
    }

    #[test]
    fn integer_encoded_dates_parse_from_int_columns() {
        let column = Column::int("gameDate", vec![Some(20240105), None]);
        assert_eq!(
            parse_date_column(&column),
            vec![NaiveDate::from_ymd_opt(2024, 1, 5), None]
        );
    }

    #[test]
    fn dedup_keeps_first_and_reports() {
        let mut table = Table::from_columns(vec![
            Column::int("goals", vec![Some(1)]),
            Column::int(" goals", vec![Some(2)]),
            Column::int("shots", vec![Some(3)]),
        ])
        .expect("table");
        let report = strip_and_dedup_columns(&mut table, "team").expect("dedup");
        assert_eq!(report.dropped, 1);
        assert_eq!(report.dropped_names, vec!["goals".to_string()]);
        assert_eq!(table.column_names(), vec!["goals", "shots"]);
        assert_eq!(table.column("goals").and_then(|c| c.f64_at(0)), Some(1.0));
    }

    #[test]
    fn repeated_csv_headers_keep_the_first_column() {
        let body = "gameId,team,goalsFor,team,goalsFor\n1,BOS,2,XXX,9\n";
        let mut table = read_csv_from(body.as_bytes()).expect("csv");
        assert_eq!(table.num_columns(), 5);

        let report = strip_and_dedup_columns(&mut table, "team").expect("dedup");
        assert_eq!(report.dropped, 2);
        assert_eq!(table.column_names(), vec!["gameId", "team", "goalsFor"]);
        assert_eq!(
            table.column("team").and_then(|c| c.text_at(0)).as_deref(),
            Some("BOS")
        );
        assert_eq!(table.column("goalsFor").and_then(|c| c.f64_at(0)), Some(2.0));
    }

    #[test]
    fn header_base_strips_reader_suffixes_only() {
        assert_eq!(header_base(" goals "), "goals");
        assert_eq!(header_base("goals_duplicated_0"), "goals");
        assert_eq!(header_base("goals_duplicated_x"), "goals_duplicated_x");
        assert_eq!(header_base("goals_duplicated_"), "goals_duplicated_");
    }

    #[test]
    fn standardize_fills_canonical_columns_from_aliases() {
        let mut table = Table::from_columns(vec![
            Column::string("playerTeam", strings(&["LA", "NJ"])),
            Column::string("opposingTeam", strings(&["TB", "BOS"])),
            Column::string("game_id", strings(&["2023020001", "2023020002"])),
            Column::int("date", vec![Some(20231010), Some(20231011)]),
            Column::string("homeOrAway", strings(&["HOME", "AWAY"])),
        ])
        .expect("table");
        normalize_game_table(&mut table, "team").expect("normalize");

        let team = table.column("team").expect("team");
        assert_eq!(team.str_at(0), Some("LAK"));
        assert_eq!(team.str_at(1), Some("NJD"));
        assert_eq!(
            table.column("team_opp").and_then(|c| c.text_at(0)).as_deref(),
            Some("TBL")
        );
        assert_eq!(
            table.column("gameId").and_then(|c| c.key_at(1)),
            Some(KeyCell::Int(2023020002))
        );
        assert_eq!(
            table.column("gameDate").and_then(|c| c.date_at(0)),
            NaiveDate::from_ymd_opt(2023, 10, 10)
        );
        assert_eq!(
            table.column("situation").and_then(|c| c.text_at(1)).as_deref(),
            Some("all")
        );
        assert!(table.has_column("home_or_away"));
    }

    #[test]
    fn situation_filter_and_row_dedup() {
        let table = Table::from_columns(vec![
            Column::int("gameId", vec![Some(1), Some(1), Some(1), Some(2)]),
            Column::string("team", strings(&["BOS", "BOS", "BOS", "BOS"])),
            Column::string("situation", strings(&["5on5", "ALL", "all", "all"])),
        ])
        .expect("table");
        let filtered = retain_situation_all(&table).expect("filter");
        assert_eq!(filtered.num_rows(), 3);
        let (deduped, removed) =
            dedup_rows(&filtered, &["gameId", "team"], "team").expect("dedup");
        assert_eq!(removed, 1);
        assert_eq!(deduped.num_rows(), 2);
    }

    #[test]
    fn ice_time_in_seconds_is_converted() {
        let mut table = Table::from_columns(vec![Column::int(
            "icetime",
            vec![Some(1200), Some(900), Some(0)],
        )])
        .expect("table");
        assert_eq!(ensure_minutes(&mut table).expect("ok"), Some(ICE_TIME_MINUTES));
        let minutes = table.column(ICE_TIME_MINUTES).expect("minutes");
        assert_eq!(minutes.f64_at(0), Some(20.0));
        assert_eq!(minutes.f64_at(2), Some(0.0));
    }
}
