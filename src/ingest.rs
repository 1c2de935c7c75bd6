//! Collates downloaded raw per-game CSV files into the processed team, skater
//! and goalie game tables.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{DataLayout, PlayerKind};
use crate::normalize::{
    ensure_minutes, normalize_game_table, normalize_team_code, retain_situation_all, SchemaError,
};
use crate::storage::{read_csv_table, StorageError};
use crate::table::{Column, Table, TableError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to list {path}: {source}")]
    ListDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no raw CSV files found under {0}")]
    NoInputFiles(String),
    #[error("{path}: {source}")]
    File {
        path: String,
        #[source]
        source: StorageError,
    },
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Table(#[from] TableError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeasonRange {
    pub start: i32,
    pub end: i32,
}

impl SeasonRange {
    pub fn contains(&self, season: i64) -> bool {
        season >= i64::from(self.start) && season <= i64::from(self.end)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub files: usize,
    pub rows_read: usize,
    pub rows_out_of_range: usize,
    pub rows_not_all_situation: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestBuild {
    pub table: Table,
    pub report: IngestReport,
}

/// CSV files directly inside `dir`, sorted by file name.
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let entries = fs::read_dir(dir).map_err(|source| IngestError::ListDir {
        path: dir.display().to_string(),
        source,
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| IngestError::ListDir {
                path: dir.display().to_string(),
                source,
            })?
            .path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Team game-by-game careers files. A file whose team column is absent or
/// entirely null takes the team code from its file name.
pub fn load_team_games(
    layout: &DataLayout,
    season_type: &str,
    seasons: SeasonRange,
) -> Result<IngestBuild, IngestError> {
    let dir = layout.team_raw_dir(season_type);
    let files = list_csv_files(&dir)?;
    if files.is_empty() {
        return Err(IngestError::NoInputFiles(dir.display().to_string()));
    }

    let mut tables = Vec::with_capacity(files.len());
    for path in &files {
        let mut table = read_raw(path)?;
        normalize_game_table(&mut table, &file_label(path))?;
        let team_missing = table
            .column("team")
            .map_or(true, |c| c.data.null_count() == c.len());
        if team_missing {
            let code = path
                .file_stem()
                .map(|s| normalize_team_code(&s.to_string_lossy()))
                .unwrap_or_default();
            debug!(
                component = "ingest",
                event = "ingest.team.from_file_name",
                path = %path.display(),
                team = %code
            );
            table.set_column(Column::string("team", vec![Some(code); table.num_rows()]))?;
        }
        tables.push(table);
    }

    finish(Table::concat(&tables)?, files.len(), seasons, "team")
}

/// Per-season team-player files for skaters or goalies. Files missing a
/// season column take the season of their directory.
pub fn load_player_games(
    layout: &DataLayout,
    season_type: &str,
    seasons: SeasonRange,
    kind: PlayerKind,
) -> Result<IngestBuild, IngestError> {
    let mut tables = Vec::new();
    let mut file_count = 0usize;
    for season in seasons.start..=seasons.end {
        let dir = layout.player_raw_dir(season, season_type, kind);
        if !dir.is_dir() {
            debug!(
                component = "ingest",
                event = "ingest.season.missing",
                kind = kind.dir_name(),
                season,
                path = %dir.display()
            );
            continue;
        }
        for path in list_csv_files(&dir)? {
            let mut table = read_raw(&path)?;
            normalize_game_table(&mut table, &file_label(&path))?;
            if !table.has_column("season") {
                table.set_column(Column::int(
                    "season",
                    vec![Some(i64::from(season)); table.num_rows()],
                ))?;
            }
            tables.push(table);
            file_count += 1;
        }
    }
    if tables.is_empty() {
        return Err(IngestError::NoInputFiles(format!(
            "{}/teamPlayerGameByGame/*/{season_type}/{}",
            layout.raw_dir().display(),
            kind.dir_name()
        )));
    }

    let mut build = finish(Table::concat(&tables)?, file_count, seasons, kind.dir_name())?;
    ensure_minutes(&mut build.table)?;
    Ok(build)
}

fn finish(
    combined: Table,
    files: usize,
    seasons: SeasonRange,
    label: &str,
) -> Result<IngestBuild, IngestError> {
    let rows_read = combined.num_rows();
    let in_range = match combined.column("season") {
        Some(column) => {
            let mask = column
                .to_integer()
                .iter()
                .map(|s| s.is_some_and(|s| seasons.contains(s)))
                .collect::<Vec<_>>();
            combined.filter(&mask)?
        }
        None => {
            warn!(
                component = "ingest",
                event = "ingest.season.column_missing",
                table = label
            );
            combined
        }
    };
    let rows_out_of_range = rows_read - in_range.num_rows();
    let table = retain_situation_all(&in_range)?;
    let report = IngestReport {
        files,
        rows_read,
        rows_out_of_range,
        rows_not_all_situation: in_range.num_rows() - table.num_rows(),
    };

    info!(
        component = "ingest",
        event = "ingest.collated",
        table = label,
        files,
        rows_read,
        rows_out_of_range,
        rows_not_all_situation = report.rows_not_all_situation,
        rows = table.num_rows()
    );
    Ok(IngestBuild { table, report })
}

fn read_raw(path: &Path) -> Result<Table, IngestError> {
    read_csv_table(path).map_err(|source| IngestError::File {
        path: path.display().to_string(),
        source,
    })
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnKind;

    fn write(path: &Path, body: &str) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, body).expect("write csv");
    }

    #[test]
    fn team_files_are_collated_and_filtered() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = DataLayout::new(dir.path());
        let teams = layout.team_raw_dir("regular");
        write(
            &teams.join("BOS.csv"),
            "gameId,gameDate,season,situation,goalsFor\n\
             1,20221010,2022,all,3\n\
             1,20221010,2022,5on5,2\n\
             2,20181010,2018,all,4\n",
        );
        write(
            &teams.join("NJ.csv"),
            "gameId,gameDate,season,situation,team,goalsFor\n\
             3,2022-10-12,2022,all,NJ,1\n",
        );
        write(&teams.join("notes.txt"), "ignored");

        let build = load_team_games(&layout, "regular", SeasonRange { start: 2019, end: 2023 })
            .expect("ingest");
        assert_eq!(build.report.files, 2);
        assert_eq!(build.report.rows_read, 4);
        assert_eq!(build.report.rows_out_of_range, 1);
        assert_eq!(build.report.rows_not_all_situation, 1);

        let teams = build.table.column("team").expect("team column");
        assert_eq!(teams.str_at(0), Some("BOS"));
        assert_eq!(teams.str_at(1), Some("NJD"));
        assert_eq!(build.table.kind("gameDate"), Some(ColumnKind::Date));
    }

    #[test]
    fn player_files_take_season_from_directory_and_minutes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = DataLayout::new(dir.path());
        write(
            &layout
                .player_raw_dir(2021, "regular", PlayerKind::Skaters)
                .join("BOS.csv"),
            "gameId,gameDate,playerId,team,situation,icetime,goals\n\
             10,2021-10-10,8478,BOS,all,1200,1\n\
             11,2021-10-12,8478,BOS,all,900,0\n",
        );
        let build = load_player_games(
            &layout,
            "regular",
            SeasonRange { start: 2020, end: 2021 },
            PlayerKind::Skaters,
        )
        .expect("ingest");
        assert_eq!(build.table.num_rows(), 2);
        assert_eq!(build.table.column("season").and_then(|c| c.f64_at(0)), Some(2021.0));
        assert_eq!(
            build.table.column("icetime_min").and_then(|c| c.f64_at(0)),
            Some(20.0)
        );
    }

    #[test]
    fn missing_team_directory_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = DataLayout::new(dir.path());
        let err = load_team_games(&layout, "regular", SeasonRange { start: 2019, end: 2020 })
            .expect_err("no files");
        assert!(matches!(err, IngestError::ListDir { .. }));
    }
}
