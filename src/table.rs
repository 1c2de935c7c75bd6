//! In-memory table exchanged between pipeline stages, backed by a polars
//! `DataFrame`.
//!
//! Every frame column is one of four kinds: `Int` (Int64), `Float` (Float64),
//! `Str` (String) or `Date`. Frames coming from readers are narrowed onto
//! those kinds on the way in. [`Column`] is an owned, decoded copy of one frame
//! column, used where per-row logic (shifts, trailing windows, date parsing)
//! runs in plain Rust.

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use polars::prelude::{
    col, BooleanChunked, Column as FrameColumn, DataFrame, DataType, IdxCa, IdxSize, IntoColumn,
    IntoLazy, JoinArgs, JoinType, NamedFrom, NewChunkedArray, PlSmallStr, PolarsError, Series,
    SortMultipleOptions,
};
use thiserror::Error;

const ROW_ORDER: &str = "__row_order";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Int,
    Float,
    Str,
    Date,
}

impl ColumnKind {
    pub fn dtype(self) -> DataType {
        match self {
            Self::Int => DataType::Int64,
            Self::Float => DataType::Float64,
            Self::Str => DataType::String,
            Self::Date => DataType::Date,
        }
    }

    fn of(dtype: &DataType) -> Option<Self> {
        match dtype {
            DataType::Int64 => Some(Self::Int),
            DataType::Float64 => Some(Self::Float),
            DataType::String => Some(Self::Str),
            DataType::Date => Some(Self::Date),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Str(Vec<Option<String>>),
    Date(Vec<Option<NaiveDate>>),
}

/// Join/group key cell. Integral floats collapse onto `Int` so keys read back
/// from differently-typed sources still compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyCell {
    Int(i64),
    Str(String),
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("column {column} has {found} rows, table has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
    #[error("duplicate column name {0}")]
    DuplicateColumn(String),
    #[error("column {column} has unsupported type {dtype}")]
    UnsupportedColumn { column: String, dtype: String },
    #[error("dataframe error: {0}")]
    Frame(#[from] PolarsError),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Str(v) => v.len(),
            Self::Date(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Self::Int(_) => ColumnKind::Int,
            Self::Float(_) => ColumnKind::Float,
            Self::Str(_) => ColumnKind::Str,
            Self::Date(_) => ColumnKind::Date,
        }
    }

    /// Float column with every non-finite value mapped to null.
    pub fn finite_floats(values: Vec<Option<f64>>) -> Self {
        Self::Float(
            values
                .into_iter()
                .map(|v| v.filter(|x| x.is_finite()))
                .collect(),
        )
    }

    pub fn is_null(&self, idx: usize) -> bool {
        match self {
            Self::Int(v) => v[idx].is_none(),
            Self::Float(v) => v[idx].is_none(),
            Self::Str(v) => v[idx].is_none(),
            Self::Date(v) => v[idx].is_none(),
        }
    }

    pub fn null_count(&self) -> usize {
        (0..self.len()).filter(|idx| self.is_null(*idx)).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn int(name: impl Into<String>, values: Vec<Option<i64>>) -> Self {
        Self::new(name, ColumnData::Int(values))
    }

    pub fn float(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self::new(name, ColumnData::finite_floats(values))
    }

    pub fn string(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self::new(name, ColumnData::Str(values))
    }

    pub fn date(name: impl Into<String>, values: Vec<Option<NaiveDate>>) -> Self {
        Self::new(name, ColumnData::Date(values))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn kind(&self) -> ColumnKind {
        self.data.kind()
    }

    pub fn f64_at(&self, idx: usize) -> Option<f64> {
        match &self.data {
            ColumnData::Int(v) => v[idx].map(|x| x as f64),
            ColumnData::Float(v) => v[idx],
            _ => None,
        }
    }

    pub fn str_at(&self, idx: usize) -> Option<&str> {
        match &self.data {
            ColumnData::Str(v) => v[idx].as_deref(),
            _ => None,
        }
    }

    pub fn date_at(&self, idx: usize) -> Option<NaiveDate> {
        match &self.data {
            ColumnData::Date(v) => v[idx],
            _ => None,
        }
    }

    /// Cell rendered as text regardless of kind; integral floats drop the `.0`.
    pub fn text_at(&self, idx: usize) -> Option<String> {
        match &self.data {
            ColumnData::Int(v) => v[idx].map(|x| x.to_string()),
            ColumnData::Float(v) => v[idx].map(|x| {
                if x.fract() == 0.0 && x.abs() < 1e15 {
                    format!("{}", x as i64)
                } else {
                    x.to_string()
                }
            }),
            ColumnData::Str(v) => v[idx].clone(),
            ColumnData::Date(v) => v[idx].map(|d| d.format("%Y-%m-%d").to_string()),
        }
    }

    pub fn key_at(&self, idx: usize) -> Option<KeyCell> {
        match &self.data {
            ColumnData::Int(v) => v[idx].map(KeyCell::Int),
            ColumnData::Float(v) => v[idx].and_then(|x| {
                if x.is_finite() && x.fract() == 0.0 {
                    Some(KeyCell::Int(x as i64))
                } else {
                    Some(KeyCell::Str(x.to_string()))
                }
            }),
            ColumnData::Str(v) => v[idx].as_ref().map(|s| KeyCell::Str(s.trim().to_string())),
            ColumnData::Date(v) => v[idx].map(|d| KeyCell::Str(d.format("%Y-%m-%d").to_string())),
        }
    }

    /// Numeric coercion: unparsable strings and dates become null.
    pub fn to_numeric(&self) -> Vec<Option<f64>> {
        match &self.data {
            ColumnData::Int(v) => v.iter().map(|x| x.map(|x| x as f64)).collect(),
            ColumnData::Float(v) => v.iter().map(|x| x.filter(|x| x.is_finite())).collect(),
            ColumnData::Str(v) => v
                .iter()
                .map(|x| {
                    x.as_deref()
                        .and_then(|s| s.trim().parse::<f64>().ok())
                        .filter(|x| x.is_finite())
                })
                .collect(),
            ColumnData::Date(v) => vec![None; v.len()],
        }
    }

    /// Integer coercion: only integral values survive.
    pub fn to_integer(&self) -> Vec<Option<i64>> {
        match &self.data {
            ColumnData::Int(v) => v.clone(),
            ColumnData::Float(v) => v.iter().map(|x| x.and_then(integral)).collect(),
            ColumnData::Str(v) => v
                .iter()
                .map(|x| {
                    x.as_deref().and_then(|s| {
                        let s = s.trim();
                        s.parse::<i64>()
                            .ok()
                            .or_else(|| s.parse::<f64>().ok().and_then(integral))
                    })
                })
                .collect(),
            ColumnData::Date(v) => vec![None; v.len()],
        }
    }

    fn to_series(&self) -> Result<Series, TableError> {
        let name = PlSmallStr::from(self.name.as_str());
        let series = match &self.data {
            ColumnData::Int(v) => Series::new(name, v.as_slice()),
            ColumnData::Float(v) => Series::new(name, v.as_slice()),
            ColumnData::Str(v) => Series::new(name, v.as_slice()),
            ColumnData::Date(v) => {
                let days = v
                    .iter()
                    .map(|d| d.map(days_since_epoch))
                    .collect::<Vec<_>>();
                Series::new(name, days.as_slice()).cast(&DataType::Date)?
            }
        };
        Ok(series)
    }

    fn from_frame_column(column: &FrameColumn) -> Result<Self, TableError> {
        let series = column.as_materialized_series();
        let data = match series.dtype() {
            DataType::Int64 => ColumnData::Int(series.i64()?.into_iter().collect()),
            DataType::Float64 => ColumnData::finite_floats(series.f64()?.into_iter().collect()),
            DataType::String => ColumnData::Str(
                series
                    .str()?
                    .into_iter()
                    .map(|v| v.map(str::to_string))
                    .collect(),
            ),
            DataType::Date => ColumnData::Date(
                series
                    .date()?
                    .physical()
                    .into_iter()
                    .map(|days| days.and_then(date_from_days))
                    .collect(),
            ),
            other => {
                return Err(TableError::UnsupportedColumn {
                    column: series.name().to_string(),
                    dtype: other.to_string(),
                })
            }
        };
        Ok(Self::new(series.name().as_str(), data))
    }
}

fn unix_epoch() -> NaiveDate {
    DateTime::<Utc>::UNIX_EPOCH.date_naive()
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    (date - unix_epoch()).num_days() as i32
}

fn date_from_days(days: i32) -> Option<NaiveDate> {
    unix_epoch().checked_add_signed(TimeDelta::days(i64::from(days)))
}

/// Casts a reader column onto one of the four table kinds: narrower integers
/// and booleans to Int64, Float32 to Float64, timestamps of any unit to their
/// calendar date, all-null columns to String.
fn narrow(column: &FrameColumn) -> Result<FrameColumn, TableError> {
    let dtype = column.dtype();
    if ColumnKind::of(dtype).is_some() {
        return Ok(column.clone());
    }
    let target = match dtype {
        DataType::Datetime(_, _) => DataType::Date,
        DataType::Null => DataType::String,
        dt if dt.is_bool() || dt.is_integer() => DataType::Int64,
        dt if dt.is_float() => DataType::Float64,
        other => {
            return Err(TableError::UnsupportedColumn {
                column: column.name().to_string(),
                dtype: other.to_string(),
            })
        }
    };
    Ok(column.cast(&target)?)
}

fn unify_kinds(kinds: &[ColumnKind]) -> ColumnKind {
    let Some(first) = kinds.first().copied() else {
        return ColumnKind::Str;
    };
    if kinds.iter().all(|k| *k == first) {
        first
    } else if kinds
        .iter()
        .all(|k| matches!(k, ColumnKind::Int | ColumnKind::Float))
    {
        ColumnKind::Float
    } else {
        ColumnKind::Str
    }
}

fn integral(x: f64) -> Option<i64> {
    if x.is_finite() && x.fract() == 0.0 {
        Some(x as i64)
    } else {
        None
    }
}

#[derive(Debug, Clone, Default)]
pub struct Table {
    frame: DataFrame,
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.frame.equals_missing(&other.frame)
    }
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a frame, narrowing every column onto the table kinds.
    pub fn from_frame(frame: DataFrame) -> Result<Self, TableError> {
        let columns = frame
            .get_columns()
            .iter()
            .map(narrow)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            frame: DataFrame::new(columns)?,
        })
    }

    pub fn from_columns(columns: Vec<Column>) -> Result<Self, TableError> {
        let num_rows = columns.first().map(Column::len).unwrap_or(0);
        let mut names = Vec::with_capacity(columns.len());
        let mut series = Vec::with_capacity(columns.len());
        for column in &columns {
            let found = column.len();
            if found != num_rows {
                return Err(TableError::LengthMismatch {
                    column: column.name.clone(),
                    expected: num_rows,
                    found,
                });
            }
            if names.contains(&column.name.as_str()) {
                return Err(TableError::DuplicateColumn(column.name.clone()));
            }
            names.push(column.name.as_str());
            series.push(column.to_series()?.into_column());
        }
        Ok(Self {
            frame: DataFrame::new(series)?,
        })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn num_rows(&self) -> usize {
        self.frame.height()
    }

    pub fn num_columns(&self) -> usize {
        self.frame.width()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.frame
            .get_columns()
            .iter()
            .map(|c| c.name().as_str())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.get_column_index(name).is_some()
    }

    pub fn kind(&self, name: &str) -> Option<ColumnKind> {
        self.frame
            .column(name)
            .ok()
            .and_then(|c| ColumnKind::of(c.dtype()))
    }

    /// Decoded copy of the named column.
    pub fn column(&self, name: &str) -> Option<Column> {
        self.frame
            .column(name)
            .ok()
            .and_then(|c| Column::from_frame_column(c).ok())
    }

    /// Replaces the column with the same name, or appends.
    pub fn set_column(&mut self, column: Column) -> Result<(), TableError> {
        let found = column.len();
        if self.frame.width() > 0 && found != self.num_rows() {
            return Err(TableError::LengthMismatch {
                column: column.name,
                expected: self.num_rows(),
                found,
            });
        }
        let series = column.to_series()?;
        if self.frame.width() == 0 {
            self.frame = DataFrame::new(vec![series.into_column()])?;
        } else {
            self.frame.with_column(series)?;
        }
        Ok(())
    }

    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        let dropped = self.frame.drop_in_place(name).ok()?;
        Column::from_frame_column(&dropped).ok()
    }

    /// Returns `false` when `from` is absent.
    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<bool, TableError> {
        if !self.has_column(from) {
            return Ok(false);
        }
        if from != to && self.has_column(to) {
            return Err(TableError::DuplicateColumn(to.to_string()));
        }
        self.frame.rename(from, PlSmallStr::from(to))?;
        // polars 0.46 `rename` leaves the cached schema stale; lazy plans would see the old name.
        self.frame.clear_schema();
        Ok(true)
    }

    pub fn retain_columns(&mut self, mut keep: impl FnMut(&str) -> bool) -> Result<(), TableError> {
        let names = self
            .column_names()
            .into_iter()
            .filter(|name| keep(name))
            .map(str::to_string)
            .collect::<Vec<_>>();
        self.frame = self.frame.select(names)?;
        Ok(())
    }

    pub fn rename_all(&mut self, mut rename: impl FnMut(&str) -> String) -> Result<(), TableError> {
        let names = self
            .column_names()
            .into_iter()
            .map(|name| rename(name))
            .collect::<Vec<_>>();
        for (idx, name) in names.iter().enumerate() {
            if names[..idx].contains(name) {
                return Err(TableError::DuplicateColumn(name.clone()));
            }
        }
        self.frame.set_column_names(names)?;
        Ok(())
    }

    /// Columns present in `names`, in that order; missing names are skipped.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Table, TableError> {
        let mut present: Vec<&str> = Vec::with_capacity(names.len());
        for name in names.iter().map(AsRef::as_ref) {
            if self.has_column(name) && !present.contains(&name) {
                present.push(name);
            }
        }
        Ok(Table {
            frame: self.frame.select(present)?,
        })
    }

    pub fn take(&self, indices: &[usize]) -> Result<Table, TableError> {
        let idx = IdxCa::from_vec(
            PlSmallStr::from("idx"),
            indices.iter().map(|i| *i as IdxSize).collect(),
        );
        Ok(Table {
            frame: self.frame.take(&idx)?,
        })
    }

    pub fn filter(&self, mask: &[bool]) -> Result<Table, TableError> {
        let mask = BooleanChunked::from_slice(PlSmallStr::from("mask"), mask);
        Ok(Table {
            frame: self.frame.filter(&mask)?,
        })
    }

    /// Stable multi-key ascending sort with nulls last.
    pub fn sort_by(&self, keys: &[&str]) -> Result<Table, TableError> {
        if keys.is_empty() || self.num_rows() == 0 {
            return Ok(self.clone());
        }
        let by = keys.iter().map(|k| PlSmallStr::from(*k)).collect::<Vec<_>>();
        let options = SortMultipleOptions::default()
            .with_maintain_order(true)
            .with_nulls_last(true);
        Ok(Table {
            frame: self.frame.sort(by, options)?,
        })
    }

    /// Vertical union matched by column name. A column missing from one input
    /// contributes nulls; int/float mixes widen to float and other kind
    /// conflicts fall back to text.
    pub fn concat(tables: &[Table]) -> Result<Table, TableError> {
        let mut names: Vec<&str> = Vec::new();
        for table in tables {
            for name in table.column_names() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        let kinds = names
            .iter()
            .map(|name| {
                let kinds = tables.iter().filter_map(|t| t.kind(name)).collect::<Vec<_>>();
                unify_kinds(&kinds)
            })
            .collect::<Vec<_>>();

        let mut combined: Option<DataFrame> = None;
        for table in tables {
            let columns = names
                .iter()
                .zip(&kinds)
                .map(|(name, kind)| match table.frame.column(name) {
                    Ok(column) => column.cast(&kind.dtype()),
                    Err(_) => Ok(Series::full_null(
                        PlSmallStr::from(*name),
                        table.num_rows(),
                        &kind.dtype(),
                    )
                    .into_column()),
                })
                .collect::<Result<Vec<_>, _>>()?;
            let frame = DataFrame::new(columns)?;
            match combined.as_mut() {
                Some(acc) => {
                    acc.vstack_mut(&frame)?;
                }
                None => combined = Some(frame),
            }
        }
        Ok(Table {
            frame: combined.unwrap_or_default(),
        })
    }

    /// Left join on equally named key columns. Output rows follow `self`;
    /// null keys never match. Callers dedup `right` first when a key may repeat.
    pub fn left_join(&self, right: &Table, on: &[&str]) -> Result<Table, TableError> {
        let keys = on.iter().map(|k| col(*k)).collect::<Vec<_>>();
        let joined = self
            .frame
            .clone()
            .lazy()
            .with_row_index(ROW_ORDER, None)
            .join(
                right.frame.clone().lazy(),
                keys.clone(),
                keys,
                JoinArgs::new(JoinType::Left),
            )
            .sort([ROW_ORDER], SortMultipleOptions::default())
            .collect()?
            .drop(ROW_ORDER)?;
        Table::from_frame(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_columns(vec![
            Column::int("gameId", vec![Some(1), Some(2), None]),
            Column::string(
                "team",
                vec![Some("BOS".to_string()), None, Some("TOR".to_string())],
            ),
            Column::float("goalsFor", vec![Some(3.0), Some(f64::NAN), Some(1.0)]),
        ])
        .expect("equal lengths")
    }

    fn text(table: &Table, name: &str, row: usize) -> Option<String> {
        table.column(name).and_then(|c| c.text_at(row))
    }

    #[test]
    fn float_constructor_maps_non_finite_to_null() {
        let table = sample();
        let col = table.column("goalsFor").expect("column exists");
        assert_eq!(col.f64_at(1), None);
        assert_eq!(col.data.null_count(), 1);
    }

    #[test]
    fn set_column_rejects_length_mismatch() {
        let mut table = sample();
        let err = table
            .set_column(Column::int("x", vec![Some(1)]))
            .expect_err("mismatch must fail");
        assert!(matches!(
            err,
            TableError::LengthMismatch { ref column, expected: 3, found: 1 } if column == "x"
        ));

        table
            .set_column(Column::int("gameId", vec![Some(7), Some(8), Some(9)]))
            .expect("same length replaces");
        assert_eq!(table.num_columns(), 3);
        assert_eq!(table.column("gameId").and_then(|c| c.f64_at(2)), Some(9.0));
    }

    #[test]
    fn take_reorders_every_column() {
        let table = sample().take(&[2, 0]).expect("take");
        assert_eq!(table.num_rows(), 2);
        assert_eq!(text(&table, "team", 0).as_deref(), Some("TOR"));
        assert_eq!(table.column("gameId").and_then(|c| c.f64_at(1)), Some(1.0));
    }

    #[test]
    fn coercions_follow_to_numeric_semantics() {
        let col = Column::string(
            "raw",
            vec![
                Some(" 4 ".to_string()),
                Some("4.0".to_string()),
                Some("n/a".to_string()),
                None,
            ],
        );
        assert_eq!(col.to_numeric(), vec![Some(4.0), Some(4.0), None, None]);
        assert_eq!(col.to_integer(), vec![Some(4), Some(4), None, None]);

        let floats = Column::float("f", vec![Some(2.0), Some(2.5)]);
        assert_eq!(floats.to_integer(), vec![Some(2), None]);
        assert_eq!(floats.key_at(0), Some(KeyCell::Int(2)));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = Table::from_columns(vec![
            Column::int("a", vec![Some(1)]),
            Column::int("a", vec![Some(2)]),
        ])
        .expect_err("duplicate");
        assert!(matches!(err, TableError::DuplicateColumn(name) if name == "a"));

        let mut table = sample();
        assert!(table.rename_column("team", "gameId").is_err());
        assert!(!table.rename_column("missing", "x").expect("absent is not an error"));
    }

    #[test]
    fn dates_round_trip_through_the_frame() {
        let day = NaiveDate::from_ymd_opt(1969, 12, 31);
        let table = Table::from_columns(vec![Column::date(
            "gameDate",
            vec![day, None, NaiveDate::from_ymd_opt(2024, 2, 29)],
        )])
        .expect("table");
        assert_eq!(table.kind("gameDate"), Some(ColumnKind::Date));
        let dates = table.column("gameDate").expect("dates");
        assert_eq!(dates.date_at(0), day);
        assert_eq!(dates.date_at(1), None);
        assert_eq!(dates.text_at(2).as_deref(), Some("2024-02-29"));
    }

    #[test]
    fn day_numbers_count_from_the_unix_epoch() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("valid date");
        assert_eq!(days_since_epoch(epoch), 0);
        assert_eq!(date_from_days(0), Some(epoch));
        assert_eq!(date_from_days(19_640), NaiveDate::from_ymd_opt(2023, 10, 10));
    }

    #[test]
    fn reader_types_narrow_onto_table_kinds() {
        let flags = Series::new(PlSmallStr::from("flag"), &[Some(true), None, Some(false)]);
        let small = Series::new(PlSmallStr::from("small"), &[1_i32, 2, 3]);
        let frame = DataFrame::new(vec![flags.into_column(), small.into_column()]).expect("frame");
        let table = Table::from_frame(frame).expect("narrowed");
        assert_eq!(table.kind("flag"), Some(ColumnKind::Int));
        assert_eq!(table.kind("small"), Some(ColumnKind::Int));
        assert_eq!(table.column("flag").and_then(|c| c.f64_at(0)), Some(1.0));
    }

    #[test]
    fn sort_is_stable_with_nulls_last() {
        let table = Table::from_columns(vec![
            Column::string(
                "team",
                vec![
                    Some("TOR".to_string()),
                    None,
                    Some("BOS".to_string()),
                    Some("BOS".to_string()),
                ],
            ),
            Column::int("order", vec![Some(0), Some(1), Some(2), Some(3)]),
        ])
        .expect("table")
        .sort_by(&["team"])
        .expect("sort");
        let order = table.column("order").expect("order").to_integer();
        assert_eq!(order, vec![Some(2), Some(3), Some(0), Some(1)]);
    }

    #[test]
    fn concat_unions_columns_and_widens_kinds() {
        let a = Table::from_columns(vec![
            Column::int("gameId", vec![Some(1)]),
            Column::int("goals", vec![Some(2)]),
        ])
        .expect("table");
        let b = Table::from_columns(vec![
            Column::int("gameId", vec![Some(2)]),
            Column::float("goals", vec![Some(0.5)]),
            Column::string("team", vec![Some("BOS".to_string())]),
        ])
        .expect("table");
        let out = Table::concat(&[a, b]).expect("concat");
        assert_eq!(out.num_rows(), 2);
        assert_eq!(out.column_names(), vec!["gameId", "goals", "team"]);
        assert_eq!(out.kind("goals"), Some(ColumnKind::Float));
        assert_eq!(text(&out, "team", 0), None);
        assert_eq!(text(&out, "team", 1).as_deref(), Some("BOS"));
    }

    #[test]
    fn left_join_keeps_left_rows_in_order() {
        let left = Table::from_columns(vec![
            Column::int("gameId", vec![Some(3), Some(1), None, Some(2)]),
            Column::float("x", vec![Some(0.3), Some(0.1), Some(0.0), Some(0.2)]),
        ])
        .expect("left");
        let right = Table::from_columns(vec![
            Column::int("gameId", vec![Some(1), Some(3), None]),
            Column::float("y", vec![Some(10.0), Some(30.0), Some(99.0)]),
        ])
        .expect("right");
        let joined = left.left_join(&right, &["gameId"]).expect("join");
        assert_eq!(joined.column_names(), vec!["gameId", "x", "y"]);
        assert_eq!(
            joined.column("y").expect("y").to_numeric(),
            vec![Some(30.0), Some(10.0), None, None]
        );
        assert_eq!(
            joined.column("x").expect("x").to_numeric(),
            vec![Some(0.3), Some(0.1), Some(0.0), Some(0.2)]
        );
    }
}
