//! Upcoming regular-season games from a schedule CSV or a saved schedule API
//! payload.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::normalize::{first_present, normalize_team_code, parse_game_date};
use crate::storage::{read_csv_table, StorageError};

const SCHEDULE_DATE_ALIASES: [&str; 2] = ["scheduleDate", "date"];
const START_TIME_ALIASES: [&str; 2] = ["gameDateUTC", "startTimeUTC"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub game_id: i64,
    pub schedule_date: NaiveDate,
    pub start_time_utc: Option<String>,
    pub home_team: String,
    pub away_team: String,
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("failed to read schedule {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("schedule JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("schedule CSV is missing column {0}")]
    MissingColumn(String),
}

#[derive(Debug, Default, Deserialize)]
struct SchedulePayload {
    #[serde(rename = "gameWeek", default)]
    game_week: Vec<ScheduleDay>,
    #[serde(rename = "currentDate")]
    current_date: Option<String>,
    #[serde(default)]
    games: Vec<PayloadGame>,
}

#[derive(Debug, Deserialize)]
struct ScheduleDay {
    date: Option<String>,
    #[serde(default)]
    games: Vec<PayloadGame>,
}

#[derive(Debug, Deserialize)]
struct PayloadGame {
    id: Option<Value>,
    #[serde(rename = "gameType")]
    game_type: Option<Value>,
    #[serde(rename = "startTimeUTC")]
    start_time_utc: Option<String>,
    #[serde(rename = "homeTeam")]
    home_team: Option<PayloadTeam>,
    #[serde(rename = "awayTeam")]
    away_team: Option<PayloadTeam>,
}

#[derive(Debug, Deserialize)]
struct PayloadTeam {
    abbrev: Option<String>,
}

/// Candidate row before id/team validation.
#[derive(Debug, Clone)]
struct RawGame {
    game_id: Option<i64>,
    schedule_date: NaiveDate,
    start_time_utc: Option<String>,
    home_team: Option<String>,
    away_team: Option<String>,
}

/// Loads `.json` payloads or schedule CSVs, keeping games dated within
/// `[from, to]`.
pub fn load_schedule(
    path: &Path,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<ScheduleEntry>, ScheduleError> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let entries = if is_json {
        let text = fs::read_to_string(path).map_err(|source| ScheduleError::Read {
            path: path.display().to_string(),
            source,
        })?;
        parse_schedule_json(&text, from, to)?
    } else {
        read_schedule_csv(path, from, to)?
    };
    info!(
        component = "schedule",
        event = "schedule.loaded",
        path = %path.display(),
        from = %from,
        to = %to,
        games = entries.len()
    );
    Ok(entries)
}

/// Accepts one payload object or an array of per-day payloads. Within a
/// payload the `gameWeek` slate wins; the score-style `currentDate` + `games`
/// form is used only when the week yields nothing.
pub fn parse_schedule_json(
    text: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<ScheduleEntry>, ScheduleError> {
    let value: Value = serde_json::from_str(text)?;
    let payloads = match value {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<SchedulePayload>, _>>()?,
        other => vec![serde_json::from_value(other)?],
    };

    let mut raw = Vec::new();
    for payload in &payloads {
        let week = games_from_week(payload, from, to);
        if week.is_empty() {
            raw.extend(games_from_score(payload, from, to));
        } else {
            raw.extend(week);
        }
    }
    Ok(finalize(raw))
}

pub fn read_schedule_csv(
    path: &Path,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<ScheduleEntry>, ScheduleError> {
    let table = read_csv_table(path)?;
    let required = |candidates: &[&'static str], label: &str| {
        first_present(&table, candidates)
            .and_then(|name| table.column(name))
            .ok_or_else(|| ScheduleError::MissingColumn(label.to_string()))
    };
    let ids = required(&["gameId"], "gameId")?;
    let dates = required(&SCHEDULE_DATE_ALIASES, "scheduleDate")?;
    let homes = required(&["homeTeam"], "homeTeam")?;
    let aways = required(&["awayTeam"], "awayTeam")?;
    let starts = first_present(&table, &START_TIME_ALIASES).and_then(|name| table.column(name));

    let ids = ids.to_integer();
    let mut raw = Vec::new();
    for row in 0..table.num_rows() {
        let date = dates
            .date_at(row)
            .or_else(|| dates.text_at(row).and_then(|s| parse_game_date(&s)));
        let Some(schedule_date) = date.filter(|d| *d >= from && *d <= to) else {
            continue;
        };
        raw.push(RawGame {
            game_id: ids[row],
            schedule_date,
            start_time_utc: starts.as_ref().and_then(|c| c.text_at(row)),
            home_team: homes.text_at(row),
            away_team: aways.text_at(row),
        });
    }
    Ok(finalize(raw))
}

pub fn is_regular_season(game_type: Option<&Value>) -> bool {
    match game_type {
        Some(Value::Number(n)) => n.as_i64() == Some(2),
        Some(Value::String(s)) => s == "2" || s == "R",
        _ => false,
    }
}

fn games_from_week(payload: &SchedulePayload, from: NaiveDate, to: NaiveDate) -> Vec<RawGame> {
    let mut out = Vec::new();
    for day in &payload.game_week {
        let Some(date) = day.date.as_deref().and_then(parse_game_date) else {
            continue;
        };
        if date < from || date > to {
            continue;
        }
        out.extend(
            day.games
                .iter()
                .filter(|g| is_regular_season(g.game_type.as_ref()))
                .map(|g| raw_game(g, date)),
        );
    }
    out
}

fn games_from_score(payload: &SchedulePayload, from: NaiveDate, to: NaiveDate) -> Vec<RawGame> {
    let Some(date) = payload.current_date.as_deref().and_then(parse_game_date) else {
        return Vec::new();
    };
    if date < from || date > to {
        return Vec::new();
    }
    payload
        .games
        .iter()
        .filter(|g| is_regular_season(g.game_type.as_ref()))
        .map(|g| raw_game(g, date))
        .collect()
}

fn raw_game(game: &PayloadGame, schedule_date: NaiveDate) -> RawGame {
    let game_id = match &game.id {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    RawGame {
        game_id,
        schedule_date,
        start_time_utc: game.start_time_utc.clone(),
        home_team: game.home_team.as_ref().and_then(|t| t.abbrev.clone()),
        away_team: game.away_team.as_ref().and_then(|t| t.abbrev.clone()),
    }
}

/// Drops rows missing an id or a team, normalizes team codes and keeps the
/// first row per game id.
fn finalize(raw: Vec<RawGame>) -> Vec<ScheduleEntry> {
    let total = raw.len();
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(total);
    let mut incomplete = 0usize;
    for game in raw {
        let (Some(game_id), Some(home), Some(away)) = (game.game_id, game.home_team, game.away_team)
        else {
            incomplete += 1;
            continue;
        };
        if home.trim().is_empty() || away.trim().is_empty() {
            incomplete += 1;
            continue;
        }
        if !seen.insert(game_id) {
            continue;
        }
        out.push(ScheduleEntry {
            game_id,
            schedule_date: game.schedule_date,
            start_time_utc: game.start_time_utc,
            home_team: normalize_team_code(&home),
            away_team: normalize_team_code(&away),
        });
    }
    if incomplete > 0 || out.len() + incomplete < total {
        warn!(
            component = "schedule",
            event = "schedule.rows.dropped",
            incomplete,
            duplicates = total - incomplete - out.len()
        );
    }
    out
}
