//! MLB Stats API schedule lookup
//!
//! Finds games and their broadcast media ids for a date or date range. Only
//! the fields the games listing needs are typed; the API sends far more.

use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use mlbtv_auth::constants::USER_AGENT;

pub const STATS_API_BASE: &str = "https://statsapi.mlb.com/api/v1";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("schedule request failed: {0}")]
    Http(String),

    #[error("schedule request timed out")]
    Timeout,

    #[error("schedule service returned {0}")]
    Status(u16),

    #[error("invalid date {0:?}, expected YYYY-MM-DD or YYYYMMDD")]
    InvalidDate(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Team {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TeamSide {
    pub team: Team,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Teams {
    pub away: TeamSide,
    pub home: TeamSide,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStatus {
    #[serde(default)]
    pub detailed_state: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Broadcast {
    #[serde(default)]
    pub media_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub home_away: Option<String>,
    #[serde(default)]
    pub available_for_streaming: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub game_pk: u64,
    #[serde(default)]
    pub official_date: Option<String>,
    #[serde(default)]
    pub game_date: Option<String>,
    #[serde(default)]
    pub status: Option<GameStatus>,
    pub teams: Teams,
    #[serde(default)]
    pub broadcasts: Vec<Broadcast>,
}

#[derive(Debug, Deserialize)]
struct ScheduleResponse {
    #[serde(default)]
    dates: Vec<ScheduleDate>,
}

#[derive(Debug, Deserialize)]
struct ScheduleDate {
    date: NaiveDate,
    #[serde(default)]
    games: Vec<Game>,
}

/// Games on one date.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub date: NaiveDate,
    pub games: Vec<Game>,
}

/// Accepts `2025-08-08` and `20250808`.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y%m%d"))
        .map_err(|_| Error::InvalidDate(value.to_string()))
}

pub struct ScheduleClient {
    http: reqwest::Client,
    base_url: String,
}

impl ScheduleClient {
    pub fn new(timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            http,
            base_url: STATS_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// The latest date in `start..=end` that has games, or `start` with no
    /// games. `end` defaults to `start`.
    pub async fn games(&self, start: NaiveDate, end: Option<NaiveDate>) -> Result<Schedule> {
        let end = end.unwrap_or(start);
        let (first, last) = if end < start { (end, start) } else { (start, end) };
        let url = format!(
            "{}/schedule?sportId=1&startDate={first}&endDate={last}&hydrate=broadcasts(all)",
            self.base_url
        );

        debug!(%url, "requesting schedule");
        let response = self.http.get(&url).send().await.map_err(request_error)?;
        if !response.status().is_success() {
            return Err(Error::Status(response.status().as_u16()));
        }
        let body: ScheduleResponse = response.json().await.map_err(request_error)?;

        let schedule = body
            .dates
            .into_iter()
            .rev()
            .find(|d| !d.games.is_empty())
            .map(|d| Schedule {
                date: d.date,
                games: d.games,
            })
            .unwrap_or(Schedule {
                date: start,
                games: Vec::new(),
            });

        info!(date = %schedule.date, games = schedule.games.len(), "schedule loaded");
        Ok(schedule)
    }
}

fn request_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else {
        Error::Http(e.to_string())
    }
}
