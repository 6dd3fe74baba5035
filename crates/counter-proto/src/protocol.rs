//! JSON shapes exchanged with the visitor-counting API.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::roi::{polygon_from_value, Polygon, RoiError};

pub const PATH_LOGIN: &str = "/api/auth/login";
pub const PATH_ME: &str = "/api/me";
pub const PATH_DAILY_STATS: &str = "/api/stats/daily";
pub const PATH_REPORT_CSV: &str = "/api/reports/csv";

pub fn camera_path(id: i64) -> String {
    format!("/api/cameras/{}", id)
}

pub fn daily_stats_path(day: NaiveDate) -> String {
    format!("{}?day={}", PATH_DAILY_STATS, day.format("%Y-%m-%d"))
}

pub fn report_path(from: NaiveDate, to: NaiveDate) -> String {
    format!(
        "{}?from_day={}&to_day={}",
        PATH_REPORT_CSV,
        from.format("%Y-%m-%d"),
        to.format("%Y-%m-%d")
    )
}

/// Operator role as reported by `/api/me`.  Unknown roles are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    Operator,
    Other(String),
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        match s.as_str() {
            "admin" => Self::Admin,
            "operator" => Self::Operator,
            _ => Self::Other(s),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.label().to_string()
    }
}

impl Role {
    pub fn label(&self) -> &str {
        match self {
            Self::Admin => "admin",
            Self::Operator => "operator",
            Self::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub id: i64,
    pub username: String,
    pub role: Role,
}

/// One per-camera, per-day aggregate row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStatRow {
    pub camera_id: i64,
    pub day: NaiveDate,
    pub total_in: u64,
    pub total_out: u64,
    pub unique_estimate: u64,
}

/// Sums over a single row collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyTotals {
    pub total_in: u64,
    pub total_out: u64,
    pub unique: u64,
}

impl DailyTotals {
    /// Saturates at `u64::MAX` rather than overflowing.
    pub fn from_rows(rows: &[DailyStatRow]) -> Self {
        rows.iter().fold(Self::default(), |acc, r| Self {
            total_in: acc.total_in.saturating_add(r.total_in),
            total_out: acc.total_out.saturating_add(r.total_out),
            unique: acc.unique.saturating_add(r.unique_estimate),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub rtsp_url: Option<String>,
    /// Stored as raw JSON; validate with [`Camera::roi_polygon`].
    #[serde(default)]
    pub roi: Option<serde_json::Value>,
    /// Line-crossing config; opaque to the dashboard.
    #[serde(default)]
    pub line: Option<serde_json::Value>,
}

impl Camera {
    pub fn roi_polygon(&self) -> Result<Option<Polygon>, RoiError> {
        match &self.roi {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(v) => polygon_from_value(v).map(Some),
        }
    }
}

/// `PUT /api/cameras/{id}` body.  Both keys are always sent so that `null`
/// clears the stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraUpdate {
    pub rtsp_url: Option<String>,
    pub roi: Option<Polygon>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvReport {
    pub filename: String,
    pub csv: String,
}
