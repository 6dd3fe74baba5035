//! One-shot API calls used by the CLI: login, camera config, CSV export.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use counter_proto::config::join_url;
use counter_proto::protocol::{
    camera_path, report_path, Camera, CameraUpdate, CsvReport, LoginRequest, TokenResponse,
    PATH_LOGIN,
};
use counter_proto::roi::{parse_polygon, RoiField};
use counter_proto::session::{AuthTokenProvider, FileTokenStore};
use tracing::{info, warn};

use crate::error::SyncError;
use crate::http::{fetch, HttpClient, JsonRequest};

pub const MSG_INVALID_LOGIN: &str = "Invalid login";
pub const MSG_SAVE_FAILED: &str = "Save failed (need admin role).";

/// Exchange credentials for a token and persist it.
pub async fn login(
    client: &dyn HttpClient,
    store: &FileTokenStore,
    username: &str,
    password: &str,
) -> anyhow::Result<()> {
    let body = serde_json::to_value(LoginRequest {
        username: username.to_string(),
        password: password.to_string(),
    })?;
    let token: TokenResponse = fetch(client, JsonRequest::post(PATH_LOGIN, body))
        .await
        .map_err(|e| {
            warn!("[api] login failed: {}", e);
            if e.is_unauthorized() {
                SyncError::FetchFailed(MSG_INVALID_LOGIN.to_string())
            } else {
                SyncError::FetchFailed(format!("Login failed: {}", e))
            }
        })?;

    store
        .store(&token.access_token)
        .with_context(|| format!("Failed to save session to {}", store.path().display()))?;
    info!("[api] logged in as {}", username);
    Ok(())
}

pub async fn fetch_camera(
    client: &dyn HttpClient,
    tokens: &dyn AuthTokenProvider,
    id: i64,
) -> Result<Camera, SyncError> {
    let token = tokens.token().ok_or(SyncError::Unauthenticated)?;
    fetch(client, JsonRequest::get(camera_path(id)).bearer(&token))
        .await
        .map_err(|e| {
            warn!("[api] camera {} load failed: {}", id, e);
            if e.is_unauthorized() {
                SyncError::Unauthenticated
            } else {
                SyncError::FetchFailed(format!("Failed to load camera (id={}).", id))
            }
        })
}

/// ROI text to send when saving `camera`: the replacement if given, else the
/// stored value.  A stored ROI that fails validation is an error rather than
/// a silent clear.
pub fn roi_text_for_update(
    camera: &Camera,
    replacement: Option<&str>,
) -> Result<String, SyncError> {
    if let Some(text) = replacement {
        let mut field = RoiField::default();
        field.apply(text)?;
        return Ok(field.text().to_string());
    }
    match camera.roi_polygon() {
        Ok(poly) => Ok(RoiField::from_value(poly).text().to_string()),
        Err(e) => {
            warn!("[api] camera {} has an invalid stored roi: {}", camera.id, e);
            Err(SyncError::MalformedInput(format!(
                "Stored ROI of camera {} is invalid ({}). Pass a new ROI to replace it.",
                camera.id, e
            )))
        }
    }
}

/// Save the stream URL and ROI.  The ROI text is validated before anything is
/// sent; blank text clears the ROI, blank URL clears the URL.
pub async fn update_camera(
    client: &dyn HttpClient,
    tokens: &dyn AuthTokenProvider,
    id: i64,
    rtsp_url: &str,
    roi_text: &str,
) -> Result<Camera, SyncError> {
    let token = tokens.token().ok_or(SyncError::Unauthenticated)?;
    let roi = parse_polygon(roi_text)?;

    let rtsp_url = Some(rtsp_url.trim())
        .filter(|u| !u.is_empty())
        .map(str::to_string);
    let body = serde_json::to_value(CameraUpdate { rtsp_url, roi })
        .map_err(|e| SyncError::MalformedInput(e.to_string()))?;

    let camera: Camera = fetch(client, JsonRequest::put(camera_path(id), body).bearer(&token))
        .await
        .map_err(|e| {
            warn!("[api] camera {} save failed: {}", id, e);
            SyncError::FetchFailed(MSG_SAVE_FAILED.to_string())
        })?;
    info!("[api] camera {} saved", id);
    Ok(camera)
}

/// Browser-facing export address shown on the dashboard.
pub fn report_url(api_base: &str, from: NaiveDate, to: NaiveDate) -> String {
    join_url(api_base, &report_path(from, to))
}

/// Download the CSV report and write it into `dir` under the server-chosen
/// file name.  Returns the written path.
pub async fn fetch_report(
    client: &dyn HttpClient,
    tokens: &dyn AuthTokenProvider,
    from: NaiveDate,
    to: NaiveDate,
    dir: &Path,
) -> anyhow::Result<PathBuf> {
    let token = tokens.token().ok_or(SyncError::Unauthenticated)?;
    let report: CsvReport = fetch(client, JsonRequest::get(report_path(from, to)).bearer(&token))
        .await
        .map_err(|e| SyncError::from_fetch("Failed to load report", e))?;

    let path = dir.join(safe_file_name(&report.filename, from, to));
    tokio::fs::write(&path, report.csv.as_bytes())
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("[api] report written to {}", path.display());
    Ok(path)
}

/// Keep only the final path component of a server-supplied name.
fn safe_file_name(name: &str, from: NaiveDate, to: NaiveDate) -> String {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "..")
        .map(str::to_string)
        .unwrap_or_else(|| format!("report_{}_{}.csv", from, to))
}
