//! Frame loader: opens the monitor's current stream address and reports
//! whether frames arrive.  Re-opens whenever the monitor re-arms.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::mjpeg::MjpegScanner;
use crate::stream_monitor::{StreamMonitor, StreamSnapshot};

/// HTTP client for the long-lived MJPEG body: bounded connect, no overall
/// request timeout.
pub fn frame_client(connect_timeout: Duration) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("counter-dash/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(connect_timeout)
        .build()?;
    Ok(client)
}

enum Outcome {
    Cancelled,
    Ended,
    Rearmed,
    Closed,
}

/// Runs until the monitor is deactivated.
pub async fn run_frame_loader(monitor: Arc<StreamMonitor>, client: reqwest::Client) {
    let cancel = monitor.cancellation();
    let mut rx = monitor.subscribe();

    loop {
        let (url, generation) = {
            let snap = rx.borrow_and_update();
            (snap.stream_url.clone(), snap.generation)
        };

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Outcome::Cancelled,
            _ = load_stream(&monitor, &client, &url, generation) => Outcome::Ended,
            rearmed = wait_for_rearm(&mut rx, generation) => {
                if rearmed { Outcome::Rearmed } else { Outcome::Closed }
            }
        };

        match outcome {
            Outcome::Cancelled | Outcome::Closed => break,
            Outcome::Rearmed => debug!("[frames] re-armed, dropping {}", url),
            Outcome::Ended => {
                // Stay idle until retry or a recovered health probe re-arms.
                let rearmed = tokio::select! {
                    _ = cancel.cancelled() => false,
                    rearmed = wait_for_rearm(&mut rx, generation) => rearmed,
                };
                if !rearmed {
                    break;
                }
            }
        }
    }
    info!("[frames] loader stopped");
}

async fn wait_for_rearm(rx: &mut watch::Receiver<StreamSnapshot>, generation: u64) -> bool {
    loop {
        if rx.changed().await.is_err() {
            return false;
        }
        if rx.borrow().generation != generation {
            return true;
        }
    }
}

async fn load_stream(
    monitor: &StreamMonitor,
    client: &reqwest::Client,
    url: &str,
    generation: u64,
) {
    let is_current = || monitor.snapshot().generation == generation;

    debug!("[frames] opening {}", url);
    let response = match client.get(url).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!("[frames] connect failed for {}: {}", url, e);
            if is_current() {
                monitor.on_image_error();
            }
            return;
        }
    };
    if !response.status().is_success() {
        warn!("[frames] {} returned {}", url, response.status());
        if is_current() {
            monitor.on_image_error();
        }
        return;
    }

    let mut scanner = MjpegScanner::new();
    let mut body = response.bytes_stream();
    let mut live = false;

    while let Some(next) = body.next().await {
        let chunk = match next {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(
                    "[frames] read error after {} frames: {}",
                    scanner.frames(),
                    e
                );
                break;
            }
        };
        let completed = scanner.push(&chunk);
        if completed == 0 {
            continue;
        }
        if !is_current() {
            return;
        }
        if !live {
            live = true;
            info!("[frames] first frame from {}", url);
            monitor.on_image_load();
        }
        monitor.record_frames(completed);
    }

    info!(
        "[frames] stream ended after {} frames: {}",
        scanner.frames(),
        url
    );
    if is_current() {
        monitor.on_image_error();
    }
}
