//! StreamMonitor: liveness of the edge camera stream.
//!
//! Two signals feed one status slot: a periodic health probe against the
//! stream host, and the frame loader reporting whether frames actually arrive.
//! Either may write last.  `retry()` re-arms the loader with a fresh,
//! cache-busted stream address.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::http::HttpClient;

pub const MSG_HEALTH_FAILED: &str =
    "Camera stream not available. Make sure the edge service is running.";
pub const MSG_IMAGE_FAILED: &str =
    "Failed to load camera stream. The camera might be busy or disconnected.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    Loading,
    Live,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSnapshot {
    pub status: StreamStatus,
    /// Address the frame loader should open.
    pub stream_url: String,
    /// Bumped whenever `stream_url` is re-resolved.
    pub generation: u64,
    /// Frames received since the last re-arm.
    pub frames: u64,
}

impl StreamSnapshot {
    pub fn error(&self) -> Option<SyncError> {
        match &self.status {
            StreamStatus::Error(msg) => Some(SyncError::StreamUnavailable(msg.clone())),
            _ => None,
        }
    }
}

/// Append a cache-defeating `t=` parameter to `url`.
pub fn busted_url(url: &str, token: i64) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{}{}t={}", url, sep, token)
}

pub struct StreamMonitor {
    client: Arc<dyn HttpClient>,
    health_url: String,
    feed_url: String,
    state: watch::Sender<StreamSnapshot>,
    last_bust: AtomicI64,
    cancel: CancellationToken,
}

impl StreamMonitor {
    pub fn new(
        client: Arc<dyn HttpClient>,
        health_url: impl Into<String>,
        feed_url: impl Into<String>,
    ) -> Arc<Self> {
        let feed_url = feed_url.into();
        let (state, _) = watch::channel(StreamSnapshot {
            status: StreamStatus::Loading,
            stream_url: feed_url.clone(),
            generation: 0,
            frames: 0,
        });
        Arc::new(Self {
            client,
            health_url: health_url.into(),
            feed_url,
            state,
            last_bust: AtomicI64::new(0),
            cancel: CancellationToken::new(),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        self.state.borrow().clone()
    }

    /// Fires once the monitor is torn down.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Probe now, then every `period`, until [`deactivate`](Self::deactivate).
    pub fn activate(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        info!("[stream] activated: health={} period={:?}", monitor.health_url, period);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = monitor.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let m = Arc::clone(&monitor);
                        tokio::spawn(async move {
                            let _ = m.check_health().await;
                        });
                    }
                }
            }
            info!("[stream] loop stopped");
        })
    }

    pub fn deactivate(&self) {
        self.cancel.cancel();
        self.state.send_if_modified(|_| false);
        info!("[stream] deactivated");
    }

    /// One health probe.  Failure sets `Error` with a fixed message; success
    /// only matters when currently in `Error`, where it re-arms the loader.
    pub async fn check_health(&self) -> Result<(), SyncError> {
        match self.client.probe(&self.health_url).await {
            Ok(()) => {
                let rearmed = self.update(|s| {
                    if !matches!(s.status, StreamStatus::Error(_)) {
                        return false;
                    }
                    self.rearm(s);
                    true
                });
                if rearmed {
                    info!("[stream] health restored, reloading stream");
                }
                Ok(())
            }
            Err(e) => {
                warn!("[stream] health probe failed: {}", e);
                self.set_status(StreamStatus::Error(MSG_HEALTH_FAILED.to_string()));
                Err(SyncError::StreamUnavailable(MSG_HEALTH_FAILED.to_string()))
            }
        }
    }

    pub fn on_image_load(&self) {
        if self.set_status(StreamStatus::Live) {
            debug!("[stream] live");
        }
    }

    pub fn on_image_error(&self) {
        if self.set_status(StreamStatus::Error(MSG_IMAGE_FAILED.to_string())) {
            warn!("[stream] stream failed to load");
        }
    }

    pub fn record_frames(&self, n: u64) {
        if n > 0 {
            self.update(|s| {
                s.frames += n;
                true
            });
        }
    }

    /// Back to `Loading` with a new stream address.  Returns that address.
    pub fn retry(&self) -> String {
        self.update(|s| {
            self.rearm(s);
            true
        });
        let url = self.state.borrow().stream_url.clone();
        info!("[stream] retry -> {}", url);
        url
    }

    fn rearm(&self, s: &mut StreamSnapshot) {
        let now = chrono::Utc::now().timestamp_millis();
        // Runs under the watch lock, so load/store cannot interleave.
        let token = now.max(self.last_bust.load(Ordering::SeqCst) + 1);
        self.last_bust.store(token, Ordering::SeqCst);

        s.status = StreamStatus::Loading;
        s.stream_url = busted_url(&self.feed_url, token);
        s.generation += 1;
        s.frames = 0;
    }

    fn set_status(&self, status: StreamStatus) -> bool {
        self.update(|s| {
            if s.status == status {
                return false;
            }
            s.status = status;
            true
        })
    }

    /// Mutate the snapshot unless torn down.  `apply` reports whether it
    /// changed anything.
    fn update(&self, apply: impl FnOnce(&mut StreamSnapshot) -> bool) -> bool {
        let cancel = &self.cancel;
        self.state.send_if_modified(|s| !cancel.is_cancelled() && apply(s))
    }
}
