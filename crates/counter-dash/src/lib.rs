//! Client-side synchronization core for the visitor-counter dashboard.
//!
//! Two independent timed loops: [`stats_poller::StatsPoller`] keeps identity
//! and daily aggregates fresh, [`stream_monitor::StreamMonitor`] tracks the
//! live camera stream.  Both expose read-only snapshots through
//! `tokio::sync::watch` and own their state exclusively.

pub mod api;
pub mod error;
pub mod frames;
pub mod http;
pub mod mjpeg;
pub mod stats_poller;
pub mod stream_monitor;
