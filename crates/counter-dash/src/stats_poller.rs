//! StatsPoller: keeps identity and daily aggregates fresh.
//!
//! One refresh cycle reads the token, fetches `/api/me`, then
//! `/api/stats/daily?day=…`, and commits each result into its own slot of a
//! [`StatsSnapshot`] held in a `watch` channel.  The poller is the only writer;
//! the view subscribes and reads clones.
//!
//! Cycles are started on a fixed period and may overlap.  By default the
//! response that *completes* last wins, even if it was issued first.  With
//! `discard_stale` set, each slot remembers the cycle number of its last commit
//! and refuses older ones.
//!
//! After [`StatsPoller::deactivate`] no slot is written again, including by
//! cycles that were already in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate};
use counter_proto::protocol::{daily_stats_path, DailyStatRow, DailyTotals, Identity, PATH_ME};
use counter_proto::session::AuthTokenProvider;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::http::{fetch, HttpClient, JsonRequest};

/// What the view reads.  Every commit replaces whole slots.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    /// Day the rows belong to.
    pub day: NaiveDate,
    pub identity: Option<Identity>,
    pub rows: Vec<DailyStatRow>,
    pub error: Option<SyncError>,
    pub last_success: Option<DateTime<Local>>,
    /// Cycle number of the last committed row set (0 = none yet).
    pub rows_cycle: u64,
    identity_cycle: u64,
    error_cycle: u64,
}

impl StatsSnapshot {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            day,
            identity: None,
            rows: Vec::new(),
            error: None,
            last_success: None,
            rows_cycle: 0,
            identity_cycle: 0,
            error_cycle: 0,
        }
    }

    /// Totals over the current row collection only.
    pub fn totals(&self) -> DailyTotals {
        DailyTotals::from_rows(&self.rows)
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Identity,
    Rows,
    Error,
}

pub struct StatsPoller {
    tokens: Arc<dyn AuthTokenProvider>,
    client: Arc<dyn HttpClient>,
    day: NaiveDate,
    discard_stale: bool,
    state: watch::Sender<StatsSnapshot>,
    next_cycle: AtomicU64,
    cancel: CancellationToken,
}

impl StatsPoller {
    pub fn new(
        tokens: Arc<dyn AuthTokenProvider>,
        client: Arc<dyn HttpClient>,
        day: NaiveDate,
        discard_stale: bool,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(StatsSnapshot::new(day));
        Arc::new(Self {
            tokens,
            client,
            day,
            discard_stale,
            state,
            next_cycle: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<StatsSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.state.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Start the periodic loop: one cycle now, then one every `period`.
    /// Each cycle runs as its own task so a slow response never delays the
    /// next tick.
    pub fn activate(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let poller = Arc::clone(self);
        info!("[stats] activated: day={} period={:?}", poller.day, period);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = poller.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let p = Arc::clone(&poller);
                        tokio::spawn(async move {
                            let _ = p.refresh(p.day).await;
                        });
                    }
                }
            }
            info!("[stats] loop stopped");
        })
    }

    /// Stop scheduling and fence off in-flight cycles.  Once this returns, no
    /// slot changes again.
    pub fn deactivate(&self) {
        self.cancel.cancel();
        // Commits take the watch lock and re-check cancellation under it, so
        // taking the lock once here waits out any commit already in progress.
        self.state.send_if_modified(|_| false);
        info!("[stats] deactivated");
    }

    /// Run one refresh cycle for `day`.
    ///
    /// Identity is committed as soon as it arrives, independently of the stats
    /// call that follows.  A failure is stored in the error slot and returned.
    pub async fn refresh(&self, day: NaiveDate) -> Result<(), SyncError> {
        let cycle = self.next_cycle.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(token) = self.tokens.token() else {
            warn!("[stats] cycle {}: no token, skipping fetch", cycle);
            return self.fail(cycle, SyncError::Unauthenticated);
        };

        let identity: Identity =
            match fetch(&*self.client, JsonRequest::get(PATH_ME).bearer(&token)).await {
                Ok(me) => me,
                Err(e) => return self.fail(cycle, SyncError::from_fetch("Auth failed", e)),
            };
        self.commit(cycle, Slot::Identity, |s| s.identity = Some(identity));

        let req = JsonRequest::get(daily_stats_path(day)).bearer(&token);
        let rows: Vec<DailyStatRow> = match fetch(&*self.client, req).await {
            Ok(rows) => rows,
            Err(e) => {
                return self.fail(cycle, SyncError::from_fetch("Failed to load stats", e))
            }
        };

        let count = rows.len();
        if self.commit(cycle, Slot::Rows, |s| {
            s.day = day;
            s.rows = rows;
            s.error = None;
            s.last_success = Some(Local::now());
        }) {
            debug!("[stats] cycle {}: committed {} rows for {}", cycle, count, day);
        }
        Ok(())
    }

    fn fail(&self, cycle: u64, err: SyncError) -> Result<(), SyncError> {
        warn!("[stats] cycle {} failed: {}", cycle, err);
        let stored = err.clone();
        self.commit(cycle, Slot::Error, |s| s.error = Some(stored));
        Err(err)
    }

    /// Apply `apply` to the snapshot unless the poller is torn down or, with
    /// `discard_stale`, a newer cycle already owns the slot.
    fn commit(&self, cycle: u64, slot: Slot, apply: impl FnOnce(&mut StatsSnapshot)) -> bool {
        let cancel = &self.cancel;
        let discard_stale = self.discard_stale;
        let committed = self.state.send_if_modified(|snap| {
            if cancel.is_cancelled() {
                return false;
            }
            let newest = match slot {
                Slot::Identity => snap.identity_cycle,
                Slot::Rows => snap.rows_cycle.max(snap.error_cycle),
                // An old failure must not hide a newer success.
                Slot::Error => snap.rows_cycle.max(snap.error_cycle),
            };
            if discard_stale && cycle < newest {
                return false;
            }
            apply(snap);
            match slot {
                Slot::Identity => snap.identity_cycle = cycle,
                Slot::Rows => snap.rows_cycle = cycle,
                Slot::Error => snap.error_cycle = cycle,
            }
            true
        });
        if !committed {
            debug!("[stats] cycle {}: {:?} commit dropped", cycle, slot);
        }
        committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::http::Method;
    use async_trait::async_trait;
    use counter_proto::protocol::Role;
    use counter_proto::session::StaticToken;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    struct Scripted {
        gate: Option<oneshot::Receiver<()>>,
        reply: Result<Value, FetchError>,
    }

    /// Backend double: `/api/me` answers from `me`, daily stats pop from a
    /// queue (falling back to an empty list) and may wait on a gate.
    struct MockApi {
        me: Mutex<Result<Value, FetchError>>,
        daily: Mutex<VecDeque<Scripted>>,
        me_calls: AtomicUsize,
        daily_calls: AtomicUsize,
        seen_tokens: Mutex<Vec<Option<String>>>,
    }

    impl MockApi {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                me: Mutex::new(Ok(json!({"id": 1, "username": "admin", "role": "admin"}))),
                daily: Mutex::new(VecDeque::new()),
                me_calls: AtomicUsize::new(0),
                daily_calls: AtomicUsize::new(0),
                seen_tokens: Mutex::new(Vec::new()),
            })
        }

        fn push_daily(&self, gate: Option<oneshot::Receiver<()>>, reply: Result<Value, FetchError>) {
            self.daily.lock().unwrap().push_back(Scripted { gate, reply });
        }

        fn total_calls(&self) -> usize {
            self.me_calls.load(Ordering::SeqCst) + self.daily_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpClient for MockApi {
        async fn request_json(&self, req: JsonRequest) -> Result<Value, FetchError> {
            assert_eq!(req.method, Method::Get);
            self.seen_tokens.lock().unwrap().push(req.bearer.clone());
            if req.path == PATH_ME {
                self.me_calls.fetch_add(1, Ordering::SeqCst);
                return self.me.lock().unwrap().clone();
            }
            assert!(req.path.starts_with("/api/stats/daily?day="), "{}", req.path);
            self.daily_calls.fetch_add(1, Ordering::SeqCst);
            let scripted = self.daily.lock().unwrap().pop_front();
            match scripted {
                Some(Scripted { gate, reply }) => {
                    if let Some(gate) = gate {
                        let _ = gate.await;
                    }
                    reply
                }
                None => Ok(json!([])),
            }
        }

        async fn probe(&self, _url: &str) -> Result<(), FetchError> {
            Ok(())
        }
    }

    struct SwitchToken(Mutex<Option<String>>);

    impl AuthTokenProvider for SwitchToken {
        fn token(&self) -> Option<String> {
            self.0.lock().unwrap().clone()
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn rows_json(values: &[(i64, u64, u64, u64)]) -> Value {
        Value::Array(
            values
                .iter()
                .map(|(cam, i, o, u)| {
                    json!({"day": "2024-05-01", "camera_id": cam, "total_in": i,
                           "total_out": o, "unique_estimate": u})
                })
                .collect(),
        )
    }

    fn poller(api: &Arc<MockApi>, discard_stale: bool) -> Arc<StatsPoller> {
        StatsPoller::new(
            Arc::new(StaticToken(Some("tok".to_string()))),
            api.clone(),
            day(),
            discard_stale,
        )
    }

    async fn wait_for_daily_calls(api: &MockApi, n: usize) {
        while api.daily_calls.load(Ordering::SeqCst) < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_no_token_makes_no_call() {
        let api = MockApi::new();
        let poller = StatsPoller::new(Arc::new(StaticToken(None)), api.clone(), day(), false);

        assert_eq!(poller.refresh(day()).await, Err(SyncError::Unauthenticated));
        assert_eq!(api.total_calls(), 0);
        assert_eq!(poller.snapshot().error, Some(SyncError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_success_replaces_rows_without_accumulating() {
        let api = MockApi::new();
        let poller = poller(&api, false);

        api.push_daily(None, Ok(rows_json(&[(1, 10, 4, 3), (2, 5, 6, 2)])));
        poller.refresh(day()).await.unwrap();
        let snap = poller.snapshot();
        assert_eq!(snap.totals(), DailyTotals { total_in: 15, total_out: 10, unique: 5 });
        assert_eq!(snap.identity.as_ref().map(|me| &me.role), Some(&Role::Admin));
        assert!(snap.last_success.is_some());

        api.push_daily(None, Ok(rows_json(&[(1, 11, 4, 3)])));
        poller.refresh(day()).await.unwrap();
        let snap = poller.snapshot();
        assert_eq!(snap.rows.len(), 1);
        assert_eq!(snap.totals(), DailyTotals { total_in: 11, total_out: 4, unique: 3 });

        let tokens = api.seen_tokens.lock().unwrap();
        assert!(tokens.iter().all(|t| t.as_deref() == Some("tok")));
    }

    #[tokio::test]
    async fn test_stats_failure_keeps_identity_and_previous_rows() {
        let api = MockApi::new();
        let poller = poller(&api, false);

        api.push_daily(None, Ok(rows_json(&[(1, 3, 2, 1)])));
        poller.refresh(day()).await.unwrap();

        *api.me.lock().unwrap() = Ok(json!({"id": 2, "username": "ops", "role": "operator"}));
        api.push_daily(None, Err(FetchError::Status(500)));
        let err = poller.refresh(day()).await.unwrap_err();
        assert!(matches!(err, SyncError::FetchFailed(_)));

        let snap = poller.snapshot();
        assert_eq!(snap.identity.as_ref().unwrap().username, "ops");
        assert_eq!(snap.totals().total_in, 3);
        assert_eq!(snap.error, Some(err));

        // Next good cycle clears the error.
        poller.refresh(day()).await.unwrap();
        assert_eq!(poller.snapshot().error, None);
    }

    #[tokio::test]
    async fn test_identity_rejection_is_unauthenticated_and_skips_stats() {
        let api = MockApi::new();
        *api.me.lock().unwrap() = Err(FetchError::Status(401));
        let poller = poller(&api, false);

        assert_eq!(poller.refresh(day()).await, Err(SyncError::Unauthenticated));
        assert_eq!(api.daily_calls.load(Ordering::SeqCst), 0);
        assert_eq!(poller.snapshot().identity, None);
    }

    #[tokio::test]
    async fn test_revoked_token_is_seen_next_cycle() {
        let api = MockApi::new();
        let tokens = Arc::new(SwitchToken(Mutex::new(Some("tok".to_string()))));
        let poller = StatsPoller::new(tokens.clone(), api.clone(), day(), false);

        poller.refresh(day()).await.unwrap();
        let calls = api.total_calls();

        *tokens.0.lock().unwrap() = None;
        assert_eq!(poller.refresh(day()).await, Err(SyncError::Unauthenticated));
        assert_eq!(api.total_calls(), calls);
    }

    #[tokio::test]
    async fn test_overlap_last_completion_wins() {
        let api = MockApi::new();
        let poller = poller(&api, false);

        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, second_rx) = oneshot::channel();
        api.push_daily(Some(first_rx), Ok(rows_json(&[(1, 100, 0, 0)])));
        api.push_daily(Some(second_rx), Ok(rows_json(&[(1, 200, 0, 0)])));

        let p = poller.clone();
        let first = tokio::spawn(async move { p.refresh(day()).await });
        wait_for_daily_calls(&api, 1).await;
        let p = poller.clone();
        let second = tokio::spawn(async move { p.refresh(day()).await });
        wait_for_daily_calls(&api, 2).await;

        second_tx.send(()).unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(poller.snapshot().totals().total_in, 200);

        first_tx.send(()).unwrap();
        first.await.unwrap().unwrap();
        assert_eq!(poller.snapshot().totals().total_in, 100);
    }

    #[tokio::test]
    async fn test_overlap_with_stale_guard_keeps_newer_cycle() {
        let api = MockApi::new();
        let poller = poller(&api, true);

        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, second_rx) = oneshot::channel();
        api.push_daily(Some(first_rx), Ok(rows_json(&[(1, 100, 0, 0)])));
        api.push_daily(Some(second_rx), Ok(rows_json(&[(1, 200, 0, 0)])));

        let p = poller.clone();
        let first = tokio::spawn(async move { p.refresh(day()).await });
        wait_for_daily_calls(&api, 1).await;
        let p = poller.clone();
        let second = tokio::spawn(async move { p.refresh(day()).await });
        wait_for_daily_calls(&api, 2).await;

        second_tx.send(()).unwrap();
        second.await.unwrap().unwrap();
        first_tx.send(()).unwrap();
        first.await.unwrap().unwrap();

        let snap = poller.snapshot();
        assert_eq!(snap.totals().total_in, 200);
        assert_eq!(snap.rows_cycle, 2);
    }

    #[tokio::test]
    async fn test_stale_failure_does_not_hide_newer_success() {
        let api = MockApi::new();
        let poller = poller(&api, true);

        let (first_tx, first_rx) = oneshot::channel();
        api.push_daily(Some(first_rx), Err(FetchError::Transport("reset".into())));
        api.push_daily(None, Ok(rows_json(&[(1, 1, 1, 1)])));

        let p = poller.clone();
        let first = tokio::spawn(async move { p.refresh(day()).await });
        wait_for_daily_calls(&api, 1).await;
        poller.refresh(day()).await.unwrap();

        first_tx.send(()).unwrap();
        assert!(first.await.unwrap().is_err());
        assert_eq!(poller.snapshot().error, None);
    }

    #[tokio::test]
    async fn test_teardown_blocks_inflight_commit() {
        let api = MockApi::new();
        let poller = poller(&api, false);

        let (tx, rx) = oneshot::channel();
        api.push_daily(Some(rx), Ok(rows_json(&[(1, 9, 9, 9)])));

        let p = poller.clone();
        let inflight = tokio::spawn(async move { p.refresh(day()).await });
        wait_for_daily_calls(&api, 1).await;

        poller.deactivate();
        let before = poller.snapshot();
        let mut rx_state = poller.subscribe();
        rx_state.borrow_and_update();

        tx.send(()).unwrap();
        assert!(inflight.await.unwrap().is_ok());
        assert_eq!(poller.snapshot(), before);
        assert!(!rx_state.has_changed().unwrap());
        assert!(before.rows.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_immediate_then_periodic_then_stops() {
        let api = MockApi::new();
        let poller = poller(&api, false);

        let handle = poller.activate(Duration::from_secs(5));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(api.me_calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(api.me_calls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(api.me_calls.load(Ordering::SeqCst), 4);

        poller.deactivate();
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.me_calls.load(Ordering::SeqCst), 4);
        assert!(!poller.is_active());
    }
}
