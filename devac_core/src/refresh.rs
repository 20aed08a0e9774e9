//! Refresher (`spec.md` §4.E): turns a stream of seed-change notifications
//! into batched, debounced per-repo refresh calls against the hub.
//!
//! The refresher is generic over a `HubHandle` trait rather than depending
//! on `devac-hub` directly — `devac-hub` depends on `devac-core`, not the
//! other way around, so the hub's concrete `refresh_repo` is injected here
//! as a trait object (`spec.md` §9: dual-mode owner/client as a tagged
//! variant lives in the hub; the refresher just needs *a* handle to call).

use std::collections::HashSet;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// What the refresher needs from whatever owns the hub's state
/// (`devac-hub`'s `Hub`, in the real binary; a test double in unit tests).
pub trait HubHandle: Send + Sync {
    fn refresh_repo(&self, repo_id: &str) -> RefreshOutcome;
}

#[derive(Debug, Clone, Default)]
pub struct RefreshOutcome {
    pub repos_refreshed: u32,
    pub packages_updated: u32,
    pub edges_updated: u32,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RefresherOptions {
    pub debounce_ms: u64,
    pub batch_changes: bool,
    pub max_batch_wait_ms: u64,
}

impl Default for RefresherOptions {
    fn default() -> Self {
        Self { debounce_ms: 500, batch_changes: true, max_batch_wait_ms: 2000 }
    }
}

/// One `hub-refresh` event, emitted after a flush (`spec.md` §4.E).
#[derive(Debug, Clone)]
pub struct HubRefreshEvent {
    pub timestamp: DateTime<Utc>,
    pub refreshed_repos: Vec<String>,
    pub packages_updated: u32,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct StatsInner {
    refresh_count: u64,
    repos_refreshed: u64,
    last_refresh_time: Option<DateTime<Utc>>,
    is_active: bool,
}

#[derive(Debug, Clone)]
pub struct RefresherStats {
    pub refresh_count: u64,
    pub repos_refreshed: u64,
    pub last_refresh_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub pending_repos: Vec<String>,
}

/// Batches seed-change notifications per repo behind a debounce timer and a
/// global max-wait cap, then flushes through a `HubHandle`.
///
/// This implementation is synchronous/poll-driven rather than timer-task
/// based: `notify_change` records an arming deadline per repo, and
/// `tick()` (called by the owning event loop, e.g. on every watcher event
/// and on an idle heartbeat) flushes any repo whose debounce or max-wait
/// deadline has passed. This keeps the refresher's concurrency story
/// simple and avoids a background timer thread per repo, matching the
/// cooperative single-process scheduling model of `spec.md` §5.
pub struct Refresher<H: HubHandle> {
    hub: Arc<H>,
    options: RefresherOptions,
    pending: Mutex<std::collections::HashMap<String, PendingRepo>>,
    stats: Mutex<StatsInner>,
    event_tx: Sender<HubRefreshEvent>,
    active: Mutex<bool>,
}

struct PendingRepo {
    armed_at: std::time::Instant,
    first_seen_at: std::time::Instant,
}

impl<H: HubHandle> Refresher<H> {
    pub fn new(hub: Arc<H>, options: RefresherOptions) -> (Self, Receiver<HubRefreshEvent>) {
        let (event_tx, event_rx) = channel();
        let refresher = Self {
            hub,
            options,
            pending: Mutex::new(std::collections::HashMap::new()),
            stats: Mutex::new(StatsInner::default()),
            event_tx,
            active: Mutex::new(false),
        };
        (refresher, event_rx)
    }

    pub fn start(&self) {
        *self.active.lock().unwrap() = true;
        self.stats.lock().unwrap().is_active = true;
    }

    /// Cancels all pending timers, clears the pending set. Idempotent.
    pub fn stop(&self) {
        *self.active.lock().unwrap() = false;
        self.stats.lock().unwrap().is_active = false;
        self.pending.lock().unwrap().clear();
    }

    /// Adds `repo_id` to the pending set and (re)arms its debounce timer.
    /// When `batch_changes` is disabled, each notification flushes
    /// immediately instead of joining a batch.
    pub fn notify_change(&self, repo_id: &str) {
        if !*self.active.lock().unwrap() {
            return;
        }
        if !self.options.batch_changes {
            self.flush(std::slice::from_ref(&repo_id.to_string()));
            return;
        }
        let now = std::time::Instant::now();
        let mut pending = self.pending.lock().unwrap();
        let entry = pending.entry(repo_id.to_string()).or_insert_with(|| PendingRepo {
            armed_at: now,
            first_seen_at: now,
        });
        entry.armed_at = now;
    }

    /// Flushes repos whose debounce window elapsed, or whose max-batch-wait
    /// cap was hit. Call periodically (e.g. from the watcher's event loop).
    pub fn tick(&self) -> Option<HubRefreshEvent> {
        if !*self.active.lock().unwrap() {
            return None;
        }
        let now = std::time::Instant::now();
        let debounce = Duration::from_millis(self.options.debounce_ms);
        let max_wait = Duration::from_millis(self.options.max_batch_wait_ms);

        let due: Vec<String> = {
            let pending = self.pending.lock().unwrap();
            pending
                .iter()
                .filter(|(_, p)| {
                    now.duration_since(p.armed_at) >= debounce
                        || now.duration_since(p.first_seen_at) >= max_wait
                })
                .map(|(repo, _)| repo.clone())
                .collect()
        };
        if due.is_empty() {
            return None;
        }
        Some(self.flush(&due))
    }

    /// Immediate, un-debounced flush over the given IDs
    /// (`spec.md` §4.E, `refresh_repos`).
    pub fn refresh_repos(&self, repo_ids: &[String]) -> HubRefreshEvent {
        self.flush(repo_ids)
    }

    fn flush(&self, repo_ids: &[String]) -> HubRefreshEvent {
        {
            let mut pending = self.pending.lock().unwrap();
            for repo in repo_ids {
                pending.remove(repo);
            }
        }

        let mut refreshed_repos = Vec::new();
        let mut packages_updated = 0u32;
        let mut errors = Vec::new();

        for repo_id in repo_ids {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                self.hub.refresh_repo(repo_id)
            }))
            .unwrap_or_else(|panic_payload| {
                let message = panic_payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "refresh_repo panicked".to_string());
                RefreshOutcome { errors: vec![message], ..Default::default() }
            });

            packages_updated += outcome.packages_updated;
            errors.extend(outcome.errors);
            if outcome.repos_refreshed > 0 {
                refreshed_repos.push(repo_id.clone());
            }
        }

        {
            let mut stats = self.stats.lock().unwrap();
            stats.refresh_count += 1;
            stats.repos_refreshed += refreshed_repos.len() as u64;
            stats.last_refresh_time = Some(Utc::now());
        }

        let event = HubRefreshEvent {
            timestamp: Utc::now(),
            refreshed_repos,
            packages_updated,
            errors,
        };
        let _ = self.event_tx.send(event.clone());
        event
    }

    pub fn stats(&self) -> RefresherStats {
        let inner = self.stats.lock().unwrap().clone();
        let pending_repos: Vec<String> = self.pending.lock().unwrap().keys().cloned().collect();
        RefresherStats {
            refresh_count: inner.refresh_count,
            repos_refreshed: inner.repos_refreshed,
            last_refresh_time: inner.last_refresh_time,
            is_active: inner.is_active,
            pending_repos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingHub {
        calls: AtomicU32,
        fail_repo: Option<String>,
    }

    impl HubHandle for CountingHub {
        fn refresh_repo(&self, repo_id: &str) -> RefreshOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_repo.as_deref() == Some(repo_id) {
                return RefreshOutcome { errors: vec!["boom".to_string()], ..Default::default() };
            }
            RefreshOutcome { repos_refreshed: 1, packages_updated: 3, edges_updated: 10, errors: vec![] }
        }
    }

    #[test]
    fn refresh_repos_is_immediate_and_undebounced() {
        let hub = Arc::new(CountingHub { calls: AtomicU32::new(0), fail_repo: None });
        let (refresher, _rx) = Refresher::new(Arc::clone(&hub), RefresherOptions::default());
        refresher.start();
        let event = refresher.refresh_repos(&["repo-a".to_string()]);
        assert_eq!(event.refreshed_repos, vec!["repo-a".to_string()]);
        assert_eq!(event.packages_updated, 3);
        assert_eq!(hub.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn errors_from_one_repo_do_not_abort_the_batch() {
        let hub = Arc::new(CountingHub { calls: AtomicU32::new(0), fail_repo: Some("bad-repo".to_string()) });
        let (refresher, _rx) = Refresher::new(hub, RefresherOptions::default());
        refresher.start();
        let event = refresher.refresh_repos(&["bad-repo".to_string(), "good-repo".to_string()]);
        assert_eq!(event.errors, vec!["boom".to_string()]);
        assert_eq!(event.refreshed_repos, vec!["good-repo".to_string()]);
    }

    #[test]
    fn a_repo_is_only_reported_refreshed_when_nonzero_changes() {
        struct ZeroHub;
        impl HubHandle for ZeroHub {
            fn refresh_repo(&self, _repo_id: &str) -> RefreshOutcome {
                RefreshOutcome::default()
            }
        }
        let (refresher, _rx) = Refresher::new(Arc::new(ZeroHub), RefresherOptions::default());
        refresher.start();
        let event = refresher.refresh_repos(&["repo-a".to_string()]);
        assert!(event.refreshed_repos.is_empty());
    }

    #[test]
    fn stop_clears_pending_set_and_is_idempotent() {
        let hub = Arc::new(CountingHub { calls: AtomicU32::new(0), fail_repo: None });
        let (refresher, _rx) = Refresher::new(hub, RefresherOptions::default());
        refresher.start();
        refresher.notify_change("repo-a");
        assert_eq!(refresher.stats().pending_repos.len(), 1);
        refresher.stop();
        refresher.stop();
        assert!(refresher.stats().pending_repos.is_empty());
        assert!(!refresher.stats().is_active);
    }

    #[test]
    fn tick_is_a_noop_before_debounce_elapses() {
        let hub = Arc::new(CountingHub { calls: AtomicU32::new(0), fail_repo: None });
        let (refresher, _rx) = Refresher::new(
            hub,
            RefresherOptions { debounce_ms: 10_000, batch_changes: true, max_batch_wait_ms: 20_000 },
        );
        refresher.start();
        refresher.notify_change("repo-a");
        assert!(refresher.tick().is_none());
    }

    #[test]
    fn tick_flushes_once_debounce_elapses() {
        let hub = Arc::new(CountingHub { calls: AtomicU32::new(0), fail_repo: None });
        let (refresher, _rx) = Refresher::new(
            hub,
            RefresherOptions { debounce_ms: 1, batch_changes: true, max_batch_wait_ms: 5000 },
        );
        refresher.start();
        refresher.notify_change("repo-a");
        std::thread::sleep(Duration::from_millis(5));
        let event = refresher.tick().expect("debounce elapsed, should flush");
        assert_eq!(event.refreshed_repos, vec!["repo-a".to_string()]);
    }

    #[test]
    fn disabling_batch_changes_flushes_each_notification_immediately() {
        let hub = Arc::new(CountingHub { calls: AtomicU32::new(0), fail_repo: None });
        let (refresher, rx) = Refresher::new(
            hub,
            RefresherOptions { debounce_ms: 10_000, batch_changes: false, max_batch_wait_ms: 20_000 },
        );
        refresher.start();
        refresher.notify_change("repo-a");
        let event = rx.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(event.refreshed_repos, vec!["repo-a".to_string()]);
        assert!(refresher.stats().pending_repos.is_empty());
    }
}
