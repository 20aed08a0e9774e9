//! Watcher (`spec.md` §4.D): a workspace-level subscription to source and
//! seed changes, feeding a typed event stream that the refresher (§4.E)
//! consumes.
//!
//! Built on the same `notify`/`notify-debouncer-full` pairing the teacher
//! used for its live re-scan mode, but reshaped per `spec.md` §9 ("typed
//! channels" instead of an untyped emitter) and carrying the state machine,
//! filters, and statistics the spec names explicitly.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, FileIdMap, new_debouncer};

use devac_common::{DevacError, DevacResult};

/// Source extensions the three core language backends claim, plus the
/// filter the watcher applies to decide whether a changed file is a "code
/// file" at all (`spec.md` §4.D, "Filters").
pub const CODE_FILE_EXTENSIONS: &[&str] =
    &["ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "cs"];

const SEED_PREFIX: &str = ".devac/seed/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Add,
    Change,
    Unlink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryAction {
    Added,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Started,
    Stopped,
}

/// One entry in the watcher's event stream (`spec.md` §4.D, "Events emitted").
#[derive(Debug, Clone)]
pub enum WatcherEvent {
    WatcherState { state: RunState },
    FileChange { repo_path: PathBuf, file_path: PathBuf, change_type: ChangeType },
    RepoDiscovery { repo_path: PathBuf, action: DiscoveryAction },
}

#[derive(Debug, Clone)]
pub struct WatcherOptions {
    pub debounce_ms: u64,
    pub watch_seeds: bool,
    pub ignore_patterns: Vec<String>,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self { debounce_ms: 300, watch_seeds: true, ignore_patterns: Vec::new() }
    }
}

/// `Idle -> Starting -> Running -> Stopping -> Idle` (`spec.md` §4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Discovers the repos that currently live directly under a workspace.
/// This is the boundary to the discovery module `spec.md` §1 calls an
/// external collaborator: the watcher only ever asks "what repos exist
/// right now", it never decides what counts as a repo on its own.
pub trait RepoDiscovery: Send + Sync {
    fn discover(&self, workspace_path: &Path) -> Vec<PathBuf>;
}

/// Direct-child-directory discovery, good enough for a workspace laid out
/// as `<workspace>/<repo-a>/`, `<workspace>/<repo-b>/`, ... Hidden
/// directories (dotfiles) are excluded.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRepoDiscovery;

impl RepoDiscovery for DefaultRepoDiscovery {
    fn discover(&self, workspace_path: &Path) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(workspace_path) else {
            return Vec::new();
        };
        entries
            .filter_map(Result::ok)
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.path())
            .filter(|p| {
                !p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with('.'))
                    .unwrap_or(true)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
struct StatsInner {
    events_processed: u64,
    last_event_time: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    is_watching: bool,
}

/// Fresh snapshot copy of the watcher's statistics (`spec.md` §4.D,
/// "Statistics" — "Read returns a fresh snapshot copy").
#[derive(Debug, Clone)]
pub struct WatcherStats {
    pub events_processed: u64,
    pub repos_watched: usize,
    pub last_event_time: Option<DateTime<Utc>>,
    pub is_watching: bool,
    pub started_at: Option<DateTime<Utc>>,
}

/// Per-workspace file watcher. `start()`/`stop()` are idempotent; events
/// stream out through the `Receiver<WatcherEvent>` returned by `new`.
pub struct Watcher {
    workspace_path: PathBuf,
    options: WatcherOptions,
    discovery: Box<dyn RepoDiscovery>,
    phase: Arc<Mutex<Phase>>,
    stats: Arc<Mutex<StatsInner>>,
    known_repos: Arc<Mutex<HashSet<PathBuf>>>,
    event_tx: Sender<WatcherEvent>,
    debouncer: Option<Debouncer<RecommendedWatcher, FileIdMap>>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl Watcher {
    pub fn new(
        workspace_path: impl Into<PathBuf>,
        options: WatcherOptions,
    ) -> (Self, Receiver<WatcherEvent>) {
        Self::with_discovery(workspace_path, options, Box::new(DefaultRepoDiscovery))
    }

    pub fn with_discovery(
        workspace_path: impl Into<PathBuf>,
        options: WatcherOptions,
        discovery: Box<dyn RepoDiscovery>,
    ) -> (Self, Receiver<WatcherEvent>) {
        let (event_tx, event_rx) = channel();
        let watcher = Watcher {
            workspace_path: workspace_path.into(),
            options,
            discovery,
            phase: Arc::new(Mutex::new(Phase::Idle)),
            stats: Arc::new(Mutex::new(StatsInner::default())),
            known_repos: Arc::new(Mutex::new(HashSet::new())),
            event_tx,
            debouncer: None,
            worker: None,
        };
        (watcher, event_rx)
    }

    /// Idempotent: starting an already-running watcher is a no-op.
    pub fn start(&mut self) -> DevacResult<()> {
        {
            let mut phase = self.phase.lock().unwrap();
            if *phase == Phase::Running || *phase == Phase::Starting {
                return Ok(());
            }
            *phase = Phase::Starting;
        }

        let repos = self.discovery.discover(&self.workspace_path);
        {
            let mut known = self.known_repos.lock().unwrap();
            known.clear();
            known.extend(repos.iter().cloned());
        }

        let (raw_tx, raw_rx) = channel();
        let mut debouncer: Debouncer<RecommendedWatcher, FileIdMap> = new_debouncer(
            Duration::from_millis(self.options.debounce_ms.max(1)),
            None,
            move |result: DebounceEventResult| {
                let _ = raw_tx.send(result);
            },
        )
        .map_err(|e| DevacError::IoFailed {
            path: self.workspace_path.display().to_string(),
            source: std::io::Error::other(e),
        })?;

        debouncer
            .watch(&self.workspace_path, RecursiveMode::Recursive)
            .map_err(|e| DevacError::IoFailed {
                path: self.workspace_path.display().to_string(),
                source: std::io::Error::other(e),
            })?;

        {
            let mut stats = self.stats.lock().unwrap();
            stats.started_at = Some(now_utc());
            stats.is_watching = true;
        }

        let event_tx = self.event_tx.clone();
        let stats = Arc::clone(&self.stats);
        let phase = Arc::clone(&self.phase);
        let known_repos = Arc::clone(&self.known_repos);
        let watch_seeds = self.options.watch_seeds;
        let workspace_path = self.workspace_path.clone();

        let _ = event_tx.send(WatcherEvent::WatcherState { state: RunState::Started });

        let worker = std::thread::spawn(move || {
            loop {
                match raw_rx.recv() {
                    Ok(Ok(events)) => {
                        let current_phase = *phase.lock().unwrap();
                        if current_phase != Phase::Running && current_phase != Phase::Starting {
                            // Stop() was called: drop whatever arrived after.
                            break;
                        }
                        for event in events {
                            for path in &event.paths {
                                if let Some(change) = classify_change(&event.kind) {
                                    emit_file_change(
                                        &workspace_path,
                                        path,
                                        change,
                                        watch_seeds,
                                        &known_repos,
                                        &event_tx,
                                        &stats,
                                    );
                                }
                            }
                        }
                    }
                    Ok(Err(_)) => continue,
                    Err(_) => break,
                }
            }
        });

        self.debouncer = Some(debouncer);
        self.worker = Some(worker);
        *self.phase.lock().unwrap() = Phase::Running;
        Ok(())
    }

    /// Idempotent. Discards all pending debounced events without emitting
    /// them (`spec.md` §4.D, "Debounce rule").
    pub fn stop(&mut self) {
        let mut phase = self.phase.lock().unwrap();
        if *phase == Phase::Idle || *phase == Phase::Stopping {
            return;
        }
        *phase = Phase::Stopping;
        drop(phase);

        // Dropping the debouncer tears down the underlying `notify`
        // watcher and its internal event queue immediately, which is what
        // gives us "no further events fire" — nothing left to flush.
        self.debouncer = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }

        self.stats.lock().unwrap().is_watching = false;
        let _ = self.event_tx.send(WatcherEvent::WatcherState { state: RunState::Stopped });
        *self.phase.lock().unwrap() = Phase::Idle;
    }

    pub fn is_watching(&self) -> bool {
        *self.phase.lock().unwrap() == Phase::Running
    }

    pub fn stats(&self) -> WatcherStats {
        let inner = self.stats.lock().unwrap().clone();
        let repos_watched = self.known_repos.lock().unwrap().len();
        WatcherStats {
            events_processed: inner.events_processed,
            repos_watched,
            last_event_time: inner.last_event_time,
            is_watching: inner.is_watching,
            started_at: inner.started_at,
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

fn classify_change(kind: &notify::EventKind) -> Option<ChangeType> {
    use notify::EventKind::*;
    match kind {
        Create(_) => Some(ChangeType::Add),
        Modify(_) => Some(ChangeType::Change),
        Remove(_) => Some(ChangeType::Unlink),
        _ => None,
    }
}

fn is_code_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| CODE_FILE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

fn is_seed_file(path: &Path) -> bool {
    path.to_string_lossy().contains(SEED_PREFIX)
}

fn owning_repo(known_repos: &HashSet<PathBuf>, path: &Path) -> Option<PathBuf> {
    known_repos.iter().find(|repo| path.starts_with(repo)).cloned()
}

#[allow(clippy::too_many_arguments)]
fn emit_file_change(
    _workspace_path: &Path,
    path: &Path,
    change: ChangeType,
    watch_seeds: bool,
    known_repos: &Arc<Mutex<HashSet<PathBuf>>>,
    event_tx: &Sender<WatcherEvent>,
    stats: &Arc<Mutex<StatsInner>>,
) {
    let repos = known_repos.lock().unwrap();
    let Some(repo_path) = owning_repo(&repos, path) else {
        return; // Outside any known repo: silently dropped per spec.
    };
    drop(repos);

    let is_seed = is_seed_file(path);
    if !is_code_file(path) && !(watch_seeds && is_seed) {
        return;
    }

    let mut s = stats.lock().unwrap();
    s.events_processed += 1;
    s.last_event_time = Some(now_utc());
    drop(s);

    let _ = event_tx.send(WatcherEvent::FileChange {
        repo_path,
        file_path: path.to_path_buf(),
        change_type: change,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_default_to_spec_values() {
        let opts = WatcherOptions::default();
        assert_eq!(opts.debounce_ms, 300);
        assert!(opts.watch_seeds);
    }

    #[test]
    fn is_code_file_matches_known_extensions() {
        assert!(is_code_file(Path::new("src/app.ts")));
        assert!(is_code_file(Path::new("src/app.py")));
        assert!(!is_code_file(Path::new("README.md")));
    }

    #[test]
    fn is_seed_file_detects_devac_seed_prefix() {
        assert!(is_seed_file(Path::new("/ws/repo/pkg/.devac/seed/base/nodes.parquet")));
        assert!(!is_seed_file(Path::new("/ws/repo/pkg/src/app.ts")));
    }

    #[test]
    fn owning_repo_matches_longest_known_prefix() {
        let mut repos = HashSet::new();
        repos.insert(PathBuf::from("/ws/repo1"));
        repos.insert(PathBuf::from("/ws/repo2"));
        assert_eq!(
            owning_repo(&repos, Path::new("/ws/repo1/src/x.ts")),
            Some(PathBuf::from("/ws/repo1"))
        );
        assert_eq!(owning_repo(&repos, Path::new("/ws/elsewhere/x.ts")), None);
    }

    #[test]
    fn start_stop_is_idempotent_and_transitions_state() {
        let dir = tempfile::TempDir::new().unwrap();
        let (mut watcher, rx) = Watcher::new(dir.path(), WatcherOptions::default());
        watcher.start().unwrap();
        watcher.start().unwrap(); // idempotent
        assert!(watcher.is_watching());
        assert!(matches!(rx.recv_timeout(Duration::from_secs(1)), Ok(WatcherEvent::WatcherState { state: RunState::Started })));

        watcher.stop();
        watcher.stop(); // idempotent
        assert!(!watcher.is_watching());
    }

    #[test]
    fn default_repo_discovery_lists_direct_children_only() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("repo-a")).unwrap();
        std::fs::create_dir(dir.path().join("repo-b")).unwrap();
        std::fs::create_dir(dir.path().join(".hidden")).unwrap();
        std::fs::create_dir_all(dir.path().join("repo-a/nested")).unwrap();

        let discovery = DefaultRepoDiscovery;
        let mut found = discovery.discover(dir.path());
        found.sort();
        assert_eq!(found, vec![dir.path().join("repo-a"), dir.path().join("repo-b")]);
    }

    #[test]
    fn stats_snapshot_starts_idle() {
        let dir = tempfile::TempDir::new().unwrap();
        let (watcher, _rx) = Watcher::new(dir.path(), WatcherOptions::default());
        let stats = watcher.stats();
        assert_eq!(stats.events_processed, 0);
        assert!(!stats.is_watching);
    }
}
