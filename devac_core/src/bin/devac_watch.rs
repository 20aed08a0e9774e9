//! `devac-watch` — standalone watch-and-refresh CLI (`SPEC_FULL.md` §0).
//!
//! Watches a workspace directory and re-ingests a repo's root package
//! whenever the watcher reports a debounced batch of changes for it. No
//! hub process is involved: this wires the watcher straight to a local
//! `HubHandle` that calls `ingest::ingest_package` in-process, for
//! developing or debugging a single repo without standing up `devac-hubd`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use devac_core::ingest::ingest_package;
use devac_core::refresh::{HubHandle, RefreshOutcome, Refresher, RefresherOptions};
use devac_core::watch::{Watcher, WatcherEvent, WatcherOptions};

#[derive(Parser, Debug)]
#[command(name = "devac-watch", about = "Watch a workspace and re-ingest changed repos")]
struct Cli {
    /// Workspace directory to watch. Defaults to the current directory.
    #[arg(default_value = ".")]
    workspace_path: PathBuf,

    /// Debounce window for batching filesystem events, in milliseconds.
    #[arg(long, default_value_t = 300)]
    debounce_ms: u64,
}

/// Re-ingests a repo's root package in-process; `repo_id` is the repo's
/// absolute path, since there is no manifest/catalog to resolve it through
/// outside of a running hub.
struct LocalIngestHub;

impl HubHandle for LocalIngestHub {
    fn refresh_repo(&self, repo_id: &str) -> RefreshOutcome {
        match ingest_package(repo_id, ".", Path::new(repo_id)) {
            Ok(report) => RefreshOutcome {
                repos_refreshed: 1,
                packages_updated: 1,
                edges_updated: report.edges as u32,
                errors: report.warnings,
            },
            Err(e) => RefreshOutcome { errors: vec![e.to_string()], ..Default::default() },
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let (mut watcher, watch_rx) =
        Watcher::new(cli.workspace_path.clone(), WatcherOptions { debounce_ms: cli.debounce_ms, ..Default::default() });
    watcher.start()?;

    let (refresher, refresh_rx) =
        Refresher::new(Arc::new(LocalIngestHub), RefresherOptions { debounce_ms: cli.debounce_ms, ..Default::default() });
    refresher.start();

    tracing::info!("watching {}", cli.workspace_path.display());

    loop {
        match watch_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(WatcherEvent::FileChange { repo_path, file_path, .. }) => {
                tracing::debug!("change in {}: {}", repo_path.display(), file_path.display());
                refresher.notify_change(&repo_path.display().to_string());
            }
            Ok(WatcherEvent::RepoDiscovery { repo_path, action }) => {
                tracing::info!("repo {:?}: {}", action, repo_path.display());
            }
            Ok(WatcherEvent::WatcherState { state }) => {
                tracing::info!("watcher state: {state:?}");
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }

        if let Some(event) = refresher.tick() {
            for repo in &event.refreshed_repos {
                tracing::info!("refreshed {repo}: {} packages", event.packages_updated);
            }
            for error in &event.errors {
                tracing::warn!("refresh error: {error}");
            }
        }
    }

    while let Ok(event) = refresh_rx.try_recv() {
        drop(event);
    }

    Ok(())
}
