//! # devac-core
//!
//! Structural parser, seed store, file watcher and refresher for DevAC
//! (`spec.md` components A-E): identity and naming rules, per-language
//! parsing to a normalized node/edge/external-ref/effect model, the
//! columnar seed store with its base/branch overlay and SQL query surface,
//! a filesystem watcher, and the debounce/batch refresh orchestrator that
//! drives a hub. Component F onward (the central hub, federated query
//! engine, and owner/client IPC) live in `devac-hub`, which depends on
//! this crate rather than the other way around.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use devac_core::ingest::ingest_package;
//!
//! let report = ingest_package("acme/api", ".", std::path::Path::new(".")).unwrap();
//! println!("parsed {} files, {} nodes", report.files_parsed, report.nodes);
//! ```

/// Identity and naming (`spec.md` §3): deterministic `entity_id`s and the
/// scoped-name rules every language backend feeds into them.
/// Project-local `.devac/config.toml` overrides (`SPEC_FULL.md` §1).
pub mod config;

pub mod identity;

/// The normalized graph model (`spec.md` §3): `Node`, `Edge`, `ExternalRef`,
/// `Effect`, and the per-file `ParseResult` a language backend returns.
pub mod model;

/// Language parser dispatch (`spec.md` §4.B): the `LanguageBackend` trait
/// and the TypeScript/JavaScript, Python, and C# backends.
pub mod parser;

/// Package-level ingest orchestration (`SPEC_FULL.md` §2.2): file
/// discovery, incremental re-parse planning, and seed/manifest writes.
pub mod ingest;

/// Seed Store (`spec.md` §4.C): columnar persistence with a base/branch
/// overlay and an embedded SQL query surface.
pub mod seed_store;

/// Watcher (`spec.md` §4.D): debounced filesystem change notifications
/// scoped to a workspace's registered repos.
pub mod watch;

/// Refresher (`spec.md` §4.E): batches watcher events and drives a hub's
/// `refresh_repo` without this crate depending on `devac-hub`.
pub mod refresh;
