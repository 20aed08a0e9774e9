//! # devac-hub
//!
//! Central Hub (`spec.md` §4.F), Federated Query Engine (§4.G), and Hub
//! Owner/Client IPC (§4.H) — the workspace-level coordinator that sits on
//! top of `devac-core`'s per-package seeds. This crate never parses
//! source itself; it enumerates packages via repo manifests and reads
//! their seed stores.

/// Central Hub (`spec.md` §4.F): the workspace catalog of repos,
/// manifests, and aggregated diagnostics.
pub mod hub;

/// Federated Query Engine (`spec.md` §4.G): package-mode and hub-mode
/// graph queries, the SQL safety boundary, and the rules/C4 pipeline's
/// effect source.
pub mod query_engine;

/// Rules engine (`spec.md` §4.G, "Rules engine"): classifies `Effect`
/// rows into `DomainEffect`s.
pub mod rules;

/// C4 model generation (`spec.md` §4.G, "C4 generation"): groups
/// classified effects into context/container/domain/external level models.
pub mod c4;

/// Hub Owner/Client IPC (`spec.md` §4.H): single-writer arbitration over
/// a workspace-local Unix socket, with auto-promotion on owner loss.
pub mod ipc;

/// SARIF 2.1.0 importer (`SPEC_FULL.md` §2.4): normalizes external
/// typecheck/lint/test tool output into `Diagnostic` rows.
pub mod sarif;

/// Validation/diagnostics protocol for LLM hook integration (`spec.md`
/// §6): parses `hookSpecificOutput`/`stopReason` payloads into error and
/// warning counts.
pub mod hook;
