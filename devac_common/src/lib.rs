//! Shared wire types for `devac-core` and `devac-hub`.
//!
//! This crate carries only what crosses a process boundary: the IPC
//! request/response envelope (`spec.md` §6), the error kind enum (§7), and
//! the diagnostics row shape (§4.F). Everything else — the graph model, the
//! parser, the seed store — lives in `devac-core`.

pub mod diagnostics;
pub mod error;
pub mod ipc;
pub mod manifest;

pub use diagnostics::{Diagnostic, DiagnosticLocation, DiagnosticsCounts, DiagnosticsGroupBy, Severity};
pub use error::{DevacError, DevacResult, ErrorKind};
pub use ipc::{IpcError, IpcRequest, IpcResponse};
pub use manifest::{DevacUri, HubConfig, PackageEntry, RepoManifest, WatcherSettings, WorkspaceConfig};
