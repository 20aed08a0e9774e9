//! `devac-ingest` — one-shot package ingest CLI (`SPEC_FULL.md` §0).
//!
//! Runs a single ingest pass over a package directory and prints a summary.
//! Meant to be invoked by a hub's `refresh_repo`, a CI job, or by hand while
//! developing against a repo that has no hub running yet.

use std::path::PathBuf;

use clap::Parser;
use devac_core::ingest::ingest_package;

#[derive(Parser, Debug)]
#[command(name = "devac-ingest", about = "Ingest a package into its seed store")]
struct Cli {
    /// Package directory to ingest. Defaults to the current directory.
    #[arg(default_value = ".")]
    package_root: PathBuf,

    /// Identifier recorded as this package's owning repo in its manifest.
    #[arg(long, default_value = "local")]
    repo: String,

    /// Package path relative to the repo root ("." for the repo root itself).
    #[arg(long, default_value = ".")]
    package: String,

    /// Emit the ingest report as JSON instead of a human-readable summary.
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let report = ingest_package(&cli.repo, &cli.package, &cli.package_root)?;

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "files_parsed": report.files_parsed,
                "files_unchanged": report.files_unchanged,
                "files_dropped": report.files_dropped,
                "nodes": report.nodes,
                "edges": report.edges,
                "warnings": report.warnings,
            })
        );
    } else {
        println!(
            "ingested {}: {} parsed, {} unchanged, {} dropped, {} nodes, {} edges",
            cli.package_root.display(),
            report.files_parsed,
            report.files_unchanged,
            report.files_dropped,
            report.nodes,
            report.edges,
        );
        for warning in &report.warnings {
            tracing::warn!("{warning}");
        }
    }

    Ok(())
}
