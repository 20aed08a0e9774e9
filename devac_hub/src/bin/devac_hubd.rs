//! `devac-hubd` — the central hub daemon (`spec.md` §4.F–§4.H).
//!
//! Subcommands mirror the boundary contract of `spec.md` §6 ("The CLI
//! exposes `sync`, `query …`, `status …`, `hub …` subcommands"); the CLI
//! front-end's flag surface and output formatting are an external
//! collaborator out of this crate's scope, so this binary is the minimal
//! plumbing those subcommand names route through: `serve` runs the
//! daemon (owner or standby client), `add-repo`/`sync`/`status`/`query`/
//! `hub` each issue one op against whichever role this process holds,
//! auto-promoting per `spec.md` §4.H if the owner is unreachable.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use devac_hub::hub::Hub;
use devac_hub::ipc::{self, HubRole};

#[derive(Parser, Debug)]
#[command(name = "devac-hubd", about = "Central hub daemon: catalog, federated queries, owner/client IPC")]
struct Cli {
    /// Workspace root. Defaults to the current directory.
    #[arg(long, default_value = ".")]
    workspace: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs as the hub daemon: owner if the socket is free, standby
    /// client otherwise. Blocks until interrupted.
    Serve,
    /// Registers a repo with the hub and syncs its manifest.
    AddRepo {
        repo_id: String,
        local_path: PathBuf,
    },
    /// Re-ingests every package of one repo, or every registered repo if
    /// `repo_id` is omitted.
    Sync {
        repo_id: Option<String>,
    },
    /// Prints registered repos and aggregate diagnostics counts as JSON.
    Status,
    /// Issues one federated-query-engine op (`find_symbol`, `query_sql`,
    /// `get_call_graph`, `run_rules`, `generate_c4`, ...) with JSON args.
    Query {
        op: String,
        #[arg(default_value = "{}")]
        args_json: String,
    },
    /// Issues one hub-surface op (`list_repos`, `get_diagnostics`, ...)
    /// with JSON args.
    Hub {
        op: String,
        #[arg(default_value = "{}")]
        args_json: String,
    },
}

/// Exit codes follow `spec.md` §6: 0 success, 1 generic failure. Invalid
/// arguments (exit 2) are `clap`'s own concern — `Cli::parse()` exits the
/// process itself before `main`'s body ever runs on a parse error.
#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => std::process::ExitCode::from(0),
        Err(e) => {
            eprintln!("devac-hubd: {e}");
            std::process::ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let workspace = cli.workspace.canonicalize().unwrap_or(cli.workspace);
    let hub_factory = {
        let workspace = workspace.clone();
        move || Arc::new(Hub::new(&workspace))
    };
    let hub = hub_factory();

    match cli.command {
        Command::Serve => serve(&workspace, hub).await,
        other => {
            let (mut role, listener) = ipc::acquire_role(&workspace, hub.clone()).await?;
            if let Some(listener) = listener {
                tokio::spawn(ipc::serve(hub, listener));
            }
            dispatch_cli(&mut role, hub_factory, other).await
        }
    }
}

async fn serve(workspace: &std::path::Path, hub: Arc<Hub>) -> anyhow::Result<()> {
    let (role, listener) = ipc::acquire_role(workspace, hub).await?;
    match (role, listener) {
        (HubRole::Owner(hub), Some(listener)) => {
            hub.validate_startup();
            tracing::info!(workspace = %workspace.display(), "devac-hubd: owner, serving on {}", ipc::socket_path(workspace).display());
            ipc::serve(hub, listener).await?;
        }
        (HubRole::Client(_), None) => {
            tracing::info!("devac-hubd: another owner is live, standing by as a client");
            // A standby client has nothing to serve; it stays alive so it
            // can answer `sync`/`query`/`status`/`hub` invocations the
            // operator runs against this same workspace, auto-promoting
            // if it ever observes the owner go away.
            std::future::pending::<()>().await;
        }
        _ => unreachable!("acquire_role always pairs Owner with Some(listener) and Client with None"),
    }
    Ok(())
}

async fn dispatch_cli(role: &mut HubRole, hub_factory: impl Fn() -> Arc<Hub>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Serve => unreachable!("handled in run()"),
        Command::AddRepo { repo_id, local_path } => {
            let args = serde_json::json!({"repo_id": repo_id, "local_path": local_path.display().to_string()});
            let result = ipc::call_with_promotion(hub_factory, role, "add_repo", args).await?;
            print_json(&result);
        }
        Command::Sync { repo_id } => {
            let repo_ids = match repo_id {
                Some(id) => vec![id],
                None => {
                    let repos = ipc::call_with_promotion(&hub_factory, role, "list_repos", serde_json::json!({})).await?;
                    repos
                        .as_array()
                        .into_iter()
                        .flatten()
                        .filter_map(|r| r.get("repo_id").and_then(serde_json::Value::as_str).map(str::to_string))
                        .collect()
                }
            };
            for repo_id in repo_ids {
                let result = ipc::call_with_promotion(&hub_factory, role, "refresh_repo", serde_json::json!({"repo_id": repo_id})).await?;
                print_json(&result);
            }
        }
        Command::Status => {
            let repos = ipc::call_with_promotion(&hub_factory, role, "list_repos", serde_json::json!({})).await?;
            let counts = ipc::call_with_promotion(&hub_factory, role, "get_diagnostics_counts", serde_json::json!({})).await?;
            print_json(&serde_json::json!({"repos": repos, "diagnostics": counts}));
        }
        Command::Query { op, args_json } => {
            let args = serde_json::from_str(&args_json).map_err(|e| anyhow::anyhow!("invalid --args JSON: {e}"))?;
            let result = ipc::call_with_promotion(hub_factory, role, &op, args).await?;
            print_json(&result);
        }
        Command::Hub { op, args_json } => {
            let args = serde_json::from_str(&args_json).map_err(|e| anyhow::anyhow!("invalid --args JSON: {e}"))?;
            let result = ipc::call_with_promotion(hub_factory, role, &op, args).await?;
            print_json(&result);
        }
    }
    Ok(())
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()));
}
