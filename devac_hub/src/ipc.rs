//! Hub Owner/Client IPC (`spec.md` §4.H): a workspace-local Unix socket
//! arbitrating a single writer, with auto-promotion when the owner dies.
//!
//! Framing mirrors the teacher's `rmcp_mux` daemon (`UnixListener`/
//! `UnixStream` plus a `tokio_util::codec` framed reader/writer per
//! connection) but the wire shape is `devac-common`'s flat
//! `{op, args, id}` envelope (`spec.md` §6), not JSON-RPC — `rmcp`'s
//! JSON-RPC codec and tool-schema machinery are out of scope here
//! (`spec.md` §1), so this uses a plain `LinesCodec` instead.
//!
//! `HubRole` is the tagged variant `spec.md` §9 asks for in place of
//! ambient global state: `Owner` holds the bound listener and serves
//! requests against an in-process `Hub`; `Client` holds just a socket
//! path and calls through it. Promotion is a state transition from one
//! variant to the other, never a third "maybe" state.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::{Framed, LinesCodec};

use devac_common::{DevacError, DevacResult, IpcRequest, IpcResponse};

use crate::c4::{self, C4Options};
use crate::hub::{DiagnosticsFilter, Hub};
use crate::query_engine::{CallGraphDirection, EffectsFilter, QueryEngine};
use crate::rules;

/// Per-call wall-clock deadline (`spec.md` §5, "Timeouts": "a per-call
/// wall-clock deadline (order of seconds)").
pub const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// This process's role with respect to the workspace hub. The owner
/// variant carries just the `Hub` handle `dispatch` needs; the listener
/// it was bound on is handed to `serve` exactly once by whichever caller
/// obtained it from `acquire_role`; the role itself never needs to hold
/// it again.
pub enum HubRole {
    Owner(Arc<Hub>),
    Client(PathBuf),
}

impl HubRole {
    pub fn is_owner(&self) -> bool {
        matches!(self, HubRole::Owner(_))
    }
}

/// Deterministic socket path under the workspace's `.devac/` directory
/// (`spec.md` §4.H, "a deterministic path under `<workspace>/.devac/`").
pub fn socket_path(workspace_path: &Path) -> PathBuf {
    workspace_path.join(".devac").join("hub.sock")
}

/// Attempts to become the owner by binding `socket_path`; falls back to
/// client mode if another listener already holds it (`spec.md` §4.H, "On
/// start, each process attempts to bind; if bind fails because another
/// listener is present, it acts as a client").
///
/// A bind failure alone doesn't prove a live owner — a process that died
/// without cleaning up its socket file leaves a stale one behind. This
/// probes with a connect attempt first: if nothing answers, the file is
/// removed and the bind is retried once.
/// Returns the resulting role plus the bound listener when that role is
/// `Owner` (the caller spawns `serve(hub, listener)` on it); `None` when
/// the role is `Client`.
pub async fn acquire_role(workspace_path: &Path, hub: Arc<Hub>) -> DevacResult<(HubRole, Option<UnixListener>)> {
    let path = socket_path(workspace_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| DevacError::IoFailed { path: parent.display().to_string(), source: e })?;
    }

    match UnixListener::bind(&path) {
        Ok(listener) => Ok((HubRole::Owner(hub), Some(listener))),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            if UnixStream::connect(&path).await.is_ok() {
                return Ok((HubRole::Client(path), None));
            }
            // Stale socket: no one is actually listening.
            let _ = std::fs::remove_file(&path);
            let listener = UnixListener::bind(&path)
                .map_err(|e| DevacError::IoFailed { path: path.display().to_string(), source: e })?;
            Ok((HubRole::Owner(hub), Some(listener)))
        }
        Err(e) => Err(DevacError::IoFailed { path: path.display().to_string(), source: e }),
    }
}

/// Serves requests on an already-bound owner listener until the process
/// exits. One task per connection; connections don't share state beyond
/// the shared `Hub`.
pub async fn serve(hub: Arc<Hub>, listener: UnixListener) -> DevacResult<()> {
    loop {
        let (stream, _addr) = listener
            .accept()
            .await
            .map_err(|e| DevacError::IoFailed { path: "hub.sock".to_string(), source: e })?;
        let hub = hub.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_connection(hub, stream).await {
                tracing::warn!("hub ipc connection ended with error: {e}");
            }
        });
    }
}

async fn serve_connection(hub: Arc<Hub>, stream: UnixStream) -> DevacResult<()> {
    let mut framed = Framed::new(stream, LinesCodec::new());
    while let Some(line) = framed.next().await {
        let line = line.map_err(|e| DevacError::IoFailed { path: "hub.sock".to_string(), source: std::io::Error::other(e) })?;
        let request: IpcRequest = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("dropping malformed ipc request: {e}");
                continue;
            }
        };
        let response = match dispatch(&hub, &request.op, &request.args) {
            Ok(result) => IpcResponse::ok(request.id, result),
            Err(e) => IpcResponse::err(request.id, e.kind(), e.to_string()),
        };
        let line = serde_json::to_string(&response)
            .map_err(|e| DevacError::InvariantViolation(format!("response serialize failed: {e}")))?;
        framed.send(line).await.map_err(|e| DevacError::IoFailed { path: "hub.sock".to_string(), source: std::io::Error::other(e) })?;
    }
    Ok(())
}

/// The hub surface (`spec.md` §4.F) plus the federated query engine's hub
/// mode (`spec.md` §4.G) and the rules/C4 pipeline, all addressed by `op`
/// name over the wire — the same operation names `spec.md` §6 says the
/// request/response envelope carries "from the hub surface of §4.F".
fn dispatch(hub: &Arc<Hub>, op: &str, args: &Value) -> DevacResult<Value> {
    let empty = Map::new();
    let args = args.as_object().unwrap_or(&empty);

    match op {
        "list_repos" => Ok(serde_json::to_value(hub.list_repos()).unwrap()),
        "add_repo" => {
            let repo_id = str_arg(args, "repo_id")?;
            let local_path = str_arg(args, "local_path")?;
            hub.add_repo(repo_id, PathBuf::from(local_path))?;
            Ok(serde_json::json!({"repo_id": repo_id}))
        }
        "refresh_repo" => {
            let repo_id = str_arg(args, "repo_id")?;
            let outcome = hub.refresh_repo(repo_id);
            Ok(serde_json::json!({
                "repos_refreshed": outcome.repos_refreshed,
                "packages_updated": outcome.packages_updated,
                "edges_updated": outcome.edges_updated,
                "errors": outcome.errors,
            }))
        }
        "get_affected_repos" => {
            let ids = str_list_arg(args, "entity_ids")?;
            Ok(serde_json::json!(hub.get_affected_repos(&ids)))
        }
        "get_diagnostics" => {
            let filter = DiagnosticsFilter {
                repo_id: args.get("repo_id").and_then(Value::as_str).map(str::to_string),
                severity: None,
                source: args.get("source").and_then(Value::as_str).map(str::to_string),
            };
            Ok(serde_json::to_value(hub.get_diagnostics(&filter)).unwrap())
        }
        "get_diagnostics_counts" => Ok(serde_json::to_value(hub.get_diagnostics_counts()).unwrap()),
        "validation_errors" => Ok(serde_json::json!(hub.validation_errors())),
        "find_symbol" => {
            let engine = QueryEngine::for_hub(hub.clone());
            let name = str_arg(args, "name")?;
            let kind = args.get("kind").and_then(Value::as_str);
            Ok(rows_to_value(engine.find_symbol(name, kind)?))
        }
        "get_dependencies" => {
            let engine = QueryEngine::for_hub(hub.clone());
            Ok(rows_to_value(engine.get_dependencies(str_arg(args, "entity_id")?)?))
        }
        "get_dependents" => {
            let engine = QueryEngine::for_hub(hub.clone());
            Ok(rows_to_value(engine.get_dependents(str_arg(args, "entity_id")?)?))
        }
        "get_file_symbols" => {
            let engine = QueryEngine::for_hub(hub.clone());
            Ok(rows_to_value(engine.get_file_symbols(str_arg(args, "file_path")?)?))
        }
        "get_affected" => {
            let engine = QueryEngine::for_hub(hub.clone());
            let files = str_list_arg(args, "files")?;
            let max_depth = u32_arg(args, "max_depth").unwrap_or(10);
            Ok(serde_json::json!(engine.get_affected(&files, max_depth)?))
        }
        "get_call_graph" => {
            let engine = QueryEngine::for_hub(hub.clone());
            let direction = match args.get("direction").and_then(Value::as_str).unwrap_or("callees") {
                "callers" => CallGraphDirection::Callers,
                "both" => CallGraphDirection::Both,
                _ => CallGraphDirection::Callees,
            };
            let max_depth = u32_arg(args, "max_depth").unwrap_or(10);
            let entries = engine.get_call_graph(str_arg(args, "entity_id")?, direction, max_depth)?;
            Ok(serde_json::to_value(
                entries.into_iter().map(|e| serde_json::json!({"entity_id": e.entity_id, "name": e.name, "depth": e.depth})).collect::<Vec<_>>(),
            )
            .unwrap())
        }
        "query_sql" => {
            let engine = QueryEngine::for_hub(hub.clone());
            Ok(rows_to_value(engine.query_sql(str_arg(args, "sql")?)?))
        }
        "query_effects" => {
            let engine = QueryEngine::for_hub(hub.clone());
            let filter = EffectsFilter {
                effect_type: args.get("effect_type").and_then(Value::as_str).map(str::to_string),
                file_path: args.get("file_path").and_then(Value::as_str).map(str::to_string),
            };
            Ok(rows_to_value(engine.query_effects(&filter)?))
        }
        "run_rules" => {
            let effects = load_hub_effects(hub)?;
            let domain = args.get("domain").and_then(Value::as_str).map(str::to_string);
            let outcome = rules::run_rules(&effects, &rules::RunRulesOptions { domain });
            Ok(serde_json::json!({
                "domain_effects": outcome.domain_effects,
                "matched_count": outcome.matched_count,
                "unmatched_count": outcome.unmatched_count,
                "rule_stats": outcome.rule_stats,
            }))
        }
        "list_rules" => Ok(serde_json::json!(
            rules::built_in_rules().into_iter().map(|r| serde_json::json!({"id": r.id, "domain": r.domain})).collect::<Vec<_>>()
        )),
        "generate_c4" => {
            let effects = load_hub_effects(hub)?;
            let domain = args.get("domain").and_then(Value::as_str).map(str::to_string);
            let outcome = rules::run_rules(&effects, &rules::RunRulesOptions { domain });
            let level = args.get("level").and_then(Value::as_str).and_then(parse_c4_level);
            let model = c4::generate_c4(&outcome.domain_effects, &C4Options { level });
            Ok(serde_json::json!({"nodes": model.nodes, "edges": model.edges}))
        }
        other => Err(DevacError::ModeMisuse(format!("unknown op: {other}"))),
    }
}

fn load_hub_effects(hub: &Arc<Hub>) -> DevacResult<Vec<devac_core::model::Effect>> {
    let mut effects = Vec::new();
    for (_repo_id, _package_path, package_root) in hub.all_packages() {
        let tables = devac_core::seed_store::SeedStore::new(&package_root).read_merged()?;
        effects.extend(tables.effects);
    }
    Ok(effects)
}

fn parse_c4_level(s: &str) -> Option<c4::C4Level> {
    match s {
        "context" => Some(c4::C4Level::Context),
        "containers" => Some(c4::C4Level::Containers),
        "domains" => Some(c4::C4Level::Domains),
        "externals" => Some(c4::C4Level::Externals),
        _ => None,
    }
}

fn rows_to_value(rows: Vec<Map<String, Value>>) -> Value {
    Value::Array(rows.into_iter().map(Value::Object).collect())
}

fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> DevacResult<&'a str> {
    args.get(key).and_then(Value::as_str).ok_or_else(|| DevacError::ModeMisuse(format!("missing arg: {key}")))
}

fn str_list_arg(args: &Map<String, Value>, key: &str) -> DevacResult<Vec<String>> {
    Ok(args
        .get(key)
        .and_then(Value::as_array)
        .map(|v| v.iter().filter_map(|x| x.as_str().map(str::to_string)).collect())
        .unwrap_or_default())
}

fn u32_arg(args: &Map<String, Value>, key: &str) -> Option<u32> {
    args.get(key).and_then(Value::as_u64).map(|v| v as u32)
}

/// A single request/response round trip against a listening owner, with a
/// wall-clock deadline. A timeout or connection failure is surfaced as
/// `ConnectionLost`/`Timeout`, which `call_with_promotion` below treats as
/// the trigger for auto-promotion (`spec.md` §7).
pub async fn client_call(socket_path: &Path, op: &str, args: Value) -> DevacResult<Value> {
    let id = uuid_like_id();
    let request = IpcRequest::new(op, args, id.clone());
    let line = serde_json::to_string(&request).map_err(|e| DevacError::InvariantViolation(e.to_string()))?;

    let fut = async {
        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(|e| DevacError::ConnectionLost(format!("connect to {}: {e}", socket_path.display())))?;
        let mut framed = Framed::new(stream, LinesCodec::new());
        framed.send(line).await.map_err(|e| DevacError::ConnectionLost(e.to_string()))?;
        let reply = framed
            .next()
            .await
            .ok_or_else(|| DevacError::ConnectionLost("owner closed connection without replying".to_string()))?
            .map_err(|e| DevacError::ConnectionLost(e.to_string()))?;
        let response: IpcResponse =
            serde_json::from_str(&reply).map_err(|e| DevacError::InvariantViolation(format!("malformed response: {e}")))?;
        if response.ok {
            Ok(response.result.unwrap_or(Value::Null))
        } else {
            let err = response.error.expect("ok=false implies error set");
            Err(DevacError::ConnectionLost(format!("{:?}: {}", err.kind, err.message)))
        }
    };

    match tokio::time::timeout(CALL_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(DevacError::Timeout(CALL_TIMEOUT)),
    }
}

/// Calls `op` through the current role, auto-promoting on connection loss
/// (`spec.md` §4.H, "Auto-promotion"). On a client whose call fails with a
/// connection error, the client releases its client state, tries to bind;
/// on success it reissues the call locally; on failure (another client
/// raced to the bind) it reconnects as a client and retries once.
/// Promotion never retries indefinitely: at most one extra attempt.
pub async fn call_with_promotion(
    hub_factory: impl Fn() -> Arc<Hub>,
    role: &mut HubRole,
    op: &str,
    args: Value,
) -> DevacResult<Value> {
    match role {
        HubRole::Owner(hub) => dispatch(hub, op, &args),
        HubRole::Client(socket_path) => match client_call(socket_path, op, args.clone()).await {
            Ok(result) => Ok(result),
            Err(e) if e.triggers_promotion() => {
                let path = socket_path.clone();
                let bound = match UnixListener::bind(&path) {
                    Ok(listener) => Some(listener),
                    // The dead owner's socket file is usually still on disk;
                    // a bare bind fails with AddrInUse even though nothing
                    // is listening. Probe with a connect to tell a stale
                    // file apart from a live rival, same as `acquire_role`.
                    Err(e) if e.kind() == std::io::ErrorKind::AddrInUse && UnixStream::connect(&path).await.is_err() => {
                        let _ = std::fs::remove_file(&path);
                        UnixListener::bind(&path).ok()
                    }
                    Err(_) => None,
                };
                match bound {
                    Some(listener) => {
                        let hub = hub_factory();
                        let result = dispatch(&hub, op, &args);
                        tokio::spawn(serve(hub.clone(), listener));
                        *role = HubRole::Owner(hub);
                        result
                    }
                    None => {
                        // Someone else raced to the bind; reconnect as a client and retry once.
                        client_call(&path, op, args).await
                    }
                }
            }
            Err(e) => Err(e),
        },
    }
}

fn uuid_like_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("req-{}-{}", std::process::id(), n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::net::UnixListener as TUnixListener;

    #[tokio::test]
    async fn acquire_role_binds_as_owner_when_socket_is_free() {
        let ws = TempDir::new().unwrap();
        let hub = Arc::new(Hub::new(ws.path()));
        let (role, listener) = acquire_role(ws.path(), hub).await.unwrap();
        assert!(role.is_owner());
        assert!(listener.is_some());
    }

    #[tokio::test]
    async fn acquire_role_becomes_client_when_owner_is_live() {
        let ws = TempDir::new().unwrap();
        let path = socket_path(ws.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let _listener = TUnixListener::bind(&path).unwrap();

        let hub = Arc::new(Hub::new(ws.path()));
        let (role, listener) = acquire_role(ws.path(), hub).await.unwrap();
        assert!(!role.is_owner());
        assert!(listener.is_none());
    }

    #[tokio::test]
    async fn acquire_role_rebinds_over_a_stale_socket_file() {
        let ws = TempDir::new().unwrap();
        let path = socket_path(ws.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        {
            let _dead_listener = TUnixListener::bind(&path).unwrap();
            // Dropped without removing the file: simulates a crashed owner.
        }

        let hub = Arc::new(Hub::new(ws.path()));
        let (role, listener) = acquire_role(ws.path(), hub).await.unwrap();
        assert!(role.is_owner());
        assert!(listener.is_some());
    }

    #[tokio::test]
    async fn client_call_round_trips_list_repos_against_a_live_owner() {
        let ws = TempDir::new().unwrap();
        let hub = Arc::new(Hub::new(ws.path()));
        let (role, listener) = acquire_role(ws.path(), hub.clone()).await.unwrap();
        assert!(role.is_owner());
        let path = socket_path(ws.path());
        tokio::spawn(serve(hub, listener.unwrap()));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = client_call(&path, "list_repos", serde_json::json!({})).await.unwrap();
        assert_eq!(result, serde_json::json!([]));
    }

    #[tokio::test]
    async fn call_with_promotion_promotes_client_after_owner_dies() {
        let ws = TempDir::new().unwrap();
        let hub = Arc::new(Hub::new(ws.path()));
        let path = socket_path(ws.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        {
            // Simulate an owner that bound the socket and then crashed
            // without removing the file.
            let _dead = TUnixListener::bind(&path).unwrap();
        }

        let mut role = HubRole::Client(path);
        let hub_for_factory = hub.clone();
        let result = call_with_promotion(move || hub_for_factory.clone(), &mut role, "list_repos", serde_json::json!({})).await;
        assert!(result.is_ok());
        assert!(role.is_owner());
    }

    #[tokio::test]
    async fn client_call_against_dead_owner_surfaces_connection_lost() {
        let ws = TempDir::new().unwrap();
        let path = socket_path(ws.path());
        let result = client_call(&path, "list_repos", serde_json::json!({})).await;
        assert!(matches!(result, Err(DevacError::ConnectionLost(_))));
    }
}
