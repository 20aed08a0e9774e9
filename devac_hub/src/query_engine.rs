//! Federated Query Engine (`spec.md` §4.G): answers graph queries by
//! combining per-package seeds, in one of two modes.
//!
//! Package mode targets a single package's merged seed directly via
//! `devac_core::seed_store::SeedStore::query`. Hub mode fans across every
//! package every registered repo's manifest lists: each package's merged
//! tables are loaded into one shared in-memory SQLite connection under a
//! package-prefixed table name (`p0_nodes`, `p1_nodes`, ...), and a
//! `CREATE VIEW` per canonical table name (`nodes`, `edges`,
//! `external_refs`, `effects`) unions them back together. This is how
//! "the engine substitutes each reference with the union-all of that
//! table across all package seeds" (`spec.md` §4.G) is implemented here:
//! as SQL views rather than textual rewriting of caller SQL, so caller
//! SQL is never touched.

use std::sync::Arc;

use devac_common::{DevacError, DevacResult};
use devac_core::seed_store::{load_into_sqlite, run_sql, SeedStore};
use rusqlite::Connection;
use serde_json::{Map, Value};

use crate::hub::Hub;

const CANONICAL_TABLES: &[&str] = &["nodes", "edges", "external_refs", "effects"];

/// One query target: a single package's seed, or the whole hub's catalog.
pub enum QueryEngine {
    Package(SeedStore),
    Hub(Arc<Hub>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallGraphDirection {
    Callers,
    Callees,
    Both,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallGraphEntry {
    pub entity_id: String,
    pub name: Option<String>,
    pub depth: u32,
}

#[derive(Debug, Clone, Default)]
pub struct EffectsFilter {
    pub effect_type: Option<String>,
    pub file_path: Option<String>,
}

impl QueryEngine {
    pub fn for_package(package_root: impl Into<std::path::PathBuf>) -> Self {
        QueryEngine::Package(SeedStore::new(package_root))
    }

    pub fn for_hub(hub: Arc<Hub>) -> Self {
        QueryEngine::Hub(hub)
    }

    /// Runs `sql` against whichever scope this engine targets. Internal
    /// callers (`find_symbol`, `get_call_graph`, ...) always pass
    /// generated SELECT statements, so this is not the SQL-safety
    /// boundary — `query_sql` below is.
    fn run(&self, sql: &str) -> DevacResult<Vec<Map<String, Value>>> {
        match self {
            QueryEngine::Package(store) => store.query(sql),
            QueryEngine::Hub(hub) => {
                let conn = Connection::open_in_memory()
                    .map_err(|e| DevacError::IoFailed { path: ":memory:".into(), source: std::io::Error::other(e) })?;
                self.load_hub_views(&conn, hub)?;
                run_sql(&conn, sql)
            }
        }
    }

    /// Loads every package's merged tables under a per-package prefix and
    /// creates the four canonical union-all views over them.
    fn load_hub_views(&self, conn: &Connection, hub: &Hub) -> DevacResult<()> {
        let packages = hub.all_packages();
        // Zero packages → zero rows, zero error (`spec.md` §8, "Federated
        // query with zero packages"): treat it as one empty placeholder
        // package rather than special-casing the view SQL below.
        if packages.is_empty() {
            load_into_sqlite(conn, &devac_core::seed_store::SeedTables::default(), "p0_")?;
        } else {
            for (idx, (_repo_id, _package_path, package_root)) in packages.iter().enumerate() {
                let tables = SeedStore::new(package_root).read_merged()?;
                load_into_sqlite(conn, &tables, &format!("p{idx}_"))?;
            }
        }
        let effective_count = packages.len().max(1);
        for table in CANONICAL_TABLES {
            let union_all =
                (0..effective_count).map(|idx| format!("SELECT * FROM p{idx}_{table}")).collect::<Vec<_>>().join(" UNION ALL ");
            conn.execute_batch(&format!("CREATE VIEW {table} AS {union_all};"))
                .map_err(|e| DevacError::InvariantViolation(format!("view creation failed for {table}: {e}")))?;
        }
        Ok(())
    }

    pub fn find_symbol(&self, name: &str, kind: Option<&str>) -> DevacResult<Vec<Map<String, Value>>> {
        let mut sql = format!("SELECT * FROM nodes WHERE name = {}", sql_quote(name));
        if let Some(kind) = kind {
            sql.push_str(&format!(" AND kind = {}", sql_quote(kind)));
        }
        sql.push_str(" ORDER BY file_path, start_line");
        self.run(&sql)
    }

    pub fn get_file_symbols(&self, file_path: &str) -> DevacResult<Vec<Map<String, Value>>> {
        self.run(&format!("SELECT * FROM nodes WHERE file_path = {} ORDER BY start_line", sql_quote(file_path)))
    }

    /// Nodes `entity_id` directly depends on: targets of its outgoing edges.
    pub fn get_dependencies(&self, entity_id: &str) -> DevacResult<Vec<Map<String, Value>>> {
        let sql = format!(
            "SELECT DISTINCT n.* FROM edges e JOIN nodes n ON n.entity_id = e.target_entity_id \
             WHERE e.source_entity_id = {} ORDER BY n.name",
            sql_quote(entity_id)
        );
        self.run(&sql)
    }

    /// Nodes that directly depend on `entity_id`: sources of its incoming edges.
    pub fn get_dependents(&self, entity_id: &str) -> DevacResult<Vec<Map<String, Value>>> {
        let sql = format!(
            "SELECT DISTINCT n.* FROM edges e JOIN nodes n ON n.entity_id = e.source_entity_id \
             WHERE e.target_entity_id = {} ORDER BY n.name",
            sql_quote(entity_id)
        );
        self.run(&sql)
    }

    /// Entity IDs transitively reachable from any node defined in `files`,
    /// within `max_depth` hops of dependents — "what would break if these
    /// files changed" (`spec.md` §4.G, `get_affected`).
    pub fn get_affected(&self, files: &[String], max_depth: u32) -> DevacResult<Vec<String>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let file_list = files.iter().map(|f| sql_quote(f)).collect::<Vec<_>>().join(", ");
        let seed_sql = format!("SELECT DISTINCT entity_id FROM nodes WHERE file_path IN ({file_list})");
        let seeds: Vec<String> = self
            .run(&seed_sql)?
            .into_iter()
            .filter_map(|row| row.get("entity_id").and_then(Value::as_str).map(str::to_string))
            .collect();

        let mut affected: Vec<String> = Vec::new();
        for seed in &seeds {
            if !affected.contains(seed) {
                affected.push(seed.clone());
            }
            for entry in self.call_graph(seed, CallGraphDirection::Callers, max_depth)? {
                if !affected.contains(&entry.entity_id) {
                    affected.push(entry.entity_id);
                }
            }
        }
        Ok(affected)
    }

    /// Transitive callers/callees/both of `entity_id`, up to `max_depth`,
    /// DISTINCT per entity, ordered by depth then name, capped at 100 per
    /// direction (`spec.md` §4.G, "Call graph").
    pub fn get_call_graph(&self, entity_id: &str, direction: CallGraphDirection, max_depth: u32) -> DevacResult<Vec<CallGraphEntry>> {
        self.call_graph(entity_id, direction, max_depth)
    }

    fn call_graph(&self, entity_id: &str, direction: CallGraphDirection, max_depth: u32) -> DevacResult<Vec<CallGraphEntry>> {
        let mut entries = match direction {
            CallGraphDirection::Callers => self.call_graph_one_way(entity_id, max_depth, "target_entity_id", "source_entity_id")?,
            CallGraphDirection::Callees => self.call_graph_one_way(entity_id, max_depth, "source_entity_id", "target_entity_id")?,
            CallGraphDirection::Both => {
                let mut callers = self.call_graph_one_way(entity_id, max_depth, "target_entity_id", "source_entity_id")?;
                let callees = self.call_graph_one_way(entity_id, max_depth, "source_entity_id", "target_entity_id")?;
                callers.extend(callees);
                callers
            }
        };
        entries.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.name.cmp(&b.name)));
        entries.truncate(100);
        Ok(entries)
    }

    /// `anchor_col`/`walk_col` pick the traversal direction: callees walk
    /// `source_entity_id -> target_entity_id`; callers walk the reverse. A
    /// `|`-delimited path column accumulates visited IDs so the recursive
    /// step can refuse to revisit one, breaking cycles without a fixed
    /// recursion-depth fallback.
    fn call_graph_one_way(&self, entity_id: &str, max_depth: u32, anchor_col: &str, walk_col: &str) -> DevacResult<Vec<CallGraphEntry>> {
        let quoted = sql_quote(entity_id);
        let sql = format!(
            "WITH RECURSIVE graph(entity_id, depth, path) AS (\
                SELECT {walk_col}, 1, '|' || {anchor_col} || '|' || {walk_col} || '|' \
                FROM edges WHERE edge_type = 'CALLS' AND {anchor_col} = {quoted} \
                UNION ALL \
                SELECT e.{walk_col}, g.depth + 1, g.path || e.{walk_col} || '|' \
                FROM edges e JOIN graph g ON e.{anchor_col} = g.entity_id \
                WHERE e.edge_type = 'CALLS' AND g.depth < {max_depth} \
                  AND instr(g.path, '|' || e.{walk_col} || '|') = 0\
            ) \
            SELECT g.entity_id AS entity_id, MIN(g.depth) AS depth, n.name AS name \
            FROM graph g LEFT JOIN nodes n ON n.entity_id = g.entity_id \
            GROUP BY g.entity_id \
            ORDER BY depth, name \
            LIMIT 100"
        );
        let rows = self.run(&sql)?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let entity_id = row.get("entity_id")?.as_str()?.to_string();
                let depth = row.get("depth")?.as_u64()? as u32;
                let name = row.get("name").and_then(Value::as_str).map(str::to_string);
                Some(CallGraphEntry { entity_id, depth, name })
            })
            .collect())
    }

    pub fn query_effects(&self, filter: &EffectsFilter) -> DevacResult<Vec<Map<String, Value>>> {
        let mut sql = "SELECT * FROM effects WHERE 1=1".to_string();
        if let Some(effect_type) = &filter.effect_type {
            sql.push_str(&format!(" AND effect_type = {}", sql_quote(effect_type)));
        }
        if let Some(file_path) = &filter.file_path {
            sql.push_str(&format!(" AND source_file_path = {}", sql_quote(file_path)));
        }
        sql.push_str(" ORDER BY source_file_path, source_line");
        self.run(&sql)
    }

    /// User-facing SQL entry point. Only statements whose first
    /// non-whitespace token, case-folded, is `SELECT` are accepted
    /// (`spec.md` §4.G, "SQL safety") — everything else is rejected
    /// before it reaches SQLite.
    pub fn query_sql(&self, sql: &str) -> DevacResult<Vec<Map<String, Value>>> {
        let first_token = sql.trim_start().split_whitespace().next().unwrap_or("").to_lowercase();
        if first_token != "select" {
            return Err(DevacError::ModeMisuse(format!("query_sql only accepts SELECT statements, got: {first_token}")));
        }
        self.run(sql)
    }
}

/// Doubles embedded single quotes and wraps in quotes, per `spec.md`
/// §4.G's "String parameters embedded in internally generated SQL have
/// single quotes doubled."
fn sql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use devac_core::model::{Branch, Edge, EdgeType, Node, NodeFlags, NodeKind, Visibility};
    use devac_core::seed_store::SeedTables;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn node(entity_id: &str, name: &str, file_path: &str) -> Node {
        Node {
            entity_id: entity_id.to_string(),
            name: name.to_string(),
            qualified_name: name.to_string(),
            kind: NodeKind::Function,
            file_path: file_path.to_string(),
            source_file_hash: "h".to_string(),
            start_line: 1,
            end_line: 2,
            start_column: 0,
            end_column: 0,
            visibility: Visibility::Public,
            flags: NodeFlags::default(),
            type_signature: None,
            type_parameters: vec![],
            decorators: vec![],
            documentation: None,
            properties: BTreeMap::new(),
            branch: Branch::Base,
        }
    }

    fn calls(source: &str, target: &str) -> Edge {
        Edge {
            source_entity_id: source.to_string(),
            target_entity_id: target.to_string(),
            edge_type: EdgeType::Calls,
            source_file_path: "src/a.ts".to_string(),
            source_file_hash: "h".to_string(),
            source_line: 1,
            source_column: 0,
            properties: BTreeMap::new(),
            branch: Branch::Base,
        }
    }

    #[test]
    fn sql_quote_doubles_embedded_quotes() {
        assert_eq!(sql_quote("o'brien"), "'o''brien'");
    }

    #[test]
    fn query_sql_rejects_non_select() {
        let dir = TempDir::new().unwrap();
        let engine = QueryEngine::for_package(dir.path());
        assert!(engine.query_sql("DELETE FROM nodes").is_err());
        assert!(engine.query_sql("  select 1").is_ok());
    }

    #[test]
    fn call_graph_breaks_cycles_and_orders_by_depth() {
        let dir = TempDir::new().unwrap();
        let store = SeedStore::new(dir.path());
        store
            .write(
                Branch::Base,
                &SeedTables {
                    nodes: vec![node("a", "foo_a", "src/a.ts"), node("b", "foo_b", "src/a.ts"), node("c", "foo_c", "src/a.ts")],
                    edges: vec![calls("a", "b"), calls("b", "c"), calls("c", "a")],
                    ..Default::default()
                },
            )
            .unwrap();

        let engine = QueryEngine::for_package(dir.path());
        let entries = engine.get_call_graph("a", CallGraphDirection::Callees, 10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entity_id, "b");
        assert_eq!(entries[0].depth, 1);
        assert_eq!(entries[1].entity_id, "c");
        assert_eq!(entries[1].depth, 2);
    }

    #[test]
    fn find_symbol_filters_by_name() {
        let dir = TempDir::new().unwrap();
        let store = SeedStore::new(dir.path());
        store
            .write(
                Branch::Base,
                &SeedTables { nodes: vec![node("a", "greet", "src/a.ts"), node("b", "other", "src/a.ts")], ..Default::default() },
            )
            .unwrap();

        let engine = QueryEngine::for_package(dir.path());
        let rows = engine.find_symbol("greet", None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("entity_id").unwrap(), "a");
    }

    #[test]
    fn get_dependencies_and_dependents_follow_edges() {
        let dir = TempDir::new().unwrap();
        let store = SeedStore::new(dir.path());
        store
            .write(
                Branch::Base,
                &SeedTables {
                    nodes: vec![node("a", "foo", "src/a.ts"), node("b", "bar", "src/a.ts")],
                    edges: vec![calls("a", "b")],
                    ..Default::default()
                },
            )
            .unwrap();

        let engine = QueryEngine::for_package(dir.path());
        let deps = engine.get_dependencies("a").unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].get("entity_id").unwrap(), "b");

        let dependents = engine.get_dependents("b").unwrap();
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].get("entity_id").unwrap(), "a");
    }

    #[test]
    fn hub_mode_unions_packages_with_zero_packages_returning_empty() {
        let ws = TempDir::new().unwrap();
        let hub = Arc::new(Hub::new(ws.path()));
        let engine = QueryEngine::for_hub(hub);
        let rows = engine.query_sql("SELECT * FROM nodes").unwrap();
        assert!(rows.is_empty());
    }
}
