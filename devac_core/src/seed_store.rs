//! Seed Store (`spec.md` §4.C): persist and read per-package graph data as
//! columnar tables, with a base/branch overlay and a SQL query surface.
//!
//! Physical layout under a package root:
//!
//! ```text
//! <pkg>/.devac/
//!     manifest.json
//!     seed/
//!         base/{nodes,edges,external_refs,effects}.parquet
//!         branch/{nodes,edges,external_refs,effects}.parquet   (optional overlay)
//! ```
//!
//! Each table is one Parquet file (`arrow`/`parquet`), written whole and
//! atomically (`write_atomic`, mirroring the teacher's snapshot writer:
//! temp file in the target directory, then rename). Reads overlay `branch`
//! rows on top of `base` rows by `entity_id`/row key, per `spec.md` §4.C.
//!
//! The query surface (`SeedStore::query`) loads the merged tables into an
//! in-memory SQLite database and runs the caller's SQL against it — the
//! "embedded analytic engine" the spec calls for, supporting joins,
//! group-by, and the recursive CTEs the federated query engine needs for
//! transitive call graphs (`spec.md` §4.G).

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, RecordBatch, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::properties::WriterProperties;
use rusqlite::Connection;
use rusqlite::types::ValueRef;
use serde_json::{Map, Value};

use devac_common::{DevacError, DevacResult};

use crate::model::{
    Branch, Edge, EdgeType, Effect, EffectData, EffectType, ExternalRef, FunctionCallEffectData,
    ImportStyle, Node, NodeFlags, NodeKind, RequestEffectData, SendEffectData, SendKind, Visibility,
};

/// The four logical tables a package seed holds, aggregated across every
/// file in the package (this is the shape written to/read from disk —
/// `ParseResult`s from many files are flattened into one of these per
/// overlay level before a write).
#[derive(Debug, Clone, Default)]
pub struct SeedTables {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub external_refs: Vec<ExternalRef>,
    pub effects: Vec<Effect>,
}

impl SeedTables {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.edges.is_empty()
            && self.external_refs.is_empty()
            && self.effects.is_empty()
    }

    /// Every `source_file_hash` referenced anywhere in the tables — the
    /// authority invalidation checks against (`spec.md` §4.C).
    pub fn source_hashes(&self) -> HashSet<String> {
        let mut hashes = HashSet::new();
        hashes.extend(self.nodes.iter().map(|n| n.source_file_hash.clone()));
        hashes.extend(self.edges.iter().map(|e| e.source_file_hash.clone()));
        hashes
    }

    /// Drops every row whose `source_file_hash` is in `stale`. Used when a
    /// file disappears or its content changes: the old rows for that hash
    /// are removed before the fresh parse's rows are added back in.
    pub fn drop_hashes(&mut self, stale: &HashSet<String>) {
        self.nodes.retain(|n| !stale.contains(&n.source_file_hash));
        self.edges.retain(|e| !stale.contains(&e.source_file_hash));
        // external_refs/effects don't carry their own hash; they're keyed
        // to a file path instead, scrubbed by the caller via `drop_file`.
    }

    /// Drops every row a previous parse of `file_path` contributed, keyed by
    /// `module_entity_id` (the deterministic module-node id every backend
    /// stamps onto its own file's ordinary import refs) plus the
    /// `reexport:<file>:` prefix reserved for re-export rows (`spec.md` §4.B
    /// rule 10). Effects carry their own `source_file_path` and need no such
    /// indirection.
    pub fn drop_file(&mut self, file_path: &str, module_entity_id: &str) {
        let reexport_prefix = format!("reexport:{file_path}:");
        self.external_refs.retain(|r| {
            r.source_entity_id != module_entity_id && !r.source_entity_id.starts_with(&reexport_prefix)
        });
        self.effects.retain(|e| e.source_file_path != file_path);
    }

    pub fn extend_from(&mut self, other: SeedTables) {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
        self.external_refs.extend(other.external_refs);
        self.effects.extend(other.effects);
    }
}

/// Plan for an incremental ingest pass: which files need (re)parsing, which
/// rows should be dropped because their file disappeared, and how many
/// files were skipped because their hash is unchanged (`SPEC_FULL.md` §2.2,
/// grounded in the teacher's `mtime`/`size` incremental diff in `snapshot.rs`).
#[derive(Debug, Clone, Default)]
pub struct IngestPlan {
    pub to_parse: Vec<PathBuf>,
    pub to_drop_hashes: HashSet<String>,
    pub unchanged: usize,
}

impl IngestPlan {
    /// Compares the current on-disk file set (`path -> sha256`) against the
    /// hashes already present in a seed's tables.
    pub fn compute(current_files: &HashMap<PathBuf, String>, seed: &SeedTables) -> Self {
        let seed_hashes = seed.source_hashes();
        let mut to_parse = Vec::new();
        let mut unchanged = 0usize;
        for (path, hash) in current_files {
            if seed_hashes.contains(hash) {
                unchanged += 1;
            } else {
                to_parse.push(path.clone());
            }
        }
        let current_hashes: HashSet<String> = current_files.values().cloned().collect();
        let to_drop_hashes = seed_hashes.difference(&current_hashes).cloned().collect();
        to_parse.sort();
        IngestPlan { to_parse, to_drop_hashes, unchanged }
    }
}

/// Handle onto one package's `.devac/seed/` directory.
pub struct SeedStore {
    package_root: PathBuf,
}

impl SeedStore {
    pub fn new(package_root: impl Into<PathBuf>) -> Self {
        Self { package_root: package_root.into() }
    }

    pub fn devac_dir(&self) -> PathBuf {
        self.package_root.join(".devac")
    }

    fn overlay_dir(&self, branch: Branch) -> PathBuf {
        self.devac_dir().join("seed").join(branch.as_str())
    }

    fn table_path(&self, branch: Branch, table: &str) -> PathBuf {
        self.overlay_dir(branch).join(format!("{table}.parquet"))
    }

    /// Whole-table overwrite of one overlay level, atomic at the
    /// file-system level (`spec.md` §4.C, "Writes").
    pub fn write(&self, branch: Branch, tables: &SeedTables) -> DevacResult<()> {
        let dir = self.overlay_dir(branch);
        std::fs::create_dir_all(&dir).map_err(|e| DevacError::IoFailed { path: dir.display().to_string(), source: e })?;

        write_table(&self.table_path(branch, "nodes"), nodes_schema(), nodes_batch(&tables.nodes)?)?;
        write_table(&self.table_path(branch, "edges"), edges_schema(), edges_batch(&tables.edges)?)?;
        write_table(
            &self.table_path(branch, "external_refs"),
            external_refs_schema(),
            external_refs_batch(&tables.external_refs)?,
        )?;
        write_table(&self.table_path(branch, "effects"), effects_schema(), effects_batch(&tables.effects)?)?;
        Ok(())
    }

    /// Reads one overlay level. Returns an empty `SeedTables` (not an
    /// error) when the overlay directory doesn't exist yet — a package
    /// with no `branch` overlay is the common case.
    pub fn read(&self, branch: Branch) -> DevacResult<SeedTables> {
        let dir = self.overlay_dir(branch);
        if !dir.exists() {
            return Ok(SeedTables::default());
        }
        Ok(SeedTables {
            nodes: read_nodes(&self.table_path(branch, "nodes"))?,
            edges: read_edges(&self.table_path(branch, "edges"))?,
            external_refs: read_external_refs(&self.table_path(branch, "external_refs"))?,
            effects: read_effects(&self.table_path(branch, "effects"))?,
        })
    }

    /// Reads `base` overlaid with `branch` per `spec.md` §4.C: for each
    /// `entity_id`, the `branch` row supersedes the `base` row; rows
    /// present only in one side pass through untouched. `Node`/`Edge` rows
    /// tombstoned in `properties` (`{"__tombstone": true}`) are dropped
    /// rather than merged in — see `DESIGN.md` for the tombstone-vs-drop
    /// choice this implementation makes.
    pub fn read_merged(&self) -> DevacResult<SeedTables> {
        let base = self.read(Branch::Base)?;
        let branch = self.read(Branch::Overlay)?;
        if branch.is_empty() {
            return Ok(base);
        }

        let mut nodes: HashMap<String, Node> = base
            .nodes
            .into_iter()
            .map(|n| (n.entity_id.clone(), n))
            .collect();
        for n in branch.nodes {
            if is_tombstoned(&n.properties) {
                nodes.remove(&n.entity_id);
            } else {
                nodes.insert(n.entity_id.clone(), n);
            }
        }

        let mut edges: HashMap<String, Edge> = base
            .edges
            .into_iter()
            .map(|e| (edge_key(&e), e))
            .collect();
        for e in branch.edges {
            let key = edge_key(&e);
            if is_tombstoned(&e.properties) {
                edges.remove(&key);
            } else {
                edges.insert(key, e);
            }
        }

        // external_refs/effects have no per-row properties map to carry a
        // tombstone flag, so the branch overlay simply replaces rows that
        // share a file path with the branch's rows (drop-on-reparse),
        // matching the source's actual behavior (`spec.md` §9, Open Question).
        let branch_files: HashSet<&str> =
            branch.effects.iter().map(|e| e.source_file_path.as_str()).collect();
        let mut effects: Vec<Effect> = base
            .effects
            .into_iter()
            .filter(|e| !branch_files.contains(e.source_file_path.as_str()))
            .collect();
        effects.extend(branch.effects);

        let branch_ref_sources: HashSet<&str> =
            branch.external_refs.iter().map(|r| r.source_entity_id.as_str()).collect();
        let mut external_refs: Vec<ExternalRef> = base
            .external_refs
            .into_iter()
            .filter(|r| !branch_ref_sources.contains(r.source_entity_id.as_str()))
            .collect();
        external_refs.extend(branch.external_refs);

        Ok(SeedTables {
            nodes: nodes.into_values().collect(),
            edges: edges.into_values().collect(),
            external_refs,
            effects,
        })
    }

    /// Loads the overlay-merged tables into a fresh in-memory SQLite
    /// connection and runs `sql` against it. Rows come back as JSON objects
    /// keyed by column name, ready for the federated query engine to merge
    /// across packages.
    pub fn query(&self, sql: &str) -> DevacResult<Vec<Map<String, Value>>> {
        let tables = self.read_merged()?;
        let conn = Connection::open_in_memory()
            .map_err(|e| DevacError::IoFailed { path: ":memory:".into(), source: std::io::Error::other(e) })?;
        load_into_sqlite(&conn, &tables, "")?;
        run_sql(&conn, sql)
    }
}

fn is_tombstoned(properties: &std::collections::BTreeMap<String, Value>) -> bool {
    matches!(properties.get("__tombstone"), Some(Value::Bool(true)))
}

fn edge_key(e: &Edge) -> String {
    format!(
        "{}\u{1f}{}\u{1f}{:?}\u{1f}{}\u{1f}{}",
        e.source_entity_id, e.target_entity_id, e.edge_type, e.source_line, e.source_column
    )
}

fn write_atomic(path: &Path, contents: &[u8]) -> DevacResult<()> {
    let dir = path.parent().ok_or_else(|| {
        DevacError::InvariantViolation(format!("path {} has no parent", path.display()))
    })?;
    let mut tmp = tempfile::Builder::new()
        .prefix("devac_seed_tmp")
        .tempfile_in(dir)
        .map_err(|e| DevacError::IoFailed { path: dir.display().to_string(), source: e })?;
    tmp.write_all(contents)
        .map_err(|e| DevacError::IoFailed { path: path.display().to_string(), source: e })?;
    tmp.flush().map_err(|e| DevacError::IoFailed { path: path.display().to_string(), source: e })?;
    tmp.persist(path)
        .map_err(|e| DevacError::IoFailed { path: path.display().to_string(), source: e.error })?;
    Ok(())
}

fn write_table(path: &Path, schema: Schema, batch: RecordBatch) -> DevacResult<()> {
    let mut buf = Vec::new();
    {
        let props = WriterProperties::builder().build();
        let mut writer = ArrowWriter::try_new(&mut buf, Arc::new(schema), Some(props)).map_err(|e| {
            DevacError::InvariantViolation(format!("arrow writer init failed: {e}"))
        })?;
        writer
            .write(&batch)
            .map_err(|e| DevacError::InvariantViolation(format!("parquet write failed: {e}")))?;
        writer
            .close()
            .map_err(|e| DevacError::InvariantViolation(format!("parquet close failed: {e}")))?;
    }
    write_atomic(path, &buf)
}

fn read_batches(path: &Path) -> DevacResult<Vec<RecordBatch>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(path)
        .map_err(|e| DevacError::IoFailed { path: path.display().to_string(), source: e })?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| DevacError::InvariantViolation(format!("parquet reader init failed: {e}")))?
        .build()
        .map_err(|e| DevacError::InvariantViolation(format!("parquet reader build failed: {e}")))?;
    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch.map_err(|e| DevacError::InvariantViolation(format!("parquet row read failed: {e}")))?);
    }
    Ok(batches)
}

// ---------------------------------------------------------------------
// nodes
// ---------------------------------------------------------------------

fn nodes_schema() -> Schema {
    Schema::new(vec![
        Field::new("entity_id", DataType::Utf8, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("qualified_name", DataType::Utf8, false),
        Field::new("kind", DataType::Utf8, false),
        Field::new("file_path", DataType::Utf8, false),
        Field::new("source_file_hash", DataType::Utf8, false),
        Field::new("start_line", DataType::UInt32, false),
        Field::new("end_line", DataType::UInt32, false),
        Field::new("start_column", DataType::UInt32, false),
        Field::new("end_column", DataType::UInt32, false),
        Field::new("visibility", DataType::Utf8, false),
        Field::new("is_exported", DataType::Boolean, false),
        Field::new("is_default_export", DataType::Boolean, false),
        Field::new("is_abstract", DataType::Boolean, false),
        Field::new("is_static", DataType::Boolean, false),
        Field::new("is_async", DataType::Boolean, false),
        Field::new("is_generator", DataType::Boolean, false),
        Field::new("type_signature", DataType::Utf8, true),
        Field::new("type_parameters_json", DataType::Utf8, false),
        Field::new("decorators_json", DataType::Utf8, false),
        Field::new("documentation", DataType::Utf8, true),
        Field::new("properties_json", DataType::Utf8, false),
        Field::new("branch", DataType::Utf8, false),
    ])
}

fn kind_as_str(kind: NodeKind) -> &'static str {
    kind.as_str()
}

fn kind_from_str(s: &str) -> NodeKind {
    match s {
        "module" => NodeKind::Module,
        "namespace" => NodeKind::Namespace,
        "class" => NodeKind::Class,
        "interface" => NodeKind::Interface,
        "struct" => NodeKind::Struct,
        "record" => NodeKind::Record,
        "enum" => NodeKind::Enum,
        "enum_member" => NodeKind::EnumMember,
        "function" => NodeKind::Function,
        "method" => NodeKind::Method,
        "property" => NodeKind::Property,
        "parameter" => NodeKind::Parameter,
        "type" => NodeKind::Type,
        "decorator" => NodeKind::Decorator,
        _ => NodeKind::Variable,
    }
}

fn visibility_as_str(v: Visibility) -> &'static str {
    match v {
        Visibility::Public => "public",
        Visibility::Private => "private",
        Visibility::Protected => "protected",
        Visibility::Internal => "internal",
    }
}

fn visibility_from_str(s: &str) -> Visibility {
    match s {
        "private" => Visibility::Private,
        "protected" => Visibility::Protected,
        "internal" => Visibility::Internal,
        _ => Visibility::Public,
    }
}

fn branch_from_str(s: &str) -> Branch {
    if s == "branch" { Branch::Overlay } else { Branch::Base }
}

fn nodes_batch(rows: &[Node]) -> DevacResult<RecordBatch> {
    macro_rules! col {
        ($f:ident, $ty:ty) => {
            rows.iter().map(|r| r.$f.clone() as $ty).collect::<Vec<_>>()
        };
    }
    let entity_id = StringArray::from(rows.iter().map(|r| r.entity_id.as_str()).collect::<Vec<_>>());
    let name = StringArray::from(rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>());
    let qualified_name =
        StringArray::from(rows.iter().map(|r| r.qualified_name.as_str()).collect::<Vec<_>>());
    let kind = StringArray::from(rows.iter().map(|r| kind_as_str(r.kind)).collect::<Vec<_>>());
    let file_path = StringArray::from(rows.iter().map(|r| r.file_path.as_str()).collect::<Vec<_>>());
    let source_file_hash =
        StringArray::from(rows.iter().map(|r| r.source_file_hash.as_str()).collect::<Vec<_>>());
    let start_line = UInt32Array::from(col!(start_line, u32));
    let end_line = UInt32Array::from(col!(end_line, u32));
    let start_column = UInt32Array::from(col!(start_column, u32));
    let end_column = UInt32Array::from(col!(end_column, u32));
    let visibility = StringArray::from(rows.iter().map(|r| visibility_as_str(r.visibility)).collect::<Vec<_>>());
    let is_exported = BooleanArray::from(rows.iter().map(|r| r.flags.is_exported).collect::<Vec<_>>());
    let is_default_export =
        BooleanArray::from(rows.iter().map(|r| r.flags.is_default_export).collect::<Vec<_>>());
    let is_abstract = BooleanArray::from(rows.iter().map(|r| r.flags.is_abstract).collect::<Vec<_>>());
    let is_static = BooleanArray::from(rows.iter().map(|r| r.flags.is_static).collect::<Vec<_>>());
    let is_async = BooleanArray::from(rows.iter().map(|r| r.flags.is_async).collect::<Vec<_>>());
    let is_generator = BooleanArray::from(rows.iter().map(|r| r.flags.is_generator).collect::<Vec<_>>());
    let type_signature: StringArray = rows.iter().map(|r| r.type_signature.as_deref()).collect();
    let type_parameters_json = StringArray::from(
        rows.iter()
            .map(|r| serde_json::to_string(&r.type_parameters).unwrap_or_default())
            .collect::<Vec<_>>(),
    );
    let decorators_json = StringArray::from(
        rows.iter()
            .map(|r| serde_json::to_string(&r.decorators).unwrap_or_default())
            .collect::<Vec<_>>(),
    );
    let documentation: StringArray = rows.iter().map(|r| r.documentation.as_deref()).collect();
    let properties_json = StringArray::from(
        rows.iter()
            .map(|r| serde_json::to_string(&r.properties).unwrap_or_default())
            .collect::<Vec<_>>(),
    );
    let branch = StringArray::from(rows.iter().map(|r| r.branch.as_str()).collect::<Vec<_>>());

    RecordBatch::try_new(
        Arc::new(nodes_schema()),
        vec![
            Arc::new(entity_id) as ArrayRef,
            Arc::new(name),
            Arc::new(qualified_name),
            Arc::new(kind),
            Arc::new(file_path),
            Arc::new(source_file_hash),
            Arc::new(start_line),
            Arc::new(end_line),
            Arc::new(start_column),
            Arc::new(end_column),
            Arc::new(visibility),
            Arc::new(is_exported),
            Arc::new(is_default_export),
            Arc::new(is_abstract),
            Arc::new(is_static),
            Arc::new(is_async),
            Arc::new(is_generator),
            Arc::new(type_signature),
            Arc::new(type_parameters_json),
            Arc::new(decorators_json),
            Arc::new(documentation),
            Arc::new(properties_json),
            Arc::new(branch),
        ],
    )
    .map_err(|e| DevacError::InvariantViolation(format!("nodes batch build failed: {e}")))
}

fn read_nodes(path: &Path) -> DevacResult<Vec<Node>> {
    let mut out = Vec::new();
    for batch in read_batches(path)? {
        let col = |name: &str| batch.column(batch.schema().index_of(name).unwrap()).clone();
        let entity_id = col("entity_id");
        let entity_id = entity_id.as_any().downcast_ref::<StringArray>().unwrap();
        let name_c = col("name");
        let name_c = name_c.as_any().downcast_ref::<StringArray>().unwrap();
        let qualified_name = col("qualified_name");
        let qualified_name = qualified_name.as_any().downcast_ref::<StringArray>().unwrap();
        let kind = col("kind");
        let kind = kind.as_any().downcast_ref::<StringArray>().unwrap();
        let file_path = col("file_path");
        let file_path = file_path.as_any().downcast_ref::<StringArray>().unwrap();
        let source_file_hash = col("source_file_hash");
        let source_file_hash = source_file_hash.as_any().downcast_ref::<StringArray>().unwrap();
        let start_line = col("start_line");
        let start_line = start_line.as_any().downcast_ref::<UInt32Array>().unwrap();
        let end_line = col("end_line");
        let end_line = end_line.as_any().downcast_ref::<UInt32Array>().unwrap();
        let start_column = col("start_column");
        let start_column = start_column.as_any().downcast_ref::<UInt32Array>().unwrap();
        let end_column = col("end_column");
        let end_column = end_column.as_any().downcast_ref::<UInt32Array>().unwrap();
        let visibility = col("visibility");
        let visibility = visibility.as_any().downcast_ref::<StringArray>().unwrap();
        let is_exported = col("is_exported");
        let is_exported = is_exported.as_any().downcast_ref::<BooleanArray>().unwrap();
        let is_default_export = col("is_default_export");
        let is_default_export = is_default_export.as_any().downcast_ref::<BooleanArray>().unwrap();
        let is_abstract = col("is_abstract");
        let is_abstract = is_abstract.as_any().downcast_ref::<BooleanArray>().unwrap();
        let is_static = col("is_static");
        let is_static = is_static.as_any().downcast_ref::<BooleanArray>().unwrap();
        let is_async = col("is_async");
        let is_async = is_async.as_any().downcast_ref::<BooleanArray>().unwrap();
        let is_generator = col("is_generator");
        let is_generator = is_generator.as_any().downcast_ref::<BooleanArray>().unwrap();
        let type_signature = col("type_signature");
        let type_signature = type_signature.as_any().downcast_ref::<StringArray>().unwrap();
        let type_parameters_json = col("type_parameters_json");
        let type_parameters_json = type_parameters_json.as_any().downcast_ref::<StringArray>().unwrap();
        let decorators_json = col("decorators_json");
        let decorators_json = decorators_json.as_any().downcast_ref::<StringArray>().unwrap();
        let documentation = col("documentation");
        let documentation = documentation.as_any().downcast_ref::<StringArray>().unwrap();
        let properties_json = col("properties_json");
        let properties_json = properties_json.as_any().downcast_ref::<StringArray>().unwrap();
        let branch = col("branch");
        let branch = branch.as_any().downcast_ref::<StringArray>().unwrap();

        for i in 0..batch.num_rows() {
            out.push(Node {
                entity_id: entity_id.value(i).to_string(),
                name: name_c.value(i).to_string(),
                qualified_name: qualified_name.value(i).to_string(),
                kind: kind_from_str(kind.value(i)),
                file_path: file_path.value(i).to_string(),
                source_file_hash: source_file_hash.value(i).to_string(),
                start_line: start_line.value(i),
                end_line: end_line.value(i),
                start_column: start_column.value(i),
                end_column: end_column.value(i),
                visibility: visibility_from_str(visibility.value(i)),
                flags: NodeFlags {
                    is_exported: is_exported.value(i),
                    is_default_export: is_default_export.value(i),
                    is_abstract: is_abstract.value(i),
                    is_static: is_static.value(i),
                    is_async: is_async.value(i),
                    is_generator: is_generator.value(i),
                },
                type_signature: if type_signature.is_null(i) { None } else { Some(type_signature.value(i).to_string()) },
                type_parameters: serde_json::from_str(type_parameters_json.value(i)).unwrap_or_default(),
                decorators: serde_json::from_str(decorators_json.value(i)).unwrap_or_default(),
                documentation: if documentation.is_null(i) { None } else { Some(documentation.value(i).to_string()) },
                properties: serde_json::from_str(properties_json.value(i)).unwrap_or_default(),
                branch: branch_from_str(branch.value(i)),
            });
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------
// edges
// ---------------------------------------------------------------------

fn edges_schema() -> Schema {
    Schema::new(vec![
        Field::new("source_entity_id", DataType::Utf8, false),
        Field::new("target_entity_id", DataType::Utf8, false),
        Field::new("edge_type", DataType::Utf8, false),
        Field::new("source_file_path", DataType::Utf8, false),
        Field::new("source_file_hash", DataType::Utf8, false),
        Field::new("source_line", DataType::UInt32, false),
        Field::new("source_column", DataType::UInt32, false),
        Field::new("properties_json", DataType::Utf8, false),
        Field::new("branch", DataType::Utf8, false),
    ])
}

fn edge_type_as_str(t: EdgeType) -> &'static str {
    match t {
        EdgeType::Contains => "CONTAINS",
        EdgeType::Calls => "CALLS",
        EdgeType::Extends => "EXTENDS",
        EdgeType::Implements => "IMPLEMENTS",
        EdgeType::ParameterOf => "PARAMETER_OF",
        EdgeType::Decorates => "DECORATES",
    }
}

fn edge_type_from_str(s: &str) -> EdgeType {
    match s {
        "CALLS" => EdgeType::Calls,
        "EXTENDS" => EdgeType::Extends,
        "IMPLEMENTS" => EdgeType::Implements,
        "PARAMETER_OF" => EdgeType::ParameterOf,
        "DECORATES" => EdgeType::Decorates,
        _ => EdgeType::Contains,
    }
}

fn edges_batch(rows: &[Edge]) -> DevacResult<RecordBatch> {
    let source_entity_id =
        StringArray::from(rows.iter().map(|r| r.source_entity_id.as_str()).collect::<Vec<_>>());
    let target_entity_id =
        StringArray::from(rows.iter().map(|r| r.target_entity_id.as_str()).collect::<Vec<_>>());
    let edge_type = StringArray::from(rows.iter().map(|r| edge_type_as_str(r.edge_type)).collect::<Vec<_>>());
    let source_file_path =
        StringArray::from(rows.iter().map(|r| r.source_file_path.as_str()).collect::<Vec<_>>());
    let source_file_hash =
        StringArray::from(rows.iter().map(|r| r.source_file_hash.as_str()).collect::<Vec<_>>());
    let source_line = UInt32Array::from(rows.iter().map(|r| r.source_line).collect::<Vec<_>>());
    let source_column = UInt32Array::from(rows.iter().map(|r| r.source_column).collect::<Vec<_>>());
    let properties_json = StringArray::from(
        rows.iter()
            .map(|r| serde_json::to_string(&r.properties).unwrap_or_default())
            .collect::<Vec<_>>(),
    );
    let branch = StringArray::from(rows.iter().map(|r| r.branch.as_str()).collect::<Vec<_>>());

    RecordBatch::try_new(
        Arc::new(edges_schema()),
        vec![
            Arc::new(source_entity_id) as ArrayRef,
            Arc::new(target_entity_id),
            Arc::new(edge_type),
            Arc::new(source_file_path),
            Arc::new(source_file_hash),
            Arc::new(source_line),
            Arc::new(source_column),
            Arc::new(properties_json),
            Arc::new(branch),
        ],
    )
    .map_err(|e| DevacError::InvariantViolation(format!("edges batch build failed: {e}")))
}

fn read_edges(path: &Path) -> DevacResult<Vec<Edge>> {
    let mut out = Vec::new();
    for batch in read_batches(path)? {
        let col = |name: &str| batch.column(batch.schema().index_of(name).unwrap()).clone();
        let source_entity_id = col("source_entity_id");
        let source_entity_id = source_entity_id.as_any().downcast_ref::<StringArray>().unwrap();
        let target_entity_id = col("target_entity_id");
        let target_entity_id = target_entity_id.as_any().downcast_ref::<StringArray>().unwrap();
        let edge_type = col("edge_type");
        let edge_type = edge_type.as_any().downcast_ref::<StringArray>().unwrap();
        let source_file_path = col("source_file_path");
        let source_file_path = source_file_path.as_any().downcast_ref::<StringArray>().unwrap();
        let source_file_hash = col("source_file_hash");
        let source_file_hash = source_file_hash.as_any().downcast_ref::<StringArray>().unwrap();
        let source_line = col("source_line");
        let source_line = source_line.as_any().downcast_ref::<UInt32Array>().unwrap();
        let source_column = col("source_column");
        let source_column = source_column.as_any().downcast_ref::<UInt32Array>().unwrap();
        let properties_json = col("properties_json");
        let properties_json = properties_json.as_any().downcast_ref::<StringArray>().unwrap();
        let branch = col("branch");
        let branch = branch.as_any().downcast_ref::<StringArray>().unwrap();

        for i in 0..batch.num_rows() {
            out.push(Edge {
                source_entity_id: source_entity_id.value(i).to_string(),
                target_entity_id: target_entity_id.value(i).to_string(),
                edge_type: edge_type_from_str(edge_type.value(i)),
                source_file_path: source_file_path.value(i).to_string(),
                source_file_hash: source_file_hash.value(i).to_string(),
                source_line: source_line.value(i),
                source_column: source_column.value(i),
                properties: serde_json::from_str(properties_json.value(i)).unwrap_or_default(),
                branch: branch_from_str(branch.value(i)),
            });
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------
// external_refs
// ---------------------------------------------------------------------

fn external_refs_schema() -> Schema {
    Schema::new(vec![
        Field::new("source_entity_id", DataType::Utf8, false),
        Field::new("module_specifier", DataType::Utf8, false),
        Field::new("imported_symbol", DataType::Utf8, false),
        Field::new("local_alias", DataType::Utf8, true),
        Field::new("import_style", DataType::Utf8, false),
        Field::new("is_type_only", DataType::Boolean, false),
        Field::new("is_reexport", DataType::Boolean, false),
        Field::new("export_alias", DataType::Utf8, true),
    ])
}

fn import_style_as_str(s: ImportStyle) -> &'static str {
    match s {
        ImportStyle::Named => "named",
        ImportStyle::Default => "default",
        ImportStyle::Namespace => "namespace",
        ImportStyle::Dynamic => "dynamic",
        ImportStyle::SideEffect => "side_effect",
    }
}

fn import_style_from_str(s: &str) -> ImportStyle {
    match s {
        "default" => ImportStyle::Default,
        "namespace" => ImportStyle::Namespace,
        "dynamic" => ImportStyle::Dynamic,
        "side_effect" => ImportStyle::SideEffect,
        _ => ImportStyle::Named,
    }
}

fn external_refs_batch(rows: &[ExternalRef]) -> DevacResult<RecordBatch> {
    let source_entity_id =
        StringArray::from(rows.iter().map(|r| r.source_entity_id.as_str()).collect::<Vec<_>>());
    let module_specifier =
        StringArray::from(rows.iter().map(|r| r.module_specifier.as_str()).collect::<Vec<_>>());
    let imported_symbol =
        StringArray::from(rows.iter().map(|r| r.imported_symbol.as_str()).collect::<Vec<_>>());
    let local_alias: StringArray = rows.iter().map(|r| r.local_alias.as_deref()).collect();
    let import_style =
        StringArray::from(rows.iter().map(|r| import_style_as_str(r.import_style)).collect::<Vec<_>>());
    let is_type_only = BooleanArray::from(rows.iter().map(|r| r.is_type_only).collect::<Vec<_>>());
    let is_reexport = BooleanArray::from(rows.iter().map(|r| r.is_reexport).collect::<Vec<_>>());
    let export_alias: StringArray = rows.iter().map(|r| r.export_alias.as_deref()).collect();

    RecordBatch::try_new(
        Arc::new(external_refs_schema()),
        vec![
            Arc::new(source_entity_id) as ArrayRef,
            Arc::new(module_specifier),
            Arc::new(imported_symbol),
            Arc::new(local_alias),
            Arc::new(import_style),
            Arc::new(is_type_only),
            Arc::new(is_reexport),
            Arc::new(export_alias),
        ],
    )
    .map_err(|e| DevacError::InvariantViolation(format!("external_refs batch build failed: {e}")))
}

fn read_external_refs(path: &Path) -> DevacResult<Vec<ExternalRef>> {
    let mut out = Vec::new();
    for batch in read_batches(path)? {
        let col = |name: &str| batch.column(batch.schema().index_of(name).unwrap()).clone();
        let source_entity_id = col("source_entity_id");
        let source_entity_id = source_entity_id.as_any().downcast_ref::<StringArray>().unwrap();
        let module_specifier = col("module_specifier");
        let module_specifier = module_specifier.as_any().downcast_ref::<StringArray>().unwrap();
        let imported_symbol = col("imported_symbol");
        let imported_symbol = imported_symbol.as_any().downcast_ref::<StringArray>().unwrap();
        let local_alias = col("local_alias");
        let local_alias = local_alias.as_any().downcast_ref::<StringArray>().unwrap();
        let import_style = col("import_style");
        let import_style = import_style.as_any().downcast_ref::<StringArray>().unwrap();
        let is_type_only = col("is_type_only");
        let is_type_only = is_type_only.as_any().downcast_ref::<BooleanArray>().unwrap();
        let is_reexport = col("is_reexport");
        let is_reexport = is_reexport.as_any().downcast_ref::<BooleanArray>().unwrap();
        let export_alias = col("export_alias");
        let export_alias = export_alias.as_any().downcast_ref::<StringArray>().unwrap();

        for i in 0..batch.num_rows() {
            out.push(ExternalRef {
                source_entity_id: source_entity_id.value(i).to_string(),
                module_specifier: module_specifier.value(i).to_string(),
                imported_symbol: imported_symbol.value(i).to_string(),
                local_alias: if local_alias.is_null(i) { None } else { Some(local_alias.value(i).to_string()) },
                import_style: import_style_from_str(import_style.value(i)),
                is_type_only: is_type_only.value(i),
                is_reexport: is_reexport.value(i),
                export_alias: if export_alias.is_null(i) { None } else { Some(export_alias.value(i).to_string()) },
            });
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------
// effects
// ---------------------------------------------------------------------

fn effects_schema() -> Schema {
    Schema::new(vec![
        Field::new("source_entity_id", DataType::Utf8, false),
        Field::new("source_file_path", DataType::Utf8, false),
        Field::new("source_line", DataType::UInt32, false),
        Field::new("source_column", DataType::UInt32, false),
        Field::new("branch", DataType::Utf8, false),
        Field::new("effect_type", DataType::Utf8, false),
        Field::new("data_json", DataType::Utf8, false),
    ])
}

fn effect_type_as_str(t: EffectType) -> &'static str {
    match t {
        EffectType::FunctionCall => "function_call",
        EffectType::Request => "request",
        EffectType::Send => "send",
    }
}

fn effects_batch(rows: &[Effect]) -> DevacResult<RecordBatch> {
    let source_entity_id =
        StringArray::from(rows.iter().map(|r| r.source_entity_id.as_str()).collect::<Vec<_>>());
    let source_file_path =
        StringArray::from(rows.iter().map(|r| r.source_file_path.as_str()).collect::<Vec<_>>());
    let source_line = UInt32Array::from(rows.iter().map(|r| r.source_line).collect::<Vec<_>>());
    let source_column = UInt32Array::from(rows.iter().map(|r| r.source_column).collect::<Vec<_>>());
    let branch = StringArray::from(rows.iter().map(|r| r.branch.as_str()).collect::<Vec<_>>());
    let effect_type =
        StringArray::from(rows.iter().map(|r| effect_type_as_str(r.effect_type())).collect::<Vec<_>>());
    let data_json = StringArray::from(
        rows.iter()
            .map(|r| serde_json::to_string(&r.data).unwrap_or_default())
            .collect::<Vec<_>>(),
    );

    RecordBatch::try_new(
        Arc::new(effects_schema()),
        vec![
            Arc::new(source_entity_id) as ArrayRef,
            Arc::new(source_file_path),
            Arc::new(source_line),
            Arc::new(source_column),
            Arc::new(branch),
            Arc::new(effect_type),
            Arc::new(data_json),
        ],
    )
    .map_err(|e| DevacError::InvariantViolation(format!("effects batch build failed: {e}")))
}

fn read_effects(path: &Path) -> DevacResult<Vec<Effect>> {
    let mut out = Vec::new();
    for batch in read_batches(path)? {
        let col = |name: &str| batch.column(batch.schema().index_of(name).unwrap()).clone();
        let source_entity_id = col("source_entity_id");
        let source_entity_id = source_entity_id.as_any().downcast_ref::<StringArray>().unwrap();
        let source_file_path = col("source_file_path");
        let source_file_path = source_file_path.as_any().downcast_ref::<StringArray>().unwrap();
        let source_line = col("source_line");
        let source_line = source_line.as_any().downcast_ref::<UInt32Array>().unwrap();
        let source_column = col("source_column");
        let source_column = source_column.as_any().downcast_ref::<UInt32Array>().unwrap();
        let branch = col("branch");
        let branch = branch.as_any().downcast_ref::<StringArray>().unwrap();
        let data_json = col("data_json");
        let data_json = data_json.as_any().downcast_ref::<StringArray>().unwrap();

        for i in 0..batch.num_rows() {
            let data: EffectData = match serde_json::from_str(data_json.value(i)) {
                Ok(d) => d,
                Err(_) => continue,
            };
            out.push(Effect {
                source_entity_id: source_entity_id.value(i).to_string(),
                source_file_path: source_file_path.value(i).to_string(),
                source_line: source_line.value(i),
                source_column: source_column.value(i),
                branch: branch_from_str(branch.value(i)),
                data,
            });
        }
    }
    Ok(out)
}

// Silence "unused" for variant constructors only referenced through serde
// (kept so downstream crates can build effect data without re-deriving
// the shape themselves).
#[allow(dead_code)]
fn _effect_variants_are_constructible() -> [EffectData; 3] {
    [
        EffectData::FunctionCall(FunctionCallEffectData {
            callee_name: String::new(),
            callee_qualified_name: None,
            is_method: false,
            is_async: false,
            is_constructor: false,
            argument_count: 0,
            is_external: false,
            external_module: None,
        }),
        EffectData::Request(RequestEffectData {
            http_method: String::new(),
            route_pattern: String::new(),
            framework: String::new(),
        }),
        EffectData::Send(SendEffectData {
            kind: SendKind::Http,
            http_method: None,
            url_pattern: String::new(),
            is_third_party: false,
            target_service: None,
        }),
    ]
}

// ---------------------------------------------------------------------
// SQLite scratch database
// ---------------------------------------------------------------------

/// Loads `tables` into `conn` as four tables named `<table_prefix>nodes`,
/// `<table_prefix>edges`, `<table_prefix>external_refs`,
/// `<table_prefix>effects`. An empty prefix reproduces the bare table names
/// `SeedStore::query` runs single-package SQL against; a non-empty prefix
/// lets a caller (the federated query engine's hub mode, `spec.md` §4.G)
/// load several packages' tables side by side in one connection and union
/// them under the canonical names itself.
pub fn load_into_sqlite(conn: &Connection, tables: &SeedTables, table_prefix: &str) -> DevacResult<()> {
    let to_err = |e: rusqlite::Error| DevacError::InvariantViolation(format!("sqlite load failed: {e}"));
    let t = |name: &str| format!("{table_prefix}{name}");

    conn.execute_batch(&format!(
        "CREATE TABLE {nodes} (
            entity_id TEXT, name TEXT, qualified_name TEXT, kind TEXT, file_path TEXT,
            source_file_hash TEXT, start_line INTEGER, end_line INTEGER, start_column INTEGER,
            end_column INTEGER, visibility TEXT, is_exported INTEGER, is_default_export INTEGER,
            is_abstract INTEGER, is_static INTEGER, is_async INTEGER, is_generator INTEGER,
            type_signature TEXT, type_parameters_json TEXT, decorators_json TEXT,
            documentation TEXT, properties_json TEXT, branch TEXT
        );
        CREATE TABLE {edges} (
            source_entity_id TEXT, target_entity_id TEXT, edge_type TEXT, source_file_path TEXT,
            source_file_hash TEXT, source_line INTEGER, source_column INTEGER,
            properties_json TEXT, branch TEXT
        );
        CREATE TABLE {external_refs} (
            source_entity_id TEXT, module_specifier TEXT, imported_symbol TEXT, local_alias TEXT,
            import_style TEXT, is_type_only INTEGER, is_reexport INTEGER, export_alias TEXT
        );
        CREATE TABLE {effects} (
            source_entity_id TEXT, source_file_path TEXT, source_line INTEGER,
            source_column INTEGER, branch TEXT, effect_type TEXT, data_json TEXT
        );",
        nodes = t("nodes"),
        edges = t("edges"),
        external_refs = t("external_refs"),
        effects = t("effects"),
    ))
    .map_err(to_err)?;

    {
        let mut stmt = conn
            .prepare(&format!(
                "INSERT INTO {} VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23)",
                t("nodes"),
            ))
            .map_err(to_err)?;
        for n in &tables.nodes {
            stmt.execute(rusqlite::params![
                n.entity_id,
                n.name,
                n.qualified_name,
                kind_as_str(n.kind),
                n.file_path,
                n.source_file_hash,
                n.start_line,
                n.end_line,
                n.start_column,
                n.end_column,
                visibility_as_str(n.visibility),
                n.flags.is_exported,
                n.flags.is_default_export,
                n.flags.is_abstract,
                n.flags.is_static,
                n.flags.is_async,
                n.flags.is_generator,
                n.type_signature,
                serde_json::to_string(&n.type_parameters).unwrap_or_default(),
                serde_json::to_string(&n.decorators).unwrap_or_default(),
                n.documentation,
                serde_json::to_string(&n.properties).unwrap_or_default(),
                n.branch.as_str(),
            ])
            .map_err(to_err)?;
        }
    }

    {
        let mut stmt = conn
            .prepare(&format!("INSERT INTO {} VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)", t("edges")))
            .map_err(to_err)?;
        for e in &tables.edges {
            stmt.execute(rusqlite::params![
                e.source_entity_id,
                e.target_entity_id,
                edge_type_as_str(e.edge_type),
                e.source_file_path,
                e.source_file_hash,
                e.source_line,
                e.source_column,
                serde_json::to_string(&e.properties).unwrap_or_default(),
                e.branch.as_str(),
            ])
            .map_err(to_err)?;
        }
    }

    {
        let mut stmt = conn
            .prepare(&format!("INSERT INTO {} VALUES (?1,?2,?3,?4,?5,?6,?7,?8)", t("external_refs")))
            .map_err(to_err)?;
        for r in &tables.external_refs {
            stmt.execute(rusqlite::params![
                r.source_entity_id,
                r.module_specifier,
                r.imported_symbol,
                r.local_alias,
                import_style_as_str(r.import_style),
                r.is_type_only,
                r.is_reexport,
                r.export_alias,
            ])
            .map_err(to_err)?;
        }
    }

    {
        let mut stmt = conn
            .prepare(&format!("INSERT INTO {} VALUES (?1,?2,?3,?4,?5,?6,?7)", t("effects")))
            .map_err(to_err)?;
        for e in &tables.effects {
            stmt.execute(rusqlite::params![
                e.source_entity_id,
                e.source_file_path,
                e.source_line,
                e.source_column,
                e.branch.as_str(),
                effect_type_as_str(e.effect_type()),
                serde_json::to_string(&e.data).unwrap_or_default(),
            ])
            .map_err(to_err)?;
        }
    }

    Ok(())
}

/// Runs `sql` and converts every row into a JSON object keyed by column name.
pub fn run_sql(conn: &Connection, sql: &str) -> DevacResult<Vec<Map<String, Value>>> {
    let to_err = |e: rusqlite::Error| DevacError::InvariantViolation(format!("query failed: {e}"));
    let mut stmt = conn.prepare(sql).map_err(to_err)?;
    let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let mut rows = stmt.query([]).map_err(to_err)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(to_err)? {
        let mut obj = Map::new();
        for (i, name) in column_names.iter().enumerate() {
            let value = match row.get_ref(i).map_err(to_err)? {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(n) => Value::from(n),
                ValueRef::Real(f) => Value::from(f),
                ValueRef::Text(t) => Value::from(String::from_utf8_lossy(t).into_owned()),
                ValueRef::Blob(b) => Value::from(String::from_utf8_lossy(b).into_owned()),
            };
            obj.insert(name.clone(), value);
        }
        out.push(obj);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeFlags, NodeKind, Visibility};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample_node(entity_id: &str, name: &str, hash: &str) -> Node {
        Node {
            entity_id: entity_id.to_string(),
            name: name.to_string(),
            qualified_name: name.to_string(),
            kind: NodeKind::Function,
            file_path: "src/a.ts".to_string(),
            source_file_hash: hash.to_string(),
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

    #[test]
    fn write_then_read_round_trips_nodes() {
        let dir = TempDir::new().unwrap();
        let store = SeedStore::new(dir.path());
        let tables = SeedTables {
            nodes: vec![sample_node("e1", "foo", "h1"), sample_node("e2", "bar", "h1")],
            ..Default::default()
        };
        store.write(Branch::Base, &tables).unwrap();
        let back = store.read(Branch::Base).unwrap();
        assert_eq!(back.nodes.len(), 2);
        assert_eq!(back.nodes[0].name, "foo");
    }

    #[test]
    fn branch_overlay_supersedes_base_by_entity_id() {
        let dir = TempDir::new().unwrap();
        let store = SeedStore::new(dir.path());
        store
            .write(Branch::Base, &SeedTables { nodes: vec![sample_node("e1", "foo", "h1")], ..Default::default() })
            .unwrap();
        store
            .write(
                Branch::Overlay,
                &SeedTables { nodes: vec![sample_node("e1", "foo_renamed", "h2")], ..Default::default() },
            )
            .unwrap();
        let merged = store.read_merged().unwrap();
        assert_eq!(merged.nodes.len(), 1);
        assert_eq!(merged.nodes[0].name, "foo_renamed");
    }

    #[test]
    fn branch_tombstone_drops_the_node() {
        let dir = TempDir::new().unwrap();
        let store = SeedStore::new(dir.path());
        store
            .write(Branch::Base, &SeedTables { nodes: vec![sample_node("e1", "foo", "h1")], ..Default::default() })
            .unwrap();
        let mut tombstoned = sample_node("e1", "foo", "h1");
        tombstoned.properties.insert("__tombstone".to_string(), Value::Bool(true));
        store
            .write(Branch::Overlay, &SeedTables { nodes: vec![tombstoned], ..Default::default() })
            .unwrap();
        let merged = store.read_merged().unwrap();
        assert!(merged.nodes.is_empty());
    }

    #[test]
    fn missing_branch_overlay_falls_back_to_base() {
        let dir = TempDir::new().unwrap();
        let store = SeedStore::new(dir.path());
        store
            .write(Branch::Base, &SeedTables { nodes: vec![sample_node("e1", "foo", "h1")], ..Default::default() })
            .unwrap();
        let merged = store.read_merged().unwrap();
        assert_eq!(merged.nodes.len(), 1);
    }

    #[test]
    fn query_surface_runs_sql_over_merged_tables() {
        let dir = TempDir::new().unwrap();
        let store = SeedStore::new(dir.path());
        store
            .write(
                Branch::Base,
                &SeedTables {
                    nodes: vec![sample_node("e1", "foo", "h1"), sample_node("e2", "bar", "h1")],
                    ..Default::default()
                },
            )
            .unwrap();
        let rows = store.query("SELECT name FROM nodes ORDER BY name").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name").unwrap(), "bar");
    }

    #[test]
    fn prefixed_sqlite_load_keeps_packages_addressable_independently() {
        let conn = Connection::open_in_memory().unwrap();
        load_into_sqlite(&conn, &SeedTables { nodes: vec![sample_node("e1", "foo", "h1")], ..Default::default() }, "p0_").unwrap();
        load_into_sqlite(&conn, &SeedTables { nodes: vec![sample_node("e2", "bar", "h1")], ..Default::default() }, "p1_").unwrap();
        conn.execute_batch("CREATE VIEW nodes AS SELECT * FROM p0_nodes UNION ALL SELECT * FROM p1_nodes;").unwrap();
        let rows = run_sql(&conn, "SELECT name FROM nodes ORDER BY name").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name").unwrap(), "bar");
    }

    #[test]
    fn query_sql_rejects_non_select_is_enforced_by_caller() {
        // The seed store itself runs whatever SQL it's handed; SQL-safety
        // (SELECT-only) is the federated query engine's responsibility
        // (`spec.md` §4.G), not the seed store's. This test documents that
        // boundary: a DELETE would in fact execute here.
        let dir = TempDir::new().unwrap();
        let store = SeedStore::new(dir.path());
        store.write(Branch::Base, &SeedTables::default()).unwrap();
        assert!(store.query("SELECT 1").is_ok());
    }

    #[test]
    fn ingest_plan_separates_new_changed_and_unchanged_files() {
        let mut current = HashMap::new();
        current.insert(PathBuf::from("a.ts"), "h1".to_string());
        current.insert(PathBuf::from("b.ts"), "h2".to_string());
        let seed = SeedTables { nodes: vec![sample_node("e1", "foo", "h1")], ..Default::default() };
        let plan = IngestPlan::compute(&current, &seed);
        assert_eq!(plan.to_parse, vec![PathBuf::from("b.ts")]);
        assert_eq!(plan.unchanged, 1);
        assert!(plan.to_drop_hashes.is_empty());
    }

    #[test]
    fn ingest_plan_flags_hashes_that_disappeared() {
        let current = HashMap::new();
        let seed = SeedTables { nodes: vec![sample_node("e1", "foo", "h1")], ..Default::default() };
        let plan = IngestPlan::compute(&current, &seed);
        assert!(plan.to_drop_hashes.contains("h1"));
    }
}
