//! Durable per-package seed storage: partitioned, locked, atomically
//! published.
//!
//! Layout per package:
//!
//! ```text
//! <package>/.devac/seed/
//!     meta.json                      schema version only
//!     base/{nodes,edges,external_refs}.col
//!     branch/{nodes,edges,external_refs}.col
//! ```
//!
//! `base` is the last full analysis of the default branch; `branch` is a
//! delta overlay. Writers serialize per partition through the advisory
//! lock in [`crate::lock`]; readers never lock. Publication is atomic
//! (write-then-rename), so a reader sees either the old or the new
//! partition, never a half-written one.

use crate::config::LockConfig;
use crate::error::{DevacError, Result};
use crate::lock;
use crate::table::{self, ColumnarTable};
use crate::types::{
    Edge, ExternalRef, GraphSlice, Node, ParsedFile, Partition, SeedState, SCHEMA_VERSION,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Branch label stored on base-partition rows.
const BASE_BRANCH: &str = "base";

/// Contents of `meta.json`.
#[derive(Debug, Serialize, Deserialize)]
struct SeedMeta {
    schema_version: String,
}

/// Outcome of a full or incremental analysis apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Parsed files handed to the store.
    pub files_received: usize,
    /// Files whose content hash differed from the stored one (or were new,
    /// or were forced).
    pub files_changed: usize,
    /// Files present in the previous base but absent from this full
    /// analysis. Always zero for incremental updates.
    pub files_removed: usize,
    pub changed_nodes: usize,
    pub changed_edges: usize,
    pub changed_refs: usize,
    /// Tombstone rows written for entities that disappeared on the branch.
    pub tombstones: usize,
    /// False when nothing changed and the partition was left untouched.
    pub wrote_partition: bool,
    /// Parser warnings, prefixed with their file path.
    pub warnings: Vec<String>,
}

/// Handle to one package's seed storage.
///
/// Constructed per package and passed explicitly; there is no ambient
/// store registry.
///
/// # Examples
///
/// ```no_run
/// use devac_core::{SeedStore, Partition};
///
/// let store = SeedStore::open("packages/api");
/// if store.partition_exists(Partition::Base) {
///     let merged = store.read_merged()?;
///     println!("{} symbols", merged.nodes.len());
/// }
/// # Ok::<(), devac_core::DevacError>(())
/// ```
pub struct SeedStore {
    package_root: PathBuf,
    lock_config: LockConfig,
}

impl SeedStore {
    /// Creates a handle for the package rooted at `package_root`.
    ///
    /// No I/O happens until a read or write is issued.
    pub fn open(package_root: impl AsRef<Path>) -> Self {
        Self {
            package_root: package_root.as_ref().to_path_buf(),
            lock_config: LockConfig::default(),
        }
    }

    /// Overrides lock timing (tests, impatient callers).
    pub fn with_lock_config(mut self, lock_config: LockConfig) -> Self {
        self.lock_config = lock_config;
        self
    }

    /// Package root this handle points at.
    pub fn package_root(&self) -> &Path {
        &self.package_root
    }

    /// `<package>/.devac/seed`.
    pub fn seed_dir(&self) -> PathBuf {
        self.package_root.join(".devac").join("seed")
    }

    /// Directory of one partition.
    pub fn partition_dir(&self, partition: Partition) -> PathBuf {
        self.seed_dir().join(partition.as_str())
    }

    /// Whether a partition has been published.
    pub fn partition_exists(&self, partition: Partition) -> bool {
        self.partition_dir(partition).join(Node::FILE_NAME).exists()
    }

    /// Which partitions exist on disk.
    pub fn seed_state(&self) -> SeedState {
        match (
            self.partition_exists(Partition::Base),
            self.partition_exists(Partition::Branch),
        ) {
            (false, false) => SeedState::None,
            (true, false) => SeedState::Base,
            (false, true) => SeedState::Delta,
            (true, true) => SeedState::Both,
        }
    }

    /// Newest modification time across all published table files, as unix
    /// seconds. `None` when nothing has been published.
    ///
    /// The hub compares this against registration time to flag stale
    /// registrations.
    pub fn seed_mtime_unix(&self) -> Option<i64> {
        let mut newest: Option<i64> = None;
        for partition in [Partition::Base, Partition::Branch] {
            let dir = self.partition_dir(partition);
            for name in [Node::FILE_NAME, Edge::FILE_NAME, ExternalRef::FILE_NAME] {
                if let Ok(meta) = fs::metadata(dir.join(name)) {
                    if let Ok(modified) = meta.modified() {
                        let unix = chrono::DateTime::<Utc>::from(modified).timestamp();
                        newest = Some(newest.map_or(unix, |n| n.max(unix)));
                    }
                }
            }
        }
        newest
    }

    /// Lock holder currently guarding a partition, if any.
    pub fn lock_holder(&self, partition: Partition) -> Option<lock::LockMarker> {
        lock::current_holder(&self.partition_dir(partition))
    }

    /// Removes a stale lock from a partition. See [`lock::force_unlock`].
    pub fn force_unlock(&self, partition: Partition) -> Result<bool> {
        let dir = self.partition_dir(partition);
        if !dir.exists() {
            return Ok(false);
        }
        lock::force_unlock(&dir, &self.lock_config)
    }

    /// Reads one partition. `Ok(None)` when it was never published.
    ///
    /// # Errors
    ///
    /// `PartitionCorrupt` when any table file is damaged or missing while
    /// its siblings exist.
    pub fn read_partition(&self, partition: Partition) -> Result<Option<GraphSlice>> {
        let dir = self.partition_dir(partition);
        if !dir.join(Node::FILE_NAME).exists() {
            // A published partition always has a nodes table; siblings
            // without it mean a torn layout.
            if dir.join(Edge::FILE_NAME).exists() || dir.join(ExternalRef::FILE_NAME).exists() {
                return Err(DevacError::PartitionCorrupt {
                    path: dir,
                    reason: "partition has table files but no nodes table".to_string(),
                });
            }
            return Ok(None);
        }

        self.check_schema()?;

        Ok(Some(GraphSlice {
            nodes: read_table::<Node>(&dir)?,
            edges: read_table::<Edge>(&dir)?,
            external_refs: read_table::<ExternalRef>(&dir)?,
        }))
    }

    /// Reads the merged view: base overlaid with the branch delta.
    ///
    /// A shared merge identity resolves to the branch copy; a branch
    /// tombstone excludes the identity entirely even when base still
    /// holds it. Reads take no lock.
    ///
    /// # Errors
    ///
    /// `NoSeeds` when the package has never been analyzed;
    /// `PartitionCorrupt` when either partition fails to decode.
    pub fn read_merged(&self) -> Result<GraphSlice> {
        let base = self.read_partition(Partition::Base)?;
        let branch = self.read_partition(Partition::Branch)?;

        if base.is_none() && branch.is_none() {
            return Err(DevacError::NoSeeds {
                package: self.package_root.clone(),
            });
        }

        let base = base.unwrap_or_default();
        let branch = branch.unwrap_or_default();

        let mut nodes: BTreeMap<String, Node> = base
            .nodes
            .into_iter()
            .map(|n| (n.entity_id.clone(), n))
            .collect();
        for node in branch.nodes {
            nodes.insert(node.entity_id.clone(), node);
        }

        let mut edges: BTreeMap<String, Edge> = base
            .edges
            .into_iter()
            .map(|e| (e.edge_id.clone(), e))
            .collect();
        for edge in branch.edges {
            edges.insert(edge.edge_id.clone(), edge);
        }

        let mut refs: BTreeMap<String, ExternalRef> = base
            .external_refs
            .into_iter()
            .map(|r| (r.merge_key(), r))
            .collect();
        for r in branch.external_refs {
            refs.insert(r.merge_key(), r);
        }

        let mut merged = GraphSlice {
            nodes: nodes.into_values().filter(|n| !n.is_deleted).collect(),
            edges: edges.into_values().filter(|e| !e.is_deleted).collect(),
            external_refs: refs.into_values().filter(|r| !r.is_deleted).collect(),
        };

        // Deterministic row order for every consumer.
        merged
            .nodes
            .sort_by(|a, b| (&a.file_path, a.start_line).cmp(&(&b.file_path, b.start_line)));
        merged.edges.sort_by(|a, b| a.edge_id.cmp(&b.edge_id));
        merged
            .external_refs
            .sort_by(|a, b| a.merge_key().cmp(&b.merge_key()));

        Ok(merged)
    }

    /// Rewrites one partition whole-file under its lock.
    ///
    /// Every table is written to a temp sibling, fsynced, then renamed
    /// into place; the lock is released on all exit paths.
    pub fn write_partition(&self, partition: Partition, slice: &GraphSlice) -> Result<()> {
        let dir = self.partition_dir(partition);
        fs::create_dir_all(&dir)?;

        let _guard = lock::acquire(&dir, &self.lock_config)?;

        write_file_atomic(
            &dir.join(Node::FILE_NAME),
            &table::encode(slice.nodes.clone())?,
        )?;
        write_file_atomic(
            &dir.join(Edge::FILE_NAME),
            &table::encode(slice.edges.clone())?,
        )?;
        write_file_atomic(
            &dir.join(ExternalRef::FILE_NAME),
            &table::encode(slice.external_refs.clone())?,
        )?;

        self.write_meta()?;

        debug!(
            partition = partition.as_str(),
            nodes = slice.nodes.len(),
            edges = slice.edges.len(),
            refs = slice.external_refs.len(),
            "published partition"
        );
        Ok(())
    }

    /// Applies a full analysis of the package to the base partition.
    ///
    /// `files` is the complete parse of the package: rows for files absent
    /// from it are dropped. Files whose content hash matches the stored
    /// one are carried forward untouched; when nothing at all changed the
    /// partition is not rewritten and the report shows zero changes.
    ///
    /// # Errors
    ///
    /// `InvalidRecord` when a file's edges are orphaned within that file;
    /// lock and storage errors propagate from the write.
    pub fn full_analysis(&self, files: &[ParsedFile]) -> Result<AnalysisReport> {
        for file in files {
            validate_parsed_file(file)?;
        }

        let now = Utc::now().timestamp();
        let existing = self.read_partition(Partition::Base)?.unwrap_or_default();
        let stored_hashes = file_hashes(&existing);

        let mut report = AnalysisReport {
            files_received: files.len(),
            ..Default::default()
        };

        let incoming_paths: BTreeSet<&str> = files.iter().map(|f| f.file_path.as_str()).collect();
        report.files_removed = stored_hashes
            .keys()
            .filter(|path| !incoming_paths.contains(path.as_str()))
            .count();

        let mut next = GraphSlice::default();

        // A full analysis defines the whole package: rows of files absent
        // from the input are dropped. Unchanged files keep their existing
        // rows so updated_at reflects real change.
        for file in files {
            report
                .warnings
                .extend(file.warnings.iter().map(|w| format!("{}: {}", file.file_path, w)));

            let unchanged = stored_hashes
                .get(&file.file_path)
                .is_some_and(|h| h == &file.source_file_hash);

            if unchanged {
                copy_file_rows(&existing, &file.file_path, &mut next);
                continue;
            }

            report.files_changed += 1;
            report.changed_nodes += file.nodes.len();
            report.changed_edges += file.edges.len();
            report.changed_refs += file.external_refs.len();
            append_file_rows(file, BASE_BRANCH, now, &mut next)?;
        }

        if report.files_changed == 0 && report.files_removed == 0 {
            debug!("full analysis found no changes; partition left untouched");
            return Ok(report);
        }

        self.write_partition(Partition::Base, &next)?;
        report.wrote_partition = true;
        Ok(report)
    }

    /// Overlays re-parsed files onto the branch partition.
    ///
    /// Entities that the base partition holds for a re-parsed file but the
    /// new parse does not are tombstoned. Files whose hash matches the
    /// merged stored hash are skipped unless `force` is set.
    pub fn incremental_update(
        &self,
        files: &[ParsedFile],
        branch: &str,
        force: bool,
    ) -> Result<AnalysisReport> {
        for file in files {
            validate_parsed_file(file)?;
        }

        let now = Utc::now().timestamp();
        let base = self.read_partition(Partition::Base)?.unwrap_or_default();
        let existing_branch = self.read_partition(Partition::Branch)?.unwrap_or_default();

        let mut stored_hashes = file_hashes(&base);
        // Branch rows shadow base rows for change detection too.
        for (path, hash) in file_hashes(&existing_branch) {
            stored_hashes.insert(path, hash);
        }

        let mut report = AnalysisReport {
            files_received: files.len(),
            ..Default::default()
        };

        let mut processed: BTreeSet<&str> = BTreeSet::new();
        let mut additions = GraphSlice::default();

        for file in files {
            report
                .warnings
                .extend(file.warnings.iter().map(|w| format!("{}: {}", file.file_path, w)));

            let unchanged = stored_hashes
                .get(&file.file_path)
                .is_some_and(|h| h == &file.source_file_hash);
            if unchanged && !force {
                continue;
            }

            processed.insert(file.file_path.as_str());
            report.files_changed += 1;
            report.changed_nodes += file.nodes.len();
            report.changed_edges += file.edges.len();
            report.changed_refs += file.external_refs.len();
            append_file_rows(file, branch, now, &mut additions)?;

            report.tombstones += tombstone_missing(&base, file, branch, now, &mut additions);
        }

        if processed.is_empty() {
            debug!("incremental update found no changes; branch partition left untouched");
            return Ok(report);
        }

        // Keep branch rows for files this update did not touch.
        let mut next = GraphSlice::default();
        for node in existing_branch.nodes {
            if !processed.contains(node.file_path.as_str()) {
                next.nodes.push(node);
            }
        }
        for edge in existing_branch.edges {
            if !processed.contains(edge.source_file_path.as_str()) {
                next.edges.push(edge);
            }
        }
        for r in existing_branch.external_refs {
            if !processed.contains(r.source_file_path.as_str()) {
                next.external_refs.push(r);
            }
        }
        next.nodes.extend(additions.nodes);
        next.edges.extend(additions.edges);
        next.external_refs.extend(additions.external_refs);

        self.write_partition(Partition::Branch, &next)?;
        report.wrote_partition = true;
        Ok(report)
    }

    /// Whether a file needs re-analysis given its current content hash.
    ///
    /// True for unknown files, changed hashes, and never-analyzed
    /// packages.
    pub fn needs_analysis(&self, file_path: &str, content_hash: &str) -> Result<bool> {
        let merged = match self.read_merged() {
            Ok(m) => m,
            Err(DevacError::NoSeeds { .. }) => return Ok(true),
            Err(e) => return Err(e),
        };
        Ok(file_hashes(&merged)
            .get(file_path)
            .map_or(true, |h| h != content_hash))
    }

    fn check_schema(&self) -> Result<()> {
        let path = self.seed_dir().join("meta.json");
        if !path.exists() {
            return Ok(());
        }
        let content = fs::read_to_string(&path)?;
        let meta: SeedMeta = serde_json::from_str(&content).map_err(|e| {
            DevacError::PartitionCorrupt {
                path: path.clone(),
                reason: format!("unreadable meta.json: {}", e),
            }
        })?;
        if meta.schema_version != SCHEMA_VERSION {
            return Err(DevacError::PartitionCorrupt {
                path,
                reason: format!(
                    "schema version mismatch: seed is {}, this build reads {}",
                    meta.schema_version, SCHEMA_VERSION
                ),
            });
        }
        Ok(())
    }

    fn write_meta(&self) -> Result<()> {
        let meta = SeedMeta {
            schema_version: SCHEMA_VERSION.to_string(),
        };
        let bytes = serde_json::to_vec_pretty(&meta)
            .map_err(|e| DevacError::Serialization(e.to_string()))?;
        write_file_atomic(&self.seed_dir().join("meta.json"), &bytes)
    }
}

fn read_table<T: ColumnarTable>(dir: &Path) -> Result<Vec<T>> {
    let path = dir.join(T::FILE_NAME);
    if !path.exists() {
        return Err(DevacError::PartitionCorrupt {
            path,
            reason: "table file missing".to_string(),
        });
    }
    let bytes = fs::read(&path)?;
    table::decode(&bytes, &path)
}

/// Atomic write: temp sibling + fsync + rename + parent fsync.
fn write_file_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        DevacError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("no parent directory for {}", path.display()),
        ))
    })?;
    fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("table");
    let tmp = path.with_file_name(format!("{}.tmp", file_name));

    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;

    #[cfg(unix)]
    {
        if let Ok(dir_file) = File::open(dir) {
            let _ = dir_file.sync_all();
        }
    }
    Ok(())
}

/// Same-file integrity: every edge's source entity must be a node the
/// file itself defines. Cross-file dangling targets are allowed.
fn validate_parsed_file(file: &ParsedFile) -> Result<()> {
    let ids: BTreeSet<&str> = file.nodes.iter().map(|n| n.entity_id.as_str()).collect();
    for edge in &file.edges {
        if !ids.contains(edge.source_entity_id.as_str()) {
            return Err(DevacError::InvalidRecord {
                file: file.file_path.clone(),
                reason: format!(
                    "{} edge to {} is orphaned: source {} is not defined in this file",
                    edge.edge_type, edge.target_entity_id, edge.source_entity_id
                ),
            });
        }
    }
    Ok(())
}

/// file_path -> source_file_hash over node and ref rows.
fn file_hashes(slice: &GraphSlice) -> BTreeMap<String, String> {
    let mut hashes = BTreeMap::new();
    for node in &slice.nodes {
        hashes
            .entry(node.file_path.clone())
            .or_insert_with(|| node.source_file_hash.clone());
    }
    for r in &slice.external_refs {
        hashes
            .entry(r.source_file_path.clone())
            .or_insert_with(|| r.source_file_hash.clone());
    }
    hashes
}

fn copy_file_rows(from: &GraphSlice, file_path: &str, into: &mut GraphSlice) {
    into.nodes
        .extend(from.nodes.iter().filter(|n| n.file_path == file_path).cloned());
    into.edges.extend(
        from.edges
            .iter()
            .filter(|e| e.source_file_path == file_path)
            .cloned(),
    );
    into.external_refs.extend(
        from.external_refs
            .iter()
            .filter(|r| r.source_file_path == file_path)
            .cloned(),
    );
}

fn append_file_rows(
    file: &ParsedFile,
    branch: &str,
    now: i64,
    into: &mut GraphSlice,
) -> Result<()> {
    for node in &file.nodes {
        into.nodes.push(node.clone().into_row(
            &file.file_path,
            branch,
            &file.source_file_hash,
            now,
        ));
    }
    for edge in &file.edges {
        into.edges
            .push(edge.clone().into_row(&file.file_path, branch, now)?);
    }
    for r in &file.external_refs {
        into.external_refs.push(r.clone().into_row(
            &file.file_path,
            branch,
            &file.source_file_hash,
            now,
        ));
    }
    Ok(())
}

/// Tombstones base rows of `file` that the new parse no longer produces.
/// Returns the number of tombstones written.
fn tombstone_missing(
    base: &GraphSlice,
    file: &ParsedFile,
    branch: &str,
    now: i64,
    into: &mut GraphSlice,
) -> usize {
    let mut count = 0;

    let new_nodes: BTreeSet<&str> = file.nodes.iter().map(|n| n.entity_id.as_str()).collect();
    for node in base
        .nodes
        .iter()
        .filter(|n| n.file_path == file.file_path && !new_nodes.contains(n.entity_id.as_str()))
    {
        let mut tomb = node.clone();
        tomb.branch = branch.to_string();
        tomb.is_deleted = true;
        tomb.updated_at = now;
        into.nodes.push(tomb);
        count += 1;
    }

    let new_edges: BTreeSet<String> = file
        .edges
        .iter()
        .map(|e| {
            format!(
                "{}:{}:{}",
                e.edge_type, e.source_entity_id, e.target_entity_id
            )
        })
        .collect();
    for edge in base
        .edges
        .iter()
        .filter(|e| e.source_file_path == file.file_path && !new_edges.contains(&e.edge_id))
    {
        let mut tomb = edge.clone();
        tomb.branch = branch.to_string();
        tomb.is_deleted = true;
        tomb.updated_at = now;
        into.edges.push(tomb);
        count += 1;
    }

    let new_refs: BTreeSet<String> = file
        .external_refs
        .iter()
        .map(|r| {
            format!(
                "{}|{}|{}",
                r.source_entity_id, r.module_specifier, r.imported_symbol
            )
        })
        .collect();
    for r in base
        .external_refs
        .iter()
        .filter(|r| r.source_file_path == file.file_path && !new_refs.contains(&r.merge_key()))
    {
        let mut tomb = r.clone();
        tomb.branch = branch.to_string();
        tomb.is_deleted = true;
        tomb.updated_at = now;
        into.external_refs.push(tomb);
        count += 1;
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EdgeRecord, ExternalRefRecord, NodeRecord};
    use tempfile::TempDir;

    fn node_record(id: &str, name: &str) -> NodeRecord {
        NodeRecord {
            entity_id: id.to_string(),
            name: name.to_string(),
            qualified_name: String::new(),
            kind: "function".to_string(),
            start_line: 1,
            end_line: 3,
            start_column: 0,
            end_column: 1,
            language: "typescript".to_string(),
            is_exported: true,
            is_default_export: false,
            is_async: false,
            is_generator: false,
            is_static: false,
            is_abstract: false,
            type_signature: None,
            documentation: None,
            decorators: vec![],
            type_parameters: vec![],
        }
    }

    fn edge_record(edge_type: &str, source: &str, target: &str) -> EdgeRecord {
        EdgeRecord {
            edge_type: edge_type.to_string(),
            source_entity_id: source.to_string(),
            target_entity_id: target.to_string(),
            line: 2,
            column: 4,
            properties: serde_json::Map::new(),
        }
    }

    fn ref_record(source: &str, module: &str, symbol: &str) -> ExternalRefRecord {
        ExternalRefRecord {
            source_entity_id: source.to_string(),
            module_specifier: module.to_string(),
            imported_symbol: symbol.to_string(),
            local_alias: None,
            import_style: "named".to_string(),
            is_type_only: false,
            is_reexport: false,
            export_alias: None,
            line: 1,
            column: 0,
        }
    }

    fn parsed(file: &str, hash: &str, nodes: Vec<NodeRecord>, edges: Vec<EdgeRecord>) -> ParsedFile {
        ParsedFile {
            file_path: file.to_string(),
            source_file_hash: hash.to_string(),
            nodes,
            edges,
            external_refs: vec![],
            warnings: vec![],
        }
    }

    #[test]
    fn test_full_analysis_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = SeedStore::open(tmp.path());

        let files = vec![parsed(
            "src/a.ts",
            "h1",
            vec![node_record("e:foo", "foo"), node_record("e:bar", "bar")],
            vec![edge_record("CALLS", "e:bar", "e:foo")],
        )];
        let report = store.full_analysis(&files).unwrap();
        assert!(report.wrote_partition);
        assert_eq!(report.files_changed, 1);
        assert_eq!(report.changed_nodes, 2);
        assert_eq!(report.changed_edges, 1);

        assert_eq!(store.seed_state(), SeedState::Base);
        let merged = store.read_merged().unwrap();
        assert_eq!(merged.nodes.len(), 2);
        assert_eq!(merged.edges.len(), 1);
        assert_eq!(merged.nodes[0].branch, "base");
    }

    #[test]
    fn test_unchanged_rerun_reports_zero_and_skips_rewrite() {
        let tmp = TempDir::new().unwrap();
        let store = SeedStore::open(tmp.path());

        let files = vec![parsed(
            "src/a.ts",
            "h1",
            vec![node_record("e:foo", "foo")],
            vec![],
        )];
        store.full_analysis(&files).unwrap();

        let report = store.full_analysis(&files).unwrap();
        assert!(!report.wrote_partition);
        assert_eq!(report.files_changed, 0);
        assert_eq!(report.changed_nodes, 0);
        assert_eq!(report.changed_edges, 0);
        assert_eq!(report.changed_refs, 0);
    }

    #[test]
    fn test_changed_hash_triggers_rewrite() {
        let tmp = TempDir::new().unwrap();
        let store = SeedStore::open(tmp.path());

        store
            .full_analysis(&[parsed(
                "src/a.ts",
                "h1",
                vec![node_record("e:foo", "foo")],
                vec![],
            )])
            .unwrap();

        let report = store
            .full_analysis(&[parsed(
                "src/a.ts",
                "h2",
                vec![node_record("e:foo", "foo"), node_record("e:baz", "baz")],
                vec![],
            )])
            .unwrap();
        assert!(report.wrote_partition);
        assert_eq!(report.changed_nodes, 2);
        assert_eq!(store.read_merged().unwrap().nodes.len(), 2);
    }

    #[test]
    fn test_full_analysis_drops_files_missing_from_input() {
        let tmp = TempDir::new().unwrap();
        let store = SeedStore::open(tmp.path());

        store
            .full_analysis(&[
                parsed("src/a.ts", "h1", vec![node_record("e:a", "a")], vec![]),
                parsed("src/b.ts", "h2", vec![node_record("e:b", "b")], vec![]),
            ])
            .unwrap();

        let report = store
            .full_analysis(&[parsed(
                "src/a.ts",
                "h1",
                vec![node_record("e:a", "a")],
                vec![],
            )])
            .unwrap();
        assert_eq!(report.files_removed, 1);
        assert!(report.wrote_partition);

        let merged = store.read_merged().unwrap();
        assert_eq!(merged.nodes.len(), 1);
        assert_eq!(merged.nodes[0].entity_id, "e:a");
    }

    #[test]
    fn test_branch_row_shadows_base_row() {
        let tmp = TempDir::new().unwrap();
        let store = SeedStore::open(tmp.path());

        store
            .full_analysis(&[parsed(
                "src/a.ts",
                "h1",
                vec![node_record("e:foo", "foo")],
                vec![],
            )])
            .unwrap();

        let mut renamed = node_record("e:foo", "foo");
        renamed.documentation = Some("branch copy".to_string());
        store
            .incremental_update(
                &[parsed("src/a.ts", "h2", vec![renamed], vec![])],
                "feature-x",
                false,
            )
            .unwrap();

        assert_eq!(store.seed_state(), SeedState::Both);
        let merged = store.read_merged().unwrap();
        assert_eq!(merged.nodes.len(), 1);
        assert_eq!(merged.nodes[0].branch, "feature-x");
        assert_eq!(
            merged.nodes[0].documentation.as_deref(),
            Some("branch copy")
        );
    }

    #[test]
    fn test_branch_tombstone_suppresses_base_row() {
        let tmp = TempDir::new().unwrap();
        let store = SeedStore::open(tmp.path());

        store
            .full_analysis(&[parsed(
                "src/a.ts",
                "h1",
                vec![node_record("e:foo", "foo"), node_record("e:bar", "bar")],
                vec![],
            )])
            .unwrap();

        // Re-parse drops `bar`.
        let report = store
            .incremental_update(
                &[parsed(
                    "src/a.ts",
                    "h2",
                    vec![node_record("e:foo", "foo")],
                    vec![],
                )],
                "feature-x",
                false,
            )
            .unwrap();
        assert_eq!(report.tombstones, 1);

        let merged = store.read_merged().unwrap();
        assert_eq!(merged.nodes.len(), 1);
        assert_eq!(merged.nodes[0].entity_id, "e:foo");

        // The base partition still physically holds both rows.
        let base = store.read_partition(Partition::Base).unwrap().unwrap();
        assert_eq!(base.nodes.len(), 2);
    }

    #[test]
    fn test_branch_only_package_reports_delta() {
        let tmp = TempDir::new().unwrap();
        let store = SeedStore::open(tmp.path());

        store
            .incremental_update(
                &[parsed(
                    "src/a.ts",
                    "h1",
                    vec![node_record("e:a", "a")],
                    vec![],
                )],
                "feature-x",
                false,
            )
            .unwrap();

        assert_eq!(store.seed_state(), SeedState::Delta);
        assert_eq!(store.read_merged().unwrap().nodes.len(), 1);
    }

    #[test]
    fn test_incremental_skips_unchanged_unless_forced() {
        let tmp = TempDir::new().unwrap();
        let store = SeedStore::open(tmp.path());

        let file = parsed("src/a.ts", "h1", vec![node_record("e:a", "a")], vec![]);
        store.full_analysis(&[file.clone()]).unwrap();

        let report = store
            .incremental_update(&[file.clone()], "feature-x", false)
            .unwrap();
        assert!(!report.wrote_partition);
        assert_eq!(store.seed_state(), SeedState::Base);

        let report = store.incremental_update(&[file], "feature-x", true).unwrap();
        assert!(report.wrote_partition);
        assert_eq!(store.seed_state(), SeedState::Both);
    }

    #[test]
    fn test_same_file_orphan_edge_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = SeedStore::open(tmp.path());

        let files = vec![parsed(
            "src/a.ts",
            "h1",
            vec![node_record("e:foo", "foo")],
            // Source entity is not defined in this file.
            vec![edge_record("CALLS", "e:ghost", "e:foo")],
        )];
        let err = store.full_analysis(&files).unwrap_err();
        assert!(matches!(err, DevacError::InvalidRecord { .. }));
        assert_eq!(store.seed_state(), SeedState::None);
    }

    #[test]
    fn test_cross_file_dangling_target_is_allowed() {
        let tmp = TempDir::new().unwrap();
        let store = SeedStore::open(tmp.path());

        let files = vec![parsed(
            "src/a.ts",
            "h1",
            vec![node_record("e:foo", "foo")],
            vec![edge_record("CALLS", "e:foo", "unresolved:somewhereElse")],
        )];
        assert!(store.full_analysis(&files).is_ok());
    }

    #[test]
    fn test_read_merged_without_seeds_is_no_seeds() {
        let tmp = TempDir::new().unwrap();
        let store = SeedStore::open(tmp.path());
        assert!(matches!(
            store.read_merged(),
            Err(DevacError::NoSeeds { .. })
        ));
    }

    #[test]
    fn test_corrupt_table_surfaces_partition_corrupt() {
        let tmp = TempDir::new().unwrap();
        let store = SeedStore::open(tmp.path());

        store
            .full_analysis(&[parsed(
                "src/a.ts",
                "h1",
                vec![node_record("e:a", "a")],
                vec![],
            )])
            .unwrap();

        fs::write(
            store.partition_dir(Partition::Base).join(Node::FILE_NAME),
            b"scribbled over",
        )
        .unwrap();

        assert!(matches!(
            store.read_merged(),
            Err(DevacError::PartitionCorrupt { .. })
        ));
    }

    #[test]
    fn test_write_leaves_no_lock_marker() {
        let tmp = TempDir::new().unwrap();
        let store = SeedStore::open(tmp.path());
        store
            .full_analysis(&[parsed(
                "src/a.ts",
                "h1",
                vec![node_record("e:a", "a")],
                vec![],
            )])
            .unwrap();
        assert!(store.lock_holder(Partition::Base).is_none());
    }

    #[test]
    fn test_contended_partition_times_out() {
        let tmp = TempDir::new().unwrap();
        let store = SeedStore::open(tmp.path()).with_lock_config(LockConfig {
            timeout_ms: 150,
            initial_delay_ms: 10,
            max_delay_ms: 40,
            stale_after_secs: 3600,
        });

        let base_dir = store.partition_dir(Partition::Base);
        fs::create_dir_all(&base_dir).unwrap();
        let _held = lock::acquire(&base_dir, &LockConfig::default()).unwrap();

        let err = store
            .full_analysis(&[parsed(
                "src/a.ts",
                "h1",
                vec![node_record("e:a", "a")],
                vec![],
            )])
            .unwrap_err();
        assert!(matches!(err, DevacError::LockTimeout { .. }));
    }

    #[test]
    fn test_needs_analysis() {
        let tmp = TempDir::new().unwrap();
        let store = SeedStore::open(tmp.path());
        assert!(store.needs_analysis("src/a.ts", "h1").unwrap());

        store
            .full_analysis(&[parsed(
                "src/a.ts",
                "h1",
                vec![node_record("e:a", "a")],
                vec![],
            )])
            .unwrap();
        assert!(!store.needs_analysis("src/a.ts", "h1").unwrap());
        assert!(store.needs_analysis("src/a.ts", "h2").unwrap());
        assert!(store.needs_analysis("src/new.ts", "h1").unwrap());
    }

    #[test]
    fn test_meta_holds_schema_version_only() {
        let tmp = TempDir::new().unwrap();
        let store = SeedStore::open(tmp.path());
        store
            .full_analysis(&[parsed(
                "src/a.ts",
                "h1",
                vec![node_record("e:a", "a")],
                vec![],
            )])
            .unwrap();

        let meta: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(store.seed_dir().join("meta.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(meta["schema_version"], SCHEMA_VERSION);
        assert_eq!(meta.as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_external_refs_survive_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = SeedStore::open(tmp.path());

        let mut file = parsed("src/a.ts", "h1", vec![node_record("e:a", "a")], vec![]);
        file.external_refs = vec![ref_record("e:a", "react", "useState")];
        store.full_analysis(&[file]).unwrap();

        let merged = store.read_merged().unwrap();
        assert_eq!(merged.external_refs.len(), 1);
        let r = &merged.external_refs[0];
        assert_eq!(r.module_specifier, "react");
        assert!(!r.is_resolved);
        assert!(r.target_entity_id.is_none());
    }
}
