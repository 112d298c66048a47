//! Columnar table files: struct-of-arrays encoding with integrity checks.
//!
//! Each partition table (`nodes.col`, `edges.col`, `external_refs.col`)
//! holds its rows transposed into column vectors, postcard-encoded inside
//! a magic/kind/length envelope and zstd-compressed at rest. Any failure
//! to open or decode (bad magic, wrong table kind, length mismatch,
//! skewed columns) surfaces as `PartitionCorrupt`; a damaged table is
//! never silently read as empty.

use crate::error::{DevacError, Result};
use crate::types::{Edge, ExternalRef, Node};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Envelope magic bytes.
const MAGIC: &[u8; 5] = b"DVSD1";

/// Envelope header length: magic + kind byte + u64 payload length.
const HEADER_LEN: usize = MAGIC.len() + 1 + 8;

/// Zstd level for table files; matches interactive write latency needs.
const COMPRESSION_LEVEL: i32 = 3;

/// Table discriminant inside the envelope.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Nodes = 1,
    Edges = 2,
    ExternalRefs = 3,
}

impl TableKind {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(TableKind::Nodes),
            2 => Some(TableKind::Edges),
            3 => Some(TableKind::ExternalRefs),
            _ => None,
        }
    }
}

/// A row type with a columnar (struct-of-arrays) representation.
pub trait ColumnarTable: Sized {
    /// Envelope discriminant for this table.
    const KIND: TableKind;

    /// File name within a partition directory.
    const FILE_NAME: &'static str;

    /// The transposed representation.
    type Columns: Serialize + DeserializeOwned;

    /// Transposes rows into columns.
    fn to_columns(rows: Vec<Self>) -> Self::Columns;

    /// Reassembles rows, failing with a reason on column skew.
    fn from_columns(columns: Self::Columns) -> std::result::Result<Vec<Self>, String>;
}

/// Encodes rows into a compressed table file image.
pub fn encode<T: ColumnarTable>(rows: Vec<T>) -> Result<Vec<u8>> {
    let columns = T::to_columns(rows);
    let payload =
        postcard::to_allocvec(&columns).map_err(|e| DevacError::Serialization(e.to_string()))?;

    let mut canonical = Vec::with_capacity(HEADER_LEN + payload.len());
    canonical.extend_from_slice(MAGIC);
    canonical.push(T::KIND as u8);
    canonical.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    canonical.extend_from_slice(&payload);

    zstd::encode_all(canonical.as_slice(), COMPRESSION_LEVEL)
        .map_err(|e| DevacError::Compression(e.to_string()))
}

/// Decodes a table file image, verifying the envelope.
///
/// `path` is used for error context only.
pub fn decode<T: ColumnarTable>(bytes: &[u8], path: &Path) -> Result<Vec<T>> {
    let corrupt = |reason: String| DevacError::PartitionCorrupt {
        path: path.to_path_buf(),
        reason,
    };

    let canonical =
        zstd::decode_all(bytes).map_err(|e| corrupt(format!("decompression failed: {}", e)))?;

    if canonical.len() < HEADER_LEN {
        return Err(corrupt(format!(
            "file too small: {} bytes",
            canonical.len()
        )));
    }
    if &canonical[..MAGIC.len()] != MAGIC {
        return Err(corrupt("invalid magic bytes".to_string()));
    }

    let kind_byte = canonical[MAGIC.len()];
    match TableKind::from_byte(kind_byte) {
        Some(kind) if kind == T::KIND => {}
        Some(kind) => {
            return Err(corrupt(format!(
                "wrong table kind: expected {:?}, got {:?}",
                T::KIND,
                kind
            )))
        }
        None => return Err(corrupt(format!("unknown table kind byte: {}", kind_byte))),
    }

    let len_bytes: [u8; 8] = canonical[MAGIC.len() + 1..HEADER_LEN]
        .try_into()
        .map_err(|_| corrupt("unreadable length header".to_string()))?;
    let declared = u64::from_le_bytes(len_bytes) as usize;
    let payload = &canonical[HEADER_LEN..];
    if payload.len() != declared {
        return Err(corrupt(format!(
            "length mismatch: header says {}, got {}",
            declared,
            payload.len()
        )));
    }

    let columns: T::Columns =
        postcard::from_bytes(payload).map_err(|e| corrupt(format!("decode failed: {}", e)))?;

    T::from_columns(columns).map_err(corrupt)
}

fn take<T>(iter: &mut impl Iterator<Item = T>, column: &str) -> std::result::Result<T, String> {
    iter.next()
        .ok_or_else(|| format!("column '{}' ended early", column))
}

fn check_len(len: usize, actual: usize, column: &str) -> std::result::Result<(), String> {
    if actual != len {
        Err(format!(
            "column '{}' has {} rows, expected {}",
            column, actual, len
        ))
    } else {
        Ok(())
    }
}

/// Transposed node table.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NodeColumns {
    pub entity_id: Vec<String>,
    pub name: Vec<String>,
    pub qualified_name: Vec<String>,
    pub kind: Vec<String>,
    pub file_path: Vec<String>,
    pub start_line: Vec<u32>,
    pub end_line: Vec<u32>,
    pub start_column: Vec<u32>,
    pub end_column: Vec<u32>,
    pub language: Vec<String>,
    pub is_exported: Vec<bool>,
    pub is_default_export: Vec<bool>,
    pub is_async: Vec<bool>,
    pub is_generator: Vec<bool>,
    pub is_static: Vec<bool>,
    pub is_abstract: Vec<bool>,
    pub type_signature: Vec<Option<String>>,
    pub documentation: Vec<Option<String>>,
    pub decorators: Vec<Vec<String>>,
    pub type_parameters: Vec<Vec<String>>,
    pub branch: Vec<String>,
    pub is_deleted: Vec<bool>,
    pub updated_at: Vec<i64>,
    pub source_file_hash: Vec<String>,
}

impl ColumnarTable for Node {
    const KIND: TableKind = TableKind::Nodes;
    const FILE_NAME: &'static str = "nodes.col";
    type Columns = NodeColumns;

    fn to_columns(rows: Vec<Self>) -> NodeColumns {
        let mut c = NodeColumns::default();
        for row in rows {
            c.entity_id.push(row.entity_id);
            c.name.push(row.name);
            c.qualified_name.push(row.qualified_name);
            c.kind.push(row.kind);
            c.file_path.push(row.file_path);
            c.start_line.push(row.start_line);
            c.end_line.push(row.end_line);
            c.start_column.push(row.start_column);
            c.end_column.push(row.end_column);
            c.language.push(row.language);
            c.is_exported.push(row.is_exported);
            c.is_default_export.push(row.is_default_export);
            c.is_async.push(row.is_async);
            c.is_generator.push(row.is_generator);
            c.is_static.push(row.is_static);
            c.is_abstract.push(row.is_abstract);
            c.type_signature.push(row.type_signature);
            c.documentation.push(row.documentation);
            c.decorators.push(row.decorators);
            c.type_parameters.push(row.type_parameters);
            c.branch.push(row.branch);
            c.is_deleted.push(row.is_deleted);
            c.updated_at.push(row.updated_at);
            c.source_file_hash.push(row.source_file_hash);
        }
        c
    }

    fn from_columns(c: NodeColumns) -> std::result::Result<Vec<Self>, String> {
        let len = c.entity_id.len();
        check_len(len, c.name.len(), "name")?;
        check_len(len, c.qualified_name.len(), "qualified_name")?;
        check_len(len, c.kind.len(), "kind")?;
        check_len(len, c.file_path.len(), "file_path")?;
        check_len(len, c.start_line.len(), "start_line")?;
        check_len(len, c.end_line.len(), "end_line")?;
        check_len(len, c.start_column.len(), "start_column")?;
        check_len(len, c.end_column.len(), "end_column")?;
        check_len(len, c.language.len(), "language")?;
        check_len(len, c.is_exported.len(), "is_exported")?;
        check_len(len, c.is_default_export.len(), "is_default_export")?;
        check_len(len, c.is_async.len(), "is_async")?;
        check_len(len, c.is_generator.len(), "is_generator")?;
        check_len(len, c.is_static.len(), "is_static")?;
        check_len(len, c.is_abstract.len(), "is_abstract")?;
        check_len(len, c.type_signature.len(), "type_signature")?;
        check_len(len, c.documentation.len(), "documentation")?;
        check_len(len, c.decorators.len(), "decorators")?;
        check_len(len, c.type_parameters.len(), "type_parameters")?;
        check_len(len, c.branch.len(), "branch")?;
        check_len(len, c.is_deleted.len(), "is_deleted")?;
        check_len(len, c.updated_at.len(), "updated_at")?;
        check_len(len, c.source_file_hash.len(), "source_file_hash")?;

        let mut entity_id = c.entity_id.into_iter();
        let mut name = c.name.into_iter();
        let mut qualified_name = c.qualified_name.into_iter();
        let mut kind = c.kind.into_iter();
        let mut file_path = c.file_path.into_iter();
        let mut start_line = c.start_line.into_iter();
        let mut end_line = c.end_line.into_iter();
        let mut start_column = c.start_column.into_iter();
        let mut end_column = c.end_column.into_iter();
        let mut language = c.language.into_iter();
        let mut is_exported = c.is_exported.into_iter();
        let mut is_default_export = c.is_default_export.into_iter();
        let mut is_async = c.is_async.into_iter();
        let mut is_generator = c.is_generator.into_iter();
        let mut is_static = c.is_static.into_iter();
        let mut is_abstract = c.is_abstract.into_iter();
        let mut type_signature = c.type_signature.into_iter();
        let mut documentation = c.documentation.into_iter();
        let mut decorators = c.decorators.into_iter();
        let mut type_parameters = c.type_parameters.into_iter();
        let mut branch = c.branch.into_iter();
        let mut is_deleted = c.is_deleted.into_iter();
        let mut updated_at = c.updated_at.into_iter();
        let mut source_file_hash = c.source_file_hash.into_iter();

        let mut rows = Vec::with_capacity(len);
        for _ in 0..len {
            rows.push(Node {
                entity_id: take(&mut entity_id, "entity_id")?,
                name: take(&mut name, "name")?,
                qualified_name: take(&mut qualified_name, "qualified_name")?,
                kind: take(&mut kind, "kind")?,
                file_path: take(&mut file_path, "file_path")?,
                start_line: take(&mut start_line, "start_line")?,
                end_line: take(&mut end_line, "end_line")?,
                start_column: take(&mut start_column, "start_column")?,
                end_column: take(&mut end_column, "end_column")?,
                language: take(&mut language, "language")?,
                is_exported: take(&mut is_exported, "is_exported")?,
                is_default_export: take(&mut is_default_export, "is_default_export")?,
                is_async: take(&mut is_async, "is_async")?,
                is_generator: take(&mut is_generator, "is_generator")?,
                is_static: take(&mut is_static, "is_static")?,
                is_abstract: take(&mut is_abstract, "is_abstract")?,
                type_signature: take(&mut type_signature, "type_signature")?,
                documentation: take(&mut documentation, "documentation")?,
                decorators: take(&mut decorators, "decorators")?,
                type_parameters: take(&mut type_parameters, "type_parameters")?,
                branch: take(&mut branch, "branch")?,
                is_deleted: take(&mut is_deleted, "is_deleted")?,
                updated_at: take(&mut updated_at, "updated_at")?,
                source_file_hash: take(&mut source_file_hash, "source_file_hash")?,
            });
        }
        Ok(rows)
    }
}

/// Transposed edge table.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EdgeColumns {
    pub edge_id: Vec<String>,
    pub edge_type: Vec<String>,
    pub source_entity_id: Vec<String>,
    pub target_entity_id: Vec<String>,
    pub source_file_path: Vec<String>,
    pub line: Vec<u32>,
    pub column: Vec<u32>,
    pub properties: Vec<String>,
    pub branch: Vec<String>,
    pub is_deleted: Vec<bool>,
    pub updated_at: Vec<i64>,
}

impl ColumnarTable for Edge {
    const KIND: TableKind = TableKind::Edges;
    const FILE_NAME: &'static str = "edges.col";
    type Columns = EdgeColumns;

    fn to_columns(rows: Vec<Self>) -> EdgeColumns {
        let mut c = EdgeColumns::default();
        for row in rows {
            c.edge_id.push(row.edge_id);
            c.edge_type.push(row.edge_type);
            c.source_entity_id.push(row.source_entity_id);
            c.target_entity_id.push(row.target_entity_id);
            c.source_file_path.push(row.source_file_path);
            c.line.push(row.line);
            c.column.push(row.column);
            c.properties.push(row.properties);
            c.branch.push(row.branch);
            c.is_deleted.push(row.is_deleted);
            c.updated_at.push(row.updated_at);
        }
        c
    }

    fn from_columns(c: EdgeColumns) -> std::result::Result<Vec<Self>, String> {
        let len = c.edge_id.len();
        check_len(len, c.edge_type.len(), "edge_type")?;
        check_len(len, c.source_entity_id.len(), "source_entity_id")?;
        check_len(len, c.target_entity_id.len(), "target_entity_id")?;
        check_len(len, c.source_file_path.len(), "source_file_path")?;
        check_len(len, c.line.len(), "line")?;
        check_len(len, c.column.len(), "column")?;
        check_len(len, c.properties.len(), "properties")?;
        check_len(len, c.branch.len(), "branch")?;
        check_len(len, c.is_deleted.len(), "is_deleted")?;
        check_len(len, c.updated_at.len(), "updated_at")?;

        let mut edge_id = c.edge_id.into_iter();
        let mut edge_type = c.edge_type.into_iter();
        let mut source_entity_id = c.source_entity_id.into_iter();
        let mut target_entity_id = c.target_entity_id.into_iter();
        let mut source_file_path = c.source_file_path.into_iter();
        let mut line = c.line.into_iter();
        let mut column = c.column.into_iter();
        let mut properties = c.properties.into_iter();
        let mut branch = c.branch.into_iter();
        let mut is_deleted = c.is_deleted.into_iter();
        let mut updated_at = c.updated_at.into_iter();

        let mut rows = Vec::with_capacity(len);
        for _ in 0..len {
            rows.push(Edge {
                edge_id: take(&mut edge_id, "edge_id")?,
                edge_type: take(&mut edge_type, "edge_type")?,
                source_entity_id: take(&mut source_entity_id, "source_entity_id")?,
                target_entity_id: take(&mut target_entity_id, "target_entity_id")?,
                source_file_path: take(&mut source_file_path, "source_file_path")?,
                line: take(&mut line, "line")?,
                column: take(&mut column, "column")?,
                properties: take(&mut properties, "properties")?,
                branch: take(&mut branch, "branch")?,
                is_deleted: take(&mut is_deleted, "is_deleted")?,
                updated_at: take(&mut updated_at, "updated_at")?,
            });
        }
        Ok(rows)
    }
}

/// Transposed external-ref table.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ExternalRefColumns {
    pub source_entity_id: Vec<String>,
    pub module_specifier: Vec<String>,
    pub imported_symbol: Vec<String>,
    pub local_alias: Vec<Option<String>>,
    pub import_style: Vec<String>,
    pub is_type_only: Vec<bool>,
    pub source_file_path: Vec<String>,
    pub line: Vec<u32>,
    pub column: Vec<u32>,
    pub target_entity_id: Vec<Option<String>>,
    pub is_resolved: Vec<bool>,
    pub is_reexport: Vec<bool>,
    pub export_alias: Vec<Option<String>>,
    pub branch: Vec<String>,
    pub is_deleted: Vec<bool>,
    pub updated_at: Vec<i64>,
    pub source_file_hash: Vec<String>,
}

impl ColumnarTable for ExternalRef {
    const KIND: TableKind = TableKind::ExternalRefs;
    const FILE_NAME: &'static str = "external_refs.col";
    type Columns = ExternalRefColumns;

    fn to_columns(rows: Vec<Self>) -> ExternalRefColumns {
        let mut c = ExternalRefColumns::default();
        for row in rows {
            c.source_entity_id.push(row.source_entity_id);
            c.module_specifier.push(row.module_specifier);
            c.imported_symbol.push(row.imported_symbol);
            c.local_alias.push(row.local_alias);
            c.import_style.push(row.import_style);
            c.is_type_only.push(row.is_type_only);
            c.source_file_path.push(row.source_file_path);
            c.line.push(row.line);
            c.column.push(row.column);
            c.target_entity_id.push(row.target_entity_id);
            c.is_resolved.push(row.is_resolved);
            c.is_reexport.push(row.is_reexport);
            c.export_alias.push(row.export_alias);
            c.branch.push(row.branch);
            c.is_deleted.push(row.is_deleted);
            c.updated_at.push(row.updated_at);
            c.source_file_hash.push(row.source_file_hash);
        }
        c
    }

    fn from_columns(c: ExternalRefColumns) -> std::result::Result<Vec<Self>, String> {
        let len = c.source_entity_id.len();
        check_len(len, c.module_specifier.len(), "module_specifier")?;
        check_len(len, c.imported_symbol.len(), "imported_symbol")?;
        check_len(len, c.local_alias.len(), "local_alias")?;
        check_len(len, c.import_style.len(), "import_style")?;
        check_len(len, c.is_type_only.len(), "is_type_only")?;
        check_len(len, c.source_file_path.len(), "source_file_path")?;
        check_len(len, c.line.len(), "line")?;
        check_len(len, c.column.len(), "column")?;
        check_len(len, c.target_entity_id.len(), "target_entity_id")?;
        check_len(len, c.is_resolved.len(), "is_resolved")?;
        check_len(len, c.is_reexport.len(), "is_reexport")?;
        check_len(len, c.export_alias.len(), "export_alias")?;
        check_len(len, c.branch.len(), "branch")?;
        check_len(len, c.is_deleted.len(), "is_deleted")?;
        check_len(len, c.updated_at.len(), "updated_at")?;
        check_len(len, c.source_file_hash.len(), "source_file_hash")?;

        let mut source_entity_id = c.source_entity_id.into_iter();
        let mut module_specifier = c.module_specifier.into_iter();
        let mut imported_symbol = c.imported_symbol.into_iter();
        let mut local_alias = c.local_alias.into_iter();
        let mut import_style = c.import_style.into_iter();
        let mut is_type_only = c.is_type_only.into_iter();
        let mut source_file_path = c.source_file_path.into_iter();
        let mut line = c.line.into_iter();
        let mut column = c.column.into_iter();
        let mut target_entity_id = c.target_entity_id.into_iter();
        let mut is_resolved = c.is_resolved.into_iter();
        let mut is_reexport = c.is_reexport.into_iter();
        let mut export_alias = c.export_alias.into_iter();
        let mut branch = c.branch.into_iter();
        let mut is_deleted = c.is_deleted.into_iter();
        let mut updated_at = c.updated_at.into_iter();
        let mut source_file_hash = c.source_file_hash.into_iter();

        let mut rows = Vec::with_capacity(len);
        for _ in 0..len {
            rows.push(ExternalRef {
                source_entity_id: take(&mut source_entity_id, "source_entity_id")?,
                module_specifier: take(&mut module_specifier, "module_specifier")?,
                imported_symbol: take(&mut imported_symbol, "imported_symbol")?,
                local_alias: take(&mut local_alias, "local_alias")?,
                import_style: take(&mut import_style, "import_style")?,
                is_type_only: take(&mut is_type_only, "is_type_only")?,
                source_file_path: take(&mut source_file_path, "source_file_path")?,
                line: take(&mut line, "line")?,
                column: take(&mut column, "column")?,
                target_entity_id: take(&mut target_entity_id, "target_entity_id")?,
                is_resolved: take(&mut is_resolved, "is_resolved")?,
                is_reexport: take(&mut is_reexport, "is_reexport")?,
                export_alias: take(&mut export_alias, "export_alias")?,
                branch: take(&mut branch, "branch")?,
                is_deleted: take(&mut is_deleted, "is_deleted")?,
                updated_at: take(&mut updated_at, "updated_at")?,
                source_file_hash: take(&mut source_file_hash, "source_file_hash")?,
            });
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_node(id: &str) -> Node {
        Node {
            entity_id: id.to_string(),
            name: "foo".to_string(),
            qualified_name: "Svc.foo".to_string(),
            kind: "function".to_string(),
            file_path: "src/a.ts".to_string(),
            start_line: 1,
            end_line: 5,
            start_column: 0,
            end_column: 1,
            language: "typescript".to_string(),
            is_exported: true,
            is_default_export: false,
            is_async: true,
            is_generator: false,
            is_static: false,
            is_abstract: false,
            type_signature: Some("(x: number) => void".to_string()),
            documentation: None,
            decorators: vec!["memo".to_string()],
            type_parameters: vec![],
            branch: "base".to_string(),
            is_deleted: false,
            updated_at: 1_700_000_000,
            source_file_hash: "abc".to_string(),
        }
    }

    #[test]
    fn test_node_roundtrip() {
        let rows = vec![sample_node("a"), sample_node("b")];
        let bytes = encode(rows.clone()).unwrap();
        let back: Vec<Node> = decode(&bytes, &PathBuf::from("nodes.col")).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn test_empty_table_roundtrip() {
        let bytes = encode(Vec::<Edge>::new()).unwrap();
        let back: Vec<Edge> = decode(&bytes, &PathBuf::from("edges.col")).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let bytes = encode(vec![sample_node("a")]).unwrap();
        let result: Result<Vec<Node>> = decode(&bytes[..bytes.len() / 2], &PathBuf::from("n.col"));
        assert!(matches!(
            result,
            Err(DevacError::PartitionCorrupt { .. })
        ));
    }

    #[test]
    fn test_garbage_file_is_corrupt() {
        let result: Result<Vec<Node>> = decode(b"not a table", &PathBuf::from("n.col"));
        assert!(matches!(
            result,
            Err(DevacError::PartitionCorrupt { .. })
        ));
    }

    #[test]
    fn test_wrong_table_kind_is_corrupt() {
        let bytes = encode(vec![sample_node("a")]).unwrap();
        let result: Result<Vec<Edge>> = decode(&bytes, &PathBuf::from("edges.col"));
        match result {
            Err(DevacError::PartitionCorrupt { reason, .. }) => {
                assert!(reason.contains("kind"), "unexpected reason: {}", reason);
            }
            other => panic!("expected PartitionCorrupt, got {:?}", other),
        }
    }

    #[test]
    fn test_skewed_columns_are_corrupt() {
        let mut columns = NodeColumns::default();
        columns.entity_id.push("a".to_string());
        // Every other column left empty: row counts disagree.
        let payload = postcard::to_allocvec(&columns).unwrap();
        let mut canonical = Vec::new();
        canonical.extend_from_slice(MAGIC);
        canonical.push(TableKind::Nodes as u8);
        canonical.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        canonical.extend_from_slice(&payload);
        let bytes = zstd::encode_all(canonical.as_slice(), COMPRESSION_LEVEL).unwrap();

        let result: Result<Vec<Node>> = decode(&bytes, &PathBuf::from("n.col"));
        match result {
            Err(DevacError::PartitionCorrupt { reason, .. }) => {
                assert!(reason.contains("rows"), "unexpected reason: {}", reason);
            }
            other => panic!("expected PartitionCorrupt, got {:?}", other),
        }
    }

    #[test]
    fn test_length_header_mismatch_is_corrupt() {
        let bytes = encode(vec![sample_node("a")]).unwrap();
        let mut canonical = zstd::decode_all(bytes.as_slice()).unwrap();
        // Corrupt the declared payload length.
        canonical[MAGIC.len() + 1] ^= 0xff;
        let tampered = zstd::encode_all(canonical.as_slice(), COMPRESSION_LEVEL).unwrap();

        let result: Result<Vec<Node>> = decode(&tampered, &PathBuf::from("n.col"));
        assert!(matches!(
            result,
            Err(DevacError::PartitionCorrupt { .. })
        ));
    }
}
