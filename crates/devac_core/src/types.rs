//! Core data types: graph rows, the parser record contract, and seed metadata.

use crate::error::{DevacError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Schema version written to `meta.json`. Bump on any columnar layout change.
pub const SCHEMA_VERSION: &str = "1";

/// One of the two independently lockable partitions of a package's seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Partition {
    /// Full snapshot from the last complete analysis of the default branch.
    Base,
    /// Delta overlay for the working branch.
    Branch,
}

impl Partition {
    /// Directory name under `.devac/seed/`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Base => "base",
            Partition::Branch => "branch",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which partitions exist on disk for a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeedState {
    /// Never analyzed.
    None,
    /// Base snapshot only.
    Base,
    /// Branch delta only (base was never built on this checkout).
    Delta,
    /// Base snapshot plus branch delta.
    Both,
}

impl SeedState {
    /// Stable lowercase label used in the hub registry and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            SeedState::None => "none",
            SeedState::Base => "base",
            SeedState::Delta => "delta",
            SeedState::Both => "both",
        }
    }
}

impl fmt::Display for SeedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A symbol row as persisted in a seed partition.
///
/// `entity_id` is a pure function of (repo, package, kind, scoped name),
/// see [`crate::scope`], so edits that do not rename or re-parent a symbol
/// keep its identity across analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable scope-derived identifier.
    pub entity_id: String,
    /// Unqualified symbol name.
    pub name: String,
    /// Scope-qualified display name (`Parent.name`).
    pub qualified_name: String,
    /// Symbol kind (`function`, `class`, `method`, `variable`, ...).
    pub kind: String,
    /// Package-relative path of the defining file.
    pub file_path: String,
    /// 1-based line where the definition starts.
    pub start_line: u32,
    /// 1-based line where the definition ends.
    pub end_line: u32,
    /// 0-based column where the definition starts.
    pub start_column: u32,
    /// 0-based column where the definition ends.
    pub end_column: u32,
    /// Source language the parser reported.
    pub language: String,
    /// Whether the symbol is visible outside its module.
    pub is_exported: bool,
    /// Whether this is the module's default export.
    pub is_default_export: bool,
    pub is_async: bool,
    pub is_generator: bool,
    pub is_static: bool,
    pub is_abstract: bool,
    /// Declared or inferred type signature, if the parser produced one.
    pub type_signature: Option<String>,
    /// Attached documentation (docstring / doc comment).
    pub documentation: Option<String>,
    /// Decorator / attribute names applied to the symbol.
    pub decorators: Vec<String>,
    /// Generic type parameter names.
    pub type_parameters: Vec<String>,
    /// Branch the row belongs to (`base` for the base snapshot).
    pub branch: String,
    /// Tombstone flag: the entity was removed on this branch.
    pub is_deleted: bool,
    /// Unix seconds of the analysis that produced the row.
    pub updated_at: i64,
    /// Content hash of the source file the row came from.
    pub source_file_hash: String,
}

/// A relationship row as persisted in a seed partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Merge identity: `{edge_type}:{source_entity_id}:{target_entity_id}`.
    pub edge_id: String,
    /// Relationship kind (`CALLS`, `IMPORTS`, `EXTENDS`, ...). Open set.
    pub edge_type: String,
    pub source_entity_id: String,
    /// Target entity. May dangle across files; never within the source file.
    pub target_entity_id: String,
    /// File the edge was observed in (the source entity's file).
    pub source_file_path: String,
    /// 1-based line of the referencing expression.
    pub line: u32,
    /// 0-based column of the referencing expression.
    pub column: u32,
    /// Open property map, stored as canonical JSON text. Interpreted lazily
    /// via [`Edge::property_map`]; never validated at ingest so new edge
    /// kinds are not blocked at write time.
    pub properties: String,
    pub branch: String,
    pub is_deleted: bool,
    pub updated_at: i64,
}

impl Edge {
    /// Parses the open property map.
    ///
    /// The minimal interpreted subset is `target_name` (display name of an
    /// unresolved target); everything else is consumer-defined.
    ///
    /// # Errors
    ///
    /// Returns `Deserialization` if the stored text is not a JSON object.
    pub fn property_map(&self) -> Result<BTreeMap<String, serde_json::Value>> {
        if self.properties.is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&self.properties)
            .map_err(|e| DevacError::Deserialization(format!("edge {}: {}", self.edge_id, e)))
    }
}

/// An unresolved import row as persisted in a seed partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalRef {
    /// Entity that contains the import (usually the module entity).
    pub source_entity_id: String,
    /// Module specifier as written (`react`, `./util`, `..pkg.mod`).
    pub module_specifier: String,
    /// Imported symbol name (`*` for namespace imports).
    pub imported_symbol: String,
    /// Local alias when renamed at the import site.
    pub local_alias: Option<String>,
    /// Import style (`named`, `default`, `namespace`, `side-effect`).
    pub import_style: String,
    /// Type-only import (erased at runtime).
    pub is_type_only: bool,
    /// File the import was observed in.
    pub source_file_path: String,
    /// 1-based line of the import statement.
    pub line: u32,
    /// 0-based column of the import statement.
    pub column: u32,
    /// Resolved target entity, once resolution has run.
    pub target_entity_id: Option<String>,
    pub is_resolved: bool,
    /// Re-export (`export ... from ...`) rather than plain import.
    pub is_reexport: bool,
    /// Exported-as name for re-exports.
    pub export_alias: Option<String>,
    pub branch: String,
    pub is_deleted: bool,
    pub updated_at: i64,
    pub source_file_hash: String,
}

impl ExternalRef {
    /// Merge identity used for branch shadowing and tombstones.
    ///
    /// Deliberately excludes line/column so moving an import does not
    /// change its identity.
    pub fn merge_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.source_entity_id, self.module_specifier, self.imported_symbol
        )
    }
}

/// Symbol record as emitted by a parser, before storage fields are attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub entity_id: String,
    pub name: String,
    #[serde(default)]
    pub qualified_name: String,
    pub kind: String,
    pub start_line: u32,
    pub end_line: u32,
    #[serde(default)]
    pub start_column: u32,
    #[serde(default)]
    pub end_column: u32,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub is_exported: bool,
    #[serde(default)]
    pub is_default_export: bool,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default)]
    pub is_generator: bool,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub type_signature: Option<String>,
    #[serde(default)]
    pub documentation: Option<String>,
    #[serde(default)]
    pub decorators: Vec<String>,
    #[serde(default)]
    pub type_parameters: Vec<String>,
}

impl NodeRecord {
    /// Attaches storage fields, producing a persistable row.
    pub fn into_row(
        self,
        file_path: &str,
        branch: &str,
        source_file_hash: &str,
        updated_at: i64,
    ) -> Node {
        let qualified_name = if self.qualified_name.is_empty() {
            self.name.clone()
        } else {
            self.qualified_name
        };
        Node {
            entity_id: self.entity_id,
            name: self.name,
            qualified_name,
            kind: self.kind,
            file_path: file_path.to_string(),
            start_line: self.start_line,
            end_line: self.end_line,
            start_column: self.start_column,
            end_column: self.end_column,
            language: self.language,
            is_exported: self.is_exported,
            is_default_export: self.is_default_export,
            is_async: self.is_async,
            is_generator: self.is_generator,
            is_static: self.is_static,
            is_abstract: self.is_abstract,
            type_signature: self.type_signature,
            documentation: self.documentation,
            decorators: self.decorators,
            type_parameters: self.type_parameters,
            branch: branch.to_string(),
            is_deleted: false,
            updated_at,
            source_file_hash: source_file_hash.to_string(),
        }
    }
}

/// Relationship record as emitted by a parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub edge_type: String,
    pub source_entity_id: String,
    pub target_entity_id: String,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
    /// Open property bag. Forwarded verbatim into the row's JSON text.
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl EdgeRecord {
    /// Attaches storage fields, producing a persistable row.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the property bag cannot be re-encoded.
    pub fn into_row(self, file_path: &str, branch: &str, updated_at: i64) -> Result<Edge> {
        let edge_id = format!(
            "{}:{}:{}",
            self.edge_type, self.source_entity_id, self.target_entity_id
        );
        let properties = if self.properties.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&self.properties)
                .map_err(|e| DevacError::Serialization(format!("edge {}: {}", edge_id, e)))?
        };
        Ok(Edge {
            edge_id,
            edge_type: self.edge_type,
            source_entity_id: self.source_entity_id,
            target_entity_id: self.target_entity_id,
            source_file_path: file_path.to_string(),
            line: self.line,
            column: self.column,
            properties,
            branch: branch.to_string(),
            is_deleted: false,
            updated_at,
        })
    }
}

/// Unresolved-import record as emitted by a parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalRefRecord {
    pub source_entity_id: String,
    pub module_specifier: String,
    pub imported_symbol: String,
    #[serde(default)]
    pub local_alias: Option<String>,
    #[serde(default = "default_import_style")]
    pub import_style: String,
    #[serde(default)]
    pub is_type_only: bool,
    #[serde(default)]
    pub is_reexport: bool,
    #[serde(default)]
    pub export_alias: Option<String>,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

fn default_import_style() -> String {
    "named".to_string()
}

impl ExternalRefRecord {
    /// Attaches storage fields, producing a persistable row.
    ///
    /// Resolution state starts empty; a later resolution pass fills
    /// `target_entity_id` and flips `is_resolved`.
    pub fn into_row(
        self,
        file_path: &str,
        branch: &str,
        source_file_hash: &str,
        updated_at: i64,
    ) -> ExternalRef {
        ExternalRef {
            source_entity_id: self.source_entity_id,
            module_specifier: self.module_specifier,
            imported_symbol: self.imported_symbol,
            local_alias: self.local_alias,
            import_style: self.import_style,
            is_type_only: self.is_type_only,
            source_file_path: file_path.to_string(),
            line: self.line,
            column: self.column,
            target_entity_id: None,
            is_resolved: false,
            is_reexport: self.is_reexport,
            export_alias: self.export_alias,
            branch: branch.to_string(),
            is_deleted: false,
            updated_at,
            source_file_hash: source_file_hash.to_string(),
        }
    }
}

/// Everything a parser emits for one source file.
///
/// This is the fixed contract between the core and language-specific
/// parsers: whatever the language, a parser produces exactly this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedFile {
    /// Package-relative path of the parsed file.
    pub file_path: String,
    /// Content hash of the file at parse time (hex).
    pub source_file_hash: String,
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
    #[serde(default)]
    pub external_refs: Vec<ExternalRefRecord>,
    /// Non-fatal parser diagnostics, surfaced in analysis reports.
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Language-specific structural parser.
///
/// Implementations walk one source file and emit the [`ParsedFile`] record
/// contract. The core never inspects syntax itself.
pub trait SourceParser {
    /// Language identifier (`typescript`, `python`, ...).
    fn language(&self) -> &'static str;

    /// Parses one file into the record contract.
    fn parse_file(&self, file_path: &str, source: &str) -> Result<ParsedFile>;
}

/// One partition's (or a merged view's) worth of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSlice {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub external_refs: Vec<ExternalRef>,
}

impl GraphSlice {
    /// True when every table is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty() && self.external_refs.is_empty()
    }

    /// (nodes, edges, external_refs) row counts.
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.nodes.len(),
            self.edges.len(),
            self.external_refs.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_labels() {
        assert_eq!(Partition::Base.as_str(), "base");
        assert_eq!(Partition::Branch.as_str(), "branch");
        assert_eq!(SeedState::Delta.to_string(), "delta");
    }

    #[test]
    fn test_edge_record_into_row_builds_edge_id() {
        let rec = EdgeRecord {
            edge_type: "CALLS".to_string(),
            source_entity_id: "r:p:function:aaa".to_string(),
            target_entity_id: "r:p:function:bbb".to_string(),
            line: 10,
            column: 4,
            properties: serde_json::Map::new(),
        };
        let edge = rec.into_row("src/a.ts", "base", 1_700_000_000).unwrap();
        assert_eq!(edge.edge_id, "CALLS:r:p:function:aaa:r:p:function:bbb");
        assert!(edge.properties.is_empty());
        assert!(edge.property_map().unwrap().is_empty());
    }

    #[test]
    fn test_edge_property_map_lazy_parse() {
        let mut props = serde_json::Map::new();
        props.insert("target_name".to_string(), serde_json::json!("foo"));
        let rec = EdgeRecord {
            edge_type: "CALLS".to_string(),
            source_entity_id: "s".to_string(),
            target_entity_id: "t".to_string(),
            line: 1,
            column: 0,
            properties: props,
        };
        let edge = rec.into_row("a.ts", "base", 0).unwrap();
        let map = edge.property_map().unwrap();
        assert_eq!(map["target_name"], serde_json::json!("foo"));

        // Damage is only detected when interpreted, not at ingest.
        let mut broken = edge.clone();
        broken.properties = "not json".to_string();
        assert!(broken.property_map().is_err());
    }

    #[test]
    fn test_external_ref_merge_key_ignores_position() {
        let rec = ExternalRefRecord {
            source_entity_id: "mod".to_string(),
            module_specifier: "./util".to_string(),
            imported_symbol: "helper".to_string(),
            local_alias: None,
            import_style: "named".to_string(),
            is_type_only: false,
            is_reexport: false,
            export_alias: None,
            line: 3,
            column: 0,
        };
        let a = rec.clone().into_row("a.ts", "base", "h1", 0);
        let mut moved = rec.into_row("a.ts", "base", "h2", 1);
        moved.line = 99;
        assert_eq!(a.merge_key(), moved.merge_key());
    }

    #[test]
    fn test_parsed_file_accepts_sparse_json() {
        // Parsers in other languages send only the fields they know.
        let json = r#"{
            "file_path": "src/a.py",
            "source_file_hash": "abc123",
            "nodes": [{
                "entity_id": "r:p:function:deadbeef0123",
                "name": "foo",
                "kind": "function",
                "start_line": 1,
                "end_line": 4
            }],
            "edges": [],
            "external_refs": [{
                "source_entity_id": "r:p:module:deadbeef0123",
                "module_specifier": "os",
                "imported_symbol": "path"
            }]
        }"#;
        let parsed: ParsedFile = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.nodes.len(), 1);
        assert!(!parsed.nodes[0].is_exported);
        assert_eq!(parsed.external_refs[0].import_style, "named");
        assert!(parsed.warnings.is_empty());
    }
}
