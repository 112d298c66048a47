//! Devac core library.
//!
//! Turns parser output into a queryable code graph, providing:
//! - Stable scope-derived symbol identity
//! - Partitioned, locked, atomically published per-package storage
//! - Change-impact ("affected files") traversal
//! - Federation of many packages behind one query surface
//!
//! Language parsing itself lives outside this crate: parsers implement
//! [`SourceParser`] (or ship records as JSON) and everything downstream
//! works from the [`ParsedFile`] contract.
//!
//! # Quick Start
//!
//! ```
//! use devac_core::{ParsedFile, SeedStore};
//! use tempfile::TempDir;
//!
//! let tmp = TempDir::new().unwrap();
//! let store = SeedStore::open(tmp.path());
//!
//! // Records come from a language parser; JSON is the wire shape.
//! let parsed: ParsedFile = serde_json::from_str(r#"{
//!     "file_path": "src/app.ts",
//!     "source_file_hash": "3f2a9c",
//!     "nodes": [{
//!         "entity_id": "webapp:pkg:function:a1b2c3d4e5f6",
//!         "name": "main",
//!         "kind": "function",
//!         "start_line": 1,
//!         "end_line": 10
//!     }]
//! }"#).unwrap();
//!
//! store.full_analysis(&[parsed]).unwrap();
//! assert_eq!(store.read_merged().unwrap().nodes.len(), 1);
//! ```
//!
//! # Storage model
//!
//! Each package persists under `<package>/.devac/seed/` as two
//! independently lockable partitions: `base` (full snapshot of the
//! default branch) and `branch` (working-branch delta). Merged reads
//! shadow base rows with branch rows sharing a merge identity, and a
//! branch tombstone suppresses the identity entirely. Writers coordinate
//! through an advisory `.devac.lock` marker; readers never block.

mod affected;
mod config;
mod error;
mod hub;
mod lock;
mod query;
mod scope;
mod sqlview;
mod store;
mod table;
mod types;

pub use affected::{
    analyze_affected, AffectedFile, AffectedReport, ChangedSymbol, ImpactClass,
};
pub use config::{Config, HubConfig, LockConfig, QueryConfig};
pub use error::{DevacError, Result};
pub use hub::{
    FederatedQueryResult, FeedbackEntry, FeedbackKind, FeedbackRow, Hub, PackageAnalyzer,
    PackageFailure, PackageStatus, RegisteredPackage, RegistrationReport, RepoStatus,
};
pub use lock::{LockGuard, LockMarker, LOCK_FILE_NAME};
pub use query::{
    call_graph, find_symbols, CallDirection, CallGraph, CallGraphEntry, Granularity, Page,
    SymbolFilter, SymbolMatches, SymbolSummary,
};
pub use scope::{display_name, entity_id, ScopeStack, SymbolDescriptor};
pub use sqlview::{substitute_sources, JsonRow, MergedView};
pub use store::{AnalysisReport, SeedStore};
pub use types::{
    Edge, EdgeRecord, ExternalRef, ExternalRefRecord, GraphSlice, Node, NodeRecord, ParsedFile,
    Partition, SeedState, SourceParser, SCHEMA_VERSION,
};
