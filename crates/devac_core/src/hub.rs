//! Hub federation: a registry of repositories and packages, one query
//! surface spanning all their seed stores, and feedback tables for
//! external tooling.
//!
//! The registry lives in a single SQLite database (default
//! `~/.devac/hub.db`). Cross-package queries are best-effort snapshot
//! unions: each package's merged view is queried independently and one
//! package's failure degrades the result instead of aborting it.

use crate::error::{DevacError, Result};
use crate::sqlview::{self, JsonRow, MergedView};
use crate::store::SeedStore;
use crate::types::{Partition, SeedState};
use chrono::Utc;
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Manifest files that mark a directory as a package root.
const PACKAGE_MANIFESTS: &[&str] = &["package.json", "Cargo.toml", "pyproject.toml", "go.mod"];

/// Directories never descended into during package discovery.
const SKIP_DIRS: &[&str] = &[
    "node_modules",
    "target",
    "dist",
    "build",
    "vendor",
    "__pycache__",
];

/// Discovery depth below the repository root.
const MAX_DISCOVERY_DEPTH: usize = 5;

const HUB_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS repos (
    repo_id       TEXT PRIMARY KEY,
    local_path    TEXT NOT NULL,
    registered_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS packages (
    repo_id       TEXT NOT NULL,
    package_path  TEXT NOT NULL,
    seed_state    TEXT NOT NULL,
    seed_mtime    INTEGER,
    registered_at TEXT NOT NULL,
    PRIMARY KEY (repo_id, package_path)
);
CREATE TABLE IF NOT EXISTS validation_errors (
    repo_id    TEXT NOT NULL,
    source     TEXT NOT NULL,
    entry_id   TEXT NOT NULL,
    payload    TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (repo_id, source, entry_id)
);
CREATE TABLE IF NOT EXISTS ci_status (
    repo_id    TEXT NOT NULL,
    source     TEXT NOT NULL,
    entry_id   TEXT NOT NULL,
    payload    TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (repo_id, source, entry_id)
);
CREATE TABLE IF NOT EXISTS issues (
    repo_id    TEXT NOT NULL,
    source     TEXT NOT NULL,
    entry_id   TEXT NOT NULL,
    payload    TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (repo_id, source, entry_id)
);
CREATE TABLE IF NOT EXISTS reviews (
    repo_id    TEXT NOT NULL,
    source     TEXT NOT NULL,
    entry_id   TEXT NOT NULL,
    payload    TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (repo_id, source, entry_id)
);
";

/// Delegated analysis hook used during registration.
///
/// The hub never parses source itself; a caller that wants unseeded
/// packages analyzed at registration time supplies this.
pub trait PackageAnalyzer {
    /// Produces a base partition for a package that has none.
    fn analyze(&self, package_root: &Path) -> Result<()>;
}

/// One of the hub's feedback tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    ValidationErrors,
    CiStatus,
    Issues,
    Reviews,
}

impl FeedbackKind {
    fn table(&self) -> &'static str {
        match self {
            FeedbackKind::ValidationErrors => "validation_errors",
            FeedbackKind::CiStatus => "ci_status",
            FeedbackKind::Issues => "issues",
            FeedbackKind::Reviews => "reviews",
        }
    }

    /// Parses a CLI label.
    ///
    /// # Errors
    ///
    /// `InvalidQuery` for unknown labels.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "validation-errors" => Ok(FeedbackKind::ValidationErrors),
            "ci-status" => Ok(FeedbackKind::CiStatus),
            "issues" => Ok(FeedbackKind::Issues),
            "reviews" => Ok(FeedbackKind::Reviews),
            other => Err(DevacError::InvalidQuery(format!(
                "unknown feedback table '{}'",
                other
            ))),
        }
    }
}

/// One feedback row to push: a natural id plus an open payload.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FeedbackEntry {
    pub id: String,
    pub payload: serde_json::Value,
}

/// A stored feedback row.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FeedbackRow {
    pub source: String,
    pub id: String,
    pub payload: serde_json::Value,
    pub updated_at: String,
}

/// Package entry inside a registration report.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RegisteredPackage {
    /// Repo-relative package path (`.` for the repo root).
    pub package_path: String,
    pub seed_state: SeedState,
}

/// A package-scoped failure inside an otherwise successful operation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PackageFailure {
    pub package_path: String,
    pub error: String,
}

/// Outcome of registering one repository.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RegistrationReport {
    pub repo_id: String,
    pub packages: Vec<RegisteredPackage>,
    /// Per-package analysis failures; never abort the other packages.
    pub failures: Vec<PackageFailure>,
}

/// Registered package with its current staleness.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PackageStatus {
    pub package_path: String,
    pub seed_state: String,
    pub registered_at: String,
    /// True when the seed on disk is newer than the registration.
    pub stale: bool,
}

/// One repository's registry entry.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RepoStatus {
    pub repo_id: String,
    pub local_path: String,
    pub registered_at: String,
    pub packages: Vec<PackageStatus>,
}

/// Concatenated result of a cross-package query.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FederatedQueryResult {
    pub rows: Vec<JsonRow>,
    pub packages_queried: usize,
    /// Packages whose reads failed; the rest of the result stands.
    pub failures: Vec<PackageFailure>,
}

/// Handle to the hub registry database.
pub struct Hub {
    conn: Connection,
    path: PathBuf,
}

impl Hub {
    /// Opens (creating if needed) the hub database at `path`.
    ///
    /// # Errors
    ///
    /// `HubLocked` when another process holds the database write lock
    /// past the busy timeout; `Database` for other SQLite failures.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path).map_err(|e| map_db_err(&path, e))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| map_db_err(&path, e))?;
        conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
            .map_err(|e| map_db_err(&path, e))?;
        conn.execute_batch(HUB_SCHEMA)
            .map_err(|e| map_db_err(&path, e))?;

        Ok(Self { conn, path })
    }

    /// Path of the underlying database.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Registers (or re-registers) a repository.
    ///
    /// Discovers packages by manifest files under the repo root, optionally
    /// triggers delegated analysis for packages without a base partition,
    /// and upserts one registry row per `{repo_id, package path}`, never
    /// duplicating on re-registration.
    ///
    /// # Errors
    ///
    /// `RegistrationFailed` when the path is missing or holds no
    /// discoverable packages. Per-package analysis failures are collected
    /// in the report, not raised.
    pub fn register_repository(
        &self,
        repo_path: &Path,
        analyzer: Option<&dyn PackageAnalyzer>,
    ) -> Result<RegistrationReport> {
        if !repo_path.is_dir() {
            return Err(DevacError::RegistrationFailed {
                path: repo_path.to_path_buf(),
                reason: "path does not exist or is not a directory".to_string(),
            });
        }

        let package_dirs = discover_packages(repo_path);
        if package_dirs.is_empty() {
            return Err(DevacError::RegistrationFailed {
                path: repo_path.to_path_buf(),
                reason: format!(
                    "no discoverable packages (looked for {})",
                    PACKAGE_MANIFESTS.join(", ")
                ),
            });
        }

        let repo_id = repo_id_for(repo_path);
        let now = Utc::now().to_rfc3339();

        self.conn
            .execute(
                "INSERT INTO repos (repo_id, local_path, registered_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(repo_id) DO UPDATE SET \
                 local_path = excluded.local_path, registered_at = excluded.registered_at",
                rusqlite::params![repo_id, repo_path.to_string_lossy(), now],
            )
            .map_err(|e| map_db_err(&self.path, e))?;

        let mut report = RegistrationReport {
            repo_id: repo_id.clone(),
            packages: Vec::new(),
            failures: Vec::new(),
        };

        for package_dir in package_dirs {
            let rel = relative_package_path(repo_path, &package_dir);
            let store = SeedStore::open(&package_dir);

            if let Some(analyzer) = analyzer {
                if !store.partition_exists(Partition::Base) {
                    if let Err(e) = analyzer.analyze(&package_dir) {
                        warn!(package = %rel, error = %e, "delegated analysis failed");
                        report.failures.push(PackageFailure {
                            package_path: rel.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }

            let state = store.seed_state();
            let mtime = store.seed_mtime_unix();
            self.conn
                .execute(
                    "INSERT INTO packages \
                     (repo_id, package_path, seed_state, seed_mtime, registered_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5) \
                     ON CONFLICT(repo_id, package_path) DO UPDATE SET \
                     seed_state = excluded.seed_state, \
                     seed_mtime = excluded.seed_mtime, \
                     registered_at = excluded.registered_at",
                    rusqlite::params![repo_id, rel, state.as_str(), mtime, now],
                )
                .map_err(|e| map_db_err(&self.path, e))?;

            report.packages.push(RegisteredPackage {
                package_path: rel,
                seed_state: state,
            });
        }

        debug!(
            repo_id = %report.repo_id,
            packages = report.packages.len(),
            failures = report.failures.len(),
            "registered repository"
        );
        Ok(report)
    }

    /// Registry contents with per-package staleness.
    pub fn status(&self) -> Result<Vec<RepoStatus>> {
        let mut repos_stmt = self
            .conn
            .prepare("SELECT repo_id, local_path, registered_at FROM repos ORDER BY repo_id")
            .map_err(|e| map_db_err(&self.path, e))?;
        let repos: Vec<(String, String, String)> = repos_stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .map_err(|e| map_db_err(&self.path, e))?
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| map_db_err(&self.path, e))?;

        let mut out = Vec::new();
        for (repo_id, local_path, registered_at) in repos {
            let mut pkg_stmt = self
                .conn
                .prepare(
                    "SELECT package_path, seed_state, seed_mtime, registered_at \
                     FROM packages WHERE repo_id = ?1 ORDER BY package_path",
                )
                .map_err(|e| map_db_err(&self.path, e))?;
            let rows: Vec<(String, String, Option<i64>, String)> = pkg_stmt
                .query_map([&repo_id], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })
                .map_err(|e| map_db_err(&self.path, e))?
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| map_db_err(&self.path, e))?;

            let packages = rows
                .into_iter()
                .map(|(package_path, seed_state, recorded_mtime, pkg_registered_at)| {
                    let store =
                        SeedStore::open(absolute_package_path(Path::new(&local_path), &package_path));
                    let stale = match (store.seed_mtime_unix(), recorded_mtime) {
                        (Some(current), Some(recorded)) => current > recorded,
                        (Some(_), None) => true,
                        _ => false,
                    };
                    PackageStatus {
                        package_path,
                        seed_state,
                        registered_at: pkg_registered_at,
                        stale,
                    }
                })
                .collect();

            out.push(RepoStatus {
                repo_id,
                local_path,
                registered_at,
                packages,
            });
        }
        Ok(out)
    }

    /// Runs one query template against every seeded package and
    /// concatenates the rows.
    ///
    /// The template addresses tables through `{nodes}`, `{edges}`, and
    /// `{external_refs}`; it is rewritten against each package's merged
    /// view. A package whose seed fails to read contributes a failure
    /// entry instead of aborting the union.
    pub fn query_all(&self, template: &str) -> Result<FederatedQueryResult> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT r.local_path, p.package_path FROM packages p \
                 JOIN repos r ON r.repo_id = p.repo_id \
                 WHERE p.seed_state != 'none' \
                 ORDER BY r.repo_id, p.package_path",
            )
            .map_err(|e| map_db_err(&self.path, e))?;
        let targets: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| map_db_err(&self.path, e))?
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| map_db_err(&self.path, e))?;

        let mut result = FederatedQueryResult {
            rows: Vec::new(),
            packages_queried: 0,
            failures: Vec::new(),
        };

        for (local_path, package_path) in targets {
            let package_root = absolute_package_path(Path::new(&local_path), &package_path);
            let sql = sqlview::substitute_sources(template);

            let outcome = SeedStore::open(&package_root)
                .read_merged()
                .and_then(|merged| MergedView::build(&merged))
                .and_then(|view| view.query(&sql));

            match outcome {
                Ok(rows) => {
                    result.rows.extend(rows);
                    result.packages_queried += 1;
                }
                // Malformed templates fail identically everywhere; surface
                // them instead of recording one failure per package.
                Err(e @ DevacError::InvalidQuery(_)) => return Err(e),
                Err(e) => {
                    warn!(package = %package_path, error = %e, "package skipped in federated query");
                    result.failures.push(PackageFailure {
                        package_path,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(result)
    }

    /// Deletes every feedback row for `{repo_id, source}`. Idempotent:
    /// clearing an empty namespace is fine. Returns rows removed.
    pub fn clear_feedback(
        &self,
        repo_id: &str,
        kind: FeedbackKind,
        source: &str,
    ) -> Result<usize> {
        let sql = format!(
            "DELETE FROM {} WHERE repo_id = ?1 AND source = ?2",
            kind.table()
        );
        self.conn
            .execute(&sql, rusqlite::params![repo_id, source])
            .map_err(|e| map_db_err(&self.path, e))
    }

    /// Bulk-pushes feedback rows in one transaction, replacing rows that
    /// share a natural id. Returns rows written.
    pub fn push_feedback(
        &self,
        repo_id: &str,
        kind: FeedbackKind,
        source: &str,
        entries: &[FeedbackEntry],
    ) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        let sql = format!(
            "INSERT OR REPLACE INTO {} (repo_id, source, entry_id, payload, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            kind.table()
        );

        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| map_db_err(&self.path, e))?;
        for entry in entries {
            let payload = serde_json::to_string(&entry.payload)
                .map_err(|e| DevacError::Serialization(e.to_string()))?;
            tx.execute(&sql, rusqlite::params![repo_id, source, entry.id, payload, now])
                .map_err(|e| map_db_err(&self.path, e))?;
        }
        tx.commit().map_err(|e| map_db_err(&self.path, e))?;
        Ok(entries.len())
    }

    /// Lists feedback rows for a repo, ordered by (source, id).
    pub fn feedback(&self, repo_id: &str, kind: FeedbackKind) -> Result<Vec<FeedbackRow>> {
        let sql = format!(
            "SELECT source, entry_id, payload, updated_at FROM {} \
             WHERE repo_id = ?1 ORDER BY source, entry_id",
            kind.table()
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| map_db_err(&self.path, e))?;
        let rows: Vec<(String, String, String, String)> = stmt
            .query_map([repo_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .map_err(|e| map_db_err(&self.path, e))?
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| map_db_err(&self.path, e))?;

        rows.into_iter()
            .map(|(source, id, payload, updated_at)| {
                let payload = serde_json::from_str(&payload)
                    .map_err(|e| DevacError::Deserialization(e.to_string()))?;
                Ok(FeedbackRow {
                    source,
                    id,
                    payload,
                    updated_at,
                })
            })
            .collect()
    }
}

/// Maps SQLite busy/locked states to the typed hub contention error.
fn map_db_err(path: &Path, e: rusqlite::Error) -> DevacError {
    if let rusqlite::Error::SqliteFailure(code, _) = &e {
        if matches!(
            code.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ) {
            return DevacError::HubLocked {
                path: path.to_path_buf(),
            };
        }
    }
    DevacError::Database(e.to_string())
}

fn repo_id_for(repo_path: &Path) -> String {
    repo_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "repo".to_string())
}

fn relative_package_path(repo_path: &Path, package_dir: &Path) -> String {
    let rel = package_dir
        .strip_prefix(repo_path)
        .unwrap_or(package_dir)
        .to_string_lossy()
        .into_owned();
    if rel.is_empty() {
        ".".to_string()
    } else {
        rel
    }
}

fn absolute_package_path(local_path: &Path, package_path: &str) -> PathBuf {
    if package_path == "." {
        local_path.to_path_buf()
    } else {
        local_path.join(package_path)
    }
}

/// Directories under `repo_path` holding a package manifest.
fn discover_packages(repo_path: &Path) -> Vec<PathBuf> {
    let mut found: BTreeSet<PathBuf> = BTreeSet::new();

    let walker = WalkDir::new(repo_path)
        .max_depth(MAX_DISCOVERY_DEPTH)
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            if entry.depth() == 0 {
                return true;
            }
            if entry.file_type().is_dir() {
                return !name.starts_with('.') && !SKIP_DIRS.contains(&name.as_ref());
            }
            true
        });

    for entry in walker.flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if PACKAGE_MANIFESTS.contains(&name.as_ref()) {
            if let Some(parent) = entry.path().parent() {
                found.insert(parent.to_path_buf());
            }
        }
    }

    found.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeRecord, ParsedFile};
    use std::fs;
    use tempfile::TempDir;

    fn node(id: &str, name: &str) -> NodeRecord {
        NodeRecord {
            entity_id: id.to_string(),
            name: name.to_string(),
            qualified_name: String::new(),
            kind: "function".to_string(),
            start_line: 1,
            end_line: 2,
            start_column: 0,
            end_column: 0,
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

    fn seed_package(dir: &Path, entity: &str, name: &str) {
        SeedStore::open(dir)
            .full_analysis(&[ParsedFile {
                file_path: "src/index.ts".to_string(),
                source_file_hash: format!("hash-{}", name),
                nodes: vec![node(entity, name)],
                edges: vec![],
                external_refs: vec![],
                warnings: vec![],
            }])
            .unwrap();
    }

    /// A repo with two packages: packages/api (package.json) and
    /// packages/worker (Cargo.toml).
    fn sample_repo(tmp: &TempDir) -> PathBuf {
        let repo = tmp.path().join("webapp");
        fs::create_dir_all(repo.join("packages/api/src")).unwrap();
        fs::create_dir_all(repo.join("packages/worker/src")).unwrap();
        fs::write(repo.join("packages/api/package.json"), "{}").unwrap();
        fs::write(
            repo.join("packages/worker/Cargo.toml"),
            "[package]\nname = \"worker\"\n",
        )
        .unwrap();
        repo
    }

    fn hub(tmp: &TempDir) -> Hub {
        Hub::open(tmp.path().join("hub.db")).unwrap()
    }

    #[test]
    fn test_register_discovers_packages() {
        let tmp = TempDir::new().unwrap();
        let repo = sample_repo(&tmp);
        let hub = hub(&tmp);

        let report = hub.register_repository(&repo, None).unwrap();
        assert_eq!(report.repo_id, "webapp");
        assert_eq!(report.packages.len(), 2);
        assert!(report.failures.is_empty());
        assert!(report
            .packages
            .iter()
            .all(|p| p.seed_state == SeedState::None));
    }

    #[test]
    fn test_reregistration_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let repo = sample_repo(&tmp);
        let hub = hub(&tmp);

        hub.register_repository(&repo, None).unwrap();
        let first = hub.status().unwrap();
        hub.register_repository(&repo, None).unwrap();
        let second = hub.status().unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].packages.len(), second[0].packages.len());
        let paths: Vec<&str> = second[0]
            .packages
            .iter()
            .map(|p| p.package_path.as_str())
            .collect();
        assert_eq!(paths, ["packages/api", "packages/worker"]);
    }

    #[test]
    fn test_missing_path_is_registration_failed() {
        let tmp = TempDir::new().unwrap();
        let hub = hub(&tmp);
        let err = hub
            .register_repository(&tmp.path().join("nope"), None)
            .unwrap_err();
        assert!(matches!(err, DevacError::RegistrationFailed { .. }));
    }

    #[test]
    fn test_repo_without_packages_is_registration_failed() {
        let tmp = TempDir::new().unwrap();
        let empty = tmp.path().join("empty-repo");
        fs::create_dir_all(empty.join("docs")).unwrap();
        let hub = hub(&tmp);

        let err = hub.register_repository(&empty, None).unwrap_err();
        match err {
            DevacError::RegistrationFailed { reason, .. } => {
                assert!(reason.contains("no discoverable packages"));
            }
            other => panic!("expected RegistrationFailed, got {:?}", other),
        }
    }

    struct SelectiveAnalyzer;

    impl PackageAnalyzer for SelectiveAnalyzer {
        fn analyze(&self, package_root: &Path) -> Result<()> {
            if package_root.to_string_lossy().contains("worker") {
                return Err(DevacError::Serialization(
                    "simulated parser crash".to_string(),
                ));
            }
            seed_package(package_root, "e:api", "handler");
            Ok(())
        }
    }

    #[test]
    fn test_one_analysis_failure_does_not_abort_the_rest() {
        let tmp = TempDir::new().unwrap();
        let repo = sample_repo(&tmp);
        let hub = hub(&tmp);

        let report = hub
            .register_repository(&repo, Some(&SelectiveAnalyzer))
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].package_path, "packages/worker");

        let api = report
            .packages
            .iter()
            .find(|p| p.package_path == "packages/api")
            .unwrap();
        assert_eq!(api.seed_state, SeedState::Base);
        let worker = report
            .packages
            .iter()
            .find(|p| p.package_path == "packages/worker")
            .unwrap();
        assert_eq!(worker.seed_state, SeedState::None);
    }

    #[test]
    fn test_analyzer_skipped_for_already_seeded_package() {
        let tmp = TempDir::new().unwrap();
        let repo = sample_repo(&tmp);
        seed_package(&repo.join("packages/worker"), "e:w", "work");
        let hub = hub(&tmp);

        // SelectiveAnalyzer would fail on worker, but worker has seeds.
        let report = hub
            .register_repository(&repo, Some(&SelectiveAnalyzer))
            .unwrap();
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_query_all_concatenates_across_packages() {
        let tmp = TempDir::new().unwrap();
        let repo = sample_repo(&tmp);
        seed_package(&repo.join("packages/api"), "e:a", "apiHandler");
        seed_package(&repo.join("packages/worker"), "e:w", "workLoop");
        let hub = hub(&tmp);
        hub.register_repository(&repo, None).unwrap();

        let result = hub
            .query_all("SELECT name FROM {nodes} ORDER BY name")
            .unwrap();
        assert_eq!(result.packages_queried, 2);
        assert!(result.failures.is_empty());

        let mut names: Vec<String> = result
            .rows
            .iter()
            .map(|r| r["name"].as_str().unwrap().to_string())
            .collect();
        names.sort();
        assert_eq!(names, ["apiHandler", "workLoop"]);
    }

    #[test]
    fn test_query_all_isolates_per_package_failures() {
        let tmp = TempDir::new().unwrap();
        let repo = sample_repo(&tmp);
        seed_package(&repo.join("packages/api"), "e:a", "apiHandler");
        seed_package(&repo.join("packages/worker"), "e:w", "workLoop");
        let hub = hub(&tmp);
        hub.register_repository(&repo, None).unwrap();

        // Ruin one package's partition after registration.
        fs::write(
            repo.join("packages/worker/.devac/seed/base/nodes.col"),
            b"spilled coffee",
        )
        .unwrap();

        let result = hub.query_all("SELECT name FROM {nodes}").unwrap();
        assert_eq!(result.packages_queried, 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].package_path, "packages/worker");
        assert_eq!(result.rows.len(), 1);
    }

    #[test]
    fn test_query_all_rejects_writes_outright() {
        let tmp = TempDir::new().unwrap();
        let repo = sample_repo(&tmp);
        seed_package(&repo.join("packages/api"), "e:a", "apiHandler");
        let hub = hub(&tmp);
        hub.register_repository(&repo, None).unwrap();

        let err = hub.query_all("DELETE FROM {nodes}").unwrap_err();
        assert!(matches!(err, DevacError::InvalidQuery(_)));
    }

    #[test]
    fn test_feedback_clear_then_push() {
        let tmp = TempDir::new().unwrap();
        let hub = hub(&tmp);

        let entries = vec![
            FeedbackEntry {
                id: "TS2304:src/a.ts:10".to_string(),
                payload: serde_json::json!({"message": "Cannot find name 'foo'"}),
            },
            FeedbackEntry {
                id: "TS2304:src/b.ts:4".to_string(),
                payload: serde_json::json!({"message": "Cannot find name 'bar'"}),
            },
        ];

        // Clearing an empty namespace is fine (idempotent pre-sync).
        assert_eq!(
            hub.clear_feedback("webapp", FeedbackKind::ValidationErrors, "tsc")
                .unwrap(),
            0
        );
        hub.push_feedback("webapp", FeedbackKind::ValidationErrors, "tsc", &entries)
            .unwrap();

        let rows = hub
            .feedback("webapp", FeedbackKind::ValidationErrors)
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].source, "tsc");

        // Re-push replaces by natural id instead of duplicating.
        hub.push_feedback("webapp", FeedbackKind::ValidationErrors, "tsc", &entries)
            .unwrap();
        assert_eq!(
            hub.feedback("webapp", FeedbackKind::ValidationErrors)
                .unwrap()
                .len(),
            2
        );

        // Namespacing: another source is untouched by clear.
        hub.push_feedback(
            "webapp",
            FeedbackKind::ValidationErrors,
            "eslint",
            &entries[..1],
        )
        .unwrap();
        assert_eq!(
            hub.clear_feedback("webapp", FeedbackKind::ValidationErrors, "tsc")
                .unwrap(),
            2
        );
        let rows = hub
            .feedback("webapp", FeedbackKind::ValidationErrors)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source, "eslint");
    }

    #[test]
    fn test_status_reports_staleness_after_new_analysis() {
        let tmp = TempDir::new().unwrap();
        let repo = sample_repo(&tmp);
        seed_package(&repo.join("packages/api"), "e:a", "apiHandler");
        let hub = hub(&tmp);
        hub.register_repository(&repo, None).unwrap();

        let status = hub.status().unwrap();
        let api = status[0]
            .packages
            .iter()
            .find(|p| p.package_path == "packages/api")
            .unwrap();
        assert!(!api.stale);

        // Advance the seed past the registration timestamp.
        std::thread::sleep(std::time::Duration::from_millis(1100));
        SeedStore::open(repo.join("packages/api"))
            .full_analysis(&[ParsedFile {
                file_path: "src/index.ts".to_string(),
                source_file_hash: "hash-v2".to_string(),
                nodes: vec![node("e:a", "apiHandler")],
                edges: vec![],
                external_refs: vec![],
                warnings: vec![],
            }])
            .unwrap();

        let status = hub.status().unwrap();
        let api = status[0]
            .packages
            .iter()
            .find(|p| p.package_path == "packages/api")
            .unwrap();
        assert!(api.stale);

        // Re-registration refreshes the recorded mtime.
        hub.register_repository(&repo, None).unwrap();
        let status = hub.status().unwrap();
        let api = status[0]
            .packages
            .iter()
            .find(|p| p.package_path == "packages/api")
            .unwrap();
        assert!(!api.stale);
    }

    #[test]
    fn test_feedback_kind_parsing() {
        assert_eq!(
            FeedbackKind::parse("ci-status").unwrap(),
            FeedbackKind::CiStatus
        );
        assert!(FeedbackKind::parse("gossip").is_err());
    }
}
