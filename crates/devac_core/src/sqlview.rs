//! Raw read-only SQL over a package's merged view.
//!
//! The merged rows are loaded into an in-memory SQLite database with
//! `nodes`, `edges`, and `external_refs` tables. Callers get one query
//! surface; anything that is not a single read-only SELECT/WITH statement
//! is rejected before execution. Hub templates write their FROM clauses
//! against the `{nodes}`/`{edges}`/`{external_refs}` placeholders and are
//! rewritten per package before running.

use crate::error::{DevacError, Result};
use crate::types::GraphSlice;
use rusqlite::types::ValueRef;
use rusqlite::Connection;

/// One result row as a JSON object keyed by column name.
pub type JsonRow = serde_json::Map<String, serde_json::Value>;

const SCHEMA: &str = r#"
CREATE TABLE nodes (
    entity_id         TEXT PRIMARY KEY,
    name              TEXT NOT NULL,
    qualified_name    TEXT NOT NULL,
    kind              TEXT NOT NULL,
    file_path         TEXT NOT NULL,
    start_line        INTEGER NOT NULL,
    end_line          INTEGER NOT NULL,
    start_column      INTEGER NOT NULL,
    end_column        INTEGER NOT NULL,
    language          TEXT NOT NULL,
    is_exported       INTEGER NOT NULL,
    is_default_export INTEGER NOT NULL,
    is_async          INTEGER NOT NULL,
    is_generator      INTEGER NOT NULL,
    is_static         INTEGER NOT NULL,
    is_abstract       INTEGER NOT NULL,
    type_signature    TEXT,
    documentation     TEXT,
    decorators        TEXT NOT NULL,
    type_parameters   TEXT NOT NULL,
    branch            TEXT NOT NULL,
    updated_at        INTEGER NOT NULL,
    source_file_hash  TEXT NOT NULL
);
CREATE TABLE edges (
    edge_id           TEXT PRIMARY KEY,
    edge_type         TEXT NOT NULL,
    source_entity_id  TEXT NOT NULL,
    target_entity_id  TEXT NOT NULL,
    source_file_path  TEXT NOT NULL,
    line              INTEGER NOT NULL,
    "column"          INTEGER NOT NULL,
    properties        TEXT NOT NULL,
    branch            TEXT NOT NULL,
    updated_at        INTEGER NOT NULL
);
CREATE TABLE external_refs (
    source_entity_id  TEXT NOT NULL,
    module_specifier  TEXT NOT NULL,
    imported_symbol   TEXT NOT NULL,
    local_alias       TEXT,
    import_style      TEXT NOT NULL,
    is_type_only      INTEGER NOT NULL,
    source_file_path  TEXT NOT NULL,
    line              INTEGER NOT NULL,
    "column"          INTEGER NOT NULL,
    target_entity_id  TEXT,
    is_resolved       INTEGER NOT NULL,
    is_reexport       INTEGER NOT NULL,
    export_alias      TEXT,
    branch            TEXT NOT NULL,
    updated_at        INTEGER NOT NULL,
    source_file_hash  TEXT NOT NULL
);
"#;

/// Rewrites a query template's source placeholders to this view's tables.
///
/// One template serves many packages: the hub substitutes and runs it
/// against each package's own view, then concatenates the rows.
pub fn substitute_sources(template: &str) -> String {
    template
        .replace("{nodes}", "nodes")
        .replace("{edges}", "edges")
        .replace("{external_refs}", "external_refs")
}

/// In-memory SQL view over one merged graph slice.
pub struct MergedView {
    conn: Connection,
}

impl MergedView {
    /// Loads a merged slice into a fresh in-memory database.
    ///
    /// Tombstones never reach this point (the merged read already
    /// dropped them), so the view has no `is_deleted` column.
    pub fn build(slice: &GraphSlice) -> Result<Self> {
        let mut conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        let tx = conn.transaction().map_err(db_err)?;
        {
            let mut insert_node = tx
                .prepare(
                    "INSERT INTO nodes VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, \
                     ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
                )
                .map_err(db_err)?;
            for n in &slice.nodes {
                let decorators = serde_json::to_string(&n.decorators)
                    .map_err(|e| DevacError::Serialization(e.to_string()))?;
                let type_parameters = serde_json::to_string(&n.type_parameters)
                    .map_err(|e| DevacError::Serialization(e.to_string()))?;
                insert_node
                    .execute(rusqlite::params![
                        n.entity_id,
                        n.name,
                        n.qualified_name,
                        n.kind,
                        n.file_path,
                        n.start_line,
                        n.end_line,
                        n.start_column,
                        n.end_column,
                        n.language,
                        n.is_exported,
                        n.is_default_export,
                        n.is_async,
                        n.is_generator,
                        n.is_static,
                        n.is_abstract,
                        n.type_signature,
                        n.documentation,
                        decorators,
                        type_parameters,
                        n.branch,
                        n.updated_at,
                        n.source_file_hash,
                    ])
                    .map_err(db_err)?;
            }

            let mut insert_edge = tx
                .prepare("INSERT INTO edges VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)")
                .map_err(db_err)?;
            for e in &slice.edges {
                insert_edge
                    .execute(rusqlite::params![
                        e.edge_id,
                        e.edge_type,
                        e.source_entity_id,
                        e.target_entity_id,
                        e.source_file_path,
                        e.line,
                        e.column,
                        e.properties,
                        e.branch,
                        e.updated_at,
                    ])
                    .map_err(db_err)?;
            }

            let mut insert_ref = tx
                .prepare(
                    "INSERT INTO external_refs VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, \
                     ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                )
                .map_err(db_err)?;
            for r in &slice.external_refs {
                insert_ref
                    .execute(rusqlite::params![
                        r.source_entity_id,
                        r.module_specifier,
                        r.imported_symbol,
                        r.local_alias,
                        r.import_style,
                        r.is_type_only,
                        r.source_file_path,
                        r.line,
                        r.column,
                        r.target_entity_id,
                        r.is_resolved,
                        r.is_reexport,
                        r.export_alias,
                        r.branch,
                        r.updated_at,
                        r.source_file_hash,
                    ])
                    .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)?;

        Ok(Self { conn })
    }

    /// Runs a read-only query and returns its rows as JSON objects.
    ///
    /// # Errors
    ///
    /// `InvalidQuery` when the statement is not a single read-only
    /// SELECT/WITH, or does not parse. Rejection happens before any
    /// execution.
    pub fn query(&self, sql: &str) -> Result<Vec<JsonRow>> {
        ensure_read_only(sql)?;

        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| DevacError::InvalidQuery(e.to_string()))?;

        // Belt over the keyword check: SQLite itself confirms the prepared
        // statement writes nothing.
        if !stmt.readonly() {
            return Err(DevacError::InvalidQuery(
                "write statements are rejected on the read surface".to_string(),
            ));
        }

        let names: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();

        let mut out = Vec::new();
        let mut rows = stmt.query([]).map_err(db_err)?;
        while let Some(row) = rows.next().map_err(db_err)? {
            let mut obj = JsonRow::new();
            for (i, name) in names.iter().enumerate() {
                let value = row.get_ref(i).map_err(db_err)?;
                obj.insert(name.clone(), value_to_json(value));
            }
            out.push(obj);
        }
        Ok(out)
    }
}

/// Rejects everything except a single SELECT/WITH statement.
fn ensure_read_only(sql: &str) -> Result<()> {
    let body = strip_leading_comments(sql);

    let first_word: String = body
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    if first_word != "SELECT" && first_word != "WITH" {
        return Err(DevacError::InvalidQuery(format!(
            "only read-only SELECT queries are allowed, got '{}'",
            first_word.to_lowercase()
        )));
    }

    // One statement only. Semicolons inside string literals don't count;
    // a trailing semicolon is fine.
    let mut in_string = false;
    let mut chars = body.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '\'' => in_string = !in_string,
            ';' if !in_string => {
                if body[i + 1..].trim().is_empty() {
                    break;
                }
                return Err(DevacError::InvalidQuery(
                    "multiple statements are rejected on the read surface".to_string(),
                ));
            }
            _ => {}
        }
    }

    Ok(())
}

fn strip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = match after.find('\n') {
                Some(pos) => after[pos + 1..].trim_start(),
                None => "",
            };
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = match after.find("*/") {
                Some(pos) => after[pos + 2..].trim_start(),
                None => "",
            };
        } else {
            return rest;
        }
    }
}

fn value_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(hex::encode(b)),
    }
}

fn db_err(e: rusqlite::Error) -> DevacError {
    DevacError::Database(e.to_string())
}
