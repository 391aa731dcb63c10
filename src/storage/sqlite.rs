//! SQLite storage backend

use super::traits::{
    BranchChange, DeleteCriteria, DocFilter, DocumentStore, OpenStore, StorageError,
    StorageResult, Versioned, Visibility,
};
use crate::branch::{Branch, BranchPath, Timepoint};
use crate::model::{DocKind, Document};
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

/// Upper bound on ids bound into one `IN (...)` list
const MAX_BOUND_IDS: usize = 500;

/// SQLite-backed document store
///
/// Document versions and branch versions live in two tables of one
/// database. Thread-safe via internal mutex on the connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            -- One row per document version
            CREATE TABLE IF NOT EXISTS documents (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                ref_id TEXT NOT NULL,
                path TEXT NOT NULL,
                version_start INTEGER NOT NULL,
                version_end INTEGER,
                body_json TEXT NOT NULL,
                PRIMARY KEY (kind, id, path, version_start)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_path_kind
                ON documents(path, kind, id);
            CREATE INDEX IF NOT EXISTS idx_documents_ref
                ON documents(path, kind, ref_id);
            CREATE INDEX IF NOT EXISTS idx_documents_start
                ON documents(path, version_start);
            CREATE INDEX IF NOT EXISTS idx_documents_end
                ON documents(path, version_end);

            -- One row per branch version
            CREATE TABLE IF NOT EXISTS branches (
                path TEXT NOT NULL,
                version_start INTEGER NOT NULL,
                version_end INTEGER,
                body_json TEXT NOT NULL,
                PRIMARY KEY (path, version_start)
            );

            CREATE INDEX IF NOT EXISTS idx_branches_live
                ON branches(version_end, path);

            -- Enable WAL mode for concurrent reads during writes
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn row_to_version(
        path: String,
        start: i64,
        end: Option<i64>,
        body_json: &str,
    ) -> StorageResult<Versioned> {
        let path = BranchPath::new(path).map_err(|e| StorageError::InvalidRecord(e.to_string()))?;
        let document: Document = serde_json::from_str(body_json)?;
        Ok(Versioned {
            path,
            start: Timepoint::from_millis(start),
            end: end.map(Timepoint::from_millis),
            document,
        })
    }

    fn upsert_branch(conn: &Connection, branch: &Branch) -> StorageResult<()> {
        let body_json = serde_json::to_string(branch)?;
        conn.execute(
            r#"
            INSERT INTO branches (path, version_start, version_end, body_json)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(path, version_start) DO UPDATE SET
                version_end = excluded.version_end,
                body_json = excluded.body_json
            "#,
            params![
                branch.path.as_str(),
                branch.start.as_millis(),
                branch.end.map(|t| t.as_millis()),
                body_json,
            ],
        )?;
        Ok(())
    }

    fn query_branches<P: rusqlite::Params>(
        conn: &Connection,
        sql: &str,
        args: P,
    ) -> StorageResult<Vec<Branch>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, |row| row.get::<_, String>(0))?;

        let mut branches = Vec::new();
        for row in rows {
            branches.push(serde_json::from_str(&row?)?);
        }
        Ok(branches)
    }
}

/// Split an id set into lists small enough to bind
fn chunks(ids: &BTreeSet<String>) -> Vec<Vec<&String>> {
    let all: Vec<&String> = ids.iter().collect();
    all.chunks(MAX_BOUND_IDS).map(|c| c.to_vec()).collect()
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// SQL condition selecting the versions a visibility can admit
///
/// Each branch path only contributes versions live at its own timepoint.
/// Replaced ids are left to `Visibility::admits`.
fn window_clause(visibility: &Visibility) -> (String, Vec<Box<dyn ToSql>>) {
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();
    match visibility {
        Visibility::Branch(criteria) => {
            let mut clauses = vec![live_on(&mut params, &criteria.path, criteria.timepoint)];
            for clause in &criteria.inherited {
                clauses.push(live_on(&mut params, &clause.path, clause.timepoint));
            }
            (format!("({})", clauses.join(" OR ")), params)
        }
        Visibility::Changed { path, after, up_to } => {
            let mut sql = String::from("path = ? AND (version_start > ? OR version_end > ?)");
            params.push(Box::new(path.as_str().to_string()));
            params.push(Box::new(after.as_millis()));
            params.push(Box::new(after.as_millis()));
            if let Some(up_to) = up_to {
                sql.push_str(" AND (version_start <= ? OR version_end <= ?)");
                params.push(Box::new(up_to.as_millis()));
                params.push(Box::new(up_to.as_millis()));
            }
            (sql, params)
        }
    }
}

fn live_on(params: &mut Vec<Box<dyn ToSql>>, path: &BranchPath, timepoint: Timepoint) -> &'static str {
    params.push(Box::new(path.as_str().to_string()));
    params.push(Box::new(timepoint.as_millis()));
    params.push(Box::new(timepoint.as_millis()));
    "(path = ? AND version_start <= ? AND (version_end IS NULL OR version_end > ?))"
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl DocumentStore for SqliteStore {
    // === Document Operations ===

    fn save(&self, versions: &[Versioned]) -> StorageResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO documents (kind, id, ref_id, path, version_start, version_end, body_json)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(kind, id, path, version_start) DO UPDATE SET
                    ref_id = excluded.ref_id,
                    version_end = excluded.version_end,
                    body_json = excluded.body_json
                "#,
            )?;
            for version in versions {
                let body_json = serde_json::to_string(&version.document)?;
                stmt.execute(params![
                    version.kind().as_str(),
                    version.id(),
                    version.document.ref_id(),
                    version.path.as_str(),
                    version.start.as_millis(),
                    version.end.map(|t| t.as_millis()),
                    body_json,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn end_versions(
        &self,
        path: &BranchPath,
        kind: DocKind,
        ids: &BTreeSet<String>,
        at: Timepoint,
    ) -> StorageResult<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut ended = 0;
        for chunk in chunks(ids) {
            let sql = format!(
                "UPDATE documents SET version_end = ? \
                 WHERE path = ? AND kind = ? AND version_end IS NULL AND version_start < ? \
                 AND id IN ({})",
                placeholders(chunk.len())
            );
            let at_millis = at.as_millis();
            let path_str = path.as_str();
            let kind_str = kind.as_str();
            let mut args: Vec<&dyn ToSql> = Vec::with_capacity(chunk.len() + 4);
            args.push(&at_millis);
            args.push(&path_str);
            args.push(&kind_str);
            args.push(&at_millis);
            for id in &chunk {
                args.push(*id);
            }
            ended += tx.execute(&sql, args.as_slice())?;
        }
        tx.commit()?;
        Ok(ended)
    }

    fn query(&self, visibility: &Visibility, filter: &DocFilter) -> StorageResult<Vec<Versioned>> {
        let conn = self.conn.lock().unwrap();

        let (window, mut params_vec) = window_clause(visibility);
        let mut sql = format!(
            "SELECT path, version_start, version_end, body_json FROM documents WHERE {}",
            window
        );

        if let Some(kind) = filter.kind {
            sql.push_str(" AND kind = ?");
            params_vec.push(Box::new(kind.as_str()));
        }

        // Narrow entry scans by ancestor membership; the filter re-checks in full
        if let Some(ancestors) = &filter.ancestors_any {
            if !ancestors.is_empty() && ancestors.len() <= MAX_BOUND_IDS {
                sql.push_str(&format!(
                    " AND EXISTS (SELECT 1 FROM json_each(body_json, '$.ancestors') WHERE value IN ({}))",
                    placeholders(ancestors.len())
                ));
                for a in ancestors {
                    params_vec.push(Box::new(a.as_str().to_string()));
                }
            }
        }

        // Bind the id or ref list in chunks, one statement per chunk
        let (column, keys) = match (&filter.ids, &filter.refs) {
            (Some(ids), _) => ("id", Some(ids)),
            (None, Some(refs)) => ("ref_id", Some(refs)),
            (None, None) => ("id", None),
        };
        let key_chunks = match keys {
            Some(keys) if keys.is_empty() => return Ok(Vec::new()),
            Some(keys) => chunks(keys).into_iter().map(Some).collect(),
            None => vec![None],
        };

        let mut results = Vec::new();
        for chunk in key_chunks {
            let mut chunk_sql = sql.clone();
            let mut args: Vec<&dyn ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
            if let Some(chunk) = &chunk {
                chunk_sql.push_str(&format!(" AND {} IN ({})", column, placeholders(chunk.len())));
                for key in chunk {
                    args.push(*key);
                }
            }

            let mut stmt = conn.prepare(&chunk_sql)?;
            let rows = stmt.query_map(args.as_slice(), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?;

            for row in rows {
                let (path, start, end, body_json) = row?;
                let version = Self::row_to_version(path, start, end, &body_json)?;
                if visibility.admits(&version) && filter.matches(&version.document) {
                    results.push(version);
                }
            }
        }

        results.sort_by(|a, b| {
            (a.kind(), a.id(), &a.path, a.start).cmp(&(b.kind(), b.id(), &b.path, b.start))
        });
        Ok(results)
    }

    fn delete(&self, criteria: &DeleteCriteria) -> StorageResult<usize> {
        let mut conn = self.conn.lock().unwrap();

        let mut sql = String::from("DELETE FROM documents WHERE path = ?");
        let mut params_vec: Vec<Box<dyn ToSql>> = vec![Box::new(criteria.path.as_str().to_string())];
        if let Some(kind) = criteria.kind {
            sql.push_str(" AND kind = ?");
            params_vec.push(Box::new(kind.as_str()));
        }
        if let Some(started_at) = criteria.started_at {
            sql.push_str(" AND version_start = ?");
            params_vec.push(Box::new(started_at.as_millis()));
        }

        let tx = conn.transaction()?;
        let mut deleted = 0;
        match &criteria.ids {
            Some(ids) => {
                for chunk in chunks(ids) {
                    let chunk_sql = format!("{} AND id IN ({})", sql, placeholders(chunk.len()));
                    let mut args: Vec<&dyn ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
                    for id in &chunk {
                        args.push(*id);
                    }
                    deleted += tx.execute(&chunk_sql, args.as_slice())?;
                }
            }
            None => {
                let args: Vec<&dyn ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
                deleted += tx.execute(&sql, args.as_slice())?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }

    fn revert(&self, path: &BranchPath, at: Timepoint) -> StorageResult<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM documents WHERE path = ?1 AND version_start = ?2",
            params![path.as_str(), at.as_millis()],
        )?;
        let reopened = tx.execute(
            "UPDATE documents SET version_end = NULL WHERE path = ?1 AND version_end = ?2",
            params![path.as_str(), at.as_millis()],
        )?;
        tx.commit()?;
        Ok(deleted + reopened)
    }

    fn latest_timepoint(&self) -> StorageResult<Option<Timepoint>> {
        let conn = self.conn.lock().unwrap();
        let latest: Option<i64> = conn.query_row(
            r#"
            SELECT MAX(t) FROM (
                SELECT MAX(version_start) AS t FROM documents
                UNION ALL SELECT MAX(version_end) FROM documents
                UNION ALL SELECT MAX(version_start) FROM branches
                UNION ALL SELECT MAX(version_end) FROM branches
            )
            "#,
            [],
            |row| row.get(0),
        )?;
        Ok(latest.map(Timepoint::from_millis))
    }

    // === Branch Operations ===

    fn branch_versions(&self, path: &BranchPath) -> StorageResult<Vec<Branch>> {
        let conn = self.conn.lock().unwrap();
        Self::query_branches(
            &conn,
            "SELECT body_json FROM branches WHERE path = ?1 ORDER BY version_start",
            params![path.as_str()],
        )
    }

    fn latest_branch(&self, path: &BranchPath) -> StorageResult<Option<Branch>> {
        let conn = self.conn.lock().unwrap();
        let body: Option<String> = conn
            .query_row(
                "SELECT body_json FROM branches WHERE path = ?1 AND version_end IS NULL",
                params![path.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn list_branches(&self) -> StorageResult<Vec<Branch>> {
        let conn = self.conn.lock().unwrap();
        Self::query_branches(
            &conn,
            "SELECT body_json FROM branches WHERE version_end IS NULL ORDER BY path",
            [],
        )
    }

    fn save_branch(&self, branch: &Branch) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        Self::upsert_branch(&conn, branch)
    }

    fn apply_branch_change(&self, change: &BranchChange) -> StorageResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for (path, start) in &change.remove {
            tx.execute(
                "DELETE FROM branches WHERE path = ?1 AND version_start = ?2",
                params![path.as_str(), start.as_millis()],
            )?;
        }
        for branch in &change.upsert {
            Self::upsert_branch(&tx, branch)?;
        }
        tx.commit()?;
        Ok(())
    }
}
