use crate::app::ports::CheckpointStore;
use crate::constants::CHECKPOINT_DB_FILE;
use crate::error::{ConnectorError, Result};
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

/// Checkpoint kept in a SQLite database shared by every credential under the
/// checkpoint directory. Rows are scoped by the credential's checkpoint key.
pub struct SqliteCheckpointStore {
    db_path: PathBuf,
    scope: String,
    conn: Option<Mutex<Connection>>,
    ids: HashSet<String>,
    cursor: Option<String>,
}

impl SqliteCheckpointStore {
    pub fn new<P: Into<PathBuf>>(dir: P, scope: &str) -> Self {
        Self {
            db_path: dir.into().join(CHECKPOINT_DB_FILE),
            scope: scope.to_string(),
            conn: None,
            ids: HashSet::new(),
            cursor: None,
        }
    }

    fn conn_mut(&mut self) -> Result<&mut Connection> {
        self.conn
            .as_mut()
            .ok_or_else(|| ConnectorError::Checkpoint("checkpoint store used before initialize".into()))?
            .get_mut()
            .map_err(|_| ConnectorError::Checkpoint("checkpoint connection poisoned".into()))
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn initialize(&mut self) -> Result<()> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.db_path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=FULL;
            CREATE TABLE IF NOT EXISTS delivered_events (
                scope         TEXT NOT NULL,
                event_id      TEXT NOT NULL,
                delivered_at  INTEGER NOT NULL,
                PRIMARY KEY (scope, event_id)
            );
            CREATE TABLE IF NOT EXISTS journal_cursors (
                scope       TEXT PRIMARY KEY,
                cursor      TEXT NOT NULL,
                updated_at  INTEGER NOT NULL
            );
            "#,
        )?;

        let ids = {
            let mut stmt = conn.prepare("SELECT event_id FROM delivered_events WHERE scope = ?1")?;
            let rows = stmt.query_map(params![self.scope], |row| row.get::<_, String>(0))?;
            let ids = rows.collect::<std::result::Result<HashSet<_>, _>>()?;
            ids
        };

        let cursor = {
            let mut stmt = conn.prepare("SELECT cursor FROM journal_cursors WHERE scope = ?1")?;
            let mut rows = stmt.query(params![self.scope])?;
            let cursor = match rows.next()? {
                Some(row) => Some(row.get::<_, String>(0)?),
                None => None,
            };
            cursor
        };

        debug!(
            path = %self.db_path.display(),
            scope = %self.scope,
            delivered = ids.len(),
            cursor = ?cursor,
            "checkpoint loaded"
        );
        self.ids = ids;
        self.cursor = cursor;
        self.conn = Some(Mutex::new(conn));
        Ok(())
    }

    fn contains(&self, event_id: &str) -> bool {
        self.ids.contains(event_id)
    }

    fn append_batch(&mut self, event_ids: &[String]) -> Result<()> {
        if event_ids.is_empty() {
            return Ok(());
        }
        let scope = self.scope.clone();
        let now = chrono::Utc::now().timestamp();
        let conn = self.conn_mut()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO delivered_events (scope, event_id, delivered_at) VALUES (?1, ?2, ?3)",
            )?;
            for id in event_ids {
                stmt.execute(params![scope, id, now])?;
            }
        }
        tx.commit()?;

        self.ids.extend(event_ids.iter().cloned());
        Ok(())
    }

    fn last_cursor(&self) -> Option<String> {
        self.cursor.clone()
    }

    fn save_cursor(&mut self, cursor: &str) -> Result<()> {
        let scope = self.scope.clone();
        let now = chrono::Utc::now().timestamp();
        self.conn_mut()?.execute(
            "INSERT INTO journal_cursors (scope, cursor, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope) DO UPDATE SET cursor=excluded.cursor, updated_at=excluded.updated_at",
            params![scope, cursor, now],
        )?;
        self.cursor = Some(cursor.to_string());
        Ok(())
    }

    fn delivered_count(&self) -> usize {
        self.ids.len()
    }
}
