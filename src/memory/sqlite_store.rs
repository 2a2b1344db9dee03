//! SQLite 后端：同一窄接口的可插拔实现（records + markers 两张表）

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::core::StorageError;
use crate::memory::episodic::{encode_path_component, EpisodicRecord, EpisodicStore, Marker};
use crate::memory::file_store::blocking;

fn ts_key(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn lock_err() -> StorageError {
    StorageError::Join("sqlite connection lock poisoned".to_string())
}

#[derive(Clone)]
pub struct SqliteEpisodicStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEpisodicStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                ts TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (user_id, id)
            );
            CREATE INDEX IF NOT EXISTS idx_records_user_ts ON records(user_id, ts);
            CREATE TABLE IF NOT EXISTS markers (
                user_id TEXT NOT NULL,
                key TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (user_id, key)
            );",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn load_marker(conn: &Connection, user: &str, key: &str) -> Result<Option<Marker>, StorageError> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM markers WHERE user_id = ?1 AND key = ?2",
            params![user, key],
            |row| row.get(0),
        )
        .optional()?;
    match body {
        Some(b) => Ok(Some(serde_json::from_str(&b)?)),
        None => Ok(None),
    }
}

#[async_trait]
impl EpisodicStore for SqliteEpisodicStore {
    async fn append(&self, user_id: &str, record: &EpisodicRecord) -> Result<(), StorageError> {
        let conn = Arc::clone(&self.conn);
        let user = encode_path_component(user_id);
        let body = serde_json::to_string(record)?;
        let id = record.id.clone();
        let kind = record.kind.as_str().to_string();
        let ts = ts_key(&record.timestamp);
        blocking(move || {
            let conn = conn.lock().map_err(|_| lock_err())?;
            conn.execute(
                "INSERT INTO records (id, user_id, kind, ts, body) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, user, kind, ts, body],
            )?;
            Ok(())
        })
        .await
    }

    async fn scan_range(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<EpisodicRecord>, StorageError> {
        let conn = Arc::clone(&self.conn);
        let user = encode_path_component(user_id);
        let (from, to) = (ts_key(&since), ts_key(&until));
        blocking(move || {
            let conn = conn.lock().map_err(|_| lock_err())?;
            let mut stmt = conn.prepare(
                "SELECT body FROM records WHERE user_id = ?1 AND ts >= ?2 AND ts <= ?3 ORDER BY ts ASC",
            )?;
            let bodies = stmt
                .query_map(params![user, from, to], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            let mut out = Vec::with_capacity(bodies.len());
            for body in bodies {
                match serde_json::from_str::<EpisodicRecord>(&body) {
                    Ok(r) => out.push(r),
                    Err(e) => tracing::warn!(error = %e, "skipping unreadable sqlite record"),
                }
            }
            Ok(out)
        })
        .await
    }

    async fn read_marker(&self, user_id: &str, key: &str) -> Result<Option<Marker>, StorageError> {
        let conn = Arc::clone(&self.conn);
        let user = encode_path_component(user_id);
        let key = key.to_string();
        blocking(move || {
            let conn = conn.lock().map_err(|_| lock_err())?;
            load_marker(&conn, &user, &key)
        })
        .await
    }

    async fn compare_and_set_marker(
        &self,
        user_id: &str,
        key: &str,
        expected: Option<&Marker>,
        new: Option<&Marker>,
    ) -> Result<bool, StorageError> {
        let conn = Arc::clone(&self.conn);
        let user = encode_path_component(user_id);
        let key = key.to_string();
        let expected = expected.cloned();
        let new_body = new.map(serde_json::to_string).transpose()?;
        blocking(move || {
            let mut conn = conn.lock().map_err(|_| lock_err())?;
            let tx = conn.transaction()?;
            let current = load_marker(&tx, &user, &key)?;
            if current != expected {
                return Ok(false);
            }
            match new_body {
                Some(body) => {
                    tx.execute(
                        "INSERT INTO markers (user_id, key, body) VALUES (?1, ?2, ?3)
                         ON CONFLICT(user_id, key) DO UPDATE SET body = excluded.body",
                        params![user, key, body],
                    )?;
                }
                None => {
                    tx.execute(
                        "DELETE FROM markers WHERE user_id = ?1 AND key = ?2",
                        params![user, key],
                    )?;
                }
            }
            tx.commit()?;
            Ok(true)
        })
        .await
    }
}
