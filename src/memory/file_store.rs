//! 文件后端：一条记录一个 JSON 文件，按用户、日期分区
//!
//! - 记录：<root>/<user>/memory/episodic/YYYY/YYYY-MM-DD/<id>.json
//! - 标记：<root>/<user>/state/markers/<key>.json
//!
//! 写入先落临时文件再 rename，取消或崩溃不会留下半条记录。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use walkdir::WalkDir;

use crate::core::StorageError;
use crate::memory::episodic::{encode_path_component, EpisodicRecord, EpisodicStore, Marker};

pub(crate) async fn blocking<T, F>(f: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Join(e.to_string()))?
}

/// 先写临时文件再 rename
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[derive(Debug)]
pub struct FileEpisodicStore {
    root: PathBuf,
    /// 进程内串行化标记 CAS
    marker_lock: Mutex<()>,
}

impl FileEpisodicStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            marker_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn episodic_dir(&self, user_id: &str) -> PathBuf {
        self.root
            .join(encode_path_component(user_id))
            .join("memory")
            .join("episodic")
    }

    fn day_dir(&self, user_id: &str, day: NaiveDate) -> PathBuf {
        self.episodic_dir(user_id)
            .join(day.format("%Y").to_string())
            .join(day.format("%Y-%m-%d").to_string())
    }

    fn record_path(&self, user_id: &str, record: &EpisodicRecord) -> PathBuf {
        self.day_dir(user_id, record.timestamp.date_naive())
            .join(format!("{}.json", encode_path_component(&record.id)))
    }

    fn marker_path(&self, user_id: &str, key: &str) -> PathBuf {
        self.root
            .join(encode_path_component(user_id))
            .join("state")
            .join("markers")
            .join(format!("{}.json", encode_path_component(key)))
    }
}

fn read_marker_file(path: &Path) -> Result<Option<Marker>, StorageError> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(Some(serde_json::from_str(&s)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn scan_day_dir(
    dir: &Path,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
    out: &mut Vec<EpisodicRecord>,
) {
    if !dir.exists() {
        return;
    }
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != "json") {
            continue;
        }
        let parsed = std::fs::read_to_string(path)
            .map_err(StorageError::from)
            .and_then(|s| serde_json::from_str::<EpisodicRecord>(&s).map_err(StorageError::from));
        match parsed {
            Ok(record) if record.timestamp >= since && record.timestamp <= until => {
                out.push(record)
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record"),
        }
    }
}

#[async_trait]
impl EpisodicStore for FileEpisodicStore {
    async fn append(&self, user_id: &str, record: &EpisodicRecord) -> Result<(), StorageError> {
        let path = self.record_path(user_id, record);
        let bytes = serde_json::to_vec_pretty(record)?;
        blocking(move || {
            if path.exists() {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("record already exists: {}", path.display()),
                )));
            }
            write_atomic(&path, &bytes)
        })
        .await
    }

    async fn scan_range(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<EpisodicRecord>, StorageError> {
        if since > until {
            return Ok(Vec::new());
        }
        let mut day_dirs = Vec::new();
        let mut day = since.date_naive();
        let last = until.date_naive();
        while day <= last {
            day_dirs.push(self.day_dir(user_id, day));
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        blocking(move || {
            let mut out = Vec::new();
            for dir in &day_dirs {
                scan_day_dir(dir, since, until, &mut out);
            }
            out.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
            Ok(out)
        })
        .await
    }

    async fn read_marker(&self, user_id: &str, key: &str) -> Result<Option<Marker>, StorageError> {
        let path = self.marker_path(user_id, key);
        blocking(move || read_marker_file(&path)).await
    }

    async fn compare_and_set_marker(
        &self,
        user_id: &str,
        key: &str,
        expected: Option<&Marker>,
        new: Option<&Marker>,
    ) -> Result<bool, StorageError> {
        let _guard = self.marker_lock.lock().await;
        let path = self.marker_path(user_id, key);
        let expected = expected.cloned();
        let new = new.cloned();
        blocking(move || {
            let current = read_marker_file(&path)?;
            if current != expected {
                return Ok(false);
            }
            match new {
                Some(m) => write_atomic(&path, &serde_json::to_vec_pretty(&m)?)?,
                None => {
                    if path.exists() {
                        std::fs::remove_file(&path)?;
                    }
                }
            }
            Ok(true)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryType;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_append_and_scan_partitioned_by_date() {
        let dir = TempDir::new().unwrap();
        let store = FileEpisodicStore::new(dir.path());
        let now = Utc::now();
        let old = EpisodicRecord::new(MemoryType::Conversation, "old")
            .with_timestamp(now - chrono::Duration::days(10));
        let recent = EpisodicRecord::new(MemoryType::Conversation, "recent")
            .with_timestamp(now - chrono::Duration::hours(1));
        store.append("alice", &old).await.unwrap();
        store.append("alice", &recent).await.unwrap();

        let path = store.record_path("alice", &recent);
        assert!(path.starts_with(dir.path().join("alice").join("memory").join("episodic")));
        assert!(path.exists());

        let hits = store
            .scan_range("alice", now - chrono::Duration::days(3), now)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "recent");

        let other = store
            .scan_range("bob", now - chrono::Duration::days(30), now)
            .await
            .unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_append_is_append_only() {
        let dir = TempDir::new().unwrap();
        let store = FileEpisodicStore::new(dir.path());
        let r = EpisodicRecord::new(MemoryType::Summary, "s");
        store.append("alice", &r).await.unwrap();
        assert!(store.append("alice", &r).await.is_err());
    }

    #[tokio::test]
    async fn test_marker_compare_and_set() {
        let dir = TempDir::new().unwrap();
        let store = FileEpisodicStore::new(dir.path());
        let m1 = Marker::new("summarizing", "a");
        let m2 = Marker::new("summarizing", "b");

        assert!(store
            .compare_and_set_marker("alice", "k", None, Some(&m1))
            .await
            .unwrap());
        // 已存在标记时，expected=None 的 CAS 失败
        assert!(!store
            .compare_and_set_marker("alice", "k", None, Some(&m2))
            .await
            .unwrap());
        assert_eq!(store.read_marker("alice", "k").await.unwrap(), Some(m1.clone()));

        assert!(store
            .compare_and_set_marker("alice", "k", Some(&m1), None)
            .await
            .unwrap());
        assert_eq!(store.read_marker("alice", "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_similar_user_ids_do_not_share_partition() {
        let dir = TempDir::new().unwrap();
        let store = FileEpisodicStore::new(dir.path());
        let now = Utc::now();
        let private = EpisodicRecord::new(MemoryType::Conversation, "alice private");
        store.append("alice.smith", &private).await.unwrap();

        let since = now - chrono::Duration::days(1);
        let until = now + chrono::Duration::minutes(1);
        assert!(store.scan_range("alice_smith", since, until).await.unwrap().is_empty());
        assert_eq!(store.scan_range("alice.smith", since, until).await.unwrap().len(), 1);

        let m = Marker::new("summarizing", "s1");
        assert!(store
            .compare_and_set_marker("bob@home", "k", None, Some(&m))
            .await
            .unwrap());
        assert_eq!(store.read_marker("bob_home", "k").await.unwrap(), None);
    }
}
