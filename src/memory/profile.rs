//! 人格与任务快照（JSON 文件）
//!
//! - 人格：<root>/<user>/persona/core.json（只读）
//! - 任务：<root>/<user>/tasks/active.json（task_create 追加）

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::core::StorageError;
use crate::memory::episodic::encode_path_component;
use crate::memory::file_store::blocking;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonaSummary {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub core_values: Vec<String>,
    #[serde(default)]
    pub communication_style: String,
}

impl PersonaSummary {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.identity.is_empty() && self.core_values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Blocked,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskItem {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TaskItem {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: format!("task-{}", uuid::Uuid::new_v4()),
            title: title.into(),
            status: TaskStatus::Todo,
            priority: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status != TaskStatus::Done
    }
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn persona(&self, user_id: &str) -> Result<PersonaSummary, StorageError>;

    /// 未完成的任务，按创建时间升序
    async fn active_tasks(&self, user_id: &str) -> Result<Vec<TaskItem>, StorageError>;

    async fn add_task(&self, user_id: &str, task: TaskItem) -> Result<(), StorageError>;

    /// 任务快照所在文件（文件后端才有）；写路径白名单检查用
    fn task_file(&self, _user_id: &str) -> Option<PathBuf> {
        None
    }
}

#[derive(Debug)]
pub struct JsonProfileStore {
    root: PathBuf,
    task_lock: Mutex<()>,
}

impl JsonProfileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            task_lock: Mutex::new(()),
        }
    }

    pub fn persona_path(&self, user_id: &str) -> PathBuf {
        self.root
            .join(encode_path_component(user_id))
            .join("persona")
            .join("core.json")
    }

    pub fn tasks_path(&self, user_id: &str) -> PathBuf {
        self.root
            .join(encode_path_component(user_id))
            .join("tasks")
            .join("active.json")
    }
}

fn read_tasks(path: &Path) -> Result<Vec<TaskItem>, StorageError> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(serde_json::from_str(&s)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl ProfileStore for JsonProfileStore {
    fn task_file(&self, user_id: &str) -> Option<PathBuf> {
        Some(self.tasks_path(user_id))
    }

    async fn persona(&self, user_id: &str) -> Result<PersonaSummary, StorageError> {
        let path = self.persona_path(user_id);
        blocking(move || match std::fs::read_to_string(&path) {
            Ok(s) => Ok(serde_json::from_str(&s)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PersonaSummary::default()),
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn active_tasks(&self, user_id: &str) -> Result<Vec<TaskItem>, StorageError> {
        let path = self.tasks_path(user_id);
        let mut tasks = blocking(move || read_tasks(&path)).await?;
        tasks.retain(TaskItem::is_active);
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(tasks)
    }

    async fn add_task(&self, user_id: &str, task: TaskItem) -> Result<(), StorageError> {
        let _guard = self.task_lock.lock().await;
        let path = self.tasks_path(user_id);
        blocking(move || {
            let mut tasks = read_tasks(&path)?;
            tasks.push(task);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, serde_json::to_vec_pretty(&tasks)?)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_files_are_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonProfileStore::new(dir.path());
        assert!(store.persona("alice").await.unwrap().is_empty());
        assert!(store.active_tasks("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_and_list_tasks_skips_done() {
        let dir = TempDir::new().unwrap();
        let store = JsonProfileStore::new(dir.path());
        store.add_task("alice", TaskItem::new("Buy seeds")).await.unwrap();
        let mut done = TaskItem::new("Old chore");
        done.status = TaskStatus::Done;
        store.add_task("alice", done).await.unwrap();
        let tasks = store.active_tasks("alice").await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Buy seeds");
    }

    #[tokio::test]
    async fn test_tasks_not_shared_between_similar_ids() {
        let dir = TempDir::new().unwrap();
        let store = JsonProfileStore::new(dir.path());
        store.add_task("bob@home", TaskItem::new("bob secret")).await.unwrap();
        assert!(store.active_tasks("bob_home").await.unwrap().is_empty());
        assert_eq!(store.active_tasks("bob@home").await.unwrap().len(), 1);
        assert_ne!(store.tasks_path("bob@home"), store.tasks_path("bob_home"));
    }
}
