//! 任务技能：task_list（只读）与 task_create（变更）

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::{RequestContext, SkillError};
use crate::memory::{ProfileStore, TaskItem};
use crate::tools::registry::{Skill, SkillCategory};

fn storage_failure(e: impl std::fmt::Display) -> SkillError {
    SkillError::classified(format!("task store: {e}"))
}

pub struct TaskListSkill {
    profiles: Arc<dyn ProfileStore>,
}

impl TaskListSkill {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self { profiles }
    }
}

#[async_trait]
impl Skill for TaskListSkill {
    fn name(&self) -> &str {
        "task_list"
    }

    fn description(&self) -> &str {
        "List the user's active (not done) tasks. No args."
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tasks": { "type": "array" },
                "count": { "type": "integer" }
            }
        })
    }

    fn category(&self) -> SkillCategory {
        SkillCategory::Retrieval
    }

    async fn execute(&self, ctx: &RequestContext, _inputs: Value) -> Result<Value, SkillError> {
        let tasks = self
            .profiles
            .active_tasks(&ctx.user_id)
            .await
            .map_err(storage_failure)?;
        let items: Vec<Value> = tasks
            .iter()
            .map(|t| {
                json!({
                    "id": t.id,
                    "title": t.title,
                    "status": t.status,
                    "priority": t.priority,
                })
            })
            .collect();
        Ok(json!({ "tasks": items, "count": tasks.len() }))
    }
}

pub struct TaskCreateSkill {
    profiles: Arc<dyn ProfileStore>,
}

impl TaskCreateSkill {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self { profiles }
    }
}

#[async_trait]
impl Skill for TaskCreateSkill {
    fn name(&self) -> &str {
        "task_create"
    }

    fn description(&self) -> &str {
        "Create a task. Args: {\"title\": \"...\", \"priority\": \"low|medium|high\" (optional)}"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "priority": { "type": "string" }
            },
            "required": ["title"]
        })
    }

    fn category(&self) -> SkillCategory {
        SkillCategory::Mutation
    }

    fn write_targets(&self, ctx: &RequestContext, _inputs: &Value) -> Vec<PathBuf> {
        self.profiles.task_file(&ctx.user_id).into_iter().collect()
    }

    async fn execute(&self, ctx: &RequestContext, inputs: Value) -> Result<Value, SkillError> {
        let title = inputs
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();
        let mut task = TaskItem::new(title);
        task.priority = inputs
            .get("priority")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let id = task.id.clone();
        let title = task.title.clone();
        self.profiles
            .add_task(&ctx.user_id, task)
            .await
            .map_err(storage_failure)?;
        Ok(json!({ "id": id, "title": title, "created": true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::JsonProfileStore;
    use crate::policy::{CognitiveMode, UserRole};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_then_list() {
        let dir = TempDir::new().unwrap();
        let profiles = Arc::new(JsonProfileStore::new(dir.path()));
        let ctx = RequestContext::new("alice", UserRole::Owner, CognitiveMode::Dual);
        let create = TaskCreateSkill::new(profiles.clone());
        create
            .execute(&ctx, json!({"title": "Water plants", "priority": "high"}))
            .await
            .unwrap();
        create
            .execute(&ctx, json!({"title": "Call mom"}))
            .await
            .unwrap();

        let out = TaskListSkill::new(profiles.clone())
            .execute(&ctx, json!({}))
            .await
            .unwrap();
        assert_eq!(out["count"], 2);
        assert_eq!(out["tasks"][0]["title"], "Water plants");
        assert_eq!(out["tasks"][0]["priority"], "high");

        let targets = create.write_targets(&ctx, &json!({}));
        assert_eq!(targets, vec![profiles.tasks_path("alice")]);
    }
}
