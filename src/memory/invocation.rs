//! 工具调用记录：每次工具调用（成功或失败）在策略允许时异步写为情节记忆
//!
//! 写入失败只记日志，不影响主任务，也不会回滚或重试已完成的工具效果。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::core::RequestContext;
use crate::memory::{EpisodicRecord, EpisodicStore, MemoryType};
use crate::policy::{self, SecurityPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub tool_name: String,
    pub timestamp: DateTime<Utc>,
    pub inputs: serde_json::Value,
    pub outputs: serde_json::Value,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl ToolInvocation {
    pub fn new(
        tool_name: impl Into<String>,
        inputs: serde_json::Value,
        outputs: serde_json::Value,
        success: bool,
    ) -> Self {
        Self {
            id: format!("tool-{}", uuid::Uuid::new_v4()),
            tool_name: tool_name.into(),
            timestamp: Utc::now(),
            inputs,
            outputs,
            success,
            error: None,
            execution_time_ms: None,
        }
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }

    pub fn with_execution_time(mut self, ms: u64) -> Self {
        self.execution_time_ms = Some(ms);
        self
    }

    pub fn to_record(&self, conversation_id: Option<String>) -> EpisodicRecord {
        let status = if self.success { "succeeded" } else { "failed" };
        EpisodicRecord::new(
            MemoryType::ToolInvocation,
            format!("Tool {} {}", self.tool_name, status),
        )
        .with_timestamp(self.timestamp)
        .with_conversation(conversation_id)
        .with_tags(vec!["tool".to_string(), self.tool_name.clone()])
        .with_metadata(serde_json::to_value(self).unwrap_or(serde_json::Value::Null))
    }

    /// 从情节记录还原；类型不符或元数据缺失时返回 None
    pub fn from_record(record: &EpisodicRecord) -> Option<Self> {
        if record.kind != MemoryType::ToolInvocation {
            return None;
        }
        serde_json::from_value(record.metadata.clone()).ok()
    }
}

/// 工具调用捕获器
#[derive(Clone)]
pub struct InvocationRecorder {
    store: Arc<dyn EpisodicStore>,
}

impl InvocationRecorder {
    pub fn new(store: Arc<dyn EpisodicStore>) -> Self {
        Self { store }
    }

    /// 策略是否允许捕获该工具调用
    pub fn permits(policy: &SecurityPolicy, tool_name: &str) -> bool {
        policy::should_capture_tool(policy.mode, tool_name)
            && policy::memory::can_write_memory(policy.mode, MemoryType::ToolInvocation)
            && policy.can_write_memory
    }

    /// 异步写入；策略不允许时返回 None
    pub fn record(
        &self,
        ctx: &RequestContext,
        policy: &SecurityPolicy,
        mut invocation: ToolInvocation,
    ) -> Option<JoinHandle<()>> {
        if !Self::permits(policy, &invocation.tool_name) {
            tracing::debug!(
                tool = %invocation.tool_name,
                mode = %policy.mode,
                role = %policy.role,
                "tool capture skipped by policy"
            );
            return None;
        }
        invocation.outputs =
            policy::filter_tool_outputs(&invocation.outputs, policy.role, &invocation.tool_name);
        let record = invocation.to_record(ctx.conversation_id.clone());
        let store = Arc::clone(&self.store);
        let user_id = ctx.user_id.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = store.append(&user_id, &record).await {
                tracing::warn!(tool = %invocation.tool_name, error = %e, "tool capture failed");
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::FileEpisodicStore;
    use crate::policy::{CognitiveMode, UserRole};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_record_roundtrip_through_metadata() {
        let inv = ToolInvocation::new("task_list", json!({}), json!({"count": 3}), true)
            .with_execution_time(12);
        let record = inv.to_record(Some("conv-1".into()));
        assert_eq!(record.kind, MemoryType::ToolInvocation);
        assert_eq!(record.conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(ToolInvocation::from_record(&record), Some(inv));
    }

    #[tokio::test]
    async fn test_capture_written_in_dual() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileEpisodicStore::new(dir.path()));
        let recorder = InvocationRecorder::new(store.clone());
        let ctx = RequestContext::new("alice", UserRole::Owner, CognitiveMode::Dual)
            .with_conversation("c1");
        let inv = ToolInvocation::new("fs_read", json!({"path": "a.md"}), json!({}), false)
            .with_error(Some("not found".into()));
        let handle = recorder.record(&ctx, &ctx.policy(), inv).expect("capture permitted");
        handle.await.unwrap();

        let now = Utc::now();
        let records = store
            .scan_range("alice", now - chrono::Duration::days(1), now)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].content.contains("failed"));
    }

    #[test]
    fn test_capture_denied_in_emulation_and_for_chat_in_agent() {
        let emulation = SecurityPolicy::new(CognitiveMode::Emulation, UserRole::Owner);
        assert!(!InvocationRecorder::permits(&emulation, "task_list"));
        let agent = SecurityPolicy::new(CognitiveMode::Agent, UserRole::Owner);
        assert!(InvocationRecorder::permits(&agent, "task_list"));
        assert!(!InvocationRecorder::permits(&agent, "conversational_response"));
        let guest = SecurityPolicy::new(CognitiveMode::Dual, UserRole::Guest);
        assert!(!InvocationRecorder::permits(&guest, "task_list"));
    }
}
