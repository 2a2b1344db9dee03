//! 会话摘要：带陈旧容忍互斥标记
//!
//! 开始昂贵的摘要 LLM 调用前写入 `summarizing` 标记；同一会话的并发触发看到新鲜标记即跳过。
//! 标记在完成后清除，超时（默认 5 分钟）视为陈旧并被覆盖，进程崩溃不会造成永久死锁。

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::core::{AgentError, RequestContext};
use crate::llm::{LlmClient, LlmOptions, LlmTask};
use crate::memory::conversation::render_transcript;
use crate::memory::{EpisodicRecord, EpisodicStore, Marker, MemoryType, Message};
use crate::policy;

const SUMMARY_PROMPT: &str = "Summarize the following conversation in a few sentences. \
Keep concrete facts (names, files, decisions, open tasks). Do not invent details.";

/// 每条消息拼入摘要提示的最大字符数
const MESSAGE_CHARS: usize = 800;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryOutcome {
    Written { record_id: String },
    SkippedInProgress,
    SkippedTooShort,
    SkippedPolicy,
    SkippedNoConversation,
}

pub struct ConversationSummarizer {
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn EpisodicStore>,
    marker_timeout: chrono::Duration,
    min_messages: usize,
}

fn marker_key(conversation_id: &str) -> String {
    format!("summarizing-{conversation_id}")
}

impl ConversationSummarizer {
    pub fn new(llm: Arc<dyn LlmClient>, store: Arc<dyn EpisodicStore>) -> Self {
        Self {
            llm,
            store,
            marker_timeout: chrono::Duration::minutes(5),
            min_messages: 2,
        }
    }

    pub fn with_marker_timeout(mut self, secs: u64) -> Self {
        self.marker_timeout = chrono::Duration::seconds(secs as i64);
        self
    }

    pub fn with_min_messages(mut self, n: usize) -> Self {
        self.min_messages = n;
        self
    }

    /// 尝试获取标记：无标记或标记陈旧时 CAS 写入自己的标记
    async fn acquire(
        &self,
        user_id: &str,
        key: &str,
        owner: &str,
    ) -> Result<Option<Marker>, AgentError> {
        let current = self.store.read_marker(user_id, key).await?;
        if let Some(ref m) = current {
            if !m.is_stale(Utc::now(), self.marker_timeout) {
                return Ok(None);
            }
            tracing::warn!(key = %key, owner = %m.owner, "overriding stale summarization marker");
        }
        let mine = Marker::new("summarizing", owner);
        let won = self
            .store
            .compare_and_set_marker(user_id, key, current.as_ref(), Some(&mine))
            .await?;
        Ok(won.then_some(mine))
    }

    pub async fn summarize(
        &self,
        ctx: &RequestContext,
        messages: &[Message],
    ) -> Result<SummaryOutcome, AgentError> {
        let Some(conversation_id) = ctx.conversation_id.as_deref() else {
            return Ok(SummaryOutcome::SkippedNoConversation);
        };
        if !policy::memory::can_write_memory(ctx.mode, MemoryType::Summary)
            || !ctx.policy().can_write_memory
        {
            return Ok(SummaryOutcome::SkippedPolicy);
        }
        if messages.len() < self.min_messages {
            return Ok(SummaryOutcome::SkippedTooShort);
        }

        let key = marker_key(conversation_id);
        let Some(marker) = self.acquire(&ctx.user_id, &key, &ctx.session_id).await? else {
            tracing::info!(conversation = %conversation_id, "summarization already in progress, skipping");
            return Ok(SummaryOutcome::SkippedInProgress);
        };

        let result = self.run_summary(ctx, conversation_id, messages).await;

        // 无论成功与否都释放自己的标记；若已被他人覆盖则 CAS 失败，保持原样
        if let Err(e) = self
            .store
            .compare_and_set_marker(&ctx.user_id, &key, Some(&marker), None)
            .await
        {
            tracing::warn!(error = %e, "failed to clear summarization marker");
        }
        result
    }

    async fn run_summary(
        &self,
        ctx: &RequestContext,
        conversation_id: &str,
        messages: &[Message],
    ) -> Result<SummaryOutcome, AgentError> {
        let transcript = render_transcript(messages, MESSAGE_CHARS);
        let prompt = vec![Message::system(SUMMARY_PROMPT), Message::user(transcript)];
        let summary = self
            .llm
            .complete(&prompt, &LlmOptions::for_task(LlmTask::Summarizing).with_temperature(0.2))
            .await
            .map_err(|e| AgentError::Llm(e.to_string()))?;

        let record = EpisodicRecord::new(MemoryType::Summary, summary.trim())
            .with_conversation(Some(conversation_id.to_string()))
            .with_tags(vec!["summary".to_string(), "conversation".to_string()])
            .with_metadata(serde_json::json!({ "message_count": messages.len() }));
        self.store.append(&ctx.user_id, &record).await?;
        tracing::info!(conversation = %conversation_id, record = %record.id, "conversation summary written");
        Ok(SummaryOutcome::Written {
            record_id: record.id,
        })
    }
}

/// 在已扫描的记录中找出会话最近一条摘要（记录按时间升序）
pub fn find_latest_summary(records: &[EpisodicRecord], conversation_id: &str) -> Option<String> {
    records
        .iter()
        .rev()
        .find(|r| {
            r.kind == MemoryType::Summary && r.conversation_id.as_deref() == Some(conversation_id)
        })
        .map(|r| r.content.clone())
}

/// 读取会话最近一条摘要（回看窗口内）
pub async fn latest_summary(
    store: &dyn EpisodicStore,
    user_id: &str,
    conversation_id: &str,
    since: DateTime<Utc>,
) -> Result<Option<String>, AgentError> {
    let records = store.scan_range(user_id, since, Utc::now()).await?;
    Ok(find_latest_summary(&records, conversation_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::memory::FileEpisodicStore;
    use crate::policy::{CognitiveMode, UserRole};
    use tempfile::TempDir;

    fn convo() -> Vec<Message> {
        vec![Message::user("plan the garden"), Message::assistant("sure")]
    }

    #[tokio::test]
    async fn test_writes_summary_and_clears_marker() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileEpisodicStore::new(dir.path()));
        let llm = Arc::new(ScriptedLlmClient::new(["Talked about the garden."]));
        let s = ConversationSummarizer::new(llm.clone(), store.clone());
        let ctx = RequestContext::new("alice", UserRole::Owner, CognitiveMode::Dual)
            .with_conversation("c1");

        let out = s.summarize(&ctx, &convo()).await.unwrap();
        assert!(matches!(out, SummaryOutcome::Written { .. }));
        assert!(store
            .read_marker("alice", &marker_key("c1"))
            .await
            .unwrap()
            .is_none());

        let since = Utc::now() - chrono::Duration::days(7);
        let latest = latest_summary(store.as_ref(), "alice", "c1", since).await.unwrap();
        assert_eq!(latest.as_deref(), Some("Talked about the garden."));
    }

    #[tokio::test]
    async fn test_stale_marker_is_overridden() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileEpisodicStore::new(dir.path()));
        let mut stale = Marker::new("summarizing", "crashed");
        stale.updated_at = Utc::now() - chrono::Duration::minutes(10);
        store
            .compare_and_set_marker("alice", &marker_key("c1"), None, Some(&stale))
            .await
            .unwrap();

        let llm = Arc::new(ScriptedLlmClient::new(["ok"]));
        let s = ConversationSummarizer::new(llm.clone(), store.clone());
        let ctx = RequestContext::new("alice", UserRole::Owner, CognitiveMode::Dual)
            .with_conversation("c1");
        let out = s.summarize(&ctx, &convo()).await.unwrap();
        assert!(matches!(out, SummaryOutcome::Written { .. }));
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_fresh_marker_skips() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileEpisodicStore::new(dir.path()));
        let fresh = Marker::new("summarizing", "other");
        store
            .compare_and_set_marker("alice", &marker_key("c1"), None, Some(&fresh))
            .await
            .unwrap();
        let llm = Arc::new(ScriptedLlmClient::new(["never"]));
        let s = ConversationSummarizer::new(llm.clone(), store);
        let ctx = RequestContext::new("alice", UserRole::Owner, CognitiveMode::Dual)
            .with_conversation("c1");
        assert_eq!(
            s.summarize(&ctx, &convo()).await.unwrap(),
            SummaryOutcome::SkippedInProgress
        );
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_emulation_skips_by_policy() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileEpisodicStore::new(dir.path()));
        let llm = Arc::new(ScriptedLlmClient::new(["never"]));
        let s = ConversationSummarizer::new(llm.clone(), store);
        let ctx = RequestContext::new("alice", UserRole::Owner, CognitiveMode::Emulation)
            .with_conversation("c1");
        assert_eq!(
            s.summarize(&ctx, &convo()).await.unwrap(),
            SummaryOutcome::SkippedPolicy
        );
        assert_eq!(llm.calls(), 0);
    }
}
