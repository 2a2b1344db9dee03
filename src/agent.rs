//! Headless Agent 运行时
//!
//! AgentComponents::from_config 按配置构建存储、技能注册表、执行器、上下文构建器、推理引擎与摘要器；
//! process_goal 对单条目标依次执行：构建上下文 → ReAct 推理 → 追加会话并触发摘要。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::{AppConfig, MemoryBackend};
use crate::context::{ContextBuilder, ContextOptions};
use crate::core::{AgentError, RequestContext, StorageError};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::memory::{
    ConversationSummarizer, EpisodicStore, FileEpisodicStore, InvocationRecorder, JsonProfileStore,
    Message, ProfileStore, SemanticIndex, SqliteEpisodicStore, SummaryOutcome,
};
use crate::observability::{AuditSink, TracingAuditSink};
use crate::react::{
    Planner, ProgressSender, ReasoningDepth, ReasoningEngine, ReasoningSession, ResponseStyle,
    RunOutcome, RunResult,
};
use crate::tools::{builtin_registry, SafeFs, SkillExecutor, WritePathGuard};

/// 按 `[llm]` 段选择后端；未知 provider 回退到 mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    match cfg.llm.provider.as_str() {
        "openai" => Arc::new(
            OpenAiClient::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, None)
                .with_request_timeout(cfg.llm.timeouts.request),
        ),
        "mock" => Arc::new(MockLlmClient),
        other => {
            tracing::warn!(provider = %other, "unknown LLM provider, using mock");
            Arc::new(MockLlmClient)
        }
    }
}

/// 预构建的 Agent 组件，可在多个请求间共享
pub struct AgentComponents {
    pub store: Arc<dyn EpisodicStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub context: ContextBuilder,
    pub engine: ReasoningEngine,
    pub summarizer: ConversationSummarizer,
    pub depth: ReasoningDepth,
    pub response_style: ResponseStyle,
    /// 按 (用户, 会话) 累积的未摘要消息，用于摘要触发
    transcripts: Mutex<TranscriptBuffer>,
}

/// 同时跟踪的会话上限；超出时淘汰最久未活动的会话
const MAX_TRACKED_CONVERSATIONS: usize = 128;

type TranscriptKey = (String, String);

#[derive(Debug, Default)]
struct Transcript {
    messages: Vec<Message>,
    /// messages[0] 的全局序号
    first_seq: u64,
    last_touched: u64,
}

impl Transcript {
    fn end_seq(&self) -> u64 {
        self.first_seq + self.messages.len() as u64
    }

    /// 丢弃序号小于 seq 的消息
    fn drop_before(&mut self, seq: u64) {
        let n = (seq.saturating_sub(self.first_seq) as usize).min(self.messages.len());
        self.messages.drain(..n);
        self.first_seq += n as u64;
    }
}

/// 有界的会话消息缓冲：单会话消息数与会话数都有上限，摘要写入后清掉已摘要部分
#[derive(Debug)]
struct TranscriptBuffer {
    entries: HashMap<TranscriptKey, Transcript>,
    max_messages: usize,
    max_conversations: usize,
    clock: u64,
}

impl TranscriptBuffer {
    fn new(max_messages: usize, max_conversations: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_messages: max_messages.max(2),
            max_conversations: max_conversations.max(1),
            clock: 0,
        }
    }

    /// 追加一轮问答，返回当前未摘要消息的快照及其结束序号
    fn record(&mut self, key: TranscriptKey, goal: &str, response: &str) -> (Vec<Message>, u64) {
        self.clock += 1;
        let clock = self.clock;
        let max_messages = self.max_messages;
        let transcript = self.entries.entry(key).or_default();
        transcript.messages.push(Message::user(goal));
        transcript.messages.push(Message::assistant(response));
        transcript.last_touched = clock;
        if transcript.messages.len() > max_messages {
            let end = transcript.end_seq();
            transcript.drop_before(end - max_messages as u64);
        }
        let snapshot = (transcript.messages.clone(), transcript.end_seq());
        self.evict_idle();
        snapshot
    }

    /// 摘要已覆盖 end_seq 之前的消息
    fn mark_summarized(&mut self, key: &TranscriptKey, end_seq: u64) {
        if let Some(transcript) = self.entries.get_mut(key) {
            transcript.drop_before(end_seq);
            if transcript.messages.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    fn evict_idle(&mut self) {
        while self.entries.len() > self.max_conversations {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, t)| t.last_touched)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            tracing::debug!(conversation = %oldest.1, "evicting idle transcript");
            self.entries.remove(&oldest);
        }
    }

    #[cfg(test)]
    fn pending(&self, key: &TranscriptKey) -> usize {
        self.entries.get(key).map_or(0, |t| t.messages.len())
    }
}

impl AgentComponents {
    pub fn from_config(cfg: &AppConfig, llm: Arc<dyn LlmClient>) -> Result<Self, AgentError> {
        Self::with_audit(cfg, llm, Arc::new(TracingAuditSink))
    }

    pub fn with_audit(
        cfg: &AppConfig,
        llm: Arc<dyn LlmClient>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, AgentError> {
        let data_root = &cfg.app.data_root;
        std::fs::create_dir_all(data_root).map_err(StorageError::from)?;
        let workspace = cfg.workspace_root();
        std::fs::create_dir_all(&workspace).map_err(StorageError::from)?;

        let store: Arc<dyn EpisodicStore> = match cfg.memory.backend {
            MemoryBackend::File => Arc::new(FileEpisodicStore::new(data_root)),
            MemoryBackend::Sqlite => {
                Arc::new(SqliteEpisodicStore::open(data_root.join("episodic.sqlite3"))?)
            }
        };
        let profiles: Arc<dyn ProfileStore> = Arc::new(JsonProfileStore::new(data_root));

        let registry = builtin_registry(Arc::clone(&profiles), SafeFs::new(&workspace))?;
        let guard = WritePathGuard::with_protected_dirs(data_root, cfg.tools.protected_dirs.iter());
        let executor = Arc::new(
            SkillExecutor::new(Arc::new(registry), guard, cfg.tools.tool_timeout_secs)
                .with_audit(Arc::clone(&audit)),
        );

        let engine = ReasoningEngine::new(Planner::new(Arc::clone(&llm)), executor)
            .with_recorder(InvocationRecorder::new(Arc::clone(&store)))
            .with_audit(audit)
            .with_settings(cfg.engine_settings());
        let context = ContextBuilder::new(Arc::clone(&store), Arc::clone(&profiles))
            .with_settings(cfg.context_settings());
        let summarizer = ConversationSummarizer::new(llm, Arc::clone(&store))
            .with_marker_timeout(cfg.memory.summary_marker_timeout_secs)
            .with_min_messages(cfg.memory.summarize_after_messages);

        tracing::info!(
            data_root = %data_root.display(),
            workspace = %workspace.display(),
            backend = ?cfg.memory.backend,
            "agent components ready"
        );
        Ok(Self {
            store,
            profiles,
            context,
            engine,
            summarizer,
            depth: cfg.reasoning.default_depth,
            response_style: cfg.reasoning.response_style,
            transcripts: Mutex::new(TranscriptBuffer::new(
                cfg.memory.summarize_after_messages.saturating_mul(2),
                MAX_TRACKED_CONVERSATIONS,
            )),
        })
    }

    /// 接入语义索引；未接入时上下文构建降级为无语义记忆
    pub fn with_index(mut self, index: Arc<dyn SemanticIndex>) -> Self {
        self.context = self.context.with_index(index);
        self
    }
}

/// 对单条目标跑完整流程并返回运行结果
pub async fn process_goal(
    components: &AgentComponents,
    ctx: &RequestContext,
    goal: &str,
) -> RunOutcome {
    process_goal_with_progress(components, ctx, goal, None).await
}

pub async fn process_goal_with_progress(
    components: &AgentComponents,
    ctx: &RequestContext,
    goal: &str,
    progress: Option<&ProgressSender>,
) -> RunOutcome {
    let package = components
        .context
        .build_context_package(ctx, goal, &ContextOptions::default())
        .await;
    tracing::debug!(
        memories = package.memory_count,
        fallback = package.fallback_used,
        "context package built"
    );

    let mut session = ReasoningSession::new(ctx, goal, &package)
        .with_depth(components.depth)
        .with_response_style(components.response_style);
    if let Some(tx) = progress {
        session = session.with_progress(tx);
    }
    let outcome = components.engine.run(session).await;

    if let RunResult::Completed { response } = &outcome.result {
        maybe_summarize(components, ctx, goal, response).await;
    }
    outcome
}

/// 记录本轮对话；达到阈值时写会话摘要，失败只记日志
async fn maybe_summarize(
    components: &AgentComponents,
    ctx: &RequestContext,
    goal: &str,
    response: &str,
) {
    let Some(conversation_id) = ctx.conversation_id.clone() else {
        return;
    };
    let key = (ctx.user_id.clone(), conversation_id);
    let (messages, end_seq) = components
        .transcripts
        .lock()
        .await
        .record(key.clone(), goal, response);
    match components.summarizer.summarize(ctx, &messages).await {
        Ok(SummaryOutcome::Written { record_id }) => {
            tracing::info!(record = %record_id, "conversation summarized");
            components.transcripts.lock().await.mark_summarized(&key, end_seq);
        }
        Ok(skipped) => tracing::debug!(outcome = ?skipped, "summarization skipped"),
        Err(e) => tracing::warn!(error = %e, "summarization failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::memory::TaskItem;
    use crate::policy::{CognitiveMode, UserRole};
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.app.data_root = dir.path().join("profiles");
        cfg.tools.workspace_root = Some(dir.path().join("workspace"));
        cfg.memory.summarize_after_messages = 2;
        cfg
    }

    #[tokio::test]
    async fn test_process_goal_lists_tasks_and_summarizes() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLlmClient::new(["Owner asked for tasks."]));
        let components = AgentComponents::from_config(&config(&dir), llm.clone()).unwrap();
        components
            .profiles
            .add_task("owner", TaskItem::new("Renew passport"))
            .await
            .unwrap();

        let ctx = RequestContext::new("owner", UserRole::Owner, CognitiveMode::Dual)
            .with_conversation("conv-1");
        let outcome = process_goal(&components, &ctx, "list my tasks").await;
        assert_eq!(outcome.response(), Some("Active tasks (1):\n- Renew passport"));
        assert!(outcome.metadata.fast_path);
        // 唯一一次 LLM 调用来自摘要
        assert_eq!(llm.calls(), 1);
        let since = chrono::Utc::now() - chrono::Duration::days(7);
        let summary =
            crate::memory::latest_summary(components.store.as_ref(), "owner", "conv-1", since)
                .await
                .unwrap();
        assert_eq!(summary.as_deref(), Some("Owner asked for tasks."));

        let key = ("owner".to_string(), "conv-1".to_string());
        assert_eq!(components.transcripts.lock().await.pending(&key), 0);
    }

    fn key(conv: &str) -> TranscriptKey {
        ("owner".to_string(), conv.to_string())
    }

    #[test]
    fn test_transcript_trims_to_message_cap() {
        let mut buf = TranscriptBuffer::new(4, 8);
        for i in 0..5 {
            buf.record(key("c"), &format!("q{i}"), &format!("a{i}"));
        }
        let (messages, end) = buf.record(key("c"), "q5", "a5");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].content, "q4");
        assert_eq!(end, 12);
    }

    #[test]
    fn test_transcript_drains_summarized_prefix() {
        let mut buf = TranscriptBuffer::new(10, 8);
        let (_, end) = buf.record(key("c"), "q0", "a0");
        // 摘要进行期间又来一轮
        buf.record(key("c"), "q1", "a1");
        buf.mark_summarized(&key("c"), end);
        assert_eq!(buf.pending(&key("c")), 2);
        let (_, end) = buf.record(key("c"), "q2", "a2");
        buf.mark_summarized(&key("c"), end);
        assert_eq!(buf.pending(&key("c")), 0);
        assert!(buf.entries.is_empty());
    }

    #[test]
    fn test_transcript_evicts_idle_conversations() {
        let mut buf = TranscriptBuffer::new(10, 2);
        buf.record(key("a"), "q", "r");
        buf.record(key("b"), "q", "r");
        buf.record(key("a"), "q", "r");
        buf.record(key("c"), "q", "r");
        assert_eq!(buf.entries.len(), 2);
        assert_eq!(buf.pending(&key("b")), 0);
        assert_eq!(buf.pending(&key("a")), 4);
    }

    #[tokio::test]
    async fn test_sqlite_backend_builds() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.memory.backend = MemoryBackend::Sqlite;
        let components =
            AgentComponents::from_config(&cfg, Arc::new(ScriptedLlmClient::default())).unwrap();
        assert!(dir.path().join("profiles").join("episodic.sqlite3").exists());
        assert_eq!(components.depth, ReasoningDepth::Focused);
    }
}
