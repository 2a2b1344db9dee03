//! 上下文构建器：为一轮对话组装有界的上下文包
//!
//! 流程：意图分类 → 语义检索（索引缺失时降级，绝不报错）→ 阈值/类型/标签/角色过滤 →
//! 当前会话的近期工具调用 → 会话摘要 → 人格、任务、近期话题。
//! 所有读取都是只读的；独立的读取并发执行。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};

use crate::context::intent::{classify_intent, QueryIntent};
use crate::context::{
    ContextOptions, ContextPackage, DetectedPattern, IndexStatus, RelevantMemory,
};
use crate::core::RequestContext;
use crate::memory::{
    find_latest_summary, EpisodicRecord, EpisodicStore, IndexError, MemoryType, PersonaSummary,
    ProfileStore, SemanticIndex, ToolInvocation,
};
use crate::policy;

/// 构建参数（来自 `[context]` 配置段）
#[derive(Debug, Clone)]
pub struct ContextSettings {
    pub char_budget: usize,
    pub tool_lookback_days: i64,
    pub summary_lookback_days: i64,
    pub top_k: usize,
    pub default_threshold: f32,
    pub reflective_threshold: f32,
    pub max_topics: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            char_budget: 6000,
            tool_lookback_days: 3,
            summary_lookback_days: 7,
            top_k: 24,
            default_threshold: 0.62,
            reflective_threshold: 0.55,
            max_topics: 5,
        }
    }
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "that", "this", "with", "you", "your", "are", "was", "have", "what",
    "but", "not", "can", "will", "about", "from", "they", "there", "would", "could", "should",
    "just", "like", "into", "then", "them", "when", "where", "which", "while", "been", "also",
    "our", "out", "how", "why", "who", "all", "any", "some", "tool", "succeeded", "failed",
];

pub struct ContextBuilder {
    index: Option<Arc<dyn SemanticIndex>>,
    store: Arc<dyn EpisodicStore>,
    profiles: Arc<dyn ProfileStore>,
    settings: ContextSettings,
}

impl ContextBuilder {
    pub fn new(store: Arc<dyn EpisodicStore>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            index: None,
            store,
            profiles,
            settings: ContextSettings::default(),
        }
    }

    pub fn with_index(mut self, index: Arc<dyn SemanticIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_settings(mut self, settings: ContextSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    /// 组装上下文包；任何子步骤失败都只降级，不向调用方报错
    pub async fn build_context_package(
        &self,
        ctx: &RequestContext,
        query: &str,
        options: &ContextOptions,
    ) -> ContextPackage {
        let started = Instant::now();
        let intent = classify_intent(query);

        let (semantic, recent, persona, tasks) = tokio::join!(
            self.semantic_memories(ctx, query, &intent, options),
            self.recent_records(ctx),
            self.persona(ctx),
            self.active_tasks(ctx),
        );
        let (memories, index_status) = semantic;
        let now = Utc::now();

        let recent_tools = self.recent_tools(ctx, &recent, now);
        let conversation_summary = ctx.conversation_id.as_deref().and_then(|conv| {
            let since = now - Duration::days(self.settings.summary_lookback_days);
            let window: Vec<_> = recent.iter().filter(|r| r.timestamp >= since).cloned().collect();
            find_latest_summary(&window, conv)
        });
        // 私人任务与话题只对 owner / member 可见
        let (recent_topics, patterns) = if ctx.role.is_trusted_viewer() {
            detect_topics(&recent, self.settings.max_topics)
        } else {
            (Vec::new(), Vec::new())
        };

        let pkg = ContextPackage {
            memory_count: memories.len(),
            memories,
            fallback_used: index_status != IndexStatus::Available,
            persona,
            active_tasks: tasks,
            recent_topics,
            patterns,
            recent_tools,
            conversation_summary,
            mode: ctx.mode,
            retrieval_time_ms: started.elapsed().as_millis() as u64,
            timestamp: now,
            index_status,
        };
        tracing::debug!(
            memories = pkg.memory_count,
            tools = pkg.recent_tools.len(),
            index = ?pkg.index_status,
            elapsed_ms = pkg.retrieval_time_ms,
            "context package built"
        );
        pkg
    }

    async fn semantic_memories(
        &self,
        ctx: &RequestContext,
        query: &str,
        intent: &QueryIntent,
        options: &ContextOptions,
    ) -> (Vec<RelevantMemory>, IndexStatus) {
        if options.skip_semantic {
            return (Vec::new(), IndexStatus::Available);
        }
        let Some(index) = &self.index else {
            tracing::warn!("semantic index not configured, continuing without memories");
            return (Vec::new(), IndexStatus::Missing);
        };
        let hits = match index.query(query, self.settings.top_k).await {
            Ok(hits) => hits,
            Err(IndexError::Missing) => {
                tracing::warn!("semantic index missing, continuing without memories");
                return (Vec::new(), IndexStatus::Missing);
            }
            Err(e) => {
                tracing::warn!(error = %e, "semantic index query failed");
                return (Vec::new(), IndexStatus::Error);
            }
        };

        let threshold = options.similarity_threshold.unwrap_or_else(|| {
            intent.threshold(
                self.settings.default_threshold,
                self.settings.reflective_threshold,
            )
        });
        let excluded: Vec<MemoryType> = intent
            .excluded_types()
            .into_iter()
            .filter(|t| !options.include_types.contains(t))
            .collect();
        let mut cap = policy::context_depth(ctx.mode, ctx.role)
            .min(policy::get_max_memories_for_role(ctx.role));
        if let Some(max) = options.max_memories {
            cap = cap.min(max);
        }

        let memories = hits
            .into_iter()
            .filter(|h| h.score >= threshold)
            .filter(|h| match h.item.metadata.kind {
                Some(kind) => {
                    !excluded.contains(&kind) && policy::can_view_memory_type(kind, ctx.role)
                }
                None => ctx.role.is_trusted_viewer(),
            })
            .filter(|h| {
                options.memory_types.is_empty()
                    || h.item
                        .metadata
                        .kind
                        .is_some_and(|k| options.memory_types.contains(&k))
            })
            .filter(|h| {
                options
                    .required_tags
                    .iter()
                    .all(|t| h.item.metadata.tags.contains(t))
            })
            .take(cap)
            .map(|h| RelevantMemory {
                path: h.item.path,
                content: policy::redact_sensitive_data(&h.item.text, ctx.role),
                score: h.score,
                kind: h.item.metadata.kind,
                tags: h.item.metadata.tags,
                timestamp: h.item.metadata.timestamp,
            })
            .collect();
        (memories, IndexStatus::Available)
    }

    /// 一次扫描覆盖工具历史、摘要与话题三个回看窗口
    async fn recent_records(&self, ctx: &RequestContext) -> Vec<EpisodicRecord> {
        let days = self
            .settings
            .tool_lookback_days
            .max(self.settings.summary_lookback_days);
        let now = Utc::now();
        match self
            .store
            .scan_range(&ctx.user_id, now - Duration::days(days), now)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(user = %ctx.user_id, error = %e, "episodic scan failed");
                Vec::new()
            }
        }
    }

    fn recent_tools(
        &self,
        ctx: &RequestContext,
        records: &[EpisodicRecord],
        now: chrono::DateTime<Utc>,
    ) -> Vec<ToolInvocation> {
        let limit = policy::get_tool_history_limit(ctx.mode, ctx.role);
        let Some(conv) = ctx.conversation_id.as_deref() else {
            return Vec::new();
        };
        if limit == 0 {
            return Vec::new();
        }
        let since = now - Duration::days(self.settings.tool_lookback_days);
        records
            .iter()
            .rev()
            .filter(|r| r.timestamp >= since && r.conversation_id.as_deref() == Some(conv))
            .filter_map(ToolInvocation::from_record)
            .take(limit)
            .map(|mut t| {
                t.outputs = policy::filter_tool_outputs(&t.outputs, ctx.role, &t.tool_name);
                t
            })
            .collect()
    }

    async fn persona(&self, ctx: &RequestContext) -> PersonaSummary {
        self.profiles
            .persona(&ctx.user_id)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "persona snapshot unavailable");
                PersonaSummary::default()
            })
    }

    async fn active_tasks(&self, ctx: &RequestContext) -> Vec<String> {
        if !ctx.role.is_trusted_viewer() {
            return Vec::new();
        }
        match self.profiles.active_tasks(&ctx.user_id).await {
            Ok(tasks) => tasks.into_iter().map(|t| t.title).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "task snapshot unavailable");
                Vec::new()
            }
        }
    }
}

/// 近期话题：对话类记录的高频词；模式：重复使用的工具
fn detect_topics(records: &[EpisodicRecord], max: usize) -> (Vec<String>, Vec<DetectedPattern>) {
    let mut words: HashMap<String, usize> = HashMap::new();
    let mut tools: HashMap<String, usize> = HashMap::new();
    for r in records {
        match r.kind {
            MemoryType::Conversation | MemoryType::Observation | MemoryType::Summary => {
                for w in r.content.split(|c: char| !c.is_alphanumeric()) {
                    let w = w.to_lowercase();
                    if w.chars().count() > 3 && !STOPWORDS.contains(&w.as_str()) {
                        *words.entry(w).or_default() += 1;
                    }
                }
            }
            MemoryType::ToolInvocation => {
                if let Some(inv) = ToolInvocation::from_record(r) {
                    *tools.entry(inv.tool_name).or_default() += 1;
                }
            }
            _ => {}
        }
    }

    let mut ranked: Vec<_> = words.into_iter().filter(|(_, n)| *n >= 2).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let topics = ranked.into_iter().take(max).map(|(w, _)| w).collect();

    let mut patterns: Vec<_> = tools
        .into_iter()
        .filter(|(_, n)| *n >= 2)
        .map(|(tool, n)| DetectedPattern {
            pattern: format!("frequently uses {tool}"),
            frequency: n,
        })
        .collect();
    patterns.sort_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.pattern.cmp(&b.pattern)));
    patterns.truncate(max);
    (topics, patterns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{
        FileEpisodicStore, InMemoryIndex, IndexItem, ItemMetadata, JsonProfileStore, TaskItem,
    };
    use crate::policy::{CognitiveMode, UserRole};
    use serde_json::json;
    use tempfile::TempDir;

    fn item(path: &str, text: &str, kind: MemoryType) -> IndexItem {
        IndexItem {
            path: path.into(),
            text: text.into(),
            metadata: ItemMetadata {
                kind: Some(kind),
                tags: vec![],
                timestamp: None,
            },
        }
    }

    fn builder(dir: &TempDir) -> (ContextBuilder, Arc<FileEpisodicStore>, Arc<JsonProfileStore>) {
        let store = Arc::new(FileEpisodicStore::new(dir.path()));
        let profiles = Arc::new(JsonProfileStore::new(dir.path()));
        (
            ContextBuilder::new(store.clone(), profiles.clone()),
            store,
            profiles,
        )
    }

    #[tokio::test]
    async fn test_missing_index_degrades() {
        let dir = TempDir::new().unwrap();
        let (b, _, _) = builder(&dir);
        let ctx = RequestContext::new("alice", UserRole::Owner, CognitiveMode::Dual);
        let pkg = b
            .build_context_package(&ctx, "garden plans", &ContextOptions::default())
            .await;
        assert_eq!(pkg.index_status, IndexStatus::Missing);
        assert!(pkg.fallback_used);
        assert_eq!(pkg.memory_count, 0);
    }

    #[tokio::test]
    async fn test_filters_private_types_and_threshold() {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(InMemoryIndex::new());
        index.add(item("a.json", "garden plans tomatoes", MemoryType::Conversation));
        index.add(item("b.json", "garden plans secret", MemoryType::InnerDialogue));
        index.add(item("c.json", "garden", MemoryType::Conversation));
        let (b, _, _) = builder(&dir);
        let b = b.with_index(index);
        let ctx = RequestContext::new("alice", UserRole::Owner, CognitiveMode::Dual);

        let pkg = b
            .build_context_package(&ctx, "garden plans", &ContextOptions::default())
            .await;
        assert_eq!(pkg.index_status, IndexStatus::Available);
        let paths: Vec<_> = pkg.memories.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["a.json"]);

        let opts = ContextOptions {
            include_types: vec![MemoryType::InnerDialogue],
            ..Default::default()
        };
        let pkg = b.build_context_package(&ctx, "garden plans", &opts).await;
        assert_eq!(pkg.memory_count, 2);
    }

    #[tokio::test]
    async fn test_anonymous_capped_and_redacted() {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(InMemoryIndex::new());
        for i in 0..5 {
            index.add(item(
                &format!("{i}.json"),
                "garden contact bob@example.com",
                MemoryType::Conversation,
            ));
        }
        let (b, _, profiles) = builder(&dir);
        profiles.add_task("alice", TaskItem::new("secret task")).await.unwrap();
        let b = b.with_index(index);
        let ctx = RequestContext::new("alice", UserRole::Anonymous, CognitiveMode::Dual);
        let pkg = b
            .build_context_package(&ctx, "garden contact", &ContextOptions::default())
            .await;
        assert_eq!(pkg.memory_count, 2);
        assert!(pkg.memories.iter().all(|m| !m.content.contains("bob@")));
        assert!(pkg.active_tasks.is_empty());
    }

    #[tokio::test]
    async fn test_tool_history_scoped_to_conversation() {
        let dir = TempDir::new().unwrap();
        let (b, store, _) = builder(&dir);
        for conv in ["c1", "c1", "c2"] {
            let inv = ToolInvocation::new("task_list", json!({}), json!({"count": 1}), true);
            store
                .append("alice", &inv.to_record(Some(conv.into())))
                .await
                .unwrap();
        }
        let ctx = RequestContext::new("alice", UserRole::Owner, CognitiveMode::Dual)
            .with_conversation("c1");
        let opts = ContextOptions {
            skip_semantic: true,
            ..Default::default()
        };
        let pkg = b.build_context_package(&ctx, "hi", &opts).await;
        assert_eq!(pkg.recent_tools.len(), 2);
        assert_eq!(pkg.patterns.len(), 1);
        assert_eq!(pkg.patterns[0].frequency, 3);

        let emulation = RequestContext::new("alice", UserRole::Owner, CognitiveMode::Emulation)
            .with_conversation("c1");
        let pkg = b.build_context_package(&emulation, "hi", &opts).await;
        assert!(pkg.recent_tools.is_empty());
    }

    #[tokio::test]
    async fn test_summary_and_tasks_included() {
        let dir = TempDir::new().unwrap();
        let (b, store, profiles) = builder(&dir);
        profiles.add_task("alice", TaskItem::new("Water plants")).await.unwrap();
        let summary = EpisodicRecord::new(MemoryType::Summary, "We planned the garden.")
            .with_conversation(Some("c1".into()));
        store.append("alice", &summary).await.unwrap();

        let ctx = RequestContext::new("alice", UserRole::Owner, CognitiveMode::Dual)
            .with_conversation("c1");
        let pkg = b
            .build_context_package(&ctx, "hi", &ContextOptions::default())
            .await;
        assert_eq!(pkg.conversation_summary.as_deref(), Some("We planned the garden."));
        assert_eq!(pkg.active_tasks, vec!["Water plants".to_string()]);
    }
}
