//! 上下文包：每轮对话新建，返回后只读

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::{MemoryType, PersonaSummary, ToolInvocation};
use crate::policy::CognitiveMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevantMemory {
    pub path: String,
    pub content: String,
    pub score: f32,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MemoryType>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedPattern {
    pub pattern: String,
    pub frequency: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Available,
    Missing,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextPackage {
    pub memories: Vec<RelevantMemory>,
    pub memory_count: usize,
    pub fallback_used: bool,
    pub persona: PersonaSummary,
    pub active_tasks: Vec<String>,
    pub recent_topics: Vec<String>,
    pub patterns: Vec<DetectedPattern>,
    pub recent_tools: Vec<ToolInvocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_summary: Option<String>,
    pub mode: CognitiveMode,
    pub retrieval_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub index_status: IndexStatus,
}

impl ContextPackage {
    /// 空包（无记忆、无历史），字段齐全
    pub fn empty(mode: CognitiveMode) -> Self {
        Self {
            memories: Vec::new(),
            memory_count: 0,
            fallback_used: false,
            persona: PersonaSummary::default(),
            active_tasks: Vec::new(),
            recent_topics: Vec::new(),
            patterns: Vec::new(),
            recent_tools: Vec::new(),
            conversation_summary: None,
            mode,
            retrieval_time_ms: 0,
            timestamp: Utc::now(),
            index_status: IndexStatus::Available,
        }
    }
}

/// 调用方可选项（混合检索约束、阈值覆盖等）
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    /// 仅保留这些类型（为空不限制）
    pub memory_types: Vec<MemoryType>,
    /// 需全部命中的标签（为空不限制）
    pub required_tags: Vec<String>,
    /// 显式要求包含的私密类型（如 inner_dialogue）
    pub include_types: Vec<MemoryType>,
    pub similarity_threshold: Option<f32>,
    pub max_memories: Option<usize>,
    /// 跳过语义检索（只要工具历史/摘要/人格）
    pub skip_semantic: bool,
}
