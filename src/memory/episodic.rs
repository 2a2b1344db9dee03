//! 情节记忆：只追加的记录 + 互斥标记
//!
//! 存储抽象刻意保持窄接口（append / scan_range / 标记读取与 CAS），
//! 文件后端与 SQLite 后端都能满足。记录按用户分区，跨用户写入互不竞争。

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::StorageError;

/// 记忆事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Conversation,
    Observation,
    InnerDialogue,
    Reflection,
    Dream,
    ToolInvocation,
    FileWrite,
    CodeApproval,
    Summary,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Conversation => "conversation",
            MemoryType::Observation => "observation",
            MemoryType::InnerDialogue => "inner_dialogue",
            MemoryType::Reflection => "reflection",
            MemoryType::Dream => "dream",
            MemoryType::ToolInvocation => "tool_invocation",
            MemoryType::FileWrite => "file_write",
            MemoryType::CodeApproval => "code_approval",
            MemoryType::Summary => "summary",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单条情节记录；写入后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodicRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MemoryType,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl EpisodicRecord {
    pub fn new(kind: MemoryType, content: impl Into<String>) -> Self {
        Self {
            id: format!("evt-{}", uuid::Uuid::new_v4()),
            kind,
            timestamp: Utc::now(),
            content: content.into(),
            conversation_id: None,
            tags: Vec::new(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_conversation(mut self, conversation_id: Option<String>) -> Self {
        self.conversation_id = conversation_id;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// 互斥标记（如会话摘要进行中）；超时后视为陈旧可被覆盖
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub state: String,
    pub owner: String,
    pub updated_at: DateTime<Utc>,
}

impl Marker {
    pub fn new(state: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            owner: owner.into(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        now.signed_duration_since(self.updated_at) > timeout
    }
}

#[async_trait]
pub trait EpisodicStore: Send + Sync {
    /// 追加一条记录（不可覆盖已有记录）
    async fn append(&self, user_id: &str, record: &EpisodicRecord) -> Result<(), StorageError>;

    /// 读取 [since, until] 时间窗内的记录，按时间升序
    async fn scan_range(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<EpisodicRecord>, StorageError>;

    async fn read_marker(&self, user_id: &str, key: &str) -> Result<Option<Marker>, StorageError>;

    /// 仅当当前值等于 expected 时写入 new（new 为 None 表示清除）；返回是否成功
    async fn compare_and_set_marker(
        &self,
        user_id: &str,
        key: &str,
        expected: Option<&Marker>,
        new: Option<&Marker>,
    ) -> Result<bool, StorageError>;
}

/// 把用户 ID、记录 ID、标记键编码成可用作目录名/键的片段
///
/// `[A-Za-z0-9_-]` 原样保留，其余字节编码为 `%XX`，映射是单射：不同 ID 不会落到同一分区。
/// 空串编码为 `%anonymous`（`%` 后不是两位十六进制，不会与任何编码结果重合）。
pub fn encode_path_component(raw: &str) -> String {
    if raw.is_empty() {
        return "%anonymous".to_string();
    }
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_type_field() {
        let r = EpisodicRecord::new(MemoryType::ToolInvocation, "x");
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["type"], "tool_invocation");
        assert!(v.get("conversation_id").is_none());
    }

    #[test]
    fn test_marker_staleness() {
        let mut m = Marker::new("summarizing", "s1");
        let now = Utc::now();
        assert!(!m.is_stale(now, chrono::Duration::minutes(5)));
        m.updated_at = now - chrono::Duration::minutes(6);
        assert!(m.is_stale(now, chrono::Duration::minutes(5)));
    }

    #[test]
    fn test_encode_path_component() {
        assert_eq!(encode_path_component("alice-1"), "alice-1");
        assert_eq!(encode_path_component("../etc"), "%2E%2E%2Fetc");
        assert_eq!(encode_path_component(""), "%anonymous");
        assert_eq!(encode_path_component("李"), "%E6%9D%8E");
    }

    #[test]
    fn test_encoding_keeps_distinct_ids_apart() {
        let ids = ["alice.smith", "alice_smith", "bob@home", "bob_home", "bob%40home", "", "anonymous"];
        let encoded: std::collections::HashSet<_> = ids.iter().map(|id| encode_path_component(id)).collect();
        assert_eq!(encoded.len(), ids.len());
    }
}
