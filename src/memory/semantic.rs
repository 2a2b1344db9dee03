//! 语义索引接口：query(text, top_k) -> [{score, item:{path, text, metadata}}]
//!
//! 真实向量库是外部黑盒；这里提供 InMemoryIndex（关键词重叠打分）用于开发和测试。

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::MemoryType;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MemoryType>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexItem {
    pub path: String,
    pub text: String,
    #[serde(default)]
    pub metadata: ItemMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    pub score: f32,
    pub item: IndexItem,
}

#[derive(Error, Debug, Clone)]
pub enum IndexError {
    /// 索引尚未构建
    #[error("index missing")]
    Missing,
    #[error("index backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait SemanticIndex: Send + Sync {
    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<IndexHit>, IndexError>;
}

/// 将文本切分为小写词集合
pub fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 1)
        .collect()
}

/// 内存索引：得分 = 查询词命中比例（0..=1）
#[derive(Default)]
pub struct InMemoryIndex {
    items: RwLock<Vec<(IndexItem, HashSet<String>)>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, item: IndexItem) {
        let tokens = tokenize_lower(&item.text);
        if let Ok(mut items) = self.items.write() {
            items.push((item, tokens));
        }
    }

    pub fn len(&self) -> usize {
        self.items.read().map(|i| i.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SemanticIndex for InMemoryIndex {
    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<IndexHit>, IndexError> {
        let query_tokens = tokenize_lower(text);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }
        let items = self
            .items
            .read()
            .map_err(|_| IndexError::Backend("index lock poisoned".to_string()))?;
        let mut scored: Vec<IndexHit> = items
            .iter()
            .map(|(item, tokens)| IndexHit {
                score: query_tokens.intersection(tokens).count() as f32 / query_tokens.len() as f32,
                item: item.clone(),
            })
            .filter(|h| h.score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(path: &str, text: &str) -> IndexItem {
        IndexItem {
            path: path.to_string(),
            text: text.to_string(),
            metadata: ItemMetadata::default(),
        }
    }

    #[tokio::test]
    async fn test_ranks_by_overlap() {
        let index = InMemoryIndex::new();
        index.add(item("a", "garden tomatoes need water"));
        index.add(item("b", "tomatoes"));
        index.add(item("c", "unrelated text"));
        let hits = index.query("water the tomatoes", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].item.path, "a");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_empty_query() {
        let index = InMemoryIndex::new();
        index.add(item("a", "x y"));
        assert!(index.query("!", 5).await.unwrap().is_empty());
    }
}
