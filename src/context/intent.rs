//! 查询意图分类：关键词检测决定默认排除哪些私密类型、用哪个相似度阈值

use crate::memory::MemoryType;

const DREAM_KEYWORDS: &[&str] = &["dream", "dreamt", "dreamed", "nightmare"];
const REFLECT_KEYWORDS: &[&str] = &[
    "reflect",
    "reflection",
    "introspect",
    "ponder",
    "contemplat",
    "self-reflection",
];
const INNER_KEYWORDS: &[&str] = &["inner dialogue", "inner voice", "inner monologue", "thinking to yourself"];

/// 字面检索意图（列出/读取/展示）：观察使用 verbatim 模式，防止模型改写文件名等事实
const LITERAL_KEYWORDS: &[&str] = &[
    "list", "show", "read", "contents of", "what's in", "what is in", "exact", "verbatim", "print",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryIntent {
    pub wants_dreams: bool,
    pub wants_reflections: bool,
    pub wants_inner_dialogue: bool,
    pub literal_retrieval: bool,
}

impl QueryIntent {
    pub fn is_reflective(&self) -> bool {
        self.wants_dreams || self.wants_reflections || self.wants_inner_dialogue
    }

    /// 默认排除的类型（除非查询明确提到）
    pub fn excluded_types(&self) -> Vec<MemoryType> {
        let mut out = Vec::new();
        if !self.wants_inner_dialogue {
            out.push(MemoryType::InnerDialogue);
        }
        if !self.wants_dreams {
            out.push(MemoryType::Dream);
        }
        if !self.wants_reflections {
            out.push(MemoryType::Reflection);
        }
        out
    }

    /// 反思类内容排名天然低于普通对话，明确询问时放宽阈值
    pub fn threshold(&self, default: f32, reflective: f32) -> f32 {
        if self.is_reflective() {
            reflective
        } else {
            default
        }
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

fn starts_with_word(text: &str, keywords: &[&str]) -> bool {
    let first = text.split_whitespace().next().unwrap_or("");
    keywords.contains(&first)
}

pub fn classify_intent(query: &str) -> QueryIntent {
    let q = query.to_lowercase();
    QueryIntent {
        wants_dreams: contains_any(&q, DREAM_KEYWORDS),
        wants_reflections: contains_any(&q, REFLECT_KEYWORDS),
        wants_inner_dialogue: contains_any(&q, INNER_KEYWORDS),
        literal_retrieval: starts_with_word(&q, &["list", "show", "read", "print", "cat"])
            || LITERAL_KEYWORDS[3..].iter().any(|k| q.contains(k)),
    }
}
