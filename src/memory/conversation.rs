//! 对话消息与转写
//!
//! 消息角色与 LLM API 一致；render_transcript 把一段会话压成摘要器可用的纯文本。

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// 用户或助手的发言（系统提示不算）
    pub fn is_dialogue(&self) -> bool {
        self.role != Role::System
    }
}

/// 每行 `Role: text`，系统消息跳过，单条按字符截断
pub fn render_transcript(messages: &[Message], per_message_chars: usize) -> String {
    messages
        .iter()
        .filter(|m| m.is_dialogue())
        .map(|m| {
            let text: String = m.content.chars().take(per_message_chars).collect();
            format!("{}: {}", m.role, text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
