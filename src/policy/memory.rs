//! 记忆策略：哪些事件可写、上下文能取多深、输出如何脱敏
//!
//! 全部是 (mode, role) 参数化的纯函数，ContextBuilder 与 SkillExecutor 在每个决策点调用。

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::memory::MemoryType;
use crate::policy::{CognitiveMode, UserRole};

/// 仅对话类工具：agent 模式下不捕获，避免纯闲聊撑大记忆
pub const CONVERSATIONAL_TOOLS: &[&str] = &["conversational_response", "chat", "respond"];

/// 低信任查看者看到的结构化输出中，这些字段整体替换为路径占位符
const PATH_FIELDS: &[&str] = &["path", "file", "file_path", "filepath", "dir", "directory"];

/// 非 owner 角色的浅层上下文上限
const SHALLOW_MEMORY_DEPTH: usize = 2;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("valid email regex")
});
static IPV4_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("valid ipv4 regex")
});
static UNIX_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[^\w.~/\-])(~?/[\w.\-]+(?:/[\w.\-]*)*)").expect("valid unix path regex")
});
static WINDOWS_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z]:\\(?:[\w.\-]+\\?)*").expect("valid windows path regex")
});

/// agent 模式允许写入的行动类事件
fn is_action_event(event_type: MemoryType) -> bool {
    matches!(
        event_type,
        MemoryType::ToolInvocation
            | MemoryType::FileWrite
            | MemoryType::CodeApproval
            | MemoryType::Summary
    )
}

/// dual 允许全部事件；agent 仅行动类；emulation 一律拒绝
pub fn can_write_memory(mode: CognitiveMode, event_type: MemoryType) -> bool {
    match mode {
        CognitiveMode::Dual => true,
        CognitiveMode::Agent => is_action_event(event_type),
        CognitiveMode::Emulation => false,
    }
}

pub fn should_capture_tool(mode: CognitiveMode, tool_name: &str) -> bool {
    match mode {
        CognitiveMode::Dual => true,
        CognitiveMode::Agent => !CONVERSATIONAL_TOOLS.contains(&tool_name),
        CognitiveMode::Emulation => false,
    }
}

/// 语义记忆检索条数上限
pub fn context_depth(mode: CognitiveMode, role: UserRole) -> usize {
    if role != UserRole::Owner {
        return SHALLOW_MEMORY_DEPTH;
    }
    match mode {
        CognitiveMode::Dual => 12,
        CognitiveMode::Agent => 6,
        CognitiveMode::Emulation => 3,
    }
}

/// 最近工具调用条数上限；guest / anonymous 恒为 0
pub fn get_tool_history_limit(mode: CognitiveMode, role: UserRole) -> usize {
    if role != UserRole::Owner {
        return 0;
    }
    match mode {
        CognitiveMode::Dual => 10,
        CognitiveMode::Agent => 5,
        CognitiveMode::Emulation => 0,
    }
}

pub fn can_view_memory_type(memory_type: MemoryType, role: UserRole) -> bool {
    match role {
        UserRole::Owner => true,
        UserRole::Member => !matches!(memory_type, MemoryType::InnerDialogue | MemoryType::Dream),
        UserRole::Guest | UserRole::Anonymous => memory_type == MemoryType::Conversation,
    }
}

pub fn get_max_memories_for_role(role: UserRole) -> usize {
    match role {
        UserRole::Owner => 50,
        UserRole::Member => 20,
        UserRole::Guest => 5,
        UserRole::Anonymous => 2,
    }
}

/// 对低信任角色替换绝对路径、邮箱、IPv4；owner / member 原样返回
pub fn redact_sensitive_data(text: &str, role: UserRole) -> String {
    if role.is_trusted_viewer() {
        return text.to_string();
    }
    let out = EMAIL_RE.replace_all(text, "[REDACTED_EMAIL]");
    let out = IPV4_RE.replace_all(&out, "[REDACTED_IP]");
    let out = WINDOWS_PATH_RE.replace_all(&out, "[REDACTED_PATH]");
    let out = UNIX_PATH_RE.replace_all(&out, "${1}[REDACTED_PATH]");
    out.into_owned()
}

/// 对结构化工具输出逐字段脱敏（路径字段整体替换，其余字符串走 redact_sensitive_data）
pub fn filter_tool_outputs(outputs: &Value, role: UserRole, tool_name: &str) -> Value {
    if role.is_trusted_viewer() {
        return outputs.clone();
    }
    tracing::debug!(tool = %tool_name, role = %role, "filtering tool outputs");
    redact_value(outputs, role)
}

fn redact_value(value: &Value, role: UserRole) -> Value {
    match value {
        Value::String(s) => Value::String(redact_sensitive_data(s, role)),
        Value::Array(items) => Value::Array(items.iter().map(|v| redact_value(v, role)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let redacted = if PATH_FIELDS.contains(&k.as_str()) && v.is_string() {
                        Value::String("[REDACTED_PATH]".to_string())
                    } else {
                        redact_value(v, role)
                    };
                    (k.clone(), redacted)
                })
                .collect(),
        ),
        other => other.clone(),
    }
}
