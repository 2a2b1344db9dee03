//! 错误分类
//!
//! - SecurityError：策略/权限违规，只中止当前动作，不中止整个会话
//! - SkillError：工具级失败，按 SkillErrorCode 分类并附带修复建议，回灌给下一轮规划
//! - AgentError：crate 级错误，包括失败循环、步数耗尽、索引不可用等

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::{CognitiveMode, UserRole};

/// 安全违规的具体种类
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SecurityErrorKind {
    #[error("memory writes are not permitted")]
    WriteDenied,
    #[error("operator (tool execution) is not permitted")]
    OperatorDenied,
    #[error("owner role required")]
    OwnerRequired,
    #[error("cognitive mode change is not permitted")]
    ModeChangeDenied,
    #[error("trust level change is not permitted")]
    TrustChangeDenied,
    #[error("factory reset is not permitted")]
    FactoryResetDenied,
    #[error("training data access is not permitted")]
    TrainingDenied,
    #[error("write to protected path denied: {0}")]
    WritePathDenied(String),
}

/// 权限违规：携带触发时的模式与角色，原样展示给调用方
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("security violation: {kind} (mode={mode}, role={role})")]
pub struct SecurityError {
    pub kind: SecurityErrorKind,
    pub mode: CognitiveMode,
    pub role: UserRole,
}

/// 工具失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkillErrorCode {
    FileNotFound,
    PermissionDenied,
    NetworkError,
    InvalidInput,
    Timeout,
    Unknown,
}

impl SkillErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillErrorCode::FileNotFound => "FILE_NOT_FOUND",
            SkillErrorCode::PermissionDenied => "PERMISSION_DENIED",
            SkillErrorCode::NetworkError => "NETWORK_ERROR",
            SkillErrorCode::InvalidInput => "INVALID_INPUT",
            SkillErrorCode::Timeout => "TIMEOUT",
            SkillErrorCode::Unknown => "UNKNOWN",
        }
    }

    /// 修复建议，拼入下一轮规划提示
    pub fn suggestion(&self) -> &'static str {
        match self {
            SkillErrorCode::FileNotFound => {
                "The path does not exist. List the parent directory with fs_list first and use an exact name from the listing."
            }
            SkillErrorCode::PermissionDenied => {
                "This action is not permitted in the current mode/role. Choose a read-only approach or explain the limitation to the user."
            }
            SkillErrorCode::NetworkError => {
                "A network call failed. Do not retry immediately; answer from available context or try a different source."
            }
            SkillErrorCode::InvalidInput => {
                "The arguments did not match the tool's input schema. Check required fields and their types in the tool catalog."
            }
            SkillErrorCode::Timeout => {
                "The tool timed out. Narrow the request (smaller path, fewer items) before trying again."
            }
            SkillErrorCode::Unknown => {
                "The tool failed for an unknown reason. Try a different tool or respond with what is already known."
            }
        }
    }

    /// 根据错误文本粗分类（工具只返回字符串错误时使用）
    pub fn classify(message: &str) -> Self {
        let m = message.to_lowercase();
        if m.contains("not found") || m.contains("no such file") || m.contains("does not exist") {
            SkillErrorCode::FileNotFound
        } else if m.contains("permission") || m.contains("denied") || m.contains("not permitted") {
            SkillErrorCode::PermissionDenied
        } else if m.contains("network")
            || m.contains("connection")
            || m.contains("dns")
            || m.contains("unreachable")
        {
            SkillErrorCode::NetworkError
        } else if m.contains("timed out") || m.contains("timeout") {
            SkillErrorCode::Timeout
        } else if m.contains("missing required") || m.contains("invalid") {
            SkillErrorCode::InvalidInput
        } else {
            SkillErrorCode::Unknown
        }
    }
}

impl fmt::Display for SkillErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 工具执行失败：{code, message, context}
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct SkillError {
    pub code: SkillErrorCode,
    pub message: String,
    #[serde(default)]
    pub context: serde_json::Value,
}

impl SkillError {
    pub fn new(code: SkillErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: serde_json::Value::Null,
        }
    }

    /// 由字符串错误分类构造
    pub fn classified(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(SkillErrorCode::classify(&message), message)
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    pub fn suggestion(&self) -> &'static str {
        self.code.suggestion()
    }
}

impl From<SecurityError> for SkillError {
    fn from(e: SecurityError) -> Self {
        SkillError::new(SkillErrorCode::PermissionDenied, e.to_string()).with_context(
            serde_json::json!({
                "mode": e.mode,
                "role": e.role,
                "security": e.kind,
            }),
        )
    }
}

/// 存储后端错误
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("background task failed: {0}")]
    Join(String),
}

/// crate 级错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error("skill execution failed: {0}")]
    SkillExecution(#[from] SkillError),

    #[error("failure loop detected: {tool} failed repeatedly with identical arguments")]
    FailureLoopDetected { tool: String, suggestion: String },

    #[error("max steps exceeded ({0})")]
    MaxStepsExceeded(usize),

    #[error("semantic index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("config error: {0}")]
    Config(String),

    #[error("cancelled")]
    Cancelled,

    #[error("unknown skill: {0}")]
    UnknownSkill(String),

    #[error("invalid skill registration: {0}")]
    InvalidRegistration(String),
}
