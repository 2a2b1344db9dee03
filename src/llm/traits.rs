//! LLM 网关抽象
//!
//! 推理内核只依赖 `complete(messages, options) -> content`；重试等策略属于网关实现，内核不做。

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::memory::Message;

/// 调用用途：规划 / 终稿润色 / 会话摘要（供路由、日志与测试脚本区分）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmTask {
    Planning,
    Finalizing,
    Summarizing,
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmOptions {
    pub task: LlmTask,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl LlmOptions {
    pub fn for_task(task: LlmTask) -> Self {
        Self {
            task,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn with_max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }
}

#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("empty response")]
    EmptyResponse,
    #[error("timed out after {0}s")]
    Timeout(u64),
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message], options: &LlmOptions)
        -> Result<String, LlmError>;

    /// 累计 token 使用：(prompt, completion, total)；默认 (0, 0, 0)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
