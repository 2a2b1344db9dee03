//! 本地 LLM 替身（无需 API）
//!
//! - MockLlmClient：规划时直接给出 respond=true 的决策，回显最后一条 user 消息
//! - ScriptedLlmClient：按顺序回放预置回复并计数，供测试断言调用次数

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, LlmOptions, LlmTask};
use crate::memory::{Message, Role};

fn last_user(messages: &[Message]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("(no input)")
}

#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        options: &LlmOptions,
    ) -> Result<String, LlmError> {
        let input = last_user(messages);
        let preview: String = input.chars().take(200).collect();
        Ok(match options.task {
            LlmTask::Planning => serde_json::json!({
                "thought": "Mock planner answers directly.",
                "action": null,
                "respond": true,
                "response": format!("Echo from Mock: {preview}"),
            })
            .to_string(),
            LlmTask::Finalizing => format!("Echo from Mock: {preview}"),
            LlmTask::Summarizing => format!("Summary: {preview}"),
        })
    }
}

/// 脚本化客户端：每次调用弹出一条预置回复；脚本耗尽返回错误
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
    tasks: Mutex<Vec<LlmTask>>,
    delay: Option<Duration>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// 每次调用前等待一段时间（模拟慢速摘要等）
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, response: impl Into<String>) {
        if let Ok(mut q) = self.responses.lock() {
            q.push_back(response.into());
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn tasks(&self) -> Vec<LlmTask> {
        self.tasks.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(
        &self,
        _messages: &[Message],
        options: &LlmOptions,
    ) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut t) = self.tasks.lock() {
            t.push(options.task);
        }
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        let next = self
            .responses
            .lock()
            .map_err(|_| LlmError::Request("script lock poisoned".to_string()))?
            .pop_front();
        next.ok_or_else(|| LlmError::Request("script exhausted".to_string()))
    }
}
