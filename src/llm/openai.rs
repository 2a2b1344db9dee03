//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）。
//! 单次请求受超时约束；不重试，失败原样上报给调用方。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, LlmOptions};
use crate::memory::{Message, Role};

/// 累计 token 计数（prompt, completion）；total 由二者相加
#[derive(Debug, Default)]
struct UsageCounter {
    prompt: AtomicU64,
    completion: AtomicU64,
}

impl UsageCounter {
    fn record(&self, prompt: u32, completion: u32) {
        self.prompt.fetch_add(u64::from(prompt), Ordering::Relaxed);
        self.completion.fetch_add(u64::from(completion), Ordering::Relaxed);
    }

    fn snapshot(&self) -> (u64, u64, u64) {
        let p = self.prompt.load(Ordering::Relaxed);
        let c = self.completion.load(Ordering::Relaxed);
        (p, c, p + c)
    }
}

fn request_error(e: async_openai::error::OpenAIError) -> LlmError {
    LlmError::Request(e.to_string())
}

fn to_request_message(m: &Message) -> Result<ChatCompletionRequestMessage, LlmError> {
    let content = m.content.clone();
    Ok(match m.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()
            .map_err(request_error)?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()
            .map_err(request_error)?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()
            .map_err(request_error)?
            .into(),
    })
}

pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    request_timeout: Duration,
    usage: UsageCounter,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            request_timeout: Duration::from_secs(60),
            usage: UsageCounter::default(),
        }
    }

    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout = Duration::from_secs(secs);
        self
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.snapshot()
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &LlmOptions,
    ) -> Result<String, LlmError> {
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.model)
            .messages(
                messages
                    .iter()
                    .map(to_request_message)
                    .collect::<Result<Vec<_>, _>>()?,
            );
        if let Some(t) = options.temperature {
            builder.temperature(t);
        }
        if let Some(n) = options.max_tokens {
            builder.max_completion_tokens(n);
        }
        let request = builder
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        tracing::debug!(model = %self.model, task = ?options.task, "llm request");
        let response = tokio::time::timeout(self.request_timeout, self.client.chat().create(request))
            .await
            .map_err(|_| LlmError::Timeout(self.request_timeout.as_secs()))?
            .map_err(|e| LlmError::Request(e.to_string()))?;

        if let Some(usage) = &response.usage {
            self.usage.record(usage.prompt_tokens, usage.completion_tokens);
            tracing::debug!(
                task = ?options.task,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "llm usage"
            );
        }

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}
