//! LLM 层：网关抽象与实现（OpenAI 兼容 / Mock / 脚本回放）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::OpenAiClient;
pub use traits::{LlmClient, LlmError, LlmOptions, LlmTask};
