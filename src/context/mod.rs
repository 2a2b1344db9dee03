//! 上下文构建：语义记忆 + 工具历史 + 会话摘要 + 人格/任务快照，按字符预算格式化

pub mod builder;
pub mod format;
pub mod intent;
pub mod types;

pub use builder::{ContextBuilder, ContextSettings};
pub use format::{format_context, CharBudget, ContextSection};
pub use intent::{classify_intent, QueryIntent};
pub use types::{ContextOptions, ContextPackage, DetectedPattern, IndexStatus, RelevantMemory};
