//! 策略层：安全策略（权限矩阵 + 守卫）与记忆策略（写入、深度、脱敏）

pub mod memory;
pub mod security;

pub use memory::{
    can_view_memory_type, context_depth, filter_tool_outputs, get_max_memories_for_role,
    get_tool_history_limit, redact_sensitive_data, should_capture_tool,
};
pub use security::{Capability, CognitiveMode, SecurityPolicy, UserRole};
