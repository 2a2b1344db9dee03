//! 核心层：错误分类、请求上下文、推理循环状态机

pub mod error;
pub mod request;
pub mod state;

pub use error::{
    AgentError, SecurityError, SecurityErrorKind, SkillError, SkillErrorCode, StorageError,
};
pub use request::{RequestContext, TrustLevel};
pub use state::{LoopPhase, PhaseTracker};
