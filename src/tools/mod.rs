//! 技能层：注册表、执行器、写路径白名单与内置技能

pub mod conversational;
pub mod executor;
pub mod filesystem;
pub mod guard;
pub mod registry;
pub mod schema;
pub mod tasks;

use std::sync::Arc;

pub use conversational::ConversationalResponseSkill;
pub use executor::{SkillExecutor, SkillOutcome};
pub use filesystem::{FsListSkill, FsReadSkill, FsWriteSkill, SafeFs};
pub use guard::WritePathGuard;
pub use registry::{RiskLevel, Skill, SkillCategory, SkillRegistry};
pub use schema::{decision_schema_json, validate_inputs};
pub use tasks::{TaskCreateSkill, TaskListSkill};

use crate::core::AgentError;
use crate::memory::ProfileStore;

/// 注册全部内置技能
pub fn builtin_registry(
    profiles: Arc<dyn ProfileStore>,
    workspace: SafeFs,
) -> Result<SkillRegistry, AgentError> {
    let mut registry = SkillRegistry::new();
    registry.register(TaskListSkill::new(Arc::clone(&profiles)))?;
    registry.register(TaskCreateSkill::new(profiles))?;
    registry.register(FsReadSkill::new(workspace.clone()))?;
    registry.register(FsListSkill::new(workspace.clone()))?;
    registry.register(FsWriteSkill::new(workspace))?;
    registry.register(ConversationalResponseSkill)?;
    Ok(registry)
}
