//! 技能注册表
//!
//! 每个技能实现 Skill trait（名称 / 描述 / 输入输出 schema / 类别 / 风险 / 执行），
//! 注册时校验清单；推理循环只通过注册表调用技能，不做动态属性查找。

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{AgentError, RequestContext, SkillError};
use crate::tools::schema::validate_manifest;

/// 技能类别：Mutation 类在执行前必须通过写权限与写路径白名单两道检查
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillCategory {
    Retrieval,
    Mutation,
    Conversational,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[async_trait]
pub trait Skill: Send + Sync {
    /// 技能名（planner 决策中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    fn input_schema(&self) -> Value {
        serde_json::json!({ "type": "object", "properties": {}, "required": [] })
    }

    fn output_schema(&self) -> Value {
        serde_json::json!({ "type": "object" })
    }

    fn category(&self) -> SkillCategory;

    fn risk(&self) -> RiskLevel {
        RiskLevel::Low
    }

    /// 本次调用将写入的路径（绝对路径）；执行器据此做写路径白名单检查
    fn write_targets(&self, _ctx: &RequestContext, _inputs: &Value) -> Vec<PathBuf> {
        Vec::new()
    }

    async fn execute(&self, ctx: &RequestContext, inputs: Value) -> Result<Value, SkillError>;
}

/// 技能注册表：名称有序，便于生成稳定的技能目录
#[derive(Default)]
pub struct SkillRegistry {
    skills: BTreeMap<String, Arc<dyn Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册并校验清单（snake_case 名称、唯一、schema 为 object）
    pub fn register(&mut self, skill: impl Skill + 'static) -> Result<(), AgentError> {
        self.register_arc(Arc::new(skill))
    }

    pub fn register_arc(&mut self, skill: Arc<dyn Skill>) -> Result<(), AgentError> {
        let name = skill.name().to_string();
        validate_manifest(&name, &skill.input_schema(), &skill.output_schema())
            .map_err(|e| AgentError::InvalidRegistration(format!("{name}: {e}")))?;
        if self.skills.contains_key(&name) {
            return Err(AgentError::InvalidRegistration(format!(
                "{name}: already registered"
            )));
        }
        tracing::debug!(skill = %name, category = ?skill.category(), "skill registered");
        self.skills.insert(name, skill);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Skill>> {
        self.skills.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.skills.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.skills.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// 技能目录（注入 planner prompt）
    pub fn catalog(&self) -> Value {
        Value::Array(
            self.skills
                .values()
                .map(|s| {
                    serde_json::json!({
                        "name": s.name(),
                        "description": s.description(),
                        "category": s.category(),
                        "risk": s.risk(),
                        "input_schema": s.input_schema(),
                    })
                })
                .collect(),
        )
    }

    pub fn catalog_json(&self) -> String {
        serde_json::to_string_pretty(&self.catalog()).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, Value);

    #[async_trait]
    impl Skill for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "test skill"
        }
        fn input_schema(&self) -> Value {
            self.1.clone()
        }
        fn category(&self) -> SkillCategory {
            SkillCategory::Other
        }
        async fn execute(&self, _ctx: &RequestContext, inputs: Value) -> Result<Value, SkillError> {
            Ok(inputs)
        }
    }

    fn object() -> Value {
        serde_json::json!({"type": "object"})
    }

    #[test]
    fn test_register_and_catalog() {
        let mut reg = SkillRegistry::new();
        reg.register(Named("b_skill", object())).unwrap();
        reg.register(Named("a_skill", object())).unwrap();
        assert_eq!(reg.names(), vec!["a_skill", "b_skill"]);
        let catalog = reg.catalog();
        assert_eq!(catalog[0]["name"], "a_skill");
        assert_eq!(catalog[0]["category"], "other");
    }

    #[test]
    fn test_register_rejects_invalid() {
        let mut reg = SkillRegistry::new();
        assert!(reg.register(Named("BadName", object())).is_err());
        assert!(reg
            .register(Named("no_schema", serde_json::json!({"type": "string"})))
            .is_err());
        reg.register(Named("dup", object())).unwrap();
        assert!(matches!(
            reg.register(Named("dup", object())),
            Err(AgentError::InvalidRegistration(_))
        ));
        assert_eq!(reg.len(), 1);
    }
}
