//! 纯对话技能：把一段回复原样作为工具输出（agent 模式下不被捕获为记忆）

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::{RequestContext, SkillError};
use crate::tools::registry::{Skill, SkillCategory};

pub struct ConversationalResponseSkill;

#[async_trait]
impl Skill for ConversationalResponseSkill {
    fn name(&self) -> &str {
        "conversational_response"
    }

    fn description(&self) -> &str {
        "Reply conversationally without touching any data. Args: {\"message\": \"text\"}"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "message": { "type": "string" } },
            "required": ["message"]
        })
    }

    fn category(&self) -> SkillCategory {
        SkillCategory::Conversational
    }

    async fn execute(&self, _ctx: &RequestContext, inputs: Value) -> Result<Value, SkillError> {
        let message = inputs
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        Ok(json!({ "response": message }))
    }
}
