//! 技能清单校验与 planner 决策格式 Schema
//!
//! - 注册时校验名称与 schema 形状
//! - 执行前按输入 schema 的 required / 基本类型校验参数（INVALID_INPUT）
//! - schemars 生成决策 JSON Schema，拼入 planner system prompt，减少格式错误

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

use crate::core::{SkillError, SkillErrorCode};

/// planner 决策格式（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct DecisionFormat {
    /// 本步推理
    thought: String,
    /// 要调用的技能；respond 为 true 时为 null
    action: Option<ActionFormat>,
    /// 是否结束并回复用户
    respond: bool,
    /// respond 为 true 时的最终回复
    response: Option<String>,
}

#[allow(dead_code)]
#[derive(JsonSchema)]
struct ActionFormat {
    /// 技能名，如 task_list、fs_read
    tool: String,
    /// 技能参数，需符合该技能的 input_schema
    args: HashMap<String, Value>,
}

pub fn decision_schema_json() -> String {
    let schema = schema_for!(DecisionFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

fn is_snake_case(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !name.ends_with('_')
        && !name.contains("__")
}

fn is_object_schema(schema: &Value) -> bool {
    schema.is_object() && schema.get("type").and_then(|t| t.as_str()) == Some("object")
}

/// 校验技能清单
pub fn validate_manifest(name: &str, input: &Value, output: &Value) -> Result<(), String> {
    if !is_snake_case(name) {
        return Err("name must be non-empty snake_case".to_string());
    }
    if !is_object_schema(input) {
        return Err("input schema must be an object schema".to_string());
    }
    if !is_object_schema(output) {
        return Err("output schema must be an object schema".to_string());
    }
    if let Some(required) = input.get("required") {
        let Some(list) = required.as_array() else {
            return Err("input schema `required` must be an array".to_string());
        };
        if list.iter().any(|v| !v.is_string()) {
            return Err("input schema `required` entries must be strings".to_string());
        }
    }
    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

/// 按 required 与属性基本类型校验输入
pub fn validate_inputs(schema: &Value, inputs: &Value) -> Result<(), SkillError> {
    let Some(obj) = inputs.as_object() else {
        return Err(SkillError::new(
            SkillErrorCode::InvalidInput,
            "inputs must be a JSON object",
        ));
    };
    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        let missing: Vec<&str> = required
            .iter()
            .filter_map(|k| k.as_str())
            .filter(|k| obj.get(*k).map_or(true, Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(SkillError::new(
                SkillErrorCode::InvalidInput,
                format!("missing required field(s): {}", missing.join(", ")),
            )
            .with_context(serde_json::json!({ "missing": missing })));
        }
    }
    if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
        for (key, value) in obj {
            let Some(expected) = props
                .get(key)
                .and_then(|p| p.get("type"))
                .and_then(|t| t.as_str())
            else {
                continue;
            };
            if !type_matches(expected, value) {
                return Err(SkillError::new(
                    SkillErrorCode::InvalidInput,
                    format!("field `{key}` must be of type {expected}"),
                )
                .with_context(serde_json::json!({ "field": key, "expected": expected })));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snake_case_names() {
        assert!(is_snake_case("task_list"));
        assert!(is_snake_case("fs_read2"));
        assert!(!is_snake_case(""));
        assert!(!is_snake_case("TaskList"));
        assert!(!is_snake_case("task-list"));
        assert!(!is_snake_case("_task"));
    }

    #[test]
    fn test_validate_inputs() {
        let schema = json!({
            "type": "object",
            "properties": {"path": {"type": "string"}, "limit": {"type": "integer"}},
            "required": ["path"]
        });
        assert!(validate_inputs(&schema, &json!({"path": "a.md"})).is_ok());
        let err = validate_inputs(&schema, &json!({})).unwrap_err();
        assert_eq!(err.code, SkillErrorCode::InvalidInput);
        assert!(err.message.contains("path"));
        assert!(validate_inputs(&schema, &json!({"path": 3})).is_err());
        assert!(validate_inputs(&schema, &json!({"path": "a", "limit": 1.5})).is_err());
        assert!(validate_inputs(&schema, &json!("str")).is_err());
    }

    #[test]
    fn test_decision_schema_mentions_fields() {
        let s = decision_schema_json();
        assert!(s.contains("thought"));
        assert!(s.contains("respond"));
        assert!(s.contains("action"));
    }
}
