//! 观察格式化：structured（规划用摘要）与 verbatim（原文，防止模型改写文件名等事实）

use serde_json::Value;

use crate::context::format::truncate_chars;
use crate::react::scratchpad::{Observation, ObservationMode};
use crate::tools::SkillOutcome;

/// structured 观察的字符上限
const STRUCTURED_CAP: usize = 2000;
/// verbatim 观察的字符上限
const VERBATIM_CAP: usize = 8000;

pub fn format_observation(outcome: &SkillOutcome, mode: ObservationMode) -> Observation {
    if let Some(err) = &outcome.error {
        return Observation {
            mode,
            content: format!(
                "ERROR {}: {}\nSuggestion: {}",
                err.code,
                err.message,
                err.suggestion()
            ),
            success: false,
            error: Some(err.clone()),
        };
    }
    let content = match mode {
        ObservationMode::Structured => compact_json(&outcome.outputs, STRUCTURED_CAP),
        ObservationMode::Verbatim => truncate_chars(&render_verbatim(&outcome.outputs), VERBATIM_CAP),
    };
    Observation {
        mode,
        content,
        success: outcome.success,
        error: None,
    }
}

/// 序列化为不超过 max 个字符的合法 JSON：先在 Value 内部截断长字符串与长数组，逐轮收紧
fn compact_json(outputs: &Value, max: usize) -> String {
    let full = serde_json::to_string(outputs).unwrap_or_default();
    if full.chars().count() <= max {
        return full;
    }
    let mut cap = max / 2;
    while cap >= 32 {
        let text = serde_json::to_string(&shrink_value(outputs, cap)).unwrap_or_default();
        if text.chars().count() <= max {
            return text;
        }
        cap /= 2;
    }
    // 键过多等极端情况：整体降级为预览字符串
    let preview = truncate_chars(&full, max / 4);
    serde_json::json!({ "truncated": true, "preview": preview }).to_string()
}

fn shrink_value(value: &Value, cap: usize) -> Value {
    match value {
        Value::String(s) => Value::String(truncate_chars(s, cap)),
        Value::Array(items) => {
            let keep = (cap / 16).max(1);
            let mut out: Vec<Value> = items.iter().take(keep).map(|v| shrink_value(v, cap)).collect();
            if items.len() > keep {
                out.push(Value::String(format!("[{} more]", items.len() - keep)));
            }
            Value::Array(out)
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), shrink_value(v, cap)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// 把技能输出渲染为可直接展示给用户的原文
pub fn render_verbatim(outputs: &Value) -> String {
    if let Some(tasks) = outputs.get("tasks").and_then(|t| t.as_array()) {
        if tasks.is_empty() {
            return "No active tasks.".to_string();
        }
        let lines: Vec<String> = tasks
            .iter()
            .map(|t| {
                let title = t.get("title").and_then(|v| v.as_str()).unwrap_or("(untitled)");
                format!("- {title}")
            })
            .collect();
        return format!("Active tasks ({}):\n{}", tasks.len(), lines.join("\n"));
    }
    if let Some(content) = outputs.get("content").and_then(|c| c.as_str()) {
        return content.to_string();
    }
    if let Some(entries) = outputs.get("entries").and_then(|e| e.as_array()) {
        return entries
            .iter()
            .filter_map(|e| e.as_str())
            .collect::<Vec<_>>()
            .join("\n");
    }
    if let Some(response) = outputs.get("response").and_then(|r| r.as_str()) {
        return response.to_string();
    }
    match outputs {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}
