//! Scratchpad：一次推理运行的有序思考/动作/观察记录
//!
//! 只属于一次运行，不跨请求共享。长度不超过 max_steps；较早的条目按字段截断而不是丢弃，
//! 在 token 预算内保留给 LLM 的连续性。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::format::truncate_chars;
use crate::core::{AgentError, SkillError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationMode {
    /// 机器可解析的摘要，用于规划
    Structured,
    /// 原文，用于字面检索类意图
    Verbatim,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub mode: ObservationMode,
    pub content: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SkillError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScratchpadEntry {
    pub step: usize,
    pub thought: String,
    pub action: Option<PlannedAction>,
    pub observation: Option<Observation>,
    pub timestamp: DateTime<Utc>,
}

impl ScratchpadEntry {
    /// 执行过动作的条目：观察必然存在
    pub fn acted(
        step: usize,
        thought: impl Into<String>,
        action: PlannedAction,
        observation: Observation,
    ) -> Self {
        Self {
            step,
            thought: thought.into(),
            action: Some(action),
            observation: Some(observation),
            timestamp: Utc::now(),
        }
    }

    /// 终止的 respond 条目：只有思考
    pub fn respond(step: usize, thought: impl Into<String>) -> Self {
        Self {
            step,
            thought: thought.into(),
            action: None,
            observation: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(&self) -> bool {
        self.observation.as_ref().is_some_and(|o| !o.success)
    }

    fn truncate(&mut self, cap: usize) {
        self.thought = truncate_chars(&self.thought, cap);
        if let Some(obs) = self.observation.as_mut() {
            obs.content = truncate_chars(&obs.content, cap);
        }
    }
}

#[derive(Debug, Clone)]
pub struct Scratchpad {
    entries: Vec<ScratchpadEntry>,
    max_steps: usize,
    field_cap: usize,
    recent_full: usize,
}

impl Scratchpad {
    pub fn new(max_steps: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_steps,
            field_cap: 600,
            recent_full: 3,
        }
    }

    /// 较早条目的字段上限与保持完整的最近条目数
    pub fn with_truncation(mut self, field_cap: usize, recent_full: usize) -> Self {
        self.field_cap = field_cap;
        self.recent_full = recent_full;
        self
    }

    pub fn push(&mut self, entry: ScratchpadEntry) -> Result<(), AgentError> {
        if self.is_full() {
            return Err(AgentError::MaxStepsExceeded(self.max_steps));
        }
        self.entries.push(entry);
        let older = self.entries.len().saturating_sub(self.recent_full);
        for e in &mut self.entries[..older] {
            e.truncate(self.field_cap);
        }
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.max_steps
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn entries(&self) -> &[ScratchpadEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&ScratchpadEntry> {
        self.entries.last()
    }

    pub fn has_actions(&self) -> bool {
        self.entries.iter().any(|e| e.action.is_some())
    }

    pub fn into_entries(self) -> Vec<ScratchpadEntry> {
        self.entries
    }

    /// 渲染给 planner
    pub fn render(&self) -> String {
        if self.entries.is_empty() {
            return "(no steps yet)".to_string();
        }
        let mut out = String::new();
        for e in &self.entries {
            out.push_str(&format!("Step {}\nThought: {}\n", e.step, e.thought));
            if let Some(a) = &e.action {
                out.push_str(&format!("Action: {} {}\n", a.tool, a.args));
            }
            if let Some(o) = &e.observation {
                let status = if o.success { "ok" } else { "failed" };
                out.push_str(&format!("Observation ({status}): {}\n", o.content));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obs(content: &str) -> Observation {
        Observation {
            mode: ObservationMode::Structured,
            content: content.to_string(),
            success: true,
            error: None,
        }
    }

    fn action() -> PlannedAction {
        PlannedAction {
            tool: "fs_read".into(),
            args: json!({"path": "a"}),
        }
    }

    #[test]
    fn test_push_bounded_by_max_steps() {
        let mut pad = Scratchpad::new(2);
        pad.push(ScratchpadEntry::acted(1, "t", action(), obs("x"))).unwrap();
        pad.push(ScratchpadEntry::respond(2, "done")).unwrap();
        assert!(pad.is_full());
        assert!(matches!(
            pad.push(ScratchpadEntry::respond(3, "again")),
            Err(AgentError::MaxStepsExceeded(2))
        ));
        assert_eq!(pad.len(), 2);
    }

    #[test]
    fn test_older_entries_truncated_not_dropped() {
        let mut pad = Scratchpad::new(10).with_truncation(40, 1);
        let long = "y".repeat(500);
        pad.push(ScratchpadEntry::acted(1, long.clone(), action(), obs(&long))).unwrap();
        pad.push(ScratchpadEntry::acted(2, long.clone(), action(), obs(&long))).unwrap();
        let entries = pad.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].thought.chars().count() <= 40);
        assert!(entries[0].observation.as_ref().unwrap().content.chars().count() <= 40);
        assert_eq!(entries[1].thought.len(), 500);
    }

    #[test]
    fn test_render_includes_observation_status() {
        let mut pad = Scratchpad::new(5);
        pad.push(ScratchpadEntry::acted(1, "look", action(), obs("hello"))).unwrap();
        let text = pad.render();
        assert!(text.contains("Action: fs_read"));
        assert!(text.contains("Observation (ok): hello"));
    }
}
