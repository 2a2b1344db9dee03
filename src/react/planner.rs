//! Planner：向规划 LLM 要结构化决策，并在需要时做最终的自然语言润色
//!
//! 决策格式 `{"thought", "action": {"tool", "args"} | null, "respond", "response"}`；
//! parse_decision 从文本中提取 JSON（```json 代码块或首尾花括号），纯文本视为直接回复。

use std::sync::Arc;

use serde::Deserialize;

use crate::core::AgentError;
use crate::llm::{LlmClient, LlmOptions, LlmTask};
use crate::memory::Message;
use crate::react::scratchpad::{PlannedAction, Scratchpad};
use crate::tools::decision_schema_json;

const PLANNER_PROMPT: &str = "You are the reasoning core of a personal digital twin. \
Work step by step. At each step reply with exactly one JSON object matching the schema below. \
Call at most one skill per step. Set \"respond\": true only when the goal is satisfied or cannot be \
satisfied; never invent facts that no observation supports.";

const FINALIZE_PROMPT: &str = "Write the final answer to the user's goal using only the facts in the \
observations. Keep names, titles and file names exactly as observed. Be concise.";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlannerDecision {
    #[serde(default)]
    pub thought: String,
    #[serde(default)]
    pub action: Option<PlannedAction>,
    #[serde(default)]
    pub respond: bool,
    #[serde(default)]
    pub response: Option<String>,
}

impl PlannerDecision {
    /// 是否进入最终回复（显式 respond，或没有可执行的动作）
    pub fn is_final(&self) -> bool {
        self.respond || self.action.as_ref().map_or(true, |a| a.tool.trim().is_empty())
    }
}

fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// 解析 LLM 输出；没有 JSON 时整段文本作为直接回复
pub fn parse_decision(output: &str) -> Result<PlannerDecision, AgentError> {
    let trimmed = output.trim();
    let Some(json_str) = extract_json(trimmed) else {
        return Ok(PlannerDecision {
            thought: String::new(),
            action: None,
            respond: true,
            response: Some(trimmed.to_string()),
        });
    };
    serde_json::from_str(json_str).map_err(|e| AgentError::JsonParse(format!("{e}: {json_str}")))
}

pub struct Planner {
    llm: Arc<dyn LlmClient>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 规划下一步；feedback 为上一轮的格式纠正提示
    pub async fn plan(
        &self,
        goal: &str,
        context: &str,
        scratchpad: &Scratchpad,
        catalog: &str,
        feedback: Option<&str>,
    ) -> Result<PlannerDecision, AgentError> {
        let system = format!(
            "{PLANNER_PROMPT}\n\nDecision schema:\n{}\n\nAvailable skills:\n{catalog}",
            decision_schema_json()
        );
        let mut user = format!(
            "Goal: {goal}\n\nContext:\n{context}\n\nScratchpad (step {} of at most {}):\n{}",
            scratchpad.len() + 1,
            scratchpad.max_steps(),
            scratchpad.render()
        );
        if let Some(f) = feedback {
            user.push_str(&format!("\n\nNote: {f}"));
        }
        let messages = vec![Message::system(system), Message::user(user)];
        let output = self
            .llm
            .complete(&messages, &LlmOptions::for_task(LlmTask::Planning).with_temperature(0.2))
            .await
            .map_err(|e| AgentError::Llm(e.to_string()))?;
        parse_decision(&output)
    }

    /// 把观察整理成自然语言回复
    pub async fn finalize(
        &self,
        goal: &str,
        scratchpad: &Scratchpad,
        draft: Option<&str>,
    ) -> Result<String, AgentError> {
        let mut user = format!("Goal: {goal}\n\nObservations:\n{}", scratchpad.render());
        if let Some(d) = draft.filter(|d| !d.trim().is_empty()) {
            user.push_str(&format!("\n\nDraft answer:\n{d}"));
        }
        let messages = vec![Message::system(FINALIZE_PROMPT), Message::user(user)];
        let out = self
            .llm
            .complete(&messages, &LlmOptions::for_task(LlmTask::Finalizing))
            .await
            .map_err(|e| AgentError::Llm(e.to_string()))?;
        Ok(out.trim().to_string())
    }
}
