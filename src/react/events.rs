//! 推理过程事件：每个思考 / 动作 / 观察推送一条，供调用方实时展示

use serde::Serialize;

use crate::react::scratchpad::ObservationMode;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// 当前第几步
    StepUpdate { step: usize, max_steps: usize },
    Thought { step: usize, text: String },
    Action {
        step: usize,
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览）
    Observation {
        step: usize,
        tool: String,
        mode: ObservationMode,
        success: bool,
        preview: String,
    },
    /// 跳过循环或最终润色调用（fast_path / strict_finalize）
    Shortcut { kind: String, tool: String },
    Stuck { reason: String, suggestion: String },
    Completed { response: String },
    Error { text: String },
}

pub type ProgressSender = tokio::sync::mpsc::UnboundedSender<ProgressEvent>;

pub(crate) fn send_event(tx: Option<&ProgressSender>, ev: ProgressEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}
