//! 快速路径：只需一次已知工具调用即可满足的纯检索请求（如「列出我的任务」），
//! 直接执行并返回结构化输出，跳过迭代循环与 LLM 调用。

use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;

use crate::react::scratchpad::PlannedAction;
use crate::tools::SkillRegistry;

static TASK_LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:please\s+)?(?:list|show|display|get|what are)(?:\s+me)?(?:\s+all)?(?:\s+of)?\s+(?:my\s+)?(?:active\s+|open\s+|current\s+|pending\s+)?(?:tasks|todos|to-dos)(?:\s+please)?[\s.?!]*$",
    )
    .expect("task list pattern is valid")
});

static FILE_LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:please\s+)?(?:list|show)(?:\s+me)?(?:\s+all)?\s+(?:the\s+)?(?:workspace\s+)?files(?:\s+in\s+(?:the\s+)?workspace)?[\s.?!]*$",
    )
    .expect("file list pattern is valid")
});

/// 目标是否可由单个已注册工具直接满足
pub fn detect_fast_path(goal: &str, registry: &SkillRegistry) -> Option<PlannedAction> {
    let goal = goal.trim();
    let candidate = if TASK_LIST_RE.is_match(goal) {
        PlannedAction {
            tool: "task_list".to_string(),
            args: json!({}),
        }
    } else if FILE_LIST_RE.is_match(goal) {
        PlannedAction {
            tool: "fs_list".to_string(),
            args: json!({ "path": "." }),
        }
    } else {
        return None;
    };
    registry.contains(&candidate.tool).then_some(candidate)
}
