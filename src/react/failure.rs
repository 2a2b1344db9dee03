//! 失败循环检测：同一 {tool, args} 连续两次失败即判定为卡住

use crate::react::scratchpad::ScratchpadEntry;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FailureLoopCheck {
    pub is_loop: bool,
    pub tool: Option<String>,
    pub suggestion: Option<String>,
}

pub fn detect_failure_loop(entries: &[ScratchpadEntry]) -> FailureLoopCheck {
    let [.., prev, last] = entries else {
        return FailureLoopCheck::default();
    };
    let (Some(a), Some(b)) = (&prev.action, &last.action) else {
        return FailureLoopCheck::default();
    };
    if !(prev.failed() && last.failed()) || a.tool != b.tool || a.args != b.args {
        return FailureLoopCheck::default();
    }

    let hint = last
        .observation
        .as_ref()
        .and_then(|o| o.error.as_ref())
        .map(|e| e.suggestion())
        .unwrap_or("Check the arguments.");
    FailureLoopCheck {
        is_loop: true,
        tool: Some(b.tool.clone()),
        suggestion: Some(format!(
            "{} failed twice with the same arguments. {} Try a different tool or different arguments, or ask the user for clarification.",
            b.tool, hint
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SkillError, SkillErrorCode};
    use crate::react::scratchpad::{Observation, ObservationMode, PlannedAction};
    use serde_json::json;

    fn entry(step: usize, path: &str, success: bool) -> ScratchpadEntry {
        ScratchpadEntry::acted(
            step,
            "read it",
            PlannedAction {
                tool: "fs_read".into(),
                args: json!({"path": path}),
            },
            Observation {
                mode: ObservationMode::Structured,
                content: String::new(),
                success,
                error: (!success)
                    .then(|| SkillError::new(SkillErrorCode::FileNotFound, "missing")),
            },
        )
    }

    #[test]
    fn test_single_failure_is_not_loop() {
        assert!(!detect_failure_loop(&[entry(1, "/x", false)]).is_loop);
    }

    #[test]
    fn test_two_identical_failures_is_loop() {
        let check = detect_failure_loop(&[entry(1, "/x", false), entry(2, "/x", false)]);
        assert!(check.is_loop);
        assert_eq!(check.tool.as_deref(), Some("fs_read"));
        assert!(check.suggestion.unwrap().contains("different"));
    }

    #[test]
    fn test_different_args_or_success_is_not_loop() {
        assert!(!detect_failure_loop(&[entry(1, "/x", false), entry(2, "/y", false)]).is_loop);
        assert!(!detect_failure_loop(&[entry(1, "/x", true), entry(2, "/x", false)]).is_loop);
        assert!(!detect_failure_loop(&[]).is_loop);
    }
}
