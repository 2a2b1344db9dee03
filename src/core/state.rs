//! 推理循环状态机
//!
//! idle → planning → acting → observing → {planning | completed | stuck | error}

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Idle,
    Planning,
    Acting,
    Observing,
    Completed,
    Stuck,
    Error,
}

impl LoopPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopPhase::Completed | LoopPhase::Stuck | LoopPhase::Error)
    }

    /// 合法迁移；planning 可直接完成（respond）或重试（输出不可解析），acting 可因快速路径跳过 planning
    pub fn can_transition_to(&self, next: LoopPhase) -> bool {
        use LoopPhase::*;
        match (self, next) {
            (Idle, Planning) | (Idle, Acting) | (Idle, Error) => true,
            (Planning, Planning)
            | (Planning, Acting)
            | (Planning, Completed)
            | (Planning, Stuck)
            | (Planning, Error) => true,
            (Acting, Observing) | (Acting, Error) => true,
            (Observing, Planning)
            | (Observing, Completed)
            | (Observing, Stuck)
            | (Observing, Error) => true,
            _ => false,
        }
    }
}

/// 单次运行的阶段跟踪器（非法迁移只记日志，不中止）
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    phase: LoopPhase,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self {
            phase: LoopPhase::Idle,
        }
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> LoopPhase {
        self.phase
    }

    pub fn advance(&mut self, next: LoopPhase) {
        if !self.phase.can_transition_to(next) {
            tracing::warn!(from = ?self.phase, to = ?next, "unexpected loop phase transition");
        }
        tracing::debug!(from = ?self.phase, to = ?next, "loop phase");
        self.phase = next;
    }
}
