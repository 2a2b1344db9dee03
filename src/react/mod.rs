//! 推理层：ReAct 循环（快速路径、规划、执行、观察、失败循环检测、严格收尾）

pub mod engine;
pub mod events;
pub mod failure;
pub mod fast_path;
pub mod observation;
pub mod planner;
pub mod scratchpad;

pub use engine::{
    EngineSettings, ReasoningDepth, ReasoningEngine, ReasoningSession, ResponseStyle, RunMetadata,
    RunOutcome, RunResult,
};
pub use events::{ProgressEvent, ProgressSender};
pub use failure::{detect_failure_loop, FailureLoopCheck};
pub use fast_path::detect_fast_path;
pub use observation::{format_observation, render_verbatim};
pub use planner::{parse_decision, Planner, PlannerDecision};
pub use scratchpad::{Observation, ObservationMode, PlannedAction, Scratchpad, ScratchpadEntry};
