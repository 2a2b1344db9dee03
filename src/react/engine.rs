//! ReAct 推理引擎
//!
//! 快速路径检查 → [规划 → 执行 → 观察] 循环 → 最终回复 / 卡住 / 取消。
//! 状态：idle → planning → acting → observing → {planning | completed | stuck | error}。
//! 每次 LLM 调用前检查取消；工具调用按策略异步捕获为记忆，捕获失败只记日志。

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::context::{classify_intent, format_context, CharBudget, ContextPackage};
use crate::core::{AgentError, LoopPhase, PhaseTracker, RequestContext, SkillError, TrustLevel};
use crate::memory::{InvocationRecorder, ToolInvocation};
use crate::observability::{AuditCategory, AuditEvent, AuditLevel, AuditSink, TracingAuditSink};
use crate::policy::SecurityPolicy;
use crate::react::events::{send_event, ProgressEvent, ProgressSender};
use crate::react::failure::detect_failure_loop;
use crate::react::fast_path::detect_fast_path;
use crate::react::observation::{format_observation, render_verbatim};
use crate::react::planner::Planner;
use crate::react::scratchpad::{ObservationMode, PlannedAction, Scratchpad, ScratchpadEntry};
use crate::tools::{SkillExecutor, SkillOutcome};

/// 观察预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 推理深度：决定最大步数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningDepth {
    Quick,
    #[default]
    Focused,
    Deep,
}

impl ReasoningDepth {
    pub fn max_steps(&self) -> usize {
        match self {
            ReasoningDepth::Quick => 5,
            ReasoningDepth::Focused => 10,
            ReasoningDepth::Deep => 15,
        }
    }
}

impl FromStr for ReasoningDepth {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quick" => Ok(ReasoningDepth::Quick),
            "focused" => Ok(ReasoningDepth::Focused),
            "deep" => Ok(ReasoningDepth::Deep),
            other => Err(AgentError::Config(format!("unknown reasoning depth: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStyle {
    #[default]
    Default,
    /// 最后一次观察已满足目标时直接返回其内容，跳过润色调用
    Strict,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunResult {
    Completed { response: String },
    Stuck { reason: String, suggestion: String },
    Cancelled,
    Error { message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunMetadata {
    pub steps: usize,
    pub llm_calls: usize,
    pub tool_calls: usize,
    pub fast_path: bool,
    pub strict_shortcut: bool,
    pub duration_ms: u64,
    pub depth: ReasoningDepth,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub result: RunResult,
    pub scratchpad: Vec<ScratchpadEntry>,
    pub metadata: RunMetadata,
}

impl RunOutcome {
    pub fn response(&self) -> Option<&str> {
        match &self.result {
            RunResult::Completed { response } => Some(response),
            _ => None,
        }
    }
}

/// 一次运行的输入
pub struct ReasoningSession<'a> {
    pub ctx: &'a RequestContext,
    pub goal: &'a str,
    pub context: &'a ContextPackage,
    pub policy: Arc<SecurityPolicy>,
    pub progress: Option<&'a ProgressSender>,
    pub depth: ReasoningDepth,
    pub response_style: ResponseStyle,
    pub trust: TrustLevel,
    pub auto_approve: bool,
}

impl<'a> ReasoningSession<'a> {
    pub fn new(ctx: &'a RequestContext, goal: &'a str, context: &'a ContextPackage) -> Self {
        Self {
            ctx,
            goal,
            context,
            policy: ctx.policy(),
            progress: None,
            depth: ReasoningDepth::default(),
            response_style: ResponseStyle::default(),
            trust: ctx.trust,
            auto_approve: false,
        }
    }

    pub fn with_policy(mut self, policy: Arc<SecurityPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_progress(mut self, tx: &'a ProgressSender) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn with_depth(mut self, depth: ReasoningDepth) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_response_style(mut self, style: ResponseStyle) -> Self {
        self.response_style = style;
        self
    }

    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }
}

/// 引擎级参数（来自 `[reasoning]` 配置段）
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub observation_field_cap: usize,
    pub recent_entries_full: usize,
    pub context_char_budget: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            observation_field_cap: 600,
            recent_entries_full: 3,
            context_char_budget: 6000,
        }
    }
}

pub struct ReasoningEngine {
    planner: Planner,
    executor: Arc<SkillExecutor>,
    recorder: Option<InvocationRecorder>,
    audit: Arc<dyn AuditSink>,
    settings: EngineSettings,
}

/// 单次运行的可变状态
struct RunState {
    scratchpad: Scratchpad,
    meta: RunMetadata,
    phase: PhaseTracker,
    captures: Vec<JoinHandle<()>>,
    /// 最近一次成功观察的原始输出（strict 收尾用）
    last_outputs: Option<(String, Value)>,
    started: Instant,
}

impl ReasoningEngine {
    pub fn new(planner: Planner, executor: Arc<SkillExecutor>) -> Self {
        Self {
            planner,
            executor,
            recorder: None,
            audit: Arc::new(TracingAuditSink),
            settings: EngineSettings::default(),
        }
    }

    pub fn with_recorder(mut self, recorder: InvocationRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub async fn run(&self, session: ReasoningSession<'_>) -> RunOutcome {
        let max_steps = session.depth.max_steps();
        let mut state = RunState {
            scratchpad: Scratchpad::new(max_steps).with_truncation(
                self.settings.observation_field_cap,
                self.settings.recent_entries_full,
            ),
            meta: RunMetadata {
                depth: session.depth,
                ..Default::default()
            },
            phase: PhaseTracker::new(),
            captures: Vec::new(),
            last_outputs: None,
            started: Instant::now(),
        };
        let result = self.drive(&session, &mut state).await;
        self.finish(&session, state, result).await
    }

    async fn finish(
        &self,
        session: &ReasoningSession<'_>,
        mut state: RunState,
        result: RunResult,
    ) -> RunOutcome {
        let terminal = match &result {
            RunResult::Completed { response } => {
                send_event(
                    session.progress,
                    ProgressEvent::Completed {
                        response: response.clone(),
                    },
                );
                LoopPhase::Completed
            }
            RunResult::Stuck { reason, suggestion } => {
                send_event(
                    session.progress,
                    ProgressEvent::Stuck {
                        reason: reason.clone(),
                        suggestion: suggestion.clone(),
                    },
                );
                LoopPhase::Stuck
            }
            RunResult::Cancelled => {
                send_event(
                    session.progress,
                    ProgressEvent::Error {
                        text: "cancelled".to_string(),
                    },
                );
                LoopPhase::Error
            }
            RunResult::Error { message } => {
                send_event(
                    session.progress,
                    ProgressEvent::Error {
                        text: message.clone(),
                    },
                );
                LoopPhase::Error
            }
        };
        state.phase.advance(terminal);

        // 捕获写入在后台任务中完成；这里等待它们结束，失败已在任务内记录
        for joined in futures_util::future::join_all(state.captures.drain(..)).await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "tool capture task panicked");
            }
        }

        state.meta.steps = state.scratchpad.len();
        state.meta.duration_ms = state.started.elapsed().as_millis() as u64;
        tracing::info!(
            user = %session.ctx.user_id,
            steps = state.meta.steps,
            llm_calls = state.meta.llm_calls,
            tool_calls = state.meta.tool_calls,
            fast_path = state.meta.fast_path,
            duration_ms = state.meta.duration_ms,
            "reasoning run finished"
        );
        RunOutcome {
            result,
            scratchpad: state.scratchpad.into_entries(),
            metadata: state.meta,
        }
    }

    async fn drive(&self, session: &ReasoningSession<'_>, state: &mut RunState) -> RunResult {
        if session.ctx.is_cancelled() {
            return RunResult::Cancelled;
        }
        let intent = classify_intent(session.goal);
        let mode = if intent.literal_retrieval {
            ObservationMode::Verbatim
        } else {
            ObservationMode::Structured
        };

        if let Some(action) = detect_fast_path(session.goal, self.executor.registry()) {
            state.meta.fast_path = true;
            send_event(
                session.progress,
                ProgressEvent::Shortcut {
                    kind: "fast_path".to_string(),
                    tool: action.tool.clone(),
                },
            );
            self.audit_shortcut(session, "fast_path", &action.tool);
            state.phase.advance(LoopPhase::Acting);
            let thought = format!("Direct lookup via {}", action.tool);
            let outcome = self.act(session, state, 1, &thought, action, mode).await;
            if outcome.success {
                return RunResult::Completed {
                    response: render_verbatim(&outcome.outputs),
                };
            }
            tracing::info!("fast path failed, continuing with the planning loop");
        }

        let catalog = self.executor.registry().catalog_json();
        let budget = CharBudget::new(self.settings.context_char_budget);
        let context_text =
            format_context(session.context, session.goal, session.ctx.role, &budget);
        let mut feedback: Option<String> = None;
        let mut iterations = 0;

        while !state.scratchpad.is_full() && iterations < state.scratchpad.max_steps() {
            iterations += 1;
            let step = state.scratchpad.len() + 1;
            send_event(
                session.progress,
                ProgressEvent::StepUpdate {
                    step,
                    max_steps: state.scratchpad.max_steps(),
                },
            );
            if session.ctx.is_cancelled() {
                return RunResult::Cancelled;
            }

            state.phase.advance(LoopPhase::Planning);
            state.meta.llm_calls += 1;
            let decision = match self
                .planner
                .plan(
                    session.goal,
                    &context_text,
                    &state.scratchpad,
                    &catalog,
                    feedback.as_deref(),
                )
                .await
            {
                Ok(d) => d,
                Err(AgentError::JsonParse(e)) => {
                    tracing::warn!(error = %e, "planner output was not valid JSON");
                    feedback = Some(
                        "Your previous reply was not valid JSON. Reply with one JSON object only."
                            .to_string(),
                    );
                    continue;
                }
                Err(e) => return RunResult::Error { message: e.to_string() },
            };
            feedback = None;
            send_event(
                session.progress,
                ProgressEvent::Thought {
                    step,
                    text: decision.thought.clone(),
                },
            );

            if decision.is_final() {
                return self
                    .finalize(session, state, step, decision.thought, decision.response)
                    .await;
            }
            let Some(action) = decision.action else {
                continue;
            };
            state.phase.advance(LoopPhase::Acting);
            self.act(session, state, step, &decision.thought, action, mode).await;

            let check = detect_failure_loop(state.scratchpad.entries());
            if check.is_loop {
                let tool = check.tool.unwrap_or_default();
                let suggestion = check.suggestion.unwrap_or_default();
                tracing::warn!(tool = %tool, "failure loop detected");
                let err = AgentError::FailureLoopDetected {
                    tool,
                    suggestion: suggestion.clone(),
                };
                return RunResult::Stuck {
                    reason: err.to_string(),
                    suggestion,
                };
            }
        }

        let err = AgentError::MaxStepsExceeded(state.scratchpad.max_steps());
        RunResult::Stuck {
            reason: err.to_string(),
            suggestion: "Break the goal into smaller requests or use a deeper reasoning depth."
                .to_string(),
        }
    }

    /// 执行一次动作并写入 scratchpad；安全违规与技能失败都转成观察回灌给 planner
    async fn act(
        &self,
        session: &ReasoningSession<'_>,
        state: &mut RunState,
        step: usize,
        thought: &str,
        mut action: PlannedAction,
        mode: ObservationMode,
    ) -> SkillOutcome {
        if action.args.is_null() {
            action.args = Value::Object(Default::default());
        }
        send_event(
            session.progress,
            ProgressEvent::Action {
                step,
                tool: action.tool.clone(),
                args: action.args.clone(),
            },
        );
        state.meta.tool_calls += 1;
        let outcome = match self
            .executor
            .execute_skill(
                session.ctx,
                &action.tool,
                action.args.clone(),
                session.trust,
                session.auto_approve,
                &session.policy,
            )
            .await
        {
            Ok(o) => o,
            Err(sec) => {
                tracing::warn!(tool = %action.tool, error = %sec, "skill refused by security policy");
                SkillOutcome::failed(SkillError::from(sec), 0)
            }
        };

        if let Some(recorder) = &self.recorder {
            let invocation = ToolInvocation::new(
                &action.tool,
                action.args.clone(),
                outcome.outputs.clone(),
                outcome.success,
            )
            .with_error(outcome.error.as_ref().map(|e| e.to_string()))
            .with_execution_time(outcome.execution_time_ms);
            if let Some(handle) = recorder.record(session.ctx, &session.policy, invocation) {
                state.captures.push(handle);
            }
        }

        state.phase.advance(LoopPhase::Observing);
        let observation = format_observation(&outcome, mode);
        let preview: String = observation
            .content
            .chars()
            .take(OBSERVATION_PREVIEW_CHARS)
            .collect();
        send_event(
            session.progress,
            ProgressEvent::Observation {
                step,
                tool: action.tool.clone(),
                mode,
                success: observation.success,
                preview,
            },
        );
        state.last_outputs = outcome
            .success
            .then(|| (action.tool.clone(), outcome.outputs.clone()));

        let entry = ScratchpadEntry::acted(step, thought, action, observation);
        if let Err(e) = state.scratchpad.push(entry) {
            tracing::warn!(error = %e, "scratchpad full, observation dropped");
        }
        outcome
    }

    async fn finalize(
        &self,
        session: &ReasoningSession<'_>,
        state: &mut RunState,
        step: usize,
        thought: String,
        draft: Option<String>,
    ) -> RunResult {
        let last_ok = state.scratchpad.last().is_some_and(|e| !e.failed());
        let response = match (&state.last_outputs, session.response_style) {
            (Some((tool, outputs)), ResponseStyle::Strict) if last_ok => {
                state.meta.strict_shortcut = true;
                send_event(
                    session.progress,
                    ProgressEvent::Shortcut {
                        kind: "strict_finalize".to_string(),
                        tool: tool.clone(),
                    },
                );
                self.audit_shortcut(session, "strict_finalize", tool);
                render_verbatim(outputs)
            }
            _ if !state.scratchpad.has_actions()
                && draft.as_deref().is_some_and(|d| !d.trim().is_empty()) =>
            {
                draft.clone().unwrap_or_default()
            }
            _ => {
                if session.ctx.is_cancelled() {
                    return RunResult::Cancelled;
                }
                state.meta.llm_calls += 1;
                match self
                    .planner
                    .finalize(session.goal, &state.scratchpad, draft.as_deref())
                    .await
                {
                    Ok(r) => r,
                    Err(e) => return RunResult::Error { message: e.to_string() },
                }
            }
        };
        if let Err(e) = state.scratchpad.push(ScratchpadEntry::respond(step, thought)) {
            tracing::debug!(error = %e, "respond entry not recorded");
        }
        RunResult::Completed { response }
    }

    fn audit_shortcut(&self, session: &ReasoningSession<'_>, kind: &str, tool: &str) {
        self.audit.audit(
            AuditEvent::new(AuditLevel::Info, AuditCategory::Action, kind, &session.ctx.user_id)
                .with_details(serde_json::json!({
                    "tool": tool,
                    "goal": session.goal,
                    "mode": session.ctx.mode,
                })),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::memory::{FileEpisodicStore, JsonProfileStore, ProfileStore, TaskItem};
    use crate::observability::MemoryAuditSink;
    use crate::policy::{CognitiveMode, UserRole};
    use crate::tools::{builtin_registry, SafeFs, WritePathGuard};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        profiles: Arc<JsonProfileStore>,
        store: Arc<FileEpisodicStore>,
        executor: Arc<SkillExecutor>,
        audit: Arc<MemoryAuditSink>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("profiles");
        let ws = dir.path().join("ws");
        std::fs::create_dir_all(&ws).unwrap();
        let profiles = Arc::new(JsonProfileStore::new(&data));
        let store = Arc::new(FileEpisodicStore::new(&data));
        let registry = builtin_registry(profiles.clone(), SafeFs::new(&ws)).unwrap();
        let audit = Arc::new(MemoryAuditSink::new());
        let executor = Arc::new(
            SkillExecutor::new(Arc::new(registry), WritePathGuard::new(&data), 5)
                .with_audit(audit.clone()),
        );
        Fixture {
            _dir: dir,
            profiles,
            store,
            executor,
            audit,
        }
    }

    fn engine(f: &Fixture, llm: Arc<ScriptedLlmClient>) -> ReasoningEngine {
        ReasoningEngine::new(Planner::new(llm), f.executor.clone())
            .with_recorder(InvocationRecorder::new(f.store.clone()))
            .with_audit(f.audit.clone())
    }

    fn owner() -> RequestContext {
        RequestContext::new("alice", UserRole::Owner, CognitiveMode::Dual).with_conversation("c1")
    }

    #[tokio::test]
    async fn test_fast_path_skips_llm() {
        let f = fixture();
        f.profiles.add_task("alice", TaskItem::new("One")).await.unwrap();
        let llm = Arc::new(ScriptedLlmClient::new(Vec::<String>::new()));
        let eng = engine(&f, llm.clone());
        let ctx = owner();
        let pkg = ContextPackage::empty(ctx.mode);
        let out = eng.run(ReasoningSession::new(&ctx, "list my tasks", &pkg)).await;
        assert_eq!(out.response(), Some("Active tasks (1):\n- One"));
        assert!(out.metadata.fast_path);
        assert_eq!(out.metadata.llm_calls, 0);
        assert_eq!(llm.calls(), 0);
        assert_eq!(f.audit.count("fast_path"), 1);
    }

    #[tokio::test]
    async fn test_strict_finalization_skips_phrasing_call() {
        let f = fixture();
        f.profiles.add_task("alice", TaskItem::new("Water plants")).await.unwrap();
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"thought": "check tasks", "action": {"tool": "task_list", "args": {}}, "respond": false}"#,
            r#"{"thought": "done", "action": null, "respond": true}"#,
        ]));
        let eng = engine(&f, llm.clone());
        let ctx = owner();
        let pkg = ContextPackage::empty(ctx.mode);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let out = eng
            .run(
                ReasoningSession::new(&ctx, "anything on my plate today?", &pkg)
                    .with_response_style(ResponseStyle::Strict)
                    .with_progress(&tx),
            )
            .await;
        assert_eq!(out.response(), Some("Active tasks (1):\n- Water plants"));
        assert!(out.metadata.strict_shortcut);
        assert_eq!(llm.calls(), 2);
        assert_eq!(out.scratchpad.len(), 2);

        let mut saw_shortcut = false;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, ProgressEvent::Shortcut { ref kind, .. } if kind == "strict_finalize") {
                saw_shortcut = true;
            }
        }
        assert!(saw_shortcut);
    }

    #[tokio::test]
    async fn test_strict_falls_back_to_finalizer_after_failed_step() {
        let f = fixture();
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"thought": "read it", "action": {"tool": "fs_read", "args": {"path": "missing.md"}}, "respond": false}"#,
            r#"{"thought": "cannot read", "respond": true}"#,
            "I could not find missing.md in your workspace.",
        ]));
        let eng = engine(&f, llm.clone());
        let ctx = owner();
        let pkg = ContextPackage::empty(ctx.mode);
        let out = eng
            .run(
                ReasoningSession::new(&ctx, "what does missing.md say?", &pkg)
                    .with_response_style(ResponseStyle::Strict),
            )
            .await;
        assert_eq!(out.response(), Some("I could not find missing.md in your workspace."));
        assert!(!out.metadata.strict_shortcut);
        assert_eq!(out.metadata.llm_calls, 3);
        assert_eq!(llm.calls(), 3);
        assert!(out.scratchpad[0].failed());
    }

    #[tokio::test]
    async fn test_literal_goal_observes_verbatim_in_loop() {
        let f = fixture();
        std::fs::write(f._dir.path().join("ws").join("notes.md"), "Buy **oat** milk\n").unwrap();
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"thought": "read notes", "action": {"tool": "fs_read", "args": {"path": "notes.md"}}, "respond": false}"#,
            r#"{"thought": "done", "respond": true}"#,
            "Your notes say: Buy **oat** milk",
        ]));
        let eng = engine(&f, llm.clone());
        let ctx = owner();
        let pkg = ContextPackage::empty(ctx.mode);
        let out = eng.run(ReasoningSession::new(&ctx, "show notes.md", &pkg)).await;
        assert!(!out.metadata.fast_path);
        let observation = out.scratchpad[0].observation.as_ref().unwrap();
        assert_eq!(observation.mode, ObservationMode::Verbatim);
        assert_eq!(observation.content, "Buy **oat** milk\n");

        let structured = Arc::new(ScriptedLlmClient::new([
            r#"{"thought": "read notes", "action": {"tool": "fs_read", "args": {"path": "notes.md"}}, "respond": false}"#,
            r#"{"thought": "done", "respond": true}"#,
            "Oat milk.",
        ]));
        let out = engine(&f, structured)
            .run(ReasoningSession::new(&ctx, "what should I buy?", &pkg))
            .await;
        let observation = out.scratchpad[0].observation.as_ref().unwrap();
        assert_eq!(observation.mode, ObservationMode::Structured);
    }

    #[tokio::test]
    async fn test_default_style_calls_finalizer() {
        let f = fixture();
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"thought": "check", "action": {"tool": "task_list", "args": {}}, "respond": false}"#,
            r#"{"thought": "done", "respond": true}"#,
            "You have nothing scheduled.",
        ]));
        let eng = engine(&f, llm.clone());
        let ctx = owner();
        let pkg = ContextPackage::empty(ctx.mode);
        let out = eng
            .run(ReasoningSession::new(&ctx, "anything on my plate?", &pkg))
            .await;
        assert_eq!(out.response(), Some("You have nothing scheduled."));
        assert_eq!(out.metadata.llm_calls, 3);
    }

    #[tokio::test]
    async fn test_failure_loop_returns_stuck() {
        let f = fixture();
        let read = r#"{"thought": "read", "action": {"tool": "fs_read", "args": {"path": "/x"}}, "respond": false}"#;
        let llm = Arc::new(ScriptedLlmClient::new([read, read, read]));
        let eng = engine(&f, llm.clone());
        let ctx = owner();
        let pkg = ContextPackage::empty(ctx.mode);
        let out = eng.run(ReasoningSession::new(&ctx, "read /x", &pkg)).await;
        assert!(matches!(out.result, RunResult::Stuck { .. }));
        assert_eq!(out.scratchpad.len(), 2);
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_max_steps_bounds_scratchpad() {
        let f = fixture();
        let llm = Arc::new(ScriptedLlmClient::new((0..10).map(|i| {
            format!(
                r#"{{"thought": "look {i}", "action": {{"tool": "fs_list", "args": {{"path": "."}}}}, "respond": false}}"#
            )
        })));
        let eng = engine(&f, llm);
        let ctx = owner();
        let pkg = ContextPackage::empty(ctx.mode);
        let out = eng
            .run(ReasoningSession::new(&ctx, "explore", &pkg).with_depth(ReasoningDepth::Quick))
            .await;
        assert!(matches!(out.result, RunResult::Stuck { .. }));
        assert_eq!(out.scratchpad.len(), 5);
        assert_eq!(out.metadata.steps, 5);
    }

    #[test]
    fn test_depth_from_str() {
        assert_eq!("Deep".parse::<ReasoningDepth>().unwrap(), ReasoningDepth::Deep);
        assert_eq!(ReasoningDepth::Quick.max_steps(), 5);
        assert!("huge".parse::<ReasoningDepth>().is_err());
    }

    #[tokio::test]
    async fn test_cancel_before_llm_call() {
        let f = fixture();
        let llm = Arc::new(ScriptedLlmClient::new(["never"]));
        let eng = engine(&f, llm.clone());
        let ctx = owner();
        ctx.cancel.cancel();
        let pkg = ContextPackage::empty(ctx.mode);
        let out = eng.run(ReasoningSession::new(&ctx, "hello", &pkg)).await;
        assert_eq!(out.result, RunResult::Cancelled);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_emulation_write_surfaces_as_observation() {
        let f = fixture();
        let write = r#"{"thought": "save", "action": {"tool": "task_create", "args": {"title": "x"}}, "respond": false}"#;
        let llm = Arc::new(ScriptedLlmClient::new([
            write,
            r#"{"thought": "cannot", "respond": true, "response": "I can't write in this mode."}"#,
            "I can't write in this mode.",
        ]));
        let eng = engine(&f, llm);
        let ctx = RequestContext::new("alice", UserRole::Owner, CognitiveMode::Emulation);
        let pkg = ContextPackage::empty(ctx.mode);
        let out = eng
            .run(ReasoningSession::new(&ctx, "remember to buy milk", &pkg))
            .await;
        let first = &out.scratchpad[0];
        let obs = first.observation.as_ref().unwrap();
        assert!(!obs.success);
        assert_eq!(
            obs.error.as_ref().unwrap().code,
            crate::core::SkillErrorCode::PermissionDenied
        );
        assert!(f.profiles.active_tasks("alice").await.unwrap().is_empty());
        assert!(matches!(out.result, RunResult::Completed { .. }));
    }
}
