//! 技能执行器
//!
//! execute_skill 在执行前依次检查：技能已注册 → 变更类技能 `policy.require_write()` →
//! 写路径白名单 → 高风险技能的信任/批准门槛 → 输入校验；随后在超时内执行，
//! 成功与失败统一归一为 SkillOutcome。安全违规以 Err(SecurityError) 返回，只中止这一动作。
//! 每次调用输出一行结构化 `tool_audit` 日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tokio::time::timeout;

use crate::core::{RequestContext, SecurityError, SkillError, SkillErrorCode, TrustLevel};
use crate::observability::{AuditCategory, AuditEvent, AuditLevel, AuditSink, TracingAuditSink};
use crate::policy::SecurityPolicy;
use crate::tools::guard::WritePathGuard;
use crate::tools::registry::{RiskLevel, SkillCategory, SkillRegistry};
use crate::tools::schema::validate_inputs;

/// 归一化的执行结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkillOutcome {
    pub success: bool,
    pub outputs: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SkillError>,
    pub execution_time_ms: u64,
}

impl SkillOutcome {
    fn ok(outputs: Value, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            outputs,
            error: None,
            execution_time_ms,
        }
    }

    pub fn failed(error: SkillError, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            outputs: Value::Null,
            error: Some(error),
            execution_time_ms,
        }
    }
}

pub struct SkillExecutor {
    registry: Arc<SkillRegistry>,
    guard: WritePathGuard,
    timeout: Duration,
    audit: Arc<dyn AuditSink>,
}

impl SkillExecutor {
    pub fn new(registry: Arc<SkillRegistry>, guard: WritePathGuard, timeout_secs: u64) -> Self {
        Self {
            registry,
            guard,
            timeout: Duration::from_secs(timeout_secs),
            audit: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn registry(&self) -> &SkillRegistry {
        &self.registry
    }

    fn deny(&self, ctx: &RequestContext, skill: &str, err: SecurityError) -> SecurityError {
        self.audit.audit(
            AuditEvent::new(
                AuditLevel::Warn,
                AuditCategory::Security,
                "skill_denied",
                &ctx.user_id,
            )
            .with_details(serde_json::json!({
                "skill": skill,
                "reason": err.kind.to_string(),
                "mode": err.mode,
                "role": err.role,
            })),
        );
        err
    }

    pub async fn execute_skill(
        &self,
        ctx: &RequestContext,
        name: &str,
        inputs: Value,
        trust: TrustLevel,
        auto_approve: bool,
        policy: &SecurityPolicy,
    ) -> Result<SkillOutcome, SecurityError> {
        let start = Instant::now();
        let Some(skill) = self.registry.get(name) else {
            let err = SkillError::new(SkillErrorCode::InvalidInput, format!("Unknown skill: {name}"))
                .with_context(serde_json::json!({ "available": self.registry.names() }));
            return Ok(SkillOutcome::failed(err, 0));
        };

        if skill.category() == SkillCategory::Mutation {
            policy
                .require_write()
                .map_err(|e| self.deny(ctx, name, e))?;
            for target in skill.write_targets(ctx, &inputs) {
                self.guard
                    .check(policy, &target)
                    .map_err(|e| self.deny(ctx, name, e))?;
            }
        }

        if skill.risk() == RiskLevel::High && !auto_approve && trust < TrustLevel::SupervisedAuto {
            let err = SkillError::new(
                SkillErrorCode::PermissionDenied,
                format!("{name} requires approval at trust level {trust:?}"),
            )
            .with_context(serde_json::json!({ "needs_approval": true }));
            return Ok(SkillOutcome::failed(err, 0));
        }

        if let Err(err) = validate_inputs(&skill.input_schema(), &inputs) {
            return Ok(SkillOutcome::failed(err, 0));
        }

        let preview = args_preview(&inputs);
        let result = timeout(self.timeout, skill.execute(ctx, inputs)).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (ok, outcome_label) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": name,
            "user": ctx.user_id,
            "ok": ok,
            "outcome": outcome_label,
            "duration_ms": duration_ms,
            "args_preview": preview,
        });
        tracing::info!(audit = %audit, "tool");

        if skill.category() == SkillCategory::Mutation && ok {
            self.audit.audit(
                AuditEvent::new(
                    AuditLevel::Info,
                    AuditCategory::DataChange,
                    "skill_mutation",
                    &ctx.user_id,
                )
                .with_details(serde_json::json!({ "skill": name, "args_preview": preview })),
            );
        }

        Ok(match result {
            Ok(Ok(outputs)) => SkillOutcome::ok(outputs, duration_ms),
            Ok(Err(err)) => SkillOutcome::failed(err, duration_ms),
            Err(_) => SkillOutcome::failed(
                SkillError::new(
                    SkillErrorCode::Timeout,
                    format!("{name} timed out after {}s", self.timeout.as_secs()),
                ),
                duration_ms,
            ),
        })
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
