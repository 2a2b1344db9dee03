//! 请求上下文：显式传递的每请求环境（用户、角色、模式、会话、取消令牌）
//!
//! 不使用任何进程级变量；SecurityPolicy 按上下文对象身份缓存（OnceLock），
//! 同一请求内多次获取返回同一个实例。

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::policy::{CognitiveMode, SecurityPolicy, UserRole};

/// 信任等级：与认知模式正交，控制工具副作用是否可自动批准
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    Observe,
    #[default]
    Suggest,
    SupervisedAuto,
    BoundedAuto,
    AdaptiveAuto,
}

#[derive(Debug)]
pub struct RequestContext {
    pub user_id: String,
    pub role: UserRole,
    pub mode: CognitiveMode,
    pub trust: TrustLevel,
    pub conversation_id: Option<String>,
    pub session_id: String,
    pub cancel: CancellationToken,
    policy: OnceLock<Arc<SecurityPolicy>>,
}

impl RequestContext {
    pub fn new(user_id: impl Into<String>, role: UserRole, mode: CognitiveMode) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            mode,
            trust: TrustLevel::default(),
            conversation_id: None,
            session_id: uuid::Uuid::new_v4().to_string(),
            cancel: CancellationToken::new(),
            policy: OnceLock::new(),
        }
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_trust(mut self, trust: TrustLevel) -> Self {
        self.trust = trust;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 本请求的安全策略（首次调用时计算，之后复用同一实例）
    pub fn policy(&self) -> Arc<SecurityPolicy> {
        Arc::clone(
            self.policy
                .get_or_init(|| Arc::new(SecurityPolicy::new(self.mode, self.role))),
        )
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_cached_per_context_identity() {
        let ctx = RequestContext::new("u1", UserRole::Owner, CognitiveMode::Dual);
        let a = ctx.policy();
        let b = ctx.policy();
        assert!(Arc::ptr_eq(&a, &b));

        let other = RequestContext::new("u1", UserRole::Owner, CognitiveMode::Dual);
        let c = other.policy();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(*a, *c);
    }

    #[test]
    fn test_trust_ordering() {
        assert!(TrustLevel::Observe < TrustLevel::SupervisedAuto);
        assert!(TrustLevel::AdaptiveAuto > TrustLevel::BoundedAuto);
        assert_eq!(TrustLevel::default(), TrustLevel::Suggest);
    }
}
