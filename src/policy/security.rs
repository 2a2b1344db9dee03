//! 安全策略：由（认知模式, 角色）纯推导出权限集合与守卫方法
//!
//! 权限表按模式（行）× 能力（列）给出上限，角色只能在此基础上继续收紧，不能追加。
//! 每个能力轴都有独立的纯函数（can_write_memory / can_use_operator / ...），便于单测且无隐藏状态。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::{SecurityError, SecurityErrorKind};

/// 认知模式：dual 全能力、agent 行动导向、emulation 只读人格模拟
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CognitiveMode {
    Dual,
    Agent,
    Emulation,
}

impl CognitiveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CognitiveMode::Dual => "dual",
            CognitiveMode::Agent => "agent",
            CognitiveMode::Emulation => "emulation",
        }
    }

    pub fn all() -> [CognitiveMode; 3] {
        [CognitiveMode::Dual, CognitiveMode::Agent, CognitiveMode::Emulation]
    }

    fn row(&self) -> usize {
        match self {
            CognitiveMode::Dual => 0,
            CognitiveMode::Agent => 1,
            CognitiveMode::Emulation => 2,
        }
    }
}

impl fmt::Display for CognitiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CognitiveMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dual" => Ok(CognitiveMode::Dual),
            "agent" => Ok(CognitiveMode::Agent),
            "emulation" => Ok(CognitiveMode::Emulation),
            other => Err(format!("unknown cognitive mode: {other}")),
        }
    }
}

/// 调用方角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Owner,
    Member,
    Guest,
    Anonymous,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Owner => "owner",
            UserRole::Member => "member",
            UserRole::Guest => "guest",
            UserRole::Anonymous => "anonymous",
        }
    }

    pub fn all() -> [UserRole; 4] {
        [UserRole::Owner, UserRole::Member, UserRole::Guest, UserRole::Anonymous]
    }

    /// owner / member 视为可信查看者（不做脱敏）
    pub fn is_trusted_viewer(&self) -> bool {
        matches!(self, UserRole::Owner | UserRole::Member)
    }

    fn row(&self) -> usize {
        match self {
            UserRole::Owner => 0,
            UserRole::Member => 1,
            UserRole::Guest => 2,
            UserRole::Anonymous => 3,
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "owner" => Ok(UserRole::Owner),
            "member" => Ok(UserRole::Member),
            "guest" => Ok(UserRole::Guest),
            "anonymous" => Ok(UserRole::Anonymous),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// 权限表的列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    WriteMemory,
    UseOperator,
    ChangeMode,
    ChangeTrust,
    FactoryReset,
    AccessTraining,
}

impl Capability {
    fn col(&self) -> usize {
        match self {
            Capability::WriteMemory => 0,
            Capability::UseOperator => 1,
            Capability::ChangeMode => 2,
            Capability::ChangeTrust => 3,
            Capability::FactoryReset => 4,
            Capability::AccessTraining => 5,
        }
    }
}

//                 write  operator mode   trust  reset  training
const MODE_TABLE: [[bool; 6]; 3] = [
    /* dual      */ [true, true, true, true, true, true],
    /* agent     */ [true, true, true, true, true, false],
    /* emulation */ [false, false, true, false, false, false],
];

const ROLE_TABLE: [[bool; 6]; 4] = [
    /* owner     */ [true, true, true, true, true, true],
    /* member    */ [true, true, false, false, false, false],
    /* guest     */ [false, false, false, false, false, false],
    /* anonymous */ [false, false, false, false, false, false],
];

/// 查表：模式给出上限，角色只做减法
pub fn capability_allowed(mode: CognitiveMode, role: UserRole, cap: Capability) -> bool {
    MODE_TABLE[mode.row()][cap.col()] && ROLE_TABLE[role.row()][cap.col()]
}

pub fn can_write_memory(mode: CognitiveMode, role: UserRole) -> bool {
    capability_allowed(mode, role, Capability::WriteMemory)
}

pub fn can_use_operator(mode: CognitiveMode, role: UserRole) -> bool {
    capability_allowed(mode, role, Capability::UseOperator)
}

pub fn can_change_mode(mode: CognitiveMode, role: UserRole) -> bool {
    capability_allowed(mode, role, Capability::ChangeMode)
}

pub fn can_change_trust(mode: CognitiveMode, role: UserRole) -> bool {
    capability_allowed(mode, role, Capability::ChangeTrust)
}

pub fn can_factory_reset(mode: CognitiveMode, role: UserRole) -> bool {
    capability_allowed(mode, role, Capability::FactoryReset)
}

pub fn can_access_training(mode: CognitiveMode, role: UserRole) -> bool {
    capability_allowed(mode, role, Capability::AccessTraining)
}

/// 单次请求的安全策略（值对象，每请求计算一次）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityPolicy {
    pub mode: CognitiveMode,
    pub role: UserRole,
    pub can_write_memory: bool,
    pub can_use_operator: bool,
    pub can_change_mode: bool,
    pub can_change_trust: bool,
    pub can_factory_reset: bool,
    pub can_access_training: bool,
}

impl SecurityPolicy {
    pub fn new(mode: CognitiveMode, role: UserRole) -> Self {
        Self {
            mode,
            role,
            can_write_memory: can_write_memory(mode, role),
            can_use_operator: can_use_operator(mode, role),
            can_change_mode: can_change_mode(mode, role),
            can_change_trust: can_change_trust(mode, role),
            can_factory_reset: can_factory_reset(mode, role),
            can_access_training: can_access_training(mode, role),
        }
    }

    fn deny(&self, kind: SecurityErrorKind) -> SecurityError {
        SecurityError {
            kind,
            mode: self.mode,
            role: self.role,
        }
    }

    fn guard(&self, allowed: bool, kind: SecurityErrorKind) -> Result<(), SecurityError> {
        if allowed {
            Ok(())
        } else {
            Err(self.deny(kind))
        }
    }

    pub fn require_write(&self) -> Result<(), SecurityError> {
        self.guard(self.can_write_memory, SecurityErrorKind::WriteDenied)
    }

    pub fn require_operator(&self) -> Result<(), SecurityError> {
        self.guard(self.can_use_operator, SecurityErrorKind::OperatorDenied)
    }

    pub fn require_owner(&self) -> Result<(), SecurityError> {
        self.guard(self.role == UserRole::Owner, SecurityErrorKind::OwnerRequired)
    }

    pub fn require_mode_change(&self) -> Result<(), SecurityError> {
        self.guard(self.can_change_mode, SecurityErrorKind::ModeChangeDenied)
    }

    pub fn require_trust_change(&self) -> Result<(), SecurityError> {
        self.guard(self.can_change_trust, SecurityErrorKind::TrustChangeDenied)
    }

    pub fn require_factory_reset(&self) -> Result<(), SecurityError> {
        self.guard(self.can_factory_reset, SecurityErrorKind::FactoryResetDenied)
    }

    pub fn require_training(&self) -> Result<(), SecurityError> {
        self.guard(self.can_access_training, SecurityErrorKind::TrainingDenied)
    }
}
