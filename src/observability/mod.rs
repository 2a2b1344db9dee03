//! 可观测性：tracing 初始化与审计事件出口
//!
//! 审计是旁路：`AuditSink::audit` 同步、即发即忘，不返回错误，绝不影响调用方的成功或失败。

use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing_subscriber::{fmt as tfmt, prelude::*, EnvFilter};

/// 初始化日志：RUST_LOG 优先，缺省 info；重复初始化时静默忽略
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tfmt::layer())
        .try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Security,
    Action,
    System,
    DataChange,
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditCategory::Security => "security",
            AuditCategory::Action => "action",
            AuditCategory::System => "system",
            AuditCategory::DataChange => "data_change",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub level: AuditLevel,
    pub category: AuditCategory,
    pub event: String,
    pub details: serde_json::Value,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        level: AuditLevel,
        category: AuditCategory,
        event: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            level,
            category,
            event: event.into(),
            details: serde_json::Value::Null,
            actor: actor.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn audit(&self, event: AuditEvent);
}

/// 默认出口：写入 tracing（target = "audit"）
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn audit(&self, event: AuditEvent) {
        let details = event.details.to_string();
        match event.level {
            AuditLevel::Info => tracing::info!(
                target: "audit",
                category = %event.category,
                actor = %event.actor,
                details = %details,
                "{}",
                event.event
            ),
            AuditLevel::Warn => tracing::warn!(
                target: "audit",
                category = %event.category,
                actor = %event.actor,
                details = %details,
                "{}",
                event.event
            ),
            AuditLevel::Error => tracing::error!(
                target: "audit",
                category = %event.category,
                actor = %event.actor,
                details = %details,
                "{}",
                event.event
            ),
        }
    }
}

/// 内存出口：收集事件，供测试断言
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events
            .lock()
            .map(|e| e.iter().filter(|x| x.event == event).count())
            .unwrap_or(0)
    }
}

impl AuditSink for MemoryAuditSink {
    fn audit(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
