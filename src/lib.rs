//! Twin - 个人数字分身推理内核
//!
//! 模块划分：
//! - **agent**: 无头运行时（按配置装配组件，单条目标的完整流程）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **context**: 上下文构建器（语义检索、工具历史、摘要、人格与任务）与有界格式化
//! - **core**: 错误分类、请求上下文、推理循环状态机
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock / 脚本回放）
//! - **memory**: 情节记忆存储、语义索引接口、工具调用捕获、会话摘要
//! - **observability**: 日志初始化与审计接口
//! - **policy**: 安全策略（角色 × 认知模式）与记忆策略
//! - **react**: ReAct 推理引擎（快速路径、规划、执行、观察）
//! - **tools**: 技能注册表、执行器与内置技能

pub mod agent;
pub mod config;
pub mod context;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod policy;
pub mod react;
pub mod tools;
