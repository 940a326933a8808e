//! 运行时错误类型
//!
//! 启动期错误（配置、编排规则、能力加载）是致命的，由 HiveError 表示；
//! 单个动作的失败只记录进 ExecutionResult（ActionError），不会中断对话。

use thiserror::Error;

use crate::capability::{ActionFailure, CapabilityError};
use crate::dispatch::DispatchError;

/// 启动与对话处理阶段的错误
#[derive(Error, Debug)]
pub enum HiveError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cannot load orchestration spec: {0}")]
    SpecLoad(String),

    #[error("Cannot load capability {name}: {reason}")]
    CapabilityLoad { name: String, reason: String },

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error("Hive is already shut down")]
    AlreadyShutdown,
}

/// 单个动作执行失败的原因（写入 ExecutionResult）
#[derive(Error, Debug)]
pub enum ActionError {
    /// 参数占位符无法解析，动作未开始执行
    #[error("Cannot resolve parameter {placeholder} of {action}")]
    ParameterResolution { action: String, placeholder: String },

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error("Cannot build action: {0}")]
    Dispatch(#[from] DispatchError),

    /// 重试耗尽或遇到不可重试的失败
    #[error("Action {action} failed after {attempts} attempt(s): {cause}")]
    Execution {
        action: String,
        attempts: u32,
        cause: ActionFailure,
    },

    #[error("Execution queue is full, action {0} rejected")]
    QueueFull(String),

    #[error("Execution engine is closed, action {0} rejected")]
    EngineClosed(String),

    /// 引擎关闭时尚未开始的动作被丢弃
    #[error("Action {0} discarded before it started")]
    Discarded(String),
}
