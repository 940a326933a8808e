//! 能力层：插件能力（Capability）、可运行动作（RuntimeAction）与能力注册表
//!
//! 能力是一组具名动作的提供者。引擎在执行时通过反射调度器调用能力上与动作同名的操作，
//! 得到一个 `Box<dyn RuntimeAction>`，再对其异步执行（可重试）。

pub mod factory;
pub mod giphy;
pub mod log;
pub mod registry;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::dispatch::{Dispatch, TypeDescriptor};
use crate::session::ContextStore;

pub use factory::{CapabilityConstructor, CapabilityFactories};
pub use giphy::GiphyCapability;
pub use log::LogCapability;
pub use registry::CapabilityRegistry;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Capability {0} not found")]
    NotFound(String),

    #[error("Capability {capability} has no action {action}")]
    ActionNotFound { capability: String, action: String },

    #[error("Action {capability}.{action} is not enabled")]
    ActionDisabled { capability: String, action: String },
}

/// 动作单次执行失败：I/O 类可重试，其余立即失败
#[derive(Error, Debug)]
pub enum ActionFailure {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Fatal(String),
}

impl ActionFailure {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ActionFailure::Io(_))
    }
}

/// 动作执行时可见的环境
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub execution_id: uuid::Uuid,
    pub session_id: String,
    /// 第几次尝试（从 1 开始）
    pub attempt: u32,
    /// 会话上下文快照（合并后的工作副本）
    pub contexts: ContextStore,
}

/// 可运行的动作实例
#[async_trait]
pub trait RuntimeAction: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&mut self, ctx: &ActionContext) -> Result<Value, ActionFailure>;
}

/// 插件能力
pub trait Capability: Dispatch {
    /// 能力名（编排规则中引用的名字）
    fn name(&self) -> &str;

    /// 提供的动作名
    fn actions(&self) -> Vec<String>;

    /// 提供的事件源（当前内置能力均无）
    fn event_sources(&self) -> Vec<String> {
        Vec::new()
    }

    /// 向调度器登记的类型描述；动作对应的操作返回 `Box<dyn RuntimeAction>`
    fn type_descriptors(&self) -> Vec<TypeDescriptor>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_retryability() {
        let io = ActionFailure::from(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"));
        assert!(io.is_retryable());
        assert!(!ActionFailure::Fatal("bad input".into()).is_retryable());
    }
}
