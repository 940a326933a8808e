//! 日志能力：LogInfo / LogWarning / LogError，把消息写入 tracing 日志

use std::any::Any;

use async_trait::async_trait;
use serde_json::Value;

use super::{ActionContext, ActionFailure, Capability, RuntimeAction};
use crate::config::CapabilitySettings;
use crate::core::HiveError;
use crate::dispatch::{Dispatch, OperationDef, ParamType, TypeDescriptor};
use crate::session::value_to_text;

const TYPE_NAME: &str = "LogCapability";
const ACTIONS: [(&str, LogLevel); 3] = [
    ("LogInfo", LogLevel::Info),
    ("LogWarning", LogLevel::Warning),
    ("LogError", LogLevel::Error),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Default)]
pub struct LogCapability;

impl LogCapability {
    pub fn new() -> Self {
        Self
    }

    pub fn from_settings(_settings: &CapabilitySettings) -> Result<Self, HiveError> {
        Ok(Self::new())
    }
}

impl Dispatch for LogCapability {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Capability for LogCapability {
    fn name(&self) -> &str {
        "log"
    }

    fn actions(&self) -> Vec<String> {
        ACTIONS.iter().map(|(name, _)| name.to_string()).collect()
    }

    fn type_descriptors(&self) -> Vec<TypeDescriptor> {
        let mut descriptor = TypeDescriptor::new(TYPE_NAME);
        for (name, level) in ACTIONS {
            descriptor = descriptor.operation(OperationDef::public(
                name,
                vec![ParamType::Any],
                move |_, mut args| {
                    let message = args.pop().map(|v| value_to_text(&v)).unwrap_or_default();
                    let action: Box<dyn RuntimeAction> = Box::new(LogAction {
                        name: name.to_string(),
                        level,
                        message,
                    });
                    Ok(Box::new(action))
                },
            ));
        }
        vec![descriptor]
    }
}

/// 写一条日志并返回消息本身
pub struct LogAction {
    name: String,
    level: LogLevel,
    message: String,
}

impl LogAction {
    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[async_trait]
impl RuntimeAction for LogAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&mut self, ctx: &ActionContext) -> Result<Value, ActionFailure> {
        match self.level {
            LogLevel::Info => tracing::info!(session = %ctx.session_id, "{}", self.message),
            LogLevel::Warning => tracing::warn!(session = %ctx.session_id, "{}", self.message),
            LogLevel::Error => tracing::error!(session = %ctx.session_id, "{}", self.message),
        }
        Ok(Value::String(self.message.clone()))
    }
}
