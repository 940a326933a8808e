//! 执行层：串行执行引擎、执行结果与结果句柄

pub mod engine;
pub mod result;

pub use engine::{EngineSettings, EngineState, ExecutionEngine, DEFAULT_MAX_ATTEMPTS};
pub use result::{wait_all, ActionHandle, ExecutionResult};
