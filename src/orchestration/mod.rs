//! 编排层：意图到有序动作计划的规则表及其 TOML 加载

pub mod loader;
pub mod model;
pub mod resolver;

pub use loader::{load_spec, parse_spec};
pub use model::{ActionInstance, OrchestrationRule, OrchestrationSpec, ParameterValue};
pub use resolver::OrchestrationResolver;
