//! 会话层：带过期的上下文存储、参数模板与会话表

pub mod context;
pub mod manager;
pub mod template;

pub use context::{Context, ContextStore, VARIABLES_CONTEXT};
pub use manager::{Session, SessionManager};
pub use template::{resolve_template, value_to_text, UnresolvedPlaceholder};
