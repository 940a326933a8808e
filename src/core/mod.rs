//! 核心层：错误类型、主控循环、优雅关闭

pub mod error;
pub mod hive;
pub mod shutdown;

pub use error::{ActionError, HiveError};
pub use hive::Hive;
pub use shutdown::{run_with_graceful_shutdown, ShutdownManager, ShutdownReason};
