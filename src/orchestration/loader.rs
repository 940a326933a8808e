//! 编排规则文件加载（TOML）
//!
//! ```toml
//! [[rule]]
//! intent = "Greet"
//!
//! [[rule.actions]]
//! capability = "log"
//! action = "LogInfo"
//! parameters = ["hi {$Test.key}"]
//! return_variable = "greeting"
//! ```

use std::path::Path;

use super::model::OrchestrationSpec;
use super::resolver::OrchestrationResolver;
use crate::core::HiveError;

/// 解析 TOML 文本为规则表
pub fn parse_spec(content: &str) -> Result<OrchestrationResolver, HiveError> {
    let spec: OrchestrationSpec =
        toml::from_str(content).map_err(|e| HiveError::SpecLoad(e.to_string()))?;
    OrchestrationResolver::new(spec.rules)
}

/// 读取并解析编排规则文件
pub fn load_spec(path: &Path) -> Result<OrchestrationResolver, HiveError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| HiveError::SpecLoad(format!("{}: {}", path.display(), e)))?;
    let resolver = parse_spec(&content)?;
    tracing::info!("Loaded {} orchestration rules from {}", resolver.len(), path.display());
    Ok(resolver)
}
