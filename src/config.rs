//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__SESSION__VARIABLE_TIMEOUT=10`）。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::core::HiveError;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub execution: ExecutionSection,
    #[serde(default)]
    pub orchestration: OrchestrationSection,
    #[serde(default)]
    pub ingress: IngressSection,
    /// [capabilities.<name>] 段：传给对应能力工厂的键值配置
    #[serde(default)]
    pub capabilities: HashMap<String, CapabilitySettings>,
}

/// 单个能力的配置（如 giphy 的 token）
pub type CapabilitySettings = HashMap<String, String>;

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [session] 段：上下文变量的默认存活轮数
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    /// 默认 TTL（对话轮数），0 表示永不过期
    #[serde(default = "default_variable_timeout")]
    pub variable_timeout: u32,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            variable_timeout: default_variable_timeout(),
        }
    }
}

fn default_variable_timeout() -> u32 {
    5
}

/// [execution] 段：重试次数、队列容量、单次调用超时
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionSection {
    /// 总尝试次数（1 次初始 + 重试）
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// 单次尝试超时（秒），超时按 I/O 类失败处理
    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            queue_capacity: default_queue_capacity(),
            action_timeout_secs: default_action_timeout_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    4
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_action_timeout_secs() -> u64 {
    30
}

/// [orchestration] 段：编排规则文件路径
#[derive(Debug, Clone, Deserialize, Default)]
pub struct OrchestrationSection {
    pub spec: Option<PathBuf>,
}

/// [ingress] 段：控制台入口使用的会话 ID
#[derive(Debug, Clone, Deserialize)]
pub struct IngressSection {
    #[serde(default = "default_console_session")]
    pub session_id: String,
}

impl Default for IngressSection {
    fn default() -> Self {
        Self {
            session_id: default_console_session(),
        }
    }
}

fn default_console_session() -> String {
    "console".to_string()
}

impl AppConfig {
    /// 启动前检查：缺少必需项或取值非法时返回 ConfigurationError
    pub fn validate(&self) -> Result<(), HiveError> {
        if self.execution.max_attempts == 0 {
            return Err(HiveError::Configuration(
                "execution.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.execution.queue_capacity == 0 {
            return Err(HiveError::Configuration(
                "execution.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.execution.action_timeout_secs == 0 {
            return Err(HiveError::Configuration(
                "execution.action_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// 编排规则文件路径（二进制入口必需）
    pub fn require_spec_path(&self) -> Result<&PathBuf, HiveError> {
        self.orchestration.spec.as_ref().ok_or_else(|| {
            HiveError::Configuration(
                "missing orchestration.spec (set it in config/default.toml or HIVE__ORCHESTRATION__SPEC)"
                    .to_string(),
            )
        })
    }

    /// 取某个能力的配置，未配置时返回空表
    pub fn capability_settings(&self, name: &str) -> CapabilitySettings {
        self.capabilities.get(name).cloned().unwrap_or_default()
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
