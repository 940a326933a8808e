//! 关键词识别器：按规则顺序做前缀 / 关键词匹配
//!
//! 规则写在编排文件的 `[[intent]]` 表里：
//!
//! ```toml
//! [[intent]]
//! id = "Search"
//! prefixes = ["search", "搜索"]
//! parameters = [{ context = "Query", key = "text" }]
//! ```
//!
//! 前缀命中时，未给出 value 的参数取消息去掉前缀后的剩余文本；关键词命中时取整条消息。

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{IntentRecognizer, RecognizedIntent};
use crate::core::HiveError;
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmittedParameter {
    pub context: String,
    pub key: String,
    /// 固定值；缺省时取消息文本
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeywordRule {
    pub id: String,
    #[serde(default)]
    pub prefixes: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<EmittedParameter>,
}

impl KeywordRule {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prefixes: Vec::new(),
            keywords: Vec::new(),
            parameters: Vec::new(),
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(keyword.into());
        self
    }

    pub fn emit(mut self, context: impl Into<String>, key: impl Into<String>) -> Self {
        self.parameters.push(EmittedParameter {
            context: context.into(),
            key: key.into(),
            value: None,
        });
        self
    }

    /// 命中时返回参数取值用的文本
    fn matches<'a>(&self, input: &'a str) -> Option<&'a str> {
        let input_lower = input.to_lowercase();
        for prefix in &self.prefixes {
            if let Some(rest) = strip_prefix_ignore_case(input, prefix) {
                return Some(rest.trim());
            }
        }
        self.keywords
            .iter()
            .any(|k| input_lower.contains(&k.to_lowercase()))
            .then_some(input)
    }
}

/// 前缀须是完整的词：其后为空或紧跟空白
fn strip_prefix_ignore_case<'a>(input: &'a str, prefix: &str) -> Option<&'a str> {
    let head = input.get(..prefix.len())?;
    if head.to_lowercase() != prefix.to_lowercase() {
        return None;
    }
    let rest = input.get(prefix.len()..)?;
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() => Some(rest),
        Some(_) => None,
    }
}

#[derive(Debug, Deserialize)]
struct KeywordFile {
    #[serde(default, rename = "intent")]
    intents: Vec<KeywordRule>,
}

/// 规则式识别器（第一个命中的规则胜出）
#[derive(Debug, Clone, Default)]
pub struct KeywordRecognizer {
    rules: Vec<KeywordRule>,
}

impl KeywordRecognizer {
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        Self { rules }
    }

    /// 从 TOML 文本中读取 `[[intent]]` 规则（其余表忽略）
    pub fn from_toml(content: &str) -> Result<Self, HiveError> {
        let file: KeywordFile =
            toml::from_str(content).map_err(|e| HiveError::SpecLoad(e.to_string()))?;
        Ok(Self::new(file.intents))
    }

    pub fn load(path: &Path) -> Result<Self, HiveError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HiveError::SpecLoad(format!("{}: {}", path.display(), e)))?;
        let recognizer = Self::from_toml(&content)?;
        tracing::info!("Loaded {} intent rules from {}", recognizer.rules.len(), path.display());
        Ok(recognizer)
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    /// 同步匹配（不依赖会话）
    pub fn match_message(&self, message: &str) -> RecognizedIntent {
        let input = message.trim();
        for rule in &self.rules {
            if let Some(text) = rule.matches(input) {
                let mut intent = RecognizedIntent::new(rule.id.clone());
                for p in &rule.parameters {
                    let value = p.value.clone().unwrap_or_else(|| Value::String(text.to_string()));
                    intent = intent.with_parameter(p.context.clone(), p.key.clone(), value);
                }
                return intent;
            }
        }
        RecognizedIntent::fallback()
    }
}

#[async_trait]
impl IntentRecognizer for KeywordRecognizer {
    async fn recognize(&self, message: &str, session: &Session) -> RecognizedIntent {
        let intent = self.match_message(message);
        tracing::debug!(session = %session.id(), intent = %intent.definition_id, "Recognized intent");
        intent
    }
}
