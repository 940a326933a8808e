//! 意图识别：把一条用户消息变成识别出的意图与参数
//!
//! 外部 NLU 服务只需实现 IntentRecognizer；内置的 KeywordRecognizer 基于前缀/关键词规则，无需网络。

pub mod keyword;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::Session;

pub use keyword::{EmittedParameter, KeywordRecognizer, KeywordRule};

/// 无法识别时返回的意图 ID
pub const DEFAULT_FALLBACK_INTENT: &str = "Default_Fallback_Intent";

/// 识别出的参数：写入哪个上下文的哪个键
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedParameter {
    pub context: String,
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedIntent {
    pub definition_id: String,
    #[serde(default)]
    pub matched_parameters: Vec<MatchedParameter>,
}

impl RecognizedIntent {
    pub fn new(definition_id: impl Into<String>) -> Self {
        Self {
            definition_id: definition_id.into(),
            matched_parameters: Vec::new(),
        }
    }

    pub fn fallback() -> Self {
        Self::new(DEFAULT_FALLBACK_INTENT)
    }

    pub fn with_parameter(
        mut self,
        context: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.matched_parameters.push(MatchedParameter {
            context: context.into(),
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn is_fallback(&self) -> bool {
        self.definition_id == DEFAULT_FALLBACK_INTENT
    }
}

/// NLU 契约：总能给出一个意图，识别不了就返回回退意图
#[async_trait]
pub trait IntentRecognizer: Send + Sync {
    async fn recognize(&self, message: &str, session: &Session) -> RecognizedIntent;
}
