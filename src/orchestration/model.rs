//! 编排规则数据模型

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::{resolve_template, ContextStore, UnresolvedPlaceholder};

/// 动作参数：字面量（字符串按模板处理）或对上下文值的直接引用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    /// 传递上下文中存储的原始值（保留类型）
    Reference { context: String, key: String },
    Literal(Value),
}

impl ParameterValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        ParameterValue::Literal(value.into())
    }

    pub fn reference(context: impl Into<String>, key: impl Into<String>) -> Self {
        ParameterValue::Reference {
            context: context.into(),
            key: key.into(),
        }
    }

    /// 在给定上下文上求值
    pub fn resolve(&self, store: &ContextStore) -> Result<Value, UnresolvedPlaceholder> {
        match self {
            ParameterValue::Reference { context, key } => store
                .get_value(context, key)
                .cloned()
                .ok_or_else(|| UnresolvedPlaceholder(format!("{{${context}.{key}}}"))),
            ParameterValue::Literal(Value::String(template)) => {
                resolve_template(store, template).map(Value::String)
            }
            ParameterValue::Literal(other) => Ok(other.clone()),
        }
    }
}

/// 规则中的一个动作：调用哪个能力的哪个动作、参数与返回变量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInstance {
    pub capability: String,
    pub action: String,
    #[serde(default)]
    pub parameters: Vec<ParameterValue>,
    /// 结果写入 variables 上下文的键名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_variable: Option<String>,
}

impl ActionInstance {
    pub fn new(capability: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            action: action.into(),
            parameters: Vec::new(),
            return_variable: None,
        }
    }

    pub fn with_parameter(mut self, parameter: ParameterValue) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_return_variable(mut self, name: impl Into<String>) -> Self {
        self.return_variable = Some(name.into());
        self
    }

    /// `capability.action`，用于日志与错误信息
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.capability, self.action)
    }
}

/// 意图 -> 有序动作计划（可选失败回退动作）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationRule {
    pub intent: String,
    #[serde(default)]
    pub actions: Vec<ActionInstance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<ActionInstance>,
}

impl OrchestrationRule {
    pub fn new(intent: impl Into<String>, actions: Vec<ActionInstance>) -> Self {
        Self {
            intent: intent.into(),
            actions,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: ActionInstance) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

/// 编排规则文件的顶层结构（`[[rule]]` 表数组）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestrationSpec {
    #[serde(default, rename = "rule")]
    pub rules: Vec<OrchestrationRule>,
}
