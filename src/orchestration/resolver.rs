//! 编排解析器：意图 ID -> 规则（构建后不可变）

use std::collections::HashMap;

use super::model::{ActionInstance, OrchestrationRule};
use crate::core::HiveError;

#[derive(Debug, Clone, Default)]
pub struct OrchestrationResolver {
    rules: HashMap<String, OrchestrationRule>,
    /// 声明顺序
    order: Vec<String>,
}

impl OrchestrationResolver {
    /// 构建规则表；意图 ID 为空或重复时失败
    pub fn new(rules: Vec<OrchestrationRule>) -> Result<Self, HiveError> {
        let mut resolver = Self::default();
        for rule in rules {
            if rule.intent.trim().is_empty() {
                return Err(HiveError::SpecLoad("rule with empty intent id".to_string()));
            }
            if resolver.rules.contains_key(&rule.intent) {
                return Err(HiveError::SpecLoad(format!(
                    "duplicate rule for intent {}",
                    rule.intent
                )));
            }
            resolver.order.push(rule.intent.clone());
            resolver.rules.insert(rule.intent.clone(), rule);
        }
        Ok(resolver)
    }

    /// 意图对应的动作计划；未绑定时为空
    pub fn plan_for(&self, intent: &str) -> &[ActionInstance] {
        self.rules
            .get(intent)
            .map(|r| r.actions.as_slice())
            .unwrap_or(&[])
    }

    pub fn rule_for(&self, intent: &str) -> Option<&OrchestrationRule> {
        self.rules.get(intent)
    }

    pub fn fallback_for(&self, intent: &str) -> Option<&ActionInstance> {
        self.rules.get(intent).and_then(|r| r.fallback.as_ref())
    }

    pub fn rules(&self) -> impl Iterator<Item = &OrchestrationRule> {
        self.order.iter().filter_map(|id| self.rules.get(id))
    }

    /// 所有规则（含回退动作）引用的 (能力, 动作)，按首次出现顺序去重
    pub fn referenced_actions(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = Vec::new();
        for rule in self.rules() {
            for action in rule.actions.iter().chain(rule.fallback.iter()) {
                let pair = (action.capability.clone(), action.action.clone());
                if !out.contains(&pair) {
                    out.push(pair);
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
