//! 会话上下文存储
//!
//! 每个会话持有若干具名上下文（Context），每个上下文有存活轮数（TTL）与一组键值参数。
//! 参数写入时记录当前轮次；读取时若自写入起经过的轮数超过所属上下文的 TTL，则视为不存在。
//! TTL 为 0 表示永不过期。

use std::collections::HashMap;

use serde_json::Value;

/// 动作返回值写入的保留上下文名
pub const VARIABLES_CONTEXT: &str = "variables";

#[derive(Debug, Clone, PartialEq)]
struct StoredValue {
    value: Value,
    set_at_turn: u64,
}

/// 单个具名上下文
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    ttl: u32,
    parameters: HashMap<String, StoredValue>,
}

impl Context {
    fn new(ttl: u32) -> Self {
        Self {
            ttl,
            parameters: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    fn is_live(&self, stored: &StoredValue, turn: u64) -> bool {
        self.ttl == 0 || turn.saturating_sub(stored.set_at_turn) <= u64::from(self.ttl)
    }
}

/// 上下文存储：上下文名 -> Context，外加一个轮次计数器
#[derive(Debug, Clone, PartialEq)]
pub struct ContextStore {
    default_ttl: u32,
    turn: u64,
    contexts: HashMap<String, Context>,
}

impl ContextStore {
    pub fn new(default_ttl: u32) -> Self {
        Self {
            default_ttl,
            turn: 0,
            contexts: HashMap::new(),
        }
    }

    pub fn default_ttl(&self) -> u32 {
        self.default_ttl
    }

    /// 当前轮次
    pub fn turn(&self) -> u64 {
        self.turn
    }

    /// 进入下一轮对话（每处理一条消息调用一次）
    pub fn next_turn(&mut self) -> u64 {
        self.turn += 1;
        self.turn
    }

    /// 写入参数；上下文不存在时以默认 TTL 创建
    pub fn set_value(&mut self, context: &str, key: &str, value: impl Into<Value>) {
        let default_ttl = self.default_ttl;
        let turn = self.turn;
        self.contexts
            .entry(context.to_string())
            .or_insert_with(|| Context::new(default_ttl))
            .parameters
            .insert(
                key.to_string(),
                StoredValue {
                    value: value.into(),
                    set_at_turn: turn,
                },
            );
    }

    /// 写入参数并（重新）设置所属上下文的 TTL
    pub fn set_value_with_ttl(&mut self, context: &str, ttl: u32, key: &str, value: impl Into<Value>) {
        self.set_value(context, key, value);
        if let Some(ctx) = self.contexts.get_mut(context) {
            ctx.ttl = ttl;
        }
    }

    /// 读取参数；过期或不存在时返回 None
    pub fn get_value(&self, context: &str, key: &str) -> Option<&Value> {
        let ctx = self.contexts.get(context)?;
        let stored = ctx.parameters.get(key)?;
        if ctx.is_live(stored, self.turn) {
            Some(&stored.value)
        } else {
            None
        }
    }

    pub fn context(&self, name: &str) -> Option<&Context> {
        self.contexts.get(name)
    }

    pub fn contexts(&self) -> impl Iterator<Item = (&str, &Context)> {
        self.contexts.iter().map(|(name, ctx)| (name.as_str(), ctx))
    }

    pub fn context_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.contexts.keys().cloned().collect();
        names.sort();
        names
    }

    /// 某个上下文中所有未过期的参数
    pub fn live_values(&self, context: &str) -> HashMap<String, Value> {
        let Some(ctx) = self.contexts.get(context) else {
            return HashMap::new();
        };
        ctx.parameters
            .iter()
            .filter(|(_, stored)| ctx.is_live(stored, self.turn))
            .map(|(k, stored)| (k.clone(), stored.value.clone()))
            .collect()
    }

    /// 将 other 的条目叠加到本存储上：键冲突时 other 覆盖本地值，上下文 TTL 取 other 的值
    pub fn merge(&mut self, other: &ContextStore) {
        self.turn = self.turn.max(other.turn);
        for (name, other_ctx) in &other.contexts {
            let ctx = self
                .contexts
                .entry(name.clone())
                .or_insert_with(|| Context::new(other_ctx.ttl));
            ctx.ttl = other_ctx.ttl;
            for (key, stored) in &other_ctx.parameters {
                ctx.parameters.insert(key.clone(), stored.clone());
            }
        }
    }

    /// 只把 other 中名为 `name` 的上下文叠加过来，轮次保持不变
    ///
    /// 比本存储轮次更晚写入的值视为存活。
    pub fn overlay_context(&mut self, name: &str, other: &ContextStore) {
        let Some(other_ctx) = other.contexts.get(name) else {
            return;
        };
        let ctx = self
            .contexts
            .entry(name.to_string())
            .or_insert_with(|| Context::new(other_ctx.ttl));
        ctx.ttl = other_ctx.ttl;
        for (key, stored) in &other_ctx.parameters {
            ctx.parameters.insert(key.clone(), stored.clone());
        }
    }
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new(5)
    }
}
