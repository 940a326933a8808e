//! 会话管理：会话 ID -> Session，首次使用时创建
//!
//! 每个 Session 的 ContextStore 在自己的异步互斥锁之后；
//! 对话处理与执行引擎是仅有的两个写入方，不同会话之间互不加锁。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use super::context::ContextStore;

/// 单个用户会话
#[derive(Debug)]
pub struct Session {
    id: String,
    contexts: Mutex<ContextStore>,
}

impl Session {
    pub fn new(id: impl Into<String>, default_ttl: u32) -> Self {
        Self {
            id: id.into(),
            contexts: Mutex::new(ContextStore::new(default_ttl)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// 在持锁期间对上下文执行闭包
    pub async fn with_contexts<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut ContextStore) -> R,
    {
        let mut guard = self.contexts.lock().await;
        f(&mut guard)
    }

    /// 当前上下文的快照
    pub async fn snapshot(&self) -> ContextStore {
        self.contexts.lock().await.clone()
    }

    pub async fn set_value(&self, context: &str, key: &str, value: impl Into<serde_json::Value>) {
        self.contexts.lock().await.set_value(context, key, value);
    }

    pub async fn get_value(&self, context: &str, key: &str) -> Option<serde_json::Value> {
        self.contexts.lock().await.get_value(context, key).cloned()
    }

    pub async fn next_turn(&self) -> u64 {
        self.contexts.lock().await.next_turn()
    }
}

/// 会话表
pub struct SessionManager {
    default_ttl: u32,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionManager {
    pub fn new(default_ttl: u32) -> Self {
        Self {
            default_ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// 取已有会话，不存在则创建；同一 ID 总是返回同一个 Arc
    pub async fn get_or_create(&self, id: &str) -> Arc<Session> {
        if let Some(session) = self.sessions.read().await.get(id) {
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(id.to_string()).or_insert_with(|| {
            tracing::debug!(session = %id, "Creating session");
            Arc::new(Session::new(id, self.default_ttl))
        });
        Arc::clone(session)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// 删除会话；返回是否存在
    pub async fn invalidate(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            tracing::debug!(session = %id, "Session invalidated");
        }
        removed
    }

    pub async fn clear(&self) {
        self.sessions.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let manager = SessionManager::new(5);
        let a = manager.get_or_create("user-1").await;
        let b = manager.get_or_create("user-1").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.len().await, 1);
        assert_eq!(a.id(), "user-1");
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let manager = SessionManager::new(5);
        let a = manager.get_or_create("a").await;
        let b = manager.get_or_create("b").await;
        a.set_value("Test", "key", "from-a").await;
        assert_eq!(a.get_value("Test", "key").await, Some(json!("from-a")));
        assert!(b.get_value("Test", "key").await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_creates_fresh_session() {
        let manager = SessionManager::new(5);
        let first = manager.get_or_create("user").await;
        first.set_value("Test", "key", "value").await;
        assert!(manager.invalidate("user").await);
        assert!(!manager.invalidate("user").await);
        assert!(manager.get("user").await.is_none());

        let second = manager.get_or_create("user").await;
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.get_value("Test", "key").await.is_none());
    }

    #[tokio::test]
    async fn test_default_ttl_applied_and_turns_advance() {
        let manager = SessionManager::new(1);
        let session = manager.get_or_create("user").await;
        session.set_value("Test", "key", "value").await;
        session.next_turn().await;
        assert!(session.get_value("Test", "key").await.is_some());
        session.next_turn().await;
        assert!(session.get_value("Test", "key").await.is_none());
        let ttl = session
            .with_contexts(|store| store.context("Test").map(|c| c.ttl()))
            .await;
        assert_eq!(ttl, Some(1));
    }

    #[tokio::test]
    async fn test_clear() {
        let manager = SessionManager::new(5);
        manager.get_or_create("a").await;
        manager.get_or_create("b").await;
        manager.clear().await;
        assert!(manager.is_empty().await);
    }
}
