//! 能力注册表：按名称存储已加载的能力，并记录哪些动作已启用

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use super::{Capability, CapabilityError};

struct Entry {
    capability: Arc<dyn Capability>,
    enabled: HashSet<String>,
}

/// 能力注册表；启动后仍可启用动作，因此用读写锁保护
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册能力；同名能力被替换（启用状态清空），返回被替换的实例
    pub fn register(&self, capability: Arc<dyn Capability>) -> Option<Arc<dyn Capability>> {
        let name = capability.name().to_string();
        tracing::info!(capability = %name, "Registering capability");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                name,
                Entry {
                    capability,
                    enabled: HashSet::new(),
                },
            )
            .map(|old| old.capability)
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .map(|old| old.capability)
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Capability>, CapabilityError> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|e| Arc::clone(&e.capability))
            .ok_or_else(|| CapabilityError::NotFound(name.to_string()))
    }

    /// 启用能力上的某个动作；能力未注册或不提供该动作时报错
    pub fn enable_action(&self, capability: &str, action: &str) -> Result<(), CapabilityError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .get_mut(capability)
            .ok_or_else(|| CapabilityError::NotFound(capability.to_string()))?;
        if !entry.capability.actions().iter().any(|a| a == action) {
            return Err(CapabilityError::ActionNotFound {
                capability: capability.to_string(),
                action: action.to_string(),
            });
        }
        if entry.enabled.insert(action.to_string()) {
            tracing::debug!(capability = %capability, action = %action, "Action enabled");
        }
        Ok(())
    }

    pub fn is_enabled(&self, capability: &str, action: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(capability)
            .is_some_and(|e| e.enabled.contains(action))
    }

    pub fn enabled_actions(&self, capability: &str) -> Vec<String> {
        let mut actions: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(capability)
            .map(|e| e.enabled.iter().cloned().collect())
            .unwrap_or_default();
        actions.sort();
        actions
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::LogCapability;

    #[test]
    fn test_register_and_get() {
        let registry = CapabilityRegistry::new();
        assert!(registry.register(Arc::new(LogCapability::new())).is_none());
        assert_eq!(registry.names(), vec!["log".to_string()]);
        assert_eq!(registry.get("log").unwrap().name(), "log");
        assert_eq!(
            registry.get("giphy").err(),
            Some(CapabilityError::NotFound("giphy".to_string()))
        );
    }

    #[test]
    fn test_register_replaces_by_name() {
        let registry = CapabilityRegistry::new();
        registry.register(Arc::new(LogCapability::new()));
        registry.enable_action("log", "LogInfo").unwrap();
        assert!(registry.register(Arc::new(LogCapability::new())).is_some());
        assert!(!registry.is_enabled("log", "LogInfo"));
        assert_eq!(registry.names().len(), 1);
    }

    #[test]
    fn test_enable_action() {
        let registry = CapabilityRegistry::new();
        assert_eq!(
            registry.enable_action("log", "LogInfo"),
            Err(CapabilityError::NotFound("log".to_string()))
        );
        registry.register(Arc::new(LogCapability::new()));
        registry.enable_action("log", "LogInfo").unwrap();
        registry.enable_action("log", "LogInfo").unwrap();
        assert!(registry.is_enabled("log", "LogInfo"));
        assert!(!registry.is_enabled("log", "LogError"));
        assert_eq!(registry.enabled_actions("log"), vec!["LogInfo".to_string()]);
        assert!(matches!(
            registry.enable_action("log", "Explode"),
            Err(CapabilityError::ActionNotFound { .. })
        ));
    }

    #[test]
    fn test_unregister_and_clear() {
        let registry = CapabilityRegistry::new();
        registry.register(Arc::new(LogCapability::new()));
        assert!(registry.unregister("log").is_some());
        assert!(registry.unregister("log").is_none());
        registry.register(Arc::new(LogCapability::new()));
        registry.clear();
        assert!(registry.is_empty());
    }
}
