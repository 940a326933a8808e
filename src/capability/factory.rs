//! 能力工厂表：能力名 -> 构造函数
//!
//! 编排规则里引用的能力在启动时通过这里实例化（每个名字一次），构造失败即启动失败。

use std::collections::HashMap;
use std::sync::Arc;

use super::{Capability, GiphyCapability, LogCapability};
use crate::config::CapabilitySettings;
use crate::core::HiveError;

pub type CapabilityConstructor =
    Arc<dyn Fn(&CapabilitySettings) -> Result<Arc<dyn Capability>, HiveError> + Send + Sync>;

#[derive(Default, Clone)]
pub struct CapabilityFactories {
    constructors: HashMap<String, CapabilityConstructor>,
}

impl CapabilityFactories {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置能力：log、giphy
    pub fn with_builtins() -> Self {
        let mut factories = Self::new();
        factories.register("log", |settings| {
            Ok(Arc::new(LogCapability::from_settings(settings)?) as Arc<dyn Capability>)
        });
        factories.register("giphy", |settings| {
            Ok(Arc::new(GiphyCapability::from_settings(settings)?) as Arc<dyn Capability>)
        });
        factories
    }

    /// 注册（或替换）某个能力名的构造函数
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&CapabilitySettings) -> Result<Arc<dyn Capability>, HiveError> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }

    /// 实例化能力；未知名字或构造失败都返回 CapabilityLoad
    pub fn create(
        &self,
        name: &str,
        settings: &CapabilitySettings,
    ) -> Result<Arc<dyn Capability>, HiveError> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| HiveError::CapabilityLoad {
                name: name.to_string(),
                reason: "no factory registered for this capability".to_string(),
            })?;
        let capability = constructor(settings).map_err(|e| match e {
            HiveError::CapabilityLoad { .. } => e,
            other => HiveError::CapabilityLoad {
                name: name.to_string(),
                reason: other.to_string(),
            },
        })?;
        if capability.name() != name {
            return Err(HiveError::CapabilityLoad {
                name: name.to_string(),
                reason: format!("factory produced capability named {}", capability.name()),
            });
        }
        Ok(capability)
    }
}
