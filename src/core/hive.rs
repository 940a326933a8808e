//! 主控循环：消息 + 会话 -> 识别意图 -> 更新上下文 -> 查编排规则 -> 提交执行
//!
//! 启动时一次性完成：校验配置、实例化规则引用到的能力（每个名字一次）、向调度器登记类型描述、
//! 启用被引用的动作、启动执行引擎。任何一步失败都是致命的。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::capability::{CapabilityFactories, CapabilityRegistry};
use crate::config::AppConfig;
use crate::core::HiveError;
use crate::dispatch::Dispatcher;
use crate::execution::{ActionHandle, EngineSettings, ExecutionEngine};
use crate::orchestration::OrchestrationResolver;
use crate::recognition::IntentRecognizer;
use crate::session::{Session, SessionManager};

pub struct Hive {
    config: AppConfig,
    sessions: SessionManager,
    registry: Arc<CapabilityRegistry>,
    dispatcher: Arc<Dispatcher>,
    resolver: OrchestrationResolver,
    recognizer: Arc<dyn IntentRecognizer>,
    engine: ExecutionEngine,
    shut_down: AtomicBool,
}

impl Hive {
    /// 构建运行时并启动执行引擎
    pub async fn start(
        config: AppConfig,
        resolver: OrchestrationResolver,
        factories: &CapabilityFactories,
        recognizer: Arc<dyn IntentRecognizer>,
    ) -> Result<Self, HiveError> {
        config.validate()?;

        let registry = Arc::new(CapabilityRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new());

        for (capability, action) in resolver.referenced_actions() {
            if registry.get(&capability).is_err() {
                let instance = factories.create(&capability, &config.capability_settings(&capability))?;
                for descriptor in instance.type_descriptors() {
                    dispatcher.register_type(descriptor);
                }
                registry.register(instance);
            }
            registry.enable_action(&capability, &action)?;
        }

        let engine = ExecutionEngine::start(
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            EngineSettings::from(&config.execution),
        );
        tracing::info!(
            rules = resolver.len(),
            capabilities = ?registry.names(),
            "Hive started"
        );

        Ok(Self {
            sessions: SessionManager::new(config.session.variable_timeout),
            config,
            registry,
            dispatcher,
            resolver,
            recognizer,
            engine,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn resolver(&self) -> &OrchestrationResolver {
        &self.resolver
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    pub async fn get_or_create_session(&self, id: &str) -> Arc<Session> {
        self.sessions.get_or_create(id).await
    }

    pub async fn session(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).await
    }

    pub async fn invalidate_session(&self, id: &str) -> bool {
        self.sessions.invalidate(id).await
    }

    pub async fn clear_sessions(&self) {
        self.sessions.clear().await;
    }

    /// 处理一条消息：返回已提交动作的句柄（意图未绑定动作时为空）
    pub async fn handle_message(
        &self,
        message: &str,
        session: &Arc<Session>,
    ) -> Result<Vec<ActionHandle>, HiveError> {
        if self.is_shutdown() {
            return Err(HiveError::AlreadyShutdown);
        }

        let intent = self.recognizer.recognize(message, session).await;
        session
            .with_contexts(|store| {
                store.next_turn();
                for p in &intent.matched_parameters {
                    store.set_value(&p.context, &p.key, p.value.clone());
                }
            })
            .await;

        let plan = self.resolver.plan_for(&intent.definition_id);
        if plan.is_empty() {
            tracing::warn!(
                session = %session.id(),
                intent = %intent.definition_id,
                "Intent is not bound to any action"
            );
            return Ok(Vec::new());
        }

        tracing::info!(
            session = %session.id(),
            intent = %intent.definition_id,
            actions = plan.len(),
            "Dispatching intent"
        );
        Ok(self
            .engine
            .submit(
                plan,
                self.resolver.fallback_for(&intent.definition_id),
                Arc::clone(session),
            )
            .await)
    }

    /// 关闭：排空执行引擎，清空能力注册表与会话；重复关闭返回错误
    pub async fn shutdown(&self) -> Result<(), HiveError> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Err(HiveError::AlreadyShutdown);
        }
        tracing::info!("Shutting down hive...");
        self.engine.drain().await;
        self.registry.clear();
        self.sessions.clear().await;
        tracing::info!("Hive shut down");
        Ok(())
    }

    pub fn is_shutdown(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::capability::CapabilityError;
    use crate::execution::wait_all;
    use crate::orchestration::{ActionInstance, OrchestrationRule, ParameterValue};
    use crate::recognition::RecognizedIntent;

    struct Fixed(RecognizedIntent);

    #[async_trait]
    impl IntentRecognizer for Fixed {
        async fn recognize(&self, _message: &str, _session: &Session) -> RecognizedIntent {
            self.0.clone()
        }
    }

    fn greet_spec() -> OrchestrationResolver {
        OrchestrationResolver::new(vec![OrchestrationRule::new(
            "Greet",
            vec![ActionInstance::new("log", "LogInfo")
                .with_parameter(ParameterValue::literal("hi {$Test.key}"))
                .with_return_variable("greeting")],
        )])
        .unwrap()
    }

    async fn start(intent: RecognizedIntent) -> Hive {
        Hive::start(
            AppConfig::default(),
            greet_spec(),
            &CapabilityFactories::with_builtins(),
            Arc::new(Fixed(intent)),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_enables_referenced_actions() {
        let hive = start(RecognizedIntent::new("Greet")).await;
        assert_eq!(hive.registry().names(), vec!["log".to_string()]);
        assert!(hive.registry().is_enabled("log", "LogInfo"));
        assert!(!hive.registry().is_enabled("log", "LogError"));
        assert!(hive.dispatcher().is_registered("LogCapability"));
    }

    #[tokio::test]
    async fn test_message_merges_parameters_and_runs_plan() {
        let hive = start(RecognizedIntent::new("Greet").with_parameter("Test", "key", "value")).await;
        let session = hive.get_or_create_session("user").await;
        let handles = hive.handle_message("hello", &session).await.unwrap();
        let results = wait_all(handles).await;
        assert_eq!(results[0].value(), Some(&json!("hi value")));
        assert_eq!(session.get_value("variables", "greeting").await, Some(json!("hi value")));
        assert_eq!(session.with_contexts(|s| s.turn()).await, 1);
    }

    #[tokio::test]
    async fn test_unbound_intent_executes_nothing() {
        let hive = start(RecognizedIntent::fallback()).await;
        let session = hive.get_or_create_session("user").await;
        assert!(hive.handle_message("???", &session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_capability_is_load_error() {
        let spec = OrchestrationResolver::new(vec![OrchestrationRule::new(
            "Weather",
            vec![ActionInstance::new("weather", "Forecast")],
        )])
        .unwrap();
        let result = Hive::start(
            AppConfig::default(),
            spec,
            &CapabilityFactories::with_builtins(),
            Arc::new(Fixed(RecognizedIntent::fallback())),
        )
        .await;
        assert!(matches!(result, Err(HiveError::CapabilityLoad { .. })));
    }

    #[tokio::test]
    async fn test_giphy_without_token_is_load_error() {
        let spec = OrchestrationResolver::new(vec![OrchestrationRule::new(
            "Gif",
            vec![ActionInstance::new("giphy", "GetGif")],
        )])
        .unwrap();
        let result = Hive::start(
            AppConfig::default(),
            spec,
            &CapabilityFactories::with_builtins(),
            Arc::new(Fixed(RecognizedIntent::fallback())),
        )
        .await;
        assert!(matches!(result, Err(HiveError::CapabilityLoad { name, .. }) if name == "giphy"));
    }

    #[tokio::test]
    async fn test_unknown_action_rejected_at_start() {
        let spec = OrchestrationResolver::new(vec![OrchestrationRule::new(
            "Greet",
            vec![ActionInstance::new("log", "LogShout")],
        )])
        .unwrap();
        let result = Hive::start(
            AppConfig::default(),
            spec,
            &CapabilityFactories::with_builtins(),
            Arc::new(Fixed(RecognizedIntent::fallback())),
        )
        .await;
        assert!(matches!(
            result,
            Err(HiveError::Capability(CapabilityError::ActionNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = AppConfig::default();
        config.execution.queue_capacity = 0;
        let result = Hive::start(
            config,
            greet_spec(),
            &CapabilityFactories::with_builtins(),
            Arc::new(Fixed(RecognizedIntent::fallback())),
        )
        .await;
        assert!(matches!(result, Err(HiveError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_shutdown_twice_fails() {
        let hive = start(RecognizedIntent::new("Greet")).await;
        let session = hive.get_or_create_session("user").await;
        hive.shutdown().await.unwrap();
        assert!(hive.is_shutdown());
        assert!(hive.registry().is_empty());
        assert!(hive.session("user").await.is_none());
        assert!(matches!(hive.shutdown().await, Err(HiveError::AlreadyShutdown)));
        assert!(matches!(
            hive.handle_message("hello", &session).await,
            Err(HiveError::AlreadyShutdown)
        ));
    }

    #[tokio::test]
    async fn test_invalidate_session() {
        let hive = start(RecognizedIntent::new("Greet")).await;
        let a = hive.get_or_create_session("user").await;
        assert!(hive.invalidate_session("user").await);
        let b = hive.get_or_create_session("user").await;
        assert!(!Arc::ptr_eq(&a, &b));
        hive.clear_sessions().await;
        assert!(hive.session("user").await.is_none());
    }
}
