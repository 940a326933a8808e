//! 执行引擎：单个串行工作者 + 有界队列
//!
//! submit 不等待执行：队列满或引擎已关闭时句柄立即以错误完成。同一计划的动作连续入队，
//! 工作者按提交顺序逐个执行。
//!
//! 参数按提交时的会话快照解析，排队期间会话进入新一轮也不影响；
//! 执行时只叠加会话中最新的 `variables` 上下文，因此能看到前面动作写入的返回变量。
//!
//! 重试：`ActionFailure::Io`（含单次超时）立即重试，最多 max_attempts 次；其他失败不重试。
//! 计划中任一动作失败且规则带回退动作时，回退动作在该计划最后一个动作之后执行一次。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::result::{ActionHandle, ExecutionResult};
use crate::capability::{
    ActionContext, ActionFailure, CapabilityError, CapabilityRegistry, RuntimeAction,
};
use crate::config::ExecutionSection;
use crate::core::ActionError;
use crate::dispatch::Dispatcher;
use crate::orchestration::ActionInstance;
use crate::session::{ContextStore, Session, VARIABLES_CONTEXT};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// 总尝试次数（含第一次）
    pub max_attempts: u32,
    pub queue_capacity: usize,
    pub action_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            queue_capacity: 1024,
            action_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&ExecutionSection> for EngineSettings {
    fn from(section: &ExecutionSection) -> Self {
        Self {
            max_attempts: section.max_attempts.max(1),
            queue_capacity: section.queue_capacity.max(1),
            action_timeout: Duration::from_secs(section.action_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Open,
    Draining,
    Closed,
}

/// 同一次提交的计划共享的状态
struct PlanState {
    remaining: AtomicUsize,
    failed: AtomicBool,
    fallback: Option<ActionInstance>,
    /// 提交时的会话上下文快照
    submitted: ContextStore,
}

impl PlanState {
    /// 记录一个动作完成；最后一个动作完成且有失败时返回回退动作
    fn complete(&self, ok: bool) -> Option<&ActionInstance> {
        if !ok {
            self.failed.store(true, Ordering::SeqCst);
        }
        let last = self.remaining.fetch_sub(1, Ordering::SeqCst) == 1;
        if last && self.failed.load(Ordering::SeqCst) {
            self.fallback.as_ref()
        } else {
            None
        }
    }
}

struct WorkUnit {
    execution_id: Uuid,
    action: ActionInstance,
    session: Arc<Session>,
    plan: Arc<PlanState>,
    reply: oneshot::Sender<ExecutionResult>,
}

struct Inlet {
    sender: Option<mpsc::Sender<WorkUnit>>,
    state: EngineState,
}

struct Worker {
    registry: Arc<CapabilityRegistry>,
    dispatcher: Arc<Dispatcher>,
    settings: EngineSettings,
}

pub struct ExecutionEngine {
    inlet: Mutex<Inlet>,
    cancel: CancellationToken,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    settings: EngineSettings,
}

impl ExecutionEngine {
    /// 创建引擎并启动工作者（需在 tokio 运行时内调用）
    pub fn start(
        registry: Arc<CapabilityRegistry>,
        dispatcher: Arc<Dispatcher>,
        settings: EngineSettings,
    ) -> Self {
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let cancel = CancellationToken::new();
        let worker = Worker {
            registry,
            dispatcher,
            settings: settings.clone(),
        };
        let handle = tokio::spawn(worker.run(rx, cancel.clone()));
        tracing::info!(
            max_attempts = settings.max_attempts,
            queue_capacity = settings.queue_capacity,
            "Execution engine started"
        );
        Self {
            inlet: Mutex::new(Inlet {
                sender: Some(tx),
                state: EngineState::Open,
            }),
            cancel,
            worker: tokio::sync::Mutex::new(Some(handle)),
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn state(&self) -> EngineState {
        self.inlet.lock().unwrap_or_else(PoisonError::into_inner).state
    }

    /// 队列中尚未开始的动作数
    pub fn queued(&self) -> usize {
        let inlet = self.inlet.lock().unwrap_or_else(PoisonError::into_inner);
        inlet
            .sender
            .as_ref()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0)
    }

    /// 提交一个计划；只等待会话快照，不等待执行，返回每个动作的句柄
    pub async fn submit(
        &self,
        plan: &[ActionInstance],
        fallback: Option<&ActionInstance>,
        session: Arc<Session>,
    ) -> Vec<ActionHandle> {
        if plan.is_empty() {
            return Vec::new();
        }
        let submitted = session.snapshot().await;

        let inlet = self.inlet.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(sender) = inlet.sender.as_ref() else {
            return reject_all(plan, ActionError::EngineClosed);
        };
        if sender.capacity() < plan.len() {
            tracing::warn!(
                session = %session.id(),
                actions = plan.len(),
                "Execution queue is full, rejecting plan"
            );
            return reject_all(plan, ActionError::QueueFull);
        }

        let state = Arc::new(PlanState {
            remaining: AtomicUsize::new(plan.len()),
            failed: AtomicBool::new(false),
            fallback: fallback.cloned(),
            submitted,
        });

        let mut handles = Vec::with_capacity(plan.len());
        for action in plan {
            let name = action.qualified_name();
            let (handle, reply) = ActionHandle::new(name.clone());
            let unit = WorkUnit {
                execution_id: Uuid::new_v4(),
                action: action.clone(),
                session: Arc::clone(&session),
                plan: Arc::clone(&state),
                reply,
            };
            match sender.try_send(unit) {
                Ok(()) => handles.push(handle),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    handles.push(ActionHandle::resolved(ExecutionResult::rejected(
                        name.clone(),
                        ActionError::QueueFull(name),
                    )));
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    handles.push(ActionHandle::resolved(ExecutionResult::rejected(
                        name.clone(),
                        ActionError::EngineClosed(name),
                    )));
                }
            }
        }
        tracing::debug!(session = %session.id(), actions = handles.len(), "Plan submitted");
        handles
    }

    /// 停止接收新动作，等待正在执行的动作结束，丢弃队列中尚未开始的动作
    pub async fn drain(&self) {
        {
            let mut inlet = self.inlet.lock().unwrap_or_else(PoisonError::into_inner);
            if inlet.state == EngineState::Closed {
                return;
            }
            inlet.sender = None;
            inlet.state = EngineState::Draining;
        }
        self.cancel.cancel();

        if let Some(handle) = self.worker.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::error!("Execution worker terminated abnormally: {}", e);
            }
        }

        self.inlet.lock().unwrap_or_else(PoisonError::into_inner).state = EngineState::Closed;
        tracing::info!("Execution engine drained");
    }
}

fn reject_all(plan: &[ActionInstance], error: fn(String) -> ActionError) -> Vec<ActionHandle> {
    plan.iter()
        .map(|action| {
            let name = action.qualified_name();
            ActionHandle::resolved(ExecutionResult::rejected(name.clone(), error(name)))
        })
        .collect()
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<WorkUnit>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                unit = rx.recv() => match unit {
                    Some(unit) => self.process(unit).await,
                    None => break,
                },
            }
        }

        rx.close();
        let mut discarded = 0usize;
        while let Ok(unit) = rx.try_recv() {
            let name = unit.action.qualified_name();
            let _ = unit
                .reply
                .send(ExecutionResult::rejected(name.clone(), ActionError::Discarded(name)));
            discarded += 1;
        }
        if discarded > 0 {
            tracing::warn!("Discarded {} queued actions on shutdown", discarded);
        }
    }

    async fn process(&self, unit: WorkUnit) {
        let WorkUnit {
            execution_id,
            action,
            session,
            plan,
            reply,
        } = unit;

        let result = self.execute(execution_id, &action, &session, &plan.submitted).await;
        let ok = result.is_ok();
        let _ = reply.send(result);

        if let Some(fallback) = plan.complete(ok) {
            tracing::info!(
                session = %session.id(),
                fallback = %fallback.qualified_name(),
                "Plan failed, running fallback action"
            );
            let result = self
                .execute(Uuid::new_v4(), fallback, &session, &plan.submitted)
                .await;
            if let Some(e) = result.error() {
                tracing::error!(session = %session.id(), "Fallback action failed: {}", e);
            }
        }
    }

    /// 执行一个动作并把结果写回会话
    async fn execute(
        &self,
        execution_id: Uuid,
        action: &ActionInstance,
        session: &Arc<Session>,
        submitted: &ContextStore,
    ) -> ExecutionResult {
        let started_at = Utc::now();
        let (outcome, attempts) = self
            .run_action(execution_id, action, session, submitted)
            .await;
        let result = ExecutionResult {
            execution_id,
            action: action.qualified_name(),
            outcome,
            attempts,
            started_at,
            finished_at: Utc::now(),
        };

        if let Err(e) = &result.outcome {
            tracing::warn!(session = %session.id(), action = %result.action, "Action failed: {}", e);
        }
        if let Some(variable) = &action.return_variable {
            session
                .set_value(VARIABLES_CONTEXT, variable, result.to_context_value())
                .await;
        }
        result
    }

    async fn run_action(
        &self,
        execution_id: Uuid,
        action: &ActionInstance,
        session: &Arc<Session>,
        submitted: &ContextStore,
    ) -> (Result<Value, ActionError>, u32) {
        let name = action.qualified_name();

        let capability = match self.registry.get(&action.capability) {
            Ok(c) => c,
            Err(e) => return (Err(e.into()), 0),
        };
        if !self.registry.is_enabled(&action.capability, &action.action) {
            let err = CapabilityError::ActionDisabled {
                capability: action.capability.clone(),
                action: action.action.clone(),
            };
            return (Err(err.into()), 0);
        }

        let mut working = ContextStore::new(submitted.default_ttl());
        working.merge(submitted);
        let live = session.snapshot().await;
        working.overlay_context(VARIABLES_CONTEXT, &live);

        let mut args = Vec::with_capacity(action.parameters.len());
        for parameter in &action.parameters {
            match parameter.resolve(&working) {
                Ok(v) => args.push(v),
                Err(unresolved) => {
                    return (
                        Err(ActionError::ParameterResolution {
                            action: name,
                            placeholder: unresolved.0,
                        }),
                        0,
                    )
                }
            }
        }

        let mut runnable: Box<dyn RuntimeAction> =
            match self.dispatcher.invoke(capability.as_ref(), &action.action, args) {
                Ok(r) => r,
                Err(e) => return (Err(e.into()), 0),
            };

        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let ctx = ActionContext {
                execution_id,
                session_id: session.id().to_string(),
                attempt,
                contexts: working.clone(),
            };
            let start = Instant::now();
            let (outcome, label) = match timeout(self.settings.action_timeout, runnable.execute(&ctx)).await {
                Ok(Ok(v)) => (Ok(v), "ok"),
                Ok(Err(f)) => (Err(f), "error"),
                Err(_) => (
                    Err(ActionFailure::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("attempt timed out after {:?}", self.settings.action_timeout),
                    ))),
                    "timeout",
                ),
            };
            audit(&ctx, &name, label, start.elapsed());

            match outcome {
                Ok(value) => return (Ok(value), attempt),
                Err(failure) if failure.is_retryable() && attempt < max_attempts => {
                    tracing::debug!(action = %name, attempt, "Retrying after: {}", failure);
                }
                Err(failure) => {
                    return (
                        Err(ActionError::Execution {
                            action: name,
                            attempts: attempt,
                            cause: failure,
                        }),
                        attempt,
                    )
                }
            }
        }
    }
}

fn audit(ctx: &ActionContext, action: &str, outcome: &str, elapsed: Duration) {
    let audit = serde_json::json!({
        "event": "action_audit",
        "execution_id": ctx.execution_id.to_string(),
        "session": ctx.session_id,
        "action": action,
        "attempt": ctx.attempt,
        "ok": outcome == "ok",
        "outcome": outcome,
        "duration_ms": elapsed.as_millis() as u64,
    });
    tracing::info!(audit = %audit.to_string(), "action");
}
