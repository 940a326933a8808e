//! 执行结果与结果句柄

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::core::ActionError;

/// 单个动作的执行结果
#[derive(Debug)]
pub struct ExecutionResult {
    pub execution_id: Uuid,
    /// `capability.action`
    pub action: String,
    pub outcome: Result<Value, ActionError>,
    /// 成功时为成功的那次尝试；重试耗尽时为最大次数；未开始执行时为 0
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    /// 未执行即失败的结果（队列满、引擎关闭、被丢弃）
    pub fn rejected(action: impl Into<String>, error: ActionError) -> Self {
        let now = Utc::now();
        Self {
            execution_id: Uuid::new_v4(),
            action: action.into(),
            outcome: Err(error),
            attempts: 0,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn value(&self) -> Option<&Value> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ActionError> {
        self.outcome.as_ref().err()
    }

    /// 写入 variables 上下文的形式：成功为返回值，失败为 {"error", "attempts"}
    pub fn to_context_value(&self) -> Value {
        match &self.outcome {
            Ok(value) => value.clone(),
            Err(e) => json!({
                "error": e.to_string(),
                "attempts": self.attempts,
            }),
        }
    }
}

/// 已提交动作的结果句柄
#[derive(Debug)]
pub struct ActionHandle {
    action: String,
    rx: oneshot::Receiver<ExecutionResult>,
}

impl ActionHandle {
    pub(crate) fn new(action: impl Into<String>) -> (Self, oneshot::Sender<ExecutionResult>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                action: action.into(),
                rx,
            },
            tx,
        )
    }

    /// 立即完成的句柄
    pub(crate) fn resolved(result: ExecutionResult) -> Self {
        let (handle, tx) = Self::new(result.action.clone());
        let _ = tx.send(result);
        handle
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// 等待结果；引擎在执行前丢弃了该动作时返回 Discarded
    pub async fn wait(self) -> ExecutionResult {
        let action = self.action;
        match self.rx.await {
            Ok(result) => result,
            Err(_) => {
                let err = ActionError::Discarded(action.clone());
                ExecutionResult::rejected(action, err)
            }
        }
    }
}

/// 按提交顺序等待一组句柄
pub async fn wait_all(handles: Vec<ActionHandle>) -> Vec<ExecutionResult> {
    join_all(handles.into_iter().map(ActionHandle::wait)).await
}
