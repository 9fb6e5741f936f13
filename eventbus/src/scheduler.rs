//! 延迟调度（DelayScheduler）
//!
//! - 延迟为 0：动作由调用方直接 await，返回时动作已执行完毕；
//! - 延迟大于 0：动作作为一次性任务交给 tokio 运行时，经过延迟后执行，调用方立即返回；
//! - 负延迟属于配置错误，在任何调度发生前以 `InvalidDelay` 失败。
//!
//! 已调度的延迟分发不可单独撤销；只有 `shutdown` 会丢弃尚未到期的任务。
//!
use crate::error::{EventBusError, EventBusResult as Result};
use crate::hierarchy::{EventType, TypeHierarchy};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

#[derive(Debug, Default)]
pub struct DelayScheduler {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl DelayScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 事件类型自身的延迟（不继承）
    pub fn effective_delay(hierarchy: &TypeHierarchy, ty: EventType) -> Result<Duration> {
        let delay_ms = hierarchy.delay_ms(ty);
        u64::try_from(delay_ms)
            .map(Duration::from_millis)
            .map_err(|_| EventBusError::InvalidDelay {
                event_type: hierarchy.name(ty),
                delay_ms,
            })
    }

    /// 按延迟执行动作
    pub async fn run<F>(&self, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if delay.is_zero() {
            action.await;
            return;
        }

        if self.token.is_cancelled() {
            tracing::debug!(?delay, "scheduler is shut down, delayed action dropped");
            return;
        }

        let token = self.token.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(?delay, "delayed action cancelled by shutdown");
                }
                _ = tokio::time::sleep(delay) => action.await,
            }
        });
    }

    /// 尚未结束的延迟任务数
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// 丢弃所有尚未到期的延迟任务，之后的延迟动作不再调度
    pub fn shutdown(&self) {
        self.token.cancel();
        self.tracker.close();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 等待所有已调度的延迟任务结束
    pub async fn join(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        if !self.is_shutdown() {
            self.tracker.reopen();
        }
    }
}
