//! 处理器失败路由（FailureSink）
//!
//! 分发过程中单个处理器的失败（返回错误、panic、无法调用）被逐个捕获后交给 `FailureSink`，
//! 同一次分发的后续处理器照常执行。默认实现 [`LogFailureSink`] 仅记录日志。
//!
use crate::error::EventBusError;
use crate::event::Event;
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

/// 一次处理器失败的上下文：触发的处理器、事件与原始原因
#[derive(Debug)]
pub struct HandlerFailure {
    listener: &'static str,
    method: &'static str,
    event: Arc<dyn Event>,
    error: EventBusError,
}

impl HandlerFailure {
    pub(crate) fn new(
        listener: &'static str,
        method: &'static str,
        event: Arc<dyn Event>,
        error: EventBusError,
    ) -> Self {
        Self {
            listener,
            method,
            event,
            error,
        }
    }

    pub fn listener(&self) -> &'static str {
        self.listener
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn event(&self) -> &Arc<dyn Event> {
        &self.event
    }

    pub fn error(&self) -> &EventBusError {
        &self.error
    }

    pub fn into_error(self) -> EventBusError {
        self.error
    }
}

/// 处理器失败的接收方
#[async_trait]
pub trait FailureSink: Send + Sync {
    async fn on_failure(&self, failure: &HandlerFailure);
}

#[async_trait]
impl<F> FailureSink for F
where
    F: Fn(&HandlerFailure) + Send + Sync,
{
    async fn on_failure(&self, failure: &HandlerFailure) {
        self(failure)
    }
}

/// 默认失败接收方：以 `warn` 级别记录
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFailureSink;

#[async_trait]
impl FailureSink for LogFailureSink {
    async fn on_failure(&self, failure: &HandlerFailure) {
        tracing::warn!(
            listener = failure.listener,
            method = failure.method,
            event = ?failure.event,
            error = %failure.error,
            "event handler failed"
        );
    }
}

// 提取 panic 负载中的文字说明
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
