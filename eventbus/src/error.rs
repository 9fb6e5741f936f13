//! 事件总线统一错误定义
//!
//! 区分两类失败：
//! - 同步失败（`NotCancellable` / `InvalidDelay` / `Config`）：直接返回给调用方；
//! - 处理器失败（`HandlerInvocation` / `HandlerUnreachable`）：在分发过程中被逐个捕获，
//!   交给 [`FailureSink`](crate::failure::FailureSink)，不会中断同一次分发的后续处理器。
//!
use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EventBusError {
    // --- 取消/延迟 ---
    #[error("event type is not cancellable: {event_type}")]
    NotCancellable { event_type: &'static str },
    #[error("invalid delay: event_type={event_type}, delay_ms={delay_ms}")]
    InvalidDelay {
        event_type: &'static str,
        delay_ms: i64,
    },

    // --- 处理器 ---
    #[error("handler invocation failed: handler={listener}::{method}, reason={source}")]
    HandlerInvocation {
        listener: &'static str,
        method: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("handler unreachable: handler={listener}::{method}, reason={reason}")]
    HandlerUnreachable {
        listener: &'static str,
        method: &'static str,
        reason: String,
    },

    // --- 类型目录配置 ---
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

impl EventBusError {
    pub fn config(reason: impl Into<String>) -> Self {
        EventBusError::Config {
            reason: reason.into(),
        }
    }

    /// 是否为处理器级别的失败（会被路由到 FailureSink 而非返回给调用方）
    pub fn is_handler_failure(&self) -> bool {
        matches!(
            self,
            EventBusError::HandlerInvocation { .. } | EventBusError::HandlerUnreachable { .. }
        )
    }
}

/// 统一 Result 类型别名
pub type EventBusResult<T> = Result<T, EventBusError>;
