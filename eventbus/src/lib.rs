//! 进程内类型化事件总线（eventbus）
//!
//! 生产者把事件值交给总线，总线按事件的运行时类型把它送达所有已注册监听器中
//! 声明可处理该类型（或其任一祖先类型）的处理方法：
//! - 事件类型层级与监听器描述在配置期写入类型目录（`catalog`），可手写，也可由
//!   `#[event]` / `#[listener]` 宏生成；
//! - 限定策略（`restriction`）可将分发收窄到某个监听器类型或某个标记；
//! - 可取消的事件类型可被整体阻断，阻断沿层级向下继承（`cancellation`）；
//! - 事件类型可声明固定延迟，延迟分发由运行时任务执行（`scheduler`）；
//! - 单个处理器失败不会中断同一次分发，失败交给 `FailureSink`（`failure`）。
//!
//! 典型用法：
//! 1. 用宏或 `EventDef` / `ListenerDef` 定义事件与监听器，构建 `Catalog`；
//! 2. `EventBus::builder().catalog(catalog).build()` 创建总线；
//! 3. `register` 监听器实例，`dispatch` 事件。
//!
pub mod bus;
pub mod cancellation;
pub mod catalog;
pub mod error;
pub mod event;
pub mod failure;
pub mod hierarchy;
pub mod listener;
pub mod registry;
pub mod resolver;
pub mod restriction;
pub mod scheduler;

#[cfg(feature = "macros")]
pub use eventbus_macros::{event, listener};

// 供宏生成代码使用，不属于公开 API
#[doc(hidden)]
pub mod __private {
    pub use anyhow;
}

// 允许在本 crate 内部通过 ::eventbus 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::eventbus 路径。
extern crate self as eventbus;
