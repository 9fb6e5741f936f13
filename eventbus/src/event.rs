//! 事件（Event）
//!
//! 事件是生产者构造、交给 [`EventBus`] 分发的具体值：
//! - 运行时类型由 `TypeId` 决定，并在 [`TypeHierarchy`](crate::hierarchy::TypeHierarchy) 中查到对应节点；
//! - 处理器以 `Arc<dyn Event>` 接收事件，可通过 `downcast_ref` / [`downcast_event`] 还原具体类型；
//! - 可选的 [`CallerSlot`] 作为"回填槽"，在一次分发全部处理器执行完毕后由总线写入自身句柄。
//!
use crate::bus::EventBus;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// 类型擦除辅助：为所有 `'static + Send + Sync` 类型提供到 `Any` 的视图
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T> AsAny for T
where
    T: Any + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// 可被分发的事件
pub trait Event: AsAny + fmt::Debug {
    /// 回填槽：若事件希望在分发结束后拿到分发它的总线句柄，返回该槽位
    fn caller_slot(&self) -> Option<&CallerSlot> {
        None
    }
}

impl dyn Event {
    /// 事件的运行时类型
    pub fn runtime_type_id(&self) -> TypeId {
        self.as_any().type_id()
    }

    pub fn is<E: Event>(&self) -> bool {
        self.as_any().is::<E>()
    }

    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }
}

/// 将 `Arc<dyn Event>` 还原为具体事件类型
pub fn downcast_event<E: Event>(event: Arc<dyn Event>) -> Option<Arc<E>> {
    event.as_any_arc().downcast::<E>().ok()
}

/// 事件上的回填槽位
///
/// 分发期间（同步分发的处理器内）读取为空；分发结束后可读到总线句柄。
/// 同一事件被多次分发时，每次分发结束都会覆盖写入。
#[derive(Default)]
pub struct CallerSlot {
    bus: RwLock<Option<EventBus>>,
}

impl CallerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<EventBus> {
        self.bus.read().clone()
    }

    pub fn is_set(&self) -> bool {
        self.bus.read().is_some()
    }

    pub(crate) fn fill(&self, bus: EventBus) {
        *self.bus.write() = Some(bus);
    }
}

impl Clone for CallerSlot {
    fn clone(&self) -> Self {
        Self {
            bus: RwLock::new(self.get()),
        }
    }
}

impl fmt::Debug for CallerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallerSlot")
            .field("is_set", &self.is_set())
            .finish()
    }
}
