//! 事件总线（EventBus）
//!
//! 统一编排"检查取消 → 计算延迟 → 解析处理器 → 顺序调用 → 回填调用方"：
//! - 注册表、限定策略、取消表均支持并发读写，分发时对注册表做快照；
//! - 延迟为 0 的分发在 `dispatch` 返回前执行完全部处理器；
//! - 单个处理器失败（错误、panic、无法调用）交给 `FailureSink`，不影响后续处理器；
//! - 句柄可廉价克隆，全部克隆共享同一份状态。
//!
use crate::catalog::Catalog;
use crate::cancellation::CancellationTable;
use crate::error::{EventBusError, EventBusResult as Result};
use crate::event::Event;
use crate::failure::{FailureSink, HandlerFailure, LogFailureSink, panic_message};
use crate::hierarchy::EventType;
use crate::listener::{ListenerRef, Marker};
use crate::registry::ListenerRegistry;
use crate::resolver::{HandlerResolver, ResolvedHandler};
use crate::restriction::RestrictionPolicy;
use crate::scheduler::DelayScheduler;
use bon::bon;
use futures_util::FutureExt;
use parking_lot::RwLock;
use std::any::{Any, type_name};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// 事件总线配置
#[derive(Clone, Copy, Debug)]
pub struct EventBusConfig {
    /// 不限定模式下识别处理方法的标记（初始值，可通过 `set_handler_marker` 替换）
    pub handler_marker: Marker,
    /// 是否将处理器 panic 视为调用失败（否则 panic 向上传播）
    pub catch_panics: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            handler_marker: Marker::SUBSCRIBE,
            catch_panics: true,
        }
    }
}

struct Inner {
    catalog: Catalog,
    registry: ListenerRegistry,
    restriction: RestrictionPolicy,
    cancellation: CancellationTable,
    scheduler: DelayScheduler,
    failure_sink: Arc<dyn FailureSink>,
    handler_marker: RwLock<Marker>,
    config: EventBusConfig,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.scheduler.shutdown();
    }
}

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

#[bon]
impl EventBus {
    #[builder]
    pub fn new(
        catalog: Catalog,
        #[builder(default)] config: EventBusConfig,
        failure_sink: Option<Arc<dyn FailureSink>>,
    ) -> Self {
        let failure_sink = failure_sink.unwrap_or_else(|| Arc::new(LogFailureSink));
        Self {
            inner: Arc::new(Inner {
                catalog,
                registry: ListenerRegistry::new(),
                restriction: RestrictionPolicy::new(),
                cancellation: CancellationTable::new(),
                scheduler: DelayScheduler::new(),
                failure_sink,
                handler_marker: RwLock::new(config.handler_marker),
                config,
            }),
        }
    }
}

impl EventBus {
    /// 以默认配置创建
    pub fn with_catalog(catalog: Catalog) -> Self {
        Self::builder().catalog(catalog).build()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.inner.config
    }

    // --- 注册表 ---

    pub fn register(&self, listener: impl Into<ListenerRef>) {
        self.inner.registry.register(listener.into());
    }

    pub fn register_all<I>(&self, listeners: I)
    where
        I: IntoIterator<Item = ListenerRef>,
    {
        self.inner.registry.register_all(listeners);
    }

    /// 移除一次注册（按实例同一性），返回是否移除
    pub fn unregister(&self, listener: impl Into<ListenerRef>) -> bool {
        self.inner.registry.unregister(&listener.into())
    }

    pub fn unregister_all<I>(&self, listeners: I) -> usize
    where
        I: IntoIterator<Item = ListenerRef>,
    {
        let listeners: Vec<ListenerRef> = listeners.into_iter().collect();
        self.inner.registry.unregister_all(&listeners)
    }

    /// 当前注册表快照（按注册顺序）
    pub fn listeners(&self) -> Vec<ListenerRef> {
        self.inner.registry.snapshot()
    }

    // --- 限定策略 ---

    pub fn restriction(&self) -> &RestrictionPolicy {
        &self.inner.restriction
    }

    pub fn set_unrestricted(&self) {
        self.inner.restriction.set_unrestricted();
    }

    pub fn set_restricted_to_type<L: 'static>(&self) {
        self.inner.restriction.set_restricted_to_type::<L>();
    }

    pub fn set_restricted_to_marker(&self, marker: Marker) {
        self.inner.restriction.set_restricted_to_marker(marker);
    }

    /// 当前的处理器标记
    pub fn handler_marker(&self) -> Marker {
        *self.inner.handler_marker.read()
    }

    /// 替换处理器标记，对之后解析的分发生效
    pub fn set_handler_marker(&self, marker: Marker) {
        *self.inner.handler_marker.write() = marker;
        tracing::debug!(%marker, "handler marker replaced");
    }

    // --- 取消 ---

    pub fn cancel<E: Event>(&self) -> Result<()> {
        let ty = self.declared::<E>()?;
        self.inner
            .cancellation
            .cancel(self.inner.catalog.hierarchy(), ty)?;
        tracing::debug!(event_type = self.type_name(ty), "event type cancelled");
        Ok(())
    }

    pub fn uncancel<E: Event>(&self) -> Result<()> {
        let ty = self.declared::<E>()?;
        self.inner
            .cancellation
            .uncancel(self.inner.catalog.hierarchy(), ty)?;
        tracing::debug!(event_type = self.type_name(ty), "event type uncancelled");
        Ok(())
    }

    /// 直接被取消的事件类型名（按定义顺序，不含因继承而被阻断的子类型）
    pub fn cancelled(&self) -> Vec<&'static str> {
        self.inner
            .cancellation
            .blocked()
            .into_iter()
            .map(|ty| self.type_name(ty))
            .collect()
    }

    pub fn is_cancellable<E: Event>(&self) -> bool {
        self.inner
            .catalog
            .event_type_of::<E>()
            .is_some_and(|ty| self.inner.catalog.hierarchy().is_cancellable(ty))
    }

    pub fn is_cancelled<E: Event>(&self) -> bool {
        self.inner
            .catalog
            .event_type_of::<E>()
            .is_some_and(|ty| self.is_type_cancelled(ty))
    }

    // 未声明的类型不可能带"可取消"标记
    fn declared<E: Event>(&self) -> Result<EventType> {
        self.inner
            .catalog
            .event_type_of::<E>()
            .ok_or(EventBusError::NotCancellable {
                event_type: type_name::<E>(),
            })
    }

    fn is_type_cancelled(&self, ty: EventType) -> bool {
        self.inner
            .cancellation
            .is_cancelled(self.inner.catalog.hierarchy(), ty)
    }

    fn type_name(&self, ty: EventType) -> &'static str {
        self.inner.catalog.hierarchy().name(ty)
    }

    // --- 分发 ---

    pub async fn dispatch<E: Event>(&self, event: Arc<E>) -> Result<()> {
        self.dispatch_dyn(event).await
    }

    /// 分发一个事件
    ///
    /// - 事件类型（或其祖先）被取消：直接返回，不调用任何处理器、不回填；
    /// - 负延迟：返回 `InvalidDelay`，不调用任何处理器；
    /// - 延迟为 0：返回时所有处理器已执行完毕、回填槽已写入；
    /// - 延迟大于 0：立即返回，处理器在延迟后于运行时任务中执行。
    ///
    /// 处理器失败不会作为返回值出现，而是交给 `FailureSink`。
    pub async fn dispatch_dyn(&self, event: Arc<dyn Event>) -> Result<()> {
        let hierarchy = self.inner.catalog.hierarchy();

        let Some(ty) = hierarchy.lookup(event.runtime_type_id()) else {
            tracing::debug!(?event, "event type is not declared, no handler can match");
            self.fill_caller(&*event);
            return Ok(());
        };

        if self.is_type_cancelled(ty) {
            tracing::debug!(
                event_type = hierarchy.name(ty),
                "event type is cancelled, dispatch skipped"
            );
            return Ok(());
        }

        let delay = DelayScheduler::effective_delay(hierarchy, ty)?;
        tracing::debug!(event_type = hierarchy.name(ty), ?delay, "dispatching event");

        let bus = self.clone();
        self.inner
            .scheduler
            .run(delay, async move { bus.deliver(ty, event).await })
            .await;
        Ok(())
    }

    async fn deliver(&self, ty: EventType, event: Arc<dyn Event>) {
        let handlers = self.resolve(ty);
        tracing::trace!(
            event_type = self.type_name(ty),
            handlers = handlers.len(),
            "handlers resolved"
        );

        for handler in &handlers {
            if let Err(error) = self.call(handler, &event).await {
                let method = handler.method();
                let failure =
                    HandlerFailure::new(method.listener(), method.name(), event.clone(), error);
                self.inner.failure_sink.on_failure(&failure).await;
            }
        }

        self.fill_caller(&*event);
    }

    fn resolve(&self, ty: EventType) -> Vec<ResolvedHandler> {
        let snapshot = self.inner.registry.snapshot();
        HandlerResolver::new(&self.inner.catalog, self.handler_marker())
            .catch_panics(self.inner.config.catch_panics)
            .resolve(ty, &snapshot, self.inner.restriction.current())
    }

    async fn call(&self, handler: &ResolvedHandler, event: &Arc<dyn Event>) -> Result<()> {
        let method = handler.method();
        let listener = method.listener();
        let name = method.name();

        let instance = handler
            .instance()
            .map_err(|reason| EventBusError::HandlerUnreachable {
                listener,
                method: name,
                reason,
            })?;

        let outcome = if self.inner.config.catch_panics {
            let invoked = std::panic::catch_unwind(AssertUnwindSafe(|| {
                method.invoke(instance, event.clone())
            }));
            match invoked {
                Ok(future) => AssertUnwindSafe(future?)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| Err(panic_error(payload))),
                Err(payload) => Err(panic_error(payload)),
            }
        } else {
            method.invoke(instance, event.clone())?.await
        };

        outcome.map_err(|source| EventBusError::HandlerInvocation {
            listener,
            method: name,
            source,
        })
    }

    fn fill_caller(&self, event: &dyn Event) {
        if let Some(slot) = event.caller_slot() {
            slot.fill(self.clone());
        }
    }

    // --- 生命周期 ---

    /// 尚未执行的延迟分发数
    pub fn pending(&self) -> usize {
        self.inner.scheduler.pending()
    }

    /// 丢弃尚未到期的延迟分发，之后的延迟分发不再调度
    pub fn shutdown(&self) {
        self.inner.scheduler.shutdown();
    }

    /// 等待已调度的延迟分发执行完毕
    pub async fn join(&self) {
        self.inner.scheduler.join().await;
    }

    /// 两个句柄是否指向同一总线
    pub fn same_bus(&self, other: &EventBus) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.inner.registry.len())
            .field("restriction", &self.inner.restriction.current())
            .field("handler_marker", &self.handler_marker())
            .field("pending", &self.pending())
            .field("config", &self.inner.config)
            .finish()
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> anyhow::Error {
    anyhow::anyhow!("handler panicked: {}", panic_message(&*payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CallerSlot;
    use crate::hierarchy::EventDef;
    use crate::listener::ListenerDef;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Base;
    impl Event for Base {}

    #[derive(Debug)]
    struct Derived;
    impl Event for Derived {}

    #[derive(Debug, Default)]
    struct Traced {
        caller: CallerSlot,
    }
    impl Event for Traced {
        fn caller_slot(&self) -> Option<&CallerSlot> {
            Some(&self.caller)
        }
    }

    #[derive(Debug)]
    struct Stranger;
    impl Event for Stranger {}

    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<&'static str>>,
    }

    impl Recorder {
        fn push(&self, entry: &'static str) {
            self.log.lock().unwrap().push(entry);
        }

        fn take(&self) -> Vec<&'static str> {
            std::mem::take(&mut *self.log.lock().unwrap())
        }
    }

    fn catalog() -> Catalog {
        let mut c = Catalog::new();
        c.define_event(EventDef::of::<Base>("Base").cancellable())
            .unwrap();
        c.define_event(EventDef::of::<Derived>("Derived").parent::<Base>())
            .unwrap();
        c.define_event(EventDef::of::<Traced>("Traced")).unwrap();
        c.define_listener(
            ListenerDef::<Recorder>::new("Recorder")
                .subscribe::<Base, _, _>("on_base", |r: Arc<Recorder>, _e| async move {
                    r.push("base");
                    Ok(())
                })
                .subscribe::<Derived, _, _>("on_derived", |r: Arc<Recorder>, _e| async move {
                    r.push("derived");
                    Ok(())
                })
                .subscribe::<Traced, _, _>("on_traced", |r: Arc<Recorder>, e| async move {
                    let traced = e.downcast_ref::<Traced>().unwrap();
                    if traced.caller.is_set() {
                        r.push("traced:set");
                    } else {
                        r.push("traced:unset");
                    }
                    Ok(())
                }),
        )
        .unwrap();
        c
    }

    #[tokio::test]
    async fn dispatch_reaches_self_and_ancestor_handlers() {
        let bus = EventBus::with_catalog(catalog());
        let recorder = Arc::new(Recorder::default());
        bus.register(recorder.clone());

        bus.dispatch(Arc::new(Derived)).await.unwrap();
        assert_eq!(recorder.take(), vec!["base", "derived"]);

        bus.dispatch(Arc::new(Base)).await.unwrap();
        assert_eq!(recorder.take(), vec!["base"]);
    }

    #[tokio::test]
    async fn cancelled_base_blocks_derived() {
        let bus = EventBus::with_catalog(catalog());
        let recorder = Arc::new(Recorder::default());
        bus.register(recorder.clone());

        assert!(bus.is_cancellable::<Derived>());
        bus.cancel::<Base>().unwrap();
        assert!(bus.is_cancelled::<Derived>());

        bus.dispatch(Arc::new(Derived)).await.unwrap();
        assert!(recorder.take().is_empty());

        bus.uncancel::<Base>().unwrap();
        bus.dispatch(Arc::new(Derived)).await.unwrap();
        assert_eq!(recorder.take(), vec!["base", "derived"]);
    }

    #[tokio::test]
    async fn cancelling_undeclared_or_plain_types_fails() {
        let bus = EventBus::with_catalog(catalog());

        assert!(matches!(
            bus.cancel::<Traced>().unwrap_err(),
            EventBusError::NotCancellable { event_type: "Traced" }
        ));
        assert!(matches!(
            bus.cancel::<Stranger>().unwrap_err(),
            EventBusError::NotCancellable { .. }
        ));
        assert!(!bus.is_cancellable::<Stranger>());
        assert!(!bus.is_cancelled::<Stranger>());
    }

    #[tokio::test]
    async fn caller_slot_is_filled_after_handlers() {
        let bus = EventBus::with_catalog(catalog());
        let recorder = Arc::new(Recorder::default());
        bus.register(recorder.clone());

        let event = Arc::new(Traced::default());
        bus.dispatch(event.clone()).await.unwrap();

        assert_eq!(recorder.take(), vec!["traced:unset"]);
        let caller = event.caller.get().unwrap();
        assert!(caller.same_bus(&bus));
    }

    #[tokio::test]
    async fn undeclared_event_reaches_nobody() {
        let bus = EventBus::with_catalog(catalog());
        let recorder = Arc::new(Recorder::default());
        bus.register(recorder.clone());

        bus.dispatch(Arc::new(Stranger)).await.unwrap();
        assert!(recorder.take().is_empty());
    }

    #[tokio::test]
    async fn unregister_removes_one_registration() {
        let bus = EventBus::with_catalog(catalog());
        let recorder = Arc::new(Recorder::default());
        bus.register(recorder.clone());
        bus.register(recorder.clone());

        bus.dispatch(Arc::new(Base)).await.unwrap();
        assert_eq!(recorder.take(), vec!["base", "base"]);

        assert!(bus.unregister(recorder.clone()));
        bus.dispatch(Arc::new(Base)).await.unwrap();
        assert_eq!(recorder.take(), vec!["base"]);

        assert!(bus.unregister(recorder.clone()));
        assert!(!bus.unregister(recorder.clone()));
        assert!(bus.listeners().is_empty());
    }

    #[tokio::test]
    async fn cancelled_lists_directly_cancelled_types() {
        let bus = EventBus::with_catalog(catalog());
        assert!(bus.cancelled().is_empty());

        bus.cancel::<Derived>().unwrap();
        bus.cancel::<Base>().unwrap();
        assert_eq!(bus.cancelled(), vec!["Base", "Derived"]);

        bus.uncancel::<Derived>().unwrap();
        assert_eq!(bus.cancelled(), vec!["Base"]);
        assert!(bus.is_cancelled::<Derived>());
    }

    #[tokio::test]
    async fn handler_marker_can_be_replaced_after_build() {
        let bus = EventBus::with_catalog(catalog());
        let recorder = Arc::new(Recorder::default());
        bus.register(recorder.clone());

        assert_eq!(bus.handler_marker(), Marker::SUBSCRIBE);
        bus.set_handler_marker(Marker::new("handles"));
        assert_eq!(bus.handler_marker(), Marker::new("handles"));
        bus.dispatch(Arc::new(Base)).await.unwrap();
        assert!(recorder.take().is_empty());

        bus.set_handler_marker(Marker::SUBSCRIBE);
        bus.dispatch(Arc::new(Base)).await.unwrap();
        assert_eq!(recorder.take(), vec!["base"]);
        assert_eq!(bus.config().handler_marker, Marker::SUBSCRIBE);
    }

    #[test]
    fn panic_payloads_become_messages() {
        let err = panic_error(Box::new("static"));
        assert_eq!(err.to_string(), "handler panicked: static");
        let err = panic_error(Box::new(String::from("owned")));
        assert_eq!(err.to_string(), "handler panicked: owned");
        let err = panic_error(Box::new(7_u8));
        assert_eq!(err.to_string(), "handler panicked: non-string panic payload");
    }
}
