//! 监听器与处理方法描述
//!
//! 监听器是调用方持有的任意 `Send + Sync` 值；总线只通过类型目录中登记的
//! [`ListenerType`] 了解它有哪些处理方法（[`HandlerMethod`]），无需运行时反射。
//!
//! - [`ListenerDef`]：配置期的强类型描述，注册闭包形式的调用器；
//! - [`ListenerType`]：放入目录后的类型擦除描述；
//! - [`ListenerRef`]：注册表中持有的监听器实例引用，以指针地址判定同一性。
//!
use crate::error::{EventBusError, EventBusResult as Result};
use crate::event::Event;
use crate::failure::panic_message;
use crate::hierarchy::{EventType, TypeHierarchy};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub(crate) type AnyListener = Arc<dyn Any + Send + Sync>;

pub(crate) type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

// 监听器实例类型不符时返回 None
type Invoker = Arc<dyn Fn(AnyListener, Arc<dyn Event>) -> Option<HandlerFuture> + Send + Sync>;

type Factory = Arc<dyn Fn() -> AnyListener + Send + Sync>;

/// 声明式标记（处理器标记、自定义限定标记等）
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Marker(&'static str);

impl Marker {
    /// 默认的处理器标记
    pub const SUBSCRIBE: Marker = Marker("subscribe");

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl Default for Marker {
    fn default() -> Self {
        Self::SUBSCRIBE
    }
}

impl fmt::Debug for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Marker({})", self.0)
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Receiver {
    #[default]
    Instance,
    Static,
}

/// 处理方法的声明式信息（不含参数类型与调用器）
#[derive(Debug, Clone)]
pub struct MethodDef {
    name: &'static str,
    visibility: Visibility,
    receiver: Receiver,
    arity: usize,
    markers: Vec<Marker>,
    excluded: bool,
    exact: bool,
}

impl MethodDef {
    /// 公开、实例方法、单参数，无标记
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            visibility: Visibility::Public,
            receiver: Receiver::Instance,
            arity: 1,
            markers: Vec::new(),
            excluded: false,
            exact: false,
        }
    }

    pub fn subscribe(self) -> Self {
        self.marker(Marker::SUBSCRIBE)
    }

    pub fn marker(mut self, marker: Marker) -> Self {
        if !self.markers.contains(&marker) {
            self.markers.push(marker);
        }
        self
    }

    pub fn excluded(mut self) -> Self {
        self.excluded = true;
        self
    }

    /// 只接收参数类型本身，不接收其子类型
    pub fn exact(mut self) -> Self {
        self.exact = true;
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn receiver(mut self, receiver: Receiver) -> Self {
        self.receiver = receiver;
        self
    }

    pub fn arity(mut self, arity: usize) -> Self {
        self.arity = arity;
        self
    }
}

/// 目录中的处理方法描述
#[derive(Clone)]
pub struct HandlerMethod {
    name: &'static str,
    listener: &'static str,
    param: EventType,
    visibility: Visibility,
    receiver: Receiver,
    arity: usize,
    markers: Vec<Marker>,
    excluded: bool,
    exact: bool,
    invoker: Invoker,
}

impl HandlerMethod {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn listener(&self) -> &'static str {
        self.listener
    }

    /// 声明的参数事件类型
    pub fn param(&self) -> EventType {
        self.param
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn receiver(&self) -> Receiver {
        self.receiver
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn has_marker(&self, marker: Marker) -> bool {
        self.markers.contains(&marker)
    }

    pub fn is_excluded(&self) -> bool {
        self.excluded
    }

    pub fn is_exact(&self) -> bool {
        self.exact
    }

    /// 可被外部调用的实例方法，且恰好一个参数
    pub fn is_callable(&self) -> bool {
        self.visibility == Visibility::Public
            && self.receiver == Receiver::Instance
            && self.arity == 1
    }

    /// 以 `event` 为唯一参数调用该方法
    pub(crate) fn invoke(&self, instance: AnyListener, event: Arc<dyn Event>) -> Result<HandlerFuture> {
        (self.invoker)(instance, event).ok_or_else(|| EventBusError::HandlerUnreachable {
            listener: self.listener,
            method: self.name,
            reason: "listener instance does not match its declared type".to_string(),
        })
    }
}

impl fmt::Debug for HandlerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerMethod")
            .field("listener", &self.listener)
            .field("name", &self.name)
            .field("param", &self.param)
            .field("visibility", &self.visibility)
            .field("receiver", &self.receiver)
            .field("arity", &self.arity)
            .field("markers", &self.markers)
            .field("excluded", &self.excluded)
            .field("exact", &self.exact)
            .finish()
    }
}

struct PendingMethod {
    def: MethodDef,
    param: TypeId,
    param_name: &'static str,
    invoker: Invoker,
}

/// 监听器类型的强类型定义
pub struct ListenerDef<L> {
    name: &'static str,
    excluded: bool,
    factory: Option<Factory>,
    methods: Vec<PendingMethod>,
    _listener: PhantomData<fn() -> L>,
}

impl<L> ListenerDef<L>
where
    L: Send + Sync + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            excluded: false,
            factory: None,
            methods: Vec::new(),
            _listener: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 整个监听器类型被排除：分发时跳过其全部方法
    pub fn excluded(mut self) -> Self {
        self.excluded = true;
        self
    }

    /// 当限定到该类型而没有已注册实例时，用于构造实例
    pub fn factory<F>(mut self, f: F) -> Self
    where
        F: Fn() -> L + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(move || Arc::new(f()) as AnyListener));
        self
    }

    /// 声明一个带处理器标记的方法
    pub fn subscribe<E, F, Fut>(self, name: &'static str, f: F) -> Self
    where
        E: Event,
        F: Fn(Arc<L>, Arc<dyn Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.method::<E, F, Fut>(MethodDef::new(name).subscribe(), f)
    }

    /// 声明一个方法，参数类型为 `E`
    pub fn method<E, F, Fut>(mut self, def: MethodDef, f: F) -> Self
    where
        E: Event,
        F: Fn(Arc<L>, Arc<dyn Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let invoker: Invoker = Arc::new(move |instance: AnyListener, event: Arc<dyn Event>| {
            let listener = instance.downcast::<L>().ok()?;
            Some(f(listener, event).boxed())
        });

        self.methods.push(PendingMethod {
            def,
            param: TypeId::of::<E>(),
            param_name: type_name::<E>(),
            invoker,
        });
        self
    }

    /// 解析参数类型并转换为类型擦除描述
    pub(crate) fn into_type(self, hierarchy: &TypeHierarchy) -> Result<ListenerType> {
        let listener = self.name;
        let methods = self
            .methods
            .into_iter()
            .map(|m| {
                let param = hierarchy.lookup(m.param).ok_or_else(|| {
                    EventBusError::config(format!(
                        "handler {listener}::{} takes an undefined event type: {}",
                        m.def.name, m.param_name
                    ))
                })?;

                Ok(HandlerMethod {
                    name: m.def.name,
                    listener,
                    param,
                    visibility: m.def.visibility,
                    receiver: m.def.receiver,
                    arity: m.def.arity,
                    markers: m.def.markers,
                    excluded: m.def.excluded,
                    exact: m.def.exact,
                    invoker: m.invoker,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ListenerType {
            type_id: TypeId::of::<L>(),
            name: self.name,
            excluded: self.excluded,
            factory: self.factory,
            methods,
        })
    }
}

impl<L> ListenerDef<L>
where
    L: Default + Send + Sync + 'static,
{
    pub fn with_default_factory(self) -> Self {
        self.factory(L::default)
    }
}

/// 目录中的监听器类型描述
#[derive(Clone)]
pub struct ListenerType {
    type_id: TypeId,
    name: &'static str,
    excluded: bool,
    factory: Option<Factory>,
    methods: Vec<HandlerMethod>,
}

impl ListenerType {
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_excluded(&self) -> bool {
        self.excluded
    }

    pub fn methods(&self) -> &[HandlerMethod] {
        &self.methods
    }

    pub fn can_instantiate(&self) -> bool {
        self.factory.is_some()
    }

    /// 通过工厂构造实例，失败时返回原因
    ///
    /// `catch_panics` 为真时工厂 panic 被捕获为失败原因，否则向上传播。
    pub(crate) fn instantiate(
        &self,
        catch_panics: bool,
    ) -> std::result::Result<AnyListener, String> {
        let factory = self
            .factory
            .as_ref()
            .ok_or_else(|| "listener is not registered and its type has no factory".to_string())?;

        if !catch_panics {
            return Ok(factory());
        }
        std::panic::catch_unwind(AssertUnwindSafe(|| factory()))
            .map_err(|payload| format!("listener factory panicked: {}", panic_message(&*payload)))
    }
}

impl fmt::Debug for ListenerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerType")
            .field("name", &self.name)
            .field("excluded", &self.excluded)
            .field("can_instantiate", &self.can_instantiate())
            .field("methods", &self.methods)
            .finish()
    }
}

/// 已注册的监听器实例
#[derive(Clone)]
pub struct ListenerRef {
    instance: AnyListener,
    type_id: TypeId,
    type_name: &'static str,
}

impl ListenerRef {
    pub fn new<L>(listener: Arc<L>) -> Self
    where
        L: Send + Sync + 'static,
    {
        Self {
            instance: listener,
            type_id: TypeId::of::<L>(),
            type_name: type_name::<L>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 指针同一性：同一个 `Arc` 分配视为同一监听器
    pub fn same_as(&self, other: &ListenerRef) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.instance), Arc::as_ptr(&other.instance))
    }

    pub fn downcast<L>(&self) -> Option<Arc<L>>
    where
        L: Send + Sync + 'static,
    {
        self.instance.clone().downcast::<L>().ok()
    }

    pub(crate) fn instance(&self) -> AnyListener {
        self.instance.clone()
    }
}

impl<L> From<Arc<L>> for ListenerRef
where
    L: Send + Sync + 'static,
{
    fn from(listener: Arc<L>) -> Self {
        ListenerRef::new(listener)
    }
}

impl fmt::Debug for ListenerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRef")
            .field("type_name", &self.type_name)
            .field("ptr", &Arc::as_ptr(&self.instance))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::EventDef;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Login;
    impl Event for Login {}

    #[derive(Debug)]
    struct Unknown;
    impl Event for Unknown {}

    #[derive(Default)]
    struct Audit {
        seen: AtomicUsize,
    }

    fn hierarchy() -> TypeHierarchy {
        let mut h = TypeHierarchy::new();
        h.define(EventDef::of::<Login>("Login")).unwrap();
        h
    }

    #[test]
    fn method_def_defaults_are_callable() {
        let def = MethodDef::new("on_login")
            .subscribe()
            .subscribe()
            .marker(Marker::new("audit"));
        assert_eq!(def.markers, vec![Marker::SUBSCRIBE, Marker::new("audit")]);
        assert_eq!(def.visibility, Visibility::Public);
        assert_eq!(def.receiver, Receiver::Instance);
        assert_eq!(def.arity, 1);
    }

    #[tokio::test]
    async fn into_type_resolves_params_and_invokes() {
        let ty = ListenerDef::<Audit>::new("Audit")
            .subscribe::<Login, _, _>("on_login", |audit, _event| async move {
                audit.seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .with_default_factory()
            .into_type(&hierarchy())
            .unwrap();

        assert_eq!(ty.name(), "Audit");
        assert_eq!(ty.methods().len(), 1);
        let method = &ty.methods()[0];
        assert!(method.is_callable());
        assert!(method.has_marker(Marker::SUBSCRIBE));
        assert_eq!(method.listener(), "Audit");

        let audit = Arc::new(Audit::default());
        let instance = ListenerRef::new(audit.clone()).instance();
        method
            .invoke(instance, Arc::new(Login))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(audit.seen.load(Ordering::SeqCst), 1);
        assert!(ty.can_instantiate());
        assert!(ty.instantiate(true).is_ok());
    }

    #[test]
    fn mismatched_instance_is_unreachable() {
        let ty = ListenerDef::<Audit>::new("Audit")
            .subscribe::<Login, _, _>("on_login", |_audit, _event| async { Ok(()) })
            .into_type(&hierarchy())
            .unwrap();

        let other: AnyListener = Arc::new(42_u32);
        let err = ty.methods()[0].invoke(other, Arc::new(Login)).err();
        assert!(matches!(
            err,
            Some(EventBusError::HandlerUnreachable { method: "on_login", .. })
        ));
        assert!(!ty.can_instantiate());
        assert!(ty.instantiate(true).is_err());
    }

    #[test]
    fn panicking_factory_becomes_a_reason() {
        let ty = ListenerDef::<Audit>::new("Audit")
            .factory(|| panic!("cannot build audit"))
            .subscribe::<Login, _, _>("on_login", |_audit, _event| async { Ok(()) })
            .into_type(&hierarchy())
            .unwrap();

        let reason = ty.instantiate(true).err().unwrap();
        assert_eq!(reason, "listener factory panicked: cannot build audit");
    }

    #[test]
    fn exact_flag_is_carried_into_the_catalog() {
        let ty = ListenerDef::<Audit>::new("Audit")
            .method::<Login, _, _>(
                MethodDef::new("only_login").subscribe().exact(),
                |_a, _e| async { Ok(()) },
            )
            .subscribe::<Login, _, _>("any_login", |_a, _e| async { Ok(()) })
            .into_type(&hierarchy())
            .unwrap();

        assert!(ty.methods()[0].is_exact());
        assert!(!ty.methods()[1].is_exact());
    }

    #[test]
    fn undefined_param_type_is_a_config_error() {
        let err = ListenerDef::<Audit>::new("Audit")
            .subscribe::<Unknown, _, _>("on_unknown", |_audit, _event| async { Ok(()) })
            .into_type(&hierarchy())
            .unwrap_err();
        assert!(matches!(err, EventBusError::Config { .. }));
    }

    #[test]
    fn listener_ref_identity_is_pointer_based() {
        let a = Arc::new(Audit::default());
        let b = Arc::new(Audit::default());
        let ra1 = ListenerRef::from(a.clone());
        let ra2 = ListenerRef::from(a.clone());
        let rb = ListenerRef::from(b);

        assert!(ra1.same_as(&ra2));
        assert!(!ra1.same_as(&rb));
        assert!(ra1.downcast::<Audit>().is_some());
        assert!(ra1.downcast::<u32>().is_none());
        assert_eq!(ra1.type_id(), TypeId::of::<Audit>());
    }
}
