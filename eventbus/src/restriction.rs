//! 限定策略（RestrictionPolicy）
//!
//! 三种互斥模式决定哪些处理方法参与分发：
//! - `Unrestricted`：所有已注册监听器中带处理器标记的方法；
//! - `ToType`：仅限某个监听器类型（无需注册实例，也无需处理器标记）；
//! - `ToMarker`：所有已注册监听器中带指定标记的方法。
//!
//! 以单一枚举表达，整体替换，任何时刻恰有一种模式生效。
//!
use crate::listener::Marker;
use parking_lot::RwLock;
use std::any::TypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Restriction {
    #[default]
    Unrestricted,
    ToType(TypeId),
    ToMarker(Marker),
}

#[derive(Debug, Default)]
pub struct RestrictionPolicy {
    state: RwLock<Restriction>,
}

impl RestrictionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unrestricted(&self) {
        self.replace(Restriction::Unrestricted);
    }

    pub fn set_restricted_to_type<L: 'static>(&self) {
        self.set_restricted_to_type_id(TypeId::of::<L>());
    }

    pub fn set_restricted_to_type_id(&self, type_id: TypeId) {
        self.replace(Restriction::ToType(type_id));
    }

    pub fn set_restricted_to_marker(&self, marker: Marker) {
        self.replace(Restriction::ToMarker(marker));
    }

    pub fn replace(&self, restriction: Restriction) {
        *self.state.write() = restriction;
    }

    /// 当前模式的快照
    pub fn current(&self) -> Restriction {
        *self.state.read()
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self.current(), Restriction::Unrestricted)
    }

    pub fn is_restricted_to_type(&self) -> bool {
        matches!(self.current(), Restriction::ToType(_))
    }

    pub fn is_restricted_to_marker(&self) -> bool {
        matches!(self.current(), Restriction::ToMarker(_))
    }

    pub fn current_type(&self) -> Option<TypeId> {
        match self.current() {
            Restriction::ToType(t) => Some(t),
            _ => None,
        }
    }

    pub fn current_marker(&self) -> Option<Marker> {
        match self.current() {
            Restriction::ToMarker(m) => Some(m),
            _ => None,
        }
    }
}
