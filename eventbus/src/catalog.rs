//! 类型目录（Catalog）
//!
//! 在配置期一次性构建的声明式查找表：事件类型层级 + 监听器类型描述。
//! 构建完成后随总线以只读方式共享，分发时只做表查询与祖先遍历。
//!
use crate::error::{EventBusError, EventBusResult as Result};
use crate::event::Event;
use crate::hierarchy::{EventDef, EventType, TypeHierarchy};
use crate::listener::{ListenerDef, ListenerType};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

/// 由 `#[event]` 宏生成：提供事件类型自身的定义
pub trait DeclareEvent: Event + Sized {
    fn event_def() -> EventDef;
}

/// 由 `#[listener]` 宏生成：提供监听器类型自身的定义
pub trait DeclareListener: Send + Sync + Sized + 'static {
    fn listener_def() -> ListenerDef<Self>;
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    hierarchy: TypeHierarchy,
    listeners: HashMap<TypeId, Arc<ListenerType>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_event(&mut self, def: EventDef) -> Result<EventType> {
        self.hierarchy.define(def)
    }

    /// 定义监听器类型；其方法参数涉及的事件类型须已定义
    pub fn define_listener<L>(&mut self, def: ListenerDef<L>) -> Result<()>
    where
        L: Send + Sync + 'static,
    {
        let key = TypeId::of::<L>();
        if self.listeners.contains_key(&key) {
            return Err(EventBusError::config(format!(
                "listener type already defined: {}",
                def.name()
            )));
        }

        let ty = def.into_type(&self.hierarchy)?;
        self.listeners.insert(key, Arc::new(ty));
        Ok(())
    }

    /// 链式定义一个声明式事件类型
    pub fn event<E: DeclareEvent>(mut self) -> Result<Self> {
        self.define_event(E::event_def())?;
        Ok(self)
    }

    /// 链式定义一个声明式监听器类型
    pub fn listener<L: DeclareListener>(mut self) -> Result<Self> {
        self.define_listener(L::listener_def())?;
        Ok(self)
    }

    pub fn hierarchy(&self) -> &TypeHierarchy {
        &self.hierarchy
    }

    pub fn listener_type(&self, type_id: TypeId) -> Option<&Arc<ListenerType>> {
        self.listeners.get(&type_id)
    }

    pub fn event_type_of<E: Event>(&self) -> Option<EventType> {
        self.hierarchy.of::<E>()
    }
}
