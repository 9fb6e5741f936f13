//! 处理器解析（HandlerResolver）
//!
//! 给定事件的运行时类型、注册表快照与当前限定策略，得出本次分发要调用的
//! `(监听器实例, 处理方法)` 有序列表：
//! 1. 候选池：不限定 / 限定标记 → 全部已注册监听器；限定类型 → 该类型本身（通过工厂构造实例）；
//! 2. 被排除的监听器类型整体跳过，继续处理其余监听器；
//! 3. 方法需公开、非静态、单参数、未被排除、具备资格标记，且参数类型是事件类型自身或其祖先
//!    （标记为 exact 的方法只匹配参数类型本身）；
//! 4. 顺序：注册顺序，同一监听器内按声明顺序。
//!
//! 解析本身不会失败，没有匹配时返回空列表。
//!
use crate::catalog::Catalog;
use crate::hierarchy::EventType;
use crate::listener::{AnyListener, HandlerMethod, ListenerRef, ListenerType, Marker};
use crate::restriction::Restriction;
use std::fmt;
use std::sync::Arc;

/// 一个待调用的处理器
#[derive(Clone)]
pub struct ResolvedHandler {
    // 无法构造实例时保存原因
    instance: Result<AnyListener, String>,
    listener: Arc<ListenerType>,
    index: usize,
}

impl ResolvedHandler {
    pub fn listener(&self) -> &ListenerType {
        &self.listener
    }

    pub fn method(&self) -> &HandlerMethod {
        &self.listener.methods()[self.index]
    }

    /// 没有可用实例（限定类型且无法构造）时为 false
    pub fn has_instance(&self) -> bool {
        self.instance.is_ok()
    }

    /// 无法构造实例的原因
    pub fn unreachable_reason(&self) -> Option<&str> {
        self.instance.as_ref().err().map(String::as_str)
    }

    pub(crate) fn instance(&self) -> Result<AnyListener, String> {
        self.instance.clone()
    }
}

impl fmt::Debug for ResolvedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedHandler")
            .field("listener", &self.listener.name())
            .field("method", &self.method().name())
            .field("has_instance", &self.has_instance())
            .finish()
    }
}

// 方法的资格判定依据
#[derive(Clone, Copy)]
enum Eligibility {
    Marker(Marker),
    Membership,
}

impl Eligibility {
    fn admits(self, method: &HandlerMethod) -> bool {
        match self {
            Eligibility::Marker(m) => method.has_marker(m),
            Eligibility::Membership => true,
        }
    }
}

pub struct HandlerResolver<'a> {
    catalog: &'a Catalog,
    handler_marker: Marker,
    catch_panics: bool,
}

impl<'a> HandlerResolver<'a> {
    pub fn new(catalog: &'a Catalog, handler_marker: Marker) -> Self {
        Self {
            catalog,
            handler_marker,
            catch_panics: true,
        }
    }

    /// 工厂 panic 时是否捕获为不可达原因（默认捕获）
    pub fn catch_panics(mut self, catch_panics: bool) -> Self {
        self.catch_panics = catch_panics;
        self
    }

    pub fn resolve(
        &self,
        event_type: EventType,
        snapshot: &[ListenerRef],
        restriction: Restriction,
    ) -> Vec<ResolvedHandler> {
        let mut out = Vec::new();

        match restriction {
            Restriction::Unrestricted => {
                let eligibility = Eligibility::Marker(self.handler_marker);
                self.collect_registered(event_type, snapshot, eligibility, &mut out);
            }
            Restriction::ToMarker(marker) => {
                let eligibility = Eligibility::Marker(marker);
                self.collect_registered(event_type, snapshot, eligibility, &mut out);
            }
            Restriction::ToType(type_id) => {
                let Some(listener) = self.catalog.listener_type(type_id) else {
                    return out;
                };
                let indices =
                    self.matching_methods(event_type, listener, Eligibility::Membership);
                if indices.is_empty() {
                    return out;
                }

                // 同一次解析内共享一个实例；无法构造时保存原因，调用阶段报告 HandlerUnreachable
                let instance = listener.instantiate(self.catch_panics);
                out.extend(indices.into_iter().map(|index| ResolvedHandler {
                    instance: instance.clone(),
                    listener: listener.clone(),
                    index,
                }));
            }
        }

        out
    }

    fn collect_registered(
        &self,
        event_type: EventType,
        snapshot: &[ListenerRef],
        eligibility: Eligibility,
        out: &mut Vec<ResolvedHandler>,
    ) {
        for registered in snapshot {
            let Some(listener) = self.catalog.listener_type(registered.type_id()) else {
                tracing::trace!(
                    listener = registered.type_name(),
                    "listener type has no descriptor"
                );
                continue;
            };

            for index in self.matching_methods(event_type, listener, eligibility) {
                out.push(ResolvedHandler {
                    instance: Ok(registered.instance()),
                    listener: listener.clone(),
                    index,
                });
            }
        }
    }

    fn matching_methods(
        &self,
        event_type: EventType,
        listener: &ListenerType,
        eligibility: Eligibility,
    ) -> Vec<usize> {
        if listener.is_excluded() {
            return Vec::new();
        }

        let hierarchy = self.catalog.hierarchy();
        listener
            .methods()
            .iter()
            .enumerate()
            .filter(|(_, m)| {
                m.is_callable()
                    && !m.is_excluded()
                    && eligibility.admits(m)
                    && if m.is_exact() {
                        m.param() == event_type
                    } else {
                        hierarchy.is_ancestor_or_self(m.param(), event_type)
                    }
            })
            .map(|(i, _)| i)
            .collect()
    }
}
