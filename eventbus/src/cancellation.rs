//! 取消表（CancellationTable）
//!
//! 记录被阻断的事件类型。取消沿层级向下继承：
//! `is_cancelled(E) ⇔ E ∈ 表 ∨ is_cancelled(parent(E))`。
//! 只有自身或祖先带"可取消"标记的类型才能被取消/恢复，否则返回 `NotCancellable`。
//!
use crate::error::{EventBusError, EventBusResult as Result};
use crate::hierarchy::{EventType, TypeHierarchy};
use dashmap::DashSet;

#[derive(Debug, Default)]
pub struct CancellationTable {
    blocked: DashSet<EventType>,
}

impl CancellationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self, hierarchy: &TypeHierarchy, ty: EventType) -> Result<()> {
        Self::ensure_cancellable(hierarchy, ty)?;
        self.blocked.insert(ty);
        Ok(())
    }

    pub fn uncancel(&self, hierarchy: &TypeHierarchy, ty: EventType) -> Result<()> {
        Self::ensure_cancellable(hierarchy, ty)?;
        self.blocked.remove(&ty);
        Ok(())
    }

    pub fn is_cancelled(&self, hierarchy: &TypeHierarchy, ty: EventType) -> bool {
        hierarchy
            .ancestors_or_self(ty)
            .any(|t| self.blocked.contains(&t))
    }

    /// 直接被取消的类型（不含因继承而被阻断的子类型）
    pub fn blocked(&self) -> Vec<EventType> {
        let mut out: Vec<EventType> = self.blocked.iter().map(|t| *t).collect();
        out.sort_unstable();
        out
    }

    fn ensure_cancellable(hierarchy: &TypeHierarchy, ty: EventType) -> Result<()> {
        if hierarchy.is_cancellable(ty) {
            Ok(())
        } else {
            Err(EventBusError::NotCancellable {
                event_type: hierarchy.name(ty),
            })
        }
    }
}
