//! 监听器注册表（ListenerRegistry）
//!
//! 有序、允许重复的监听器列表：
//! - 重复注册同一监听器会得到两个条目，分发时两个条目都会执行；
//! - 注销按指针同一性移除第一个匹配条目，未注册的监听器注销时静默忽略；
//! - 读多写少，使用读写锁保护；`snapshot` 返回一致的拷贝，供分发期间无锁迭代。
//!
use crate::listener::ListenerRef;
use parking_lot::RwLock;

#[derive(Debug, Default)]
pub struct ListenerRegistry {
    entries: RwLock<Vec<ListenerRef>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: ListenerRef) {
        self.entries.write().push(listener);
    }

    pub fn register_all<I>(&self, listeners: I)
    where
        I: IntoIterator<Item = ListenerRef>,
    {
        let listeners: Vec<ListenerRef> = listeners.into_iter().collect();
        self.entries.write().extend(listeners);
    }

    /// 移除第一个同一性匹配的条目，返回是否有条目被移除
    pub fn unregister(&self, listener: &ListenerRef) -> bool {
        let mut entries = self.entries.write();
        match entries.iter().position(|e| e.same_as(listener)) {
            Some(idx) => {
                entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// 逐个注销，返回实际移除的条目数
    pub fn unregister_all<'a, I>(&self, listeners: I) -> usize
    where
        I: IntoIterator<Item = &'a ListenerRef>,
    {
        listeners
            .into_iter()
            .filter(|l| self.unregister(l))
            .count()
    }

    pub fn snapshot(&self) -> Vec<ListenerRef> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
