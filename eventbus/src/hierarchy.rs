//! 事件类型层级（TypeHierarchy）
//!
//! 以"父指针树"表达事件类型之间的单继承关系：
//! - 每个事件类型在竞技场（arena）中占一个节点，由 [`EventType`] 索引；
//! - 节点记录父类型、是否可取消（可继承）以及自身延迟（不可继承）；
//! - 父类型必须先于子类型定义，因此树天然无环。
//!
//! 处理器匹配、取消继承、"可取消"标记继承三处都依赖 [`TypeHierarchy::is_ancestor_or_self`]。
//!
use crate::error::{EventBusError, EventBusResult as Result};
use crate::event::Event;
use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::time::Duration;

/// 事件类型在层级中的索引
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventType(u32);

impl EventType {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// 事件类型定义（配置期使用）
#[derive(Debug, Clone)]
pub struct EventDef {
    type_id: TypeId,
    name: &'static str,
    parent: Option<(TypeId, &'static str)>,
    cancellable: bool,
    delay_ms: i64,
}

impl EventDef {
    pub fn of<E: Event>(name: &'static str) -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            name,
            parent: None,
            cancellable: false,
            delay_ms: 0,
        }
    }

    /// 指定父类型（父类型需已定义）
    pub fn parent<P: Event>(mut self) -> Self {
        self.parent = Some((TypeId::of::<P>(), type_name::<P>()));
        self
    }

    /// 标记为可取消；该标记对所有子类型生效
    pub fn cancellable(mut self) -> Self {
        self.cancellable = true;
        self
    }

    /// 设置延迟（毫秒）。负值在分发时以 `InvalidDelay` 失败
    pub fn delay_ms(mut self, delay_ms: i64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn delay(self, delay: Duration) -> Self {
        let ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        self.delay_ms(ms)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[derive(Debug, Clone)]
struct TypeNode {
    name: &'static str,
    type_id: TypeId,
    parent: Option<EventType>,
    cancellable: bool,
    delay_ms: i64,
}

/// 事件类型层级
#[derive(Debug, Clone, Default)]
pub struct TypeHierarchy {
    nodes: Vec<TypeNode>,
    by_type_id: HashMap<TypeId, EventType>,
}

impl TypeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// 定义一个事件类型，返回其索引
    pub fn define(&mut self, def: EventDef) -> Result<EventType> {
        if self.by_type_id.contains_key(&def.type_id) {
            return Err(EventBusError::config(format!(
                "event type already defined: {}",
                def.name
            )));
        }

        let parent = match def.parent {
            Some((parent_id, parent_name)) => match self.by_type_id.get(&parent_id) {
                Some(p) => Some(*p),
                None => {
                    return Err(EventBusError::config(format!(
                        "parent of {} must be defined first: {}",
                        def.name, parent_name
                    )));
                }
            },
            None => None,
        };

        let id = EventType(self.nodes.len() as u32);
        self.nodes.push(TypeNode {
            name: def.name,
            type_id: def.type_id,
            parent,
            cancellable: def.cancellable,
            delay_ms: def.delay_ms,
        });
        self.by_type_id.insert(def.type_id, id);

        Ok(id)
    }

    pub fn lookup(&self, type_id: TypeId) -> Option<EventType> {
        self.by_type_id.get(&type_id).copied()
    }

    pub fn of<E: Event>(&self) -> Option<EventType> {
        self.lookup(TypeId::of::<E>())
    }

    pub fn contains(&self, ty: EventType) -> bool {
        ty.index() < self.nodes.len()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn name(&self, ty: EventType) -> &'static str {
        self.node(ty).map(|n| n.name).unwrap_or("<undefined>")
    }

    pub fn type_id(&self, ty: EventType) -> Option<TypeId> {
        self.node(ty).map(|n| n.type_id)
    }

    pub fn parent(&self, ty: EventType) -> Option<EventType> {
        self.node(ty).and_then(|n| n.parent)
    }

    /// 从 `ty` 自身开始，沿父指针走到根
    pub fn ancestors_or_self(&self, ty: EventType) -> impl Iterator<Item = EventType> + '_ {
        let start = self.contains(ty).then_some(ty);
        std::iter::successors(start, move |t| self.parent(*t))
    }

    /// `candidate` 是否等于 `ty` 或是其祖先
    pub fn is_ancestor_or_self(&self, candidate: EventType, ty: EventType) -> bool {
        self.ancestors_or_self(ty).any(|t| t == candidate)
    }

    /// 可取消标记可继承：自身或任一祖先带标记即可取消
    pub fn is_cancellable(&self, ty: EventType) -> bool {
        self.ancestors_or_self(ty)
            .any(|t| self.node(t).is_some_and(|n| n.cancellable))
    }

    /// 延迟不继承：只读取类型自身的配置
    pub fn delay_ms(&self, ty: EventType) -> i64 {
        self.node(ty).map(|n| n.delay_ms).unwrap_or(0)
    }

    fn node(&self, ty: EventType) -> Option<&TypeNode> {
        self.nodes.get(ty.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Base;
    impl Event for Base {}
    #[derive(Debug)]
    struct Derived;
    impl Event for Derived {}
    #[derive(Debug)]
    struct Leaf;
    impl Event for Leaf {}
    #[derive(Debug)]
    struct Sibling;
    impl Event for Sibling {}

    fn sample() -> (TypeHierarchy, [EventType; 4]) {
        let mut h = TypeHierarchy::new();
        let base = h.define(EventDef::of::<Base>("Base").cancellable()).unwrap();
        let derived = h
            .define(EventDef::of::<Derived>("Derived").parent::<Base>().delay_ms(50))
            .unwrap();
        let leaf = h
            .define(EventDef::of::<Leaf>("Leaf").parent::<Derived>())
            .unwrap();
        let sibling = h
            .define(EventDef::of::<Sibling>("Sibling").parent::<Base>())
            .unwrap();
        (h, [base, derived, leaf, sibling])
    }

    #[test]
    fn ancestor_walk_follows_parent_links() {
        let (h, [base, derived, leaf, sibling]) = sample();

        assert!(h.is_ancestor_or_self(leaf, leaf));
        assert!(h.is_ancestor_or_self(derived, leaf));
        assert!(h.is_ancestor_or_self(base, leaf));
        assert!(!h.is_ancestor_or_self(leaf, derived));
        assert!(!h.is_ancestor_or_self(sibling, leaf));
        assert!(!h.is_ancestor_or_self(derived, sibling));

        let chain: Vec<_> = h.ancestors_or_self(leaf).collect();
        assert_eq!(chain, vec![leaf, derived, base]);
        assert_eq!(h.parent(base), None);
    }

    #[test]
    fn cancellable_is_inherited_but_delay_is_not() {
        let (h, [base, derived, leaf, sibling]) = sample();

        assert!(h.is_cancellable(base));
        assert!(h.is_cancellable(leaf));
        assert!(h.is_cancellable(sibling));

        assert_eq!(h.delay_ms(base), 0);
        assert_eq!(h.delay_ms(derived), 50);
        assert_eq!(h.delay_ms(leaf), 0);
    }

    #[test]
    fn lookup_by_rust_type() {
        let (h, [base, _, leaf, _]) = sample();
        assert_eq!(h.of::<Base>(), Some(base));
        assert_eq!(h.of::<Leaf>(), Some(leaf));
        assert_eq!(h.name(leaf), "Leaf");
        assert_eq!(h.type_id(leaf), Some(TypeId::of::<Leaf>()));
        assert_eq!(h.len(), 4);
    }

    #[test]
    fn parent_must_be_defined_first() {
        let mut h = TypeHierarchy::new();
        let err = h
            .define(EventDef::of::<Derived>("Derived").parent::<Base>())
            .unwrap_err();
        assert!(matches!(err, EventBusError::Config { .. }));
        assert!(h.is_empty());
    }

    #[test]
    fn duplicate_definition_is_rejected() {
        let mut h = TypeHierarchy::new();
        h.define(EventDef::of::<Base>("Base")).unwrap();
        let err = h.define(EventDef::of::<Base>("Base")).unwrap_err();
        assert!(matches!(err, EventBusError::Config { .. }));
    }
}
