use eventbus::catalog::Catalog;
use eventbus::event::Event;
use eventbus::{event, listener};
use std::any::TypeId;
use std::sync::Arc;

#[event]
struct Ping;

#[derive(Default)]
struct Defaulted;

#[listener(name = "defaulted", default)]
impl Defaulted {
    #[handler]
    pub async fn on_ping(&self, _event: &Ping) -> anyhow::Result<()> {
        Ok(())
    }
}

struct Built {
    id: u32,
}

impl Built {
    fn make() -> Self {
        Built { id: 3 }
    }
}

#[listener(factory = Built::make)]
impl Built {
    #[subscribe]
    pub async fn on_ping(self: Arc<Self>, _event: Arc<Ping>) -> anyhow::Result<()> {
        let _ = self.id;
        Ok(())
    }
}

struct Ignored;

#[listener(excluded)]
impl Ignored {
    #[subscribe(Ping)]
    pub async fn on_ping(&self, _event: Arc<dyn Event>) -> anyhow::Result<()> {
        Ok(())
    }
}

fn main() {
    let catalog = Catalog::new()
        .event::<Ping>()
        .and_then(|c| c.listener::<Defaulted>())
        .and_then(|c| c.listener::<Built>())
        .and_then(|c| c.listener::<Ignored>())
        .unwrap();

    let defaulted = catalog.listener_type(TypeId::of::<Defaulted>()).unwrap();
    assert_eq!(defaulted.name(), "defaulted");
    assert!(defaulted.can_instantiate());

    let built = catalog.listener_type(TypeId::of::<Built>()).unwrap();
    assert!(built.can_instantiate());
    assert!(!built.is_excluded());

    let ignored = catalog.listener_type(TypeId::of::<Ignored>()).unwrap();
    assert!(ignored.is_excluded());
    assert!(!ignored.can_instantiate());
}
