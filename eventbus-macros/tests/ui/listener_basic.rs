use eventbus::catalog::Catalog;
use eventbus::event::Event;
use eventbus::listener::{Marker, Receiver, Visibility};
use eventbus::{event, listener};
use std::sync::Arc;

#[event(cancellable)]
struct Login {
    user: String,
}

#[event(parent = Login)]
struct AdminLogin {
    user: String,
}

const AUDIT: Marker = Marker::new("audit");

struct Audit;

#[listener]
impl Audit {
    #[subscribe]
    pub async fn on_login(&self, event: &Login) -> anyhow::Result<()> {
        let _ = &event.user;
        Ok(())
    }

    #[subscribe(Login)]
    pub async fn on_any_login(self: Arc<Self>, event: Arc<dyn Event>) -> anyhow::Result<()> {
        let _ = event;
        Ok(())
    }

    #[subscribe]
    #[marker("audit", AUDIT)]
    pub fn on_admin(&self, event: Arc<AdminLogin>) {
        let _ = &event.user;
    }

    #[handler(Login)]
    pub async fn direct(&self, _event: &dyn Event) -> anyhow::Result<()> {
        Ok(())
    }

    #[subscribe]
    #[exclude]
    pub async fn muted(&self, _event: &Login) -> anyhow::Result<()> {
        Ok(())
    }

    #[subscribe]
    async fn hidden(&self, _event: &Login) -> anyhow::Result<()> {
        Ok(())
    }

    #[subscribe(Login)]
    pub fn associated() {}

    #[subscribe(Login)]
    pub fn two(&self, _a: &Login, _b: u32) {}

    #[subscribe(Login)]
    #[allow(clippy::needless_arbitrary_self_type)]
    pub async fn typed(self: &Self, _event: &dyn Event) -> anyhow::Result<()> {
        Ok(())
    }

    pub fn helper(&self) -> usize {
        7
    }
}

fn main() {
    let catalog = Catalog::new()
        .event::<Login>()
        .and_then(|c| c.event::<AdminLogin>())
        .and_then(|c| c.listener::<Audit>())
        .unwrap();

    let ty = catalog
        .listener_type(std::any::TypeId::of::<Audit>())
        .unwrap();
    assert_eq!(ty.name(), "Audit");
    assert!(!ty.can_instantiate());

    let names: Vec<&str> = ty.methods().iter().map(|m| m.name()).collect();
    assert_eq!(
        names,
        vec![
            "on_login",
            "on_any_login",
            "on_admin",
            "direct",
            "muted",
            "hidden",
            "associated",
            "two",
            "typed"
        ]
    );

    let m = &ty.methods()[2];
    assert!(m.has_marker(Marker::SUBSCRIBE));
    assert!(m.has_marker(AUDIT));
    assert_eq!(m.param(), catalog.event_type_of::<AdminLogin>().unwrap());

    let direct = &ty.methods()[3];
    assert!(direct.markers().is_empty());
    assert!(direct.is_callable());

    assert!(ty.methods()[4].is_excluded());
    assert_eq!(ty.methods()[5].visibility(), Visibility::Private);
    assert_eq!(ty.methods()[6].receiver(), Receiver::Static);
    assert_eq!(ty.methods()[7].arity(), 2);
    assert!(!ty.methods()[7].is_callable());
    assert!(ty.methods()[8].is_callable());

    // 具体类型参数只接收该类型本身，dyn 参数接收整棵子树
    assert!(ty.methods()[0].is_exact());
    assert!(!ty.methods()[1].is_exact());
    assert!(ty.methods()[2].is_exact());
    assert!(!ty.methods()[3].is_exact());
    assert!(!ty.methods()[8].is_exact());

    assert_eq!(Audit.helper(), 7);
}
