//! 不使用宏，手写类型目录
//!
//! 运行：`cargo run -p eventbus --example manual_catalog --no-default-features`
//!
use eventbus::bus::{EventBus, EventBusConfig};
use eventbus::catalog::Catalog;
use eventbus::event::Event;
use eventbus::failure::HandlerFailure;
use eventbus::hierarchy::EventDef;
use eventbus::listener::{ListenerDef, Marker, MethodDef};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct Deposit {
    cents: u64,
}
impl Event for Deposit {}

#[derive(Debug)]
struct LargeDeposit {
    cents: u64,
}
impl Event for LargeDeposit {}

#[derive(Default)]
struct Ledger {
    total: AtomicU64,
}

const HANDLES: Marker = Marker::new("handles");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut catalog = Catalog::new();
    catalog.define_event(EventDef::of::<Deposit>("Deposit"))?;
    catalog.define_event(EventDef::of::<LargeDeposit>("LargeDeposit").parent::<Deposit>())?;
    catalog.define_listener(
        ListenerDef::<Ledger>::new("Ledger")
            .method::<Deposit, _, _>(
                MethodDef::new("book").marker(HANDLES),
                |ledger: Arc<Ledger>, event| async move {
                    let cents = match (
                        event.downcast_ref::<Deposit>(),
                        event.downcast_ref::<LargeDeposit>(),
                    ) {
                        (Some(d), _) => d.cents,
                        (_, Some(d)) => d.cents,
                        _ => anyhow::bail!("unsupported event {event:?}"),
                    };
                    ledger.total.fetch_add(cents, Ordering::SeqCst);
                    Ok::<(), anyhow::Error>(())
                },
            )
            .method::<LargeDeposit, _, _>(
                MethodDef::new("flag").marker(HANDLES),
                |_ledger: Arc<Ledger>, _event| async move {
                    Err::<(), _>(anyhow::anyhow!("compliance service unavailable"))
                },
            ),
    )?;

    let bus = EventBus::builder()
        .catalog(catalog)
        .config(EventBusConfig {
            handler_marker: HANDLES,
            ..EventBusConfig::default()
        })
        .failure_sink(Arc::new(|f: &HandlerFailure| {
            eprintln!("handler {}::{} failed: {}", f.listener(), f.method(), f.error());
        }))
        .build();

    let ledger = Arc::new(Ledger::default());
    bus.register(ledger.clone());

    bus.dispatch(Arc::new(Deposit { cents: 1_250 })).await?;
    bus.dispatch(Arc::new(LargeDeposit { cents: 990_000 })).await?;

    println!("ledger total: {} cents", ledger.total.load(Ordering::SeqCst));
    Ok(())
}
