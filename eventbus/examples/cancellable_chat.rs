//! 聊天室示例：可取消的事件层级、标记限定与延迟分发
//!
//! 运行：`RUST_LOG=eventbus=debug cargo run -p eventbus --example cancellable_chat`
//!
use anyhow::Result as AnyResult;
use eventbus::bus::EventBus;
use eventbus::catalog::Catalog;
use eventbus::event::{CallerSlot, Event};
use eventbus::listener::Marker;
use eventbus::{event, listener};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const MODERATION: Marker = Marker::new("moderation");

#[event(cancellable)]
struct ChatMessage {
    from: String,
    text: String,
}

#[event(parent = ChatMessage)]
struct Whisper {
    from: String,
    to: String,
    text: String,
}

#[event(delay_ms = 200)]
struct Reminder {
    text: String,
    #[event(caller)]
    caller: CallerSlot,
}

#[derive(Default)]
struct Console;

#[listener(default)]
impl Console {
    #[subscribe(ChatMessage)]
    pub async fn on_chat(&self, event: Arc<dyn Event>) -> AnyResult<()> {
        if let Some(msg) = event.downcast_ref::<ChatMessage>() {
            println!("[chat] {}: {}", msg.from, msg.text);
        } else if let Some(w) = event.downcast_ref::<Whisper>() {
            println!("[whisper] {} -> {}: {}", w.from, w.to, w.text);
        }
        Ok(())
    }

    #[subscribe]
    pub async fn on_reminder(&self, event: &Reminder) -> AnyResult<()> {
        println!("[reminder] {}", event.text);
        Ok(())
    }
}

struct Moderator;

#[listener]
impl Moderator {
    #[marker(MODERATION)]
    pub async fn review(&self, event: &Whisper) -> AnyResult<()> {
        if event.text.contains("spam") {
            anyhow::bail!("whisper from {} rejected", event.from);
        }
        println!("[moderator] whisper from {} approved", event.from);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let catalog = Catalog::new()
        .event::<ChatMessage>()?
        .event::<Whisper>()?
        .event::<Reminder>()?
        .listener::<Console>()?
        .listener::<Moderator>()?;
    let bus = EventBus::with_catalog(catalog);
    bus.register(Arc::new(Console));
    bus.register(Arc::new(Moderator));

    bus.dispatch(Arc::new(ChatMessage {
        from: "ann".into(),
        text: "hello".into(),
    }))
    .await?;
    bus.dispatch(Arc::new(Whisper {
        from: "bob".into(),
        to: "ann".into(),
        text: "psst".into(),
    }))
    .await?;

    // 阻断整个聊天层级，Whisper 随之被阻断
    bus.cancel::<ChatMessage>()?;
    bus.dispatch(Arc::new(Whisper {
        from: "bob".into(),
        to: "ann".into(),
        text: "nobody hears this".into(),
    }))
    .await?;
    bus.uncancel::<ChatMessage>()?;

    // 只让审核方法参与，失败交给默认的日志接收方
    bus.set_restricted_to_marker(MODERATION);
    bus.dispatch(Arc::new(Whisper {
        from: "eve".into(),
        to: "ann".into(),
        text: "buy spam".into(),
    }))
    .await?;
    bus.set_unrestricted();

    let reminder = Arc::new(Reminder {
        text: "stand-up in 5 minutes".into(),
        caller: CallerSlot::new(),
    });
    bus.dispatch(reminder.clone()).await?;
    println!("reminder scheduled, pending={}", bus.pending());

    bus.join().await;
    println!(
        "reminder delivered by this bus: {}",
        reminder.caller.get().is_some_and(|b| b.same_bus(&bus))
    );
    Ok(())
}
