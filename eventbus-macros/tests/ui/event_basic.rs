use eventbus::catalog::{Catalog, DeclareEvent};
use eventbus::event;
use eventbus::event::{CallerSlot, Event};

#[event(name = "chat", cancellable)]
struct Chat {
    text: String,
}

#[event(parent = Chat, delay_ms = 250)]
#[derive(Clone)]
struct Whisper {
    to: String,
    #[event(caller)]
    caller: CallerSlot,
}

#[event(parent = Chat)]
enum Shout {
    Loud(String),
    Quiet,
}

#[event(name = "tick", delay_ms = -1)]
struct Tick(u64, #[event(caller)] CallerSlot);

fn main() {
    let catalog = Catalog::new()
        .event::<Chat>()
        .and_then(|c| c.event::<Whisper>())
        .and_then(|c| c.event::<Shout>())
        .and_then(|c| c.event::<Tick>())
        .unwrap();

    let h = catalog.hierarchy();
    let chat = catalog.event_type_of::<Chat>().unwrap();
    let whisper = catalog.event_type_of::<Whisper>().unwrap();
    let shout = catalog.event_type_of::<Shout>().unwrap();
    let tick = catalog.event_type_of::<Tick>().unwrap();

    assert_eq!(h.name(chat), "chat");
    assert_eq!(h.name(whisper), "Whisper");
    assert_eq!(h.parent(whisper), Some(chat));
    assert_eq!(h.parent(shout), Some(chat));
    assert!(h.is_cancellable(whisper));
    assert!(!h.is_cancellable(tick));
    assert_eq!(h.delay_ms(whisper), 250);
    assert_eq!(h.delay_ms(chat), 0);
    assert_eq!(h.delay_ms(tick), -1);

    let w = Whisper {
        to: "bob".into(),
        caller: CallerSlot::new(),
    };
    assert!(w.caller_slot().is_some());
    assert!(w.clone().caller_slot().is_some_and(|s| !s.is_set()));
    assert!(Chat { text: "hi".into() }.caller_slot().is_none());
    assert!(Tick(1, CallerSlot::new()).caller_slot().is_some());
    let _ = format!("{:?} {:?}", Shout::Loud("x".into()), Shout::Quiet);
    let _ = (w.to, Chat::event_def().name());
}
