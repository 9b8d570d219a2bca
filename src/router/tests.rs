use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

type Inbox = Arc<Mutex<Vec<String>>>;

fn recording() -> (Inbox, impl Fn(&str) + Send + Sync + 'static) {
    let inbox: Inbox = Arc::new(Mutex::new(Vec::new()));
    let sink = inbox.clone();
    (inbox, move |text: &str| {
        sink.lock().unwrap().push(text.to_string());
    })
}

fn contents(inbox: &Inbox) -> Vec<String> {
    inbox.lock().unwrap().clone()
}

#[test]
fn route_delivers_then_sends() {
    let router = MessageRouter::new();
    let order: Inbox = Arc::new(Mutex::new(Vec::new()));
    let deliver_order = order.clone();
    let send_order = order.clone();
    router.register(
        "A",
        Registration::new(move |text| deliver_order.lock().unwrap().push(format!("deliver:{text}")))
            .with_sender(move |text| send_order.lock().unwrap().push(format!("send:{text}"))),
    );

    assert!(router.route("A", "hi"));
    assert_eq!(contents(&order), vec!["deliver:hi", "send:hi"]);
}

#[test]
fn route_without_sender_only_delivers() {
    let router = MessageRouter::new();
    let (inbox, deliver) = recording();
    router.register("A", Registration::new(deliver));
    assert!(!router.lookup("A").unwrap().has_sender());

    assert!(router.route("A", "hello"));
    assert_eq!(contents(&inbox), vec!["hello"]);
}

#[test]
fn later_registration_replaces_earlier() {
    let router = MessageRouter::new();
    let (first, deliver_a) = recording();
    let (second, deliver_b) = recording();
    router.register("A", Registration::new(deliver_a));
    router.register("A", Registration::new(deliver_b));

    router.route("A", "hi");
    assert!(contents(&first).is_empty());
    assert_eq!(contents(&second), vec!["hi"]);
}

#[test]
fn replacement_drops_previous_sender_too() {
    let router = MessageRouter::new();
    let sends = Arc::new(AtomicUsize::new(0));
    let counter = sends.clone();
    router.register(
        "A",
        Registration::new(|_| {}).with_sender(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    router.register("A", Registration::new(|_| {}));

    router.route("A", "turn left");
    assert_eq!(sends.load(Ordering::SeqCst), 0);
}

#[test]
fn route_to_unknown_device_is_silent() {
    let router = MessageRouter::new();
    let (inbox, deliver) = recording();
    router.register("A", Registration::new(deliver));

    assert!(!router.route("B", "hi"));
    assert!(!router.deliver("B", "hi"));
    assert!(contents(&inbox).is_empty());
}

#[test]
fn unregister_is_idempotent_and_stops_delivery() {
    let router = MessageRouter::new();
    let (inbox, deliver) = recording();
    router.register("A", Registration::new(deliver));
    router.unregister("A");
    router.unregister("A");
    router.unregister("never-registered");

    assert!(!router.route("A", "hi"));
    assert!(contents(&inbox).is_empty());
    assert!(!router.is_registered("A"));
}

#[test]
fn deliver_skips_sender() {
    let router = MessageRouter::new();
    let (shown, deliver) = recording();
    let (sent, send) = recording();
    router.register("A", Registration::new(deliver).with_sender(send));

    assert!(router.deliver("A", "from device"));
    assert_eq!(contents(&shown), vec!["from device"]);
    assert!(contents(&sent).is_empty());
}

#[test]
fn ids_are_not_normalized() {
    let router = MessageRouter::new();
    let (inbox, deliver) = recording();
    router.register("Arduino3", Registration::new(deliver));

    assert!(!router.route("arduino3", "x"));
    assert!(!router.route("Arduino3 ", "x"));
    assert!(router.route("Arduino3", "x"));
    assert_eq!(contents(&inbox), vec!["x"]);
}

#[test]
fn register_unregister_sequences_track_latest_handler() {
    let router = MessageRouter::new();
    let hits: Vec<Arc<AtomicUsize>> = (0..4).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    let register = |index: usize| {
        let counter = hits[index].clone();
        router.register(
            "A",
            Registration::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
    };

    register(0);
    register(1);
    router.route("A", "one");
    router.unregister("A");
    router.route("A", "dropped");
    register(2);
    register(3);
    router.route("A", "two");

    let counts: Vec<usize> = hits.iter().map(|c| c.load(Ordering::SeqCst)).collect();
    assert_eq!(counts, vec![0, 1, 0, 1]);
}

#[test]
fn handler_may_reenter_router() {
    let router = Arc::new(MessageRouter::new());
    let (inbox, deliver_b) = recording();
    router.register("B", Registration::new(deliver_b));
    let forward = router.clone();
    router.register(
        "A",
        Registration::new(move |text| {
            forward.route("B", text);
        }),
    );

    assert!(router.route("A", "relay"));
    assert_eq!(contents(&inbox), vec!["relay"]);
}

#[test]
fn concurrent_routes_see_registrations() {
    let router = Arc::new(MessageRouter::new());
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = delivered.clone();
    router.register(
        "A",
        Registration::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let router = router.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    router.route("A", "tick");
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(delivered.load(Ordering::SeqCst), 400);
}

#[test]
fn registered_ids_is_sorted_snapshot() {
    let router = MessageRouter::new();
    router.register("b", Registration::new(|_| {}));
    router.register("a", Registration::new(|_| {}));
    let ids = router.registered_ids();
    router.unregister("a");
    assert_eq!(ids, vec![DeviceId::from("a"), DeviceId::from("b")]);
    assert_eq!(router.registered_ids(), vec![DeviceId::from("b")]);
}

#[test]
fn overlay_shadows_and_release_restores() {
    let router = MessageRouter::new();
    let (chat, deliver_chat) = recording();
    let (voice, deliver_voice) = recording();
    let chat_token = router.overlay("A", Registration::new(deliver_chat));
    let voice_token = router.overlay("A", Registration::new(deliver_voice));
    assert_ne!(chat_token, voice_token);

    router.route("A", "one");
    assert!(router.release("A", voice_token));
    router.route("A", "two");

    assert_eq!(contents(&voice), vec!["one"]);
    assert_eq!(contents(&chat), vec!["two"]);
    assert!(!router.release("A", voice_token));
    assert!(router.release("A", chat_token));
    assert!(!router.is_registered("A"));
}

#[test]
fn releasing_shadowed_entry_keeps_top() {
    let router = MessageRouter::new();
    let (chat, deliver_chat) = recording();
    let (voice, deliver_voice) = recording();
    let chat_token = router.overlay("A", Registration::new(deliver_chat));
    let voice_token = router.overlay("A", Registration::new(deliver_voice));

    assert!(router.release("A", chat_token));
    router.route("A", "still voice");
    assert!(router.release("A", voice_token));

    assert_eq!(contents(&voice), vec!["still voice"]);
    assert!(contents(&chat).is_empty());
    assert!(router.registered_ids().is_empty());
}

#[test]
fn register_and_unregister_clear_overlays() {
    let router = MessageRouter::new();
    let (old, deliver_old) = recording();
    let (new, deliver_new) = recording();
    let token = router.overlay("A", Registration::new(deliver_old));
    router.register("A", Registration::new(deliver_new));
    assert!(!router.release("A", token));

    router.route("A", "x");
    assert_eq!(contents(&new), vec!["x"]);
    assert!(contents(&old).is_empty());

    router.overlay("A", Registration::new(|_| {}));
    router.unregister("A");
    assert!(!router.is_registered("A"));
}
