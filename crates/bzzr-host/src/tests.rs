//! End-to-end behaviour of the host over a loopback connection.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bzzr_net::{Connection, LocalConnection};
use serde_json::{Value, json};

use crate::payload::{DIRECT_MESSAGE, PARTICIPANTS_SNAPSHOT, SESSION_CREATED, SIGNALS_SNAPSHOT};
use crate::{ActionQueue, BzzrHost, HostEvent};

/// Host wired to a connected loopback, plus a log of every notification.
struct Harness {
    host: BzzrHost<LocalConnection>,
    seen: Arc<Mutex<Vec<HostEvent>>>,
}

impl Harness {
    fn new() -> Self {
        let host = BzzrHost::new(Arc::new(LocalConnection::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        host.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
        host.create_session();
        Self { host, seen }
    }

    fn deliver(&self, event: &str, payload: Value) {
        assert!(self.host.connection().deliver(event, payload));
    }

    /// Drain and return the notifications raised since the last call.
    fn tick(&self) -> Vec<HostEvent> {
        self.host.tick();
        std::mem::take(&mut *self.seen.lock().unwrap())
    }
}

fn names(events: &[HostEvent]) -> Vec<&'static str> {
    events.iter().map(HostEvent::name).collect()
}

fn player(id: &str, name: &str, status: &str) -> Value {
    json!({"userId": id, "name": name, "connectionStatus": status})
}

fn buzz(server: f64, local: f64) -> Value {
    json!({"serverSpeed": server, "localSpeed": local})
}

fn signal_order(h: &Harness) -> Vec<String> {
    h.host
        .signals()
        .iter()
        .map(|s| s.participant().to_string())
        .collect()
}

#[test]
fn test_same_snapshot_twice_raises_nothing_the_second_time() {
    let h = Harness::new();
    let players = json!([player("u1", "Ann", "connected"), player("u2", "Bob", "connected")]);
    let buzzes = json!({"u1": buzz(100.0, 90.0)});

    h.deliver(PARTICIPANTS_SNAPSHOT, players.clone());
    h.deliver(SIGNALS_SNAPSHOT, buzzes.clone());
    assert_eq!(h.tick().len(), 3);

    h.deliver(PARTICIPANTS_SNAPSHOT, players);
    h.deliver(SIGNALS_SNAPSHOT, buzzes);
    assert!(h.tick().is_empty());
    assert_eq!(h.host.participants().len(), 2);
    assert_eq!(h.host.signals().len(), 1);
}

#[test]
fn test_local_time_change_does_not_churn_signal() {
    let h = Harness::new();
    h.deliver(PARTICIPANTS_SNAPSHOT, json!([player("u1", "Ann", "connected")]));
    h.deliver(SIGNALS_SNAPSHOT, json!({"u1": buzz(100.0, 90.0)}));
    h.tick();

    h.deliver(SIGNALS_SNAPSHOT, json!({"u1": buzz(100.0, 95.0)}));
    assert!(h.tick().is_empty());
    assert_eq!(h.host.signals()[0].local_time(), Duration::from_millis(90));
}

#[test]
fn test_existing_signals_keep_arrival_order() {
    let h = Harness::new();
    h.deliver(
        PARTICIPANTS_SNAPSHOT,
        json!([
            player("a", "A", "connected"),
            player("b", "B", "connected"),
            player("c", "C", "connected"),
        ]),
    );
    h.deliver(SIGNALS_SNAPSHOT, json!({"b": buzz(300.0, 300.0)}));
    h.deliver(SIGNALS_SNAPSHOT, json!({"b": buzz(300.0, 300.0), "a": buzz(100.0, 100.0)}));
    assert_eq!(signal_order(&h), vec!["b", "a"]);

    // Faster timestamps and reordered payload keys never reorder existing signals.
    h.deliver(
        SIGNALS_SNAPSHOT,
        json!({"c": buzz(10.0, 10.0), "a": buzz(100.0, 100.0), "b": buzz(300.0, 300.0)}),
    );
    assert_eq!(signal_order(&h), vec!["b", "a", "c"]);
    assert_eq!(h.host.current_signal().unwrap().participant().as_str(), "b");
}

#[test]
fn test_signal_for_unknown_participant_ignored() {
    let h = Harness::new();
    h.deliver(PARTICIPANTS_SNAPSHOT, json!([player("u1", "Ann", "connected")]));
    h.tick();

    h.deliver(SIGNALS_SNAPSHOT, json!({"ghost": buzz(50.0, 50.0), "u1": buzz(80.0, 80.0)}));
    let events = h.tick();
    assert_eq!(names(&events), vec!["signal-raised"]);
    assert_eq!(signal_order(&h), vec!["u1"]);
}

#[test]
fn test_join_raised_exactly_once() {
    let h = Harness::new();
    for status in ["connected", "connected", "disconnected", "connected"] {
        h.deliver(PARTICIPANTS_SNAPSHOT, json!([player("u1", "Ann", status)]));
    }
    let events = h.tick();
    assert_eq!(
        names(&events),
        vec![
            "participant-joined",
            "participant-disconnected",
            "participant-reconnected",
        ]
    );
}

#[test]
fn test_omitted_participant_is_kicked() {
    let h = Harness::new();
    h.deliver(
        PARTICIPANTS_SNAPSHOT,
        json!([player("u1", "Ann", "connected"), player("u2", "Bob", "connected")]),
    );
    h.deliver(SIGNALS_SNAPSHOT, json!({"u2": buzz(120.0, 100.0)}));
    h.tick();

    h.deliver(PARTICIPANTS_SNAPSHOT, json!([player("u1", "Ann", "connected")]));
    let events = h.tick();
    assert_eq!(names(&events), vec!["participant-kicked", "signal-cleared"]);
    let HostEvent::ParticipantKicked(bob) = &events[0] else {
        panic!("expected a kick, got {:?}", events[0]);
    };
    assert_eq!(bob.display_name, "Bob");
    assert!(h.host.participant(&"u2".into()).is_none());
    assert!(!h.host.has_signals());

    // Gone for good: a later snapshot that brings the id back is a fresh join.
    h.deliver(
        PARTICIPANTS_SNAPSHOT,
        json!([player("u1", "Ann", "connected"), player("u2", "Bob", "connected")]),
    );
    assert_eq!(names(&h.tick()), vec!["participant-joined"]);
}

#[test]
fn test_concurrent_enqueue_keeps_per_thread_order() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 125;

    let queue = ActionQueue::new();
    let log = Arc::new(Mutex::new(Vec::with_capacity(THREADS * PER_THREAD)));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let sender = queue.sender();
            let log = Arc::clone(&log);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    let log = Arc::clone(&log);
                    assert!(sender.enqueue(move || log.lock().unwrap().push((t, i))));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(queue.drain_all(), THREADS * PER_THREAD);
    let log = log.lock().unwrap();
    assert_eq!(log.len(), THREADS * PER_THREAD);
    for t in 0..THREADS {
        let seq: Vec<_> = log.iter().filter(|(lt, _)| *lt == t).map(|(_, i)| *i).collect();
        assert_eq!(seq, (0..PER_THREAD).collect::<Vec<_>>());
    }
}

#[test]
fn test_snapshots_from_many_threads_notify_once_per_change() {
    let h = Arc::new(Harness::new());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let h = Arc::clone(&h);
            thread::spawn(move || {
                let id = format!("p{t}");
                h.host.connection().deliver(
                    PARTICIPANTS_SNAPSHOT,
                    json!([player("anchor", "Anchor", "connected"), player(&id, &id, "connected")]),
                );
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let events = h.tick();
    let joins = events
        .iter()
        .filter(|e| matches!(e, HostEvent::ParticipantJoined(p) if p.id().as_str() == "anchor"))
        .count();
    assert_eq!(joins, 1);
    // Every joined non-anchor participant that is no longer present was kicked once.
    let final_ids: Vec<_> = h.host.participants().iter().map(|p| p.id().to_string()).collect();
    assert_eq!(final_ids.len(), 2);
    let joined_others = events
        .iter()
        .filter(|e| matches!(e, HostEvent::ParticipantJoined(p) if p.id().as_str() != "anchor"))
        .count();
    let kicked = names(&events).iter().filter(|n| **n == "participant-kicked").count();
    assert_eq!(joined_others, 8);
    assert_eq!(kicked, 7);
}

#[test]
fn test_direct_message_updates_last_message_silently() {
    let h = Harness::new();
    h.deliver(PARTICIPANTS_SNAPSHOT, json!([player("u1", "Ann", "connected")]));
    h.tick();

    h.deliver(DIRECT_MESSAGE, json!({"playerId": "u1", "message": "my answer is 42"}));
    h.deliver(DIRECT_MESSAGE, json!({"playerId": "ghost", "message": "boo"}));
    assert!(h.tick().is_empty());
    assert_eq!(
        h.host.participant(&"u1".into()).unwrap().last_message.as_deref(),
        Some("my answer is 42")
    );
}

#[test]
fn test_notifications_only_during_tick() {
    let h = Harness::new();
    h.deliver(PARTICIPANTS_SNAPSHOT, json!([player("u1", "Ann", "connected")]));
    assert!(h.seen.lock().unwrap().is_empty());
    assert_eq!(names(&h.tick()), vec!["participant-joined"]);
}

#[test]
fn test_ann_end_to_end() {
    let h = Harness::new();

    h.deliver(PARTICIPANTS_SNAPSHOT, json!([player("u1", "Ann", "connected")]));
    let events = h.tick();
    assert_eq!(names(&events), vec!["participant-joined"]);
    assert_eq!(events[0].participant().unwrap().display_name, "Ann");

    h.deliver(PARTICIPANTS_SNAPSHOT, json!([player("u1", "Ann", "disconnected")]));
    let events = h.tick();
    assert_eq!(names(&events), vec!["participant-disconnected"]);
    assert!(!h.host.participant(&"u1".into()).unwrap().connected);

    h.deliver(SIGNALS_SNAPSHOT, json!({"u1": buzz(120.0, 100.0)}));
    let events = h.tick();
    assert_eq!(names(&events), vec!["signal-raised"]);
    let raised = events[0].signal().unwrap();
    assert_eq!(raised.participant().as_str(), "u1");
    assert_eq!(raised.server_time(), Duration::from_millis(120));

    let head = h.host.current_signal().unwrap();
    assert!(head.is_same_as(raised));
    assert_eq!(head.average_time(), Duration::from_millis(110));
}

#[test]
fn test_session_created_notification() {
    let h = Harness::new();
    h.deliver(
        SESSION_CREATED,
        json!({"roomCode": "QRST", "userId": "host-1"}),
    );
    let events = h.tick();
    assert!(matches!(&events[..], [HostEvent::SessionCreated { code }] if code == "QRST"));
    assert_eq!(h.host.session_code().as_deref(), Some("QRST"));
    assert!(h.host.diagnostics().to_string().contains("Room Code: QRST"));
}

#[test]
fn test_dropped_link_drops_requests() {
    let h = Harness::new();
    h.host.connection().drop_link();
    h.host.arm_signals();
    assert_eq!(h.host.connection().sent().len(), 1);
    assert_eq!(h.host.connection().state(), bzzr_net::ConnectionState::Disconnected);
}

#[test]
fn test_signal_before_its_participant_is_raised_on_next_snapshot() {
    let h = Harness::new();
    let buzzes = json!({"u1": buzz(150.0, 140.0)});

    h.deliver(SIGNALS_SNAPSHOT, buzzes.clone());
    assert!(h.tick().is_empty());
    assert!(!h.host.has_signals());

    h.deliver(PARTICIPANTS_SNAPSHOT, json!([player("u1", "Ann", "connected")]));
    assert_eq!(names(&h.tick()), vec!["participant-joined"]);

    h.deliver(SIGNALS_SNAPSHOT, buzzes);
    assert_eq!(names(&h.tick()), vec!["signal-raised"]);
    assert_eq!(signal_order(&h), vec!["u1"]);
}

#[test]
fn test_kick_racing_signal_snapshot_leaves_no_orphan_signal() {
    let h = Arc::new(Harness::new());
    let everyone = json!([player("u1", "Ann", "connected"), player("u2", "Bob", "connected")]);

    for round in 0..50 {
        h.deliver(PARTICIPANTS_SNAPSHOT, everyone.clone());
        h.tick();

        let kicker = {
            let h = Arc::clone(&h);
            thread::spawn(move || {
                h.host
                    .connection()
                    .deliver(PARTICIPANTS_SNAPSHOT, json!([player("u1", "Ann", "connected")]));
            })
        };
        let buzzer = {
            let h = Arc::clone(&h);
            thread::spawn(move || {
                h.host.connection().deliver(
                    SIGNALS_SNAPSHOT,
                    json!({"u1": buzz(100.0, 100.0), "u2": buzz(200.0 + f64::from(round), 90.0)}),
                );
            })
        };
        kicker.join().unwrap();
        buzzer.join().unwrap();

        for signal in h.host.signals() {
            assert!(
                h.host.participant(signal.participant()).is_some(),
                "round {round}: buzz left behind for {}",
                signal.participant()
            );
        }

        let events = h.tick();
        let for_bob = |name: &str| {
            events
                .iter()
                .filter(|e| e.name() == name)
                .filter(|e| e.signal().is_some_and(|s| s.participant().as_str() == "u2"))
                .count()
        };
        assert_eq!(for_bob("signal-raised"), for_bob("signal-cleared"), "round {round}");
        assert_eq!(names(&events).iter().filter(|n| **n == "participant-kicked").count(), 1);
    }
}

#[test]
fn test_snapshots_after_shutdown_leave_store_unchanged() {
    let h = Harness::new();
    h.deliver(PARTICIPANTS_SNAPSHOT, json!([player("u1", "Ann", "connected")]));
    h.deliver(SIGNALS_SNAPSHOT, json!({"u1": buzz(120.0, 100.0)}));
    assert_eq!(h.tick().len(), 2);

    h.host.shutdown();
    h.deliver(PARTICIPANTS_SNAPSHOT, json!([player("u2", "Bob", "connected")]));
    h.deliver(SIGNALS_SNAPSHOT, json!({}));
    h.deliver(DIRECT_MESSAGE, json!({"playerId": "u1", "message": "too late"}));

    assert!(h.tick().is_empty());
    let ids: Vec<_> = h.host.participants().iter().map(|p| p.id().to_string()).collect();
    assert_eq!(ids, vec!["u1"]);
    assert_eq!(signal_order(&h), vec!["u1"]);
    assert!(h.host.participant(&"u1".into()).unwrap().last_message.is_none());
}
