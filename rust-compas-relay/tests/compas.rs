use bytes::Bytes;
use rust_compas_common::{
    ndn::{Data, Name},
    types::{Destination, InterfaceId, LinkAddr},
};
use rust_compas_relay::{
    compas::{CompasMessage, DodagFlags, DodagStatus, Pam, RANK_UNDEF, ROOT_RANK},
    suite::{ENC_COMPAS, SUITE_SWITCH},
    timer::TimerEvent,
    Interface, MemoryLink, Relay, RelayConfig, SentFrame,
};
use std::time::Duration;
use tokio::time::Instant;

const IF: InterfaceId = InterfaceId(1);

fn config(root: bool, prefix: &str) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.node.root = root;
    config.node.prefix = prefix.to_string();
    config.compas.pam_jitter_ms = 0;
    config
}

fn node(config: RelayConfig, addr: &str) -> (Relay, MemoryLink) {
    let _ = env_logger::builder().is_test(true).try_init();
    let link = MemoryLink::new();
    let iface = Interface::new(IF, LinkAddr::from(addr), 1500);
    let relay = Relay::new(config, link.clone(), vec![iface]).unwrap().with_seed(42);
    (relay, link)
}

fn compas(frame: &SentFrame) -> Option<CompasMessage> {
    if frame.frame.len() < 2 || frame.frame[0] != SUITE_SWITCH || frame.frame[1] != ENC_COMPAS {
        return None;
    }
    CompasMessage::decode(&mut frame.frame.slice(2..)).ok().flatten()
}

fn pam_from_root(prefix: &str) -> Bytes {
    CompasMessage::Pam(Pam {
        rank: ROOT_RANK,
        flags: DodagFlags::NONE,
        prefix: Name::from_string(prefix),
    })
    .encode()
    .unwrap()
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Attached child of "parent" holding /a/b, with a NAM budget of 2.
fn advertising_child() -> (Relay, MemoryLink, Instant) {
    let mut config = config(false, "/a");
    config.compas.nam_retries = 2;
    let (mut relay, link) = node(config, "child");
    let t0 = Instant::now();
    relay.start(t0);
    relay.receive_frame(IF, LinkAddr::from("parent"), pam_from_root("/a"), t0);
    assert_eq!(relay.dodag().status(), DodagStatus::Attached);
    assert!(relay.insert(Data::new(Name::from_string("/a/b"), &b"x"[..]), t0));
    (relay, link, t0)
}

#[test]
fn unpulled_name_exhausts_budget_and_floats() {
    let (mut relay, link, t0) = advertising_child();
    link.take_sent();

    relay.fire_due(t0 + ms(1000));
    assert!(relay.dodag().is_attached());
    relay.fire_due(t0 + ms(2000));

    let nams: Vec<_> = link
        .take_sent()
        .into_iter()
        .filter(|f| matches!(compas(f), Some(CompasMessage::Nam(_))))
        .collect();
    assert_eq!(nams.len(), 2);
    for frame in &nams {
        assert_eq!(frame.dest, Destination::Unicast(LinkAddr::from("parent")));
        match compas(frame) {
            Some(CompasMessage::Nam(nam)) => assert_eq!(nam.names, vec![Name::from_string("/a/b")]),
            other => panic!("unexpected {:?}", other),
        }
    }

    let dodag = relay.dodag();
    assert!(dodag.parent_timeout);
    assert!(dodag.flags.contains(DodagFlags::FLOATING));
    assert_eq!(dodag.nam_cache.get(&Name::from_string("/a/b")).unwrap().retries, 2);
    assert_eq!(relay.timers().armed(&TimerEvent::Nam), 0);
    assert_eq!(relay.metrics().parent_timeouts.value(), 1);
}

#[test]
fn timeout_replaces_solicitation_timer_once() {
    let (mut relay, link, t0) = advertising_child();
    relay.fire_due(t0 + ms(2000));
    assert!(relay.dodag().is_floating());
    assert_eq!(relay.timers().armed(&TimerEvent::Sol), 1);

    // a second timeout while floating changes nothing
    relay.parent_timeout(t0 + ms(2500));
    assert_eq!(relay.timers().armed(&TimerEvent::Sol), 1);
    assert_eq!(relay.metrics().parent_timeouts.value(), 1);
    link.take_sent();

    relay.fire_due(t0 + ms(2999));
    assert!(link.take_sent().iter().all(|f| !matches!(compas(f), Some(CompasMessage::Sol(_)))));

    relay.fire_due(t0 + ms(3000));
    let sols: Vec<_> = link
        .take_sent()
        .into_iter()
        .filter(|f| matches!(compas(f), Some(CompasMessage::Sol(_))))
        .collect();
    assert_eq!(sols.len(), 1);
}

#[test]
fn solicitation_unicast_then_broadcast() {
    let (mut relay, link, t0) = advertising_child();
    relay.fire_due(t0 + ms(2000));
    link.take_sent();

    let mut sols = Vec::new();
    for i in 1..=5u64 {
        relay.fire_due(t0 + ms(2000 + i * 1000));
        for frame in link.take_sent() {
            if let Some(CompasMessage::Sol(sol)) = compas(&frame) {
                sols.push((frame.dest, sol));
            }
        }
    }

    assert_eq!(sols.len(), 5);
    for (dest, sol) in &sols[..3] {
        assert_eq!(dest, &Destination::Unicast(LinkAddr::from("parent")));
        assert!(!sol.resets_trickle());
    }
    for (dest, sol) in &sols[3..] {
        assert_eq!(dest, &Destination::Broadcast);
        assert!(sol.resets_trickle());
    }
    assert_eq!(relay.dodag().sol_count, 5);
}

#[test]
fn unattached_node_broadcasts_solicitations() {
    let (mut relay, link) = node(config(false, "/compas"), "lonely");
    let t0 = Instant::now();
    relay.start(t0);
    relay.fire_due(t0 + ms(1000));

    let sent = link.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].dest, Destination::Broadcast);
    assert!(matches!(compas(&sent[0]), Some(CompasMessage::Sol(s)) if s.resets_trickle()));
    assert_eq!(relay.dodag().rank, RANK_UNDEF);
}

#[test]
fn new_pam_reattaches_floating_node() {
    let (mut relay, _link, t0) = advertising_child();
    relay.fire_due(t0 + ms(2000));
    assert!(relay.dodag().is_floating());

    relay.receive_frame(IF, LinkAddr::from("other"), pam_from_root("/a"), t0 + ms(2100));
    let dodag = relay.dodag();
    assert_eq!(dodag.status(), DodagStatus::Attached);
    assert_eq!(dodag.parent.as_ref().unwrap().addr, LinkAddr::from("other"));
    assert!(!dodag.flags.contains(DodagFlags::FLOATING));
    assert_eq!(dodag.sol_count, 0);
    assert_eq!(relay.timers().armed(&TimerEvent::Sol), 0);
    assert_eq!(relay.timers().armed(&TimerEvent::Nam), 1);
}

#[test]
fn trickle_solicitation_resets_parent_pam_interval() {
    let (mut root, link) = node(config(true, "/compas"), "root");
    let t0 = Instant::now();
    root.start(t0);
    // let the interval grow past its minimum
    root.fire_due(t0 + ms(3000));
    link.take_sent();

    let sol = CompasMessage::Sol(rust_compas_relay::compas::Sol::trickle()).encode().unwrap();
    root.receive_frame(IF, LinkAddr::from("child"), sol, t0 + ms(3000));
    root.fire_due(t0 + ms(3500));

    let pams = link
        .take_sent()
        .into_iter()
        .filter(|f| matches!(compas(f), Some(CompasMessage::Pam(_))))
        .count();
    assert_eq!(pams, 1);
}

/// Two nodes over memory links; frames are carried by hand.
struct Pair {
    root: (Relay, MemoryLink),
    child: (Relay, MemoryLink),
}

impl Pair {
    fn step(&mut self, at: Instant) {
        self.root.0.fire_due(at);
        self.child.0.fire_due(at);
        for _ in 0..16 {
            let up = self.child.1.take_sent();
            let down = self.root.1.take_sent();
            if up.is_empty() && down.is_empty() {
                return;
            }
            for frame in up {
                if frame.dest != Destination::Unicast(LinkAddr::from("child")) {
                    self.root.0.receive_frame(IF, LinkAddr::from("child"), frame.frame, at);
                }
            }
            for frame in down {
                if frame.dest != Destination::Unicast(LinkAddr::from("root")) {
                    self.child.0.receive_frame(IF, LinkAddr::from("root"), frame.frame, at);
                }
            }
        }
    }
}

#[test]
fn advertised_content_is_pulled_by_the_root() {
    pull_through_root(Name::from_string("/compas/sensor/1"));
}

#[test]
fn opaque_name_components_are_pulled_intact() {
    let name = Name::from_string("/compas")
        .child(Bytes::from_static(b"room 1"))
        .child(Bytes::from_static(&[0x00, 0x01]));
    pull_through_root(name);
}

fn pull_through_root(name: Name) {
    let mut pair = Pair {
        root: node(config(true, "/compas"), "root"),
        child: node(config(false, "/compas"), "child"),
    };
    let t0 = Instant::now();
    pair.root.0.start(t0);
    pair.child.0.start(t0);

    pair.step(t0 + ms(500));
    assert_eq!(pair.child.0.dodag().rank, ROOT_RANK + 1);

    assert!(pair.child.0.insert(Data::new(name.clone(), &b"21.5"[..]), t0 + ms(500)));

    pair.step(t0 + ms(1500));
    assert!(pair.root.0.cs().contains(&name));
    assert!(pair.root.0.fib().lookup(&name).is_some());
    assert!(pair.child.0.dodag().nam_cache.get(&name).unwrap().is_requested());
    assert!(pair.root.0.take_app_deliveries().is_empty());

    // the pulled name is not advertised again, so the child stays attached
    for s in 2..6 {
        pair.step(t0 + ms(500 + s * 1000));
    }
    assert!(pair.child.0.dodag().is_attached());
    assert_eq!(pair.child.0.metrics().nam_sent.value(), 1);
}
