use rust_compas_common::{
    ndn::{Data, InterestOptions, InterestResult, Name},
    types::{InterfaceId, LinkAddr, MatchMode},
    Error,
};
use rust_compas_relay::{
    link::udp::UDP_INTERFACE, spawn, Interface, MemoryLink, Relay, RelayConfig, UdpLink,
};
use std::time::Duration;

fn memory_relay(config: RelayConfig) -> Relay {
    let _ = env_logger::builder().is_test(true).try_init();
    let iface = Interface::new(InterfaceId(1), LinkAddr::from("worker"), 1500);
    Relay::new(config, MemoryLink::new(), vec![iface]).unwrap()
}

#[tokio::test]
async fn requests_round_trip_through_the_worker() {
    let (handle, task) = spawn(memory_relay(RelayConfig::default()));
    let name = Name::from_string("/w/item");

    assert!(handle.insert(Data::new(name.clone(), &b"hello"[..])).await.unwrap());
    let found = handle.lookup(name.clone(), MatchMode::Exact).await.unwrap();
    assert_eq!(found.unwrap().content.as_ref(), b"hello");

    let mut waiter = handle.subscribe();
    let result = handle
        .send_interest(name.clone(), InterestOptions::default())
        .await
        .unwrap();
    assert_eq!(result, InterestResult::SatisfiedByCs);

    let mut buf = [0u8; 256];
    let len = waiter.wait_for_reply(&mut buf, Duration::from_secs(1)).await.unwrap();
    let expected = Data::new(name.clone(), &b"hello"[..]).encode();
    assert_eq!(&buf[..len], &expected[..]);

    assert!(handle.remove(name.clone()).await.unwrap());
    assert!(handle.lookup(name, MatchMode::Exact).await.unwrap().is_none());

    handle.shutdown().await.unwrap();
    let relay = task.await.unwrap();
    assert!(relay.cs().is_empty());
    assert_eq!(handle.metrics().cs_inserts.value(), 1);
}

#[tokio::test]
async fn waiting_for_missing_content_times_out() {
    let (handle, _task) = spawn(memory_relay(RelayConfig::default()));
    let mut waiter = handle.subscribe();

    let result = handle
        .send_interest(Name::from_string("/nowhere"), InterestOptions::default())
        .await
        .unwrap();
    assert_eq!(result, InterestResult::NoRoute);

    let mut buf = [0u8; 64];
    let err = waiter
        .wait_for_reply(&mut buf, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout));
}

#[tokio::test]
async fn handle_fails_once_worker_stops() {
    let (handle, task) = spawn(memory_relay(RelayConfig::default()));
    handle.shutdown().await.unwrap();
    task.await.unwrap();

    let err = handle.insert(Data::new(Name::from_string("/late"), &b""[..])).await;
    assert!(matches!(err, Err(Error::ChannelClosed)));
}

#[tokio::test]
async fn two_nodes_over_udp() {
    let mut root_config = RelayConfig::default();
    root_config.node.root = true;
    root_config.link.bind = "127.0.0.1:0".into();
    root_config.compas.pam_jitter_ms = 0;
    root_config.compas.trickle_imin_ms = 100;

    let mut leaf_config = RelayConfig::default();
    leaf_config.link.bind = "127.0.0.1:0".into();
    leaf_config.pit.retransmit_timeout_ms = 200;

    let mut root_link = UdpLink::bind(&root_config.link).await.unwrap();
    let mut leaf_link = UdpLink::bind(&leaf_config.link).await.unwrap();
    root_link.add_neighbour(leaf_link.local_addr().unwrap());
    leaf_link.add_neighbour(root_link.local_addr().unwrap());
    assert_eq!(root_link.interface().id, UDP_INTERFACE);

    let root = Relay::new(root_config, root_link.clone(), vec![root_link.interface()]).unwrap();
    let leaf = Relay::new(leaf_config, leaf_link.clone(), vec![leaf_link.interface()]).unwrap();
    let (root_handle, _root_task) = spawn(root);
    let (leaf_handle, _leaf_task) = spawn(leaf);
    root_link.spawn_receiver(root_handle.clone());
    leaf_link.spawn_receiver(leaf_handle.clone());

    let name = Name::from_string("/compas/greeting");
    assert!(root_handle.insert(Data::new(name.clone(), &b"hi"[..])).await.unwrap());

    // the first attempt may precede attachment; retransmission covers it
    let mut waiter = leaf_handle.subscribe();
    leaf_handle
        .send_interest(name.clone(), InterestOptions::default())
        .await
        .unwrap();
    let data = waiter.wait_for(&name, Duration::from_secs(3)).await.unwrap();
    assert_eq!(data.content.as_ref(), b"hi");
    assert!(leaf_handle.metrics().pam_received.value() >= 1);
}
