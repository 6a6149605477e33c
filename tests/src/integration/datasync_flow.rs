//! # Replicated-Log Flows
//!
//! Messages sent over the replicated log reach each peer exactly once, even
//! when the first copies were encrypted for a device the peer no longer has.

use super::harness::{chat, init_logging, introduce, pump_for, pump_until, sent_between, Node};
use md_02_message_dispatch::testing::InMemoryNetwork;
use md_02_message_dispatch::{DispatchConfig, MessageDispatchApi, SendContext};
use shared_bus::{DispatchEvent, EventFilter, EventTopic};
use std::time::Duration;

const DELIVERY_LIMIT: Duration = Duration::from_secs(5);

// =============================================================================
// SESSION RECOVERY
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stale_bundle_is_recovered_and_delivered_once() {
    init_logging();
    let network = InMemoryNetwork::new();
    let alice = Node::new(&network, DispatchConfig::for_testing());
    let bob = Node::new(&network, DispatchConfig::for_testing());
    introduce(&alice, &bob);
    // Alice keeps the prekey of Bob's previous device.
    bob.encryption.rotate_device();

    alice.dispatcher.start().unwrap();
    bob.dispatcher.start().unwrap();

    let id = alice
        .dispatcher
        .send_private(&SendContext::background(), &bob.key, chat("after rotation"))
        .await
        .unwrap();

    let nodes = [&alice, &bob];
    let received = pump_until(&nodes, DELIVERY_LIMIT, |r| !r[1].is_empty()).await;
    let later = pump_for(&nodes, Duration::from_millis(300)).await;

    assert_eq!(received[1].len(), 1, "bob decodes the message");
    assert!(later[1].is_empty(), "retransmissions are deduplicated");
    assert!(received[0].is_empty() && later[0].is_empty());

    let message = &received[1][0];
    assert_eq!(message.id, Some(id));
    assert_eq!(message.signer, Some(alice.key));
    assert_eq!(message.application_payload, b"after rotation".to_vec());
    assert!(bob.encryption.last_advertised(&alice.key).is_some());

    alice.dispatcher.stop().await;
    bob.dispatcher.stop().await;
}

// =============================================================================
// DELIVERY
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_acknowledged_message_stops_retransmitting() {
    init_logging();
    let network = InMemoryNetwork::new();
    let alice = Node::new(&network, DispatchConfig::for_testing());
    let bob = Node::new(&network, DispatchConfig::for_testing());
    introduce(&alice, &bob);
    alice.dispatcher.start().unwrap();
    bob.dispatcher.start().unwrap();

    alice
        .dispatcher
        .send_private(&SendContext::background(), &bob.key, chat("ack me"))
        .await
        .unwrap();

    let nodes = [&alice, &bob];
    let received = pump_until(&nodes, DELIVERY_LIMIT, |r| !r[1].is_empty()).await;
    assert_eq!(received[1].len(), 1);

    // Let the ack land, then nothing more should go out to Bob.
    pump_for(&nodes, Duration::from_millis(300)).await;
    let settled = sent_between(&network, &alice.key, &bob.key);
    let later = pump_for(&nodes, Duration::from_millis(700)).await;

    assert_eq!(sent_between(&network, &alice.key, &bob.key), settled);
    assert!(later[1].is_empty());

    alice.dispatcher.stop().await;
    bob.dispatcher.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_group_send_reaches_every_member_with_one_id() {
    init_logging();
    let network = InMemoryNetwork::new();
    let alice = Node::new(&network, DispatchConfig::for_testing());
    let members: Vec<Node> = (0..3)
        .map(|_| Node::new(&network, DispatchConfig::for_testing()))
        .collect();
    let mut scheduled = alice.bus.subscribe(EventFilter::topics(vec![EventTopic::Scheduled]));

    alice.dispatcher.start().unwrap();
    for member in &members {
        introduce(&alice, member);
        member.dispatcher.start().unwrap();
    }

    let keys: Vec<_> = members.iter().map(|m| m.key).collect();
    let id = alice
        .dispatcher
        .send_group(&SendContext::background(), &keys, chat("hello group"))
        .await
        .unwrap();

    for _ in 0..keys.len() {
        match scheduled.recv().await {
            Some(DispatchEvent::MessageScheduled { message_id, .. }) => {
                assert_eq!(message_id, id)
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    let mut nodes = vec![&alice];
    nodes.extend(members.iter());
    let received = pump_until(&nodes, DELIVERY_LIMIT, |r| {
        r[1..].iter().all(|messages| !messages.is_empty())
    })
    .await;

    for messages in &received[1..] {
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, Some(id));
    }

    alice.dispatcher.stop().await;
    for member in &members {
        member.dispatcher.stop().await;
    }
}

// =============================================================================
// LIFECYCLE
// =============================================================================

#[tokio::test]
async fn test_stop_publishes_lifecycle_event_once() {
    let network = InMemoryNetwork::new();
    let node = Node::new(&network, DispatchConfig::for_testing());
    let mut lifecycle = node
        .bus
        .subscribe(EventFilter::topics(vec![EventTopic::Lifecycle]));

    node.dispatcher.start().unwrap();
    assert!(node.log.node().is_running());

    node.dispatcher.stop().await;
    node.dispatcher.stop().await;
    assert!(!node.log.node().is_running());

    assert_eq!(lifecycle.recv().await, Some(DispatchEvent::DispatcherStopped));
    assert_eq!(lifecycle.try_recv(), Ok(None));
}
