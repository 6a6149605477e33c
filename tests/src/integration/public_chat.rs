//! # Public Chat Flows

use super::harness::{chat, pump_until, Node};
use md_02_message_dispatch::testing::InMemoryNetwork;
use md_02_message_dispatch::{DispatchConfig, MessageDispatchApi, SendContext};
use shared_bus::{DispatchEvent, EventFilter, EventTopic};
use std::time::Duration;

#[tokio::test]
async fn test_public_message_reaches_members_and_echoes() {
    let network = InMemoryNetwork::new();
    let alice = Node::new(&network, DispatchConfig::for_testing());
    let bob = Node::new(&network, DispatchConfig::for_testing());
    let carol = Node::new(&network, DispatchConfig::for_testing());
    network.join_public("status", alice.key);
    network.join_public("status", bob.key);

    let mut public = alice.bus.subscribe(EventFilter::topics(vec![EventTopic::Public]));
    let id = alice
        .dispatcher
        .send_public(&SendContext::background(), "status", chat("hello status"))
        .await
        .unwrap();

    let received = pump_until(&[&alice, &bob, &carol], Duration::from_secs(1), |r| {
        !r[0].is_empty() && !r[1].is_empty()
    })
    .await;

    assert_eq!(received[1].len(), 1);
    assert_eq!(received[1][0].id, Some(id));
    assert!(!received[1][0].decrypted);
    assert!(!bob.dispatcher.is_own_message(&received[1][0]));

    assert_eq!(received[0].len(), 1);
    assert!(alice.dispatcher.is_own_message(&received[0][0]));
    assert!(received[2].is_empty());

    match public.recv().await {
        Some(DispatchEvent::PublicMessageSent {
            chat_name,
            message_id,
            ..
        }) => {
            assert_eq!(chat_name, "status");
            assert_eq!(message_id, id);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_public_send_requires_chat_name() {
    let network = InMemoryNetwork::new();
    let alice = Node::new(&network, DispatchConfig::for_testing());
    let result = alice
        .dispatcher
        .send_public(&SendContext::background(), "", chat("nowhere"))
        .await;
    assert!(result.is_err());
    assert!(network.sent().is_empty());
}
