// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for channel::multiplexer

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tetherlink_core::channel::*;
use tetherlink_core::runtime::MockTaskRunner;

const TETHER: &str = "magic_tether";
const OTHER: &str = "other_feature";

#[derive(Default)]
struct RecordingObserver {
    disconnects: Cell<usize>,
    messages: RefCell<Vec<Vec<u8>>>,
}

impl ClientChannelObserver for RecordingObserver {
    fn on_disconnected(&self) {
        self.disconnects.set(self.disconnects.get() + 1);
    }

    fn on_message_received(&self, payload: &[u8]) {
        self.messages.borrow_mut().push(payload.to_vec());
    }
}

struct Endpoint {
    connection: MultiplexedConnection,
    link: MockPhysicalLink,
    runner: Rc<MockTaskRunner>,
}

fn create_endpoint(remote_device_id: &str) -> Endpoint {
    let link = MockPhysicalLink::new();
    let runner = Rc::new(MockTaskRunner::new());
    let connection = MultiplexedConnection::new(
        remote_device_id,
        Box::new(link.clone()),
        Box::new(MockSecureContext),
        ConnectionMetadata {
            rssi: Some(-50),
            ..ConnectionMetadata::default()
        },
        runner.clone(),
    );
    Endpoint {
        connection,
        link,
        runner,
    }
}

fn open_channel(endpoint: &Endpoint, feature: &str) -> (ClientChannel, Rc<RecordingObserver>) {
    let channel = endpoint.connection.add_client_channel(feature).unwrap();
    let observer = Rc::new(RecordingObserver::default());
    channel.add_observer(observer.clone());
    (channel, observer)
}

/// Delivers everything `from` wrote to its link into `to`.
fn pump(from: &Endpoint, to: &Endpoint) {
    for frame in from.link.sent() {
        to.connection.on_bytes_received(&frame);
    }
}

#[test]
fn test_frames_reach_only_matching_feature() {
    let alice = create_endpoint("bob");
    let bob = create_endpoint("alice");
    let (alice_tether, _) = open_channel(&alice, TETHER);
    let (_bob_tether, bob_tether_observer) = open_channel(&bob, TETHER);
    let (_bob_other, bob_other_observer) = open_channel(&bob, OTHER);

    alice_tether.send_message(b"hello".to_vec(), || {}).unwrap();
    pump(&alice, &bob);

    assert_eq!(*bob_tether_observer.messages.borrow(), vec![b"hello".to_vec()]);
    assert!(bob_other_observer.messages.borrow().is_empty());
}

#[test]
fn test_outbound_frames_are_encoded() {
    let alice = create_endpoint("bob");
    let (channel, _) = open_channel(&alice, TETHER);

    channel.send_message(b"secret".to_vec(), || {}).unwrap();

    let sent = alice.link.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].starts_with(MockSecureContext::MARKER));
}

#[test]
fn test_features_share_one_link() {
    let alice = create_endpoint("bob");
    let (tether, _) = open_channel(&alice, TETHER);
    let (other, _) = open_channel(&alice, OTHER);

    tether.send_message(b"a".to_vec(), || {}).unwrap();
    other.send_message(b"b".to_vec(), || {}).unwrap();

    assert_eq!(alice.link.sent().len(), 2);
    assert_eq!(alice.connection.channel_count(TETHER), 1);
    assert_eq!(alice.connection.channel_count(OTHER), 1);
}

#[test]
fn test_write_confirmations_reach_sending_channel() {
    let alice = create_endpoint("bob");
    let (tether, _) = open_channel(&alice, TETHER);
    let (other, _) = open_channel(&alice, OTHER);
    let order = Rc::new(RefCell::new(Vec::new()));

    let log = order.clone();
    tether
        .send_message(b"a".to_vec(), move || log.borrow_mut().push(TETHER))
        .unwrap();
    let log = order.clone();
    other
        .send_message(b"b".to_vec(), move || log.borrow_mut().push(OTHER))
        .unwrap();

    alice.connection.on_bytes_sent();
    assert_eq!(*order.borrow(), vec![TETHER]);
    alice.connection.on_bytes_sent();
    assert_eq!(*order.borrow(), vec![TETHER, OTHER]);
}

#[test]
fn test_malformed_frames_are_dropped() {
    let bob = create_endpoint("alice");
    let (_channel, observer) = open_channel(&bob, TETHER);

    bob.connection.on_bytes_received(b"no marker");
    let mut garbage = MockSecureContext::MARKER.to_vec();
    garbage.extend_from_slice(&[0xFF; 3]);
    bob.connection.on_bytes_received(&garbage);

    assert!(observer.messages.borrow().is_empty());
    assert!(!bob.connection.is_disconnected());
}

#[test]
fn test_metadata_answered_from_later_task() {
    let alice = create_endpoint("bob");
    let (channel, _) = open_channel(&alice, TETHER);
    let received = Rc::new(RefCell::new(None));
    let slot = received.clone();

    channel
        .get_connection_metadata(move |metadata| *slot.borrow_mut() = Some(metadata))
        .unwrap();
    assert!(received.borrow().is_none());
    assert_eq!(alice.runner.pending_tasks(), 1);

    alice.runner.run_until_idle();

    let metadata = received.borrow().clone().unwrap();
    assert_eq!(metadata.rssi, Some(-50));
    assert_eq!(metadata.channel_binding_data, b"mock-binding".to_vec());
}

#[test]
fn test_updated_metadata_is_reported() {
    let alice = create_endpoint("bob");
    let (channel, _) = open_channel(&alice, TETHER);
    let received = Rc::new(RefCell::new(None));
    let slot = received.clone();

    alice.connection.update_connection_metadata(ConnectionMetadata {
        rssi: Some(-80),
        ..ConnectionMetadata::default()
    });
    channel
        .get_connection_metadata(move |metadata| *slot.borrow_mut() = Some(metadata))
        .unwrap();
    alice.runner.run_until_idle();

    assert_eq!(received.borrow().as_ref().unwrap().rssi, Some(-80));
}

#[test]
fn test_link_loss_disconnects_every_channel() {
    let alice = create_endpoint("bob");
    let (tether, tether_observer) = open_channel(&alice, TETHER);
    let (other, other_observer) = open_channel(&alice, OTHER);

    alice.connection.on_link_disconnected();

    assert!(alice.connection.is_disconnected());
    assert!(tether.is_disconnected());
    assert!(other.is_disconnected());
    assert_eq!(tether_observer.disconnects.get(), 1);
    assert_eq!(other_observer.disconnects.get(), 1);
    assert_eq!(
        alice.connection.add_client_channel(TETHER).err(),
        Some(ChannelError::Disconnected)
    );
}

#[test]
fn test_last_channel_drop_releases_link() {
    let alice = create_endpoint("bob");
    let (tether, _) = open_channel(&alice, TETHER);
    let (other, _) = open_channel(&alice, OTHER);

    drop(tether);
    assert!(!alice.link.was_disconnected());
    assert_eq!(alice.connection.channel_count(TETHER), 0);

    drop(other);
    assert!(alice.link.was_disconnected());
    assert!(alice.connection.is_disconnected());
}

#[test]
fn test_frame_for_feature_without_channel_is_ignored() {
    let alice = create_endpoint("bob");
    let bob = create_endpoint("alice");
    let (alice_other, _) = open_channel(&alice, OTHER);
    let (_bob_tether, bob_tether_observer) = open_channel(&bob, TETHER);

    alice_other.send_message(b"nobody listens".to_vec(), || {}).unwrap();
    pump(&alice, &bob);

    assert!(bob_tether_observer.messages.borrow().is_empty());
}

#[test]
fn test_remote_device_id() {
    let alice = create_endpoint("bob");

    assert_eq!(alice.connection.remote_device_id(), "bob");
}
