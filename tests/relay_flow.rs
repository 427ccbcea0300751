//! End-to-end relay flow: ingress socket in, chat sends out.

mod common;

use common::{RecordingTransport, SECRET, Sent, send_ingress, start_relay, wait_until};
use relayd::db::MemoryStore;
use relayd::state::SubscriberId;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_register_then_broadcast() {
    let store = Arc::new(MemoryStore::new());
    let transport = RecordingTransport::new();
    let relay = start_relay(store.clone(), transport.clone()).await;
    let addr = relay.ingress_addr();

    // Startup notice went to nobody.
    assert_eq!(relay.dispatcher().stats().broadcasts, 1);
    assert_eq!(transport.sent_count(), 0);

    send_ingress(addr, b"launch notice").await;
    assert!(wait_until(WAIT, || relay.dispatcher().stats().broadcasts == 2).await);
    assert_eq!(transport.sent_count(), 0);

    transport.inject("42", &format!("/register:{SECRET}"));
    assert!(wait_until(WAIT, || transport.sent_count() == 1).await);
    assert_eq!(
        transport.sent(),
        vec![Sent::new("42", "You are added to the broadcast list.")]
    );
    assert_eq!(
        relay.registry().list_persisted().await.unwrap(),
        vec![SubscriberId::from("42")]
    );

    transport.clear();
    send_ingress(addr, b"deploy complete\n").await;
    assert!(wait_until(WAIT, || relay.dispatcher().stats().broadcasts == 3).await);
    assert!(wait_until(WAIT, || transport.sent_count() == 1).await);
    assert_eq!(transport.sent(), vec![Sent::new("42", "deploy complete")]);

    relay.stop().await;
}

#[tokio::test]
async fn test_wrong_secret_never_registers() {
    let store = Arc::new(MemoryStore::new());
    let transport = RecordingTransport::new();
    let relay = start_relay(store.clone(), transport.clone()).await;

    transport.inject("42", "/register:guess");
    transport.inject("42", "/register");
    // Inbound messages are handled in order; the /start reply marks the end.
    transport.inject("42", "/start");
    assert!(wait_until(WAIT, || transport.sent_count() == 1).await);

    assert_eq!(transport.sent(), vec![Sent::new("42", "Just say the word...")]);
    assert!(relay.registry().is_empty());
    assert_eq!(store.write_count(), 0);

    relay.stop().await;
}

#[tokio::test]
async fn test_forget_from_stranger_is_silent() {
    let store = Arc::new(MemoryStore::new());
    let transport = RecordingTransport::new();
    let relay = start_relay(store.clone(), transport.clone()).await;

    transport.inject("7", "/forget");
    transport.inject("7", "/users");
    transport.inject("7", "/start");
    assert!(wait_until(WAIT, || transport.sent_count() == 1).await);

    assert_eq!(transport.sent(), vec![Sent::new("7", "Just say the word...")]);
    assert_eq!(store.write_count(), 0);

    relay.stop().await;
}

#[tokio::test]
async fn test_forget_stops_deliveries() {
    let store = Arc::new(MemoryStore::new());
    let transport = RecordingTransport::new();
    let relay = start_relay(store.clone(), transport.clone()).await;
    let addr = relay.ingress_addr();

    transport.inject("42", &format!("/register:{SECRET}"));
    transport.inject("7", &format!("/register:{SECRET}"));
    transport.inject("7", "/forget");
    assert!(wait_until(WAIT, || transport.sent_count() == 3).await);
    assert_eq!(
        transport.sent()[2],
        Sent::new("7", "You are deleted from the broadcast list.")
    );
    assert_eq!(store.rows(), vec![SubscriberId::from("42")]);

    transport.clear();
    send_ingress(addr, b"only for 42").await;
    assert!(wait_until(WAIT, || transport.sent_count() == 1).await);
    assert_eq!(transport.sent(), vec![Sent::new("42", "only for 42")]);

    relay.stop().await;
}

#[tokio::test]
async fn test_users_lists_store() {
    let store = Arc::new(MemoryStore::with_rows(["100", "42"]));
    let transport = RecordingTransport::new();
    let relay = start_relay(store.clone(), transport.clone()).await;
    // Startup notice.
    assert!(wait_until(WAIT, || transport.sent_count() == 2).await);
    transport.clear();

    transport.inject("42", "/users");
    assert!(wait_until(WAIT, || transport.sent_count() == 1).await);
    assert_eq!(
        transport.sent(),
        vec![Sent::new(
            "42",
            "Current saved subscribers of the channel:\n 100\n 42\n"
        )]
    );

    relay.stop().await;
}

#[tokio::test]
async fn test_bad_ingress_payload_is_dropped() {
    let store = Arc::new(MemoryStore::with_rows(["42"]));
    let transport = RecordingTransport::new();
    let relay = start_relay(store, transport.clone()).await;
    let addr = relay.ingress_addr();
    assert!(wait_until(WAIT, || transport.sent_count() == 1).await);
    transport.clear();

    send_ingress(addr, &[0xff, 0xfe, 0xfd]).await;
    send_ingress(addr, b"   \n").await;
    // The empty message reaches the dispatcher but sends nothing.
    assert!(wait_until(WAIT, || relay.dispatcher().stats().broadcasts == 2).await);
    assert_eq!(transport.sent_count(), 0);

    send_ingress(addr, b"still serving").await;
    assert!(wait_until(WAIT, || transport.sent_count() == 1).await);
    assert_eq!(transport.sent(), vec![Sent::new("42", "still serving")]);

    relay.stop().await;
}

#[tokio::test]
async fn test_failed_recipient_does_not_block_others() {
    let store = Arc::new(MemoryStore::with_rows(["1", "2", "3"]));
    let transport = RecordingTransport::new();
    transport.fail_for("2");
    let relay = start_relay(store, transport.clone()).await;
    let addr = relay.ingress_addr();

    let before = relay.dispatcher().stats();
    send_ingress(addr, b"hello").await;
    assert!(wait_until(WAIT, || relay.dispatcher().stats().broadcasts == before.broadcasts + 1).await);
    assert!(wait_until(WAIT, || relay.dispatcher().stats().delivered == before.delivered + 2).await);

    let stats = relay.dispatcher().stats();
    assert_eq!(stats.failed, before.failed + 1);
    let hello: Vec<_> = transport
        .sent()
        .into_iter()
        .filter(|s| s.text == "hello")
        .collect();
    assert_eq!(hello.len(), 3);
    assert_eq!(relay.registry().len(), 3);

    relay.stop().await;
}
