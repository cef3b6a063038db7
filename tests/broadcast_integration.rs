//! Registry and dispatcher behaviour exercised through the public API,
//! without a network listener.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use chat_relay::broadcast::{BroadcastDispatcher, ChatMessage, DeliveryResult};
use chat_relay::connection_manager::{ConnectionHandle, ConnectionManager, ConnectionState};
use chat_relay::websocket::{ChatEvent, OutboundMessage};

struct TestClient {
    handle: Arc<ConnectionHandle>,
    rx: mpsc::Receiver<OutboundMessage>,
}

impl TestClient {
    fn connect(manager: &ConnectionManager, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = tokio_test::assert_ok!(manager.register(tx));
        Self { handle, rx }
    }

    fn id(&self) -> Uuid {
        self.handle.id
    }

    /// Drain every chat payload currently queued
    fn received(&mut self) -> Vec<String> {
        let mut payloads = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                OutboundMessage::Event(event) => payloads.push(event.into_payload()),
                OutboundMessage::Preserialized(json) => payloads.push(
                    serde_json::from_str::<ChatEvent>(&json)
                        .unwrap()
                        .into_payload(),
                ),
                OutboundMessage::Ping => {}
            }
        }
        payloads
    }
}

fn setup() -> (Arc<ConnectionManager>, BroadcastDispatcher) {
    let manager = Arc::new(ConnectionManager::new());
    let dispatcher = BroadcastDispatcher::new(manager.clone());
    (manager, dispatcher)
}

fn registered_ids(manager: &ConnectionManager) -> HashSet<Uuid> {
    manager.snapshot().iter().map(|h| h.id).collect()
}

mod scenarios {
    use super::*;

    #[test]
    fn test_every_client_receives_hello() {
        let (manager, dispatcher) = setup();
        let mut x = TestClient::connect(&manager, 8);
        let mut y = TestClient::connect(&manager, 8);
        let mut z = TestClient::connect(&manager, 8);

        let result = dispatcher.dispatch(ChatMessage::new(x.id(), "hello"));

        assert_eq!(result, DeliveryResult { delivered: 3, evicted: 0 });
        assert_eq!(x.received(), vec!["hello"]);
        assert_eq!(y.received(), vec!["hello"]);
        assert_eq!(z.received(), vec!["hello"]);
    }

    #[test]
    fn test_closed_transport_is_removed_without_affecting_sender() {
        let (manager, dispatcher) = setup();
        let mut x = TestClient::connect(&manager, 8);
        let y = TestClient::connect(&manager, 8);
        let y_id = y.id();
        let y_handle = y.handle.clone();

        // Y's transport goes away without a disconnect event
        drop(y.rx);

        let result = dispatcher.dispatch(ChatMessage::new(x.id(), "ping"));

        assert_eq!(result, DeliveryResult { delivered: 1, evicted: 1 });
        assert_eq!(x.received(), vec!["ping"]);
        assert!(!manager.contains(y_id));
        assert_eq!(y_handle.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_send_after_disconnect_is_noop() {
        let (manager, dispatcher) = setup();
        let x = TestClient::connect(&manager, 8);
        let x_id = x.id();

        manager.unregister(x_id);
        let result = dispatcher.dispatch(ChatMessage::new(x_id, "anyone?"));

        assert_eq!(result, DeliveryResult::default());
        assert!(manager.is_empty());
    }
}

mod properties {
    use super::*;

    #[test]
    fn test_snapshot_matches_connected_minus_disconnected() {
        let (manager, _) = setup();
        let mut clients = Vec::new();
        let mut expected = HashSet::new();

        // Interleave connects and disconnects
        for round in 0..10 {
            let client = TestClient::connect(&manager, 1);
            expected.insert(client.id());
            clients.push(client);

            if round % 3 == 2 {
                let leaving = clients.remove(0);
                manager.unregister(leaving.id());
                expected.remove(&leaving.id());
            }
            assert_eq!(registered_ids(&manager), expected);
        }
    }

    #[test]
    fn test_failure_isolated_to_full_queue() {
        let (manager, dispatcher) = setup();
        let mut healthy: Vec<TestClient> =
            (0..5).map(|_| TestClient::connect(&manager, 16)).collect();
        let slow = TestClient::connect(&manager, 1);

        dispatcher.dispatch(ChatMessage::new(healthy[0].id(), "first"));
        let result = dispatcher.dispatch(ChatMessage::new(healthy[0].id(), "second"));

        assert_eq!(result, DeliveryResult { delivered: 5, evicted: 1 });
        assert!(!manager.contains(slow.id()));
        for client in healthy.iter_mut() {
            assert_eq!(client.received(), vec!["first", "second"]);
        }
    }

    #[test]
    fn test_per_target_fifo() {
        let (manager, dispatcher) = setup();
        let mut a = TestClient::connect(&manager, 64);
        let mut b = TestClient::connect(&manager, 64);

        let expected: Vec<String> = (0..20).map(|i| format!("m{}", i)).collect();
        for (i, payload) in expected.iter().enumerate() {
            let origin = if i % 2 == 0 { a.id() } else { b.id() };
            dispatcher.dispatch(ChatMessage::new(origin, payload.clone()));
        }

        assert_eq!(a.received(), expected);
        assert_eq!(b.received(), expected);
    }

    #[test]
    fn test_unregister_twice_same_as_once() {
        let (manager, _) = setup();
        let a = TestClient::connect(&manager, 1);
        let b = TestClient::connect(&manager, 1);

        manager.unregister(a.id());
        let once = registered_ids(&manager);
        manager.unregister(a.id());

        assert_eq!(registered_ids(&manager), once);
        assert_eq!(once, HashSet::from([b.id()]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_dispatch_and_churn() {
        let manager = Arc::new(ConnectionManager::new());
        let dispatcher = Arc::new(BroadcastDispatcher::new(manager.clone()));

        let mut stable = TestClient::connect(&manager, 1024);

        let churn = {
            let manager = manager.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let (tx, _rx) = mpsc::channel(1);
                    let handle = manager.register(tx).unwrap();
                    tokio::task::yield_now().await;
                    manager.unregister(handle.id);
                }
            })
        };

        let senders: Vec<_> = (0..4)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        dispatcher.dispatch(ChatMessage::new(Uuid::new_v4(), "x"));
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        churn.await.unwrap();
        for sender in senders {
            sender.await.unwrap();
        }

        assert_eq!(stable.received().len(), 200);
        assert_eq!(registered_ids(&manager), HashSet::from([stable.id()]));
        assert_eq!(dispatcher.stats().total_dispatched, 200);
    }
}
