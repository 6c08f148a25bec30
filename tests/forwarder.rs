//! Forwarder Integration Tests
//!
//! Runs the forwarder against an in-test MQTT broker speaking the crate's
//! own codec over real TCP sockets.

mod test_broker;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::time::timeout;

use docbridge::client::ClientError;
use docbridge::config::{Config, OverflowPolicy};
use docbridge::protocol::{ConnAck, ConnectReturnCode, Packet, PubAck, Publish, QoS};
use docbridge::store::{self, DocumentStore, FjallStore, MemoryStore, StoreError};
use docbridge::{Forwarder, StoredDocument};

use test_broker::TestBroker;

/// Fails the first `failures` inserts, then stores in memory
struct FlakyStore {
    inner: MemoryStore,
    failures: AtomicUsize,
}

#[async_trait]
impl DocumentStore for FlakyStore {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn insert_one(&self, document: &StoredDocument) -> store::Result<()> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Storage("connection reset".to_string()));
        }
        self.inner.insert_one(document).await
    }

    async fn ping(&self) -> store::Result<()> {
        Ok(())
    }

    async fn close(&self) -> store::Result<()> {
        Ok(())
    }
}

fn test_config(port: u16) -> Config {
    let mut config = Config::default();
    config.broker.host = "127.0.0.1".to_string();
    config.broker.port = Some(port);
    config.broker.client_id = "docbridge-it".to_string();
    config.broker.connect_timeout = Duration::from_secs(2);
    config.broker.reconnect_interval = Duration::from_millis(50);
    config.broker.max_reconnect_interval = Duration::from_millis(200);
    config.store.uri = "memory://".to_string();
    config
}

/// Wait until the store holds `count` documents
async fn wait_for_documents(store: &MemoryStore, count: usize) {
    let waited = timeout(Duration::from_secs(5), async {
        while store.len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(
        waited.is_ok(),
        "expected {} documents, found {}",
        count,
        store.len()
    );
}

#[tokio::test]
async fn test_every_topic_is_stored() {
    let broker = TestBroker::bind().await;
    let config = test_config(broker.port());
    let store = Arc::new(MemoryStore::new());
    let forwarder = Forwarder::new(&config, store.clone()).unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let broker_task = tokio::spawn(async move {
        let mut conn = broker.accept().await;
        let filter = conn.accept_session(QoS::AtMostOnce).await;
        conn.publish("a/b/c", "deep").await;
        conn.publish("x", "shallow").await;
        conn.publish("sensors/temp", "21.5").await;
        let last = conn.recv().await;
        (filter, last)
    });

    let driver = async {
        wait_for_documents(&store, 3).await;
        shutdown_tx.send(()).unwrap();
    };
    let (result, _) = tokio::join!(forwarder.run(shutdown_rx), driver);
    result.unwrap();

    let (filter, last) = broker_task.await.unwrap();
    assert_eq!(filter, "#");
    assert_eq!(last, Some(Packet::Disconnect));

    let docs = store.documents();
    let pairs: Vec<(&str, &str)> = docs
        .iter()
        .map(|d| (d.topic.as_str(), d.payload.as_str()))
        .collect();
    assert_eq!(
        pairs,
        vec![("a/b/c", "deep"), ("x", "shallow"), ("sensors/temp", "21.5")]
    );
}

#[tokio::test]
async fn test_invalid_utf8_is_skipped() {
    let broker = TestBroker::bind().await;
    let config = test_config(broker.port());
    let store = Arc::new(MemoryStore::new());
    let forwarder = Forwarder::new(&config, store.clone()).unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let broker_task = tokio::spawn(async move {
        let mut conn = broker.accept().await;
        conn.accept_session(QoS::AtMostOnce).await;
        conn.publish("bin", Bytes::from_static(&[0xff, 0xfe, 0xfd])).await;
        conn.publish("text", "ok").await;
        conn.recv().await
    });

    let driver = async {
        wait_for_documents(&store, 1).await;
        // Nothing more should arrive
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();
    };
    let (result, _) = tokio::join!(forwarder.run(shutdown_rx), driver);
    result.unwrap();
    broker_task.await.unwrap();

    let docs = store.documents();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].topic, "text");
}

#[tokio::test]
async fn test_qos1_messages_are_acknowledged() {
    let broker = TestBroker::bind().await;
    let mut config = test_config(broker.port());
    config.broker.qos = 1;
    let store = Arc::new(MemoryStore::new());
    let forwarder = Forwarder::new(&config, store.clone()).unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let broker_task = tokio::spawn(async move {
        let mut conn = broker.accept().await;
        conn.accept_session(QoS::AtLeastOnce).await;
        conn.send(Packet::Publish(Publish {
            dup: false,
            qos: QoS::AtLeastOnce,
            retain: false,
            topic: "meter/1".to_string(),
            packet_id: Some(42),
            payload: Bytes::from_static(b"1234"),
        }))
        .await;
        let ack = conn.recv().await;
        let last = conn.recv().await;
        (ack, last)
    });

    let driver = async {
        wait_for_documents(&store, 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(()).unwrap();
    };
    let (result, _) = tokio::join!(forwarder.run(shutdown_rx), driver);
    result.unwrap();

    let (ack, last) = broker_task.await.unwrap();
    assert_eq!(ack, Some(Packet::PubAck(PubAck { packet_id: 42 })));
    assert_eq!(last, Some(Packet::Disconnect));
}

#[tokio::test]
async fn test_refused_connection_is_fatal() {
    let broker = TestBroker::bind().await;
    let config = test_config(broker.port());
    let store = Arc::new(MemoryStore::new());
    let forwarder = Forwarder::new(&config, store.clone()).unwrap();
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

    tokio::spawn(async move {
        let mut conn = broker.accept().await;
        conn.recv().await;
        conn.send(Packet::ConnAck(ConnAck {
            session_present: false,
            return_code: ConnectReturnCode::BadUserNameOrPassword,
        }))
        .await;
        // Keep the socket open until the forwarder gives up
        conn.recv().await;
    });

    let result = forwarder.run(shutdown_rx).await;
    assert!(matches!(
        result,
        Err(ClientError::Rejected(ConnectReturnCode::BadUserNameOrPassword))
    ));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_unreachable_broker_is_fatal() {
    let port = {
        let broker = TestBroker::bind().await;
        broker.port()
    };
    let config = test_config(port);
    let forwarder = Forwarder::new(&config, Arc::new(MemoryStore::new())).unwrap();
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let result = timeout(Duration::from_secs(5), forwarder.run(shutdown_rx))
        .await
        .expect("Forwarder did not give up");
    assert!(matches!(result, Err(ClientError::Io(_))));
}

#[tokio::test]
async fn test_reconnects_after_connection_loss() {
    let broker = TestBroker::bind().await;
    let config = test_config(broker.port());
    let store = Arc::new(MemoryStore::new());
    let forwarder = Forwarder::new(&config, store.clone()).unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let broker_task = tokio::spawn(async move {
        let mut first = broker.accept().await;
        first.accept_session(QoS::AtMostOnce).await;
        first.publish("session", "first").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(first);

        let mut second = broker.accept().await;
        let filter = second.accept_session(QoS::AtMostOnce).await;
        second.publish("session", "second").await;
        let last = second.recv().await;
        (filter, last)
    });

    let driver = async {
        wait_for_documents(&store, 2).await;
        shutdown_tx.send(()).unwrap();
    };
    let (result, _) = tokio::join!(forwarder.run(shutdown_rx), driver);
    result.unwrap();

    let (filter, last) = broker_task.await.unwrap();
    assert_eq!(filter, "#");
    assert_eq!(last, Some(Packet::Disconnect));

    let payloads: Vec<String> = store.documents().into_iter().map(|d| d.payload).collect();
    assert_eq!(payloads, vec!["first", "second"]);
}

#[tokio::test]
async fn test_connection_loss_is_fatal_without_reconnect() {
    let broker = TestBroker::bind().await;
    let mut config = test_config(broker.port());
    config.broker.reconnect = false;
    let forwarder = Forwarder::new(&config, Arc::new(MemoryStore::new())).unwrap();
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

    tokio::spawn(async move {
        let mut conn = broker.accept().await;
        conn.accept_session(QoS::AtMostOnce).await;
        drop(conn);
    });

    let result = timeout(Duration::from_secs(5), forwarder.run(shutdown_rx))
        .await
        .expect("Forwarder did not stop");
    assert!(matches!(result, Err(ClientError::ConnectionLost(_))));
}

#[tokio::test]
async fn test_writer_pool_drains_on_shutdown() {
    let broker = TestBroker::bind().await;
    let mut config = test_config(broker.port());
    config.forwarder.workers = 3;
    config.forwarder.queue_capacity = 16;
    config.forwarder.overflow = OverflowPolicy::Block;
    let store = Arc::new(MemoryStore::new());
    let forwarder = Forwarder::new(&config, store.clone()).unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let broker_task = tokio::spawn(async move {
        let mut conn = broker.accept().await;
        conn.accept_session(QoS::AtMostOnce).await;
        for i in 0..60 {
            conn.publish(&format!("room/{}", i % 4), i.to_string()).await;
        }
        conn.recv().await
    });

    let driver = async {
        wait_for_documents(&store, 60).await;
        shutdown_tx.send(()).unwrap();
    };
    let (result, _) = tokio::join!(forwarder.run(shutdown_rx), driver);
    result.unwrap();
    broker_task.await.unwrap();

    let docs = store.documents();
    assert_eq!(docs.len(), 60);
    for room in 0..4 {
        let topic = format!("room/{}", room);
        let values: Vec<u32> = docs
            .iter()
            .filter(|d| d.topic == topic)
            .map(|d| d.payload.parse().unwrap())
            .collect();
        let mut sorted = values.clone();
        sorted.sort_unstable();
        assert_eq!(values, sorted, "order lost on {}", topic);
    }
}

#[tokio::test]
async fn test_fjall_store_end_to_end() {
    let temp_dir = tempfile::tempdir().unwrap();
    let broker = TestBroker::bind().await;
    let mut config = test_config(broker.port());
    config.store.uri = format!("fjall://{}", temp_dir.path().display());

    let store = store::open(&config.store).await.unwrap();
    let forwarder = Forwarder::new(&config, store).unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let broker_task = tokio::spawn(async move {
        let mut conn = broker.accept().await;
        conn.accept_session(QoS::AtMostOnce).await;
        conn.publish("sensors/temp", "21.5").await;
        conn.publish("sensors/temp", "21.5").await;
        // Give the forwarder time to write both before shutting it down
        tokio::time::sleep(Duration::from_millis(200)).await;
        conn
    });

    let driver = async {
        let conn = broker_task.await.unwrap();
        shutdown_tx.send(()).unwrap();
        conn
    };
    let (result, _conn) = tokio::join!(forwarder.run(shutdown_rx), driver);
    result.unwrap();

    let store = FjallStore::open(temp_dir.path(), "mqtt", "messages").unwrap();
    let docs = store.list().unwrap();
    assert_eq!(docs.len(), 2);
    assert!(docs
        .iter()
        .all(|d| d.topic == "sensors/temp" && d.payload == "21.5"));
}

#[tokio::test]
async fn test_store_failure_keeps_subscription_alive() {
    let broker = TestBroker::bind().await;
    let config = test_config(broker.port());
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::new(),
        failures: AtomicUsize::new(2),
    });
    let forwarder = Forwarder::new(&config, store.clone()).unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let broker_task = tokio::spawn(async move {
        let mut conn = broker.accept().await;
        conn.accept_session(QoS::AtMostOnce).await;
        conn.publish("sensors/temp", "20.0").await;
        conn.publish("sensors/temp", "20.5").await;
        conn.publish("sensors/temp", "21.5").await;
        conn.recv().await
    });

    let driver = async {
        wait_for_documents(&store.inner, 1).await;
        shutdown_tx.send(()).unwrap();
    };
    let (result, _) = tokio::join!(forwarder.run(shutdown_rx), driver);
    result.unwrap();

    // Still connected after both failures: the broker sees a clean DISCONNECT
    assert_eq!(broker_task.await.unwrap(), Some(Packet::Disconnect));

    let docs = store.inner.documents();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].payload, "21.5");
}
