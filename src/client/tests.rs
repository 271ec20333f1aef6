use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::connection::ConnectionManager;
use super::consumer::ConsumerSession;
use super::endpoint::{BrokerEndpoint, Destination};
use super::message::Message;
use super::producer::ProducerSession;
use crate::broker::api::BrokerConnector;
use crate::broker::memory::InMemoryBroker;
use crate::codec::{Codec, JsonCodec};
use crate::observer::{BrokerEvent, EventLevel, EventObserver};
use crate::utils::error::{CodecError, ConnectError, SendError, SubscribeError};

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<BrokerEvent>>,
}

impl EventObserver for RecordingObserver {
    fn notify(&self, event: BrokerEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl RecordingObserver {
    fn count(&self, level: EventLevel, needle: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.level == level && e.message.contains(needle))
            .count()
    }
}

struct FailingCodec;

impl Codec for FailingCodec {
    fn encode<T: Serialize>(&self, _value: &T) -> Result<String, CodecError> {
        Err(CodecError("refused".to_string()))
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, _text: &str) -> Result<T, CodecError> {
        Err(CodecError("refused".to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Order {
    id: u64,
}

fn setup() -> (
    Arc<InMemoryBroker>,
    Arc<RecordingObserver>,
    Arc<ConnectionManager>,
) {
    let broker = Arc::new(InMemoryBroker::new());
    let observer = Arc::new(RecordingObserver::default());
    let manager = Arc::new(ConnectionManager::new(broker.clone(), observer.clone()));
    (broker, observer, manager)
}

fn endpoint() -> BrokerEndpoint {
    BrokerEndpoint::new("mem://local")
}

fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}

#[test]
fn test_connect_sets_liveness_and_interruption_clears_it() {
    let (broker, _observer, manager) = setup();

    manager.connect(&endpoint()).unwrap();
    assert!(manager.is_alive());

    broker.simulate_interruption();
    assert!(!manager.is_alive());
}

#[test]
fn test_broker_exception_clears_liveness_and_is_observed() {
    let (broker, observer, manager) = setup();
    manager.connect(&endpoint()).unwrap();

    broker.simulate_exception("socket reset");
    assert!(!manager.is_alive());
    assert_eq!(observer.count(EventLevel::Error, "socket reset"), 1);
}

#[test]
fn test_connect_is_idempotent_and_drains_previous_connection() {
    let (broker, _observer, manager) = setup();

    manager.connect(&endpoint()).unwrap();
    manager.connect(&endpoint()).unwrap();
    assert!(manager.is_alive());

    let counters = broker.counters();
    assert_eq!(counters.connections_opened.load(Ordering::SeqCst), 2);
    assert_eq!(counters.connections_closed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_connect_failure_is_surfaced_and_liveness_stays_false() {
    let (broker, _observer, manager) = setup();
    broker.set_unreachable(true);

    match manager.connect(&endpoint()) {
        Err(ConnectError::Unreachable(_)) => {}
        other => panic!("expected Unreachable, got {other:?}"),
    }
    assert!(!manager.is_alive());
}

#[test]
fn test_close_is_idempotent_and_releases_everything() {
    let (broker, _observer, manager) = setup();
    manager.connect(&endpoint()).unwrap();

    let consumer = ConsumerSession::new(manager.clone(), Arc::new(RecordingObserver::default()));
    consumer.subscribe(&Destination::queue("orders"), |_| {}).unwrap();

    manager.close();
    manager.close();
    consumer.close();
    manager.close();

    assert!(!manager.is_alive());
    assert_eq!(broker.subscriber_count(), 0);

    let counters = broker.counters();
    assert_eq!(
        counters.connections_opened.load(Ordering::SeqCst),
        counters.connections_closed.load(Ordering::SeqCst)
    );
    assert_eq!(
        counters.sessions_opened.load(Ordering::SeqCst),
        counters.sessions_closed.load(Ordering::SeqCst)
    );
    assert_eq!(
        counters.consumers_opened.load(Ordering::SeqCst),
        counters.consumers_closed.load(Ordering::SeqCst)
    );
}

#[test]
fn test_subscribe_requires_a_connection() {
    let (_broker, observer, manager) = setup();
    let consumer = ConsumerSession::new(manager, observer);

    let result = consumer.subscribe(&Destination::queue("orders"), |_| {});
    assert!(matches!(result, Err(SubscribeError::NotConnected)));
}

#[test]
fn test_second_subscribe_to_same_destination_is_rejected() {
    let (_broker, observer, manager) = setup();
    manager.connect(&endpoint()).unwrap();
    let consumer = ConsumerSession::new(manager, observer);

    let dest = Destination::queue("orders");
    consumer.subscribe(&dest, |_| {}).unwrap();
    match consumer.subscribe(&dest, |_| {}) {
        Err(SubscribeError::AlreadySubscribed(name)) => assert!(name.contains("orders")),
        other => panic!("expected AlreadySubscribed, got {other:?}"),
    }
}

#[test]
fn test_delivery_is_serialized_with_at_most_one_invocation_in_flight() {
    let (broker, observer, manager) = setup();
    manager.connect(&endpoint()).unwrap();
    let consumer = ConsumerSession::new(manager.clone(), observer.clone());

    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let handled = Arc::new(AtomicUsize::new(0));

    let dest = Destination::queue("orders");
    {
        let in_flight = in_flight.clone();
        let max_in_flight = max_in_flight.clone();
        let handled = handled.clone();
        consumer
            .subscribe(&dest, move |_text| {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(25));
                in_flight.fetch_sub(1, Ordering::SeqCst);
                handled.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    let mut producer = ProducerSession::new(broker.clone(), observer);
    producer.init(endpoint());
    for i in 0..5 {
        producer.send_text(&dest, &format!("message-{i}")).unwrap();
    }

    assert!(wait_until(Duration::from_secs(5), || {
        handled.load(Ordering::SeqCst) == 5
    }));
    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
}

#[test]
fn test_empty_and_whitespace_messages_skip_the_handler() {
    let (broker, observer, manager) = setup();
    manager.connect(&endpoint()).unwrap();
    let consumer = ConsumerSession::new(manager, observer.clone());

    let handled = Arc::new(AtomicUsize::new(0));
    let dest = Destination::queue("orders");
    {
        let handled = handled.clone();
        consumer
            .subscribe(&dest, move |_| {
                handled.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    let mut producer = ProducerSession::new(broker, observer.clone());
    producer.init(endpoint());
    producer.send_text(&dest, "   ").unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        observer.count(EventLevel::Warn, "empty message") == 1
    }));
    assert_eq!(handled.load(Ordering::SeqCst), 0);
}

#[test]
fn test_binary_messages_are_skipped_with_a_warning() {
    let (broker, observer, manager) = setup();
    manager.connect(&endpoint()).unwrap();
    let consumer = ConsumerSession::new(manager, observer.clone());

    let handled = Arc::new(AtomicUsize::new(0));
    let dest = Destination::queue("orders");
    {
        let handled = handled.clone();
        consumer
            .subscribe(&dest, move |_| {
                handled.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    let mut producer = ProducerSession::new(broker, observer.clone());
    producer.init(endpoint());
    producer.send(&dest, Message::bytes(vec![1, 2, 3])).unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        observer.count(EventLevel::Warn, "unsupported message type") == 1
    }));
    assert_eq!(handled.load(Ordering::SeqCst), 0);
}

#[test]
fn test_decode_failure_warns_and_does_not_stop_delivery() {
    let (broker, observer, manager) = setup();
    manager.connect(&endpoint()).unwrap();
    let consumer = ConsumerSession::new(manager, observer.clone());

    let (tx, rx) = std::sync::mpsc::channel::<Order>();
    let dest = Destination::queue("orders");
    consumer
        .subscribe_decoded(&dest, JsonCodec, move |order: Order| {
            let _ = tx.send(order);
        })
        .unwrap();

    let mut producer = ProducerSession::new(broker, observer.clone());
    producer.init(endpoint());
    producer.send_text(&dest, "not json").unwrap();
    producer
        .send_object(&dest, &Order { id: 7 }, &JsonCodec)
        .unwrap();

    // The malformed payload is warned about, the valid one still arrives.
    let order = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("valid message not delivered");
    assert_eq!(order, Order { id: 7 });
    assert_eq!(
        observer.count(EventLevel::Warn, "failed to decode message payload"),
        1
    );
}

#[test]
fn test_send_on_uninitialized_producer_makes_no_broker_calls() {
    let (broker, observer, _manager) = setup();
    let producer = ProducerSession::new(broker.clone(), observer);

    let result = producer.send_text(&Destination::queue("orders"), "hello");
    assert!(matches!(result, Err(SendError::NotInitialized)));

    let counters = broker.counters();
    assert_eq!(counters.connections_opened.load(Ordering::SeqCst), 0);
    assert_eq!(counters.messages_sent.load(Ordering::SeqCst), 0);
}

#[test]
fn test_encoding_failure_makes_no_broker_calls() {
    let (broker, observer, _manager) = setup();
    let mut producer = ProducerSession::new(broker.clone(), observer);
    producer.init(endpoint());

    let result = producer.send_object(&Destination::queue("orders"), &Order { id: 1 }, &FailingCodec);
    assert!(matches!(result, Err(SendError::EncodingFailed(_))));
    assert_eq!(
        broker.counters().connections_opened.load(Ordering::SeqCst),
        0
    );
}

#[test]
fn test_producer_releases_connection_session_and_producer_per_send() {
    let (broker, observer, _manager) = setup();
    let mut producer = ProducerSession::new(broker.clone(), observer);
    producer.init(endpoint());

    producer
        .send_text(&Destination::queue("orders"), "hello")
        .unwrap();

    let counters = broker.counters();
    assert_eq!(counters.connections_opened.load(Ordering::SeqCst), 1);
    assert_eq!(counters.connections_closed.load(Ordering::SeqCst), 1);
    assert_eq!(counters.sessions_opened.load(Ordering::SeqCst), 1);
    assert_eq!(counters.sessions_closed.load(Ordering::SeqCst), 1);
    assert_eq!(counters.producers_opened.load(Ordering::SeqCst), 1);
    assert_eq!(counters.producers_closed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_object_round_trip_reaches_only_the_matching_queue() {
    let (broker, observer, manager) = setup();
    manager.connect(&endpoint()).unwrap();
    let consumer = ConsumerSession::new(manager, observer.clone());

    let (orders_tx, orders_rx) = std::sync::mpsc::channel::<Order>();
    let invoices_handled = Arc::new(AtomicUsize::new(0));

    consumer
        .subscribe_decoded(&Destination::queue("orders"), JsonCodec, move |order| {
            let _ = orders_tx.send(order);
        })
        .unwrap();
    {
        let invoices_handled = invoices_handled.clone();
        consumer
            .subscribe(&Destination::queue("invoices"), move |_| {
                invoices_handled.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    let mut producer = ProducerSession::new(broker, observer);
    producer.init(endpoint());
    producer
        .send_object(&Destination::queue("orders"), &Order { id: 1 }, &JsonCodec)
        .unwrap();

    let order = orders_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("order not delivered");
    assert_eq!(order, Order { id: 1 });

    // Exactly one delivery to orders, none to invoices.
    assert!(orders_rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(invoices_handled.load(Ordering::SeqCst), 0);
}

#[test]
fn test_topic_fans_out_through_the_facade() {
    let (broker, observer, manager) = setup();
    manager.connect(&endpoint()).unwrap();

    // Two independent facades subscribing to the same topic.
    let manager_b = Arc::new(ConnectionManager::new(broker.clone(), observer.clone()));
    manager_b.connect(&endpoint()).unwrap();

    let consumer_a = ConsumerSession::new(manager, observer.clone());
    let consumer_b = ConsumerSession::new(manager_b, observer.clone());

    let dest = Destination::topic("alerts");
    let (tx_a, rx_a) = std::sync::mpsc::channel::<String>();
    let (tx_b, rx_b) = std::sync::mpsc::channel::<String>();
    consumer_a
        .subscribe(&dest, move |text| {
            let _ = tx_a.send(text.to_string());
        })
        .unwrap();
    consumer_b
        .subscribe(&dest, move |text| {
            let _ = tx_b.send(text.to_string());
        })
        .unwrap();

    let mut producer = ProducerSession::new(broker, observer);
    producer.init(endpoint());
    producer.send_text(&dest, "disk full").unwrap();

    assert_eq!(rx_a.recv_timeout(Duration::from_secs(2)).unwrap(), "disk full");
    assert_eq!(rx_b.recv_timeout(Duration::from_secs(2)).unwrap(), "disk full");
}

#[test]
fn test_unsubscribe_stops_delivery_and_is_safe_to_repeat() {
    let (broker, observer, manager) = setup();
    manager.connect(&endpoint()).unwrap();
    let consumer = ConsumerSession::new(manager, observer.clone());

    let handled = Arc::new(AtomicUsize::new(0));
    let dest = Destination::queue("orders");
    {
        let handled = handled.clone();
        consumer
            .subscribe(&dest, move |_| {
                handled.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    consumer.unsubscribe(&dest);
    consumer.unsubscribe(&dest);

    let mut producer = ProducerSession::new(broker, observer);
    producer.init(endpoint());
    producer.send_text(&dest, "late").unwrap();

    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(handled.load(Ordering::SeqCst), 0);
}

#[test]
fn test_resume_with_intact_session_restores_liveness() {
    let (broker, observer, manager) = setup();
    manager.connect(&endpoint()).unwrap();

    broker.simulate_interruption();
    assert!(!manager.is_alive());

    broker.simulate_resume();
    assert!(manager.is_alive());
    assert_eq!(observer.count(EventLevel::Info, "connection resumed"), 1);
}

#[test]
fn test_resume_with_dead_session_reconnects_and_resubscribes() {
    let (broker, observer, manager) = setup();
    manager.connect(&endpoint()).unwrap();
    let consumer = ConsumerSession::new(manager.clone(), observer.clone());

    let (tx, rx) = std::sync::mpsc::channel::<String>();
    let dest = Destination::queue("orders");
    consumer
        .subscribe(&dest, move |text| {
            let _ = tx.send(text.to_string());
        })
        .unwrap();

    broker.simulate_interruption();
    broker.invalidate_sessions();
    broker.simulate_resume();

    assert!(manager.is_alive());
    assert_eq!(
        broker.counters().connections_opened.load(Ordering::SeqCst),
        2
    );

    // The re-subscribed consumer still receives messages.
    let mut producer = ProducerSession::new(broker, observer);
    producer.init(endpoint());
    producer.send_text(&dest, "after failover").unwrap();
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(2)).unwrap(),
        "after failover"
    );
}

#[test]
fn test_default_ttl_depends_on_destination_kind() {
    let (broker, observer, _manager) = setup();

    // Observe raw messages behind the facade to check producer defaults.
    let connection = broker.create_connection("mem://local").unwrap();
    connection.start().unwrap();
    let session = connection
        .create_session(super::endpoint::AckMode::AutoAcknowledge)
        .unwrap();

    let (tx, rx) = std::sync::mpsc::channel::<Message>();
    let queue = Destination::queue("orders");
    let tx_q = tx.clone();
    let _consumer_q = session
        .create_consumer(
            &queue,
            Arc::new(move |message| {
                let _ = tx_q.send(message);
            }),
        )
        .unwrap();
    let topic = Destination::topic("alerts");
    let _consumer_t = session
        .create_consumer(
            &topic,
            Arc::new(move |message| {
                let _ = tx.send(message);
            }),
        )
        .unwrap();

    let mut producer = ProducerSession::new(broker, observer);
    producer.init(endpoint());
    producer.send_text(&queue, "work item").unwrap();
    producer.send_text(&topic, "broadcast").unwrap();

    let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    let (queue_msg, topic_msg) = if first.payload.as_text() == Some("work item") {
        (first, second)
    } else {
        (second, first)
    };
    assert_eq!(queue_msg.time_to_live, Some(Duration::from_secs(3600)));
    assert_eq!(topic_msg.time_to_live, Some(Duration::from_secs(1800)));
}
