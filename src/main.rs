use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use relaymq::broker::Engine;
use relaymq::client::{ConnectionManager, ConsumerSession, Destination, ProducerSession};
use relaymq::codec::JsonCodec;
use relaymq::config::load_config;
use relaymq::observer::TracingObserver;
use relaymq::transport::WsConnector;
use relaymq::transport::websocket::start_websocket_server;
use relaymq::utils::logging;

#[derive(Debug, Serialize, Deserialize)]
struct Order {
    id: u64,
    item: String,
}

/// Demo: starts the dev broker, connects the facade to it over WebSocket,
/// subscribes to a queue and publishes one structured message.
fn main() {
    let _ = dotenvy::dotenv();
    let settings = load_config().expect("failed to load configuration");
    logging::init(&settings.log.level);

    let endpoint = settings.endpoint();
    let addr = endpoint
        .uri
        .trim_start_matches("ws://")
        .to_string();

    let engine = Arc::new(Mutex::new(Engine::new()));
    let runtime = tokio::runtime::Runtime::new().expect("failed to start runtime");
    let server_engine = engine.clone();
    runtime.spawn(async move {
        start_websocket_server(&addr, server_engine).await;
    });
    std::thread::sleep(Duration::from_millis(200));

    let connector = Arc::new(WsConnector::new());
    let observer = Arc::new(TracingObserver);

    let manager = Arc::new(ConnectionManager::new(connector.clone(), observer.clone()));
    manager
        .connect(&endpoint)
        .expect("failed to connect to the dev broker");
    tracing::info!("facade connected, alive = {}", manager.is_alive());

    let consumer = ConsumerSession::new(manager.clone(), observer.clone());
    let orders = Destination::queue("orders");
    consumer
        .subscribe_decoded(&orders, JsonCodec, |order: Order| {
            tracing::info!("received order {} for {}", order.id, order.item);
        })
        .expect("failed to subscribe");

    // Wait for the subscription to register with the dev broker.
    while !engine.lock().unwrap().has_route(&orders) {
        std::thread::sleep(Duration::from_millis(10));
    }

    let mut producer = ProducerSession::new(connector, observer).with_default_ttls(
        Duration::from_secs(settings.producer.queue_ttl_secs),
        Duration::from_secs(settings.producer.topic_ttl_secs),
    );
    producer.init(endpoint);
    producer
        .send_object(
            &orders,
            &Order {
                id: 1,
                item: "widget".to_string(),
            },
            &JsonCodec,
        )
        .expect("failed to send");

    std::thread::sleep(Duration::from_millis(500));
    manager.close();
    tracing::info!("facade closed, alive = {}", manager.is_alive());
}
