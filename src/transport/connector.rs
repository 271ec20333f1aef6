//! WebSocket-backed implementation of the broker boundary.
//!
//! [`WsConnector`] speaks the dev-broker JSON wire to any server exposing
//! it. Every connection owns a private tokio runtime hosting two tasks: a
//! writer loop draining an outbound channel into the socket, and a read
//! loop dispatching inbound delivery frames to the registered consumer
//! listeners. The read loop is the only thing that invokes listeners, so
//! delivery stays serialized per connection. Termination of the read loop
//! without an explicit close fires the interrupted callback.
//!
//! The connector API is synchronous and must not be called from inside an
//! async context; `create_connection` blocks on the handshake.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tungstenite::protocol::Message as WsMessage;
use url::Url;

use crate::broker::api::{
    BrokerConnection, BrokerConnector, BrokerConsumer, BrokerProducer, BrokerSession,
    ConnectionEvents, MessageListener,
};
use crate::client::endpoint::{AckMode, Destination};
use crate::client::message::{Message, Payload};
use crate::transport::message::{ClientFrame, ServerFrame};
use crate::utils::error::{CloseError, ConnectError, SendError, SubscribeError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector for brokers speaking the dev-broker WebSocket wire.
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

struct WsShared {
    consumers: Mutex<HashMap<Destination, MessageListener>>,
    events: Mutex<ConnectionEvents>,
    closed: AtomicBool,
}

impl BrokerConnector for WsConnector {
    fn create_connection(&self, uri: &str) -> Result<Box<dyn BrokerConnection>, ConnectError> {
        let url = Url::parse(uri)
            .map_err(|e| ConnectError::Unreachable(format!("invalid broker uri {uri}: {e}")))?;

        let runtime = Runtime::new().map_err(|e| ConnectError::Unreachable(e.to_string()))?;
        let timeout = self.connect_timeout;
        let stream = runtime.block_on(async move {
            match tokio::time::timeout(timeout, connect_async(url.as_str())).await {
                Ok(Ok((ws, _response))) => Ok(ws),
                Ok(Err(e)) => Err(ConnectError::Unreachable(e.to_string())),
                Err(_) => Err(ConnectError::Timeout),
            }
        })?;

        let (ws_sender, ws_receiver) = stream.split();
        let (writer, writer_rx) = mpsc::unbounded_channel::<WsMessage>();

        let shared = Arc::new(WsShared {
            consumers: Mutex::new(HashMap::new()),
            events: Mutex::new(ConnectionEvents::noop()),
            closed: AtomicBool::new(false),
        });

        runtime.spawn(writer_loop(writer_rx, ws_sender));
        runtime.spawn(read_loop(ws_receiver, shared.clone()));

        Ok(Box::new(WsConnection {
            _runtime: runtime,
            writer,
            shared,
            client_id: Mutex::new(String::new()),
            request_timeout: Mutex::new(Duration::from_secs(20)),
        }))
    }
}

async fn writer_loop(
    mut rx: mpsc::UnboundedReceiver<WsMessage>,
    mut sender: SplitSink<WsStream, WsMessage>,
) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = sender.send(msg).await {
            tracing::warn!("websocket send failed: {e}");
            break;
        }
    }
    let _ = sender.close().await;
}

async fn read_loop(mut receiver: SplitStream<WsStream>, shared: Arc<WsShared>) {
    while let Some(result) = receiver.next().await {
        match result {
            Ok(msg) if msg.is_text() => {
                let text = msg.to_text().unwrap_or_default();
                match serde_json::from_str::<ServerFrame>(text) {
                    Ok(ServerFrame::Delivery {
                        destination,
                        payload,
                        headers,
                        ..
                    }) => {
                        // Clone the listener out and release the registry
                        // before invoking: handlers may re-enter the
                        // consumer surface, e.g. to unsubscribe themselves.
                        let listener = shared
                            .consumers
                            .lock()
                            .unwrap()
                            .get(&destination)
                            .cloned();
                        match listener {
                            Some(listener) => {
                                let mut message = Message::text(payload);
                                message.headers = headers;
                                listener(message);
                            }
                            None => {
                                tracing::debug!("delivery for unknown destination {destination}");
                            }
                        }
                    }
                    Err(e) => tracing::warn!("invalid server frame: {e}"),
                }
            }
            Ok(msg) if msg.is_close() => break,
            Ok(_) => {}
            Err(e) => {
                let events = shared.events.lock().unwrap().clone();
                (events.on_exception)(e.to_string());
                break;
            }
        }
    }

    if !shared.closed.load(Ordering::SeqCst) {
        let events = shared.events.lock().unwrap().clone();
        (events.on_interrupted)();
    }
}

struct WsConnection {
    // Keeps the writer and read loops alive for the connection lifetime.
    _runtime: Runtime,
    writer: UnboundedSender<WsMessage>,
    shared: Arc<WsShared>,
    client_id: Mutex<String>,
    request_timeout: Mutex<Duration>,
}

impl BrokerConnection for WsConnection {
    fn set_client_id(&self, client_id: &str) {
        *self.client_id.lock().unwrap() = client_id.to_string();
    }

    fn set_request_timeout(&self, timeout: Duration) {
        *self.request_timeout.lock().unwrap() = timeout;
    }

    fn set_event_listeners(&self, events: ConnectionEvents) {
        *self.shared.events.lock().unwrap() = events;
    }

    fn start(&self) -> Result<(), ConnectError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(ConnectError::Unreachable("connection closed".to_string()));
        }
        tracing::debug!(
            client_id = %self.client_id.lock().unwrap(),
            timeout = ?self.request_timeout.lock().unwrap(),
            "websocket connection started"
        );
        Ok(())
    }

    fn stop(&self) -> Result<(), CloseError> {
        Ok(())
    }

    fn create_session(&self, _ack_mode: AckMode) -> Result<Box<dyn BrokerSession>, ConnectError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(ConnectError::Unreachable("connection closed".to_string()));
        }
        Ok(Box::new(WsSession {
            shared: self.shared.clone(),
            writer: self.writer.clone(),
            destinations: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
        }))
    }

    fn close(&self) -> Result<(), CloseError> {
        if !self.shared.closed.swap(true, Ordering::SeqCst) {
            let _ = self.writer.send(WsMessage::Close(None));
        }
        Ok(())
    }
}

struct WsSession {
    shared: Arc<WsShared>,
    writer: UnboundedSender<WsMessage>,
    destinations: Mutex<Vec<Destination>>,
    open: AtomicBool,
}

impl WsSession {
    fn send_frame(&self, frame: &ClientFrame) -> Result<(), String> {
        let text = serde_json::to_string(frame).map_err(|e| e.to_string())?;
        self.writer
            .send(WsMessage::text(text))
            .map_err(|_| "connection closed".to_string())
    }
}

impl BrokerSession for WsSession {
    fn create_consumer(
        &self,
        destination: &Destination,
        listener: MessageListener,
    ) -> Result<Box<dyn BrokerConsumer>, SubscribeError> {
        if !self.is_open() {
            return Err(SubscribeError::NotConnected);
        }
        if destination.name.trim().is_empty() {
            return Err(SubscribeError::InvalidDestination(
                "destination name is empty".to_string(),
            ));
        }

        {
            let mut consumers = self.shared.consumers.lock().unwrap();
            if consumers.contains_key(destination) {
                return Err(SubscribeError::AlreadySubscribed(destination.to_string()));
            }
            consumers.insert(destination.clone(), listener);
        }

        if self
            .send_frame(&ClientFrame::Subscribe {
                destination: destination.clone(),
            })
            .is_err()
        {
            self.shared.consumers.lock().unwrap().remove(destination);
            return Err(SubscribeError::NotConnected);
        }

        self.destinations.lock().unwrap().push(destination.clone());
        Ok(Box::new(WsConsumer {
            shared: self.shared.clone(),
            writer: self.writer.clone(),
            destination: destination.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    fn create_producer(
        &self,
        destination: &Destination,
    ) -> Result<Box<dyn BrokerProducer>, SendError> {
        if !self.is_open() {
            return Err(SendError::BrokerRejected("session closed".to_string()));
        }
        Ok(Box::new(WsProducer {
            writer: self.writer.clone(),
            destination: destination.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
            && !self.shared.closed.load(Ordering::SeqCst)
            && !self.writer.is_closed()
    }

    fn close(&self) -> Result<(), CloseError> {
        if self.open.swap(false, Ordering::SeqCst) {
            let mut consumers = self.shared.consumers.lock().unwrap();
            for destination in self.destinations.lock().unwrap().drain(..) {
                consumers.remove(&destination);
            }
        }
        Ok(())
    }
}

struct WsConsumer {
    shared: Arc<WsShared>,
    writer: UnboundedSender<WsMessage>,
    destination: Destination,
    closed: AtomicBool,
}

impl BrokerConsumer for WsConsumer {
    fn close(&self) -> Result<(), CloseError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.shared
                .consumers
                .lock()
                .unwrap()
                .remove(&self.destination);
            let frame = ClientFrame::Unsubscribe {
                destination: self.destination.clone(),
            };
            if let Ok(text) = serde_json::to_string(&frame) {
                let _ = self.writer.send(WsMessage::text(text));
            }
        }
        Ok(())
    }
}

struct WsProducer {
    writer: UnboundedSender<WsMessage>,
    destination: Destination,
    closed: AtomicBool,
}

impl BrokerProducer for WsProducer {
    fn send(&self, message: Message) -> Result<(), SendError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SendError::BrokerRejected("producer closed".to_string()));
        }
        let payload = match message.payload {
            Payload::Text(text) => text,
            Payload::Bytes(_) => {
                return Err(SendError::BrokerRejected(
                    "binary payloads are not supported over the websocket wire".to_string(),
                ));
            }
        };
        let frame = ClientFrame::Publish {
            destination: self.destination.clone(),
            payload,
            headers: message.headers,
            ttl_ms: message.time_to_live.map(|ttl| ttl.as_millis() as u64),
        };
        let text = serde_json::to_string(&frame)
            .map_err(|e| SendError::EncodingFailed(e.to_string()))?;
        self.writer
            .send(WsMessage::text(text))
            .map_err(|_| SendError::BrokerRejected("connection closed".to_string()))
    }

    fn close(&self) -> Result<(), CloseError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
