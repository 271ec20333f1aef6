//! Dev broker: a WebSocket front for the routing [`Engine`].
//!
//! Each accepted client gets a subscriber id, a delivery channel and a
//! forward task pushing engine deliveries back over the socket as JSON
//! frames. This is a test and demo harness, not a product broker: no
//! persistence, no authentication, no clustering.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tungstenite::protocol::Message as WsMessage;

use crate::broker::engine::{Delivery, Engine};
use crate::client::message::{Message, Payload};
use crate::transport::message::{ClientFrame, ServerFrame};

pub async fn start_websocket_server(addr: &str, engine: Arc<Mutex<Engine>>) {
    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind dev broker address");

    tracing::info!("dev broker listening on ws://{addr}");

    while let Ok((stream, _)) = listener.accept().await {
        let engine = engine.clone();
        let subscriber_id = format!("client-{}", uuid::Uuid::new_v4());

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    tracing::error!("websocket handshake error: {e}");
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();

            // Channel for this client; the engine delivers into it.
            let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();
            engine
                .lock()
                .unwrap()
                .register_subscriber(subscriber_id.clone(), tx);

            // Forward task: engine deliveries -> client socket.
            let forward_id = subscriber_id.clone();
            tokio::spawn(async move {
                while let Some(delivery) = rx.recv().await {
                    let payload = match delivery.message.payload {
                        Payload::Text(text) => text,
                        Payload::Bytes(_) => {
                            tracing::warn!("dropping binary payload for {forward_id}");
                            continue;
                        }
                    };
                    let frame = ServerFrame::Delivery {
                        destination: delivery.destination,
                        payload,
                        headers: delivery.message.headers,
                        timestamp: chrono::Utc::now().timestamp_millis(),
                    };
                    let text = match serde_json::to_string(&frame) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::error!("failed to serialize delivery: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = ws_sender.send(WsMessage::text(text)).await {
                        tracing::warn!("failed to send to {forward_id}: {e}");
                        break;
                    }
                }
                tracing::debug!("send loop closed for {forward_id}");
            });

            // Inbound frames from the client.
            while let Some(Ok(msg)) = ws_receiver.next().await {
                if !msg.is_text() {
                    continue;
                }
                let text = msg.to_text().unwrap_or_default();
                match serde_json::from_str::<ClientFrame>(text) {
                    Ok(ClientFrame::Subscribe { destination }) => {
                        engine
                            .lock()
                            .unwrap()
                            .subscribe(&destination, subscriber_id.clone());
                        tracing::debug!("{subscriber_id} subscribed to {destination}");
                    }
                    Ok(ClientFrame::Unsubscribe { destination }) => {
                        engine
                            .lock()
                            .unwrap()
                            .unsubscribe(&destination, &subscriber_id);
                        tracing::debug!("{subscriber_id} unsubscribed from {destination}");
                    }
                    Ok(ClientFrame::Publish {
                        destination,
                        payload,
                        headers,
                        ttl_ms,
                    }) => {
                        let mut message = Message::text(payload);
                        message.headers = headers;
                        message.time_to_live = ttl_ms.map(Duration::from_millis);
                        let delivered = engine.lock().unwrap().publish(&destination, message);
                        tracing::debug!(
                            "{subscriber_id} published to {destination} ({delivered} delivered)"
                        );
                    }
                    Err(e) => {
                        tracing::warn!("invalid client frame from {subscriber_id}: {e}");
                    }
                }
            }

            tracing::debug!("{subscriber_id} disconnected");
            engine.lock().unwrap().remove_subscriber(&subscriber_id);
        });
    }
}
