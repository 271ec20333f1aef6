use std::collections::HashMap;

use tokio::sync::mpsc::UnboundedSender;

use crate::broker::route::{Route, SubscriberId};
use crate::client::endpoint::{Destination, DestinationKind};
use crate::client::message::Message;

/// A message paired with the destination it was published to, as pushed
/// into a subscriber's delivery channel.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub destination: Destination,
    pub message: Message,
}

/// Routing core shared by the in-memory broker and the dev WebSocket
/// broker.
///
/// The engine maps destinations to routes and subscriber ids to delivery
/// channels. Topic destinations fan a published message out to every
/// member; queue destinations hand each message to exactly one member,
/// rotating through them. The engine itself is synchronous — callers wrap
/// it in a mutex and deliver through the registered channels.
#[derive(Debug, Default)]
pub struct Engine {
    routes: HashMap<Destination, Route>,
    subscribers: HashMap<SubscriberId, UnboundedSender<Delivery>>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber's delivery channel. Subscriptions created
    /// with [`Engine::subscribe`] refer to it by id.
    pub fn register_subscriber(&mut self, id: SubscriberId, sender: UnboundedSender<Delivery>) {
        self.subscribers.insert(id, sender);
    }

    /// Removes a subscriber and every subscription it holds.
    pub fn remove_subscriber(&mut self, id: &SubscriberId) {
        self.subscribers.remove(id);
        for route in self.routes.values_mut() {
            route.unsubscribe(id);
        }
        self.routes.retain(|_, route| !route.is_empty());
    }

    /// Attaches a registered subscriber to a destination, creating the
    /// route if it does not exist yet.
    pub fn subscribe(&mut self, destination: &Destination, id: SubscriberId) {
        self.routes
            .entry(destination.clone())
            .or_insert_with(Route::new)
            .subscribe(id);
    }

    /// Detaches a subscriber from a destination. Unknown destinations are
    /// a no-op.
    pub fn unsubscribe(&mut self, destination: &Destination, id: &SubscriberId) {
        if let Some(route) = self.routes.get_mut(destination) {
            route.unsubscribe(id);
            if route.is_empty() {
                self.routes.remove(destination);
            }
        }
    }

    /// Publishes a message to a destination and returns how many
    /// subscribers it was handed to.
    ///
    /// Topics deliver to every live member. Queues walk the members
    /// round-robin and deliver to the first one whose channel is still
    /// open, so each message reaches at most one consumer.
    pub fn publish(&mut self, destination: &Destination, message: Message) -> usize {
        let Some(route) = self.routes.get_mut(destination) else {
            tracing::debug!("no route for {destination}, message dropped");
            return 0;
        };

        match destination.kind {
            DestinationKind::Topic => {
                let mut delivered = 0;
                for id in &route.members {
                    match self.subscribers.get(id) {
                        Some(sender) => {
                            let delivery = Delivery {
                                destination: destination.clone(),
                                message: message.clone(),
                            };
                            if sender.send(delivery).is_ok() {
                                delivered += 1;
                            } else {
                                tracing::warn!("delivery channel closed for subscriber {id}");
                            }
                        }
                        None => tracing::warn!("no subscriber registered with id {id}"),
                    }
                }
                delivered
            }
            DestinationKind::Queue => {
                let len = route.members.len();
                for offset in 0..len {
                    let pos = (route.cursor + offset) % len;
                    let id = route.members[pos].clone();
                    let Some(sender) = self.subscribers.get(&id) else {
                        tracing::warn!("no subscriber registered with id {id}");
                        continue;
                    };
                    let delivery = Delivery {
                        destination: destination.clone(),
                        message: message.clone(),
                    };
                    if sender.send(delivery).is_ok() {
                        route.cursor = (pos + 1) % len;
                        return 1;
                    }
                    tracing::warn!("delivery channel closed for subscriber {id}");
                }
                0
            }
        }
    }

    /// Number of registered subscriber channels. Used by tests to verify
    /// that teardown released everything.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Number of live routes.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Whether a destination currently has any subscribers.
    pub fn has_route(&self, destination: &Destination) -> bool {
        self.routes.contains_key(destination)
    }
}
