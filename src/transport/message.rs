use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::client::endpoint::Destination;

/// Frames a client sends to the dev broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe {
        destination: Destination,
    },

    Unsubscribe {
        destination: Destination,
    },

    Publish {
        destination: Destination,
        payload: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        ttl_ms: Option<u64>,
    },
}

/// Frames the dev broker pushes to subscribed clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Delivery {
        destination: Destination,
        payload: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        timestamp: i64,
    },
}
