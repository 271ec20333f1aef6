//! # RelayMQ
//!
//! `relaymq` is a resilient publish/subscribe client facade over a message
//! broker. It wraps an NMS-style broker client behind three small
//! components: a connection manager owning the connection lifecycle and
//! liveness, a consumer session delivering decoded messages to a single
//! handler with strictly serialized dispatch, and a producer session that
//! opens and fully releases a connection per send.
//!
//! ## Core Modules
//!
//! The library is structured into several modules, each with a distinct responsibility:
//!
//! - `broker`: the broker boundary — the trait surface a broker client must
//!   expose, the routing engine, and the in-process broker used in tests.
//! - `client`: the facade — connection manager, consumer session, producer
//!   session and their shared value types.
//! - `codec`: the pluggable text codec used by the structured send/receive paths.
//! - `config`: loading and merging the facade configuration.
//! - `observer`: the structured event sink every warning and error is reported to.
//! - `transport`: the JSON wire frames, the WebSocket dev broker and the
//!   WebSocket connector.
//! - `utils`: the error taxonomy and logging setup.

pub mod broker;
pub mod client;
pub mod codec;
pub mod config;
pub mod observer;
pub mod transport;
pub mod utils;
