//! The `transport` module is everything wire-level: the JSON frame types,
//! the WebSocket dev broker that fronts the routing engine, and the
//! WebSocket-backed connector implementing the broker boundary for the
//! facade.

pub mod connector;
pub mod message;
pub mod websocket;

pub use connector::WsConnector;
