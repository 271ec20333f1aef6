//! The `broker` module holds everything on the far side of the facade:
//! the trait surface a broker client must expose, the routing engine
//! shared by the bundled broker implementations, and the in-process
//! broker used for tests and demos.

pub mod api;
pub mod engine;
pub mod memory;
pub mod route;

pub use engine::Engine;
pub use memory::InMemoryBroker;
