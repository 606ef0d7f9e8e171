//! order-mesh - event-driven consistency core for an order-fulfillment mesh.
//!
//! Services exchange state-change notifications over a fixed set of durable
//! queues and keep local, eventually-consistent projections of each other's
//! data. The gateway puts a time-boxed read-through cache in front of the
//! owning services.

pub mod bus;
pub mod clients;
pub mod config;
pub mod events;
pub mod gateway;
pub mod inventory;
pub mod model;
pub mod orders;
pub mod outbox;
pub mod products;
pub mod projection;
pub mod runtime;
pub mod storage;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
