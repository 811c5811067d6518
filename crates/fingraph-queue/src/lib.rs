//! Redis-backed job queue and event bus.
//!
//! This crate provides:
//! - Durable FIFO job queue with keyed job records
//! - Per-job pub/sub events with bounded, TTL-bound replay history
//! - Deduplicated subscribe streams for SSE fan-out

pub mod bus;
pub mod error;
pub mod store;

pub use bus::{EventBus, HISTORY_TTL_SECS, MAX_HISTORY};
pub use error::{QueueError, QueueResult};
pub use store::JobStore;
