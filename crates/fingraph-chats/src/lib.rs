//! Chat persistence.
//!
//! Chats live in two places: a metadata document in ArangoDB (keyed lookup,
//! ordered listing) and an append-only JSON transcript file on disk. The
//! transcript is always written before the metadata so a metadata read never
//! reports more messages than the file holds.

pub mod error;
pub mod store;

pub use error::{ChatError, ChatResult};
pub use store::ChatStore;
