//! Request handlers.

pub mod chats;
pub mod events;
pub mod graph;
pub mod health;
pub mod jobs;

pub use chats::*;
pub use events::*;
pub use graph::*;
pub use health::*;
pub use jobs::*;
