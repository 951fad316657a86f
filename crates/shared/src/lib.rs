//! Shared types for the ledger node feed: topics, push payloads, the STOMP
//! frame codec and the error types used on both sides of the wire.

pub mod models;
pub mod protocol;
pub mod error;

pub use models::*;
pub use protocol::*;
pub use error::*;
