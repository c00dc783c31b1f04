// Public modules
pub mod backend;
pub mod binding;
pub mod buffer;
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod error;
pub mod frame;
pub mod identity;
pub mod observability;
pub mod render;
pub mod sse;
pub mod turn;

#[cfg(test)]
mod testing;

// Re-exports
pub use backend::{Backend, EventStream};
pub use binding::{BindOutcome, ModelBinder, ModelBinding};
pub use buffer::GenerationBuffer;
pub use client::Client;
pub use client_logger::ClientLogger;
pub use error::{Error, Result};
pub use frame::{DONE_SENTINEL, PROCESSING_SENTINEL, StreamFrame, decode, encode_chunk};
pub use identity::SessionToken;
pub use observability::register_biometrics;
pub use render::{PlainTextRenderer, Renderer};
pub use turn::{GenerationParams, Turn, TurnState, TurnStep};
