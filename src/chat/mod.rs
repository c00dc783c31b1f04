//! Interactive chat over a session-bound generation backend.
//!
//! This module provides the turn controller and the pieces the
//! `murmur-chat` REPL is built from:
//!
//! - [`session`]: `ChatSession`, which binds a model and runs one turn at a time
//! - [`config`]: CLI argument parsing and configuration
//! - [`commands`]: Slash command parsing

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatArgsError, ChatConfig};
pub use session::{ChatSession, STREAM_FAILURE_NOTICE, SessionStats, TurnOutcome};
