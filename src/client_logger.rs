//! Logging hook for session protocol traffic.
//!
//! This module provides the [`ClientLogger`] trait that allows callers to
//! capture every model binding, decoded frame and finished turn that passes
//! through a [`ChatSession`](crate::chat::ChatSession).

use crate::chat::TurnOutcome;
use crate::frame::StreamFrame;

/// A trait for recording session protocol traffic.
///
/// # Example
///
/// ```rust,ignore
/// use murmur::{ClientLogger, StreamFrame};
/// use murmur::chat::TurnOutcome;
/// use std::io::Write;
/// use std::sync::Mutex;
///
/// struct FileLogger {
///     file: Mutex<std::fs::File>,
/// }
///
/// impl ClientLogger for FileLogger {
///     fn log_bind(&self, model: &str, message: &str) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "bound {model}: {message}").unwrap();
///     }
///
///     fn log_frame(&self, frame: &StreamFrame) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "frame: {frame:?}").unwrap();
///     }
///
///     fn log_turn(&self, outcome: &TurnOutcome) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "turn {}: {}", outcome.state, outcome.text).unwrap();
///     }
/// }
/// ```
pub trait ClientLogger: Send + Sync {
    /// Log a successful bind request along with the backend's message.
    ///
    /// Short-circuited rebinds to the already-bound model are not logged.
    fn log_bind(&self, model: &str, message: &str);

    /// Log one decoded frame, in arrival order.
    fn log_frame(&self, frame: &StreamFrame);

    /// Log a turn that reached a terminal state.
    fn log_turn(&self, outcome: &TurnOutcome);
}
