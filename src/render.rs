//! Output rendering for streamed turns.
//!
//! The turn controller hands a renderer the full buffer snapshot after every
//! chunk. Renderers that can redraw (a browser, a TUI) replace what they show;
//! [`PlainTextRenderer`] writes to a terminal and only emits the part of the
//! snapshot it has not written yet.

use std::io::{self, Stdout, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// ANSI escape code for dim text (used for the placeholder).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for italic text (used for the placeholder).
const ANSI_ITALIC: &str = "\x1b[3m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Return to column zero and erase the line.
const ANSI_CLEAR_LINE: &str = "\r\x1b[2K";

/// Text shown while the backend has not produced any output yet.
pub const PLACEHOLDER_TEXT: &str = "Thinking...";

/// Trait for rendering streamed turns.
pub trait Renderer: Send {
    /// Called when a turn is about to open its stream.
    fn start_turn(&mut self, prompt: &str) {
        _ = prompt;
    }

    /// Show a transient placeholder until the first chunk arrives.
    fn print_placeholder(&mut self);

    /// Render the full response received so far.
    fn render_snapshot(&mut self, snapshot: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when a response is complete.
    fn finish_response(&mut self);

    /// Called when the stream is interrupted by the user.
    fn print_interrupted(&mut self) {}

    /// Returns true if streaming should be interrupted.
    fn should_interrupt(&self) -> bool {
        false
    }
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
    placeholder_visible: bool,
    shown: usize,
    interrupted: Option<Arc<AtomicBool>>,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }
}

impl<W: Write + Send> PlainTextRenderer<W> {
    /// Creates a renderer writing to `out`.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            placeholder_visible: false,
            shown: 0,
            interrupted: None,
        }
    }

    /// Attaches an interrupt flag to the renderer.
    pub fn with_interrupt(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = Some(interrupted);
        self
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }

    fn clear_placeholder(&mut self) {
        if !self.placeholder_visible {
            return;
        }
        self.placeholder_visible = false;
        if self.use_color {
            self.write(ANSI_CLEAR_LINE);
        } else {
            self.write("\n");
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> Renderer for PlainTextRenderer<W> {
    fn start_turn(&mut self, _prompt: &str) {
        self.placeholder_visible = false;
        self.shown = 0;
    }

    fn print_placeholder(&mut self) {
        if self.placeholder_visible || self.shown > 0 {
            return;
        }
        if self.use_color {
            self.write(&format!("{ANSI_DIM}{ANSI_ITALIC}{PLACEHOLDER_TEXT}{ANSI_RESET}"));
        } else {
            self.write(PLACEHOLDER_TEXT);
        }
        self.placeholder_visible = true;
    }

    fn render_snapshot(&mut self, snapshot: &str) {
        self.clear_placeholder();
        // Append-only buffers always extend what is on screen.
        if snapshot.len() >= self.shown && snapshot.is_char_boundary(self.shown) {
            let fresh = &snapshot[self.shown..];
            self.write(fresh);
        } else {
            self.write("\n");
            self.write(snapshot);
        }
        self.shown = snapshot.len();
    }

    fn print_error(&mut self, error: &str) {
        self.clear_placeholder();
        if self.use_color {
            eprintln!("\n{ANSI_RED}Error: {error}{ANSI_RESET}");
        } else {
            eprintln!("\nError: {error}");
        }
    }

    fn print_info(&mut self, info: &str) {
        self.write(&format!("{info}\n"));
    }

    fn finish_response(&mut self) {
        self.clear_placeholder();
        if self.shown > 0 {
            self.write("\n");
        }
        self.shown = 0;
    }

    fn print_interrupted(&mut self) {
        self.clear_placeholder();
        self.write("\n[interrupted]\n");
    }

    fn should_interrupt(&self) -> bool {
        self.interrupted
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}
