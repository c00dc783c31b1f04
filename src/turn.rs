//! One prompt submission and the state machine that consumes its stream.
//!
//! A [`Turn`] is driven by feeding it decoded frames through [`Turn::apply`].
//! The transition function is pure with respect to I/O: it mutates the turn
//! and reports what the caller should render, which keeps a whole stream
//! replayable from a list of frames.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::buffer::GenerationBuffer;
use crate::error::{Error, Result};
use crate::frame::StreamFrame;

/// Default maximum tokens per response.
pub const DEFAULT_MAX_TOKENS: u32 = 500;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default nucleus sampling value.
pub const DEFAULT_TOP_P: f32 = 0.9;

/// Sampling parameters sent with every stream request.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Maximum tokens to generate; always positive.
    pub max_tokens: u32,
    /// Sampling temperature; finite and non-negative.
    pub temperature: f32,
    /// Nucleus sampling value in `[0, 1]`.
    pub top_p: f32,
}

impl GenerationParams {
    /// Creates validated generation parameters.
    pub fn new(max_tokens: u32, temperature: f32, top_p: f32) -> Result<Self> {
        let params = Self {
            max_tokens,
            temperature,
            top_p,
        };
        params.validate()?;
        Ok(params)
    }

    /// Checks every parameter against its allowed range.
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(Error::validation(
                "max_tokens must be greater than zero",
                Some("max_tokens".to_string()),
            ));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(Error::validation(
                format!("temperature must be >= 0, got {}", self.temperature),
                Some("temperature".to_string()),
            ));
        }
        if !self.top_p.is_finite() || !(0.0..=1.0).contains(&self.top_p) {
            return Err(Error::validation(
                format!("top_p must be between 0 and 1, got {}", self.top_p),
                Some("top_p".to_string()),
            ));
        }
        Ok(())
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
        }
    }
}

/// Lifecycle of a turn.
///
/// `Idle` describes a controller with no turn; a constructed [`Turn`] starts
/// in `Submitting`. `Completed` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnState {
    /// No turn in flight.
    Idle,
    /// The stream request is being opened.
    Submitting,
    /// Frames are arriving.
    Streaming,
    /// The backend signalled the end of the stream.
    Completed,
    /// The transport failed or was closed early.
    Failed,
}

impl TurnState {
    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnState::Completed | TurnState::Failed)
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnState::Idle => "idle",
            TurnState::Submitting => "submitting",
            TurnState::Streaming => "streaming",
            TurnState::Completed => "completed",
            TurnState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What the caller should do after a frame was applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnStep {
    /// Show a transient "working" placeholder; the buffer is unchanged.
    Placeholder,
    /// The buffer grew; re-render its snapshot.
    Render,
    /// The frame was malformed and skipped.
    Skipped(String),
    /// The stream finished; close the transport.
    Completed,
    /// The turn had already ended or its buffer was sealed; the frame was
    /// dropped.
    Ignored,
}

/// A single prompt submission and its generated response.
#[derive(Debug)]
pub struct Turn {
    prompt: String,
    params: GenerationParams,
    buffer: GenerationBuffer,
    state: TurnState,
    frames: u64,
    malformed_frames: u64,
}

impl Turn {
    /// Creates a turn in the `Submitting` state.
    pub fn new(prompt: impl Into<String>, params: GenerationParams) -> Self {
        Self {
            prompt: prompt.into(),
            params,
            buffer: GenerationBuffer::new(),
            state: TurnState::Submitting,
            frames: 0,
            malformed_frames: 0,
        }
    }

    /// The submitted prompt.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// The generation parameters sent with the prompt.
    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    /// The current state.
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Full text received so far.
    pub fn snapshot(&self) -> &str {
        self.buffer.snapshot()
    }

    /// Frames applied while streaming.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Malformed frames skipped while streaming.
    pub fn malformed_frames(&self) -> u64 {
        self.malformed_frames
    }

    /// Marks the transport as open: `Submitting -> Streaming`.
    pub fn start_streaming(&mut self) {
        if self.state == TurnState::Submitting {
            self.state = TurnState::Streaming;
        }
    }

    /// Applies one decoded frame.
    pub fn apply(&mut self, frame: StreamFrame) -> TurnStep {
        if self.state != TurnState::Streaming {
            return TurnStep::Ignored;
        }
        self.frames += 1;
        match frame {
            StreamFrame::Processing => TurnStep::Placeholder,
            StreamFrame::DataChunk(text) => match self.buffer.append(&text) {
                Ok(()) => TurnStep::Render,
                Err(_) => TurnStep::Ignored,
            },
            StreamFrame::Malformed(reason) => {
                self.malformed_frames += 1;
                TurnStep::Skipped(reason)
            }
            StreamFrame::Done => {
                self.state = TurnState::Completed;
                self.buffer.seal();
                TurnStep::Completed
            }
        }
    }

    /// Moves a non-terminal turn to `Failed`, keeping the partial buffer.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = TurnState::Failed;
            self.buffer.seal();
        }
    }

    /// Consumes the turn, returning the final text.
    pub fn into_text(self) -> String {
        self.buffer.into_string()
    }
}
