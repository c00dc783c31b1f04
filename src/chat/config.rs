//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for controlling chat behavior.

use std::fmt;
use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::turn::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, DEFAULT_TOP_P, GenerationParams};

/// Command-line arguments for the murmur-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Base URL of the backend.
    #[arrrg(optional, "Backend URL (default: $MURMUR_BASE_URL or http://127.0.0.1:5000/)", "URL")]
    pub base_url: Option<String>,

    /// Model to bind at startup.
    #[arrrg(optional, "Model to select at startup", "MODEL")]
    pub model: Option<String>,

    /// Maximum tokens per response.
    #[arrrg(optional, "Max tokens per response (default: 500)", "TOKENS")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature, parsed when the config is resolved.
    #[arrrg(optional, "Sampling temperature, >= 0 (default: 0.7)", "TEMP")]
    pub temperature: Option<String>,

    /// Nucleus sampling value, parsed when the config is resolved.
    #[arrrg(optional, "Top-p between 0 and 1 (default: 0.9)", "TOP_P")]
    pub top_p: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// A command-line value that could not be turned into configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatArgsError {
    /// The offending option.
    pub option: &'static str,
    /// What was wrong with it.
    pub message: String,
}

impl fmt::Display for ChatArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid --{}: {}", self.option, self.message)
    }
}

impl std::error::Error for ChatArgsError {}

/// Configuration for a chat session.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Backend base URL; `None` falls back to the environment, then localhost.
    pub base_url: Option<String>,

    /// Model to bind at startup, if any.
    pub model: Option<String>,

    /// Generation parameters for every turn.
    pub params: GenerationParams,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Connect and request timeout; `None` uses the client default.
    pub timeout: Option<Duration>,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Max tokens: 500
    /// - Temperature: 0.7
    /// - Top-p: 0.9
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            base_url: None,
            model: None,
            params: GenerationParams::default(),
            use_color: true,
            timeout: None,
        }
    }

    /// Sets the backend base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the model to bind at startup.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the generation parameters.
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Sets the connect and request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<ChatArgs> for ChatConfig {
    type Error = ChatArgsError;

    fn try_from(args: ChatArgs) -> Result<Self, Self::Error> {
        let temperature = parse_float("temperature", args.temperature.as_deref())?
            .unwrap_or(DEFAULT_TEMPERATURE);
        let top_p = parse_float("top-p", args.top_p.as_deref())?.unwrap_or(DEFAULT_TOP_P);
        let max_tokens = args.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        let params =
            GenerationParams::new(max_tokens, temperature, top_p).map_err(|err| ChatArgsError {
                option: match err.param() {
                    Some("max_tokens") => "max-tokens",
                    Some("top_p") => "top-p",
                    _ => "temperature",
                },
                message: err.to_string(),
            })?;

        Ok(ChatConfig {
            base_url: args.base_url,
            model: args.model,
            params,
            use_color: !args.no_color,
            timeout: None,
        })
    }
}

fn parse_float(option: &'static str, value: Option<&str>) -> Result<Option<f32>, ChatArgsError> {
    value
        .map(|value| {
            value.trim().parse::<f32>().map_err(|_| ChatArgsError {
                option,
                message: format!("expected a number, got '{value}'"),
            })
        })
        .transpose()
}
