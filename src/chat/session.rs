//! The turn controller.
//!
//! [`ChatSession`] owns everything one client instance knows about its
//! backend session: the session token, the model binding, the cached model
//! catalog and the generation parameters. It runs at most one turn at a time
//! and drives each turn's stream through the [`Turn`] state machine.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::backend::{Backend, EventStream};
use crate::binding::{BindOutcome, InFlight, ModelBinder, ModelBinding};
use crate::chat::config::ChatConfig;
use crate::client::Client;
use crate::client_logger::ClientLogger;
use crate::error::{Error, Result};
use crate::frame::decode;
use crate::identity::SessionToken;
use crate::observability::{
    STREAM_ERRORS, STREAM_FRAMES, STREAM_MALFORMED_FRAMES, TURN_COMPLETED, TURN_DURATION,
    TURN_FAILED,
};
use crate::render::Renderer;
use crate::turn::{GenerationParams, Turn, TurnState, TurnStep};

/// How often a waiting stream re-checks the renderer's interrupt flag.
const INTERRUPT_CHECK_PERIOD: Duration = Duration::from_millis(100);

/// Prefix of the notice shown when a turn's stream fails.
pub const STREAM_FAILURE_NOTICE: &str = "stream error or session limit reached";

/// The result of a turn that was created.
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    /// `Completed` or `Failed`.
    pub state: TurnState,
    /// The trimmed prompt that was sent.
    pub prompt: String,
    /// The response text; partial when the turn failed.
    pub text: String,
    /// Why the turn failed, if it did.
    pub error: Option<Error>,
    /// Frames received, including control and malformed frames.
    pub frames: u64,
    /// Malformed frames that were skipped.
    pub malformed_frames: u64,
    /// Time from submission to the terminal state.
    pub duration: Duration,
}

impl TurnOutcome {
    /// Returns true if the stream reached `[DONE]`.
    pub fn is_completed(&self) -> bool {
        self.state == TurnState::Completed
    }
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// The session token.
    pub session: SessionToken,
    /// The bound model, if any.
    pub model: Option<String>,
    /// Parameters used for the next turn.
    pub params: GenerationParams,
    /// Turns that reached `[DONE]`.
    pub turns_completed: u64,
    /// Turns that ended in `Failed`.
    pub turns_failed: u64,
    /// Frames received across all turns.
    pub frames: u64,
    /// Malformed frames skipped across all turns.
    pub malformed_frames: u64,
    /// Characters of generated text received.
    pub chars_received: u64,
    /// Bind requests that reached the backend and succeeded.
    pub binds: u64,
}

#[derive(Debug, Default)]
struct Totals {
    turns_completed: u64,
    turns_failed: u64,
    frames: u64,
    malformed_frames: u64,
    chars_received: u64,
    binds: u64,
}

/// A client session bound to one backend.
pub struct ChatSession<B: Backend = Client> {
    backend: B,
    session: SessionToken,
    binder: ModelBinder,
    catalog: Mutex<Option<Vec<String>>>,
    params: GenerationParams,
    turn_in_flight: AtomicBool,
    phase: Mutex<TurnState>,
    totals: Mutex<Totals>,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl ChatSession<Client> {
    /// Creates a session over HTTP from a resolved configuration.
    pub fn from_config(config: &ChatConfig) -> Result<Self> {
        let client = Client::with_options(config.base_url.clone(), config.timeout)?;
        Ok(Self::new(client, config.params))
    }
}

impl<B: Backend> ChatSession<B> {
    /// Creates a session with a fresh token and no model bound.
    pub fn new(backend: B, params: GenerationParams) -> Self {
        let session = SessionToken::generate();
        debug!(session = %session, "created client session");
        Self {
            backend,
            binder: ModelBinder::new(session.clone()),
            session,
            catalog: Mutex::new(None),
            params,
            turn_in_flight: AtomicBool::new(false),
            phase: Mutex::new(TurnState::Idle),
            totals: Mutex::new(Totals::default()),
            logger: None,
        }
    }

    /// Attaches a logger that observes binds, frames and finished turns.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The token identifying this client to the backend.
    pub fn session_token(&self) -> &SessionToken {
        &self.session
    }

    /// A snapshot of the current model binding.
    pub fn binding(&self) -> ModelBinding {
        self.binder.current()
    }

    /// The backend this session talks to.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// `Idle` when no turn is in flight, otherwise the active turn's state.
    pub fn state(&self) -> TurnState {
        if InFlight::is_raised(&self.turn_in_flight) {
            *lock(&self.phase)
        } else {
            TurnState::Idle
        }
    }

    /// Fetches and caches the backend's model catalog.
    pub async fn refresh_models(&self) -> Result<Vec<String>> {
        let models = self.backend.list_models().await?;
        *lock(&self.catalog) = Some(models.clone());
        Ok(models)
    }

    /// The cached model catalog, if it has been fetched.
    pub fn models(&self) -> Option<Vec<String>> {
        lock(&self.catalog).clone()
    }

    /// Binds the session to `model`.
    ///
    /// When a catalog has been fetched the name must appear in it. Binding is
    /// refused while a turn is streaming.
    pub async fn bind(&self, model: &str) -> Result<BindOutcome> {
        let model = model.trim();
        if InFlight::is_raised(&self.turn_in_flight) {
            return Err(Error::conflict(
                "cannot change model while a turn is in progress",
            ));
        }
        if let Some(catalog) = lock(&self.catalog).as_ref()
            && !model.is_empty()
            && !catalog.iter().any(|name| name == model)
        {
            return Err(Error::validation(
                format!("unknown model '{model}'; use /models to list available models"),
                Some("model".to_string()),
            ));
        }
        let outcome = self.binder.bind(&self.backend, model).await?;
        if let BindOutcome::Bound(message) = &outcome {
            lock(&self.totals).binds += 1;
            if let Some(logger) = &self.logger {
                logger.log_bind(model, message);
            }
        }
        Ok(outcome)
    }

    /// Parameters used for the next turn.
    pub fn params(&self) -> GenerationParams {
        self.params
    }

    /// Replaces the generation parameters after validating them.
    pub fn set_params(&mut self, params: GenerationParams) -> Result<()> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    /// Sets the maximum tokens per response.
    pub fn set_max_tokens(&mut self, max_tokens: u32) -> Result<()> {
        self.set_params(GenerationParams {
            max_tokens,
            ..self.params
        })
    }

    /// Sets the sampling temperature.
    pub fn set_temperature(&mut self, temperature: f32) -> Result<()> {
        self.set_params(GenerationParams {
            temperature,
            ..self.params
        })
    }

    /// Sets the top-p value.
    pub fn set_top_p(&mut self, top_p: f32) -> Result<()> {
        self.set_params(GenerationParams {
            top_p,
            ..self.params
        })
    }

    /// Submits a prompt and streams the response into `renderer`.
    ///
    /// Returns `Err` only when no turn was created: an empty prompt, no bound
    /// model, invalid parameters, another turn still in flight, or a model
    /// selection awaiting the backend. Once a turn exists the result is `Ok`
    /// with the turn's terminal state; a failed turn keeps whatever text
    /// arrived before the failure.
    pub async fn submit(&self, prompt: &str, renderer: &mut dyn Renderer) -> Result<TurnOutcome> {
        let prompt = prompt.trim();
        if let Err(err) = self.check_submission(prompt) {
            renderer.print_error(&err.to_string());
            return Err(err);
        }
        let Some(_flight) = InFlight::acquire(&self.turn_in_flight) else {
            let err = Error::conflict("a turn is already in progress");
            renderer.print_error(&err.to_string());
            return Err(err);
        };
        if self.binder.is_binding() {
            let err = Error::conflict("a model selection is in progress");
            renderer.print_error(&err.to_string());
            return Err(err);
        }

        let start = Instant::now();
        self.set_phase(TurnState::Submitting);
        let mut turn = Turn::new(prompt, self.params);
        renderer.start_turn(prompt);

        let opened = self
            .backend
            .open_stream(&self.session, turn.prompt(), turn.params())
            .await;
        let failure = match opened {
            Ok(stream) => {
                turn.start_streaming();
                self.set_phase(TurnState::Streaming);
                self.consume(&mut turn, stream, renderer).await
            }
            Err(err) => Some(err),
        };

        if let Some(err) = &failure {
            turn.fail();
            STREAM_ERRORS.click();
            if err.is_abort() {
                renderer.print_interrupted();
            } else {
                renderer.print_error(&format!("{STREAM_FAILURE_NOTICE}: {err}"));
            }
        } else {
            renderer.finish_response();
        }
        self.set_phase(turn.state());

        let outcome = self.finish(turn, failure, start.elapsed());
        if let Some(logger) = &self.logger {
            logger.log_turn(&outcome);
        }
        Ok(outcome)
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        let totals = lock(&self.totals);
        SessionStats {
            session: self.session.clone(),
            model: self.binding().model().map(str::to_string),
            params: self.params,
            turns_completed: totals.turns_completed,
            turns_failed: totals.turns_failed,
            frames: totals.frames,
            malformed_frames: totals.malformed_frames,
            chars_received: totals.chars_received,
            binds: totals.binds,
        }
    }

    fn check_submission(&self, prompt: &str) -> Result<()> {
        if !self.binding().is_bound() {
            return Err(Error::validation(
                "no model selected; choose one with /model <name>",
                Some("model".to_string()),
            ));
        }
        if prompt.is_empty() {
            return Err(Error::validation(
                "prompt is empty",
                Some("prompt".to_string()),
            ));
        }
        self.params.validate()
    }

    /// Applies frames until `[DONE]`, returning the failure if the stream
    /// ends any other way. The transport closes when `stream` is dropped.
    async fn consume(
        &self,
        turn: &mut Turn,
        mut stream: EventStream,
        renderer: &mut dyn Renderer,
    ) -> Option<Error> {
        let mut interrupt_check = tokio::time::interval(INTERRUPT_CHECK_PERIOD);
        interrupt_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            if renderer.should_interrupt() {
                return Some(Error::abort("turn interrupted; stream closed"));
            }
            // A quiet backend must not delay an interrupt until its next byte.
            let next = tokio::select! {
                biased;
                next = stream.next() => Some(next),
                _ = interrupt_check.tick() => None,
            };
            let Some(next) = next else {
                continue;
            };
            let payload = match next {
                Some(Ok(payload)) => payload,
                Some(Err(err)) => return Some(err),
                None => {
                    return Some(Error::streaming(
                        "stream closed before the end-of-stream marker",
                        None,
                    ));
                }
            };

            let frame = decode(&payload);
            STREAM_FRAMES.click();
            debug!(?frame, "frame");
            if let Some(logger) = &self.logger {
                logger.log_frame(&frame);
            }
            match turn.apply(frame) {
                TurnStep::Placeholder => renderer.print_placeholder(),
                TurnStep::Render => renderer.render_snapshot(turn.snapshot()),
                TurnStep::Skipped(reason) => {
                    STREAM_MALFORMED_FRAMES.click();
                    warn!(%reason, "skipping malformed frame");
                }
                TurnStep::Completed => return None,
                TurnStep::Ignored => {}
            }
        }
    }

    fn finish(&self, turn: Turn, error: Option<Error>, duration: Duration) -> TurnOutcome {
        TURN_DURATION.add(duration.as_secs_f64());
        let state = turn.state();
        let frames = turn.frames();
        let malformed_frames = turn.malformed_frames();
        let prompt = turn.prompt().to_string();
        let text = turn.into_text();

        {
            let mut totals = lock(&self.totals);
            totals.frames += frames;
            totals.malformed_frames += malformed_frames;
            totals.chars_received += text.chars().count() as u64;
            if state == TurnState::Completed {
                totals.turns_completed += 1;
            } else {
                totals.turns_failed += 1;
            }
        }

        match &error {
            None => {
                TURN_COMPLETED.click();
                info!(frames, chars = text.len(), "turn completed");
            }
            Some(err) => {
                TURN_FAILED.click();
                warn!(error = %err, partial_chars = text.len(), "turn failed");
            }
        }

        TurnOutcome {
            state,
            prompt,
            text,
            error,
            frames,
            malformed_frames,
            duration,
        }
    }

    fn set_phase(&self, state: TurnState) {
        *lock(&self.phase) = state;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
