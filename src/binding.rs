//! Model binding: which backend model serves this session.
//!
//! The backend keeps the selected model per session, so a binding is only
//! ever changed by a successful bind round trip. Failed or redundant binds
//! leave the previous binding exactly as it was.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::identity::SessionToken;
use crate::observability::{BIND_REQUESTS, BIND_SHORT_CIRCUITS};

/// The session's current model binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelBinding {
    session: SessionToken,
    model: Option<String>,
}

impl ModelBinding {
    /// Creates an unbound binding for `session`.
    pub fn new(session: SessionToken) -> Self {
        Self {
            session,
            model: None,
        }
    }

    /// The session this binding belongs to.
    pub fn session(&self) -> &SessionToken {
        &self.session
    }

    /// The bound model, if any.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Returns true once a bind has succeeded.
    pub fn is_bound(&self) -> bool {
        self.model.is_some()
    }

    /// Returns true if the session is bound to exactly `model`.
    pub fn is_bound_to(&self, model: &str) -> bool {
        self.model.as_deref() == Some(model)
    }

    fn rebind(&mut self, model: String) {
        self.model = Some(model);
    }
}

/// Result of a bind that did not fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindOutcome {
    /// The session was already bound to the requested model; nothing was sent.
    AlreadyBound,
    /// The backend accepted the model, with its confirmation message.
    Bound(String),
}

/// Owns a [`ModelBinding`] and serializes changes to it.
#[derive(Debug)]
pub struct ModelBinder {
    binding: Mutex<ModelBinding>,
    in_flight: AtomicBool,
}

impl ModelBinder {
    /// Creates an unbound binder for `session`.
    pub fn new(session: SessionToken) -> Self {
        Self {
            binding: Mutex::new(ModelBinding::new(session)),
            in_flight: AtomicBool::new(false),
        }
    }

    /// A snapshot of the current binding.
    pub fn current(&self) -> ModelBinding {
        self.lock().clone()
    }

    /// Returns true while a bind request is awaiting the backend.
    pub fn is_binding(&self) -> bool {
        InFlight::is_raised(&self.in_flight)
    }

    /// Binds the session to `model`.
    ///
    /// Rebinding to the model already bound returns
    /// [`BindOutcome::AlreadyBound`] without contacting the backend. A second
    /// bind while one is awaiting the backend is rejected; the first wins.
    pub async fn bind<B: Backend + ?Sized>(&self, backend: &B, model: &str) -> Result<BindOutcome> {
        let model = model.trim();
        if model.is_empty() {
            return Err(Error::validation(
                "model name is empty",
                Some("model".to_string()),
            ));
        }
        let session = {
            let binding = self.lock();
            if binding.is_bound_to(model) {
                BIND_SHORT_CIRCUITS.click();
                debug!(model, "already bound; skipping select_model");
                return Ok(BindOutcome::AlreadyBound);
            }
            binding.session().clone()
        };

        let _flight = InFlight::acquire(&self.in_flight)
            .ok_or_else(|| Error::conflict("a model selection is already in progress"))?;
        BIND_REQUESTS.click();
        let message = backend
            .select_model(&session, model)
            .await
            .map_err(into_bind_error)?;
        self.lock().rebind(model.to_string());
        info!(model, %message, "model bound");
        Ok(BindOutcome::Bound(message))
    }

    fn lock(&self) -> MutexGuard<'_, ModelBinding> {
        self.binding.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Every failed selection reaches the caller as [`Error::Bind`]; backend
/// rejections keep their text verbatim.
fn into_bind_error(err: Error) -> Error {
    if err.is_bind() {
        err
    } else {
        Error::bind(err.to_string())
    }
}

/// Holds a single-flight flag for as long as it lives.
pub(crate) struct InFlight<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlight<'a> {
    /// Raises `flag`, or returns `None` if it is already raised.
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl InFlight<'_> {
    /// Returns true while some holder has `flag` raised.
    pub(crate) fn is_raised(flag: &AtomicBool) -> bool {
        flag.load(Ordering::Acquire)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
