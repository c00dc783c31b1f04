//! In-memory backend for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use futures::stream;
use tokio::sync::Semaphore;

use crate::backend::{Backend, EventStream};
use crate::error::{Error, Result};
use crate::frame::encode_chunk;
use crate::identity::SessionToken;
use crate::turn::GenerationParams;

/// A request the backend saw on `open_stream`.
#[derive(Clone, Debug)]
pub(crate) struct StreamRequest {
    pub session: String,
    pub prompt: String,
    pub params: GenerationParams,
}

/// Backend double that replays scripted responses.
pub(crate) struct ScriptedBackend {
    models: Vec<String>,
    bind_rejections: Mutex<VecDeque<Error>>,
    select_calls: Mutex<Vec<String>>,
    bind_gate: Mutex<Option<std::sync::Arc<Semaphore>>>,
    streams: Mutex<VecDeque<Result<EventStream>>>,
    stream_requests: Mutex<Vec<StreamRequest>>,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self {
            models: vec!["modelA".to_string(), "modelB".to_string()],
            bind_rejections: Mutex::new(VecDeque::new()),
            select_calls: Mutex::new(Vec::new()),
            bind_gate: Mutex::new(None),
            streams: Mutex::new(VecDeque::new()),
            stream_requests: Mutex::new(Vec::new()),
        }
    }

    /// The next `select_model` call fails with `message`.
    pub(crate) fn reject_next_bind(&self, message: &str) {
        self.fail_next_bind(Error::bind(message));
    }

    /// The next `select_model` call fails with `err`.
    pub(crate) fn fail_next_bind(&self, err: Error) {
        self.bind_rejections.lock().unwrap().push_back(err);
    }

    /// Makes `select_model` wait until [`Self::release_binds`] is called.
    pub(crate) fn hold_binds(&self) {
        *self.bind_gate.lock().unwrap() = Some(std::sync::Arc::new(Semaphore::new(0)));
    }

    pub(crate) fn release_binds(&self) {
        if let Some(gate) = self.bind_gate.lock().unwrap().as_ref() {
            gate.add_permits(Semaphore::MAX_PERMITS);
        }
    }

    /// Queues a stream that yields `payloads` and then ends.
    pub(crate) fn push_payloads(&self, payloads: Vec<Result<String>>) {
        self.push_stream(Ok(Box::pin(stream::iter(payloads))));
    }

    pub(crate) fn push_stream(&self, stream: Result<EventStream>) {
        self.streams.lock().unwrap().push_back(stream);
    }

    pub(crate) fn select_calls(&self) -> Vec<String> {
        self.select_calls.lock().unwrap().clone()
    }

    pub(crate) fn stream_requests(&self) -> Vec<StreamRequest> {
        self.stream_requests.lock().unwrap().clone()
    }
}

/// Encodes a data chunk payload.
pub(crate) fn data(text: &str) -> Result<String> {
    Ok(encode_chunk(text))
}

/// A control or raw payload, sent as-is.
pub(crate) fn raw(payload: &str) -> Result<String> {
    Ok(payload.to_string())
}

#[async_trait::async_trait]
impl Backend for ScriptedBackend {
    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(self.models.clone())
    }

    async fn select_model(&self, _session: &SessionToken, model: &str) -> Result<String> {
        self.select_calls.lock().unwrap().push(model.to_string());
        let gate = self.bind_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| Error::connection("bind gate closed", Some(Box::new(e))))?;
            permit.forget();
        }
        if let Some(err) = self.bind_rejections.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(format!("Model {model} selected"))
    }

    async fn open_stream(
        &self,
        session: &SessionToken,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<EventStream> {
        self.stream_requests.lock().unwrap().push(StreamRequest {
            session: session.to_string(),
            prompt: prompt.to_string(),
            params: *params,
        });
        self.streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::streaming("no scripted stream", None)))
    }
}
