//! The seam between the session protocol and the remote service.

use std::pin::Pin;

use futures::Stream;

use crate::error::Result;
use crate::identity::SessionToken;
use crate::turn::GenerationParams;

/// Ordered event payloads from one generation stream.
///
/// Each item is the data field of one server-sent event. Dropping the stream
/// closes the transport.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Operations the session protocol needs from a generation backend.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Fetches the catalog of model names the backend can serve.
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Binds `session` to `model`, returning the backend's confirmation.
    ///
    /// A backend-reported rejection is returned as [`Error::Bind`](crate::Error::Bind)
    /// carrying the backend's text verbatim.
    async fn select_model(&self, session: &SessionToken, model: &str) -> Result<String>;

    /// Opens the event stream for one prompt.
    async fn open_stream(
        &self,
        session: &SessionToken,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<EventStream>;
}
