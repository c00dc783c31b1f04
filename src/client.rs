use std::env;
use std::time::{Duration, Instant};

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Request, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::backend::{Backend, EventStream};
use crate::error::{Error, Result};
use crate::identity::SessionToken;
use crate::observability::{CLIENT_REQUESTS, CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS};
use crate::sse::process_sse;
use crate::turn::GenerationParams;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP client for a generation backend.
///
/// The timeout bounds connecting and the short JSON requests. Event streams
/// are not bounded by it; they last as long as generation does.
#[derive(Debug, Clone)]
pub struct Client {
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
}

#[derive(Serialize)]
struct SelectModelRequest<'a> {
    session_id: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct ModelList {
    models: Vec<String>,
}

#[derive(Deserialize)]
struct BackendReply {
    message: Option<String>,
    error: Option<String>,
}

impl Client {
    /// Create a new client.
    ///
    /// The base URL can be provided directly or read from the MURMUR_BASE_URL
    /// environment variable; otherwise a local backend is assumed.
    pub fn new(base_url: Option<String>) -> Result<Self> {
        Self::with_options(base_url, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(base_url: Option<String>, timeout: Option<Duration>) -> Result<Self> {
        let base_url = base_url
            .or_else(|| env::var("MURMUR_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = parse_base_url(&base_url)?;

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// The base URL all endpoints are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        CLIENT_REQUEST_ERRORS.click();
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {e}"),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    }

    fn build(builder: RequestBuilder) -> Result<Request> {
        builder.build().map_err(|e| {
            Error::http_client(format!("Failed to build request: {e}"), Some(Box::new(e)))
        })
    }

    /// `POST /select_model` with `{session_id, model}`.
    fn select_model_request(&self, session: &SessionToken, model: &str) -> Result<Request> {
        let url = self.endpoint("select_model")?;
        Self::build(
            self.client
                .post(url)
                .headers(Self::json_headers())
                .timeout(self.timeout)
                .json(&SelectModelRequest {
                    session_id: session.as_str(),
                    model,
                }),
        )
    }

    /// `GET /stream?session_id&prompt&max_tokens&temp&top_p`.
    fn stream_request(
        &self,
        session: &SessionToken,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Request> {
        let url = self.endpoint("stream")?;
        let query = [
            ("session_id", session.as_str().to_string()),
            ("prompt", prompt.to_string()),
            ("max_tokens", params.max_tokens.to_string()),
            ("temp", params.temperature.to_string()),
            ("top_p", params.top_p.to_string()),
        ];

        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        Self::build(self.client.get(url).headers(headers).query(&query))
    }

    async fn read_body(response: Response) -> Result<(StatusCode, String)> {
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            Error::http_client(format!("Failed to read response: {e}"), Some(Box::new(e)))
        })?;
        Ok((status, body))
    }
}

#[async_trait::async_trait]
impl Backend for Client {
    async fn list_models(&self) -> Result<Vec<String>> {
        let url = self.endpoint("models")?;
        let start = Instant::now();
        CLIENT_REQUESTS.click();
        let response = self
            .client
            .get(url)
            .headers(Self::json_headers())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let (status, body) = Self::read_body(response).await?;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        if !status.is_success() {
            CLIENT_REQUEST_ERRORS.click();
            let message = backend_error(&body).unwrap_or(body);
            return Err(Error::api(status.as_u16(), message));
        }
        let list: ModelList = serde_json::from_str(&body).map_err(|e| {
            Error::serialization(
                format!("Failed to parse model list: {e}"),
                Some(Box::new(e)),
            )
        })?;
        debug!(count = list.models.len(), "fetched model catalog");
        Ok(list.models)
    }

    async fn select_model(&self, session: &SessionToken, model: &str) -> Result<String> {
        let request = self.select_model_request(session, model)?;
        let start = Instant::now();
        CLIENT_REQUESTS.click();
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| self.map_send_error(e))?;
        let (status, body) = Self::read_body(response).await?;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        let result = interpret_select_reply(status, &body);
        if result.is_err() {
            CLIENT_REQUEST_ERRORS.click();
        }
        result
    }

    async fn open_stream(
        &self,
        session: &SessionToken,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<EventStream> {
        let request = self.stream_request(session, prompt, params)?;
        CLIENT_REQUESTS.click();
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            let (status, body) = Self::read_body(response).await?;
            let message = backend_error(&body)
                .unwrap_or_else(|| format!("stream refused with HTTP {}: {body}", status.as_u16()));
            return Err(Error::streaming(message, None));
        }

        Ok(Box::pin(process_sse(response.bytes_stream())))
    }
}

fn parse_base_url(base_url: &str) -> Result<Url> {
    let mut base_url = base_url.trim().to_string();
    if !base_url.ends_with('/') {
        base_url.push('/');
    }
    Ok(Url::parse(&base_url)?)
}

/// Extracts the backend's `error` field from a JSON body, if present.
fn backend_error(body: &str) -> Option<String> {
    serde_json::from_str::<BackendReply>(body)
        .ok()
        .and_then(|reply| reply.error)
}

/// Maps a `select_model` reply onto a confirmation or an error.
///
/// An `error` field wins regardless of status, so the backend's own wording
/// reaches the user.
fn interpret_select_reply(status: StatusCode, body: &str) -> Result<String> {
    let reply = serde_json::from_str::<BackendReply>(body).ok();
    if let Some(error) = reply.as_ref().and_then(|r| r.error.clone()) {
        return Err(Error::bind(error));
    }
    if !status.is_success() {
        return Err(Error::api(status.as_u16(), body));
    }
    match reply {
        Some(reply) => Ok(reply.message.unwrap_or_default()),
        None => Err(Error::serialization(
            format!("Failed to parse select_model reply: {body}"),
            None,
        )),
    }
}
