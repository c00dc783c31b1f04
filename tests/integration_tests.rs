//! Integration tests for the murmur session protocol.
//! These drive `ChatSession` against an in-process backend that speaks raw
//! server-sent-event bytes, so the SSE parser, frame decoding and the turn
//! controller run exactly as they do against a live server.

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use futures::stream;

    use murmur::chat::{ChatSession, STREAM_FAILURE_NOTICE, TurnOutcome};
    use murmur::sse::process_sse;
    use murmur::{
        Backend, BindOutcome, ClientLogger, Error, EventStream, GenerationParams, Renderer,
        Result, SessionToken, StreamFrame, TurnState, encode_chunk,
    };

    #[derive(Default)]
    struct Wire {
        models: Vec<String>,
        selected: Vec<(String, String)>,
        opened: Vec<(String, String, GenerationParams)>,
        bodies: VecDeque<Vec<std::result::Result<Bytes, std::io::Error>>>,
        unknown: Vec<String>,
    }

    /// A backend that answers from memory and replays SSE bodies.
    #[derive(Clone, Default)]
    struct LoopbackBackend {
        wire: Arc<Mutex<Wire>>,
    }

    impl LoopbackBackend {
        fn new() -> Self {
            let backend = Self::default();
            backend.wire.lock().unwrap().models =
                vec!["deepseek-llm-7b-chat".to_string(), "tinyllama".to_string()];
            backend
        }

        fn reject(&self, model: &str) {
            self.wire.lock().unwrap().unknown.push(model.to_string());
        }

        fn serve(&self, body: &str) {
            self.serve_chunks(vec![Ok(Bytes::from(body.to_string()))]);
        }

        fn serve_chunks(&self, chunks: Vec<std::result::Result<Bytes, std::io::Error>>) {
            self.wire.lock().unwrap().bodies.push_back(chunks);
        }

        fn selected(&self) -> Vec<(String, String)> {
            self.wire.lock().unwrap().selected.clone()
        }

        fn opened(&self) -> Vec<(String, String, GenerationParams)> {
            self.wire.lock().unwrap().opened.clone()
        }
    }

    #[async_trait::async_trait]
    impl Backend for LoopbackBackend {
        async fn list_models(&self) -> Result<Vec<String>> {
            Ok(self.wire.lock().unwrap().models.clone())
        }

        async fn select_model(&self, session: &SessionToken, model: &str) -> Result<String> {
            let mut wire = self.wire.lock().unwrap();
            wire.selected.push((session.to_string(), model.to_string()));
            if wire.unknown.iter().any(|m| m == model) {
                return Err(Error::bind(format!("Model {model} not found")));
            }
            Ok(format!("Model {model} loaded"))
        }

        async fn open_stream(
            &self,
            session: &SessionToken,
            prompt: &str,
            params: &GenerationParams,
        ) -> Result<EventStream> {
            let mut wire = self.wire.lock().unwrap();
            wire.opened
                .push((session.to_string(), prompt.to_string(), *params));
            match wire.bodies.pop_front() {
                Some(chunks) => Ok(Box::pin(process_sse(stream::iter(chunks)))),
                None => Err(Error::streaming("Session limit reached", None)),
            }
        }
    }

    /// Records everything the session asks it to draw.
    #[derive(Default)]
    struct Screen {
        placeholders: usize,
        snapshots: Vec<String>,
        errors: Vec<String>,
        finished: usize,
    }

    impl Renderer for Screen {
        fn print_placeholder(&mut self) {
            self.placeholders += 1;
        }

        fn render_snapshot(&mut self, snapshot: &str) {
            self.snapshots.push(snapshot.to_string());
        }

        fn print_error(&mut self, error: &str) {
            self.errors.push(error.to_string());
        }

        fn print_info(&mut self, _info: &str) {}

        fn finish_response(&mut self) {
            self.finished += 1;
        }
    }

    #[derive(Default)]
    struct Journal {
        binds: Mutex<Vec<String>>,
        frames: Mutex<Vec<StreamFrame>>,
        turns: Mutex<Vec<TurnState>>,
    }

    impl ClientLogger for Journal {
        fn log_bind(&self, model: &str, _message: &str) {
            self.binds.lock().unwrap().push(model.to_string());
        }

        fn log_frame(&self, frame: &StreamFrame) {
            self.frames.lock().unwrap().push(frame.clone());
        }

        fn log_turn(&self, outcome: &TurnOutcome) {
            self.turns.lock().unwrap().push(outcome.state);
        }
    }

    fn sse(payloads: &[&str]) -> String {
        payloads
            .iter()
            .map(|payload| format!("data: {payload}\n\n"))
            .collect()
    }

    async fn bound_session(backend: &LoopbackBackend) -> ChatSession<LoopbackBackend> {
        let session = ChatSession::new(backend.clone(), GenerationParams::default());
        session.bind("deepseek-llm-7b-chat").await.unwrap();
        session
    }

    #[tokio::test]
    async fn streamed_turn_accumulates_in_order() {
        let backend = LoopbackBackend::new();
        let session = bound_session(&backend).await;
        let hello = encode_chunk("Hel");
        let world = encode_chunk("lo, world");
        backend.serve(&sse(&["[PROCESSING]", &hello, &world, "[DONE]"]));

        let mut screen = Screen::default();
        let outcome = session.submit("  say hello  ", &mut screen).await.unwrap();

        assert!(outcome.is_completed());
        assert_eq!(outcome.prompt, "say hello");
        assert_eq!(outcome.text, "Hello, world");
        assert_eq!(screen.placeholders, 1);
        assert_eq!(screen.snapshots, vec!["Hel", "Hello, world"]);
        assert_eq!(screen.finished, 1);
        assert_eq!(session.state(), TurnState::Idle);

        let opened = backend.opened();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].1, "say hello");
        assert_eq!(opened[0].2, GenerationParams::default());
    }

    #[tokio::test]
    async fn session_token_is_stable_across_requests() {
        let backend = LoopbackBackend::new();
        let session = bound_session(&backend).await;
        backend.serve(&sse(&["[DONE]"]));
        backend.serve(&sse(&["[DONE]"]));

        let mut screen = Screen::default();
        session.submit("one", &mut screen).await.unwrap();
        session.submit("two", &mut screen).await.unwrap();

        let token = session.session_token().to_string();
        assert_eq!(token.len(), 32);
        assert!(backend.selected().iter().all(|(s, _)| *s == token));
        assert!(backend.opened().iter().all(|(s, _, _)| *s == token));
    }

    #[tokio::test]
    async fn unbound_session_sends_nothing() {
        let backend = LoopbackBackend::new();
        let session = ChatSession::new(backend.clone(), GenerationParams::default());
        let mut screen = Screen::default();

        let err = session.submit("hello", &mut screen).await.unwrap_err();

        assert!(err.is_validation());
        assert!(backend.opened().is_empty());
        assert_eq!(screen.errors.len(), 1);
        assert_eq!(session.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn rebinding_same_model_is_local() {
        let backend = LoopbackBackend::new();
        let session = bound_session(&backend).await;

        let outcome = session.bind("deepseek-llm-7b-chat").await.unwrap();

        assert_eq!(outcome, BindOutcome::AlreadyBound);
        assert_eq!(backend.selected().len(), 1);
    }

    #[tokio::test]
    async fn failed_bind_keeps_previous_model() {
        let backend = LoopbackBackend::new();
        let session = bound_session(&backend).await;
        backend.reject("tinyllama");

        let err = session.bind("tinyllama").await.unwrap_err();

        assert!(err.is_bind());
        assert!(err.to_string().contains("Model tinyllama not found"));
        assert_eq!(session.binding().model(), Some("deepseek-llm-7b-chat"));
    }

    #[tokio::test]
    async fn catalog_rejects_unknown_model() {
        let backend = LoopbackBackend::new();
        let session = ChatSession::new(backend.clone(), GenerationParams::default());
        let models = session.refresh_models().await.unwrap();
        assert_eq!(models.len(), 2);

        let err = session.bind("gpt-imaginary").await.unwrap_err();

        assert!(err.is_validation());
        assert!(backend.selected().is_empty());
        assert!(!session.binding().is_bound());
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped() {
        let backend = LoopbackBackend::new();
        let session = bound_session(&backend).await;
        let x = encode_chunk("x");
        let y = encode_chunk("y");
        backend.serve(&sse(&[&x, "not-base64-!!", &y, "[DONE]"]));

        let mut screen = Screen::default();
        let outcome = session.submit("go", &mut screen).await.unwrap();

        assert!(outcome.is_completed());
        assert_eq!(outcome.text, "xy");
        assert_eq!(outcome.malformed_frames, 1);
        assert_eq!(screen.snapshots, vec!["x", "xy"]);
    }

    #[tokio::test]
    async fn frames_after_done_are_ignored() {
        let backend = LoopbackBackend::new();
        let session = bound_session(&backend).await;
        let kept = encode_chunk("kept");
        let late = encode_chunk("late");
        backend.serve(&sse(&[&kept, "[DONE]", &late]));

        let mut screen = Screen::default();
        let outcome = session.submit("go", &mut screen).await.unwrap();

        assert_eq!(outcome.text, "kept");
        assert_eq!(screen.snapshots, vec!["kept"]);
    }

    #[tokio::test]
    async fn transport_error_keeps_partial_text() {
        let backend = LoopbackBackend::new();
        let session = bound_session(&backend).await;
        let partial = encode_chunk("partial ");
        backend.serve_chunks(vec![
            Ok(Bytes::from(sse(&["[PROCESSING]", &partial]))),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            )),
        ]);

        let mut screen = Screen::default();
        let outcome = session.submit("go", &mut screen).await.unwrap();

        assert_eq!(outcome.state, TurnState::Failed);
        assert_eq!(outcome.text, "partial ");
        assert_eq!(screen.snapshots.last().map(String::as_str), Some("partial "));
        assert!(outcome.error.is_some());
        assert_eq!(screen.finished, 0);
        assert!(screen.errors[0].starts_with(STREAM_FAILURE_NOTICE));
        assert_eq!(session.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn stream_ending_without_done_fails() {
        let backend = LoopbackBackend::new();
        let session = bound_session(&backend).await;
        let text = encode_chunk("cut off");
        backend.serve(&sse(&[&text]));

        let mut screen = Screen::default();
        let outcome = session.submit("go", &mut screen).await.unwrap();

        assert_eq!(outcome.state, TurnState::Failed);
        assert_eq!(outcome.text, "cut off");
        assert!(outcome.error.as_ref().is_some_and(Error::is_streaming));
    }

    #[tokio::test]
    async fn refused_stream_fails_turn() {
        let backend = LoopbackBackend::new();
        let session = bound_session(&backend).await;

        let mut screen = Screen::default();
        let outcome = session.submit("go", &mut screen).await.unwrap();

        assert_eq!(outcome.state, TurnState::Failed);
        assert!(outcome.text.is_empty());
        assert!(screen.errors[0].contains("Session limit reached"));
    }

    #[tokio::test]
    async fn sse_framing_survives_chunk_boundaries() {
        let backend = LoopbackBackend::new();
        let session = bound_session(&backend).await;
        let body = format!(
            ": keep-alive\r\n\r\ndata: [PROCESSING]\r\n\r\ndata: {}\r\n\r\ndata: [DONE]\r\n\r\n",
            encode_chunk("héllo")
        );
        let bytes = body.into_bytes();
        let chunks = bytes
            .chunks(3)
            .map(|piece| Ok(Bytes::copy_from_slice(piece)))
            .collect();
        backend.serve_chunks(chunks);

        let mut screen = Screen::default();
        let outcome = session.submit("go", &mut screen).await.unwrap();

        assert!(outcome.is_completed());
        assert_eq!(outcome.text, "héllo");
    }

    #[tokio::test]
    async fn logger_sees_binds_frames_and_turns() {
        let backend = LoopbackBackend::new();
        let journal = Arc::new(Journal::default());
        let session = ChatSession::new(backend.clone(), GenerationParams::default())
            .with_logger(journal.clone());
        session.bind("tinyllama").await.unwrap();
        session.bind("tinyllama").await.unwrap();
        let chunk = encode_chunk("x");
        backend.serve(&sse(&["[PROCESSING]", &chunk, "[DONE]"]));

        let mut screen = Screen::default();
        session.submit("go", &mut screen).await.unwrap();

        assert_eq!(*journal.binds.lock().unwrap(), vec!["tinyllama".to_string()]);
        assert_eq!(
            *journal.frames.lock().unwrap(),
            vec![
                StreamFrame::Processing,
                StreamFrame::DataChunk("x".to_string()),
                StreamFrame::Done,
            ]
        );
        assert_eq!(*journal.turns.lock().unwrap(), vec![TurnState::Completed]);

        let stats = session.stats();
        assert_eq!(stats.turns_completed, 1);
        assert_eq!(stats.binds, 1);
        assert_eq!(stats.chars_received, 1);
    }

    #[tokio::test]
    async fn parameters_flow_to_the_stream_request() {
        let backend = LoopbackBackend::new();
        let mut session = bound_session(&backend).await;
        session.set_max_tokens(64).unwrap();
        session.set_temperature(0.0).unwrap();
        session.set_top_p(1.0).unwrap();
        assert!(session.set_top_p(1.5).is_err());
        backend.serve(&sse(&["[DONE]"]));

        let mut screen = Screen::default();
        session.submit("go", &mut screen).await.unwrap();

        let opened = backend.opened();
        assert_eq!(opened[0].2, GenerationParams::new(64, 0.0, 1.0).unwrap());
    }

    #[tokio::test]
    #[ignore = "requires a running backend at MURMUR_BASE_URL"]
    async fn live_backend_lists_models() {
        let client = murmur::Client::new(None).expect("client");
        let models = client.list_models().await.expect("models");
        assert!(!models.is_empty());
    }
}
