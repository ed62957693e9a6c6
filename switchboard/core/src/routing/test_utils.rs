//! Routing Test Utilities
//!
//! Scripted [`ProviderAdapter`] for exercising fallback without network calls.
//!
//! # Usage
//!
//! ```ignore
//! let groq = Arc::new(
//!     MockAdapter::new(ProviderId::Groq)
//!         .then(MockOutcome::Fail(AdapterError::http(429, "slow down")))
//!         .replying("ok"),
//! );
//!
//! // First call fails, every later call replies "ok"
//! assert_eq!(groq.calls(), 0);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::backend::{
    AdapterError, ChatRequest, ChatResponse, ProviderAdapter, StreamEvent, TokenUsage,
};
use crate::pool::CredentialLease;
use crate::providers::ProviderId;

/// What the mock does for one call
#[derive(Clone, Debug)]
pub enum MockOutcome {
    /// Succeed with this text; streams it as one delta
    Reply(String),
    /// Fail the call, or fail opening the stream
    Fail(AdapterError),
    /// Stream these events verbatim; single-shot calls get the joined deltas
    Stream(Vec<StreamEvent>),
    /// Open a stream that never produces anything
    Hang,
}

/// Adapter whose behaviour is scripted per call
pub struct MockAdapter {
    provider: ProviderId,
    model: String,
    script: Mutex<VecDeque<MockOutcome>>,
    fallback: MockOutcome,
    calls: AtomicUsize,
    stream_calls: AtomicUsize,
    credentials_seen: Mutex<Vec<usize>>,
    stream_flags: Mutex<Vec<bool>>,
    held: Mutex<Vec<mpsc::Sender<StreamEvent>>>,
}

impl MockAdapter {
    /// Mock replying "mock response" to everything
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            model: format!("{provider}-mock"),
            script: Mutex::new(VecDeque::new()),
            fallback: MockOutcome::Reply("mock response".to_string()),
            calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            credentials_seen: Mutex::new(Vec::new()),
            stream_flags: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
        }
    }

    /// Reply with `text` once the script is exhausted
    pub fn replying(mut self, text: &str) -> Self {
        self.fallback = MockOutcome::Reply(text.to_string());
        self
    }

    /// Fail with `err` once the script is exhausted
    pub fn failing(mut self, err: AdapterError) -> Self {
        self.fallback = MockOutcome::Fail(err);
        self
    }

    /// Queue an outcome for the next unscripted call
    pub fn then(self, outcome: MockOutcome) -> Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    /// Single-shot calls made
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Streams opened
    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    /// Credential ordinals used, in call order
    pub fn credentials_seen(&self) -> Vec<usize> {
        self.credentials_seen.lock().unwrap().clone()
    }

    /// `ChatRequest::stream` as received, in call order
    pub fn stream_flags(&self) -> Vec<bool> {
        self.stream_flags.lock().unwrap().clone()
    }

    /// Whether every hanging stream has been dropped by its consumer
    pub fn upstream_released(&self) -> bool {
        self.held.lock().unwrap().iter().all(mpsc::Sender::is_closed)
    }

    fn next_outcome(&self, credential: &CredentialLease, request: &ChatRequest) -> MockOutcome {
        self.credentials_seen.lock().unwrap().push(credential.index());
        self.stream_flags.lock().unwrap().push(request.stream);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn call(
        &self,
        credential: &CredentialLease,
        request: &ChatRequest,
    ) -> Result<ChatResponse, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let model = self.resolve_model(request);
        match self.next_outcome(credential, request) {
            MockOutcome::Reply(text) => Ok(ChatResponse::completed(
                self.provider,
                model,
                text,
                TokenUsage::from_parts(Some(1), Some(1), None),
            )),
            MockOutcome::Fail(err) => Err(err),
            MockOutcome::Stream(events) => {
                let text: String = events
                    .iter()
                    .filter_map(|e| match e {
                        StreamEvent::Delta(d) => Some(d.as_str()),
                        _ => None,
                    })
                    .collect();
                Ok(ChatResponse::completed(self.provider, model, text, TokenUsage::default()))
            }
            MockOutcome::Hang => Err(AdapterError::Timeout),
        }
    }

    async fn open_stream(
        &self,
        credential: &CredentialLease,
        request: &ChatRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, AdapterError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let events = match self.next_outcome(credential, request) {
            MockOutcome::Reply(text) => vec![
                StreamEvent::Delta(text),
                StreamEvent::Done {
                    usage: TokenUsage::from_parts(Some(1), Some(1), None),
                    model: None,
                },
            ],
            MockOutcome::Fail(err) => return Err(err),
            MockOutcome::Stream(events) => events,
            MockOutcome::Hang => {
                let (tx, rx) = mpsc::channel(1);
                self.held.lock().unwrap().push(tx);
                return Ok(rx);
            }
        };

        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            let _ = tx.try_send(event);
        }
        Ok(rx)
    }
}
