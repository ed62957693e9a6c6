//! Request Router
//!
//! The entry point for completions. Walks a fixed provider priority list,
//! asks the [`ProviderManager`] for capacity and a credential, invokes the
//! matching adapter, and reports every outcome back to the manager.
//!
//! # Usage
//!
//! ```ignore
//! let router = RequestRouter::new(manager, vec![ProviderId::Groq, ProviderId::Gemini])
//!     .with_adapter(groq)
//!     .with_adapter(gemini);
//!
//! let response = router.complete(&ChatRequest::from_prompt("Hello")).await;
//! let mut stream = router.complete_stream(ChatRequest::from_prompt("Hello"));
//! while let Some(chunk) = stream.next_chunk().await { /* ... */ }
//! ```

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::Stream;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::fallback::{classify_error, ErrorClass, FallbackContext, Phase, SkipReason};
use crate::backend::{
    AdapterError, ChatRequest, ChatResponse, ModelInfo, ProviderAdapter, StreamChunk, StreamEvent,
    TokenUsage,
};
use crate::pool::{CredentialLease, ProviderHealth, ProviderManager};
use crate::providers::{Capability, ProviderId};

/// Channel depth between the routing task and a [`ChatStream`]
const STREAM_CHANNEL_CAPACITY: usize = 100;

type Candidate = (ProviderId, Option<Arc<dyn ProviderAdapter>>);

// ============================================================================
// Request Router
// ============================================================================

/// Routes normalized requests across providers with two-phase fallback
pub struct RequestRouter {
    manager: Arc<ProviderManager>,
    adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
    priority: Vec<ProviderId>,
}

impl RequestRouter {
    /// Create a router over a shared manager and a priority order
    #[must_use]
    pub fn new(manager: Arc<ProviderManager>, priority: Vec<ProviderId>) -> Self {
        Self {
            manager,
            adapters: HashMap::new(),
            priority,
        }
    }

    /// Register an adapter for its provider
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        tracing::debug!(provider = %adapter.provider(), "Registered adapter");
        self.adapters.insert(adapter.provider(), adapter);
        self
    }

    /// Shared provider manager
    #[must_use]
    pub fn manager(&self) -> Arc<ProviderManager> {
        Arc::clone(&self.manager)
    }

    /// Provider priority order
    #[must_use]
    pub fn priority(&self) -> &[ProviderId] {
        &self.priority
    }

    fn candidates(&self, capability: Capability) -> Vec<Candidate> {
        self.priority
            .iter()
            .map(|&provider| {
                let adapter = self
                    .adapters
                    .get(&provider)
                    .filter(|_| provider.supports(capability))
                    .cloned();
                (provider, adapter)
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Single-shot
    // ------------------------------------------------------------------------

    /// Complete a request, trying every provider in two passes
    ///
    /// Never fails with a Rust error: total exhaustion is reported as a
    /// response with `success == false` and a summary of up to three
    /// provider errors.
    pub async fn complete(&self, request: &ChatRequest) -> ChatResponse {
        let start = Instant::now();
        let mut ctx = FallbackContext::new(Uuid::new_v4().to_string());

        if let Err(e) = request.validate() {
            tracing::warn!(request_id = %ctx.request_id, error = %e, "Rejected invalid request");
            return finish(ChatResponse::failed(e.to_string()), start);
        }

        let candidates = self.candidates(request.capability);

        if let Some(response) = self.run_pass(&candidates, request, &mut ctx).await {
            return finish(response, start);
        }

        tracing::warn!(
            request_id = %ctx.request_id,
            "All providers exhausted, resetting pools for a forced retry"
        );
        self.manager.reset_all(None);
        ctx.enter_phase(Phase::ForcedRetry);

        if let Some(response) = self.run_pass(&candidates, request, &mut ctx).await {
            return finish(response, start);
        }

        let summary = ctx.summary();
        tracing::error!(
            request_id = %ctx.request_id,
            error = %summary,
            attempts = %ctx.trail(),
            "Request failed on every provider"
        );
        finish(ChatResponse::failed(summary), start)
    }

    async fn run_pass(
        &self,
        candidates: &[Candidate],
        request: &ChatRequest,
        ctx: &mut FallbackContext,
    ) -> Option<ChatResponse> {
        for (provider, adapter) in candidates {
            let provider = *provider;
            let Some(adapter) = adapter else {
                ctx.record_skip(provider, SkipReason::Unsupported);
                continue;
            };
            let Some(lease) = acquire(&self.manager, provider, ctx) else {
                continue;
            };

            tracing::debug!(
                request_id = %ctx.request_id,
                provider = %provider,
                credential = lease.index(),
                phase = %ctx.phase(),
                "Calling provider"
            );

            match adapter.call(&lease, request).await {
                Ok(response) => {
                    self.manager.mark_success(provider, lease.index());
                    ctx.record_success(provider);
                    tracing::info!(
                        request_id = %ctx.request_id,
                        provider = %provider,
                        model = response.model.as_deref().unwrap_or_default(),
                        "Completion served"
                    );
                    return Some(response);
                }
                Err(err) => report_failure(&self.manager, ctx, &lease, &err),
            }
        }
        None
    }

    // ------------------------------------------------------------------------
    // Streaming
    // ------------------------------------------------------------------------

    /// Stream a completion from the first provider that accepts it
    ///
    /// Capacity-aware pass only. A provider that fails before producing any
    /// text is abandoned for the next one; once text has been delivered a
    /// failure ends the stream. Must be called inside a tokio runtime.
    ///
    /// Marks the request with `stream = true` before handing it to adapters.
    #[must_use]
    pub fn complete_stream(&self, mut request: ChatRequest) -> ChatStream {
        let start = Instant::now();
        request.stream = true;
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let ctx = FallbackContext::new(Uuid::new_v4().to_string());

        if let Err(e) = request.validate() {
            tracing::warn!(request_id = %ctx.request_id, error = %e, "Rejected invalid stream request");
            let _ = tx.try_send(terminal_error(e.to_string()));
            return ChatStream::new(rx, start);
        }

        let candidates = self.candidates(request.capability);
        let manager = Arc::clone(&self.manager);
        tokio::spawn(drive_stream(manager, candidates, request, tx, ctx));

        ChatStream::new(rx, start)
    }

    // ------------------------------------------------------------------------
    // Observability
    // ------------------------------------------------------------------------

    /// Capacity summary per provider
    #[must_use]
    pub fn health_status(&self) -> Vec<ProviderHealth> {
        self.manager.health_status()
    }

    /// Models of every registered adapter, in priority order
    #[must_use]
    pub fn available_models(&self) -> Vec<ModelInfo> {
        let mut providers: Vec<ProviderId> = self.adapters.keys().copied().collect();
        providers.sort_by_key(|p| {
            (
                self.priority.iter().position(|q| q == p).unwrap_or(usize::MAX),
                *p,
            )
        });

        providers
            .into_iter()
            .filter_map(|provider| self.adapters.get(&provider).map(|a| (provider, a)))
            .flat_map(|(provider, adapter)| {
                let available = self.manager.has_capacity(provider);
                let default_model = adapter.default_model().to_string();
                adapter.models().into_iter().map(move |id| ModelInfo {
                    is_default: id == default_model,
                    id,
                    provider,
                    available,
                })
            })
            .collect()
    }
}

// ============================================================================
// Shared Helpers
// ============================================================================

fn finish(mut response: ChatResponse, start: Instant) -> ChatResponse {
    response.elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    response
}

/// Capacity check (phase 1 only) and credential selection
fn acquire(
    manager: &ProviderManager,
    provider: ProviderId,
    ctx: &mut FallbackContext,
) -> Option<CredentialLease> {
    if ctx.phase() == Phase::CapacityAware && !manager.has_capacity(provider) {
        tracing::debug!(request_id = %ctx.request_id, provider = %provider, "Skipping provider without capacity");
        ctx.record_skip(provider, SkipReason::NoCapacity);
        return None;
    }
    let lease = manager.next_credential(provider);
    if lease.is_none() {
        ctx.record_skip(provider, SkipReason::NoCapacity);
    }
    lease
}

fn report_failure(
    manager: &ProviderManager,
    ctx: &mut FallbackContext,
    lease: &CredentialLease,
    err: &AdapterError,
) {
    let provider = lease.provider();
    let message = err.to_string();
    let class = classify_error(&message);
    manager.mark_error(provider, lease.index(), &message, class == ErrorClass::RateLimited);
    ctx.record_failure(provider, &message, class);
    tracing::warn!(
        request_id = %ctx.request_id,
        provider = %provider,
        credential = lease.index(),
        rate_limited = class == ErrorClass::RateLimited,
        error = %message,
        "Provider call failed"
    );
}

fn terminal_error(error: String) -> StreamChunk {
    StreamChunk {
        terminal: true,
        error: Some(error),
        ..Default::default()
    }
}

async fn drive_stream(
    manager: Arc<ProviderManager>,
    candidates: Vec<Candidate>,
    request: ChatRequest,
    tx: mpsc::Sender<StreamChunk>,
    mut ctx: FallbackContext,
) {
    for (provider, adapter) in candidates {
        let Some(adapter) = adapter else {
            ctx.record_skip(provider, SkipReason::Unsupported);
            continue;
        };
        let Some(lease) = acquire(&manager, provider, &mut ctx) else {
            continue;
        };
        let model = adapter.resolve_model(&request);

        let opened = tokio::select! {
            () = tx.closed() => return,
            opened = adapter.open_stream(&lease, &request) => opened,
        };
        let mut events = match opened {
            Ok(events) => events,
            Err(err) => {
                report_failure(&manager, &mut ctx, &lease, &err);
                continue;
            }
        };
        tracing::debug!(request_id = %ctx.request_id, provider = %provider, "Stream opened");

        let mut delivered = false;
        let failure = loop {
            let event = tokio::select! {
                () = tx.closed() => {
                    tracing::debug!(request_id = %ctx.request_id, "Caller dropped the stream");
                    return;
                }
                event = events.recv() => event,
            };

            match event {
                Some(StreamEvent::Delta(text)) => {
                    let first = !delivered;
                    delivered = true;
                    let chunk = StreamChunk {
                        delta: text,
                        provider: first.then_some(provider),
                        model: first.then(|| model.clone()),
                        ..Default::default()
                    };
                    if tx.send(chunk).await.is_err() {
                        return;
                    }
                }
                Some(StreamEvent::Done { usage, model: reported }) => {
                    manager.mark_success(provider, lease.index());
                    ctx.record_success(provider);
                    let _ = tx
                        .send(StreamChunk {
                            terminal: true,
                            provider: Some(provider),
                            model: Some(reported.unwrap_or(model)),
                            usage: Some(usage),
                            ..Default::default()
                        })
                        .await;
                    return;
                }
                Some(StreamEvent::Error(err)) => break err,
                None => {
                    break AdapterError::StreamInterrupted("adapter closed the stream".to_string())
                }
            }
        };

        report_failure(&manager, &mut ctx, &lease, &failure);
        if delivered {
            let _ = tx
                .send(StreamChunk {
                    terminal: true,
                    provider: Some(provider),
                    model: Some(model),
                    error: Some(failure.to_string()),
                    ..Default::default()
                })
                .await;
            return;
        }
    }

    let summary = ctx.summary();
    tracing::error!(
        request_id = %ctx.request_id,
        error = %summary,
        attempts = %ctx.trail(),
        "Stream failed on every provider"
    );
    let _ = tx.send(terminal_error(summary)).await;
}

// ============================================================================
// Chat Stream
// ============================================================================

/// Lazily pulled sequence of [`StreamChunk`]s
///
/// Yields exactly one terminal chunk, last. Dropping the stream cancels the
/// routing task and the upstream request.
#[derive(Debug)]
pub struct ChatStream {
    receiver: mpsc::Receiver<StreamChunk>,
    finished: bool,
    started: Instant,
}

impl ChatStream {
    fn new(receiver: mpsc::Receiver<StreamChunk>, started: Instant) -> Self {
        Self {
            receiver,
            finished: false,
            started,
        }
    }

    fn accept(&mut self, chunk: Option<StreamChunk>) -> Option<StreamChunk> {
        if self.finished {
            return None;
        }
        match chunk {
            Some(chunk) => {
                self.finished = chunk.terminal;
                Some(chunk)
            }
            None => {
                // Routing task vanished without a terminal chunk
                self.finished = true;
                Some(terminal_error("stream closed unexpectedly".to_string()))
            }
        }
    }

    /// Next chunk, or `None` after the terminal chunk
    pub async fn next_chunk(&mut self) -> Option<StreamChunk> {
        if self.finished {
            return None;
        }
        let chunk = self.receiver.recv().await;
        self.accept(chunk)
    }

    /// Drain the stream into a single response
    ///
    /// `elapsed_ms` counts from the [`RequestRouter::complete_stream`] call.
    pub async fn into_response(mut self) -> ChatResponse {
        let start = self.started;
        let mut content = String::new();
        let mut provider = None;
        let mut model = None;
        let mut usage = TokenUsage::default();
        let mut error = None;

        while let Some(chunk) = self.next_chunk().await {
            content.push_str(&chunk.delta);
            provider = chunk.provider.or(provider);
            model = chunk.model.or(model);
            if let Some(u) = chunk.usage {
                usage = u;
            }
            if chunk.terminal {
                error = chunk.error;
            }
        }

        let response = ChatResponse {
            success: error.is_none(),
            content,
            provider,
            model,
            usage,
            error,
            elapsed_ms: 0,
        };
        finish(response, start)
    }
}

impl Stream for ChatStream {
    type Item = StreamChunk;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match this.receiver.poll_recv(cx) {
            Poll::Ready(chunk) => Poll::Ready(this.accept(chunk)),
            Poll::Pending => Poll::Pending,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::backend::ChatMessage;
    use crate::routing::test_utils::{MockAdapter, MockOutcome};

    fn three_providers() -> Arc<ProviderManager> {
        Arc::new(
            ProviderManager::new()
                .with_pool(ProviderId::Groq, 100, ["g0", "g1"])
                .with_pool(ProviderId::OpenRouter, 100, ["o0"])
                .with_pool(ProviderId::DeepSeek, 100, ["d0"]),
        )
    }

    const PRIORITY: [ProviderId; 3] = [ProviderId::Groq, ProviderId::OpenRouter, ProviderId::DeepSeek];

    fn server_error() -> AdapterError {
        AdapterError::http(500, "internal error")
    }

    #[tokio::test]
    async fn test_first_provider_serves() {
        let manager = three_providers();
        let groq = Arc::new(MockAdapter::new(ProviderId::Groq).replying("hi"));
        let router = RequestRouter::new(Arc::clone(&manager), PRIORITY.to_vec()).with_adapter(groq.clone());

        let response = router.complete(&ChatRequest::from_prompt("hello")).await;

        assert!(response.success);
        assert_eq!(response.content, "hi");
        assert_eq!(response.provider, Some(ProviderId::Groq));
        assert_eq!(groq.calls(), 1);
        assert_eq!(manager.snapshot(ProviderId::Groq)[0].requests_served_today, 1);
        assert_eq!(manager.reset_count(), 0);
    }

    #[tokio::test]
    async fn test_falls_through_on_error() {
        let manager = three_providers();
        let groq = Arc::new(MockAdapter::new(ProviderId::Groq).failing(server_error()));
        let openrouter = Arc::new(
            MockAdapter::new(ProviderId::OpenRouter).failing(AdapterError::http(429, "Too Many Requests")),
        );
        let deepseek = Arc::new(MockAdapter::new(ProviderId::DeepSeek).replying("ok"));
        let router = RequestRouter::new(Arc::clone(&manager), PRIORITY.to_vec())
            .with_adapter(groq)
            .with_adapter(openrouter)
            .with_adapter(deepseek);

        let response = router.complete(&ChatRequest::from_prompt("hello")).await;

        assert!(response.success);
        assert_eq!(response.provider, Some(ProviderId::DeepSeek));

        // 500 leaves the credential usable, 429 disables it
        let groq_state = &manager.snapshot(ProviderId::Groq)[0];
        assert!(!groq_state.is_rate_limited);
        assert_eq!(groq_state.consecutive_errors, 1);
        assert!(manager.snapshot(ProviderId::OpenRouter)[0].is_rate_limited);
        assert!(!manager.has_capacity(ProviderId::OpenRouter));
    }

    #[tokio::test]
    async fn test_two_phase_fallback_resets_once_and_retries_all() {
        let manager = three_providers();
        manager.mark_error(ProviderId::Groq, 0, "429", true);
        manager.mark_error(ProviderId::Groq, 1, "429", true);
        manager.mark_error(ProviderId::OpenRouter, 0, "quota", true);

        let groq = Arc::new(MockAdapter::new(ProviderId::Groq).replying("recovered"));
        let openrouter = Arc::new(MockAdapter::new(ProviderId::OpenRouter).replying("unused"));
        let deepseek = Arc::new(MockAdapter::new(ProviderId::DeepSeek).failing(server_error()));
        let router = RequestRouter::new(Arc::clone(&manager), PRIORITY.to_vec())
            .with_adapter(groq.clone())
            .with_adapter(openrouter.clone())
            .with_adapter(deepseek.clone());

        let response = router.complete(&ChatRequest::from_prompt("hello")).await;

        assert!(response.success);
        assert_eq!(response.provider, Some(ProviderId::Groq));
        assert_eq!(response.content, "recovered");
        assert_eq!(manager.reset_count(), 1);
        assert_eq!(groq.calls(), 1);
        assert_eq!(openrouter.calls(), 0);
        assert_eq!(deepseek.calls(), 1);
    }

    #[tokio::test]
    async fn test_total_exhaustion_reports_phase_one_errors() {
        let manager = three_providers();
        let groq = Arc::new(MockAdapter::new(ProviderId::Groq).failing(server_error()));
        let openrouter = Arc::new(MockAdapter::new(ProviderId::OpenRouter).failing(AdapterError::Timeout));
        let deepseek = Arc::new(
            MockAdapter::new(ProviderId::DeepSeek).failing(AdapterError::Malformed("no choices".into())),
        );
        let router = RequestRouter::new(Arc::clone(&manager), PRIORITY.to_vec())
            .with_adapter(groq.clone())
            .with_adapter(openrouter.clone())
            .with_adapter(deepseek.clone());

        let response = router.complete(&ChatRequest::from_prompt("hello")).await;

        assert!(!response.success);
        assert_eq!(response.provider, None);
        assert_eq!(
            response.error.as_deref(),
            Some(
                "All providers failed: groq: HTTP 500: internal error; \
                 openrouter: request timed out; deepseek: malformed response: no choices"
            )
        );
        assert_eq!(manager.reset_count(), 1);
        // Each provider tried once per phase
        assert_eq!(groq.calls(), 2);
        assert_eq!(openrouter.calls(), 2);
        assert_eq!(deepseek.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalid_request_touches_nothing() {
        let manager = three_providers();
        let groq = Arc::new(MockAdapter::new(ProviderId::Groq).replying("hi"));
        let router = RequestRouter::new(Arc::clone(&manager), PRIORITY.to_vec()).with_adapter(groq.clone());

        let request = ChatRequest::new(vec![ChatMessage::user("q"), ChatMessage::assistant("a")]);
        let response = router.complete(&request).await;

        assert!(!response.success);
        assert_eq!(groq.calls(), 0);
        assert_eq!(manager.reset_count(), 0);
    }

    #[tokio::test]
    async fn test_capability_filter_skips_unsupported() {
        let manager = Arc::new(
            ProviderManager::new()
                .with_pool(ProviderId::Groq, 10, ["g"])
                .with_pool(ProviderId::Gemini, 10, ["m"]),
        );
        let groq = Arc::new(MockAdapter::new(ProviderId::Groq).replying("groq"));
        let gemini = Arc::new(MockAdapter::new(ProviderId::Gemini).replying("gemini"));
        let router = RequestRouter::new(Arc::clone(&manager), vec![ProviderId::Groq, ProviderId::Gemini])
            .with_adapter(groq.clone())
            .with_adapter(gemini);

        let request = ChatRequest::from_prompt("describe").with_capability(Capability::Vision);
        let response = router.complete(&request).await;

        assert_eq!(response.provider, Some(ProviderId::Gemini));
        assert_eq!(groq.calls(), 0);
    }

    #[tokio::test]
    async fn test_rotation_through_router() {
        let manager = three_providers();
        let groq = Arc::new(MockAdapter::new(ProviderId::Groq).replying("hi"));
        let router = RequestRouter::new(Arc::clone(&manager), PRIORITY.to_vec()).with_adapter(groq.clone());

        for _ in 0..4 {
            router.complete(&ChatRequest::from_prompt("hello")).await;
        }
        assert_eq!(groq.credentials_seen(), vec![0, 1, 0, 1]);
    }

    #[tokio::test]
    async fn test_stream_passes_through_single_provider() {
        let manager = three_providers();
        let groq = Arc::new(MockAdapter::new(ProviderId::Groq).then(MockOutcome::Stream(vec![
            StreamEvent::Delta("Hel".into()),
            StreamEvent::Delta("lo".into()),
            StreamEvent::Done {
                usage: TokenUsage::from_parts(Some(2), Some(2), None),
                model: None,
            },
        ])));
        let router = RequestRouter::new(Arc::clone(&manager), PRIORITY.to_vec()).with_adapter(groq);

        let chunks: Vec<StreamChunk> = router
            .complete_stream(ChatRequest::from_prompt("hi"))
            .collect()
            .await;

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.iter().filter(|c| c.terminal).count(), 1);
        assert!(chunks.last().unwrap().terminal);
        assert_eq!(chunks[0].provider, Some(ProviderId::Groq));
        assert_eq!(chunks[1].provider, None);
        let last = chunks.last().unwrap();
        assert_eq!(last.provider, Some(ProviderId::Groq));
        assert_eq!(last.usage.map(|u| u.total_tokens), Some(4));
        assert_eq!(manager.snapshot(ProviderId::Groq)[0].requests_served_today, 1);
    }

    #[tokio::test]
    async fn test_stream_moves_on_before_first_delta() {
        let manager = three_providers();
        let groq = Arc::new(
            MockAdapter::new(ProviderId::Groq).then(MockOutcome::Fail(AdapterError::http(429, "slow down"))),
        );
        let openrouter = Arc::new(MockAdapter::new(ProviderId::OpenRouter).then(MockOutcome::Stream(vec![
            StreamEvent::Error(AdapterError::Timeout),
        ])));
        let deepseek = Arc::new(MockAdapter::new(ProviderId::DeepSeek).replying("fine"));
        let router = RequestRouter::new(Arc::clone(&manager), PRIORITY.to_vec())
            .with_adapter(groq)
            .with_adapter(openrouter)
            .with_adapter(deepseek);

        let response = router
            .complete_stream(ChatRequest::from_prompt("hi"))
            .into_response()
            .await;

        assert!(response.success);
        assert_eq!(response.content, "fine");
        assert_eq!(response.provider, Some(ProviderId::DeepSeek));
        assert!(manager.snapshot(ProviderId::Groq)[0].is_rate_limited);
        assert_eq!(manager.snapshot(ProviderId::OpenRouter)[0].consecutive_errors, 1);
        // Streams never force a reset
        assert_eq!(manager.reset_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_failure_after_content_is_terminal() {
        let manager = three_providers();
        let groq = Arc::new(MockAdapter::new(ProviderId::Groq).then(MockOutcome::Stream(vec![
            StreamEvent::Delta("partial".into()),
            StreamEvent::Error(AdapterError::Transport("connection reset".into())),
        ])));
        let openrouter = Arc::new(MockAdapter::new(ProviderId::OpenRouter).replying("never"));
        let router = RequestRouter::new(Arc::clone(&manager), PRIORITY.to_vec())
            .with_adapter(groq)
            .with_adapter(openrouter.clone());

        let chunks: Vec<StreamChunk> = router
            .complete_stream(ChatRequest::from_prompt("hi"))
            .collect()
            .await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].delta, "partial");
        assert!(chunks[1].terminal);
        assert_eq!(
            chunks[1].error.as_deref(),
            Some("transport error: connection reset")
        );
        assert_eq!(openrouter.stream_calls(), 0);
    }

    #[tokio::test]
    async fn test_stream_exhaustion_is_single_terminal_chunk() {
        let manager = three_providers();
        manager.mark_error(ProviderId::Groq, 0, "429", true);
        manager.mark_error(ProviderId::Groq, 1, "429", true);
        let openrouter = Arc::new(MockAdapter::new(ProviderId::OpenRouter).failing(server_error()));
        let router = RequestRouter::new(Arc::clone(&manager), PRIORITY.to_vec())
            .with_adapter(Arc::new(MockAdapter::new(ProviderId::Groq).replying("x")))
            .with_adapter(openrouter);

        let mut stream = router.complete_stream(ChatRequest::from_prompt("hi"));
        let only = stream.next_chunk().await.unwrap();
        assert!(only.terminal);
        assert_eq!(
            only.error.as_deref(),
            Some("All providers failed: openrouter: HTTP 500: internal error")
        );
        assert!(stream.next_chunk().await.is_none());
        assert_eq!(manager.reset_count(), 0);
    }

    #[tokio::test]
    async fn test_dropping_stream_records_nothing() {
        let manager = three_providers();
        let groq = Arc::new(MockAdapter::new(ProviderId::Groq).then(MockOutcome::Hang));
        let router = RequestRouter::new(Arc::clone(&manager), PRIORITY.to_vec()).with_adapter(groq.clone());

        let stream = router.complete_stream(ChatRequest::from_prompt("hi"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(groq.stream_calls(), 1);
        drop(stream);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(groq.upstream_released());
        let state = &manager.snapshot(ProviderId::Groq)[0];
        assert_eq!(state.requests_served_today, 0);
        assert_eq!(state.consecutive_errors, 0);
    }

    #[tokio::test]
    async fn test_stream_flag_follows_entry_point() {
        let manager = three_providers();
        let groq = Arc::new(MockAdapter::new(ProviderId::Groq).replying("ok"));
        let router = RequestRouter::new(Arc::clone(&manager), PRIORITY.to_vec()).with_adapter(groq.clone());

        let _ = router.complete(&ChatRequest::from_prompt("one")).await;
        let _ = router
            .complete_stream(ChatRequest::from_prompt("two"))
            .into_response()
            .await;

        assert_eq!(groq.stream_flags(), vec![false, true]);
    }

    #[tokio::test]
    async fn test_stream_elapsed_counts_from_request() {
        let manager = three_providers();
        let router = RequestRouter::new(Arc::clone(&manager), PRIORITY.to_vec())
            .with_adapter(Arc::new(MockAdapter::new(ProviderId::Groq).replying("ok")));

        let stream = router.complete_stream(ChatRequest::from_prompt("hi"));
        tokio::time::sleep(Duration::from_millis(40)).await;
        let response = stream.into_response().await;

        assert!(response.success);
        assert!(response.elapsed_ms >= 40, "elapsed_ms = {}", response.elapsed_ms);
    }

    #[tokio::test]
    async fn test_available_models_in_priority_order() {
        let manager = three_providers();
        manager.mark_error(ProviderId::DeepSeek, 0, "quota", true);
        let router = RequestRouter::new(Arc::clone(&manager), vec![ProviderId::DeepSeek, ProviderId::Groq])
            .with_adapter(Arc::new(MockAdapter::new(ProviderId::Groq)))
            .with_adapter(Arc::new(MockAdapter::new(ProviderId::DeepSeek)));

        let models = router.available_models();
        assert_eq!(models[0].provider, ProviderId::DeepSeek);
        assert!(!models[0].available);
        assert!(models[0].is_default);
        assert_eq!(models.last().unwrap().provider, ProviderId::Groq);
        assert!(models.last().unwrap().available);
    }
}
