//! Streaming invocation engine.
//!
//! Wraps a producer of [`ChunkPayload`]s into an ordered, cancellable event
//! stream:
//!
//! - **Admission**: at most `max_concurrent_streams` streams are open at
//!   once. A request beyond the limit fails immediately with
//!   `StreamCapacity`; nothing is queued.
//! - **Ordering**: a single pump task stamps payloads with sequence numbers
//!   starting at 0 and forwards them through a bounded channel, so the
//!   consumer sees them in production order and a slow consumer applies
//!   backpressure to the producer.
//! - **Termination**: exactly one chunk is final and it is the last one.
//!   A producer that ends without a terminal payload gets a `Complete`
//!   chunk appended.
//! - **Cancellation**: once the caller's token fires, no further chunk is
//!   delivered and no synthetic terminal chunk is added.
//! - **Keep-alive**: when no chunk arrives within the heartbeat interval a
//!   [`StreamEvent::KeepAlive`] is emitted. It carries no sequence number.
//! - **Timeout**: a stream open longer than `max_duration` is cancelled and
//!   ends with a `StreamTimeout` error.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, Stream, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::McpError;
use crate::health::ComponentHealth;
use crate::mcp::dispatch::panic_message;
use crate::tools::{ChunkPayload, ChunkStream, StreamChunk, ToolGroupRegistry, ToolParams};

/// Streaming limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamingConfig {
    /// Maximum number of concurrently open streams.
    pub max_concurrent_streams: usize,
    /// Idle time after which a keep-alive is emitted.
    pub heartbeat_interval: Duration,
    /// Hard limit on how long a stream may stay open.
    pub max_duration: Duration,
    /// Chunks buffered between producer and consumer.
    pub channel_capacity: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_streams: 16,
            heartbeat_interval: Duration::from_secs(15),
            max_duration: Duration::from_secs(300),
            channel_capacity: 32,
        }
    }
}

/// One item of a consumer-facing stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A sequenced protocol chunk.
    Chunk(StreamChunk),
    /// Transport-level idle signal; not part of the chunk sequence.
    KeepAlive,
}

/// Consumer-facing event stream. An `Err` item is always the last item.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, McpError>> + Send + 'static>>;

/// Admission control and lifecycle management for streaming invocations.
#[derive(Debug, Clone)]
pub struct StreamingEngine {
    config: StreamingConfig,
    permits: Arc<Semaphore>,
}

enum Step {
    Chunk(StreamChunk),
    Idle,
    TimedOut,
    Cancelled,
    Closed,
}

impl StreamingEngine {
    /// Creates an engine with the given limits.
    #[must_use]
    pub fn new(config: StreamingConfig) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.max_concurrent_streams)),
            config,
        }
    }

    /// The configured limits.
    #[must_use]
    pub const fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// Number of streams currently open.
    #[must_use]
    pub fn open_streams(&self) -> usize {
        self.config
            .max_concurrent_streams
            .saturating_sub(self.permits.available_permits())
    }

    /// Health of the streaming subsystem; unhealthy while saturated.
    #[must_use]
    pub fn health(&self) -> ComponentHealth {
        let open = self.open_streams();
        let max = self.config.max_concurrent_streams;
        let health = if open >= max {
            ComponentHealth::unhealthy("stream capacity exhausted")
        } else {
            ComponentHealth::healthy()
        };
        health
            .with_metadata("openStreams", open)
            .with_metadata("maxConcurrentStreams", max)
    }

    /// Opens a stream of the named tool.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub async fn open_tool(
        &self,
        registry: &ToolGroupRegistry,
        name: &str,
        params: ToolParams,
        cancel: &CancellationToken,
    ) -> Result<EventStream, McpError> {
        self.open(cancel, |token| registry.invoke_stream(name, params, token))
            .await
    }

    /// Admits a stream and starts its producer.
    ///
    /// `start` receives the token the producer must observe. It is a child of
    /// `cancel`, and the engine also fires it on timeout or when the returned
    /// stream is dropped.
    ///
    /// # Errors
    ///
    /// `StreamCapacity` when the limit is reached, `StreamTimeout` when the
    /// producer does not start within `max_duration`, or whatever `start`
    /// fails with.
    pub async fn open<F, Fut>(
        &self,
        cancel: &CancellationToken,
        start: F,
    ) -> Result<EventStream, McpError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<ChunkStream, McpError>>,
    {
        let limit = self.config.max_concurrent_streams;
        let permit = Arc::clone(&self.permits)
            .try_acquire_owned()
            .map_err(|_| {
                warn!(limit, "Stream rejected, capacity exhausted");
                McpError::StreamCapacity { limit }
            })?;

        let token = cancel.child_token();
        let deadline = Instant::now() + self.config.max_duration;

        let producer = if let Ok(started) = tokio::time::timeout_at(deadline, start(token.clone())).await {
            started?
        } else {
            token.cancel();
            return Err(McpError::StreamTimeout {
                limit: self.config.max_duration,
            });
        };

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        tokio::spawn(pump(producer, tx, token.clone()));

        debug!(open = self.open_streams(), "Stream opened");
        Ok(Box::pin(deliver(
            rx,
            token,
            permit,
            deadline,
            self.config.heartbeat_interval,
            self.config.max_duration,
        )))
    }
}

/// Drains the producer, stamping each payload, until a terminal chunk is
/// sent, the consumer goes away, or the token fires.
///
/// A panicking producer ends the stream with an `Error` chunk.
async fn pump(mut producer: ChunkStream, tx: mpsc::Sender<StreamChunk>, token: CancellationToken) {
    let mut sequence = 0_u64;
    loop {
        let next = tokio::select! {
            biased;
            () = token.cancelled() => return,
            next = AssertUnwindSafe(producer.next()).catch_unwind() => next,
        };

        let payload = match next {
            Ok(Some(payload)) => payload,
            Ok(None) if token.is_cancelled() => return,
            Ok(None) => ChunkPayload::complete(Value::Null),
            Err(panic) => {
                error!(panic = panic_message(&*panic), "Stream producer panicked");
                ChunkPayload::error("tool producer panicked")
            }
        };

        let chunk = StreamChunk::stamp(payload, sequence);
        let is_final = chunk.is_final;

        let sent = tokio::select! {
            biased;
            () = token.cancelled() => return,
            sent = tx.send(chunk) => sent,
        };
        if sent.is_err() || is_final {
            return;
        }
        sequence += 1;
    }
}

fn deliver(
    mut rx: mpsc::Receiver<StreamChunk>,
    token: CancellationToken,
    permit: OwnedSemaphorePermit,
    deadline: Instant,
    heartbeat: Duration,
    max_duration: Duration,
) -> impl Stream<Item = Result<StreamEvent, McpError>> + Send + 'static {
    async_stream::stream! {
        let _permit = permit;
        let _stop_producer = token.clone().drop_guard();

        loop {
            let step = tokio::select! {
                biased;
                () = token.cancelled() => Step::Cancelled,
                () = tokio::time::sleep_until(deadline) => Step::TimedOut,
                received = tokio::time::timeout(heartbeat, rx.recv()) => match received {
                    Ok(Some(chunk)) => Step::Chunk(chunk),
                    Ok(None) => Step::Closed,
                    Err(_) => Step::Idle,
                },
            };

            match step {
                Step::Chunk(chunk) => {
                    if token.is_cancelled() {
                        break;
                    }
                    let is_final = chunk.is_final;
                    yield Ok(StreamEvent::Chunk(chunk));
                    if is_final {
                        break;
                    }
                }
                Step::Idle => yield Ok(StreamEvent::KeepAlive),
                Step::TimedOut => {
                    token.cancel();
                    warn!(limit = ?max_duration, "Stream timed out");
                    yield Err(McpError::StreamTimeout { limit: max_duration });
                    break;
                }
                Step::Cancelled => {
                    debug!("Stream cancelled");
                    break;
                }
                Step::Closed => {
                    if !token.is_cancelled() {
                        error!("Stream producer stopped without a terminal chunk");
                        yield Err(McpError::Internal(
                            "stream ended without a terminal chunk".to_string(),
                        ));
                    }
                    break;
                }
            }
        }
    }
}
