//! MCP serving loop.
//!
//! Binds one connection (a line reader and a line writer) to a fresh session
//! and the shared dispatcher:
//!
//! 1. **Reading**: lines are parsed as they arrive. Unparseable lines are
//!    answered with a parse or invalid-request error.
//! 2. **Dispatch**: `initialize` and notifications run inline, so they take
//!    effect before the next line is read. Every other request runs on its
//!    own task and may overlap with later requests.
//! 3. **Writing**: responses and stream notifications go through one writer
//!    task, so lines never interleave.
//! 4. **Shutdown**: EOF cancels every in-flight request, waits for their
//!    final envelopes to be written, then returns.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::mcp::dispatch::{Dispatcher, Notifier, RequestContext, ServerContext};
use crate::error::McpError;
use crate::mcp::protocol::{parse_message, Envelope, RejectedMessage};
use crate::mcp::session::{RequestTracker, SessionState};
use crate::mcp::transport::{self, to_line, Line, LineReader, LineWriter};

/// Outbound lines buffered before senders wait on the writer.
const OUTBOUND_CAPACITY: usize = 256;

/// The MCP server.
#[derive(Debug, Clone)]
pub struct McpServer {
    dispatcher: Arc<Dispatcher>,
}

struct Connection {
    session: Arc<SessionState>,
    requests: Arc<RequestTracker>,
    closed: CancellationToken,
    outbound: mpsc::Sender<String>,
}

impl Connection {
    fn context(&self, cancel: CancellationToken) -> RequestContext {
        RequestContext::new(Arc::clone(&self.session))
            .with_requests(Arc::clone(&self.requests))
            .with_cancel(cancel)
            .with_notifier(Notifier::new(self.outbound.clone()))
    }
}

impl McpServer {
    /// Creates a server around a configured dispatcher.
    #[must_use]
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Creates a server with the built-in protocol handlers.
    #[must_use]
    pub fn from_context(server: ServerContext) -> Self {
        Self::new(Dispatcher::with_builtin_handlers(Arc::new(server)))
    }

    /// The dispatcher shared by every connection.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Serves stdin/stdout until EOF or a shutdown signal.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails or signal handlers cannot be
    /// installed.
    pub async fn run(&self) -> io::Result<()> {
        let (reader, writer) = transport::stdio();
        tokio::select! {
            result = self.serve_lines(reader, writer) => result,
            signal = shutdown_signal() => {
                let signal = signal?;
                info!(signal, "Received signal, initiating graceful shutdown");
                Ok(())
            }
        }
    }

    /// Serves one connection until the reader reaches EOF.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the writer fails.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.serve_lines(LineReader::new(reader), LineWriter::new(writer))
            .await
    }

    async fn serve_lines<R, W>(&self, mut reader: LineReader<R>, mut writer: LineWriter<W>) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, mut lines) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
        let writer_task = tokio::spawn(async move {
            while let Some(line) = lines.recv().await {
                writer.write_line(&line).await?;
            }
            Ok::<_, io::Error>(())
        });

        let connection = Connection {
            session: Arc::new(SessionState::new()),
            requests: Arc::new(RequestTracker::new()),
            closed: CancellationToken::new(),
            outbound,
        };
        info!(session = %connection.session.id(), "Connection opened");

        let mut tasks = JoinSet::new();
        let read_result = loop {
            let line = match reader.read_line().await {
                Ok(Some(Line::Text(line))) => line,
                Ok(Some(Line::NotUtf8(e))) => {
                    self.refuse(
                        &connection,
                        &RejectedMessage {
                            id: None,
                            error: McpError::Parse(format!("line is not valid UTF-8: {e}")),
                        },
                    )
                    .await;
                    continue;
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };
            if line.trim().is_empty() {
                continue;
            }
            self.accept(&connection, &line, &mut tasks).await;

            while let Some(joined) = tasks.try_join_next() {
                log_join(joined);
            }
        };

        let cancelled = connection.requests.cancel_all();
        connection.closed.cancel();
        debug!(cancelled, "Input closed, draining in-flight requests");
        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }

        info!(session = %connection.session.id(), "Connection closed");
        drop(connection);

        let write_result = match writer_task.await {
            Ok(result) => result,
            Err(e) => Err(io::Error::other(e)),
        };
        read_result.and(write_result)
    }

    async fn accept(&self, connection: &Connection, line: &str, tasks: &mut JoinSet<()>) {
        let message = match parse_message(line) {
            Ok(message) => message,
            Err(rejected) => {
                self.refuse(connection, &rejected).await;
                return;
            }
        };

        if message.is_notification() || message.method == "initialize" {
            let ctx = connection.context(connection.closed.child_token());
            if let Some(envelope) = self.dispatcher.handle(&ctx, &message).await {
                send(&connection.outbound, &envelope).await;
            }
            return;
        }

        let tracked = message
            .id
            .as_ref()
            .map(|id| connection.requests.track(id.clone(), &connection.closed));
        let cancel = tracked.as_ref().map_or_else(
            || connection.closed.child_token(),
            |tracked| tracked.token().clone(),
        );
        let ctx = connection.context(cancel);
        let dispatcher = Arc::clone(&self.dispatcher);
        let outbound = connection.outbound.clone();
        tasks.spawn(async move {
            if let Some(envelope) = dispatcher.handle(&ctx, &message).await {
                send(&outbound, &envelope).await;
            }
            if let Some(tracked) = &tracked {
                ctx.requests.finish(tracked);
            }
        });
    }

    async fn refuse(&self, connection: &Connection, rejected: &RejectedMessage) {
        warn!(error = %rejected.error, "Rejected inbound message");
        let envelope = self.dispatcher.reject(rejected);
        send(&connection.outbound, &envelope).await;
    }
}

async fn send(outbound: &mpsc::Sender<String>, envelope: &Envelope) {
    match to_line(envelope) {
        Ok(line) => {
            if outbound.send(line).await.is_err() {
                debug!(id = ?envelope.id(), "Writer closed, dropping response");
            }
        }
        Err(e) => error!(id = ?envelope.id(), error = %e, "Failed to serialise response"),
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Request task failed");
    }
}

/// Waits for SIGINT or SIGTERM and returns its name.
#[cfg(unix)]
async fn shutdown_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => Ok("SIGINT"),
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

/// Waits for Ctrl+C.
#[cfg(windows)]
async fn shutdown_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl+C")
}
