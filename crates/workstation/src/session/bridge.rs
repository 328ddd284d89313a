//! Bridges a bidirectional message channel to a PTY session.
//!
//! One bridge run owns one shell. Two pumps move data:
//!
//! ```text
//! channel ──▶ inbound pump  ──▶ classify ──▶ pty write / resize
//! channel ◀── outbound pump ◀── reader thread ◀── pty
//! ```
//!
//! Whichever pump stops first cancels the shared token, which stops the
//! other. The session is then closed exactly once, which kills and reaps
//! the shell and releases the PTY.

use std::fmt::Display;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use protocol::{classify, Frame, InboundAction, TerminalSize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::pty::{Session, SessionError, SessionId, SessionStatus, ShellCommand};
use super::registry::SessionRegistry;
use super::welcome::WelcomeComposer;
use crate::config::{ExtensionsConfig, ShellConfig};

/// What the session writes before the pumps start.
#[derive(Debug, Clone, Default)]
pub struct Preamble {
    /// Banner sent to the client as one binary frame.
    pub banner: Option<String>,
    /// Bytes written to the shell's input.
    pub init_sequence: Vec<u8>,
}

/// Why a pump stopped.
#[derive(Debug)]
enum PumpExit {
    Cancelled,
    ChannelClosed,
    ChannelError(String),
    ClientClose,
    PtyClosed,
    PtyError(SessionError),
}

/// Serves browser shell sessions.
pub struct SessionBridge {
    command: ShellCommand,
    init_sequence: String,
    initial_size: TerminalSize,
    composer: WelcomeComposer,
    registry: Arc<SessionRegistry>,
}

impl SessionBridge {
    /// Creates a bridge that launches the configured interactive shell.
    pub fn new(
        shell: &ShellConfig,
        extensions: &ExtensionsConfig,
        composer: WelcomeComposer,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            command: ShellCommand::interactive(shell, extensions),
            init_sequence: shell.init_sequence.clone(),
            initial_size: TerminalSize::new(shell.default_cols, shell.default_rows),
            composer,
            registry,
        }
    }

    /// Replaces the shell command.
    pub fn with_command(mut self, command: ShellCommand) -> Self {
        self.command = command;
        self
    }

    /// Returns the registry sessions are tracked in.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Runs one session over the given channel until either side ends.
    ///
    /// If the shell cannot be started, a single text notice is sent and the
    /// channel is closed.
    pub async fn serve<St, Si, E>(&self, stream: St, sink: Si) -> Result<SessionStatus, SessionError>
    where
        St: Stream<Item = Result<Frame, E>> + Send + 'static,
        E: Display + Send + 'static,
        Si: Sink<Frame> + Send + 'static,
        Si::Error: Display,
    {
        let banner = self.composer.compose().await;

        let mut sink = Box::pin(sink);
        let session = match Session::spawn(&self.command, self.initial_size) {
            Ok(session) => Arc::new(session),
            Err(e) => {
                tracing::error!(error = %e, shell = %self.command.program, "Shell launch failed");
                let notice = Frame::text(format!("pty start failed: {}\r\n", e));
                if let Err(send_err) = sink.send(notice).await {
                    tracing::debug!(error = %send_err, "Could not deliver launch failure");
                }
                let _ = sink.close().await;
                return Err(e);
            }
        };

        let id = session.id().clone();
        self.registry.register(Arc::clone(&session));

        let preamble = Preamble {
            banner: Some(banner),
            init_sequence: self.init_sequence.clone().into_bytes(),
        };
        let result = run_session(session, stream, sink, preamble).await;

        self.registry.remove(&id);
        result
    }
}

/// Drives an already spawned session over a channel.
///
/// Sends the preamble, runs both pumps until one stops, then closes the
/// session and returns its exit status.
pub async fn run_session<St, Si, E>(
    session: Arc<Session>,
    stream: St,
    sink: Si,
    preamble: Preamble,
) -> Result<SessionStatus, SessionError>
where
    St: Stream<Item = Result<Frame, E>> + Send + 'static,
    E: Display + Send + 'static,
    Si: Sink<Frame> + Send + 'static,
    Si::Error: Display,
{
    let token = CancellationToken::new();
    // Stops both pumps if this future is dropped mid-session.
    let _guard = token.clone().drop_guard();

    let id = session.id().clone();
    let mut sink = Box::pin(sink);

    let started = start(&session, &mut sink, preamble).await;
    let output = match started {
        Ok(output) => output,
        Err(e) => {
            let _ = sink.close().await;
            session.close().await?;
            return Err(e);
        }
    };

    let outbound = tokio::spawn(outbound_pump(
        id.clone(),
        output,
        sink,
        token.clone(),
    ));
    let inbound = tokio::spawn(inbound_pump(
        Arc::clone(&session),
        Box::pin(stream),
        token.clone(),
    ));

    let (outbound, inbound) = tokio::join!(outbound, inbound);
    for (pump, exit) in [("outbound", outbound), ("inbound", inbound)] {
        match exit {
            Ok(reason) => tracing::debug!(session_id = %id, pump, reason = ?reason, "Pump stopped"),
            Err(e) => tracing::error!(session_id = %id, pump, error = %e, "Pump panicked"),
        }
    }

    let status = session.close().await?.unwrap_or(SessionStatus::Terminated);
    tracing::info!(session_id = %id, status = ?status, "Session ended");
    Ok(status)
}

/// Starts the reader, sends the banner and injects the init sequence.
async fn start<Si>(
    session: &Session,
    sink: &mut Pin<Box<Si>>,
    preamble: Preamble,
) -> Result<mpsc::Receiver<Vec<u8>>, SessionError>
where
    Si: Sink<Frame>,
    Si::Error: Display,
{
    let output = session.start_reader()?;

    if let Some(banner) = preamble.banner {
        sink.send(Frame::binary(banner.into_bytes()))
            .await
            .map_err(|e| SessionError::WriteFailed(format!("banner: {}", e)))?;
    }

    if !preamble.init_sequence.is_empty() {
        session.write(preamble.init_sequence).await?;
    }

    Ok(output)
}

/// Forwards PTY output to the channel as binary frames, then closes it.
async fn outbound_pump<Si>(
    id: SessionId,
    mut output: mpsc::Receiver<Vec<u8>>,
    mut sink: Pin<Box<Si>>,
    token: CancellationToken,
) -> PumpExit
where
    Si: Sink<Frame>,
    Si::Error: Display,
{
    let exit = loop {
        let chunk = tokio::select! {
            _ = token.cancelled() => break PumpExit::Cancelled,
            chunk = output.recv() => chunk,
        };

        match chunk {
            Some(data) => {
                if let Err(e) = sink.send(Frame::Binary(data)).await {
                    break PumpExit::ChannelError(e.to_string());
                }
            }
            None => break PumpExit::PtyClosed,
        }
    };

    token.cancel();
    if let Err(e) = sink.close().await {
        tracing::trace!(session_id = %id, error = %e, "Channel close failed");
    }
    exit
}

/// Applies client frames to the PTY.
async fn inbound_pump<St, E>(
    session: Arc<Session>,
    mut stream: Pin<Box<St>>,
    token: CancellationToken,
) -> PumpExit
where
    St: Stream<Item = Result<Frame, E>>,
    E: Display,
{
    let exit = loop {
        let next = tokio::select! {
            _ = token.cancelled() => break PumpExit::Cancelled,
            next = stream.next() => next,
        };

        let frame = match next {
            None => break PumpExit::ChannelClosed,
            Some(Err(e)) => break PumpExit::ChannelError(e.to_string()),
            Some(Ok(frame)) => frame,
        };

        match classify(frame) {
            InboundAction::Input(data) => {
                if let Err(e) = session.write(data).await {
                    break PumpExit::PtyError(e);
                }
            }
            InboundAction::Resize(size) => {
                if let Err(e) = session.resize(size) {
                    tracing::warn!(session_id = %session.id(), error = %e, "Resize failed");
                }
            }
            InboundAction::Close => break PumpExit::ClientClose,
            InboundAction::Ignore => {
                tracing::trace!(session_id = %session.id(), "Ignored frame");
            }
        }
    };

    token.cancel();
    exit
}
