//! Per-connection session driver.
//!
//! [`run_session`] owns every piece of session state. It authenticates,
//! takes an admission slot, streams audio through the engines and finalizes,
//! talking to the client only through a [`Transport`]. Audio buffers are
//! dropped on every exit path.

use crate::admission::AdmissionController;
use crate::audio::window::bytes_for_secs;
use crate::audio::{AudioWindow, FrameBuffer, OverlapPolicy};
use crate::auth::{Identity, StreamAuth};
use crate::defaults;
use crate::engine::Engines;
use crate::error::{CLOSE_NORMAL, LivescribeError, Result};
use crate::session::protocol::{ClientMessage, Frame, Mode, ServerMessage};
use crate::session::state::SessionState;
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Message-framed, bidirectional connection to one client.
#[async_trait]
pub trait Transport: Send {
    /// Next frame, `None` once the client has gone away.
    async fn recv(&mut self) -> Option<Result<Frame>>;

    async fn send(&mut self, message: &ServerMessage) -> Result<()>;

    async fn close(&mut self, code: u16, reason: &str) -> Result<()>;
}

/// Tunables for streaming sessions.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub buffer_secs: f32,
    pub min_audio_secs: f32,
    pub overlap: OverlapPolicy,
    pub min_energy: f32,
    pub max_history_secs: u32,
    pub max_frame_bytes: usize,
    pub speaker_label: String,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            buffer_secs: defaults::BUFFER_SECS,
            min_audio_secs: defaults::MIN_AUDIO_SECS,
            overlap: OverlapPolicy::Retain(defaults::OVERLAP_SECS),
            min_energy: defaults::MIN_ENERGY_FOR_TRANSCRIPTION,
            max_history_secs: defaults::MAX_HISTORY_SECS,
            max_frame_bytes: defaults::MAX_FRAME_BYTES,
            speaker_label: defaults::SPEAKER_LABEL.to_string(),
        }
    }
}

/// Process-wide collaborators shared by all sessions.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub engines: Engines,
    pub admission: Arc<AdmissionController>,
    pub auth: StreamAuth,
    pub settings: StreamSettings,
}

/// What the client presented when connecting.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub address: IpAddr,
    pub token: Option<String>,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Final message sent, closed normally.
    Finalized,
    /// Client went away without finalizing.
    Disconnected,
    /// Refused before streaming, with this close code.
    Rejected(u16),
    /// Streaming aborted by a fatal protocol error, with this close code.
    Aborted(u16),
}

/// Mutable state of one live session. Never shared.
struct Session {
    id: String,
    state: SessionState,
    mode: Mode,
    transcript: String,
    buffer: FrameBuffer,
    history: Option<Vec<u8>>,
    history_limit: usize,
    history_capped: bool,
    chunks: u64,
    started: Instant,
}

impl Session {
    fn new(id: String, settings: &StreamSettings) -> Self {
        Self {
            id,
            state: SessionState::Connecting,
            mode: Mode::Plain,
            transcript: String::new(),
            buffer: FrameBuffer::new(settings.buffer_secs, settings.overlap),
            history: None,
            history_limit: bytes_for_secs(settings.max_history_secs as f32),
            history_capped: false,
            chunks: 0,
            started: Instant::now(),
        }
    }

    fn set_state(&mut self, next: SessionState) {
        if let Err(e) = self.state.transition_to(next) {
            tracing::error!(error = %e, "Session state machine violated");
            self.state = next;
        }
    }

    fn push_text(&mut self, text: &str) {
        if !self.transcript.is_empty() {
            self.transcript.push(' ');
        }
        self.transcript.push_str(text);
    }

    /// Append to the diarization history. Returns false the first time the cap is hit.
    fn record_history(&mut self, bytes: &[u8]) -> bool {
        let Some(history) = self.history.as_mut() else {
            return true;
        };
        if history.len() + bytes.len() > self.history_limit {
            if self.history_capped {
                return true;
            }
            self.history_capped = true;
            return false;
        }
        history.extend_from_slice(bytes);
        true
    }

    fn clear_audio(&mut self) {
        self.buffer.clear();
        self.history = None;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.clear_audio();
        tracing::info!(
            session = %self.id,
            state = %self.state,
            chunks = self.chunks,
            elapsed_secs = self.started.elapsed().as_secs(),
            "Session closed, audio released"
        );
    }
}

/// Send, logging instead of failing: the client may already be gone.
async fn send_quietly<T: Transport + ?Sized>(transport: &mut T, message: &ServerMessage) {
    if let Err(e) = transport.send(message).await {
        tracing::debug!(error = %e, "Failed to send message to client");
    }
}

async fn close_quietly<T: Transport + ?Sized>(transport: &mut T, code: u16, reason: &str) {
    if let Err(e) = transport.close(code, reason).await {
        tracing::debug!(error = %e, code, "Failed to close connection");
    }
}

/// Reject a connection with a structured error and its distinguishing close code.
async fn reject<T: Transport + ?Sized>(transport: &mut T, error: &LivescribeError) -> u16 {
    let code = error.message_code();
    send_quietly(transport, &ServerMessage::from_error(error)).await;
    close_quietly(transport, code, &error.to_string()).await;
    code
}

/// Drive one streaming session to completion.
pub async fn run_session<T: Transport + ?Sized>(
    transport: &mut T,
    ctx: &SessionContext,
    handshake: Handshake,
) -> SessionOutcome {
    let id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("session", session = %id, address = %handshake.address);
    drive(transport, ctx, handshake, id).instrument(span).await
}

async fn drive<T: Transport + ?Sized>(
    transport: &mut T,
    ctx: &SessionContext,
    handshake: Handshake,
    id: String,
) -> SessionOutcome {
    let mut session = Session::new(id, &ctx.settings);

    let identity = match ctx.auth.verify(handshake.token.as_deref()) {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(error = %e, "Connection rejected");
            session.set_state(SessionState::Rejected);
            return SessionOutcome::Rejected(reject(transport, &e).await);
        }
    };
    session.set_state(SessionState::Authenticated);

    let Some(_permit) = ctx.admission.admit(handshake.address) else {
        let e = LivescribeError::AdmissionRejected {
            address: handshake.address.to_string(),
        };
        tracing::warn!(cap = ctx.admission.cap(), "Connection rejected: session cap reached");
        session.set_state(SessionState::Rejected);
        return SessionOutcome::Rejected(reject(transport, &e).await);
    };

    session.set_state(SessionState::Streaming);
    match &identity {
        Identity::Subject(subject) => tracing::info!(subject = %subject, "Session started"),
        _ => tracing::info!(auth = ?identity, "Session started"),
    }

    let outcome = stream(transport, ctx, &mut session).await;
    session.clear_audio();
    outcome
}

async fn stream<T: Transport + ?Sized>(
    transport: &mut T,
    ctx: &SessionContext,
    session: &mut Session,
) -> SessionOutcome {
    let settings = &ctx.settings;

    while let Some(frame) = transport.recv().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::info!(error = %e, "Transport error, dropping session");
                break;
            }
        };

        if let Frame::Binary(bytes) = &frame
            && bytes.len() > settings.max_frame_bytes
        {
            let e = LivescribeError::FrameTooLarge {
                size: bytes.len(),
                limit: settings.max_frame_bytes,
            };
            tracing::warn!(error = %e, "Aborting session");
            session.set_state(SessionState::Closed);
            return SessionOutcome::Aborted(reject(transport, &e).await);
        }

        let message = match ClientMessage::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed control message");
                if transport.send(&ServerMessage::from_error(&e)).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let delivered = match message {
            ClientMessage::Audio(bytes) => on_audio(transport, ctx, session, &bytes).await,
            ClientMessage::SetMode(mode) => {
                session.mode = mode;
                match mode {
                    Mode::Diarize => {
                        session.history.get_or_insert_with(Vec::new);
                    }
                    Mode::Plain => {
                        session.history = None;
                        session.history_capped = false;
                    }
                }
                tracing::info!(mode = ?mode, "Mode changed");
                transport.send(&ServerMessage::mode_ack(mode)).await.is_ok()
            }
            ClientMessage::Finalize => {
                session.set_state(SessionState::Finalizing);
                let message = finalize(transport, ctx, session).await;
                session.set_state(SessionState::Closed);
                send_quietly(transport, &message).await;
                close_quietly(transport, CLOSE_NORMAL, "").await;
                return SessionOutcome::Finalized;
            }
        };

        if !delivered {
            tracing::info!("Client unreachable, dropping session");
            break;
        }
    }

    session.set_state(SessionState::Closed);
    tracing::info!(chunks = session.chunks, "Client disconnected before finalizing");
    SessionOutcome::Disconnected
}

/// Handle one audio chunk. Returns false if the client could not be reached.
async fn on_audio<T: Transport + ?Sized>(
    transport: &mut T,
    ctx: &SessionContext,
    session: &mut Session,
    bytes: &[u8],
) -> bool {
    session.chunks += 1;
    session.buffer.append(bytes);
    if !session.record_history(bytes) {
        let e = LivescribeError::Protocol {
            message: format!(
                "diarization history limit of {}s reached; later audio gets no speaker labels",
                ctx.settings.max_history_secs
            ),
        };
        tracing::warn!("Diarization history capped");
        if transport.send(&ServerMessage::from_error(&e)).await.is_err() {
            return false;
        }
    }

    if !session.buffer.should_process() {
        return true;
    }

    let window = session.buffer.take_window();
    let result = transcribe_if_worthwhile(ctx, session, window).await;
    session.buffer.advance();

    match result {
        Ok(Some(text)) => {
            session.push_text(&text);
            transport.send(&ServerMessage::partial(text)).await.is_ok()
        }
        Ok(None) => true,
        Err(e) => {
            tracing::error!(error = %e, "Window transcription failed");
            transport.send(&ServerMessage::from_error(&e)).await.is_ok()
        }
    }
}

/// Transcribe `window` unless it is too short or too quiet.
///
/// `Ok(None)` means nothing worth surfacing.
async fn transcribe_if_worthwhile(
    ctx: &SessionContext,
    session: &Session,
    window: AudioWindow,
) -> Result<Option<String>> {
    let settings = &ctx.settings;
    if !window.is_submittable(settings.min_audio_secs, settings.min_energy) {
        tracing::debug!(
            audio_secs = window.duration_secs(),
            rms = window.rms(),
            "Skipping short or silent window"
        );
        return Ok(None);
    }
    let text = ctx
        .engines
        .transcribe_window(window, &session.transcript)
        .await?;
    if text.is_empty() {
        tracing::debug!("Window produced no text");
        return Ok(None);
    }
    tracing::debug!(chars = text.chars().count(), "Window transcribed");
    Ok(Some(text))
}

/// Process leftover audio and diarize the history. Builds the final message.
async fn finalize<T: Transport + ?Sized>(
    transport: &mut T,
    ctx: &SessionContext,
    session: &mut Session,
) -> ServerMessage {
    if !session.buffer.is_empty() {
        let window = session.buffer.take_window();
        session.buffer.clear();
        match transcribe_if_worthwhile(ctx, session, window).await {
            Ok(Some(text)) => session.push_text(&text),
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "Final window transcription failed");
                send_quietly(transport, &ServerMessage::from_error(&e)).await;
            }
        }
    }

    let mut diarized_text = None;
    if session.mode == Mode::Diarize
        && let Some(history) = session.history.take()
    {
        let window = AudioWindow::from_pcm16le(&history);
        drop(history);
        let settings = &ctx.settings;
        if window.is_submittable(settings.min_audio_secs, settings.min_energy) {
            match ctx.engines.analyze(window, None, true).await {
                Ok(analysis) => {
                    tracing::info!(speakers = ?analysis.speaker_count(), "Session diarized");
                    diarized_text = analysis.diarized_text(&settings.speaker_label);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Diarized transcription failed");
                    send_quietly(transport, &ServerMessage::from_error(&e)).await;
                }
            }
        }
    }

    tracing::info!(
        chars = session.transcript.chars().count(),
        diarized = diarized_text.is_some(),
        "Final transcript ready"
    );
    ServerMessage::final_result(session.transcript.clone(), diarized_text)
}
