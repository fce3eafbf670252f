use std::sync::Arc;

use snafu::{ResultExt, Snafu};
use tokio::sync::oneshot;

use docchat_backend::{
    BackendError, ChatBackend, ChatId, ROLE_ASSISTANT, ROLE_USER, StoredMessage, UploadReceipt,
};

use crate::config::TransportMode;
use crate::consumer::{ResponseConsumer, StreamEvent};
use crate::session::{ChatSession, SessionState};
use crate::transcript::{Message, Transcript, TranscriptError};

/// User-visible text substituted for an answer the backend failed to produce.
pub const FALLBACK_ANSWER: &str = "Sorry, I encountered an error. Please try again.";

#[derive(Debug, Snafu)]
pub enum ChatError {
    #[snafu(display("failed to create a new chat session"))]
    CreateChat {
        stage: &'static str,
        source: BackendError,
    },
    #[snafu(display("failed to load history for chat '{chat_id}'"))]
    LoadTranscript {
        stage: &'static str,
        chat_id: ChatId,
        source: BackendError,
    },
    #[snafu(display("refusing to switch sessions while a dispatch is in flight"))]
    DispatchInFlight { stage: &'static str },
    #[snafu(display("transcript state is corrupted, {source}"))]
    Transcript {
        stage: &'static str,
        source: TranscriptError,
    },
}

pub type ChatResult<T> = Result<T, ChatError>;

/// How a `send` call resolved.
///
/// Transport failures are absorbed into the transcript (fallback text),
/// so they report as an outcome rather than an error; only corrupted
/// transcript state propagates as `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Terminal event received; the answer is settled in the transcript.
    Completed,
    /// Transport failed; the placeholder holds the fallback text.
    Failed,
    /// Cancelled mid-stream; the placeholder keeps its partial text.
    Cancelled,
    /// A precondition failed; nothing was mutated or sent.
    Ignored,
}

/// Caller-held side of a cancellation pair.
///
/// Dropping the handle cancels, so an abandoned send cannot strand its
/// stream.
#[derive(Debug)]
pub struct CancelHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl CancelHandle {
    /// Requests cancellation; false if the send already finished.
    pub fn cancel(&mut self) -> bool {
        self.tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

/// Dispatcher-held side of a cancellation pair.
#[derive(Debug)]
pub struct CancelSignal {
    rx: oneshot::Receiver<()>,
}

/// Creates a linked cancel handle/signal pair for one send.
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = oneshot::channel();
    (CancelHandle { tx: Some(tx) }, CancelSignal { rx })
}

/// Session manager and message dispatcher in one controller.
///
/// All transcript mutations flow through `&mut self` on a single control
/// flow, which is what makes the in-flight flag a sufficient gate: sends
/// are never queued, and the first of competing attempts wins.
pub struct ChatController {
    backend: Arc<dyn ChatBackend>,
    transport: TransportMode,
    state: SessionState,
    malformed_frames: u64,
}

impl ChatController {
    pub fn new(backend: Arc<dyn ChatBackend>, transport: TransportMode) -> Self {
        Self {
            backend,
            transport,
            state: SessionState::new(),
            malformed_frames: 0,
        }
    }

    pub fn transport(&self) -> TransportMode {
        self.transport
    }

    /// Switches transport for subsequent sends (the UI streaming toggle).
    pub fn set_transport(&mut self, transport: TransportMode) {
        self.transport = transport;
    }

    pub fn session(&self) -> Option<&ChatSession> {
        self.state.session()
    }

    pub fn transcript(&self) -> &Transcript {
        self.state.transcript()
    }

    pub fn is_in_flight(&self) -> bool {
        self.state.is_in_flight()
    }

    /// Count of malformed stream frames observed since construction.
    pub fn malformed_frame_count(&self) -> u64 {
        self.malformed_frames
    }

    /// Starts a fresh session, clearing the transcript.
    ///
    /// On failure the previous session and transcript are untouched.
    pub async fn new_chat(&mut self) -> ChatResult<ChatId> {
        self.ensure_idle("new-chat")?;

        let chat_id = self
            .backend
            .create_chat()
            .await
            .context(CreateChatSnafu { stage: "new-chat" })?;

        self.state
            .replace(ChatSession::new(chat_id.clone()), Transcript::new());
        tracing::info!(chat_id = %chat_id, "started new chat session");
        Ok(chat_id)
    }

    /// Restores a stored session, replacing session and transcript together.
    ///
    /// On failure the currently active session is untouched.
    pub async fn load_chat(&mut self, chat_id: ChatId) -> ChatResult<()> {
        self.ensure_idle("load-chat")?;

        let stored = self
            .backend
            .fetch_messages(&chat_id)
            .await
            .context(LoadTranscriptSnafu {
                stage: "load-chat",
                chat_id: chat_id.clone(),
            })?;

        let transcript = Transcript::from_messages(stored.iter().map(map_stored_message).collect());
        tracing::info!(chat_id = %chat_id, message_count = transcript.len(), "loaded chat history");
        self.state.replace(ChatSession::new(chat_id), transcript);
        Ok(())
    }

    /// Upload-bridge entry point: records one completed document upload.
    pub fn document_uploaded(&mut self, receipt: &UploadReceipt) {
        tracing::info!(
            filename = %receipt.filename,
            size_bytes = receipt.size_bytes,
            chunks = receipt.chunk_count,
            "document added to transcript"
        );
        self.state.transcript_mut().push_document(receipt);
    }

    /// Dispatches one user message; see [`Self::send_cancellable`].
    pub async fn send(&mut self, text: &str, regenerate: bool) -> ChatResult<SendOutcome> {
        // The handle lives for the whole call, so the signal can never fire.
        let (_handle, signal) = cancellation();
        self.send_cancellable(text, regenerate, signal).await
    }

    /// Re-issues the most recent user message, discarding the previous answer.
    pub async fn regenerate(&mut self) -> ChatResult<SendOutcome> {
        if self.state.transcript().len() < 2 {
            return Ok(SendOutcome::Ignored);
        }

        let Some(text) = self
            .state
            .transcript()
            .last_user_text()
            .map(str::to_string)
        else {
            return Ok(SendOutcome::Ignored);
        };

        self.send(&text, true).await
    }

    /// Dispatches one user message with an external cancellation signal.
    ///
    /// Preconditions, checked in order, each a silent no-op: non-empty
    /// text after trimming, an active session, no dispatch in flight.
    /// The in-flight flag is set before the network call and cleared on
    /// every exit path.
    pub async fn send_cancellable(
        &mut self,
        text: &str,
        regenerate: bool,
        signal: CancelSignal,
    ) -> ChatResult<SendOutcome> {
        let query = text.trim();
        if query.is_empty() {
            tracing::debug!("ignoring send of empty message");
            return Ok(SendOutcome::Ignored);
        }

        let Some(session) = self.state.session() else {
            tracing::debug!("ignoring send without an active session");
            return Ok(SendOutcome::Ignored);
        };
        let chat_id = session.id.clone();

        if self.state.is_in_flight() {
            tracing::debug!(chat_id = %chat_id, "ignoring send while another is in flight");
            return Ok(SendOutcome::Ignored);
        }

        if regenerate {
            self.state.transcript_mut().remove_trailing_assistant();
        } else {
            self.state.transcript_mut().push_user(query);
        }

        self.state.set_in_flight(true);

        if let Err(error) = self
            .state
            .transcript_mut()
            .begin_assistant()
            .context(TranscriptSnafu {
                stage: "begin-assistant",
            })
        {
            self.state.set_in_flight(false);
            return Err(error);
        }

        let result = match self.transport {
            TransportMode::Buffered => self.send_buffered(&chat_id, query, regenerate).await,
            TransportMode::Streaming => {
                self.send_streaming(&chat_id, query, regenerate, signal).await
            }
        };

        self.state.set_in_flight(false);
        result
    }

    async fn send_buffered(
        &mut self,
        chat_id: &ChatId,
        query: &str,
        regenerate: bool,
    ) -> ChatResult<SendOutcome> {
        match self.backend.ask(chat_id, query, regenerate).await {
            Ok(answer) => {
                self.state
                    .transcript_mut()
                    .finish_pending_with(answer)
                    .context(TranscriptSnafu {
                        stage: "buffered-answer",
                    })?;
                Ok(SendOutcome::Completed)
            }
            Err(error) => {
                tracing::warn!(chat_id = %chat_id, error = %error, "buffered send failed");
                self.apply_fallback("buffered-fallback")?;
                Ok(SendOutcome::Failed)
            }
        }
    }

    async fn send_streaming(
        &mut self,
        chat_id: &ChatId,
        query: &str,
        regenerate: bool,
        mut signal: CancelSignal,
    ) -> ChatResult<SendOutcome> {
        let stream = match self.backend.ask_streaming(chat_id, query, regenerate).await {
            Ok(stream) => stream,
            Err(error) => {
                tracing::warn!(chat_id = %chat_id, error = %error, "failed to open answer stream");
                self.apply_fallback("stream-open-fallback")?;
                return Ok(SendOutcome::Failed);
            }
        };

        let mut consumer = ResponseConsumer::new(stream);

        loop {
            tokio::select! {
                _ = &mut signal.rx => {
                    // Dropping the consumer tears down the response body;
                    // the partial answer stays in the transcript.
                    tracing::info!(chat_id = %chat_id, "send cancelled, keeping partial answer");
                    self.state
                        .transcript_mut()
                        .finish_pending()
                        .context(TranscriptSnafu { stage: "cancel-finish" })?;
                    return Ok(SendOutcome::Cancelled);
                }
                event = consumer.next_event() => match event {
                    Some(Ok(StreamEvent::Token { text })) => {
                        self.state
                            .transcript_mut()
                            .append_to_pending(&text)
                            .context(TranscriptSnafu { stage: "append-token" })?;
                    }
                    Some(Ok(StreamEvent::Complete)) => {
                        self.state
                            .transcript_mut()
                            .finish_pending()
                            .context(TranscriptSnafu { stage: "stream-complete" })?;
                        return Ok(SendOutcome::Completed);
                    }
                    Some(Ok(StreamEvent::Malformed { .. })) => {
                        self.malformed_frames += 1;
                    }
                    Some(Err(error)) => {
                        tracing::warn!(chat_id = %chat_id, error = %error, "answer stream failed");
                        self.apply_fallback("stream-fallback")?;
                        return Ok(SendOutcome::Failed);
                    }
                    // The consumer guarantees a terminal event before the
                    // sequence ends; treat a bare end as completion anyway.
                    None => {
                        self.state
                            .transcript_mut()
                            .finish_pending()
                            .context(TranscriptSnafu { stage: "stream-end" })?;
                        return Ok(SendOutcome::Completed);
                    }
                }
            }
        }
    }

    fn apply_fallback(&mut self, stage: &'static str) -> ChatResult<()> {
        self.state
            .transcript_mut()
            .finish_pending_with(FALLBACK_ANSWER)
            .context(TranscriptSnafu { stage })
    }

    fn ensure_idle(&self, stage: &'static str) -> ChatResult<()> {
        if self.state.is_in_flight() {
            return DispatchInFlightSnafu { stage }.fail();
        }
        Ok(())
    }

    #[cfg(test)]
    fn force_in_flight_for_test(&mut self) {
        self.state.force_in_flight_for_test();
    }
}

/// Maps one persisted history entry into the transcript model.
///
/// Anything that is neither a user nor an assistant turn is a
/// document-like record; the backend persists no size or chunk metadata
/// for those, so they carry zeroes.
fn map_stored_message(stored: &StoredMessage) -> Message {
    match stored.role.as_str() {
        ROLE_USER => Message::user(stored.message.clone()),
        ROLE_ASSISTANT => Message::assistant(stored.message.clone()),
        _ => Message::document(stored.message.clone(), 0, 0),
    }
}
