//! Client-side controller for a document-QA chat assistant.
//!
//! The controller owns the active session and its transcript, dispatches
//! user messages over a buffered or streaming transport, and folds the
//! backend's framed token stream into a single growing assistant
//! message. Rendering, upload UI, and history browsing live elsewhere
//! and observe the transcript through the controller's accessors.

pub mod config;
/// Frame decoding and pull-based stream consumption.
pub mod consumer;
/// Session management and message dispatch.
pub mod controller;
pub mod session;
/// Domain entities and transcript mutation primitives.
pub mod transcript;

pub use config::{ChatConfig, ConfigError, DEFAULT_BASE_URL, TransportMode};
pub use consumer::{FRAME_MARKER, FrameDecoder, ResponseConsumer, StreamEvent};
pub use controller::{
    CancelHandle, CancelSignal, ChatController, ChatError, ChatResult, FALLBACK_ANSWER,
    SendOutcome, cancellation,
};
pub use session::{ChatSession, SessionState};
pub use transcript::{Message, Transcript, TranscriptError, TranscriptResult};
