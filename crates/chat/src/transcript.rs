use snafu::Snafu;

use docchat_backend::UploadReceipt;

/// One transcript entry.
///
/// The assistant variant carries its streaming state inline: `pending`
/// is true from placeholder creation until the terminal event lands, and
/// the transcript guarantees at most one pending message exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    User {
        text: String,
    },
    Assistant {
        text: String,
        pending: bool,
    },
    Document {
        filename: String,
        size_bytes: u64,
        chunk_count: u32,
    },
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            text: text.into(),
            pending: false,
        }
    }

    /// Empty assistant placeholder awaiting streamed tokens.
    pub fn assistant_pending() -> Self {
        Self::Assistant {
            text: String::new(),
            pending: true,
        }
    }

    pub fn document(filename: impl Into<String>, size_bytes: u64, chunk_count: u32) -> Self {
        Self::Document {
            filename: filename.into(),
            size_bytes,
            chunk_count,
        }
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, Self::Assistant { .. })
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Assistant { pending: true, .. })
    }

    /// Message text for user/assistant entries, the filename for documents.
    pub fn text(&self) -> &str {
        match self {
            Self::User { text } | Self::Assistant { text, .. } => text,
            Self::Document { filename, .. } => filename,
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TranscriptError {
    #[snafu(display("transcript invariant violation: {details}"))]
    InvariantViolation {
        stage: &'static str,
        details: String,
    },
}

pub type TranscriptResult<T> = Result<T, TranscriptError>;

/// Ordered message history for the active session.
///
/// Append-only, with exactly two sanctioned exceptions: regenerate
/// removes the trailing assistant message, and the unique pending
/// assistant message is mutated in place until completion. Everything
/// that inspects history does so from the tail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a transcript from already-settled messages (history load).
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn has_pending(&self) -> bool {
        self.messages.last().is_some_and(Message::is_pending)
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    pub fn push_document(&mut self, receipt: &UploadReceipt) {
        self.messages.push(Message::document(
            receipt.filename.clone(),
            receipt.size_bytes,
            receipt.chunk_count,
        ));
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Appends the empty pending placeholder the stream will fill.
    ///
    /// The placeholder is always the newest message, so pending lookups
    /// stay O(1) from the tail.
    pub fn begin_assistant(&mut self) -> TranscriptResult<()> {
        // Tail check suffices: the placeholder is always appended last and
        // settles before anything else can be pushed.
        if self.has_pending() {
            return InvariantViolationSnafu {
                stage: "begin-assistant",
                details: "a pending assistant message already exists".to_string(),
            }
            .fail();
        }

        self.messages.push(Message::assistant_pending());
        Ok(())
    }

    /// Appends streamed text to the unique pending message.
    pub fn append_to_pending(&mut self, delta: &str) -> TranscriptResult<()> {
        if let Message::Assistant { text, .. } = self.pending_mut("append-to-pending")? {
            text.push_str(delta);
        }
        Ok(())
    }

    /// Marks the pending message settled, keeping its accumulated text.
    pub fn finish_pending(&mut self) -> TranscriptResult<()> {
        if let Message::Assistant { pending, .. } = self.pending_mut("finish-pending")? {
            *pending = false;
        }
        Ok(())
    }

    /// Settles the pending message with replacement text.
    ///
    /// Used by the buffered transport (whole answer at once) and by the
    /// transport-failure fallback.
    pub fn finish_pending_with(&mut self, replacement: impl Into<String>) -> TranscriptResult<()> {
        if let Message::Assistant { text, pending } = self.pending_mut("finish-pending-with")? {
            *text = replacement.into();
            *pending = false;
        }
        Ok(())
    }

    /// Removes the trailing assistant message; false if the tail is not one.
    pub fn remove_trailing_assistant(&mut self) -> bool {
        if self.messages.last().is_some_and(Message::is_assistant) {
            self.messages.pop();
            return true;
        }
        false
    }

    /// Most recent user message text, scanning from the tail.
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|message| match message {
            Message::User { text } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    fn pending_mut(&mut self, stage: &'static str) -> TranscriptResult<&mut Message> {
        // The placeholder is appended last and never reordered, so only the
        // tail can be pending.
        match self.messages.last_mut() {
            Some(message) if message.is_pending() => Ok(message),
            _ => InvariantViolationSnafu {
                stage,
                details: "no pending assistant message exists".to_string(),
            }
            .fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt() -> UploadReceipt {
        UploadReceipt {
            filename: "report.pdf".to_string(),
            size_bytes: 1024,
            chunk_count: 7,
        }
    }

    #[test]
    fn begin_assistant_rejects_second_pending_placeholder() {
        let mut transcript = Transcript::new();
        transcript.begin_assistant().unwrap();

        let error = transcript.begin_assistant().unwrap_err();
        assert!(matches!(error, TranscriptError::InvariantViolation { .. }));
        assert_eq!(transcript.len(), 1);
    }

    #[test]
    fn deltas_accumulate_in_receipt_order_and_settle_once() {
        let mut transcript = Transcript::new();
        transcript.push_user("Hello");
        transcript.begin_assistant().unwrap();

        transcript.append_to_pending("Hi").unwrap();
        transcript.append_to_pending(" there").unwrap();
        transcript.finish_pending().unwrap();

        assert_eq!(
            transcript.messages()[1],
            Message::assistant("Hi there"),
        );
        // Settling is not idempotent: a second terminal signal is a bug.
        assert!(transcript.finish_pending().is_err());
    }

    #[test]
    fn mutations_without_a_pending_message_are_invariant_violations() {
        let mut transcript = Transcript::new();
        transcript.push_user("Hello");

        assert!(transcript.append_to_pending("x").is_err());
        assert!(transcript.finish_pending().is_err());
        assert!(transcript.finish_pending_with("x").is_err());
    }

    #[test]
    fn settled_assistant_is_not_pending() {
        let mut transcript = Transcript::new();
        transcript.begin_assistant().unwrap();
        transcript.finish_pending_with("done").unwrap();

        assert!(!transcript.has_pending());
        assert!(transcript.append_to_pending("late token").is_err());
    }

    #[test]
    fn remove_trailing_assistant_only_touches_an_assistant_tail() {
        let mut transcript = Transcript::new();
        transcript.push_user("question");
        assert!(!transcript.remove_trailing_assistant());
        assert_eq!(transcript.len(), 1);

        transcript.push(Message::assistant("answer"));
        assert!(transcript.remove_trailing_assistant());
        assert_eq!(transcript.len(), 1);
    }

    #[test]
    fn remove_then_new_placeholder_never_doubles_pending() {
        let mut transcript = Transcript::new();
        transcript.push_user("question");
        transcript.push(Message::assistant("answer"));

        transcript.remove_trailing_assistant();
        transcript.begin_assistant().unwrap();

        let pending_count = transcript
            .messages()
            .iter()
            .filter(|message| message.is_pending())
            .count();
        assert_eq!(pending_count, 1);
    }

    #[test]
    fn last_user_text_scans_from_the_tail() {
        let mut transcript = Transcript::new();
        transcript.push_user("first");
        transcript.push(Message::assistant("a1"));
        transcript.push_user("second");
        transcript.push(Message::assistant("a2"));

        assert_eq!(transcript.last_user_text(), Some("second"));
    }

    #[test]
    fn document_append_leaves_existing_messages_untouched() {
        let mut transcript = Transcript::new();
        transcript.push_user("Hello");
        transcript.push(Message::assistant("Hi"));
        let before = transcript.messages()[..2].to_vec();

        transcript.push_document(&receipt());

        assert_eq!(transcript.messages()[..2], before[..]);
        assert_eq!(
            transcript.messages()[2],
            Message::document("report.pdf", 1024, 7),
        );
    }
}
