use std::time::{SystemTime, UNIX_EPOCH};

use docchat_backend::ChatId;

use crate::transcript::Transcript;

/// One active conversation context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    pub id: ChatId,
    pub created_at_unix_seconds: u64,
}

impl ChatSession {
    pub fn new(id: ChatId) -> Self {
        let created_at_unix_seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);

        Self {
            id,
            created_at_unix_seconds,
        }
    }
}

/// Everything the dispatcher mutates, as one explicit value.
///
/// The source client kept these as ambient component state; here they
/// live behind the single controller so every mutation goes through one
/// `&mut` access path.
#[derive(Debug, Default)]
pub struct SessionState {
    session: Option<ChatSession>,
    transcript: Transcript,
    in_flight: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> Option<&ChatSession> {
        self.session.as_ref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Replaces session and transcript together; the old pair is dropped whole.
    pub fn replace(&mut self, session: ChatSession, transcript: Transcript) {
        self.session = Some(session);
        self.transcript = transcript;
    }

    pub(crate) fn transcript_mut(&mut self) -> &mut Transcript {
        &mut self.transcript
    }

    pub(crate) fn set_in_flight(&mut self, in_flight: bool) {
        self.in_flight = in_flight;
    }

    #[cfg(test)]
    pub(crate) fn force_in_flight_for_test(&mut self) {
        self.in_flight = true;
    }
}
