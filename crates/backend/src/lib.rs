//! HTTP client for the document-QA chat backend.
//!
//! The controller crate talks to this through the [`ChatBackend`] trait so
//! tests can substitute a scripted backend; [`HttpBackend`] is the real
//! reqwest-based implementation.

use std::future::Future;
use std::pin::Pin;

use futures::Stream;

mod error;
mod http;
mod types;

pub use error::{BackendError, BackendResult};
pub use http::HttpBackend;
pub use types::{ChatId, ChatSummary, ROLE_ASSISTANT, ROLE_USER, StoredMessage, UploadReceipt};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Raw response body chunks for the streaming send endpoint.
///
/// Chunks arrive sized by the network, not by frame boundaries; decoding
/// them into events is the consumer's job, not the transport's.
pub type ByteStream = Pin<Box<dyn Stream<Item = BackendResult<Vec<u8>>> + Send>>;

/// Transport seam for everything the client asks of the backend.
pub trait ChatBackend: Send + Sync {
    /// Requests a fresh chat session.
    fn create_chat<'a>(&'a self) -> BoxFuture<'a, BackendResult<ChatId>>;

    /// Fetches the persisted history of one chat, oldest first.
    fn fetch_messages<'a>(
        &'a self,
        chat_id: &'a ChatId,
    ) -> BoxFuture<'a, BackendResult<Vec<StoredMessage>>>;

    /// Sends one question and waits for the complete answer.
    fn ask<'a>(
        &'a self,
        chat_id: &'a ChatId,
        query: &'a str,
        regenerate: bool,
    ) -> BoxFuture<'a, BackendResult<String>>;

    /// Sends one question and opens the framed token stream.
    fn ask_streaming<'a>(
        &'a self,
        chat_id: &'a ChatId,
        query: &'a str,
        regenerate: bool,
    ) -> BoxFuture<'a, BackendResult<ByteStream>>;

    /// Uploads one document for indexing; returns the ingestion receipt.
    fn upload_document<'a>(
        &'a self,
        filename: &'a str,
        bytes: Vec<u8>,
    ) -> BoxFuture<'a, BackendResult<UploadReceipt>>;

    /// Lists stored chats for the history-browsing surface.
    fn list_chats<'a>(&'a self) -> BoxFuture<'a, BackendResult<Vec<ChatSummary>>>;

    /// Deletes one stored chat.
    fn delete_chat<'a>(&'a self, chat_id: &'a ChatId) -> BoxFuture<'a, BackendResult<()>>;
}
