use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use snafu::ResultExt;
use url::Url;

use super::error::{
    BackendResult, BuildClientSnafu, DecodeResponseSnafu, InvalidBaseUrlSnafu, ReadUploadFileSnafu,
    RequestSnafu, StatusSnafu, StreamChunkSnafu,
};
use super::types::{
    AnswerResponse, ChatId, ChatListResponse, ChatMessagesResponse, ChatSummary, NewChatResponse,
    StoredMessage, UploadReceipt, UploadResponse,
};
use super::{BoxFuture, ByteStream, ChatBackend};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// reqwest-backed implementation of [`ChatBackend`].
///
/// Requests carry no overall timeout: the streaming send stays open for
/// as long as the backend keeps producing tokens. Only connection
/// establishment is bounded.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> BackendResult<Self> {
        let parsed = Url::parse(base_url).context(InvalidBaseUrlSnafu {
            stage: "parse-base-url",
            base_url: base_url.to_string(),
        })?;

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context(BuildClientSnafu {
                stage: "build-client",
            })?;

        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Reads a local file and uploads it under its file name.
    pub async fn upload_document_file(&self, path: &Path) -> BackendResult<UploadReceipt> {
        let bytes = tokio::fs::read(path).await.context(ReadUploadFileSnafu {
            stage: "read-upload-file",
            path: path.display().to_string(),
        })?;

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        self.upload_document(&filename, bytes).await
    }
}

/// Fails non-success responses with the body text preserved as detail.
async fn check_status(
    stage: &'static str,
    response: reqwest::Response,
) -> BackendResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    StatusSnafu {
        stage,
        status: status.as_u16(),
        body,
    }
    .fail()
}

fn regenerate_flag(regenerate: bool) -> &'static str {
    if regenerate { "true" } else { "false" }
}

impl ChatBackend for HttpBackend {
    fn create_chat<'a>(&'a self) -> BoxFuture<'a, BackendResult<ChatId>> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.url("/chat/new"))
                .send()
                .await
                .context(RequestSnafu { stage: "new-chat" })?;

            let response = check_status("new-chat-status", response).await?;
            let payload: NewChatResponse = response.json().await.context(DecodeResponseSnafu {
                stage: "decode-new-chat",
            })?;

            tracing::debug!(chat_id = %payload.chat_id, "created backend chat");
            Ok(payload.chat_id)
        })
    }

    fn fetch_messages<'a>(
        &'a self,
        chat_id: &'a ChatId,
    ) -> BoxFuture<'a, BackendResult<Vec<StoredMessage>>> {
        Box::pin(async move {
            let response = self
                .client
                .get(self.url(&format!("/chat/{chat_id}/messages")))
                .send()
                .await
                .context(RequestSnafu {
                    stage: "fetch-messages",
                })?;

            let response = check_status("fetch-messages-status", response).await?;
            let payload: ChatMessagesResponse =
                response.json().await.context(DecodeResponseSnafu {
                    stage: "decode-messages",
                })?;

            Ok(payload.messages)
        })
    }

    fn ask<'a>(
        &'a self,
        chat_id: &'a ChatId,
        query: &'a str,
        regenerate: bool,
    ) -> BoxFuture<'a, BackendResult<String>> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.url(&format!("/chat/{chat_id}")))
                .query(&[("query", query), ("regenerate", regenerate_flag(regenerate))])
                .send()
                .await
                .context(RequestSnafu { stage: "ask" })?;

            let response = check_status("ask-status", response).await?;
            let payload: AnswerResponse = response.json().await.context(DecodeResponseSnafu {
                stage: "decode-answer",
            })?;

            Ok(payload.answer)
        })
    }

    fn ask_streaming<'a>(
        &'a self,
        chat_id: &'a ChatId,
        query: &'a str,
        regenerate: bool,
    ) -> BoxFuture<'a, BackendResult<ByteStream>> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.url(&format!("/chat/{chat_id}/stream")))
                .query(&[("query", query), ("regenerate", regenerate_flag(regenerate))])
                .send()
                .await
                .context(RequestSnafu {
                    stage: "ask-streaming",
                })?;

            let response = check_status("ask-streaming-status", response).await?;

            let stream: ByteStream = Box::pin(response.bytes_stream().map(|item| {
                item.map(|bytes| bytes.to_vec()).context(StreamChunkSnafu {
                    stage: "read-stream-chunk",
                })
            }));

            Ok(stream)
        })
    }

    fn upload_document<'a>(
        &'a self,
        filename: &'a str,
        bytes: Vec<u8>,
    ) -> BoxFuture<'a, BackendResult<UploadReceipt>> {
        Box::pin(async move {
            let size_bytes = bytes.len() as u64;
            let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
            let form = reqwest::multipart::Form::new().part("file", part);

            let response = self
                .client
                .post(self.url("/upload"))
                .multipart(form)
                .send()
                .await
                .context(RequestSnafu { stage: "upload" })?;

            let response = check_status("upload-status", response).await?;
            let payload: UploadResponse = response.json().await.context(DecodeResponseSnafu {
                stage: "decode-upload",
            })?;

            tracing::debug!(filename, size_bytes, chunks = payload.chunks, "document indexed");

            Ok(UploadReceipt {
                filename: filename.to_string(),
                size_bytes,
                chunk_count: payload.chunks,
            })
        })
    }

    fn list_chats<'a>(&'a self) -> BoxFuture<'a, BackendResult<Vec<ChatSummary>>> {
        Box::pin(async move {
            let response = self
                .client
                .get(self.url("/chats"))
                .send()
                .await
                .context(RequestSnafu { stage: "list-chats" })?;

            let response = check_status("list-chats-status", response).await?;
            let payload: ChatListResponse = response.json().await.context(DecodeResponseSnafu {
                stage: "decode-chats",
            })?;

            Ok(payload.chats)
        })
    }

    fn delete_chat<'a>(&'a self, chat_id: &'a ChatId) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            let response = self
                .client
                .delete(self.url(&format!("/chat/{chat_id}")))
                .send()
                .await
                .context(RequestSnafu {
                    stage: "delete-chat",
                })?;

            check_status("delete-chat-status", response).await?;
            Ok(())
        })
    }
}
