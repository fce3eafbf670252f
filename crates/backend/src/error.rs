use snafu::Snafu;

/// Transport-level failures against the document-QA backend.
///
/// Non-success statuses keep the response body: the backend reports
/// ingestion and retrieval problems as plain-text details there.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BackendError {
    #[snafu(display("invalid backend base URL '{base_url}'"))]
    InvalidBaseUrl {
        stage: &'static str,
        base_url: String,
        source: url::ParseError,
    },
    #[snafu(display("failed to build backend HTTP client"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("backend request failed on `{stage}`, {source}"))]
    Request {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("backend returned status {status} on `{stage}`: {body}"))]
    Status {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to decode backend response on `{stage}`, {source}"))]
    DecodeResponse {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("failed to read stream chunk on `{stage}`, {source}"))]
    StreamChunk {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("failed to read upload file '{path}'"))]
    ReadUploadFile {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
}

pub type BackendResult<T> = Result<T, BackendError>;
