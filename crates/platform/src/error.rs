use snafu::Snafu;

pub type PlatformResult<T> = Result<T, PlatformError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PlatformError {
    #[snafu(display("platform setting '{field}' is missing"))]
    MissingConfig {
        stage: &'static str,
        field: &'static str,
    },
    #[snafu(display("'{url}' is not a valid URL on `{stage}`: {source}"))]
    InvalidUrl {
        stage: &'static str,
        url: String,
        source: url::ParseError,
    },
    #[snafu(display("invalid input on `{stage}`: {details}"))]
    InvalidInput {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("failed to build http client on `{stage}`: {source}"))]
    HttpClientBuild {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("http request failed on `{stage}`: {source}"))]
    HttpRequest {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("platform returned status {status} on `{stage}`: {body}"))]
    HttpStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to decode platform payload on `{stage}`: {source}"))]
    DecodePayload {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to encode platform payload on `{stage}`: {source}"))]
    EncodePayload {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("auth storage failed on `{stage}`: {source}"))]
    AuthStorage {
        stage: &'static str,
        source: ferrer_storage::StorageError,
    },
    #[snafu(display("auth storage task failed on `{stage}`: {source}"))]
    StorageTask {
        stage: &'static str,
        source: tokio::task::JoinError,
    },
    #[snafu(display("callback URL carries no authorization code: {details}"))]
    MissingAuthCode {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("no pending sign-in was found for this callback"))]
    MissingCodeVerifier { stage: &'static str },
    #[snafu(display("no active session on `{stage}`"))]
    NotAuthenticated { stage: &'static str },
    #[snafu(display("realtime socket failed on `{stage}`: {source}"))]
    RealtimeSocket {
        stage: &'static str,
        source: tokio_tungstenite::tungstenite::Error,
    },
}

impl PlatformError {
    /// True when the platform answered with a client error (4xx), as opposed
    /// to a transport failure or a server fault.
    pub fn is_client_rejection(&self) -> bool {
        matches!(self, Self::HttpStatus { status, .. } if (400..500).contains(status))
    }
}
