//! Client error types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// Invalid endpoint, credentials or argument combination, raised before any network call
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection, DNS, TLS or timeout failure from the HTTP transport
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success status from the service
    #[error("Service error (HTTP {status}): {}", service_summary(.code, .message, .body))]
    Service {
        status: u16,
        code: Option<String>,
        message: Option<String>,
        request_id: Option<String>,
        body: String,
    },

    /// A successful response whose body does not have the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// The payload transform hook rejected the data
    #[error("Payload transform error: {0}")]
    Transform(String),

    /// Caller-supplied value outside what the protocol accepts
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation observed its cancellation token
    #[error("Operation cancelled")]
    Cancelled,
}

fn service_summary(code: &Option<String>, message: &Option<String>, body: &str) -> String {
    match (code, message) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        (Some(code), None) => code.clone(),
        (None, Some(message)) => message.clone(),
        (None, None) => body.to_string(),
    }
}

impl From<quick_xml::Error> for ClientError {
    fn from(err: quick_xml::Error) -> Self {
        ClientError::Decode(format!("malformed XML: {}", err))
    }
}

impl ClientError {
    /// Build a service error from a status code and the raw error body
    pub fn from_response(status: u16, body: String) -> Self {
        let parsed = crate::xml::parse_error_document(&body);
        Self::Service {
            status,
            code: parsed.code,
            message: parsed.message,
            request_id: parsed.request_id,
            body,
        }
    }

    /// HTTP status of a service error
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Service { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// S3 error code such as `NoSuchKey` or `BucketNotEmpty`
    pub fn service_code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Service { status: 404, .. })
            || matches!(
                self.service_code(),
                Some("NoSuchKey" | "NoSuchBucket" | "NoSuchUpload" | "NoSuchVersion")
            )
    }

    /// Check if this is an access denied error
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::Service { status: 403, .. })
            || self.service_code() == Some("AccessDenied")
    }

    /// Check if the error came from cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
