//! Error types for newscast-rs.
//!
//! `BackendError` describes a single failed call to an external service and
//! knows whether retrying it makes sense. `PodcastError` attaches the stage
//! and the article or line index the failure belongs to.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Failure of one request to an external backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Non-success HTTP status, body surfaced verbatim.
    #[error("backend returned status {status}: {body}")]
    Status {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },

    #[error("transport error: {message}")]
    Transport { message: String, transient: bool },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("missing credentials for {0}")]
    MissingCredentials(&'static str),
}

impl BackendError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    /// Build a `Status` error from a non-success response, consuming its body.
    pub async fn from_response(resp: reqwest::Response) -> Self {
        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = resp.text().await.unwrap_or_default();
        Self::Status {
            status,
            body,
            retry_after,
        }
    }

    /// Rate limits, server errors and dropped connections are worth another
    /// attempt. Bad credentials and other 4xx responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => {
                matches!(*status, 408 | 425 | 429) || (500..600).contains(status)
            }
            Self::Transport { transient, .. } => *transient,
            Self::InvalidResponse(_) | Self::MissingCredentials(_) => false,
        }
    }

    /// Server supplied delay (`Retry-After`), if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::InvalidResponse(e.to_string());
        }
        Self::Transport {
            transient: e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            message: e.to_string(),
        }
    }
}

/// Pipeline stage, used when reporting where a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Source,
    Dialogue,
    Segmentation,
    Synthesis,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Dialogue => write!(f, "dialogue"),
            Self::Segmentation => write!(f, "segmentation"),
            Self::Synthesis => write!(f, "synthesis"),
            Self::Publish => write!(f, "publish"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PodcastError {
    #[error("failed to fetch articles: {0}")]
    SourceFetch(#[source] BackendError),

    #[error("dialogue generation failed for article {article}: {source}")]
    DialogueGeneration {
        article: usize,
        #[source]
        source: BackendError,
    },

    /// Reserved: the segmenter currently tolerates every script shape.
    #[error("malformed script at line {line}: {message}")]
    Segmentation { line: usize, message: String },

    #[error("speech synthesis failed at line {line}: {source}")]
    Synthesis {
        line: usize,
        #[source]
        source: BackendError,
    },

    #[error("failed to write audio output: {0}")]
    Output(#[source] std::io::Error),

    #[error("failed to publish {name}: {source}")]
    Publish {
        name: String,
        #[source]
        source: BackendError,
    },

    #[error("run cancelled during {0}")]
    Cancelled(Stage),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PodcastError {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::SourceFetch(_) => Some(Stage::Source),
            Self::DialogueGeneration { .. } => Some(Stage::Dialogue),
            Self::Segmentation { .. } => Some(Stage::Segmentation),
            Self::Synthesis { .. } | Self::Output(_) => Some(Stage::Synthesis),
            Self::Publish { .. } => Some(Stage::Publish),
            Self::Cancelled(stage) => Some(*stage),
            Self::Config(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PodcastError>;
