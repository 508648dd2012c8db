//! Error taxonomy shared by every SDFS component.
//!
//! Each variant maps to one HTTP status so that the kind survives a round trip
//! between nodes: a handler returns `SdfsError`, the RPC client rebuilds the
//! same variant from the status and [`ErrorBody`].

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, SdfsError>;

#[derive(thiserror::Error, Debug)]
pub enum SdfsError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("leader unavailable: {0}")]
    LeaderUnavailable(String),
    #[error("operation timed out: {0}")]
    Timeout(String),
    #[error("partial replication failure: {0}")]
    PartialReplicationFailure(String),
    #[error("connection failure: {0}")]
    ConnectionFailure(String),
    #[error("remote error: {0}")]
    Remote(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    LeaderUnavailable,
    Timeout,
    PartialReplicationFailure,
    ConnectionFailure,
    Remote,
    Io,
    Internal,
}

/// JSON body carried by every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl SdfsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SdfsError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            SdfsError::NotFound(_) => ErrorKind::NotFound,
            SdfsError::LeaderUnavailable(_) => ErrorKind::LeaderUnavailable,
            SdfsError::Timeout(_) => ErrorKind::Timeout,
            SdfsError::PartialReplicationFailure(_) => ErrorKind::PartialReplicationFailure,
            SdfsError::ConnectionFailure(_) => ErrorKind::ConnectionFailure,
            SdfsError::Remote(_) => ErrorKind::Remote,
            SdfsError::Io(_) => ErrorKind::Io,
            SdfsError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::LeaderUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::PartialReplicationFailure
            | ErrorKind::ConnectionFailure
            | ErrorKind::Remote => StatusCode::BAD_GATEWAY,
            ErrorKind::Io | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message without the variant prefix added by `Display`.
    fn detail(&self) -> String {
        match self {
            SdfsError::InvalidArgument(m)
            | SdfsError::NotFound(m)
            | SdfsError::LeaderUnavailable(m)
            | SdfsError::Timeout(m)
            | SdfsError::PartialReplicationFailure(m)
            | SdfsError::ConnectionFailure(m)
            | SdfsError::Remote(m)
            | SdfsError::Internal(m) => m.clone(),
            SdfsError::Io(e) => e.to_string(),
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind(),
            message: self.detail(),
        }
    }

    /// Rebuilds the error a remote handler produced.
    pub fn from_body(body: ErrorBody) -> Self {
        let m = body.message;
        match body.kind {
            ErrorKind::InvalidArgument => SdfsError::InvalidArgument(m),
            ErrorKind::NotFound => SdfsError::NotFound(m),
            ErrorKind::LeaderUnavailable => SdfsError::LeaderUnavailable(m),
            ErrorKind::Timeout => SdfsError::Timeout(m),
            ErrorKind::PartialReplicationFailure => SdfsError::PartialReplicationFailure(m),
            ErrorKind::ConnectionFailure => SdfsError::ConnectionFailure(m),
            ErrorKind::Remote | ErrorKind::Io => SdfsError::Remote(m),
            ErrorKind::Internal => SdfsError::Internal(m),
        }
    }

    /// True when the operation may still have taken effect remotely.
    pub fn is_indeterminate(&self) -> bool {
        matches!(
            self,
            SdfsError::Timeout(_) | SdfsError::PartialReplicationFailure(_)
        )
    }
}

impl IntoResponse for SdfsError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        (status, Json(self.to_body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_round_trip_keeps_kind() {
        let err = SdfsError::LeaderUnavailable("election in progress".to_string());
        let restored = SdfsError::from_body(err.to_body());

        assert_eq!(restored.kind(), ErrorKind::LeaderUnavailable);
        assert_eq!(restored.to_string(), "leader unavailable: election in progress");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            SdfsError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            SdfsError::InvalidArgument("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SdfsError::Timeout("x".into()).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_indeterminate_errors() {
        assert!(SdfsError::Timeout("t".into()).is_indeterminate());
        assert!(SdfsError::PartialReplicationFailure("p".into()).is_indeterminate());
        assert!(!SdfsError::NotFound("n".into()).is_indeterminate());
    }
}
