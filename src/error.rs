// src/error.rs
//! Error type shared by the HTTP handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Which upstream a failure came from. News failures are a 500; chat and
/// arena failures are reported as a bad gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    News,
    Inference,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("upstream request failed: {message}")]
    UpstreamFetch { upstream: Upstream, message: String },

    #[error("upstream returned unreadable content: {message}")]
    UpstreamUnreadable { upstream: Upstream, message: String },

    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn upstream_fetch(upstream: Upstream, err: impl std::fmt::Display) -> Self {
        Self::UpstreamFetch {
            upstream,
            message: err.to_string(),
        }
    }

    pub fn upstream_unreadable(upstream: Upstream, err: impl std::fmt::Display) -> Self {
        Self::UpstreamUnreadable {
            upstream,
            message: err.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotConfigured(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::UpstreamFetch { upstream, .. }
            | AppError::UpstreamUnreadable { upstream, .. } => match upstream {
                Upstream::News => StatusCode::INTERNAL_SERVER_ERROR,
                Upstream::Inference => StatusCode::BAD_GATEWAY,
            },
            AppError::BadRequest(_) | AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Message shown to the browser. Upstream and internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::UpstreamFetch { upstream, .. }
            | AppError::UpstreamUnreadable { upstream, .. } => match upstream {
                Upstream::News => "Failed to fetch news".to_string(),
                Upstream::Inference => "AI service unavailable".to_string(),
            },
            AppError::NotFound(what) => format!("{what} not found"),
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AppError::Internal(e) => tracing::error!(error = ?e, "internal error"),
            AppError::UpstreamFetch { .. } | AppError::UpstreamUnreadable { .. } => {
                tracing::warn!(error = %self, "upstream error")
            }
            _ => {}
        }
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
