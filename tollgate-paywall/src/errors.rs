use std::time::Duration;

use http::{HeaderName, HeaderValue, StatusCode, header};
use serde::Serialize;
use tollgate_core::types::AccessDecision;

/// Why a single payment agent call did not succeed.
///
/// All variants count as one failed attempt for the circuit breaker.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PaymentFailure {
    /// The payment rail answered and refused.
    #[error("payment rejected: {0}")]
    Rejected(String),
    /// The agent could not be reached or answered garbage.
    #[error("payment agent error: {0}")]
    Agent(String),
    #[error("payment agent timed out after {0:?}")]
    TimedOut(Duration),
}

/// JSON body of a gate denial.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DenialBody {
    pub error: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_count: Option<u32>,
}

/// Represents an error response from the gate.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub status: StatusCode,
    pub body: DenialBody,
    /// Seconds the client should wait before retrying.
    pub retry_after: Option<u64>,
    /// Re-issued session cookie to set even though the request was denied.
    pub set_cookie: Option<HeaderValue>,
}

impl ErrorResponse {
    fn new(status: StatusCode, error: &str, reason: impl Into<String>) -> Self {
        ErrorResponse {
            status,
            body: DenialBody {
                error: error.to_string(),
                reason: reason.into(),
                failure_count: None,
            },
            retry_after: None,
            set_cookie: None,
        }
    }

    /// No valid session token accompanied the request.
    pub fn no_session() -> Self {
        ErrorResponse::new(
            StatusCode::UNAUTHORIZED,
            "no_session",
            "A valid browse session is required",
        )
    }

    /// Click limit reached and the recovery top-up failed.
    pub fn payment_required(reason: impl Into<String>) -> Self {
        ErrorResponse::new(StatusCode::PAYMENT_REQUIRED, "payment_required", reason)
    }

    /// An automatic top-up is pending; the client should retry shortly.
    pub fn retry_pending(failures: u32, retry_after: u64) -> Self {
        let mut response = ErrorResponse::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "retry_pending",
            "Auto top-up pending, try again shortly",
        );
        response.body.failure_count = Some(failures);
        response.retry_after = Some(retry_after);
        response
    }

    /// Too many consecutive failures; needs manual intervention.
    pub fn hard_denied(failures: u32) -> Self {
        let mut response = ErrorResponse::new(
            StatusCode::FORBIDDEN,
            "hard_denied",
            "Automatic top-ups failed repeatedly; access is suspended until reset",
        );
        response.body.failure_count = Some(failures);
        response
    }

    /// Internal server error while handling the session.
    pub fn server_error(reason: impl Into<String>) -> Self {
        ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "server_error", reason)
    }

    /// Map a denying decision to its response. `None` for [`AccessDecision::Granted`].
    pub fn from_decision(decision: &AccessDecision, retry_after: u64) -> Option<Self> {
        match decision {
            AccessDecision::Granted => None,
            AccessDecision::Blocked(reason) => Some(ErrorResponse::payment_required(reason.clone())),
            AccessDecision::RetryPending(n) => Some(ErrorResponse::retry_pending(*n, retry_after)),
            AccessDecision::HardDenied(n) => Some(ErrorResponse::hard_denied(*n)),
        }
    }

    pub fn with_cookie(mut self, cookie: Option<HeaderValue>) -> Self {
        self.set_cookie = cookie;
        self
    }

    /// Extra headers to include in the response.
    pub fn headers(&self) -> Vec<(HeaderName, HeaderValue)> {
        let mut headers = Vec::new();
        if let Some(secs) = self.retry_after {
            headers.push((header::RETRY_AFTER, HeaderValue::from(secs)));
        }
        if let Some(cookie) = &self.set_cookie {
            headers.push((header::SET_COOKIE, cookie.clone()));
        }
        headers
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        let headers = self.headers();
        let mut response = (self.status, axum::extract::Json(self.body)).into_response();
        for (name, val) in headers {
            response.headers_mut().append(name, val);
        }
        response
    }
}
