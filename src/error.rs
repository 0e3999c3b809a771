use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Employee not found: {0}")]
    EmployeeNotFound(Pubkey),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Work-session state machine errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Employee {wallet} is already checked in (open session {open_session})")]
    AlreadyCheckedIn { wallet: Pubkey, open_session: u64 },

    #[error("Work session {session_id} for {wallet} not found")]
    SessionNotFound { wallet: Pubkey, session_id: u64 },

    #[error("Work session {session_id} for {wallet} is already checked out")]
    AlreadyCheckedOut { wallet: Pubkey, session_id: u64 },

    #[error("Check-out at {checked_out} precedes check-in at {checked_in}")]
    InvalidDuration {
        checked_in: DateTime<Utc>,
        checked_out: DateTime<Utc>,
    },

    #[error("Employee {wallet} is deactivated")]
    EmployeeInactive { wallet: Pubkey },
}

/// Payroll batch errors
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("No sessions selected")]
    EmptySelection,

    #[error("Payroll batch {0} not found")]
    BatchNotFound(u64),

    #[error("Payroll batch {0} has already been processed")]
    AlreadyProcessed(u64),

    #[error("Work session {session_id} for {wallet} is already paid")]
    AlreadyPaid { wallet: Pubkey, session_id: u64 },

    #[error("Work session {session_id} for {wallet} is still open")]
    SessionStillOpen { wallet: Pubkey, session_id: u64 },

    #[error("Work session {session_id} for {wallet} not found")]
    SessionNotFound { wallet: Pubkey, session_id: u64 },
}

/// Ledger client errors (network, RPC, account decoding)
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger call timed out")]
    Timeout,

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid account data: {0}")]
    InvalidAccountData(String),
}

/// Wallet authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("No login challenge outstanding for this wallet")]
    UnknownChallenge,

    #[error("Login challenge has expired")]
    ChallengeExpired,

    #[error("Too many login attempts")]
    RateLimited,

    #[error("Invalid or unknown auth token")]
    InvalidToken,

    #[error("Auth session has expired")]
    SessionExpired,
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match &self {
            AppError::Session(SessionError::AlreadyCheckedIn { wallet, open_session }) => (
                StatusCode::CONFLICT,
                "ALREADY_CHECKED_IN",
                self.to_string(),
                Some(serde_json::json!({
                    "wallet": wallet.to_string(),
                    "open_session": open_session,
                })),
            ),
            AppError::Session(SessionError::SessionNotFound { wallet, session_id })
            | AppError::Batch(BatchError::SessionNotFound { wallet, session_id }) => (
                StatusCode::NOT_FOUND,
                "SESSION_NOT_FOUND",
                self.to_string(),
                Some(serde_json::json!({
                    "wallet": wallet.to_string(),
                    "session_id": session_id,
                })),
            ),
            AppError::Session(SessionError::AlreadyCheckedOut { .. }) => (
                StatusCode::CONFLICT,
                "ALREADY_CHECKED_OUT",
                self.to_string(),
                None,
            ),
            AppError::Session(SessionError::InvalidDuration { .. }) => (
                StatusCode::BAD_REQUEST,
                "INVALID_DURATION",
                self.to_string(),
                None,
            ),
            AppError::Session(SessionError::EmployeeInactive { .. }) => (
                StatusCode::CONFLICT,
                "EMPLOYEE_INACTIVE",
                self.to_string(),
                None,
            ),
            AppError::Batch(BatchError::EmptySelection) => (
                StatusCode::BAD_REQUEST,
                "EMPTY_SELECTION",
                self.to_string(),
                None,
            ),
            AppError::Batch(BatchError::BatchNotFound(batch_id)) => (
                StatusCode::NOT_FOUND,
                "BATCH_NOT_FOUND",
                self.to_string(),
                Some(serde_json::json!({ "batch_id": batch_id })),
            ),
            AppError::Batch(BatchError::AlreadyProcessed(batch_id)) => (
                StatusCode::CONFLICT,
                "BATCH_ALREADY_PROCESSED",
                self.to_string(),
                Some(serde_json::json!({ "batch_id": batch_id })),
            ),
            AppError::Batch(BatchError::AlreadyPaid { wallet, session_id }) => (
                StatusCode::CONFLICT,
                "SESSION_ALREADY_PAID",
                self.to_string(),
                Some(serde_json::json!({
                    "wallet": wallet.to_string(),
                    "session_id": session_id,
                })),
            ),
            AppError::Batch(BatchError::SessionStillOpen { .. }) => (
                StatusCode::CONFLICT,
                "SESSION_STILL_OPEN",
                self.to_string(),
                None,
            ),
            AppError::Ledger(LedgerError::Timeout)
            | AppError::Ledger(LedgerError::Unavailable(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "LEDGER_UNAVAILABLE",
                self.to_string(),
                None,
            ),
            AppError::Ledger(LedgerError::InvalidAccountData(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "LEDGER_DECODE_ERROR",
                self.to_string(),
                None,
            ),
            AppError::Auth(AuthError::RateLimited) => (
                StatusCode::TOO_MANY_REQUESTS,
                "LOGIN_RATE_LIMITED",
                self.to_string(),
                None,
            ),
            AppError::Auth(AuthError::InvalidSignature(_)) => (
                StatusCode::UNAUTHORIZED,
                "INVALID_SIGNATURE",
                self.to_string(),
                None,
            ),
            AppError::Auth(_) => (
                StatusCode::UNAUTHORIZED,
                "AUTHENTICATION_FAILED",
                self.to_string(),
                None,
            ),
            AppError::Unauthorized => (
                StatusCode::FORBIDDEN,
                "UNAUTHORIZED",
                "Operation not permitted for this role".to_string(),
                None,
            ),
            AppError::EmployeeNotFound(wallet) => (
                StatusCode::NOT_FOUND,
                "EMPLOYEE_NOT_FOUND",
                self.to_string(),
                Some(serde_json::json!({ "wallet": wallet.to_string() })),
            ),
            AppError::InvalidInput(_) => (
                StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
                self.to_string(),
                None,
            ),
            AppError::Config(_) | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("Error converting: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
