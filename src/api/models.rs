use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::ledger::models::{Employee, PayrollBatch, WorkSession};
use crate::payroll::{BatchReport, LineOutcome};
use crate::policy::Role;

/// Render lamports as a SOL decimal string
pub fn lamports_to_sol(lamports: u64) -> String {
    Decimal::from_i128_with_scale(lamports as i128, 9)
        .normalize()
        .to_string()
}

// ========== REQUEST MODELS ==========

#[derive(Debug, Deserialize)]
pub struct ChallengeRequest {
    pub wallet: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub wallet: String,
    pub nonce: String,
    /// Base64-encoded Ed25519 signature over the challenge message
    pub signature: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterEmployeeRequest {
    pub wallet: String,
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub position: String,
    /// Lamports per hour
    #[validate(range(min = 1))]
    pub hourly_rate: u64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateEmployeeRequest {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub position: String,
    #[validate(range(min = 1))]
    pub hourly_rate: u64,
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    pub employee: Option<String>,
    pub paid: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CheckInRequest {
    pub employee: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckOutRequest {
    pub employee: String,
    pub session_id: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SessionRefRequest {
    pub employee: String,
    pub session_id: u64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBatchRequest {
    #[validate(length(min = 1))]
    pub sessions: Vec<SessionRefRequest>,
}

// ========== RESPONSE MODELS ==========

#[derive(Debug, Serialize)]
pub struct ChallengeResponse {
    pub message: String,
    pub nonce: String,
    pub expires_in_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: Uuid,
    pub wallet: String,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct EmployeeResponse {
    pub wallet: String,
    pub name: String,
    pub position: String,
    pub hourly_rate: u64,
    pub hourly_rate_sol: String,
    pub total_seconds_worked: u64,
    pub total_paid: u64,
    pub total_paid_sol: String,
    pub is_active: bool,
}

impl From<Employee> for EmployeeResponse {
    fn from(employee: Employee) -> Self {
        Self {
            wallet: employee.wallet.to_string(),
            name: employee.name,
            position: employee.position,
            hourly_rate: employee.hourly_rate,
            hourly_rate_sol: lamports_to_sol(employee.hourly_rate),
            total_seconds_worked: employee.total_seconds_worked,
            total_paid: employee.total_paid,
            total_paid_sol: lamports_to_sol(employee.total_paid),
            is_active: employee.is_active,
        }
    }
}

/// Response for mutations that submitted a ledger transaction
#[derive(Debug, Serialize)]
pub struct EmployeeMutationResponse {
    pub employee: EmployeeResponse,
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub employee: String,
    pub session_id: u64,
    pub check_in_time: DateTime<Utc>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub duration_seconds: u64,
    pub hourly_rate: u64,
    pub amount_due: u64,
    pub amount_due_sol: String,
    pub is_paid: bool,
}

impl SessionResponse {
    /// Amounts are derived from the employee's current rate, so the rate
    /// travels alongside the session.
    pub fn from_session(session: &WorkSession, hourly_rate: u64) -> Self {
        let amount_due = session.amount_due(hourly_rate);
        Self {
            employee: session.employee.to_string(),
            session_id: session.session_id,
            check_in_time: session.check_in_time,
            check_out_time: session.check_out_time,
            duration_seconds: session.duration,
            hourly_rate,
            amount_due,
            amount_due_sol: lamports_to_sol(amount_due),
            is_paid: session.is_paid,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub batch_id: u64,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub total_amount: u64,
    pub total_amount_sol: String,
    pub session_count: usize,
    pub is_processed: bool,
}

impl From<PayrollBatch> for BatchResponse {
    fn from(batch: PayrollBatch) -> Self {
        Self {
            batch_id: batch.batch_id,
            created_at: batch.created_at,
            processed_at: batch.processed_at,
            total_amount: batch.total_amount,
            total_amount_sol: lamports_to_sol(batch.total_amount),
            session_count: batch.sessions.len(),
            is_processed: batch.is_processed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LineItemResponse {
    pub employee: String,
    pub session_id: u64,
    pub amount: u64,
    pub amount_sol: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchReportResponse {
    pub batch_id: u64,
    pub processed_at: DateTime<Utc>,
    pub paid_count: usize,
    pub failed_count: usize,
    pub fully_settled: bool,
    pub items: Vec<LineItemResponse>,
}

impl From<BatchReport> for BatchReportResponse {
    fn from(report: BatchReport) -> Self {
        let items = report
            .items
            .iter()
            .map(|item| {
                let (status, signature, error) = match &item.outcome {
                    LineOutcome::Paid { signature } => {
                        ("paid".to_string(), Some(signature.clone()), None)
                    }
                    LineOutcome::Failed { detail } => {
                        ("failed".to_string(), None, Some(detail.clone()))
                    }
                };
                LineItemResponse {
                    employee: item.session.employee.to_string(),
                    session_id: item.session.session_id,
                    amount: item.amount,
                    amount_sol: lamports_to_sol(item.amount),
                    status,
                    signature,
                    error,
                }
            })
            .collect();
        Self {
            batch_id: report.batch_id,
            processed_at: report.processed_at,
            paid_count: report.paid_count(),
            failed_count: report.failed_count(),
            fully_settled: report.fully_settled(),
            items,
        }
    }
}
