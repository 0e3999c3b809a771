use chrono::{DateTime, Utc};
use solana_sdk::pubkey::Pubkey;

/// Seconds per hour, the divisor of the wage formula.
pub const SECONDS_PER_HOUR: u64 = 3600;

/// Amount due in lamports for `duration_secs` of work at `hourly_rate`
/// lamports per hour. Widened to u128 so rate * duration cannot overflow
/// for any realistic rate and duration; the division truncates toward
/// zero, so sub-lamport remainders are never paid out.
pub fn amount_due(hourly_rate: u64, duration_secs: u64) -> u64 {
    ((hourly_rate as u128 * duration_secs as u128) / SECONDS_PER_HOUR as u128) as u64
}

/// Employee entity, keyed by the employee's wallet address
///
/// Employees are never deleted, only deactivated via `is_active`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Employee {
    pub wallet: Pubkey,
    pub name: String,
    pub position: String,
    /// Lamports per hour
    pub hourly_rate: u64,
    /// Accumulated at check-out, in seconds
    pub total_seconds_worked: u64,
    /// Accumulated at settlement, in lamports
    pub total_paid: u64,
    /// The employer wallet that registered this employee
    pub authority: Pubkey,
    pub is_active: bool,
}

/// Reference to a work session: (employee wallet, session id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionRef {
    pub employee: Pubkey,
    pub session_id: u64,
}

/// Work session entity - one check-in/check-out interval
///
/// INVARIANT: `is_paid` implies a set `check_out_time` and `duration > 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkSession {
    pub employee: Pubkey,
    /// Unique per employee, time-derived and strictly increasing
    pub session_id: u64,
    pub check_in_time: DateTime<Utc>,
    pub check_out_time: Option<DateTime<Utc>>,
    /// Seconds between check-in and check-out, 0 while open
    pub duration: u64,
    pub is_paid: bool,
    pub authority: Pubkey,
}

impl WorkSession {
    /// Open sessions have no check-out yet
    pub fn is_open(&self) -> bool {
        self.check_out_time.is_none()
    }

    pub fn key(&self) -> SessionRef {
        SessionRef {
            employee: self.employee,
            session_id: self.session_id,
        }
    }

    /// Amount due at the given hourly rate. The rate is deliberately a
    /// parameter: wages always use the rate in effect at computation time,
    /// never one frozen at check-in.
    pub fn amount_due(&self, hourly_rate: u64) -> u64 {
        amount_due(hourly_rate, self.duration)
    }
}

/// Payroll batch entity - a fixed set of work sessions grouped for one
/// settlement attempt
///
/// INVARIANT: `total_amount` is frozen at creation. A processed batch is
/// never reopened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayrollBatch {
    /// Unique, time-derived and monotonic
    pub batch_id: u64,
    /// Lamports, frozen at creation
    pub total_amount: u64,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub is_processed: bool,
    pub authority: Pubkey,
    /// Session references captured at batch creation
    pub sessions: Vec<SessionRef>,
}
