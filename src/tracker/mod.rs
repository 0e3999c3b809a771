use parking_lot::Mutex;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::cache::SessionCache;
use crate::clock::Clock;
use crate::error::{AppError, AppResult, SessionError};
use crate::ledger::models::{SessionRef, WorkSession};
use crate::ledger::LedgerClient;

/// Check-in/check-out state machine
///
/// All mutations for one employee are serialized through a per-employee
/// async mutex so two concurrent check-ins can never both observe "no open
/// session" and create one each.
pub struct SessionTracker {
    ledger: Arc<dyn LedgerClient>,
    cache: Arc<SessionCache>,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<Pubkey, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionTracker {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        cache: Arc<SessionCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            cache,
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn employee_lock(&self, wallet: &Pubkey) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(*wallet)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Start a work session. Fails if the employee already has an open
    /// session, does not exist, or is deactivated.
    pub async fn check_in(&self, wallet: Pubkey) -> AppResult<WorkSession> {
        let lock = self.employee_lock(&wallet);
        let _guard = lock.lock().await;

        let employee = self
            .cache
            .employee(&wallet)
            .await?
            .ok_or(AppError::EmployeeNotFound(wallet))?;
        if !employee.is_active {
            return Err(SessionError::EmployeeInactive { wallet }.into());
        }

        let sessions = self.cache.work_sessions().await?;
        if let Some(open) = sessions.iter().find(|s| s.employee == wallet && s.is_open()) {
            return Err(SessionError::AlreadyCheckedIn {
                wallet,
                open_session: open.session_id,
            }
            .into());
        }

        let now = self.clock.now();
        // Time-derived id, bumped past any existing id so two check-ins
        // within the same second stay unique and strictly increasing.
        let mut session_id = now.timestamp() as u64;
        if let Some(last) = sessions
            .iter()
            .filter(|s| s.employee == wallet)
            .map(|s| s.session_id)
            .max()
        {
            session_id = session_id.max(last + 1);
        }

        self.ledger.check_in(wallet, session_id, now).await?;

        let session = WorkSession {
            employee: wallet,
            session_id,
            check_in_time: now,
            check_out_time: None,
            duration: 0,
            is_paid: false,
            authority: employee.authority,
        };
        self.cache.put_session(session.clone()).await;

        info!("⏱️ {} checked in (session {})", wallet, session_id);
        Ok(session)
    }

    /// End a work session. Fixes the duration and bumps the employee's
    /// cumulative worked time; the amount due is derived later from the
    /// rate in effect at settlement.
    pub async fn check_out(&self, wallet: Pubkey, session_id: u64) -> AppResult<WorkSession> {
        let lock = self.employee_lock(&wallet);
        let _guard = lock.lock().await;

        let key = SessionRef {
            employee: wallet,
            session_id,
        };
        let mut session = self
            .cache
            .session(&key)
            .await?
            .ok_or(SessionError::SessionNotFound { wallet, session_id })?;

        if session.check_out_time.is_some() {
            return Err(SessionError::AlreadyCheckedOut { wallet, session_id }.into());
        }

        let now = self.clock.now();
        let elapsed = (now - session.check_in_time).num_seconds();
        if elapsed < 0 {
            // clock skew between processes; refuse rather than record a
            // negative interval
            return Err(SessionError::InvalidDuration {
                checked_in: session.check_in_time,
                checked_out: now,
            }
            .into());
        }

        self.ledger.check_out(wallet, session_id, now).await?;

        session.check_out_time = Some(now);
        session.duration = elapsed as u64;
        self.cache.put_session(session.clone()).await;

        if let Some(mut employee) = self.cache.employee(&wallet).await? {
            employee.total_seconds_worked += session.duration;
            self.cache.put_employee(employee).await;
        }

        info!(
            "⏱️ {} checked out (session {}, {}s)",
            wallet, session_id, session.duration
        );
        Ok(session)
    }
}
