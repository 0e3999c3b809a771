use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cache::SessionCache;
use crate::clock::Clock;
use crate::error::{AppError, AppResult, BatchError};
use crate::ledger::models::{amount_due, PayrollBatch, SessionRef, WorkSession};
use crate::ledger::LedgerClient;

/// Outcome of one settlement line item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Paid { signature: String },
    Failed { detail: String },
}

#[derive(Debug, Clone)]
pub struct LineItem {
    pub session: SessionRef,
    pub amount: u64,
    pub outcome: LineOutcome,
}

impl LineItem {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, LineOutcome::Paid { .. })
    }
}

/// Result of one `process_batch` run. Partial failure is a normal return:
/// the batch is processed either way and the caller must inspect the line
/// items to learn the true settlement state.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch_id: u64,
    pub processed_at: DateTime<Utc>,
    pub items: Vec<LineItem>,
}

impl BatchReport {
    pub fn paid_count(&self) -> usize {
        self.items.iter().filter(|i| i.succeeded()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.items.len() - self.paid_count()
    }

    pub fn fully_settled(&self) -> bool {
        self.failed_count() == 0
    }
}

/// Payroll batch settlement engine
///
/// `create_batch` only reserves a set of sessions - no transfers happen
/// until `process_batch`, which attempts every line item independently and
/// marks the batch processed regardless of per-line failures. A partially
/// settled batch is closed for good; the unpaid remainder must go into a
/// new batch.
pub struct SettlementEngine {
    ledger: Arc<dyn LedgerClient>,
    cache: Arc<SessionCache>,
    clock: Arc<dyn Clock>,
    /// Batch ids currently being processed (test-and-set guard)
    in_flight: Mutex<HashSet<u64>>,
    /// Highest batch id handed out by this process
    last_batch_id: Mutex<u64>,
}

impl SettlementEngine {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        cache: Arc<SessionCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            cache,
            clock,
            in_flight: Mutex::new(HashSet::new()),
            last_batch_id: Mutex::new(0),
        }
    }

    /// Reserve a set of unpaid, closed sessions as a new payroll batch.
    ///
    /// Validation is all-or-nothing: any missing, already-paid or
    /// still-open session fails the whole call before anything is written.
    /// The total is computed from each session's duration and the
    /// employee's current hourly rate, then frozen.
    pub async fn create_batch(&self, selection: &[SessionRef]) -> AppResult<PayrollBatch> {
        if selection.is_empty() {
            return Err(BatchError::EmptySelection.into());
        }

        let sessions = self.cache.work_sessions().await?;
        let employees = self.cache.employees().await?;
        let by_key: HashMap<SessionRef, &WorkSession> =
            sessions.iter().map(|s| (s.key(), s)).collect();
        let rates: HashMap<Pubkey, u64> =
            employees.iter().map(|e| (e.wallet, e.hourly_rate)).collect();

        // selections are a set: a ref listed twice counts once
        let mut refs: Vec<SessionRef> = Vec::with_capacity(selection.len());
        let mut seen: HashSet<SessionRef> = HashSet::with_capacity(selection.len());
        let mut total_amount: u64 = 0;

        for reference in selection {
            if !seen.insert(*reference) {
                continue;
            }
            let session = by_key.get(reference).ok_or(BatchError::SessionNotFound {
                wallet: reference.employee,
                session_id: reference.session_id,
            })?;
            if session.is_paid {
                return Err(BatchError::AlreadyPaid {
                    wallet: reference.employee,
                    session_id: reference.session_id,
                }
                .into());
            }
            if session.is_open() {
                return Err(BatchError::SessionStillOpen {
                    wallet: reference.employee,
                    session_id: reference.session_id,
                }
                .into());
            }
            let rate = rates
                .get(&session.employee)
                .copied()
                .ok_or(AppError::EmployeeNotFound(session.employee))?;
            total_amount += amount_due(rate, session.duration);
            refs.push(*reference);
        }

        let now = self.clock.now();
        let batch_id = self.next_batch_id(now).await?;

        self.ledger.create_batch(batch_id, total_amount, now).await?;

        let batch = PayrollBatch {
            batch_id,
            total_amount,
            created_at: now,
            processed_at: None,
            is_processed: false,
            authority: self.ledger.authority(),
            sessions: refs,
        };
        self.cache.put_batch(batch.clone()).await;

        info!(
            "📋 payroll batch {} created: {} sessions, {} lamports",
            batch_id,
            batch.sessions.len(),
            total_amount
        );
        Ok(batch)
    }

    /// Time-derived, strictly increasing batch id. Bumped past both the
    /// last id handed out here and any id already on the ledger.
    async fn next_batch_id(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let highest_known = self
            .cache
            .payroll_batches()
            .await?
            .iter()
            .map(|b| b.batch_id)
            .max()
            .unwrap_or(0);

        let mut last = self.last_batch_id.lock();
        let batch_id = (now.timestamp() as u64)
            .max(highest_known + 1)
            .max(*last + 1);
        *last = batch_id;
        Ok(batch_id)
    }

    /// Settle a batch: one transfer per referenced session, independent of
    /// the others. A failed line never aborts the batch; only sessions
    /// whose transfer confirmed are marked paid. Calling this twice for
    /// the same id is rejected, even after partial failure.
    pub async fn process_batch(&self, batch_id: u64) -> AppResult<BatchReport> {
        // test-and-set so two concurrent calls cannot both run transfers
        if !self.in_flight.lock().insert(batch_id) {
            return Err(BatchError::AlreadyProcessed(batch_id).into());
        }
        let result = self.process_batch_locked(batch_id).await;
        self.in_flight.lock().remove(&batch_id);
        result
    }

    async fn process_batch_locked(&self, batch_id: u64) -> AppResult<BatchReport> {
        let batch = self
            .cache
            .batch(batch_id)
            .await?
            .ok_or(BatchError::BatchNotFound(batch_id))?;
        if batch.is_processed {
            return Err(BatchError::AlreadyProcessed(batch_id).into());
        }

        info!(
            "💸 processing payroll batch {} ({} sessions)",
            batch_id,
            batch.sessions.len()
        );

        let mut items = Vec::with_capacity(batch.sessions.len());
        for reference in &batch.sessions {
            items.push(self.settle_line(reference).await);
        }

        let now = self.clock.now();
        if let Err(finalize_error) = self.ledger.finalize_batch(batch_id, now).await {
            // the per-line results must not be lost to a failed close-out;
            // the cache still records the batch as processed
            error!(
                "batch {} close-out not recorded on ledger: {}",
                batch_id, finalize_error
            );
        }

        let mut processed = batch;
        processed.is_processed = true;
        processed.processed_at = Some(now);
        self.cache.put_batch(processed).await;

        let report = BatchReport {
            batch_id,
            processed_at: now,
            items,
        };
        info!(
            "✓ batch {} processed: {} paid, {} failed",
            batch_id,
            report.paid_count(),
            report.failed_count()
        );
        Ok(report)
    }

    /// Attempt one line item: transfer, then flip the paid flag. Errors
    /// are captured into the line outcome, never propagated.
    async fn settle_line(&self, reference: &SessionRef) -> LineItem {
        let failed = |amount, detail: String| LineItem {
            session: *reference,
            amount,
            outcome: LineOutcome::Failed { detail },
        };

        let session = match self.cache.session(reference).await {
            Ok(Some(session)) => session,
            Ok(None) => return failed(0, "session not found".to_string()),
            Err(e) => return failed(0, e.to_string()),
        };
        if session.is_paid {
            // a session can sit in two unprocessed batches; the second
            // attempt must leave it untouched
            return failed(0, "session already paid".to_string());
        }

        let rate = match self.cache.employee(&session.employee).await {
            Ok(Some(employee)) => employee.hourly_rate,
            Ok(None) => return failed(0, "employee not found".to_string()),
            Err(e) => return failed(0, e.to_string()),
        };
        let amount = session.amount_due(rate);

        let signature = match self.ledger.transfer(session.employee, amount).await {
            Ok(signature) => signature,
            Err(e) => {
                warn!(
                    "transfer failed for session {} of {}: {}",
                    reference.session_id, reference.employee, e
                );
                return failed(amount, e.to_string());
            }
        };

        if let Err(e) = self
            .ledger
            .mark_session_paid(session.employee, session.session_id)
            .await
        {
            // the lamports moved but the flag did not stick; keep the
            // session unpaid and hand the signature to the operator
            return failed(
                amount,
                format!("transfer {} confirmed but paid flag not recorded: {}", signature, e),
            );
        }

        let mut paid_session = session;
        paid_session.is_paid = true;
        self.cache.put_session(paid_session.clone()).await;
        if let Ok(Some(mut employee)) = self.cache.employee(&paid_session.employee).await {
            employee.total_paid += amount;
            self.cache.put_employee(employee).await;
        }

        info!(
            "✓ paid {} lamports to {} (session {})",
            amount, reference.employee, reference.session_id
        );
        LineItem {
            session: *reference,
            amount,
            outcome: LineOutcome::Paid { signature },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{employee_fixture, ManualClock, MockLedger};
    use crate::tracker::SessionTracker;
    use chrono::Duration;

    struct Harness {
        ledger: Arc<MockLedger>,
        clock: Arc<ManualClock>,
        tracker: SessionTracker,
        engine: SettlementEngine,
    }

    fn setup() -> Harness {
        let ledger = Arc::new(MockLedger::new());
        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(SessionCache::new(
            ledger.clone(),
            clock.clone(),
            Duration::seconds(300),
        ));
        let tracker = SessionTracker::new(ledger.clone(), cache.clone(), clock.clone());
        let engine = SettlementEngine::new(ledger.clone(), cache, clock.clone());
        Harness {
            ledger,
            clock,
            tracker,
            engine,
        }
    }

    /// Check in, work `secs`, check out. Returns the closed session's ref.
    async fn worked_session(harness: &Harness, wallet: Pubkey, secs: i64) -> SessionRef {
        let session = harness.tracker.check_in(wallet).await.unwrap();
        harness.clock.advance_secs(secs);
        harness
            .tracker
            .check_out(wallet, session.session_id)
            .await
            .unwrap()
            .key()
    }

    #[tokio::test]
    async fn empty_selection_is_rejected() {
        let harness = setup();
        let error = harness.engine.create_batch(&[]).await.unwrap_err();
        assert!(matches!(
            error,
            AppError::Batch(BatchError::EmptySelection)
        ));
    }

    #[tokio::test]
    async fn batch_total_is_sum_of_amounts_due() {
        let harness = setup();
        // 20 SOL/hour
        let employee = employee_fixture(20_000_000_000);
        harness.ledger.insert_employee(employee.clone());

        // 1.5h -> exactly 30 SOL, plus 1h -> 20 SOL
        let first = worked_session(&harness, employee.wallet, 5400).await;
        let second = worked_session(&harness, employee.wallet, 3600).await;

        let batch = harness
            .engine
            .create_batch(&[first, second])
            .await
            .unwrap();
        assert_eq!(batch.total_amount, 50_000_000_000);
        assert!(!batch.is_processed);
        assert!(batch.processed_at.is_none());
    }

    #[tokio::test]
    async fn open_session_fails_batch_creation() {
        let harness = setup();
        let employee = employee_fixture(1_000);
        harness.ledger.insert_employee(employee.clone());

        let open = harness.tracker.check_in(employee.wallet).await.unwrap();
        let error = harness
            .engine
            .create_batch(&[open.key()])
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            AppError::Batch(BatchError::SessionStillOpen { .. })
        ));
    }

    #[tokio::test]
    async fn paid_session_fails_batch_creation_atomically() {
        let harness = setup();
        let employee = employee_fixture(1_000);
        harness.ledger.insert_employee(employee.clone());

        let paid_ref = worked_session(&harness, employee.wallet, 3600).await;
        let batch = harness.engine.create_batch(&[paid_ref]).await.unwrap();
        harness.engine.process_batch(batch.batch_id).await.unwrap();

        let unpaid_ref = worked_session(&harness, employee.wallet, 3600).await;

        // snapshot the ledger, attempt a mixed batch, assert no mutation
        let batches_before = harness.ledger.payroll_batches();
        let sessions_before = harness.ledger.work_sessions();

        let error = harness
            .engine
            .create_batch(&[unpaid_ref, paid_ref])
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            AppError::Batch(BatchError::AlreadyPaid { .. })
        ));
        assert_eq!(harness.ledger.payroll_batches(), batches_before);
        assert_eq!(harness.ledger.work_sessions(), sessions_before);
    }

    #[tokio::test]
    async fn unknown_session_fails_batch_creation() {
        let harness = setup();
        let employee = employee_fixture(1_000);
        harness.ledger.insert_employee(employee.clone());

        let missing = SessionRef {
            employee: employee.wallet,
            session_id: 999,
        };
        let error = harness.engine.create_batch(&[missing]).await.unwrap_err();
        assert!(matches!(
            error,
            AppError::Batch(BatchError::SessionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn processing_pays_sessions_and_accrues_totals() {
        let harness = setup();
        let employee = employee_fixture(3_600_000);
        harness.ledger.insert_employee(employee.clone());

        let reference = worked_session(&harness, employee.wallet, 1000).await;
        let batch = harness.engine.create_batch(&[reference]).await.unwrap();
        let report = harness.engine.process_batch(batch.batch_id).await.unwrap();

        assert!(report.fully_settled());
        assert_eq!(report.paid_count(), 1);
        assert_eq!(report.items[0].amount, 1_000_000);

        let session = harness.ledger.session(&reference).unwrap();
        assert!(session.is_paid);
        let on_ledger = harness.ledger.employee(&employee.wallet).unwrap();
        assert_eq!(on_ledger.total_paid, 1_000_000);

        let processed = harness.ledger.batch(batch.batch_id).unwrap();
        assert!(processed.is_processed);
        assert!(processed.processed_at.is_some());
    }

    #[tokio::test]
    async fn partial_failure_settles_the_rest_and_closes_the_batch() {
        let harness = setup();
        let alice = employee_fixture(3_600_000);
        let bob = employee_fixture(3_600_000);
        let carol = employee_fixture(3_600_000);
        for employee in [&alice, &bob, &carol] {
            harness.ledger.insert_employee((*employee).clone());
        }

        let a = worked_session(&harness, alice.wallet, 100).await;
        let b = worked_session(&harness, bob.wallet, 100).await;
        let c = worked_session(&harness, carol.wallet, 100).await;

        // the 2nd transfer will be rejected by the ledger
        harness.ledger.fail_transfers_to(bob.wallet);

        let batch = harness.engine.create_batch(&[a, b, c]).await.unwrap();
        let report = harness.engine.process_batch(batch.batch_id).await.unwrap();

        assert_eq!(report.paid_count(), 2);
        assert_eq!(report.failed_count(), 1);
        assert!(!report.fully_settled());

        assert!(harness.ledger.session(&a).unwrap().is_paid);
        assert!(!harness.ledger.session(&b).unwrap().is_paid);
        assert!(harness.ledger.session(&c).unwrap().is_paid);

        // bob earned nothing, the others were credited
        assert_eq!(harness.ledger.employee(&bob.wallet).unwrap().total_paid, 0);
        assert_eq!(
            harness.ledger.employee(&alice.wallet).unwrap().total_paid,
            100_000
        );

        // the batch is closed regardless of the failed line
        assert!(harness.ledger.batch(batch.batch_id).unwrap().is_processed);
    }

    #[tokio::test]
    async fn processed_batch_cannot_be_processed_again() {
        let harness = setup();
        let employee = employee_fixture(1_000);
        harness.ledger.insert_employee(employee.clone());

        let reference = worked_session(&harness, employee.wallet, 60).await;
        let batch = harness.engine.create_batch(&[reference]).await.unwrap();
        harness.engine.process_batch(batch.batch_id).await.unwrap();

        let error = harness
            .engine
            .process_batch(batch.batch_id)
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            AppError::Batch(BatchError::AlreadyProcessed(_))
        ));
    }

    #[tokio::test]
    async fn partially_failed_batch_is_still_closed_to_reprocessing() {
        let harness = setup();
        let employee = employee_fixture(1_000);
        harness.ledger.insert_employee(employee.clone());

        let reference = worked_session(&harness, employee.wallet, 3600).await;
        harness.ledger.fail_transfers_to(employee.wallet);

        let batch = harness.engine.create_batch(&[reference]).await.unwrap();
        let report = harness.engine.process_batch(batch.batch_id).await.unwrap();
        assert_eq!(report.failed_count(), 1);

        // even with every line failed, the id is burned
        let error = harness
            .engine
            .process_batch(batch.batch_id)
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            AppError::Batch(BatchError::AlreadyProcessed(_))
        ));

        // the unpaid remainder goes into a fresh batch
        harness.ledger.allow_transfers_to(employee.wallet);
        let retry = harness.engine.create_batch(&[reference]).await.unwrap();
        assert_ne!(retry.batch_id, batch.batch_id);
        let retry_report = harness.engine.process_batch(retry.batch_id).await.unwrap();
        assert!(retry_report.fully_settled());
    }

    #[tokio::test]
    async fn settled_sessions_are_never_altered_again() {
        let harness = setup();
        let employee = employee_fixture(1_000_000);
        harness.ledger.insert_employee(employee.clone());

        let reference = worked_session(&harness, employee.wallet, 3600).await;
        let batch = harness.engine.create_batch(&[reference]).await.unwrap();
        harness.engine.process_batch(batch.batch_id).await.unwrap();

        let settled = harness.ledger.session(&reference).unwrap();

        // a second batch created before the first was processed could
        // still reference the session; settling it must be a no-op line
        let second = harness.engine.create_batch(&[reference]).await;
        assert!(second.is_err());

        // direct settlement attempt through a stale batch
        let stale = PayrollBatch {
            batch_id: 9_999_999_999,
            total_amount: settled.amount_due(employee.hourly_rate),
            created_at: harness.clock.now(),
            processed_at: None,
            is_processed: false,
            authority: harness.ledger.authority(),
            sessions: vec![reference],
        };
        harness.ledger.insert_batch(stale.clone());
        harness.engine.cache.put_batch(stale.clone()).await;

        let report = harness.engine.process_batch(stale.batch_id).await.unwrap();
        assert_eq!(report.failed_count(), 1);

        let after = harness.ledger.session(&reference).unwrap();
        assert_eq!(after.duration, settled.duration);
        assert_eq!(after.check_in_time, settled.check_in_time);
        assert_eq!(after.check_out_time, settled.check_out_time);
        assert!(after.is_paid);
        // no double credit
        assert_eq!(
            harness.ledger.employee(&employee.wallet).unwrap().total_paid,
            settled.amount_due(employee.hourly_rate)
        );
    }

    #[tokio::test]
    async fn rate_at_settlement_time_wins() {
        let harness = setup();
        let mut employee = employee_fixture(1_000);
        harness.ledger.insert_employee(employee.clone());

        let reference = worked_session(&harness, employee.wallet, 3600).await;

        // the employer doubles the rate after checkout, before settlement
        employee.hourly_rate = 2_000;
        harness.ledger.insert_employee(employee.clone());
        harness
            .engine
            .cache
            .put_employee(employee.clone())
            .await;

        let batch = harness.engine.create_batch(&[reference]).await.unwrap();
        assert_eq!(batch.total_amount, 2_000);
        let report = harness.engine.process_batch(batch.batch_id).await.unwrap();
        assert_eq!(report.items[0].amount, 2_000);
    }
}
