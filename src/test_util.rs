//! Shared test doubles: an in-memory ledger with failure injection and a
//! manually driven clock.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::clock::Clock;
use crate::error::{AppResult, LedgerError};
use crate::ledger::models::{
    amount_due, Employee, PayrollBatch, SessionRef, WorkSession,
};
use crate::ledger::LedgerClient;

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()),
        }
    }
}

impl ManualClock {
    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock();
        *now += Duration::seconds(secs);
    }

    pub fn rewind_secs(&self, secs: i64) {
        let mut now = self.now.lock();
        *now -= Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

pub fn employee_fixture(hourly_rate: u64) -> Employee {
    Employee {
        wallet: Pubkey::new_unique(),
        name: "Test Employee".to_string(),
        position: "Engineer".to_string(),
        hourly_rate,
        total_seconds_worked: 0,
        total_paid: 0,
        authority: Pubkey::new_unique(),
        is_active: true,
    }
}

#[derive(Default)]
struct MockState {
    employees: HashMap<Pubkey, Employee>,
    sessions: HashMap<SessionRef, WorkSession>,
    batches: HashMap<u64, PayrollBatch>,
}

/// In-memory stand-in for the Solana ledger. Reads and transfers can be
/// made to fail on demand to exercise fallback and partial-failure paths.
pub struct MockLedger {
    authority: Pubkey,
    state: Mutex<MockState>,
    fail_reads: AtomicBool,
    rejected_recipients: Mutex<HashSet<Pubkey>>,
    reads: AtomicUsize,
    transfers: AtomicUsize,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            authority: Pubkey::new_unique(),
            state: Mutex::new(MockState::default()),
            fail_reads: AtomicBool::new(false),
            rejected_recipients: Mutex::new(HashSet::new()),
            reads: AtomicUsize::new(0),
            transfers: AtomicUsize::new(0),
        }
    }

    // ---- seeding and inspection ----

    pub fn insert_employee(&self, employee: Employee) {
        self.state.lock().employees.insert(employee.wallet, employee);
    }

    pub fn insert_batch(&self, batch: PayrollBatch) {
        self.state.lock().batches.insert(batch.batch_id, batch);
    }

    pub fn employee(&self, wallet: &Pubkey) -> Option<Employee> {
        self.state.lock().employees.get(wallet).cloned()
    }

    pub fn session(&self, key: &SessionRef) -> Option<WorkSession> {
        self.state.lock().sessions.get(key).cloned()
    }

    pub fn batch(&self, batch_id: u64) -> Option<PayrollBatch> {
        self.state.lock().batches.get(&batch_id).cloned()
    }

    pub fn work_sessions(&self) -> Vec<WorkSession> {
        let mut sessions: Vec<_> = self.state.lock().sessions.values().cloned().collect();
        sessions.sort_by_key(|s| (s.employee.to_bytes(), s.session_id));
        sessions
    }

    pub fn payroll_batches(&self) -> Vec<PayrollBatch> {
        let mut batches: Vec<_> = self.state.lock().batches.values().cloned().collect();
        batches.sort_by_key(|b| b.batch_id);
        batches
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    // ---- failure injection ----

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_transfers_to(&self, wallet: Pubkey) {
        self.rejected_recipients.lock().insert(wallet);
    }

    pub fn allow_transfers_to(&self, wallet: Pubkey) {
        self.rejected_recipients.lock().remove(&wallet);
    }

    fn read_checkpoint(&self) -> AppResult<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            Err(LedgerError::Unavailable("simulated outage".to_string()).into())
        } else {
            Ok(())
        }
    }

    fn next_signature(&self, counter: &AtomicUsize) -> String {
        format!("sig-{}", counter.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    fn authority(&self) -> Pubkey {
        self.authority
    }

    async fn fetch_employees(&self) -> AppResult<Vec<Employee>> {
        self.read_checkpoint()?;
        Ok(self.state.lock().employees.values().cloned().collect())
    }

    async fn fetch_work_sessions(&self) -> AppResult<Vec<WorkSession>> {
        self.read_checkpoint()?;
        Ok(self.state.lock().sessions.values().cloned().collect())
    }

    async fn fetch_payroll_batches(&self) -> AppResult<Vec<PayrollBatch>> {
        self.read_checkpoint()?;
        // like the real account scan, batches come back without the
        // session refs captured at creation
        Ok(self
            .state
            .lock()
            .batches
            .values()
            .cloned()
            .map(|mut batch| {
                batch.sessions = Vec::new();
                batch
            })
            .collect())
    }

    async fn register_employee(
        &self,
        wallet: Pubkey,
        name: &str,
        position: &str,
        hourly_rate: u64,
    ) -> AppResult<String> {
        let mut state = self.state.lock();
        if state.employees.contains_key(&wallet) {
            return Err(LedgerError::Unavailable("account already exists".to_string()).into());
        }
        state.employees.insert(
            wallet,
            Employee {
                wallet,
                name: name.to_string(),
                position: position.to_string(),
                hourly_rate,
                total_seconds_worked: 0,
                total_paid: 0,
                authority: self.authority,
                is_active: true,
            },
        );
        drop(state);
        Ok(self.next_signature(&self.transfers))
    }

    async fn update_employee(
        &self,
        wallet: Pubkey,
        name: &str,
        position: &str,
        hourly_rate: u64,
        is_active: bool,
    ) -> AppResult<String> {
        let mut state = self.state.lock();
        let employee = state
            .employees
            .get_mut(&wallet)
            .ok_or_else(|| LedgerError::Unavailable("account not found".to_string()))?;
        employee.name = name.to_string();
        employee.position = position.to_string();
        employee.hourly_rate = hourly_rate;
        employee.is_active = is_active;
        drop(state);
        Ok(self.next_signature(&self.transfers))
    }

    async fn check_in(
        &self,
        wallet: Pubkey,
        session_id: u64,
        timestamp: DateTime<Utc>,
    ) -> AppResult<String> {
        let key = SessionRef {
            employee: wallet,
            session_id,
        };
        let mut state = self.state.lock();
        if state.sessions.contains_key(&key) {
            return Err(LedgerError::Unavailable("account already exists".to_string()).into());
        }
        state.sessions.insert(
            key,
            WorkSession {
                employee: wallet,
                session_id,
                check_in_time: timestamp,
                check_out_time: None,
                duration: 0,
                is_paid: false,
                authority: self.authority,
            },
        );
        drop(state);
        Ok(self.next_signature(&self.transfers))
    }

    async fn check_out(
        &self,
        wallet: Pubkey,
        session_id: u64,
        timestamp: DateTime<Utc>,
    ) -> AppResult<String> {
        let key = SessionRef {
            employee: wallet,
            session_id,
        };
        let mut state = self.state.lock();
        let session = state
            .sessions
            .get_mut(&key)
            .ok_or_else(|| LedgerError::Unavailable("account not found".to_string()))?;
        let elapsed = (timestamp - session.check_in_time).num_seconds().max(0) as u64;
        session.check_out_time = Some(timestamp);
        session.duration = elapsed;
        if let Some(employee) = state.employees.get_mut(&wallet) {
            employee.total_seconds_worked += elapsed;
        }
        drop(state);
        Ok(self.next_signature(&self.transfers))
    }

    async fn create_batch(
        &self,
        batch_id: u64,
        total_amount: u64,
        timestamp: DateTime<Utc>,
    ) -> AppResult<String> {
        let mut state = self.state.lock();
        if state.batches.contains_key(&batch_id) {
            return Err(LedgerError::Unavailable("account already exists".to_string()).into());
        }
        state.batches.insert(
            batch_id,
            PayrollBatch {
                batch_id,
                total_amount,
                created_at: timestamp,
                processed_at: None,
                is_processed: false,
                authority: self.authority,
                sessions: Vec::new(),
            },
        );
        drop(state);
        Ok(self.next_signature(&self.transfers))
    }

    async fn finalize_batch(&self, batch_id: u64, timestamp: DateTime<Utc>) -> AppResult<String> {
        let mut state = self.state.lock();
        let batch = state
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| LedgerError::Unavailable("account not found".to_string()))?;
        batch.is_processed = true;
        batch.processed_at = Some(timestamp);
        drop(state);
        Ok(self.next_signature(&self.transfers))
    }

    async fn mark_session_paid(&self, wallet: Pubkey, session_id: u64) -> AppResult<String> {
        let key = SessionRef {
            employee: wallet,
            session_id,
        };
        let mut state = self.state.lock();
        let session = state
            .sessions
            .get_mut(&key)
            .ok_or_else(|| LedgerError::Unavailable("account not found".to_string()))?;
        session.is_paid = true;
        let duration = session.duration;
        if let Some(employee) = state.employees.get_mut(&wallet) {
            employee.total_paid += amount_due(employee.hourly_rate, duration);
        }
        drop(state);
        Ok(self.next_signature(&self.transfers))
    }

    async fn transfer(&self, to: Pubkey, _lamports: u64) -> AppResult<String> {
        if self.rejected_recipients.lock().contains(&to) {
            return Err(LedgerError::Unavailable("transfer rejected".to_string()).into());
        }
        Ok(self.next_signature(&self.transfers))
    }
}
