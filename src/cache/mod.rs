use chrono::{DateTime, Duration, Utc};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::AppResult;
use crate::ledger::models::{Employee, PayrollBatch, SessionRef, WorkSession};
use crate::ledger::LedgerClient;

/// Entity types the cache partitions by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Employees,
    WorkSessions,
    PayrollBatches,
}

/// One cached entity partition. A partition is only ever replaced
/// wholesale by a fresh ledger scan, never invalidated per key.
struct Partition<K, V> {
    entries: HashMap<K, V>,
    last_fetch: Option<DateTime<Utc>>,
}

impl<K, V> Partition<K, V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            last_fetch: None,
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match self.last_fetch {
            Some(fetched) => now - fetched < ttl && !self.entries.is_empty(),
            None => false,
        }
    }
}

/// Read-through TTL cache over ledger entities
///
/// Reads serve the cached partition while it is fresh; a stale partition
/// triggers a full refetch. When the ledger is unreachable, stale data is
/// served as a fallback rather than propagating the error - the cache is
/// never the source of truth, only a latency shield.
///
/// Write paths must upsert via the `put_*` methods immediately after a
/// successful ledger write so the next read within the TTL window sees
/// the mutation.
pub struct SessionCache {
    ledger: Arc<dyn LedgerClient>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    employees: RwLock<Partition<Pubkey, Employee>>,
    sessions: RwLock<Partition<SessionRef, WorkSession>>,
    batches: RwLock<Partition<u64, PayrollBatch>>,
}

impl SessionCache {
    pub fn new(ledger: Arc<dyn LedgerClient>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            ledger,
            clock,
            ttl,
            employees: RwLock::new(Partition::new()),
            sessions: RwLock::new(Partition::new()),
            batches: RwLock::new(Partition::new()),
        }
    }

    // ========== READ-THROUGH ==========

    pub async fn employees(&self) -> AppResult<Vec<Employee>> {
        let now = self.clock.now();
        {
            let partition = self.employees.read().await;
            if partition.is_fresh(now, self.ttl) {
                debug!("✓ employee cache hit");
                return Ok(partition.entries.values().cloned().collect());
            }
        }

        match self.ledger.fetch_employees().await {
            Ok(fresh) => {
                let mut partition = self.employees.write().await;
                partition.entries = fresh.iter().map(|e| (e.wallet, e.clone())).collect();
                partition.last_fetch = Some(now);
                Ok(fresh)
            }
            Err(error) => {
                let partition = self.employees.read().await;
                if partition.entries.is_empty() {
                    Err(error)
                } else {
                    warn!("employee fetch failed, serving stale cache: {}", error);
                    Ok(partition.entries.values().cloned().collect())
                }
            }
        }
    }

    pub async fn employee(&self, wallet: &Pubkey) -> AppResult<Option<Employee>> {
        Ok(self
            .employees()
            .await?
            .into_iter()
            .find(|e| e.wallet == *wallet))
    }

    pub async fn work_sessions(&self) -> AppResult<Vec<WorkSession>> {
        let now = self.clock.now();
        {
            let partition = self.sessions.read().await;
            if partition.is_fresh(now, self.ttl) {
                debug!("✓ work session cache hit");
                return Ok(partition.entries.values().cloned().collect());
            }
        }

        match self.ledger.fetch_work_sessions().await {
            Ok(fresh) => {
                let mut partition = self.sessions.write().await;
                partition.entries = fresh.iter().map(|s| (s.key(), s.clone())).collect();
                partition.last_fetch = Some(now);
                Ok(fresh)
            }
            Err(error) => {
                let partition = self.sessions.read().await;
                if partition.entries.is_empty() {
                    Err(error)
                } else {
                    warn!("work session fetch failed, serving stale cache: {}", error);
                    Ok(partition.entries.values().cloned().collect())
                }
            }
        }
    }

    pub async fn session(&self, key: &SessionRef) -> AppResult<Option<WorkSession>> {
        Ok(self
            .work_sessions()
            .await?
            .into_iter()
            .find(|s| s.key() == *key))
    }

    pub async fn payroll_batches(&self) -> AppResult<Vec<PayrollBatch>> {
        let now = self.clock.now();
        {
            let partition = self.batches.read().await;
            if partition.is_fresh(now, self.ttl) {
                debug!("✓ payroll batch cache hit");
                return Ok(partition.entries.values().cloned().collect());
            }
        }

        match self.ledger.fetch_payroll_batches().await {
            Ok(fresh) => {
                let mut partition = self.batches.write().await;
                let mut entries: HashMap<u64, PayrollBatch> =
                    fresh.into_iter().map(|b| (b.batch_id, b)).collect();
                // The ledger scan does not carry the session refs captured
                // at batch creation; keep the ones we already hold.
                for (batch_id, previous) in partition.entries.drain() {
                    if let Some(updated) = entries.get_mut(&batch_id) {
                        if updated.sessions.is_empty() {
                            updated.sessions = previous.sessions;
                        }
                    }
                }
                partition.entries = entries;
                partition.last_fetch = Some(now);
                Ok(partition.entries.values().cloned().collect())
            }
            Err(error) => {
                let partition = self.batches.read().await;
                if partition.entries.is_empty() {
                    Err(error)
                } else {
                    warn!("payroll batch fetch failed, serving stale cache: {}", error);
                    Ok(partition.entries.values().cloned().collect())
                }
            }
        }
    }

    pub async fn batch(&self, batch_id: u64) -> AppResult<Option<PayrollBatch>> {
        Ok(self
            .payroll_batches()
            .await?
            .into_iter()
            .find(|b| b.batch_id == batch_id))
    }

    // ========== WRITE-THROUGH ==========

    pub async fn put_employee(&self, employee: Employee) {
        let mut partition = self.employees.write().await;
        partition.entries.insert(employee.wallet, employee);
    }

    pub async fn put_session(&self, session: WorkSession) {
        let mut partition = self.sessions.write().await;
        partition.entries.insert(session.key(), session);
    }

    pub async fn put_batch(&self, batch: PayrollBatch) {
        let mut partition = self.batches.write().await;
        partition.entries.insert(batch.batch_id, batch);
    }

    /// Force the next read of this entity type to bypass the cache
    pub async fn invalidate(&self, kind: EntityKind) {
        match kind {
            EntityKind::Employees => self.employees.write().await.last_fetch = None,
            EntityKind::WorkSessions => self.sessions.write().await.last_fetch = None,
            EntityKind::PayrollBatches => self.batches.write().await.last_fetch = None,
        }
        info!("🔄 cache invalidated: {:?}", kind);
    }
}
