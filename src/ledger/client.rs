use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;

use crate::error::AppResult;
use crate::ledger::models::{Employee, PayrollBatch, WorkSession};

// PDA seed namespaces of the payroll program
pub const EMPLOYEE_SEED: &[u8] = b"employee";
pub const WORK_SESSION_SEED: &[u8] = b"work_session";
pub const PAYROLL_BATCH_SEED: &[u8] = b"payroll_batch";

/// First 8 bytes of sha256("<namespace>:<name>") - the Anchor convention
/// for instruction and account discriminators.
pub fn discriminator(namespace: &str, name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("{}:{}", namespace, name).as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

/// Derive the employee account address for a wallet. Pure function of the
/// seeds and program id.
pub fn employee_address(program_id: &Pubkey, wallet: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[EMPLOYEE_SEED, wallet.as_ref()], program_id).0
}

/// Derive the work session account address for (wallet, session id).
pub fn work_session_address(program_id: &Pubkey, wallet: &Pubkey, session_id: u64) -> Pubkey {
    Pubkey::find_program_address(
        &[WORK_SESSION_SEED, wallet.as_ref(), &session_id.to_le_bytes()],
        program_id,
    )
    .0
}

/// Derive the payroll batch account address for a batch id.
pub fn payroll_batch_address(program_id: &Pubkey, batch_id: u64) -> Pubkey {
    Pubkey::find_program_address(&[PAYROLL_BATCH_SEED, &batch_id.to_le_bytes()], program_id).0
}

/// Narrow interface to the payroll ledger - THE source of truth for all
/// state. One typed operation per program instruction, plus full account
/// scans per entity type. Write operations return the transaction
/// signature.
///
/// Implementations must bound every call with a timeout; a timed-out call
/// surfaces as `LedgerError::Timeout`, never a hang.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Wallet address this client signs and pays with
    fn authority(&self) -> Pubkey;

    // ========== ACCOUNT READS ==========

    async fn fetch_employees(&self) -> AppResult<Vec<Employee>>;

    async fn fetch_work_sessions(&self) -> AppResult<Vec<WorkSession>>;

    async fn fetch_payroll_batches(&self) -> AppResult<Vec<PayrollBatch>>;

    // ========== INSTRUCTION SUBMISSION ==========

    async fn register_employee(
        &self,
        wallet: Pubkey,
        name: &str,
        position: &str,
        hourly_rate: u64,
    ) -> AppResult<String>;

    async fn update_employee(
        &self,
        wallet: Pubkey,
        name: &str,
        position: &str,
        hourly_rate: u64,
        is_active: bool,
    ) -> AppResult<String>;

    async fn check_in(
        &self,
        wallet: Pubkey,
        session_id: u64,
        timestamp: DateTime<Utc>,
    ) -> AppResult<String>;

    async fn check_out(
        &self,
        wallet: Pubkey,
        session_id: u64,
        timestamp: DateTime<Utc>,
    ) -> AppResult<String>;

    async fn create_batch(
        &self,
        batch_id: u64,
        total_amount: u64,
        timestamp: DateTime<Utc>,
    ) -> AppResult<String>;

    /// Close out a batch account: sets the processed flag and timestamp.
    async fn finalize_batch(&self, batch_id: u64, timestamp: DateTime<Utc>) -> AppResult<String>;

    /// Flip a session's paid flag and settle the employee's cumulative
    /// totals. Must only be called after the corresponding transfer
    /// confirmed.
    async fn mark_session_paid(&self, wallet: Pubkey, session_id: u64) -> AppResult<String>;

    /// Native transfer of `lamports` from the authority to `to`.
    async fn transfer(&self, to: Pubkey, lamports: u64) -> AppResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_addresses_are_deterministic() {
        let program_id = Pubkey::new_unique();
        let wallet = Pubkey::new_unique();

        assert_eq!(
            employee_address(&program_id, &wallet),
            employee_address(&program_id, &wallet)
        );
        assert_eq!(
            work_session_address(&program_id, &wallet, 42),
            work_session_address(&program_id, &wallet, 42)
        );
    }

    #[test]
    fn derived_addresses_differ_per_seed() {
        let program_id = Pubkey::new_unique();
        let wallet = Pubkey::new_unique();

        assert_ne!(
            work_session_address(&program_id, &wallet, 1),
            work_session_address(&program_id, &wallet, 2)
        );
        assert_ne!(
            payroll_batch_address(&program_id, 1),
            payroll_batch_address(&program_id, 2)
        );
        assert_ne!(
            employee_address(&program_id, &wallet),
            employee_address(&program_id, &Pubkey::new_unique())
        );
    }

    #[test]
    fn discriminators_differ_per_name() {
        assert_ne!(
            discriminator("global", "check_in"),
            discriminator("global", "check_out")
        );
        assert_ne!(
            discriminator("account", "Employee"),
            discriminator("global", "Employee")
        );
    }
}
