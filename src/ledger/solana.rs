use async_trait::async_trait;
use borsh::{BorshDeserialize, BorshSerialize};
use chrono::{DateTime, Utc};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_commitment_config::CommitmentConfig;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    message::Message,
    pubkey::Pubkey,
    signature::Keypair,
    signer::Signer,
    transaction::Transaction,
};
use solana_system_interface::program as system_program;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{AppError, AppResult, LedgerError};
use crate::ledger::client::{
    discriminator, employee_address, payroll_batch_address, work_session_address, LedgerClient,
};
use crate::ledger::models::{Employee, PayrollBatch, WorkSession};

/// Program id the payroll program is deployed under
pub const DEFAULT_PROGRAM_ID: &str = "CJL2foUtZDC8vE9MF3Tb2BeJrfDZsVCkZD2pkdPV9b4X";

#[derive(Debug, Clone)]
pub struct SolanaConfig {
    pub rpc_url: String,
    pub program_id: Pubkey,
    pub commitment: CommitmentConfig,
    /// Deadline applied to every individual RPC call
    pub call_timeout: Duration,
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            program_id: Pubkey::from_str(DEFAULT_PROGRAM_ID).expect("static program id"),
            commitment: CommitmentConfig::confirmed(),
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Ledger client backed by the payroll program over Solana RPC
pub struct SolanaLedger {
    config: SolanaConfig,
    client: RpcClient,
    treasury: Arc<Keypair>,
}

// ========== RAW ACCOUNT LAYOUTS ==========
//
// Field order mirrors the on-chain account structs; an 8-byte Anchor
// discriminator precedes each payload. Pubkeys are kept as raw bytes so
// decoding does not depend on optional borsh impls.

#[derive(BorshSerialize, BorshDeserialize)]
struct EmployeeAccount {
    name: String,
    position: String,
    hourly_rate: u64,
    total_seconds_worked: u64,
    total_paid: u64,
    authority: [u8; 32],
    employee_wallet: [u8; 32],
    is_active: bool,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct WorkSessionAccount {
    employee: [u8; 32],
    check_in_time: i64,
    check_out_time: i64,
    duration: u64,
    is_paid: bool,
    authority: [u8; 32],
    session_id: u64,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct PayrollBatchAccount {
    batch_id: u64,
    total_amount: u64,
    created_at: i64,
    processed_at: i64,
    is_processed: bool,
    authority: [u8; 32],
}

// ========== INSTRUCTION ARGUMENTS ==========

#[derive(BorshSerialize)]
struct RegisterEmployeeArgs {
    name: String,
    position: String,
    hourly_rate: u64,
    employee_wallet: [u8; 32],
}

#[derive(BorshSerialize)]
struct UpdateEmployeeArgs {
    name: String,
    position: String,
    hourly_rate: u64,
    is_active: bool,
    employee_wallet: [u8; 32],
}

#[derive(BorshSerialize)]
struct SessionArgs {
    employee_wallet: [u8; 32],
    session_id: u64,
    timestamp: i64,
}

#[derive(BorshSerialize)]
struct CreateBatchArgs {
    batch_id: u64,
    total_amount: u64,
    timestamp: i64,
}

#[derive(BorshSerialize)]
struct ProcessPayrollArgs {
    batch_id: u64,
    timestamp: i64,
}

#[derive(BorshSerialize)]
struct MarkSessionPaidArgs {
    employee_wallet: [u8; 32],
    session_id: u64,
}

impl SolanaLedger {
    pub fn new(config: SolanaConfig, treasury: Keypair) -> Self {
        let client =
            RpcClient::new_with_commitment(config.rpc_url.clone(), config.commitment);
        Self {
            config,
            client,
            treasury: Arc::new(treasury),
        }
    }

    async fn with_timeout<T, E, F>(&self, fut: F) -> AppResult<T>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        match tokio::time::timeout(self.config.call_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(LedgerError::Unavailable(e.to_string()).into()),
            Err(_) => Err(LedgerError::Timeout.into()),
        }
    }

    /// Build, sign and submit a single-instruction transaction
    async fn submit(&self, instruction: Instruction) -> AppResult<String> {
        let blockhash = self.with_timeout(self.client.get_latest_blockhash()).await?;
        let message = Message::new(&[instruction], Some(&self.treasury.pubkey()));
        let transaction = Transaction::new(&[&*self.treasury], message, blockhash);
        let signature = self
            .with_timeout(self.client.send_and_confirm_transaction(&transaction))
            .await?;
        debug!("ledger instruction confirmed: {}", signature);
        Ok(signature.to_string())
    }

    fn instruction(
        &self,
        name: &str,
        args: &impl BorshSerialize,
        accounts: Vec<AccountMeta>,
    ) -> AppResult<Instruction> {
        let mut data = discriminator("global", name).to_vec();
        let encoded = borsh::to_vec(args)
            .map_err(|e| AppError::Internal(format!("Instruction encoding failed: {}", e)))?;
        data.extend_from_slice(&encoded);
        Ok(Instruction {
            program_id: self.config.program_id,
            accounts,
            data,
        })
    }

    /// Scan all program accounts and decode the ones carrying `kind`'s
    /// discriminator. Accounts of other kinds are skipped, not errors.
    async fn scan_accounts<T: BorshDeserialize>(&self, kind: &str) -> AppResult<Vec<T>> {
        let accounts = self
            .with_timeout(self.client.get_program_accounts(&self.config.program_id))
            .await?;

        let expected = discriminator("account", kind);
        let mut decoded = Vec::new();
        for (_, account) in accounts {
            if account.data.len() < 8 || account.data[..8] != expected {
                continue;
            }
            // Anchor accounts may carry trailing padding, so decode from a
            // cursor instead of requiring full consumption.
            let mut rest = &account.data[8..];
            let value = T::deserialize(&mut rest).map_err(|e| {
                LedgerError::InvalidAccountData(format!("{}: {}", kind, e))
            })?;
            decoded.push(value);
        }
        Ok(decoded)
    }
}

fn decode_timestamp(kind: &str, secs: i64) -> AppResult<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        LedgerError::InvalidAccountData(format!("{}: timestamp {} out of range", kind, secs)).into()
    })
}

#[async_trait]
impl LedgerClient for SolanaLedger {
    fn authority(&self) -> Pubkey {
        self.treasury.pubkey()
    }

    async fn fetch_employees(&self) -> AppResult<Vec<Employee>> {
        let raw: Vec<EmployeeAccount> = self.scan_accounts("Employee").await?;
        Ok(raw
            .into_iter()
            .map(|account| Employee {
                wallet: Pubkey::new_from_array(account.employee_wallet),
                name: account.name,
                position: account.position,
                hourly_rate: account.hourly_rate,
                total_seconds_worked: account.total_seconds_worked,
                total_paid: account.total_paid,
                authority: Pubkey::new_from_array(account.authority),
                is_active: account.is_active,
            })
            .collect())
    }

    async fn fetch_work_sessions(&self) -> AppResult<Vec<WorkSession>> {
        let raw: Vec<WorkSessionAccount> = self.scan_accounts("WorkSession").await?;
        raw.into_iter()
            .map(|account| {
                let check_out_time = if account.check_out_time == 0 {
                    None
                } else {
                    Some(decode_timestamp("WorkSession", account.check_out_time)?)
                };
                Ok(WorkSession {
                    employee: Pubkey::new_from_array(account.employee),
                    session_id: account.session_id,
                    check_in_time: decode_timestamp("WorkSession", account.check_in_time)?,
                    check_out_time,
                    duration: account.duration,
                    is_paid: account.is_paid,
                    authority: Pubkey::new_from_array(account.authority),
                })
            })
            .collect()
    }

    async fn fetch_payroll_batches(&self) -> AppResult<Vec<PayrollBatch>> {
        let raw: Vec<PayrollBatchAccount> = self.scan_accounts("PayrollBatch").await?;
        raw.into_iter()
            .map(|account| {
                let processed_at = if account.processed_at == 0 {
                    None
                } else {
                    Some(decode_timestamp("PayrollBatch", account.processed_at)?)
                };
                Ok(PayrollBatch {
                    batch_id: account.batch_id,
                    total_amount: account.total_amount,
                    created_at: decode_timestamp("PayrollBatch", account.created_at)?,
                    processed_at,
                    is_processed: account.is_processed,
                    authority: Pubkey::new_from_array(account.authority),
                    // the batch account does not carry the captured refs;
                    // the cache layer preserves them across refreshes
                    sessions: Vec::new(),
                })
            })
            .collect()
    }

    async fn register_employee(
        &self,
        wallet: Pubkey,
        name: &str,
        position: &str,
        hourly_rate: u64,
    ) -> AppResult<String> {
        let employee = employee_address(&self.config.program_id, &wallet);
        let instruction = self.instruction(
            "register_employee",
            &RegisterEmployeeArgs {
                name: name.to_string(),
                position: position.to_string(),
                hourly_rate,
                employee_wallet: wallet.to_bytes(),
            },
            vec![
                AccountMeta::new(self.treasury.pubkey(), true),
                AccountMeta::new(employee, false),
                AccountMeta::new_readonly(system_program::id(), false),
            ],
        )?;
        self.submit(instruction).await
    }

    async fn update_employee(
        &self,
        wallet: Pubkey,
        name: &str,
        position: &str,
        hourly_rate: u64,
        is_active: bool,
    ) -> AppResult<String> {
        let employee = employee_address(&self.config.program_id, &wallet);
        let instruction = self.instruction(
            "update_employee",
            &UpdateEmployeeArgs {
                name: name.to_string(),
                position: position.to_string(),
                hourly_rate,
                is_active,
                employee_wallet: wallet.to_bytes(),
            },
            vec![
                AccountMeta::new(self.treasury.pubkey(), true),
                AccountMeta::new(employee, false),
            ],
        )?;
        self.submit(instruction).await
    }

    async fn check_in(
        &self,
        wallet: Pubkey,
        session_id: u64,
        timestamp: DateTime<Utc>,
    ) -> AppResult<String> {
        let employee = employee_address(&self.config.program_id, &wallet);
        let session = work_session_address(&self.config.program_id, &wallet, session_id);
        let instruction = self.instruction(
            "check_in",
            &SessionArgs {
                employee_wallet: wallet.to_bytes(),
                session_id,
                timestamp: timestamp.timestamp(),
            },
            vec![
                AccountMeta::new(self.treasury.pubkey(), true),
                AccountMeta::new_readonly(employee, false),
                AccountMeta::new(session, false),
                AccountMeta::new_readonly(system_program::id(), false),
            ],
        )?;
        self.submit(instruction).await
    }

    async fn check_out(
        &self,
        wallet: Pubkey,
        session_id: u64,
        timestamp: DateTime<Utc>,
    ) -> AppResult<String> {
        let employee = employee_address(&self.config.program_id, &wallet);
        let session = work_session_address(&self.config.program_id, &wallet, session_id);
        let instruction = self.instruction(
            "check_out",
            &SessionArgs {
                employee_wallet: wallet.to_bytes(),
                session_id,
                timestamp: timestamp.timestamp(),
            },
            vec![
                AccountMeta::new(self.treasury.pubkey(), true),
                AccountMeta::new(employee, false),
                AccountMeta::new(session, false),
            ],
        )?;
        self.submit(instruction).await
    }

    async fn create_batch(
        &self,
        batch_id: u64,
        total_amount: u64,
        timestamp: DateTime<Utc>,
    ) -> AppResult<String> {
        let batch = payroll_batch_address(&self.config.program_id, batch_id);
        let instruction = self.instruction(
            "create_payroll_batch",
            &CreateBatchArgs {
                batch_id,
                total_amount,
                timestamp: timestamp.timestamp(),
            },
            vec![
                AccountMeta::new(self.treasury.pubkey(), true),
                AccountMeta::new(batch, false),
                AccountMeta::new_readonly(system_program::id(), false),
            ],
        )?;
        self.submit(instruction).await
    }

    async fn finalize_batch(&self, batch_id: u64, timestamp: DateTime<Utc>) -> AppResult<String> {
        let batch = payroll_batch_address(&self.config.program_id, batch_id);
        let instruction = self.instruction(
            "process_payroll",
            &ProcessPayrollArgs {
                batch_id,
                timestamp: timestamp.timestamp(),
            },
            vec![
                AccountMeta::new(self.treasury.pubkey(), true),
                AccountMeta::new(batch, false),
            ],
        )?;
        self.submit(instruction).await
    }

    async fn mark_session_paid(&self, wallet: Pubkey, session_id: u64) -> AppResult<String> {
        let employee = employee_address(&self.config.program_id, &wallet);
        let session = work_session_address(&self.config.program_id, &wallet, session_id);
        let instruction = self.instruction(
            "mark_session_paid",
            &MarkSessionPaidArgs {
                employee_wallet: wallet.to_bytes(),
                session_id,
            },
            vec![
                AccountMeta::new(self.treasury.pubkey(), true),
                AccountMeta::new(employee, false),
                AccountMeta::new(session, false),
            ],
        )?;
        self.submit(instruction).await
    }

    async fn transfer(&self, to: Pubkey, lamports: u64) -> AppResult<String> {
        let instruction =
            solana_system_interface::instruction::transfer(&self.treasury.pubkey(), &to, lamports);
        self.submit(instruction).await
    }
}
