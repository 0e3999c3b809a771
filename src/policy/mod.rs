use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use tracing::warn;

use crate::error::{AppError, AppResult};

/// Closed set of roles. Role is fixed when the auth session is
/// established and never re-derived per call; re-verifying identity is
/// the signature login's job, not this check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Employer,
    Employee,
}

/// An authenticated caller
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub wallet: Pubkey,
    pub role: Role,
}

/// Everything a caller can ask the engine to do, with the resource wallet
/// where ownership matters.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    ReadEmployees,
    ReadEmployee(Pubkey),
    RegisterEmployee,
    UpdateEmployee(Pubkey),
    ReadSessions(Option<Pubkey>),
    CheckIn(Pubkey),
    CheckOut(Pubkey),
    ReadBatches,
    CreateBatch,
    ProcessBatch,
}

/// Role-based permission check. Employers may do everything; employees
/// only touch their own records, and only for reads plus self
/// check-in/check-out. Matching is exhaustive so a new operation cannot
/// silently default to "allowed".
pub fn authorize(actor: &Actor, operation: &Operation) -> AppResult<()> {
    let allowed = match actor.role {
        Role::Employer => true,
        Role::Employee => match operation {
            Operation::ReadEmployee(wallet) => *wallet == actor.wallet,
            Operation::ReadSessions(Some(wallet)) => *wallet == actor.wallet,
            Operation::CheckIn(wallet) | Operation::CheckOut(wallet) => *wallet == actor.wallet,
            Operation::ReadSessions(None)
            | Operation::ReadEmployees
            | Operation::RegisterEmployee
            | Operation::UpdateEmployee(_)
            | Operation::ReadBatches
            | Operation::CreateBatch
            | Operation::ProcessBatch => false,
        },
    };

    if allowed {
        Ok(())
    } else {
        warn!(
            "denied {:?} for {} ({:?})",
            operation, actor.wallet, actor.role
        );
        Err(AppError::Unauthorized)
    }
}
