use chrono::{DateTime, Utc};
use solana_sdk::pubkey::Pubkey;
use uuid::Uuid;

use crate::policy::Role;

/// Outstanding login challenge - one per wallet at a time
#[derive(Debug, Clone)]
pub struct Challenge {
    pub wallet: Pubkey,
    pub role: Role,
    pub nonce: String,
    /// The exact text the wallet must sign
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Established auth session. The role claim is fixed here and cached for
/// the session's lifetime.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: Uuid,
    pub wallet: Pubkey,
    pub role: Role,
    pub established_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
