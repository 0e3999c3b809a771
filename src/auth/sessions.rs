use chrono::Duration;
use governor::{Quota, RateLimiter};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::models::{AuthSession, Challenge};
use crate::auth::verification::{generate_nonce, verify_wallet_signature};
use crate::clock::Clock;
use crate::error::{AppResult, AuthError};
use crate::policy::{Actor, Role};

/// Auth session lifetime (2 hours)
const SESSION_TTL_SECS: i64 = 2 * 60 * 60;
/// A challenge must be signed within this window
const CHALLENGE_TTL_SECS: i64 = 5 * 60;
/// Login attempts allowed per wallet per minute
const MAX_LOGIN_ATTEMPTS: u32 = 5;

type LoginLimiter = RateLimiter<
    String,
    governor::state::keyed::DefaultKeyedStateStore<String>,
    governor::clock::DefaultClock,
>;

/// Challenge/response wallet login and the in-memory auth session store.
///
/// A caller asks for a challenge, signs its message with the wallet key,
/// and trades the signature for a bearer token. The role claim is fixed
/// at login; `authenticate` only resolves the cached claim.
pub struct AuthService {
    clock: Arc<dyn Clock>,
    challenges: RwLock<HashMap<Pubkey, Challenge>>,
    sessions: RwLock<HashMap<Uuid, AuthSession>>,
    login_limiter: LoginLimiter,
}

impl AuthService {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(MAX_LOGIN_ATTEMPTS).expect("nonzero"));
        Self {
            clock,
            challenges: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            login_limiter: RateLimiter::keyed(quota),
        }
    }

    /// Issue a fresh login challenge for a wallet. Replaces any
    /// outstanding challenge for the same wallet.
    pub async fn challenge(&self, wallet: Pubkey, role: Role) -> Challenge {
        let now = self.clock.now();
        let nonce = generate_nonce();
        let message = format!(
            "payroll-backend login\nwallet: {}\nrole: {:?}\nnonce: {}\nissued: {}",
            wallet,
            role,
            nonce,
            now.to_rfc3339()
        );
        let challenge = Challenge {
            wallet,
            role,
            nonce,
            message,
            created_at: now,
            expires_at: now + Duration::seconds(CHALLENGE_TTL_SECS),
        };
        self.challenges.write().await.insert(wallet, challenge.clone());
        challenge
    }

    /// Verify the signed challenge and establish an auth session.
    pub async fn login(
        &self,
        wallet: Pubkey,
        nonce: &str,
        signature_base64: &str,
    ) -> AppResult<AuthSession> {
        if self.login_limiter.check_key(&wallet.to_string()).is_err() {
            warn!("login rate limit hit for {}", wallet);
            return Err(AuthError::RateLimited.into());
        }

        let now = self.clock.now();
        let challenge = {
            let challenges = self.challenges.read().await;
            challenges
                .get(&wallet)
                .cloned()
                .ok_or(AuthError::UnknownChallenge)?
        };
        if challenge.nonce != nonce {
            return Err(AuthError::UnknownChallenge.into());
        }
        if now >= challenge.expires_at {
            self.challenges.write().await.remove(&wallet);
            return Err(AuthError::ChallengeExpired.into());
        }

        // SECURITY: the signature proves control of the wallet key; the
        // role claim is whatever the challenge was issued for.
        verify_wallet_signature(&challenge.message, signature_base64, &wallet)?;

        self.challenges.write().await.remove(&wallet);

        let session = AuthSession {
            token: Uuid::new_v4(),
            wallet,
            role: challenge.role,
            established_at: now,
            expires_at: now + Duration::seconds(SESSION_TTL_SECS),
        };
        self.sessions.write().await.insert(session.token, session.clone());

        info!("🔐 {} logged in as {:?}", wallet, session.role);
        Ok(session)
    }

    /// Resolve a bearer token to an actor. Expired sessions are evicted
    /// on touch.
    pub async fn authenticate(&self, token: Uuid) -> AppResult<Actor> {
        let now = self.clock.now();
        let session = {
            let sessions = self.sessions.read().await;
            sessions.get(&token).cloned().ok_or(AuthError::InvalidToken)?
        };
        if now >= session.expires_at {
            self.sessions.write().await.remove(&token);
            return Err(AuthError::SessionExpired.into());
        }
        Ok(Actor {
            wallet: session.wallet,
            role: session.role,
        })
    }

    /// Drop expired sessions and challenges. Returns how many sessions
    /// were evicted.
    pub async fn prune_expired(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        let evicted = before - sessions.len();
        drop(sessions);

        let mut challenges = self.challenges.write().await;
        challenges.retain(|_, c| c.expires_at > now);
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::ManualClock;
    use base64::Engine;
    use solana_sdk::signature::Keypair;
    use solana_sdk::signer::Signer;

    fn sign(keypair: &Keypair, message: &str) -> String {
        let engine = base64::engine::general_purpose::STANDARD;
        engine.encode(keypair.sign_message(message.as_bytes()).as_ref())
    }

    #[tokio::test]
    async fn full_login_round_trip() {
        let clock = Arc::new(ManualClock::default());
        let service = AuthService::new(clock.clone());
        let keypair = Keypair::new();

        let challenge = service.challenge(keypair.pubkey(), Role::Employer).await;
        let signature = sign(&keypair, &challenge.message);
        let session = service
            .login(keypair.pubkey(), &challenge.nonce, &signature)
            .await
            .unwrap();

        let actor = service.authenticate(session.token).await.unwrap();
        assert_eq!(actor.wallet, keypair.pubkey());
        assert_eq!(actor.role, Role::Employer);
    }

    #[tokio::test]
    async fn login_without_challenge_fails() {
        let clock = Arc::new(ManualClock::default());
        let service = AuthService::new(clock);
        let keypair = Keypair::new();

        let error = service
            .login(keypair.pubkey(), "nonce", "signature")
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            crate::error::AppError::Auth(AuthError::UnknownChallenge)
        ));
    }

    #[tokio::test]
    async fn expired_challenge_is_rejected() {
        let clock = Arc::new(ManualClock::default());
        let service = AuthService::new(clock.clone());
        let keypair = Keypair::new();

        let challenge = service.challenge(keypair.pubkey(), Role::Employee).await;
        clock.advance_secs(CHALLENGE_TTL_SECS + 1);
        let signature = sign(&keypair, &challenge.message);

        let error = service
            .login(keypair.pubkey(), &challenge.nonce, &signature)
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            crate::error::AppError::Auth(AuthError::ChallengeExpired)
        ));
    }

    #[tokio::test]
    async fn session_expires_after_two_hours() {
        let clock = Arc::new(ManualClock::default());
        let service = AuthService::new(clock.clone());
        let keypair = Keypair::new();

        let challenge = service.challenge(keypair.pubkey(), Role::Employee).await;
        let signature = sign(&keypair, &challenge.message);
        let session = service
            .login(keypair.pubkey(), &challenge.nonce, &signature)
            .await
            .unwrap();

        clock.advance_secs(SESSION_TTL_SECS + 1);
        let error = service.authenticate(session.token).await.unwrap_err();
        assert!(matches!(
            error,
            crate::error::AppError::Auth(AuthError::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn prune_evicts_expired_sessions() {
        let clock = Arc::new(ManualClock::default());
        let service = AuthService::new(clock.clone());
        let keypair = Keypair::new();

        let challenge = service.challenge(keypair.pubkey(), Role::Employee).await;
        let signature = sign(&keypair, &challenge.message);
        service
            .login(keypair.pubkey(), &challenge.nonce, &signature)
            .await
            .unwrap();

        assert_eq!(service.prune_expired().await, 0);
        clock.advance_secs(SESSION_TTL_SECS + 1);
        assert_eq!(service.prune_expired().await, 1);
    }

    #[tokio::test]
    async fn repeated_login_attempts_are_rate_limited() {
        let clock = Arc::new(ManualClock::default());
        let service = AuthService::new(clock);
        let keypair = Keypair::new();

        // burn the per-minute budget with bad attempts
        let mut rate_limited = false;
        for _ in 0..=MAX_LOGIN_ATTEMPTS {
            let error = service
                .login(keypair.pubkey(), "nonce", "signature")
                .await
                .unwrap_err();
            if matches!(
                error,
                crate::error::AppError::Auth(AuthError::RateLimited)
            ) {
                rate_limited = true;
            }
        }
        assert!(rate_limited);
    }
}
