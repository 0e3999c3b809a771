use chrono::Duration;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::{
    api::handler::AppState,
    auth::AuthService,
    cache::SessionCache,
    clock::SystemClock,
    config::Config,
    error::{AppError, AppResult},
    ledger::solana::{SolanaConfig, SolanaLedger},
    payroll::SettlementEngine,
    tracker::SessionTracker,
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    let clock = Arc::new(SystemClock);

    // Treasury keypair signs every instruction and funds the payouts
    let treasury_key = std::env::var("TREASURY_KEY")
        .map_err(|_| AppError::Config("TREASURY_KEY must be set".to_string()))?;
    let treasury = Keypair::from_base58_string(&treasury_key);

    let program_id = Pubkey::from_str(&config.payroll_program_id)
        .map_err(|_| AppError::Config(format!("invalid program id: {}", config.payroll_program_id)))?;

    let ledger = Arc::new(SolanaLedger::new(
        SolanaConfig {
            rpc_url: config.solana_rpc_url.clone(),
            program_id,
            call_timeout: std::time::Duration::from_secs(config.ledger_timeout_secs),
            ..SolanaConfig::default()
        },
        treasury,
    ));
    info!("✅ Solana ledger client initialized (program {})", program_id);

    let cache = Arc::new(SessionCache::new(
        ledger.clone(),
        clock.clone(),
        Duration::seconds(config.cache_ttl_secs as i64),
    ));
    info!("✅ Session cache initialized ({}s TTL)", config.cache_ttl_secs);

    let tracker = Arc::new(SessionTracker::new(
        ledger.clone(),
        cache.clone(),
        clock.clone(),
    ));
    info!("✅ Session tracker initialized");

    let engine = Arc::new(SettlementEngine::new(
        ledger.clone(),
        cache.clone(),
        clock.clone(),
    ));
    info!("✅ Settlement engine initialized");

    let auth = Arc::new(AuthService::new(clock.clone()));
    info!("✅ Auth service initialized");

    // Evict expired auth sessions once a minute
    let auth_prune = auth.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(60)).await;
            let evicted = auth_prune.prune_expired().await;
            if evicted > 0 {
                info!("🗑️ Evicted {} expired auth sessions", evicted);
            }
        }
    });
    info!("✅ Auth session pruning task started");

    Ok(AppState {
        ledger,
        cache,
        tracker,
        engine,
        auth,
    })
}
