use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub bind_address: String,
    pub solana_rpc_url: String,
    pub payroll_program_id: String,
    pub cache_ttl_secs: u64,
    pub ledger_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Ok(Self {
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            solana_rpc_url: std::env::var("SOLANA_RPC_URL")
                .unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".to_string()),
            payroll_program_id: std::env::var("PAYROLL_PROGRAM_ID")
                .unwrap_or_else(|_| "CJL2foUtZDC8vE9MF3Tb2BeJrfDZsVCkZD2pkdPV9b4X".to_string()),
            cache_ttl_secs: env_u64("CACHE_TTL_SECS", 300)?,
            ledger_timeout_secs: env_u64("LEDGER_TIMEOUT_SECS", 30)?,
        })
    }
}

fn env_u64(name: &str, default: u64) -> Result<u64, config::ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|_| config::ConfigError::Message(format!("{} must be an integer", name))),
        Err(_) => Ok(default),
    }
}
