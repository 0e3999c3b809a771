pub mod client;
pub mod models;
pub mod solana;

pub use client::LedgerClient;
