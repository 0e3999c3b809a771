use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use rand::Rng;
use solana_sdk::pubkey::Pubkey;

use crate::error::{AppResult, AuthError};

const NONCE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const NONCE_LEN: usize = 32;

/// Random nonce for a login challenge
pub fn generate_nonce() -> String {
    let mut rng = rand::rng();
    (0..NONCE_LEN)
        .map(|_| {
            let idx = rng.random_range(0..NONCE_CHARSET.len());
            NONCE_CHARSET[idx] as char
        })
        .collect()
}

/// Verify an Ed25519 signature over `message`, produced by the holder of
/// `wallet`'s private key. The signature travels base64-encoded; Solana
/// wallet addresses are Ed25519 public keys, so the wallet itself is the
/// verifying key.
pub fn verify_wallet_signature(
    message: &str,
    signature_base64: &str,
    wallet: &Pubkey,
) -> AppResult<()> {
    let engine = base64::engine::general_purpose::STANDARD;
    let signature_bytes = engine
        .decode(signature_base64)
        .map_err(|_| AuthError::InvalidSignature("signature is not valid base64".into()))?;

    if signature_bytes.len() != 64 {
        return Err(AuthError::InvalidSignature(format!(
            "signature must be 64 bytes, got {}",
            signature_bytes.len()
        ))
        .into());
    }
    let signature_array: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| AuthError::InvalidSignature("failed to convert signature".into()))?;
    let signature = Signature::from_bytes(&signature_array);

    let verifying_key = VerifyingKey::from_bytes(&wallet.to_bytes())
        .map_err(|_| AuthError::InvalidSignature("wallet is not a valid ed25519 key".into()))?;

    verifying_key
        .verify(message.as_bytes(), &signature)
        .map_err(|_| AuthError::InvalidSignature("signature does not match wallet".into()))?;

    Ok(())
}
