//! Tenant API credential resolution.
//!
//! Stored credentials are AES-256-GCM encrypted as base64(nonce ‖ ciphertext).
//! During key rotation some tenants may still carry a raw token, so when
//! decryption fails the stored value itself is accepted if it looks like a
//! plausible token. Resolved tokens shorter than 20 characters are rejected.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use rand::rngs::OsRng;

const NONCE_LEN: usize = 12;
const MIN_TOKEN_LEN: usize = 20;

/// Resolve a stored credential into a usable bearer token.
pub fn resolve_api_key(stored: &str, master_key: Option<&[u8]>) -> Option<String> {
    if let Some(key) = master_key
        && let Some(token) = decrypt(stored, key)
        && plausible(&token)
    {
        return Some(token);
    }

    // Raw-value fallback for the rotation transition window.
    let raw = stored.trim();
    plausible(raw).then(|| raw.to_string())
}

/// Encrypt a raw token for storage. Used by provisioning and tests.
pub fn encrypt_api_key(token: &str, master_key: &[u8]) -> Option<String> {
    let cipher = Aes256Gcm::new_from_slice(master_key).ok()?;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher.encrypt(nonce, token.trim().as_bytes()).ok()?;

    let mut blob = nonce_bytes.to_vec();
    blob.extend_from_slice(&ciphertext);
    Some(BASE64.encode(blob))
}

fn decrypt(stored: &str, master_key: &[u8]) -> Option<String> {
    let blob = BASE64.decode(stored.trim()).ok()?;
    if blob.len() <= NONCE_LEN {
        return None;
    }
    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(master_key).ok()?;
    let plaintext = cipher.decrypt(Nonce::from_slice(nonce_bytes), ciphertext).ok()?;
    String::from_utf8(plaintext).ok().map(|s| s.trim().to_string())
}

fn plausible(token: &str) -> bool {
    token.trim().len() >= MIN_TOKEN_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = &[7u8; 32];
    const TOKEN: &str = "pit-0123456789abcdef0123456789abcdef";

    #[test]
    fn encrypt_then_resolve_roundtrips() {
        let stored = encrypt_api_key(TOKEN, KEY).expect("encrypt");
        assert_ne!(stored, TOKEN);
        assert_eq!(resolve_api_key(&stored, Some(KEY)).as_deref(), Some(TOKEN));
    }

    #[test]
    fn raw_value_fallback_during_rotation() {
        // Stored value is a raw token, not ciphertext.
        assert_eq!(resolve_api_key(TOKEN, Some(KEY)).as_deref(), Some(TOKEN));
        // Works with no master key configured at all.
        assert_eq!(resolve_api_key(TOKEN, None).as_deref(), Some(TOKEN));
    }

    #[test]
    fn short_values_are_rejected() {
        assert_eq!(resolve_api_key("short", Some(KEY)), None);
        assert_eq!(resolve_api_key("   ", None), None);
    }
}
