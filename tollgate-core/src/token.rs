//! Client-held browse session tokens.
//!
//! A [`BrowseSessionToken`] is sealed with ChaCha20-Poly1305 under a server-held key and
//! handed to the client (usually as a cookie). The wire form is
//! `base64url(nonce || ciphertext)`; any corruption makes [`TokenCipher::open`] fail.

use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use serde::{Deserialize, Serialize};

use crate::{
    errors::{Error, Result},
    types::{UnixMillis, WalletKey},
};

const NONCE_LEN: usize = 12;

/// Decrypted session identity carried by the client.
///
/// ```
/// use tollgate_core::{token::BrowseSessionToken, types::{UnixMillis, WalletKey}};
///
/// let token = BrowseSessionToken::new(WalletKey::new("0xABC"), Some("user-7".into()))
///     .issued_at(UnixMillis(1_700_000_000_000));
///
/// let json = serde_json::to_value(&token).unwrap();
/// assert_eq!(json, serde_json::json!({
///     "wallet": "0xabc",
///     "userId": "user-7",
///     "issuedAt": 1_700_000_000_000u64,
/// }));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseSessionToken {
    pub wallet: WalletKey,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Start of the current TTL window. Absent on tokens that were never stamped.
    #[serde(default)]
    pub issued_at: Option<UnixMillis>,
}

impl BrowseSessionToken {
    pub fn new(wallet: WalletKey, user_id: Option<String>) -> Self {
        BrowseSessionToken {
            wallet,
            user_id,
            issued_at: None,
        }
    }

    pub fn issued_at(mut self, at: UnixMillis) -> Self {
        self.issued_at = Some(at);
        self
    }

    /// Identity to present to the payment agent: the user id, or the wallet when unbound.
    pub fn payer_identity(&self) -> &str {
        self.user_id.as_deref().unwrap_or(self.wallet.as_str())
    }

    /// Age of the current window at `now`, `None` if the token was never stamped.
    pub fn age_at(&self, now: UnixMillis) -> Option<Duration> {
        self.issued_at.map(|issued| now.saturating_since(issued))
    }
}

/// Seals and opens [`BrowseSessionToken`]s with a 32-byte server key.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}

impl TokenCipher {
    pub fn new(key: [u8; 32]) -> Self {
        TokenCipher {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        }
    }

    /// A cipher under a fresh random key. Tokens it seals do not survive a restart.
    pub fn generate() -> Self {
        TokenCipher {
            cipher: ChaCha20Poly1305::new(&ChaCha20Poly1305::generate_key(&mut OsRng)),
        }
    }

    /// Build a cipher from a 64-character hex key.
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let bytes = hex::decode(hex_key.trim())?;
        let key: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            Error::ConfigError(format!(
                "SESSION_KEY must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::new(key))
    }

    /// Build a cipher from the `SESSION_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let key = std::env::var("SESSION_KEY")
            .map_err(|_| Error::ConfigError("SESSION_KEY is not set".into()))?;
        Self::from_hex(&key)
    }

    pub fn seal(&self, token: &BrowseSessionToken) -> Result<String> {
        let plaintext = serde_json::to_vec(token)?;
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| Error::TokenError("failed to seal session token".into()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(nonce.as_slice());
        sealed.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    pub fn open(&self, sealed: &str) -> Result<BrowseSessionToken> {
        let bytes = URL_SAFE_NO_PAD.decode(sealed.trim())?;
        if bytes.len() <= NONCE_LEN {
            return Err(Error::TokenError("session token too short".into()));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::TokenError("session token failed authentication".into()))?;

        Ok(serde_json::from_slice(&plaintext)?)
    }
}

#[cfg(test)]
mod tests {
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

    use super::{BrowseSessionToken, TokenCipher};
    use crate::{
        errors::Error,
        types::{UnixMillis, WalletKey},
    };

    fn cipher() -> TokenCipher {
        TokenCipher::new([7u8; 32])
    }

    #[test]
    fn test_seal_open_preserves_fields() {
        let token = BrowseSessionToken::new(WalletKey::new("0xAbC"), Some("user-1".into()))
            .issued_at(UnixMillis(1_234_567));
        let sealed = cipher().seal(&token).unwrap();
        assert_eq!(cipher().open(&sealed).unwrap(), token);

        let bare = BrowseSessionToken::new(WalletKey::new("0xdef"), None);
        let sealed = cipher().seal(&bare).unwrap();
        let opened = cipher().open(&sealed).unwrap();
        assert_eq!(opened.user_id, None);
        assert_eq!(opened.issued_at, None);
        assert_eq!(opened.payer_identity(), "0xdef");
    }

    #[test]
    fn test_nonce_differs_per_seal() {
        let token = BrowseSessionToken::new(WalletKey::new("0xabc"), None);
        assert_ne!(cipher().seal(&token).unwrap(), cipher().seal(&token).unwrap());
    }

    #[test]
    fn test_tampered_token_fails_cleanly() {
        let token = BrowseSessionToken::new(WalletKey::new("0xabc"), None);
        let sealed = cipher().seal(&token).unwrap();

        let mut bytes = URL_SAFE_NO_PAD.decode(&sealed).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = URL_SAFE_NO_PAD.encode(bytes);

        assert!(matches!(cipher().open(&tampered), Err(Error::TokenError(_))));
        assert!(matches!(
            TokenCipher::new([8u8; 32]).open(&sealed),
            Err(Error::TokenError(_))
        ));
        assert!(cipher().open("not base64 !!").is_err());
        assert!(cipher().open("AAAA").is_err());
    }

    #[test]
    fn test_generated_keys_are_distinct() {
        let token = BrowseSessionToken::new(WalletKey::new("0xabc"), None);
        let generated = TokenCipher::generate();
        let sealed = generated.seal(&token).unwrap();
        assert_eq!(generated.open(&sealed).unwrap(), token);
        assert!(TokenCipher::generate().open(&sealed).is_err());
    }

    #[test]
    fn test_from_hex_checks_length() {
        let key = "11".repeat(32);
        assert!(TokenCipher::from_hex(&key).is_ok());
        assert!(matches!(
            TokenCipher::from_hex("abcd"),
            Err(Error::ConfigError(_))
        ));
        assert!(matches!(
            TokenCipher::from_hex("zz"),
            Err(Error::HexDecodeError(_))
        ));
    }
}
