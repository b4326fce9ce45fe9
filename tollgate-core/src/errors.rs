/// Error types for Tollgate core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// JSON serialization/deserialization errors.
    #[error("Serde JSON error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Base64 encoding/decoding errors.
    #[error("Base64 decode error: {0}")]
    Base64DecodeError(#[from] base64::DecodeError),

    /// Hex decoding errors, e.g. for the session key.
    #[error("Hex decode error: {0}")]
    HexDecodeError(#[from] hex::FromHexError),

    /// A session token could not be sealed or failed authentication when opened.
    #[error("Session token error: {0}")]
    TokenError(String),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// A specialized `Result` type for Tollgate core operations.
pub type Result<T> = std::result::Result<T, Error>;
