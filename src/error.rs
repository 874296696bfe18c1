use crate::types;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug)]
pub enum Error {
    /// Dispatch attempted while no approved session exists
    NotConnected,
    /// Target account is not part of the approved session
    UnknownAccount(String),
    /// Request chain id differs from the session chain id
    ChainMismatch { expected: String, requested: String },
    /// No response for the given request id before the timeout
    RequestTimeout(u64),
    /// Pairing approval did not arrive in time
    ConnectionTimeout,
    /// The wallet rejected the session request
    PairingRejected,
    /// Persisted session blob is missing fields or violates invariants
    Format(String),
    /// Relay unreachable or dropped
    Transport(String),
    JsonRpc(types::RelayRpcError),
    SerdeJson(serde_json::Error),
    Reqwest(reqwest::Error),
    UrlParse(url::ParseError),
    Aead(chacha20poly1305::Error),
    FromUtf8(std::string::FromUtf8Error),
    FromHex(alloy::hex::FromHexError),
    Signature(alloy::primitives::SignatureError),
    SystemTime(std::time::SystemTimeError),
    Anyhow(anyhow::Error),
    Internal(String),
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Internal(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Internal(e)
    }
}

impl From<types::RelayRpcError> for Error {
    fn from(e: types::RelayRpcError) -> Self {
        Error::JsonRpc(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::SerdeJson(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Reqwest(e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::UrlParse(e)
    }
}

impl From<chacha20poly1305::Error> for Error {
    fn from(e: chacha20poly1305::Error) -> Self {
        Error::Aead(e)
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(e: std::string::FromUtf8Error) -> Self {
        Error::FromUtf8(e)
    }
}

impl From<alloy::hex::FromHexError> for Error {
    fn from(e: alloy::hex::FromHexError) -> Self {
        Error::FromHex(e)
    }
}

impl From<alloy::primitives::SignatureError> for Error {
    fn from(e: alloy::primitives::SignatureError) -> Self {
        Error::Signature(e)
    }
}

impl From<std::time::SystemTimeError> for Error {
    fn from(e: std::time::SystemTimeError) -> Self {
        Error::SystemTime(e)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Anyhow(e)
    }
}
