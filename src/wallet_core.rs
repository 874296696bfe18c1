/// Collaborator seams
///
/// Key handling, transaction encoding and chain RPC live in external
/// libraries. The dispatcher only calls through these traits and never
/// implements them.
///
use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ContractAction, TransactionFields};

/// An opaque private key handle produced by the wallet-core library.
#[derive(Clone)]
pub struct PrivateKey(pub [u8; 32]);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print key material
        write!(f, "PrivateKey(..)")
    }
}

/// The wallet-core key/signing library.
pub trait WalletCore: Send + Sync {
    fn derive_key(&self, mnemonic: &str, path: &str) -> Result<PrivateKey>;

    fn sign(&self, key: &PrivateKey, payload: &[u8]) -> Result<Vec<u8>>;

    fn encode_transaction(&self, tx: &TransactionFields) -> Result<Vec<u8>>;

    /// Turn a chain-agnostic action descriptor into calldata.
    fn encode_call(&self, action: &ContractAction) -> Result<Vec<u8>>;
}

/// A chain RPC/gRPC client.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Broadcast signed transaction bytes, returns the tx hash.
    async fn broadcast(&self, signed: &[u8]) -> Result<String>;

    async fn get_balance(&self, address: &str) -> Result<String>;

    async fn get_nonce(&self, address: &str) -> Result<u64>;
}
