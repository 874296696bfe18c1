//! # walletconnect-session
//!
//! WalletConnect session lifecycle: pair with a wallet over a relay,
//! persist/restore the session, observe lifecycle events and dispatch
//! signing requests gated on an active session.
//!
//! Key derivation, transaction signing and chain encoding are collaborator
//! concerns behind the traits in [`wallet_core`]; this crate only drives
//! the protocol state machine.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use walletconnect_session::{
//!     RelayClient, SessionClient, SessionConfig, StartOutcome,
//!     types::Metadata,
//! };
//!
//! # async fn run() -> walletconnect_session::Result<()> {
//! let config = SessionConfig::new(
//!     "https://relay.walletconnect.org/rpc".parse().unwrap(),
//!     Metadata {
//!         name: "My dApp".to_string(),
//!         description: "Example dApp".to_string(),
//!         url: "https://example.org".to_string(),
//!         icons: vec![],
//!     },
//! );
//!
//! // Generate once, store it and reuse it for all connections
//! let client_seed = [123u8; 32];
//! let relay = Arc::new(RelayClient::new(
//!     "https://relay.walletconnect.org/rpc",
//!     "https://relay.walletconnect.org",
//!     "your-project-id",
//!     client_seed,
//! )?);
//!
//! let persisted = std::fs::read("session.json").ok();
//! let (client, outcome) =
//!     SessionClient::start_or_restore(config, relay, persisted.as_deref())?;
//!
//! if let StartOutcome::Pairing(request) = outcome {
//!     // show request.uri as a QR code, then wait for approval
//!     println!("{}", request.uri);
//!     client.await_connection(Duration::from_secs(120)).await?;
//! }
//!
//! let session = client.snapshot().await;
//! let signature = client
//!     .sign_personal("hello", &session.accounts[0])
//!     .await?;
//! println!("{signature:?}");
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod session;
pub mod transport;
pub mod types;
pub mod utils;
pub mod wallet_core;

/// Exposed for easy access
pub use client::{SessionClient, SessionConfig, SessionState, StartOutcome};
pub use error::{Error, Result};
pub use session::{PairingRequest, Session, SessionEvent};
pub use transport::{RelayClient, Transport};
