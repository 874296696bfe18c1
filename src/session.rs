/// Session
///
/// The durable state of a wallet connection and its persisted form. Field
/// order is fixed by the struct declaration, so serialization is
/// deterministic and restore-then-persist is byte identical.
///
use alloy::hex;
use serde::{Deserialize, Serialize};
use url::Url;
use url::form_urlencoded::Serializer as QuerySerializer;

use crate::error::{Error, Result};
use crate::types::{Metadata, SessionParams, SessionUpdateParams};
use crate::utils::{random_bytes32, random_topic};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// whether the wallet approved the connection
    pub connected: bool,
    /// the chain id returned by the wallet
    pub chain_id: Option<String>,
    /// the accounts returned by the wallet
    pub accounts: Vec<String>,
    /// the bridge/relay server URL
    pub bridge: Url,
    /// symmetric key sealing all envelopes of this session
    #[serde(with = "hex_key")]
    pub key: [u8; 32],
    /// our randomly generated id, also the topic we listen on
    pub client_id: String,
    /// our metadata, presented to the wallet in the session request
    pub client_meta: Metadata,
    /// the wallet's id, known after approval
    pub peer_id: Option<String>,
    /// the wallet's metadata, known after approval
    pub peer_meta: Option<Metadata>,
    /// the one-time pairing topic
    pub handshake_topic: String,
}

impl Session {
    /// Fresh unconnected session with random key, client id and handshake
    /// topic.
    pub fn new(bridge: Url, client_meta: Metadata, chain_id: Option<String>) -> Self {
        Self {
            connected: false,
            chain_id,
            accounts: vec![],
            bridge,
            key: random_bytes32(),
            client_id: random_topic(),
            client_meta,
            peer_id: None,
            peer_meta: None,
            handshake_topic: random_topic(),
        }
    }

    /// Serialize for durable storage.
    pub fn persist(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Restore from a persisted blob. All-or-nothing: missing fields or a
    /// connected session without accounts/chain id are rejected.
    pub fn restore(bytes: &[u8]) -> Result<Self> {
        let session: Session = serde_json::from_slice(bytes)
            .map_err(|e| Error::Format(format!("bad session blob: {e}")))?;
        session.validate()?;
        Ok(session)
    }

    pub fn validate(&self) -> Result<()> {
        if self.connected {
            if self.accounts.is_empty() {
                return Err(Error::Format(
                    "connected session without accounts".to_string(),
                ));
            }
            if self.chain_id.is_none() {
                return Err(Error::Format(
                    "connected session without chain id".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// The connection string shown to the user as a QR code.
    /// https://eips.ethereum.org/EIPS/eip-1328
    pub fn uri(&self) -> String {
        format!(
            "wc:{}@1?{}",
            self.handshake_topic,
            QuerySerializer::new(String::new())
                .append_pair("bridge", self.bridge.as_str())
                .append_pair("key", &hex::encode(self.key))
                .finish()
        )
    }

    pub fn pairing_request(&self) -> PairingRequest {
        PairingRequest {
            handshake_topic: self.handshake_topic.clone(),
            uri: self.uri(),
            proposed_chain_id: self.chain_id.clone(),
        }
    }

    /// Apply the wallet's answer to the session request.
    pub(crate) fn apply_approval(&mut self, params: SessionParams) {
        self.connected = params.approved;
        self.accounts = params.accounts;
        self.chain_id = params.chain_id;
        self.peer_id = params.peer_id;
        self.peer_meta = params.peer_meta;
    }

    /// Apply an inbound session update. Absent fields keep their previous
    /// values. Returns false when the update tore the session down.
    pub(crate) fn apply_update(&mut self, params: SessionUpdateParams) -> bool {
        self.connected = params.approved;
        if !self.connected {
            self.accounts.clear();
            return false;
        }
        if let Some(accounts) = params.accounts {
            self.accounts = accounts;
        }
        if params.chain_id.is_some() {
            self.chain_id = params.chain_id;
        }
        true
    }

    pub(crate) fn has_account(&self, account: &str) -> bool {
        self.accounts
            .iter()
            .any(|a| a.eq_ignore_ascii_case(account))
    }
}

/// The ephemeral handshake payload handed to the caller when no prior
/// session exists.
#[derive(Clone, Debug, PartialEq)]
pub struct PairingRequest {
    pub handshake_topic: String,
    pub uri: String,
    pub proposed_chain_id: Option<String>,
}

/// Lifecycle transition delivered to observers. Each variant carries an
/// owned snapshot, never a live alias of the client's session.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    Connecting(Session),
    Connected(Session),
    Updated(Session),
    Disconnected(Session),
}

mod hex_key {
    use alloy::hex;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(
        key: &[u8; 32],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode_to_array(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> Metadata {
        Metadata {
            name: "example client".to_string(),
            description: "session lifecycle tests".to_string(),
            url: "http://localhost:8080/".to_string(),
            icons: vec![],
        }
    }

    fn connected_session() -> Session {
        let mut session = Session::new(
            "https://bridge.example.org".parse().unwrap(),
            meta(),
            Some("338".to_string()),
        );
        session.apply_approval(SessionParams {
            approved: true,
            chain_id: Some("338".to_string()),
            accounts: vec!["0xabc0000000000000000000000000000000000000".to_string()],
            peer_id: Some("peer-1".to_string()),
            peer_meta: Some(meta()),
        });
        session
    }

    #[test]
    fn persist_restore_round_trip_is_byte_identical() {
        let session = connected_session();
        let blob = session.persist().unwrap();
        let restored = Session::restore(&blob).unwrap();
        assert_eq!(restored, session);
        assert_eq!(restored.persist().unwrap(), blob);
    }

    #[test]
    fn restore_rejects_missing_fields() {
        let err = Session::restore(br#"{"connected":false}"#).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn restore_rejects_connected_blob_without_accounts() {
        let mut session = connected_session();
        session.accounts.clear();
        let blob = serde_json::to_vec(&session).unwrap();
        let err = Session::restore(&blob).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn restore_rejects_connected_blob_without_chain_id() {
        let mut session = connected_session();
        session.chain_id = None;
        let blob = serde_json::to_vec(&session).unwrap();
        assert!(Session::restore(&blob).is_err());
    }

    #[test]
    fn uri_carries_bridge_and_key() {
        let session = Session::new(
            "https://bridge.example.org/".parse().unwrap(),
            meta(),
            None,
        );
        let uri = session.uri();
        assert!(uri.starts_with(&format!("wc:{}@1?", session.handshake_topic)));
        assert!(uri.contains("bridge=https%3A%2F%2Fbridge.example.org%2F"));
        assert!(uri.contains(&hex::encode(session.key)));
    }

    #[test]
    fn update_with_approved_false_clears_connection() {
        let mut session = connected_session();
        let still_connected = session.apply_update(SessionUpdateParams {
            approved: false,
            chain_id: None,
            accounts: None,
        });
        assert!(!still_connected);
        assert!(session.accounts.is_empty());
    }

    #[test]
    fn account_membership_is_case_insensitive() {
        let session = connected_session();
        assert!(session.has_account("0xABC0000000000000000000000000000000000000"));
        assert!(!session.has_account("0xdead"));
    }
}
