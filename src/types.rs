/// Types
///
/// Envelope and payload types exchanged over the relay, plus the JSON-RPC
/// types of the relay API itself. There are tests with actual payloads to
/// ensure the encode/decode logic works.
///
use std::fmt::{self, Display};
use std::str::FromStr;

use alloy::primitives::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::random_request_id;

/// A single protocol-level request or response exchanged with the wallet.
/// JSON-RPC 2.0 shaped: requests carry `method` + `params`, responses carry
/// `result` or `error` under the id of the request they answer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<WcMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
    pub id: u64,
}

impl Envelope {
    pub fn request(method: WcMethod, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: Some(method),
            params: Some(params),
            result: None,
            error: None,
            id: random_request_id(),
        }
    }

    pub fn response(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: None,
            params: None,
            result: Some(result),
            error: None,
            id,
        }
    }

    /// A response envelope has no method, only a result or error.
    pub fn is_response(&self) -> bool {
        self.method.is_none()
    }

    pub fn decode_params<P>(&self) -> crate::Result<P>
    where
        P: serde::de::DeserializeOwned,
    {
        let params = self
            .params
            .clone()
            .ok_or(crate::Error::Format("missing params".to_string()))?;
        Ok(serde_json::from_value(params)?)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WcMethod {
    #[serde(rename = "wc_sessionRequest")]
    SessionRequest,

    #[serde(rename = "wc_sessionUpdate")]
    SessionUpdate,

    #[serde(rename = "personal_sign")]
    PersonalSign,

    #[serde(rename = "eth_signTransaction")]
    SignTransaction,

    #[serde(rename = "eth_sendTransaction")]
    SendTransaction,

    #[serde(other)]
    Unknown,
}

impl WcMethod {
    // https://specs.walletconnect.com/2.0/specs/clients/sign/rpc-methods
    pub fn ttl(&self) -> u64 {
        match self {
            WcMethod::SessionRequest => 300,
            WcMethod::SessionUpdate => 86400,
            WcMethod::PersonalSign
            | WcMethod::SignTransaction
            | WcMethod::SendTransaction => 300,
            WcMethod::Unknown => 300,
        }
    }

    pub fn irn_tag(&self) -> u16 {
        match self {
            WcMethod::SessionRequest => 1100,
            WcMethod::SessionUpdate => 1104,
            WcMethod::PersonalSign
            | WcMethod::SignTransaction
            | WcMethod::SendTransaction => 1108,
            WcMethod::Unknown => 0,
        }
    }
}

impl Display for WcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", serde_plain::to_string(self).unwrap())
    }
}

impl FromStr for WcMethod {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        serde_plain::from_str(s).map_err(|e| e.to_string().into())
    }
}

/// Client metadata presented to the wallet in the session request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub description: String,
    pub url: String,
    pub icons: Vec<String>,
}

/// Params of the outbound `wc_sessionRequest`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequestParams {
    pub peer_id: String,
    pub peer_meta: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
}

/// Result payload the wallet answers the session request with.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionParams {
    pub approved: bool,
    #[serde(default)]
    pub chain_id: Option<String>,
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default)]
    pub peer_id: Option<String>,
    #[serde(default)]
    pub peer_meta: Option<Metadata>,
}

/// Params of an inbound `wc_sessionUpdate`. `approved: false` tears the
/// session down.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdateParams {
    pub approved: bool,
    #[serde(default)]
    pub chain_id: Option<String>,
    #[serde(default)]
    pub accounts: Option<Vec<String>>,
}

/// Transaction fields as handed to `eth_signTransaction` /
/// `eth_sendTransaction`. Quantities are caller-formatted strings, the
/// calldata serializes as 0x-prefixed hex.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
}

/// Describes a contract call in chain-agnostic terms. The wallet-core
/// collaborator turns this into calldata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContractAction {
    pub contract: String,
    pub function: String,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

// --- relay JSON-RPC API ---

#[derive(Debug, Serialize)]
pub struct RelayRpcRequest {
    pub jsonrpc: &'static str,
    pub method: RelayRpcMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct RelayRpcResponse {
    #[allow(dead_code)]
    pub jsonrpc: String,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RelayRpcError>,
    #[serde(default)]
    #[allow(dead_code)]
    pub id: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RelayRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum RelayRpcMethod {
    #[serde(rename = "irn_publish")]
    IrnPublish,

    #[serde(rename = "irn_subscribe")]
    IrnSubscribe,

    #[serde(rename = "irn_fetchMessages")]
    IrnFetchMessages,
}

#[derive(Debug, Serialize)]
pub struct PublishParams {
    pub topic: String,
    pub message: String,
    pub ttl: u64,
    pub prompt: bool,
    pub tag: u16,
}

#[derive(Debug, Serialize)]
pub struct SubscribeParams {
    pub topic: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct FetchMessagesResult {
    #[serde(rename = "hasMore")]
    pub has_more: bool,
    pub messages: Vec<RelayMessage>,
}

#[derive(Debug, Deserialize)]
pub struct RelayMessage {
    pub topic: String,
    pub message: String,
    #[serde(rename = "publishedAt")]
    #[serde(default)]
    pub published_at: Option<u64>,
    #[serde(default)]
    pub tag: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_envelope_skips_response_fields() {
        let envelope = Envelope::request(
            WcMethod::PersonalSign,
            serde_json::json!(["0x68656c6c6f", "0xabc"]),
        );
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["method"], "personal_sign");
        assert!(json.get("result").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn unknown_method_does_not_fail_decoding() {
        let raw = r#"{"jsonrpc":"2.0","method":"wc_somethingNew","params":{},"id":42}"#;
        let envelope: Envelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.method, Some(WcMethod::Unknown));
    }

    #[test]
    fn session_params_decode_from_wallet_payload() {
        let raw = r#"{
            "approved": true,
            "chainId": "338",
            "accounts": ["0xabc0000000000000000000000000000000000000"],
            "peerId": "6b6a6867-f367-34dc-98f4-8d167c504ef7",
            "peerMeta": {
                "name": "Test Wallet",
                "description": "",
                "url": "https://wallet.example",
                "icons": []
            }
        }"#;
        let params: SessionParams = serde_json::from_str(raw).unwrap();
        assert!(params.approved);
        assert_eq!(params.chain_id.as_deref(), Some("338"));
        assert_eq!(params.accounts.len(), 1);
    }

    #[test]
    fn transaction_fields_serialize_camel_case() {
        let tx = TransactionFields {
            from: Some("0xabc".to_string()),
            to: "0xdef".to_string(),
            gas_price: Some("5000000000".to_string()),
            chain_id: Some("338".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["gasPrice"], "5000000000");
        assert_eq!(json["chainId"], "338");
        assert!(json.get("nonce").is_none());
    }

    #[test]
    fn method_display_round_trip() {
        assert_eq!(
            WcMethod::SessionUpdate.to_string(),
            "wc_sessionUpdate"
        );
        assert_eq!(
            "eth_signTransaction".parse::<WcMethod>().unwrap(),
            WcMethod::SignTransaction
        );
    }
}
