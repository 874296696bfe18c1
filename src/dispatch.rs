/// Request dispatcher
///
/// Turns signing intents into envelopes sent over the transport and
/// correlates the responses by request id. All operations require an
/// active session and a known account; a timed-out request is never
/// retried here, since a signing request must not be silently duplicated.
///
use std::sync::atomic::Ordering;

use alloy::hex;
use alloy::primitives::{Bytes, Signature};
use log::warn;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::client::{SessionClient, SessionState};
use crate::error::{Error, Result};
use crate::transport::Transport;
use crate::types::{ContractAction, Envelope, TransactionFields, WcMethod};
use crate::wallet_core::{ChainRpc, WalletCore};

impl<T: Transport> SessionClient<T> {
    /// `personal_sign` as per EIP-191. Returns the wallet's 65-byte
    /// signature.
    pub async fn sign_personal(
        &self,
        message: &str,
        account: &str,
    ) -> Result<Signature> {
        self.check_account(account).await?;
        let result = self
            .dispatch(
                WcMethod::PersonalSign,
                json!([
                    format!("0x{}", hex::encode(message.as_bytes())),
                    account
                ]),
            )
            .await?;
        let sig_str: String = serde_json::from_value(result)?;
        Ok(sig_str.parse::<Signature>()?)
    }

    /// Ask the wallet to sign a transaction, returns the signed raw bytes.
    /// A chain id differing from the session's fails with
    /// [`Error::ChainMismatch`] before anything is sent.
    pub async fn sign_transaction(
        &self,
        tx: TransactionFields,
        account: &str,
    ) -> Result<Bytes> {
        let tx = self.prepare_transaction(tx, account).await?;
        let result = self
            .dispatch(WcMethod::SignTransaction, json!([tx]))
            .await?;
        let raw: String = serde_json::from_value(result)?;
        Ok(raw.parse::<Bytes>()?)
    }

    /// Compose a contract call through the wallet-core collaborator and
    /// send it for signing and submission. Returns the tx hash.
    pub async fn send_contract_call(
        &self,
        action: &ContractAction,
        account: &str,
        wallet_core: &dyn WalletCore,
    ) -> Result<String> {
        let data = wallet_core.encode_call(action)?;
        let tx = TransactionFields {
            to: action.contract.clone(),
            value: action.value.clone(),
            data: Some(Bytes::from(data)),
            ..Default::default()
        };
        let tx = self.prepare_transaction(tx, account).await?;
        let result = self
            .dispatch(WcMethod::SendTransaction, json!([tx]))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Sign through the wallet and broadcast through a chain RPC client,
    /// filling a missing nonce from the chain first. Returns the tx hash.
    pub async fn sign_and_broadcast(
        &self,
        mut tx: TransactionFields,
        account: &str,
        rpc: &dyn ChainRpc,
    ) -> Result<String> {
        self.check_account(account).await?;
        if tx.nonce.is_none() {
            tx.nonce = Some(rpc.get_nonce(account).await?.to_string());
        }
        let signed = self.sign_transaction(tx, account).await?;
        rpc.broadcast(&signed).await
    }

    /// Common preconditions: connected session, known account, matching
    /// chain id. Fills `from` and the session chain id into the request.
    async fn prepare_transaction(
        &self,
        mut tx: TransactionFields,
        account: &str,
    ) -> Result<TransactionFields> {
        self.check_account(account).await?;
        let session_chain = {
            let session = self.shared.session.lock().await;
            session
                .chain_id
                .clone()
                .ok_or(Error::NotConnected)?
        };
        match tx.chain_id.take() {
            Some(requested) if requested != session_chain => {
                return Err(Error::ChainMismatch {
                    expected: session_chain,
                    requested,
                });
            }
            _ => {}
        }
        tx.chain_id = Some(session_chain);
        tx.from = Some(account.to_string());
        Ok(tx)
    }

    async fn check_account(&self, account: &str) -> Result<()> {
        if self.state() != SessionState::Connected {
            return Err(Error::NotConnected);
        }
        let session = self.shared.session.lock().await;
        if !session.has_account(account) {
            return Err(Error::UnknownAccount(account.to_string()));
        }
        Ok(())
    }

    /// Send a request envelope and await the correlated response.
    async fn dispatch(&self, method: WcMethod, params: Value) -> Result<Value> {
        if self.state() != SessionState::Connected {
            return Err(Error::NotConnected);
        }

        let request = Envelope::request(method, params);
        let id = request.id;
        let (sender, mut receiver) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .expect("pending lock poisoned")
            .insert(id, sender);

        let topic = {
            let session = self.shared.session.lock().await;
            self.outbound_topic(&session)
        };
        if let Err(e) = self.publish_envelope(&topic, &request).await {
            self.forget_request(id);
            return Err(e);
        }

        let wait = async {
            loop {
                match receiver.try_recv() {
                    Ok(response) => return Ok(response),
                    Err(TryRecvError::Empty) => {}
                    Err(TryRecvError::Closed) => {
                        return Err(Error::Internal(
                            "response channel closed".to_string(),
                        ));
                    }
                }
                // with a background poller running, just wait for it
                if !self.shared.poller_active.load(Ordering::SeqCst) {
                    self.poll_once().await?;
                }
                tokio::time::sleep(self.shared.poll_interval).await;
            }
        };

        let response =
            match tokio::time::timeout(self.shared.request_timeout, wait).await
            {
                Ok(result) => result?,
                Err(_elapsed) => {
                    self.forget_request(id);
                    warn!("request {id} timed out, not retrying");
                    return Err(Error::RequestTimeout(id));
                }
            };

        if let Some(error) = response.error {
            return Err(Error::Internal(format!(
                "wallet returned error {}: {}",
                error.code, error.message
            )));
        }
        response
            .result
            .ok_or(Error::Format("response without result".to_string()))
    }

    fn forget_request(&self, id: u64) {
        self.shared
            .pending
            .lock()
            .expect("pending lock poisoned")
            .remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alloy::primitives::Bytes;
    use async_trait::async_trait;
    use serde_json::json;

    use crate::client::testing::{ACCOUNT, config, connected_client};
    use crate::client::SessionClient;
    use crate::error::{Error, Result};
    use crate::transport::mock::MockTransport;
    use crate::types::{ContractAction, Envelope, EnvelopeError, TransactionFields, WcMethod};
    use crate::wallet_core::{ChainRpc, PrivateKey, WalletCore};

    fn sig_hex() -> String {
        // r = s = 0x11..11, v = 27
        format!("0x{}{}1b", "11".repeat(32), "11".repeat(32))
    }

    struct StubWalletCore;

    impl WalletCore for StubWalletCore {
        fn derive_key(&self, _mnemonic: &str, _path: &str) -> Result<PrivateKey> {
            Ok(PrivateKey([0u8; 32]))
        }

        fn sign(&self, _key: &PrivateKey, _payload: &[u8]) -> Result<Vec<u8>> {
            Ok(vec![0u8; 65])
        }

        fn encode_transaction(&self, _tx: &TransactionFields) -> Result<Vec<u8>> {
            Ok(vec![])
        }

        fn encode_call(&self, _action: &ContractAction) -> Result<Vec<u8>> {
            Ok(vec![0xa9, 0x05, 0x9c, 0xbb])
        }
    }

    struct StubRpc;

    #[async_trait]
    impl ChainRpc for StubRpc {
        async fn broadcast(&self, _signed: &[u8]) -> Result<String> {
            Ok("0xbroadcasthash".to_string())
        }

        async fn get_balance(&self, _address: &str) -> Result<String> {
            Ok("0".to_string())
        }

        async fn get_nonce(&self, _address: &str) -> Result<u64> {
            Ok(7)
        }
    }

    #[tokio::test]
    async fn sign_personal_returns_wallet_signature() {
        let (client, transport) = connected_client();
        let expected = sig_hex();
        transport.set_responder(move |env| {
            (env.method == Some(WcMethod::PersonalSign))
                .then(|| Envelope::response(env.id, json!(sig_hex())))
        });

        let signature = client.sign_personal("hello", ACCOUNT).await.unwrap();

        assert_eq!(format!("0x{}", alloy::hex::encode(signature.as_bytes())), expected);
        // the message went out hex-encoded together with the account
        let sent = transport.published_envelope(0);
        let params = sent.params.unwrap();
        assert_eq!(params[0], json!(format!("0x{}", alloy::hex::encode(b"hello"))));
        assert_eq!(params[1], json!(ACCOUNT));
    }

    #[tokio::test]
    async fn sign_personal_rejects_unknown_account() {
        let (client, transport) = connected_client();

        let err = client
            .sign_personal("hello", "0xdead000000000000000000000000000000000000")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnknownAccount(_)));
        assert_eq!(transport.published_count(), 0);
    }

    #[tokio::test]
    async fn sign_personal_requires_connection() {
        let transport = Arc::new(MockTransport::new());
        let (client, _outcome) =
            SessionClient::start_or_restore(config(), transport, None).unwrap();

        let err = client.sign_personal("hello", ACCOUNT).await.unwrap_err();

        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn chain_mismatch_fails_before_sending() {
        let (client, transport) = connected_client();
        let tx = TransactionFields {
            to: "0xfee0000000000000000000000000000000000000".to_string(),
            chain_id: Some("999".to_string()),
            ..Default::default()
        };

        let err = client.sign_transaction(tx, ACCOUNT).await.unwrap_err();

        match err {
            Error::ChainMismatch { expected, requested } => {
                assert_eq!(expected, "338");
                assert_eq!(requested, "999");
            }
            other => panic!("expected ChainMismatch, got {other:?}"),
        }
        assert_eq!(transport.published_count(), 0);
    }

    #[tokio::test]
    async fn sign_transaction_fills_session_fields() {
        let (client, transport) = connected_client();
        transport.set_responder(|env| {
            (env.method == Some(WcMethod::SignTransaction))
                .then(|| Envelope::response(env.id, json!("0x02f86bdeadbeef")))
        });
        let tx = TransactionFields {
            to: "0xfee0000000000000000000000000000000000000".to_string(),
            value: Some("0xde0b6b3a7640000".to_string()),
            ..Default::default()
        };

        let raw = client.sign_transaction(tx, ACCOUNT).await.unwrap();

        assert_eq!(raw, "0x02f86bdeadbeef".parse::<Bytes>().unwrap());
        let sent = transport.published_envelope(0);
        let params = sent.params.unwrap();
        assert_eq!(params[0]["chainId"], json!("338"));
        assert_eq!(params[0]["from"], json!(ACCOUNT));
    }

    #[tokio::test]
    async fn request_timeout_is_not_retried() {
        let (client, transport) = connected_client();
        // no responder, the wallet never answers

        let err = client.sign_personal("hello", ACCOUNT).await.unwrap_err();

        assert!(matches!(err, Error::RequestTimeout(_)));
        assert_eq!(transport.published_count(), 1);
    }

    #[tokio::test]
    async fn wallet_error_response_surfaces() {
        let (client, transport) = connected_client();
        transport.set_responder(|env| {
            Some(Envelope {
                jsonrpc: "2.0".to_string(),
                method: None,
                params: None,
                result: None,
                error: Some(EnvelopeError {
                    code: -32000,
                    message: "User rejected".to_string(),
                    data: None,
                }),
                id: env.id,
            })
        });

        let err = client.sign_personal("hello", ACCOUNT).await.unwrap_err();

        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn send_contract_call_encodes_through_wallet_core() {
        let (client, transport) = connected_client();
        transport.set_responder(|env| {
            (env.method == Some(WcMethod::SendTransaction))
                .then(|| Envelope::response(env.id, json!("0xtxhash1")))
        });
        let action = ContractAction {
            contract: "0xc0de000000000000000000000000000000000000".to_string(),
            function: "transfer".to_string(),
            args: vec![ACCOUNT.to_string(), "100".to_string()],
            value: None,
        };

        let hash = client
            .send_contract_call(&action, ACCOUNT, &StubWalletCore)
            .await
            .unwrap();

        assert_eq!(hash, "0xtxhash1");
        let sent = transport.published_envelope(0);
        let params = sent.params.unwrap();
        assert_eq!(params[0]["to"], json!(action.contract));
        assert_eq!(params[0]["data"], json!("0xa9059cbb"));
    }

    #[tokio::test]
    async fn sign_and_broadcast_fills_nonce_from_chain() {
        let (client, transport) = connected_client();
        transport.set_responder(|env| {
            (env.method == Some(WcMethod::SignTransaction))
                .then(|| Envelope::response(env.id, json!("0x1234")))
        });
        let tx = TransactionFields {
            to: "0xfee0000000000000000000000000000000000000".to_string(),
            ..Default::default()
        };

        let hash = client
            .sign_and_broadcast(tx, ACCOUNT, &StubRpc)
            .await
            .unwrap();

        assert_eq!(hash, "0xbroadcasthash");
        let sent = transport.published_envelope(0);
        assert_eq!(sent.params.unwrap()[0]["nonce"], json!("7"));
    }
}
