/// Transport
///
/// Connection lifecycle and raw envelope send/receive against a relay
/// server. The transport never interprets payload semantics and never
/// reconnects on its own: a dropped relay surfaces to the caller, who
/// decides whether to re-pair.
///
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use serde_json::Value;

use crate::auth::Keypair;
use crate::error::{Error, Result};
use crate::types::{
    FetchMessagesResult, PublishParams, RelayRpcMethod, RelayRpcRequest,
    RelayRpcResponse, SubscribeParams,
};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish a sealed message under a topic.
    async fn publish(
        &self,
        topic: &str,
        message: String,
        ttl: u64,
        tag: u16,
    ) -> Result<()>;

    /// Subscribe to a topic, returns the relay's subscription id.
    async fn subscribe(&self, topic: &str) -> Result<String>;

    /// Fetch sealed messages queued under a topic.
    async fn fetch(&self, topic: &str) -> Result<Vec<String>>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn publish(
        &self,
        topic: &str,
        message: String,
        ttl: u64,
        tag: u16,
    ) -> Result<()> {
        (**self).publish(topic, message, ttl, tag).await
    }

    async fn subscribe(&self, topic: &str) -> Result<String> {
        (**self).subscribe(topic).await
    }

    async fn fetch(&self, topic: &str) -> Result<Vec<String>> {
        (**self).fetch(topic).await
    }
}

/// HTTP JSON-RPC client for the relay. Auth is a bearer JWT signed with
/// the client seed, the project id goes in the query string.
pub struct RelayClient {
    http: reqwest::Client,
    rpc: String,
    project_id: String,
    jwt: String,
    id_entropy: usize,
}

impl RelayClient {
    /// `rpc` is the relay RPC endpoint, `aud` the relay origin the JWT is
    /// issued for. The same client seed should be reused for all
    /// connections so the relay sees a stable client identity.
    pub fn new(
        rpc: &str,
        aud: &str,
        project_id: &str,
        client_seed: [u8; 32],
    ) -> Result<Self> {
        let keypair = Keypair::from_seed(client_seed);
        let jwt = keypair.sign_jwt(aud)?;
        let id_entropy: u16 = rand::thread_rng().r#gen();
        Ok(Self {
            http: reqwest::Client::new(),
            rpc: rpc.to_string(),
            project_id: project_id.to_string(),
            jwt,
            id_entropy: id_entropy as usize,
        })
    }

    fn next_id(&self) -> Result<String> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?;
        let date_ns = now.as_millis() * 1_000_000;
        Ok((date_ns + self.id_entropy as u128).to_string())
    }

    async fn request<P: Serialize>(
        &self,
        method: RelayRpcMethod,
        params: P,
    ) -> Result<Value> {
        let rpc_request = RelayRpcRequest {
            jsonrpc: "2.0",
            method,
            params: Some(serde_json::to_value(params)?),
            id: self.next_id()?,
        };

        let response = self
            .http
            .post(&self.rpc)
            .query(&[("projectId", &self.project_id)])
            .bearer_auth(&self.jwt)
            .json(&rpc_request)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("relay unreachable: {e}")))?
            .json::<RelayRpcResponse>()
            .await
            .map_err(|e| Error::Transport(format!("bad relay response: {e}")))?;

        if let Some(result) = response.result {
            Ok(result)
        } else if let Some(error) = response.error {
            Err(error.into())
        } else {
            Err(Error::Transport("empty relay response".to_string()))
        }
    }
}

#[async_trait]
impl Transport for RelayClient {
    async fn publish(
        &self,
        topic: &str,
        message: String,
        ttl: u64,
        tag: u16,
    ) -> Result<()> {
        self.request(
            RelayRpcMethod::IrnPublish,
            PublishParams {
                topic: topic.to_string(),
                message,
                ttl,
                prompt: false,
                tag,
            },
        )
        .await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<String> {
        let result = self
            .request(
                RelayRpcMethod::IrnSubscribe,
                SubscribeParams {
                    topic: topic.to_string(),
                },
            )
            .await?;
        Ok(result.as_str().map(str::to_string).unwrap_or_default())
    }

    async fn fetch(&self, topic: &str) -> Result<Vec<String>> {
        let result = self
            .request(
                RelayRpcMethod::IrnFetchMessages,
                SubscribeParams {
                    topic: topic.to_string(),
                },
            )
            .await?;
        let fetched: FetchMessagesResult = serde_json::from_value(result)?;
        Ok(fetched.messages.into_iter().map(|m| m.message).collect())
    }
}
