/// Session client
///
/// The pairing lifecycle state machine. Pairing is operator-in-the-loop (a
/// human approves on the wallet), so the machine tolerates arbitrarily long
/// dwell time in `Pairing` and supports both a blocking wait and a
/// background poller with an event channel.
///
/// Only the relay-processing path mutates the session; everything else
/// reads snapshot copies.
///
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::sync::{Mutex, oneshot};
use url::Url;

use crate::envelope;
use crate::error::{Error, Result};
use crate::session::{PairingRequest, Session, SessionEvent};
use crate::transport::Transport;
use crate::types::{
    Envelope, Metadata, SessionParams, SessionRequestParams,
    SessionUpdateParams, WcMethod,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// The state before [`SessionClient::start_or_restore`]. A constructed
    /// client is already past it, in `Pairing` or `Connected`; it exists so
    /// callers tracking the lifecycle externally have a starting value.
    NoSession,
    Pairing,
    Connected,
    /// Terminal for this session instance. A new pairing restarts from
    /// scratch.
    Disconnected,
}

/// What `start_or_restore` produced.
#[derive(Clone, Debug)]
pub enum StartOutcome {
    /// A valid persisted session was restored, no pairing needed.
    Restored(Session),
    /// No usable prior session, the wallet must approve this request.
    Pairing(PairingRequest),
}

/// Explicit configuration, passed into the constructor instead of being
/// read from ambient process state.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub bridge: Url,
    pub client_meta: Metadata,
    /// chain proposed to the wallet; the approval response is authoritative
    pub chain_id: Option<String>,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl SessionConfig {
    pub fn new(bridge: Url, client_meta: Metadata) -> Self {
        Self {
            bridge,
            client_meta,
            chain_id: None,
            poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(60),
        }
    }
}

pub(crate) struct Shared {
    pub(crate) session: Mutex<Session>,
    state: StdMutex<SessionState>,
    pub(crate) pending: StdMutex<HashMap<u64, oneshot::Sender<Envelope>>>,
    pairing_id: StdMutex<Option<u64>>,
    pairing_rejected: AtomicBool,
    callback: StdMutex<Option<UnboundedSender<SessionEvent>>>,
    disconnect_emitted: AtomicBool,
    stop: AtomicBool,
    pub(crate) poller_active: AtomicBool,
    pub(crate) poll_interval: Duration,
    pub(crate) request_timeout: Duration,
}

pub struct SessionClient<T> {
    pub(crate) transport: T,
    pub(crate) shared: Arc<Shared>,
}

impl<T: Clone> Clone for SessionClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<T: Transport> SessionClient<T> {
    /// Restore a persisted session or start a fresh pairing.
    ///
    /// A valid blob with `connected: true` goes straight to `Connected`.
    /// An unconnected blob resumes its pairing; no blob starts a new one.
    pub fn start_or_restore(
        config: SessionConfig,
        transport: T,
        persisted: Option<&[u8]>,
    ) -> Result<(Self, StartOutcome)> {
        let session = match persisted {
            Some(blob) => Session::restore(blob)?,
            None => Session::new(
                config.bridge.clone(),
                config.client_meta.clone(),
                config.chain_id.clone(),
            ),
        };

        let (state, outcome) = if session.connected {
            (SessionState::Connected, StartOutcome::Restored(session.clone()))
        } else {
            (
                SessionState::Pairing,
                StartOutcome::Pairing(session.pairing_request()),
            )
        };
        debug!("session client starting in {state:?}");

        let client = Self {
            transport,
            shared: Arc::new(Shared {
                session: Mutex::new(session),
                state: StdMutex::new(state),
                pending: StdMutex::new(HashMap::new()),
                pairing_id: StdMutex::new(None),
                pairing_rejected: AtomicBool::new(false),
                callback: StdMutex::new(None),
                disconnect_emitted: AtomicBool::new(false),
                stop: AtomicBool::new(false),
                poller_active: AtomicBool::new(false),
                poll_interval: config.poll_interval,
                request_timeout: config.request_timeout,
            }),
        };
        Ok((client, outcome))
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.lock().expect("state lock poisoned")
    }

    /// Owned copy of the current session.
    pub async fn snapshot(&self) -> Session {
        self.shared.session.lock().await.clone()
    }

    /// Serialized session for durable storage.
    pub async fn save(&self) -> Result<Vec<u8>> {
        self.shared.session.lock().await.persist()
    }

    /// Register an observer channel. Every transition sends an owned
    /// snapshot, so observers never alias live state.
    pub fn set_callback(&self, sender: UnboundedSender<SessionEvent>) {
        *self.shared.callback.lock().expect("callback lock poisoned") =
            Some(sender);
    }

    /// Convenience wrapper around [`Self::set_callback`].
    pub fn events(&self) -> UnboundedReceiver<SessionEvent> {
        let (sender, receiver) = unbounded_channel();
        self.set_callback(sender);
        receiver
    }

    /// Block until the wallet approves the session request, or fail with
    /// [`Error::ConnectionTimeout`] leaving the state in `Pairing`.
    pub async fn await_connection(&self, timeout: Duration) -> Result<Session> {
        match self.state() {
            SessionState::Connected => return Ok(self.snapshot().await),
            SessionState::Disconnected => return Err(Error::NotConnected),
            SessionState::NoSession | SessionState::Pairing => {}
        }

        let (request, client_id, handshake_topic, snapshot) = {
            let session = self.shared.session.lock().await;
            let params = SessionRequestParams {
                peer_id: session.client_id.clone(),
                peer_meta: session.client_meta.clone(),
                chain_id: session.chain_id.clone(),
            };
            (
                Envelope::request(
                    WcMethod::SessionRequest,
                    serde_json::to_value(params)?,
                ),
                session.client_id.clone(),
                session.handshake_topic.clone(),
                session.clone(),
            )
        };

        self.emit(SessionEvent::Connecting(snapshot));
        self.transport.subscribe(&client_id).await?;
        self.transport.subscribe(&handshake_topic).await?;

        self.shared.pairing_rejected.store(false, Ordering::SeqCst);
        *self.shared.pairing_id.lock().expect("pairing lock poisoned") =
            Some(request.id);
        self.publish_envelope(&handshake_topic, &request).await?;
        info!("session request {} published, awaiting approval", request.id);

        let wait = async {
            loop {
                if !self.shared.poller_active.load(Ordering::SeqCst) {
                    self.poll_once().await?;
                }
                if self.shared.pairing_rejected.swap(false, Ordering::SeqCst) {
                    return Err(Error::PairingRejected);
                }
                match self.state() {
                    SessionState::Connected => return Ok(()),
                    SessionState::Disconnected => return Err(Error::NotConnected),
                    _ => {}
                }
                tokio::time::sleep(self.shared.poll_interval).await;
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            // approval may still arrive later, the pairing stays pending
            Err(_elapsed) => Err(Error::ConnectionTimeout),
            Ok(Err(e)) => Err(e),
            Ok(Ok(())) => Ok(self.snapshot().await),
        }
    }

    /// Fetch queued relay messages once and feed them through
    /// [`Self::on_relay_message`].
    pub async fn poll_once(&self) -> Result<()> {
        let topic = {
            let session = self.shared.session.lock().await;
            session.client_id.clone()
        };
        for raw in self.transport.fetch(&topic).await? {
            self.on_relay_message(&raw).await;
        }
        Ok(())
    }

    /// Process one raw relay payload. Malformed or unrecognized payloads
    /// are dropped with a warning, never surfaced as fatal.
    pub async fn on_relay_message(&self, raw: &str) {
        let key = self.shared.session.lock().await.key;
        let plain = match envelope::open(raw, key) {
            Ok(plain) => plain,
            Err(e) => {
                warn!("dropping undecryptable relay message: {e:?}");
                return;
            }
        };
        let env: Envelope = match serde_json::from_str(&plain) {
            Ok(env) => env,
            Err(e) => {
                warn!("dropping malformed relay payload: {e}");
                return;
            }
        };

        if env.is_response() {
            self.handle_response(env).await;
        } else {
            match env.method {
                Some(WcMethod::SessionUpdate) => self.handle_update(env).await,
                Some(ref method) => {
                    warn!("dropping unsupported inbound request {method}");
                }
                None => unreachable!("requests always carry a method"),
            }
        }
    }

    /// Local teardown. Always emits `Disconnected` exactly once, even when
    /// the relay is already gone; repeated calls are no-ops.
    pub async fn disconnect(&self) {
        if self.state() == SessionState::Disconnected {
            debug!("disconnect on an already disconnected session");
            return;
        }

        let (update, topic) = {
            let session = self.shared.session.lock().await;
            let params = SessionUpdateParams {
                approved: false,
                chain_id: session.chain_id.clone(),
                accounts: None,
            };
            let env = Envelope::request(
                WcMethod::SessionUpdate,
                serde_json::to_value(params).expect("update params serialize"),
            );
            (env, self.outbound_topic(&session))
        };
        if let Err(e) = self.publish_envelope(&topic, &update).await {
            warn!("relay unreachable during disconnect: {e:?}");
        }

        self.shared.stop.store(true, Ordering::SeqCst);
        self.mark_disconnected().await;
    }

    /// Background task polling the transport. Stop it with [`Self::stop`]
    /// (or `disconnect`) and then await the handle before dropping the
    /// transport.
    pub fn spawn_poller(&self) -> tokio::task::JoinHandle<()>
    where
        T: Clone + Send + 'static,
    {
        let client = self.clone();
        client.shared.poller_active.store(true, Ordering::SeqCst);
        tokio::spawn(async move {
            loop {
                if client.shared.stop.load(Ordering::SeqCst)
                    || client.state() == SessionState::Disconnected
                {
                    break;
                }
                if let Err(e) = client.poll_once().await {
                    warn!("relay transport failed, tearing session down: {e:?}");
                    client.mark_disconnected().await;
                    break;
                }
                tokio::time::sleep(client.shared.poll_interval).await;
            }
            client.shared.poller_active.store(false, Ordering::SeqCst);
            debug!("relay poller stopped");
        })
    }

    /// Ask the poller to stop after its current iteration.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
    }

    pub(crate) async fn publish_envelope(
        &self,
        topic: &str,
        env: &Envelope,
    ) -> Result<()> {
        let key = self.shared.session.lock().await.key;
        let sealed = envelope::seal(&serde_json::to_string(env)?, key)?;
        let (ttl, tag) = env
            .method
            .as_ref()
            .map(|m| (m.ttl(), m.irn_tag()))
            .unwrap_or((300, 0));
        self.transport.publish(topic, sealed, ttl, tag).await
    }

    pub(crate) fn outbound_topic(&self, session: &Session) -> String {
        session
            .peer_id
            .clone()
            .unwrap_or_else(|| session.handshake_topic.clone())
    }

    fn emit(&self, event: SessionEvent) {
        let callback = self.shared.callback.lock().expect("callback lock poisoned");
        if let Some(sender) = callback.as_ref() {
            if sender.send(event).is_err() {
                debug!("event observer went away");
            }
        }
    }

    async fn handle_response(&self, env: Envelope) {
        let pairing = *self.shared.pairing_id.lock().expect("pairing lock poisoned");
        if pairing == Some(env.id) {
            self.handle_pairing_response(env).await;
            return;
        }

        let sender = self
            .shared
            .pending
            .lock()
            .expect("pending lock poisoned")
            .remove(&env.id);
        match sender {
            Some(sender) => {
                // receiver may have timed out meanwhile, that is fine
                let _ = sender.send(env);
            }
            None => {
                warn!("dropping response for unknown request id {}", env.id);
            }
        }
    }

    async fn handle_pairing_response(&self, env: Envelope) {
        let result = match env.result {
            Some(result) => result,
            None => {
                warn!("session request answered without result, dropping");
                return;
            }
        };
        let params: SessionParams = match serde_json::from_value(result) {
            Ok(params) => params,
            Err(e) => {
                warn!("dropping malformed session approval: {e}");
                return;
            }
        };

        if !params.approved {
            info!("wallet rejected the session request");
            *self.shared.pairing_id.lock().expect("pairing lock poisoned") = None;
            self.shared.pairing_rejected.store(true, Ordering::SeqCst);
            return;
        }
        if params.accounts.is_empty() || params.chain_id.is_none() {
            warn!("approval without accounts or chain id, dropping");
            return;
        }

        let snapshot = {
            let mut session = self.shared.session.lock().await;
            session.apply_approval(params);
            session.clone()
        };
        *self.shared.state.lock().expect("state lock poisoned") =
            SessionState::Connected;
        *self.shared.pairing_id.lock().expect("pairing lock poisoned") = None;
        info!(
            "session connected, chain {:?}, {} account(s)",
            snapshot.chain_id,
            snapshot.accounts.len()
        );
        self.emit(SessionEvent::Connected(snapshot));
    }

    async fn handle_update(&self, env: Envelope) {
        let params: SessionUpdateParams = match env.decode_params() {
            Ok(params) => params,
            Err(e) => {
                warn!("dropping malformed session update: {e:?}");
                return;
            }
        };

        // updates only apply to an approved session; a peer must not be
        // able to flip an unapproved session to connected
        match self.state() {
            SessionState::Connected => {}
            SessionState::Disconnected => {
                debug!("session update after disconnect, ignoring");
                return;
            }
            _ => {
                warn!("session update before approval, dropping");
                return;
            }
        }

        if params.approved {
            let snapshot = {
                let mut session = self.shared.session.lock().await;
                session.apply_update(params);
                session.clone()
            };
            self.emit(SessionEvent::Updated(snapshot));
        } else {
            // by update, the session is destroyed
            self.mark_disconnected().await;
        }
    }

    pub(crate) async fn mark_disconnected(&self) {
        let snapshot = {
            let mut session = self.shared.session.lock().await;
            session.connected = false;
            session.accounts.clear();
            session.clone()
        };
        *self.shared.state.lock().expect("state lock poisoned") =
            SessionState::Disconnected;
        if !self.shared.disconnect_emitted.swap(true, Ordering::SeqCst) {
            info!("session disconnected");
            self.emit(SessionEvent::Disconnected(snapshot));
        }
    }
}
