//! In-process ledger network
//!
//! Scripted peers, ordering service and event hubs implementing the
//! collaborator traits. Peers endorse, the orderer accepts and the hub
//! delivers a VALID commit event unless told otherwise. Every call is
//! counted so callers can assert on what reached the network.

use super::{
    Channel, ChannelResolver, EventHub, EventHubFactory, PeerResolver, TxErrorCallback,
    TxEventCallback,
};
use crate::{
    types::{
        CommitEvent, CommitOutcome, Endorsement, EventError, Peer, Proposal, ProposalRequest,
        ProposalResponse, TransactionId, TxValidationCode, ValidatedEndorsement, ENDORSEMENT_OK,
    },
    Error, Result,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::Mutex;
use rand::RngCore;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a peer answers proposals
#[derive(Debug, Clone)]
pub enum PeerBehavior {
    /// Endorse with status 200
    Endorse,
    /// Answer with a non-200 status
    Reject {
        /// Status
        status: i32,
        /// Message
        message: Option<String>,
    },
    /// Fail at the transport level
    Unreachable(String),
}

/// How the ordering service answers one commit
#[derive(Debug, Clone)]
pub enum OrderingBehavior {
    /// Acknowledge with SUCCESS
    Accept,
    /// Acknowledge with FAILURE and this status
    Reject(String),
    /// Fail at the transport level
    Unreachable(String),
}

/// What the event hub does after one accepted commit
#[derive(Debug, Clone)]
pub enum EventBehavior {
    /// Emit a commit event with this code after the delay
    Deliver {
        /// Validation code
        code: TxValidationCode,
        /// Delay after the orderer acknowledgment
        delay: Duration,
    },
    /// Never emit anything
    Drop,
    /// Report an error for the transaction
    StreamError(EventError),
}

impl EventBehavior {
    /// Immediate delivery with this code
    pub fn deliver(code: TxValidationCode) -> Self {
        EventBehavior::Deliver {
            code,
            delay: Duration::ZERO,
        }
    }
}

/// Snapshot of network call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    /// Proposals built (one per broadcast)
    pub proposals_built: usize,
    /// Proposals delivered to individual peers
    pub proposals_sent: usize,
    /// Commits sent to the orderer
    pub commits_sent: usize,
    /// Commits the orderer has answered
    pub commits_acknowledged: usize,
}

#[derive(Default)]
struct NetworkState {
    peers: DashMap<String, PeerBehavior>,
    hubs: DashMap<String, Arc<MemoryEventHub>>,
    broadcast_failures: Mutex<VecDeque<String>>,
    ordering_script: Mutex<VecDeque<OrderingBehavior>>,
    event_script: Mutex<VecDeque<EventBehavior>>,
    ordering_latency: Mutex<Duration>,
    issued_tx_ids: Mutex<Vec<String>>,
    submitted_tx_ids: Mutex<Vec<String>>,
    proposals_built: AtomicUsize,
    proposals_sent: AtomicUsize,
    commits_sent: AtomicUsize,
    commits_acknowledged: AtomicUsize,
    block_height: AtomicU64,
}

impl NetworkState {
    fn hub(&self, channel_id: &str) -> Arc<MemoryEventHub> {
        self.hubs
            .entry(channel_id.to_string())
            .or_insert_with(|| Arc::new(MemoryEventHub::new(channel_id)))
            .clone()
    }
}

/// In-process network
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<NetworkState>,
}

impl MemoryNetwork {
    /// Create network where everything succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Set behavior of the peer at `url`
    pub fn set_peer(&self, url: impl Into<String>, behavior: PeerBehavior) {
        self.state.peers.insert(url.into(), behavior);
    }

    /// Make the next proposal build fail with a transport error
    pub fn fail_next_broadcast(&self, message: impl Into<String>) {
        self.state.broadcast_failures.lock().push_back(message.into());
    }

    /// Queue orderer behavior for the next commit
    pub fn script_ordering(&self, behavior: OrderingBehavior) {
        self.state.ordering_script.lock().push_back(behavior);
    }

    /// Queue event hub behavior for the next accepted commit
    pub fn script_event(&self, behavior: EventBehavior) {
        self.state.event_script.lock().push_back(behavior);
    }

    /// Delay every orderer acknowledgment
    pub fn set_ordering_latency(&self, latency: Duration) {
        *self.state.ordering_latency.lock() = latency;
    }

    /// Event hub of a channel
    pub fn event_hub(&self, channel_id: &str) -> Arc<MemoryEventHub> {
        self.state.hub(channel_id)
    }

    /// Call counters
    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            proposals_built: self.state.proposals_built.load(Ordering::SeqCst),
            proposals_sent: self.state.proposals_sent.load(Ordering::SeqCst),
            commits_sent: self.state.commits_sent.load(Ordering::SeqCst),
            commits_acknowledged: self.state.commits_acknowledged.load(Ordering::SeqCst),
        }
    }

    /// Transaction IDs handed out, in order
    pub fn issued_tx_ids(&self) -> Vec<String> {
        self.state.issued_tx_ids.lock().clone()
    }

    /// Transaction IDs sent to the orderer, in order
    pub fn submitted_tx_ids(&self) -> Vec<String> {
        self.state.submitted_tx_ids.lock().clone()
    }
}

impl PeerResolver for MemoryNetwork {
    fn new_peers(&self, urls: &[String]) -> Result<Vec<Peer>> {
        urls.iter()
            .map(|url| {
                let (_, rest) = url
                    .split_once("://")
                    .ok_or_else(|| Error::InvalidRequest(format!("invalid peer URL '{}'", url)))?;
                let host = rest.split(':').next().unwrap_or_default();
                if host.is_empty() {
                    return Err(Error::InvalidRequest(format!("invalid peer URL '{}'", url)));
                }
                Ok(Peer::new(host, url.as_str()))
            })
            .collect()
    }
}

#[async_trait]
impl ChannelResolver for MemoryNetwork {
    async fn channel_for_org(
        &self,
        channel_id: &str,
        username: &str,
        org: &str,
    ) -> Result<Arc<dyn Channel>> {
        if channel_id.is_empty() {
            return Err(Error::InvalidRequest("channel ID is empty".to_string()));
        }

        Ok(Arc::new(MemoryChannel {
            name: channel_id.to_string(),
            creator: format!("{}@{}", username, org),
            state: self.state.clone(),
        }))
    }
}

impl EventHubFactory for MemoryNetwork {
    fn listen_channel(&self, channel: &Arc<dyn Channel>) -> Result<Arc<dyn EventHub>> {
        Ok(self.state.hub(channel.name()))
    }
}

/// Channel bound to one identity on the in-process network
pub struct MemoryChannel {
    name: String,
    creator: String,
    state: Arc<NetworkState>,
}

#[async_trait]
impl Channel for MemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn new_transaction_id(&self) -> Result<TransactionId> {
        let mut nonce = vec![0u8; 24];
        rand::thread_rng().fill_bytes(&mut nonce);

        let tx_id = TransactionId::derive(nonce, self.creator.as_bytes());
        self.state.issued_tx_ids.lock().push(tx_id.to_string());

        Ok(tx_id)
    }

    async fn build_proposal(&self, request: &ProposalRequest) -> Result<Proposal> {
        if let Some(message) = self.state.broadcast_failures.lock().pop_front() {
            return Err(Error::Transport(message));
        }

        self.state.proposals_built.fetch_add(1, Ordering::SeqCst);

        let header = serde_json::to_vec(&json!({
            "channel_id": request.channel_id,
            "tx_id": request.tx_id.as_str(),
            "creator": self.creator,
            "timestamp": Utc::now().to_rfc3339(),
        }))?;
        let payload = serde_json::to_vec(&json!({
            "chaincode_id": request.chaincode_id,
            "fcn": request.fcn,
            "args": request.args,
        }))?;

        Ok(Proposal {
            tx_id: request.tx_id.clone(),
            channel_id: request.channel_id.clone(),
            chaincode_id: request.chaincode_id.clone(),
            header,
            payload,
        })
    }

    async fn send_proposal(&self, peer: &Peer, proposal: &Proposal) -> Result<ProposalResponse> {
        let behavior = self
            .state
            .peers
            .get(&peer.url)
            .map(|b| b.clone())
            .unwrap_or(PeerBehavior::Endorse);

        match behavior {
            PeerBehavior::Unreachable(message) => Err(Error::Transport(message)),
            PeerBehavior::Reject { status, message } => {
                self.state.proposals_sent.fetch_add(1, Ordering::SeqCst);
                Ok(ProposalResponse {
                    peer: peer.clone(),
                    status,
                    message,
                    payload: Vec::new(),
                    endorsement: Endorsement::default(),
                })
            }
            PeerBehavior::Endorse => {
                self.state.proposals_sent.fetch_add(1, Ordering::SeqCst);

                let mut hasher = Sha256::new();
                hasher.update(peer.url.as_bytes());
                hasher.update(&proposal.header);
                hasher.update(&proposal.payload);

                Ok(ProposalResponse {
                    peer: peer.clone(),
                    status: ENDORSEMENT_OK,
                    message: Some("OK".to_string()),
                    payload: proposal.tx_id.as_str().as_bytes().to_vec(),
                    endorsement: Endorsement {
                        endorser: peer.name.as_bytes().to_vec(),
                        signature: hasher.finalize().to_vec(),
                    },
                })
            }
        }
    }

    async fn send_transaction(&self, endorsement: &ValidatedEndorsement) -> Result<CommitOutcome> {
        let tx_id = endorsement.tx_id().to_string();
        self.state.commits_sent.fetch_add(1, Ordering::SeqCst);
        self.state.submitted_tx_ids.lock().push(tx_id.clone());

        let latency = *self.state.ordering_latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let behavior = self
            .state
            .ordering_script
            .lock()
            .pop_front()
            .unwrap_or(OrderingBehavior::Accept);
        self.state.commits_acknowledged.fetch_add(1, Ordering::SeqCst);

        match behavior {
            OrderingBehavior::Unreachable(message) => Err(Error::Transport(message)),
            OrderingBehavior::Reject(status) => Ok(CommitOutcome::failure(status)),
            OrderingBehavior::Accept => {
                let event = self
                    .state
                    .event_script
                    .lock()
                    .pop_front()
                    .unwrap_or_else(|| EventBehavior::deliver(TxValidationCode::Valid));
                let block_number = self.state.block_height.fetch_add(1, Ordering::SeqCst) + 1;
                let hub = self.state.hub(&self.name);

                tokio::spawn(async move {
                    match event {
                        EventBehavior::Deliver { code, delay } => {
                            if !delay.is_zero() {
                                tokio::time::sleep(delay).await;
                            }
                            hub.deliver(CommitEvent {
                                tx_id,
                                code,
                                block_number,
                            });
                        }
                        EventBehavior::StreamError(error) => {
                            hub.fail(&tx_id, error);
                        }
                        EventBehavior::Drop => {
                            debug!(tx_id = %tx_id, "Dropping commit event");
                        }
                    }
                });

                Ok(CommitOutcome::success())
            }
        }
    }
}

struct Listener {
    on_event: Arc<dyn Fn(CommitEvent) + Send + Sync>,
    on_error: Arc<dyn Fn(EventError) + Send + Sync>,
}

/// Event hub of one channel
pub struct MemoryEventHub {
    channel: String,
    listeners: DashMap<String, Listener>,
    registrations: AtomicUsize,
    unregistrations: AtomicUsize,
}

impl MemoryEventHub {
    /// Create hub
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            listeners: DashMap::new(),
            registrations: AtomicUsize::new(0),
            unregistrations: AtomicUsize::new(0),
        }
    }

    /// Emit a commit event; false if nobody was listening
    pub fn deliver(&self, event: CommitEvent) -> bool {
        // Clone out so the callback runs without holding the shard lock
        let callback = self
            .listeners
            .get(&event.tx_id)
            .map(|listener| listener.on_event.clone());

        match callback {
            Some(callback) => {
                callback(event);
                true
            }
            None => {
                warn!(
                    channel = %self.channel,
                    "Commit event for {} had no listener", event.tx_id
                );
                false
            }
        }
    }

    /// Report an error for one transaction; false if nobody was listening
    pub fn fail(&self, tx_id: &str, error: EventError) -> bool {
        let callback = self
            .listeners
            .get(tx_id)
            .map(|listener| listener.on_error.clone());

        match callback {
            Some(callback) => {
                callback(error);
                true
            }
            None => false,
        }
    }

    /// Register calls so far
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    /// Unregister calls so far
    pub fn unregistrations(&self) -> usize {
        self.unregistrations.load(Ordering::SeqCst)
    }

    /// Whether a listener exists for the transaction
    pub fn is_registered(&self, tx_id: &str) -> bool {
        self.listeners.contains_key(tx_id)
    }
}

impl EventHub for MemoryEventHub {
    fn register_tx_event(
        &self,
        tx_id: &str,
        on_event: TxEventCallback,
        on_error: TxErrorCallback,
    ) -> Result<()> {
        match self.listeners.entry(tx_id.to_string()) {
            Entry::Occupied(_) => {
                return Err(Error::InvalidRequest(format!(
                    "transaction {} already registered on {}",
                    tx_id, self.channel
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(Listener {
                    on_event: Arc::from(on_event),
                    on_error: Arc::from(on_error),
                });
            }
        }
        self.registrations.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    fn unregister_tx_event(&self, tx_id: &str) {
        self.unregistrations.fetch_add(1, Ordering::SeqCst);
        if self.listeners.remove(tx_id).is_none() {
            info!(channel = %self.channel, "No listener to remove for {}", tx_id);
        }
    }
}
