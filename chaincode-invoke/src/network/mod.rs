//! Collaborator interfaces for reaching the ledger network
//!
//! The invoker never talks to peers, orderers or event hubs directly. It is
//! handed implementations of these traits, which own connections, identities
//! and topology:
//!
//! - [`PeerResolver`] turns peer URLs into target handles
//! - [`ChannelResolver`] binds a channel to the submitting identity
//! - [`Channel`] allocates transaction IDs, delivers proposals and commits
//! - [`EventHubFactory`] / [`EventHub`] deliver commit events per transaction
//!
//! [`memory`] provides an in-process network implementing all of them.

pub mod memory;

use crate::{
    types::{
        CommitEvent, CommitOutcome, EventError, Peer, Proposal, ProposalRequest,
        ProposalResponse, TransactionId, ValidatedEndorsement,
    },
    Result,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Callback invoked with the commit event for a registered transaction
pub type TxEventCallback = Box<dyn Fn(CommitEvent) + Send + Sync>;

/// Callback invoked when the hub fails for a registered transaction
pub type TxErrorCallback = Box<dyn Fn(EventError) + Send + Sync>;

/// Channel bound to a submitting identity
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name
    fn name(&self) -> &str;

    /// Allocate a fresh transaction ID for the bound identity
    fn new_transaction_id(&self) -> Result<TransactionId>;

    /// Build and sign the proposal for a request
    async fn build_proposal(&self, request: &ProposalRequest) -> Result<Proposal>;

    /// Send a signed proposal to one peer
    async fn send_proposal(&self, peer: &Peer, proposal: &Proposal) -> Result<ProposalResponse>;

    /// Send endorsed transaction to the ordering service
    async fn send_transaction(&self, endorsement: &ValidatedEndorsement) -> Result<CommitOutcome>;
}

/// Commit event subscription for one channel
pub trait EventHub: Send + Sync {
    /// Register interest in the commit of one transaction
    fn register_tx_event(
        &self,
        tx_id: &str,
        on_event: TxEventCallback,
        on_error: TxErrorCallback,
    ) -> Result<()>;

    /// Drop interest in one transaction
    fn unregister_tx_event(&self, tx_id: &str);
}

/// Resolves peer URLs into target handles
pub trait PeerResolver: Send + Sync {
    /// Create peer handles, preserving order
    fn new_peers(&self, urls: &[String]) -> Result<Vec<Peer>>;
}

/// Resolves a channel for a user of an organization
#[async_trait]
pub trait ChannelResolver: Send + Sync {
    /// Get channel bound to `username@org`
    async fn channel_for_org(
        &self,
        channel_id: &str,
        username: &str,
        org: &str,
    ) -> Result<Arc<dyn Channel>>;
}

/// Opens commit event subscriptions
pub trait EventHubFactory: Send + Sync {
    /// Event hub for a channel
    fn listen_channel(&self, channel: &Arc<dyn Channel>) -> Result<Arc<dyn EventHub>>;
}
