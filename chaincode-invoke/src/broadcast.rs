//! Proposal broadcast to endorsing peers

use crate::{
    network::Channel,
    types::{ProposalRequest, ProposalResponse, ProposalResponses},
    Error, Result,
};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

/// Sends one proposal to every target peer concurrently
pub struct ProposalBroadcaster {
    channel: Arc<dyn Channel>,
}

impl ProposalBroadcaster {
    /// Create new broadcaster
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self { channel }
    }

    /// Broadcast proposal and collect responses in target order
    ///
    /// A peer that cannot be reached yields a response with status -1
    /// instead of failing the broadcast; only a failure to build or sign the
    /// proposal itself is an error.
    pub async fn broadcast(&self, request: &ProposalRequest) -> Result<ProposalResponses> {
        if request.targets.is_empty() {
            return Err(Error::InvalidRequest(
                "proposal has no target peers".to_string(),
            ));
        }

        debug!(
            tx_id = %request.tx_id,
            channel = %request.channel_id,
            chaincode = %request.chaincode_id,
            fcn = %request.fcn,
            targets = request.targets.len(),
            "Sending transaction proposal"
        );

        let proposal = self.channel.build_proposal(request).await?;

        let sends = request.targets.iter().map(|peer| {
            let proposal = &proposal;
            async move {
                match self.channel.send_proposal(peer, proposal).await {
                    Ok(response) => response,
                    Err(e) => {
                        warn!("Proposal to {} failed: {}", peer, e);
                        ProposalResponse::unreachable(peer.clone(), e.to_string())
                    }
                }
            }
        });

        let responses = join_all(sends).await;

        Ok(ProposalResponses {
            responses,
            proposal,
        })
    }
}
