//! Commit submission to the ordering service

use crate::{
    network::Channel,
    types::{CommitOutcome, ValidatedEndorsement},
    Result,
};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Submits validated endorsements for ordering
pub struct CommitSubmitter {
    channel: Arc<dyn Channel>,
}

impl CommitSubmitter {
    /// Create new submitter
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self { channel }
    }

    /// Single round trip to the ordering service
    ///
    /// An orderer rejection comes back as `Ok` with [`CommitStatus::Failure`];
    /// only transport failures are errors.
    ///
    /// [`CommitStatus::Failure`]: crate::types::CommitStatus::Failure
    pub async fn submit(&self, endorsement: &ValidatedEndorsement) -> Result<CommitOutcome> {
        debug!(
            tx_id = %endorsement.tx_id(),
            endorsements = endorsement.responses().len(),
            "Committing transaction"
        );

        let outcome = self.channel.send_transaction(endorsement).await?;

        if outcome.is_success() {
            info!(tx_id = %endorsement.tx_id(), "Successfully sent transaction to the orderer.");
        } else {
            error!(
                tx_id = %endorsement.tx_id(),
                "Failed to order the transaction. Error code: {}", outcome.status_detail
            );
        }

        Ok(outcome)
    }
}
