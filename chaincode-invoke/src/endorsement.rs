//! Endorsement validation
//!
//! Strict-all policy: every targeted peer must return status 200. One bad
//! response rejects the whole proposal, however many good ones came back.

use crate::{
    types::{ProposalResponses, ValidatedEndorsement},
    Error, Result,
};
use tracing::{debug, error, info};

/// Reason recorded for a bad response that carried no message
pub const BAD_PROPOSAL_MESSAGE: &str = "transaction proposal was bad";

/// Reason used when no response came back at all
pub const NO_VALID_RESPONSE_MESSAGE: &str =
    "Failed to send Proposal or receive valid response. Response null or status is not 200.";

/// Classifies the responses of one proposal broadcast
#[derive(Debug, Default, Clone, Copy)]
pub struct EndorsementValidator;

impl EndorsementValidator {
    /// Create new validator
    pub fn new() -> Self {
        Self
    }

    /// Accept the responses or reject the proposal
    pub fn validate(&self, responses: ProposalResponses) -> Result<ValidatedEndorsement> {
        let ProposalResponses {
            responses,
            proposal,
        } = responses;

        let mut last_error: Option<String> = None;
        for response in &responses {
            if response.is_good() {
                info!("transaction proposal was good (peer {})", response.peer.name);
            } else {
                error!(
                    peer = %response.peer,
                    status = response.status,
                    message = ?response.message,
                    "transaction proposal was bad"
                );
                last_error = Some(
                    response
                        .message
                        .clone()
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| BAD_PROPOSAL_MESSAGE.to_string()),
                );
            }
        }

        if let Some(reason) = last_error {
            return Err(Error::ProposalRejected { reason });
        }

        let Some(first) = responses.first() else {
            return Err(Error::ProposalRejected {
                reason: NO_VALID_RESPONSE_MESSAGE.to_string(),
            });
        };

        debug!(
            "Successfully sent Proposal and received ProposalResponse: Status - {}, message - \"{}\", metadata - \"{}\", endorsement signature: {}",
            first.status,
            first.message.as_deref().unwrap_or_default(),
            String::from_utf8_lossy(&first.payload),
            first.signature_base64()
        );

        Ok(ValidatedEndorsement::new(proposal, responses))
    }
}
