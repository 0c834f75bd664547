//! Core types for chaincode invocation

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Status reported by a peer that successfully endorsed a proposal
pub const ENDORSEMENT_OK: i32 = 200;

/// Status used when a peer produced no response at all
pub const NO_RESPONSE_STATUS: i32 = -1;

/// Transaction identifier
///
/// Allocated by the channel for the submitting identity. The string form is
/// the correlation key shared by the proposal, the commit and the event
/// registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId {
    id: String,
    nonce: Vec<u8>,
}

impl TransactionId {
    /// Wrap an identifier issued by an external allocator
    pub fn new(id: impl Into<String>, nonce: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            nonce,
        }
    }

    /// Derive the identifier as hex(SHA-256(nonce || creator))
    pub fn derive(nonce: Vec<u8>, creator: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(&nonce);
        hasher.update(creator);
        let id = hex::encode(hasher.finalize());

        Self { id, nonce }
    }

    /// String form of the identifier
    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// Nonce the identifier was derived from
    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Addressable endorsing peer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    /// Peer name (host part of the URL)
    pub name: String,

    /// Peer URL
    pub url: String,
}

impl Peer {
    /// Create new peer handle
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.url)
    }
}

/// Transaction proposal sent to the endorsing peers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalRequest {
    /// Target peers, in caller order
    pub targets: Vec<Peer>,

    /// Channel ID
    pub channel_id: String,

    /// Chaincode ID
    pub chaincode_id: String,

    /// Chaincode function name
    pub fcn: String,

    /// Chaincode arguments
    pub args: Vec<String>,

    /// Transaction ID for this attempt
    pub tx_id: TransactionId,
}

/// Signed proposal metadata that must accompany the endorsements to the orderer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Transaction ID
    pub tx_id: TransactionId,

    /// Channel ID
    pub channel_id: String,

    /// Chaincode ID
    pub chaincode_id: String,

    /// Serialized proposal header
    pub header: Vec<u8>,

    /// Serialized proposal payload
    pub payload: Vec<u8>,
}

/// Endorsement attached to a proposal response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endorsement {
    /// Serialized identity of the endorsing peer
    pub endorser: Vec<u8>,

    /// Endorsement signature
    pub signature: Vec<u8>,
}

/// Response of one peer to a transaction proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalResponse {
    /// Responding peer
    pub peer: Peer,

    /// Response status (200 on successful endorsement)
    pub status: i32,

    /// Response message
    pub message: Option<String>,

    /// Chaincode response payload
    pub payload: Vec<u8>,

    /// Endorsement over the simulated read/write set
    pub endorsement: Endorsement,
}

impl ProposalResponse {
    /// Response of a peer that could not be reached or returned nothing
    pub fn unreachable(peer: Peer, message: impl Into<String>) -> Self {
        Self {
            peer,
            status: NO_RESPONSE_STATUS,
            message: Some(message.into()),
            payload: Vec::new(),
            endorsement: Endorsement::default(),
        }
    }

    /// Whether the peer endorsed the proposal
    pub fn is_good(&self) -> bool {
        self.status == ENDORSEMENT_OK
    }

    /// Endorsement signature, base64-encoded
    pub fn signature_base64(&self) -> String {
        BASE64.encode(&self.endorsement.signature)
    }
}

/// Responses collected by one proposal broadcast
#[derive(Debug, Clone)]
pub struct ProposalResponses {
    /// Responses in target order
    pub responses: Vec<ProposalResponse>,

    /// Proposal the responses refer to
    pub proposal: Proposal,
}

/// Endorsement set that passed validation
///
/// Only the endorsement validator produces this value, so holding one means
/// every peer endorsed the proposal.
#[derive(Debug, Clone)]
pub struct ValidatedEndorsement {
    proposal: Proposal,
    responses: Vec<ProposalResponse>,
}

impl ValidatedEndorsement {
    pub(crate) fn new(proposal: Proposal, responses: Vec<ProposalResponse>) -> Self {
        Self {
            proposal,
            responses,
        }
    }

    /// Proposal metadata
    pub fn proposal(&self) -> &Proposal {
        &self.proposal
    }

    /// Endorsing responses in target order
    pub fn responses(&self) -> &[ProposalResponse] {
        &self.responses
    }

    /// Transaction ID
    pub fn tx_id(&self) -> &TransactionId {
        &self.proposal.tx_id
    }
}

/// Ordering service acknowledgment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommitStatus {
    /// Accepted for ordering
    Success,
    /// Rejected by the ordering service
    Failure,
}

/// Ordering service acknowledgment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutcome {
    /// Status
    pub status: CommitStatus,

    /// Status detail (orderer status code on failure)
    pub status_detail: String,
}

impl CommitOutcome {
    /// Accepted outcome
    pub fn success() -> Self {
        Self {
            status: CommitStatus::Success,
            status_detail: "SUCCESS".to_string(),
        }
    }

    /// Rejected outcome
    pub fn failure(status_detail: impl Into<String>) -> Self {
        Self {
            status: CommitStatus::Failure,
            status_detail: status_detail.into(),
        }
    }

    /// Whether the orderer accepted the transaction
    pub fn is_success(&self) -> bool {
        self.status == CommitStatus::Success
    }
}

/// Validation code assigned to a transaction by the committing peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxValidationCode {
    /// Committed
    Valid,
    /// Read set invalidated by a concurrent write
    MvccReadConflict,
    /// Range query results changed before commit
    PhantomReadConflict,
    /// Endorsements do not satisfy the endorsement policy
    EndorsementPolicyFailure,
    /// Transaction ID already used
    DuplicateTxid,
    /// Malformed payload
    BadPayload,
    /// Any code this client does not know
    Unknown,
}

impl TxValidationCode {
    /// Wire name of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            TxValidationCode::Valid => "VALID",
            TxValidationCode::MvccReadConflict => "MVCC_READ_CONFLICT",
            TxValidationCode::PhantomReadConflict => "PHANTOM_READ_CONFLICT",
            TxValidationCode::EndorsementPolicyFailure => "ENDORSEMENT_POLICY_FAILURE",
            TxValidationCode::DuplicateTxid => "DUPLICATE_TXID",
            TxValidationCode::BadPayload => "BAD_PAYLOAD",
            TxValidationCode::Unknown => "UNKNOWN",
        }
    }

    /// Transaction was committed
    pub fn is_valid(&self) -> bool {
        *self == TxValidationCode::Valid
    }

    /// Transient optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        *self == TxValidationCode::MvccReadConflict
    }
}

impl fmt::Display for TxValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxValidationCode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "VALID" => TxValidationCode::Valid,
            "MVCC_READ_CONFLICT" => TxValidationCode::MvccReadConflict,
            "PHANTOM_READ_CONFLICT" => TxValidationCode::PhantomReadConflict,
            "ENDORSEMENT_POLICY_FAILURE" => TxValidationCode::EndorsementPolicyFailure,
            "DUPLICATE_TXID" => TxValidationCode::DuplicateTxid,
            "BAD_PAYLOAD" => TxValidationCode::BadPayload,
            _ => TxValidationCode::Unknown,
        })
    }
}

/// Commit notification delivered by the event hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEvent {
    /// Transaction ID
    pub tx_id: String,

    /// Validation code
    pub code: TxValidationCode,

    /// Block the transaction landed in
    pub block_number: u64,
}

/// Error reported by the event hub for a registered transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventError {
    /// Error message
    pub message: String,

    /// Validation code, when the hub attached one
    pub code: Option<TxValidationCode>,
}

impl EventError {
    /// Create new event error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Attach validation code
    pub fn with_code(mut self, code: TxValidationCode) -> Self {
        self.code = Some(code);
        self
    }
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

/// Network-wide commit confirmation for one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitConfirmation {
    /// Transaction ID
    pub tx_id: String,

    /// Block the transaction landed in
    pub block_number: u64,

    /// When the event was received
    pub received_at: DateTime<Utc>,
}
