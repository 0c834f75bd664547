//! Submission orchestrator
//!
//! One invocation runs attempts until one succeeds or fails for a reason
//! other than an MVCC read conflict. Each attempt:
//!
//! ```text
//! allocate tx id ─► broadcast ─► validate ─► arm event listener
//!                                                   │
//!                              ┌────────────────────┴──────────┐
//!                              ▼                               ▼
//!                       submit to orderer              wait for commit event
//!                              └────────────────┬──────────────┘
//!                                               ▼
//!                                        join ─► outcome
//! ```
//!
//! The commit runs as a spawned task. When the event branch fails first with
//! a retryable conflict, the attempt waits for the submission to finish before
//! the next one starts, so attempts never overlap. On terminal failures the
//! submission is left to finish and its outcome is discarded.

use crate::{
    broadcast::ProposalBroadcaster,
    commit::CommitSubmitter,
    config::Config,
    endorsement::EndorsementValidator,
    event_monitor::CommitEventMonitor,
    metrics::Metrics,
    network::{Channel, ChannelResolver, EventHub, EventHubFactory, PeerResolver},
    retry::{RetryBudget, RetryController},
    types::{CommitOutcome, Peer, ProposalRequest},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Caller parameters for one invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeRequest {
    /// Endorsing peer URLs
    pub peer_urls: Vec<String>,

    /// Channel ID
    pub channel_id: String,

    /// Chaincode ID
    pub chaincode_id: String,

    /// Chaincode function
    pub fcn: String,

    /// Chaincode arguments
    pub args: Vec<String>,

    /// Submitting user
    pub username: String,

    /// Organization of the submitting user
    pub org: String,

    /// Retry budget (falls back to the configured default)
    pub retry_attempts: Option<u32>,
}

impl InvokeRequest {
    /// Create request with no arguments and the default retry budget
    pub fn new(
        peer_urls: Vec<String>,
        channel_id: impl Into<String>,
        chaincode_id: impl Into<String>,
        fcn: impl Into<String>,
    ) -> Self {
        Self {
            peer_urls,
            channel_id: channel_id.into(),
            chaincode_id: chaincode_id.into(),
            fcn: fcn.into(),
            args: Vec::new(),
            username: String::new(),
            org: String::new(),
            retry_attempts: None,
        }
    }

    /// Set chaincode arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set submitting identity
    pub fn with_identity(mut self, username: impl Into<String>, org: impl Into<String>) -> Self {
        self.username = username.into();
        self.org = org.into();
        self
    }

    /// Set retry budget
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }
}

/// Submits chaincode transactions and waits for their commit
pub struct Invoker {
    peers: Arc<dyn PeerResolver>,
    channels: Arc<dyn ChannelResolver>,
    event_hubs: Arc<dyn EventHubFactory>,
    validator: EndorsementValidator,
    config: Config,
    metrics: Metrics,
}

/// Resolved collaborators for one invocation
struct Session {
    channel: Arc<dyn Channel>,
    hub: Arc<dyn EventHub>,
    targets: Vec<Peer>,
}

impl Invoker {
    /// Create new invoker
    pub fn new(
        peers: Arc<dyn PeerResolver>,
        channels: Arc<dyn ChannelResolver>,
        event_hubs: Arc<dyn EventHubFactory>,
        config: Config,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            peers,
            channels,
            event_hubs,
            validator: EndorsementValidator::new(),
            config,
            metrics: Metrics::new()?,
        })
    }

    /// Metrics collected by this invoker
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Invoke chaincode and return the committed transaction ID
    pub async fn invoke_chaincode(&self, request: &InvokeRequest) -> Result<String> {
        let started = Instant::now();
        let invocation_id = Uuid::new_v4();

        let result = self
            .run(request)
            .instrument(info_span!("invoke", %invocation_id, channel = %request.channel_id))
            .await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.code().as_str(),
        };
        self.metrics.record_outcome(outcome, started.elapsed());

        result
    }

    async fn run(&self, request: &InvokeRequest) -> Result<String> {
        info!(
            "============ invoke transaction as {}@{} ============",
            request.username, request.org
        );

        let session = self.open_session(request).await?;
        let budget = request
            .retry_attempts
            .unwrap_or(self.config.default_retry_attempts);
        let mut retry = RetryController::new(RetryBudget::new(budget));
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.metrics.record_attempt();

            match self.attempt(&session, request, attempt).await {
                Ok(tx_id) => return Ok(tx_id),
                Err(e) if retry.should_retry(&e) => {
                    warn!(
                        attempt,
                        remaining = retry.budget().remaining(),
                        "Attempt hit an MVCC read conflict, retrying: {}", e
                    );
                    self.metrics.record_retry();
                }
                Err(e) => {
                    error!(attempt, code = %e.code(), "Invoke failed: {}", e);
                    return Err(e);
                }
            }
        }
    }

    async fn open_session(&self, request: &InvokeRequest) -> Result<Session> {
        let targets = self.peers.new_peers(&request.peer_urls)?;
        let channel = self
            .channels
            .channel_for_org(&request.channel_id, &request.username, &request.org)
            .await?;
        let hub = self.event_hubs.listen_channel(&channel)?;

        Ok(Session {
            channel,
            hub,
            targets,
        })
    }

    /// One pass from identity allocation to joined outcome
    async fn attempt(
        &self,
        session: &Session,
        request: &InvokeRequest,
        attempt: u32,
    ) -> Result<String> {
        let tx_id = session.channel.new_transaction_id()?;
        debug!(attempt, tx_id = %tx_id, "Allocated transaction ID");

        let proposal_request = ProposalRequest {
            targets: session.targets.clone(),
            channel_id: request.channel_id.clone(),
            chaincode_id: request.chaincode_id.clone(),
            fcn: request.fcn.clone(),
            args: request.args.clone(),
            tx_id: tx_id.clone(),
        };

        let responses = ProposalBroadcaster::new(session.channel.clone())
            .broadcast(&proposal_request)
            .await?;
        let endorsement = self.validator.validate(responses)?;

        // Listener and deadline must exist before the commit leaves
        let monitor = CommitEventMonitor::new(session.hub.clone(), self.config.event_wait_time());
        let pending = monitor.arm(&tx_id)?;
        let armed_at = Instant::now();

        let submitter = CommitSubmitter::new(session.channel.clone());
        let mut submission = tokio::spawn(async move { submitter.submit(&endorsement).await });

        let ordering = async {
            let outcome: Result<CommitOutcome> = match (&mut submission).await {
                Ok(result) => result,
                Err(e) => Err(Error::Transport(format!("commit submission aborted: {}", e))),
            };
            match outcome {
                Ok(outcome) if outcome.is_success() => Ok(outcome),
                Ok(outcome) => Err(Error::OrderingFailed {
                    status: outcome.status_detail,
                }),
                Err(e) => Err(e),
            }
        };

        let joined = tokio::try_join!(ordering, pending.wait());
        self.metrics.record_event_wait(armed_at.elapsed());
        let (_outcome, confirmation) = match joined {
            Ok(joined) => joined,
            Err(e) => {
                if e.is_retryable() && !submission.is_finished() {
                    debug!(tx_id = %tx_id, "Waiting for in-flight commit before retrying");
                    match submission.await {
                        Ok(Ok(outcome)) => debug!(
                            tx_id = %tx_id,
                            "Discarding orderer outcome {}", outcome.status_detail
                        ),
                        Ok(Err(commit_err)) => {
                            warn!(tx_id = %tx_id, "In-flight commit failed: {}", commit_err)
                        }
                        Err(join_err) => {
                            warn!(tx_id = %tx_id, "In-flight commit aborted: {}", join_err)
                        }
                    }
                }
                return Err(e);
            }
        };

        debug!(
            tx_id = %tx_id,
            block = confirmation.block_number,
            "event promise all complete"
        );
        info!(tx_id = %tx_id, attempt, "Transaction committed");

        Ok(tx_id.to_string())
    }
}
