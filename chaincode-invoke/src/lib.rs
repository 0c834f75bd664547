//! Chaincode Invoke
//!
//! Submits a chaincode transaction to a permissioned ledger network and waits
//! until the network confirms it was committed.
//!
//! # Flow
//!
//! 1. **Endorsement**: Broadcast the proposal to every target peer
//! 2. **Validation**: Require status 200 from all of them
//! 3. **Ordering**: Send the endorsed transaction to the ordering service
//! 4. **Confirmation**: Wait for the commit event from the channel event hub
//!
//! Ordering and confirmation run concurrently and both must succeed. An MVCC
//! read conflict restarts the whole flow with a fresh transaction ID, up to
//! the retry budget.
//!
//! # Example
//!
//! ```no_run
//! use chaincode_invoke::{network::memory::MemoryNetwork, Config, InvokeRequest, Invoker};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> chaincode_invoke::Result<()> {
//!     let network = Arc::new(MemoryNetwork::new());
//!     let invoker = Invoker::new(network.clone(), network.clone(), network, Config::default())?;
//!
//!     let request = InvokeRequest::new(
//!         vec!["grpc://peer0.org1:7051".to_string()],
//!         "mychannel",
//!         "assets",
//!         "move",
//!     )
//!     .with_args(["a", "b", "10"])
//!     .with_identity("admin", "org1");
//!
//!     let tx_id = invoker.invoke_chaincode(&request).await?;
//!     println!("committed {}", tx_id);
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod broadcast;
pub mod commit;
pub mod config;
pub mod endorsement;
pub mod error;
pub mod event_monitor;
pub mod invoker;
pub mod metrics;
pub mod network;
pub mod retry;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, ErrorCode, Result};
pub use invoker::{InvokeRequest, Invoker};
pub use metrics::Metrics;
pub use retry::{RetryBudget, DEFAULT_RETRY_ATTEMPTS};
pub use types::{CommitConfirmation, CommitEvent, EventError, TransactionId, TxValidationCode};
