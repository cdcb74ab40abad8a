//! The seam between the orchestrator and a Starknet network.
//!
//! Every component talks to the chain through [`ChainClient`], so a run can be
//! driven against a live node ([`StarknetClient`]) or an in-memory chain in tests.

use std::future::Future;

use anyhow::Result;
use starknet::core::types::{Call, Felt};

use crate::artifact::ContractArtifact;

mod provider;
pub use provider::{AccountCredentials, StarknetClient};

/// Status of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// Not yet included in a block.
    Pending,
    /// Accepted and executed successfully.
    Accepted,
    /// Included but reverted.
    Reverted { reason: String },
}

/// Read and write primitives consumed by the deployment components.
pub trait ChainClient: Send + Sync {
    /// The deployer account address, if one is configured.
    fn account_address(&self) -> Option<Felt>;

    /// Liveness probe. Returns the chain id reported by the endpoint.
    fn probe(&self) -> impl Future<Output = Result<Felt>> + Send;

    /// Check that the configured account can produce a valid signature.
    fn check_signer(&self) -> impl Future<Output = Result<()>> + Send;

    /// Class hash deployed at `address`, or `None` when no contract lives there.
    fn class_hash_at(&self, address: Felt) -> impl Future<Output = Result<Option<Felt>>> + Send;

    /// Whether `class_hash` is already declared.
    fn is_declared(&self, class_hash: Felt) -> impl Future<Output = Result<bool>> + Send;

    /// Submit a declare transaction, returning its hash.
    fn declare(&self, artifact: &ContractArtifact) -> impl Future<Output = Result<Felt>> + Send;

    /// Submit `calls` as a single multicall transaction, returning its hash.
    fn execute(&self, calls: Vec<Call>) -> impl Future<Output = Result<Felt>> + Send;

    /// Estimate the fee of `calls` without submitting them. Fails when they would revert.
    fn estimate(&self, calls: Vec<Call>) -> impl Future<Output = Result<()>> + Send;

    /// Current status of a submitted transaction.
    fn transaction_status(&self, tx_hash: Felt) -> impl Future<Output = Result<TxStatus>> + Send;
}
