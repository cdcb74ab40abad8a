//! Error taxonomy of a deployment run.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the deployment components.
///
/// Every variant is fatal for the current run. None of them is retried by the
/// orchestrator: replaying a failed run is left to the operator, which is safe
/// because contracts already recorded in the manifest are reused.
#[derive(Error, Debug)]
pub enum DeployError {
    /// The deployer account is missing or misconfigured.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The RPC endpoint did not answer the liveness probe.
    #[error("RPC endpoint {url} is unavailable: {reason}")]
    NetworkUnavailable { url: String, reason: String },

    /// The configured account cannot produce a valid signature.
    #[error("deployer account {account} cannot sign transactions: {reason}")]
    Credential { account: String, reason: String },

    /// A deferred reference points to a contract not deployed earlier in the run.
    #[error(
        "contract `{contract}` references `{reference}`, which is not deployed earlier in this run"
    )]
    UnresolvedReference { contract: String, reference: String },

    /// Declaring or queueing the deployment of a contract failed.
    #[error("failed to deploy `{contract_name}`: {cause:#}")]
    Deployment {
        contract_name: String,
        cause: anyhow::Error,
    },

    /// A batch transaction reverted or could not be submitted.
    #[error("batch execution failed at `{contract_name}`{}: {reason}", fmt_tx(.transaction_hash))]
    BatchExecution {
        contract_name: String,
        transaction_hash: Option<String>,
        reason: String,
    },

    /// The manifest could not be read or written.
    #[error("failed to persist manifest at {}: {cause:#}", .path.display())]
    Persistence {
        path: PathBuf,
        cause: anyhow::Error,
    },
}

fn fmt_tx(hash: &Option<String>) -> String {
    hash.as_ref()
        .map(|h| format!(" (transaction {h})"))
        .unwrap_or_default()
}

impl DeployError {
    pub(crate) fn deployment(contract_name: &str, cause: anyhow::Error) -> Self {
        Self::Deployment {
            contract_name: contract_name.to_string(),
            cause,
        }
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, cause: anyhow::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            cause,
        }
    }
}

pub type DeployResult<T> = std::result::Result<T, DeployError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_error_mentions_transaction() {
        let err = DeployError::BatchExecution {
            contract_name: "ProductRegistry".to_string(),
            transaction_hash: Some("0xabc".to_string()),
            reason: "constructor reverted".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ProductRegistry"));
        assert!(msg.contains("transaction 0xabc"));
    }

    #[test]
    fn test_deployment_error_includes_cause_chain() {
        let cause = anyhow::anyhow!("class hash not found").context("declare failed");
        let err = DeployError::deployment("IdentityRegistry", cause);
        let msg = err.to_string();
        assert!(msg.contains("IdentityRegistry"));
        assert!(msg.contains("declare failed"));
        assert!(msg.contains("class hash not found"));
    }
}
