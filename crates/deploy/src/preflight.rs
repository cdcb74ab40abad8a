//! Checks gating every deployment run.
//!
//! Nothing is declared or deployed unless the deployer account is configured,
//! the RPC endpoint answers and the account can sign.

use std::time::Duration;

use starknet::core::types::Felt;

use crate::{
    chain::ChainClient,
    error::{DeployError, DeployResult},
};

/// Preflight checks against one chain client.
pub struct Preflight<'a, C> {
    client: &'a C,
    rpc_url: &'a str,
    expected_chain_id: Felt,
    probe_timeout: Duration,
}

impl<'a, C: ChainClient> Preflight<'a, C> {
    pub fn new(
        client: &'a C,
        rpc_url: &'a str,
        expected_chain_id: Felt,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            client,
            rpc_url,
            expected_chain_id,
            probe_timeout,
        }
    }

    /// Fails when no deployer account is configured.
    pub async fn assert_deployer_defined(&self) -> DeployResult<Felt> {
        self.client.account_address().ok_or_else(|| {
            DeployError::Configuration(
                "no deployer account configured, set the account address and private key"
                    .to_string(),
            )
        })
    }

    /// Fails when the RPC endpoint does not answer within the probe timeout,
    /// or answers for another chain.
    pub async fn assert_rpc_network_active(&self) -> DeployResult<()> {
        let unavailable = |reason: String| DeployError::NetworkUnavailable {
            url: self.rpc_url.to_string(),
            reason,
        };

        let chain_id = tokio::time::timeout(self.probe_timeout, self.client.probe())
            .await
            .map_err(|_| unavailable(format!("no answer within {:?}", self.probe_timeout)))?
            .map_err(|e| unavailable(format!("{e:#}")))?;

        if chain_id != self.expected_chain_id {
            return Err(DeployError::Configuration(format!(
                "RPC endpoint {} serves chain {:#x}, expected {:#x}",
                self.rpc_url, chain_id, self.expected_chain_id
            )));
        }

        tracing::debug!(url = %self.rpc_url, chain_id = %format!("{:#x}", chain_id), "RPC endpoint is active");
        Ok(())
    }

    /// Fails when the configured account cannot sign.
    pub async fn assert_deployer_signable(&self) -> DeployResult<()> {
        let account = self
            .client
            .account_address()
            .map(|a| format!("{:#066x}", a))
            .unwrap_or_else(|| "<undefined>".to_string());

        self.client
            .check_signer()
            .await
            .map_err(|e| DeployError::Credential {
                account,
                reason: format!("{e:#}"),
            })
    }

    /// Run the three checks concurrently.
    ///
    /// Waits for all of them to settle, logs every failure and returns the first
    /// one in the order: deployer defined, RPC active, deployer signable.
    pub async fn run(&self) -> DeployResult<Felt> {
        let (defined, active, signable) = tokio::join!(
            self.assert_deployer_defined(),
            self.assert_rpc_network_active(),
            self.assert_deployer_signable(),
        );

        for err in [defined.as_ref().err(), active.as_ref().err(), signable.as_ref().err()]
            .into_iter()
            .flatten()
        {
            tracing::error!(error = %err, "Preflight check failed");
        }

        let deployer = defined?;
        active?;
        signable?;

        tracing::info!(
            deployer = %format!("{:#066x}", deployer),
            url = %self.rpc_url,
            "Preflight checks passed"
        );
        Ok(deployer)
    }
}
