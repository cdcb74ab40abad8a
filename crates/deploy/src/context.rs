//! State shared by the components of a single deployment run.

use std::time::Duration;

use rand::Rng;
use starknet::core::{crypto::pedersen_hash, types::Felt, utils::starknet_keccak};

use crate::{
    artifact::ArtifactSet,
    chain::ChainClient,
    config::{DeployConfig, Network},
    contract::{AddressRegistry, ConstructorArg},
    error::DeployResult,
    manifest::DeploymentManifest,
};

/// How long and how often to poll a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxWaitConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for TxWaitConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(300),
        }
    }
}

impl From<&DeployConfig> for TxWaitConfig {
    fn from(config: &DeployConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            timeout: config.receipt_timeout(),
        }
    }
}

/// Everything a run needs, owned in one place and lent to each component.
///
/// The manifest is the snapshot read at run start; it is never written back
/// through the context.
pub struct RunContext<C> {
    pub client: C,
    pub network: Network,
    pub artifacts: ArtifactSet,
    pub manifest: DeploymentManifest,
    pub registry: AddressRegistry,
    /// Set once preflight has passed.
    pub deployer: Option<Felt>,
    /// Ignore the manifest and deploy every contract afresh.
    pub reset: bool,
    /// Fixed deployment salt, combined with each contract name. A random salt
    /// is drawn per contract when unset.
    pub salt: Option<Felt>,
    pub tx_wait: TxWaitConfig,
}

impl<C: ChainClient> RunContext<C> {
    pub fn new(
        client: C,
        network: Network,
        artifacts: ArtifactSet,
        manifest: DeploymentManifest,
    ) -> Self {
        Self {
            client,
            network,
            artifacts,
            manifest,
            registry: AddressRegistry::default(),
            deployer: None,
            reset: false,
            salt: None,
            tx_wait: TxWaitConfig::default(),
        }
    }

    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    pub fn with_salt(mut self, salt: Option<Felt>) -> Self {
        self.salt = salt;
        self
    }

    pub fn with_tx_wait(mut self, tx_wait: TxWaitConfig) -> Self {
        self.tx_wait = tx_wait;
        self
    }

    /// Encode `args` for `contract` against the registry and the deployer address.
    pub fn encode_args<'a>(
        &self,
        contract: &str,
        args: impl IntoIterator<Item = &'a ConstructorArg>,
    ) -> DeployResult<Vec<Felt>> {
        self.registry.encode_args(contract, self.deployer, args)
    }

    /// Salt for deploying `contract_name`.
    ///
    /// A fixed salt is mixed with the contract name so contracts sharing a
    /// class and calldata still land at distinct, reproducible addresses.
    pub(crate) fn salt_for(&self, contract_name: &str) -> Felt {
        match self.salt {
            Some(salt) => pedersen_hash(&salt, &starknet_keccak(contract_name.as_bytes())),
            None => Felt::from(rand::rng().random::<u64>()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::StarknetClient;

    fn ctx(salt: Option<Felt>) -> RunContext<StarknetClient> {
        let client = StarknetClient::new(
            "http://127.0.0.1:5050/rpc",
            Felt::ONE,
            None,
            Duration::from_secs(1),
        )
        .expect("Failed to build client");
        RunContext::new(
            client,
            Network::Devnet,
            ArtifactSet::default(),
            DeploymentManifest::default(),
        )
        .with_salt(salt)
    }

    #[test]
    fn test_fixed_salt_is_distinct_per_contract_and_reproducible() {
        let ctx = ctx(Some(Felt::from(42u64)));

        let a = ctx.salt_for("TokenA");
        assert_ne!(a, ctx.salt_for("TokenB"));
        assert_eq!(a, ctx.salt_for("TokenA"));
        assert_ne!(a, Felt::from(42u64));
    }
}
