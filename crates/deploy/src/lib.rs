//! tracekit-deploy - Deployment library for the product traceability contracts on Starknet.
//!
//! A run validates a [`DeploymentPlan`], gates on [`Preflight`] checks, declares
//! and queues each contract through the [`ContractDeployer`], commits the
//! queue with the [`CallBatcher`] and finally merges the resulting addresses
//! into the [`DeploymentManifest`].

mod artifact;
pub use artifact::{ArtifactSet, ContractArtifact};

mod batcher;
pub use batcher::{CallBatcher, ExecutionReceipt};

pub mod chain;
pub use chain::{AccountCredentials, ChainClient, StarknetClient, TxStatus};

mod config;
pub use config::{
    CONFIG_FILENAME, DEVNET_ACCOUNT_ADDRESS, DEVNET_PRIVATE_KEY, DEVNET_RPC_URL, DeployConfig,
    ENV_PREFIX, Network, STRK_TOKEN_ADDRESS,
};

mod context;
pub use context::{RunContext, TxWaitConfig};

mod contract;
pub use contract::{
    AddressRegistry, ArgValue, ConstructorArg, ContractSpec, DeployedContract, PendingInvocation,
};

mod deployer;
pub use deployer::{ContractDeployer, UDC_ADDRESS, udc_deploy_call};

mod error;
pub use error::{DeployError, DeployResult};

mod fs;

mod manifest;
pub use manifest::{DeploymentManifest, ManifestEntry, ManifestExporter};

mod orchestrator;
pub use orchestrator::{Orchestrator, RunReport, RunState};

mod plan;
pub use plan::{ConfigurationStep, DeploymentPlan};

mod preflight;
pub use preflight::Preflight;

pub mod rpc;
