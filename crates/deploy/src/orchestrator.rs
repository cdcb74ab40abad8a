//! Drives a deployment run from preflight to manifest export.

use std::{
    collections::HashSet,
    fmt,
    path::PathBuf,
    time::Duration,
};

use starknet::core::types::{Call, Felt};

use crate::{
    batcher::{CallBatcher, ExecutionReceipt},
    chain::ChainClient,
    config::Network,
    context::RunContext,
    contract::{DeployedContract, PendingInvocation},
    deployer::ContractDeployer,
    error::DeployResult,
    manifest::ManifestExporter,
    plan::DeploymentPlan,
    preflight::Preflight,
};

/// Where a run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    PreflightOk,
    /// Deploying the i-th contract of the plan, starting at 1.
    Deploy(usize),
    Batched,
    Configured,
    Exported,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Init => write!(f, "INIT"),
            RunState::PreflightOk => write!(f, "PREFLIGHT_OK"),
            RunState::Deploy(index) => write!(f, "DEPLOY_{index}"),
            RunState::Batched => write!(f, "BATCHED"),
            RunState::Configured => write!(f, "CONFIGURED"),
            RunState::Exported => write!(f, "EXPORTED"),
            RunState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub network: Network,
    /// Every contract of the plan, in plan order.
    pub deployed: Vec<DeployedContract>,
    pub receipts: Vec<ExecutionReceipt>,
    pub configuration_receipts: Vec<ExecutionReceipt>,
    pub manifest_path: PathBuf,
}

impl RunReport {
    /// Contracts deployed by this run, as opposed to reused.
    pub fn newly_deployed(&self) -> impl Iterator<Item = &DeployedContract> {
        self.deployed.iter().filter(|c| !c.already_deployed)
    }

    /// Number of transactions sent by the deployment and configuration phases.
    pub fn transaction_count(&self) -> usize {
        self.receipts.len() + self.configuration_receipts.len()
    }
}

/// Runs a [`DeploymentPlan`] against one network.
pub struct Orchestrator<C> {
    ctx: RunContext<C>,
    plan: DeploymentPlan,
    rpc_url: String,
    chain_id: Felt,
    probe_timeout: Duration,
    batcher: CallBatcher,
    manifest_path: PathBuf,
    archive_previous: bool,
    state: RunState,
}

impl<C: ChainClient> Orchestrator<C> {
    pub fn new(
        ctx: RunContext<C>,
        plan: DeploymentPlan,
        rpc_url: impl Into<String>,
        chain_id: Felt,
        manifest_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            ctx,
            plan,
            rpc_url: rpc_url.into(),
            chain_id,
            probe_timeout: Duration::from_secs(10),
            batcher: CallBatcher::new(10),
            manifest_path: manifest_path.into(),
            archive_previous: false,
            state: RunState::Init,
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_max_calls_per_tx(mut self, max_calls_per_tx: usize) -> Self {
        self.batcher = CallBatcher::new(max_calls_per_tx);
        self
    }

    pub fn with_archive_previous(mut self, archive: bool) -> Self {
        self.archive_previous = archive;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn context(&self) -> &RunContext<C> {
        &self.ctx
    }

    /// Execute the run. The manifest is only written when every phase succeeded.
    pub async fn run(&mut self) -> DeployResult<RunReport> {
        tracing::info!(network = %self.ctx.network, contracts = self.plan.contracts.len(), "Starting deployment run");

        match self.drive().await {
            Ok(report) => Ok(report),
            Err(err) => {
                let failed_in = self.state;
                enter(&mut self.state, RunState::Failed);
                tracing::error!(state = %failed_in, error = %err, "Deployment run failed");
                if self.batcher.accepted_batches() > 0 {
                    tracing::error!(
                        accepted_batches = self.batcher.accepted_batches(),
                        manifest = %self.manifest_path.display(),
                        "Transactions of this run are already on-chain but the manifest was not updated, manual reconciliation required"
                    );
                }
                Err(err)
            }
        }
    }

    async fn drive(&mut self) -> DeployResult<RunReport> {
        self.plan.validate()?;

        let deployer = Preflight::new(
            &self.ctx.client,
            &self.rpc_url,
            self.chain_id,
            self.probe_timeout,
        )
        .run()
        .await?;
        self.ctx.deployer = Some(deployer);
        enter(&mut self.state, RunState::PreflightOk);

        let mut contract_deployer = ContractDeployer::default();
        contract_deployer
            .prefetch_declarations(&self.ctx, &self.plan.contracts)
            .await?;

        let mut deployed = Vec::with_capacity(self.plan.contracts.len());
        for (index, spec) in self.plan.contracts.iter().enumerate() {
            enter(&mut self.state, RunState::Deploy(index + 1));
            deployed.push(
                contract_deployer
                    .deploy(&mut self.ctx, &mut self.batcher, spec)
                    .await?,
            );
        }

        let receipts = self.batcher.execute(&self.ctx.client, &self.ctx.tx_wait).await?;
        enter(&mut self.state, RunState::Batched);

        let configuration_receipts = self.configure(&deployed).await?;
        enter(&mut self.state, RunState::Configured);

        ManifestExporter::new(&self.manifest_path)
            .archive_previous(self.archive_previous)
            .export(self.ctx.network, &deployed)?;
        enter(&mut self.state, RunState::Exported);

        Ok(RunReport {
            network: self.ctx.network,
            deployed,
            receipts,
            configuration_receipts,
            manifest_path: self.manifest_path.clone(),
        })
    }

    /// Run the configuration steps touching at least one newly deployed contract.
    async fn configure(
        &mut self,
        deployed: &[DeployedContract],
    ) -> DeployResult<Vec<ExecutionReceipt>> {
        let fresh: HashSet<&str> = deployed
            .iter()
            .filter(|c| !c.already_deployed)
            .map(|c| c.contract_name.as_str())
            .collect();

        for step in &self.plan.configuration {
            if !step.touches().any(|name| fresh.contains(name)) {
                tracing::debug!(contract = %step.contract_name, entrypoint = %step.entrypoint, "Configuration unchanged, skipping");
                continue;
            }

            let call = Call {
                to: self.ctx.registry.address_of(&step.contract_name, &step.contract_name)?,
                selector: step.selector()?,
                calldata: self.ctx.encode_args(&step.contract_name, &step.args)?,
            };
            tracing::info!(contract = %step.contract_name, entrypoint = %step.entrypoint, "Configuration call queued");
            self.batcher.enqueue(PendingInvocation {
                contract_name: step.contract_name.clone(),
                call,
            });
        }

        self.batcher.execute(&self.ctx.client, &self.ctx.tx_wait).await
    }
}

fn enter(state: &mut RunState, next: RunState) {
    tracing::info!(from = %state, to = %next, "Run state changed");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_display() {
        assert_eq!(RunState::Init.to_string(), "INIT");
        assert_eq!(RunState::PreflightOk.to_string(), "PREFLIGHT_OK");
        assert_eq!(RunState::Deploy(3).to_string(), "DEPLOY_3");
        assert_eq!(RunState::Exported.to_string(), "EXPORTED");
    }
}
