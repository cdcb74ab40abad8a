//! In-memory Starknet used to drive the orchestrator in tests.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result};
use starknet::core::{
    types::{Call, Felt},
    utils::get_contract_address,
};
use tracekit_deploy::{
    ArtifactSet, ChainClient, ContractArtifact, DeploymentManifest, DeploymentPlan, Network,
    Orchestrator, RunContext, TxStatus, TxWaitConfig, UDC_ADDRESS,
};

pub const DEPLOYER: Felt = Felt::from_hex_unchecked("0xd3");
pub const CHAIN_ID: Felt = Felt::from_hex_unchecked("0x534e5f5345504f4c4941");
pub const REWARD_TOKEN: Felt = Felt::from_hex_unchecked("0x5757");
pub const RPC_URL: &str = "http://127.0.0.1:5050/rpc";

/// Class hash used for the artifact of `class_name`.
pub fn class_hash(class_name: &str) -> Felt {
    let offset = match class_name {
        "IdentityRegistry" => 1u64,
        "RewardManager" => 2,
        "ProductRegistry" => 3,
        "ReturnManager" => 4,
        _ => 99,
    };
    Felt::from(0xc1a55000u64 + offset)
}

pub fn artifact(class_name: &str) -> ContractArtifact {
    ContractArtifact {
        class_name: class_name.to_string(),
        class_hash: class_hash(class_name),
        compiled_class_hash: class_hash(class_name) + Felt::ONE,
        sierra_path: PathBuf::from(format!("contracts_{class_name}.contract_class.json")),
    }
}

pub fn artifacts_for(plan: &DeploymentPlan) -> ArtifactSet {
    plan.classes().into_iter().map(artifact).collect()
}

/// Counters of every chain interaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub probes: usize,
    pub signer_checks: usize,
    pub class_queries: usize,
    pub declared_queries: usize,
    pub declares: usize,
    pub executes: usize,
    pub estimates: usize,
}

impl CallCounts {
    /// Transactions sent to the chain.
    pub fn writes(&self) -> usize {
        self.declares + self.executes
    }
}

#[derive(Debug, Default)]
struct ChainState {
    declared: HashSet<Felt>,
    contracts: HashMap<Felt, Felt>,
    transactions: HashMap<Felt, TxStatus>,
    /// Number of `Pending` answers left before a transaction reports its outcome.
    pending_polls: HashMap<Felt, usize>,
    /// Every call of every accepted multicall, in order.
    invoked: Vec<Call>,
    reverting_classes: HashSet<Felt>,
    failing_declares: HashSet<Felt>,
    counts: CallCounts,
    next_tx: u64,
}

impl ChainState {
    fn new_tx(&mut self, status: TxStatus) -> Felt {
        self.next_tx += 1;
        let hash = Felt::from(0x7000u64 + self.next_tx);
        self.transactions.insert(hash, status);
        self.pending_polls.insert(hash, 1);
        hash
    }

    /// Apply `calls` to a copy of the deployed contracts, failing on the first invalid one.
    fn simulate(&self, calls: &[Call]) -> Result<HashMap<Felt, Felt>> {
        let mut contracts = self.contracts.clone();
        for (index, call) in calls.iter().enumerate() {
            if call.to == UDC_ADDRESS {
                let [class_hash, salt, _unique, len, ctor @ ..] = call.calldata.as_slice() else {
                    anyhow::bail!("call {index}: malformed UDC calldata");
                };
                anyhow::ensure!(
                    Felt::from(ctor.len()) == *len,
                    "call {index}: constructor length mismatch"
                );
                anyhow::ensure!(
                    self.declared.contains(class_hash),
                    "call {index}: class {class_hash:#x} is not declared"
                );
                anyhow::ensure!(
                    !self.reverting_classes.contains(class_hash),
                    "call {index}: constructor of {class_hash:#x} panicked"
                );
                let address = get_contract_address(*salt, *class_hash, ctor, Felt::ZERO);
                anyhow::ensure!(
                    contracts.insert(address, *class_hash).is_none(),
                    "call {index}: address {address:#x} is already taken"
                );
            } else {
                anyhow::ensure!(
                    contracts.contains_key(&call.to),
                    "call {index}: no contract at {:#x}",
                    call.to
                );
            }
        }
        Ok(contracts)
    }
}

/// A shared handle on an in-memory chain. Clones see the same state.
#[derive(Clone)]
pub struct MockChain {
    account: Option<Felt>,
    chain_id: Felt,
    signer_fails: bool,
    probe_delay: Option<Duration>,
    state: Arc<Mutex<ChainState>>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            account: Some(DEPLOYER),
            chain_id: CHAIN_ID,
            signer_fails: false,
            probe_delay: None,
            state: Arc::default(),
        }
    }
}

impl MockChain {
    pub fn without_account(mut self) -> Self {
        self.account = None;
        self
    }

    pub fn with_chain_id(mut self, chain_id: Felt) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn with_failing_signer(mut self) -> Self {
        self.signer_fails = true;
        self
    }

    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = Some(delay);
        self
    }

    /// Deployments of `class_hash` revert from now on.
    pub fn revert_deployments_of(&self, class_hash: Felt) {
        self.lock().reverting_classes.insert(class_hash);
    }

    /// Declarations of `class_hash` are rejected by the node.
    pub fn fail_declare_of(&self, class_hash: Felt) {
        self.lock().failing_declares.insert(class_hash);
    }

    pub fn predeclare(&self, class_hash: Felt) {
        self.lock().declared.insert(class_hash);
    }

    pub fn counts(&self) -> CallCounts {
        self.lock().counts.clone()
    }

    pub fn contract_at(&self, address: Felt) -> Option<Felt> {
        self.lock().contracts.get(&address).copied()
    }

    pub fn invoked(&self) -> Vec<Call> {
        self.lock().invoked.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().expect("chain state poisoned")
    }
}

impl ChainClient for MockChain {
    fn account_address(&self) -> Option<Felt> {
        self.account
    }

    async fn probe(&self) -> Result<Felt> {
        self.lock().counts.probes += 1;
        if let Some(delay) = self.probe_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.chain_id)
    }

    async fn check_signer(&self) -> Result<()> {
        self.lock().counts.signer_checks += 1;
        let account = self.account.context("No deployer account configured")?;
        if self.signer_fails {
            anyhow::bail!("Key for {:#x} is unavailable", account);
        }
        Ok(())
    }

    async fn class_hash_at(&self, address: Felt) -> Result<Option<Felt>> {
        let mut state = self.lock();
        state.counts.class_queries += 1;
        Ok(state.contracts.get(&address).copied())
    }

    async fn is_declared(&self, class_hash: Felt) -> Result<bool> {
        let mut state = self.lock();
        state.counts.declared_queries += 1;
        Ok(state.declared.contains(&class_hash))
    }

    async fn declare(&self, artifact: &ContractArtifact) -> Result<Felt> {
        let mut state = self.lock();
        state.counts.declares += 1;
        if state.failing_declares.contains(&artifact.class_hash) {
            anyhow::bail!("Declare of {} rejected: insufficient fee", artifact.class_name);
        }
        anyhow::ensure!(
            state.declared.insert(artifact.class_hash),
            "Class {} is already declared",
            artifact.class_name
        );
        Ok(state.new_tx(TxStatus::Accepted))
    }

    async fn execute(&self, calls: Vec<Call>) -> Result<Felt> {
        let mut state = self.lock();
        state.counts.executes += 1;
        let status = match state.simulate(&calls) {
            Ok(contracts) => {
                state.contracts = contracts;
                state.invoked.extend(calls);
                TxStatus::Accepted
            }
            Err(e) => TxStatus::Reverted {
                reason: format!("{e:#}"),
            },
        };
        Ok(state.new_tx(status))
    }

    async fn estimate(&self, calls: Vec<Call>) -> Result<()> {
        let mut state = self.lock();
        state.counts.estimates += 1;
        state.simulate(&calls).map(|_| ())
    }

    async fn transaction_status(&self, tx_hash: Felt) -> Result<TxStatus> {
        let mut state = self.lock();
        if let Some(remaining) = state.pending_polls.get_mut(&tx_hash).filter(|n| **n > 0) {
            *remaining -= 1;
            return Ok(TxStatus::Pending);
        }
        state
            .transactions
            .get(&tx_hash)
            .cloned()
            .with_context(|| format!("Unknown transaction {:#x}", tx_hash))
    }
}

/// Initialize tracing for tests (idempotent).
pub fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init()
        .ok();
}

/// Build an orchestrator for `plan` against `chain`, persisting to `manifest_path`.
pub fn orchestrator(
    chain: &MockChain,
    plan: DeploymentPlan,
    manifest_path: &Path,
) -> Orchestrator<MockChain> {
    orchestrator_with(chain, plan, manifest_path, |ctx| ctx)
}

/// Like [`orchestrator`], with `configure` applied to the run context.
pub fn orchestrator_with(
    chain: &MockChain,
    plan: DeploymentPlan,
    manifest_path: &Path,
    configure: impl FnOnce(RunContext<MockChain>) -> RunContext<MockChain>,
) -> Orchestrator<MockChain> {
    init_test_tracing();

    let manifest = DeploymentManifest::load(manifest_path).expect("Failed to load manifest");
    let ctx = RunContext::new(chain.clone(), Network::Sepolia, artifacts_for(&plan), manifest)
        .with_tx_wait(TxWaitConfig {
            interval: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        });
    let ctx = configure(ctx);

    Orchestrator::new(ctx, plan, RPC_URL, CHAIN_ID, manifest_path)
        .with_probe_timeout(Duration::from_millis(200))
}
