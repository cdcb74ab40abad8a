//! Groups queued invocations into multicall transactions.

use starknet::core::types::{Call, Felt};

use crate::{
    chain::{ChainClient, TxStatus},
    context::TxWaitConfig,
    contract::PendingInvocation,
    error::{DeployError, DeployResult},
    rpc::{self, Poll},
};

/// A multicall accepted on-chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReceipt {
    pub transaction_hash: Felt,
    /// Contracts whose invocations the transaction carried, in queue order.
    pub contract_names: Vec<String>,
}

/// Queue of pending invocations, flushed as one or more multicalls.
#[derive(Debug)]
pub struct CallBatcher {
    max_calls_per_tx: usize,
    pending: Vec<PendingInvocation>,
    accepted_batches: usize,
}

impl CallBatcher {
    pub fn new(max_calls_per_tx: usize) -> Self {
        Self {
            max_calls_per_tx: max_calls_per_tx.max(1),
            pending: Vec::new(),
            accepted_batches: 0,
        }
    }

    pub fn enqueue(&mut self, invocation: PendingInvocation) {
        tracing::debug!(contract = %invocation.contract_name, "Invocation queued");
        self.pending.push(invocation);
    }

    pub fn pending(&self) -> &[PendingInvocation] {
        &self.pending
    }

    /// Number of batches accepted on-chain by this batcher so far.
    pub fn accepted_batches(&self) -> usize {
        self.accepted_batches
    }

    /// Flush the queue.
    pub async fn execute<C: ChainClient>(
        &mut self,
        client: &C,
        wait: &TxWaitConfig,
    ) -> DeployResult<Vec<ExecutionReceipt>> {
        let pending = std::mem::take(&mut self.pending);
        self.submit(client, wait, pending).await
    }

    /// Submit `pending` in chunks of at most `max_calls_per_tx` calls, in order.
    ///
    /// Each chunk must be accepted before the next one is sent. An empty queue
    /// submits nothing.
    pub async fn submit<C: ChainClient>(
        &mut self,
        client: &C,
        wait: &TxWaitConfig,
        pending: Vec<PendingInvocation>,
    ) -> DeployResult<Vec<ExecutionReceipt>> {
        if pending.is_empty() {
            tracing::info!("No pending invocations, nothing to submit");
            return Ok(Vec::new());
        }

        let batch_count = pending.len().div_ceil(self.max_calls_per_tx);
        let mut receipts = Vec::with_capacity(batch_count);

        for (index, batch) in pending.chunks(self.max_calls_per_tx).enumerate() {
            let contract_names: Vec<String> =
                batch.iter().map(|i| i.contract_name.clone()).collect();
            let calls: Vec<Call> = batch.iter().map(|i| i.call.clone()).collect();

            tracing::info!(
                batch = index + 1,
                of = batch_count,
                calls = calls.len(),
                contracts = %contract_names.join(", "),
                "Submitting multicall"
            );

            let tx_hash = client
                .execute(calls)
                .await
                .map_err(|e| DeployError::BatchExecution {
                    contract_name: contract_names.join(", "),
                    transaction_hash: None,
                    reason: format!("{e:#}"),
                })?;

            let status = wait_for_transaction(client, tx_hash, wait)
                .await
                .map_err(|e| DeployError::BatchExecution {
                    contract_name: contract_names.join(", "),
                    transaction_hash: Some(format!("{:#066x}", tx_hash)),
                    reason: format!("{e:#}"),
                })?;

            if let TxStatus::Reverted { reason } = status {
                let failing = locate_failing_call(client, batch).await;
                if self.accepted_batches > 0 {
                    tracing::error!(
                        accepted_batches = self.accepted_batches,
                        "Earlier batches of this run are already on-chain, manual reconciliation required"
                    );
                }
                return Err(DeployError::BatchExecution {
                    contract_name: failing,
                    transaction_hash: Some(format!("{:#066x}", tx_hash)),
                    reason,
                });
            }

            self.accepted_batches += 1;
            tracing::info!(
                tx_hash = %format!("{:#066x}", tx_hash),
                batch = index + 1,
                "Multicall accepted"
            );
            receipts.push(ExecutionReceipt {
                transaction_hash: tx_hash,
                contract_names,
            });
        }

        Ok(receipts)
    }
}

/// Find the invocation that made `batch` revert by estimating growing prefixes.
///
/// Falls back to every name in the batch when no prefix fails on its own.
async fn locate_failing_call<C: ChainClient>(client: &C, batch: &[PendingInvocation]) -> String {
    if let [only] = batch {
        return only.contract_name.clone();
    }

    for end in 1..=batch.len() {
        let calls = batch[..end].iter().map(|i| i.call.clone()).collect();
        if let Err(e) = client.estimate(calls).await {
            let failing = &batch[end - 1].contract_name;
            tracing::debug!(contract = %failing, error = %format!("{e:#}"), "Located failing call");
            return failing.clone();
        }
    }

    batch
        .iter()
        .map(|i| i.contract_name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Poll `tx_hash` until it is accepted or reverted.
pub(crate) async fn wait_for_transaction<C: ChainClient>(
    client: &C,
    tx_hash: Felt,
    wait: &TxWaitConfig,
) -> anyhow::Result<TxStatus> {
    rpc::poll_until(
        &format!("transaction {:#066x}", tx_hash),
        wait.timeout,
        wait.interval,
        move || async move {
            Ok(match client.transaction_status(tx_hash).await? {
                TxStatus::Pending => Poll::Pending,
                status => Poll::Ready(status),
            })
        },
    )
    .await
}
