//! [`ChainClient`] backed by a Starknet JSON-RPC node and a single-owner account.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use starknet::{
    accounts::{Account, ExecutionEncoding, SingleOwnerAccount},
    core::types::{BlockId, BlockTag, Call, ExecutionResult, Felt, StarknetError},
    providers::{
        Provider, ProviderError,
        jsonrpc::{HttpTransport, JsonRpcClient},
    },
    signers::{LocalWallet, Signer, SigningKey},
};
use url::Url;

use super::{ChainClient, TxStatus};
use crate::{artifact::ContractArtifact, rpc};

/// Hash signed during the signer check ("tracekit" as a short string).
const SIGNER_PROBE_HASH: Felt = Felt::from_hex_unchecked("0x74726163656b6974");

type RpcProvider = Arc<JsonRpcClient<HttpTransport>>;
type DeployerAccount = SingleOwnerAccount<RpcProvider, LocalWallet>;

/// Credentials of the deployer account.
#[derive(Debug, Clone, Copy)]
pub struct AccountCredentials {
    pub address: Felt,
    pub private_key: Felt,
}

struct Deployer {
    account: DeployerAccount,
    signer: LocalWallet,
}

/// A live Starknet node reached over JSON-RPC.
pub struct StarknetClient {
    rpc_url: Url,
    http: reqwest::Client,
    provider: RpcProvider,
    deployer: Option<Deployer>,
}

impl StarknetClient {
    /// Build a client. No request is sent until a method is called.
    ///
    /// # Arguments
    /// * `rpc_url` - The JSON-RPC endpoint
    /// * `chain_id` - The chain id transactions are signed for
    /// * `credentials` - The deployer account, if configured
    /// * `probe_timeout` - Upper bound for the liveness probe
    pub fn new(
        rpc_url: &str,
        chain_id: Felt,
        credentials: Option<AccountCredentials>,
        probe_timeout: Duration,
    ) -> Result<Self> {
        let rpc_url =
            Url::parse(rpc_url).with_context(|| format!("Invalid RPC URL: {rpc_url}"))?;
        let provider = Arc::new(JsonRpcClient::new(HttpTransport::new(rpc_url.clone())));

        let deployer = credentials.map(|creds| {
            let signer =
                LocalWallet::from_signing_key(SigningKey::from_secret_scalar(creds.private_key));
            let account = SingleOwnerAccount::new(
                provider.clone(),
                signer.clone(),
                creds.address,
                chain_id,
                ExecutionEncoding::New,
            );
            Deployer { account, signer }
        });

        Ok(Self {
            http: rpc::create_client(probe_timeout)?,
            rpc_url,
            provider,
            deployer,
        })
    }

    fn deployer(&self) -> Result<&Deployer> {
        self.deployer
            .as_ref()
            .context("No deployer account configured")
    }
}

impl ChainClient for StarknetClient {
    fn account_address(&self) -> Option<Felt> {
        self.deployer.as_ref().map(|d| d.account.address())
    }

    async fn probe(&self) -> Result<Felt> {
        rpc::json_rpc_call(&self.http, self.rpc_url.as_str(), "starknet_chainId", vec![]).await
    }

    async fn check_signer(&self) -> Result<()> {
        let deployer = self.deployer()?;

        let signature = deployer
            .signer
            .sign_hash(&SIGNER_PROBE_HASH)
            .await
            .context("Failed to sign probe hash")?;
        let public_key = deployer
            .signer
            .get_public_key()
            .await
            .context("Failed to derive public key")?;
        let valid = public_key
            .verify(&SIGNER_PROBE_HASH, &signature)
            .context("Failed to verify probe signature")?;
        if !valid {
            anyhow::bail!("Signature produced by the configured key does not verify");
        }

        let address = deployer.account.address();
        if self.class_hash_at(address).await?.is_none() {
            anyhow::bail!("Account contract {:#066x} is not deployed", address);
        }

        Ok(())
    }

    async fn class_hash_at(&self, address: Felt) -> Result<Option<Felt>> {
        match self
            .provider
            .get_class_hash_at(BlockId::Tag(BlockTag::Latest), address)
            .await
        {
            Ok(class_hash) => Ok(Some(class_hash)),
            Err(ProviderError::StarknetError(StarknetError::ContractNotFound)) => Ok(None),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to fetch class hash at {:#066x}", address)),
        }
    }

    async fn is_declared(&self, class_hash: Felt) -> Result<bool> {
        match self
            .provider
            .get_class(BlockId::Tag(BlockTag::Latest), class_hash)
            .await
        {
            Ok(_) => Ok(true),
            Err(ProviderError::StarknetError(StarknetError::ClassHashNotFound)) => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to fetch class {:#066x}", class_hash)),
        }
    }

    async fn declare(&self, artifact: &ContractArtifact) -> Result<Felt> {
        let deployer = self.deployer()?;
        let class = Arc::new(artifact.flattened_class()?);

        let result = deployer
            .account
            .declare_v3(class, artifact.compiled_class_hash)
            .send()
            .await
            .with_context(|| format!("Failed to declare {}", artifact.class_name))?;

        Ok(result.transaction_hash)
    }

    async fn execute(&self, calls: Vec<Call>) -> Result<Felt> {
        let deployer = self.deployer()?;

        let result = deployer
            .account
            .execute_v3(calls)
            .send()
            .await
            .context("Failed to submit multicall transaction")?;

        Ok(result.transaction_hash)
    }

    async fn estimate(&self, calls: Vec<Call>) -> Result<()> {
        let deployer = self.deployer()?;

        deployer
            .account
            .execute_v3(calls)
            .estimate_fee()
            .await
            .context("Fee estimation failed")?;

        Ok(())
    }

    async fn transaction_status(&self, tx_hash: Felt) -> Result<TxStatus> {
        match self.provider.get_transaction_receipt(tx_hash).await {
            Ok(receipt) => Ok(match receipt.receipt.execution_result() {
                ExecutionResult::Succeeded => TxStatus::Accepted,
                ExecutionResult::Reverted { reason } => TxStatus::Reverted {
                    reason: reason.clone(),
                },
            }),
            Err(ProviderError::StarknetError(StarknetError::TransactionHashNotFound)) => {
                Ok(TxStatus::Pending)
            }
            Err(e) => Err(e)
                .with_context(|| format!("Failed to fetch receipt of {:#066x}", tx_hash)),
        }
    }
}
