//! Declares classes and queues contract deployments through the Universal Deployer.

use std::collections::HashSet;

use anyhow::Context;
use futures::future::join_all;
use starknet::{
    core::{
        types::{Call, Felt},
        utils::get_contract_address,
    },
    macros::selector,
};

use crate::{
    artifact::ContractArtifact,
    batcher::{CallBatcher, wait_for_transaction},
    chain::{ChainClient, TxStatus},
    context::RunContext,
    contract::{ContractSpec, DeployedContract, PendingInvocation},
    error::{DeployError, DeployResult},
};

/// Address of the Universal Deployer Contract, identical on every public network and devnet.
pub const UDC_ADDRESS: Felt =
    Felt::from_hex_unchecked("0x041a78e741e5af2fec34b695679bc6891742439f7afb8484ecd7766661ad02bf");

const UDC_DEPLOY_SELECTOR: Felt = selector!("deployContract");

/// Build the UDC call deploying `class_hash` with `salt` and `constructor_calldata`.
///
/// Deployments are not unique, so the address does not depend on the caller.
pub fn udc_deploy_call(class_hash: Felt, salt: Felt, constructor_calldata: &[Felt]) -> Call {
    let mut calldata = vec![
        class_hash,
        salt,
        Felt::ZERO,
        Felt::from(constructor_calldata.len()),
    ];
    calldata.extend_from_slice(constructor_calldata);

    Call {
        to: UDC_ADDRESS,
        selector: UDC_DEPLOY_SELECTOR,
        calldata,
    }
}

/// Deploys contract specs one at a time, remembering which classes are declared.
#[derive(Debug, Default)]
pub struct ContractDeployer {
    declared: HashSet<Felt>,
}

impl ContractDeployer {
    /// Query the declaration status of every distinct class of `specs` concurrently.
    ///
    /// Declarations themselves stay sequential since they share the deployer nonce.
    pub async fn prefetch_declarations<C: ChainClient>(
        &mut self,
        ctx: &RunContext<C>,
        specs: &[ContractSpec],
    ) -> DeployResult<()> {
        let mut seen = HashSet::new();
        let mut classes = Vec::new();
        for spec in specs {
            let artifact = ctx
                .artifacts
                .get(&spec.contract_class)
                .map_err(|e| DeployError::deployment(&spec.contract_name, e))?;
            if seen.insert(artifact.class_hash) {
                classes.push((spec.contract_name.as_str(), artifact));
            }
        }

        let checks = classes.iter().map(|(name, artifact)| async move {
            let declared = ctx
                .client
                .is_declared(artifact.class_hash)
                .await
                .with_context(|| format!("Failed to query class {}", artifact.class_name))
                .map_err(|e| DeployError::deployment(name, e))?;
            Ok::<_, DeployError>((artifact.class_hash, declared))
        });

        for result in join_all(checks).await {
            let (class_hash, declared) = result?;
            if declared {
                self.declared.insert(class_hash);
            }
        }

        tracing::debug!(
            classes = classes.len(),
            declared = self.declared.len(),
            "Declaration status prefetched"
        );
        Ok(())
    }

    /// Deploy `spec`, or reuse its previous deployment.
    ///
    /// A new deployment is queued on `batcher` and recorded in the registry with
    /// its precomputed address; it lands on-chain when the batcher is flushed.
    pub async fn deploy<C: ChainClient>(
        &mut self,
        ctx: &mut RunContext<C>,
        batcher: &mut CallBatcher,
        spec: &ContractSpec,
    ) -> DeployResult<DeployedContract> {
        let name = spec.contract_name.as_str();
        let calldata = ctx.encode_args(name, spec.constructor_args.iter().map(|(_, arg)| arg))?;
        let artifact = ctx
            .artifacts
            .get(&spec.contract_class)
            .map_err(|e| DeployError::deployment(name, e))?
            .clone();

        if let Some(address) = self.find_reusable(ctx, spec, &artifact).await? {
            tracing::info!(
                contract = %name,
                address = %format!("{:#066x}", address),
                "Contract already deployed, reusing"
            );
            let deployed = DeployedContract {
                contract_name: name.to_string(),
                contract_class: artifact.class_name.clone(),
                class_hash: artifact.class_hash,
                address,
                already_deployed: true,
                constructor_calldata: Vec::new(),
            };
            return record(ctx, deployed);
        }

        self.ensure_declared(ctx, &artifact)
            .await
            .map_err(|e| DeployError::deployment(name, e))?;

        let salt = ctx.salt_for(name);
        let address = get_contract_address(salt, artifact.class_hash, &calldata, Felt::ZERO);
        if ctx.salt.is_some() {
            ensure_address_free(ctx, address)
                .await
                .map_err(|e| DeployError::deployment(name, e))?;
        }
        batcher.enqueue(PendingInvocation {
            contract_name: name.to_string(),
            call: udc_deploy_call(artifact.class_hash, salt, &calldata),
        });

        tracing::info!(
            contract = %name,
            class = %artifact.class_name,
            address = %format!("{:#066x}", address),
            "Deployment queued"
        );

        let deployed = DeployedContract {
            contract_name: name.to_string(),
            contract_class: artifact.class_name.clone(),
            class_hash: artifact.class_hash,
            address,
            already_deployed: false,
            constructor_calldata: calldata,
        };
        record(ctx, deployed)
    }

    /// The recorded address of `spec` when it can be reused as is.
    ///
    /// Reuse requires the recorded class to match the local artifact, the
    /// chain to report that class at the recorded address, and every
    /// referenced contract to be reused as well.
    async fn find_reusable<C: ChainClient>(
        &self,
        ctx: &RunContext<C>,
        spec: &ContractSpec,
        artifact: &ContractArtifact,
    ) -> DeployResult<Option<Felt>> {
        let name = spec.contract_name.as_str();
        if ctx.reset {
            return Ok(None);
        }
        let Some(entry) = ctx.manifest.entry(ctx.network, name) else {
            return Ok(None);
        };

        if entry.class_hash != artifact.class_hash {
            tracing::info!(contract = %name, "Class changed since last deployment, redeploying");
            return Ok(None);
        }

        if let Some(dependency) = spec
            .dependencies()
            .find(|dep| ctx.registry.get(*dep).is_none_or(|d| !d.already_deployed))
        {
            tracing::info!(contract = %name, dependency = %dependency, "Dependency redeployed, redeploying");
            return Ok(None);
        }

        let on_chain = ctx
            .client
            .class_hash_at(entry.address)
            .await
            .with_context(|| format!("Failed to query contract at {:#066x}", entry.address))
            .map_err(|e| DeployError::deployment(name, e))?;

        match on_chain {
            Some(class_hash) if class_hash == artifact.class_hash => Ok(Some(entry.address)),
            Some(class_hash) => {
                tracing::warn!(
                    contract = %name,
                    on_chain = %format!("{:#x}", class_hash),
                    "Recorded address holds another class, redeploying"
                );
                Ok(None)
            }
            None => {
                tracing::warn!(contract = %name, "Recorded address not found on chain, redeploying");
                Ok(None)
            }
        }
    }

    async fn ensure_declared<C: ChainClient>(
        &mut self,
        ctx: &RunContext<C>,
        artifact: &ContractArtifact,
    ) -> anyhow::Result<()> {
        if self.declared.contains(&artifact.class_hash) {
            return Ok(());
        }

        if ctx.client.is_declared(artifact.class_hash).await? {
            tracing::debug!(class = %artifact.class_name, "Class already declared");
            self.declared.insert(artifact.class_hash);
            return Ok(());
        }

        tracing::info!(
            class = %artifact.class_name,
            class_hash = %format!("{:#066x}", artifact.class_hash),
            "Declaring class"
        );
        let tx_hash = ctx
            .client
            .declare(artifact)
            .await
            .with_context(|| format!("Failed to declare class {}", artifact.class_name))?;

        match wait_for_transaction(&ctx.client, tx_hash, &ctx.tx_wait).await? {
            TxStatus::Reverted { reason } => anyhow::bail!(
                "Declaration of {} reverted in {:#066x}: {}",
                artifact.class_name,
                tx_hash,
                reason
            ),
            _ => {
                tracing::info!(class = %artifact.class_name, tx_hash = %format!("{:#066x}", tx_hash), "Class declared");
                self.declared.insert(artifact.class_hash);
                Ok(())
            }
        }
    }
}

/// A fixed salt maps a contract to one address; fail before submitting when it is taken.
async fn ensure_address_free<C: ChainClient>(ctx: &RunContext<C>, address: Felt) -> anyhow::Result<()> {
    if let Some(class_hash) = ctx
        .client
        .class_hash_at(address)
        .await
        .with_context(|| format!("Failed to query contract at {:#066x}", address))?
    {
        anyhow::bail!(
            "address {:#066x} already holds class {:#x}, configure another salt to redeploy",
            address,
            class_hash
        );
    }
    Ok(())
}

fn record<C>(ctx: &mut RunContext<C>, deployed: DeployedContract) -> DeployResult<DeployedContract> {
    ctx.registry
        .record(deployed.clone())
        .map_err(|e| DeployError::deployment(&deployed.contract_name, e))?;
    Ok(deployed)
}
