//! What a run deploys, in which order, and how the results are wired together.

use std::collections::HashSet;

use starknet::core::{types::Felt, utils::get_selector_from_name};

use crate::{
    contract::{ConstructorArg, ContractSpec, deferred_references},
    error::{DeployError, DeployResult},
};

/// A call made once every contract is deployed, usually to set a cross-contract reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationStep {
    /// Contract receiving the call.
    pub contract_name: String,
    pub entrypoint: String,
    pub args: Vec<ConstructorArg>,
}

impl ConfigurationStep {
    pub fn new(contract_name: impl Into<String>, entrypoint: impl Into<String>) -> Self {
        Self {
            contract_name: contract_name.into(),
            entrypoint: entrypoint.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, value: ConstructorArg) -> Self {
        self.args.push(value);
        self
    }

    pub fn selector(&self) -> DeployResult<Felt> {
        get_selector_from_name(&self.entrypoint).map_err(|e| {
            DeployError::Configuration(format!(
                "invalid entrypoint `{}` on {}: {e}",
                self.entrypoint, self.contract_name
            ))
        })
    }

    /// Contracts this step reads or writes.
    pub fn touches(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.contract_name.as_str()).chain(deferred_references(self.args.iter()))
    }
}

/// Ordered contract specs plus the configuration steps run after them.
///
/// The order of `contracts` is the deployment order and must already be topological.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentPlan {
    pub contracts: Vec<ContractSpec>,
    pub configuration: Vec<ConfigurationStep>,
}

impl DeploymentPlan {
    pub fn new(contracts: Vec<ContractSpec>) -> Self {
        Self {
            contracts,
            configuration: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: ConfigurationStep) -> Self {
        self.configuration.push(step);
        self
    }

    /// The product traceability contracts.
    ///
    /// `ReturnManager` is deployed standalone; no configuration step is shipped
    /// for it since the setter that links it is not defined yet.
    pub fn traceability(reward_token: Felt) -> Self {
        Self::new(vec![
            ContractSpec::new("IdentityRegistry").arg("owner", ConstructorArg::DeployerAddress),
            ContractSpec::new("RewardManager")
                .arg("owner", ConstructorArg::DeployerAddress)
                .arg("reward_token", ConstructorArg::felt(reward_token)),
            ContractSpec::new("ProductRegistry")
                .arg("owner", ConstructorArg::DeployerAddress)
                .arg(
                    "identity_registry_addr",
                    ConstructorArg::address_of("IdentityRegistry"),
                )
                .arg(
                    "reward_manager_addr",
                    ConstructorArg::address_of("RewardManager"),
                ),
            ContractSpec::new("ReturnManager").arg("owner", ConstructorArg::DeployerAddress),
        ])
    }

    /// Distinct class names, in first-use order.
    pub fn classes(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.contracts
            .iter()
            .map(|spec| spec.contract_class.as_str())
            .filter(|class| seen.insert(*class))
            .collect()
    }

    /// Check names are unique and every reference points at an earlier contract.
    pub fn validate(&self) -> DeployResult<()> {
        let mut seen = HashSet::new();

        for spec in &self.contracts {
            if let Some(reference) = spec.dependencies().find(|dep| !seen.contains(dep)) {
                return Err(DeployError::UnresolvedReference {
                    contract: spec.contract_name.clone(),
                    reference: reference.to_string(),
                });
            }
            if !seen.insert(spec.contract_name.as_str()) {
                return Err(DeployError::Configuration(format!(
                    "contract `{}` appears twice in the deployment plan",
                    spec.contract_name
                )));
            }
        }

        for step in &self.configuration {
            if let Some(reference) = step.touches().find(|name| !seen.contains(name)) {
                return Err(DeployError::UnresolvedReference {
                    contract: step.contract_name.clone(),
                    reference: reference.to_string(),
                });
            }
            step.selector()?;
        }

        Ok(())
    }
}
