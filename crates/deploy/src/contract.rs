//! Declarative contract descriptions and the results of deploying them.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use derive_more::Deref;
use starknet::core::{
    types::{Call, Felt},
    utils::cairo_short_string_to_felt,
};

use crate::error::{DeployError, DeployResult};

/// A Cairo calldata value known before the run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Felt(Felt),
    Bool(bool),
    /// A `u256`, serialized as `low` then `high`.
    U256 { low: u128, high: u128 },
    /// A Cairo short string (at most 31 ASCII characters).
    ShortString(String),
    /// A length-prefixed `Array<T>` / `Span<T>`.
    Array(Vec<ArgValue>),
}

impl ArgValue {
    /// Build a `u256` value from a `u128`.
    pub fn u256(value: u128) -> Self {
        Self::U256 {
            low: value,
            high: 0,
        }
    }

    /// Append the Cairo serialization of this value to `out`.
    pub fn encode_into(&self, out: &mut Vec<Felt>) -> Result<()> {
        match self {
            ArgValue::Felt(felt) => out.push(*felt),
            ArgValue::Bool(b) => out.push(if *b { Felt::ONE } else { Felt::ZERO }),
            ArgValue::U256 { low, high } => {
                out.push(Felt::from(*low));
                out.push(Felt::from(*high));
            }
            ArgValue::ShortString(s) => out.push(
                cairo_short_string_to_felt(s)
                    .with_context(|| format!("Invalid Cairo short string: {s:?}"))?,
            ),
            ArgValue::Array(items) => {
                out.push(Felt::from(items.len()));
                for item in items {
                    item.encode_into(out)?;
                }
            }
        }
        Ok(())
    }
}

impl From<Felt> for ArgValue {
    fn from(felt: Felt) -> Self {
        Self::Felt(felt)
    }
}

/// A constructor (or configuration call) argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstructorArg {
    Literal(ArgValue),
    /// The address of another contract of the same run, resolved at deployment time.
    DeferredAddress(String),
    /// The address of the deployer account, known once preflight has passed.
    DeployerAddress,
}

impl ConstructorArg {
    pub fn felt(felt: Felt) -> Self {
        Self::Literal(ArgValue::Felt(felt))
    }

    pub fn address_of(contract_name: impl Into<String>) -> Self {
        Self::DeferredAddress(contract_name.into())
    }
}

/// Declarative description of one contract to deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractSpec {
    /// Human-readable name, used as the manifest key.
    pub contract_name: String,
    /// Name of the compiled Scarb artifact.
    pub contract_class: String,
    /// Named constructor parameters, in calldata order.
    pub constructor_args: Vec<(String, ConstructorArg)>,
}

impl ContractSpec {
    /// A spec whose manifest name equals its class name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            contract_name: name.clone(),
            contract_class: name,
            constructor_args: Vec::new(),
        }
    }

    /// Deploy `class` under a different manifest name.
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.contract_class = class.into();
        self
    }

    /// Append a constructor argument.
    pub fn arg(mut self, name: impl Into<String>, value: ConstructorArg) -> Self {
        self.constructor_args.push((name.into(), value));
        self
    }

    /// Names of the contracts this spec depends on, in argument order.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        deferred_references(self.constructor_args.iter().map(|(_, arg)| arg))
    }
}

pub(crate) fn deferred_references<'a>(
    args: impl Iterator<Item = &'a ConstructorArg>,
) -> impl Iterator<Item = &'a str> {
    args.filter_map(|arg| match arg {
        ConstructorArg::DeferredAddress(name) => Some(name.as_str()),
        ConstructorArg::Literal(_) | ConstructorArg::DeployerAddress => None,
    })
}

/// Result of deploying (or reusing) a [`ContractSpec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedContract {
    pub contract_name: String,
    pub contract_class: String,
    pub class_hash: Felt,
    pub address: Felt,
    /// True when an existing deployment with a matching class was reused.
    pub already_deployed: bool,
    /// Constructor calldata sent by this run. Empty when the contract was reused,
    /// since the arguments it was deployed with are not known.
    pub constructor_calldata: Vec<Felt>,
}

/// A deployment call queued for the batcher.
#[derive(Debug, Clone)]
pub struct PendingInvocation {
    pub contract_name: String,
    pub call: Call,
}

/// Run-scoped, append-only registry of deployed contracts.
///
/// Dereferences to a read-only map keyed by contract name.
#[derive(Debug, Default, Deref)]
pub struct AddressRegistry {
    contracts: BTreeMap<String, DeployedContract>,
}

impl AddressRegistry {
    /// Record a deployed contract. Names can only be recorded once per run.
    pub fn record(&mut self, deployed: DeployedContract) -> Result<()> {
        if self.contracts.contains_key(&deployed.contract_name) {
            anyhow::bail!(
                "Contract `{}` is already recorded in this run",
                deployed.contract_name
            );
        }
        self.contracts
            .insert(deployed.contract_name.clone(), deployed);
        Ok(())
    }

    /// Look up the address of `reference` on behalf of `contract`.
    pub fn address_of(&self, contract: &str, reference: &str) -> DeployResult<Felt> {
        self.contracts
            .get(reference)
            .map(|deployed| deployed.address)
            .ok_or_else(|| DeployError::UnresolvedReference {
                contract: contract.to_string(),
                reference: reference.to_string(),
            })
    }

    /// Resolve and encode `args` into calldata, failing on the first deferred
    /// reference that is not recorded.
    ///
    /// `deployer` is substituted for [`ConstructorArg::DeployerAddress`].
    pub fn encode_args<'a>(
        &self,
        contract: &str,
        deployer: Option<Felt>,
        args: impl IntoIterator<Item = &'a ConstructorArg>,
    ) -> DeployResult<Vec<Felt>> {
        let mut calldata = Vec::new();
        for arg in args {
            match arg {
                ConstructorArg::DeferredAddress(reference) => {
                    calldata.push(self.address_of(contract, reference)?)
                }
                ConstructorArg::DeployerAddress => calldata.push(deployer.ok_or_else(|| {
                    DeployError::Configuration(format!(
                        "`{contract}` needs the deployer address but no account is configured"
                    ))
                })?),
                ConstructorArg::Literal(value) => value
                    .encode_into(&mut calldata)
                    .map_err(|e| DeployError::deployment(contract, e))?,
            }
        }
        Ok(calldata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployed(name: &str, address: u64) -> DeployedContract {
        DeployedContract {
            contract_name: name.to_string(),
            contract_class: name.to_string(),
            class_hash: Felt::from(1u64),
            address: Felt::from(address),
            already_deployed: false,
            constructor_calldata: vec![],
        }
    }

    #[test]
    fn test_encode_literals() {
        let mut out = Vec::new();
        ArgValue::Bool(true).encode_into(&mut out).unwrap();
        ArgValue::U256 { low: 5, high: 7 }.encode_into(&mut out).unwrap();
        ArgValue::Array(vec![ArgValue::Felt(Felt::from(9u64)), ArgValue::Bool(false)])
            .encode_into(&mut out)
            .unwrap();

        assert_eq!(
            out,
            vec![
                Felt::ONE,
                Felt::from(5u64),
                Felt::from(7u64),
                Felt::from(2u64),
                Felt::from(9u64),
                Felt::ZERO,
            ]
        );
    }

    #[test]
    fn test_encode_short_string() {
        let mut out = Vec::new();
        ArgValue::ShortString("TRACE".to_string())
            .encode_into(&mut out)
            .unwrap();
        assert_eq!(out, vec![cairo_short_string_to_felt("TRACE").unwrap()]);

        let too_long = "x".repeat(40);
        assert!(
            ArgValue::ShortString(too_long)
                .encode_into(&mut Vec::new())
                .is_err()
        );
    }

    #[test]
    fn test_registry_resolves_in_argument_order() {
        let mut registry = AddressRegistry::default();
        registry.record(deployed("IdentityRegistry", 0x11)).unwrap();
        registry.record(deployed("RewardManager", 0x22)).unwrap();

        let args = [
            ConstructorArg::DeployerAddress,
            ConstructorArg::address_of("IdentityRegistry"),
            ConstructorArg::address_of("RewardManager"),
        ];
        let calldata = registry
            .encode_args("ProductRegistry", Some(Felt::from(0xdu64)), &args)
            .unwrap();

        assert_eq!(
            calldata,
            vec![Felt::from(0xdu64), Felt::from(0x11u64), Felt::from(0x22u64)]
        );
    }

    #[test]
    fn test_registry_rejects_unknown_reference() {
        let registry = AddressRegistry::default();
        let err = registry
            .encode_args(
                "ProductRegistry",
                None,
                &[ConstructorArg::address_of("IdentityRegistry")],
            )
            .unwrap_err();

        assert!(matches!(
            err,
            DeployError::UnresolvedReference { ref contract, ref reference }
                if contract == "ProductRegistry" && reference == "IdentityRegistry"
        ));
    }

    #[test]
    fn test_deployer_address_requires_account() {
        let registry = AddressRegistry::default();
        let err = registry
            .encode_args("IdentityRegistry", None, &[ConstructorArg::DeployerAddress])
            .unwrap_err();
        assert!(matches!(err, DeployError::Configuration(_)));
    }

    #[test]
    fn test_registry_is_append_only() {
        let mut registry = AddressRegistry::default();
        registry.record(deployed("IdentityRegistry", 0x11)).unwrap();
        assert!(registry.record(deployed("IdentityRegistry", 0x33)).is_err());
        assert_eq!(
            registry["IdentityRegistry"].address,
            Felt::from(0x11u64),
            "first recording must win"
        );
    }

    #[test]
    fn test_spec_dependencies() {
        let spec = ContractSpec::new("ProductRegistry")
            .arg("owner", ConstructorArg::felt(Felt::ONE))
            .arg("identity", ConstructorArg::address_of("IdentityRegistry"))
            .arg("rewards", ConstructorArg::address_of("RewardManager"));

        assert_eq!(
            spec.dependencies().collect::<Vec<_>>(),
            vec!["IdentityRegistry", "RewardManager"]
        );
    }
}
