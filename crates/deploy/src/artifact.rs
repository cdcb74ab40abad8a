//! Compiled contract artifacts produced by Scarb.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use starknet::core::types::{
    Felt, FlattenedSierraClass,
    contract::{CompiledClass, SierraClass},
};

/// A compiled contract class ready to be declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractArtifact {
    pub class_name: String,
    /// Hash of the Sierra class.
    pub class_hash: Felt,
    /// Hash of the CASM class, required by `declare_v3`.
    pub compiled_class_hash: Felt,
    /// Path to the `.contract_class.json` file.
    pub sierra_path: PathBuf,
}

impl ContractArtifact {
    /// Load `<package>_<class_name>` from a Scarb target directory.
    ///
    /// Both the Sierra (`.contract_class.json`) and CASM
    /// (`.compiled_contract_class.json`) files must be present.
    pub fn load(artifacts_dir: &Path, package: &str, class_name: &str) -> Result<Self> {
        let stem = format!("{package}_{class_name}");
        let sierra_path = artifacts_dir.join(format!("{stem}.contract_class.json"));
        let casm_path = artifacts_dir.join(format!("{stem}.compiled_contract_class.json"));

        let sierra = read_sierra(&sierra_path)?;
        let class_hash = sierra
            .class_hash()
            .with_context(|| format!("Failed to compute class hash of {class_name}"))?;

        let casm_content = std::fs::read_to_string(&casm_path)
            .with_context(|| format!("Failed to read CASM artifact {}", casm_path.display()))?;
        let casm: CompiledClass = serde_json::from_str(&casm_content)
            .with_context(|| format!("Failed to parse CASM artifact {}", casm_path.display()))?;
        let compiled_class_hash = casm
            .class_hash()
            .with_context(|| format!("Failed to compute compiled class hash of {class_name}"))?;

        tracing::debug!(
            class_name,
            class_hash = %format!("{:#066x}", class_hash),
            compiled_class_hash = %format!("{:#066x}", compiled_class_hash),
            "Loaded contract artifact"
        );

        Ok(Self {
            class_name: class_name.to_string(),
            class_hash,
            compiled_class_hash,
            sierra_path,
        })
    }

    /// Read and flatten the Sierra class for a declare transaction.
    pub fn flattened_class(&self) -> Result<FlattenedSierraClass> {
        read_sierra(&self.sierra_path)?
            .flatten()
            .with_context(|| format!("Failed to flatten Sierra class of {}", self.class_name))
    }
}

fn read_sierra(path: &Path) -> Result<SierraClass> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read Sierra artifact {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse Sierra artifact {}", path.display()))
}

/// The artifacts needed by a run, keyed by class name.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    artifacts: HashMap<String, ContractArtifact>,
}

impl ArtifactSet {
    /// Load every distinct class in `classes` from a Scarb target directory.
    pub fn load<'a>(
        artifacts_dir: &Path,
        package: &str,
        classes: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        let mut set = Self::default();
        for class in classes {
            if set.artifacts.contains_key(class) {
                continue;
            }
            set.insert(ContractArtifact::load(artifacts_dir, package, class)?);
        }
        Ok(set)
    }

    pub fn insert(&mut self, artifact: ContractArtifact) {
        self.artifacts.insert(artifact.class_name.clone(), artifact);
    }

    pub fn get(&self, class_name: &str) -> Result<&ContractArtifact> {
        self.artifacts
            .get(class_name)
            .with_context(|| format!("No compiled artifact loaded for class {class_name}"))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContractArtifact> {
        self.artifacts.values()
    }
}

impl FromIterator<ContractArtifact> for ArtifactSet {
    fn from_iter<I: IntoIterator<Item = ContractArtifact>>(iter: I) -> Self {
        let mut set = Self::default();
        for artifact in iter {
            set.insert(artifact);
        }
        set
    }
}
