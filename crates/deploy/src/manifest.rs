//! The persisted deployment manifest.
//!
//! The manifest maps `network -> contract name -> entry` and is the only state
//! shared between runs. It is read at run start to find contracts that can be
//! reused and rewritten at run end, on success only.

use std::{collections::BTreeMap, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use starknet::core::types::Felt;

use crate::{
    config::Network,
    contract::DeployedContract,
    error::{DeployError, DeployResult},
    fs::FsHandler,
};

/// Where a contract lives on a given network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub address: Felt,
    pub class_hash: Felt,
    /// Compiled class name, used by the front end to pick the ABI.
    pub contract: String,
}

impl From<&DeployedContract> for ManifestEntry {
    fn from(deployed: &DeployedContract) -> Self {
        Self {
            address: deployed.address,
            class_hash: deployed.class_hash,
            contract: deployed.contract_class.clone(),
        }
    }
}

/// Deployed contracts, per network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentManifest {
    networks: BTreeMap<Network, BTreeMap<String, ManifestEntry>>,
}

impl DeploymentManifest {
    /// Load the manifest. A missing file is an empty manifest.
    pub fn load(path: &Path) -> DeployResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No manifest yet, starting empty");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest from {}", path.display()))
            .map_err(|e| DeployError::persistence(path, e))?;

        serde_json::from_str(&content)
            .context("Failed to parse manifest JSON")
            .map_err(|e| DeployError::persistence(path, e))
    }

    /// The entry recorded for `contract_name` on `network`.
    pub fn entry(&self, network: Network, contract_name: &str) -> Option<&ManifestEntry> {
        self.networks.get(&network)?.get(contract_name)
    }

    /// All entries recorded for `network`.
    pub fn network(&self, network: Network) -> Option<&BTreeMap<String, ManifestEntry>> {
        self.networks.get(&network)
    }

    /// Merge `deployed` into the section of `network`.
    ///
    /// Entries with the same name are replaced; every other entry, on this or
    /// any other network, is kept.
    pub fn merge<'a>(
        &mut self,
        network: Network,
        deployed: impl IntoIterator<Item = &'a DeployedContract>,
    ) {
        let section = self.networks.entry(network).or_default();
        for contract in deployed {
            section.insert(contract.contract_name.clone(), contract.into());
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        let mut json =
            serde_json::to_string_pretty(self).context("Failed to serialize manifest")?;
        json.push('\n');
        Ok(json)
    }
}

/// Writes deployment results into the manifest file.
#[derive(Debug, Clone)]
pub struct ManifestExporter<'a> {
    path: &'a Path,
    archive_previous: bool,
}

impl<'a> ManifestExporter<'a> {
    pub fn new(path: &'a Path) -> Self {
        Self {
            path,
            archive_previous: false,
        }
    }

    /// Keep a `<stem>_<unix-millis>.json` copy of the manifest being replaced.
    pub fn archive_previous(mut self, archive: bool) -> Self {
        self.archive_previous = archive;
        self
    }

    /// Merge `deployed` into the on-disk manifest for `network` and write it atomically.
    ///
    /// The manifest is re-read right before merging so entries written by
    /// other tools since the run started are not lost.
    pub fn export(
        &self,
        network: Network,
        deployed: &[DeployedContract],
    ) -> DeployResult<DeploymentManifest> {
        let mut manifest = DeploymentManifest::load(self.path)?;
        manifest.merge(network, deployed);

        let json = manifest
            .to_json()
            .map_err(|e| DeployError::persistence(self.path, e))?;

        if self.archive_previous && self.path.exists() {
            self.archive().map_err(|e| DeployError::persistence(self.path, e))?;
        }

        FsHandler::write_atomic(self.path, json.as_bytes())
            .map_err(|e| DeployError::persistence(self.path, e))?;

        tracing::info!(
            path = %self.path.display(),
            network = %network,
            contracts = deployed.len(),
            "Deployment manifest exported"
        );

        Ok(manifest)
    }

    fn archive(&self) -> anyhow::Result<()> {
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .context("Manifest path has no file name")?;
        let archived = self.path.with_file_name(format!(
            "{}_{}.json",
            stem,
            chrono::Utc::now().timestamp_millis()
        ));

        std::fs::copy(self.path, &archived).with_context(|| {
            format!("Failed to archive manifest to {}", archived.display())
        })?;
        tracing::debug!(archived = %archived.display(), "Previous manifest archived");
        Ok(())
    }
}
