//! Reproducibility tags attached to every run.

use goalcast_core::experiment::ExperimentConfig;
use goalcast_core::tracking::RunTag;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const CONFIG_SHA256_TAG: &str = "goalcast.config_sha256";
pub const PLATFORM_TAG: &str = "goalcast.platform";
pub const SOURCE_TAG: &str = "goalcast.source";

/// What produced a run, and from which configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFingerprint {
    /// SHA-256 of the canonical JSON form of the configuration.
    pub config_sha256: String,
    pub platform: String,
    pub source: String,
}

impl RunFingerprint {
    pub fn capture(config: &ExperimentConfig) -> Result<Self, serde_json::Error> {
        Ok(Self {
            config_sha256: config_digest(config)?,
            platform: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            source: format!("goalcast {}", env!("CARGO_PKG_VERSION")),
        })
    }

    pub fn tags(&self) -> Vec<RunTag> {
        vec![
            RunTag::new(CONFIG_SHA256_TAG, &self.config_sha256),
            RunTag::new(PLATFORM_TAG, &self.platform),
            RunTag::new(SOURCE_TAG, &self.source),
        ]
    }
}

/// Hash of the configuration; map keys are sorted so key order in the file
/// does not matter.
pub fn config_digest(config: &ExperimentConfig) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_vec(&serde_json::to_value(config)?)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}
