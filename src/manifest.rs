use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const SPEC_VERSION: &str = "1.0.0";

/// Platform key used when the running target has no entry of its own.
pub const ANY_PLATFORM: &str = "any";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Dependency {
    /// A plain library loaded before the base library.
    #[serde(rename = "rawlib")]
    RawLib { path: PathBuf },
    /// Another manifest whose libraries are loaded before the base library.
    #[serde(rename = "manifest")]
    Manifest { path: PathBuf },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformLibrary {
    pub path: PathBuf,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

/// Names of the exported symbols a bridge binds to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbols {
    #[serde(default = "default_call")]
    pub call: String,
    #[serde(default = "default_release")]
    pub release: String,
}

fn default_call() -> String {
    "rustdemo".to_string()
}

fn default_release() -> String {
    "rustdemo_free".to_string()
}

impl Default for Symbols {
    fn default() -> Self {
        Self {
            call: default_call(),
            release: default_release(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeManifest {
    #[serde(rename = "spec-version")]
    pub spec_version: String,
    #[serde(default)]
    pub symbols: Symbols,
    pub platforms: BTreeMap<String, PlatformLibrary>,
}

impl BridgeManifest {
    pub fn from_str(s: &str) -> Result<Self> {
        let res: BridgeManifest = serde_json::from_str(s)?;
        if res.spec_version != SPEC_VERSION {
            return Err(anyhow!("Unsupported spec version: {}", res.spec_version));
        }

        Ok(res)
    }

    pub fn to_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }

    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read manifest {}: {}", path.display(), e))?;
        Self::from_str(&s)
    }

    pub fn platform(&self, platform: &str) -> Option<&PlatformLibrary> {
        self.platforms.get(platform)
    }
}
