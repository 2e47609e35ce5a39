use crate::alternate::AlternateConfig;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_INPUT: &str = "Go say: Hello Rust";

/// Which concurrency backend drives the alternating counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    /// Two OS threads over a zero-capacity channel.
    #[default]
    Thread,
    /// Two tokio tasks relaying oneshot batons.
    Task,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeSection {
    /// Manifest of the library to call; `None` uses the linked exports.
    pub manifest: Option<PathBuf>,
    pub platform: Option<String>,
    pub input: String,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            manifest: None,
            platform: None,
            input: DEFAULT_INPUT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlternateSection {
    pub seed: u64,
    /// `null` runs until stopped.
    pub rounds: Option<u64>,
    pub workers: [u32; 2],
    pub runtime: Runtime,
}

impl Default for AlternateSection {
    fn default() -> Self {
        let counter = AlternateConfig::default();
        Self {
            seed: counter.seed,
            rounds: counter.rounds,
            workers: counter.workers,
            runtime: Runtime::default(),
        }
    }
}

impl AlternateSection {
    pub fn counter(&self) -> AlternateConfig {
        AlternateConfig {
            seed: self.seed,
            rounds: self.rounds,
            workers: self.workers,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HandoffConfig {
    pub bridge: BridgeSection,
    pub alternate: AlternateSection,
}

impl HandoffConfig {
    pub fn from_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(Into::into)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config {}: {}", path.display(), e))?;
        let mut config = Self::from_str(&s)
            .map_err(|e| anyhow!("Invalid config {}: {}", path.display(), e))?;

        // Manifest paths in the file are relative to the file itself.
        if let Some(manifest) = config.bridge.manifest.as_mut() {
            if manifest.is_relative() {
                if let Some(dir) = path.parent() {
                    *manifest = dir.join(&*manifest);
                }
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = HandoffConfig::from_str("{}").unwrap();

        assert_eq!(config, HandoffConfig::default());
        assert_eq!(config.bridge.input, DEFAULT_INPUT);
        assert_eq!(config.alternate.counter().rounds, Some(10));
        assert_eq!(config.alternate.runtime, Runtime::Thread);
    }

    #[test]
    fn parses_every_field() {
        let config = HandoffConfig::from_str(
            r#"{
                "bridge": { "manifest": "bridge.json", "platform": "any", "input": "golang" },
                "alternate": { "seed": 4, "rounds": null, "workers": [3, 8], "runtime": "task" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.bridge.manifest, Some(PathBuf::from("bridge.json")));
        assert_eq!(config.bridge.platform.as_deref(), Some("any"));
        assert_eq!(config.bridge.input, "golang");
        assert_eq!(
            config.alternate.counter(),
            AlternateConfig {
                seed: 4,
                rounds: None,
                workers: [3, 8],
            }
        );
        assert_eq!(config.alternate.runtime, Runtime::Task);
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(HandoffConfig::from_str(r#"{ "bridge": { "inptu": "x" } }"#).is_err());
    }

    #[test]
    fn manifest_is_relative_to_the_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("handoff.json");
        std::fs::write(&path, r#"{ "bridge": { "manifest": "libs/bridge.json" } }"#).unwrap();

        let config = HandoffConfig::from_file(&path).unwrap();
        assert_eq!(
            config.bridge.manifest,
            Some(dir.path().join("libs/bridge.json"))
        );
    }
}
