//! Configuration directory loader
//!
//! Reads every configuration file once at startup:
//!
//! | File pattern   | Content                                             |
//! |----------------|-----------------------------------------------------|
//! | `*_event.yml`  | one [`EventConfig`]                                 |
//! | `*_addr.yml`   | one [`AddressRuleSet`]                              |
//! | `*-rules.yml`  | list of [`Rule`]s; event type from the file name    |
//! | `policy.yml`   | optional [`IngestionPolicy`] overrides              |
//!
//! `.yaml` works wherever `.yml` does. Other files are ignored.

use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

use cie_common::{CieError, Result};

use crate::config::{AddressRuleSet, EventConfig, EventRegistry};
use crate::policy::IngestionPolicy;
use crate::rules::{Rule, RuleEngine};

/// Everything read from a configuration directory
#[derive(Debug)]
pub struct LoadedConfig {
    pub registry: EventRegistry,
    pub rules: RuleEngine,
    pub policy: IngestionPolicy,
}

#[derive(Debug, PartialEq, Eq)]
enum ConfigFile {
    Event,
    Address,
    Rules(String),
    Policy,
}

fn classify(path: &Path) -> Option<ConfigFile> {
    let name = path.file_name()?.to_str()?.to_lowercase();
    let stem = name
        .strip_suffix(".yml")
        .or_else(|| name.strip_suffix(".yaml"))?;

    if stem == "policy" {
        Some(ConfigFile::Policy)
    } else if stem.ends_with("_event") {
        Some(ConfigFile::Event)
    } else if stem.ends_with("_addr") {
        Some(ConfigFile::Address)
    } else {
        stem.strip_suffix("-rules")
            .filter(|event| !event.is_empty())
            .map(|event| ConfigFile::Rules(event.to_uppercase()))
    }
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    serde_yaml::from_str(&text).map_err(|e| CieError::yaml(path, e))
}

/// Load and validate the configuration directory.
///
/// # Errors
///
/// Unreadable or malformed files, rule files with invalid payload paths, and
/// every registry defect [`crate::config::RegistryBuilder::build`] rejects.
pub fn load_config(dir: &Path) -> Result<LoadedConfig> {
    if !dir.is_dir() {
        return Err(CieError::config(format!(
            "configuration directory {} does not exist",
            dir.display()
        )));
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    paths.sort();

    let mut builder = EventRegistry::builder();
    let mut rules = RuleEngine::new();
    let mut policy = IngestionPolicy::default();

    for path in paths.iter().filter(|p| p.is_file()) {
        let Some(kind) = classify(path) else {
            tracing::debug!(file = %path.display(), "Ignoring non-configuration file");
            continue;
        };

        match kind {
            ConfigFile::Event => {
                let event: EventConfig = read_yaml(path)?;
                tracing::info!(
                    file = %path.display(),
                    event_name = %event.event_name,
                    tables = event.tables.len(),
                    "Loaded event configuration"
                );
                builder = builder.event(event);
            },
            ConfigFile::Address => {
                let set: AddressRuleSet = read_yaml(path)?;
                tracing::info!(
                    file = %path.display(),
                    event_name = %set.event_name,
                    rules = set.addresses.len(),
                    "Loaded address rules"
                );
                builder = builder.address_rules(set);
            },
            ConfigFile::Rules(event_type) => {
                let list: Vec<Rule> = read_yaml(path)?;
                for rule in &list {
                    rule.validate().map_err(|e| {
                        CieError::config(format!("rule '{}' in {}: {}", rule.name, path.display(), e))
                    })?;
                }
                if rules.rules_for(&event_type).is_some() {
                    return Err(CieError::config(format!(
                        "rules for event type '{}' defined more than once",
                        event_type
                    )));
                }
                tracing::info!(file = %path.display(), event_type = %event_type, rules = list.len(), "Loaded rules");
                rules.insert(&event_type, list);
            },
            ConfigFile::Policy => {
                policy = read_yaml(path)?;
                tracing::info!(file = %path.display(), "Loaded ingestion policy");
            },
        }
    }

    let registry = builder.build()?;
    if registry.is_empty() {
        tracing::warn!(dir = %dir.display(), "No event configurations found");
    }

    Ok(LoadedConfig {
        registry,
        rules,
        policy,
    })
}
