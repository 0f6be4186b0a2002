// src/config.rs
//
// =============================================================================
// OUTPOST: CONFIGURATION
// =============================================================================
//
// The Address Book.
//
// Responsibilities:
// 1. Define the serde schema of the JSON configuration mapping.
// 2. Discover and merge config files (global under $HOME, then project-local).
// 3. Resolve machine entries with a helpful error on unknown names.
// 4. Merge environment maps (machine overrides project on conflict).
//
// Loaded once in main and passed by reference through the whole run; no
// module reads config files on its own.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Project-local config file, also a project-root marker.
pub const PROJECT_CONFIG_NAME: &str = ".outpost.config";

/// Global candidates under $HOME, first hit wins.
const GLOBAL_CONFIG_CANDIDATES: &[&str] = &[".outpost.config", ".config/outpost"];

/// Keys with this name are documentation inside the config file itself and
/// are stripped recursively before deserialization.
const HELP_KEY: &str = "__help";

// ============================================================================
// 1. SCHEMA
// ============================================================================

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub machines: HashMap<String, MachineConfig>,

    #[serde(default)]
    pub rsync: RsyncConfig,

    #[serde(default)]
    pub project: Option<ProjectConfig>,

    #[serde(rename = "docker-images", default)]
    pub docker_images: HashMap<String, DockerImageConfig>,

    #[serde(rename = "slurm-configs", default)]
    pub slurm_configs: HashMap<String, SlurmJobConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MachineConfig {
    pub user: String,
    pub host: String,

    /// Base directory on the machine under which projects are deployed.
    /// Without it the machine can only be addressed, not deployed to.
    #[serde(default)]
    pub root_dir: Option<String>,

    /// Mode used when the invocation does not request one explicitly.
    #[serde(default)]
    pub default_mode: Option<String>,

    #[serde(default)]
    pub environment: HashMap<String, String>,

    /// Shell snippet run on the machine before the user command.
    #[serde(default)]
    pub startup: Option<String>,

    #[serde(default)]
    pub docker: Option<DockerImageConfig>,

    #[serde(default)]
    pub slurm: Option<SlurmJobConfig>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RsyncConfig {
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub environment: HashMap<String, String>,

    #[serde(default)]
    pub rsync: Option<RsyncConfig>,

    /// Local directory remote outputs are pulled into.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DockerImageConfig {
    pub name: String,
}

/// Submission parameters for one Slurm job. Every field is optional; an
/// empty config submits with the cluster defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SlurmJobConfig {
    #[serde(default)]
    pub partition: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub nodes: Option<u32>,
    #[serde(default)]
    pub cpus_per_task: Option<u32>,
    #[serde(default)]
    pub mem: Option<String>,
    #[serde(default)]
    pub gres: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub exclude: Option<String>,
    /// Raw arguments appended to the submission verbatim.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

// ============================================================================
// 2. LOOKUPS & MERGES
// ============================================================================

impl Config {
    /// Resolves a machine by name. The error lists the valid names so a typo
    /// is a one-glance fix.
    pub fn machine(&self, name: &str) -> Result<&MachineConfig, Error> {
        self.machines.get(name).ok_or_else(|| {
            let mut available: Vec<String> = self.machines.keys().cloned().collect();
            available.sort();
            Error::UnknownMachine {
                name: name.to_string(),
                available,
            }
        })
    }

    /// Global excludes first, then project excludes appended verbatim.
    /// Duplicates are kept: rsync treats the list as a filter, so repeating
    /// a pattern changes nothing.
    pub fn exclude_patterns(&self) -> Vec<String> {
        let mut patterns = self.rsync.exclude.clone();
        if let Some(project) = &self.project {
            if let Some(rsync) = &project.rsync {
                patterns.extend(rsync.exclude.iter().cloned());
            }
        }
        patterns
    }

    /// Project-level environment, overridden by machine-level entries on
    /// conflicting keys.
    pub fn merged_environment(&self, machine: &MachineConfig) -> HashMap<String, String> {
        let mut env = self
            .project
            .as_ref()
            .map(|p| p.environment.clone())
            .unwrap_or_default();
        for (key, val) in &machine.environment {
            env.insert(key.clone(), val.clone());
        }
        env
    }
}

// ============================================================================
// 3. DISCOVERY & FILE MERGING
// ============================================================================

/// Loads the configuration for a project: the first global candidate under
/// $HOME, overlaid with the project-local file. The local file wins on
/// conflicting leaves.
pub fn load(project_root: &Path) -> Result<Config> {
    let home = std::env::var("HOME").context("HOME is not set")?;

    let mut global = Value::Object(Default::default());
    for candidate in GLOBAL_CONFIG_CANDIDATES {
        let path = Path::new(&home).join(candidate);
        if path.is_file() {
            global = read_json(&path)?;
            break;
        }
    }

    let local_path = project_root.join(PROJECT_CONFIG_NAME);
    let local = if local_path.is_file() {
        read_json(&local_path)?
    } else {
        Value::Object(Default::default())
    };

    from_values(global, local)
}

/// Strips help keys from both layers, merges, and deserializes. Split out
/// from `load` so the merge semantics are testable without touching $HOME.
pub fn from_values(mut global: Value, mut local: Value) -> Result<Config> {
    strip_help_keys(&mut global);
    strip_help_keys(&mut local);
    let merged = merge_nested(global, local);
    serde_json::from_value(merged).context("invalid configuration")
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Merges `overlay` into `base` recursively. Objects merge key-by-key;
/// any other pair resolves to the overlay value.
pub fn merge_nested(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut a), Value::Object(b)) => {
            for (key, val) in b {
                let merged = match a.remove(&key) {
                    Some(existing) => merge_nested(existing, val),
                    None => val,
                };
                a.insert(key, merged);
            }
            Value::Object(a)
        }
        (_, overlay) => overlay,
    }
}

/// Removes `__help` entries at every nesting level.
pub fn strip_help_keys(value: &mut Value) {
    if let Value::Object(map) = value {
        map.remove(HELP_KEY);
        for (_, val) in map.iter_mut() {
            strip_help_keys(val);
        }
    }
}
