// src/backends.rs
//
// =============================================================================
// OUTPOST: EXECUTION BACKENDS & DISPATCH
// =============================================================================
//
// The Hexagonal Port.
//
// Responsibilities:
// 1. Define the `ExecutionBackend` trait (The Contract).
// 2. Resolve the execution mode (explicit > machine default > ssh).
// 3. Dispatch a resolved `Mode` to a concrete backend implementation.
// 4. Provide shared shell-composition utilities.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::{Config, MachineConfig, SlurmJobConfig};
use crate::error::Error;
use crate::project::Project;
use crate::transport::{ForwardSpec, RemoteShell};

// Declare the concrete implementations
pub mod docker;
pub mod slurm;
pub mod ssh;

// ============================================================================
// 1. MODE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Ssh,
    Docker,
    Slurm,
    Singularity,
    SingSlurm,
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "ssh" => Ok(Mode::Ssh),
            "docker" => Ok(Mode::Docker),
            "slurm" => Ok(Mode::Slurm),
            "singularity" => Ok(Mode::Singularity),
            "sing-slurm" => Ok(Mode::SingSlurm),
            other => Err(Error::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Mode::Ssh => "ssh",
            Mode::Docker => "docker",
            Mode::Slurm => "slurm",
            Mode::Singularity => "singularity",
            Mode::SingSlurm => "sing-slurm",
        };
        f.write_str(text)
    }
}

/// Mode precedence: the explicit request wins, then the machine's
/// `default_mode`, then plain ssh. A `default_mode` string outside the
/// known set is a configuration error, not a fallback.
pub fn resolve_mode(requested: Option<Mode>, machine: &MachineConfig) -> Result<Mode, Error> {
    if let Some(mode) = requested {
        return Ok(mode);
    }
    match &machine.default_mode {
        Some(text) => text.parse(),
        None => Ok(Mode::Ssh),
    }
}

// ============================================================================
// 2. THE BACKEND TRAIT (The Contract)
// ============================================================================

/// Everything a backend needs to run one remote command. Cloned per sweep
/// iteration so no two submissions ever share an environment map.
#[derive(Debug, Clone)]
pub struct ExecSpec {
    pub command: Vec<String>,
    /// Working directory relative to the project's remote root.
    pub workdir: PathBuf,
    /// Machine-configured shell snippet run before the command.
    pub startup: Option<String>,
    pub env: HashMap<String, String>,
    pub disown: bool,
    pub x_forward: bool,
    pub local_forward: Option<ForwardSpec>,
    pub remote_forward: Option<ForwardSpec>,
    pub dry_run: bool,
}

#[async_trait]
pub trait ExecutionBackend: Send + Sync + std::fmt::Debug {
    /// Runs the command on the target. Raises on a non-zero remote exit
    /// unless the spec disowns the process.
    async fn execute(&self, spec: &ExecSpec) -> Result<()>;
}

// ============================================================================
// 3. THE DISPATCHER (The Factory)
// ============================================================================

/// Knobs that select and parameterize a backend but are not part of the
/// per-execution spec.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendRequest<'a> {
    pub image: Option<&'a str>,
    pub slurm_conf: Option<&'a str>,
    pub num_sequence: u32,
    pub disown: bool,
    pub dry_run: bool,
}

pub struct BackendFactory;

impl BackendFactory {
    /// Returns a boxed backend for the resolved mode. Mode-specific
    /// configuration errors surface here, before any remote action.
    pub fn build(
        mode: Mode,
        config: &Config,
        machine: &MachineConfig,
        project: &Project,
        shell: Arc<dyn RemoteShell>,
        request: &BackendRequest<'_>,
    ) -> Result<Box<dyn ExecutionBackend>> {
        match mode {
            Mode::Ssh => Ok(Box::new(ssh::SshBackend::new(shell, project.clone()))),

            Mode::Docker => {
                if request.dry_run {
                    return Err(Error::DockerDryRun.into());
                }
                let image = resolve_image(request.image, config, machine)?;
                let container = docker::ContainerSpec {
                    image,
                    name: format!("{}-{}", machine.user, project.name),
                };
                log::info!("docker container: {:?}", container);
                Ok(Box::new(docker::DockerBackend::new(
                    shell,
                    project.clone(),
                    container,
                )))
            }

            Mode::Slurm => {
                let conf = resolve_slurm_config(request.slurm_conf, config, machine)?;
                log::info!("slurm config: {:?}", conf);
                Ok(Box::new(slurm::SlurmBackend::new(
                    shell,
                    project.clone(),
                    conf,
                    request.num_sequence,
                )))
            }

            Mode::Singularity | Mode::SingSlurm => Err(Error::Unimplemented(mode).into()),
        }
    }
}

/// An explicit identifier is first treated as an alias from the
/// `docker-images` table, otherwise as a literal image reference. Without
/// one, the machine's configured default image applies.
pub fn resolve_image(
    requested: Option<&str>,
    config: &Config,
    machine: &MachineConfig,
) -> Result<String, Error> {
    if let Some(id) = requested {
        return Ok(config
            .docker_images
            .get(id)
            .map(|img| img.name.clone())
            .unwrap_or_else(|| id.to_string()));
    }
    machine
        .docker
        .as_ref()
        .map(|d| d.name.clone())
        .ok_or(Error::UnresolvedImage)
}

/// A named entry must exist; without a name the machine's `slurm` block
/// applies, or an empty config (cluster defaults) if the machine has none.
pub fn resolve_slurm_config(
    requested: Option<&str>,
    config: &Config,
    machine: &MachineConfig,
) -> Result<SlurmJobConfig, Error> {
    match requested {
        Some(name) => config
            .slurm_configs
            .get(name)
            .cloned()
            .ok_or_else(|| Error::MissingSlurmConfig(name.to_string())),
        None => Ok(machine.slurm.clone().unwrap_or_default()),
    }
}

// ============================================================================
// 4. HELPER: SHELL COMPOSITION
// ============================================================================

/// Shared helpers for turning an `ExecSpec` into one remote shell line.
/// All backends go through these so quoting behaves identically everywhere.
pub mod utils {
    use super::*;
    use std::path::Path;

    /// Single-quotes a string for POSIX shells. Plain words pass through
    /// untouched to keep the composed lines readable in logs.
    pub fn sh_quote(text: &str) -> String {
        let plain = !text.is_empty()
            && text
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "_-./=:@%+,".contains(c));
        if plain {
            text.to_string()
        } else {
            format!("'{}'", text.replace('\'', r"'\''"))
        }
    }

    pub fn join_command(command: &[String]) -> String {
        command
            .iter()
            .map(|arg| sh_quote(arg))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `export K=V ...` with keys sorted, so the composed line is stable
    /// across runs. None when there is nothing to export.
    pub fn export_string(env: &HashMap<String, String>) -> Option<String> {
        if env.is_empty() {
            return None;
        }
        let mut keys: Vec<&String> = env.keys().collect();
        keys.sort();
        let assignments = keys
            .iter()
            .map(|key| format!("{}={}", key, sh_quote(&env[*key])))
            .collect::<Vec<_>>()
            .join(" ");
        Some(format!("export {assignments}"))
    }

    /// The working directory for a spec: the remote root itself when the
    /// caller invoked from the project root.
    pub fn resolve_workdir(remote_root: &Path, spec: &ExecSpec) -> PathBuf {
        if spec.workdir.as_os_str().is_empty() || spec.workdir == Path::new(".") {
            remote_root.to_path_buf()
        } else {
            remote_root.join(&spec.workdir)
        }
    }

    /// Composes the full remote invocation: enter the workdir, export the
    /// environment, run the startup snippet, then the user command.
    pub fn compose_remote_command(remote_root: &Path, spec: &ExecSpec) -> String {
        let workdir = resolve_workdir(remote_root, spec);
        let mut parts = vec![format!("cd {}", sh_quote(&workdir.to_string_lossy()))];
        if let Some(export) = export_string(&spec.env) {
            parts.push(export);
        }
        if let Some(startup) = &spec.startup {
            if !startup.trim().is_empty() {
                parts.push(startup.trim().to_string());
            }
        }
        parts.push(join_command(&spec.command));
        parts.join(" && ")
    }
}
