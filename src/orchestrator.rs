// src/orchestrator.rs
//
// =============================================================================
// OUTPOST: RUN ORCHESTRATOR
// =============================================================================
//
// The Conductor.
//
// One `run` is a fixed sequence, no step reordered, no step skipped:
//
// 1. Resolve the machine (fail fast on an unknown name).
// 2. Resolve the project path layout.
// 3. Resolve the execution mode.
// 4. Merge the environment (machine overrides project).
// 5. Push sync. Every mode deploys, even ones that could run without it.
// 6. Execute on the resolved backend, through the sweep driver when a
//    range is present (slurm only).
// 7. Pull sync. Runs only when step 6 succeeded: a failed execution aborts
//    the invocation, so half-written remote artifacts are never mirrored
//    over local ones.

use anyhow::{ensure, Result};
use std::path::{Path, PathBuf};

use crate::backends::{resolve_mode, BackendFactory, BackendRequest, ExecSpec, Mode};
use crate::config::{Config, MachineConfig};
use crate::error::Error;
use crate::project::{Project, RemoteHost};
use crate::sweep::{SweepDriver, SweepRange};
use crate::sync::SyncOrchestrator;
use crate::transport::{FileTransfer, ForwardSpec, SessionFactory};

// ============================================================================
// 1. REQUESTS
// ============================================================================

/// A fully parsed `run` invocation. Constructed by the CLI, consumed once.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub machine: String,
    pub mode: Option<Mode>,
    /// Command to execute remotely; never empty.
    pub command: Vec<String>,
    /// Local project root (mirrored to the remote root).
    pub root_dir: PathBuf,
    /// Where the caller stood inside the project; the remote command runs
    /// from the same offset.
    pub workdir: PathBuf,
    pub disown: bool,
    pub x_forward: bool,
    pub local_forward: Option<ForwardSpec>,
    pub remote_forward: Option<ForwardSpec>,
    pub image: Option<String>,
    pub num_sequence: u32,
    pub slurm_conf: Option<String>,
    pub sweep: Option<SweepRange>,
    pub dry_run: bool,
    pub project_name: Option<String>,
    pub output_dir: Option<PathBuf>,
}

/// A `sync` invocation: deploy only, no execution, no pull.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub machine: String,
    pub root_dir: PathBuf,
    pub project_name: Option<String>,
    pub dry_run: bool,
}

// ============================================================================
// 2. ORCHESTRATOR
// ============================================================================

pub struct RunOrchestrator<'a> {
    config: &'a Config,
    transfer: &'a dyn FileTransfer,
    sessions: &'a dyn SessionFactory,
}

impl<'a> RunOrchestrator<'a> {
    pub fn new(
        config: &'a Config,
        transfer: &'a dyn FileTransfer,
        sessions: &'a dyn SessionFactory,
    ) -> Self {
        Self {
            config,
            transfer,
            sessions,
        }
    }

    /// Project layout: the name comes from the request, then the project
    /// config, then the root directory's own name. The remote root hangs
    /// off the machine's `root_dir` when it has one.
    fn project_for(
        &self,
        name_override: Option<&str>,
        root_dir: &Path,
        output_dir: Option<PathBuf>,
        machine: &MachineConfig,
    ) -> Project {
        let name = name_override
            .map(str::to_string)
            .or_else(|| self.config.project.as_ref().and_then(|p| p.name.clone()))
            .unwrap_or_else(|| {
                root_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "project".to_string())
            });
        let out_dir = output_dir
            .or_else(|| self.config.project.as_ref().and_then(|p| p.output_dir.clone()));
        Project::new(name, root_dir.to_path_buf(), machine.root_dir.as_deref(), out_dir)
    }

    pub async fn run(&self, request: &RunRequest) -> Result<()> {
        ensure!(!request.command.is_empty(), "remote command is empty");

        // 1. MACHINE
        let machine = self.config.machine(&request.machine)?;
        let remote = RemoteHost::new(&machine.user, &machine.host);

        // 2. LAYOUT
        let project = self.project_for(
            request.project_name.as_deref(),
            &request.root_dir,
            request.output_dir.clone(),
            machine,
        );
        log::info!("project: {project:?}");

        // 3. MODE
        let mode = resolve_mode(request.mode, machine)?;
        log::info!("mode: {mode} on {remote}");

        // Docker cannot simulate: reject before anything touches the wire.
        if mode == Mode::Docker && request.dry_run {
            return Err(Error::DockerDryRun.into());
        }

        // 4. ENVIRONMENT
        let env = self.config.merged_environment(machine);

        // 5. PUSH
        let shell = self.sessions.connect(&remote);
        let sync = SyncOrchestrator::new(self.transfer, shell.as_ref());
        sync.push(
            &remote,
            &project,
            &self.config.exclude_patterns(),
            request.dry_run,
        )
        .await?;

        // 6. EXECUTE
        if request.sweep.is_some() && mode != Mode::Slurm {
            return Err(Error::SweepRequiresSlurm(mode).into());
        }

        let backend = BackendFactory::build(
            mode,
            self.config,
            machine,
            &project,
            shell.clone(),
            &BackendRequest {
                image: request.image.as_deref(),
                slurm_conf: request.slurm_conf.as_deref(),
                num_sequence: request.num_sequence,
                disown: request.disown,
                dry_run: request.dry_run,
            },
        )?;

        let spec = ExecSpec {
            command: request.command.clone(),
            workdir: request.workdir.clone(),
            startup: machine.startup.clone(),
            env,
            disown: request.disown,
            x_forward: request.x_forward,
            local_forward: request.local_forward.clone(),
            remote_forward: request.remote_forward.clone(),
            dry_run: request.dry_run,
        };

        match &request.sweep {
            Some(range) => SweepDriver::new(backend.as_ref(), *range).drive(&spec).await?,
            None => backend.execute(&spec).await?,
        }

        // 7. PULL
        if request.disown {
            log::info!("command was disowned; remote outputs may not exist yet");
        }
        sync.pull(&remote, &project, request.dry_run).await
    }

    /// Deploy without executing: steps 1, 2 and 5 of `run`.
    pub async fn sync(&self, request: &SyncRequest) -> Result<()> {
        let machine = self.config.machine(&request.machine)?;
        let remote = RemoteHost::new(&machine.user, &machine.host);
        let project =
            self.project_for(request.project_name.as_deref(), &request.root_dir, None, machine);
        log::info!("project: {project:?}");

        let shell = self.sessions.connect(&remote);
        let sync = SyncOrchestrator::new(self.transfer, shell.as_ref());
        sync.push(
            &remote,
            &project,
            &self.config.exclude_patterns(),
            request.dry_run,
        )
        .await
    }
}
