// src/backends/docker.rs
//
// =============================================================================
// OUTPOST: DOCKER BACKEND
// =============================================================================
//
// Drives the docker CLI on the target host through the SSH session. The
// control plane rides the same transport as everything else; no local
// docker socket is involved.
//
// Semantics:
// - The command runs shell-wrapped inside the container.
// - GPU passthrough is always requested in this mode.
// - The synced project tree is bind-mounted at its remote path so paths
//   match between host and container.
// - Dry-run is rejected at the factory; the check here is a backstop.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::backends::{utils, ExecSpec, ExecutionBackend};
use crate::error::Error;
use crate::project::Project;
use crate::transport::{RemoteShell, RunOpts};

#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Fully resolved image reference.
    pub image: String,
    /// Container name, `{user}-{project}`.
    pub name: String,
}

pub struct DockerBackend {
    shell: Arc<dyn RemoteShell>,
    project: Project,
    container: ContainerSpec,
}

impl DockerBackend {
    pub fn new(shell: Arc<dyn RemoteShell>, project: Project, container: ContainerSpec) -> Self {
        Self {
            shell,
            project,
            container,
        }
    }
}

impl std::fmt::Debug for DockerBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerBackend")
            .field("project", &self.project)
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ExecutionBackend for DockerBackend {
    async fn execute(&self, spec: &ExecSpec) -> Result<()> {
        if spec.dry_run {
            return Err(Error::DockerDryRun.into());
        }

        let remote_root = self.project.remote_root.as_ref().ok_or_else(|| {
            Error::MissingRemoteRoot {
                project: self.project.name.clone(),
            }
        })?;
        let workdir = utils::resolve_workdir(remote_root, spec);

        let mut docker: Vec<String> = vec![
            "docker".into(),
            "run".into(),
            "--rm".into(),
            "--gpus".into(),
            "all".into(),
            "--name".into(),
            self.container.name.clone(),
            "-v".into(),
            format!("{}:{}", remote_root.display(), remote_root.display()),
            "-w".into(),
            workdir.to_string_lossy().into_owned(),
        ];

        let mut keys: Vec<&String> = spec.env.keys().collect();
        keys.sort();
        for key in keys {
            docker.push("-e".into());
            docker.push(format!("{}={}", key, spec.env[key]));
        }

        if spec.disown {
            docker.push("--detach".into());
        }

        docker.push(self.container.image.clone());

        // Shell-wrapped execution inside the container.
        let mut inner = Vec::new();
        if let Some(startup) = &spec.startup {
            if !startup.trim().is_empty() {
                inner.push(startup.trim().to_string());
            }
        }
        inner.push(utils::join_command(&spec.command));
        docker.push("/bin/bash".into());
        docker.push("-c".into());
        docker.push(inner.join(" && "));

        let command = utils::join_command(&docker);
        let opts = RunOpts {
            hide_output: false,
            x_forward: spec.x_forward,
            ..Default::default()
        };
        let output = self.shell.run(&command, &opts).await?;

        if !spec.disown && !output.success() {
            return Err(Error::RemoteExit {
                command,
                code: output.exit_code,
            }
            .into());
        }
        Ok(())
    }
}
