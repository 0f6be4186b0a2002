// src/backends/ssh.rs
//
// =============================================================================
// OUTPOST: SSH BACKEND
// =============================================================================
//
// The plain path: one remote shell line over the session. Blocking by
// default; `disown` launches and detaches, giving up stdout/stderr.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::backends::{utils, ExecSpec, ExecutionBackend};
use crate::error::Error;
use crate::project::Project;
use crate::transport::{RemoteShell, RunOpts};

pub struct SshBackend {
    shell: Arc<dyn RemoteShell>,
    project: Project,
}

impl SshBackend {
    pub fn new(shell: Arc<dyn RemoteShell>, project: Project) -> Self {
        Self { shell, project }
    }
}

impl std::fmt::Debug for SshBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshBackend")
            .field("project", &self.project)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ExecutionBackend for SshBackend {
    async fn execute(&self, spec: &ExecSpec) -> Result<()> {
        // Forwarding needs a live session to carry the tunnel.
        if spec.disown && (spec.local_forward.is_some() || spec.remote_forward.is_some()) {
            return Err(Error::ForwardWithDisown.into());
        }

        let remote_root = self.project.remote_root.as_ref().ok_or_else(|| {
            Error::MissingRemoteRoot {
                project: self.project.name.clone(),
            }
        })?;

        let mut command = utils::compose_remote_command(remote_root, spec);
        if spec.disown {
            // Detach on the remote side; the session returns right after
            // the launch and no output comes back.
            command = format!(
                "nohup sh -c {} >/dev/null 2>&1 </dev/null &",
                utils::sh_quote(&command)
            );
        }

        if spec.dry_run {
            log::info!("[dry-run] ssh: {command}");
            return Ok(());
        }

        let opts = RunOpts {
            hide_output: false,
            x_forward: spec.x_forward,
            local_forward: spec.local_forward.clone(),
            remote_forward: spec.remote_forward.clone(),
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
