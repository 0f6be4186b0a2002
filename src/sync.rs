// src/sync.rs
//
// =============================================================================
// OUTPOST: SYNC ORCHESTRATOR
// =============================================================================
//
// The Courier.
//
// Responsibilities:
// 1. Push: mirror the local project root to the machine's remote root,
//    creating the remote directories in the same transfer invocation.
// 2. Pull: collect remote outputs, but only when there are any.
//
// Transport errors propagate unrecovered. A push that failed means nothing
// was deployed; a pull that failed means outputs stayed remote.

use anyhow::{Context, Result};

use crate::error::Error;
use crate::project::{Project, RemoteHost};
use crate::transport::{FileTransfer, RemoteShell, RunOpts, TransferOptions};

pub struct SyncOrchestrator<'a> {
    transfer: &'a dyn FileTransfer,
    shell: &'a dyn RemoteShell,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(transfer: &'a dyn FileTransfer, shell: &'a dyn RemoteShell) -> Self {
        Self { transfer, shell }
    }

    /// Mirrors the project root to the remote root. The remote root and
    /// output directory are created through the transfer's remote-side
    /// command hook, so the transfer is never attempted against a missing
    /// destination (works on a machine that has never seen this project).
    pub async fn push(
        &self,
        remote: &RemoteHost,
        project: &Project,
        exclude: &[String],
        dry_run: bool,
    ) -> Result<()> {
        let remote_root = project.remote_root.as_ref().ok_or_else(|| {
            Error::MissingRemoteRoot {
                project: project.name.clone(),
            }
        })?;
        let remote_out = remote_root.join(crate::project::REMOTE_OUT_DIR);

        let hook = format!(
            "mkdir -p {} && mkdir -p {} && rsync",
            remote_root.display(),
            remote_out.display()
        );
        let opts = TransferOptions {
            rsync_path_hook: Some(hook),
            exclude: exclude.to_vec(),
            dry_run,
        };

        log::info!(
            "Syncing {} -> {}",
            project.root_dir.display(),
            remote.uri(remote_root)
        );
        self.transfer
            .transfer(
                &project.root_dir.to_string_lossy(),
                &remote.uri(remote_root),
                &opts,
            )
            .await
    }

    /// Copies the remote output directory back into the project's local
    /// output directory. No local output directory configured means nothing
    /// to do; an empty remote output directory skips the transfer, so no
    /// empty local directory appears and rsync never sees an empty source.
    pub async fn pull(&self, remote: &RemoteHost, project: &Project, dry_run: bool) -> Result<()> {
        let Some(out_dir) = &project.out_dir else {
            return Ok(());
        };
        let Some(remote_out) = project.remote_out() else {
            // No remote root, so nothing was ever deployed.
            return Ok(());
        };

        // The first line of `ls -l` is always `total N`.
        let listing = format!(
            "ls -l {} | grep -v \"^total\" | wc -l",
            remote_out.display()
        );
        let result = self
            .shell
            .run(
                &listing,
                &RunOpts {
                    hide_output: true,
                    ..Default::default()
                },
            )
            .await?;
        let num_entries: usize = result
            .stdout
            .trim()
            .parse()
            .with_context(|| format!("unexpected listing output: {:?}", result.stdout))?;

        log::info!("{} files are in the remote output directory", num_entries);
        if num_entries == 0 {
            return Ok(());
        }

        self.transfer
            .transfer(
                &remote.uri(&remote_out),
                &out_dir.to_string_lossy(),
                &TransferOptions {
                    dry_run,
                    ..Default::default()
                },
            )
            .await
    }
}
