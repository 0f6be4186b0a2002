// src/transport.rs
//
// =============================================================================
// OUTPOST: TRANSPORT PRIMITIVES
// =============================================================================
//
// The Wire.
//
// Responsibilities:
// 1. `RemoteShell`: run a command on a remote host, capture stdout and the
//    exit code. Production impl spawns the system `ssh` binary.
// 2. `FileTransfer`: one-way mirrored copy between a local path and a
//    `user@host:path` endpoint. Production impl spawns `rsync`.
// 3. `SessionFactory`: open sessions without the caller knowing the
//    concrete transport.
//
// One synchronous attempt per action; timeouts and retries are left to the
// underlying tools.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::str::FromStr;
use std::sync::Arc;
use tokio::process::Command;

use crate::error::Error;
use crate::project::RemoteHost;

// ============================================================================
// 1. DATA TYPES
// ============================================================================

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A port-forwarding spec in ssh's `bind:host:hostport` form. A bare port
/// `"8080"` is shorthand for `8080:localhost:8080`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardSpec {
    pub bind_port: u16,
    pub host: String,
    pub host_port: u16,
}

impl FromStr for ForwardSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some((bind, rest)) = s.split_once(':') {
            let (host, port) = rest
                .split_once(':')
                .with_context(|| format!("expected \"bind:host:hostport\", got \"{s}\""))?;
            Ok(Self {
                bind_port: bind.parse().context("invalid bind port")?,
                host: host.to_string(),
                host_port: port.parse().context("invalid host port")?,
            })
        } else {
            let port: u16 = s.parse().with_context(|| {
                format!("expected a port number or \"bind:host:hostport\", got \"{s}\"")
            })?;
            Ok(Self {
                bind_port: port,
                host: "localhost".to_string(),
                host_port: port,
            })
        }
    }
}

impl fmt::Display for ForwardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.bind_port, self.host, self.host_port)
    }
}

/// Per-run session options.
#[derive(Debug, Clone, Default)]
pub struct RunOpts {
    /// Suppress echoing remote stdout locally. Listing queries and batch
    /// submissions parse stdout instead of showing it.
    pub hide_output: bool,
    pub x_forward: bool,
    pub local_forward: Option<ForwardSpec>,
    pub remote_forward: Option<ForwardSpec>,
}

#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    /// Remote-side command hook (`--rsync-path`). Used to create target
    /// directories atomically-with the transfer itself.
    pub rsync_path_hook: Option<String>,
    pub exclude: Vec<String>,
    pub dry_run: bool,
}

// ============================================================================
// 2. THE CONTRACTS
// ============================================================================

#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Runs `command` on the remote host. Returns captured stdout and the
    /// exit code; a non-zero exit is not an `Err` here, interpreting it is
    /// the caller's decision.
    async fn run(&self, command: &str, opts: &RunOpts) -> Result<CommandOutput>;
}

#[async_trait]
pub trait FileTransfer: Send + Sync {
    /// One-way mirrored copy of `source`'s contents into `target`. Either
    /// side may be a `user@host:path` endpoint.
    async fn transfer(&self, source: &str, target: &str, opts: &TransferOptions) -> Result<()>;
}

pub trait SessionFactory: Send + Sync {
    fn connect(&self, remote: &RemoteHost) -> Arc<dyn RemoteShell>;
}

// ============================================================================
// 3. SSH SESSION
// ============================================================================

pub struct SshSession {
    remote: RemoteHost,
}

impl SshSession {
    pub fn new(remote: RemoteHost) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl RemoteShell for SshSession {
    async fn run(&self, command: &str, opts: &RunOpts) -> Result<CommandOutput> {
        let mut cmd = Command::new("ssh");
        // Fail instead of hanging on a password prompt.
        cmd.arg("-o").arg("BatchMode=yes");
        if opts.x_forward {
            cmd.arg("-X");
        }
        if let Some(fw) = &opts.local_forward {
            cmd.arg("-L").arg(fw.to_string());
        }
        if let Some(fw) = &opts.remote_forward {
            cmd.arg("-R").arg(fw.to_string());
        }
        cmd.arg(self.remote.base_uri());
        cmd.arg(command);

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = cmd
            .output()
            .await
            .with_context(|| format!("failed to spawn ssh to {}", self.remote))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !opts.hide_output {
            for line in stdout.lines() {
                println!("{line}");
            }
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                log::warn!("ssh stderr: {}", stderr.trim());
            }
        }

        Ok(CommandOutput {
            stdout,
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

pub struct SshSessionFactory;

impl SessionFactory for SshSessionFactory {
    fn connect(&self, remote: &RemoteHost) -> Arc<dyn RemoteShell> {
        Arc::new(SshSession::new(remote.clone()))
    }
}

// ============================================================================
// 4. RSYNC TRANSFER
// ============================================================================

pub struct Rsync;

#[async_trait]
impl FileTransfer for Rsync {
    async fn transfer(&self, source: &str, target: &str, opts: &TransferOptions) -> Result<()> {
        let mut cmd = Command::new("rsync");
        cmd.arg("-avz");
        if let Some(hook) = &opts.rsync_path_hook {
            cmd.arg(format!("--rsync-path={hook}"));
        }
        for pattern in &opts.exclude {
            cmd.arg("--exclude").arg(pattern);
        }
        if opts.dry_run {
            cmd.arg("--dry-run");
        }
        // Trailing slash on the source: mirror its contents, not the
        // directory entry itself.
        cmd.arg(format!("{}/", source.trim_end_matches('/')));
        cmd.arg(target);

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = cmd.output().await.context("failed to spawn rsync")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::error!("rsync {} -> {} failed:\n{}", source, target, stderr.trim());
            return Err(Error::TransferFailed {
                tool: "rsync".to_string(),
                code: output.status.code().unwrap_or(-1),
            }
            .into());
        }
        Ok(())
    }
}
