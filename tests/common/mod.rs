// Shared recording fakes for the orchestration tests. Each fake implements
// one transport/backend contract and records every call it receives.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use outpost::backends::{ExecSpec, ExecutionBackend};
use outpost::project::RemoteHost;
use outpost::transport::{
    CommandOutput, FileTransfer, RemoteShell, RunOpts, SessionFactory, TransferOptions,
};

#[derive(Debug, Clone)]
pub struct TransferCall {
    pub source: String,
    pub target: String,
    pub hook: Option<String>,
    pub exclude: Vec<String>,
    pub dry_run: bool,
}

#[derive(Default)]
pub struct RecordingTransfer {
    pub calls: Mutex<Vec<TransferCall>>,
}

impl RecordingTransfer {
    pub fn calls(&self) -> Vec<TransferCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileTransfer for RecordingTransfer {
    async fn transfer(
        &self,
        source: &str,
        target: &str,
        opts: &TransferOptions,
    ) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(TransferCall {
            source: source.to_string(),
            target: target.to_string(),
            hook: opts.rsync_path_hook.clone(),
            exclude: opts.exclude.clone(),
            dry_run: opts.dry_run,
        });
        Ok(())
    }
}

/// Records every command and replays scripted outputs in order, falling
/// back to exit 0 with empty stdout once the script runs out.
#[derive(Default)]
pub struct RecordingShell {
    pub commands: Mutex<Vec<String>>,
    pub responses: Mutex<VecDeque<CommandOutput>>,
}

impl RecordingShell {
    pub fn respond(&self, stdout: &str, exit_code: i32) {
        self.responses.lock().unwrap().push_back(CommandOutput {
            stdout: stdout.to_string(),
            exit_code,
        });
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteShell for RecordingShell {
    async fn run(&self, command: &str, _opts: &RunOpts) -> anyhow::Result<CommandOutput> {
        self.commands.lock().unwrap().push(command.to_string());
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(CommandOutput {
                stdout: String::new(),
                exit_code: 0,
            }))
    }
}

/// Hands the same shell to every connect call, whatever the host.
pub struct FixedSessions(pub Arc<RecordingShell>);

impl SessionFactory for FixedSessions {
    fn connect(&self, _remote: &RemoteHost) -> Arc<dyn RemoteShell> {
        self.0.clone()
    }
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub specs: Mutex<Vec<ExecSpec>>,
}

impl RecordingBackend {
    pub fn specs(&self) -> Vec<ExecSpec> {
        self.specs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionBackend for RecordingBackend {
    async fn execute(&self, spec: &ExecSpec) -> anyhow::Result<()> {
        self.specs.lock().unwrap().push(spec.clone());
        Ok(())
    }
}
