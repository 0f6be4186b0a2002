// src/backends/slurm.rs
//
// =============================================================================
// OUTPOST: SLURM BACKEND
// =============================================================================
//
// Batch scheduling over the SSH session.
//
// Semantics:
// - `interactive = !disown`: a blocking `srun` that streams output back,
//   versus `sbatch --wrap` submissions that return after queueing.
// - `num_sequence` chains follow-up jobs on the previous job id
//   (`--dependency=afterok:ID`), one submission per link.
// - Job names carry the project name, a timestamp and a short unique tag,
//   so sweep submissions within the same second stay distinguishable in
//   `squeue`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::backends::{utils, ExecSpec, ExecutionBackend};
use crate::config::SlurmJobConfig;
use crate::error::Error;
use crate::project::Project;
use crate::transport::{RemoteShell, RunOpts};

pub struct SlurmBackend {
    shell: Arc<dyn RemoteShell>,
    project: Project,
    conf: SlurmJobConfig,
    num_sequence: u32,
}

impl SlurmBackend {
    pub fn new(
        shell: Arc<dyn RemoteShell>,
        project: Project,
        conf: SlurmJobConfig,
        num_sequence: u32,
    ) -> Self {
        Self {
            shell,
            project,
            conf,
            num_sequence,
        }
    }
}

impl std::fmt::Debug for SlurmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlurmBackend")
            .field("project", &self.project)
            .field("conf", &self.conf)
            .field("num_sequence", &self.num_sequence)
            .finish_non_exhaustive()
    }
}

impl SlurmBackend {

    fn job_name(&self) -> String {
        let tag: String = Uuid::new_v4().to_string().chars().take(8).collect();
        format!(
            "{}-{}-{}",
            self.project.name,
            chrono::Local::now().format("%Y%m%d-%H%M%S"),
            tag
        )
    }

    /// Resource arguments shared by srun and sbatch.
    fn submission_args(&self, job_name: &str) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(partition) = &self.conf.partition {
            args.push(format!("--partition={partition}"));
        }
        if let Some(time) = &self.conf.time {
            args.push(format!("--time={time}"));
        }
        if let Some(nodes) = self.conf.nodes {
            args.push(format!("--nodes={nodes}"));
        }
        if let Some(cpus) = self.conf.cpus_per_task {
            args.push(format!("--cpus-per-task={cpus}"));
        }
        if let Some(mem) = &self.conf.mem {
            args.push(format!("--mem={mem}"));
        }
        if let Some(gres) = &self.conf.gres {
            args.push(format!("--gres={gres}"));
        }
        if let Some(output) = &self.conf.output {
            args.push(format!("--output={output}"));
        }
        if let Some(exclude) = &self.conf.exclude {
            args.push(format!("--exclude={exclude}"));
        }
        args.push(format!("--job-name={job_name}"));
        args.extend(self.conf.extra_args.iter().cloned());
        args
    }

    /// `--export=ALL,K=V,...` with sorted keys; ALL keeps the login
    /// environment visible to the job.
    fn export_arg(env: &HashMap<String, String>) -> Option<String> {
        if env.is_empty() {
            return None;
        }
        let mut keys: Vec<&String> = env.keys().collect();
        keys.sort();
        let assignments = keys
            .iter()
            .map(|key| format!("{}={}", key, env[*key]))
            .collect::<Vec<_>>()
            .join(",");
        Some(format!("--export=ALL,{assignments}"))
    }
}

#[async_trait]
impl ExecutionBackend for SlurmBackend {
    async fn execute(&self, spec: &ExecSpec) -> Result<()> {
        let remote_root = self.project.remote_root.as_ref().ok_or_else(|| {
            Error::MissingRemoteRoot {
                project: self.project.name.clone(),
            }
        })?;
        let workdir = utils::resolve_workdir(remote_root, spec);

        // The payload both submission paths run on the allocated node.
        let mut inner_parts = vec![format!(
            "cd {}",
            utils::sh_quote(&workdir.to_string_lossy())
        )];
        if let Some(startup) = &spec.startup {
            if !startup.trim().is_empty() {
                inner_parts.push(startup.trim().to_string());
            }
        }
        inner_parts.push(utils::join_command(&spec.command));
        let inner = inner_parts.join(" && ");

        let job_name = self.job_name();
        let args = self.submission_args(&job_name);
        let export = Self::export_arg(&spec.env);

        if !spec.disown {
            // Interactive: block until the job finishes, output streams back.
            let mut cmdline = vec!["srun".to_string()];
            cmdline.extend(args);
            if let Some(export) = &export {
                cmdline.push(export.clone());
            }
            cmdline.push("sh".into());
            cmdline.push("-c".into());
            cmdline.push(inner);

            let command = utils::join_command(&cmdline);
            if spec.dry_run {
                log::info!("[dry-run] {command}");
                return Ok(());
            }
            let output = self
                .shell
                .run(
                    &command,
                    &RunOpts {
                        hide_output: false,
                        x_forward: spec.x_forward,
                        ..Default::default()
                    },
                )
                .await?;
            if !output.success() {
                return Err(Error::RemoteExit {
                    command,
                    code: output.exit_code,
                }
                .into());
            }
            return Ok(());
        }

        // Batch: one sbatch per sequence link, each waiting on the previous
        // job. The first link has no dependency.
        let mut previous: Option<String> = None;
        for _ in 0..self.num_sequence.max(1) {
            let mut cmdline = vec!["sbatch".to_string(), "--parsable".into()];
            cmdline.extend(args.clone());
            if let Some(export) = &export {
                cmdline.push(export.clone());
            }
            if let Some(prev) = &previous {
                cmdline.push(format!("--dependency=afterok:{prev}"));
            }
            cmdline.push(format!("--wrap={inner}"));

            let command = utils::join_command(&cmdline);
            if spec.dry_run {
                log::info!("[dry-run] {command}");
                continue;
            }
            let output = self
                .shell
                .run(
                    &command,
                    &RunOpts {
                        hide_output: true,
                        ..Default::default()
                    },
                )
                .await?;
            if !output.success() {
                return Err(Error::RemoteExit {
                    command,
                    code: output.exit_code,
                }
                .into());
            }
            let job_id = parse_job_id(&output.stdout)
                .with_context(|| format!("could not parse sbatch output: {:?}", output.stdout))?;
            log::info!("Submitted batch job {job_id}");
            previous = Some(job_id);
        }
        Ok(())
    }
}

/// Accepts `--parsable` output (`123` or `123;cluster`) and the human
/// `Submitted batch job 123` line.
pub fn parse_job_id(stdout: &str) -> Option<String> {
    let line = stdout.lines().find(|l| !l.trim().is_empty())?.trim();
    let id = match line.strip_prefix("Submitted batch job") {
        Some(rest) => rest.trim(),
        None => line,
    };
    let id = id.split(';').next()?.trim();
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        Some(id.to_string())
    } else {
        None
    }
}
