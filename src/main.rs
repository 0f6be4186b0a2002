// src/main.rs
//
// =============================================================================
// OUTPOST: CLI & ENTRY POINT
// =============================================================================
//
// The wiring center.
//
// Commands:
// 1. RUN:  Deploy the project to a machine, execute a command there over
//          the resolved backend (ssh / docker / slurm), pull outputs back.
// 2. SYNC: Deploy only.
//
// Everything below parses flags, loads configuration once, and hands an
// immutable request to the orchestrator.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use outpost::backends::Mode;
use outpost::orchestrator::{RunOrchestrator, RunRequest, SyncRequest};
use outpost::sweep::SweepRange;
use outpost::transport::{ForwardSpec, Rsync, SshSessionFactory};
use outpost::{config, project};

// ============================================================================
// 1. CLI DEFINITION
// ============================================================================

#[derive(Parser)]
#[command(
    name = "outpost",
    version,
    about = "Deploy a project to a remote machine and run commands there"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy the project and execute a command on a machine.
    Run {
        /// Machine name from the configuration.
        machine: String,

        /// Execution mode. Defaults to the machine's default_mode, then ssh.
        #[arg(short, long)]
        mode: Option<Mode>,

        /// Do not block on the remote process. stdout/stderr will not be
        /// shown with this option.
        #[arg(short, long)]
        disown: bool,

        /// X11 forwarding.
        #[arg(short = 'X', long)]
        x_forward: bool,

        /// Local port forwarding, "1234:hostname:2345". A bare port "8080"
        /// means "8080:localhost:8080". Cannot be used with --disown.
        #[arg(short = 'L', long)]
        local_forward: Option<ForwardSpec>,

        /// Remote port forwarding, same format as --local-forward.
        #[arg(short = 'R', long)]
        remote_forward: Option<ForwardSpec>,

        /// Docker image: an alias from "docker-images", or a literal
        /// image reference.
        #[arg(long)]
        image: Option<String>,

        /// Number of chained jobs per Slurm submission.
        #[arg(short = 'n', long, default_value_t = 1)]
        num_sequence: u32,

        /// Named entry of "slurm-configs" to submit with.
        #[arg(long)]
        conf: Option<String>,

        /// Sweep range "begin-end" (end exclusive), reflected to each job
        /// as $OUTPOST_RUN_SWEEP_IDX. Slurm mode only, requires --disown.
        #[arg(long)]
        sweep: Option<SweepRange>,

        /// Simulate without mutating remote state.
        #[arg(long)]
        dry_run: bool,

        /// Project name override. Defaults to the config, then the project
        /// directory name.
        #[arg(long)]
        name: Option<String>,

        /// Local directory to pull remote outputs into.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Command to execute on the remote machine (after "--").
        #[arg(required = true, last = true)]
        command: Vec<String>,
    },

    /// Deploy the project to a machine without executing anything.
    Sync {
        /// Machine name from the configuration.
        machine: String,

        /// Simulate without mutating remote state.
        #[arg(long)]
        dry_run: bool,

        /// Project name override.
        #[arg(long)]
        name: Option<String>,
    },
}

// ============================================================================
// 2. ENTRY POINT
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // The project root is what gets mirrored; the cwd offset inside it is
    // where the remote command runs from.
    let root_dir = project::find_project_root()?;
    let cwd = std::env::current_dir()?.canonicalize()?;
    let workdir = cwd
        .strip_prefix(&root_dir)
        .unwrap_or(Path::new(""))
        .to_path_buf();

    let config = config::load(&root_dir)?;

    let transfer = Rsync;
    let sessions = SshSessionFactory;
    let orchestrator = RunOrchestrator::new(&config, &transfer, &sessions);

    match cli.command {
        Commands::Run {
            machine,
            mode,
            disown,
            x_forward,
            local_forward,
            remote_forward,
            image,
            num_sequence,
            conf,
            sweep,
            dry_run,
            name,
            output_dir,
            command,
        } => {
            let request = RunRequest {
                machine,
                mode,
                command,
                root_dir,
                workdir,
                disown,
                x_forward,
                local_forward,
                remote_forward,
                image,
                num_sequence,
                slurm_conf: conf,
                sweep,
                dry_run,
                project_name: name,
                output_dir,
            };
            orchestrator.run(&request).await
        }

        Commands::Sync {
            machine,
            dry_run,
            name,
        } => {
            let request = SyncRequest {
                machine,
                root_dir,
                project_name: name,
                dry_run,
            };
            orchestrator.sync(&request).await
        }
    }
}
