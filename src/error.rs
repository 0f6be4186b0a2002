// src/error.rs
//
// =============================================================================
// OUTPOST: ERROR TAXONOMY
// =============================================================================
//
// Every user-facing failure is a distinct variant so the caller can tell a
// bad configuration from a bad invocation from a dead transport.
//
// Groups:
// 1. Configuration: the config file names something that does not exist.
// 2. Precondition: the requested flag combination can never work.
// 3. Unimplemented: modes that are declared but not wired up yet.
// 4. Transport: the remote side failed underneath us.

use crate::backends::Mode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // --- 1. CONFIGURATION ---
    #[error("machine \"{name}\" not found in the configuration. Available machines are: {available:?}")]
    UnknownMachine {
        name: String,
        available: Vec<String>,
    },

    #[error("mode \"{0}\" is not available")]
    UnknownMode(String),

    #[error("no remote root for project \"{project}\": the machine configuration has no root_dir")]
    MissingRemoteRoot { project: String },

    #[error("docker image cannot be resolved. Something may be wrong with your docker configuration?")]
    UnresolvedImage,

    #[error("configuration \"{0}\" cannot be found in \"slurm-configs\"")]
    MissingSlurmConfig(String),

    // --- 2. PRECONDITIONS ---
    #[error("dry run is not supported for docker mode")]
    DockerDryRun,

    #[error("sweep requires --disown: submissions must not block on each job")]
    SweepWithoutDisown,

    #[error("sweep is only supported in slurm mode (requested mode: {0})")]
    SweepRequiresSlurm(Mode),

    #[error("invalid sweep range \"{0}\": expected \"begin-end\" with begin < end")]
    InvalidSweepRange(String),

    #[error("port forwarding cannot be combined with --disown")]
    ForwardWithDisown,

    // --- 3. UNIMPLEMENTED ---
    #[error("mode \"{0}\" is not implemented yet")]
    Unimplemented(Mode),

    // --- 4. TRANSPORT ---
    #[error("remote command exited with status {code}: {command}")]
    RemoteExit { command: String, code: i32 },

    #[error("{tool} exited with status {code}")]
    TransferFailed { tool: String, code: i32 },
}
