// src/lib.rs
//
// =============================================================================
// OUTPOST: LIBRARY ROOT
// =============================================================================
//
// This file declares the module tree and exports public types.

// 1. Declare Modules
pub mod backends;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod project;
pub mod sweep;
pub mod sync;
pub mod transport;

// 2. Re-exports (The Public API)
pub use backends::{resolve_mode, ExecSpec, ExecutionBackend, Mode};
pub use config::Config;
pub use error::Error;
pub use orchestrator::{RunOrchestrator, RunRequest, SyncRequest};
pub use project::{Project, RemoteHost};
pub use sweep::{SweepDriver, SweepRange, SWEEP_ENV_KEY};
pub use sync::SyncOrchestrator;
