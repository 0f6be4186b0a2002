// src/project.rs
//
// =============================================================================
// OUTPOST: REMOTE ADDRESSING & PROJECT LAYOUT
// =============================================================================
//
// The Map.
//
// Responsibilities:
// 1. Address a remote machine (`user@host`, `user@host:path`).
// 2. Compute the path layout of a named project on both sides of the wire.
// 3. Find the local project root (the directory that gets mirrored).

use anyhow::{ensure, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// Name of the output directory created under the project's remote root.
/// Remote processes drop artifacts here; pull sync collects them.
pub const REMOTE_OUT_DIR: &str = "output";

// ============================================================================
// 1. REMOTE HOST
// ============================================================================

/// A user/host pair. Immutable, created once per invocation from the
/// resolved machine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHost {
    pub user: String,
    pub host: String,
}

impl RemoteHost {
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
        }
    }

    /// `user@host`, the form ssh and the docker CLI accept.
    pub fn base_uri(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// `user@host:path`, the form rsync accepts as a remote endpoint.
    pub fn uri(&self, path: &Path) -> String {
        format!("{}@{}:{}", self.user, self.host, path.display())
    }
}

impl fmt::Display for RemoteHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.host)
    }
}

// ============================================================================
// 2. PROJECT LAYOUT
// ============================================================================

/// Local and remote path layout for a named project.
///
/// `remote_root` is absent only when the machine configuration has no
/// `root_dir`. Anything that needs the remote side fails explicitly in that
/// case instead of guessing a destination.
#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub root_dir: PathBuf,
    pub remote_root: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
}

impl Project {
    pub fn new(
        name: impl Into<String>,
        root_dir: PathBuf,
        remote_base: Option<&str>,
        out_dir: Option<PathBuf>,
    ) -> Self {
        let name = name.into();
        let remote_root = remote_base.map(|base| Path::new(base).join(&name));
        Self {
            name,
            root_dir,
            remote_root,
            out_dir,
        }
    }

    /// The remote output directory, present whenever `remote_root` is.
    pub fn remote_out(&self) -> Option<PathBuf> {
        self.remote_root.as_ref().map(|root| root.join(REMOTE_OUT_DIR))
    }
}

// ============================================================================
// 3. PROJECT ROOT DISCOVERY
// ============================================================================

fn is_project_root(dir: &Path) -> bool {
    dir.join(".git").is_dir() || dir.join(crate::config::PROJECT_CONFIG_NAME).is_file()
}

/// Walks up from the current directory looking for `.git` or a project
/// config file. Falls back to the current directory with a warning, and
/// refuses the filesystem root outright: mirroring `/` is never intended.
pub fn find_project_root() -> Result<PathBuf> {
    let current = std::env::current_dir()?.canonicalize()?;

    let mut dir = current.clone();
    loop {
        if is_project_root(&dir) {
            return Ok(dir);
        }
        match dir.parent() {
            Some(parent) => dir = parent.to_path_buf(),
            None => break,
        }
    }

    log::warn!(
        ".git directory or {} not found in ancestor directories; \
         using the current directory as the project root",
        crate::config::PROJECT_CONFIG_NAME
    );
    ensure!(
        current.parent().is_some(),
        "refusing to treat the filesystem root as a project root"
    );
    Ok(current)
}
