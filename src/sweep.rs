// src/sweep.rs
//
// =============================================================================
// OUTPOST: SWEEP DRIVER
// =============================================================================
//
// The Fan-Out.
//
// Turns one request into N independent submissions, one per index of a
// half-open range. Each iteration gets a fresh copy of the base environment
// with the sweep index injected, so no two submissions ever share a map.
// Submissions are sequential and there is no retry; an error from the
// backend ends the sweep at that index.

use anyhow::Result;
use std::str::FromStr;

use crate::backends::{ExecSpec, ExecutionBackend};
use crate::error::Error;

/// Environment variable carrying the current sweep index into the job.
pub const SWEEP_ENV_KEY: &str = "OUTPOST_RUN_SWEEP_IDX";

// ============================================================================
// 1. RANGE
// ============================================================================

/// A half-open index range `[begin, end)`, validated non-empty on
/// construction. Parsed from `"begin-end"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepRange {
    begin: i64,
    end: i64,
}

impl SweepRange {
    pub fn new(begin: i64, end: i64) -> Result<Self, Error> {
        if begin < end {
            Ok(Self { begin, end })
        } else {
            Err(Error::InvalidSweepRange(format!("{begin}-{end}")))
        }
    }

    pub fn begin(&self) -> i64 {
        self.begin
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    /// Indices in ascending order, end exclusive.
    pub fn indices(&self) -> impl Iterator<Item = i64> {
        self.begin..self.end
    }

    pub fn len(&self) -> usize {
        (self.end - self.begin) as usize
    }

    pub fn is_empty(&self) -> bool {
        // Construction guarantees begin < end.
        false
    }
}

impl FromStr for SweepRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let parse = || -> Option<(i64, i64)> {
            let (begin, end) = s.split_once('-')?;
            Some((begin.trim().parse().ok()?, end.trim().parse().ok()?))
        };
        let (begin, end) = parse().ok_or_else(|| Error::InvalidSweepRange(s.to_string()))?;
        Self::new(begin, end)
    }
}

// ============================================================================
// 2. DRIVER
// ============================================================================

pub struct SweepDriver<'a> {
    backend: &'a dyn ExecutionBackend,
    range: SweepRange,
}

impl<'a> SweepDriver<'a> {
    pub fn new(backend: &'a dyn ExecutionBackend, range: SweepRange) -> Self {
        Self { backend, range }
    }

    /// One backend invocation per index. Requires a disowned spec: N
    /// submissions must not serialize on a human waiting for each.
    pub async fn drive(&self, base: &ExecSpec) -> Result<()> {
        if !base.disown {
            return Err(Error::SweepWithoutDisown.into());
        }

        for idx in self.range.indices() {
            let mut spec = base.clone();
            spec.env.insert(SWEEP_ENV_KEY.to_string(), idx.to_string());
            log::info!(
                "sweep index {} (range {}..{})",
                idx,
                self.range.begin(),
                self.range.end()
            );
            self.backend.execute(&spec).await?;
        }
        Ok(())
    }
}
