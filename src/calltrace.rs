//! Reads the caller-address side channel emitted by an external call-tracing tool
//! (e.g. a Pin instrumentation pass) into `calltrace_addr.out`: one hex address per
//! line, one line per call made during a run. Line count becomes `cur_hit_count`.

use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::CoreError;

/// A single parsed caller address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite(pub u64);

/// The full set of call sites recorded during one run.
#[derive(Debug, Clone, Default)]
pub struct CallTrace {
    pub sites: Vec<CallSite>,
}

impl CallTrace {
    /// Line count of the trace file, fed directly into the classifier as
    /// `cur_hit_count`.
    pub fn hit_count(&self) -> u64 {
        self.sites.len() as u64
    }
}

/// Parse a `calltrace_addr.out` file. Blank lines are ignored; a line that isn't valid
/// hex is skipped rather than aborting the whole read, since the tracer is a best-effort
/// external collaborator and partial output (e.g. a truncated last line under a
/// timeout) is expected.
pub fn read_calltrace(path: &Path) -> Result<CallTrace, CoreError> {
    let file = std::fs::File::open(path).map_err(|source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut sites = Vec::new();
    for line in BufReader::new(file).lines() {
        let Ok(line) = line else { continue };
        let trimmed = line.trim().trim_start_matches("0x");
        if trimmed.is_empty() {
            continue;
        }
        if let Ok(addr) = u64::from_str_radix(trimmed, 16) {
            sites.push(CallSite(addr));
        }
    }

    Ok(CallTrace { sites })
}
