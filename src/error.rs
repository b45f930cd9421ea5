//! Error taxonomy for the reduction core.
//!
//! Only a subset of the failure kinds described by the design are modeled as `Err`
//! variants here. "Polite" failures (log and keep going, e.g. a crash README write
//! that fails) and "silent discard" outcomes (a duplicate trace, a near-miss that loses
//! its coin flip) are call-site conventions — a logged warning or a plain `false`
//! return — rather than values that propagate through `Result`.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal conditions: the reduction core cannot make progress and the caller should
/// abort the run.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("target execution failed unrecoverably")]
    TargetExecution,

    #[error("queue/crash/hang filename exceeded the maximum length")]
    FilenameTooLong,

    #[error("failed to read or write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
