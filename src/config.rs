//! CLI parsing. Unlike the source's global config statics, every value here is threaded
//! through explicitly: [`Cli`] is parsed once in `main` and handed to
//! [`crate::ReductionCore::new`] by reference, which is also what [`crate::Statistics`]
//! and [`crate::RunOutcome`] consumers read from — no `OnceCell`/`.get().unwrap()`
//! indirection.

use std::path::PathBuf;

use clap::Parser;

/// Gate for verbose internal logging, independent of the stats display.
pub const DEBUG_PRINT: bool = false;

#[derive(Parser, Debug)]
#[clap(
    name = "reduce-fuzz",
    about = "Coverage-reduction decision core for crash minimization"
)]
pub struct Cli {
    /// Directory to create queue/, crashes/ and hangs/ under
    #[clap(short = 'o', long)]
    pub output_dir: PathBuf,

    /// Directory of already-crashing seeds to minimize
    #[clap(short = 'i', long)]
    pub input_dir: PathBuf,

    /// Target command. `@@` is replaced with the path to the candidate input; if no
    /// `@@` is present the candidate is piped on stdin instead.
    #[clap(last = true, required = true)]
    pub target_cmd: Vec<String>,

    /// File the target (or the instrumentation shim wrapping it) is expected to have
    /// left a fresh `map_size`-byte coverage bitmap in after each run
    #[clap(long, default_value = ".trace_bits")]
    pub trace_bits_path: PathBuf,

    /// File the call-tracing side channel (§6) writes one hex caller address per line
    /// to; its line count becomes `cur_hit_count`. When absent, hit count falls back
    /// to the bitmap's own bucketized sum.
    #[clap(long)]
    pub calltrace_path: Option<PathBuf>,

    /// Per-run timeout in milliseconds
    #[clap(long, default_value = "1000")]
    pub timeout_ms: u64,

    /// Coverage bitmap size in bytes, must be a power of two
    #[clap(long, default_value = "65536")]
    pub map_size: usize,

    /// Near-miss admission margin; 0.5 accepts hit-count-only candidates up to 1.5x
    /// the current minimum, decaying linearly
    #[clap(long, default_value = "0.5")]
    pub near_miss_margin: f64,

    /// Maximum number of unique crashes to keep before going silent
    #[clap(long, default_value = "5000")]
    pub keep_unique_crash: u64,

    /// Maximum number of unique hangs to keep before going silent
    #[clap(long, default_value = "2500")]
    pub keep_unique_hang: u64,

    /// Size of the path-frequency hash table
    #[clap(long, default_value = "10000000")]
    pub n_fuzz_size: usize,

    /// Track how often each execution path is seen, for frequency-aware scheduling
    #[clap(long)]
    pub frequency_aware: bool,

    /// Shell command to run whenever a new unique crash is admitted
    #[clap(long)]
    pub crash_notifier: Option<String>,

    /// Timeout in milliseconds used to confirm a candidate hang before keeping it
    #[clap(long, default_value = "5000")]
    pub hang_timeout_ms: u64,
}
