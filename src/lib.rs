//! # reduce-fuzz
//!
//! A coverage-reduction decision core for crash minimization: given a candidate input
//! and the trace it produced against a target, decide whether the candidate is worth
//! keeping because it reaches a crash (or a known crash) through *less* coverage than
//! anything seen before. This is the admission/bookkeeping half of a minimizing fuzzer
//! (in the spirit of AFL++'s `-C` collection mode); mutation, scheduling and the target
//! harness itself are intentionally out of scope and left to the [`TargetRunner`] and
//! [`Calibrator`] seams.

pub mod admission;
pub mod bitmap;
pub mod bucket;
pub mod calltrace;
pub mod classifier;
pub mod config;
pub mod error;
pub mod filename;
pub mod pretty_printing;
pub mod virgin;

use std::path::{Path, PathBuf};
use std::process;

use rand_xoshiro::Xoroshiro128PlusPlus;
use rand_xoshiro::rand_core::SeedableRng;

use classifier::ImprovementCode;
use filename::OperationDescriptor;
use virgin::{ReductionState, VirginMaps};

/// Small wrapper to easily handle unrecoverable errors without panicking through
/// `unwrap`.
pub fn error_exit(msg: &str) -> ! {
    println!("{msg}");
    process::exit(1);
}

/// Holds various statistics tracked across the life of a run, reported through
/// [`pretty_printing::print_stats`].
#[derive(Default, Debug)]
pub struct Statistics {
    /// Total number of candidates evaluated
    pub total_cases: usize,

    /// Total crashing runs (including duplicates of a known crash)
    pub crashes: usize,

    /// Unique crashes admitted into `crashes/`
    pub ucrashes: usize,

    /// How often a candidate timed out
    pub timeouts: u64,

    /// Number of candidates currently admitted into the queue
    pub queued: usize,
}

/// What happened when a candidate was run against the target. The target harness
/// itself is outside this crate's scope; implementations of [`TargetRunner`] produce
/// this value however they see fit (forkserver, in-process harness, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Ran to completion with no fault.
    Ok,
    /// Exceeded the run's timeout.
    Tmout,
    /// Crashed, carrying the signal (or target-defined fault code) it died with.
    Crash(u8),
    /// The target could not be executed at all (spawn failure, broken harness, ...).
    /// Distinct from [`Fault::Crash`]: this is a fault in the harness, not a finding.
    Error,
}

/// The trace and disposition produced by running one candidate.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub fault: Fault,
    /// Raw per-edge hit counts, `virgin::MAP_SIZE` bytes, not yet bucketized.
    pub trace_bits: Vec<u8>,
    /// Total hit count for the run, e.g. a call-trace line count from
    /// [`calltrace::CallTrace::hit_count`].
    pub hit_count: u64,
}

/// Seam for the black-box target collaborator: anything that can execute a candidate
/// and report back a trace. Forkserver management, snapshotting and process isolation
/// all live on the implementing side; this crate only consumes the result.
pub trait TargetRunner {
    fn run(&mut self, input: &[u8], timeout: std::time::Duration) -> RunOutcome;
}

/// A minimal record of an admitted candidate. Deliberately not the scheduler's full
/// energy-tracking `Input` record (seed selection and mutation scheduling are out of
/// scope) — just enough to locate the file on disk and explain why it was kept.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: u64,
    pub path: PathBuf,
    pub trace_hash: u64,
    pub code: ImprovementCode,
}

/// Seam for calibrating a freshly-admitted queue entry (e.g. measuring stable execution
/// time over a few repeat runs). The default [`NullCalibrator`] does nothing; a caller
/// that cares about scheduling energy can supply its own.
pub trait Calibrator {
    fn calibrate(&mut self, entry: &QueueEntry, input: &[u8]);
}

/// A [`Calibrator`] that performs no calibration.
pub struct NullCalibrator;
impl Calibrator for NullCalibrator {
    fn calibrate(&mut self, _entry: &QueueEntry, _input: &[u8]) {}
}

/// Owns the virgin maps, the lazily-initialized reduction scalars, the admitted queue,
/// and the path-frequency table. One instance per fuzzing run.
pub struct ReductionCore {
    pub virgin: VirginMaps,
    pub state: ReductionState,
    pub queue: Vec<QueueEntry>,

    pub(crate) n_fuzz: Vec<u32>,
    pub(crate) frequency_aware: bool,

    pub total_crashes: u64,
    pub unique_crashes: u64,
    pub unique_hangs: u64,
    pub total_timeouts: u64,

    pub(crate) next_queue_id: u64,
    pub(crate) out_dir: PathBuf,
    pub(crate) near_miss_margin: f64,
    pub(crate) keep_unique_crash: u64,
    pub(crate) keep_unique_hang: u64,
    pub(crate) hang_timeout: std::time::Duration,
    pub(crate) crash_readme_written: bool,
    pub(crate) crash_notifier: Option<String>,
    pub(crate) rng: Xoroshiro128PlusPlus,
}

impl ReductionCore {
    /// Create a fresh core rooted at `out_dir`, creating `queue/`, `crashes/` and
    /// `hangs/` underneath it if they don't already exist.
    pub fn new(cli: &config::Cli) -> std::io::Result<Self> {
        for sub in ["queue", "crashes", "hangs"] {
            std::fs::create_dir_all(cli.output_dir.join(sub))?;
        }

        Ok(Self {
            virgin: VirginMaps::new(cli.map_size),
            state: ReductionState::new(),
            queue: Vec::new(),
            n_fuzz: vec![0u32; cli.n_fuzz_size],
            frequency_aware: cli.frequency_aware,
            total_crashes: 0,
            unique_crashes: 0,
            unique_hangs: 0,
            total_timeouts: 0,
            next_queue_id: 0,
            out_dir: cli.output_dir.clone(),
            near_miss_margin: cli.near_miss_margin,
            keep_unique_crash: cli.keep_unique_crash,
            keep_unique_hang: cli.keep_unique_hang,
            hang_timeout: std::time::Duration::from_millis(cli.hang_timeout_ms),
            crash_readme_written: false,
            crash_notifier: cli.crash_notifier.clone(),
            rng: Xoroshiro128PlusPlus::seed_from_u64(0xa5a5_5a5a_1234_5678),
        })
    }

    pub fn min_bitmap_size(&self) -> Option<u32> {
        self.state.total_min_bitmap_size.get()
    }

    pub fn min_hit_count(&self) -> Option<u64> {
        self.state.global_min_hit_count.get()
    }

    pub fn queue_dir(&self) -> PathBuf {
        self.out_dir.join("queue")
    }

    pub fn crashes_dir(&self) -> PathBuf {
        self.out_dir.join("crashes")
    }

    pub fn hangs_dir(&self) -> PathBuf {
        self.out_dir.join("hangs")
    }
}

/// Build a default [`OperationDescriptor`] for callers that don't track mutation
/// provenance (e.g. replaying an existing corpus rather than fuzzing).
pub fn untracked_operation(src: u32, time_ms: u64) -> OperationDescriptor {
    OperationDescriptor {
        src,
        splice_with: None,
        time_ms,
        stage: "replay".to_string(),
        pos: None,
        val: None,
        rep: None,
    }
}

/// Best-effort read of all files directly under `dir`, used by the harness binary to
/// seed an initial corpus; not part of the reduction core proper.
pub fn read_corpus_dir(dir: &Path) -> std::io::Result<Vec<Vec<u8>>> {
    let mut inputs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            inputs.push(std::fs::read(entry.path())?);
        }
    }
    Ok(inputs)
}
