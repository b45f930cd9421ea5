//! Admission controller: `save_if_interesting`, the single entry point that decides
//! whether a candidate's run result earns it a place in `queue/`, `crashes/` or
//! `hangs/`.

use std::io::Write;

use rand::Rng;

use crate::bucket;
use crate::classifier::{self, ImprovementCode};
use crate::error::CoreError;
use crate::filename::{self, OperationDescriptor};
use crate::pretty_printing::{self, LogType};
use crate::virgin::VirginKind;
use crate::{Calibrator, Fault, QueueEntry, ReductionCore, RunOutcome, TargetRunner};

/// Fixed seed mixed into the path-frequency hash so the same trace always lands in the
/// same bucket across a run.
const HASH_CONST: u64 = 0xa5b3_c2d1_e6f7_8091;

fn trace_hash(trace: &[u8]) -> u64 {
    xxhash_rust::xxh3::xxh3_64_with_seed(trace, HASH_CONST)
}

/// Pure decision for the near-miss rule, split out from the RNG draw so the boundary
/// itself is unit-testable: accept iff the overshoot past the current minimum is no
/// larger than the drawn `r`.
fn accept_near_miss(over: u64, bound: u64, r: u64) -> bool {
    if bound == 0 {
        over == 0
    } else {
        over <= r
    }
}

impl ReductionCore {
    /// Decide whether `input` (which produced `outcome`) should be admitted, writing it
    /// to disk under `queue/`, `crashes/` or `hangs/` as appropriate. Returns whether the
    /// candidate was kept in the queue (crash/hang admissions are reported separately
    /// through `unique_crashes`/`unique_hangs`).
    ///
    /// `runner` is used to re-confirm a timeout before committing to it as a hang;
    /// `calibrator` is given a chance to measure a freshly-queued entry.
    ///
    /// Returns `Err` only for the fatal conditions the error design calls out: the
    /// target harness itself misbehaving (`Fault::Error`), a filename that would
    /// overflow the path-component limit, or a queue/crash/hang file that couldn't be
    /// written. The caller (typically `main`) should log and exit rather than retry.
    pub fn save_if_interesting(
        &mut self,
        input: &[u8],
        outcome: RunOutcome,
        op: &OperationDescriptor,
        runner: &mut dyn TargetRunner,
        calibrator: &mut dyn Calibrator,
    ) -> Result<bool, CoreError> {
        if input.is_empty() {
            return Ok(false);
        }

        let RunOutcome {
            fault,
            mut trace_bits,
            hit_count,
        } = outcome;

        if self.frequency_aware {
            self.track_path_frequency(&trace_bits);
        }

        let mut keeping = false;
        let mut classified = false;

        if fault == Fault::Ok {
            bucket::bucketize(&mut trace_bits);
            classified = true;

            let code = classifier::has_few_bits(
                &mut self.state,
                &mut self.virgin.normal,
                VirginKind::Normal,
                &trace_bits,
                hit_count,
            );

            if !code.is_discard() {
                let accept = if code.as_u8() == 1 {
                    self.near_miss_admits(hit_count)
                } else {
                    true
                };

                if accept {
                    keeping = self.admit_queue_entry(input, &trace_bits, op, code, calibrator)?;
                }
            }
        }

        match fault {
            Fault::Tmout => self.handle_timeout(
                input,
                &mut trace_bits,
                classified,
                hit_count,
                op,
                runner,
                &mut keeping,
            )?,
            Fault::Crash(signal) => {
                if self.admit_crash(input, signal, trace_bits, hit_count, op)? {
                    keeping = true;
                }
            }
            Fault::Error => {
                // Fatal per the error design: the harness itself is broken, not the
                // candidate under test.
                return Err(CoreError::TargetExecution);
            }
            Fault::Ok => {}
        }

        self.persist_bitmap_if_changed();

        Ok(keeping)
    }

    /// Rewrite `<out_dir>/fuzz_bitmap` with the current normal virgin map whenever an
    /// edge was forgotten since the last write (§6). Cheap to check on every call since
    /// the flag is a single bool; the write itself only happens when it's actually set.
    fn persist_bitmap_if_changed(&mut self) {
        if !self.state.bitmap_changed {
            return;
        }
        let path = self.out_dir.join("fuzz_bitmap");
        if let Err(e) = std::fs::write(&path, &self.virgin.normal) {
            pretty_printing::log(
                LogType::Failure,
                &format!("could not persist {}: {e}", path.display()),
            );
        }
        self.state.bitmap_changed = false;
    }

    fn handle_timeout(
        &mut self,
        input: &[u8],
        trace_bits: &mut Vec<u8>,
        already_bucketized: bool,
        hit_count: u64,
        op: &OperationDescriptor,
        runner: &mut dyn TargetRunner,
        keeping: &mut bool,
    ) -> Result<(), CoreError> {
        self.total_timeouts += 1;
        if self.unique_hangs >= self.keep_unique_hang {
            return Ok(());
        }

        if !already_bucketized {
            bucket::bucketize(trace_bits);
        }
        bucket::simplify(trace_bits);

        let code = classifier::has_few_bits(
            &mut self.state,
            &mut self.virgin.timeout,
            VirginKind::Timeout,
            trace_bits,
            hit_count,
        );
        if code.is_discard() {
            return Ok(());
        }

        // Re-run with a generous timeout to rule out a one-off scheduling fluke before
        // committing this as a real hang. A promotion to `Fault::Crash` on re-run is not
        // a hang at all, so it is routed to `crashes/` instead of `hangs/`.
        let rerun = runner.run(input, self.hang_timeout);
        match rerun.fault {
            Fault::Tmout => self.admit_hang(input, op)?,
            Fault::Crash(signal) => {
                if self.admit_crash(input, signal, rerun.trace_bits, rerun.hit_count, op)? {
                    *keeping = true;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn admit_queue_entry(
        &mut self,
        input: &[u8],
        trace_bits: &[u8],
        op: &OperationDescriptor,
        code: ImprovementCode,
        calibrator: &mut dyn Calibrator,
    ) -> Result<bool, CoreError> {
        let id = self.next_queue_id;
        self.next_queue_id += 1;

        let name = filename::queue_name(id, op, code);
        filename::check_length(&name)?;
        let path = self.queue_dir().join(&name);
        std::fs::write(&path, input).map_err(|source| CoreError::Io {
            path: path.clone(),
            source,
        })?;

        let entry = QueueEntry {
            id,
            path,
            trace_hash: trace_hash(trace_bits),
            code,
        };
        calibrator.calibrate(&entry, input);
        self.queue.push(entry);
        Ok(true)
    }

    fn admit_hang(&mut self, input: &[u8], op: &OperationDescriptor) -> Result<(), CoreError> {
        let id = self.unique_hangs;
        let name = filename::hang_name(id, op);
        filename::check_length(&name)?;
        let path = self.hangs_dir().join(&name);
        std::fs::write(&path, input).map_err(|source| CoreError::Io {
            path: path.clone(),
            source,
        })?;
        self.unique_hangs += 1;
        Ok(())
    }

    fn admit_crash(
        &mut self,
        input: &[u8],
        signal: u8,
        mut trace_bits: Vec<u8>,
        hit_count: u64,
        op: &OperationDescriptor,
    ) -> Result<bool, CoreError> {
        self.total_crashes += 1;
        if self.unique_crashes >= self.keep_unique_crash {
            return Ok(false);
        }

        bucket::bucketize(&mut trace_bits);
        bucket::simplify(&mut trace_bits);

        let code = classifier::has_few_bits(
            &mut self.state,
            &mut self.virgin.crash,
            VirginKind::Crash,
            &trace_bits,
            hit_count,
        );
        if code.is_discard() {
            return Ok(false);
        }

        if self.unique_crashes == 0 {
            self.write_crash_readme();
        }

        let id = self.unique_crashes;
        let name = filename::crash_name(id, signal, op);
        filename::check_length(&name)?;
        let path = self.crashes_dir().join(&name);
        std::fs::write(&path, input).map_err(|source| CoreError::Io {
            path: path.clone(),
            source,
        })?;
        self.unique_crashes += 1;
        self.notify_new_crash(&path);
        Ok(true)
    }

    fn near_miss_admits(&mut self, hit_count: u64) -> bool {
        let min = match self.state.global_min_hit_count.get() {
            Some(m) => m,
            None => return true,
        };
        if hit_count < min {
            return true;
        }
        let over = hit_count - min;
        let bound = ((min as f64) * self.near_miss_margin) as u64;
        let r = if bound == 0 { 0 } else { self.rng.gen_range(0..bound) };
        accept_near_miss(over, bound, r)
    }

    fn track_path_frequency(&mut self, trace: &[u8]) -> u64 {
        let cksum = trace_hash(trace);
        if self.n_fuzz.is_empty() {
            return cksum;
        }
        let idx = (cksum as usize) % self.n_fuzz.len();
        self.n_fuzz[idx] = self.n_fuzz[idx].saturating_add(1);
        cksum
    }

    fn write_crash_readme(&mut self) {
        let path = self.crashes_dir().join("README.txt");
        let contents = "This directory contains crashing inputs discovered by the \
            coverage-reduction core. Each filename encodes the signal and the mutation \
            stage that produced it.\n";

        let result = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .and_then(|mut f| f.write_all(contents.as_bytes()));

        if let Err(e) = result {
            // Polite failure: this is cosmetic, the crash itself is still saved.
            pretty_printing::log(
                LogType::Failure,
                &format!("could not write crash README: {e}"),
            );
        }
        self.crash_readme_written = true;
    }

    fn notify_new_crash(&self, path: &std::path::Path) {
        let Some(cmd) = self.crash_notifier.as_ref() else {
            return;
        };
        if let Err(e) = std::process::Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .arg("--")
            .arg(path)
            .status()
        {
            pretty_printing::log(LogType::Failure, &format!("crash notifier failed: {e}"));
        }
    }
}
