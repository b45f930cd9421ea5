use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use clap::Parser;
use console::Term;

use reduce_fuzz::calltrace;
use reduce_fuzz::config::Cli;
use reduce_fuzz::pretty_printing::print_stats;
use reduce_fuzz::{
    error_exit, read_corpus_dir, untracked_operation, Fault, NullCalibrator, QueueEntry,
    ReductionCore, RunOutcome, Statistics, TargetRunner,
};

/// Runs the target as a plain child process once per candidate. This stands in for the
/// real forkserver collaborator (§6): production deployments snapshot-restore a warm
/// process instead of paying `fork`+`exec` per run, but the external interface this
/// crate consumes — a trace bitmap, a hit count and a fault classification — is
/// identical either way.
struct ProcessRunner {
    cmd: Vec<String>,
    trace_bits_path: PathBuf,
    calltrace_path: Option<PathBuf>,
    map_size: usize,
    input_file: PathBuf,
}

impl ProcessRunner {
    fn new(cli: &Cli) -> std::io::Result<Self> {
        Ok(Self {
            cmd: cli.target_cmd.clone(),
            trace_bits_path: cli.trace_bits_path.clone(),
            calltrace_path: cli.calltrace_path.clone(),
            map_size: cli.map_size,
            input_file: cli.output_dir.join(".candidate"),
        })
    }

    fn read_trace_bits(&self) -> Vec<u8> {
        let mut bits = std::fs::read(&self.trace_bits_path).unwrap_or_default();
        bits.resize(self.map_size, 0);
        bits
    }

    fn hit_count(&self, trace_bits: &[u8]) -> u64 {
        match &self.calltrace_path {
            Some(path) => calltrace::read_calltrace(path)
                .map(|t| t.hit_count())
                .unwrap_or(0),
            None => trace_bits.iter().map(|&b| b as u64).sum(),
        }
    }
}

impl TargetRunner for ProcessRunner {
    fn run(&mut self, input: &[u8], timeout: Duration) -> RunOutcome {
        if let Err(e) = std::fs::write(&self.input_file, input) {
            error_exit(&format!("unable to stage candidate input: {e}"));
        }
        let _ = std::fs::remove_file(&self.trace_bits_path);

        let uses_stdin = !self.cmd.iter().any(|a| a.contains("@@"));
        let args: Vec<String> = self
            .cmd
            .iter()
            .map(|a| a.replace("@@", &self.input_file.to_string_lossy()))
            .collect();

        let mut child = match Command::new(&args[0])
            .args(&args[1..])
            .stdin(if uses_stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => error_exit(&format!("unable to spawn target: {e}")),
        };

        if uses_stdin {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(input);
            }
        }

        let start = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) => {
                    if start.elapsed() >= timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        break None;
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(e) => error_exit(&format!("unable to wait on target: {e}")),
            }
        };

        let trace_bits = self.read_trace_bits();
        let hit_count = self.hit_count(&trace_bits);

        let fault = match status {
            None => Fault::Tmout,
            Some(status) => {
                #[cfg(unix)]
                {
                    use std::os::unix::process::ExitStatusExt;
                    // A nonzero exit with no signal is the target rejecting the input,
                    // not a fault; only a signal (SIGSEGV, SIGABRT, ...) counts as a
                    // crash here.
                    match status.signal() {
                        Some(sig) => Fault::Crash(sig as u8),
                        None => Fault::Ok,
                    }
                }
                #[cfg(not(unix))]
                {
                    if status.success() {
                        Fault::Ok
                    } else {
                        Fault::Crash(0)
                    }
                }
            }
        };

        RunOutcome {
            fault,
            trace_bits,
            hit_count,
        }
    }
}

fn main() -> std::io::Result<()> {
    let args = Cli::parse();

    let term = Term::buffered_stdout();
    term.clear_screen()?;

    let mut core = ReductionCore::new(&args)?;
    let mut runner = ProcessRunner::new(&args)?;
    let mut calibrator = NullCalibrator;
    let mut stats = Statistics::default();

    let seeds = read_corpus_dir(&args.input_dir)?;
    if seeds.is_empty() {
        error_exit("please supply at least one already-crashing seed in --input-dir");
    }

    let start = Instant::now();
    let mut last_print = Instant::now();

    for seed in seeds {
        let outcome = runner.run(&seed, Duration::from_millis(args.timeout_ms));
        let op = untracked_operation(0, 0);

        stats.total_cases += 1;
        match outcome.fault {
            Fault::Crash(_) => stats.crashes += 1,
            Fault::Tmout => stats.timeouts += 1,
            _ => {}
        }

        match core.save_if_interesting(&seed, outcome, &op, &mut runner, &mut calibrator) {
            Ok(true) => stats.queued = core.queue.len(),
            Ok(false) => {}
            Err(e) => error_exit(&format!("fatal: {e}")),
        }
        stats.ucrashes = core.unique_crashes as usize;

        if last_print.elapsed() >= Duration::from_millis(500) {
            print_stats(&term, &stats, start.elapsed().as_secs_f64(), &core);
            last_print = Instant::now();
        }
    }

    print_stats(&term, &stats, start.elapsed().as_secs_f64(), &core);
    println!(
        "\nreduced queue: {} entries under {}",
        core.queue.len(),
        core.queue_dir().display()
    );
    for QueueEntry { path, code, .. } in &core.queue {
        println!("  {} (code={})", path.display(), code.as_u8());
    }

    Ok(())
}
