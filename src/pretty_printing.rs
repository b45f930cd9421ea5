use crate::config::DEBUG_PRINT;
use crate::{ReductionCore, Statistics};

use core::fmt;

use console::Term;
use num_format::{Locale, ToFormattedString};

/// Different log-types that can be used to print out messages in different colors
pub enum LogType {
    Neutral = 0,
    Success = 1,
    Failure = 2,
}

/// Color a string green
pub struct Green(pub &'static str);
impl fmt::Display for Green {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\x1B[32m")?;
        write!(f, "{}", self.0)?;
        write!(f, "\x1B[0m")?;
        Ok(())
    }
}

/// Color a string blue
pub struct Blue(pub &'static str);
impl fmt::Display for Blue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\x1B[34m")?;
        write!(f, "{}", self.0)?;
        write!(f, "\x1B[0m")?;
        Ok(())
    }
}

/// Color a string red
pub struct Red(pub &'static str);
impl fmt::Display for Red {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\x1B[31m")?;
        write!(f, "{}", self.0)?;
        write!(f, "\x1B[0m")?;
        Ok(())
    }
}

/// Small wrapper to print out colored log messages
pub fn log(color: LogType, msg: &str) {
    if DEBUG_PRINT {
        match color {
            LogType::Neutral => println!("{} {}", Blue("[-]"), msg),
            LogType::Success => println!("{} {}", Green("[+]"), msg),
            LogType::Failure => println!("{} {}", Red("[!]"), msg),
        }
    }
}

/// Print out statistics in a nicely formatted static screen
fn pretty_stats(term: &Term, stats: &Statistics, elapsed_time: f64, core: &ReductionCore) {
    term.move_cursor_to(0, 2).unwrap();
    term.write_line(&format!(
        "{}",
        Green("\t\t[ reduce-fuzz coverage-reduction core ]\n")
    ))
    .unwrap();

    term.write_line(&format!(
        "\t{}\n\t   Run time [sec]: {:8.2}\n\t   Total cases run: {:12}",
        Blue("Progression"),
        elapsed_time,
        stats.total_cases.to_formatted_string(&Locale::en),
    ))
    .unwrap();

    term.move_cursor_to(54, 4).unwrap();
    term.write_line(&format!("{}", Blue("Overall Results"))).unwrap();
    term.move_cursor_to(54, 5).unwrap();
    term.write_line(&format!("   Unique crashes: {}", stats.ucrashes)).unwrap();
    term.move_cursor_to(54, 6).unwrap();
    term.write_line(&format!("   Crashes: \t{}", stats.crashes)).unwrap();
    term.move_cursor_to(54, 7).unwrap();
    term.write_line(&format!("   Timeouts: \t{}", stats.timeouts)).unwrap();
    term.move_cursor_to(54, 8).unwrap();
    term.write_line(&format!("   Unique hangs: {}", core.unique_hangs)).unwrap();

    term.move_cursor_down(2).unwrap();
    term.write_line(&format!(
        "\t{}\n\t   Cases per second: {:12}",
        Blue("Performance measurements"),
        (stats.total_cases as f64 / elapsed_time).round() as u64,
    ))
    .unwrap();

    term.move_cursor_to(54, 11).unwrap();
    term.write_line(&format!("{}", Blue("Reduction state"))).unwrap();
    term.move_cursor_to(54, 12).unwrap();
    term.write_line(&format!(
        "   Min bitmap size: {}",
        core.min_bitmap_size().map_or("-".to_string(), |v| v.to_string())
    ))
    .unwrap();
    term.move_cursor_to(54, 13).unwrap();
    term.write_line(&format!(
        "   Min hit count: {}",
        core.min_hit_count().map_or("-".to_string(), |v| v.to_string())
    ))
    .unwrap();
    term.move_cursor_to(54, 14).unwrap();
    term.write_line(&format!("   Queue size: {}", stats.queued)).unwrap();

    term.flush().unwrap();
}

/// Simple debug view of statistics
fn basic_stats(stats: &Statistics, elapsed_time: f64, core: &ReductionCore) {
    println!(
        "[{:8.2}] cases: {:12} : cps: {:8} : queued: {:6} : crashes: {:8} \
        \n\t   ucrashes: {:6} : timeouts: {:6} : min_bms: {:?} : min_hcn: {:?}\n",
        elapsed_time,
        stats.total_cases.to_formatted_string(&Locale::en),
        ((stats.total_cases as f64 / elapsed_time) as u64).to_formatted_string(&Locale::en),
        stats.queued,
        stats.crashes,
        stats.ucrashes,
        stats.timeouts,
        core.min_bitmap_size(),
        core.min_hit_count(),
    );
}

/// Wrapper for actual stat-printing functions
pub fn print_stats(term: &Term, stats: &Statistics, elapsed_time: f64, core: &ReductionCore) {
    if DEBUG_PRINT {
        basic_stats(stats, elapsed_time, core);
    } else {
        pretty_stats(term, stats, elapsed_time, core);
    }
}
