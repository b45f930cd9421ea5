//! Typed builders for the queue/crash/hang filename grammar, replacing ad-hoc string
//! concatenation with a small set of structs that can only produce well-formed names.

use crate::classifier::ImprovementCode;
use crate::error::CoreError;

/// Filesystems the core targets (ext4, tmpfs, ...) cap a single path component well
/// under this; a filename built from a pathological `op` string is a fatal
/// misconfiguration, not something to silently truncate.
pub const MAX_FILENAME_LEN: usize = 255;

/// A single integer or signed delta embedded in a mutation description (the `val:`
/// field), tagged with the endianness it was interpreted under.
#[derive(Debug, Clone, Copy)]
pub struct ValDescriptor {
    pub big_endian: bool,
    pub value: i64,
}

/// Describes the mutation stage that produced a candidate input. The mutator/stage
/// implementation itself is out of scope for this crate; callers hand in whatever they
/// used to derive the candidate.
#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    pub src: u32,
    pub splice_with: Option<u32>,
    pub time_ms: u64,
    pub stage: String,
    pub pos: Option<i64>,
    pub val: Option<ValDescriptor>,
    pub rep: Option<i64>,
}

impl OperationDescriptor {
    fn render(&self) -> String {
        let mut s = format!("src:{:06}", self.src);
        if let Some(splice) = self.splice_with {
            s.push_str(&format!("+{:06}", splice));
        }
        s.push_str(&format!(",time:{}", self.time_ms));
        s.push_str(&format!(",op:{}", self.stage));
        if let Some(pos) = self.pos {
            s.push_str(&format!(",pos:{pos}"));
            if let Some(val) = self.val {
                let prefix = if val.big_endian { "be:" } else { "" };
                s.push_str(&format!(",val:{prefix}{:+}", val.value));
            }
        } else if let Some(rep) = self.rep {
            s.push_str(&format!(",rep:{rep}"));
        }
        s
    }
}

/// Maps an improvement code to its filename suffix. Codes `1..=7` each get a distinct
/// suffix; `0` (discard) never reaches a filename at all, so it has none.
pub fn code_suffix(code: ImprovementCode) -> Option<&'static str> {
    match code.as_u8() {
        1 => Some(",-hcn"),
        2 => Some(",-cov"),
        3 => Some(",-cov_hcn"),
        4 => Some(",-bms"),
        5 => Some(",-bms_hcn"),
        6 => Some(",-bms_cov"),
        7 => Some(",-bms_cov_hcn"),
        _ => None,
    }
}

/// `id:NNNNNN,<op>[,-suffix]`
pub fn queue_name(id: u64, op: &OperationDescriptor, code: ImprovementCode) -> String {
    let mut s = format!("id:{id:06},{}", op.render());
    if let Some(suffix) = code_suffix(code) {
        s.push_str(suffix);
    }
    s
}

/// `id:NNNNNN,sig:SS,<op>`
pub fn crash_name(id: u64, signal: u8, op: &OperationDescriptor) -> String {
    format!("id:{id:06},sig:{signal:02},{}", op.render())
}

/// `id:NNNNNN,<op>`
pub fn hang_name(id: u64, op: &OperationDescriptor) -> String {
    format!("id:{id:06},{}", op.render())
}

/// Guard against a filename that would exceed [`MAX_FILENAME_LEN`]. Per the error
/// design this is a fatal condition: a runaway `op` descriptor (e.g. an unbounded
/// splice chain) means the harness feeding this crate is misbehaving, not something
/// the reduction core can paper over by truncating.
pub fn check_length(name: &str) -> Result<(), CoreError> {
    if name.len() > MAX_FILENAME_LEN {
        Err(CoreError::FilenameTooLong)
    } else {
        Ok(())
    }
}
