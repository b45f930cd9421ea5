//! Pure statistics over fixed-size coverage bitmaps.
//!
//! Each function below processes the bitmap a machine word at a time and falls back to
//! a byte loop for the tail, so results are identical on 32-bit and 64-bit builds —
//! only the word width used internally changes.

const WORD_BYTES: usize = core::mem::size_of::<usize>();

/// Number of set bits across `mem`. A fully-saturated word short-circuits to
/// `size_of::<usize>() * 8` without a popcount, since the overwhelming majority of a
/// coverage bitmap is either all-zero or all-one once a target warms up.
pub fn count_bits(mem: &[u8]) -> u32 {
    let mut ret = 0u32;
    let mut chunks = mem.chunks_exact(WORD_BYTES);
    for chunk in &mut chunks {
        let word = usize::from_ne_bytes(chunk.try_into().unwrap());
        if word == usize::MAX {
            ret += (WORD_BYTES * 8) as u32;
        } else if word != 0 {
            ret += word.count_ones();
        }
    }
    for &byte in chunks.remainder() {
        ret += byte.count_ones();
    }
    ret
}

/// Number of non-zero bytes in `mem` — the raw bitmap size used by the classifier's
/// bitmap-size check.
pub fn count_bytes(mem: &[u8]) -> u32 {
    let mut ret = 0u32;
    let mut chunks = mem.chunks_exact(WORD_BYTES);
    for chunk in &mut chunks {
        let word = usize::from_ne_bytes(chunk.try_into().unwrap());
        if word == 0 {
            continue;
        }
        if word == usize::MAX {
            ret += WORD_BYTES as u32;
            continue;
        }
        ret += chunk.iter().filter(|&&b| b != 0).count() as u32;
    }
    for &byte in chunks.remainder() {
        if byte != 0 {
            ret += 1;
        }
    }
    ret
}

/// Number of bytes in `mem` that are not `0xFF` (not yet saturated).
pub fn count_non_saturated_bytes(mem: &[u8]) -> u32 {
    let mut ret = 0u32;
    let mut chunks = mem.chunks_exact(WORD_BYTES);
    for chunk in &mut chunks {
        let word = usize::from_ne_bytes(chunk.try_into().unwrap());
        if word == usize::MAX {
            continue;
        }
        ret += chunk.iter().filter(|&&b| b != 0xff).count() as u32;
    }
    for &byte in chunks.remainder() {
        if byte != 0xff {
            ret += 1;
        }
    }
    ret
}
