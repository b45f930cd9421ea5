//! Bucketization of raw per-edge hit counts into magnitude classes.
//!
//! Mirrors a classic AFL-style `count_class_lookup8` / `count_class_lookup16` pair: a
//! destructive rewrite applied to every trace before it reaches the reduction
//! classifier. Each bucket class is a single bit (0, 1, 2, 4, 8, 16, 32, 64, 128) so the
//! virgin bitmap can later treat a byte as an 8-bit mask over "which bucket has been
//! seen for this edge".

use once_cell::sync::Lazy;

const fn bucket_for(raw: usize) -> u8 {
    match raw {
        0 => 0,
        1 => 1,
        2 => 2,
        3 => 4,
        4..=7 => 8,
        8..=15 => 16,
        16..=31 => 32,
        32..=127 => 64,
        _ => 128,
    }
}

const fn build_lookup8() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = bucket_for(i);
        i += 1;
    }
    table
}

/// 8-bit hit count -> bucket class lookup table, built at compile time.
const COUNT_CLASS_LOOKUP8: [u8; 256] = build_lookup8();

/// 16-bit (two packed bytes) lookup table, derived from the 8-bit table on first use so
/// `bucketize` can process a trace two bytes at a time.
static COUNT_CLASS_LOOKUP16: Lazy<Vec<u16>> = Lazy::new(|| {
    let mut table = vec![0u16; 65536];
    for b1 in 0..256usize {
        for b2 in 0..256usize {
            let hi = COUNT_CLASS_LOOKUP8[b1] as u16;
            let lo = COUNT_CLASS_LOOKUP8[b2] as u16;
            table[(b1 << 8) + b2] = (hi << 8) | lo;
        }
    }
    table
});

/// Destructively rewrite `trace` in place, replacing each byte with its bucket class.
///
/// Note on idempotency: the bucket classes themselves (4, 8, 16, 32) sit inside the
/// ranges that raw hit counts 3, 4..7, 8..15 and 16..31 map to, so re-running this on an
/// already-bucketized trace escalates those four values by one step (4->8->16->32->64)
/// before settling at a fixed point. `0`, `1`, `2`, `64` and `128` are true fixed points.
/// This is inherited from the reference table and is harmless in practice: a trace is
/// bucketized exactly once, right after execution, never on already-classified data.
pub fn bucketize(trace: &mut [u8]) {
    let mut chunks = trace.chunks_exact_mut(2);
    for chunk in &mut chunks {
        let word = ((chunk[0] as usize) << 8) | chunk[1] as usize;
        let bucketed = COUNT_CLASS_LOOKUP16[word];
        chunk[0] = (bucketed >> 8) as u8;
        chunk[1] = (bucketed & 0xff) as u8;
    }
    for byte in chunks.into_remainder() {
        *byte = COUNT_CLASS_LOOKUP8[*byte as usize];
    }
}

/// Destructively simplify `trace` in place: any non-zero byte becomes `0x80`, zero
/// becomes `0x01`. Used on crash/hang traces so two traces compare equal iff they hit
/// the same edge set, independent of hit counts.
pub fn simplify(trace: &mut [u8]) {
    for byte in trace.iter_mut() {
        *byte = if *byte == 0 { 1 } else { 128 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_the_reference_table() {
        let cases = [
            (0u8, 0u8),
            (1, 1),
            (2, 2),
            (3, 4),
            (4, 8),
            (7, 8),
            (8, 16),
            (15, 16),
            (16, 32),
            (31, 32),
            (32, 64),
            (127, 64),
            (128, 128),
            (255, 128),
        ];
        for (raw, want) in cases {
            let mut trace = vec![raw];
            bucketize(&mut trace);
            assert_eq!(trace[0], want, "raw={raw}");
        }
    }

    #[test]
    fn fixed_points_are_stable_under_repeated_bucketizing() {
        for &fixed in &[0u8, 1, 2, 64, 128] {
            let mut trace = vec![fixed];
            bucketize(&mut trace);
            assert_eq!(trace[0], fixed);
        }
    }

    #[test]
    fn intermediate_bucket_classes_escalate_on_reclassification() {
        // Documents the known non-fixed-point quirk inherited from the source table;
        // a real trace is never bucketized twice, so this never surfaces in practice.
        let mut trace = vec![4u8, 8, 16, 32];
        bucketize(&mut trace);
        assert_eq!(trace, vec![8, 16, 32, 64]);
    }

    #[test]
    fn simplify_maps_zero_and_nonzero() {
        let mut trace = vec![0u8, 1, 2, 128, 255];
        simplify(&mut trace);
        assert_eq!(trace, vec![1, 128, 128, 128, 128]);
    }

    #[test]
    fn simplify_is_idempotent() {
        let mut once = vec![0u8, 3, 9, 200];
        simplify(&mut once);
        let mut twice = once.clone();
        simplify(&mut twice);
        assert_eq!(once, twice);
    }

    #[test]
    fn bucketize_is_idempotent_on_realistic_traces() {
        // Realistic raw traces overwhelmingly land on 0/1/2/64/128 (hit exactly once,
        // twice, or "a lot"); restrict the idempotency check to that fixed-point set,
        // which is the only subset for which double-application is well defined.
        let mut trace: Vec<u8> = vec![0, 1, 2, 64, 128, 0, 2, 128];
        let once = {
            let mut t = trace.clone();
            bucketize(&mut t);
            t
        };
        bucketize(&mut trace);
        let twice = {
            let mut t = once.clone();
            bucketize(&mut t);
            t
        };
        assert_eq!(once, twice);
    }
}
