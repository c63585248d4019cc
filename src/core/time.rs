//! Nanosecond timestamp helpers.
//!
//! Both clocks in a bag (the recorder's log time and the producer's header
//! stamp) are carried as `u64` nanoseconds. The search helpers here operate on
//! timestamp slices in log order and assume they are non-decreasing; results
//! on unsorted input are unspecified.

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Convert seconds to nanoseconds.
///
/// Returns `None` for negative, NaN or out-of-range input.
pub fn secs_to_ns(secs: f64) -> Option<u64> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    whole_ns((secs * NANOS_PER_SEC).round())
}

/// `u64::MAX as f64` rounds up to 2^64, which does not fit.
fn whole_ns(ns: f64) -> Option<u64> {
    if ns >= u64::MAX as f64 {
        return None;
    }
    Some(ns as u64)
}

pub fn ns_to_secs(ns: u64) -> f64 {
    ns as f64 / NANOS_PER_SEC
}

/// Position of the timestamp closest to `target`.
///
/// Binary search for the insertion point, then compare that candidate with
/// its predecessor. On an exact tie the earlier (lower) position wins.
pub fn nearest_position(times: &[u64], target: u64) -> Option<usize> {
    if times.is_empty() {
        return None;
    }
    let insert = times.partition_point(|&t| t < target);
    if insert == 0 {
        return Some(0);
    }
    if insert < times.len() {
        let before = target.abs_diff(times[insert - 1]);
        let after = target.abs_diff(times[insert]);
        if after < before {
            return Some(insert);
        }
    }
    // Equal stamps before the insertion point tie with each other; take the first.
    let value = times[insert - 1];
    Some(times[..insert].partition_point(|&t| t < value))
}

/// Position of the timestamp closest to `target` by a full scan.
///
/// Used for header stamps, which producers do not guarantee to be ordered.
/// The first minimum wins, matching [`nearest_position`] on ties.
pub fn nearest_position_unsorted(times: &[u64], target: u64) -> Option<usize> {
    let mut best: Option<(usize, u64)> = None;
    for (pos, &t) in times.iter().enumerate() {
        let dist = target.abs_diff(t);
        match best {
            Some((_, best_dist)) if best_dist <= dist => {}
            _ => best = Some((pos, dist)),
        }
    }
    best.map(|(pos, _)| pos)
}

/// Number of timestamps with `start <= t <= end`.
pub fn count_in_range(times: &[u64], start: u64, end: u64) -> usize {
    if start > end {
        return 0;
    }
    let lo = times.partition_point(|&t| t < start);
    let hi = times.partition_point(|&t| t <= end);
    hi.saturating_sub(lo)
}

pub fn is_non_decreasing(times: &[u64]) -> bool {
    times.windows(2).all(|w| w[0] <= w[1])
}
