//! Order statistics over a closed measurement window.
//!
//! The rounding behavior here is deliberately uneven: [`mean`] truncates
//! while [`stddev`] rounds its square root. Downstream dashboards depend on
//! the exact integer values, so both must stay bit-for-bit as they are.

/// Arithmetic mean, truncated toward zero (integer division).
///
/// Callers must pass a non-empty slice.
pub fn mean(values: &[i32]) -> i32 {
    let total: i64 = values.iter().map(|&v| v as i64).sum();
    (total / values.len() as i64) as i32
}

/// Standard deviation: truncated mean of the squared deviations from the
/// truncated mean, square root rounded to the nearest integer.
pub fn stddev(values: &[i32]) -> i32 {
    let m = mean(values) as i64;
    let squares: i64 = values
        .iter()
        .map(|&v| {
            let d = v as i64 - m;
            d * d
        })
        .sum();
    let mean_of_squares = squares / values.len() as i64;
    (mean_of_squares as f64).sqrt().round() as i32
}

/// Threshold elapsed time at the given percentile rank, by linear
/// interpolation between order statistics.
///
/// `sorted` must be non-empty and ascending. `rank = (p/100)·(N+1)`; the
/// two order statistics around the rank are interpolated by its fractional
/// part, and ranks beyond the array saturate to the last element.
pub fn percentile_rank_value(sorted: &[i32], percentile: i32) -> i32 {
    let n = sorted.len();
    let rank = (percentile as f64 / 100.0) * (n as f64 + 1.0);
    let ir = rank.floor() as usize;
    let fr = rank - ir as f64;
    let v1 = sorted[ir.saturating_sub(1).min(n - 1)];
    let v2 = if ir < n { sorted[ir] } else { v1 };
    (v1 as f64 + fr * (v2 - v1) as f64).round() as i32
}

/// Split the sample counts across the threshold line.
///
/// Returns `(at_or_below, above)`; the two always sum to the sample count.
/// Input order is irrelevant.
pub fn partition_at(values: &[i32], threshold: i32) -> (i32, i32) {
    let at_or_below = values.iter().filter(|&&v| v <= threshold).count() as i32;
    (at_or_below, values.len() as i32 - at_or_below)
}

/// Integer percentage `floor(part/whole·100)`; 0 when either operand is
/// non-positive (no data, not an error).
pub fn ipercent(part: i64, whole: i64) -> i32 {
    if part <= 0 || whole <= 0 {
        return 0;
    }
    (part as f64 / whole as f64 * 100.0) as i32
}

/// [`ipercent`] widened to a long result.
pub fn lpercent(part: i64, whole: i64) -> i64 {
    if part <= 0 || whole <= 0 {
        return 0;
    }
    (part as f64 / whole as f64 * 100.0) as i64
}

/// Members above `mean + multiplier·stddev`.
pub fn stddev_high_outliers(values: &[i32], multiplier: f64) -> Vec<i32> {
    let tolerance = mean(values) as f64 + multiplier * stddev(values) as f64;
    values.iter().copied().filter(|&v| (v as f64) > tolerance).collect()
}

/// Members below `mean - multiplier·stddev`.
pub fn stddev_low_outliers(values: &[i32], multiplier: f64) -> Vec<i32> {
    let tolerance = mean(values) as f64 - multiplier * stddev(values) as f64;
    values.iter().copied().filter(|&v| (v as f64) < tolerance).collect()
}
