//! Order statistics on sample arrays
//!
//! Depth samples are bimodal (background vs. food) with sensor dropouts, so
//! everything here is built on sorting rather than mean/variance. Empty input
//! yields 0.0; callers guard emptiness upstream.

/// Return a sorted copy of the samples (NaN sorts last under `total_cmp`)
pub fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Median of unsorted samples
pub fn median(values: &[f64]) -> f64 {
    median_sorted(&sorted_copy(values))
}

/// Median of already-sorted samples
///
/// Even-length input averages the two middle elements.
pub fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    let mid = n / 2;
    if n % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Interquartile range of unsorted samples
pub fn iqr(values: &[f64]) -> f64 {
    iqr_sorted(&sorted_copy(values))
}

/// Interquartile range of already-sorted samples
///
/// Nearest-rank quartiles at indices n/4 and 3n/4. Fewer than four samples
/// degenerate to the full range (max - min).
pub fn iqr_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    match n {
        0 => 0.0,
        1..=3 => sorted[n - 1] - sorted[0],
        _ => sorted[(3 * n) / 4] - sorted[n / 4],
    }
}

/// Percentile of unsorted samples, `p` in [0, 1]
pub fn percentile(values: &[f64], p: f64) -> f64 {
    percentile_sorted(&sorted_copy(values), p)
}

/// Percentile of already-sorted samples
///
/// Index = clamp(floor(n * p), 0, n - 1), so `p` outside [0, 1] clamps to the
/// first or last element.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    sorted[percentile_index(sorted.len(), p)]
}

/// Rank used by [`percentile_sorted`] for a sample of length `n` (n > 0)
pub(crate) fn percentile_index(n: usize, p: f64) -> usize {
    let raw = (n as f64 * p).floor();
    // NaN and negatives land on the first element
    let idx = if raw.is_nan() || raw <= 0.0 { 0 } else { raw as usize };
    idx.min(n - 1)
}

/// Robust band `(median - lower_mult * iqr, median + upper_mult * iqr)`
pub fn height_band(values: &[f64], lower_mult: f64, upper_mult: f64) -> (f64, f64) {
    let sorted = sorted_copy(values);
    height_band_sorted(&sorted, lower_mult, upper_mult)
}

pub(crate) fn height_band_sorted(sorted: &[f64], lower_mult: f64, upper_mult: f64) -> (f64, f64) {
    let med = median_sorted(sorted);
    let spread = iqr_sorted(sorted);
    (med - lower_mult * spread, med + upper_mult * spread)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_empty_inputs_return_zero() {
        assert_eq!(median(&[]), 0.0);
        assert_eq!(iqr(&[]), 0.0);
        assert_eq!(percentile(&[], 0.5), 0.0);
        assert_eq!(height_band(&[], 1.5, 1.5), (0.0, 0.0));
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_iqr_small_sample_uses_range() {
        assert_eq!(iqr(&[5.0]), 0.0);
        assert_eq!(iqr(&[1.0, 9.0, 4.0]), 8.0);
    }

    #[test]
    fn test_iqr_nearest_rank() {
        // n = 8: Q1 at index 2, Q3 at index 6
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        assert_eq!(iqr(&values), 7.0 - 3.0);
    }

    #[test]
    fn test_percentile_clamps() {
        let values = [10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile(&values, 0.0), 10.0);
        assert_eq!(percentile(&values, 0.5), 30.0);
        assert_eq!(percentile(&values, 1.0), 40.0);
        assert_eq!(percentile(&values, -0.3), 10.0);
        assert_eq!(percentile(&values, 7.0), 40.0);
        assert_eq!(percentile(&values, f64::NAN), 10.0);
    }

    #[test]
    fn test_order_invariance() {
        let shuffled = [0.91, 0.42, 1.7, 0.05, 0.88, 1.1, 0.33, 0.64, 1.25];
        let sorted = sorted_copy(&shuffled);
        let reversed: Vec<f64> = sorted.iter().rev().copied().collect();

        for input in [&shuffled[..], &sorted[..], &reversed[..]] {
            assert_eq!(median(input), median(&shuffled));
            assert_eq!(iqr(input), iqr(&shuffled));
            assert_eq!(percentile(input, 0.2), percentile(&shuffled, 0.2));
        }
    }

    #[test]
    fn test_idempotent_on_sorted_input() {
        let sorted = sorted_copy(&[0.7, 0.2, 0.9, 0.4, 0.5, 0.1]);
        assert_eq!(median(&sorted), median_sorted(&sorted));
        assert_eq!(iqr(&sorted), iqr_sorted(&sorted));
        assert_eq!(percentile(&sorted, 0.75), percentile_sorted(&sorted, 0.75));
        assert_eq!(sorted_copy(&sorted), sorted);
    }

    #[test]
    fn test_height_band() {
        // median 5, iqr = values[6] - values[2] = 7 - 3 = 4
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let (lower, upper) = height_band(&values, 1.0, 0.5);
        assert_abs_diff_eq!(lower, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(upper, 7.0, epsilon = 1e-12);
    }
}
