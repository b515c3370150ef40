/// Computes a quantile from sorted data using linear interpolation.
///
/// For `n` values the quantile `q` lies at fractional position `(n - 1) * q`;
/// the result interpolates linearly between the two neighbouring order
/// statistics. `q` is clamped to `[0, 1]`.
///
/// Returns `f64::NAN` if the input is empty.
///
/// # Examples
///
/// ```
/// use cltv_stats::percentiles::compute_quantile;
///
/// let values = [1.0, 2.0, 3.0, 4.0];
/// assert_eq!(compute_quantile(&values, 0.0), 1.0);
/// assert_eq!(compute_quantile(&values, 0.5), 2.5);
/// assert_eq!(compute_quantile(&values, 1.0), 4.0);
/// ```
#[expect(
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]
#[must_use]
pub fn compute_quantile(sorted_values: &[f64], quantile: f64) -> f64 {
    if sorted_values.is_empty() {
        return f64::NAN;
    }
    let last = sorted_values.len() - 1;
    let position = last as f64 * quantile.clamp(0.0, 1.0);
    let lower = (position.floor() as usize).min(last);
    let upper = (lower + 1).min(last);
    let fraction = position - lower as f64;
    let low_value = sorted_values[lower];
    if fraction == 0.0 || lower == upper {
        return low_value;
    }
    low_value + fraction * (sorted_values[upper] - low_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_nan() {
        assert!(compute_quantile(&[], 0.5).is_nan());
    }

    #[test]
    fn test_single_value() {
        assert_eq!(compute_quantile(&[7.0], 0.01), 7.0);
        assert_eq!(compute_quantile(&[7.0], 0.99), 7.0);
    }

    #[test]
    fn test_long_tail_upper_quantile() {
        // 48 ones and one outlier: the 99th percentile sits between the last
        // one and the outlier at fraction 0.52.
        let mut values = vec![1.0; 48];
        values.push(10_000.0);
        let q99 = compute_quantile(&values, 0.99);
        assert!((q99 - (1.0 + 0.52 * 9_999.0)).abs() < 1e-6);
        assert_eq!(compute_quantile(&values, 0.01), 1.0);
    }
}
