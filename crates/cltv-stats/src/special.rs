//! Special functions used by the likelihoods of the purchase and spend models.

pub use statrs::function::gamma::ln_gamma;

const HYP2F1_MAX_TERMS: usize = 100_000;
const HYP2F1_REL_TOLERANCE: f64 = 1e-15;

/// Computes `ln(exp(a) + exp(b))` without overflow.
///
/// ```
/// use cltv_stats::special::log_sum_exp;
///
/// let v = log_sum_exp(1000.0, 1000.0);
/// assert!((v - (1000.0 + 2f64.ln())).abs() < 1e-12);
/// ```
#[must_use]
pub fn log_sum_exp(a: f64, b: f64) -> f64 {
    let max = a.max(b);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + ((a - max).exp() + (b - max).exp()).ln()
}

/// Gauss hypergeometric function `₂F₁(a, b; c; z)` for `0 <= z < 1`.
///
/// Evaluated by direct summation of the power series
/// `Σ (a)ₙ (b)ₙ / (c)ₙ · zⁿ / n!`. Returns `NaN` when `z` lies outside
/// `[0, 1)`, when `c` is a non-positive integer, or when the series does not
/// converge within the term budget. The result may be `+∞` when the sum
/// overflows; [`ln_hyp2f1`] handles that case.
///
/// ```
/// use cltv_stats::special::hyp2f1;
///
/// // ₂F₁(1, 1; 2; z) = -ln(1 - z) / z
/// let z: f64 = 0.5;
/// let expected = -(1.0 - z).ln() / z;
/// assert!((hyp2f1(1.0, 1.0, 2.0, z) - expected).abs() < 1e-12);
/// ```
#[must_use]
pub fn hyp2f1(a: f64, b: f64, c: f64, z: f64) -> f64 {
    if !(0.0..1.0).contains(&z) || (c <= 0.0 && c.fract() == 0.0) {
        return f64::NAN;
    }
    if z == 0.0 {
        return 1.0;
    }

    let mut term = 1.0_f64;
    let mut sum = 1.0_f64;
    for n in 0..HYP2F1_MAX_TERMS {
        #[expect(clippy::cast_precision_loss)]
        let n = n as f64;
        term *= (a + n) * (b + n) / ((c + n) * (n + 1.0)) * z;
        sum += term;
        if !sum.is_finite() {
            return sum;
        }
        if term.abs() <= HYP2F1_REL_TOLERANCE * sum.abs() {
            return sum;
        }
    }
    f64::NAN
}

/// Natural logarithm of `₂F₁(a, b; c; z)`.
///
/// Falls back to Euler's transformation
/// `₂F₁(a, b; c; z) = (1 - z)^(c - a - b) ₂F₁(c - a, c - b; c; z)`
/// when the direct series is not finite.
#[must_use]
pub fn ln_hyp2f1(a: f64, b: f64, c: f64, z: f64) -> f64 {
    let direct = hyp2f1(a, b, c, z);
    if direct.is_finite() && direct > 0.0 {
        return direct.ln();
    }
    let transformed = hyp2f1(c - a, c - b, c, z);
    transformed.ln() + (c - a - b) * (1.0 - z).ln()
}
