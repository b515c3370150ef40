//! Derivative-free minimization for the model likelihoods.
//!
//! Both fitters minimize a smooth objective over a handful of
//! log-transformed parameters, which the Nelder–Mead simplex method handles
//! well without gradients.
//!
//! # Algorithm
//!
//! Each iteration orders the `n + 1` simplex vertices by objective value and
//! replaces the worst one by its reflection through the centroid of the
//! others, expanding or contracting the step depending on how the reflected
//! point ranks. When no candidate improves on the worst vertex, the whole
//! simplex shrinks toward the best vertex.
//!
//! Non-finite objective values are treated as `+∞`, so the search backs away
//! from regions where the likelihood is undefined.
//!
//! The method is fully deterministic: the same objective and starting point
//! always yield the same result.

use serde::{Deserialize, Serialize};

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Fitted parameters below this count as a collapse onto the boundary of
/// the parameter space.
pub(crate) const MIN_FITTED_PARAMETER: f64 = 1e-8;

/// Nelder–Mead settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NelderMead {
    /// Upper bound on simplex iterations.
    pub max_iterations: usize,
    /// Convergence threshold on the spread of objective values across the
    /// simplex. Vertices must also lie within `√tolerance` of the best one.
    pub tolerance: f64,
    /// Offset applied to each coordinate of the starting point to build the
    /// initial simplex.
    pub initial_step: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            max_iterations: 20_000,
            tolerance: 1e-10,
            initial_step: 0.5,
        }
    }
}

/// Outcome of a minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub point: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

#[derive(Debug, Clone)]
struct Vertex {
    point: Vec<f64>,
    value: f64,
}

fn sanitize(value: f64) -> f64 {
    if value.is_nan() { f64::INFINITY } else { value }
}

impl NelderMead {
    /// Minimizes `objective` starting from `start`.
    ///
    /// ```
    /// use cltv_models::optimizer::NelderMead;
    ///
    /// let rosenbrock = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
    /// let min = NelderMead::default().minimize(rosenbrock, &[-1.2, 1.0]);
    /// assert!(min.converged);
    /// assert!((min.point[0] - 1.0).abs() < 1e-3);
    /// assert!((min.point[1] - 1.0).abs() < 1e-3);
    /// ```
    pub fn minimize<F>(&self, mut objective: F, start: &[f64]) -> Minimum
    where
        F: FnMut(&[f64]) -> f64,
    {
        let dim = start.len();
        let mut evaluate = |point: Vec<f64>| {
            let value = sanitize(objective(&point));
            Vertex { point, value }
        };

        let mut simplex = Vec::with_capacity(dim + 1);
        simplex.push(evaluate(start.to_vec()));
        for i in 0..dim {
            let mut point = start.to_vec();
            point[i] += self.initial_step;
            simplex.push(evaluate(point));
        }

        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.max_iterations {
            simplex.sort_by(|a, b| a.value.total_cmp(&b.value));
            if self.has_converged(&simplex) {
                converged = true;
                break;
            }
            iterations += 1;

            let worst = &simplex[dim];
            let centroid = centroid(&simplex[..dim]);
            let reflected = evaluate(along(&centroid, &worst.point, -REFLECTION));

            if reflected.value < simplex[0].value {
                let expanded = evaluate(along(&centroid, &worst.point, -EXPANSION));
                simplex[dim] = if expanded.value < reflected.value {
                    expanded
                } else {
                    reflected
                };
                continue;
            }
            if reflected.value < simplex[dim - 1].value {
                simplex[dim] = reflected;
                continue;
            }

            let contracted = if reflected.value < simplex[dim].value {
                evaluate(along(&centroid, &reflected.point, CONTRACTION))
            } else {
                evaluate(along(&centroid, &simplex[dim].point, CONTRACTION))
            };
            if contracted.value < reflected.value.min(simplex[dim].value) {
                simplex[dim] = contracted;
                continue;
            }

            let best = simplex[0].point.clone();
            for vertex in &mut simplex[1..] {
                let point = along(&best, &vertex.point, SHRINK);
                *vertex = evaluate(point);
            }
        }
        simplex.sort_by(|a, b| a.value.total_cmp(&b.value));

        let best = simplex.swap_remove(0);
        tracing::debug!(iterations, converged, value = best.value, "nelder-mead finished");
        Minimum {
            point: best.point,
            value: best.value,
            iterations,
            converged,
        }
    }

    fn has_converged(&self, sorted: &[Vertex]) -> bool {
        let best = &sorted[0];
        if !best.value.is_finite() {
            return false;
        }
        let value_spread = sorted
            .iter()
            .map(|v| (v.value - best.value).abs())
            .fold(0.0, f64::max);
        let point_spread = sorted
            .iter()
            .flat_map(|v| v.point.iter().zip(&best.point).map(|(x, b)| (x - b).abs()))
            .fold(0.0, f64::max);
        value_spread <= self.tolerance && point_spread <= self.tolerance.sqrt()
    }
}

#[expect(clippy::cast_precision_loss)]
fn centroid(vertices: &[Vertex]) -> Vec<f64> {
    let n = vertices.len() as f64;
    let dim = vertices[0].point.len();
    (0..dim)
        .map(|i| vertices.iter().map(|v| v.point[i]).sum::<f64>() / n)
        .collect()
}

/// `origin + coef * (target - origin)`.
fn along(origin: &[f64], target: &[f64], coef: f64) -> Vec<f64> {
    origin
        .iter()
        .zip(target)
        .map(|(o, t)| o + coef * (t - o))
        .collect()
}
