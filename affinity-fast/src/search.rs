// Per-row bisection over precision (beta)
//
// Entropy is non-increasing in beta: a larger beta concentrates the mass on
// the nearest neighbors. The search therefore walks beta like this:
//
//   entropy too high (too flat)   -> beta must grow   -> lower bound = beta
//   entropy too low  (too peaked) -> beta must shrink -> upper bound = beta
//
// While the side we are moving towards has no bound yet, beta is doubled or
// halved. Once both bounds exist, beta is the midpoint. The loop stops as
// soon as |H - target| <= tolerance, or after max_steps evaluations.

use crate::element::Element;
use crate::entropy::evaluate_into;
use crate::params::CalibrationParams;

/// Open-ended bracket around the beta being searched for.
///
/// "No bound yet" is represented by the signed infinities, so
/// `lower < beta < upper` holds from the first step. `has_lower` and
/// `has_upper` compare against exactly those sentinels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchBounds {
    pub lower: f64,
    pub upper: f64,
}

impl Default for SearchBounds {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

impl SearchBounds {
    pub const UNBOUNDED: SearchBounds = SearchBounds {
        lower: f64::NEG_INFINITY,
        upper: f64::INFINITY,
    };

    pub fn has_lower(&self) -> bool {
        self.lower != f64::NEG_INFINITY
    }

    pub fn has_upper(&self) -> bool {
        self.upper != f64::INFINITY
    }

    /// Entropy was above target at `beta`: move the lower bound up and
    /// return the next beta to try.
    fn raise_lower(&mut self, beta: f64) -> f64 {
        debug_assert!(beta >= self.lower);
        self.lower = beta;
        if self.has_upper() {
            (beta + self.upper) / 2.0
        } else {
            beta * 2.0
        }
    }

    /// Entropy was below target at `beta`: move the upper bound down and
    /// return the next beta to try.
    fn lower_upper(&mut self, beta: f64) -> f64 {
        debug_assert!(beta <= self.upper);
        self.upper = beta;
        if self.has_lower() {
            (beta + self.lower) / 2.0
        } else {
            beta / 2.0
        }
    }
}

/// What the search settled on for one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowOutcome {
    /// Final precision. On convergence this is the beta that produced the
    /// row; after an exhausted budget it is the next beta the bisection
    /// would have tried.
    pub beta: f64,
    /// Entropy of the returned probability row
    pub entropy: f64,
    /// Number of entropy evaluations performed
    pub steps: usize,
    pub converged: bool,
}

/// Bisect beta for one row, writing the conditional probabilities into
/// `probabilities` (same length as `distances`).
///
/// Running out of steps is not an error: the last evaluated row is left in
/// `probabilities` and `converged` is false. Callers needing a strict
/// entropy match should check that flag.
pub fn search_row<T: Element>(
    distances: &[T],
    target_entropy: f64,
    exclude: Option<usize>,
    params: &CalibrationParams,
    probabilities: &mut [f64],
) -> RowOutcome {
    let mut beta = 1.0f64;
    let mut bounds = SearchBounds::UNBOUNDED;
    let mut entropy = f64::NAN;

    for step in 1..=params.max_steps {
        entropy = evaluate_into(distances, beta, exclude, params.epsilon, probabilities);

        let diff = entropy - target_entropy;
        if diff.abs() <= params.tolerance {
            return RowOutcome {
                beta,
                entropy,
                steps: step,
                converged: true,
            };
        }

        beta = if diff > 0.0 {
            bounds.raise_lower(beta)
        } else {
            bounds.lower_upper(beta)
        };
    }

    RowOutcome {
        beta,
        entropy,
        steps: params.max_steps,
        converged: false,
    }
}

/// Allocating variant of [`search_row`]: returns `(probabilities, outcome)`.
pub fn search<T: Element>(
    distances: &[T],
    target_entropy: f64,
    exclude: Option<usize>,
    params: &CalibrationParams,
) -> (Vec<f64>, RowOutcome) {
    let mut probabilities = vec![0.0; distances.len()];
    let outcome = search_row(distances, target_entropy, exclude, params, &mut probabilities);
    (probabilities, outcome)
}
