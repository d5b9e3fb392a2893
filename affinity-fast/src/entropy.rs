// Gibbs distribution and entropy for one distance row
//
// For a row of squared distances d_j and a precision beta:
//
//   w_j = exp(-beta * d_j)        unnormalized weight
//   Z   = sum_j w_j               partition sum
//   P_j = w_j / Z                 conditional probability
//   H   = ln(Z) + beta * E[d]     Shannon entropy in nats
//
// The closed form for H comes from -sum P_j ln P_j = sum P_j (beta d_j + ln Z).
// It needs no second pass over ln(P_j) and never takes ln(0) for weights
// that underflowed.

use crate::element::Element;

/// Fill `probabilities` with the Gibbs distribution of `distances` at
/// `beta` and return its entropy.
///
/// `exclude` names a position (the sample's own column in exact mode) that
/// is left out of the distribution and written as 0. When every weight
/// underflows, `epsilon` stands in for the partition sum: the row comes out
/// all zeros and the entropy is `ln(epsilon)`.
pub fn evaluate_into<T: Element>(
    distances: &[T],
    beta: f64,
    exclude: Option<usize>,
    epsilon: f64,
    probabilities: &mut [f64],
) -> f64 {
    debug_assert_eq!(distances.len(), probabilities.len());

    let mut sum_weights = 0.0f64;
    for (j, (&d, p)) in distances.iter().zip(probabilities.iter_mut()).enumerate() {
        if exclude == Some(j) {
            *p = 0.0;
            continue;
        }
        let w = (-beta * d.widen()).exp();
        *p = w;
        sum_weights += w;
    }

    if sum_weights == 0.0 {
        sum_weights = epsilon;
    }

    let mut expected_distance = 0.0f64;
    for (&d, p) in distances.iter().zip(probabilities.iter_mut()) {
        *p /= sum_weights;
        expected_distance += d.widen() * *p;
    }

    sum_weights.ln() + beta * expected_distance
}

/// Allocating variant of [`evaluate_into`]: returns `(probabilities, entropy)`.
pub fn evaluate<T: Element>(
    distances: &[T],
    beta: f64,
    exclude: Option<usize>,
    epsilon: f64,
) -> (Vec<f64>, f64) {
    let mut probabilities = vec![0.0; distances.len()];
    let entropy = evaluate_into(distances, beta, exclude, epsilon, &mut probabilities);
    (probabilities, entropy)
}

/// Shannon entropy (nats) computed directly from a probability row.
///
/// Zero entries contribute nothing. Used to cross-check the closed form.
pub fn shannon_entropy(probabilities: &[f64]) -> f64 {
    probabilities
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| -p * p.ln())
        .sum()
}
