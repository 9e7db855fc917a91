//! Similarity functions over price vectors
//!
//! Every metric returns a score in [0.0, 1.0] where 1.0 means identical.
//! Scores are symmetric in their arguments.

use oddsim_core::{Error, Metric, PriceVector, Result};

/// Floor for the median-percentage denominator
pub const PERCENTAGE_EPSILON: f64 = 0.01;

/// Score two vectors under `metric`
///
/// Fails with [`Error::Scoring`] on empty, mismatched-length or non-finite input.
pub fn score(v1: &[f64], v2: &[f64], metric: Metric) -> Result<f64> {
    check_pair(v1, v2)?;
    if v1 == v2 {
        return Ok(1.0);
    }
    let raw = match metric {
        Metric::Cosine => cosine(v1, v2)?,
        Metric::NormalizedEuclidean => normalized_euclidean(v1, v2),
        Metric::MedianPercentage => median_percentage(v1, v2),
    };
    Ok(raw.clamp(0.0, 1.0))
}

/// [`score`] over two validated price vectors
#[inline]
pub fn score_prices(v1: &PriceVector, v2: &PriceVector, metric: Metric) -> Result<f64> {
    score(v1.as_slice(), v2.as_slice(), metric)
}

fn check_pair(v1: &[f64], v2: &[f64]) -> Result<()> {
    if v1.is_empty() || v2.is_empty() {
        return Err(Error::Scoring("empty vector".to_string()));
    }
    if v1.len() != v2.len() {
        return Err(Error::Scoring(format!(
            "dimension mismatch: {} vs {}",
            v1.len(),
            v2.len()
        )));
    }
    if v1.iter().chain(v2.iter()).any(|x| !x.is_finite()) {
        return Err(Error::Scoring("non-finite component".to_string()));
    }
    Ok(())
}

/// Cosine of the angle; negative cosine is clamped to 0 by the caller
fn cosine(a: &[f64], b: &[f64]) -> Result<f64> {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(Error::Scoring("zero-norm vector".to_string()));
    }
    Ok(dot / (norm_a * norm_b))
}

/// `1 - d(a, b) / sqrt(sum(max(a_i, b_i)^2))`
fn normalized_euclidean(a: &[f64], b: &[f64]) -> f64 {
    let distance = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt();
    let reference = a
        .iter()
        .zip(b)
        .map(|(x, y)| {
            let m = x.max(*y);
            m * m
        })
        .sum::<f64>()
        .sqrt();

    if reference == 0.0 {
        1.0
    } else {
        1.0 - distance / reference
    }
}

/// `1 - median(|a_i - b_i| / max(a_i, b_i, eps))`
///
/// The median keeps a single mispriced dimension from dominating.
fn median_percentage(a: &[f64], b: &[f64]) -> f64 {
    let mut diffs: Vec<f64> = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs() / x.max(*y).max(PERCENTAGE_EPSILON))
        .collect();
    1.0 - median(&mut diffs)
}

/// Median of a non-empty slice; sorts in place
pub(crate) fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const A: [f64; 5] = [2.10, 3.40, 3.20, 1.85, 1.95];
    const B: [f64; 5] = [2.05, 3.45, 3.25, 1.90, 1.90];
    const FAR: [f64; 5] = [1.40, 4.50, 7.00, 2.20, 1.65];

    fn random_prices(rng: &mut StdRng) -> [f64; 5] {
        let mut v = [0.0; 5];
        for x in v.iter_mut() {
            *x = rng.random_range(1.01..15.0);
        }
        v
    }

    #[test]
    fn test_identity_is_exactly_one() {
        for metric in Metric::ALL {
            assert_eq!(score(&A, &A, metric).unwrap(), 1.0);
        }
    }

    #[test]
    fn test_cosine_similar_and_different() {
        let close = score(&A, &B, Metric::Cosine).unwrap();
        let far = score(&A, &FAR, Metric::Cosine).unwrap();
        assert!(close > 0.95, "close was {}", close);
        assert!(far < close);
    }

    #[test]
    fn test_euclidean_orders_by_distance() {
        let close = score(&A, &B, Metric::NormalizedEuclidean).unwrap();
        let far = score(&A, &FAR, Metric::NormalizedEuclidean).unwrap();
        assert!(close > 0.9);
        assert!(far < close);
    }

    #[test]
    fn test_median_ignores_single_outlier() {
        let mut outlier = A;
        outlier[2] = 9.0;
        let sim = score(&A, &outlier, Metric::MedianPercentage).unwrap();
        assert_eq!(sim, 1.0);

        let shifted = [2.31, 3.74, 3.52, 2.035, 2.145];
        let sim = score(&A, &shifted, Metric::MedianPercentage).unwrap();
        assert!((sim - (1.0 - 0.1 / 1.1)).abs() < 1e-9, "sim was {}", sim);
    }

    #[test]
    fn test_median_even_length() {
        let mut values = vec![4.0, 1.0, 3.0, 2.0];
        assert_eq!(median(&mut values), 2.5);
    }

    #[test]
    fn test_scoring_errors() {
        assert!(matches!(score(&A, &[1.0, 2.0], Metric::Cosine), Err(Error::Scoring(_))));
        assert!(matches!(score(&[], &[], Metric::Cosine), Err(Error::Scoring(_))));
        assert!(matches!(
            score(&[f64::NAN, 2.0], &[1.5, 2.0], Metric::NormalizedEuclidean),
            Err(Error::Scoring(_))
        ));
        assert!(matches!(
            score(&[0.0, 0.0], &[1.5, 2.0], Metric::Cosine),
            Err(Error::Scoring(_))
        ));
    }

    #[test]
    fn test_euclidean_zero_reference() {
        assert_eq!(normalized_euclidean(&[0.0, 0.0], &[0.0, 0.0]), 1.0);
    }

    #[test]
    fn test_random_pairs_are_symmetric_and_bounded() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let a = random_prices(&mut rng);
            let b = random_prices(&mut rng);
            for metric in Metric::ALL {
                let ab = score(&a, &b, metric).unwrap();
                let ba = score(&b, &a, metric).unwrap();
                assert_eq!(ab, ba, "{} not symmetric for {:?} / {:?}", metric, a, b);
                assert!((0.0..=1.0).contains(&ab));
                assert_eq!(score(&a, &a, metric).unwrap(), 1.0);
            }
        }
    }
}
