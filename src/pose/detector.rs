use crate::errors::AppError;
use crate::models::{DeviationResult, Landmark};

/// Compares a live landmark sample against a stored baseline.
///
/// Pure function of its inputs plus the threshold configuration: no hidden
/// state, so the same baseline and sample always produce the same score.
pub struct DeviationDetector {
    default_threshold: f64,
}

impl DeviationDetector {
    pub fn new(default_threshold: f64) -> Self {
        Self { default_threshold }
    }

    /// Per-account override wins; otherwise the configured global default.
    pub fn resolve_threshold(&self, account_override: Option<f64>) -> f64 {
        account_override.unwrap_or(self.default_threshold)
    }

    /// Score a live sample against the baseline and classify it.
    ///
    /// The two landmark sets must have the same ordered arity; a mismatch is
    /// an error, never a silent truncation. The score is the mean Euclidean
    /// distance between corresponding landmarks, in the capture unit space.
    pub fn evaluate(
        &self,
        baseline: &[Landmark],
        sample: &[Landmark],
        account_override: Option<f64>,
    ) -> Result<DeviationResult, AppError> {
        if baseline.len() != sample.len() {
            return Err(AppError::ShapeMismatch {
                expected: baseline.len(),
                actual: sample.len(),
            });
        }
        if baseline.is_empty() {
            return Err(AppError::bad_request("Cannot evaluate an empty landmark set"));
        }

        let total: f64 = baseline
            .iter()
            .zip(sample.iter())
            .map(|(b, s)| landmark_distance(b, s))
            .sum();
        let score = total / baseline.len() as f64;

        let threshold = self.resolve_threshold(account_override);

        Ok(DeviationResult {
            score,
            is_violation: score > threshold,
            threshold,
        })
    }
}

/// Euclidean distance between two landmarks. The depth axis participates
/// only when both sides carry it, so 2D and 3D capture pipelines score
/// consistently.
fn landmark_distance(a: &Landmark, b: &Landmark) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    let dz = match (a.z, b.z) {
        (Some(az), Some(bz)) => az - bz,
        _ => 0.0,
    };
    (dx * dx + dy * dy + dz * dz).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> DeviationDetector {
        DeviationDetector::new(1.0)
    }

    #[test]
    fn sample_beyond_threshold_is_a_violation() {
        let baseline = [Landmark::new(0.0, 0.0)];
        let sample = [Landmark::new(2.0, 0.0)];

        let result = detector().evaluate(&baseline, &sample, None).unwrap();
        assert!((result.score - 2.0).abs() < f64::EPSILON);
        assert!(result.is_violation);
    }

    #[test]
    fn sample_within_threshold_conforms() {
        let baseline = [Landmark::new(0.0, 0.0)];
        let sample = [Landmark::new(0.5, 0.0)];

        let result = detector().evaluate(&baseline, &sample, None).unwrap();
        assert!((result.score - 0.5).abs() < f64::EPSILON);
        assert!(!result.is_violation);
    }

    #[test]
    fn score_exactly_at_threshold_is_not_a_violation() {
        let baseline = [Landmark::new(0.0, 0.0)];
        let sample = [Landmark::new(1.0, 0.0)];

        let result = detector().evaluate(&baseline, &sample, None).unwrap();
        assert!(!result.is_violation);
    }

    #[test]
    fn score_is_the_mean_over_landmarks() {
        let baseline = [Landmark::new(0.0, 0.0), Landmark::new(10.0, 0.0)];
        let sample = [Landmark::new(3.0, 4.0), Landmark::new(10.0, 0.0)];

        // Distances are 5.0 and 0.0; the mean is 2.5.
        let result = detector().evaluate(&baseline, &sample, None).unwrap();
        assert!((result.score - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn depth_contributes_when_both_sides_carry_it() {
        let baseline = [Landmark::with_depth(0.0, 0.0, 0.0)];
        let with_depth = [Landmark::with_depth(0.0, 0.0, 3.0)];
        let without_depth = [Landmark::new(0.0, 0.0)];

        let scored = detector().evaluate(&baseline, &with_depth, None).unwrap();
        assert!((scored.score - 3.0).abs() < f64::EPSILON);

        let flat = detector().evaluate(&baseline, &without_depth, None).unwrap();
        assert!(flat.score.abs() < f64::EPSILON);
    }

    #[test]
    fn arity_mismatch_is_an_error_not_a_truncation() {
        let baseline = [Landmark::new(0.0, 0.0), Landmark::new(1.0, 1.0)];
        let sample = [Landmark::new(0.0, 0.0)];

        match detector().evaluate(&baseline, &sample, None) {
            Err(AppError::ShapeMismatch { expected: 2, actual: 1 }) => {}
            other => panic!("expected ShapeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn empty_sets_are_rejected() {
        assert!(matches!(
            detector().evaluate(&[], &[], None),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn account_override_takes_precedence_over_default() {
        let baseline = [Landmark::new(0.0, 0.0)];
        let sample = [Landmark::new(2.0, 0.0)];

        // Score 2.0 violates the default threshold of 1.0 but not a
        // per-account override of 5.0.
        let result = detector().evaluate(&baseline, &sample, Some(5.0)).unwrap();
        assert!(!result.is_violation);
        assert!((result.threshold - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let baseline = [
            Landmark::new(0.13, 0.91),
            Landmark::with_depth(0.44, 0.27, 0.08),
            Landmark::new(0.75, 0.62),
        ];
        let sample = [
            Landmark::new(0.19, 0.88),
            Landmark::with_depth(0.41, 0.30, 0.02),
            Landmark::new(0.80, 0.55),
        ];

        let first = detector().evaluate(&baseline, &sample, None).unwrap();
        let second = detector().evaluate(&baseline, &sample, None).unwrap();
        assert_eq!(first.score.to_bits(), second.score.to_bits());
    }
}
