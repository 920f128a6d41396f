//! Score aggregation
//!
//! Folds scenario results into a [`ScoreReport`]. Totals are plain sums, so
//! the report does not depend on the order results arrive in.

use serde::{Deserialize, Serialize};

use crate::types::{Outcome, ScenarioResult};

/// Aggregated score for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreReport {
    /// Sum of the weights of every recorded scenario.
    pub total: u64,
    /// Sum of the weights of passed scenarios only.
    pub earned: u64,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub results: Vec<ScenarioResult>,
}

impl ScoreReport {
    pub fn all_passed(&self) -> bool {
        self.earned == self.total
    }

    /// Earned share in percent; an empty report counts as 100.
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.earned as f64 * 100.0 / self.total as f64
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{}/{} points ({} passed, {} failed, {} errored)",
            self.earned, self.total, self.passed, self.failed, self.errored
        )
    }
}

/// Build a report from results. The sequence is kept as given.
pub fn aggregate(results: Vec<ScenarioResult>) -> ScoreReport {
    let mut report = ScoreReport {
        total: 0,
        earned: 0,
        passed: 0,
        failed: 0,
        errored: 0,
        results: Vec::new(),
    };

    for result in &results {
        report.total += u64::from(result.points);
        report.earned += u64::from(result.earned());
        match result.outcome {
            Outcome::Passed => report.passed += 1,
            Outcome::Failed => report.failed += 1,
            Outcome::Errored => report.errored += 1,
        }
    }

    report.results = results;
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<ScenarioResult> {
        vec![
            ScenarioResult::passed("home", "has a navbar", 1),
            ScenarioResult::failed("home", "has an edit link", 1, "Expected 'Edit [USERNAME]'"),
            ScenarioResult::passed("auth", "requires sign in", 2),
            ScenarioResult::errored("photos", "shows cards", 2, "missing table `photos`"),
            ScenarioResult::passed("comments", "creates a comment", 3),
        ]
    }

    #[test]
    fn test_empty_aggregate_is_zero() {
        let report = aggregate(vec![]);
        assert_eq!(report.total, 0);
        assert_eq!(report.earned, 0);
        assert!(report.results.is_empty());
        assert!(report.all_passed());
    }

    #[test]
    fn test_failed_and_errored_earn_nothing() {
        let report = aggregate(sample());
        assert_eq!(report.total, 9);
        assert_eq!(report.earned, 6);
        assert_eq!((report.passed, report.failed, report.errored), (3, 1, 1));
        assert!(!report.all_passed());
        assert_eq!(report.summary_line(), "6/9 points (3 passed, 1 failed, 1 errored)");
    }

    #[test]
    fn test_aggregate_is_invariant_under_permutation() {
        let baseline = aggregate(sample());
        let mut results = sample();
        for rotation in 0..results.len() {
            results.rotate_left(1);
            let mut reversed = results.clone();
            reversed.reverse();
            for permuted in [results.clone(), reversed] {
                let report = aggregate(permuted);
                assert_eq!(report.total, baseline.total, "rotation {}", rotation);
                assert_eq!(report.earned, baseline.earned, "rotation {}", rotation);
                assert_eq!(report.passed, baseline.passed);
                assert_eq!(report.errored, baseline.errored);
            }
        }
    }

    #[test]
    fn test_earned_never_exceeds_total() {
        let mut results = Vec::new();
        for i in 0..40u32 {
            let points = i % 5 + 1;
            let result = match i % 3 {
                0 => ScenarioResult::passed("g", format!("s{}", i), points),
                1 => ScenarioResult::failed("g", format!("s{}", i), points, "d"),
                _ => ScenarioResult::errored("g", format!("s{}", i), points, "d"),
            };
            results.push(result);
            let report = aggregate(results.clone());
            assert!(report.earned <= report.total);
        }
    }

    #[test]
    fn test_all_passing_report_is_full_marks() {
        let report = aggregate(vec![
            ScenarioResult::passed("a", "one", 1),
            ScenarioResult::passed("a", "two", 2),
        ]);
        assert!(report.all_passed());
        assert_eq!(report.percentage(), 100.0);
    }
}
