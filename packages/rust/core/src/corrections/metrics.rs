//! Precision and recall of an extraction against audited truth.

use std::collections::BTreeSet;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub precision: f64,
    pub recall: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

/// Precision and recall; an empty denominator scores 1.0.
pub fn compute_metrics(true_positives: usize, false_positives: usize, false_negatives: usize) -> Metrics {
    Metrics {
        precision: rate(true_positives, true_positives + false_positives),
        recall: rate(true_positives, true_positives + false_negatives),
        true_positives,
        false_positives,
        false_negatives,
    }
}

fn rate(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        1.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Running tp/fp/fn over many answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl Counts {
    /// Add one answer's truth and prediction sets.
    pub fn add<T: Ord>(&mut self, truth: &BTreeSet<T>, predicted: &BTreeSet<T>) {
        self.true_positives += truth.intersection(predicted).count();
        self.false_positives += predicted.difference(truth).count();
        self.false_negatives += truth.difference(predicted).count();
    }

    pub fn metrics(&self) -> Metrics {
        compute_metrics(self.true_positives, self.false_positives, self.false_negatives)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precision_and_recall() {
        let m = compute_metrics(3, 1, 2);
        assert!((m.precision - 0.75).abs() < 1e-9);
        assert!((m.recall - 0.6).abs() < 1e-9);
    }

    #[test]
    fn empty_denominators_score_one() {
        let m = compute_metrics(0, 0, 0);
        assert_eq!((m.precision, m.recall), (1.0, 1.0));
    }

    #[test]
    fn counts_accumulate_over_answers() {
        let mut counts = Counts::default();
        let set = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>();
        counts.add(&set(&["a", "b"]), &set(&["a", "c"]));
        counts.add(&set(&["d"]), &set(&["d"]));
        assert_eq!(
            counts,
            Counts {
                true_positives: 2,
                false_positives: 1,
                false_negatives: 1
            }
        );
    }
}
