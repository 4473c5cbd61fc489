use serde::{Deserialize, Serialize};

use crate::domain::discount::DiscountClass;

const EXCELLENT_ACCURACY: f64 = 0.8;
const GOOD_ACCURACY: f64 = 0.7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Excellent,
    Good,
    Poor,
}

impl QualityTier {
    pub fn from_accuracy(accuracy: f64) -> Self {
        if accuracy > EXCELLENT_ACCURACY {
            Self::Excellent
        } else if accuracy > GOOD_ACCURACY {
            Self::Good
        } else {
            Self::Poor
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Poor => "poor",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class: DiscountClass,
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Held-out evaluation of a classifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub sample_count: usize,
    pub accuracy: f64,
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub macro_f1: f64,
    pub per_class: Vec<ClassMetrics>,
    /// Rows are actual classes, columns are predicted classes.
    pub confusion_matrix: [[usize; DiscountClass::COUNT]; DiscountClass::COUNT],
    pub quality: QualityTier,
}

/// Builds the report from paired actual/predicted labels.
///
/// Macro averages run over classes that occur in either sequence; a ratio with a zero
/// denominator counts as 0.0.
pub fn evaluate(actual: &[DiscountClass], predicted: &[DiscountClass]) -> ClassificationReport {
    let mut confusion_matrix = [[0usize; DiscountClass::COUNT]; DiscountClass::COUNT];
    for (truth, guess) in actual.iter().zip(predicted) {
        confusion_matrix[truth.index()][guess.index()] += 1;
    }

    let sample_count = actual.len().min(predicted.len());
    let correct: usize = (0..DiscountClass::COUNT).map(|idx| confusion_matrix[idx][idx]).sum();
    let accuracy = ratio(correct, sample_count);

    let mut per_class = Vec::with_capacity(DiscountClass::COUNT);
    let mut present = Vec::new();
    for class in DiscountClass::ALL {
        let idx = class.index();
        let true_positive = confusion_matrix[idx][idx];
        let support: usize = confusion_matrix[idx].iter().sum();
        let predicted_total: usize = confusion_matrix.iter().map(|row| row[idx]).sum();

        let precision = ratio(true_positive, predicted_total);
        let recall = ratio(true_positive, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        if support > 0 || predicted_total > 0 {
            present.push(idx);
        }
        per_class.push(ClassMetrics {
            class,
            label: class.label().to_string(),
            precision,
            recall,
            f1,
            support,
        });
    }

    let macro_mean = |pick: fn(&ClassMetrics) -> f64| {
        if present.is_empty() {
            return 0.0;
        }
        present.iter().map(|idx| pick(&per_class[*idx])).sum::<f64>() / present.len() as f64
    };
    let macro_precision = macro_mean(|metrics| metrics.precision);
    let macro_recall = macro_mean(|metrics| metrics.recall);
    let macro_f1 = macro_mean(|metrics| metrics.f1);

    ClassificationReport {
        sample_count,
        accuracy,
        macro_precision,
        macro_recall,
        macro_f1,
        per_class,
        confusion_matrix,
        quality: QualityTier::from_accuracy(accuracy),
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::{evaluate, QualityTier};
    use crate::domain::discount::DiscountClass::{self, Large, Medium, None, Small};

    #[test]
    fn perfect_predictions_score_one() {
        let labels = [None, Small, Medium, Large, None];
        let report = evaluate(&labels, &labels);

        assert_eq!(report.accuracy, 1.0);
        assert_eq!(report.macro_f1, 1.0);
        assert_eq!(report.quality, QualityTier::Excellent);
        assert_eq!(report.confusion_matrix[0][0], 2);
    }

    #[test]
    fn mixed_predictions_match_hand_computed_metrics() {
        let actual = [None, None, Small, Small, Medium, Medium];
        let predicted = [None, Small, Small, Small, Medium, None];

        let report = evaluate(&actual, &predicted);

        assert!((report.accuracy - 4.0 / 6.0).abs() < 1e-12);
        assert_eq!(report.confusion_matrix[0], [1, 1, 0, 0]);
        assert_eq!(report.confusion_matrix[2], [1, 0, 1, 0]);

        let none = &report.per_class[DiscountClass::None.index()];
        assert!((none.precision - 0.5).abs() < 1e-12);
        assert!((none.recall - 0.5).abs() < 1e-12);

        let small = &report.per_class[DiscountClass::Small.index()];
        assert!((small.precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(small.recall, 1.0);

        // Large never occurs, so the macro mean covers three classes.
        let expected_recall = (0.5 + 1.0 + 0.5) / 3.0;
        assert!((report.macro_recall - expected_recall).abs() < 1e-12);
        assert_eq!(report.per_class[DiscountClass::Large.index()].support, 0);
        assert_eq!(report.quality, QualityTier::Poor);
    }

    #[test]
    fn quality_tiers_use_strict_thresholds() {
        assert_eq!(QualityTier::from_accuracy(0.81), QualityTier::Excellent);
        assert_eq!(QualityTier::from_accuracy(0.8), QualityTier::Good);
        assert_eq!(QualityTier::from_accuracy(0.7), QualityTier::Poor);
    }

    #[test]
    fn empty_input_yields_zeroes() {
        let report = evaluate(&[], &[]);
        assert_eq!(report.sample_count, 0);
        assert_eq!(report.accuracy, 0.0);
        assert_eq!(report.macro_f1, 0.0);
    }
}
