//! Histogram-based gradient boosted trees with a softmax objective.
//!
//! Each boosting round fits one regression tree per class on the softmax gradients.
//! Features are pre-binned into at most `max_bins` buckets; a split on bucket `b` is
//! stored as the raw threshold `cuts[b]` and prediction sends `x <= threshold` left, so
//! binned training and raw-value inference agree exactly.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::ml::ClassifierError;

const MIN_HESSIAN: f64 = 1e-6;
const MIN_SPLIT_GAIN: f64 = 1e-9;
const MIN_PRIOR: f64 = 1e-6;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    /// L2 penalty on leaf weights.
    pub lambda: f64,
    pub min_samples_leaf: usize,
    /// Minimum hessian mass on each side of a split.
    #[serde(default)]
    pub min_child_weight: f64,
    /// Minimum loss reduction a split must achieve.
    #[serde(default)]
    pub min_split_gain: f64,
    pub max_bins: usize,
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 5,
            learning_rate: 0.2,
            subsample: 0.8,
            colsample_bytree: 0.8,
            lambda: 5.0,
            min_samples_leaf: 20,
            min_child_weight: 5.0,
            min_split_gain: 10.0,
            max_bins: 64,
            seed: 42,
        }
    }
}

impl BoostingParams {
    pub fn validate(&self) -> Result<(), ClassifierError> {
        let invalid = |message: &str| Err(ClassifierError::InvalidParams(message.to_string()));
        if self.n_estimators == 0 {
            return invalid("n_estimators must be greater than zero");
        }
        if self.max_depth == 0 {
            return invalid("max_depth must be greater than zero");
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return invalid("learning_rate must be in (0, 1]");
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return invalid("subsample must be in (0, 1]");
        }
        if !(self.colsample_bytree > 0.0 && self.colsample_bytree <= 1.0) {
            return invalid("colsample_bytree must be in (0, 1]");
        }
        if !(self.lambda >= 0.0 && self.lambda.is_finite()) {
            return invalid("lambda must be a non-negative number");
        }
        if self.min_samples_leaf == 0 {
            return invalid("min_samples_leaf must be greater than zero");
        }
        if !(self.min_child_weight >= 0.0 && self.min_child_weight.is_finite()) {
            return invalid("min_child_weight must be a non-negative number");
        }
        if !(self.min_split_gain >= 0.0 && self.min_split_gain.is_finite()) {
            return invalid("min_split_gain must be a non-negative number");
        }
        if !(2..=255).contains(&self.max_bins) {
            return invalid("max_bins must be in 2..=255");
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Split { feature: usize, threshold: f64, left: usize, right: usize },
    Leaf { value: f64 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn predict(&self, features: &[f64]) -> f64 {
        let mut cursor = 0;
        loop {
            match self.nodes.get(cursor) {
                Some(Node::Split { feature, threshold, left, right }) => {
                    let value = features.get(*feature).copied().unwrap_or(0.0);
                    cursor = if value <= *threshold { *left } else { *right };
                }
                Some(Node::Leaf { value }) => return *value,
                None => return 0.0,
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedClassifier {
    params: BoostingParams,
    num_features: usize,
    num_classes: usize,
    base_scores: Vec<f64>,
    /// `rounds[r][k]` is the tree for class `k` in boosting round `r`.
    rounds: Vec<Vec<RegressionTree>>,
    feature_gain: Vec<f64>,
}

impl GradientBoostedClassifier {
    pub fn fit(
        rows: &[Vec<f64>],
        labels: &[usize],
        num_classes: usize,
        params: BoostingParams,
    ) -> Result<Self, ClassifierError> {
        Self::fit_until(rows, labels, num_classes, params, &|| false)
    }

    /// Like [`fit`](Self::fit), but polls `should_stop` before every boosting round and
    /// abandons the fit once it returns true.
    pub fn fit_until(
        rows: &[Vec<f64>],
        labels: &[usize],
        num_classes: usize,
        params: BoostingParams,
        should_stop: &dyn Fn() -> bool,
    ) -> Result<Self, ClassifierError> {
        params.validate()?;
        if rows.is_empty() {
            return Err(ClassifierError::EmptyTrainingSet);
        }
        if rows.len() != labels.len() {
            return Err(ClassifierError::LabelCountMismatch {
                rows: rows.len(),
                labels: labels.len(),
            });
        }
        if num_classes < 2 {
            return Err(ClassifierError::InvalidParams(
                "at least two classes are required".to_string(),
            ));
        }
        let num_features = rows[0].len();
        for row in rows {
            validate_row(row, num_features)?;
        }
        if let Some(label) = labels.iter().find(|label| **label >= num_classes) {
            return Err(ClassifierError::LabelOutOfRange { label: *label, num_classes });
        }

        let binned = BinnedMatrix::build(rows, num_features, params.max_bins);
        let base_scores = log_priors(labels, num_classes);
        let mut scores: Vec<f64> =
            (0..rows.len()).flat_map(|_| base_scores.iter().copied()).collect();

        let mut rng = StdRng::seed_from_u64(params.seed);
        let columns_per_tree =
            ((num_features as f64 * params.colsample_bytree).round() as usize).clamp(1, num_features);
        let mut feature_gain = vec![0.0; num_features];
        let mut rounds = Vec::with_capacity(params.n_estimators);
        let mut probabilities = vec![0.0; rows.len() * num_classes];

        for round in 0..params.n_estimators {
            if should_stop() {
                return Err(ClassifierError::Cancelled { completed_rounds: round });
            }
            let sample = sample_rows(&mut rng, rows.len(), params.subsample);

            for row in 0..rows.len() {
                let span = row * num_classes..(row + 1) * num_classes;
                softmax_into(&scores[span.clone()], &mut probabilities[span]);
            }

            let class_gradients: Vec<(Vec<f64>, Vec<f64>)> = (0..num_classes)
                .map(|class| {
                    labels
                        .iter()
                        .enumerate()
                        .map(|(row, label)| {
                            let p = probabilities[row * num_classes + class];
                            let target = if *label == class { 1.0 } else { 0.0 };
                            (p - target, (p * (1.0 - p)).max(MIN_HESSIAN))
                        })
                        .unzip()
                })
                .collect();

            let mut trees = Vec::with_capacity(num_classes);
            for (grad, hess) in &class_gradients {
                let mut columns =
                    index::sample(&mut rng, num_features, columns_per_tree).into_vec();
                columns.sort_unstable();
                let tree = TreeBuilder {
                    binned: &binned,
                    gradients: grad,
                    hessians: hess,
                    columns: &columns,
                    params: &params,
                    nodes: Vec::new(),
                    feature_gain: &mut feature_gain,
                }
                .build(sample.clone());
                trees.push(tree);
            }

            for (row, values) in rows.iter().enumerate() {
                for (class, tree) in trees.iter().enumerate() {
                    scores[row * num_classes + class] += tree.predict(values);
                }
            }
            rounds.push(trees);
        }

        Ok(Self { params, num_features, num_classes, base_scores, rounds, feature_gain })
    }

    pub fn params(&self) -> &BoostingParams {
        &self.params
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn tree_count(&self) -> usize {
        self.rounds.iter().map(Vec::len).sum()
    }

    pub fn raw_scores(&self, features: &[f64]) -> Result<Vec<f64>, ClassifierError> {
        validate_row(features, self.num_features)?;
        let mut scores = self.base_scores.clone();
        for trees in &self.rounds {
            for (class, tree) in trees.iter().enumerate() {
                scores[class] += tree.predict(features);
            }
        }
        Ok(scores)
    }

    pub fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, ClassifierError> {
        let scores = self.raw_scores(features)?;
        let mut probabilities = vec![0.0; self.num_classes];
        softmax_into(&scores, &mut probabilities);
        Ok(probabilities)
    }

    /// Total split gain per feature, normalised to sum to one.
    pub fn feature_importances(&self) -> Vec<f64> {
        let total: f64 = self.feature_gain.iter().sum();
        if total <= 0.0 {
            return vec![0.0; self.num_features];
        }
        self.feature_gain.iter().map(|gain| gain / total).collect()
    }
}

fn validate_row(row: &[f64], expected: usize) -> Result<(), ClassifierError> {
    if row.len() != expected {
        return Err(ClassifierError::DimensionMismatch { expected, actual: row.len() });
    }
    if let Some(position) = row.iter().position(|value| !value.is_finite()) {
        return Err(ClassifierError::NonFiniteFeature { index: position });
    }
    Ok(())
}

fn log_priors(labels: &[usize], num_classes: usize) -> Vec<f64> {
    let mut counts = vec![0usize; num_classes];
    for label in labels {
        counts[*label] += 1;
    }
    let total = labels.len() as f64;
    counts.iter().map(|count| (*count as f64 / total).max(MIN_PRIOR).ln()).collect()
}

fn softmax_into(scores: &[f64], out: &mut [f64]) {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for (slot, score) in out.iter_mut().zip(scores) {
        *slot = (score - max).exp();
        sum += *slot;
    }
    for slot in out.iter_mut() {
        *slot /= sum;
    }
}

fn sample_rows(rng: &mut StdRng, count: usize, fraction: f64) -> Vec<usize> {
    if fraction >= 1.0 {
        return (0..count).collect();
    }
    let sample: Vec<usize> = (0..count).filter(|_| rng.gen::<f64>() < fraction).collect();
    if sample.is_empty() {
        (0..count).collect()
    } else {
        sample
    }
}

/// Column-major bucket indices plus the cut points that define them.
struct BinnedMatrix {
    cuts: Vec<Vec<f64>>,
    bins: Vec<Vec<u8>>,
}

impl BinnedMatrix {
    fn build(rows: &[Vec<f64>], num_features: usize, max_bins: usize) -> Self {
        let mut cuts = Vec::with_capacity(num_features);
        let mut bins = Vec::with_capacity(num_features);
        for feature in 0..num_features {
            let column: Vec<f64> = rows.iter().map(|row| row[feature]).collect();
            let feature_cuts = cut_points(&column, max_bins);
            bins.push(
                column
                    .iter()
                    .map(|value| feature_cuts.partition_point(|cut| cut < value) as u8)
                    .collect(),
            );
            cuts.push(feature_cuts);
        }
        Self { cuts, bins }
    }
}

fn cut_points(column: &[f64], max_bins: usize) -> Vec<f64> {
    let mut distinct = column.to_vec();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup();
    if distinct.len() < 2 {
        return Vec::new();
    }

    let midpoint = |low: f64, high: f64| low + (high - low) / 2.0;
    if distinct.len() <= max_bins {
        return distinct.windows(2).map(|pair| midpoint(pair[0], pair[1])).collect();
    }

    let mut cuts: Vec<f64> = (1..max_bins)
        .map(|bucket| bucket * distinct.len() / max_bins)
        .map(|idx| midpoint(distinct[idx - 1], distinct[idx]))
        .collect();
    cuts.dedup();
    cuts
}

struct SplitCandidate {
    feature: usize,
    bucket: usize,
    gain: f64,
}

struct TreeBuilder<'a> {
    binned: &'a BinnedMatrix,
    gradients: &'a [f64],
    hessians: &'a [f64],
    columns: &'a [usize],
    params: &'a BoostingParams,
    nodes: Vec<Node>,
    feature_gain: &'a mut [f64],
}

impl TreeBuilder<'_> {
    fn build(mut self, rows: Vec<usize>) -> RegressionTree {
        self.grow(rows, 0);
        RegressionTree { nodes: self.nodes }
    }

    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let (grad_sum, hess_sum) = rows.iter().fold((0.0, 0.0), |(g, h), row| {
            (g + self.gradients[*row], h + self.hessians[*row])
        });
        let node = self.nodes.len();

        let splittable = depth < self.params.max_depth
            && rows.len() >= 2 * self.params.min_samples_leaf
            && hess_sum >= 2.0 * self.params.min_child_weight;
        let best = if splittable { self.best_split(&rows, grad_sum, hess_sum) } else { None };

        let Some(split) = best else {
            let value = -grad_sum / (hess_sum + self.params.lambda) * self.params.learning_rate;
            self.nodes.push(Node::Leaf { value });
            return node;
        };

        self.nodes.push(Node::Leaf { value: 0.0 });
        self.feature_gain[split.feature] += split.gain;
        let threshold = self.binned.cuts[split.feature][split.bucket];
        let column = &self.binned.bins[split.feature];
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|row| usize::from(column[*row]) <= split.bucket);

        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[node] = Node::Split { feature: split.feature, threshold, left, right };
        node
    }

    fn best_split(&self, rows: &[usize], grad_sum: f64, hess_sum: f64) -> Option<SplitCandidate> {
        let lambda = self.params.lambda;
        let min_leaf = self.params.min_samples_leaf;
        let min_weight = self.params.min_child_weight;
        let min_gain = self.params.min_split_gain.max(MIN_SPLIT_GAIN);
        let parent_score = grad_sum * grad_sum / (hess_sum + lambda);
        let mut best: Option<SplitCandidate> = None;

        for &feature in self.columns {
            let cut_count = self.binned.cuts[feature].len();
            if cut_count == 0 {
                continue;
            }

            let column = &self.binned.bins[feature];
            let mut histogram = vec![(0.0_f64, 0.0_f64, 0_usize); cut_count + 1];
            for row in rows {
                let slot = &mut histogram[usize::from(column[*row])];
                slot.0 += self.gradients[*row];
                slot.1 += self.hessians[*row];
                slot.2 += 1;
            }

            let (mut left_grad, mut left_hess, mut left_count) = (0.0, 0.0, 0);
            for (bucket, (g, h, n)) in histogram.iter().take(cut_count).enumerate() {
                left_grad += g;
                left_hess += h;
                left_count += n;
                let right_count = rows.len() - left_count;
                if left_count < min_leaf || right_count < min_leaf {
                    continue;
                }
                let right_grad = grad_sum - left_grad;
                let right_hess = hess_sum - left_hess;
                if left_hess < min_weight || right_hess < min_weight {
                    continue;
                }
                let gain = left_grad * left_grad / (left_hess + lambda)
                    + right_grad * right_grad / (right_hess + lambda)
                    - parent_score;
                let improves = best.as_ref().map_or(true, |current| gain > current.gain);
                if gain > min_gain && improves {
                    best = Some(SplitCandidate { feature, bucket, gain });
                }
            }
        }

        best
    }
}
