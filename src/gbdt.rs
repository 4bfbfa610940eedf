use anyhow::{ensure, Result};
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::cmp::Ordering;

/// Splits below this gain are noise and end the branch.
const MIN_SPLIT_GAIN: f64 = 1e-12;

/// Model adapter seam: the pipeline only needs fit / predict /
/// per-feature importances, positionally aligned with the input rows.
pub trait Regressor {
    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<()>;
    fn predict(&self, features: &[Vec<f64>]) -> Vec<f64>;
    fn feature_importances(&self) -> Vec<f64>;
}

/// Boosting hyperparameters. The defaults are load-bearing: analysis
/// results must be reproducible exactly across runs and hosts, so the
/// seed is part of the contract, not a tuning knob.
#[derive(Debug, Clone, Copy)]
pub struct BoosterParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub subsample: f64,
    pub colsample: f64,
    pub seed: u64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            learning_rate: 0.03,
            max_depth: 4,
            subsample: 0.7,
            colsample: 0.7,
            seed: 42,
        }
    }
}

impl BoosterParams {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.n_estimators >= 1, "Estimator count must be >= 1");
        ensure!(
            self.learning_rate > 0.0 && self.learning_rate <= 1.0,
            "Learning rate must be in (0, 1]"
        );
        ensure!(self.max_depth >= 1, "Max depth must be >= 1");
        ensure!(
            self.subsample > 0.0 && self.subsample <= 1.0,
            "Row subsample fraction must be in (0, 1]"
        );
        ensure!(
            self.colsample > 0.0 && self.colsample <= 1.0,
            "Column subsample fraction must be in (0, 1]"
        );
        Ok(())
    }
}

/// One regression tree in flat-array form. Internal nodes live in the
/// parallel split arrays; a negative child encodes a leaf as
/// `leaf_idx = -child - 1`. A tree with no internal nodes is a single
/// leaf at `leaf_values[0]`.
#[derive(Debug, Clone, Default)]
struct RegressionTree {
    split_features: Vec<usize>,
    thresholds: Vec<f64>,
    left_children: Vec<i32>,
    right_children: Vec<i32>,
    split_gains: Vec<f64>,
    leaf_values: Vec<f64>,
}

impl RegressionTree {
    fn predict_row(&self, features: &[f64]) -> f64 {
        if self.split_features.is_empty() {
            return self.leaf_values.first().copied().unwrap_or_default();
        }

        let mut node_idx = 0usize;
        loop {
            let feature_idx = self
                .split_features
                .get(node_idx)
                .copied()
                .unwrap_or_default();
            let threshold = self.thresholds.get(node_idx).copied().unwrap_or(0.0);
            let feature_value = features.get(feature_idx).copied().unwrap_or(0.0);
            let child = if feature_value <= threshold {
                self.left_children.get(node_idx).copied().unwrap_or(-1)
            } else {
                self.right_children.get(node_idx).copied().unwrap_or(-1)
            };

            if child < 0 {
                let leaf_idx = (-child - 1) as usize;
                return self.leaf_values.get(leaf_idx).copied().unwrap_or_default();
            }

            node_idx = child as usize;
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Total order over candidates: higher gain wins, then lower feature
/// index, then lower threshold. Selecting the maximum under a total
/// order keeps the parallel split search deterministic regardless of
/// worker scheduling.
fn candidate_beats(challenger: &SplitCandidate, incumbent: &SplitCandidate) -> bool {
    match challenger
        .gain
        .partial_cmp(&incumbent.gain)
        .unwrap_or(Ordering::Equal)
    {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => {
            challenger.feature < incumbent.feature
                || (challenger.feature == incumbent.feature
                    && challenger.threshold < incumbent.threshold)
        }
    }
}

struct TreeBuilder<'a> {
    features: &'a [Vec<f64>],
    residuals: &'a [f64],
    columns: &'a [usize],
    max_depth: usize,
}

impl TreeBuilder<'_> {
    fn grow(&self, tree: &mut RegressionTree, rows: &[usize], depth: usize) -> i32 {
        if depth >= self.max_depth || rows.len() < 2 {
            return Self::make_leaf(tree, self.mean_residual(rows));
        }

        let best = self
            .columns
            .par_iter()
            .filter_map(|&feature| self.best_split_for_feature(rows, feature))
            .reduce_with(|incumbent, challenger| {
                if candidate_beats(&challenger, &incumbent) {
                    challenger
                } else {
                    incumbent
                }
            });

        let Some(split) = best else {
            return Self::make_leaf(tree, self.mean_residual(rows));
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&row| self.features[row][split.feature] <= split.threshold);

        let node_idx = tree.split_features.len();
        tree.split_features.push(split.feature);
        tree.thresholds.push(split.threshold);
        tree.split_gains.push(split.gain);
        tree.left_children.push(0);
        tree.right_children.push(0);

        let left = self.grow(tree, &left_rows, depth + 1);
        let right = self.grow(tree, &right_rows, depth + 1);
        tree.left_children[node_idx] = left;
        tree.right_children[node_idx] = right;

        node_idx as i32
    }

    /// Best variance-reduction split on one feature, thresholds taken as
    /// midpoints between distinct consecutive sorted values. Within a
    /// feature, a strict improvement requirement keeps the lowest
    /// threshold on gain ties.
    fn best_split_for_feature(&self, rows: &[usize], feature: usize) -> Option<SplitCandidate> {
        let mut pairs: Vec<(f64, f64)> = rows
            .iter()
            .map(|&row| (self.features[row][feature], self.residuals[row]))
            .collect();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        let total_count = pairs.len() as f64;
        let total_sum: f64 = pairs.iter().map(|(_, residual)| residual).sum();
        let parent_score = total_sum * total_sum / total_count;

        let mut left_sum = 0.0;
        let mut best: Option<SplitCandidate> = None;
        for i in 1..pairs.len() {
            left_sum += pairs[i - 1].1;
            if pairs[i].0 <= pairs[i - 1].0 {
                continue;
            }

            let left_count = i as f64;
            let right_count = total_count - left_count;
            let right_sum = total_sum - left_sum;
            let gain = left_sum * left_sum / left_count + right_sum * right_sum / right_count
                - parent_score;

            if gain > MIN_SPLIT_GAIN && best.as_ref().is_none_or(|b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (pairs[i - 1].0 + pairs[i].0) / 2.0,
                    gain,
                });
            }
        }

        best
    }

    fn mean_residual(&self, rows: &[usize]) -> f64 {
        if rows.is_empty() {
            return 0.0;
        }
        rows.iter().map(|&row| self.residuals[row]).sum::<f64>() / rows.len() as f64
    }

    fn make_leaf(tree: &mut RegressionTree, value: f64) -> i32 {
        tree.leaf_values.push(value);
        -(tree.leaf_values.len() as i32)
    }
}

/// Gradient-boosted regression trees with a squared-error objective.
/// Base score is the target mean; each round fits one tree to the
/// residuals over a seeded row sample and column sample, and the
/// learning rate scales every leaf contribution.
pub struct GradientBoostedTrees {
    params: BoosterParams,
    base_score: f64,
    feature_count: usize,
    trees: Vec<RegressionTree>,
    split_gain_totals: Vec<f64>,
}

impl GradientBoostedTrees {
    pub fn new(params: BoosterParams) -> Self {
        Self {
            params,
            base_score: 0.0,
            feature_count: 0,
            trees: Vec::new(),
            split_gain_totals: Vec::new(),
        }
    }

    fn predict_row(&self, features: &[f64]) -> f64 {
        // Mirrors the accumulation order used during fit.
        let mut score = self.base_score;
        for tree in &self.trees {
            score += self.params.learning_rate * tree.predict_row(features);
        }
        score
    }
}

impl Default for GradientBoostedTrees {
    fn default() -> Self {
        Self::new(BoosterParams::default())
    }
}

impl Regressor for GradientBoostedTrees {
    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<()> {
        self.params.validate()?;
        ensure!(!features.is_empty(), "Training set must not be empty");
        ensure!(
            features.len() == targets.len(),
            "Training needs aligned rows, got {} feature rows vs {} targets",
            features.len(),
            targets.len()
        );
        let width = features[0].len();
        ensure!(width >= 1, "Training rows must carry at least one feature");
        ensure!(
            features.iter().all(|row| row.len() == width),
            "Training rows must all have the same feature count"
        );

        // Every fit starts from scratch and reseeds, so refitting the
        // same model is indistinguishable from fitting a fresh one.
        self.trees.clear();
        self.split_gain_totals = vec![0.0; width];
        self.feature_count = width;
        self.base_score = targets.iter().sum::<f64>() / targets.len() as f64;

        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut predictions = vec![self.base_score; targets.len()];
        let all_rows: Vec<usize> = (0..targets.len()).collect();
        let all_columns: Vec<usize> = (0..width).collect();
        let row_keep = subsample_count(all_rows.len(), self.params.subsample);
        let col_keep = subsample_count(all_columns.len(), self.params.colsample);

        for _ in 0..self.params.n_estimators {
            let residuals: Vec<f64> = targets
                .iter()
                .zip(predictions.iter())
                .map(|(target, prediction)| target - prediction)
                .collect();

            let mut sampled_rows = all_rows.clone();
            sampled_rows.shuffle(&mut rng);
            sampled_rows.truncate(row_keep);
            sampled_rows.sort_unstable();

            let mut sampled_columns = all_columns.clone();
            sampled_columns.shuffle(&mut rng);
            sampled_columns.truncate(col_keep);
            sampled_columns.sort_unstable();

            let builder = TreeBuilder {
                features,
                residuals: &residuals,
                columns: &sampled_columns,
                max_depth: self.params.max_depth,
            };
            let mut tree = RegressionTree::default();
            builder.grow(&mut tree, &sampled_rows, 0);

            for (prediction, row) in predictions.iter_mut().zip(features.iter()) {
                *prediction += self.params.learning_rate * tree.predict_row(row);
            }
            for (feature, gain) in tree.split_features.iter().zip(tree.split_gains.iter()) {
                self.split_gain_totals[*feature] += *gain;
            }
            self.trees.push(tree);
        }

        debug!(
            "Trained {} trees on {} rows x {} features (base score {:.4})",
            self.trees.len(),
            targets.len(),
            width,
            self.base_score
        );
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> Vec<f64> {
        features.iter().map(|row| self.predict_row(row)).collect()
    }

    /// Total split gain per feature, normalized to sum to 1. All zeros
    /// when training never found a split.
    fn feature_importances(&self) -> Vec<f64> {
        let total: f64 = self.split_gain_totals.iter().sum();
        if total <= 0.0 {
            return vec![0.0; self.feature_count];
        }
        self.split_gain_totals
            .iter()
            .map(|gain| gain / total)
            .collect()
    }
}

fn subsample_count(len: usize, fraction: f64) -> usize {
    let mut keep = ((len as f64) * fraction).round() as usize;
    if keep == 0 {
        keep = 1;
    }
    keep.min(len)
}
