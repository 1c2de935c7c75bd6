//! Candidate regressors and their preprocessing pipelines.
//!
//! Every candidate starts with a median imputer. `ridge` adds a scaler that
//! divides by the population standard deviation (no centering) and is fitted
//! by linfa's elastic net with the L1 share set to zero; the tree ensembles
//! consume imputed values directly. Fitted pipelines serialize to JSON and
//! predict from rows with nulls.

use linfa::traits::Fit;
use linfa::Dataset;
use linfa_elasticnet::ElasticNet;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::normalize::median;
use crate::table::Table;

const RIDGE_MAX_ITERATIONS: u32 = 100_000;
const RIDGE_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Ridge,
    Hgb,
    Rf,
}

impl Strategy {
    /// Evaluation order; ties on MAE keep the earlier strategy.
    pub const ALL: [Strategy; 3] = [Strategy::Ridge, Strategy::Hgb, Strategy::Rf];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ridge => "ridge",
            Self::Hgb => "hgb",
            Self::Rf => "rf",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RidgeParams {
    pub alpha: f64,
}

impl Default for RidgeParams {
    fn default() -> Self {
        Self { alpha: 5.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HgbParams {
    pub learning_rate: f64,
    pub max_depth: usize,
    pub max_iter: usize,
    pub max_leaf_nodes: usize,
    pub min_samples_leaf: usize,
    pub max_bins: usize,
}

impl Default for HgbParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            max_depth: 6,
            max_iter: 400,
            max_leaf_nodes: 31,
            min_samples_leaf: 20,
            max_bins: 255,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 400,
            max_depth: None,
            min_samples_leaf: 2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateParams {
    pub ridge: RidgeParams,
    pub hgb: HgbParams,
    pub rf: ForestParams,
}

#[derive(Debug, Error, PartialEq)]
pub enum RegressorError {
    #[error("cannot fit on an empty training set")]
    EmptyTrainingSet,
    #[error("{rows} feature rows but {targets} targets")]
    LengthMismatch { rows: usize, targets: usize },
    #[error("row has {found} features, pipeline expects {expected}")]
    FeatureCountMismatch { expected: usize, found: usize },
    #[error("linear model fit failed: {0}")]
    Linear(String),
    #[error("non-finite target value at row {row}")]
    NonFiniteTarget { row: usize },
}

/// Anything that maps one fully imputed feature row to a prediction.
pub trait Regressor {
    fn predict_row(&self, row: &[f64]) -> f64;

    fn predict_rows(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|row| self.predict_row(row)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedianImputer {
    pub medians: Vec<f64>,
}

impl MedianImputer {
    /// Median of the non-null training values per column; 0 for all-null columns.
    pub fn fit(rows: &[Vec<Option<f64>>], n_features: usize) -> Self {
        let medians = (0..n_features)
            .map(|f| {
                let column = rows.iter().map(|r| r[f]).collect::<Vec<_>>();
                median(&column).unwrap_or(0.0)
            })
            .collect();
        Self { medians }
    }

    pub fn transform_row(&self, row: &[Option<f64>]) -> Vec<f64> {
        row.iter()
            .zip(&self.medians)
            .map(|(v, m)| v.filter(|x| x.is_finite()).unwrap_or(*m))
            .collect()
    }
}

/// Scales each column by its population standard deviation; constant columns
/// keep scale 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdScaler {
    pub scales: Vec<f64>,
}

impl StdScaler {
    pub fn fit(rows: &[Vec<f64>], n_features: usize) -> Self {
        if rows.is_empty() {
            return Self {
                scales: vec![1.0; n_features],
            };
        }
        let scales = to_matrix(rows, n_features)
            .std_axis(Axis(0), 0.0)
            .iter()
            .map(|std| if *std > 0.0 && std.is_finite() { *std } else { 1.0 })
            .collect();
        Self { scales }
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter().zip(&self.scales).map(|(x, s)| x / s).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgeModel {
    pub coef: Vec<f64>,
    pub intercept: f64,
}

impl RidgeModel {
    /// L2-penalized least squares with an unpenalized intercept. `alpha`
    /// weights the penalty against the residual sum of squares, so it is
    /// divided by the sample count for the elastic net's mean-loss objective.
    pub fn fit(rows: &[Vec<f64>], y: &[f64], params: &RidgeParams) -> Result<Self, RegressorError> {
        let n = rows.len();
        if n == 0 {
            return Err(RegressorError::EmptyTrainingSet);
        }
        let p = rows[0].len();
        let dataset = Dataset::new(to_matrix(rows, p), Array1::from(y.to_vec()));
        let model = ElasticNet::<f64>::params()
            .penalty(params.alpha / n as f64)
            .l1_ratio(0.0)
            .with_intercept(true)
            .max_iterations(RIDGE_MAX_ITERATIONS)
            .tolerance(RIDGE_TOLERANCE)
            .fit(&dataset)
            .map_err(|err| RegressorError::Linear(err.to_string()))?;
        Ok(Self {
            coef: model.hyperplane().to_vec(),
            intercept: model.intercept(),
        })
    }
}

impl Regressor for RidgeModel {
    fn predict_row(&self, row: &[f64]) -> f64 {
        self.intercept + self.coef.iter().zip(row).map(|(w, x)| w * x).sum::<f64>()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Binary regression tree; rows go left when `x[feature] <= threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl Regressor for RegressionTree {
    fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => idx = if row[*feature] <= *threshold { *left } else { *right },
            }
        }
    }
}

/// Per-feature bin edges learned from training data. `bin(x)` is the first
/// index `i` with `x <= edges[i]`, or `edges.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binner {
    pub edges: Vec<Vec<f64>>,
}

impl Binner {
    /// `max_bins` is clamped to `2..=u16::MAX` so every bin index fits a `u16`.
    pub fn fit(columns: &[Vec<f64>], max_bins: usize) -> Self {
        let max_bins = max_bins.clamp(2, usize::from(u16::MAX));
        let edges = columns
            .iter()
            .map(|values| feature_edges(values, max_bins))
            .collect();
        Self { edges }
    }

    pub fn bin(&self, feature: usize, x: f64) -> u16 {
        u16::try_from(self.edges[feature].partition_point(|e| *e < x)).unwrap_or(u16::MAX)
    }

    pub fn n_bins(&self, feature: usize) -> usize {
        self.edges[feature].len() + 1
    }
}

fn feature_edges(values: &[f64], max_bins: usize) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut distinct = sorted.clone();
    distinct.dedup();

    if distinct.len() <= max_bins {
        return distinct.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    }

    let last = (sorted.len() - 1) as f64;
    let mut edges = (1..max_bins)
        .map(|i| {
            let pos = last * i as f64 / max_bins as f64;
            (sorted[pos.floor() as usize] + sorted[pos.ceil() as usize]) / 2.0
        })
        .collect::<Vec<_>>();
    edges.dedup();
    edges
}

/// Gradient-boosted histogram trees for squared error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedTrees {
    pub baseline: f64,
    pub trees: Vec<RegressionTree>,
}

impl BoostedTrees {
    pub fn fit(rows: &[Vec<f64>], y: &[f64], params: &HgbParams) -> Result<Self, RegressorError> {
        if rows.is_empty() {
            return Err(RegressorError::EmptyTrainingSet);
        }
        let columns = to_columns(rows);
        let binner = Binner::fit(&columns, params.max_bins);
        let binned = columns
            .iter()
            .enumerate()
            .map(|(f, values)| values.iter().map(|x| binner.bin(f, *x)).collect::<Vec<_>>())
            .collect::<Vec<_>>();

        let baseline = y.iter().sum::<f64>() / y.len() as f64;
        let mut predictions = vec![baseline; y.len()];
        let mut trees = Vec::with_capacity(params.max_iter);
        let grower = HistogramGrower {
            binned: &binned,
            binner: &binner,
            params,
        };

        for _ in 0..params.max_iter {
            let residuals = y
                .iter()
                .zip(&predictions)
                .map(|(t, p)| t - p)
                .collect::<Vec<_>>();
            let tree = grower.grow(&residuals);
            for (pred, row) in predictions.iter_mut().zip(rows) {
                *pred += tree.predict_row(row);
            }
            trees.push(tree);
        }
        Ok(Self { baseline, trees })
    }
}

impl Regressor for BoostedTrees {
    fn predict_row(&self, row: &[f64]) -> f64 {
        self.baseline + self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
    }
}

struct HistogramGrower<'a> {
    binned: &'a [Vec<u16>],
    binner: &'a Binner,
    params: &'a HgbParams,
}

#[derive(Debug, Clone, Copy)]
struct BinSplit {
    feature: usize,
    bin: u16,
    gain: f64,
}

struct OpenLeaf {
    node: usize,
    rows: Vec<usize>,
    depth: usize,
    split: Option<BinSplit>,
}

impl HistogramGrower<'_> {
    /// Best-first growth bounded by depth, leaf count and leaf size. Leaf
    /// values are shrunk by the learning rate.
    fn grow(&self, residuals: &[f64]) -> RegressionTree {
        let mut nodes = vec![TreeNode::Leaf { value: 0.0 }];
        let root_rows = (0..residuals.len()).collect::<Vec<_>>();
        let mut open = vec![self.open_leaf(0, root_rows, 0, residuals)];
        let mut leaves = 1usize;

        while leaves < self.params.max_leaf_nodes.max(2) {
            let best = open
                .iter()
                .enumerate()
                .filter_map(|(i, leaf)| leaf.split.map(|s| (i, s.gain)))
                .fold(None, |acc: Option<(usize, f64)>, (i, gain)| match acc {
                    Some((_, g)) if g >= gain => acc,
                    _ => Some((i, gain)),
                });
            let Some((pos, _)) = best else {
                break;
            };
            let leaf = open.swap_remove(pos);
            let Some(split) = leaf.split else {
                break;
            };

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = leaf
                .rows
                .iter()
                .partition(|row| self.binned[split.feature][**row] <= split.bin);
            let left = nodes.len();
            nodes.push(TreeNode::Leaf { value: 0.0 });
            nodes.push(TreeNode::Leaf { value: 0.0 });
            nodes[leaf.node] = TreeNode::Split {
                feature: split.feature,
                threshold: self.binner.edges[split.feature][split.bin as usize],
                left,
                right: left + 1,
            };
            open.push(self.open_leaf(left, left_rows, leaf.depth + 1, residuals));
            open.push(self.open_leaf(left + 1, right_rows, leaf.depth + 1, residuals));
            leaves += 1;
        }

        for leaf in open {
            let mean = leaf.rows.iter().map(|r| residuals[*r]).sum::<f64>() / leaf.rows.len().max(1) as f64;
            nodes[leaf.node] = TreeNode::Leaf {
                value: self.params.learning_rate * mean,
            };
        }
        RegressionTree { nodes }
    }

    fn open_leaf(&self, node: usize, rows: Vec<usize>, depth: usize, residuals: &[f64]) -> OpenLeaf {
        let split = if depth < self.params.max_depth {
            self.best_split(&rows, residuals)
        } else {
            None
        };
        OpenLeaf {
            node,
            rows,
            depth,
            split,
        }
    }

    fn best_split(&self, rows: &[usize], residuals: &[f64]) -> Option<BinSplit> {
        let min_leaf = self.params.min_samples_leaf.max(1);
        let n = rows.len();
        if n < 2 * min_leaf {
            return None;
        }
        let total = rows.iter().map(|r| residuals[*r]).sum::<f64>();
        let parent_score = total * total / n as f64;

        let mut best: Option<BinSplit> = None;
        for (feature, bins) in self.binned.iter().enumerate() {
            let n_bins = self.binner.n_bins(feature);
            if n_bins < 2 {
                continue;
            }
            let mut sums = vec![0.0; n_bins];
            let mut counts = vec![0usize; n_bins];
            for row in rows {
                let b = bins[*row] as usize;
                sums[b] += residuals[*row];
                counts[b] += 1;
            }

            let (mut left_sum, mut left_n) = (0.0, 0usize);
            for bin in 0..n_bins - 1 {
                left_sum += sums[bin];
                left_n += counts[bin];
                let right_n = n - left_n;
                if left_n < min_leaf || right_n < min_leaf {
                    continue;
                }
                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / left_n as f64
                    + right_sum * right_sum / right_n as f64
                    - parent_score;
                if gain > 1e-12 && best.map_or(true, |b| gain > b.gain) {
                    best = Some(BinSplit {
                        feature,
                        bin: bin as u16,
                        gain,
                    });
                }
            }
        }
        best
    }
}

/// Bagged exact-split regression trees fitted in parallel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn fit(rows: &[Vec<f64>], y: &[f64], params: &ForestParams) -> Result<Self, RegressorError> {
        if rows.is_empty() {
            return Err(RegressorError::EmptyTrainingSet);
        }
        let columns = to_columns(rows);
        let trees = (0..params.n_estimators.max(1))
            .into_par_iter()
            .map(|tree_index| {
                let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(tree_index as u64));
                let sample = (0..y.len())
                    .map(|_| rng.gen_range(0..y.len()))
                    .collect::<Vec<_>>();
                grow_exact_tree(&columns, y, sample, params)
            })
            .collect();
        Ok(Self { trees })
    }
}

impl Regressor for RandomForest {
    fn predict_row(&self, row: &[f64]) -> f64 {
        self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / self.trees.len().max(1) as f64
    }
}

struct ExactSplit {
    feature: usize,
    threshold: f64,
    score: f64,
}

fn grow_exact_tree(
    columns: &[Vec<f64>],
    y: &[f64],
    sample: Vec<usize>,
    params: &ForestParams,
) -> RegressionTree {
    let mut nodes = vec![TreeNode::Leaf { value: 0.0 }];
    let mut stack = vec![(0usize, sample, 0usize)];

    while let Some((node, rows, depth)) = stack.pop() {
        let mean = rows.iter().map(|r| y[*r]).sum::<f64>() / rows.len().max(1) as f64;
        let depth_ok = params.max_depth.map_or(true, |max| depth < max);
        let split = if depth_ok {
            best_exact_split(columns, y, &rows, params.min_samples_leaf.max(1))
        } else {
            None
        };
        let Some(split) = split else {
            nodes[node] = TreeNode::Leaf { value: mean };
            continue;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|r| columns[split.feature][**r] <= split.threshold);
        let left = nodes.len();
        nodes.push(TreeNode::Leaf { value: 0.0 });
        nodes.push(TreeNode::Leaf { value: 0.0 });
        nodes[node] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right: left + 1,
        };
        stack.push((left + 1, right_rows, depth + 1));
        stack.push((left, left_rows, depth + 1));
    }
    RegressionTree { nodes }
}

/// Variance-reduction split over midpoints of consecutive distinct values.
fn best_exact_split(
    columns: &[Vec<f64>],
    y: &[f64],
    rows: &[usize],
    min_leaf: usize,
) -> Option<ExactSplit> {
    let n = rows.len();
    if n < 2 * min_leaf {
        return None;
    }
    let total = rows.iter().map(|r| y[*r]).sum::<f64>();
    let first = y[rows[0]];
    if rows.iter().all(|r| y[*r] == first) {
        return None;
    }
    let parent_score = total * total / n as f64;

    let mut best: Option<ExactSplit> = None;
    let mut order = rows.to_vec();
    for (feature, values) in columns.iter().enumerate() {
        order.sort_by(|a, b| values[*a].total_cmp(&values[*b]));
        let mut left_sum = 0.0;
        for i in 0..n - 1 {
            left_sum += y[order[i]];
            let left_n = i + 1;
            let (current, next) = (values[order[i]], values[order[i + 1]]);
            if current == next || left_n < min_leaf || n - left_n < min_leaf {
                continue;
            }
            let right_sum = total - left_sum;
            let score =
                left_sum * left_sum / left_n as f64 + right_sum * right_sum / (n - left_n) as f64;
            if score - parent_score > 1e-12 && best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(ExactSplit {
                    feature,
                    threshold: (current + next) / 2.0,
                    score,
                });
            }
        }
    }
    best
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum FittedModel {
    Ridge(RidgeModel),
    Hgb(BoostedTrees),
    Rf(RandomForest),
}

impl Regressor for FittedModel {
    fn predict_row(&self, row: &[f64]) -> f64 {
        match self {
            Self::Ridge(m) => m.predict_row(row),
            Self::Hgb(m) => m.predict_row(row),
            Self::Rf(m) => m.predict_row(row),
        }
    }
}

/// Imputer, optional scaler and model, bound to named feature columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPipeline {
    pub strategy: Strategy,
    pub feature_names: Vec<String>,
    pub imputer: MedianImputer,
    pub scaler: Option<StdScaler>,
    pub model: FittedModel,
}

impl FittedPipeline {
    pub fn fit(
        strategy: Strategy,
        params: &CandidateParams,
        feature_names: &[String],
        rows: &[Vec<Option<f64>>],
        y: &[f64],
    ) -> Result<Self, RegressorError> {
        if rows.is_empty() {
            return Err(RegressorError::EmptyTrainingSet);
        }
        if rows.len() != y.len() {
            return Err(RegressorError::LengthMismatch {
                rows: rows.len(),
                targets: y.len(),
            });
        }
        if let Some(row) = y.iter().position(|v| !v.is_finite()) {
            return Err(RegressorError::NonFiniteTarget { row });
        }
        let expected = feature_names.len();
        if let Some(bad) = rows.iter().find(|r| r.len() != expected) {
            return Err(RegressorError::FeatureCountMismatch {
                expected,
                found: bad.len(),
            });
        }

        let imputer = MedianImputer::fit(rows, expected);
        let imputed = rows
            .iter()
            .map(|r| imputer.transform_row(r))
            .collect::<Vec<_>>();

        let (scaler, model) = match strategy {
            Strategy::Ridge => {
                let scaler = StdScaler::fit(&imputed, expected);
                let scaled = imputed
                    .iter()
                    .map(|r| scaler.transform_row(r))
                    .collect::<Vec<_>>();
                let model = RidgeModel::fit(&scaled, y, &params.ridge)?;
                (Some(scaler), FittedModel::Ridge(model))
            }
            Strategy::Hgb => (
                None,
                FittedModel::Hgb(BoostedTrees::fit(&imputed, y, &params.hgb)?),
            ),
            Strategy::Rf => (
                None,
                FittedModel::Rf(RandomForest::fit(&imputed, y, &params.rf)?),
            ),
        };

        Ok(Self {
            strategy,
            feature_names: feature_names.to_vec(),
            imputer,
            scaler,
            model,
        })
    }

    pub fn predict_row(&self, row: &[Option<f64>]) -> Result<f64, RegressorError> {
        if row.len() != self.feature_names.len() {
            return Err(RegressorError::FeatureCountMismatch {
                expected: self.feature_names.len(),
                found: row.len(),
            });
        }
        let imputed = self.imputer.transform_row(row);
        let prepared = match &self.scaler {
            Some(scaler) => scaler.transform_row(&imputed),
            None => imputed,
        };
        Ok(self.model.predict_row(&prepared))
    }

    pub fn predict(&self, rows: &[Vec<Option<f64>>]) -> Result<Vec<f64>, RegressorError> {
        rows.iter().map(|r| self.predict_row(r)).collect()
    }

    /// Predicts every row of `table`, pulling features by name. Feature
    /// columns absent from the table are treated as all-null.
    pub fn predict_table(&self, table: &Table) -> Result<Vec<f64>, RegressorError> {
        self.predict(&feature_rows(table, &self.feature_names))
    }
}

/// Row-major numeric matrix of the named columns; missing columns are null.
pub fn feature_rows(table: &Table, names: &[String]) -> Vec<Vec<Option<f64>>> {
    let columns = names
        .iter()
        .map(|name| {
            table
                .column(name)
                .map(|c| c.to_numeric())
                .unwrap_or_else(|| vec![None; table.num_rows()])
        })
        .collect::<Vec<_>>();
    (0..table.num_rows())
        .map(|row| columns.iter().map(|c| c[row]).collect())
        .collect()
}

pub fn mean_absolute_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let n = y_true.len().max(1) as f64;
    y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()).sum::<f64>() / n
}

pub fn root_mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let n = y_true.len().max(1) as f64;
    (y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum::<f64>() / n).sqrt()
}

fn to_columns(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let p = rows.first().map_or(0, Vec::len);
    (0..p)
        .map(|f| rows.iter().map(|r| r[f]).collect())
        .collect()
}

fn to_matrix(rows: &[Vec<f64>], n_features: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), n_features), |(i, j)| rows[i][j])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data(n: usize) -> (Vec<Vec<Option<f64>>>, Vec<f64>) {
        let rows = (0..n).map(|i| vec![Some(i as f64)]).collect::<Vec<_>>();
        let y = (0..n).map(|i| if i < n / 2 { 1.0 } else { 5.0 }).collect();
        (rows, y)
    }

    #[test]
    fn imputer_uses_median_and_zero_for_empty_columns() {
        let rows = vec![
            vec![Some(1.0), None],
            vec![Some(3.0), None],
            vec![None, None],
        ];
        let imputer = MedianImputer::fit(&rows, 2);
        assert_eq!(imputer.medians, vec![2.0, 0.0]);
        assert_eq!(imputer.transform_row(&[None, Some(4.0)]), vec![2.0, 4.0]);
    }

    #[test]
    fn scaler_keeps_constant_columns() {
        let rows = vec![vec![1.0, 7.0], vec![3.0, 7.0]];
        let scaler = StdScaler::fit(&rows, 2);
        assert_eq!(scaler.scales, vec![1.0, 1.0]);
        let rows = vec![vec![0.0], vec![4.0]];
        assert_eq!(StdScaler::fit(&rows, 1).scales, vec![2.0]);
    }

    #[test]
    fn ridge_recovers_linear_relation() {
        let rows = (0..50)
            .map(|i| vec![Some(i as f64), Some((i % 7) as f64)])
            .collect::<Vec<_>>();
        let y = rows
            .iter()
            .map(|r| 2.0 * r[0].unwrap_or(0.0) - 3.0 * r[1].unwrap_or(0.0) + 1.0)
            .collect::<Vec<_>>();
        let params = CandidateParams {
            ridge: RidgeParams { alpha: 1e-8 },
            ..CandidateParams::default()
        };
        let names = vec!["a".to_string(), "b".to_string()];
        let pipe = FittedPipeline::fit(Strategy::Ridge, &params, &names, &rows, &y).expect("fit");
        let pred = pipe.predict_row(&[Some(10.0), Some(2.0)]).expect("predict");
        assert!((pred - 15.0).abs() < 1e-2, "pred {pred}");
    }

    #[test]
    fn ridge_penalty_shrinks_toward_mean() {
        let rows = (0..10).map(|i| vec![i as f64]).collect::<Vec<_>>();
        let y = (0..10).map(|i| i as f64).collect::<Vec<_>>();
        let loose = RidgeModel::fit(&rows, &y, &RidgeParams { alpha: 1e-6 }).expect("fit");
        let tight = RidgeModel::fit(&rows, &y, &RidgeParams { alpha: 100.0 }).expect("fit");
        assert!((loose.coef[0] - 1.0).abs() < 1e-3, "coef {}", loose.coef[0]);
        assert!((loose.intercept).abs() < 1e-2, "intercept {}", loose.intercept);
        assert!(tight.coef[0] < loose.coef[0]);
        // Closed form for one centered feature: sxy / (sxx + alpha) = 82.5 / 182.5.
        assert!((tight.coef[0] - 82.5 / 182.5).abs() < 1e-3, "coef {}", tight.coef[0]);
    }

    #[test]
    fn boosting_fits_step_function() {
        let (rows, y) = step_data(200);
        let names = vec!["x".to_string()];
        let pipe = FittedPipeline::fit(Strategy::Hgb, &CandidateParams::default(), &names, &rows, &y)
            .expect("fit");
        let pred = pipe.predict(&rows).expect("predict");
        let baseline = vec![3.0; y.len()];
        assert!(mean_absolute_error(&y, &pred) < 0.1 * mean_absolute_error(&y, &baseline));
    }

    #[test]
    fn forest_fits_step_function_deterministically() {
        let (rows, y) = step_data(60);
        let names = vec!["x".to_string()];
        let params = CandidateParams {
            rf: ForestParams {
                n_estimators: 20,
                ..ForestParams::default()
            },
            ..CandidateParams::default()
        };
        let a = FittedPipeline::fit(Strategy::Rf, &params, &names, &rows, &y).expect("fit");
        let b = FittedPipeline::fit(Strategy::Rf, &params, &names, &rows, &y).expect("fit");
        assert_eq!(a, b);
        assert!((a.predict_row(&[Some(2.0)]).expect("predict") - 1.0).abs() < 0.5);
        assert!((a.predict_row(&[Some(55.0)]).expect("predict") - 5.0).abs() < 0.5);
    }

    #[test]
    fn binner_places_values_by_edges() {
        let binner = Binner::fit(&[vec![1.0, 2.0, 3.0]], 255);
        assert_eq!(binner.edges[0], vec![1.5, 2.5]);
        assert_eq!(binner.bin(0, 1.0), 0);
        assert_eq!(binner.bin(0, 1.5), 0);
        assert_eq!(binner.bin(0, 2.0), 1);
        assert_eq!(binner.bin(0, 9.0), 2);
    }

    #[test]
    fn binner_indices_stay_within_u16() {
        let values = (0..70_000).map(f64::from).collect::<Vec<_>>();
        let binner = Binner::fit(&[values], usize::MAX);
        let edges = binner.edges[0].len();
        assert!(edges < usize::from(u16::MAX));
        assert_eq!(usize::from(binner.bin(0, 1e12)), edges);
        assert_eq!(binner.bin(0, -1.0), 0);
        assert!(binner.bin(0, 35_000.0) > binner.bin(0, 10_000.0));
    }

    #[test]
    fn pipeline_round_trips_through_json() {
        let (rows, y) = step_data(40);
        let names = vec!["x".to_string()];
        let pipe = FittedPipeline::fit(Strategy::Ridge, &CandidateParams::default(), &names, &rows, &y)
            .expect("fit");
        let json = serde_json::to_string(&pipe).expect("serialize");
        let back: FittedPipeline = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.strategy, Strategy::Ridge);
        let restored = back.predict(&rows).expect("predict");
        let original = pipe.predict(&rows).expect("predict");
        for (a, b) in restored.iter().zip(&original) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn rejects_wrong_feature_count() {
        let (rows, y) = step_data(10);
        let names = vec!["x".to_string()];
        let pipe = FittedPipeline::fit(Strategy::Ridge, &CandidateParams::default(), &names, &rows, &y)
            .expect("fit");
        assert_eq!(
            pipe.predict_row(&[Some(1.0), Some(2.0)]),
            Err(RegressorError::FeatureCountMismatch { expected: 1, found: 2 })
        );
    }

    #[test]
    fn metrics_match_hand_computation() {
        let y = [1.0, 2.0, 3.0];
        let p = [2.0, 2.0, 5.0];
        assert!((mean_absolute_error(&y, &p) - 1.0).abs() < 1e-12);
        assert!((root_mean_squared_error(&y, &p) - (5.0_f64 / 3.0).sqrt()).abs() < 1e-12);
    }
}
