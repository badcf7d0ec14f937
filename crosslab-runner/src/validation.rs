//! Combinatorial cross-validation over an external scoring model.
//!
//! The model itself stays outside this crate: anything implementing
//! [`ScoringModel`] can be validated. Per fold, the model is refit on the
//! complement of a contiguous test block, its held-out predictions are
//! converted to centered percentile ranks, and the rank-weighted realized
//! targets give the fold's Sharpe. The mean fold Sharpe is then deflated for
//! the number of folds tried, and the binary overfitting proxy is attached.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crosslab_core::metrics::{cpcv_folds, deflated_sharpe, pbo_binary, sharpe_ratio};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("dataset is empty")]
    EmptyDataset,
    #[error("feature rows ({features}) and targets ({targets}) differ in length")]
    ShapeMismatch { features: usize, targets: usize },
}

/// Row-aligned features and forward-return targets, ordered by time.
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Vec<Vec<f64>>,
    targets: Vec<f64>,
}

impl Dataset {
    pub fn new(features: Vec<Vec<f64>>, targets: Vec<f64>) -> Result<Self, ValidationError> {
        if features.is_empty() {
            return Err(ValidationError::EmptyDataset);
        }
        if features.len() != targets.len() {
            return Err(ValidationError::ShapeMismatch {
                features: features.len(),
                targets: targets.len(),
            });
        }
        Ok(Self { features, targets })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    fn rows(&self, indices: &[usize]) -> (Vec<Vec<f64>>, Vec<f64>) {
        let features = indices.iter().map(|&i| self.features[i].clone()).collect();
        let targets = indices.iter().map(|&i| self.targets[i]).collect();
        (features, targets)
    }
}

/// Seam for the scoring model under validation. Training internals are the
/// implementor's business; the validator only refits and predicts.
pub trait ScoringModel {
    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]);
    fn predict(&self, features: &[Vec<f64>]) -> Vec<f64>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpcvSummary {
    pub mean_sharpe: f64,
    pub fold_sharpes: Vec<f64>,
}

/// Validation verdict for one model over one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub cpcv: CpcvSummary,
    pub deflated_sharpe: f64,
    pub pbo: f64,
}

/// Run CPCV over the dataset and score each fold.
pub fn cpcv_validate(
    dataset: &Dataset,
    model: &mut dyn ScoringModel,
    n_splits: usize,
) -> Result<ValidationReport, ValidationError> {
    if dataset.is_empty() {
        return Err(ValidationError::EmptyDataset);
    }

    let mut fold_sharpes = Vec::with_capacity(n_splits);
    for (train_idx, test_idx) in cpcv_folds(dataset.len(), n_splits) {
        let (train_x, train_y) = dataset.rows(&train_idx);
        let (test_x, test_y) = dataset.rows(&test_idx);

        model.fit(&train_x, &train_y);
        let predictions = model.predict(&test_x);

        let ranks = centered_ranks(&predictions);
        let fold_returns: Vec<f64> = ranks
            .iter()
            .zip(&test_y)
            .map(|(rank, target)| rank * target)
            .collect();
        fold_sharpes.push(sharpe_ratio(&fold_returns));
    }

    let mean_sharpe = if fold_sharpes.is_empty() {
        0.0
    } else {
        fold_sharpes.iter().sum::<f64>() / fold_sharpes.len() as f64
    };
    let deflated = deflated_sharpe(mean_sharpe, dataset.len().max(1), n_splits.max(1));
    let pbo = if fold_sharpes.is_empty() {
        0.0
    } else {
        pbo_binary(&fold_sharpes, &fold_sharpes)
    };

    Ok(ValidationReport {
        cpcv: CpcvSummary {
            mean_sharpe,
            fold_sharpes,
        },
        deflated_sharpe: deflated,
        pbo,
    })
}

/// Percentile ranks mapped to [-1, 1], ties sharing the average rank.
fn centered_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0.0_f64; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg_rank;
        }
        i = j + 1;
    }

    ranks
        .into_iter()
        .map(|rank| (rank / n as f64) * 2.0 - 1.0)
        .collect()
}
