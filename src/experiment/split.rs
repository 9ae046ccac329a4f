use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{DemandResult, ExperimentError};

/// Forward-chaining splitter over time-ordered rows.
///
/// The last `k * test_size` rows are cut into `k` consecutive validation
/// blocks with `test_size = n / (k + 1)`; each fold trains on everything
/// before its block. Rows are never shuffled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesSplit {
    pub n_splits: usize,
    /// Caps the training window to the most recent rows when set.
    pub max_train_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub index: usize,
    pub train: Range<usize>,
    pub val: Range<usize>,
}

impl TimeSeriesSplit {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            max_train_size: None,
        }
    }

    pub fn with_max_train_size(self, max_train_size: Option<usize>) -> Self {
        Self {
            max_train_size,
            ..self
        }
    }

    pub fn split(&self, n_samples: usize) -> DemandResult<Vec<Fold>> {
        let k = self.n_splits;
        if k < 2 {
            return Err(ExperimentError::InvalidSplits(format!(
                "n_splits must be at least 2, got {k}"
            ))
            .into());
        }
        if n_samples <= k {
            return Err(ExperimentError::InvalidSplits(format!(
                "cannot make {k} folds from {n_samples} rows; need at least {}",
                k + 1
            ))
            .into());
        }

        let test_size = n_samples / (k + 1);
        let first_val = n_samples - k * test_size;

        Ok((0..k)
            .map(|index| {
                let val_start = first_val + index * test_size;
                let train_start = self
                    .max_train_size
                    .map_or(0, |max| val_start.saturating_sub(max));
                Fold {
                    index,
                    train: train_start..val_start,
                    val: val_start..val_start + test_size,
                }
            })
            .collect())
    }
}
