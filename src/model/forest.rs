use std::time::Instant;

use ndarray::{Array2, ArrayView1};
use polars::prelude::DataFrame;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smartcore::{
    ensemble::random_forest_regressor::{RandomForestRegressor, RandomForestRegressorParameters},
    linalg::basic::matrix::DenseMatrix,
};

use super::{ForecastModel, column_names, frame_to_matrix};
use crate::error::{DemandError, DemandResult, ModelError};

type Estimator = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

// ================================================================================================
// Hyperparameters
// ================================================================================================

/// Number of candidate features examined at each split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    #[default]
    All,
    Sqrt,
    Log2,
    Fraction(f64),
    Fixed(usize),
}

impl MaxFeatures {
    fn resolve(&self, n_features: usize) -> usize {
        let n = n_features as f64;
        match *self {
            Self::All => n_features,
            Self::Sqrt => n.sqrt().ceil() as usize,
            Self::Log2 => n.log2().ceil() as usize,
            Self::Fraction(f) => (n * f).ceil() as usize,
            Self::Fixed(k) => k,
        }
        .clamp(1, n_features.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    /// Trees per horizon hour.
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    /// Worker threads used for fitting; `None` uses the global rayon pool.
    pub n_jobs: Option<usize>,
    /// Base seed; the forest of horizon column `j` is grown from `random_state + j`.
    pub random_state: Option<u64>,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            n_jobs: None,
            random_state: Some(42),
        }
    }
}

impl ForestParams {
    pub fn with_n_estimators(self, n_estimators: usize) -> Self {
        Self {
            n_estimators,
            ..self
        }
    }

    pub fn with_max_depth(self, max_depth: Option<usize>) -> Self {
        Self { max_depth, ..self }
    }

    pub fn with_n_jobs(self, n_jobs: Option<usize>) -> Self {
        Self { n_jobs, ..self }
    }

    pub fn with_random_state(self, random_state: Option<u64>) -> Self {
        Self {
            random_state,
            ..self
        }
    }

    pub fn validate(&self) -> DemandResult<()> {
        let invalid = |msg: &str| -> DemandResult<()> {
            Err(ModelError::InvalidParams(msg.to_string()).into())
        };

        if self.n_estimators == 0 {
            return invalid("n_estimators must be at least 1");
        }
        if self.min_samples_split < 2 {
            return invalid("min_samples_split must be at least 2");
        }
        if self.min_samples_leaf == 0 {
            return invalid("min_samples_leaf must be at least 1");
        }
        if self.n_jobs == Some(0) {
            return invalid("n_jobs must be at least 1 when set");
        }
        if let Some(depth) = self.max_depth {
            if depth == 0 || u16::try_from(depth).is_err() {
                return invalid("max_depth must lie in 1..=65535 when set");
            }
        }
        match self.max_features {
            MaxFeatures::Fraction(f) if !(f > 0.0 && f <= 1.0) => {
                invalid("max_features fraction must lie in (0, 1]")
            }
            MaxFeatures::Fixed(0) => invalid("max_features must be at least 1"),
            _ => Ok(()),
        }
    }

    /// Estimator parameters for one horizon column. `validate` has already
    /// bounded `max_depth`.
    fn estimator_params(&self, n_features: usize, seed: u64) -> RandomForestRegressorParameters {
        let params = RandomForestRegressorParameters::default()
            .with_n_trees(self.n_estimators)
            .with_min_samples_split(self.min_samples_split)
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_m(self.max_features.resolve(n_features))
            .with_seed(seed);
        match self.max_depth.and_then(|d| u16::try_from(d).ok()) {
            Some(depth) => params.with_max_depth(depth),
            None => params,
        }
    }
}

// ================================================================================================
// Model
// ================================================================================================

/// One bagged regression forest per horizon hour.
///
/// Column `j` of the target is fitted by its own estimator; forecasts stack
/// the per-column predictions back into a `(rows, horizon)` matrix.
#[derive(Debug, Serialize, Deserialize)]
pub struct RandomForestForecastModel {
    params: ForestParams,
    estimators: Vec<Estimator>,
    feature_names: Vec<String>,
}

impl RandomForestForecastModel {
    pub fn is_fitted(&self) -> bool {
        !self.estimators.is_empty()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn fit_estimators(
        &self,
        x: &DenseMatrix<f64>,
        n_features: usize,
        y: &Array2<f64>,
    ) -> DemandResult<Vec<Estimator>> {
        let base_seed = self
            .params
            .random_state
            .unwrap_or_else(|| rand::rng().random());

        (0..y.ncols())
            .into_par_iter()
            .map(|j| {
                let params = self
                    .params
                    .estimator_params(n_features, base_seed.wrapping_add(j as u64));
                Estimator::fit(x, &y.column(j).to_vec(), params)
                    .map_err(|e| {
                        DemandError::from(ModelError::Estimator(format!("horizon column {j}: {e}")))
                    })
            })
            .collect()
    }
}

fn dense(x: &Array2<f64>) -> DemandResult<DenseMatrix<f64>> {
    DenseMatrix::new(x.nrows(), x.ncols(), x.iter().copied().collect(), false)
        .map_err(|e| ModelError::Shape(e.to_string()).into())
}

impl ForecastModel for RandomForestForecastModel {
    type Params = ForestParams;
    const KIND: &'static str = "random_forest_forecast";

    fn new(params: ForestParams) -> DemandResult<Self> {
        params.validate()?;
        Ok(Self {
            params,
            estimators: Vec::new(),
            feature_names: Vec::new(),
        })
    }

    fn params(&self) -> &ForestParams {
        &self.params
    }

    #[tracing::instrument(skip_all, fields(rows = features.height(), n_estimators = self.params.n_estimators))]
    fn train(&mut self, features: &DataFrame, target: &DataFrame) -> DemandResult<()> {
        if features.height() != target.height() {
            return Err(ModelError::Shape(format!(
                "features have {} rows but target has {}",
                features.height(),
                target.height()
            ))
            .into());
        }
        if features.height() == 0 || features.width() == 0 || target.width() == 0 {
            return Err(ModelError::Shape("cannot train on an empty frame".into()).into());
        }

        let x = dense(&frame_to_matrix(features)?)?;
        let y = frame_to_matrix(target)?;
        let start = Instant::now();

        let estimators = match self.params.n_jobs {
            None => self.fit_estimators(&x, features.width(), &y)?,
            Some(n) => rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| ModelError::WorkerPool(e.to_string()))?
                .install(|| self.fit_estimators(&x, features.width(), &y))?,
        };

        tracing::info!(
            outputs = estimators.len(),
            trees = estimators.len() * self.params.n_estimators,
            elapsed = %humantime::format_duration(start.elapsed()),
            "Trained random forest"
        );

        self.estimators = estimators;
        self.feature_names = column_names(features);
        Ok(())
    }

    fn forecast(&self, features: &DataFrame) -> DemandResult<Array2<f64>> {
        if !self.is_fitted() {
            return Err(ModelError::NotFitted.into());
        }
        let names = column_names(features);
        if names != self.feature_names {
            let expected = self.feature_names.len();
            let first_diff = names
                .iter()
                .zip(&self.feature_names)
                .position(|(a, b)| a != b)
                .unwrap_or(expected.min(names.len()));
            return Err(ModelError::FeatureMismatch(format!(
                "expected {expected} columns, got {}; first difference at position {first_diff}",
                names.len()
            ))
            .into());
        }
        if features.height() == 0 {
            return Ok(Array2::zeros((0, self.estimators.len())));
        }

        let x = dense(&frame_to_matrix(features)?)?;
        let columns = self
            .estimators
            .par_iter()
            .map(|estimator| {
                estimator
                    .predict(&x)
                    .map_err(|e| DemandError::from(ModelError::Estimator(e.to_string())))
            })
            .collect::<DemandResult<Vec<_>>>()?;

        let mut out = Array2::zeros((features.height(), columns.len()));
        for (j, values) in columns.iter().enumerate() {
            if values.len() != out.nrows() {
                return Err(ModelError::Shape(format!(
                    "horizon column {j} predicted {} rows for {} inputs",
                    values.len(),
                    out.nrows()
                ))
                .into());
            }
            out.column_mut(j).assign(&ArrayView1::from(values.as_slice()));
        }
        Ok(out)
    }
}
