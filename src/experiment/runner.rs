use std::{
    fmt, fs,
    io::{BufWriter, Write},
    marker::PhantomData,
    path::{Path, PathBuf},
    time::Instant,
};

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    evaluation::{EvaluationRow, EvaluationTable, Step},
    split::TimeSeriesSplit,
};
use crate::{
    data::{
        dataset::{DatasetBuilder, TrainingPair},
        schema::CalendarSet,
        source::DataSource,
    },
    error::{DemandResult, ExperimentError, IoError},
    impl_from_primitive,
    io::{self, DEFAULT_BUFFER_SIZE, SerdeFormat},
    model::{ForecastModel, frame_to_matrix, metrics::r2_score},
    report::io::ToCsv,
};

pub const MODEL_FILE_STEM: &str = "model";
pub const CONFIG_FILE: &str = "config.json";

// ================================================================================================
// Configuration
// ================================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub experiments_root: PathBuf,
    pub n_lag_days: usize,
    pub cv_splits: usize,
    pub calendar: CalendarSet,
    pub data_source: DataSource,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            experiments_root: PathBuf::from("experiments"),
            n_lag_days: 2,
            cv_splits: 3,
            calendar: CalendarSet::default(),
            data_source: DataSource::default(),
        }
    }
}

impl ExperimentConfig {
    pub fn with_experiments_root(self, experiments_root: impl Into<PathBuf>) -> Self {
        Self {
            experiments_root: experiments_root.into(),
            ..self
        }
    }

    pub fn with_n_lag_days(self, n_lag_days: usize) -> Self {
        Self { n_lag_days, ..self }
    }

    pub fn with_cv_splits(self, cv_splits: usize) -> Self {
        Self { cv_splits, ..self }
    }

    pub fn with_calendar(self, calendar: CalendarSet) -> Self {
        Self { calendar, ..self }
    }

    pub fn with_data_source(self, data_source: DataSource) -> Self {
        Self {
            data_source,
            ..self
        }
    }

    pub fn dataset_builder(&self) -> DatasetBuilder {
        DatasetBuilder::new(self.n_lag_days).with_calendar(self.calendar)
    }
}

// ================================================================================================
// Run identity
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub u32);
impl_from_primitive!(RunId, u32);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run_{:03}", self.0)
    }
}

/// Next free run id under `root`: one past the largest numeric suffix of the
/// existing run directories, or 0 when there are none. Creates `root` if it
/// is missing. Plain files are ignored.
#[tracing::instrument(skip_all, fields(root = %root.display()))]
pub fn determine_run_id(root: &Path) -> DemandResult<RunId> {
    fs::create_dir_all(root).map_err(|e| {
        IoError::FileSystem(format!("Failed to create directory {}: {e}", root.display()))
    })?;

    let mut latest: Option<(u32, String)> = None;
    for entry in fs::read_dir(root).map_err(IoError::from)? {
        let entry = entry.map_err(IoError::from)?;
        if !entry.file_type().map_err(IoError::from)?.is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        let suffix = name.rsplit('_').next().unwrap_or_default();
        let id = suffix
            .parse::<u32>()
            .map_err(|source| ExperimentError::MalformedRunDir {
                name: name.clone(),
                source,
            })?;
        if latest.as_ref().is_none_or(|(max, _)| id > *max) {
            latest = Some((id, name));
        }
    }

    match latest {
        None => Ok(RunId(0)),
        Some((id, name)) => id
            .checked_add(1)
            .map(RunId)
            .ok_or_else(|| ExperimentError::RunIdExhausted(name).into()),
    }
}

#[derive(Debug, Serialize)]
struct RunManifest<'a, P: Serialize> {
    run_id: RunId,
    model_kind: &'static str,
    experiment: &'a ExperimentConfig,
    params: &'a P,
}

// ================================================================================================
// Experiment
// ================================================================================================

/// One versioned run: a fresh `run_NNN` directory holding the trained
/// model, its cross-validation scores and the configuration that produced
/// them.
#[derive(Debug)]
pub struct Experiment<M: ForecastModel> {
    config: ExperimentConfig,
    params: M::Params,
    run_id: RunId,
    run_dir: PathBuf,
    _model: PhantomData<fn() -> M>,
}

impl<M: ForecastModel> Experiment<M> {
    /// Allocates the next run directory and records the configuration.
    ///
    /// # Errors
    /// - Invalid hyperparameters or fewer than two CV splits (nothing is
    ///   created on disk).
    /// - [`ExperimentError::MalformedRunDir`] for a foreign directory under
    ///   the experiments root.
    /// - [`ExperimentError::RunDirExists`] if another runner took the id.
    #[tracing::instrument(skip_all, fields(root = %config.experiments_root.display()))]
    pub fn new(config: ExperimentConfig, params: M::Params) -> DemandResult<Self> {
        M::new(params.clone())?;
        if config.cv_splits < 2 {
            return Err(ExperimentError::InvalidSplits(format!(
                "cv_splits must be at least 2, got {}",
                config.cv_splits
            ))
            .into());
        }

        let run_id = determine_run_id(&config.experiments_root)?;
        let run_dir = config.experiments_root.join(run_id.to_string());
        io::create_dir_exclusive(&run_dir)?;

        let experiment = Self {
            config,
            params,
            run_id,
            run_dir,
            _model: PhantomData,
        };
        experiment.write_manifest()?;

        info!(run = %run_id, kind = M::KIND, "Created experiment run");
        Ok(experiment)
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn model_path(&self) -> PathBuf {
        self.run_dir.join(format!(
            "{MODEL_FILE_STEM}.{}",
            SerdeFormat::default().extension()
        ))
    }

    /// Fits a model on the full training pair and saves it into the run
    /// directory.
    #[tracing::instrument(skip(self), fields(run = %self.run_id))]
    pub fn train(&self) -> DemandResult<M> {
        let pair = self.training_pair()?;
        let mut model = M::new(self.params.clone())?;
        model.train(pair.features(), pair.target())?;
        model.save(&self.model_path())?;

        info!(rows = pair.len(), path = %self.model_path().display(), "Trained model");
        Ok(model)
    }

    /// Forward-chaining cross-validation; writes `evaluate.csv` into the run
    /// directory and returns the scores.
    #[tracing::instrument(skip(self), fields(run = %self.run_id, cv_splits = self.config.cv_splits))]
    pub fn evaluate(&self) -> DemandResult<EvaluationTable> {
        let pair = self.training_pair()?;
        let folds = TimeSeriesSplit::new(self.config.cv_splits).split(pair.len())?;

        let mut rows = Vec::with_capacity(2 * folds.len());
        for fold in &folds {
            let started = Instant::now();
            let x_train = slice(pair.features(), &fold.train);
            let y_train = slice(pair.target(), &fold.train);
            let x_val = slice(pair.features(), &fold.val);
            let y_val = slice(pair.target(), &fold.val);

            let mut model = M::new(self.params.clone())?;
            model.train(&x_train, &y_train)?;

            let train = score(&model, &x_train, &y_train)?;
            let val = score(&model, &x_val, &y_val)?;

            info!(
                fold = fold.index,
                train_rows = fold.train.len(),
                val_rows = fold.val.len(),
                train_r2 = train,
                val_r2 = val,
                elapsed = %humantime::format_duration(started.elapsed()),
                "Evaluated fold"
            );

            let fold_index = fold.index as u32;
            rows.push(EvaluationRow {
                fold: fold_index,
                step: Step::Train,
                score: train,
            });
            rows.push(EvaluationRow {
                fold: fold_index,
                step: Step::Val,
                score: val,
            });
        }

        let table = EvaluationTable::from_rows(&rows)?;
        table.to_csv(&self.run_dir, None, None)?;
        Ok(table)
    }

    /// `train` followed by `evaluate`.
    #[tracing::instrument(skip(self), fields(run = %self.run_id))]
    pub fn exec_run(&self) -> DemandResult<EvaluationTable> {
        self.train()?;
        self.evaluate()
    }

    fn training_pair(&self) -> DemandResult<TrainingPair> {
        let raw = self.config.data_source.fetch()?;
        self.config.dataset_builder().build(&raw)
    }

    fn write_manifest(&self) -> DemandResult<()> {
        let manifest = RunManifest {
            run_id: self.run_id,
            model_kind: M::KIND,
            experiment: &self.config,
            params: &self.params,
        };
        let path = self.run_dir.join(CONFIG_FILE);
        let file = fs::File::create(&path)
            .map_err(|e| IoError::WriteFailed(format!("{}: {e}", path.display())))?;
        let mut writer = BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file);
        serde_json::to_writer_pretty(&mut writer, &manifest).map_err(IoError::from)?;
        writer.flush().map_err(IoError::from)?;
        Ok(())
    }
}

fn slice(df: &DataFrame, rows: &std::ops::Range<usize>) -> DataFrame {
    df.slice(rows.start as i64, rows.len())
}

fn score<M: ForecastModel>(model: &M, features: &DataFrame, target: &DataFrame) -> DemandResult<f64> {
    let truth = frame_to_matrix(target)?;
    let pred = model.forecast(features)?;
    r2_score(truth.view(), pred.view())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DemandError;

    #[test]
    fn test_run_id_formatting() {
        assert_eq!(RunId(0).to_string(), "run_000");
        assert_eq!(RunId(42).to_string(), "run_042");
        assert_eq!(RunId(1234).to_string(), "run_1234");
    }

    #[test]
    fn test_empty_root_starts_at_zero() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("experiments");
        assert_eq!(determine_run_id(&root).unwrap(), RunId(0));
        assert!(root.is_dir());
    }

    #[test]
    fn test_next_id_follows_the_largest_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["run_000", "run_001", "run_003"] {
            fs::create_dir(tmp.path().join(name)).unwrap();
        }
        fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();
        assert_eq!(determine_run_id(tmp.path()).unwrap(), RunId(4));
    }

    #[test]
    fn test_malformed_run_dir_fails() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("run_000")).unwrap();
        fs::create_dir(tmp.path().join("scratch")).unwrap();

        let err = determine_run_id(tmp.path()).unwrap_err();
        assert!(matches!(
            err,
            DemandError::Experiment(ExperimentError::MalformedRunDir { ref name, .. }) if name == "scratch"
        ));
    }

    #[test]
    fn test_exhausted_run_id_fails() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join(format!("run_{}", u32::MAX))).unwrap();

        let err = determine_run_id(tmp.path()).unwrap_err();
        assert!(matches!(
            err,
            DemandError::Experiment(ExperimentError::RunIdExhausted(ref name)) if name == "run_4294967295"
        ));
    }

    #[test]
    fn test_config_defaults() {
        let config = ExperimentConfig::default();
        assert_eq!(config.experiments_root, PathBuf::from("experiments"));
        assert_eq!(config.n_lag_days, 2);
        assert_eq!(config.cv_splits, 3);

        let parsed: ExperimentConfig = serde_json::from_str(r#"{"cv_splits": 5}"#).unwrap();
        assert_eq!(parsed, config.with_cv_splits(5));
    }
}
