//! Command-line entry points: `run_exp` trains and cross-validates a new
//! versioned run, `start_rest` serves a saved model over HTTP.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::{
    data::{schema::CalendarSet, source::DataSource},
    experiment::{
        evaluation::Step,
        runner::{Experiment, ExperimentConfig},
    },
    model::forest::{ForestParams, RandomForestForecastModel},
    service::{self, ServiceConfig},
};

#[derive(Debug, Parser)]
#[command(name = "demandcast")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Day-ahead hourly electricity demand forecasting")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Train, cross-validate and persist a new experiment run
    #[command(name = "run_exp")]
    RunExp(RunExpArgs),

    /// Serve a saved model on POST /predict
    #[command(name = "start_rest")]
    StartRest(StartRestArgs),
}

#[derive(Debug, Args)]
pub struct RunExpArgs {
    /// Days of hourly history used as lag features
    #[arg(long = "n_lag_days", default_value_t = 2)]
    pub n_lag_days: usize,

    /// Number of forward-chaining cross-validation folds
    #[arg(long = "cv_splits", default_value_t = 3)]
    pub cv_splits: usize,

    #[arg(long = "experiments_path", default_value = "experiments")]
    pub experiments_path: PathBuf,

    /// Local CSV to use instead of the public feed
    #[arg(long = "data_path", conflicts_with = "data_url")]
    pub data_path: Option<PathBuf>,

    /// Remote CSV to use instead of the public feed
    #[arg(long = "data_url")]
    pub data_url: Option<String>,

    #[arg(long = "calendar", default_value_t = CalendarSet::Core)]
    pub calendar: CalendarSet,

    #[arg(long = "n_estimators", default_value_t = 100)]
    pub n_estimators: usize,

    #[arg(long = "max_depth")]
    pub max_depth: Option<usize>,

    /// Worker threads for training; all cores when omitted
    #[arg(long = "n_jobs")]
    pub n_jobs: Option<usize>,

    #[arg(long = "seed", default_value_t = 42)]
    pub seed: u64,
}

impl RunExpArgs {
    pub fn experiment_config(&self) -> ExperimentConfig {
        let data_source = match (&self.data_path, &self.data_url) {
            (Some(path), _) => DataSource::Local(path.clone()),
            (None, Some(url)) => DataSource::Remote(url.as_str().into()),
            (None, None) => DataSource::VicElec,
        };
        ExperimentConfig::default()
            .with_experiments_root(self.experiments_path.clone())
            .with_n_lag_days(self.n_lag_days)
            .with_cv_splits(self.cv_splits)
            .with_calendar(self.calendar)
            .with_data_source(data_source)
    }

    pub fn forest_params(&self) -> ForestParams {
        ForestParams::default()
            .with_n_estimators(self.n_estimators)
            .with_max_depth(self.max_depth)
            .with_n_jobs(self.n_jobs)
            .with_random_state(Some(self.seed))
    }
}

#[derive(Debug, Args)]
pub struct StartRestArgs {
    /// Must match the value the model was trained with
    #[arg(long = "n_lag_days", default_value_t = 2)]
    pub n_lag_days: usize,

    #[arg(long = "port", default_value_t = 5000)]
    pub port: u16,

    #[arg(long = "host", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long = "model_path")]
    pub model_path: PathBuf,

    #[arg(long = "calendar", default_value_t = CalendarSet::Core)]
    pub calendar: CalendarSet,
}

impl StartRestArgs {
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig::new(self.model_path.clone())
            .with_host(self.host.clone())
            .with_port(self.port)
            .with_n_lag_days(self.n_lag_days)
            .with_calendar(self.calendar)
    }
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::RunExp(args) => run_exp(&args),
        Command::StartRest(args) => start_rest(&args),
    }
}

fn run_exp(args: &RunExpArgs) -> anyhow::Result<()> {
    let experiment =
        Experiment::<RandomForestForecastModel>::new(args.experiment_config(), args.forest_params())?;
    let table = experiment.exec_run()?;

    info!(
        run = %experiment.run_id(),
        dir = %experiment.run_dir().display(),
        mean_train_r2 = table.mean_score(Step::Train)?,
        mean_val_r2 = table.mean_score(Step::Val)?,
        "Experiment finished"
    );
    Ok(())
}

fn start_rest(args: &StartRestArgs) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(service::serve::<RandomForestForecastModel>(args.service_config()))
}
