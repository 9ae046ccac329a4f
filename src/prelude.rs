// 1. Traits
pub use crate::model::ForecastModel;
pub use crate::report::io::{Report, ReportName, ToCsv, ToSchema};

// 2. Data
pub use crate::data::dataset::{DatasetBuilder, FeatureFrame, TrainingPair};
pub use crate::data::features::{ColumnName, HORIZON_HOURS};
pub use crate::data::schema::{CalendarCol, CalendarSet, RawCol, Variable};
pub use crate::data::series::HourlySeries;
pub use crate::data::source::{DataSource, Url, VIC_ELEC_URL};

// 3. Models
pub use crate::model::forest::{ForestParams, MaxFeatures, RandomForestForecastModel};
pub use crate::model::metrics::r2_score;

// 4. Experiments
pub use crate::experiment::evaluation::{EvaluationRow, EvaluationTable, Step};
pub use crate::experiment::runner::{Experiment, ExperimentConfig, RunId, determine_run_id};
pub use crate::experiment::split::{Fold, TimeSeriesSplit};

// 5. Errors
pub use crate::error::{
    DataError, DemandError, DemandResult, ExperimentError, IoError, ModelError, SystemError,
};

// 6. Service
pub use crate::io::SerdeFormat;
pub use crate::service::{AppState, ServiceConfig, create_router};
