use std::iter;

use chrono::{DateTime, Utc};
use polars::prelude::{Column, DataFrame, Expr, col};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    data::{
        features::{
            FUTURE_HOLIDAY_PREFIX, HORIZON_HOURS, calendar_features, future_offsets, lag_offsets,
            shift_vars,
        },
        schema::{CalendarSet, RawCol, Variable},
        series::{HourlySeries, datetime_index},
    },
    error::{DataError, DemandError, DemandResult, SystemError, polars_to_demand_error},
};

/// Aligned supervised-learning table.
///
/// # Invariants
/// - `features`, `target` and `index` have the same number of rows and row
///   `i` of each refers to the hour `index[i]`.
/// - Neither frame contains a missing value.
#[derive(Debug, Clone)]
pub struct TrainingPair {
    index: Vec<DateTime<Utc>>,
    features: DataFrame,
    target: DataFrame,
}

impl TrainingPair {
    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn features(&self) -> &DataFrame {
        &self.features
    }

    pub fn target(&self) -> &DataFrame {
        &self.target
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn into_parts(self) -> (Vec<DateTime<Utc>>, DataFrame, DataFrame) {
        (self.index, self.features, self.target)
    }
}

/// Feature rows without a target, as served to a trained model.
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    index: Vec<DateTime<Utc>>,
    features: DataFrame,
}

impl FeatureFrame {
    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn features(&self) -> &DataFrame {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Turns a raw demand table into model-ready frames.
///
/// # Example
/// ```no_run
/// # use demandcast::prelude::*;
/// # fn example() -> DemandResult<()> {
/// let raw = DataSource::default().fetch()?;
/// let pair = DatasetBuilder::new(2).build(&raw)?;
/// assert_eq!(pair.features().height(), pair.target().height());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetBuilder {
    n_lag_days: usize,
    calendar: CalendarSet,
}

impl Default for DatasetBuilder {
    fn default() -> Self {
        Self::new(2)
    }
}

impl DatasetBuilder {
    /// `n_lag_days = 0` is accepted and yields no lag columns.
    pub fn new(n_lag_days: usize) -> Self {
        Self {
            n_lag_days,
            calendar: CalendarSet::default(),
        }
    }

    pub fn with_calendar(mut self, calendar: CalendarSet) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn n_lag_days(&self) -> usize {
        self.n_lag_days
    }

    pub fn calendar(&self) -> CalendarSet {
        self.calendar
    }

    /// Width of the feature table this builder produces.
    pub fn feature_count(&self) -> usize {
        let lags_per_var = lag_offsets(self.n_lag_days).count();
        self.calendar.columns().len() + HORIZON_HOURS as usize + 3 * lags_per_var
    }

    /// Resamples, extracts and drops incomplete rows.
    ///
    /// # Errors
    /// - Any error of [`HourlySeries::resample`].
    /// - [`DataError::InsufficientHistory`] if no row survives the filter.
    #[tracing::instrument(skip(self, raw), fields(n_lag_days = self.n_lag_days))]
    pub fn build(&self, raw: &DataFrame) -> DemandResult<TrainingPair> {
        let series = HourlySeries::resample(raw)?;
        let features = self.feature_exprs()?;
        let n_features = features.len();

        let mut columns = self.complete_rows(&series, features.into_iter().chain(target_exprs()))?;
        let target = columns.split_off(1 + n_features);
        let features = columns.split_off(1);
        let pair = TrainingPair {
            index: index_of(&columns)?,
            features: frame(features, "Collecting features")?,
            target: frame(target, "Collecting target")?,
        };

        info!(
            hours = series.len(),
            rows = pair.len(),
            dropped = series.len() - pair.len(),
            features = pair.features.width(),
            "Built training pair"
        );
        Ok(pair)
    }

    /// Feature step only: rows are kept when every feature is present, the
    /// future demand is not required.
    #[tracing::instrument(skip(self, raw), fields(n_lag_days = self.n_lag_days))]
    pub fn build_features(&self, raw: &DataFrame) -> DemandResult<FeatureFrame> {
        let series = HourlySeries::resample(raw)?;

        let mut columns = self.complete_rows(&series, self.feature_exprs()?)?;
        let features = columns.split_off(1);
        let frame = FeatureFrame {
            index: index_of(&columns)?,
            features: frame(features, "Collecting features")?,
        };

        tracing::debug!(rows = frame.len(), "Built feature frame");
        Ok(frame)
    }

    /// Feature expressions in table order: calendar, future holiday, then
    /// the Demand, Temperature and Holiday lag blocks.
    fn feature_exprs(&self) -> DemandResult<Vec<Expr>> {
        let lags = || lag_offsets(self.n_lag_days);
        let mut exprs = calendar_features(self.calendar)?;
        exprs.extend(shift_vars(
            Variable::Holiday,
            future_offsets(),
            Some(FUTURE_HOLIDAY_PREFIX),
        ));
        exprs.extend(shift_vars(Variable::Demand, lags(), None));
        exprs.extend(shift_vars(Variable::Temperature, lags(), None));
        exprs.extend(shift_vars(Variable::Holiday, lags(), None));
        Ok(exprs)
    }

    /// Evaluates `exprs` next to the index and keeps the rows where no cell
    /// is null. The first returned column is the index.
    fn complete_rows(
        &self,
        series: &HourlySeries,
        exprs: impl IntoIterator<Item = Expr>,
    ) -> DemandResult<Vec<Column>> {
        let table = series
            .lazy()
            .select(iter::once(col(RawCol::Time)).chain(exprs).collect::<Vec<_>>())
            .drop_nulls(None)
            .collect()
            .map_err(|e| polars_to_demand_error("Dropping incomplete rows", e))?;

        if table.height() == 0 {
            return Err(DataError::InsufficientHistory {
                n_lag_days: self.n_lag_days,
                hours: series.len(),
            }
            .into());
        }
        Ok(table.take_columns())
    }
}

/// Target expressions `Demand+001 ..= Demand+024`.
fn target_exprs() -> Vec<Expr> {
    shift_vars(Variable::Demand, future_offsets(), None)
}

fn index_of(columns: &[Column]) -> DemandResult<Vec<DateTime<Utc>>> {
    let time = columns.first().ok_or_else(|| {
        DemandError::from(SystemError::InvariantViolation(
            "index column missing from the extracted table".to_string(),
        ))
    })?;
    datetime_index(time)
}

fn frame(columns: Vec<Column>, context: &str) -> DemandResult<DataFrame> {
    DataFrame::new(columns).map_err(|e| polars_to_demand_error(context, e))
}
