use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::{
    ChunkAgg, Column, DataFrame, DataType, IntoLazy, LazyFrame, SortMultipleOptions, TimeUnit,
    TimeZone, col, lit,
};

use crate::{
    data::schema::{RawCol, Variable},
    error::{DataError, DemandError, DemandResult, polars_to_demand_error},
};

const MILLIS_PER_HOUR: i64 = 3_600_000;

/// Days between 0001-01-01 (CE day 1) and the Unix epoch.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Logical type of the hourly index.
pub fn index_dtype() -> DataType {
    DataType::Datetime(TimeUnit::Milliseconds, Some(TimeZone::UTC))
}

/// A strictly hourly time series.
///
/// # Invariants
/// - The frame holds `Time, Date, Demand, Temperature, Holiday` in that order.
/// - `Time` is sorted ascending and consecutive entries are exactly one hour
///   apart (left edge of each bucket).
/// - A null marks an hour for which the raw feed had no observation.
#[derive(Debug, Clone)]
pub struct HourlySeries {
    frame: DataFrame,
}

impl HourlySeries {
    /// Resamples a raw table into left-labelled, left-closed 1-hour buckets.
    ///
    /// # Semantics
    /// - The bucket of a record is its UTC timestamp truncated to the hour.
    /// - The result spans every hour between the first and the last occupied
    ///   bucket; hours without records produce nulls everywhere.
    /// - `Demand`, `Temperature` and `Holiday` (booleans as 0/1) are averaged
    ///   over the non-null values of the bucket.
    /// - `Date` takes the first non-null date observed in the bucket.
    ///
    /// # Errors
    /// - [`DataError::MissingColumn`] if any of [`RawCol::required`] is absent.
    /// - [`DataError::EmptyInput`] if the table has no rows.
    /// - [`DataError::TimestampConversion`] / [`DataError::InvalidValue`] on
    ///   unparseable cells.
    #[tracing::instrument(skip_all, fields(rows = raw.height()))]
    pub fn resample(raw: &DataFrame) -> DemandResult<Self> {
        for col in RawCol::required() {
            raw.column(col.as_str()).map_err(missing(col))?;
        }
        if raw.height() == 0 {
            return Err(DataError::EmptyInput.into());
        }

        let hourly = decode(raw)?
            .lazy()
            .with_column(col(RawCol::Time).dt().truncate(lit("1h")))
            .group_by([col(RawCol::Time)])
            .agg([
                col(RawCol::Date).drop_nulls().first(),
                col(RawCol::Demand).mean(),
                col(RawCol::Temperature).mean(),
                col(RawCol::Holiday).mean(),
            ])
            .collect()
            .map_err(|e| polars_to_demand_error("Bucketing records by hour", e))?;

        let frame = hour_grid(&hourly)?
            .lazy()
            .left_join(hourly.lazy(), col(RawCol::Time), col(RawCol::Time))
            .sort([RawCol::Time], SortMultipleOptions::default())
            .collect()
            .map_err(|e| polars_to_demand_error("Filling empty hours", e))?;

        tracing::debug!(hours = frame.height(), "Resampled raw series to hourly buckets");
        Ok(Self { frame })
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn lazy(&self) -> LazyFrame {
        self.frame.clone().lazy()
    }

    pub fn index(&self) -> DemandResult<Vec<DateTime<Utc>>> {
        datetime_index(self.column(RawCol::Time)?)
    }

    pub fn dates(&self) -> DemandResult<Vec<Option<NaiveDate>>> {
        self.column(RawCol::Date)?
            .date()
            .map_err(|e| polars_to_demand_error("Reading dates", e))?
            .physical()
            .into_iter()
            .map(|days| days.map(date_from_days).transpose())
            .collect()
    }

    pub fn values(&self, var: Variable) -> DemandResult<Vec<Option<f64>>> {
        Ok(self
            .column(var.into())?
            .f64()
            .map_err(|e| polars_to_demand_error(&format!("Reading '{var}'"), e))?
            .into_iter()
            .collect())
    }

    fn column(&self, col: RawCol) -> DemandResult<&Column> {
        self.frame.column(col.as_str()).map_err(|e| missing(col)(e).into())
    }
}

/// One row per hour from the first to the last occupied bucket.
fn hour_grid(hourly: &DataFrame) -> DemandResult<DataFrame> {
    let buckets = hourly
        .column(RawCol::Time.as_str())
        .and_then(|c| c.datetime())
        .map_err(|e| polars_to_demand_error("Reading hour buckets", e))?
        .physical();

    let (Some(first), Some(last)) = (buckets.min(), buckets.max()) else {
        return Err(DataError::EmptyInput.into());
    };
    let hours: Vec<i64> = (first..=last).step_by(MILLIS_PER_HOUR as usize).collect();

    let time = Column::new(RawCol::Time.name(), hours)
        .cast(&index_dtype())
        .map_err(|e| polars_to_demand_error("Building hourly index", e))?;
    DataFrame::new(vec![time]).map_err(|e| polars_to_demand_error("Building hourly index", e))
}

/// Converts a datetime column into UTC timestamps. Nulls are rejected.
pub(crate) fn datetime_index(col: &Column) -> DemandResult<Vec<DateTime<Utc>>> {
    let DataType::Datetime(unit, _) = col.dtype() else {
        return Err(DataError::InvalidValue {
            column: col.name().to_string(),
            msg: format!("expected datetime column, found {}", col.dtype()),
        }
        .into());
    };
    let unit = *unit;
    col.datetime()
        .map_err(|e| polars_to_demand_error("Reading timestamps", e))?
        .physical()
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            let value = value.ok_or_else(|| DataError::InvalidValue {
                column: col.name().to_string(),
                msg: format!("null timestamp in row {row}"),
            })?;
            from_physical(value, unit)
        })
        .collect()
}

// ================================================================================================
// Column decoding
// ================================================================================================

fn missing(col: RawCol) -> impl FnOnce(polars::error::PolarsError) -> DataError {
    move |_| DataError::MissingColumn(col.to_string())
}

/// Normalizes the raw feed to `Time: Datetime(ms, UTC)`, `Date: Date` and
/// `f64` value columns.
fn decode(raw: &DataFrame) -> DemandResult<DataFrame> {
    let column = |col: RawCol| raw.column(col.as_str()).map_err(missing(col));

    let millis: Vec<i64> = timestamps(column(RawCol::Time)?)?
        .iter()
        .map(DateTime::timestamp_millis)
        .collect();
    let days: Vec<Option<i32>> = dates(column(RawCol::Date)?)?
        .into_iter()
        .map(|d| d.map(|d| d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE))
        .collect();

    let mut columns = vec![
        Column::new(RawCol::Time.name(), millis)
            .cast(&index_dtype())
            .map_err(|e| polars_to_demand_error("Casting timestamps", e))?,
        Column::new(RawCol::Date.name(), days)
            .cast(&DataType::Date)
            .map_err(|e| polars_to_demand_error("Casting dates", e))?,
    ];
    for var in [Variable::Demand, Variable::Temperature, Variable::Holiday] {
        let raw_col = RawCol::from(var);
        columns.push(Column::new(raw_col.name(), numeric(column(raw_col)?)?));
    }

    DataFrame::new(columns).map_err(|e| polars_to_demand_error("Decoding raw feed", e))
}

fn timestamps(col: &Column) -> DemandResult<Vec<DateTime<Utc>>> {
    match col.dtype() {
        DataType::String => col
            .str()
            .map_err(|e| polars_to_demand_error("Reading timestamps", e))?
            .into_iter()
            .enumerate()
            .map(|(row, opt)| {
                let s = opt.ok_or_else(|| DataError::InvalidValue {
                    column: col.name().to_string(),
                    msg: format!("null timestamp in row {row}"),
                })?;
                parse_timestamp(s)
            })
            .collect(),
        DataType::Datetime(..) => datetime_index(col),
        other => Err(DataError::InvalidValue {
            column: col.name().to_string(),
            msg: format!("expected string or datetime column, found {other}"),
        }
        .into()),
    }
}

fn from_physical(value: i64, unit: TimeUnit) -> DemandResult<DateTime<Utc>> {
    let ts = match unit {
        TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(value)),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(value),
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(value),
    };
    ts.ok_or_else(|| {
        DataError::TimestampConversion(format!("{value} ({unit:?}) is out of range")).into()
    })
}

fn date_from_days(days: i32) -> DemandResult<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE).ok_or_else(|| {
        DataError::TimestampConversion(format!("day {days} is out of range")).into()
    })
}

/// Parses RFC 3339 timestamps; naive timestamps are taken as UTC.
pub(crate) fn parse_timestamp(s: &str) -> DemandResult<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| DataError::TimestampConversion(format!("unrecognised timestamp '{s}'")).into())
}

fn dates(col: &Column) -> DemandResult<Vec<Option<NaiveDate>>> {
    match col.dtype() {
        DataType::String => col
            .str()
            .map_err(|e| polars_to_demand_error("Reading dates", e))?
            .into_iter()
            .map(|opt| opt.map(parse_date).transpose())
            .collect(),
        DataType::Date => col
            .date()
            .map_err(|e| polars_to_demand_error("Reading dates", e))?
            .physical()
            .into_iter()
            .map(|days| days.map(date_from_days).transpose())
            .collect(),
        DataType::Datetime(..) => Ok(timestamps(col)?
            .into_iter()
            .map(|ts| Some(ts.date_naive()))
            .collect()),
        other => Err(DataError::InvalidValue {
            column: col.name().to_string(),
            msg: format!("expected string or date column, found {other}"),
        }
        .into()),
    }
}

fn parse_date(s: &str) -> DemandResult<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| parse_timestamp(s).map(|ts| ts.date_naive()))
        .map_err(|_| DataError::TimestampConversion(format!("unrecognised date '{s}'")).into())
}

/// Reads a value column as `f64`. NaN counts as missing.
fn numeric(col: &Column) -> DemandResult<Vec<Option<f64>>> {
    let name = col.name().to_string();
    let values: Vec<Option<f64>> = match col.dtype() {
        DataType::String => col
            .str()
            .map_err(|e| polars_to_demand_error("Reading numeric column", e))?
            .into_iter()
            .map(|opt| opt.and_then(|s| parse_number(&name, s).transpose()).transpose())
            .collect::<DemandResult<_>>()?,
        _ => col
            .cast(&DataType::Float64)
            .map_err(|e| polars_to_demand_error(&format!("Casting '{name}' to f64"), e))?
            .f64()
            .map_err(|e| polars_to_demand_error(&format!("Reading '{name}'"), e))?
            .into_iter()
            .collect(),
    };
    Ok(values
        .into_iter()
        .map(|v| v.filter(|v| !v.is_nan()))
        .collect())
}

fn parse_number(column: &str, s: &str) -> DemandResult<Option<f64>> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    match s.to_ascii_lowercase().as_str() {
        "true" => Ok(Some(1.0)),
        "false" => Ok(Some(0.0)),
        _ => s.parse::<f64>().map(Some).map_err(|e| {
            DemandError::from(DataError::InvalidValue {
                column: column.to_string(),
                msg: format!("'{s}': {e}"),
            })
        }),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use polars::df;

    use super::*;

    fn raw(rows: &[(&str, &str, f64, f64, bool)]) -> DataFrame {
        let time: Vec<&str> = rows.iter().map(|r| r.0).collect();
        let date: Vec<&str> = rows.iter().map(|r| r.1).collect();
        let demand: Vec<f64> = rows.iter().map(|r| r.2).collect();
        let temperature: Vec<f64> = rows.iter().map(|r| r.3).collect();
        let holiday: Vec<bool> = rows.iter().map(|r| r.4).collect();
        df![
            "Time" => time,
            "Date" => date,
            "Demand" => demand,
            "Temperature" => temperature,
            "Holiday" => holiday,
        ]
        .expect("raw frame")
    }

    #[test]
    fn test_resample_averages_half_hours_into_left_labelled_buckets() {
        let df = raw(&[
            ("2012-01-01T00:00:00Z", "2012-01-01", 10.0, 20.0, true),
            ("2012-01-01T00:30:00Z", "2012-01-01", 20.0, 22.0, false),
            ("2012-01-01T01:00:00Z", "2012-01-01", 30.0, 24.0, false),
        ]);

        let series = HourlySeries::resample(&df).expect("resample");

        assert_eq!(series.len(), 2);
        assert_eq!(
            series.index().unwrap(),
            [
                Utc.with_ymd_and_hms(2012, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2012, 1, 1, 1, 0, 0).unwrap(),
            ]
        );
        assert_eq!(series.values(Variable::Demand).unwrap(), [Some(15.0), Some(30.0)]);
        assert_eq!(
            series.values(Variable::Temperature).unwrap(),
            [Some(21.0), Some(24.0)]
        );
        assert_eq!(series.values(Variable::Holiday).unwrap(), [Some(0.5), Some(0.0)]);
    }

    #[test]
    fn test_resample_fills_gaps_with_missing_values() {
        let df = raw(&[
            ("2012-01-01T03:00:00Z", "2012-01-01", 3.0, 1.0, false),
            ("2012-01-01T00:00:00Z", "2012-01-01", 0.0, 1.0, false),
        ]);

        let series = HourlySeries::resample(&df).expect("resample");

        assert_eq!(series.len(), 4);
        assert_eq!(
            series.values(Variable::Demand).unwrap(),
            [Some(0.0), None, None, Some(3.0)]
        );
        assert_eq!(series.dates().unwrap()[1], None);

        let index = series.index().unwrap();
        for pair in index.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::hours(1));
        }
        assert_eq!(
            index.last().copied(),
            Some(Utc.with_ymd_and_hms(2012, 1, 1, 3, 0, 0).unwrap())
        );
        assert_eq!(series.frame().column("Time").unwrap().dtype(), &index_dtype());
    }

    #[test]
    fn test_resample_keeps_local_date() {
        // 13:00 UTC is already the next local day in Victoria.
        let df = raw(&[("2011-12-31T13:00:00Z", "2012-01-01", 1.0, 1.0, true)]);
        let series = HourlySeries::resample(&df).expect("resample");
        assert_eq!(series.dates().unwrap(), [NaiveDate::from_ymd_opt(2012, 1, 1)]);
    }

    #[test]
    fn test_resample_rejects_missing_column() {
        let df = df![
            "Time" => ["2012-01-01T00:00:00Z"],
            "Demand" => [1.0],
        ]
        .expect("frame");

        let err = HourlySeries::resample(&df).expect_err("missing columns");
        assert!(
            matches!(err, DemandError::Data(DataError::MissingColumn(ref c)) if c == "Date"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_resample_rejects_empty_table() {
        let df = raw(&[]);
        let err = HourlySeries::resample(&df).expect_err("empty input");
        assert!(matches!(err, DemandError::Data(DataError::EmptyInput)));
    }

    #[test]
    fn test_string_holiday_flags() {
        let df = df![
            "Time" => ["2012-01-01 00:00:00", "2012-01-01 00:30:00"],
            "Date" => ["2012-01-01", "2012-01-01"],
            "Demand" => ["1.5", "2.5"],
            "Temperature" => ["", "3.0"],
            "Holiday" => ["True", "FALSE"],
        ]
        .expect("frame");

        let series = HourlySeries::resample(&df).expect("resample");
        assert_eq!(series.values(Variable::Demand).unwrap(), [Some(2.0)]);
        assert_eq!(series.values(Variable::Temperature).unwrap(), [Some(3.0)]);
        assert_eq!(series.values(Variable::Holiday).unwrap(), [Some(0.5)]);
    }

    #[test]
    fn test_nan_does_not_poison_the_bucket_mean() {
        let df = raw(&[
            ("2012-01-01T00:00:00Z", "2012-01-01", f64::NAN, 1.0, false),
            ("2012-01-01T00:30:00Z", "2012-01-01", 8.0, 1.0, false),
        ]);
        let series = HourlySeries::resample(&df).expect("resample");
        assert_eq!(series.values(Variable::Demand).unwrap(), [Some(8.0)]);
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let want = Utc.with_ymd_and_hms(2012, 1, 1, 13, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2012-01-01T13:00:00Z").unwrap(), want);
        assert_eq!(parse_timestamp("2012-01-02T00:00:00+11:00").unwrap(), want);
        assert_eq!(parse_timestamp("2012-01-01 13:00:00").unwrap(), want);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let df = df![
            "Time" => ["2012-01-01T00:00:00Z"],
            "Date" => ["2012-01-01"],
            "Demand" => ["lots"],
            "Temperature" => [1.0],
            "Holiday" => [false],
        ]
        .expect("frame");

        let err = HourlySeries::resample(&df).expect_err("bad number");
        assert!(matches!(
            err,
            DemandError::Data(DataError::InvalidValue { ref column, .. }) if column == "Demand"
        ));
    }
}
