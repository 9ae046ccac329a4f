//! Lagged/future variable columns and calendar columns.

use std::{fmt, ops::Range, sync::LazyLock};

use chrono_tz::Tz;
use polars::prelude::{DataType, Expr, TimeZone, col, lit};
use regex::Regex;

use crate::{
    data::schema::{CalendarCol, CalendarSet, RawCol, Variable},
    error::{DemandResult, SystemError, polars_to_demand_error},
};

/// Number of hourly steps the model forecasts ahead.
pub const HORIZON_HOURS: i64 = 24;

/// Time zone whose daylight-saving state feeds the `DST` column.
pub const DST_TIME_ZONE: Tz = chrono_tz::Australia::Victoria;

/// Prefix of the future holiday block.
pub const FUTURE_HOLIDAY_PREFIX: &str = "Target-Holiday";

static COLUMN_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<prefix>.*?)(?P<sign>\+?)(?P<mag>\d{3})$").expect("static regex is valid")
});

// ================================================================================================
// Column names
// ================================================================================================

/// Name of a shifted variable column.
///
/// Encoded as `{prefix}{sign}{|offset|:03}` where the sign is `+` exactly when
/// `offset < 0` (a value from the future) and empty otherwise.
///
/// ```
/// # use demandcast::prelude::*;
/// assert_eq!(ColumnName::new("Demand", -1).to_string(), "Demand+001");
/// assert_eq!(ColumnName::new("Demand", 47).to_string(), "Demand047");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnName {
    pub prefix: String,
    pub offset: i64,
}

impl ColumnName {
    pub fn new(prefix: impl Into<String>, offset: i64) -> Self {
        Self {
            prefix: prefix.into(),
            offset,
        }
    }

    pub fn sign(&self) -> &'static str {
        if self.offset < 0 { "+" } else { "" }
    }

    pub fn magnitude(&self) -> u64 {
        self.offset.unsigned_abs()
    }

    /// Inverse of the `Display` encoding. Returns `None` for names that do not
    /// end in a three digit offset.
    pub fn decode(name: &str) -> Option<Self> {
        let caps = COLUMN_NAME_RE.captures(name)?;
        let magnitude: i64 = caps.name("mag")?.as_str().parse().ok()?;
        let future = !caps.name("sign")?.as_str().is_empty();
        Some(Self {
            prefix: caps.name("prefix")?.as_str().to_string(),
            offset: if future { -magnitude } else { magnitude },
        })
    }
}

impl fmt::Display for ColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{:03}", self.prefix, self.sign(), self.magnitude())
    }
}

// ================================================================================================
// Shifting
// ================================================================================================

/// Past offsets `0 .. n_lag_days * 24`.
pub fn lag_offsets(n_lag_days: usize) -> Range<i64> {
    0..(n_lag_days as i64 * HORIZON_HOURS)
}

/// Future offsets `-1, -2, .., -24`.
pub fn future_offsets() -> impl Iterator<Item = i64> {
    (1..=HORIZON_HOURS).map(|h| -h)
}

/// `var` shifted by `offset` hourly periods, named after `prefix`.
///
/// Row `i` reads `var[i - offset]` and is null where that row does not
/// exist: a positive offset leaves `offset` leading nulls (the row sees the
/// past), a negative one leaves `|offset|` trailing nulls (the row sees the
/// future).
pub fn shift_var(var: Variable, offset: i64, prefix: &str) -> Expr {
    col(RawCol::from(var))
        .shift(lit(offset))
        .alias(ColumnName::new(prefix, offset).to_string())
}

/// One shifted copy of `var` per offset, in offset order.
///
/// Column names use `prefix`, defaulting to the variable name.
pub fn shift_vars(
    var: Variable,
    offsets: impl IntoIterator<Item = i64>,
    prefix: Option<&str>,
) -> Vec<Expr> {
    let prefix = prefix.unwrap_or(var.as_str());
    offsets
        .into_iter()
        .map(|offset| shift_var(var, offset, prefix))
        .collect()
}

// ================================================================================================
// Calendar
// ================================================================================================

/// The calendar columns of `set`, in table order.
///
/// `Weekday`, `Weekend`, `DayOfYear` and `TomorrowIsWeekend` derive from the
/// local `Date` and are null where the date is null; `Hour_UTC` and `DST`
/// derive from the index.
pub fn calendar_features(set: CalendarSet) -> DemandResult<Vec<Expr>> {
    let local = TimeZone::opt_try_new(Some(DST_TIME_ZONE.name()))
        .map_err(|e| polars_to_demand_error("Resolving DST time zone", e))?
        .ok_or_else(|| {
            SystemError::InvariantViolation(format!("unknown time zone {}", DST_TIME_ZONE.name()))
        })?;

    Ok(set
        .columns()
        .iter()
        .map(|&column| calendar_expr(column, &local).alias(column))
        .collect())
}

fn calendar_expr(column: CalendarCol, local: &TimeZone) -> Expr {
    match column {
        CalendarCol::Weekday => weekday(),
        // Day numbers 6 and 7 on a 0..=6 scale: only Sunday matches.
        CalendarCol::Weekend => weekday().eq(lit(6)).or(weekday().eq(lit(7))),
        CalendarCol::HourUtc => col(RawCol::Time).dt().hour().cast(DataType::Int32),
        CalendarCol::DayOfYear => col(RawCol::Date).dt().ordinal_day().cast(DataType::Int32),
        CalendarCol::TomorrowIsWeekend => weekday().eq(lit(5)).or(weekday().eq(lit(6))),
        CalendarCol::Dst => col(RawCol::Time)
            .dt()
            .convert_time_zone(local.clone())
            .dt()
            .dst_offset()
            .dt()
            .total_hours(false)
            .cast(DataType::Int32),
    }
}

/// Weekday of the local date, 0 = Monday.
fn weekday() -> Expr {
    col(RawCol::Date).dt().weekday().cast(DataType::Int32) - lit(1)
}

#[cfg(test)]
mod tests {
    use polars::{df, prelude::DataFrame};

    use super::*;
    use crate::data::series::HourlySeries;

    fn hourly(start: &str, demand: &[f64]) -> HourlySeries {
        let start = crate::data::series::parse_timestamp(start).expect("start");
        let time: Vec<String> = (0..demand.len())
            .map(|h| (start + chrono::Duration::hours(h as i64)).to_rfc3339())
            .collect();
        let date: Vec<String> = (0..demand.len())
            .map(|h| {
                (start + chrono::Duration::hours(h as i64))
                    .with_timezone(&DST_TIME_ZONE)
                    .date_naive()
                    .to_string()
            })
            .collect();
        let df = df![
            "Time" => time,
            "Date" => date,
            "Demand" => demand.to_vec(),
            "Temperature" => demand.iter().map(|d| d / 10.0).collect::<Vec<_>>(),
            "Holiday" => vec![false; demand.len()],
        ]
        .expect("frame");
        HourlySeries::resample(&df).expect("resample")
    }

    fn eval(series: &HourlySeries, exprs: Vec<Expr>) -> DataFrame {
        series.lazy().select(exprs).collect().expect("evaluate")
    }

    fn i32s(df: &DataFrame, name: &str) -> Vec<Option<i32>> {
        df.column(name).unwrap().i32().unwrap().into_iter().collect()
    }

    fn bools(df: &DataFrame, name: &str) -> Vec<Option<bool>> {
        df.column(name).unwrap().bool().unwrap().into_iter().collect()
    }

    #[test]
    fn test_column_name_encoding() {
        assert_eq!(ColumnName::new("Demand", 0).to_string(), "Demand000");
        assert_eq!(ColumnName::new("Demand", 47).to_string(), "Demand047");
        assert_eq!(ColumnName::new("Demand", -1).to_string(), "Demand+001");
        assert_eq!(
            ColumnName::new(FUTURE_HOLIDAY_PREFIX, -24).to_string(),
            "Target-Holiday+024"
        );
    }

    #[test]
    fn test_column_name_round_trip() {
        for prefix in ["Demand", "Temperature", FUTURE_HOLIDAY_PREFIX] {
            for offset in [-24, -7, -1, 0, 1, 23, 47, 999] {
                let name = ColumnName::new(prefix, offset);
                let decoded = ColumnName::decode(&name.to_string()).expect("decodable");
                assert_eq!(decoded, name);
                assert_eq!(decoded.sign(), name.sign());
                assert_eq!(decoded.magnitude(), name.magnitude());
            }
        }
    }

    #[test]
    fn test_column_name_decode_rejects_garbage() {
        assert_eq!(ColumnName::decode("Weekday"), None);
        assert_eq!(ColumnName::decode("Demand12"), None);
    }

    #[test]
    fn test_shift_fills_boundaries_with_nulls() {
        let series = hourly("2012-01-01T00:00:00Z", &[1.0, 2.0, 3.0, 4.0]);
        let df = eval(
            &series,
            shift_vars(Variable::Demand, [0, 1, 3, -1, -2, 10], None),
        );

        let get = |name: &str| -> Vec<Option<f64>> {
            df.column(name).unwrap().f64().unwrap().into_iter().collect()
        };
        assert_eq!(get("Demand000"), [Some(1.0), Some(2.0), Some(3.0), Some(4.0)]);
        assert_eq!(get("Demand001"), [None, Some(1.0), Some(2.0), Some(3.0)]);
        assert_eq!(get("Demand003"), [None, None, None, Some(1.0)]);
        assert_eq!(get("Demand+001"), [Some(2.0), Some(3.0), Some(4.0), None]);
        assert_eq!(get("Demand+002"), [Some(3.0), Some(4.0), None, None]);
        assert_eq!(get("Demand010"), [None; 4]);
    }

    #[test]
    fn test_shift_vars_names() {
        let series = hourly("2012-01-01T00:00:00Z", &[1.0, 2.0, 3.0]);
        let df = eval(&series, shift_vars(Variable::Demand, [0, 1, -1], None));

        let names: Vec<_> = df.get_column_names().iter().map(|n| n.to_string()).collect();
        assert_eq!(names, ["Demand000", "Demand001", "Demand+001"]);

        let prefixed = eval(
            &series,
            shift_vars(Variable::Holiday, future_offsets(), Some(FUTURE_HOLIDAY_PREFIX)),
        );
        assert_eq!(prefixed.width(), 24);
        assert_eq!(prefixed.get_column_names()[0].as_str(), "Target-Holiday+001");
    }

    #[test]
    fn test_lag_offsets() {
        assert_eq!(lag_offsets(2), 0..48);
        assert_eq!(lag_offsets(0).count(), 0);
        assert_eq!(future_offsets().collect::<Vec<_>>().len(), 24);
        assert_eq!(future_offsets().last(), Some(-24));
    }

    #[test]
    fn test_calendar_features_core() {
        // 2011-12-31T12:00Z is 23:00 Saturday local, 13:00Z is 00:00 Sunday local.
        let series = hourly("2011-12-31T12:00:00Z", &[1.0, 2.0]);
        let df = eval(&series, calendar_features(CalendarSet::Core).unwrap());

        let names: Vec<_> = df.get_column_names().iter().map(|n| n.to_string()).collect();
        assert_eq!(names, ["Weekday", "Weekend", "Hour_UTC", "DayOfYear"]);

        assert_eq!(i32s(&df, "Weekday"), [Some(5), Some(6)]);
        assert_eq!(bools(&df, "Weekend"), [Some(false), Some(true)]);
        assert_eq!(i32s(&df, "Hour_UTC"), [Some(12), Some(13)]);
        assert_eq!(i32s(&df, "DayOfYear"), [Some(365), Some(1)]);
    }

    #[test]
    fn test_calendar_features_extended() {
        let summer = hourly("2012-01-10T00:00:00Z", &[1.0]);
        let winter = hourly("2012-07-10T00:00:00Z", &[1.0]);
        let exprs = || calendar_features(CalendarSet::Extended).unwrap();

        let df = eval(&summer, exprs());
        assert_eq!(df.width(), 6);
        assert_eq!(i32s(&df, "DST"), [Some(1)]);

        let df = eval(&winter, exprs());
        assert_eq!(i32s(&df, "DST"), [Some(0)]);
        // 2012-07-10 local is a Tuesday.
        assert_eq!(bools(&df, "TomorrowIsWeekend"), [Some(false)]);
    }

    #[test]
    fn test_calendar_features_follow_missing_dates() {
        let df = df![
            "Time" => ["2012-01-01T00:00:00Z", "2012-01-01T02:00:00Z"],
            "Date" => ["2012-01-01", "2012-01-01"],
            "Demand" => [1.0, 2.0],
            "Temperature" => [1.0, 2.0],
            "Holiday" => [false, false],
        ]
        .unwrap();
        let series = HourlySeries::resample(&df).unwrap();
        let out = eval(&series, calendar_features(CalendarSet::Core).unwrap());

        // The empty 01:00 bucket has no date but still has an hour.
        assert_eq!(i32s(&out, "Weekday")[1], None);
        assert_eq!(bools(&out, "Weekend")[1], None);
        assert_eq!(i32s(&out, "Hour_UTC"), [Some(0), Some(1), Some(2)]);
    }
}
