use polars::prelude::PlSmallStr;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// The vocabulary of the raw demand feed.
///
/// Every raw table handed to the dataset builder must carry all of these.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
pub enum RawCol {
    /// Observation timestamp (UTC).
    Time,
    /// Local calendar date of the observation.
    Date,
    /// Electricity demand.
    Demand,
    /// Air temperature.
    Temperature,
    /// Public holiday flag.
    Holiday,
}

impl RawCol {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn name(&self) -> PlSmallStr {
        self.as_str().into()
    }

    /// All columns the raw feed is required to provide.
    pub fn required() -> impl Iterator<Item = RawCol> {
        RawCol::iter()
    }
}

impl From<RawCol> for PlSmallStr {
    fn from(value: RawCol) -> Self {
        value.name()
    }
}

/// The hourly variables that are lagged into feature columns.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
pub enum Variable {
    Demand,
    Temperature,
    Holiday,
}

impl Variable {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

impl From<Variable> for RawCol {
    fn from(value: Variable) -> Self {
        match value {
            Variable::Demand => RawCol::Demand,
            Variable::Temperature => RawCol::Temperature,
            Variable::Holiday => RawCol::Holiday,
        }
    }
}

/// Calendar-derived feature columns.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
pub enum CalendarCol {
    /// Weekday of the local date, 0 = Monday .. 6 = Sunday.
    Weekday,
    Weekend,
    #[strum(serialize = "Hour_UTC")]
    HourUtc,
    DayOfYear,
    TomorrowIsWeekend,
    #[strum(serialize = "DST")]
    Dst,
}

impl CalendarCol {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn name(&self) -> PlSmallStr {
        self.as_str().into()
    }
}

impl From<CalendarCol> for PlSmallStr {
    fn from(value: CalendarCol) -> Self {
        value.name()
    }
}

/// Which calendar columns end up in the feature table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CalendarSet {
    /// `Weekday`, `Weekend`, `Hour_UTC`, `DayOfYear`.
    #[default]
    Core,
    /// `Core` plus `TomorrowIsWeekend` and `DST`.
    Extended,
}

impl CalendarSet {
    pub fn columns(&self) -> &'static [CalendarCol] {
        match self {
            Self::Core => &[
                CalendarCol::Weekday,
                CalendarCol::Weekend,
                CalendarCol::HourUtc,
                CalendarCol::DayOfYear,
            ],
            Self::Extended => &[
                CalendarCol::Weekday,
                CalendarCol::Weekend,
                CalendarCol::HourUtc,
                CalendarCol::DayOfYear,
                CalendarCol::TomorrowIsWeekend,
                CalendarCol::Dst,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_col_names() {
        let names: Vec<_> = RawCol::required().map(|c| c.as_str()).collect();
        assert_eq!(names, ["Time", "Date", "Demand", "Temperature", "Holiday"]);
    }

    #[test]
    fn test_calendar_col_names() {
        assert_eq!(CalendarCol::HourUtc.as_str(), "Hour_UTC");
        assert_eq!(CalendarCol::Dst.as_str(), "DST");
        assert_eq!(CalendarCol::DayOfYear.as_str(), "DayOfYear");
    }

    #[test]
    fn test_calendar_sets() {
        assert_eq!(CalendarSet::default(), CalendarSet::Core);
        assert_eq!(CalendarSet::Core.columns().len(), 4);
        assert_eq!(CalendarSet::Extended.columns().len(), 6);
    }
}
