use std::{fmt, io::Cursor, path::PathBuf, time::Instant};

use polars::prelude::{CsvReadOptions, DataFrame, SerReader};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::{DataError, DemandResult, polars_to_demand_error},
    impl_from_primitive, io,
};

/// The fixed public feed of half-hourly Victorian electricity demand.
pub const VIC_ELEC_URL: &str =
    "https://raw.githubusercontent.com/JoaquinAmatRodrigo/skforecast/master/data/vic_elec.csv";

/// Represents a validated feed URL.
///
/// # Examples
///
/// ```
/// # use demandcast::prelude::*;
/// let url = Url::from("https://example.com/feed.csv");
/// assert_eq!(url.0, "https://example.com/feed.csv");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Url(pub String);
impl_from_primitive!(Url, String);

impl From<&str> for Url {
    fn from(value: &str) -> Self {
        Url(value.to_string())
    }
}

/// Where the raw `Time, Date, Demand, Temperature, Holiday` table comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DataSource {
    /// The fixed public feed at [`VIC_ELEC_URL`].
    #[default]
    VicElec,

    /// A CSV served over HTTP(S) with the same layout.
    Remote(Url),

    /// A CSV file on the local filesystem.
    Local(PathBuf),
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VicElec => write!(f, "{VIC_ELEC_URL}"),
            Self::Remote(url) => write!(f, "{}", url.0),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

impl DataSource {
    /// Loads the raw table into memory. One blocking fetch per call.
    #[tracing::instrument(skip(self), fields(source = %self), err)]
    pub fn fetch(&self) -> DemandResult<DataFrame> {
        let started = Instant::now();
        let bytes = match self {
            Self::VicElec => download(VIC_ELEC_URL)?,
            Self::Remote(url) => download(&url.0)?,
            Self::Local(path) => io::read_bytes(path)?,
        };

        let df = read_csv_bytes(bytes)?;
        info!(
            rows = df.height(),
            elapsed = %humantime::format_duration(started.elapsed()),
            "Loaded raw time series"
        );
        Ok(df)
    }
}

fn download(url: &str) -> DemandResult<Vec<u8>> {
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| DataError::Fetch(format!("GET {url}: {e}")))?;

    let bytes = response
        .bytes()
        .map_err(|e| DataError::Fetch(format!("Reading body of {url}: {e}")))?;
    Ok(bytes.to_vec())
}

/// Parses an in-memory CSV with a header row.
///
/// No date parsing happens here; `Time` and `Date` stay strings and are
/// interpreted by the resampler.
pub fn read_csv_bytes(bytes: Vec<u8>) -> DemandResult<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
        .map_err(|e| polars_to_demand_error("Failed to parse CSV", e))
}
