//! Raw feed loading, hourly resampling and feature engineering.

pub mod dataset;
pub mod features;
pub mod schema;
pub mod series;
pub mod source;
