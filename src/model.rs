//! The forecast model capability and its persistence envelope.

pub mod forest;
pub mod metrics;

use std::{fmt::Debug, path::Path};

use ndarray::Array2;
use polars::prelude::{DataFrame, DataType};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    error::{DataError, DemandResult, IoError, ModelError, polars_to_demand_error},
    io::{self, SerdeFormat},
};

/// Version of the on-disk artifact envelope.
pub const ARTIFACT_FORMAT_VERSION: u16 = 1;

/// A regressor that maps one feature row to the next 24 hourly demand values.
///
/// Implementors only provide fitting and prediction; persistence comes for
/// free through the artifact envelope, which tags every file with
/// [`ForecastModel::KIND`] so that loading a foreign artifact fails instead
/// of producing garbage.
pub trait ForecastModel: Serialize + DeserializeOwned + Send + Sync + Sized {
    /// Typed hyperparameters; a fresh model with the same parameters can be
    /// built from a clone of them.
    type Params: Clone + Debug + Serialize + Send + Sync;

    /// Stable identifier written into saved artifacts.
    const KIND: &'static str;

    /// Builds an untrained model. Fails on invalid hyperparameters.
    fn new(params: Self::Params) -> DemandResult<Self>;

    fn params(&self) -> &Self::Params;

    fn train(&mut self, features: &DataFrame, target: &DataFrame) -> DemandResult<()>;

    /// Returns one row of horizon values per feature row.
    fn forecast(&self, features: &DataFrame) -> DemandResult<Array2<f64>>;

    fn save(&self, path: &Path) -> DemandResult<()> {
        write_artifact(path, Self::KIND, self)
    }

    fn load(path: &Path) -> DemandResult<Self> {
        read_artifact(path, Self::KIND)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ArtifactHeader {
    kind: String,
    format_version: u16,
}

#[tracing::instrument(skip_all, fields(path = %path.display(), kind = %kind))]
fn write_artifact<M: Serialize>(path: &Path, kind: &str, model: &M) -> DemandResult<()> {
    match SerdeFormat::from_path(path)? {
        SerdeFormat::Postcard => {
            let header = ArtifactHeader {
                kind: kind.to_string(),
                format_version: ARTIFACT_FORMAT_VERSION,
            };
            let head = postcard::to_stdvec(&header)
                .map_err(|e| IoError::WriteFailed(format!("artifact header: {e}")))?;
            let body = postcard::to_stdvec(model)
                .map_err(|e| IoError::WriteFailed(format!("artifact body: {e}")))?;
            io::write_bytes(path, &[&head, &body])?;
        }
    }
    tracing::info!(kind, "Saved model artifact");
    Ok(())
}

#[tracing::instrument(skip_all, fields(path = %path.display(), kind = %kind))]
fn read_artifact<M: DeserializeOwned>(path: &Path, kind: &str) -> DemandResult<M> {
    match SerdeFormat::from_path(path)? {
        SerdeFormat::Postcard => {
            let bytes = io::read_bytes(path)?;
            let (header, rest) = postcard::take_from_bytes::<ArtifactHeader>(&bytes)
                .map_err(|e| IoError::ReadFailed(format!("artifact header: {e}")))?;

            if header.kind != kind {
                return Err(ModelError::KindMismatch {
                    expected: kind.to_string(),
                    found: header.kind,
                }
                .into());
            }
            if header.format_version != ARTIFACT_FORMAT_VERSION {
                return Err(IoError::ReadFailed(format!(
                    "unsupported artifact format version {}",
                    header.format_version
                ))
                .into());
            }

            postcard::from_bytes(rest)
                .map_err(|e| IoError::ReadFailed(format!("artifact body: {e}")).into())
        }
    }
}

/// Copies a fully populated frame into a row-major `f64` matrix.
///
/// Boolean and integer columns are cast to `f64`; a missing cell is an error.
pub fn frame_to_matrix(df: &DataFrame) -> DemandResult<Array2<f64>> {
    let mut out = Array2::<f64>::zeros((df.height(), df.width()));

    for (j, column) in df.get_columns().iter().enumerate() {
        let cast = column
            .cast(&DataType::Float64)
            .map_err(|e| polars_to_demand_error(&format!("Casting '{}'", column.name()), e))?;
        let values = cast
            .f64()
            .map_err(|e| polars_to_demand_error(&format!("Reading '{}'", column.name()), e))?;

        for (i, value) in values.into_iter().enumerate() {
            out[[i, j]] = value.ok_or_else(|| DataError::InvalidValue {
                column: column.name().to_string(),
                msg: format!("missing value in row {i}"),
            })?;
        }
    }
    Ok(out)
}

pub(crate) fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect()
}
