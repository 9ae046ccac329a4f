use std::sync::Arc;

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    error::{DataError, DemandResult, polars_to_demand_error},
    report::io::{Report, ReportName, ToSchema},
};

/// Which slice of a fold a score was computed on.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Train,
    Val,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    PartialOrd,
    Ord,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum EvaluationCol {
    /// Unnamed leading row index.
    #[strum(serialize = "")]
    RowIndex,
    Scores,
    Step,
    Fold,
}

impl From<EvaluationCol> for PlSmallStr {
    fn from(value: EvaluationCol) -> Self {
        let name: &'static str = value.into();
        name.into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRow {
    pub fold: u32,
    pub step: Step,
    pub score: f64,
}

/// Per-fold R² scores, two rows (`train`, `val`) per fold.
#[derive(Debug, Clone)]
pub struct EvaluationTable {
    df: DataFrame,
}

impl EvaluationTable {
    pub fn from_rows(rows: &[EvaluationRow]) -> DemandResult<Self> {
        let scores: Vec<f64> = rows.iter().map(|r| r.score).collect();
        let steps: Vec<&'static str> = rows.iter().map(|r| r.step.into()).collect();
        let folds: Vec<u32> = rows.iter().map(|r| r.fold).collect();

        let df = df![
            EvaluationCol::Scores.to_string() => scores,
            EvaluationCol::Step.to_string() => steps,
            EvaluationCol::Fold.to_string() => folds,
        ]
        .and_then(|df| df.with_row_index(EvaluationCol::RowIndex.into(), None))
        .map_err(|e| polars_to_demand_error("Building evaluation table", e))?;

        Ok(Self { df })
    }

    pub fn rows(&self) -> DemandResult<Vec<EvaluationRow>> {
        let get = |c: EvaluationCol| {
            self.df
                .column(c.into())
                .map_err(|e| polars_to_demand_error("Reading evaluation table", e))
        };
        let scores = get(EvaluationCol::Scores)?
            .f64()
            .map_err(|e| polars_to_demand_error("Reading scores", e))?;
        let steps = get(EvaluationCol::Step)?
            .str()
            .map_err(|e| polars_to_demand_error("Reading steps", e))?;
        let folds = get(EvaluationCol::Fold)?
            .u32()
            .map_err(|e| polars_to_demand_error("Reading folds", e))?;

        itertools::izip!(scores, steps, folds)
            .map(|(score, step, fold)| -> DemandResult<EvaluationRow> {
                let invalid = |msg: &str| DataError::InvalidValue {
                    column: "evaluation".to_string(),
                    msg: msg.to_string(),
                };
                let step = step
                    .and_then(|s| s.parse::<Step>().ok())
                    .ok_or_else(|| invalid("unknown step"))?;
                Ok(EvaluationRow {
                    fold: fold.ok_or_else(|| invalid("missing fold"))?,
                    step,
                    score: score.ok_or_else(|| invalid("missing score"))?,
                })
            })
            .collect()
    }

    /// Mean score over all folds for one step.
    pub fn mean_score(&self, step: Step) -> DemandResult<Option<f64>> {
        let scores = self
            .rows()?
            .into_iter()
            .filter(|r| r.step == step)
            .map(|r| r.score)
            .collect::<Vec<_>>();
        Ok((!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64))
    }

    pub fn len(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }
}

impl Report for EvaluationTable {
    fn as_df(&self) -> &DataFrame {
        &self.df
    }

    /// The row-index column has an empty name and must stay unquoted.
    fn csv_options(&self) -> CsvWriterOptions {
        let mut opts = CsvWriterOptions::default();
        opts.serialize_options.quote_style = QuoteStyle::Never;
        opts
    }
}

impl ReportName for EvaluationTable {
    fn base_name(&self) -> String {
        "evaluate".to_string()
    }
}

impl ToSchema for EvaluationTable {
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = EvaluationCol::iter()
            .map(|col| {
                let dtype = match col {
                    EvaluationCol::RowIndex => IDX_DTYPE,
                    EvaluationCol::Scores => DataType::Float64,
                    EvaluationCol::Step => DataType::String,
                    EvaluationCol::Fold => DataType::UInt32,
                };
                Field::new(col.into(), dtype)
            })
            .collect();

        Arc::new(Schema::from_iter(fields))
    }
}
