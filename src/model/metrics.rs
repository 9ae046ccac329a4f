use ndarray::{ArrayView2, Axis, Zip};

use crate::error::{DemandResult, ModelError};

/// Coefficient of determination, averaged uniformly over output columns.
///
/// A column with zero variance in `y_true` scores 1.0 when predicted exactly
/// and 0.0 otherwise.
pub fn r2_score(y_true: ArrayView2<f64>, y_pred: ArrayView2<f64>) -> DemandResult<f64> {
    if y_true.dim() != y_pred.dim() {
        return Err(ModelError::Shape(format!(
            "r2 inputs differ: {:?} vs {:?}",
            y_true.dim(),
            y_pred.dim()
        ))
        .into());
    }
    let (rows, outputs) = y_true.dim();
    if rows == 0 || outputs == 0 {
        return Err(ModelError::Shape("r2 needs at least one sample and one output".into()).into());
    }

    let total: f64 = y_true
        .axis_iter(Axis(1))
        .zip(y_pred.axis_iter(Axis(1)))
        .map(|(truth, pred)| {
            let mean = truth.sum() / rows as f64;
            let mut ss_res = 0.0;
            let mut ss_tot = 0.0;
            Zip::from(&truth).and(&pred).for_each(|&t, &p| {
                ss_res += (t - p).powi(2);
                ss_tot += (t - mean).powi(2);
            });

            match (ss_tot == 0.0, ss_res == 0.0) {
                (true, true) => 1.0,
                (true, false) => 0.0,
                _ => 1.0 - ss_res / ss_tot,
            }
        })
        .sum();

    Ok(total / outputs as f64)
}
