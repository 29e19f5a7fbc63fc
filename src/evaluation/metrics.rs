//! Error metrics comparing predictions with observed ratings.

use crate::common::error::{ClientError, ClientResult};

fn check_aligned(predictions: &[f64], truth: &[f64]) -> ClientResult<()> {
    if predictions.len() != truth.len() {
        return Err(ClientError::internal(format!(
            "{} predictions for {} test rows",
            predictions.len(),
            truth.len()
        )));
    }
    if truth.is_empty() {
        return Err(ClientError::internal("test split is empty"));
    }
    Ok(())
}

pub fn root_mean_squared_error(predictions: &[f64], truth: &[f64]) -> ClientResult<f64> {
    check_aligned(predictions, truth)?;
    let sum: f64 = predictions
        .iter()
        .zip(truth)
        .map(|(p, t)| (p - t).powi(2))
        .sum();
    Ok((sum / truth.len() as f64).sqrt())
}

pub fn mean_absolute_error(predictions: &[f64], truth: &[f64]) -> ClientResult<f64> {
    check_aligned(predictions, truth)?;
    let sum: f64 = predictions.iter().zip(truth).map(|(p, t)| (p - t).abs()).sum();
    Ok(sum / truth.len() as f64)
}
