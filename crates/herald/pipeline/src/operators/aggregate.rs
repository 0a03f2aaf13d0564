//! Aggregations over windows of numeric values.
//!
//! Empty windows produce no output.

use crate::data::Data;
use crate::pipeline::{stateless, Pipeline};

fn aggregate<O, F>(stage: &'static str, f: F) -> Pipeline<Vec<f64>, f64, O>
where
    O: Send + Sync + 'static,
    F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
{
    stateless(stage, move |data: Data<Vec<f64>, O>| {
        if data.value.is_empty() {
            return None;
        }
        let result = f(&data.value);
        Some(Ok(data.with_value(result)))
    })
}

/// Arithmetic mean of the window.
pub fn avg<O>() -> Pipeline<Vec<f64>, f64, O>
where
    O: Send + Sync + 'static,
{
    aggregate("avg", |values| values.iter().sum::<f64>() / values.len() as f64)
}

/// Largest value of the window.
pub fn max<O>() -> Pipeline<Vec<f64>, f64, O>
where
    O: Send + Sync + 'static,
{
    aggregate("max", |values| values.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

/// Smallest value of the window.
pub fn min<O>() -> Pipeline<Vec<f64>, f64, O>
where
    O: Send + Sync + 'static,
{
    aggregate("min", |values| values.iter().copied().fold(f64::INFINITY, f64::min))
}
