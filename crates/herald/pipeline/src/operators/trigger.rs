//! Threshold triggers.
//!
//! Each trigger compares a value with its predecessor and emits the newer
//! value when the condition holds. The very first value only primes the
//! comparison.

use crate::data::Data;
use crate::pipeline::{stateful, Pipeline};

fn pairwise<O, F>(stage: &'static str, threshold: f64, fires: F) -> Pipeline<f64, f64, O>
where
    O: Send + Sync + 'static,
    F: Fn(f64, f64) -> bool + Send + Sync + 'static,
{
    stateful(
        stage,
        || None::<f64>,
        move |previous: &mut Option<f64>, data: Data<f64, O>| {
            let current = data.value;
            let prior = previous.replace(current)?;
            if !fires(prior, current) {
                return None;
            }
            let detail = format!("{prior} -> {current} (threshold {threshold})");
            Some(Ok(data.traced(stage, detail)))
        },
    )
}

/// Fires when the value crosses `threshold` upwards: `prev <= t < curr`.
pub fn rising_edge<O>(threshold: f64) -> Pipeline<f64, f64, O>
where
    O: Send + Sync + 'static,
{
    pairwise("rising_edge", threshold, move |prev, curr| {
        prev <= threshold && threshold < curr
    })
}

/// Fires when the value crosses `threshold` downwards: `prev >= t > curr`.
pub fn falling_edge<O>(threshold: f64) -> Pipeline<f64, f64, O>
where
    O: Send + Sync + 'static,
{
    pairwise("falling_edge", threshold, move |prev, curr| {
        prev >= threshold && threshold > curr
    })
}

/// Fires when the value grew by at least `threshold`.
pub fn increase<O>(threshold: f64) -> Pipeline<f64, f64, O>
where
    O: Send + Sync + 'static,
{
    pairwise("increase", threshold, move |prev, curr| curr - prev >= threshold)
}

/// Fires when the value dropped by at least `threshold`.
pub fn decrease<O>(threshold: f64) -> Pipeline<f64, f64, O>
where
    O: Send + Sync + 'static,
{
    pairwise("decrease", threshold, move |prev, curr| prev - curr >= threshold)
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::pipeline::test_support::{feed, run};

    #[tokio::test]
    async fn test_rising_edge() {
        assert_eq!(run(&rising_edge(0.5), vec![0.4, 0.6]).await, vec![0.6]);
        assert!(run(&rising_edge(0.5), vec![0.6, 0.4]).await.is_empty());
    }

    #[tokio::test]
    async fn test_falling_edge() {
        assert_eq!(run(&falling_edge(0.5), vec![0.6, 0.4]).await, vec![0.4]);
        assert!(run(&falling_edge(0.5), vec![0.4, 0.6]).await.is_empty());
    }

    #[tokio::test]
    async fn test_threshold_ties() {
        // Equal to threshold counts as below for rising, above for falling.
        assert_eq!(run(&rising_edge(0.5), vec![0.5, 0.6]).await, vec![0.6]);
        assert!(run(&rising_edge(0.5), vec![0.4, 0.5]).await.is_empty());
        assert_eq!(run(&falling_edge(0.5), vec![0.5, 0.4]).await, vec![0.4]);
        assert!(run(&falling_edge(0.5), vec![0.6, 0.5]).await.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_crossings() {
        let out = run(&rising_edge(1.0), vec![0.0, 2.0, 0.0, 2.0, 3.0]).await;
        assert_eq!(out, vec![2.0, 2.0]);
    }

    #[tokio::test]
    async fn test_increase_and_decrease() {
        assert_eq!(run(&increase(10.0), vec![5.0, 20.0, 25.0]).await, vec![20.0]);
        assert_eq!(run(&decrease(10.0), vec![25.0, 20.0, 5.0]).await, vec![5.0]);
    }

    #[tokio::test]
    async fn test_trigger_records_trace() {
        let out: Vec<_> = rising_edge(0.5)
            .attach(feed("r1", vec![0.4, 0.6]))
            .collect()
            .await;
        let data = out[0].as_ref().unwrap();
        assert_eq!(data.trace[0].stage, "rising_edge");
        assert!(data.trace[0].detail.contains("0.4 -> 0.6"));
    }

    #[tokio::test]
    async fn test_trace_holds_only_trigger_entries() {
        let pipeline = crate::operators::window::fixed_size(2)
            .then(crate::operators::aggregate::avg())
            .then(rising_edge(0.5));
        let out: Vec<_> = pipeline
            .attach(feed("r1", vec![0.2, 0.4, 0.6, 0.8]))
            .collect()
            .await;
        assert_eq!(out.len(), 1);
        let data = out[0].as_ref().unwrap();
        let stages: Vec<&str> = data.trace.iter().map(|entry| entry.stage.as_str()).collect();
        assert_eq!(stages, vec!["rising_edge"]);
    }
}
