//! Window operators: group consecutive values into batches.

use std::collections::VecDeque;
use std::mem;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use super::Wake;
use crate::data::Data;
use crate::pipeline::{invalid, stateful, DataStream, Pipeline};

/// Tumbling window of `size` values.
pub fn fixed_size<V, O>(size: usize) -> Pipeline<V, Vec<V>, O>
where
    V: Send + 'static,
    O: Send + Sync + 'static,
{
    if size == 0 {
        return invalid("fixed_size", "window size must be positive");
    }
    stateful(
        "fixed_size",
        move || Vec::with_capacity(size),
        move |buffer: &mut Vec<Data<V, O>>, data: Data<V, O>| {
            buffer.push(data);
            if buffer.len() < size {
                return None;
            }
            Data::window(mem::take(buffer)).map(Ok)
        },
    )
}

/// Sliding window over the last `size` values, emitted once full and then
/// on every new value.
pub fn fixed_size_sliding<V, O>(size: usize) -> Pipeline<V, Vec<V>, O>
where
    V: Clone + Send + 'static,
    O: Send + Sync + 'static,
{
    if size == 0 {
        return invalid("fixed_size_sliding", "window size must be positive");
    }
    stateful(
        "fixed_size_sliding",
        move || VecDeque::with_capacity(size),
        move |buffer: &mut VecDeque<V>, data: Data<V, O>| {
            buffer.push_back(data.value.clone());
            if buffer.len() > size {
                buffer.pop_front();
            }
            if buffer.len() < size {
                return None;
            }
            let window: Vec<V> = buffer.iter().cloned().collect();
            Some(Ok(data.with_value(window)))
        },
    )
}

struct TimeWindow<V, O> {
    upstream: Option<DataStream<V, O>>,
    ticker: Option<Interval>,
    buffer: Vec<Data<V, O>>,
}

/// Tumbling window by wall clock.
///
/// Whatever arrived since the previous boundary is emitted at each boundary;
/// boundaries without values emit nothing. Remaining values are flushed when
/// the upstream ends.
pub fn fixed_time<V, O>(period: Duration) -> Pipeline<V, Vec<V>, O>
where
    V: Send + 'static,
    O: Send + Sync + 'static,
{
    if period.is_zero() {
        return invalid("fixed_time", "window period must be positive");
    }
    Pipeline::new("fixed_time", move |upstream: DataStream<V, O>| {
        let state = TimeWindow {
            upstream: Some(upstream),
            ticker: None,
            buffer: Vec::new(),
        };
        stream::unfold(state, move |mut st| async move {
            loop {
                let wake = {
                    let upstream = st.upstream.as_mut()?;
                    let ticker = st.ticker.get_or_insert_with(|| {
                        let mut ticker = time::interval_at(Instant::now() + period, period);
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        ticker
                    });
                    tokio::select! {
                        item = upstream.next() => Wake::Item(item),
                        _ = ticker.tick() => Wake::Timer,
                    }
                };

                match wake {
                    Wake::Item(Some(Ok(data))) => st.buffer.push(data),
                    Wake::Item(Some(Err(err))) => return Some((Err(err), st)),
                    Wake::Item(None) => {
                        st.upstream = None;
                        let window = Data::window(mem::take(&mut st.buffer))?;
                        return Some((Ok(window), st));
                    }
                    Wake::Timer => {
                        if let Some(window) = Data::window(mem::take(&mut st.buffer)) {
                            return Some((Ok(window), st));
                        }
                    }
                }
            }
        })
        .boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::pipeline::test_support::{feed, run, timed, values};

    #[tokio::test]
    async fn test_fixed_size_batches() {
        let out = run(&fixed_size(2), vec![1, 2, 3, 4, 5]).await;
        assert_eq!(out, vec![vec![1, 2], vec![3, 4]]);
    }

    #[tokio::test]
    async fn test_fixed_size_zero_is_rejected() {
        let out: Vec<_> = fixed_size::<i32, ()>(0)
            .attach(feed("r1", vec![1]))
            .collect()
            .await;
        assert!(matches!(out[0], Err(PipelineError::InvalidOperator { .. })));
    }

    #[tokio::test]
    async fn test_sliding_emits_once_full() {
        let out = run(&fixed_size_sliding(3), vec![1, 2, 3, 4, 5]).await;
        assert_eq!(out, vec![vec![1, 2, 3], vec![2, 3, 4], vec![3, 4, 5]]);
    }

    #[tokio::test]
    async fn test_sliding_pair() {
        let out = run(&fixed_size_sliding(2), vec![0.4, 0.6]).await;
        assert_eq!(out, vec![vec![0.4, 0.6]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_time_flushes_at_boundaries() {
        let window = fixed_time(Duration::from_millis(100));
        let upstream = timed("r1", vec![(0, 1), (10, 2), (120, 3)]);
        let out = values(window.attach(upstream)).await;
        assert_eq!(out, vec![vec![1, 2], vec![3]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_time_skips_empty_windows() {
        let window = fixed_time(Duration::from_millis(100));
        let upstream = timed("r1", vec![(0, 1), (250, 2)]);
        let out = values(window.attach(upstream)).await;
        assert_eq!(out, vec![vec![1], vec![2]]);
    }

    #[tokio::test]
    async fn test_fixed_time_zero_is_rejected() {
        let out: Vec<_> = fixed_time::<i32, ()>(Duration::ZERO)
            .attach(feed("r1", vec![1]))
            .collect()
            .await;
        assert!(out[0].is_err());
    }
}
