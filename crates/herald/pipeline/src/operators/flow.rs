//! Flow control.

use std::pin::Pin;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::{self, Sleep};

use super::Wake;
use crate::data::Data;
use crate::pipeline::{invalid, DataStream, Pipeline};

struct Throttle<V, O> {
    upstream: Option<DataStream<V, O>>,
    pending: Option<Data<V, O>>,
    deadline: Option<Pin<Box<Sleep>>>,
}

/// Trailing-edge throttle.
///
/// The first value after a quiet period opens a window of `period`; the
/// latest value seen when the window closes is emitted. A value still pending
/// when the upstream ends is emitted immediately.
pub fn rate_limit<V, O>(period: Duration) -> Pipeline<V, V, O>
where
    V: Send + 'static,
    O: Send + Sync + 'static,
{
    if period.is_zero() {
        return invalid("rate_limit", "period must be positive");
    }
    Pipeline::new("rate_limit", move |upstream: DataStream<V, O>| {
        let state = Throttle {
            upstream: Some(upstream),
            pending: None,
            deadline: None,
        };
        stream::unfold(state, move |mut st| async move {
            loop {
                let Some(upstream) = st.upstream.as_mut() else {
                    let pending = st.pending.take()?;
                    return Some((Ok(pending), st));
                };

                let wake = match st.deadline.as_mut() {
                    Some(deadline) => tokio::select! {
                        item = upstream.next() => Wake::Item(item),
                        _ = deadline.as_mut() => Wake::Timer,
                    },
                    None => Wake::Item(upstream.next().await),
                };

                match wake {
                    Wake::Item(Some(Ok(data))) => {
                        if st.deadline.is_none() {
                            st.deadline = Some(Box::pin(time::sleep(period)));
                        }
                        st.pending = Some(data);
                    }
                    Wake::Item(Some(Err(err))) => return Some((Err(err), st)),
                    Wake::Item(None) => {
                        st.upstream = None;
                        st.deadline = None;
                    }
                    Wake::Timer => {
                        st.deadline = None;
                        if let Some(pending) = st.pending.take() {
                            return Some((Ok(pending), st));
                        }
                    }
                }
            }
        })
        .boxed()
    })
}

/// Free-function form of [`Pipeline::on_error_retry`].
pub fn on_error_retry<V, R, O>(pipeline: Pipeline<V, R, O>) -> Pipeline<V, R, O>
where
    V: Send + 'static,
    R: Send + 'static,
    O: Send + Sync + 'static,
{
    pipeline.on_error_retry()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{timed, values};

    #[tokio::test(start_paused = true)]
    async fn test_emits_latest_per_window() {
        let throttle = rate_limit(Duration::from_millis(100));
        let upstream = timed("r1", vec![(0, 1), (10, 2), (40, 3), (100, 4)]);
        let out = values(throttle.attach(upstream)).await;
        assert_eq!(out, vec![3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_stream_emits_each_value() {
        let throttle = rate_limit(Duration::from_millis(50));
        let upstream = timed("r1", vec![(0, 1), (200, 2), (200, 3)]);
        let out = values(throttle.attach(upstream)).await;
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_value_flushed_at_end() {
        let throttle = rate_limit(Duration::from_secs(60));
        let upstream = timed("r1", vec![(0, 1), (5, 2)]);
        let out = values(throttle.attach(upstream)).await;
        assert_eq!(out, vec![2]);
    }
}
