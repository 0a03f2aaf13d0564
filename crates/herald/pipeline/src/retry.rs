//! Resubscribe-on-error plumbing behind [`Pipeline::on_error_retry`](crate::Pipeline::on_error_retry).
//!
//! The upstream is shared behind an async mutex and pulled lazily by the
//! current inner attachment. When the inner stream yields an error the
//! attachment is dropped and a new one is built from the factory, so operator
//! state restarts from scratch while the upstream keeps its position.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::pipeline::{DataStream, Factory};

type SharedUpstream<V, O> = Arc<Mutex<DataStream<V, O>>>;

struct Resubscribe<V, R, O> {
    upstream: SharedUpstream<V, O>,
    output: DataStream<R, O>,
    factory: Factory<V, R, O>,
    label: Arc<str>,
    restarts: u64,
}

impl<V, R, O> Resubscribe<V, R, O>
where
    V: Send + 'static,
    R: Send + 'static,
    O: Send + Sync + 'static,
{
    fn new(upstream: DataStream<V, O>, factory: Factory<V, R, O>, label: Arc<str>) -> Self {
        let upstream = Arc::new(Mutex::new(upstream.fuse().boxed()));
        let output = factory(Self::input(&upstream));
        Self {
            upstream,
            output,
            factory,
            label,
            restarts: 0,
        }
    }

    /// A view of the shared upstream for one attachment.
    fn input(upstream: &SharedUpstream<V, O>) -> DataStream<V, O> {
        stream::unfold(Arc::clone(upstream), |upstream| async move {
            let item = upstream.lock().await.next().await;
            item.map(|item| (item, upstream))
        })
        .boxed()
    }

    fn restart(&mut self) {
        self.restarts += 1;
        self.output = (self.factory)(Self::input(&self.upstream));
    }
}

/// Attach `factory` to `upstream`, rebuilding it whenever it yields an error.
pub(crate) fn resubscribing<V, R, O>(
    upstream: DataStream<V, O>,
    factory: Factory<V, R, O>,
    label: Arc<str>,
) -> DataStream<R, O>
where
    V: Send + 'static,
    R: Send + 'static,
    O: Send + Sync + 'static,
{
    let state = Resubscribe::new(upstream, factory, label);

    stream::unfold(state, |mut st| async move {
        loop {
            match st.output.next().await {
                Some(Ok(data)) => return Some((Ok(data), st)),
                Some(Err(err)) => {
                    warn!(
                        pipeline = %st.label,
                        restarts = st.restarts + 1,
                        error = %err,
                        "Pipeline failed, resubscribing"
                    );
                    st.restart();
                }
                None => {
                    debug!(pipeline = %st.label, restarts = st.restarts, "Pipeline completed");
                    return None;
                }
            }
        }
    })
    .boxed()
}
