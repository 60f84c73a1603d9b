//! Fan-in of several event streams into one
//!
//! Each source is forwarded by its own task into a shared bounded channel,
//! so items interleave by availability while every source keeps its own
//! order. A source's error is forwarded as its last item. Dropping the
//! merged stream makes the forwarders stop at their next send.

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Merge `sources` into one stream that ends once every source has ended
pub fn fan_in<S, T, E>(sources: Vec<S>, buffer: usize) -> ReceiverStream<Result<T, E>>
where
    S: Stream<Item = Result<T, E>> + Send + Unpin + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer.max(1));

    for (index, mut source) in sources.into_iter().enumerate() {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(item) = source.next().await {
                let failed = item.is_err();
                if tx.send(item).await.is_err() {
                    tracing::debug!(source = index, "merged stream dropped, forwarder stopping");
                    return;
                }
                if failed {
                    return;
                }
            }
        });
    }

    ReceiverStream::new(rx)
}
