//! Push sink backed by a tokio channel

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::push::PushSink;
use crate::error::{StreamError, StreamResult};
use crate::event::Failure;

/// Forwards values and failures into a bounded tokio channel.
///
/// A full channel makes `write` wait, which pauses the piped stream.
/// `finish` drops the sender so the receiving side sees the channel close.
pub struct ChannelSink<T> {
    tx: Option<mpsc::Sender<Result<T, Failure>>>,
}

impl<T: Send + 'static> ChannelSink<T> {
    pub fn new(tx: mpsc::Sender<Result<T, Failure>>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink and the receiver it feeds.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Result<T, Failure>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    async fn send(&mut self, item: Result<T, Failure>) -> StreamResult<()> {
        match &self.tx {
            Some(tx) => tx.send(item).await.map_err(|_| StreamError::SinkClosed),
            None => Err(StreamError::SinkClosed),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> PushSink<T> for ChannelSink<T> {
    async fn write(&mut self, value: T) -> StreamResult<()> {
        self.send(Ok(value)).await
    }

    async fn error(&mut self, failure: Failure) -> StreamResult<()> {
        self.send(Err(failure)).await
    }

    async fn finish(&mut self) -> StreamResult<()> {
        self.tx.take();
        Ok(())
    }
}
