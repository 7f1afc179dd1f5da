//! Terminal consumers
//!
//! Each of these drives the pipeline to its end under the async pump loop,
//! whether or not the pipeline could also be forced synchronously.

use super::core::{ExStream, StreamState};
use crate::connectors::push::PushSink;
use crate::error::StreamResult;
use crate::event::{Event, Failure};

impl<T: Send + 'static> ExStream<T> {
    /// Collects every value.
    ///
    /// Unrecovered failures are handed to the error observers, or retained
    /// until one subscribes; they never end up in the result.
    pub async fn to_array(mut self) -> Vec<T> {
        let mut values = Vec::new();
        loop {
            match self.pull().await {
                Event::Value(v) => values.push(v),
                Event::Failure(failure) => self.surface(failure),
                Event::End => break,
            }
        }
        values
    }

    /// Calls `f` with every value. Failures are treated as in [`ExStream::to_array`].
    pub async fn each<F>(mut self, mut f: F)
    where
        F: FnMut(T),
    {
        loop {
            match self.pull().await {
                Event::Value(v) => f(v),
                Event::Failure(failure) => self.surface(failure),
                Event::End => break,
            }
        }
    }

    /// Collects every value, or stops at the first unrecovered failure.
    ///
    /// The failure is returned as is, so it still shares its underlying error
    /// with the failure that was emitted. It is not also sent to the error
    /// observers.
    pub async fn to_promise(mut self) -> Result<Vec<T>, Failure> {
        let mut values = Vec::new();
        loop {
            match self.pull().await {
                Event::Value(v) => values.push(v),
                Event::Failure(failure) if failure.is_recovered() => {}
                Event::Failure(failure) => {
                    log::debug!("to_promise rejected: {}", failure);
                    return Err(failure);
                }
                Event::End => return Ok(values),
            }
        }
    }

    /// Runs the pipeline for its side effects, discarding values.
    ///
    /// Failures go to the observers; anything still retained once the
    /// stream has ended is logged as an error.
    pub async fn resume(mut self) {
        loop {
            match self.pull().await {
                Event::Value(_) => {}
                Event::Failure(failure) => self.surface(failure),
                Event::End => break,
            }
        }
        self.hub().report_retained();
    }

    /// Writes the stream into an external sink.
    ///
    /// The stream is not pulled while a write is pending. Each unrecovered
    /// failure is passed to `sink.error` on its own, and `sink.finish` is
    /// called once after the last event.
    ///
    /// # Errors
    ///
    /// Whatever the sink returns; the stream is dropped at that point.
    pub async fn pipe<S>(mut self, sink: &mut S) -> StreamResult<()>
    where
        S: PushSink<T> + ?Sized,
    {
        loop {
            match self.pull().await {
                Event::Value(v) => {
                    self.set_state(StreamState::Paused);
                    sink.write(v).await?;
                    self.set_state(StreamState::Idle);
                }
                Event::Failure(failure) if failure.is_recovered() => {}
                Event::Failure(failure) => sink.error(failure).await?,
                Event::End => break,
            }
        }
        log::trace!("pipe finished");
        sink.finish().await
    }
}
