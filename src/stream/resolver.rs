//! Forced synchronous evaluation
//!
//! A pipeline made only of synchronous stages never has to wait, so it can
//! be driven to completion in place with a no-op waker. Any stage that can
//! suspend taints the pipeline when it is applied, and forcing a tainted
//! pipeline is a usage error.

use std::task::{Context, Poll};

use futures::task::noop_waker;

use super::core::ExStream;
use crate::error::{StreamError, StreamResult};
use crate::event::Event;

impl<T: Send + 'static> ExStream<T> {
    /// Evaluates the whole pipeline synchronously and returns its values.
    ///
    /// Failures go to the error observers if any are registered. Without
    /// observers the first unrecovered failure aborts evaluation and is
    /// returned as [`StreamError::Unhandled`].
    ///
    /// # Errors
    ///
    /// [`StreamError::RequiresAsync`] if any stage can suspend.
    pub fn values(mut self) -> StreamResult<Vec<T>> {
        if self.requires_async() {
            return Err(StreamError::RequiresAsync);
        }

        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut values = Vec::new();
        loop {
            match self.poll_pull(&mut cx) {
                Poll::Ready(Event::Value(v)) => values.push(v),
                Poll::Ready(Event::Failure(failure)) => {
                    if failure.is_recovered() {
                        continue;
                    }
                    if !self.hub().has_observers() {
                        return Err(StreamError::Unhandled(failure));
                    }
                    self.surface(failure);
                }
                Poll::Ready(Event::End) => return Ok(values),
                Poll::Pending => {
                    // A sub-stream (e.g. inside merge) turned out to suspend.
                    log::debug!("synchronous evaluation hit a pending stage");
                    return Err(StreamError::RequiresAsync);
                }
            }
        }
    }

    /// Evaluates the pipeline synchronously and returns its only value.
    ///
    /// # Errors
    ///
    /// Everything [`ExStream::values`] returns, and
    /// [`StreamError::NotSingleValue`] unless exactly one value was produced.
    pub fn value(self) -> StreamResult<T> {
        let mut values = self.values()?;
        if values.len() != 1 {
            return Err(StreamError::NotSingleValue {
                count: values.len(),
            });
        }
        values
            .pop()
            .ok_or(StreamError::NotSingleValue { count: 0 })
    }
}
