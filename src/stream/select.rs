//! Merge: flattening a stream of streams
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;

use super::constructors::from_iter;
use super::core::ExStream;
use super::observers::ErrorHub;
use crate::event::Event;

/// Stage body of [`ExStream::merge`].
///
/// Every sub-stream the outer stream has produced so far is pulled in turn,
/// starting after the one that delivered last, so a busy sub-stream cannot
/// starve the others.
///
/// Each sub-stream's error observers are joined to the merged pipeline when
/// the sub-stream is opened.
pub struct Merge<T> {
    outer: Option<ExStream<ExStream<T>>>,
    active: Vec<ExStream<T>>,
    cursor: usize,
    hub: Arc<ErrorHub>,
}

impl<T: Send + 'static> Merge<T> {
    fn new(outer: ExStream<ExStream<T>>) -> Self {
        Self {
            hub: Arc::clone(outer.hub()),
            outer: Some(outer),
            active: Vec::new(),
            cursor: 0,
        }
    }
}

impl<T> Unpin for Merge<T> {}

impl<T: Send + 'static> Stream for Merge<T> {
    type Item = Event<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        // Open every sub-stream that is already available.
        while let Some(outer) = &mut this.outer {
            match outer.poll_pull(cx) {
                Poll::Ready(Event::Value(sub)) => {
                    this.hub.join(Arc::clone(sub.hub()));
                    this.active.push(sub);
                }
                Poll::Ready(Event::Failure(e)) => return Poll::Ready(Some(Event::Failure(e))),
                Poll::Ready(Event::End) => this.outer = None,
                Poll::Pending => break,
            }
        }

        let len = this.active.len();
        let mut ended = Vec::new();
        let mut ready = None;
        for offset in 0..len {
            let index = (this.cursor + offset) % len;
            match this.active[index].poll_pull(cx) {
                Poll::Ready(Event::End) => ended.push(index),
                Poll::Ready(event) => {
                    ready = Some((index, event));
                    break;
                }
                Poll::Pending => {}
            }
        }

        ended.sort_unstable();
        for &index in ended.iter().rev() {
            this.active.remove(index);
        }
        if !ended.is_empty() {
            log::trace!("merge: {} sub-stream(s) ended, {} left", ended.len(), this.active.len());
        }

        if let Some((index, event)) = ready {
            let shift = ended.iter().filter(|&&e| e < index).count();
            this.cursor = index - shift + 1;
            return Poll::Ready(Some(event));
        }
        if this.outer.is_none() && this.active.is_empty() {
            return Poll::Ready(None);
        }
        Poll::Pending
    }
}

impl<T: Send + 'static> ExStream<ExStream<T>> {
    /// Flattens a stream of streams, interleaving sub-streams as their events
    /// become available.
    ///
    /// A failure from one sub-stream is forwarded without ending the others.
    /// The merged stream ends once the outer stream and every sub-stream have
    /// ended. Error observers registered on a sub-stream keep receiving its
    /// unhandled failures.
    pub fn merge(self) -> ExStream<T> {
        self.stage(false, Merge::new)
    }
}

impl<T: Send + 'static> ExStream<T> {
    /// Merges this stream with `other`.
    ///
    /// Error observers of both sides carry over to the merged stream, along
    /// with any failures either side has retained.
    pub fn merge_with(self, other: ExStream<T>) -> ExStream<T> {
        let suspends = self.requires_async() || other.requires_async();
        let left = Arc::clone(self.hub());
        let right = Arc::clone(other.hub());
        let outer = from_iter(vec![self, other]);
        outer.hub().join(left);
        outer.hub().join(right);
        outer.stage(suspends, Merge::new)
    }
}
