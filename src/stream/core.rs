//! The stream engine: one node of a pull-driven pipeline
//!
//! Every [`ExStream`] owns its upstream producer, a buffer of events the
//! producer has handed over but nobody has pulled yet, and a small lifecycle
//! state machine. Demand flows strictly from consumer to producer: a node only
//! asks its source for more once its buffer is empty and a pull is
//! outstanding. Each pull delivers exactly one [`Event`].
//!
//! Pulls are futures, so the same pipeline can be driven by an async consumer
//! or forced synchronously (see `resolver.rs`) when no stage can suspend.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::channel::mpsc;
use futures::stream::StreamExt;
use futures_core::Stream;

use super::constructors::{Pulled, Source};
use super::observers::{ErrorHandle, ErrorHub, PauseHandle, ValueObservers};
use crate::event::{Event, Failure};

/// Lifecycle of a stream node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Nothing outstanding
    Idle,
    /// A pull is waiting on the upstream producer
    Pulling,
    /// Pulling is suspended through a [`PauseHandle`]
    Paused,
    /// `End` has been delivered
    Ended,
    /// The producer broke the protocol; the stream is closed
    Fatal,
}

/// Events handed over by a producer but not yet delivered downstream.
///
/// Enforces the end-of-stream protocol: once `End` is queued, anything else a
/// producer emits is reported once and dropped.
pub(crate) struct Buffer<T> {
    queue: VecDeque<Event<T>>,
    end_seen: bool,
    violated: bool,
}

impl<T> Buffer<T> {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            end_seen: false,
            violated: false,
        }
    }

    pub(crate) fn push(&mut self, event: Event<T>) {
        if self.end_seen {
            if !self.violated {
                log::error!("protocol violation: event emitted after end of stream; ignoring");
            }
            self.violated = true;
            return;
        }
        if event.is_end() {
            self.end_seen = true;
        }
        self.queue.push_back(event);
    }

    pub(crate) fn end_seen(&self) -> bool {
        self.end_seen
    }

    fn pop(&mut self) -> Option<Event<T>> {
        self.queue.pop_front()
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}

/// A lazy stream of [`Event`]s.
///
/// Built from a source (see the constructors in this module's parent) and
/// extended by combinators, each of which consumes the node it is applied to
/// and returns a new node that pulls from it.
pub struct ExStream<T> {
    source: Source<T>,
    buffer: Buffer<T>,
    state: StreamState,
    requires_async: bool,
    hub: Arc<ErrorHub>,
    fanout: ValueObservers<T>,
    pause: Option<PauseHandle>,
}

// No field is structurally pinned.
impl<T> Unpin for ExStream<T> {}

impl<T: Send + 'static> ExStream<T> {
    pub(crate) fn from_source(source: Source<T>, requires_async: bool) -> Self {
        Self::with_hub(source, requires_async, Arc::new(ErrorHub::default()))
    }

    fn with_hub(source: Source<T>, requires_async: bool, hub: Arc<ErrorHub>) -> Self {
        Self {
            source,
            buffer: Buffer::new(),
            state: StreamState::Idle,
            requires_async,
            hub,
            fanout: ValueObservers::default(),
            pause: None,
        }
    }

    /// Appends a stage to the pipeline.
    ///
    /// `build` receives this node and returns the stage body as a stream of
    /// events. `suspends` marks stages that may wait on timers or futures; it
    /// taints the rest of the pipeline as requiring asynchronous evaluation.
    pub(crate) fn stage<U, S, F>(self, suspends: bool, build: F) -> ExStream<U>
    where
        U: Send + 'static,
        S: Stream<Item = Event<U>> + Send + 'static,
        F: FnOnce(ExStream<T>) -> S,
    {
        let requires_async = self.requires_async || suspends;
        let hub = Arc::clone(&self.hub);
        ExStream::with_hub(Source::Stream(build(self).boxed()), requires_async, hub)
    }

    /// Pulls the next event.
    ///
    /// Resolves to exactly one event per call, in emission order. After `End`
    /// every further pull resolves to `End` without touching the upstream.
    pub fn pull(&mut self) -> Pull<'_, T> {
        Pull { stream: self }
    }

    /// Poll-level form of [`ExStream::pull`].
    pub fn poll_pull(&mut self, cx: &mut Context<'_>) -> Poll<Event<T>> {
        if let Some(pause) = &self.pause {
            if pause.poll_ready(cx).is_pending() {
                if self.state != StreamState::Paused {
                    log::trace!("stream paused");
                }
                self.state = StreamState::Paused;
                return Poll::Pending;
            }
        }

        loop {
            if let Some(event) = self.buffer.pop() {
                return Poll::Ready(self.deliver(event));
            }
            if matches!(self.state, StreamState::Ended | StreamState::Fatal) {
                return Poll::Ready(Event::End);
            }

            self.state = StreamState::Pulling;
            match self.source.poll_pull(cx, &mut self.buffer) {
                Poll::Ready(Pulled::Ready) => {}
                Poll::Ready(Pulled::Switch(next)) => {
                    log::debug!("generator switched to another stream");
                    self.requires_async |= next.requires_async;
                    self.source = Source::Switched(Box::new(next));
                }
                Poll::Pending => {
                    return Poll::Pending;
                }
            }
        }
    }

    fn deliver(&mut self, event: Event<T>) -> Event<T> {
        if event.is_end() {
            if self.buffer.violated {
                self.state = StreamState::Fatal;
            } else {
                self.state = StreamState::Ended;
            }
            // Releases whatever the producer holds, e.g. closes a push source.
            self.source = Source::Exhausted;
            log::trace!("stream ended");
        } else {
            self.state = StreamState::Idle;
        }
        self.fanout.broadcast(&event);
        event
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Used by consumers that hold the stream while downstream is busy.
    pub(crate) fn set_state(&mut self, state: StreamState) {
        if !self.is_ended() {
            self.state = state;
        }
    }

    /// Whether any stage of this pipeline can suspend.
    pub fn requires_async(&self) -> bool {
        self.requires_async
    }

    /// Number of events buffered in this node and not yet pulled.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_ended(&self) -> bool {
        matches!(self.state, StreamState::Ended | StreamState::Fatal)
    }

    /// Registers an observer for unhandled failures.
    ///
    /// The observer is shared by the whole pipeline, so it also sees failures
    /// that reach the end of stages appended later.
    pub fn on_error<F>(self, observer: F) -> Self
    where
        F: FnMut(&Failure) + Send + 'static,
    {
        self.hub.subscribe(Box::new(observer));
        self
    }

    /// A handle on this pipeline's error observers that outlives the stream.
    pub fn error_handle(&self) -> ErrorHandle {
        ErrorHandle::new(Arc::clone(&self.hub))
    }

    /// A handle that can suspend and resume pulling on this node.
    pub fn pause_handle(&mut self) -> PauseHandle {
        self.pause.get_or_insert_with(PauseHandle::default).clone()
    }

    /// A copy of every event this node delivers.
    ///
    /// The returned stream does not drive demand; it only sees events pulled
    /// by this stream's own consumer.
    pub fn observe(&mut self) -> ExStream<T>
    where
        T: Clone,
    {
        let (tx, rx) = mpsc::unbounded();
        self.fanout.attach(tx);
        ExStream::from_source(Source::Stream(rx.boxed()), true)
    }

    pub fn observer_count(&self) -> usize {
        self.fanout.len()
    }

    pub(crate) fn hub(&self) -> &Arc<ErrorHub> {
        &self.hub
    }

    /// Hands a failure that reached a terminal consumer to the observers.
    pub(crate) fn surface(&self, failure: Failure) {
        if failure.is_recovered() {
            log::debug!("skipping recovered failure: {}", failure);
            return;
        }
        self.hub.notify(failure);
    }
}

/// Future returned by [`ExStream::pull`]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Pull<'a, T> {
    stream: &'a mut ExStream<T>,
}

impl<T: Send + 'static> Future for Pull<'_, T> {
    type Output = Event<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.stream.poll_pull(cx)
    }
}

/// `End` maps to `None`; failures surface as `Err` items.
impl<T: Send + 'static> Stream for ExStream<T> {
    type Item = Result<T, Failure>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_pull(cx).map(Event::into_result)
    }
}

impl<T: Send + 'static> std::fmt::Debug for ExStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExStream")
            .field("state", &self.state)
            .field("buffered", &self.buffer.len())
            .field("requires_async", &self.requires_async)
            .finish()
    }
}
