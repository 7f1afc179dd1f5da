//! Source adapters: every kind of producer a pipeline can start from
//!
//! The accepted kinds form a closed set, resolved once when the stream is
//! built: a synchronous sequence, an asynchronous sequence, a generator
//! function, a single deferred value, or an external push source. Anything
//! else does not type-check.

use std::future::Future;
use std::task::{Context, Poll};

use futures::future::FutureExt;
use futures::stream::{BoxStream, StreamExt};
use futures_core::future::BoxFuture;
use futures_core::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::core::{Buffer, ExStream};
use crate::connectors::push::{PushAdapter, PushSource};
use crate::error::BoxError;
use crate::event::{Event, Failure};

type GeneratorFn<T> = Box<dyn FnMut(&mut Emitter<'_, T>) -> Next<T> + Send>;

/// The producer behind a stream node.
pub(crate) enum Source<T> {
    Iter(Box<dyn Iterator<Item = T> + Send>),
    Stream(BoxStream<'static, Event<T>>),
    Generator(GeneratorFn<T>),
    Deferred(Option<BoxFuture<'static, Event<T>>>),
    Push(PushAdapter<T>),
    /// A generator redirected its remaining pulls here.
    Switched(Box<ExStream<T>>),
    Exhausted,
}

/// Outcome of one pull on a source.
pub(crate) enum Pulled<T> {
    Ready,
    Switch(ExStream<T>),
}

impl<T: Send + 'static> Source<T> {
    /// Asks the producer for more events.
    ///
    /// `Ready` means the producer was given the chance to emit; it may have
    /// queued zero, one or several events.
    pub(crate) fn poll_pull(&mut self, cx: &mut Context<'_>, out: &mut Buffer<T>) -> Poll<Pulled<T>> {
        match self {
            Source::Iter(iter) => {
                match iter.next() {
                    Some(value) => out.push(Event::Value(value)),
                    None => out.push(Event::End),
                }
                Poll::Ready(Pulled::Ready)
            }
            Source::Stream(stream) => match stream.poll_next_unpin(cx) {
                Poll::Ready(Some(event)) => {
                    out.push(event);
                    Poll::Ready(Pulled::Ready)
                }
                Poll::Ready(None) => {
                    if !out.end_seen() {
                        out.push(Event::End);
                    }
                    Poll::Ready(Pulled::Ready)
                }
                Poll::Pending => Poll::Pending,
            },
            Source::Generator(generator) => {
                let mut emitter = Emitter { out: &mut *out };
                match generator(&mut emitter) {
                    Next::Continue => Poll::Ready(Pulled::Ready),
                    Next::SwitchTo(next) => Poll::Ready(Pulled::Switch(next)),
                    Next::Done => {
                        if !out.end_seen() {
                            out.push(Event::End);
                        }
                        Poll::Ready(Pulled::Ready)
                    }
                }
            }
            Source::Deferred(slot) => match slot.as_mut() {
                Some(future) => match future.poll_unpin(cx) {
                    Poll::Ready(event) => {
                        *slot = None;
                        out.push(event);
                        out.push(Event::End);
                        Poll::Ready(Pulled::Ready)
                    }
                    Poll::Pending => Poll::Pending,
                },
                None => {
                    out.push(Event::End);
                    Poll::Ready(Pulled::Ready)
                }
            },
            Source::Push(adapter) => adapter.poll_pull(cx, out).map(|()| Pulled::Ready),
            Source::Switched(inner) => inner.poll_pull(cx).map(|event| {
                out.push(event);
                Pulled::Ready
            }),
            Source::Exhausted => {
                out.push(Event::End);
                Poll::Ready(Pulled::Ready)
            }
        }
    }
}

/// What a generator wants after a call returns.
pub enum Next<T> {
    /// Call the generator again on the next pull that finds the buffer empty
    Continue,
    /// Redirect all further pulls to another stream
    SwitchTo(ExStream<T>),
    /// The generator is finished; `End` is emitted if it was not already
    Done,
}

/// Write half handed to a generator function.
pub struct Emitter<'a, T> {
    out: &'a mut Buffer<T>,
}

impl<T> Emitter<'_, T> {
    /// Queues an event. Anything emitted after `End` is a protocol violation:
    /// it is logged once and dropped.
    pub fn emit(&mut self, event: Event<T>) {
        self.out.push(event);
    }

    pub fn value(&mut self, value: T) {
        self.emit(Event::Value(value));
    }

    pub fn failure(&mut self, failure: Failure) {
        self.emit(Event::Failure(failure));
    }

    /// Queues a source-level failure built from `error`.
    pub fn error<E>(&mut self, error: E)
    where
        E: Into<BoxError>,
    {
        self.emit(Event::Failure(Failure::new(error)));
    }

    pub fn end(&mut self) {
        self.emit(Event::End);
    }

    pub fn is_ended(&self) -> bool {
        self.out.end_seen()
    }
}

// ================================
// Constructors
// ================================

/// A stream over a finite or infinite synchronous sequence
pub fn from_iter<I>(iter: I) -> ExStream<I::Item>
where
    I: IntoIterator,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    ExStream::from_source(Source::Iter(Box::new(iter.into_iter())), false)
}

/// A stream over an asynchronous sequence
pub fn from_stream<S>(stream: S) -> ExStream<S::Item>
where
    S: Stream + Send + 'static,
    S::Item: Send + 'static,
{
    ExStream::from_source(Source::Stream(stream.map(Event::Value).boxed()), true)
}

/// A stream over a fallible asynchronous sequence.
///
/// Each `Err` becomes a source-level failure at its position; the sequence
/// keeps being pulled afterwards.
pub fn from_try_stream<S, T, E>(stream: S) -> ExStream<T>
where
    S: Stream<Item = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Into<BoxError> + 'static,
{
    ExStream::from_source(Source::Stream(stream.map(Event::from_result).boxed()), true)
}

/// A stream over the receiving half of a tokio channel
pub fn from_receiver<T>(rx: mpsc::Receiver<T>) -> ExStream<T>
where
    T: Send + 'static,
{
    from_stream(ReceiverStream::new(rx))
}

/// A stream driven by a generator function.
///
/// The generator is called whenever a pull finds the buffer empty. It emits
/// any number of events through the [`Emitter`] and says what happens next.
///
/// # Examples
/// ```
/// use exstream::{from_generator, Emitter, Next};
///
/// let mut i = 0;
/// let s = from_generator(move |emit: &mut Emitter<'_, i32>| {
///     i += 1;
///     if i <= 3 {
///         emit.value(i);
///         Next::Continue
///     } else {
///         Next::Done
///     }
/// });
/// assert_eq!(s.values().unwrap(), vec![1, 2, 3]);
/// ```
pub fn from_generator<T, F>(generator: F) -> ExStream<T>
where
    T: Send + 'static,
    F: FnMut(&mut Emitter<'_, T>) -> Next<T> + Send + 'static,
{
    ExStream::from_source(Source::Generator(Box::new(generator)), false)
}

/// A one-item stream over a deferred value. A rejection becomes a failure.
pub fn from_future<F, T, E>(future: F) -> ExStream<T>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Into<BoxError> + 'static,
{
    let deferred = future.map(Event::from_result).boxed();
    ExStream::from_source(Source::Deferred(Some(deferred)), true)
}

/// A stream fed by an external push source.
///
/// The source is started on the first pull and paused/resumed as demand
/// comes and goes.
pub fn from_push<T, P>(source: P) -> ExStream<T>
where
    T: Send + 'static,
    P: PushSource<T> + 'static,
{
    ExStream::from_source(Source::Push(PushAdapter::new(Box::new(source))), true)
}

/// A stream that ends immediately
pub fn empty<T>() -> ExStream<T>
where
    T: Send + 'static,
{
    ExStream::from_source(Source::Exhausted, false)
}

/// A stream of exactly one value
pub fn once<T>(value: T) -> ExStream<T>
where
    T: Send + 'static,
{
    from_iter(std::iter::once(value))
}

impl<T: Send + 'static> FromIterator<T> for ExStream<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let items: Vec<T> = iter.into_iter().collect();
        from_iter(items)
    }
}

impl<T: Send + 'static> From<Vec<T>> for ExStream<T> {
    fn from(items: Vec<T>) -> Self {
        from_iter(items)
    }
}

/// Extension trait turning any `futures` stream into an [`ExStream`]
pub trait IntoExStream: Stream + Sized + Send + 'static
where
    Self::Item: Send + 'static,
{
    fn into_exstream(self) -> ExStream<Self::Item> {
        from_stream(self)
    }
}

impl<S> IntoExStream for S
where
    S: Stream + Send + 'static,
    S::Item: Send + 'static,
{
}
