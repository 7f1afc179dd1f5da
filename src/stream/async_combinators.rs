//! Suspending combinators: resolve, async_filter, async_reduce, make_async
//!
//! Every stage here can wait on a future, so applying one marks the
//! pipeline as requiring asynchronous evaluation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_stream::stream;
use futures::future::{self, FutureExt};
use futures::stream::{FuturesOrdered, StreamExt};
use futures_core::future::BoxFuture;
use futures_core::Stream;

use super::core::ExStream;
use crate::error::BoxError;
use crate::event::{Event, Failure};
use crate::stream_configuration::ResolveConfig;

/// A deferred value produced by [`ExStream::then`] and [`ExStream::catch`].
pub type Deferred<V> = BoxFuture<'static, Result<V, BoxError>>;

// ================================
// Resolve - ordered, bounded concurrency
// ================================

enum Settled<V> {
    Fulfilled(V),
    Rejected(Failure),
    /// A failure from upstream, kept in line with the deferred values around it
    Passed(Failure),
}

/// Stage body of [`ExStream::resolve_with`].
///
/// Keeps up to `concurrency` deferred values in flight and emits their
/// results in input order, whatever order they complete in.
pub struct Resolve<F, V> {
    upstream: ExStream<F>,
    concurrency: usize,
    stop_on_error: bool,
    in_flight: FuturesOrdered<BoxFuture<'static, Settled<V>>>,
    upstream_done: bool,
    stopped: bool,
}

impl<F, V> Unpin for Resolve<F, V> {}

impl<F, V, E> Stream for Resolve<F, V>
where
    F: Future<Output = Result<V, E>> + Send + 'static,
    V: Send + 'static,
    E: Into<BoxError> + 'static,
{
    type Item = Event<V>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.stopped {
            return Poll::Ready(None);
        }

        // Top up the in-flight set without exceeding the concurrency bound.
        while !this.upstream_done && this.in_flight.len() < this.concurrency {
            match this.upstream.poll_pull(cx) {
                Poll::Ready(Event::Value(deferred)) => {
                    this.in_flight.push_back(
                        deferred
                            .map(|result| match result {
                                Ok(v) => Settled::Fulfilled(v),
                                Err(e) => Settled::Rejected(Failure::new(e)),
                            })
                            .boxed(),
                    );
                }
                Poll::Ready(Event::Failure(failure)) => {
                    this.in_flight
                        .push_back(future::ready(Settled::Passed(failure)).boxed());
                }
                Poll::Ready(Event::End) => this.upstream_done = true,
                Poll::Pending => break,
            }
        }

        match this.in_flight.poll_next_unpin(cx) {
            Poll::Ready(Some(Settled::Fulfilled(v))) => Poll::Ready(Some(Event::Value(v))),
            Poll::Ready(Some(Settled::Passed(failure))) => Poll::Ready(Some(Event::Failure(failure))),
            Poll::Ready(Some(Settled::Rejected(failure))) => {
                if this.stop_on_error {
                    log::debug!("resolve: stopping after rejection: {}", failure);
                    this.stopped = true;
                    this.in_flight.clear();
                }
                Poll::Ready(Some(Event::Failure(failure)))
            }
            Poll::Ready(None) if this.upstream_done => Poll::Ready(None),
            // Upstream is pending; it registered the waker.
            Poll::Ready(None) | Poll::Pending => Poll::Pending,
        }
    }
}

impl<F, V, E> ExStream<F>
where
    F: Future<Output = Result<V, E>> + Send + 'static,
    V: Send + 'static,
    E: Into<BoxError> + 'static,
{
    /// Resolves a stream of deferred values, up to `concurrency` at a time.
    ///
    /// Results keep input order. Stops at the first rejection; see
    /// [`ExStream::resolve_with`] to keep going.
    ///
    /// # Panics
    ///
    /// Panics if `concurrency` is 0.
    pub fn resolve(self, concurrency: usize) -> ExStream<V> {
        self.resolve_with(ResolveConfig {
            concurrency,
            ..ResolveConfig::default()
        })
    }

    /// Resolves a stream of deferred values as configured.
    ///
    /// A rejection becomes a failure at the position of the deferred value.
    /// With `stop_on_error` the stream ends right after that failure and no
    /// further deferred values are pulled.
    ///
    /// # Examples
    /// ```
    /// use exstream::{from_iter, ResolveConfig};
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let deferred = vec![1, 2, 3].into_iter().map(|n| async move {
    ///     if n == 2 { Err("rejected") } else { Ok(n * 10) }
    /// });
    /// let config = ResolveConfig { concurrency: 2, stop_on_error: false };
    /// let values = from_iter(deferred.collect::<Vec<_>>())
    ///     .resolve_with(config)
    ///     .on_error(|_| {})
    ///     .to_array()
    ///     .await;
    /// assert_eq!(values, vec![10, 30]);
    /// # });
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `config.concurrency` is 0.
    pub fn resolve_with(self, config: ResolveConfig) -> ExStream<V> {
        assert!(config.concurrency > 0, "resolve: concurrency must be greater than zero");
        self.stage(true, move |upstream| Resolve {
            upstream,
            concurrency: config.concurrency,
            stop_on_error: config.stop_on_error,
            in_flight: FuturesOrdered::new(),
            upstream_done: false,
            stopped: false,
        })
    }

    /// Chains a fallible continuation onto each deferred value without
    /// resolving it.
    ///
    /// A rejection skips `f`. An `Err` from `f` becomes the rejection of the
    /// chained value.
    pub fn then<W, E2, G>(self, f: G) -> ExStream<Deferred<W>>
    where
        W: Send + 'static,
        E2: Into<BoxError> + 'static,
        G: Fn(V) -> Result<W, E2> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.map(move |deferred| {
            let f = Arc::clone(&f);
            async move {
                let chained: Result<W, BoxError> = match deferred.await {
                    Ok(value) => f(value).map_err(Into::into),
                    Err(e) => Err(e.into()),
                };
                chained
            }
            .boxed()
        })
    }

    /// Replaces the rejection of each deferred value with a fallback value.
    pub fn catch<G>(self, f: G) -> ExStream<Deferred<V>>
    where
        G: Fn(BoxError) -> V + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.map(move |deferred| {
            let f = Arc::clone(&f);
            async move {
                let value = match deferred.await {
                    Ok(value) => value,
                    Err(e) => f(e.into()),
                };
                Ok::<V, BoxError>(value)
            }
            .boxed()
        })
    }
}

impl<T: Send + 'static> ExStream<T> {
    /// Filters with a predicate that may suspend.
    ///
    /// Predicates run one at a time, so output order is input order. An `Err`
    /// becomes a failure carrying the value.
    pub fn async_filter<E, F, Fut>(self, mut predicate: F) -> ExStream<T>
    where
        T: Sync,
        F: FnMut(&T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<bool, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.stage(true, move |mut up| {
            stream! {
                loop {
                    let out = match up.pull().await {
                        Event::Value(v) => match predicate(&v).await {
                            Ok(true) => Some(Event::Value(v)),
                            Ok(false) => None,
                            Err(e) => Some(Event::Failure(Failure::with_input(e, v))),
                        },
                        Event::Failure(e) => Some(Event::Failure(e)),
                        Event::End => break,
                    };
                    if let Some(out) = out {
                        yield out;
                    }
                }
            }
        })
    }

    /// Folds with a step that may suspend.
    ///
    /// Steps run one at a time. An `Err` from a step is emitted as a failure
    /// and aborts the fold.
    pub fn async_reduce<A, E, F, Fut>(self, init: A, mut f: F) -> ExStream<A>
    where
        A: Send + 'static,
        F: FnMut(A, T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<A, E>> + Send + 'static,
        E: Into<BoxError> + Send,
    {
        self.stage(true, move |mut up| {
            stream! {
                let mut acc = Some(init);
                loop {
                    match up.pull().await {
                        Event::Value(v) => {
                            let Some(current) = acc.take() else { break };
                            match f(current, v).await {
                                Ok(next) => acc = Some(next),
                                Err(e) => {
                                    yield Event::Failure(Failure::new(e));
                                    break;
                                }
                            }
                        }
                        Event::Failure(e) => yield Event::Failure(e),
                        Event::End => break,
                    }
                }
                if let Some(result) = acc {
                    yield Event::Value(result);
                }
            }
        })
    }

    /// Yields to the scheduler before every event.
    ///
    /// Makes a synchronous pipeline asynchronous, e.g. to interleave it with
    /// other tasks or to test async consumers.
    pub fn make_async(self) -> ExStream<T> {
        self.stage(true, |mut up| {
            stream! {
                loop {
                    let event = up.pull().await;
                    tokio::task::yield_now().await;
                    if event.is_end() {
                        break;
                    }
                    yield event;
                }
            }
        })
    }
}
