//! Reusable pipeline templates
//!
//! A [`Pipeline`] is a combinator chain that is not attached to any source.
//! Every call to [`Pipeline::generate_stream`] builds a fresh copy of the
//! chain on top of the given stream, so instantiations share no buffers,
//! state or error observers.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::error::BoxError;
use crate::event::Failure;
use crate::stream::{ErrorPush, ExStream};

/// A transformation from `ExStream<I>` to `ExStream<O>`.
pub struct Pipeline<I, O> {
    f: Arc<dyn Fn(ExStream<I>) -> ExStream<O> + Send + Sync + 'static>,
}

impl<I, O> Clone for Pipeline<I, O> {
    fn clone(&self) -> Self {
        Pipeline {
            f: Arc::clone(&self.f),
        }
    }
}

impl<I, O> Pipeline<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Create a new pipeline from a function
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(ExStream<I>) -> ExStream<O> + Send + Sync + 'static,
    {
        Pipeline { f: Arc::new(f) }
    }

    /// Instantiates the chain on top of `source`.
    pub fn generate_stream(&self, source: ExStream<I>) -> ExStream<O> {
        (self.f)(source)
    }

    /// Appends a stage built by `g` to the chain.
    pub fn chain<P, G>(self, g: G) -> Pipeline<I, P>
    where
        P: Send + 'static,
        G: Fn(ExStream<O>) -> ExStream<P> + Send + Sync + 'static,
    {
        let f = self.f;
        Pipeline::new(move |input| g(f(input)))
    }

    /// Appends another pipeline.
    pub fn compose<P>(self, other: Pipeline<O, P>) -> Pipeline<I, P>
    where
        P: Send + 'static,
    {
        compose(self, other)
    }

    pub fn map<P, F>(self, f: F) -> Pipeline<I, P>
    where
        P: Send + 'static,
        F: FnMut(O) -> P + Clone + Send + Sync + 'static,
    {
        self.chain(move |s| s.map(f.clone()))
    }

    pub fn try_map<P, E, F>(self, f: F) -> Pipeline<I, P>
    where
        O: Sync,
        P: Send + 'static,
        E: Into<BoxError>,
        F: FnMut(&O) -> Result<P, E> + Clone + Send + Sync + 'static,
    {
        self.chain(move |s| s.try_map(f.clone()))
    }

    pub fn filter<F>(self, predicate: F) -> Pipeline<I, O>
    where
        F: FnMut(&O) -> bool + Clone + Send + Sync + 'static,
    {
        self.chain(move |s| s.filter(predicate.clone()))
    }

    pub fn reject<F>(self, predicate: F) -> Pipeline<I, O>
    where
        F: FnMut(&O) -> bool + Clone + Send + Sync + 'static,
    {
        self.chain(move |s| s.reject(predicate.clone()))
    }

    pub fn uniq(self) -> Pipeline<I, O>
    where
        O: Hash + Eq + Clone,
    {
        self.chain(|s| s.uniq())
    }

    /// # Panics
    ///
    /// Panics if `size` is 0, when the pipeline is built.
    pub fn batch(self, size: usize) -> Pipeline<I, Vec<O>> {
        assert!(size > 0, "batch: size must be greater than zero");
        self.chain(move |s| s.batch(size))
    }

    pub fn errors<F>(self, handler: F) -> Pipeline<I, O>
    where
        F: FnMut(&Failure, &mut ErrorPush<O>) + Clone + Send + Sync + 'static,
    {
        self.chain(move |s| s.errors(handler.clone()))
    }

    /// # Panics
    ///
    /// Panics if `start > end`, when the pipeline is built.
    pub fn slice(self, start: usize, end: usize) -> Pipeline<I, O> {
        assert!(start <= end, "slice: start must not exceed end");
        self.chain(move |s| s.slice(start, end))
    }

    pub fn take(self, n: usize) -> Pipeline<I, O> {
        self.chain(move |s| s.take(n))
    }

    pub fn skip(self, n: usize) -> Pipeline<I, O> {
        self.chain(move |s| s.skip(n))
    }

    /// # Panics
    ///
    /// Panics if `interval` is zero, when the pipeline is built.
    pub fn throttle(self, interval: Duration) -> Pipeline<I, O> {
        assert!(!interval.is_zero(), "throttle: interval must be greater than zero");
        self.chain(move |s| s.throttle(interval))
    }

    /// # Panics
    ///
    /// Panics if `count` is 0 or `per` is zero, when the pipeline is built.
    pub fn ratelimit(self, count: usize, per: Duration) -> Pipeline<I, O> {
        assert!(count > 0, "ratelimit: count must be greater than zero");
        assert!(!per.is_zero(), "ratelimit: window must be greater than zero");
        self.chain(move |s| s.ratelimit(count, per))
    }
}

/// A pipeline that applies `f` to each value
pub fn map<I, O, F>(f: F) -> Pipeline<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
    F: FnMut(I) -> O + Clone + Send + Sync + 'static,
{
    identity().map(f)
}

/// A pipeline that keeps the values matching `predicate`
pub fn filter<I, F>(predicate: F) -> Pipeline<I, I>
where
    I: Send + 'static,
    F: FnMut(&I) -> bool + Clone + Send + Sync + 'static,
{
    identity().filter(predicate)
}

/// Compose two pipelines together
pub fn compose<I, M, O>(p1: Pipeline<I, M>, p2: Pipeline<M, O>) -> Pipeline<I, O>
where
    I: Send + 'static,
    M: Send + 'static,
    O: Send + 'static,
{
    Pipeline::new(move |input| p2.generate_stream(p1.generate_stream(input)))
}

/// A pipeline that passes its input through unchanged
pub fn identity<I>() -> Pipeline<I, I>
where
    I: Send + 'static,
{
    Pipeline::new(|input| input)
}

impl<T: Send + 'static> ExStream<T> {
    /// Attaches a fresh instance of `pipeline` to this stream.
    pub fn through<U>(self, pipeline: &Pipeline<T, U>) -> ExStream<U>
    where
        U: Send + 'static,
    {
        pipeline.generate_stream(self)
    }
}
