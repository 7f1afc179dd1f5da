//! Synchronous combinators
//!
//! None of these stages suspend on their own: each pull on the stage pulls
//! its upstream as many times as it needs and returns. Failures arriving from
//! upstream are forwarded in place unless noted otherwise.

use std::collections::HashSet;
use std::hash::Hash;

use async_stream::stream;

use super::core::ExStream;
use crate::error::BoxError;
use crate::event::{Event, Failure};

impl<T: Send + 'static> ExStream<T> {
    /// Applies `f` to every value.
    pub fn map<U, F>(self, mut f: F) -> ExStream<U>
    where
        F: FnMut(T) -> U + Send + 'static,
        U: Send + 'static,
    {
        self.stage(false, move |mut up| {
            stream! {
                loop {
                    let event = up.pull().await;
                    if event.is_end() {
                        break;
                    }
                    yield event.map(&mut f);
                }
            }
        })
    }

    /// Applies a fallible `f` to every value.
    ///
    /// An `Err` becomes a failure carrying the value that caused it; the
    /// stream goes on with the next value.
    ///
    /// # Examples
    /// ```
    /// use exstream::from_iter;
    ///
    /// let result = from_iter(vec![1, 2, 3])
    ///     .try_map(|x: &i32| if *x == 2 { Err("can't be 2") } else { Ok(*x) })
    ///     .errors(|err, push| {
    ///         if err.original_input::<i32>() == Some(&2) {
    ///             push.value(5);
    ///         }
    ///     })
    ///     .values()
    ///     .unwrap();
    /// assert_eq!(result, vec![1, 5, 3]);
    /// ```
    pub fn try_map<U, E, F>(self, mut f: F) -> ExStream<U>
    where
        T: Sync,
        F: FnMut(&T) -> Result<U, E> + Send + 'static,
        E: Into<BoxError>,
        U: Send + 'static,
    {
        self.stage(false, move |mut up| {
            stream! {
                loop {
                    let out = match up.pull().await {
                        Event::Value(v) => match f(&v) {
                            Ok(u) => Event::Value(u),
                            Err(e) => Event::Failure(Failure::with_input(e, v)),
                        },
                        Event::Failure(e) => Event::Failure(e),
                        Event::End => break,
                    };
                    yield out;
                }
            }
        })
    }

    /// Keeps the values for which `predicate` holds.
    pub fn filter<F>(self, mut predicate: F) -> ExStream<T>
    where
        F: FnMut(&T) -> bool + Send + 'static,
    {
        self.stage(false, move |mut up| {
            stream! {
                loop {
                    match up.pull().await {
                        Event::Value(v) if !predicate(&v) => {}
                        Event::End => break,
                        event => yield event,
                    }
                }
            }
        })
    }

    /// Fallible [`ExStream::filter`]; an `Err` becomes a failure carrying the value.
    pub fn try_filter<E, F>(self, mut predicate: F) -> ExStream<T>
    where
        T: Sync,
        F: FnMut(&T) -> Result<bool, E> + Send + 'static,
        E: Into<BoxError>,
    {
        self.stage(false, move |mut up| {
            stream! {
                loop {
                    let out = match up.pull().await {
                        Event::Value(v) => match predicate(&v) {
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

    /// Drops the values for which `predicate` holds.
    pub fn reject<F>(self, mut predicate: F) -> ExStream<T>
    where
        F: FnMut(&T) -> bool + Send + 'static,
    {
        self.filter(move |v| !predicate(v))
    }

    /// Fallible [`ExStream::reject`].
    pub fn try_reject<E, F>(self, mut predicate: F) -> ExStream<T>
    where
        T: Sync,
        F: FnMut(&T) -> Result<bool, E> + Send + 'static,
        E: Into<BoxError>,
    {
        self.try_filter(move |v| predicate(v).map(|hit| !hit))
    }

    /// Groups consecutive values into vectors of `size`.
    ///
    /// The last group may be shorter. Failures are forwarded as they arrive,
    /// ahead of the group being filled.
    ///
    /// # Panics
    ///
    /// Panics if `size` is 0.
    pub fn batch(self, size: usize) -> ExStream<Vec<T>> {
        assert!(size > 0, "batch: size must be greater than zero");
        self.stage(false, move |mut up| {
            stream! {
                let mut buf = Vec::new();
                loop {
                    match up.pull().await {
                        Event::Value(v) => {
                            buf.push(v);
                            if buf.len() == size {
                                yield Event::Value(std::mem::take(&mut buf));
                            }
                        }
                        Event::Failure(e) => yield Event::Failure(e),
                        Event::End => break,
                    }
                }
                if !buf.is_empty() {
                    yield Event::Value(buf);
                }
            }
        })
    }

    /// Emits the items of every iterable value, one level deep.
    pub fn flatten(self) -> ExStream<<T as IntoIterator>::Item>
    where
        T: IntoIterator,
        <T as IntoIterator>::IntoIter: Send,
        <T as IntoIterator>::Item: Send + 'static,
    {
        self.stage(false, |mut up| {
            stream! {
                loop {
                    match up.pull().await {
                        Event::Value(items) => {
                            for item in items {
                                yield Event::Value(item);
                            }
                        }
                        Event::Failure(e) => yield Event::Failure(e),
                        Event::End => break,
                    }
                }
            }
        })
    }

    /// Drops values equal to one already seen.
    pub fn uniq(self) -> ExStream<T>
    where
        T: Hash + Eq + Clone,
    {
        self.stage(false, |mut up| {
            stream! {
                let mut seen = HashSet::new();
                loop {
                    match up.pull().await {
                        Event::Value(v) => {
                            if seen.insert(v.clone()) {
                                yield Event::Value(v);
                            }
                        }
                        Event::Failure(e) => yield Event::Failure(e),
                        Event::End => break,
                    }
                }
            }
        })
    }

    /// Drops values whose key has already been seen.
    ///
    /// When `key` fails the value is dropped and a failure carrying it is
    /// emitted instead; the stream stays alive.
    pub fn uniq_by<K, E, F>(self, mut key: F) -> ExStream<T>
    where
        T: Sync,
        K: Hash + Eq + Send + 'static,
        F: FnMut(&T) -> Result<K, E> + Send + 'static,
        E: Into<BoxError>,
    {
        self.stage(false, move |mut up| {
            stream! {
                let mut seen = HashSet::new();
                loop {
                    let out = match up.pull().await {
                        Event::Value(v) => match key(&v) {
                            Ok(k) => {
                                if seen.insert(k) {
                                    Some(Event::Value(v))
                                } else {
                                    None
                                }
                            }
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

    /// Forwards the values with index in `start..end`.
    ///
    /// Values before `start` are still pulled and discarded. Once `end` is
    /// reached the stream ends without pulling further. Failures pulled
    /// before that point are forwarded, including those ahead of `start`, and
    /// do not count towards the index.
    ///
    /// # Panics
    ///
    /// Panics if `start > end`.
    pub fn slice(self, start: usize, end: usize) -> ExStream<T> {
        assert!(start <= end, "slice: start must not exceed end");
        self.stage(false, move |mut up| {
            stream! {
                let mut index = 0usize;
                while index < end {
                    match up.pull().await {
                        Event::Value(v) => {
                            index += 1;
                            if index > start {
                                yield Event::Value(v);
                            }
                        }
                        Event::Failure(e) => yield Event::Failure(e),
                        Event::End => break,
                    }
                }
            }
        })
    }

    /// The first `n` values.
    pub fn take(self, n: usize) -> ExStream<T> {
        self.slice(0, n)
    }

    /// Everything after the first `n` values.
    pub fn skip(self, n: usize) -> ExStream<T> {
        self.slice(n, usize::MAX)
    }

    /// Folds every value into a single result emitted at end of stream.
    pub fn reduce<A, F>(self, init: A, mut f: F) -> ExStream<A>
    where
        A: Send + 'static,
        F: FnMut(A, T) -> A + Send + 'static,
    {
        self.try_reduce(init, move |acc, v| Ok::<A, BoxError>(f(acc, v)))
    }

    /// Fallible [`ExStream::reduce`].
    ///
    /// An `Err` from `f` is emitted as a failure and aborts the fold: nothing
    /// else is pulled and no result is emitted.
    pub fn try_reduce<A, E, F>(self, init: A, mut f: F) -> ExStream<A>
    where
        A: Send + 'static,
        F: FnMut(A, T) -> Result<A, E> + Send + 'static,
        E: Into<BoxError> + Send,
    {
        self.stage(false, move |mut up| {
            stream! {
                let mut acc = Some(init);
                loop {
                    match up.pull().await {
                        Event::Value(v) => {
                            let Some(current) = acc.take() else { break };
                            match f(current, v) {
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

    /// Folds using the first value as the seed; an empty stream yields nothing.
    pub fn reduce1<F>(self, mut f: F) -> ExStream<T>
    where
        F: FnMut(T, T) -> T + Send + 'static,
    {
        self.stage(false, move |mut up| {
            stream! {
                let mut acc: Option<T> = None;
                loop {
                    match up.pull().await {
                        Event::Value(v) => {
                            acc = Some(match acc.take() {
                                Some(current) => f(current, v),
                                None => v,
                            });
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

    /// Splits a stream of text chunks into lines.
    ///
    /// Like [`ExStream::split_by`] with `"\n"`, also dropping a trailing `'\r'`
    /// from each line.
    pub fn split(self) -> ExStream<String>
    where
        T: AsRef<str>,
    {
        self.split_by("\n").map(|mut line| {
            if line.ends_with('\r') {
                line.pop();
            }
            line
        })
    }

    /// Re-tokenizes a stream of text chunks on `delimiter`.
    ///
    /// Partial tokens are carried across chunk boundaries. At end of stream
    /// the remainder is emitted if it is not empty.
    ///
    /// # Panics
    ///
    /// Panics if `delimiter` is empty.
    pub fn split_by(self, delimiter: impl Into<String>) -> ExStream<String>
    where
        T: AsRef<str>,
    {
        let delimiter = delimiter.into();
        assert!(!delimiter.is_empty(), "split_by: delimiter must not be empty");
        self.stage(false, move |mut up| {
            stream! {
                let mut pending = String::new();
                loop {
                    match up.pull().await {
                        Event::Value(chunk) => {
                            pending.push_str(chunk.as_ref());
                            let mut tokens = Vec::new();
                            while let Some(at) = pending.find(delimiter.as_str()) {
                                tokens.push(pending[..at].to_string());
                                pending.drain(..at + delimiter.len());
                            }
                            for token in tokens {
                                yield Event::Value(token);
                            }
                        }
                        Event::Failure(e) => yield Event::Failure(e),
                        Event::End => break,
                    }
                }
                if !pending.is_empty() {
                    yield Event::Value(pending);
                }
            }
        })
    }
}
