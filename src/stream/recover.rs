//! Recovery stage for the error channel

use async_stream::stream;

use super::core::ExStream;
use crate::error::BoxError;
use crate::event::{Event, Failure};

/// Collects what an `errors()` handler pushes in place of a failure.
pub struct ErrorPush<T> {
    pushed: Vec<Event<T>>,
    injected_value: bool,
}

impl<T> ErrorPush<T> {
    fn new() -> Self {
        Self {
            pushed: Vec::new(),
            injected_value: false,
        }
    }

    /// Emits a replacement value.
    pub fn value(&mut self, value: T) {
        self.injected_value = true;
        self.pushed.push(Event::Value(value));
    }

    /// Forwards a failure, either the one being handled or a new one.
    pub fn error(&mut self, failure: Failure) {
        self.pushed.push(Event::Failure(failure));
    }

    /// Forwards a new failure built from `error`.
    pub fn fail<E>(&mut self, error: E)
    where
        E: Into<BoxError>,
    {
        self.error(Failure::new(error));
    }

    /// Number of events pushed so far.
    pub fn len(&self) -> usize {
        self.pushed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pushed.is_empty()
    }
}

impl<T: Send + 'static> ExStream<T> {
    /// Intercepts failures so they can be replaced.
    ///
    /// `handler` runs once for each failure and may push any number of values
    /// or failures in its place, in order. A handler that pushes nothing lets
    /// the failure continue unchanged. If it pushes replacement values and
    /// also forwards the original failure, that failure is marked recovered:
    /// terminal consumers skip it.
    ///
    /// # Examples
    /// ```
    /// use exstream::{from_generator, Emitter, Failure, Next};
    ///
    /// let mut step = 0;
    /// let result = from_generator(move |emit: &mut Emitter<'_, i32>| {
    ///     step += 1;
    ///     match step {
    ///         1 => emit.value(1),
    ///         2 => emit.failure(Failure::msg("boom")),
    ///         _ => return Next::Done,
    ///     }
    ///     Next::Continue
    /// })
    /// .errors(|_, push| push.value(0))
    /// .values()
    /// .unwrap();
    /// assert_eq!(result, vec![1, 0]);
    /// ```
    pub fn errors<F>(self, mut handler: F) -> ExStream<T>
    where
        F: FnMut(&Failure, &mut ErrorPush<T>) + Send + 'static,
    {
        self.stage(false, move |mut up| {
            stream! {
                loop {
                    let events = match up.pull().await {
                        Event::Failure(failure) if !failure.is_recovered() => recover(&mut handler, failure),
                        Event::End => break,
                        event => vec![event],
                    };
                    for event in events {
                        yield event;
                    }
                }
            }
        })
    }
}

fn recover<T, F>(handler: &mut F, failure: Failure) -> Vec<Event<T>>
where
    F: FnMut(&Failure, &mut ErrorPush<T>),
{
    let mut push = ErrorPush::new();
    handler(&failure, &mut push);
    if push.is_empty() {
        return vec![Event::Failure(failure)];
    }
    log::debug!("errors() handler replaced failure with {} event(s)", push.len());
    if !push.injected_value {
        return push.pushed;
    }
    push.pushed
        .into_iter()
        .map(|event| match event {
            Event::Failure(forwarded) if forwarded.ptr_eq(&failure) => {
                Event::Failure(forwarded.mark_recovered())
            }
            event => event,
        })
        .collect()
}
