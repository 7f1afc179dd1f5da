//! The three event kinds that flow through every stream

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::error::BoxError;

/// One item travelling down a pipeline.
///
/// Values, failures and the end-of-stream marker share a single ordered
/// channel, so a failure keeps its position relative to the values around it.
#[derive(Debug, Clone)]
pub enum Event<T> {
    /// A payload item, opaque to the engine
    Value(T),
    /// A recoverable data-flow failure
    Failure(Failure),
    /// Terminal marker; nothing follows it
    End,
}

impl<T> Event<T> {
    pub const fn is_value(&self) -> bool {
        matches!(self, Event::Value(_))
    }

    pub const fn is_failure(&self) -> bool {
        matches!(self, Event::Failure(_))
    }

    pub const fn is_end(&self) -> bool {
        matches!(self, Event::End)
    }

    /// Converts into `Option<T>`, discarding failures and the end marker.
    pub fn value(self) -> Option<T> {
        match self {
            Event::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Converts into `Option<Failure>`, discarding values and the end marker.
    pub fn failure(self) -> Option<Failure> {
        match self {
            Event::Failure(f) => Some(f),
            _ => None,
        }
    }

    /// Maps the payload of a `Value`; failures and `End` pass through.
    pub fn map<U, F>(self, f: F) -> Event<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Event::Value(v) => Event::Value(f(v)),
            Event::Failure(e) => Event::Failure(e),
            Event::End => Event::End,
        }
    }

    /// `None` for `End`, otherwise the value or failure as a `Result`.
    pub fn into_result(self) -> Option<Result<T, Failure>> {
        match self {
            Event::Value(v) => Some(Ok(v)),
            Event::Failure(e) => Some(Err(e)),
            Event::End => None,
        }
    }

    /// Lifts a fallible result into an event. Errors become source-level failures.
    pub fn from_result<E>(result: Result<T, E>) -> Self
    where
        E: Into<BoxError>,
    {
        match result {
            Ok(v) => Event::Value(v),
            Err(e) => Event::Failure(Failure::new(e)),
        }
    }
}

impl<T: PartialEq> PartialEq for Event<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Event::Value(a), Event::Value(b)) => a == b,
            (Event::End, Event::End) => true,
            // Failures are never equal
            _ => false,
        }
    }
}

/// A recoverable error event.
///
/// Wraps the underlying error together with the input that was being
/// processed when it happened. Source-level failures carry no input.
/// Copies share the underlying error, so a failure forwarded unchanged can be
/// recognised downstream with [`Failure::ptr_eq`].
#[derive(Clone)]
pub struct Failure {
    error: Arc<dyn Error + Send + Sync + 'static>,
    original_input: Option<Arc<dyn Any + Send + Sync>>,
    recovered: bool,
}

impl Failure {
    /// A failure with no original input.
    pub fn new<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        let boxed: BoxError = error.into();
        Self {
            error: Arc::from(boxed),
            original_input: None,
            recovered: false,
        }
    }

    /// Shorthand for a failure built from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(message.into())
    }

    /// A failure raised while processing `input`.
    pub fn with_input<E, I>(error: E, input: I) -> Self
    where
        E: Into<BoxError>,
        I: Any + Send + Sync,
    {
        Self::new(error).attach_input(input)
    }

    /// Attaches (or replaces) the original input.
    pub fn attach_input<I>(mut self, input: I) -> Self
    where
        I: Any + Send + Sync,
    {
        self.original_input = Some(Arc::new(input));
        self
    }

    /// The underlying error.
    pub fn error(&self) -> &(dyn Error + Send + Sync + 'static) {
        &*self.error
    }

    /// The underlying error's display text.
    pub fn message(&self) -> String {
        self.error.to_string()
    }

    /// The input being processed when the failure occurred, if it has type `I`.
    pub fn original_input<I: Any>(&self) -> Option<&I> {
        self.original_input
            .as_deref()
            .and_then(|input| input.downcast_ref::<I>())
    }

    pub fn has_original_input(&self) -> bool {
        self.original_input.is_some()
    }

    /// Set once an `errors()` handler has injected replacement values for this failure.
    pub fn is_recovered(&self) -> bool {
        self.recovered
    }

    pub(crate) fn mark_recovered(mut self) -> Self {
        self.recovered = true;
        self
    }

    /// Whether two failures share the same underlying error.
    pub fn ptr_eq(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.error, &other.error)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("error", &self.error.to_string())
            .field("has_original_input", &self.original_input.is_some())
            .field("recovered", &self.recovered)
            .finish()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl Error for Failure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&*self.error)
    }
}
