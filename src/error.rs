//! Error types and handling for exstream
//!
//! Two kinds of errors exist. Data-flow failures travel through a pipeline as
//! [`Failure`](crate::event::Failure) events and can be recovered downstream.
//! Everything in this module is the other kind: configuration, usage and
//! protocol errors that are returned to the caller at the point of misuse and
//! never enter the event stream.

use thiserror::Error;

use crate::event::Failure;

/// Boxed error accepted wherever user code reports a failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Fatal errors for exstream operations
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// A combinator or configuration received an argument it cannot work with
    #[error("{combinator}: {reason}")]
    InvalidArgument {
        combinator: &'static str,
        reason: String,
    },
    /// Forced synchronous evaluation of a pipeline that contains a suspending stage
    #[error("pipeline requires asynchronous evaluation; use to_array(), to_promise() or each()")]
    RequiresAsync,
    /// `value()` evaluated to something other than exactly one item
    #[error("value() expected exactly one item but the stream produced {count}")]
    NotSingleValue { count: usize },
    /// A data-flow failure reached a forced synchronous extraction unrecovered
    #[error("unhandled stream failure: {0}")]
    Unhandled(Failure),
    /// An external source pushed after it had already signalled end of data
    #[error("push after end of stream")]
    PushAfterEnd,
    /// The downstream half of an adapter was dropped
    #[error("stream sink closed")]
    SinkClosed,
}

impl StreamError {
    pub(crate) fn invalid(combinator: &'static str, reason: impl Into<String>) -> Self {
        StreamError::InvalidArgument {
            combinator,
            reason: reason.into(),
        }
    }

    /// The failure carried by an [`StreamError::Unhandled`] error, if any.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            StreamError::Unhandled(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Result type for fatal stream operations
pub type StreamResult<T> = Result<T, StreamError>;
