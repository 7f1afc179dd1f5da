//! # exstream
//!
//! A lazy, pull-driven stream engine. Synchronous collections, async
//! streams, generator functions, futures and external push sources all
//! become the same [`ExStream`], and values, failures and the end marker
//! travel through it as one ordered sequence of [`Event`]s.
//!
//! Nothing runs until a consumer pulls. A pipeline made only of synchronous
//! stages can be forced in place with [`ExStream::values`]; as soon as a
//! stage can suspend, the pipeline has to be consumed with one of the async
//! sinks ([`ExStream::to_array`], [`ExStream::to_promise`], [`ExStream::each`],
//! [`ExStream::pipe`]).
//!
//! ```
//! use exstream::from_iter;
//!
//! let doubled = from_iter(vec![1, 2, 3, 4])
//!     .filter(|x| x % 2 == 0)
//!     .map(|x| x * 2)
//!     .values()
//!     .unwrap();
//! assert_eq!(doubled, vec![4, 8]);
//! ```

pub mod codec;
pub mod connectors;
pub mod error;
pub mod event;
pub mod pipe;
pub mod stream;
pub mod stream_configuration;

pub use error::{BoxError, StreamError, StreamResult};
pub use event::{Event, Failure};
pub use pipe::{compose, identity, Pipeline};
pub use stream::{
    empty, from_future, from_generator, from_iter, from_push, from_receiver, from_stream,
    from_try_stream, once, Deferred, Emitter, ErrorHandle, ErrorPush, ExStream, IntoExStream,
    Next, PauseHandle, StreamState,
};
pub use stream_configuration::{CsvConfig, RateLimitConfig, ResolveConfig};
