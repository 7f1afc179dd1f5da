//! The stream engine and its combinators
//!
//! `core` holds the pull protocol and the per-node state machine. Each of the
//! other modules adds a group of methods to [`ExStream`].

pub mod async_combinators;
pub mod constructors;
pub mod core;
pub mod observers;
pub mod rate;
pub mod recover;
pub mod resolver;
pub mod select;
pub mod sinks;
pub mod transform;

// Re-export core types
pub use self::core::{ExStream, Pull, StreamState};

// Re-export constructors
pub use constructors::{
    empty, from_future, from_generator, from_iter, from_push, from_receiver, from_stream,
    from_try_stream, once, Emitter, IntoExStream, Next,
};

pub use async_combinators::{Deferred, Resolve};
pub use observers::{ErrorHandle, PauseHandle};
pub use rate::{RateLimit, Throttle};
pub use recover::ErrorPush;
pub use select::Merge;
