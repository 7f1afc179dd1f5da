//! Time-gated combinators: throttle and ratelimit
//!
//! Timing is best effort: windows are measured with tokio's clock, whose
//! timers have millisecond resolution. Time only matters when a value is
//! pulled, so a consumer that stops pulling never causes values to be dropped.
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use tokio::time::{sleep_until, Instant, Sleep};

use super::core::ExStream;
use crate::event::Event;
use crate::stream_configuration::RateLimitConfig;

// Throttle
pub struct Throttle<T> {
    upstream: ExStream<T>,
    interval: Duration,
    last: Option<Instant>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl<T> Unpin for Throttle<T> {}

impl<T: Send + 'static> Stream for Throttle<T> {
    type Item = Event<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            // After a drop, nothing is pulled until the interval has passed.
            if let Some(sleep) = &mut this.sleep {
                match sleep.as_mut().poll(cx) {
                    Poll::Ready(()) => this.sleep = None,
                    Poll::Pending => return Poll::Pending,
                }
            }

            match this.upstream.poll_pull(cx) {
                Poll::Ready(Event::Value(v)) => {
                    let now = Instant::now();
                    if let Some(last) = this.last {
                        if now.duration_since(last) < this.interval {
                            log::trace!("throttle: dropping value inside interval");
                            this.sleep = Some(Box::pin(sleep_until(last + this.interval)));
                            continue;
                        }
                    }
                    this.last = Some(now);
                    return Poll::Ready(Some(Event::Value(v)));
                }
                Poll::Ready(Event::Failure(e)) => return Poll::Ready(Some(Event::Failure(e))),
                Poll::Ready(Event::End) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

// RateLimit
pub struct RateLimit<T> {
    upstream: ExStream<T>,
    count: usize,
    per: Duration,
    window_start: Option<Instant>,
    emitted: usize,
    held: Option<T>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl<T> Unpin for RateLimit<T> {}

impl<T> RateLimit<T> {
    fn open_window(&mut self, now: Instant) {
        self.window_start = Some(now);
        self.emitted = 0;
    }
}

impl<T: Send + 'static> Stream for RateLimit<T> {
    type Item = Event<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        // A held value waits for the next window.
        if let Some(sleep) = &mut this.sleep {
            match sleep.as_mut().poll(cx) {
                Poll::Ready(()) => {
                    this.sleep = None;
                    this.open_window(Instant::now());
                }
                Poll::Pending => return Poll::Pending,
            }
        }
        if let Some(v) = this.held.take() {
            this.emitted += 1;
            return Poll::Ready(Some(Event::Value(v)));
        }

        match this.upstream.poll_pull(cx) {
            Poll::Ready(Event::Value(v)) => {
                let now = Instant::now();
                match this.window_start {
                    Some(start) if now.duration_since(start) < this.per => {}
                    _ => this.open_window(now),
                }
                if this.emitted < this.count {
                    this.emitted += 1;
                    return Poll::Ready(Some(Event::Value(v)));
                }

                let reopen = this.window_start.map_or(now, |start| start + this.per);
                log::trace!("ratelimit: holding value until next window");
                let mut sleep = Box::pin(sleep_until(reopen));
                if sleep.as_mut().poll(cx).is_ready() {
                    this.open_window(Instant::now());
                    this.emitted = 1;
                    return Poll::Ready(Some(Event::Value(v)));
                }
                this.held = Some(v);
                this.sleep = Some(sleep);
                Poll::Pending
            }
            Poll::Ready(Event::Failure(e)) => Poll::Ready(Some(Event::Failure(e))),
            Poll::Ready(Event::End) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T: Send + 'static> ExStream<T> {
    /// Drops values pulled less than `interval` after the last one emitted.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn throttle(self, interval: Duration) -> ExStream<T> {
        assert!(!interval.is_zero(), "throttle: interval must be greater than zero");
        self.stage(true, move |upstream| Throttle {
            upstream,
            interval,
            last: None,
            sleep: None,
        })
    }

    /// Emits at most `count` values per `per`.
    ///
    /// Excess values are never dropped; they wait for the next window. Failures
    /// pass through immediately and are not counted.
    ///
    /// # Panics
    ///
    /// Panics if `count` is 0 or `per` is zero.
    pub fn ratelimit(self, count: usize, per: Duration) -> ExStream<T> {
        self.ratelimit_with(RateLimitConfig { count, per })
    }

    /// [`ExStream::ratelimit`] from a configuration.
    pub fn ratelimit_with(self, config: RateLimitConfig) -> ExStream<T> {
        assert!(config.count > 0, "ratelimit: count must be greater than zero");
        assert!(!config.per.is_zero(), "ratelimit: window must be greater than zero");
        self.stage(true, move |upstream| RateLimit {
            upstream,
            count: config.count,
            per: config.per,
            window_start: None,
            emitted: 0,
            held: None,
            sleep: None,
        })
    }
}
