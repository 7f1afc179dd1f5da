//! Adapter interfaces for external push-based sources and sinks

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::stream::StreamExt;

use crate::error::{BoxError, StreamError, StreamResult};
use crate::event::{Event, Failure};
use crate::stream::core::Buffer;

/// An external producer that pushes data on its own schedule.
///
/// The engine hands the source a [`Pusher`] on the first pull, then drives
/// `pause`/`resume` from its backpressure state: the source is resumed when a
/// pull finds nothing buffered and paused as soon as an event arrives.
pub trait PushSource<T>: Send {
    /// Receives the write half. Called once, before the first `resume`.
    fn start(&mut self, pusher: Pusher<T>);

    /// Stop producing until `resume` is called.
    fn pause(&mut self);

    /// Produce more data.
    fn resume(&mut self);

    /// The stream reached its end or was dropped; release resources.
    fn close(&mut self) {}
}

struct PushShared {
    ended: AtomicBool,
    violation_reported: AtomicBool,
}

/// Write half of a push source
pub struct Pusher<T> {
    tx: UnboundedSender<Event<T>>,
    shared: Arc<PushShared>,
}

impl<T> Clone for Pusher<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Pusher<T> {
    /// Delivers one data item.
    pub fn write(&self, value: T) -> StreamResult<()> {
        self.send(Event::Value(value))
    }

    /// Delivers a native error; it becomes a source-level failure.
    pub fn error<E>(&self, error: E) -> StreamResult<()>
    where
        E: Into<BoxError>,
    {
        self.send(Event::Failure(Failure::new(error)))
    }

    /// Signals end of data. Everything pushed afterwards is rejected.
    pub fn end(&self) -> StreamResult<()> {
        self.send(Event::End)
    }

    pub fn is_ended(&self) -> bool {
        self.shared.ended.load(Ordering::Acquire)
    }

    fn send(&self, event: Event<T>) -> StreamResult<()> {
        if self.shared.ended.load(Ordering::Acquire) {
            if !self.shared.violation_reported.swap(true, Ordering::AcqRel) {
                log::error!("protocol violation: push source wrote after end of data");
            }
            return Err(StreamError::PushAfterEnd);
        }
        if event.is_end() {
            self.shared.ended.store(true, Ordering::Release);
        }
        self.tx
            .unbounded_send(event)
            .map_err(|_| StreamError::SinkClosed)
    }
}

/// Wires a [`PushSource`] into the pull protocol.
pub(crate) struct PushAdapter<T> {
    source: Box<dyn PushSource<T>>,
    rx: UnboundedReceiver<Event<T>>,
    pusher: Option<Pusher<T>>,
    flowing: bool,
}

impl<T: Send + 'static> PushAdapter<T> {
    pub(crate) fn new(source: Box<dyn PushSource<T>>) -> Self {
        let (tx, rx) = unbounded();
        let pusher = Pusher {
            tx,
            shared: Arc::new(PushShared {
                ended: AtomicBool::new(false),
                violation_reported: AtomicBool::new(false),
            }),
        };
        Self {
            source,
            rx,
            pusher: Some(pusher),
            flowing: false,
        }
    }

    pub(crate) fn poll_pull(&mut self, cx: &mut Context<'_>, out: &mut Buffer<T>) -> Poll<()> {
        if let Some(pusher) = self.pusher.take() {
            log::trace!("starting push source");
            self.source.start(pusher);
        }

        if self.poll_receive(cx, out).is_ready() {
            return Poll::Ready(());
        }

        // Nothing buffered and a pull is outstanding: ask for more.
        if !self.flowing {
            self.flowing = true;
            log::trace!("resuming push source");
            self.source.resume();
            // The source may have pushed synchronously from `resume`.
            return self.poll_receive(cx, out);
        }
        Poll::Pending
    }

    fn poll_receive(&mut self, cx: &mut Context<'_>, out: &mut Buffer<T>) -> Poll<()> {
        match self.rx.poll_next_unpin(cx) {
            Poll::Ready(Some(event)) => {
                out.push(event);
                if self.flowing {
                    self.flowing = false;
                    log::trace!("pausing push source");
                    self.source.pause();
                }
                Poll::Ready(())
            }
            Poll::Ready(None) => {
                // Every pusher was dropped without an explicit end.
                if !out.end_seen() {
                    out.push(Event::End);
                }
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for PushAdapter<T> {
    fn drop(&mut self) {
        log::trace!("closing push source");
        self.source.close();
    }
}

/// An external consumer that a stream can be piped into.
///
/// `write` may take as long as the consumer needs; the stream is not pulled
/// while a write is pending.
#[async_trait]
pub trait PushSink<T>: Send
where
    T: Send + 'static,
{
    /// Receives one value.
    async fn write(&mut self, value: T) -> StreamResult<()>;

    /// Receives one unrecovered failure.
    async fn error(&mut self, failure: Failure) -> StreamResult<()>;

    /// Called once after the last event.
    async fn finish(&mut self) -> StreamResult<()>;
}
