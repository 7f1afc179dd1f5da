//! Fan-out: error observers, retained unhandled failures and value observers

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::channel::mpsc::UnboundedSender;
use futures::task::AtomicWaker;

use crate::event::{Event, Failure};

type ErrorObserver = Box<dyn FnMut(&Failure) + Send>;

#[derive(Default)]
struct HubState {
    observers: Vec<ErrorObserver>,
    retained: VecDeque<Failure>,
    dispatching: bool,
    joined: Vec<Arc<ErrorHub>>,
}

/// Error observers shared by every node of one pipeline.
///
/// Unhandled failures that reach a terminal consumer are delivered here. With
/// no observer registered they are retained, and handed to the first observer
/// that subscribes later.
///
/// A merged pipeline joins the hubs of the streams it merges, so their
/// observers also see failures that reach the end of the merged stream.
#[derive(Default)]
pub(crate) struct ErrorHub {
    state: Mutex<HubState>,
}

impl ErrorHub {
    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn subscribe(&self, observer: ErrorObserver) {
        let backlog: Vec<Failure> = {
            let mut state = self.lock();
            state.observers.push(observer);
            state.retained.drain(..).collect()
        };
        if !backlog.is_empty() {
            log::debug!("re-delivering {} retained failure(s) to new observer", backlog.len());
        }
        for failure in backlog {
            self.notify(failure);
        }
    }

    /// Forwards failures surfaced here to the observers of `other` as well.
    ///
    /// Failures `other` has retained so far move over to this hub.
    pub(crate) fn join(&self, other: Arc<ErrorHub>) {
        if std::ptr::eq(self, Arc::as_ptr(&other)) {
            return;
        }
        {
            let mut state = self.lock();
            if state.joined.iter().any(|hub| Arc::ptr_eq(hub, &other)) {
                return;
            }
            state.joined.push(Arc::clone(&other));
        }
        for failure in other.take_retained() {
            self.notify(failure);
        }
    }

    /// Delivers one unhandled failure to every observer, or retains it.
    pub(crate) fn notify(&self, failure: Failure) {
        if !self.deliver(&failure) {
            log::warn!("unhandled stream failure retained: {}", failure);
            self.lock().retained.push_back(failure);
        }
    }

    fn deliver(&self, failure: &Failure) -> bool {
        let joined = self.lock().joined.clone();
        let mut delivered = self.dispatch(failure);
        for hub in joined {
            delivered |= hub.deliver(failure);
        }
        delivered
    }

    /// Runs this hub's own observers. False if none took the failure.
    fn dispatch(&self, failure: &Failure) -> bool {
        let mut observers = {
            let mut state = self.lock();
            if state.observers.is_empty() || state.dispatching {
                return false;
            }
            state.dispatching = true;
            std::mem::take(&mut state.observers)
        };

        let mut panicked = Vec::new();
        for (index, observer) in observers.iter_mut().enumerate() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| observer(failure))) {
                let reason = panic_message(payload.as_ref());
                log::error!("error observer panicked: {}", reason);
                panicked.push((index, Failure::msg(format!("error observer panicked: {}", reason))));
            }
        }

        // A panicking observer is reported to the others, never back to itself.
        for (culprit, failure) in panicked {
            let mut delivered = false;
            for (index, observer) in observers.iter_mut().enumerate() {
                if index == culprit {
                    continue;
                }
                delivered = true;
                if catch_unwind(AssertUnwindSafe(|| observer(&failure))).is_err() {
                    log::error!("error observer panicked while handling an observer panic");
                }
            }
            if !delivered {
                self.lock().retained.push_back(failure);
            }
        }

        let mut state = self.lock();
        observers.append(&mut state.observers);
        state.observers = observers;
        state.dispatching = false;
        true
    }

    pub(crate) fn has_observers(&self) -> bool {
        let joined = {
            let state = self.lock();
            if !state.observers.is_empty() {
                return true;
            }
            state.joined.clone()
        };
        joined.iter().any(|hub| hub.has_observers())
    }

    pub(crate) fn retained(&self) -> Vec<Failure> {
        self.lock().retained.iter().cloned().collect()
    }

    pub(crate) fn take_retained(&self) -> Vec<Failure> {
        self.lock().retained.drain(..).collect()
    }

    /// Last-resort notification for failures nobody observed.
    pub(crate) fn report_retained(&self) {
        for failure in self.lock().retained.iter() {
            log::error!("unhandled stream failure: {}", failure);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Cloneable handle on a pipeline's error observers.
#[derive(Clone)]
pub struct ErrorHandle {
    hub: Arc<ErrorHub>,
}

impl ErrorHandle {
    pub(crate) fn new(hub: Arc<ErrorHub>) -> Self {
        Self { hub }
    }

    /// Registers an observer; retained failures are delivered to it immediately.
    pub fn subscribe<F>(&self, observer: F)
    where
        F: FnMut(&Failure) + Send + 'static,
    {
        self.hub.subscribe(Box::new(observer));
    }

    /// Failures that reached the end of the pipeline with no observer registered.
    pub fn unhandled(&self) -> Vec<Failure> {
        self.hub.retained()
    }

    pub fn take_unhandled(&self) -> Vec<Failure> {
        self.hub.take_retained()
    }

    pub fn has_observers(&self) -> bool {
        self.hub.has_observers()
    }
}

/// Broadcast list of value observers owned by one stream node.
///
/// Each observer receives its own copy of every event, in emission order.
pub(crate) struct ValueObservers<T> {
    observers: Vec<Box<dyn FnMut(&Event<T>) -> bool + Send>>,
}

impl<T> Default for ValueObservers<T> {
    fn default() -> Self {
        Self {
            observers: Vec::new(),
        }
    }
}

impl<T> ValueObservers<T> {
    pub(crate) fn attach(&mut self, tx: UnboundedSender<Event<T>>)
    where
        T: Clone + Send + 'static,
    {
        self.observers.push(Box::new(move |event: &Event<T>| {
            tx.unbounded_send(event.clone()).is_ok()
        }));
    }

    pub(crate) fn broadcast(&mut self, event: &Event<T>) {
        if self.observers.is_empty() {
            return;
        }
        // Observers whose receiving end is gone drop out of the list.
        self.observers.retain_mut(|observer| observer(event));
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }
}

#[derive(Default)]
struct PauseState {
    paused: AtomicBool,
    waker: AtomicWaker,
}

/// Suspends and resumes pulling on a stream from outside its consumer.
///
/// While paused the stream does not pull its upstream; events already
/// buffered stay buffered and are delivered after `resume`.
#[derive(Clone, Default)]
pub struct PauseHandle {
    state: Arc<PauseState>,
}

impl PauseHandle {
    pub fn pause(&self) {
        self.state.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.state.paused.store(false, Ordering::Release);
        self.state.waker.wake();
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::Acquire)
    }

    pub(crate) fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<()> {
        if !self.is_paused() {
            return Poll::Ready(());
        }
        self.state.waker.register(cx.waker());
        if self.is_paused() {
            Poll::Pending
        } else {
            Poll::Ready(())
        }
    }
}
