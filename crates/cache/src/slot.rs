//! In-flight load handle shared between the cache and its worker thread.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
};

use parking_lot::{Condvar, Mutex};

use crate::error::LoadFailure;

pub(crate) type Outcome<V> = Result<Arc<V>, LoadFailure>;

/// Settlement notification: flips once, wakes async waiters and blocked threads.
#[derive(Default)]
struct Signal {
    state: Mutex<SignalState>,
    settled: Condvar,
}

#[derive(Default)]
struct SignalState {
    settled: bool,
    wakers: Vec<Waker>,
}

impl Signal {
    fn notify(&self) {
        let wakers = {
            let mut state = self.state.lock();
            state.settled = true;
            std::mem::take(&mut state.wakers)
        };
        self.settled.notify_all();
        for waker in wakers {
            waker.wake();
        }
    }

    fn is_settled(&self) -> bool {
        self.state.lock().settled
    }

    fn wait(&self) {
        let mut state = self.state.lock();
        while !state.settled {
            self.settled.wait(&mut state);
        }
    }

    fn poll(&self, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = self.state.lock();
        if state.settled {
            return Poll::Ready(());
        }
        if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

/// Written once by the worker, read by the cache owner.
pub(crate) struct Slot<V> {
    key: String,
    outcome: Mutex<Option<Outcome<V>>>,
    signal: Arc<Signal>,
}

impl<V> Slot<V> {
    pub(crate) fn new(key: String) -> Self {
        Self {
            key,
            outcome: Mutex::new(None),
            signal: Arc::new(Signal::default()),
        }
    }

    /// Stores the outcome and wakes every waiter. Later calls are ignored.
    pub(crate) fn settle(&self, outcome: Outcome<V>) {
        {
            let mut slot = self.outcome.lock();
            if slot.is_some() {
                log::warn!("Ignoring second settlement of {}", self.key);
                return;
            }
            *slot = Some(outcome);
        }
        self.signal.notify();
    }

    pub(crate) fn outcome(&self) -> Option<Outcome<V>> {
        self.outcome.lock().clone()
    }

    pub(crate) fn suspension(&self) -> Suspension {
        Suspension {
            key: self.key.clone(),
            signal: Arc::clone(&self.signal),
        }
    }
}

/// Handle for a key that is still loading.
///
/// Awaiting it (or calling [`Suspension::wait`]) returns once the load has
/// settled; the caller then reads the key again to get the value or failure.
#[derive(Clone)]
pub struct Suspension {
    key: String,
    signal: Arc<Signal>,
}

impl Suspension {
    /// Debug rendering of the awaited key.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_settled(&self) -> bool {
        self.signal.is_settled()
    }

    /// Blocks the current thread until the load settles.
    pub fn wait(&self) {
        self.signal.wait();
    }
}

impl Future for Suspension {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.signal.poll(cx)
    }
}

impl fmt::Debug for Suspension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suspension")
            .field("key", &self.key)
            .field("settled", &self.is_settled())
            .finish()
    }
}
