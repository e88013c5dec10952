//! Lazy Handle
//!
//! Coalesced, retryable initialization for expensive shared resources
//! (store connections, embedding models).

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Result;

type InitFuture<T> = Shared<BoxFuture<'static, Result<Arc<T>>>>;

enum State<T: ?Sized> {
    Idle,
    Pending { attempt: u64, init: InitFuture<T> },
    Ready(Arc<T>),
}

/// A lazily initialized handle.
///
/// Callers arriving while an initialization is in flight await that same
/// future and observe its outcome. A failed initialization resets the handle
/// so the next caller starts over.
pub struct LazyHandle<T: ?Sized> {
    state: Mutex<State<T>>,
    attempts: AtomicU64,
}

impl<T: ?Sized + Send + Sync + 'static> Default for LazyHandle<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + Send + Sync + 'static> LazyHandle<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Idle),
            attempts: AtomicU64::new(0),
        }
    }

    /// Return the initialized value, running `init` only if no value exists
    /// and no initialization is in flight.
    pub async fn get_or_init<F, Fut>(&self, init: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<T>>> + Send + 'static,
    {
        let (attempt, pending) = {
            let mut state = self.state.lock();
            match &*state {
                State::Ready(value) => return Ok(value.clone()),
                State::Pending { attempt, init } => (*attempt, init.clone()),
                State::Idle => {
                    let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
                    let fut = init().boxed().shared();
                    *state = State::Pending {
                        attempt,
                        init: fut.clone(),
                    };
                    (attempt, fut)
                }
            }
        };

        let result = pending.await;

        let mut state = self.state.lock();
        if let State::Pending { attempt: current, .. } = &*state {
            if *current == attempt {
                *state = match &result {
                    Ok(value) => State::Ready(value.clone()),
                    Err(_) => State::Idle,
                };
            }
        }
        result
    }

    /// Check if the handle holds an initialized value
    pub fn is_ready(&self) -> bool {
        matches!(&*self.state.lock(), State::Ready(_))
    }

    /// Number of initializations started so far
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }
}
