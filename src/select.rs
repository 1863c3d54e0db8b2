//! Multi-way wait primitive: race readiness across several channels and run
//! exactly one handler for the winner.
//!
//! A naive implementation gives concurrently-arriving readiness a short
//! delay to "settle" before picking a random winner. This one instead uses
//! a proper two-phase registration barrier: every [`Select::case`] call
//! registers its readiness callback synchronously during the build phase,
//! and callbacks firing during that phase only ever append their case index
//! to a shared `immediate` list, guarded by the same mutex [`Select::end`]
//! uses to flip the instance from Building to Finalizing. Because both
//! sides contend on one mutex, there is no window in which a "concurrent
//! registration" can be missed, and no scheduling delay is needed.

use std::collections::hash_map::RandomState;
use std::future::Future;
use std::hash::{BuildHasher, Hasher};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use crate::{chan, RecvError, Receiver};

type CaseFuture<'env> = Pin<Box<dyn Future<Output = ()> + Send + 'env>>;
type Thunk<'env> = Box<dyn FnOnce() -> CaseFuture<'env> + Send + 'env>;

struct Shared {
    cases_built: bool,
    immediate: Vec<usize>,
    has_selected: bool,
    winner: Option<usize>,
    waker: Option<Waker>,
}

/// A single-use multi-way wait over several channels.
///
/// Build it up with repeated calls to [`Select::case`], then consume it
/// with [`Select::end`]. Because `end` takes `self` by value, a `Select`
/// cannot be reused after completion: the "illegal state" a dynamically
/// typed implementation would need to guard against at runtime is, here,
/// simply unrepresentable.
pub struct Select<'env> {
    shared: Arc<Mutex<Shared>>,
    cases: Vec<Option<Thunk<'env>>>,
    clearers: Vec<Box<dyn FnOnce() + Send + 'env>>,
}

impl<'env> Select<'env> {
    /// Creates a new, empty `Select`.
    pub fn new() -> Self {
        Select {
            shared: Arc::new(Mutex::new(Shared {
                cases_built: false,
                immediate: Vec::new(),
                has_selected: false,
                winner: None,
                waker: None,
            })),
            cases: Vec::new(),
            clearers: Vec::new(),
        }
    }

    /// Adds a case: if `receiver` becomes ready (an item is available, or
    /// the channel closes) before every other case, `handler` is invoked
    /// with the result of an actual `recv()` performed on `receiver` at
    /// that moment. Otherwise `receiver` and `handler` are dropped,
    /// unconsumed, once the `Select` completes.
    pub fn case<T, F, Fut>(&mut self, receiver: &'env mut Receiver<T>, handler: F)
    where
        T: Send + 'env,
        F: FnOnce(Result<T, RecvError>) -> Fut + Send + 'env,
        Fut: Future<Output = ()> + Send + 'env,
    {
        let index = self.cases.len();
        let inner_arc = receiver.inner_arc();

        let thunk: Thunk<'env> = Box::new(move || -> CaseFuture<'env> {
            Box::pin(async move {
                let result = receiver.recv().await;
                handler(result).await;
            })
        });
        self.cases.push(Some(thunk));

        let shared = self.shared.clone();
        let callback: Box<dyn FnOnce() + Send> = Box::new(move || {
            let mut shared = shared.lock().unwrap();
            if !shared.cases_built {
                shared.immediate.push(index);
            } else if !shared.has_selected {
                shared.has_selected = true;
                shared.winner = Some(index);
                if let Some(w) = shared.waker.take() {
                    drop(shared);
                    w.wake();
                }
            }
        });
        chan::register_ready(&inner_arc, callback);

        self.clearers
            .push(Box::new(move || chan::clear_ready(&inner_arc)));
    }

    /// Finalizes the build and returns a future that resolves once exactly
    /// one case's handler has run to completion.
    pub fn end(mut self) -> impl Future<Output = ()> + Send + 'env {
        async move {
            {
                let mut shared = self.shared.lock().unwrap();
                shared.cases_built = true;
                if !shared.has_selected && !shared.immediate.is_empty() {
                    let pick = random_index(shared.immediate.len());
                    let winner = shared.immediate[pick];
                    shared.has_selected = true;
                    shared.winner = Some(winner);
                }
            }

            let winner = WaitForWinner { shared: self.shared.clone() }.await;

            for (i, clearer) in self.clearers.drain(..).enumerate() {
                if i != winner {
                    clearer();
                }
            }

            let thunk = self.cases[winner].take().expect("winner case polled twice");
            thunk().await;
        }
    }
}

impl<'env> Default for Select<'env> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'env> Drop for Select<'env> {
    fn drop(&mut self) {
        // Covers both an instance dropped without ever calling `end()`, and
        // the future returned by `end()` being dropped before a winner was
        // chosen: in either case every case registered so far still has a
        // live readiness callback sitting in its channel's slot, and it
        // must be cleared here so it cannot fire into a `Select` that no
        // longer exists. Once `end()` has picked a winner it drains
        // `clearers` itself, so this is a no-op on the normal completion
        // path.
        for clearer in self.clearers.drain(..) {
            clearer();
        }
    }
}

impl std::fmt::Debug for Select<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Select").finish_non_exhaustive()
    }
}

struct WaitForWinner {
    shared: Arc<Mutex<Shared>>,
}

impl Future for WaitForWinner {
    type Output = usize;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<usize> {
        let mut shared = self.shared.lock().unwrap();
        match shared.winner {
            Some(w) => Poll::Ready(w),
            None => {
                shared.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

/// Picks a uniformly distributed index in `0..n` without pulling in a
/// dedicated RNG crate. `RandomState` draws two fresh random keys from the
/// operating system on every construction, so hashing nothing and taking
/// the resulting digest is itself a serviceable one-shot random draw.
fn random_index(n: usize) -> usize {
    debug_assert!(n > 0);
    if n == 1 {
        return 0;
    }
    let entropy = RandomState::new().build_hasher().finish();
    (entropy % n as u64) as usize
}
