//! Stream combinators over the channel core.
//!
//! Every function here is a thin composition of [`crate::Sender::send`] and
//! [`crate::Receiver::recv`]; none of them touch the channel core's
//! invariants directly, and their correctness reduces entirely to the
//! core's own send/receive/close contracts. Combinators that produce a new
//! channel (`map`, `where_`, `merge`, `merge_many`) return the new
//! [`Receiver`] paired with a driver future that the caller must poll to
//! completion — typically by spawning it on their executor of choice, or by
//! `join`-ing it with whatever consumes the returned receiver. This keeps
//! the crate free of a dependency on any particular task-spawning API.

use std::future::Future;

use futures_util::future::{join, join_all, FutureExt};

use crate::{channel, Receiver, Sender};

/// Sends every item of `items` in order, stopping at the first failure.
pub async fn send_all<T, I>(sender: &Sender<T>, items: I) -> Result<(), crate::SendError<T>>
where
    I: IntoIterator<Item = T>,
{
    for item in items {
        sender.send(item).await?;
    }
    Ok(())
}

/// Merges two receivers into one: every item sent on either `a` or `b` is
/// forwarded to the returned receiver, in the order it was observed. The
/// merged channel closes once both `a` and `b` are closed and drained.
///
/// # Panics
///
/// Panics if `capacity` is 0.
pub fn merge<T>(
    mut a: Receiver<T>,
    mut b: Receiver<T>,
    capacity: usize,
) -> (Receiver<T>, impl Future<Output = ()> + Send)
where
    T: Send + 'static,
{
    let (tx, rx) = channel(capacity).expect("capacity must be at least 1");
    let tx_a = tx.clone();
    let left = async move {
        while let Ok(item) = a.recv().await {
            if tx_a.send(item).await.is_err() {
                break;
            }
        }
    };
    let right = async move {
        while let Ok(item) = b.recv().await {
            if tx.send(item).await.is_err() {
                break;
            }
        }
    };
    (rx, join(left, right).map(|_| ()))
}

/// Merges any number of receivers into one, the same way [`merge`] merges
/// two.
///
/// # Panics
///
/// Panics if `capacity` is 0.
pub fn merge_many<T>(
    sources: impl IntoIterator<Item = Receiver<T>>,
    capacity: usize,
) -> (Receiver<T>, impl Future<Output = ()> + Send)
where
    T: Send + 'static,
{
    let (tx, rx) = channel(capacity).expect("capacity must be at least 1");
    let legs = sources.into_iter().map(move |mut source| {
        let tx = tx.clone();
        async move {
            while let Ok(item) = source.recv().await {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        }
    });
    (rx, join_all(legs).map(|_| ()))
}

/// Filters `source` down to the items for which `predicate` holds, driving
/// the result into a fresh channel of the given capacity.
///
/// # Panics
///
/// Panics if `capacity` is 0.
pub fn where_<T, F>(
    mut source: Receiver<T>,
    predicate: F,
    capacity: usize,
) -> (Receiver<T>, impl Future<Output = ()> + Send)
where
    T: Send + 'static,
    F: Fn(&T) -> bool + Send + 'static,
{
    let (tx, rx) = channel(capacity).expect("capacity must be at least 1");
    let driver = async move {
        while let Ok(item) = source.recv().await {
            if predicate(&item) && tx.send(item).await.is_err() {
                break;
            }
        }
        tx.close();
    };
    (rx, driver)
}

/// Maps every item of `source` through `f`, driving the result into a
/// fresh channel of the given capacity.
///
/// # Panics
///
/// Panics if `capacity` is 0.
pub fn map<T, U, F>(
    mut source: Receiver<T>,
    mut f: F,
    capacity: usize,
) -> (Receiver<U>, impl Future<Output = ()> + Send)
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnMut(T) -> U + Send + 'static,
{
    let (tx, rx) = channel(capacity).expect("capacity must be at least 1");
    let driver = async move {
        while let Ok(item) = source.recv().await {
            if tx.send(f(item)).await.is_err() {
                break;
            }
        }
        tx.close();
    };
    (rx, driver)
}

/// Forwards every item of `source` into `target`, until `source` closes or
/// `target` rejects a send because it has closed. Does not close `target`
/// itself, since it may have other producers.
pub async fn forward<T: Send>(mut source: Receiver<T>, target: Sender<T>) {
    while let Ok(item) = source.recv().await {
        if target.send(item).await.is_err() {
            break;
        }
    }
}

/// Broadcasts every item of `source` to all of `targets`, awaiting every
/// target's send before advancing to the next item.
pub async fn spread<T>(mut source: Receiver<T>, targets: Vec<Sender<T>>)
where
    T: Clone + Send,
{
    while let Ok(item) = source.recv().await {
        let sends = targets.iter().map(|target| target.send(item.clone()));
        join_all(sends).await;
    }
}

/// Drains `source` to completion, discarding every item.
pub async fn purge<T: Send>(mut source: Receiver<T>) {
    while source.recv().await.is_ok() {}
}

/// Drains `source` to completion, returning the number of items observed.
pub async fn count<T: Send>(mut source: Receiver<T>) -> i64 {
    let mut n: i64 = 0;
    while source.recv().await.is_ok() {
        n += 1;
    }
    n
}

/// Invokes `action` for every item of `source`, awaiting each invocation
/// before pulling the next item. Pass a closure returning `async {}`
/// (`futures_util::future::ready(())`, or a truly asynchronous body) to
/// cover both the synchronous and asynchronous variant of this combinator.
pub async fn for_each<T, F, Fut>(mut source: Receiver<T>, mut action: F)
where
    T: Send,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = ()>,
{
    while let Ok(item) = source.recv().await {
        action(item).await;
    }
}
