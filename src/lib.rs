//! Multi-producer, multi-consumer bounded asynchronous channels.
//!
//! This crate provides a CSP-style bounded channel: a fixed-capacity buffer
//! connecting any number of [`Sender`]s to any number of [`Receiver`]s.
//! Operations that cannot complete immediately suspend the calling task
//! rather than blocking a thread, and resume when the channel makes
//! progress.
//!
//! On top of the channel core, [`select::Select`] lets a task wait on
//! several channels at once and react to whichever becomes ready first,
//! with uniform-random tie-breaking among cases that are simultaneously
//! ready. The [`timer`] module provides an `after(duration)` helper for
//! composing timeouts out of a `Select`, and [`stream_ext`] provides the
//! usual stream combinators (`map`, `where_`, `merge`, `spread`, ...) as
//! thin tasks built on top of send/receive.
//!
//! # Example
//!
//! ```
//! use futures_executor::block_on;
//!
//! let (tx, mut rx) = parkline::channel(4).unwrap();
//!
//! block_on(async {
//!     tx.send(1).await.unwrap();
//!     tx.send(2).await.unwrap();
//!     tx.close();
//!
//!     assert_eq!(rx.recv().await, Ok(1));
//!     assert_eq!(rx.recv().await, Ok(2));
//!     assert!(rx.recv().await.is_err());
//! });
//! ```
#![warn(missing_docs, missing_debug_implementations, unreachable_pub)]

mod chan;
pub mod select;
pub mod stream_ext;
pub mod timer;

use std::fmt;
use std::sync::Arc;

use chan::Inner;

pub use chan::{InvalidCapacity, Recv, Send, TryRecvError, TrySendError};

/// Creates a bounded channel, returning the [`Sender`] and [`Receiver`]
/// halves.
///
/// # Errors
///
/// Returns [`InvalidCapacity`] if `capacity` is 0. A channel must be able
/// to hold at least one item.
pub fn channel<T>(capacity: usize) -> Result<(Sender<T>, Receiver<T>), InvalidCapacity> {
    let inner = Arc::new(Inner::new(capacity)?);
    inner.add_sender();
    inner.add_receiver();

    Ok((Sender { inner: inner.clone() }, Receiver { inner, waiter: None }))
}

/// The sending half of a bounded channel.
///
/// Cloning a `Sender` creates another producer handle on the same channel;
/// the channel is only closed once every clone (and the paired
/// [`Receiver`]s) have been dropped or have called [`Sender::close`] /
/// [`Receiver::close`].
pub struct Sender<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Sender<T> {
    /// Sends an item, returning a future that resolves once the item has
    /// been buffered, handed off to a parked receiver, or rejected because
    /// the channel is closed.
    pub fn send(&self, item: T) -> Send<'_, T> {
        chan::send(&self.inner, item)
    }

    /// Attempts to send an item without suspending.
    ///
    /// Returns [`TrySendError::Full`] if the channel has no room and no
    /// receiver is parked, or [`TrySendError::Closed`] if the channel is
    /// closed. Either way the item is handed back to the caller.
    pub fn try_send(&self, item: T) -> Result<(), TrySendError<T>> {
        chan::try_send(&self.inner, item)
    }

    /// Closes the channel.
    ///
    /// Idempotent: calling this more than once, or from more than one
    /// `Sender` clone, has the same effect as calling it once. Already
    /// parked receivers observe a closed channel; already parked senders
    /// are failed with [`SendError`].
    pub fn close(&self) {
        chan::close(&self.inner);
    }

    /// Returns `true` if the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.inner.add_sender();
        Sender { inner: self.inner.clone() }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        self.inner.drop_sender();
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender").finish_non_exhaustive()
    }
}

/// The receiving half of a bounded channel.
///
/// Cloning a `Receiver` creates another consumer handle on the same
/// channel; items are distributed across all live receivers, each item
/// delivered to exactly one of them.
pub struct Receiver<T> {
    inner: Arc<Inner<T>>,
    waiter: Option<chan::RecvWaiterHandle<T>>,
}

impl<T> Receiver<T> {
    /// Receives an item, returning a future that resolves with `Ok(item)`
    /// once one is available, or `Err(RecvError)` once the channel is
    /// closed and drained.
    pub fn recv(&mut self) -> Recv<'_, T> {
        chan::recv(self)
    }

    pub(crate) fn parts_mut(&mut self) -> (&Inner<T>, &mut Option<chan::RecvWaiterHandle<T>>) {
        (&self.inner, &mut self.waiter)
    }

    pub(crate) fn inner_arc(&self) -> Arc<Inner<T>> {
        self.inner.clone()
    }

    /// Attempts to receive an item without suspending.
    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        chan::try_recv(&self.inner)
    }

    /// Closes the channel. See [`Sender::close`].
    pub fn close(&self) {
        chan::close(&self.inner);
    }

    /// Returns `true` if the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        self.inner.add_receiver();
        Receiver { inner: self.inner.clone(), waiter: None }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.inner.drop_receiver();
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver").finish_non_exhaustive()
    }
}

impl<T> futures_core::Stream for Receiver<T> {
    type Item = T;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<T>> {
        let this = self.get_mut();
        chan::poll_recv_shared(&this.inner, &mut this.waiter, cx).map(|r| r.ok())
    }
}

/// Error returned by a parked [`Sender::send`] when the channel is closed
/// before the item could be delivered.
///
/// Carries the item back to the caller, following the convention of
/// [`std::sync::mpsc::SendError`].
pub struct SendError<T>(pub T);

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendError").finish_non_exhaustive()
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sending into a closed channel")
    }
}

impl<T> std::error::Error for SendError<T> {}

impl<T: PartialEq> PartialEq for SendError<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: Eq> Eq for SendError<T> {}

/// Error returned by [`Receiver::recv`] when the channel is closed and
/// drained. Carries no payload: the channel's `ok` bit collapses to this
/// single unit variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvError;

impl fmt::Display for RecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "receiving from an empty and closed channel")
    }
}

impl std::error::Error for RecvError {}
