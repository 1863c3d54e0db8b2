//! The bounded channel core: buffer, parked-waiter queues, and close
//! protocol, guarded by a single mutex per channel.
//!
//! Unlike a single-producer/single-consumer ring buffer, this core must
//! support any number of concurrent [`crate::Sender`] and [`crate::Receiver`]
//! handles, so the parked-waiter queues are genuine multi-entry FIFOs rather
//! than a one-slot wake hint. A parked sender or receiver is represented by
//! a small heap-allocated slot (`Arc<Mutex<_>>`) shared between the queue
//! entry and the future awaiting it; this lets a future cancel itself by
//! removing its own slot from the queue on drop, without disturbing the
//! order of the remaining waiters.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use crate::{RecvError, SendError};

struct SendWaiterInner<T> {
    item: Option<T>,
    waker: Option<Waker>,
    outcome: Option<Result<(), ()>>,
}

struct RecvWaiterInner<T> {
    waker: Option<Waker>,
    outcome: Option<Result<T, ()>>,
}

type SendWaiterHandle<T> = Arc<Mutex<SendWaiterInner<T>>>;
pub(crate) type RecvWaiterHandle<T> = Arc<Mutex<RecvWaiterInner<T>>>;

/// The one-shot readiness callback: invoked once when a receive may now
/// succeed. See the module docs for the register/fire contract.
type ReadyCallback = Box<dyn FnOnce() + Send>;

struct State<T> {
    capacity: usize,
    buffer: VecDeque<T>,
    senders_parked: VecDeque<SendWaiterHandle<T>>,
    receivers_parked: VecDeque<RecvWaiterHandle<T>>,
    closed: bool,
    ready_slot: Option<ReadyCallback>,
}

pub(crate) struct Inner<T> {
    state: Mutex<State<T>>,
    sender_count: AtomicUsize,
    receiver_count: AtomicUsize,
}

impl<T> Inner<T> {
    pub(crate) fn new(capacity: usize) -> Result<Self, InvalidCapacity> {
        if capacity < 1 {
            return Err(InvalidCapacity);
        }
        Ok(Inner {
            state: Mutex::new(State {
                capacity,
                buffer: VecDeque::with_capacity(capacity),
                senders_parked: VecDeque::new(),
                receivers_parked: VecDeque::new(),
                closed: false,
                ready_slot: None,
            }),
            sender_count: AtomicUsize::new(0),
            receiver_count: AtomicUsize::new(0),
        })
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub(crate) fn add_sender(&self) {
        // Relaxed: this handle is only ever derived from another live
        // handle, so no data synchronized through the count needs to be
        // visible yet.
        self.sender_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn drop_sender(&self) {
        if self.sender_count.fetch_sub(1, Ordering::Release) == 1 {
            std::sync::atomic::fence(Ordering::Acquire);
            close(self);
        }
    }

    pub(crate) fn add_receiver(&self) {
        self.receiver_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn drop_receiver(&self) {
        if self.receiver_count.fetch_sub(1, Ordering::Release) == 1 {
            std::sync::atomic::fence(Ordering::Acquire);
            close(self);
        }
    }
}

fn resolve_send_waiter_locked<T>(handle: &SendWaiterHandle<T>, ok: bool) {
    let mut g = handle.lock().unwrap();
    g.outcome = Some(if ok { Ok(()) } else { Err(()) });
    if let Some(w) = g.waker.take() {
        drop(g);
        w.wake();
    }
}

fn resolve_recv_waiter_locked<T>(handle: &RecvWaiterHandle<T>, outcome: Result<T, ()>) {
    let mut g = handle.lock().unwrap();
    g.outcome = Some(outcome);
    if let Some(w) = g.waker.take() {
        drop(g);
        w.wake();
    }
}

/// Registers a one-shot readiness callback: invoked immediately if the
/// channel is already closed or non-empty, otherwise stashed until the
/// next `Send`/`Close` fires it. Used only by [`crate::select::Select`].
pub(crate) fn register_ready<T>(inner: &Inner<T>, callback: ReadyCallback) {
    let mut state = inner.state.lock().unwrap();
    if state.closed || !state.buffer.is_empty() {
        drop(state);
        callback();
    } else {
        state.ready_slot = Some(callback);
    }
}

/// Clears a previously registered readiness slot without firing it, so a
/// discarded `Select` instance cannot leave a stale callback behind.
pub(crate) fn clear_ready<T>(inner: &Inner<T>) {
    inner.state.lock().unwrap().ready_slot = None;
}

pub(crate) fn try_send<T>(inner: &Inner<T>, item: T) -> Result<(), TrySendError<T>> {
    let mut state = inner.state.lock().unwrap();
    if state.closed {
        return Err(TrySendError::Closed(item));
    }
    if let Some(recv_handle) = state.receivers_parked.pop_front() {
        resolve_recv_waiter_locked(&recv_handle, Ok(item));
        return Ok(());
    }
    if state.buffer.len() < state.capacity {
        state.buffer.push_back(item);
        let cb = state.ready_slot.take();
        drop(state);
        if let Some(cb) = cb {
            cb();
        }
        return Ok(());
    }
    Err(TrySendError::Full(item))
}

pub(crate) fn try_recv<T>(inner: &Inner<T>) -> Result<T, TryRecvError> {
    let mut state = inner.state.lock().unwrap();
    if let Some(item) = state.buffer.pop_front() {
        if let Some(send_handle) = state.senders_parked.pop_front() {
            let sender_item = {
                let mut g = send_handle.lock().unwrap();
                g.item.take().unwrap()
            };
            state.buffer.push_back(sender_item);
            resolve_send_waiter_locked(&send_handle, true);
        } else {
            let cb = state.ready_slot.take();
            drop(state);
            if let Some(cb) = cb {
                cb();
            }
        }
        return Ok(item);
    }
    if state.closed {
        Err(TryRecvError::Closed)
    } else {
        Err(TryRecvError::Empty)
    }
}

pub(crate) fn close<T>(inner: &Inner<T>) {
    let mut state = inner.state.lock().unwrap();
    if state.closed {
        return;
    }
    state.closed = true;

    let receivers: Vec<_> = state.receivers_parked.drain(..).collect();
    for r in &receivers {
        resolve_recv_waiter_locked(r, Err(()));
    }
    let senders: Vec<_> = state.senders_parked.drain(..).collect();
    for s in &senders {
        resolve_send_waiter_locked(s, false);
    }

    let cb = state.ready_slot.take();
    drop(state);
    if let Some(cb) = cb {
        cb();
    }
}

fn poll_send<T>(
    inner: &Inner<T>,
    item: &mut Option<T>,
    waiter: &mut Option<SendWaiterHandle<T>>,
    cx: &mut Context<'_>,
) -> Poll<Result<(), SendError<T>>> {
    if let Some(handle) = waiter.take() {
        let mut g = handle.lock().unwrap();
        return match g.outcome.take() {
            None => {
                g.waker = Some(cx.waker().clone());
                drop(g);
                *waiter = Some(handle);
                Poll::Pending
            }
            Some(Ok(())) => Poll::Ready(Ok(())),
            Some(Err(())) => {
                let returned = g.item.take().unwrap();
                Poll::Ready(Err(SendError(returned)))
            }
        };
    }

    let it = item.take().expect("Send polled after completion");
    let mut state = inner.state.lock().unwrap();
    if state.closed {
        return Poll::Ready(Err(SendError(it)));
    }
    if let Some(recv_handle) = state.receivers_parked.pop_front() {
        resolve_recv_waiter_locked(&recv_handle, Ok(it));
        return Poll::Ready(Ok(()));
    }
    if state.buffer.len() < state.capacity {
        state.buffer.push_back(it);
        let cb = state.ready_slot.take();
        drop(state);
        if let Some(cb) = cb {
            cb();
        }
        return Poll::Ready(Ok(()));
    }
    let handle = Arc::new(Mutex::new(SendWaiterInner {
        item: Some(it),
        waker: Some(cx.waker().clone()),
        outcome: None,
    }));
    state.senders_parked.push_back(handle.clone());
    *waiter = Some(handle);
    Poll::Pending
}

fn poll_recv<T>(
    inner: &Inner<T>,
    waiter: &mut Option<RecvWaiterHandle<T>>,
    cx: &mut Context<'_>,
) -> Poll<Result<T, RecvError>> {
    if let Some(handle) = waiter.take() {
        let mut g = handle.lock().unwrap();
        return match g.outcome.take() {
            None => {
                g.waker = Some(cx.waker().clone());
                drop(g);
                *waiter = Some(handle);
                Poll::Pending
            }
            Some(Ok(item)) => Poll::Ready(Ok(item)),
            Some(Err(())) => Poll::Ready(Err(RecvError)),
        };
    }

    let mut state = inner.state.lock().unwrap();
    if let Some(item) = state.buffer.pop_front() {
        if let Some(send_handle) = state.senders_parked.pop_front() {
            let sender_item = {
                let mut g = send_handle.lock().unwrap();
                g.item.take().unwrap()
            };
            state.buffer.push_back(sender_item);
            resolve_send_waiter_locked(&send_handle, true);
        } else {
            let cb = state.ready_slot.take();
            drop(state);
            if let Some(cb) = cb {
                cb();
            }
        }
        return Poll::Ready(Ok(item));
    }
    if state.closed {
        return Poll::Ready(Err(RecvError));
    }
    let handle = Arc::new(Mutex::new(RecvWaiterInner {
        waker: Some(cx.waker().clone()),
        outcome: None,
    }));
    state.receivers_parked.push_back(handle.clone());
    // Spurious wake hint: no item is actually available yet, but a select
    // in progress elsewhere may want to know this channel is being watched.
    let cb = state.ready_slot.take();
    drop(state);
    if let Some(cb) = cb {
        cb();
    }
    *waiter = Some(handle);
    Poll::Pending
}

/// Polls this receiver's current parked wait, if any, or starts a fresh
/// receive attempt. Shared by [`crate::Receiver`]'s `Stream` impl and by
/// [`Recv`].
pub(crate) fn poll_recv_shared<T>(
    inner: &Inner<T>,
    waiter: &mut Option<RecvWaiterHandle<T>>,
    cx: &mut Context<'_>,
) -> Poll<Result<T, RecvError>> {
    poll_recv(inner, waiter, cx)
}

pub(crate) fn send<T>(inner: &Inner<T>, item: T) -> Send<'_, T> {
    Send { inner, item: Some(item), waiter: None }
}

pub(crate) fn recv<T>(receiver: &mut crate::Receiver<T>) -> Recv<'_, T> {
    Recv { receiver }
}

/// Future returned by [`crate::Sender::send`].
#[must_use = "futures do nothing unless polled or awaited"]
pub struct Send<'a, T> {
    inner: &'a Inner<T>,
    item: Option<T>,
    waiter: Option<SendWaiterHandle<T>>,
}

impl<T> fmt::Debug for Send<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Send").finish_non_exhaustive()
    }
}

impl<'a, T> Future for Send<'a, T> {
    type Output = Result<(), SendError<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        poll_send(this.inner, &mut this.item, &mut this.waiter, cx)
    }
}

impl<T> Drop for Send<'_, T> {
    fn drop(&mut self) {
        if let Some(handle) = self.waiter.take() {
            let mut state = self.inner.state.lock().unwrap();
            if let Some(pos) = state
                .senders_parked
                .iter()
                .position(|h| Arc::ptr_eq(h, &handle))
            {
                state.senders_parked.remove(pos);
            }
        }
    }
}

/// Future returned by [`crate::Receiver::recv`].
#[must_use = "futures do nothing unless polled or awaited"]
pub struct Recv<'a, T> {
    receiver: &'a mut crate::Receiver<T>,
}

impl<T> fmt::Debug for Recv<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recv").finish_non_exhaustive()
    }
}

impl<'a, T> Future for Recv<'a, T> {
    type Output = Result<T, RecvError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let (inner, waiter) = this.receiver.parts_mut();
        poll_recv(inner, waiter, cx)
    }
}

impl<T> Drop for Recv<'_, T> {
    fn drop(&mut self) {
        let (inner, waiter) = self.receiver.parts_mut();
        if let Some(handle) = waiter.take() {
            let mut state = inner.state.lock().unwrap();
            if let Some(pos) = state
                .receivers_parked
                .iter()
                .position(|h| Arc::ptr_eq(h, &handle))
            {
                state.receivers_parked.remove(pos);
            }
        }
    }
}

/// Error returned by [`crate::Sender::try_send`].
pub enum TrySendError<T> {
    /// The buffer is full and no receiver is parked to hand the item to
    /// directly.
    Full(T),
    /// The channel is closed.
    Closed(T),
}

impl<T> TrySendError<T> {
    /// Consumes the error, returning the item that failed to send.
    pub fn into_inner(self) -> T {
        match self {
            TrySendError::Full(item) | TrySendError::Closed(item) => item,
        }
    }

    /// Returns `true` if the channel was closed rather than merely full.
    pub fn is_closed(&self) -> bool {
        matches!(self, TrySendError::Closed(_))
    }
}

impl<T> fmt::Debug for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrySendError::Full(_) => f.write_str("TrySendError::Full(..)"),
            TrySendError::Closed(_) => f.write_str("TrySendError::Closed(..)"),
        }
    }
}

impl<T> fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrySendError::Full(_) => write!(f, "channel is full"),
            TrySendError::Closed(_) => write!(f, "channel is closed"),
        }
    }
}

impl<T> std::error::Error for TrySendError<T> {}

/// Error returned by [`crate::Receiver::try_recv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// No item is currently buffered and no sender is parked.
    Empty,
    /// The channel is closed and fully drained.
    Closed,
}

impl fmt::Display for TryRecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryRecvError::Empty => write!(f, "channel is empty"),
            TryRecvError::Closed => write!(f, "channel is closed"),
        }
    }
}

impl std::error::Error for TryRecvError {}

/// Error returned by [`crate::channel`] when asked for a channel of
/// capacity 0. A channel must be able to hold at least one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidCapacity;

impl fmt::Display for InvalidCapacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel capacity must be at least 1")
    }
}

impl std::error::Error for InvalidCapacity {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn register_ready_fires_immediately_when_already_ready() {
        let inner = Inner::<i32>::new(1).unwrap();
        try_send(&inner, 1).unwrap();

        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();
        register_ready(&inner, Box::new(move || f.store(true, Ordering::SeqCst)));

        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn register_ready_stashes_until_fired_by_a_send() {
        let inner = Inner::<i32>::new(1).unwrap();

        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();
        register_ready(&inner, Box::new(move || f.store(true, Ordering::SeqCst)));
        assert!(!fired.load(Ordering::SeqCst));

        try_send(&inner, 1).unwrap();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn cleared_readiness_slot_does_not_fire() {
        let inner = Inner::<i32>::new(1).unwrap();

        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();
        register_ready(&inner, Box::new(move || f.store(true, Ordering::SeqCst)));
        clear_ready(&inner);

        try_send(&inner, 1).unwrap();
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn close_fires_a_pending_readiness_slot() {
        let inner = Inner::<i32>::new(1).unwrap();

        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();
        register_ready(&inner, Box::new(move || f.store(true, Ordering::SeqCst)));

        close(&inner);
        assert!(fired.load(Ordering::SeqCst));
    }
}
