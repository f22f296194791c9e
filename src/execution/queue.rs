//! # Work Queues
//!
//! Queues between submitters and pool workers. FIFO queues are crossbeam
//! channels; the priority queue is a binary heap guarded by a mutex and
//! condition variable.
//!
//! ## Priority ordering
//!
//! Larger declared priorities dequeue first. Items with equal priority have no
//! ordering guarantee relative to each other: the heap is not a stable queue,
//! so same-priority work may run in any order.

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use super::task::QueuedTask;
use crate::config::QueueKind;

/// Outcome of waiting on a queue.
#[derive(Debug)]
pub(crate) enum Poll {
    Task(QueuedTask),
    TimedOut,
    /// The queue is closed and empty.
    Closed,
}

pub(crate) trait WorkQueue: Send + Sync {
    /// Enqueue without blocking; hands the task back when there is no room or
    /// the queue is closed.
    fn offer(&self, task: QueuedTask) -> Result<(), QueuedTask>;

    /// Wait for work, at most `timeout` when given.
    fn poll(&self, timeout: Option<Duration>) -> Poll;

    fn try_poll(&self) -> Option<QueuedTask>;

    fn len(&self) -> usize;

    /// Refuse further offers and wake idle workers. Queued work stays
    /// available to `poll` until drained.
    fn close(&self);

    /// Remove and return everything queued.
    fn drain(&self) -> Vec<QueuedTask> {
        std::iter::from_fn(|| self.try_poll()).collect()
    }
}

pub(crate) fn build_queue(kind: &QueueKind) -> Box<dyn WorkQueue> {
    match kind {
        QueueKind::Unbounded => Box::new(ChannelWorkQueue::unbounded()),
        QueueKind::Bounded { capacity, .. } => Box::new(ChannelWorkQueue::bounded(*capacity)),
        QueueKind::Priority { initial_capacity } => {
            Box::new(PriorityWorkQueue::with_capacity(*initial_capacity))
        }
    }
}

/// Compare two declared priorities for dequeue order.
///
/// `Less` means `lhs` dequeues before `rhs`; larger priorities sort earlier,
/// i.e. the result is the sign of `rhs - lhs`.
pub fn compare_priority(lhs: i32, rhs: i32) -> Ordering {
    rhs.cmp(&lhs)
}

/// FIFO queue backed by a crossbeam channel.
pub(crate) struct ChannelWorkQueue {
    sender: Sender<QueuedTask>,
    receiver: Receiver<QueuedTask>,
    /// Dropped on close so that `select!` on the receiver side wakes up.
    closing: Mutex<Option<Sender<()>>>,
    closed: Receiver<()>,
}

impl ChannelWorkQueue {
    pub(crate) fn unbounded() -> Self {
        Self::from_channel(channel::unbounded())
    }

    pub(crate) fn bounded(capacity: usize) -> Self {
        Self::from_channel(channel::bounded(capacity))
    }

    fn from_channel((sender, receiver): (Sender<QueuedTask>, Receiver<QueuedTask>)) -> Self {
        let (closing, closed) = channel::bounded(0);
        Self {
            sender,
            receiver,
            closing: Mutex::new(Some(closing)),
            closed,
        }
    }

    fn after_close(&self) -> Poll {
        match self.receiver.try_recv() {
            Ok(task) => Poll::Task(task),
            Err(_) => Poll::Closed,
        }
    }
}

impl WorkQueue for ChannelWorkQueue {
    fn offer(&self, task: QueuedTask) -> Result<(), QueuedTask> {
        // Held across the send so an offer never lands after `close`
        let closing = self.closing.lock();
        if closing.is_none() {
            return Err(task);
        }
        self.sender.try_send(task).map_err(|e| e.into_inner())
    }

    fn poll(&self, timeout: Option<Duration>) -> Poll {
        if let Ok(task) = self.receiver.try_recv() {
            return Poll::Task(task);
        }
        match timeout {
            Some(timeout) => channel::select! {
                recv(self.receiver) -> task => task.map_or(Poll::Closed, Poll::Task),
                recv(self.closed) -> _ => self.after_close(),
                default(timeout) => Poll::TimedOut,
            },
            None => channel::select! {
                recv(self.receiver) -> task => task.map_or(Poll::Closed, Poll::Task),
                recv(self.closed) -> _ => self.after_close(),
            },
        }
    }

    fn try_poll(&self) -> Option<QueuedTask> {
        match self.receiver.try_recv() {
            Ok(task) => Some(task),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    fn len(&self) -> usize {
        self.receiver.len()
    }

    fn close(&self) {
        self.closing.lock().take();
    }
}

struct HeapEntry(QueuedTask);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.priority == other.0.priority
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // BinaryHeap pops the greatest entry, which must be the one dequeued first
    fn cmp(&self, other: &Self) -> Ordering {
        compare_priority(other.0.priority, self.0.priority)
    }
}

struct HeapState {
    heap: BinaryHeap<HeapEntry>,
    closed: bool,
}

/// Unbounded queue ordered by declared priority. Ties are unordered.
pub(crate) struct PriorityWorkQueue {
    state: Mutex<HeapState>,
    available: Condvar,
}

impl PriorityWorkQueue {
    pub(crate) fn with_capacity(initial_capacity: usize) -> Self {
        Self {
            state: Mutex::new(HeapState {
                heap: BinaryHeap::with_capacity(initial_capacity),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }
}

impl WorkQueue for PriorityWorkQueue {
    fn offer(&self, task: QueuedTask) -> Result<(), QueuedTask> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(task);
        }
        state.heap.push(HeapEntry(task));
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    fn poll(&self, timeout: Option<Duration>) -> Poll {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut state = self.state.lock();
        loop {
            if let Some(HeapEntry(task)) = state.heap.pop() {
                return Poll::Task(task);
            }
            if state.closed {
                return Poll::Closed;
            }
            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut state, deadline).timed_out()
                        && state.heap.is_empty()
                    {
                        return if state.closed {
                            Poll::Closed
                        } else {
                            Poll::TimedOut
                        };
                    }
                }
                None => self.available.wait(&mut state),
            }
        }
    }

    fn try_poll(&self) -> Option<QueuedTask> {
        self.state.lock().heap.pop().map(|HeapEntry(task)| task)
    }

    fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }
}
