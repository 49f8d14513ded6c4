/// Async priority queue feeding a fixed pool of workers.
///
/// Lower priority values are popped first; equal priorities pop in push
/// order. Workers call [`TaskQueue::pop`] in a loop and stop once it returns
/// `None` after [`TaskQueue::close`].
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug)]
struct QueuedTask<T> {
    priority: u32,
    sequence: u64,
    task: T,
}

impl<T> PartialEq for QueuedTask<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl<T> Eq for QueuedTask<T> {}

impl<T> PartialOrd for QueuedTask<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for QueuedTask<T> {
    // BinaryHeap is a max-heap: the lowest (priority, sequence) must compare greatest.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Debug)]
struct QueueState<T> {
    heap: BinaryHeap<QueuedTask<T>>,
    next_sequence: u64,
    is_closed: bool,
}

#[derive(Debug)]
pub struct TaskQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_sequence: 0,
                is_closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Queue a task. Returns `false` if the queue is closed.
    pub fn push(&self, task: T, priority: u32) -> bool {
        {
            let mut state = self.state.lock();
            if state.is_closed {
                return false;
            }
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.heap.push(QueuedTask {
                priority,
                sequence,
                task,
            });
        }
        self.notify.notify_one();
        true
    }

    /// Wait for the most urgent task.
    ///
    /// Returns `None` once the queue is closed.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before inspecting state so a close in between is not missed.
            notified.as_mut().enable();

            if let Some(task) = self.try_pop() {
                return Some(task);
            }
            if self.is_closed() {
                return None;
            }

            notified.await;
        }
    }

    /// Pop the most urgent task without waiting.
    pub fn try_pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        if state.is_closed {
            return None;
        }
        state.heap.pop().map(|queued| queued.task)
    }

    /// Number of tasks waiting. Tasks already handed to a worker are not counted.
    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().is_closed
    }

    /// Reject further pushes, drop waiting tasks and release idle workers.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            state.is_closed = true;
            state.heap.clear();
        }
        self.notify.notify_waiters();
    }
}
