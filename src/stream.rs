//! Bounded record queues connecting pipeline stages.
//!
//! Every stage of the pipeline runs in its own thread and hands records to the next stage through a bounded
//! FIFO queue. A producer blocks while the queue is full, a consumer blocks while it is empty. Dropping the
//! producer side closes the queue, which consumers observe as the natural end of the stream.
//!
//! All blocking operations also wait on a shared [`CancelToken`], so cancelling the pipeline wakes up every
//! stage no matter where it is suspended.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{self, select, Receiver, Sender};
use log;

use crate::sort::SortError;

/// Default queue capacity in records.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Stream item. Errors travel downstream together with records.
pub type StreamItem<T> = Result<T, SortError>;

struct CancelState {
    cancelled: AtomicBool,
    // dropping the sender disconnects every signal receiver at once
    trigger: Mutex<Option<Sender<()>>>,
}

/// Pipeline cancellation signal shared by all the stages.
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<CancelState>,
    signal: Receiver<()>,
}

impl CancelToken {
    /// Creates a new token in the non-cancelled state.
    pub fn new() -> Self {
        let (trigger, signal) = crossbeam_channel::bounded(0);

        return CancelToken {
            state: Arc::new(CancelState {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
            }),
            signal,
        };
    }

    /// Cancels the pipeline. Every stage blocked on a queue wakes up and exits.
    pub fn cancel(&self) {
        if !self.state.cancelled.swap(true, Ordering::SeqCst) {
            log::debug!("pipeline cancelled");
            if let Ok(mut trigger) = self.state.trigger.lock() {
                trigger.take();
            }
        }
    }

    /// Checks whether the token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        CancelToken::new()
    }
}

/// Creates a bounded queue of the provided capacity bound to the cancellation token.
pub fn bounded<T>(capacity: usize, cancel: &CancelToken) -> (StreamSender<T>, RecordStream<T>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity);

    return (
        StreamSender {
            tx,
            cancel: cancel.clone(),
        },
        RecordStream {
            rx,
            cancel: cancel.clone(),
            finished: false,
        },
    );
}

/// Producer side of a bounded queue.
pub struct StreamSender<T> {
    tx: Sender<StreamItem<T>>,
    cancel: CancelToken,
}

impl<T> StreamSender<T> {
    /// Pushes an item to the queue blocking while the queue is full.
    /// Returns `false` if the consumer is gone or the pipeline has been cancelled,
    /// in which case the producer should stop.
    pub fn send(&self, item: StreamItem<T>) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        select! {
            send(self.tx, item) -> result => result.is_ok(),
            recv(self.cancel.signal) -> _ => false,
        }
    }

    /// Pushes all the items to the queue. Stops after the first error item or when the queue is closed.
    /// Returns `true` if every item was pushed and none of them was an error.
    pub fn send_all(&self, items: impl IntoIterator<Item = StreamItem<T>>) -> bool {
        for item in items {
            let is_err = item.is_err();
            if !self.send(item) || is_err {
                return false;
            }
        }

        return true;
    }
}

/// Consumer side of a bounded queue. A lazy, single-pass sequence of records.
pub struct RecordStream<T> {
    rx: Receiver<StreamItem<T>>,
    cancel: CancelToken,
    finished: bool,
}

impl<T> Iterator for RecordStream<T> {
    type Item = StreamItem<T>;

    /// Returns the next item blocking while the queue is empty.
    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let item = if self.cancel.is_cancelled() {
            Some(Err(SortError::Cancelled))
        } else {
            select! {
                recv(self.rx) -> item => item.ok(),
                recv(self.cancel.signal) -> _ => Some(Err(SortError::Cancelled)),
            }
        };

        if !matches!(item, Some(Ok(_))) {
            self.finished = true;
        }

        return item;
    }
}

/// Runs an iterator as a pipeline stage on its own thread, pushing its items through a bounded queue.
/// Returns the stream of pushed items and the stage thread handle.
pub fn spawn_iter<T, I>(
    name: String,
    items: I,
    capacity: usize,
    cancel: &CancelToken,
) -> Result<(RecordStream<T>, thread::JoinHandle<()>), SortError>
where
    T: Send + 'static,
    I: IntoIterator<Item = StreamItem<T>> + Send + 'static,
{
    let (tx, rx) = bounded(capacity, cancel);
    let handle = spawn_stage(name, move || {
        tx.send_all(items);
    })?;

    return Ok((rx, handle));
}

/// Starts a pipeline stage on a new named thread.
pub(crate) fn spawn_stage<F>(name: String, stage: F) -> Result<thread::JoinHandle<()>, SortError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name)
        .spawn(stage)
        .map_err(SortError::ThreadSpawn)
}
