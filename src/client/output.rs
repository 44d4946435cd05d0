//! Output buffer shared between a background call and its consumers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::JoinHandle;
use tracing::{error, warn};

use super::traits::{CallResult, RequestOutput, StreamOutput};
use crate::Error;

/// Thread-safe item queue plus call status and terminate flag
///
/// The engine is the only writer; any number of consumers may drain it.
#[derive(Debug)]
pub struct OutputBuffer<T> {
    items: Mutex<Vec<T>>,
    terminate: AtomicBool,
    status: OnceLock<CallResult>,
}

impl<T> OutputBuffer<T> {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            terminate: AtomicBool::new(false),
            status: OnceLock::new(),
        }
    }

    fn items(&self) -> MutexGuard<'_, Vec<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one received item
    pub fn add_data(&self, item: T) {
        self.items().push(item);
    }

    /// Take every buffered item, in arrival order
    pub fn get_data(&self) -> Vec<T> {
        std::mem::take(&mut *self.items())
    }

    /// Whether items are waiting to be drained
    pub fn ready(&self) -> bool {
        !self.items().is_empty()
    }

    /// Ask the engine to stop
    pub fn terminate(&self) {
        self.terminate.store(true, Ordering::SeqCst);
    }

    /// Whether termination has been requested
    pub fn terminate_requested(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }

    /// Terminal status, if published
    pub fn status(&self) -> Option<&CallResult> {
        self.status.get()
    }

    /// Publish the terminal status; only the first call has an effect
    pub fn set_status(&self, status: CallResult) -> bool {
        match self.status.set(status) {
            Ok(()) => true,
            Err(rejected) => {
                warn!("Call status already published, dropping {:?}", rejected);
                false
            }
        }
    }
}

impl<T> Default for OutputBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer handle for a call running on a background thread
///
/// Dropping the handle requests termination and joins the worker thread, so
/// it blocks for up to one poll interval.
#[derive(Debug)]
pub struct OutputHandle<T> {
    buffer: Arc<OutputBuffer<T>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T> OutputHandle<T> {
    pub(crate) fn new(buffer: Arc<OutputBuffer<T>>, worker: JoinHandle<()>) -> Self {
        Self {
            buffer,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// The shared buffer behind this handle
    pub fn buffer(&self) -> &Arc<OutputBuffer<T>> {
        &self.buffer
    }

    /// Wait for the worker and take its terminal status
    ///
    /// Yields `None` while another clone of [`buffer`](Self::buffer) is alive.
    pub fn join(mut self) -> Option<CallResult> {
        self.join_worker();
        Arc::get_mut(&mut self.buffer).and_then(|buffer| buffer.status.take())
    }

    fn worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn join_worker(&self) {
        let Some(worker) = self.worker().take() else {
            return;
        };

        if worker.join().is_err() {
            error!("Request worker panicked");
            self.buffer.set_status(Err(Error::internal("request worker panicked")));
        }
    }
}

impl<T: Send> RequestOutput for OutputHandle<T> {
    fn running(&self) -> bool {
        if self.buffer.status().is_some() {
            return false;
        }
        // A missing handle is being joined by `wait`; the status settles it
        self.worker()
            .as_ref()
            .map_or(true, |worker| !worker.is_finished())
    }

    fn terminate(&self) {
        self.buffer.terminate();
    }

    fn status(&self) -> Option<&CallResult> {
        self.buffer.status()
    }

    fn ready(&self) -> bool {
        self.buffer.ready()
    }

    fn wait(&self) -> Option<&CallResult> {
        self.join_worker();
        self.buffer.status()
    }
}

impl<T: Send> StreamOutput<T> for OutputHandle<T> {
    fn get_data(&self) -> Vec<T> {
        self.buffer.get_data()
    }
}

impl<T> Drop for OutputHandle<T> {
    fn drop(&mut self) {
        self.buffer.terminate();
        self.join_worker();
    }
}
