//! Completion queue
//!
//! Asynchronous operations report their completion as tagged events on a
//! queue which the engine polls with a bounded wait.

use std::time::Duration;
use tokio::sync::mpsc;

/// Identifies which phase of the call an operation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestTag {
    /// The call initiation
    StartCall,
    /// One message read
    Read,
    /// Retrieval of the final status
    Finish,
}

/// Result of one read operation
#[derive(Debug)]
pub enum ReadOutcome<T> {
    /// A message was received
    Item(T),
    /// The server closed the stream normally
    EndOfStream,
    /// The stream broke before a normal end
    Failed(tonic::Status),
}

/// A completed operation
#[derive(Debug)]
pub enum CompletionEvent<T> {
    /// The call initiation completed
    StartCall(Result<(), tonic::Status>),
    /// A read completed
    Read(ReadOutcome<T>),
    /// The final status is available
    Finish(tonic::Status),
}

impl<T> CompletionEvent<T> {
    /// Tag of the operation that completed
    pub fn tag(&self) -> RequestTag {
        match self {
            CompletionEvent::StartCall(_) => RequestTag::StartCall,
            CompletionEvent::Read(_) => RequestTag::Read,
            CompletionEvent::Finish(_) => RequestTag::Finish,
        }
    }

    /// Whether the operation succeeded
    pub fn succeeded(&self) -> bool {
        match self {
            CompletionEvent::StartCall(result) => result.is_ok(),
            CompletionEvent::Read(outcome) => matches!(outcome, ReadOutcome::Item(_)),
            CompletionEvent::Finish(status) => status.code() == tonic::Code::Ok,
        }
    }
}

/// Result of waiting on the queue
#[derive(Debug)]
pub enum NextStatus<T> {
    /// Every producer is gone and the queue is drained
    Shutdown,
    /// Nothing completed within the wait
    Timeout,
    /// An operation completed
    GotEvent(CompletionEvent<T>),
}

/// Producer side of a completion queue
#[derive(Debug)]
pub struct CompletionSender<T> {
    inner: mpsc::UnboundedSender<CompletionEvent<T>>,
}

impl<T> Clone for CompletionSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> CompletionSender<T> {
    /// Post a completed operation; false once the queue is gone
    pub fn post(&self, event: CompletionEvent<T>) -> bool {
        self.inner.send(event).is_ok()
    }
}

/// Consumer side of a completion queue
#[derive(Debug)]
pub struct CompletionQueue<T> {
    receiver: mpsc::UnboundedReceiver<CompletionEvent<T>>,
}

impl<T> CompletionQueue<T> {
    /// Create a queue together with its first producer
    ///
    /// The queue shuts down once every producer has been dropped.
    pub fn new() -> (Self, CompletionSender<T>) {
        let (inner, receiver) = mpsc::unbounded_channel();
        (Self { receiver }, CompletionSender { inner })
    }

    /// Wait at most `timeout` for the next completed operation
    pub async fn async_next(&mut self, timeout: Duration) -> NextStatus<T> {
        match tokio::time::timeout(timeout, self.receiver.recv()).await {
            Ok(Some(event)) => NextStatus::GotEvent(event),
            Ok(None) => NextStatus::Shutdown,
            Err(_) => NextStatus::Timeout,
        }
    }
}
