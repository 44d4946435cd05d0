//! Async reader for one server-streaming call
//!
//! A driver task owns the service binding and performs the operations the
//! engine asks for, one at a time, posting each completion to the queue.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::completion_queue::{CompletionEvent, CompletionSender, ReadOutcome};
use super::traits::StreamingRpc;
use crate::{Error, Result};

/// Per-call transport context
///
/// Cancelling it makes the outstanding operation and every later one fail.
#[derive(Debug, Clone)]
pub struct ClientContext {
    cancelled: Arc<watch::Sender<bool>>,
}

impl ClientContext {
    /// Create a live context
    pub fn new() -> Self {
        let (cancelled, _) = watch::channel(false);
        Self {
            cancelled: Arc::new(cancelled),
        }
    }

    /// Request cancellation of the call
    pub fn try_cancel(&self) {
        self.cancelled.send_replace(true);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        let mut receiver = self.cancelled.subscribe();
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for ClientContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    StartCall,
    Read,
    Finish,
}

/// Handle used by the engine to issue operations
#[derive(Debug)]
pub struct ClientAsyncReader {
    operations: mpsc::UnboundedSender<Operation>,
}

impl ClientAsyncReader {
    /// Spawn the driver task for `rpc` on the current runtime
    ///
    /// The driver exits once this handle is dropped, releasing its producer
    /// side of the completion queue.
    pub fn spawn<R: StreamingRpc>(
        rpc: R,
        request: R::Request,
        context: ClientContext,
        queue: CompletionSender<R::Response>,
    ) -> Self {
        let (operations, receiver) = mpsc::unbounded_channel();
        tokio::spawn(drive(rpc, request, receiver, context, queue));
        Self { operations }
    }

    /// Start the call
    pub fn start_call(&self) -> Result<()> {
        self.issue(Operation::StartCall)
    }

    /// Read the next message
    pub fn read(&self) -> Result<()> {
        self.issue(Operation::Read)
    }

    /// Retrieve the final status
    pub fn finish(&self) -> Result<()> {
        self.issue(Operation::Finish)
    }

    fn issue(&self, operation: Operation) -> Result<()> {
        self.operations
            .send(operation)
            .map_err(|_| Error::internal(format!("reader is gone, cannot issue {:?}", operation)))
    }
}

async fn drive<R: StreamingRpc>(
    mut rpc: R,
    request: R::Request,
    mut operations: mpsc::UnboundedReceiver<Operation>,
    context: ClientContext,
    queue: CompletionSender<R::Response>,
) {
    let mut request = Some(request);

    while let Some(operation) = operations.recv().await {
        let event = match operation {
            Operation::StartCall => {
                let result = match request.take() {
                    Some(request) => tokio::select! {
                        biased;
                        _ = context.cancelled() => Err(tonic::Status::cancelled("call cancelled")),
                        result = rpc.start(request) => result,
                    },
                    None => Err(tonic::Status::failed_precondition("call already started")),
                };
                CompletionEvent::StartCall(result)
            }
            Operation::Read => {
                let outcome = tokio::select! {
                    biased;
                    _ = context.cancelled() => ReadOutcome::Failed(tonic::Status::cancelled("call cancelled")),
                    outcome = rpc.read() => outcome,
                };
                CompletionEvent::Read(outcome)
            }
            Operation::Finish => {
                if context.is_cancelled() {
                    CompletionEvent::Finish(tonic::Status::cancelled("call cancelled"))
                } else {
                    let status = tokio::select! {
                        biased;
                        _ = context.cancelled() => tonic::Status::cancelled("call cancelled"),
                        status = rpc.finish() => status,
                    };
                    CompletionEvent::Finish(status)
                }
            }
        };

        debug!(tag = ?event.tag(), succeeded = event.succeeded(), "Operation completed");

        if !queue.post(event) {
            break;
        }
    }

    debug!("Reader driver exited");
}
