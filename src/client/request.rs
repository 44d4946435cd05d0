//! Streaming call engine
//!
//! `BaseRequest` drives exactly one server-streaming call: it opens the
//! channel, submits the call and pumps the completion queue, moving every
//! received message into the output buffer until the final status arrives or
//! the consumer asks it to stop.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::channel;
use super::completion_queue::{CompletionEvent, CompletionQueue, NextStatus, ReadOutcome, RequestTag};
use super::output::{OutputBuffer, OutputHandle};
use super::reader::{ClientAsyncReader, ClientContext};
use super::traits::{CallResult, RpcFactory, StreamingRpc};
use crate::config::ClientConfig;
use crate::{Error, Result};

/// Phase of the call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Nothing submitted yet
    Idle,
    /// Waiting for the call to be established
    CallSubmitted,
    /// Reading streamed messages
    Reading,
    /// Stream ended, waiting for the final status
    Draining,
    /// Cancellation requested, waiting for outstanding operations
    Aborting,
    /// Loop exited
    Finished,
}

/// Engine for one server-streaming call
pub struct BaseRequest<R: StreamingRpc> {
    id: Uuid,
    rpc_factory: RpcFactory<R>,
    request: Option<R::Request>,
    address: String,
    poll_interval: Duration,
    state: CallState,
    abort_requested: bool,
    read_failure: Option<tonic::Status>,
    final_status: Option<tonic::Status>,
}

impl<R: StreamingRpc> std::fmt::Debug for BaseRequest<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseRequest")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("state", &self.state)
            .field("abort_requested", &self.abort_requested)
            .finish()
    }
}

impl<R: StreamingRpc> BaseRequest<R> {
    /// Create an engine for one call of the method bound by `rpc_factory`
    pub fn new(rpc_factory: RpcFactory<R>, request: R::Request, config: &ClientConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            rpc_factory,
            request: Some(request),
            address: config.address.clone(),
            poll_interval: config.poll_interval,
            state: CallState::Idle,
            abort_requested: false,
            read_failure: None,
            final_status: None,
        }
    }

    /// Run one call on a dedicated background thread
    ///
    /// Returns as soon as the thread is started; the call's items and final
    /// status show up in the returned handle.
    pub fn create(
        config: &ClientConfig,
        rpc_factory: RpcFactory<R>,
        request: R::Request,
    ) -> Result<OutputHandle<R::Response>> {
        let engine = Self::new(rpc_factory, request, config);
        let buffer = Arc::new(OutputBuffer::new());
        let worker_buffer = Arc::clone(&buffer);

        let name = format!("events-rpc-{}", &engine.id.simple().to_string()[..8]);
        let worker = std::thread::Builder::new().name(name).spawn(move || {
            let status = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime.block_on(engine.execute(&worker_buffer)),
                Err(e) => Err(Error::Io(e)),
            };
            worker_buffer.set_status(status);
        })?;

        Ok(OutputHandle::new(buffer, worker))
    }

    /// Current phase of the call
    pub fn state(&self) -> CallState {
        self.state
    }

    fn transition(&mut self, next: CallState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Call state changed");
            self.state = next;
        }
    }

    /// Drive the call to completion, feeding `output`
    ///
    /// Items received before a failure stay in the buffer.
    #[instrument(skip(self, output), fields(call_id = %self.id, address = %self.address))]
    pub async fn execute(mut self, output: &OutputBuffer<R::Response>) -> CallResult {
        let request = self
            .request
            .take()
            .ok_or_else(|| Error::internal("request already submitted"))?;

        let channel = channel::create_channel(&self.address)?;
        let rpc = (self.rpc_factory)(channel);

        let context = ClientContext::new();
        let (mut queue, sender) = CompletionQueue::new();
        let reader = ClientAsyncReader::spawn(rpc, request, context.clone(), sender);

        reader.start_call()?;
        self.transition(CallState::CallSubmitted);
        info!("Streaming call submitted");

        loop {
            if output.terminate_requested() && !self.abort_requested {
                info!("Termination requested, cancelling call");
                context.try_cancel();
                self.abort_requested = true;
                self.transition(CallState::Aborting);
            }

            match queue.async_next(self.poll_interval).await {
                NextStatus::Shutdown => {
                    warn!("Completion queue shut down");
                    self.abort_requested = true;
                    break;
                }
                NextStatus::Timeout => continue,
                NextStatus::GotEvent(event) => {
                    let tag = event.tag();
                    self.process_next_event(event, &reader, output)?;

                    if tag == RequestTag::Finish {
                        break;
                    }
                }
            }
        }

        self.transition(CallState::Finished);
        let result = self.outcome();
        match &result {
            Ok(()) => info!("Streaming call completed"),
            Err(e) if e.is_aborted() => info!("Streaming call aborted"),
            Err(e) => warn!("Streaming call failed: {}", e),
        }
        result
    }

    fn process_next_event(
        &mut self,
        event: CompletionEvent<R::Response>,
        reader: &ClientAsyncReader,
        output: &OutputBuffer<R::Response>,
    ) -> Result<()> {
        match event {
            CompletionEvent::StartCall(Err(status)) => {
                if self.abort_requested {
                    return Err(Error::Aborted);
                }
                Err(Error::initialization_failed(status.message()))
            }
            CompletionEvent::StartCall(Ok(())) => {
                if !self.abort_requested {
                    self.transition(CallState::Reading);
                }
                self.issue(reader.read())
            }
            CompletionEvent::Read(ReadOutcome::Item(item)) => {
                output.add_data(item);
                self.issue(reader.read())
            }
            CompletionEvent::Read(ReadOutcome::EndOfStream) => {
                debug!("End of stream");
                self.enter_draining();
                self.issue(reader.finish())
            }
            CompletionEvent::Read(ReadOutcome::Failed(status)) => {
                if !self.abort_requested {
                    warn!("Read failed: {}", status);
                    self.read_failure = Some(status);
                }
                self.enter_draining();
                self.issue(reader.finish())
            }
            CompletionEvent::Finish(status) => {
                debug!(code = ?status.code(), "Final status received");
                self.final_status = Some(status);
                Ok(())
            }
        }
    }

    fn enter_draining(&mut self) {
        if !self.abort_requested {
            self.transition(CallState::Draining);
        }
    }

    // A reader that went away shuts the queue down, which the loop reports
    fn issue(&self, issued: Result<()>) -> Result<()> {
        if let Err(e) = issued {
            warn!("{}", e);
        }
        Ok(())
    }

    fn outcome(&mut self) -> CallResult {
        if self.abort_requested {
            return Err(Error::Aborted);
        }

        if let Some(status) = self.read_failure.take() {
            return Err(Error::stream_interrupted(status));
        }

        match self.final_status.take() {
            Some(status) if status.code() == tonic::Code::Ok => Ok(()),
            Some(status) => Err(Error::rpc(status)),
            None => Err(Error::internal("call finished without a final status")),
        }
    }
}
