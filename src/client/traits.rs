//! Async client layer traits
//!
//! This module defines the abstract interfaces between the streaming call
//! engine, the service bindings it drives and the consumers draining its output.

use async_trait::async_trait;
use std::sync::Arc;

use super::completion_queue::ReadOutcome;
use crate::containerd::services::events::v1::{Envelope, SubscribeRequest};

/// Terminal outcome of one streaming call
pub type CallResult = crate::Result<()>;

/// Lifecycle view of a request running in the background
pub trait RequestOutput: Send + Sync {
    /// Whether the background call is still active
    fn running(&self) -> bool;

    /// Ask the background call to stop; idempotent
    fn terminate(&self);

    /// Terminal status, once the background call has published it
    fn status(&self) -> Option<&CallResult>;

    /// Whether items are waiting to be drained
    fn ready(&self) -> bool;

    /// Block until the background call is gone and return its status
    fn wait(&self) -> Option<&CallResult>;
}

/// Output of a server-streaming request
pub trait StreamOutput<T>: RequestOutput {
    /// Take every buffered item, in arrival order
    fn get_data(&self) -> Vec<T>;
}

/// One server-streaming method of one service
///
/// Implementations perform a single operation per call; the engine never
/// issues an operation before the previous one completed.
#[async_trait]
pub trait StreamingRpc: Send + 'static {
    /// Request message
    type Request: Send + 'static;
    /// Streamed response message
    type Response: Send + 'static;

    /// Submit the request and wait for the call to be established
    async fn start(&mut self, request: Self::Request) -> Result<(), tonic::Status>;

    /// Read the next streamed message
    async fn read(&mut self) -> ReadOutcome<Self::Response>;

    /// Retrieve the final status of the call
    async fn finish(&mut self) -> tonic::Status;
}

/// Builds the service binding for a call on top of an open channel
pub type RpcFactory<R> = Arc<dyn Fn(tonic::transport::Channel) -> R + Send + Sync>;

/// Output handle for a containerd event subscription
pub type QueryEventOutputRef = Arc<dyn StreamOutput<Envelope>>;

/// Async API client
///
/// Every subscription gets its own call, transport context and output buffer.
pub trait AsyncApiClient: Send + Sync + std::fmt::Debug {
    /// Start streaming events; returns without waiting for the first one
    fn subscribe_events(&self, request: SubscribeRequest) -> crate::Result<QueryEventOutputRef>;
}

/// Shared async API client
pub type AsyncApiClientRef = Arc<dyn AsyncApiClient>;
