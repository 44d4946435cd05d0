//! # Async streaming client
//!
//! Runs one server-streaming gRPC call per subscription on a background
//! thread and exposes the received messages through a thread-safe buffer.
//!
//! ## Module structure
//! - `traits`: output, service binding and client interfaces
//! - `completion_queue`: tagged completion events polled with a bounded wait
//! - `reader`: driver task performing start/read/finish operations
//! - `channel`: insecure channel factory (unix socket or TCP)
//! - `output`: output buffer and its consumer handle
//! - `request`: the streaming call engine
//! - `containerd`: binding for the containerd event service
//! - `mock`: scripted binding for tests
//!
//! ## Usage
//! ```rust,no_run
//! use containerd_events::client::{create_async_api_client, RequestOutput, StreamOutput};
//! use containerd_events::containerd::services::events::v1::SubscribeRequest;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = create_async_api_client("/run/containerd/containerd.sock")?;
//! let output = client.subscribe_events(SubscribeRequest::default())?;
//!
//! while output.running() {
//!     for envelope in output.get_data() {
//!         println!("{}", envelope.topic);
//!     }
//!     std::thread::sleep(std::time::Duration::from_secs(1));
//! }
//! println!("subscription ended: {:?}", output.status());
//! # Ok(())
//! # }
//! ```

pub mod traits;
pub mod completion_queue;
pub mod reader;
pub mod channel;
pub mod output;
pub mod request;
pub mod containerd;
pub mod mock;

#[cfg(test)]
mod tests;

pub use traits::{
    AsyncApiClient, AsyncApiClientRef, CallResult, QueryEventOutputRef, RequestOutput,
    RpcFactory, StreamOutput, StreamingRpc,
};
pub use completion_queue::{CompletionEvent, CompletionQueue, NextStatus, ReadOutcome, RequestTag};
pub use reader::{ClientAsyncReader, ClientContext};
pub use output::{OutputBuffer, OutputHandle};
pub use request::{BaseRequest, CallState};
pub use containerd::{
    create_async_api_client, create_async_api_client_with_config, ContainerdAsyncApiClient,
    EventsSubscribeRpc, QueryEventRequest,
};

pub use mock::{MockProbe, MockStreamingRpc};
