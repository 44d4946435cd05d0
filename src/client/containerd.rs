//! containerd event client
//!
//! Binds the streaming call engine to `containerd.services.events.v1.Events/Subscribe`.

use async_trait::async_trait;
use std::sync::Arc;
use tonic::codec::Streaming;
use tonic::metadata::MetadataValue;
use tonic::transport::Channel;
use tracing::{info, instrument};

use super::channel;
use super::completion_queue::ReadOutcome;
use super::request::BaseRequest;
use super::traits::{AsyncApiClient, AsyncApiClientRef, QueryEventOutputRef, RpcFactory, StreamingRpc};
use crate::config::ClientConfig;
use crate::containerd::services::events::v1::{events_client::EventsClient, Envelope, SubscribeRequest};
use crate::{Error, Result};

/// Request metadata key selecting the containerd namespace
pub const NAMESPACE_HEADER: &str = "containerd-namespace";

/// Engine instantiation for event subscriptions
pub type QueryEventRequest = BaseRequest<EventsSubscribeRpc>;

/// `Events/Subscribe` binding
pub struct EventsSubscribeRpc {
    client: EventsClient<Channel>,
    namespace: Option<String>,
    stream: Option<Streaming<Envelope>>,
    final_status: Option<tonic::Status>,
}

impl std::fmt::Debug for EventsSubscribeRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventsSubscribeRpc")
            .field("namespace", &self.namespace)
            .field("started", &self.stream.is_some())
            .finish()
    }
}

impl EventsSubscribeRpc {
    /// Bind to an open channel
    pub fn new(channel: Channel, namespace: Option<String>) -> Self {
        Self {
            client: EventsClient::new(channel),
            namespace,
            stream: None,
            final_status: None,
        }
    }
}

#[async_trait]
impl StreamingRpc for EventsSubscribeRpc {
    type Request = SubscribeRequest;
    type Response = Envelope;

    async fn start(&mut self, request: SubscribeRequest) -> std::result::Result<(), tonic::Status> {
        let mut request = tonic::Request::new(request);

        if let Some(namespace) = &self.namespace {
            let value = MetadataValue::try_from(namespace.as_str())
                .map_err(|_| tonic::Status::invalid_argument(format!("Invalid namespace: {}", namespace)))?;
            request.metadata_mut().insert(NAMESPACE_HEADER, value);
        }

        match self.client.subscribe(request).await {
            Ok(response) => {
                self.stream = Some(response.into_inner());
                Ok(())
            }
            // The server answered with a status instead of a stream: the call
            // was established, finish reports the status
            Err(status) if is_server_status(&status) => {
                self.final_status = Some(status);
                Ok(())
            }
            Err(status) => Err(status),
        }
    }

    async fn read(&mut self) -> ReadOutcome<Envelope> {
        let Some(stream) = self.stream.as_mut() else {
            if self.final_status.is_some() {
                return ReadOutcome::EndOfStream;
            }
            return ReadOutcome::Failed(tonic::Status::failed_precondition("call not started"));
        };

        match stream.message().await {
            Ok(Some(envelope)) => ReadOutcome::Item(envelope),
            Ok(None) => ReadOutcome::EndOfStream,
            // The server ended the stream; finish reports why
            Err(status) if is_server_status(&status) => {
                self.final_status = Some(status);
                ReadOutcome::EndOfStream
            }
            Err(status) => {
                self.final_status = Some(status.clone());
                ReadOutcome::Failed(status)
            }
        }
    }

    async fn finish(&mut self) -> tonic::Status {
        if let Some(status) = self.final_status.take() {
            return status;
        }

        match self.stream.as_mut() {
            Some(stream) => match stream.trailers().await {
                Ok(_) => tonic::Status::new(tonic::Code::Ok, ""),
                Err(status) => status,
            },
            None => tonic::Status::failed_precondition("call not started"),
        }
    }
}

// Statuses decoded from response headers or trailers carry no source error,
// transport failures always do
fn is_server_status(status: &tonic::Status) -> bool {
    std::error::Error::source(status).is_none()
}

/// Async API client for the containerd event service
#[derive(Debug, Clone)]
pub struct ContainerdAsyncApiClient {
    config: ClientConfig,
}

impl ContainerdAsyncApiClient {
    fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Address every subscription connects to
    pub fn address(&self) -> &str {
        &self.config.address
    }

    fn rpc_factory(&self) -> RpcFactory<EventsSubscribeRpc> {
        let namespace = self.config.namespace.clone();
        Arc::new(move |channel: Channel| EventsSubscribeRpc::new(channel, namespace.clone()))
    }
}

impl AsyncApiClient for ContainerdAsyncApiClient {
    #[instrument(skip(self, request), fields(address = %self.config.address))]
    fn subscribe_events(&self, request: SubscribeRequest) -> Result<QueryEventOutputRef> {
        info!(filters = ?request.filters, "Subscribing to events");
        let output = QueryEventRequest::create(&self.config, self.rpc_factory(), request)?;
        Ok(Arc::new(output))
    }
}

/// Create a client bound to `address` with default settings
pub fn create_async_api_client(address: &str) -> Result<AsyncApiClientRef> {
    create_async_api_client_with_config(ClientConfig::new(address))
}

/// Create a client from explicit settings
///
/// Fails when the address cannot be parsed or the poll interval is zero;
/// nothing is dialed yet.
pub fn create_async_api_client_with_config(config: ClientConfig) -> Result<AsyncApiClientRef> {
    channel::parse_address(&config.address)?;
    if config.poll_interval.is_zero() {
        return Err(Error::configuration("poll interval must be greater than zero"));
    }
    Ok(Arc::new(ContainerdAsyncApiClient::new(config)))
}
