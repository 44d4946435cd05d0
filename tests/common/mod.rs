//! Common test utilities
//!
//! A scripted in-process event service plus helpers to serve it over TCP or
//! a unix socket.

#![allow(dead_code)]

use containerd_events::client::{QueryEventOutputRef, RequestOutput};
use containerd_events::containerd::events::ContainerCreate;
use containerd_events::containerd::services::events::v1::{
    events_server::{Events, EventsServer},
    Envelope, SubscribeRequest,
};
use futures::{Stream, StreamExt};
use prost::Message;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

type EnvelopeStream = Pin<Box<dyn Stream<Item = Result<Envelope, Status>> + Send + 'static>>;

/// How a scripted stream ends once its items are sent
#[derive(Debug, Clone)]
pub enum Tail {
    /// Close the stream with an OK status
    Finish,
    /// Close the stream with this status
    Fail(Status),
    /// Keep the stream open forever
    Hang,
    /// Refuse the subscription before streaming anything
    Reject(Status),
}

/// One subscription as seen by the server
#[derive(Debug, Clone)]
pub struct Recorded {
    pub filters: Vec<String>,
    pub namespace: Option<String>,
}

/// Event service that plays back a fixed script to every subscriber
#[derive(Debug, Clone)]
pub struct ScriptedEvents {
    items: Vec<Envelope>,
    tail: Tail,
    recorded: Arc<Mutex<Vec<Recorded>>>,
}

impl ScriptedEvents {
    pub fn new(items: Vec<Envelope>, tail: Tail) -> Self {
        Self {
            items,
            tail,
            recorded: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[tonic::async_trait]
impl Events for ScriptedEvents {
    type SubscribeStream = EnvelopeStream;

    async fn subscribe(
        &self,
        request: Request<SubscribeRequest>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        let namespace = request
            .metadata()
            .get("containerd-namespace")
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        self.recorded.lock().unwrap().push(Recorded {
            filters: request.into_inner().filters,
            namespace,
        });

        let tail: EnvelopeStream = match &self.tail {
            Tail::Finish => Box::pin(futures::stream::empty::<Result<Envelope, Status>>()),
            Tail::Fail(status) => Box::pin(futures::stream::once(futures::future::ready(
                Err::<Envelope, Status>(status.clone()),
            ))),
            Tail::Hang => Box::pin(futures::stream::pending::<Result<Envelope, Status>>()),
            Tail::Reject(status) => return Err(status.clone()),
        };

        let items = futures::stream::iter(self.items.clone().into_iter().map(Ok));
        let stream: EnvelopeStream = Box::pin(items.chain(tail));
        Ok(Response::new(stream))
    }
}

/// A running scripted server; shuts down when dropped
pub struct TestServer {
    pub address: String,
    recorded: Arc<Mutex<Vec<Recorded>>>,
    _shutdown: oneshot::Sender<()>,
    _dir: Option<tempfile::TempDir>,
}

impl TestServer {
    /// Subscriptions received so far
    pub fn recorded(&self) -> Vec<Recorded> {
        self.recorded.lock().unwrap().clone()
    }
}

/// Serve `events` on an ephemeral localhost port
pub async fn start_tcp_server(events: ScriptedEvents) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);

    let recorded = Arc::clone(&events.recorded);
    let (shutdown, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        Server::builder()
            .add_service(EventsServer::new(events))
            .serve_with_incoming_shutdown(incoming, async {
                shutdown_rx.await.ok();
            })
            .await
            .unwrap();
    });

    TestServer {
        address,
        recorded,
        _shutdown: shutdown,
        _dir: None,
    }
}

/// Serve `events` on a unix socket in a fresh temporary directory
#[cfg(unix)]
pub async fn start_unix_server(events: ScriptedEvents) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("containerd.sock");
    let listener = tokio::net::UnixListener::bind(&path).unwrap();
    let incoming = tokio_stream::wrappers::UnixListenerStream::new(listener);

    let recorded = Arc::clone(&events.recorded);
    let (shutdown, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        Server::builder()
            .add_service(EventsServer::new(events))
            .serve_with_incoming_shutdown(incoming, async {
                shutdown_rx.await.ok();
            })
            .await
            .unwrap();
    });

    TestServer {
        address: format!("unix://{}", path.display()),
        recorded,
        _shutdown: shutdown,
        _dir: Some(dir),
    }
}

/// A `/containers/create` envelope for container `id`
pub fn container_create(id: &str) -> Envelope {
    let payload = ContainerCreate {
        id: id.to_string(),
        image: format!("docker.io/library/{}:latest", id),
        ..Default::default()
    };

    Envelope {
        timestamp: Some(prost_types::Timestamp {
            seconds: 1_700_000_000,
            nanos: 0,
        }),
        namespace: "default".to_string(),
        topic: "/containers/create".to_string(),
        event: Some(prost_types::Any {
            type_url: "containerd.events.ContainerCreate".to_string(),
            value: payload.encode_to_vec(),
        }),
    }
}

/// Decode the container ids carried by `envelopes`
pub fn container_ids(envelopes: &[Envelope]) -> Vec<String> {
    envelopes
        .iter()
        .filter_map(|e| e.event.as_ref())
        .map(|any| ContainerCreate::decode(any.value.as_slice()).unwrap().id)
        .collect()
}

/// Wait until the subscription stopped running
pub async fn wait_stopped(output: &QueryEventOutputRef) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while output.running() {
        assert!(Instant::now() < deadline, "subscription did not stop in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until the subscription has buffered at least one item
pub async fn wait_ready(output: &QueryEventOutputRef) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !output.ready() {
        assert!(Instant::now() < deadline, "no item arrived in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
