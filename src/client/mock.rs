//! Mock streaming RPC for testing
//!
//! A scripted service binding that plays back a fixed sequence of call
//! outcomes without touching the network.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::completion_queue::ReadOutcome;
use super::traits::{RpcFactory, StreamingRpc};

/// One scripted read
#[derive(Debug, Clone)]
pub enum MockRead<T> {
    /// Deliver a message
    Item(T),
    /// Break the stream
    Fail(tonic::Status),
}

/// Counters shared by every clone of a mock
#[derive(Debug, Default)]
pub struct MockProbe {
    started: AtomicBool,
    reads: AtomicUsize,
    finishes: AtomicUsize,
}

impl MockProbe {
    /// Whether the call was started
    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Number of read operations performed
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of finish operations performed
    pub fn finishes(&self) -> usize {
        self.finishes.load(Ordering::SeqCst)
    }
}

/// Scripted server-streaming call
#[derive(Debug)]
pub struct MockStreamingRpc<Q, T> {
    start: Result<(), tonic::Status>,
    script: VecDeque<MockRead<T>>,
    hang_after_script: bool,
    finish: tonic::Status,
    read_delay: Option<Duration>,
    requests: Arc<Mutex<Vec<Q>>>,
    probe: Arc<MockProbe>,
    _request: PhantomData<fn(Q)>,
}

impl<Q, T: Clone> Clone for MockStreamingRpc<Q, T> {
    fn clone(&self) -> Self {
        Self {
            start: self.start.clone(),
            script: self.script.clone(),
            hang_after_script: self.hang_after_script,
            finish: self.finish.clone(),
            read_delay: self.read_delay,
            requests: Arc::clone(&self.requests),
            probe: Arc::clone(&self.probe),
            _request: PhantomData,
        }
    }
}

impl<Q, T> MockStreamingRpc<Q, T> {
    /// A call that streams nothing and finishes OK
    pub fn new() -> Self {
        Self {
            start: Ok(()),
            script: VecDeque::new(),
            hang_after_script: false,
            finish: tonic::Status::new(tonic::Code::Ok, ""),
            read_delay: None,
            requests: Arc::new(Mutex::new(Vec::new())),
            probe: Arc::new(MockProbe::default()),
            _request: PhantomData,
        }
    }

    /// Stream these items before the end of stream
    pub fn with_items<I: IntoIterator<Item = T>>(mut self, items: I) -> Self {
        self.script.extend(items.into_iter().map(MockRead::Item));
        self
    }

    /// Break the stream after the scripted items
    pub fn with_read_failure(mut self, status: tonic::Status) -> Self {
        self.script.push_back(MockRead::Fail(status));
        self
    }

    /// Fail the call initiation
    pub fn with_start_failure(mut self, status: tonic::Status) -> Self {
        self.start = Err(status);
        self
    }

    /// Final status reported by finish
    pub fn with_finish(mut self, status: tonic::Status) -> Self {
        self.finish = status;
        self
    }

    /// Never end the stream once the script is exhausted
    pub fn hanging(mut self) -> Self {
        self.hang_after_script = true;
        self
    }

    /// Delay every read
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    /// Counters shared with every clone
    pub fn probe(&self) -> Arc<MockProbe> {
        Arc::clone(&self.probe)
    }

    /// Requests every clone was started with
    pub fn requests(&self) -> Arc<Mutex<Vec<Q>>> {
        Arc::clone(&self.requests)
    }
}

impl<Q, T> Default for MockStreamingRpc<Q, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q, T> MockStreamingRpc<Q, T>
where
    Q: Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Factory handing out a fresh copy of the script for every call
    pub fn into_factory(self) -> RpcFactory<Self> {
        Arc::new(move |_channel: tonic::transport::Channel| self.clone())
    }
}

#[async_trait]
impl<Q, T> StreamingRpc for MockStreamingRpc<Q, T>
where
    Q: Send + 'static,
    T: Send + 'static,
{
    type Request = Q;
    type Response = T;

    async fn start(&mut self, request: Q) -> Result<(), tonic::Status> {
        self.probe.started.store(true, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        self.start.clone()
    }

    async fn read(&mut self) -> ReadOutcome<T> {
        self.probe.reads.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }

        match self.script.pop_front() {
            Some(MockRead::Item(item)) => ReadOutcome::Item(item),
            Some(MockRead::Fail(status)) => ReadOutcome::Failed(status),
            None if self.hang_after_script => futures::future::pending().await,
            None => ReadOutcome::EndOfStream,
        }
    }

    async fn finish(&mut self) -> tonic::Status {
        self.probe.finishes.fetch_add(1, Ordering::SeqCst);
        self.finish.clone()
    }
}
