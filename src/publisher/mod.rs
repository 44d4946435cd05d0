//! # Container event publisher
//!
//! Keeps one event subscription alive and turns what it buffered into
//! [`ContainerEvent`]s each time it is run.
//!
//! Lifecycle: `set_up` subscribes, `run` drains (resubscribing once the
//! previous subscription has ended), `configure` swaps the filters and
//! `tear_down` stops the subscription. Dropping the publisher tears it down.

pub mod events;


pub use events::{ContainerEvent, ContainerEventData, ContainerEventType};

use tracing::{debug, info, instrument, warn};

use crate::client::{create_async_api_client_with_config, AsyncApiClientRef, QueryEventOutputRef};
use crate::config::Config;
use crate::containerd::services::events::v1::SubscribeRequest;
use crate::{Error, Result};

/// Publishes container events from the event service
pub struct ContainerEventPublisher {
    config: Config,
    client: Option<AsyncApiClientRef>,
    output: Option<QueryEventOutputRef>,
    subscriptions: u64,
}

impl std::fmt::Debug for ContainerEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerEventPublisher")
            .field("address", &self.config.address)
            .field("filters", &self.config.filters)
            .field("subscribed", &self.output.is_some())
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}

impl ContainerEventPublisher {
    /// Create a publisher; nothing is dialed until `set_up`
    pub fn new(config: Config) -> Self {
        Self {
            config,
            client: None,
            output: None,
            subscriptions: 0,
        }
    }

    /// Create a publisher on top of an existing client
    pub fn with_client(config: Config, client: AsyncApiClientRef) -> Self {
        Self {
            config,
            client: Some(client),
            output: None,
            subscriptions: 0,
        }
    }

    /// Filters forwarded with every subscription
    pub fn filters(&self) -> &[String] {
        &self.config.filters
    }

    /// Whether a subscription is currently held
    pub fn is_subscribed(&self) -> bool {
        self.output.is_some()
    }

    /// Number of subscriptions made so far
    pub fn subscriptions(&self) -> u64 {
        self.subscriptions
    }

    /// Create the client if needed and subscribe
    #[instrument(skip(self), fields(address = %self.config.address))]
    pub fn set_up(&mut self) -> Result<()> {
        if self.client.is_none() {
            self.client = Some(create_async_api_client_with_config(self.config.client_config())?);
        }

        if self.output.is_none() {
            self.subscribe()?;
        }

        Ok(())
    }

    /// Replace the filters
    ///
    /// A live subscription is stopped; the next `run` subscribes again with
    /// the new filters.
    pub fn configure(&mut self, filters: Vec<String>) {
        info!(?filters, "Configuring event filters");
        self.config.filters = filters;
        self.stop_subscription();
    }

    /// Drain buffered events
    ///
    /// Events are returned in arrival order. When the subscription has ended
    /// its status is logged and the next run subscribes again.
    pub fn run(&mut self) -> Result<Vec<ContainerEvent>> {
        if self.output.is_none() {
            self.subscribe()?;
        }

        let Some(output) = self.output.as_ref() else {
            return Ok(Vec::new());
        };

        // Checked before draining so items published right before the end are
        // part of this batch
        let finished = !output.running();
        let envelopes = output.get_data();

        let mut events = Vec::with_capacity(envelopes.len());
        for envelope in &envelopes {
            match ContainerEvent::from_envelope(envelope) {
                Ok(event) => events.push(event),
                Err(e) => warn!(topic = %envelope.topic, "Dropping undecodable event: {}", e),
            }
        }
        debug!(count = events.len(), "Drained container events");

        if finished {
            match output.wait() {
                Some(Ok(())) => info!("Event subscription ended"),
                Some(Err(e)) if e.is_aborted() => info!("Event subscription aborted"),
                Some(Err(e)) => warn!("Event subscription failed: {}", e),
                None => warn!("Event subscription ended without a status"),
            }
            self.output = None;
        }

        Ok(events)
    }

    /// Stop the subscription and wait for its worker
    pub fn tear_down(&mut self) {
        if self.output.is_some() {
            info!("Tearing down event subscription");
        }
        self.stop_subscription();
    }

    fn subscribe(&mut self) -> Result<()> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| Error::configuration("publisher is not set up"))?;

        let request = SubscribeRequest {
            filters: self.config.filters.clone(),
        };
        self.output = Some(client.subscribe_events(request)?);
        self.subscriptions += 1;

        debug!(subscriptions = self.subscriptions, "Subscribed to events");
        Ok(())
    }

    fn stop_subscription(&mut self) {
        if let Some(output) = self.output.take() {
            output.terminate();
            output.wait();
        }
    }
}

impl Drop for ContainerEventPublisher {
    fn drop(&mut self) {
        self.tear_down();
    }
}
