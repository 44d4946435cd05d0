//! Container event conversion
//!
//! Turns raw event service envelopes into typed container events.

use chrono::{DateTime, Utc};
use phf::phf_map;
use prost::Message;
use serde::Serialize;

use crate::containerd::events::{
    ContainerCreate, ContainerDelete, ContainerUpdate, ImageCreate, ImageDelete, ImageUpdate,
    TaskExit, TaskStart,
};
use crate::containerd::services::events::v1::Envelope;
use crate::Result;

/// Kind of object an event is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerEventType {
    Container,
    Image,
    Plugin,
}

/// Topic root to event type; topics with any other root are plugin events
static TOPIC_TYPE_MAP: phf::Map<&'static str, ContainerEventType> = phf_map! {
    "containers" => ContainerEventType::Container,
    "tasks" => ContainerEventType::Container,
    "images" => ContainerEventType::Image,
};

impl ContainerEventType {
    /// Classify an event by its topic, e.g. `/containers/create`
    pub fn from_topic(topic: &str) -> Self {
        let root = topic.trim_start_matches('/').split('/').next().unwrap_or_default();
        TOPIC_TYPE_MAP
            .get(root)
            .copied()
            .unwrap_or(ContainerEventType::Plugin)
    }
}

/// Flattened event payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainerEventData {
    /// Publication time, unix seconds
    pub timestamp: i64,
    /// Action part of the topic, e.g. `create`
    pub event: String,
    pub namespace: String,
    pub container_id: String,
    pub image_name: String,
}

/// One event received from the event service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerEvent {
    #[serde(rename = "type")]
    pub event_type: ContainerEventType,
    pub topic: String,
    /// Publication time as RFC 3339, empty when the envelope carries none
    pub time: String,
    #[serde(flatten)]
    pub data: ContainerEventData,
}

impl ContainerEvent {
    /// Decode an envelope
    ///
    /// Payloads of unknown type leave the ids empty; a known payload that
    /// fails to decode is an error.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self> {
        let (timestamp, time) = match &envelope.timestamp {
            Some(ts) => {
                let time = DateTime::<Utc>::from_timestamp(ts.seconds, ts.nanos.max(0) as u32)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default();
                (ts.seconds, time)
            }
            None => (0, String::new()),
        };

        let mut data = ContainerEventData {
            timestamp,
            event: topic_action(&envelope.topic).to_string(),
            namespace: envelope.namespace.clone(),
            ..Default::default()
        };

        if let Some(payload) = &envelope.event {
            decode_payload(&payload.type_url, &payload.value, &mut data)?;
        }

        Ok(Self {
            event_type: ContainerEventType::from_topic(&envelope.topic),
            topic: envelope.topic.clone(),
            time,
            data,
        })
    }
}

fn topic_action(topic: &str) -> &str {
    topic.rsplit('/').next().unwrap_or_default()
}

fn decode_payload(type_url: &str, value: &[u8], data: &mut ContainerEventData) -> Result<()> {
    let type_name = type_url.rsplit('/').next().unwrap_or_default();

    match type_name {
        "containerd.events.ContainerCreate" => {
            let event = ContainerCreate::decode(value)?;
            data.container_id = event.id;
            data.image_name = event.image;
        }
        "containerd.events.ContainerUpdate" => {
            let event = ContainerUpdate::decode(value)?;
            data.container_id = event.id;
            data.image_name = event.image;
        }
        "containerd.events.ContainerDelete" => {
            data.container_id = ContainerDelete::decode(value)?.id;
        }
        "containerd.events.ImageCreate" => {
            data.image_name = ImageCreate::decode(value)?.name;
        }
        "containerd.events.ImageUpdate" => {
            data.image_name = ImageUpdate::decode(value)?.name;
        }
        "containerd.events.ImageDelete" => {
            data.image_name = ImageDelete::decode(value)?.name;
        }
        "containerd.events.TaskStart" => {
            data.container_id = TaskStart::decode(value)?.container_id;
        }
        "containerd.events.TaskExit" => {
            data.container_id = TaskExit::decode(value)?.container_id;
        }
        _ => {}
    }

    Ok(())
}
