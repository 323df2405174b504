//! Event envelope and wire properties.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Whether the broker should keep a message across its own restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    Transient,
    Persistent,
}

/// Metadata carried next to the message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageProperties {
    pub message_id: Uuid,
    pub content_type: String,
    pub delivery_mode: DeliveryMode,
    pub timestamp: DateTime<Utc>,
}

/// An immutable published event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub exchange: String,
    pub routing_key: String,
    pub properties: MessageProperties,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Build a persistent JSON event stamped with the current time.
    pub fn new<T: Serialize>(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            properties: MessageProperties {
                message_id: Uuid::new_v4(),
                content_type: CONTENT_TYPE_JSON.to_string(),
                delivery_mode: DeliveryMode::Persistent,
                timestamp: Utc::now(),
            },
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Serialize the payload for the wire.
    pub fn body(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.payload)
    }

    /// Rebuild an envelope from a received message.
    pub fn decode(
        exchange: &str,
        routing_key: &str,
        properties: MessageProperties,
        body: &[u8],
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            properties,
            payload: serde_json::from_slice(body)?,
        })
    }

    /// Deserialize the payload into a typed event.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}
