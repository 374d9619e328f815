//! Webhook event model and its JSON wire codec.
//!
//! One [`WebhookEvent`] captures a single inbound HTTP call. The broker
//! serializes it once per broadcast and the forwarding client decodes it to
//! rebuild the request. The channel an event was published to is routing
//! metadata and is never part of the wire form.
//!
//! Wire shape:
//!
//! ```json
//! {"method":"POST","payload":"e3g6MX0=","headers":{"X-Test":"1"},"query":{"a":["1","2"]}}
//! ```
//!
//! `payload` is base64 (or `null` when absent); `headers` and `query` may be
//! missing or `null` and then decode as empty maps.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// One inbound HTTP call, as relayed from the broker to forwarding clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// HTTP method, e.g. `GET` or `POST`. Never empty on a decoded event.
    pub method: String,

    /// Raw request body. `None` for methods that carry no body.
    #[serde(default, with = "base64_payload")]
    pub payload: Option<Vec<u8>>,

    /// One value per header name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: BTreeMap<String, String>,

    /// Query parameters, each with its values in original order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub query: BTreeMap<String, Vec<String>>,
}

impl WebhookEvent {
    /// Create an event with the given method and no payload, headers or query.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..Self::default()
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Set a header, replacing any previous value for the same name.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Append one value to a query parameter.
    #[must_use]
    pub fn with_query_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.entry(name.into()).or_default().push(value.into());
        self
    }

    /// Whether the event carries a non-empty payload.
    pub fn has_payload(&self) -> bool {
        self.payload.as_ref().is_some_and(|p| !p.is_empty())
    }

    /// Iterate query pairs in wire order, repeating the name for each value.
    pub fn query_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.query
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v.as_str())))
    }

    /// Serialize to the JSON text sent in one websocket frame.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode one websocket frame.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let event: Self =
            serde_json::from_slice(bytes).map_err(|e| Error::MalformedEvent(e.to_string()))?;
        if event.method.trim().is_empty() {
            return Err(Error::MalformedEvent("empty method".into()));
        }
        Ok(event)
    }
}

/// Treat an explicit JSON `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

mod base64_payload {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)] // signature dictated by `#[serde(with)]`
    pub fn serialize<S: Serializer>(
        payload: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match payload {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|encoded| STANDARD.decode(encoded).map_err(serde::de::Error::custom))
            .transpose()
    }
}
