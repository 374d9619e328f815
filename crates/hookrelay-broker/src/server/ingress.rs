//! Ingress: turn an inbound webhook call into a broadcast.

use std::collections::btree_map::Entry;

use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{error, info};

use hookrelay_core::{BodyPolicy, WebhookEvent};

use super::AppState;

/// Query parameter used by webhook providers to verify a subscription.
/// Its value is echoed back as the response body.
pub const CHALLENGE_PARAM: &str = "hub.challenge";

const ACCEPTED_BODY: &str = "Event sent";

/// `ANY /{service}`: broadcast the call to the `service` channel.
///
/// Responds as soon as the event is queued on the hub; delivery and replay
/// outcomes are never reported back to the caller.
pub async fn ingress(
    Path(service): Path<String>,
    method: Method,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    let event = event_from_request(&method, query.as_deref(), &headers, &body, state.body_policy);
    let challenge = challenge(&event);

    info!(
        channel = %service,
        method = %event.method,
        payload_bytes = event.payload.as_ref().map_or(0, Vec::len),
        "Received webhook event"
    );

    if let Err(e) = state.hub.broadcast(&service, event).await {
        error!(channel = %service, error = %e, "Failed to queue event on hub");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    match challenge {
        Some(value) => (StatusCode::OK, value).into_response(),
        None => (StatusCode::OK, ACCEPTED_BODY).into_response(),
    }
}

/// Build the wire event for an inbound call.
///
/// Every query pair is kept, in order. Header names are lowercase; repeated
/// headers are joined with `", "`. The body is captured only when `policy`
/// says the method carries one.
pub fn event_from_request(
    method: &Method,
    query: Option<&str>,
    headers: &HeaderMap,
    body: &Bytes,
    policy: BodyPolicy,
) -> WebhookEvent {
    let mut event = WebhookEvent::new(method.as_str());

    if policy.carries_body(method.as_str()) {
        event.payload = Some(body.to_vec());
    }

    if let Some(query) = query {
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            event
                .query
                .entry(name.into_owned())
                .or_default()
                .push(value.into_owned());
        }
    }

    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        match event.headers.entry(name.as_str().to_string()) {
            Entry::Occupied(mut existing) => {
                let existing = existing.get_mut();
                existing.push_str(", ");
                existing.push_str(&value);
            }
            Entry::Vacant(slot) => {
                slot.insert(value.into_owned());
            }
        }
    }

    event
}

fn challenge(event: &WebhookEvent) -> Option<String> {
    event
        .query
        .get(CHALLENGE_PARAM)
        .and_then(|values| values.first())
        .filter(|value| !value.is_empty())
        .cloned()
}
