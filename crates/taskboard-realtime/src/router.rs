//! Frame classification.
//!
//! Turns one inbound text frame into a typed event of the channel's
//! vocabulary. `forcedLogout` is recognised on every channel before the
//! vocabulary is consulted. Nothing here returns an error: malformed frames
//! are logged and dropped so one bad frame never tears down a connection.

use serde_json::Value;
use tracing::{debug, error, warn};

use taskboard_core::protocol::{Decoded, Vocabulary, FORCED_LOGOUT};

/// Outcome of routing one frame.
#[derive(Debug)]
pub enum Routed<V> {
    Event(V),
    ForcedLogout,
    /// Malformed, undecodable or of an unknown type.
    Ignored,
}

pub fn route<V: Vocabulary>(text: &str) -> Routed<V> {
    let channel = V::CHANNEL;
    let frame: Value = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            error!(%channel, error = %e, "Dropping malformed frame");
            return Routed::Ignored;
        }
    };
    let Value::Object(mut frame) = frame else {
        error!(%channel, "Dropping frame that is not a JSON object");
        return Routed::Ignored;
    };
    let kind = match frame.remove("type") {
        Some(Value::String(kind)) => kind,
        _ => {
            error!(%channel, "Dropping frame without a type");
            return Routed::Ignored;
        }
    };

    if kind == FORCED_LOGOUT {
        warn!(%channel, "Server forced logout");
        return Routed::ForcedLogout;
    }

    let data = frame.remove("data").unwrap_or(Value::Null);
    match V::decode(&kind, data) {
        Decoded::Event(event) => Routed::Event(event),
        Decoded::Unknown => {
            debug!(%channel, frame_type = %kind, "Ignoring unknown frame type");
            Routed::Ignored
        }
        Decoded::Invalid(e) => {
            error!(%channel, frame_type = %kind, error = %e, "Dropping frame with invalid data");
            Routed::Ignored
        }
    }
}
