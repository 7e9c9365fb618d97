//! JSON payload codec
//!
//! Pure data transforms between typed values and wire payloads. Both
//! directions return `None` on malformed input and log the cause; the core
//! never assumes payload structure, so a handler deciding a payload is
//! unusable just reports failure instead of propagating a parse error.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

/// Serialize a value to a JSON string, or `None` if it is not representable.
pub fn encode<T: Serialize>(value: &T) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(json) => Some(json),
        Err(e) => {
            error!(error = %e, "failed to encode payload as JSON");
            None
        }
    }
}

/// Deserialize a raw payload into the target shape, or `None` if it does not
/// parse.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Option<T> {
    match serde_json::from_slice(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            error!(error = %e, "failed to decode JSON payload");
            None
        }
    }
}
