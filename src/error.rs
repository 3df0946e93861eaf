//! Error taxonomy for the integration adapters.
//!
//! Every fetch/transform failure ends up in one of these variants. Adapters
//! catch them at the poll boundary and degrade (log, skip the item, keep the
//! previous entities) — no error here ever takes the service down.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    /// Network or HTTP-level failure (DNS, connect, timeout, non-2xx status).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body was not the JSON we expected.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A named parameter was absent from an otherwise well-formed payload.
    #[error("parameter {0:?} not present in payload")]
    MissingParameter(String),

    /// The EVSE vendor client reported a failure.
    #[error("EVSE error: {0}")]
    Vendor(String),
}
