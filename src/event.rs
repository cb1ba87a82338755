//! The `Event` envelope consumed at the RPC boundary.

use std::collections::HashMap;

use crate::avro::Value;
use crate::err_protocol;

/// A single Flume event: a header map plus an opaque body.
///
/// Immutable once constructed; [`Event::to_value`] produces the Avro
/// [`Value`] sent on the wire as an `AvroFlumeEvent` record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Event {
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl Event {
    /// Creates an event from a header map and a body.
    pub fn new(headers: HashMap<String, String>, body: impl Into<Vec<u8>>) -> Self {
        Event {
            headers,
            body: body.into(),
        }
    }

    /// Creates an event with no headers.
    pub fn with_body(body: impl Into<Vec<u8>>) -> Self {
        Event {
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Converts this event into the Avro value shape the message protocol
    /// encodes against the `AvroFlumeEvent` schema: a record of
    /// `headers: map<string>` and `body: bytes`.
    pub fn to_value(&self) -> Value {
        let headers = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        Value::Record(vec![
            ("headers".to_string(), Value::Map(headers)),
            ("body".to_string(), Value::Bytes(self.body.clone())),
        ])
    }
}

/// The tri-valued status every `append`/`appendBatch` call resolves to,
/// transported as the Avro enum `Status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Failed,
    Unknown,
}

impl Status {
    pub(crate) const SYMBOLS: [&'static str; 3] = ["OK", "FAILED", "UNKNOWN"];

    pub(crate) fn from_index(index: u64) -> Option<Self> {
        match index {
            0 => Some(Status::Ok),
            1 => Some(Status::Failed),
            2 => Some(Status::Unknown),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        Self::SYMBOLS[match self {
            Status::Ok => 0,
            Status::Failed => 1,
            Status::Unknown => 2,
        }]
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OK" => Ok(Status::Ok),
            "FAILED" => Ok(Status::Failed),
            "UNKNOWN" => Ok(Status::Unknown),
            other => Err(err_protocol!("cannot convert status to string: {}", other)),
        }
    }
}
