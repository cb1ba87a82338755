//! The message protocol binding for Flume's `AvroSourceProtocol`: the
//! method catalog and the schemas each method's request/response/error are
//! encoded against.

use crate::avro::{self, Value};
use crate::error::{Error, ProtocolError};
use crate::event::{Event, Status};

/// The datum passed to [`MessageProtocol::prepare_message`]: either a single
/// event (`append`) or a batch of them (`appendBatch`).
pub enum Payload<'a> {
    Event(&'a Event),
    Events(&'a [Event]),
}

/// A bound RPC method's schema catalog, parameterized by method name.
///
/// Grounded on the Go `AvroSourceProtocol` binding, which keeps one codec
/// triple (request, response, errors) per method name in a map rather than
/// hard-coding `append`/`appendBatch` as distinct code paths.
pub trait MessageProtocol {
    fn prepare_message(&self, method: &str, payload: Payload<'_>) -> Result<Vec<u8>, Error>;

    fn parse_message<'de>(&self, method: &str, buf: &mut &'de [u8]) -> Result<Value, Error>;

    fn parse_error(&self, method: &str, buf: &mut &[u8]) -> Result<Error, Error>;
}

/// The two RPC methods Flume's Avro source exposes: `append` and
/// `appendBatch`, both resolving to a `Status` response and a `string`
/// error union.
pub struct AvroSourceProtocol;

impl AvroSourceProtocol {
    pub fn new() -> Self {
        AvroSourceProtocol
    }

    fn check_method(method: &str) -> Result<(), Error> {
        match method {
            "append" | "appendBatch" => Ok(()),
            other => Err(ProtocolError::UnknownMethod(other.to_string()).into()),
        }
    }
}

impl Default for AvroSourceProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageProtocol for AvroSourceProtocol {
    fn prepare_message(&self, method: &str, payload: Payload<'_>) -> Result<Vec<u8>, Error> {
        Self::check_method(method)?;

        let mut buf = Vec::new();
        match (method, payload) {
            ("append", Payload::Event(event)) => {
                avro::encode_value(&event.to_value(), &mut buf);
            }
            ("appendBatch", Payload::Events(events)) => {
                avro::encode_value(&Value::Array(events.iter().map(Event::to_value).collect()), &mut buf);
            }
            (method, _) => {
                return Err(ProtocolError::UnknownMethod(method.to_string()).into());
            }
        }

        Ok(buf)
    }

    fn parse_message<'de>(&self, method: &str, buf: &mut &'de [u8]) -> Result<Value, Error> {
        Self::check_method(method)?;

        let index = avro::decode_enum_index(buf)?;
        let status = Status::from_index(index)
            .ok_or_else(|| Error::codec(format!("invalid Status enum index: {}", index)))?;

        Ok(Value::String(status.as_str().to_string()))
    }

    fn parse_error(&self, method: &str, buf: &mut &[u8]) -> Result<Error, Error> {
        Self::check_method(method)?;

        let branch = avro::decode_union_index(buf)?;
        if branch != 0 {
            return Err(Error::codec(format!(
                "cannot convert string error to string: unexpected union branch {}",
                branch
            )));
        }

        let message = avro::decode_string(buf)?;
        Ok(Error::Protocol(ProtocolError::Remote(message)))
    }
}
