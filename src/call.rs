//! The Avro RPC call envelope: wraps a [`MessageProtocol`] with the
//! `meta ‖ method ‖ payload` request shape and the `meta ‖ error_flag ‖
//! payload` response shape every Avro RPC call uses, independent of which
//! method is being invoked.
//!
//! See <http://avro.apache.org/docs/1.8.2/spec.html#Call+Format>.

use crate::avro::{self, Value};
use crate::error::{Error, ProtocolError};
use crate::message::{MessageProtocol, Payload};

pub struct CallProtocol<P> {
    proto: P,
}

impl<P: MessageProtocol> CallProtocol<P> {
    pub fn new(proto: P) -> Self {
        CallProtocol { proto }
    }

    /// Builds `meta(empty) ‖ method ‖ message.request` for `method`.
    pub fn prepare_request(&self, method: &str, payload: Payload<'_>) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();

        avro::encode_map(std::iter::empty::<(&str, &[u8])>(), &mut buf, |v, b| {
            avro::encode_bytes(v, b)
        });
        avro::encode_string(method, &mut buf);
        buf.extend(self.proto.prepare_message(method, payload)?);

        Ok(buf)
    }

    /// Decodes a response envelope: discards `meta`, reads `error_flag`,
    /// then dispatches to [`MessageProtocol::parse_message`] or
    /// [`MessageProtocol::parse_error`] accordingly. Either branch must
    /// exhaust the supplied buffer; leftover bytes are a protocol error.
    pub fn parse_response(&self, method: &str, response: &[u8]) -> Result<Value, Error> {
        let mut buf = response;

        avro::decode_map_bytes(&mut buf)?;
        let error_flag = avro::decode_boolean(&mut buf)?;

        let result = if error_flag {
            Err(self.proto.parse_error(method, &mut buf)?)
        } else {
            Ok(self.proto.parse_message(method, &mut buf)?)
        };

        Self::check_response_buffer(buf)?;
        result
    }

    fn check_response_buffer(rest: &[u8]) -> Result<(), Error> {
        if rest.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ResponseBufferNotEmpty {
                len: rest.len(),
                rest: rest.to_vec(),
            }
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::message::AvroSourceProtocol;

    #[test]
    fn prepare_request_envelope_shape() {
        let call = CallProtocol::new(AvroSourceProtocol::new());
        let event = Event::with_body(b"hello".to_vec());
        let request = call
            .prepare_request("append", Payload::Event(&event))
            .unwrap();

        // empty meta map (1 byte) + "append" string + event record
        assert_eq!(request[0], 0x00);
        let mut cursor = &request[1..];
        assert_eq!(avro::decode_string(&mut cursor).unwrap(), "append");
    }

    #[test]
    fn parse_response_rejects_residual_bytes() {
        let call = CallProtocol::new(AvroSourceProtocol::new());

        let mut buf = Vec::new();
        avro::encode_map(std::iter::empty::<(&str, &[u8])>(), &mut buf, |v, b| {
            avro::encode_bytes(v, b)
        });
        avro::encode_boolean(false, &mut buf);
        avro::encode_enum_index(0, &mut buf);
        buf.push(0xFF); // trailing garbage

        let err = call.parse_response("append", &buf).unwrap_err();
        assert!(err.to_string().contains("response buffer is not empty"));
    }

    #[test]
    fn parse_response_success_path() {
        let call = CallProtocol::new(AvroSourceProtocol::new());

        let mut buf = Vec::new();
        avro::encode_map(std::iter::empty::<(&str, &[u8])>(), &mut buf, |v, b| {
            avro::encode_bytes(v, b)
        });
        avro::encode_boolean(false, &mut buf);
        avro::encode_enum_index(0, &mut buf);

        let value = call.parse_response("append", &buf).unwrap();
        assert_eq!(value, Value::String("OK".to_string()));
    }

    #[test]
    fn parse_response_error_path_also_checks_residual() {
        let call = CallProtocol::new(AvroSourceProtocol::new());

        let mut buf = Vec::new();
        avro::encode_map(std::iter::empty::<(&str, &[u8])>(), &mut buf, |v, b| {
            avro::encode_bytes(v, b)
        });
        avro::encode_boolean(true, &mut buf);
        avro::encode_union_index(0, &mut buf);
        avro::encode_string("boom", &mut buf);

        let err = call.parse_response("append", &buf).unwrap_err();
        assert_eq!(err.to_string(), "protocol error: boom");
    }
}
