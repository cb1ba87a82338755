//! The Avro RPC handshake: negotiates a shared `AvroSourceProtocol` MD5
//! fingerprint with the server before any `append`/`appendBatch` traffic.
//!
//! See <http://avro.apache.org/docs/1.8.2/spec.html#handshake>.

use md5::{Digest, Md5};

use crate::avro;
use crate::error::{Error, ProtocolError};
use crate::schema::MESSAGE_PROTOCOL;

fn md5_of(text: &str) -> [u8; 16] {
    let digest = Md5::digest(text.as_bytes());
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest);
    out
}

/// Drives one handshake to completion, including the at-most-one resend the
/// `NONE` branch of the transition table can trigger.
pub struct HandshakeProtocol {
    client_hash: [u8; 16],
    server_hash: [u8; 16],
    client_protocol: &'static str,
    need_client_protocol: bool,
}

impl HandshakeProtocol {
    pub fn new() -> Self {
        let hash = md5_of(MESSAGE_PROTOCOL);
        HandshakeProtocol {
            client_hash: hash,
            server_hash: hash,
            client_protocol: MESSAGE_PROTOCOL,
            need_client_protocol: false,
        }
    }

    /// Encodes a `HandshakeRequest` followed by the two-byte empty-message
    /// marker (empty `meta` ‖ empty method name) that stands in for "no
    /// enclosed call" on a bare handshake round-trip.
    pub fn prepare_request(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        avro::encode_fixed(&self.client_hash, &mut buf);

        if self.need_client_protocol {
            avro::encode_union_index(1, &mut buf);
            avro::encode_string(self.client_protocol, &mut buf);
        } else {
            avro::encode_union_index(0, &mut buf);
        }

        avro::encode_fixed(&self.server_hash, &mut buf);

        // meta: union{null, map<bytes>}, always null.
        avro::encode_union_index(0, &mut buf);

        buf.extend_from_slice(&[0x00, 0x00]);

        buf
    }

    /// Decodes a `HandshakeResponse` and applies the transition table.
    /// Returns `true` when the caller must resend with
    /// `need_client_protocol` now set.
    pub fn process_response(&mut self, response: &[u8]) -> Result<bool, Error> {
        let mut buf = response;

        let match_index = avro::decode_enum_index(&mut buf)?;
        let server_protocol = Self::decode_optional_string(&mut buf)?;
        let server_hash = Self::decode_optional_hash(&mut buf)?;
        let _meta = Self::decode_optional_meta(&mut buf)?;

        match match_index {
            // BOTH
            0 => {
                log::debug!("handshake is successful");
                if server_hash.is_some() {
                    log::warn!("unexpected server's hash");
                }
                if server_protocol.is_some() {
                    log::warn!("unexpected server's protocol");
                }
                Ok(false)
            }
            // CLIENT
            1 => {
                log::debug!("update server's protocol");
                if server_hash.is_none() {
                    log::warn!("expected server's hash but got nil");
                }
                if server_protocol.is_none() {
                    log::warn!("expected server's protocol but got nil");
                }

                if self.need_client_protocol {
                    return Err(ProtocolError::UnknownClientProtocol.into());
                }

                if let Some(hash) = server_hash {
                    self.server_hash = hash;
                }

                Ok(false)
            }
            // NONE
            2 => {
                log::debug!("unknown client's protocol");

                if let Some(hash) = server_hash {
                    self.server_hash = hash;
                }

                if self.need_client_protocol {
                    return Err(ProtocolError::UnknownClientProtocol.into());
                }

                self.need_client_protocol = true;
                Ok(true)
            }
            other => Err(ProtocolError::UnknownMatch(other.to_string()).into()),
        }
    }

    fn decode_optional_string(buf: &mut &[u8]) -> Result<Option<String>, Error> {
        match avro::decode_union_index(buf)? {
            0 => Ok(None),
            1 => Ok(Some(avro::decode_string(buf)?)),
            other => Err(Error::codec(format!(
                "unexpected union branch for optional string: {}",
                other
            ))),
        }
    }

    fn decode_optional_hash(buf: &mut &[u8]) -> Result<Option<[u8; 16]>, Error> {
        match avro::decode_union_index(buf)? {
            0 => Ok(None),
            1 => {
                let bytes = avro::decode_fixed(buf, 16)?;
                let mut hash = [0u8; 16];
                hash.copy_from_slice(&bytes);
                Ok(Some(hash))
            }
            other => Err(Error::codec(format!(
                "unexpected union branch for optional hash: {}",
                other
            ))),
        }
    }

    fn decode_optional_meta(buf: &mut &[u8]) -> Result<Option<Vec<(String, Vec<u8>)>>, Error> {
        match avro::decode_union_index(buf)? {
            0 => Ok(None),
            1 => Ok(Some(avro::decode_map_bytes(buf)?)),
            other => Err(Error::codec(format!(
                "unexpected union branch for optional meta: {}",
                other
            ))),
        }
    }
}

impl Default for HandshakeProtocol {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_response(
        match_index: u64,
        server_protocol: Option<&str>,
        server_hash: Option<[u8; 16]>,
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        avro::encode_enum_index(match_index, &mut buf);

        match server_protocol {
            None => avro::encode_union_index(0, &mut buf),
            Some(s) => {
                avro::encode_union_index(1, &mut buf);
                avro::encode_string(s, &mut buf);
            }
        }

        match server_hash {
            None => avro::encode_union_index(0, &mut buf),
            Some(h) => {
                avro::encode_union_index(1, &mut buf);
                avro::encode_fixed(&h, &mut buf);
            }
        }

        avro::encode_union_index(0, &mut buf); // meta: null

        buf
    }

    #[test]
    fn both_match_completes_without_resend() {
        let mut hs = HandshakeProtocol::new();
        let response = encode_response(0, None, None);
        assert_eq!(hs.process_response(&response).unwrap(), false);
    }

    #[test]
    fn none_match_sets_resend_flag_once() {
        let mut hs = HandshakeProtocol::new();
        let response = encode_response(2, None, Some([7u8; 16]));

        assert_eq!(hs.process_response(&response).unwrap(), true);
        assert!(hs.need_client_protocol);
        assert_eq!(hs.server_hash, [7u8; 16]);

        // A second NONE is a loop: the server still claims not to know us
        // even after we sent the full protocol text.
        let err = hs.process_response(&response).unwrap_err();
        assert!(err.to_string().contains("unknown client's protocol"));
    }

    #[test]
    fn client_match_updates_server_hash() {
        let mut hs = HandshakeProtocol::new();
        let response = encode_response(1, Some("proto text"), Some([9u8; 16]));
        assert_eq!(hs.process_response(&response).unwrap(), false);
        assert_eq!(hs.server_hash, [9u8; 16]);
    }

    #[test]
    fn unknown_match_is_a_protocol_error() {
        let mut hs = HandshakeProtocol::new();
        let mut buf = Vec::new();
        avro::encode_enum_index(5, &mut buf);
        let err = hs.process_response(&buf).unwrap_err();
        assert!(err
            .to_string()
            .contains("unknown handshake response match field"));
    }

    #[test]
    fn prepare_request_sends_protocol_text_only_after_resend() {
        let mut hs = HandshakeProtocol::new();
        let first = hs.prepare_request();
        // clientHash(16) + clientProtocol union tag(1, null branch) + ...
        assert_eq!(first[16], 0x00);

        hs.need_client_protocol = true;
        let second = hs.prepare_request();
        assert_eq!(second[16], 0x02); // union index 1, zigzag-encoded
    }
}
