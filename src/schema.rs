//! Embedded Avro schema text.
//!
//! The handshake and call layers encode and decode every field by hand
//! against the primitives in [`crate::avro`] rather than parsing a schema
//! model; the one schema document this crate does need verbatim is the
//! protocol text itself, which the handshake MD5-hashes and sends as
//! `clientProtocol`.

/// The `AvroSourceProtocol` document Flume's Avro source publishes. Its
/// text (not a structural parse of it) is what gets MD5-hashed for the
/// handshake and sent as `clientProtocol` when the server asks for it.
pub const MESSAGE_PROTOCOL: &str = r#"
{
  "protocol": "AvroSourceProtocol",
  "namespace": "org.apache.flume.source.avro",
  "types": [
    {
      "type": "enum",
      "name": "Status",
      "symbols": [
        "OK",
        "FAILED",
        "UNKNOWN"
      ]
    },
    {
      "type": "record",
      "name": "AvroFlumeEvent",
      "fields": [
        {
          "name": "headers",
          "type": {
            "type": "map",
            "values": "string"
          }
        },
        {
          "name": "body",
          "type": "bytes"
        }
      ]
    }
  ],
  "messages": {
    "append": {
      "request": [
        {
          "name": "event",
          "type": "AvroFlumeEvent"
        }
      ],
      "response": "Status"
    },
    "appendBatch": {
      "request": [
        {
          "name": "events",
          "type": {
            "type": "array",
            "items": "AvroFlumeEvent"
          }
        }
      ],
      "response": "Status"
    }
  }
}
"#;
