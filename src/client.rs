//! The client facade: owns the composed transport stack, drives the
//! handshake once at construction, and exposes `append`/`append_batch`/
//! `close`.

use std::time::SystemTime;

use std::str::FromStr;

use crate::avro::Value;
use crate::call::CallProtocol;
use crate::config::ClientOptions;
use crate::error::{Error, ProtocolError};
use crate::event::{Event, Status};
use crate::framing::FramingLayer;
use crate::handshake::HandshakeProtocol;
use crate::message::{AvroSourceProtocol, Payload};
use crate::net::{BufferedTransport, Socket, TlsTransport, Transport, ZlibTransport};

/// A connected client. Construction dials, opens the transport stack, and
/// completes the handshake before returning.
pub struct Client {
    framing: FramingLayer<Box<dyn Transport>>,
    call: CallProtocol<AvroSourceProtocol>,
    send_timeout: Option<std::time::Duration>,
}

impl Client {
    /// Builds the transport stack from `options`, opens it, and runs the
    /// handshake.
    pub fn connect(options: ClientOptions) -> Result<Self, Error> {
        options.validate()?;

        log::debug!("connecting to {}:{}", options.host, options.port);
        let mut transport = build_transport(&options)?;
        transport.open()?;

        let mut framing = FramingLayer::new(transport);
        let mut handshake = HandshakeProtocol::new();
        Self::run_handshake(&mut framing, &mut handshake)?;
        log::debug!("handshake complete");

        Ok(Client {
            framing,
            call: CallProtocol::new(AvroSourceProtocol::new()),
            send_timeout: options.send_timeout,
        })
    }

    /// Builds a client directly atop an already-constructed transport,
    /// bypassing `ClientOptions`. Used by tests that need to inject a mock
    /// transport.
    pub(crate) fn connect_with_transport(
        transport: Box<dyn Transport>,
        send_timeout: Option<std::time::Duration>,
    ) -> Result<Self, Error> {
        let mut transport = transport;
        transport.open()?;

        let mut framing = FramingLayer::new(transport);
        let mut handshake = HandshakeProtocol::new();
        Self::run_handshake(&mut framing, &mut handshake)?;

        Ok(Client {
            framing,
            call: CallProtocol::new(AvroSourceProtocol::new()),
            send_timeout,
        })
    }

    fn run_handshake(
        framing: &mut FramingLayer<Box<dyn Transport>>,
        handshake: &mut HandshakeProtocol,
    ) -> Result<(), Error> {
        loop {
            let request = handshake.prepare_request();
            framing.write(&request)?;
            framing.transport_mut().flush()?;

            let response = framing.read()?;
            let resend = handshake.process_response(&response)?;
            if !resend {
                return Ok(());
            }

            log::debug!("server does not know our protocol yet, resending handshake");
        }
    }

    fn apply_send_deadline(&mut self) -> Result<(), Error> {
        if let Some(timeout) = self.send_timeout {
            let deadline = SystemTime::now() + timeout;
            self.framing.set_deadline(deadline)?;
        }
        Ok(())
    }

    fn send_message(&mut self, method: &str, payload: Payload<'_>) -> Result<Status, Error> {
        self.apply_send_deadline()?;

        let request = self.call.prepare_request(method, payload)?;
        self.framing.write(&request)?;
        self.framing.transport_mut().flush()?;

        let response = self.framing.read()?;
        let value = self.call.parse_response(method, &response)?;

        let status = match value {
            Value::String(status) => status,
            _ => return Err(ProtocolError::BadStatusType.into()),
        };

        Status::from_str(&status)
    }

    /// Sends a single event, returning the status Flume responded with.
    pub fn append(&mut self, event: &Event) -> Result<Status, Error> {
        self.send_message("append", Payload::Event(event))
    }

    /// Sends a batch of events in one call.
    pub fn append_batch(&mut self, events: &[Event]) -> Result<Status, Error> {
        self.send_message("appendBatch", Payload::Events(events))
    }

    /// Applies the send deadline, then closes the transport stack.
    pub fn close(mut self) -> Result<(), Error> {
        self.apply_send_deadline()?;
        log::debug!("closing connection");
        self.framing.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::tests::MockTransport;
    use byteorder::{BigEndian, WriteBytesExt};

    /// Wraps a response payload in the 32-bit serial + frame-count + frame
    /// header the framing layer expects, mirroring what a real server would
    /// put on the wire for the given write.
    fn frame(serial: u32, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(serial).unwrap();
        buf.write_u32::<BigEndian>(1).unwrap();
        buf.write_u32::<BigEndian>(payload.len() as u32).unwrap();
        buf.extend_from_slice(payload);
        buf
    }

    fn handshake_response(match_index: u64, server_hash: Option<[u8; 16]>) -> Vec<u8> {
        let mut buf = Vec::new();
        crate::avro::encode_enum_index(match_index, &mut buf);
        crate::avro::encode_union_index(0, &mut buf); // serverProtocol: null
        match server_hash {
            None => crate::avro::encode_union_index(0, &mut buf),
            Some(hash) => {
                crate::avro::encode_union_index(1, &mut buf);
                crate::avro::encode_fixed(&hash, &mut buf);
            }
        }
        crate::avro::encode_union_index(0, &mut buf); // meta: null
        buf
    }

    fn empty_meta(buf: &mut Vec<u8>) {
        crate::avro::encode_map(std::iter::empty::<(&str, &[u8])>(), buf, |v, b| {
            crate::avro::encode_bytes(v, b)
        });
    }

    fn append_ok_response() -> Vec<u8> {
        let mut buf = Vec::new();
        empty_meta(&mut buf);
        crate::avro::encode_boolean(false, &mut buf);
        crate::avro::encode_enum_index(0, &mut buf); // OK
        buf
    }

    fn append_error_response(message: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        empty_meta(&mut buf);
        crate::avro::encode_boolean(true, &mut buf);
        crate::avro::encode_union_index(0, &mut buf); // errors union: string branch
        crate::avro::encode_string(message, &mut buf);
        buf
    }

    #[test]
    fn handshake_resend_then_append_returns_ok() {
        let mut server_bytes = Vec::new();
        server_bytes.extend(frame(1, &handshake_response(2, Some([7u8; 16])))); // NONE
        server_bytes.extend(frame(2, &handshake_response(0, None))); // BOTH
        server_bytes.extend(frame(3, &append_ok_response()));

        let transport: Box<dyn Transport> = Box::new(MockTransport::with_read_data(server_bytes));
        let mut client = Client::connect_with_transport(transport, None).unwrap();

        let status = client.append(&Event::with_body(b"tttt".to_vec())).unwrap();
        assert_eq!(status, Status::Ok);
    }

    #[test]
    fn error_response_surfaces_remote_message() {
        let mut server_bytes = Vec::new();
        server_bytes.extend(frame(1, &handshake_response(0, None))); // BOTH immediately
        server_bytes.extend(frame(2, &append_error_response("boom")));

        let transport: Box<dyn Transport> = Box::new(MockTransport::with_read_data(server_bytes));
        let mut client = Client::connect_with_transport(transport, None).unwrap();

        let err = client.append(&Event::with_body(b"x".to_vec())).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn mismatched_serial_is_rejected() {
        let mut server_bytes = Vec::new();
        server_bytes.extend(frame(1, &handshake_response(0, None)));
        server_bytes.extend(frame(7, &append_ok_response()));

        let transport: Box<dyn Transport> = Box::new(MockTransport::with_read_data(server_bytes));
        let mut client = Client::connect_with_transport(transport, None).unwrap();

        let err = client.append(&Event::with_body(b"x".to_vec())).unwrap_err();
        assert!(err.to_string().contains("2"));
        assert!(err.to_string().contains("7"));
    }

    #[test]
    fn residual_response_bytes_are_rejected() {
        let mut server_bytes = Vec::new();
        server_bytes.extend(frame(1, &handshake_response(0, None)));
        let mut response = append_ok_response();
        response.push(0x99);
        server_bytes.extend(frame(2, &response));

        let transport: Box<dyn Transport> = Box::new(MockTransport::with_read_data(server_bytes));
        let mut client = Client::connect_with_transport(transport, None).unwrap();

        let err = client.append(&Event::with_body(b"x".to_vec())).unwrap_err();
        assert!(err.to_string().contains("response buffer is not empty"));
    }

    #[test]
    fn append_batch_sends_every_event() {
        let mut server_bytes = Vec::new();
        server_bytes.extend(frame(1, &handshake_response(0, None)));
        server_bytes.extend(frame(2, &append_ok_response()));

        let transport: Box<dyn Transport> = Box::new(MockTransport::with_read_data(server_bytes));
        let mut client = Client::connect_with_transport(transport, None).unwrap();

        let events = vec![
            Event::with_body(b"one".to_vec()),
            Event::with_body(b"two".to_vec()),
        ];
        let status = client.append_batch(&events).unwrap();
        assert_eq!(status, Status::Ok);
    }

    #[test]
    fn compression_level_out_of_range_is_rejected_at_connect() {
        let options = ClientOptions::new("localhost", 41414).with_compression_level(10);
        let err = Client::connect(options).unwrap_err();
        assert!(err.to_string().contains("invalid compression level: 10"));
    }
}

fn build_transport(options: &ClientOptions) -> Result<Box<dyn Transport>, Error> {
    let mut transport: Box<dyn Transport> = Box::new(Socket::new(
        options.host.clone(),
        options.port,
        options.connect_timeout,
    ));

    if options.compression_level > 0 {
        transport = Box::new(ZlibTransport::new(transport, options.compression_level));
    }

    if let Some(tls) = &options.tls {
        let (config, server_name) = tls.build(&options.host)?;
        transport = Box::new(TlsTransport::new(transport, config, server_name));
    }

    if options.buffer_size > 0 {
        transport = Box::new(BufferedTransport::new(transport, options.buffer_size));
    }

    Ok(transport)
}
