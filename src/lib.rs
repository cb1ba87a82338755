//! A blocking Avro RPC client for Apache Flume's `AvroSourceProtocol`.
//!
//! Opens a TCP connection (optionally wrapped in zlib compression, TLS, and
//! read/write buffering), performs the Avro RPC handshake, and exposes
//! `append`/`append_batch` against a Flume Avro source. There is no async
//! runtime involved: every call blocks the calling thread for the duration
//! of the round-trip.
//!
//! ```no_run
//! use flume_avro_client::{Client, ClientOptions, Event, Status};
//!
//! # fn main() -> Result<(), flume_avro_client::Error> {
//! let mut client = Client::connect(ClientOptions::new("localhost", 41414))?;
//! let status = client.append(&Event::with_body(b"hello".to_vec()))?;
//! assert_eq!(status, Status::Ok);
//! client.close()?;
//! # Ok(())
//! # }
//! ```

pub mod error;

mod avro;
mod call;
pub mod client;
pub mod config;
pub mod event;
mod framing;
mod handshake;
mod message;
mod net;
mod schema;

pub use client::Client;
pub use config::{ClientOptions, TlsOptions};
pub use error::{Error, ProtocolError, Result};
pub use event::{Event, Status};
