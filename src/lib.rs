//! MinBiT: a bidirectional, byte-oriented, length-aware request/response
//! framing protocol for a duplex byte stream.
//!
//! A [`FramingEngine`] multiplexes typed messages over an arbitrary
//! [`ByteStream`], tracks in-flight outgoing requests against a
//! [`PacketSchema`], characterizes inbound packets, and enforces per-request
//! timeouts. [`TcpServer`] and [`TcpClient`] bind one engine per connection to
//! a real socket; anything that wants the protocol without a socket (tests,
//! mainly) can drive an engine directly over a [`LoopbackByteStream`].
//!
//! This crate was originally built for a VR locomotion system, where a
//! wearable IMU sensor streams orientation and step-event data to a VR
//! runtime driver over exactly this protocol; the reference schema for that
//! use case is [`PacketSchema::reference_imu_schema`].
//!
//! ```rust,no_run
//! use minbit::client::TcpClient;
//! use minbit::config::ClientConfig;
//! use minbit::schema::PacketSchema;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> minbit::error::MinBitResult<()> {
//!     let client = Arc::new(TcpClient::new("imu-client", ClientConfig::default()));
//!     client.set_schema(PacketSchema::reference_imu_schema());
//!     client.begin("127.0.0.1", 7777).await?;
//!
//!     let engine = client.protocol().await.unwrap();
//!     let request = engine.write_request(0x01).await?;
//!     engine.send_all().await?;
//!     request.wait_default().await;
//!
//!     client.end().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod request;
pub mod schema;
pub mod server;
pub mod stream;


pub use client::TcpClient;
pub use codec::{Endianness, Quat, Vec3};
pub use config::{ClientConfig, EngineConfig, ServerConfig, WriteMode};
pub use engine::FramingEngine;
pub use error::{MinBitError, MinBitResult};
pub use request::{Direction, Request, Status};
pub use schema::PacketSchema;
pub use server::TcpServer;
pub use stream::{ByteStream, LoopbackByteStream, TcpByteStream};
