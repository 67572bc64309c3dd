#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
#![allow(dead_code)]

//! # knx-link
//!
//! Client-side KNXnet/IP protocol stack: a UDP bridge between an IP host and
//! a KNX field bus via a gateway.
//!
//! The stack discovers gateways on the 224.0.23.12 multicast group, opens a
//! tunneling connection, and carries group-address read/write/response
//! operations with at-most-one-in-flight pacing, per-request acknowledgement
//! correlation, periodic liveness probing and fault recovery.
//!
//! ## Layers
//!
//! - [`addressing`] - group and individual address codecs
//! - [`protocol`] - the wire codec: frames, cEMI, APDUs, service-typed
//!   datagrams
//! - [`tunnel`] - the sans-IO connection state machine (discovery, connect,
//!   heartbeat, paced tunneling, disconnect)
//! - [`net`] - transport abstraction with mock and `embassy-net` backends
//! - [`client`] - the async request API (feature `embassy`)
//! - [`dpt`] - datapoint type encode/decode
//!
//! The codec and the state machine are pure: no sockets, no clock. They can
//! be embedded in any runtime that can feed them datagrams and timestamps;
//! the bundled client does exactly that on top of `embassy-time` and two UDP
//! sockets.
//!
//! ## Example
//!
//! ```rust,ignore
//! use knx_link::{ga, ClientConfig, KnxClient, KnxValue};
//!
//! let mut client = KnxClient::new(ClientConfig::default(), control, discovery)?;
//! client.connect().await?;
//! client.write(ga!(1/2/3), KnxValue::Switch(true)).await?;
//! client.disconnect().await?;
//! ```

pub mod addressing;
pub mod config;
pub mod dpt;
pub mod error;
pub mod net;
pub mod protocol;
pub mod tunnel;

#[cfg(feature = "embassy")]
pub mod client;

// Macro modules (must be declared before use)
#[macro_use]
pub mod logging;
#[macro_use]
pub mod macros;

// Re-export commonly used types
pub use addressing::{GroupAddress, IndividualAddress};
pub use config::ClientConfig;
pub use dpt::KnxValue;
pub use error::{KnxError, Result};
pub use tunnel::{AckOutcome, ConnectionState, Event, TunnelMachine};

#[cfg(feature = "embassy")]
pub use client::{KnxClient, KnxEvent};
