//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

#![doc = include_str!("../../README.md")]
#![allow(clippy::module_inception)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

//! # Extend - Multiplexed Channel Messaging
//!
//! Extend carries many independent, versioned conversations over a single
//! peer-to-peer link:
//!
//! - **Channels**: numbered conversations multiplexed over one Connection,
//!   each speaking its own protocol
//! - **Request correlation**: every request gets a per-Channel id and a
//!   [`Status`](channel::Status) that resolves exactly once
//! - **Version negotiation**: protocols declare a supported version range and
//!   peers agree on the newest common version per Connection
//! - **Forward compatibility**: properties a peer does not understand are
//!   kept and written back out unchanged
//! - **Quiescent teardown**: closing drains the threads executing inside a
//!   Channel or Connection, or defers the close to the last one leaving
//!
//! ## Architecture
//!
//! - **[`protocol`]**: protocols, message factories, messages, requests and
//!   responses, plus the channel-0 control protocol
//! - **[`codec`]**: the message envelope and property stream
//! - **[`serialization`]**: payload formats (JSON, Postcard)
//! - **[`channel`]**: Channels, request statuses and receivers
//! - **[`connection`]**: Connections, channel id allocation and the
//!   [`ConnectionManager`](connection::ConnectionManager) contract
//! - **[`gate`]**: the thread gate used to drain work before teardown
//! - **[`peer`]**: a reference connection manager with a service thread and
//!   an in-memory transport
//! - **[`observability`]**: traffic counters
//!
//! ## Error Handling
//!
//! Errors are layered: [`ConnectionError`](connection::ConnectionError) for
//! closed or closing targets, [`ProtocolError`](protocol::ProtocolError) for
//! configuration mistakes, [`CodecError`](codec::CodecError) for malformed
//! wire data and [`RemoteError`] for failures raised by the peer. All of them
//! compose into [`ExtendError`].
//!
//! ## Safety
//!
//! Extend is written in 100% safe Rust with `#![deny(unsafe_code)]`.

pub mod channel;
pub mod codec;
pub mod connection;
pub mod error;
pub mod gate;
mod lifecycle;
pub mod observability;
pub mod peer;
pub mod protocol;
pub mod serialization;

#[cfg(test)]
mod testing;

pub use channel::{Channel, ChannelId, Receiver, Status};
pub use connection::{ChannelUri, Connection, ConnectionError, ConnectionManager, Role};
pub use error::{ExtendError, RemoteError};
pub use observability::ConnectionStats;
pub use peer::{MemoryTransport, Peer, PeerConfig, Transport};
pub use protocol::{Message, MessageFactory, Protocol, ProtocolError, Request, Response};
pub use serialization::{Serializer, SerializerFormat};
