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

//! Reference connection manager.
//!
//! A [`Peer`] implements [`ConnectionManager`](crate::connection::ConnectionManager)
//! for the Connections it accepts or initiates. It owns a service thread on
//! which every Connection and Channel state transition runs, keeps registries
//! of the protocols it speaks and the receivers peers may open Channels to,
//! and answers the channel-0 handshakes from those registries.
//!
//! # Architecture
//!
//! ```text
//!  application threads          service thread            inbound thread
//!  -------------------          --------------            --------------
//!  Channel::request ──post──> Transport::send
//!                                                  <──── Link::inbound
//!                              Codec::decode
//!                              Channel::receive
//! ```
//!
//! Frames move over a [`Transport`]; [`MemoryTransport`] links two Peers in
//! the same process.
//!
//! # Connection handshake
//!
//! 1. The initiator sends `OpenConnectionRequest` with its Connection id,
//!    member name, serializer name and the version range of every protocol it
//!    has registered.
//! 2. The acceptor rejects a serializer mismatch, picks for every protocol
//!    both know the newest version both speak, records the initiator's id and
//!    replies with its own id and the agreed versions.
//! 3. The initiator installs the agreed message factories and records the
//!    acceptor's id.

mod config;
mod handshake;
#[allow(clippy::module_inception)]
mod peer;
pub(crate) mod service;
mod transport;

pub use config::PeerConfig;
pub use peer::Peer;
pub use transport::{Frame, Link, MemoryTransport, Transport, TransportError};
