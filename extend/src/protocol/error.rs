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

//! Protocol error types.

use crate::channel::ChannelId;
use thiserror::Error;

/// Configuration, registration and handshake errors.
///
/// These indicate programming or deployment mistakes rather than transient
/// conditions, and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// No protocol with the given name is known.
    #[error("unknown protocol {0:?}")]
    UnknownProtocol(String),

    /// A protocol was declared with `supported > current`.
    #[error("protocol {protocol:?}: supported version {supported} exceeds current version {current}")]
    InvalidVersionRange {
        /// Protocol name.
        protocol: String,
        /// Declared current version.
        current: i32,
        /// Declared oldest supported version.
        supported: i32,
    },

    /// A version outside `[supported, current]` was requested.
    #[error("protocol {protocol:?} does not support version {version} (supports {supported}..={current})")]
    UnsupportedVersion {
        /// Protocol name.
        protocol: String,
        /// Requested version.
        version: i32,
        /// Oldest supported version.
        supported: i32,
        /// Current version.
        current: i32,
    },

    /// The protocol's catalog does not provide messages for a version.
    #[error("protocol {protocol:?} provides no message catalog for version {version}")]
    NoMessageFactory {
        /// Protocol name.
        protocol: String,
        /// Requested version.
        version: i32,
    },

    /// A message type id is not registered with the factory.
    #[error("protocol {protocol:?} version {version} has no message type {type_id}")]
    UnknownMessageType {
        /// Protocol name.
        protocol: String,
        /// Factory version.
        version: i32,
        /// The unknown type id.
        type_id: i32,
    },

    /// Two constructors produced the same message type id.
    #[error("protocol {protocol:?} version {version} registers message type {type_id} twice")]
    DuplicateMessageType {
        /// Protocol name.
        protocol: String,
        /// Factory version.
        version: i32,
        /// The duplicated type id.
        type_id: i32,
    },

    /// A message type id resolved to a different kind of message.
    #[error("message type {type_id} is not a {expected}")]
    WrongMessageKind {
        /// The type id.
        type_id: i32,
        /// The Rust type that was expected.
        expected: &'static str,
    },

    /// A Channel with this id is already registered.
    #[error("duplicate channel: {0}")]
    DuplicateChannel(ChannelId),

    /// Channel 0 cannot be opened, accepted or closed by applications.
    #[error("channel 0 is reserved for the control protocol")]
    ReservedChannel,

    /// No live or pending Channel has this id.
    #[error("no such channel: {0}")]
    NoSuchChannel(ChannelId),

    /// A required value was not supplied.
    #[error("missing required {0}")]
    MissingField(&'static str),

    /// A set-once value was set again.
    #[error("{0} may only be set once")]
    AlreadySet(&'static str),

    /// A message was bound to a second Channel.
    #[error("message type {type_id} is already bound to {channel}")]
    AlreadyBound {
        /// The message type id.
        type_id: i32,
        /// The Channel it is bound to.
        channel: ChannelId,
    },

    /// A receiver was attached to a Channel of another protocol.
    #[error("receiver expects protocol {expected:?} but the channel uses {actual:?}")]
    ProtocolMismatch {
        /// Protocol of the receiver.
        expected: String,
        /// Protocol of the Channel's message factory.
        actual: String,
    },

    /// A channel URI could not be parsed.
    #[error("invalid channel URI {0:?}")]
    InvalidUri(String),

    /// The peers were configured with different serializers.
    #[error("peer uses serializer {remote:?} but this peer uses {local:?}")]
    SerializerMismatch {
        /// Local serializer name.
        local: String,
        /// Remote serializer name.
        remote: String,
    },

    /// No receiver is registered under the requested name.
    #[error("no receiver named {0:?}")]
    UnknownReceiver(String),
}
