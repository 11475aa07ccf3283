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

//! Top-level error types for Extend.
//!
//! Errors are organised in layers, each owned by the module that raises it:
//!
//! 1. **Connection layer**: closed or closing Connections and Channels
//!    ([`ConnectionError`])
//! 2. **Protocol layer**: configuration and registration failures
//!    ([`ProtocolError`])
//! 3. **Codec layer**: malformed or truncated wire data ([`CodecError`])
//! 4. **Remote layer**: failures raised by the peer while executing a request
//!    ([`RemoteError`])
//!
//! [`ExtendError`] composes these layers. Every error is `Clone` because a
//! single cancellation cause is handed to every waiter on a
//! [`Status`](crate::channel::Status).
//!
//! # Examples
//!
//! ```rust
//! use extend::{ExtendError, RemoteError};
//!
//! let error = ExtendError::Remote(RemoteError::new("illegal-state", "boom"));
//! assert!(error.is_remote());
//! assert_eq!(error.kind(), "remote");
//! ```

use crate::codec::CodecError;
use crate::connection::ConnectionError;
use crate::protocol::ProtocolError;
use crate::serialization::{DeserializationError, SerializationError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for Extend operations.
#[derive(Debug, Clone, Error)]
pub enum ExtendError {
    /// The Connection or Channel is closed or closing.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// A protocol, factory or registration error.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The wire data could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A value could not be serialized.
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// A value could not be deserialized.
    #[error(transparent)]
    Deserialization(#[from] DeserializationError),

    /// A request was not answered within its timeout.
    ///
    /// The associated [`Status`](crate::channel::Status) has been cancelled.
    #[error("request {request_id} timed out after {timeout:?}")]
    Timeout {
        /// Id of the request that timed out.
        request_id: i64,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The peer failed while executing the request.
    #[error("remote failure: {0}")]
    Remote(RemoteError),

    /// An operation was invoked in a state that does not permit it.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// An argument was rejected.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// An unrecoverable failure, such as a panic inside message execution.
    #[error("unrecoverable failure: {0}")]
    Fatal(String),
}

impl ExtendError {
    /// Creates an [`ExtendError::IllegalState`].
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }

    /// Creates an [`ExtendError::IllegalArgument`].
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::IllegalArgument(message.into())
    }

    /// Returns `true` if this error reports a closed or closing Connection or
    /// Channel.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns `true` if this error reports a Connection or Channel that is
    /// in the process of closing.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        matches!(self, Self::Connection(e) if e.is_closing())
    }

    /// Returns `true` if this error is a request timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if this error was raised by the peer.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// Returns a short, stable name for the error layer.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Protocol(_) => "protocol",
            Self::Codec(_) => "codec",
            Self::Serialization(_) => "serialization",
            Self::Deserialization(_) => "deserialization",
            Self::Timeout { .. } => "timeout",
            Self::Remote(_) => "remote",
            Self::IllegalState(_) => "illegal-state",
            Self::IllegalArgument(_) => "illegal-argument",
            Self::Fatal(_) => "fatal",
        }
    }
}

/// Failure surrogate carried by a failed [`Response`](crate::protocol::Response).
///
/// The peer records the kind and rendered message of the error it raised;
/// the requester surfaces it as [`ExtendError::Remote`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    kind: String,
    message: String,
}

impl RemoteError {
    /// Creates a remote error from its kind and message.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// The kind of error raised by the peer.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The rendered error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&ExtendError> for RemoteError {
    fn from(error: &ExtendError) -> Self {
        match error {
            ExtendError::Remote(remote) => remote.clone(),
            other => Self::new(other.kind(), other.to_string()),
        }
    }
}

impl From<RemoteError> for ExtendError {
    fn from(error: RemoteError) -> Self {
        Self::Remote(error)
    }
}
