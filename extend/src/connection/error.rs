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

//! Error types for the connection layer.

use crate::channel::ChannelId;
use std::fmt;
use uuid::Uuid;

/// Errors raised when an operation targets a Connection or Channel that is
/// closed or closing.
///
/// Every variant carries the id of the Connection involved. These errors are
/// never retried internally; the caller decides whether to reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The Connection is closed.
    ConnectionClosed {
        /// The Connection's id.
        connection_id: Uuid,
    },

    /// The Connection is being closed and refuses new work.
    ConnectionClosing {
        /// The Connection's id.
        connection_id: Uuid,
    },

    /// The Channel is closed, or was never opened.
    ChannelClosed {
        /// The owning Connection's id.
        connection_id: Uuid,
        /// The Channel's id.
        channel_id: ChannelId,
    },

    /// The Channel is being closed and refuses new work.
    ChannelClosing {
        /// The owning Connection's id.
        connection_id: Uuid,
        /// The Channel's id.
        channel_id: ChannelId,
    },

    /// The transport carrying the Connection failed.
    Transport {
        /// The Connection's id.
        connection_id: Uuid,
        /// A description of the failure.
        message: String,
    },
}

impl ConnectionError {
    /// Returns the id of the Connection involved.
    #[must_use]
    pub const fn connection_id(&self) -> Uuid {
        match self {
            Self::ConnectionClosed { connection_id }
            | Self::ConnectionClosing { connection_id }
            | Self::ChannelClosed { connection_id, .. }
            | Self::ChannelClosing { connection_id, .. }
            | Self::Transport { connection_id, .. } => *connection_id,
        }
    }

    /// Returns the Channel involved, if any.
    #[must_use]
    pub const fn channel_id(&self) -> Option<ChannelId> {
        match self {
            Self::ChannelClosed { channel_id, .. } | Self::ChannelClosing { channel_id, .. } => {
                Some(*channel_id)
            }
            _ => None,
        }
    }

    /// Returns `true` if the target is in the middle of closing rather than
    /// already closed.
    #[must_use]
    pub const fn is_closing(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosing { .. } | Self::ChannelClosing { .. }
        )
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionClosed { connection_id } => {
                write!(f, "connection {connection_id} is closed")
            }
            Self::ConnectionClosing { connection_id } => {
                write!(f, "connection {connection_id} is closing")
            }
            Self::ChannelClosed {
                connection_id,
                channel_id,
            } => write!(f, "{channel_id} of connection {connection_id} is closed"),
            Self::ChannelClosing {
                connection_id,
                channel_id,
            } => write!(f, "{channel_id} of connection {connection_id} is closing"),
            Self::Transport {
                connection_id,
                message,
            } => write!(f, "transport of connection {connection_id} failed: {message}"),
        }
    }
}

impl std::error::Error for ConnectionError {}
