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

//! The contract between Connections and the component that owns them.

use crate::channel::{Channel, Receiver};
use crate::connection::Connection;
use crate::error::ExtendError;
use crate::protocol::{Message, Protocol};
use crate::serialization::SerializerFormat;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Which side of the Connection this peer is.
///
/// The role decides the half of the channel id space a Connection allocates
/// from, so that both peers can create Channels without coordinating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Accepted the Connection; allocates negative channel ids.
    Acceptor,
    /// Initiated the Connection; allocates positive channel ids.
    Initiator,
}

impl Role {
    /// Sign applied to randomly drawn channel ids.
    #[must_use]
    pub const fn channel_id_sign(self) -> i32 {
        match self {
            Role::Acceptor => -1,
            Role::Initiator => 1,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Acceptor => f.write_str("acceptor"),
            Role::Initiator => f.write_str("initiator"),
        }
    }
}

/// Owns Connections, runs the service thread and moves encoded messages.
///
/// All state transitions of a Connection or Channel happen on the manager's
/// service thread. Calls made on other threads are handed over with
/// [`close_channel`](Self::close_channel) and
/// [`close_connection`](Self::close_connection).
pub trait ConnectionManager: Send + Sync + 'static {
    /// Side of the Connections this manager owns.
    fn role(&self) -> Role;

    /// Name used in diagnostics.
    fn service_name(&self) -> &str;

    /// Protocol spoken on channel 0.
    fn control_protocol(&self) -> Arc<Protocol>;

    /// Receiver attached to channel 0 of every Connection.
    fn control_receiver(&self) -> Option<Arc<dyn Receiver>>;

    /// Serializer for channel 0 and for Channels opened without one.
    fn ensure_serializer(&self) -> SerializerFormat;

    /// Default request timeout. `None` waits forever.
    fn request_timeout(&self) -> Option<Duration>;

    /// Combines the default timeout with a per-request override.
    fn adjust_timeout(
        &self,
        default: Option<Duration>,
        requested: Option<Duration>,
    ) -> Option<Duration> {
        requested.or(default)
    }

    /// Returns `true` on the service thread.
    ///
    /// With `strict == false` the answer is also `true` when no service
    /// thread is running, in which case the caller owns the Connections.
    fn is_service_thread(&self, strict: bool) -> bool;

    /// Blocks until the manager accepts client calls.
    fn wait_accepting_clients(&self) -> Result<(), ExtendError> {
        Ok(())
    }

    /// Encodes `message` for `channel` and hands it to the transport.
    fn post(&self, channel: &Arc<Channel>, message: Box<dyn Message>) -> Result<(), ExtendError>;

    /// Closes `channel` on the service thread. With `wait` the call returns
    /// only after the close ran.
    fn close_channel(
        &self,
        channel: &Arc<Channel>,
        notify: bool,
        cause: Option<ExtendError>,
        wait: bool,
    ) -> Result<(), ExtendError>;

    /// Closes `connection` on the service thread. With `wait` the call
    /// returns only after the close ran.
    fn close_connection(
        &self,
        connection: &Arc<Connection>,
        notify: bool,
        cause: Option<ExtendError>,
        wait: bool,
    ) -> Result<(), ExtendError>;

    /// A Channel finished opening.
    fn on_channel_opened(&self, channel: &Arc<Channel>) {
        let _ = channel;
    }

    /// A Channel finished closing.
    fn on_channel_closed(&self, channel: &Arc<Channel>) {
        let _ = channel;
    }

    /// A Connection closed cleanly.
    fn on_connection_closed(&self, connection: &Arc<Connection>) {
        let _ = connection;
    }

    /// A Connection closed because of `cause`.
    fn on_connection_error(&self, connection: &Arc<Connection>, cause: &ExtendError) {
        let _ = (connection, cause);
    }
}
