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

//! Identifiers exchanged during the create/accept channel handshake.

use crate::channel::ChannelId;
use crate::protocol::ProtocolError;
use std::fmt;
use std::str::FromStr;

const SCHEME: &str = "channel";

/// Names a pending Channel as `channel:<id>#<protocol>`.
///
/// Produced by
/// [`Connection::create_channel_internal`](super::Connection::create_channel_internal)
/// and handed to the peer, which accepts the Channel with
/// [`Connection::accept_channel_internal`](super::Connection::accept_channel_internal).
///
/// ```rust
/// use extend::channel::ChannelId;
/// use extend::connection::ChannelUri;
///
/// let uri: ChannelUri = "channel:-42#Cache".parse().unwrap();
/// assert_eq!(uri.id(), ChannelId::new(-42));
/// assert_eq!(uri.protocol(), "Cache");
/// assert_eq!(uri.to_string(), "channel:-42#Cache");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelUri {
    id: ChannelId,
    protocol: String,
}

impl ChannelUri {
    /// Creates a URI for the Channel `id` speaking `protocol`.
    pub fn new(id: ChannelId, protocol: impl Into<String>) -> Self {
        Self {
            id,
            protocol: protocol.into(),
        }
    }

    /// The Channel id.
    #[must_use]
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// The protocol name.
    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }
}

impl fmt::Display for ChannelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}:{}#{}", self.id.as_i32(), self.protocol)
    }
}

impl FromStr for ChannelUri {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidUri(s.to_string());
        let rest = s
            .strip_prefix(SCHEME)
            .and_then(|rest| rest.strip_prefix(':'))
            .ok_or_else(invalid)?;
        let (id, protocol) = rest.split_once('#').ok_or_else(invalid)?;
        if protocol.is_empty() {
            return Err(invalid());
        }
        let id = id.parse::<i32>().map_err(|_| invalid())?;
        Ok(Self::new(ChannelId::new(id), protocol))
    }
}
