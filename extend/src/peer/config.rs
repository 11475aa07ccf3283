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

//! Configuration for a [`Peer`](crate::peer::Peer).

use crate::channel::AccessAdapter;
use crate::serialization::{Serializer, SerializerFormat};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a Peer.
///
/// # Examples
///
/// ```rust
/// use extend::peer::PeerConfig;
/// use extend::serialization::SerializerFormat;
/// use std::time::Duration;
///
/// let config = PeerConfig::new("orders")
///     .with_request_timeout(Some(Duration::from_secs(2)))
///     .with_serializer(SerializerFormat::postcard());
/// assert_eq!(config.service_name, "orders");
/// assert_eq!(config.connect_timeout, Duration::from_secs(5));
/// ```
#[derive(Clone)]
pub struct PeerConfig {
    /// Name used for the service thread, in logs and as the member name sent
    /// to peers.
    ///
    /// Default: `"extend"`
    pub service_name: String,

    /// Default timeout for blocking requests. `None` waits forever.
    ///
    /// Default: 30 seconds
    pub request_timeout: Option<Duration>,

    /// How long [`Peer::connect`](crate::peer::Peer::connect) and the channel
    /// handshakes wait for the peer.
    ///
    /// Default: 5 seconds
    pub connect_timeout: Duration,

    /// How long a ping may stay unanswered before
    /// [`Peer::check_ping_timeouts`](crate::peer::Peer::check_ping_timeouts)
    /// closes the Connection.
    ///
    /// Default: 10 seconds
    pub ping_timeout: Duration,

    /// Serializer for channel 0 and for every Channel this Peer opens. Both
    /// peers must agree on it.
    ///
    /// Default: JSON
    pub serializer: SerializerFormat,

    /// Run-as hook installed on Channels opened at a peer's request.
    ///
    /// Default: None
    pub access_adapter: Option<Arc<dyn AccessAdapter>>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            service_name: "extend".to_string(),
            request_timeout: Some(Duration::from_secs(30)),
            connect_timeout: Duration::from_secs(5),
            ping_timeout: Duration::from_secs(10),
            serializer: SerializerFormat::default(),
            access_adapter: None,
        }
    }
}

impl std::fmt::Debug for PeerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConfig")
            .field("service_name", &self.service_name)
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("ping_timeout", &self.ping_timeout)
            .field("serializer", &self.serializer.name())
            .field("access_adapter", &self.access_adapter.is_some())
            .finish()
    }
}

impl PeerConfig {
    /// Creates a configuration with default values and the given service
    /// name.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    /// Sets the default request timeout.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the connect and handshake timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the ping timeout.
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// Sets the serializer.
    pub fn with_serializer(mut self, serializer: SerializerFormat) -> Self {
        self.serializer = serializer;
        self
    }

    /// Sets the access adapter.
    pub fn with_access_adapter(mut self, adapter: Arc<dyn AccessAdapter>) -> Self {
        self.access_adapter = Some(adapter);
        self
    }
}
