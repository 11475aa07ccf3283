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

//! Traffic statistics for Connections.
//!
//! Counters are plain atomics so they can be read at any time without
//! locking. With the `observability` feature enabled every update is also
//! mirrored to the `metrics` crate under the `extend.connection.*` names.
//!
//! ```rust
//! use extend::observability::ConnectionStats;
//!
//! let stats = ConnectionStats::new();
//! stats.record_sent(128);
//! stats.record_received(64);
//! assert_eq!(stats.messages_sent(), 1);
//! assert_eq!(stats.bytes_received(), 64);
//!
//! stats.reset();
//! assert_eq!(stats.bytes_sent(), 0);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Per-Connection message and byte counters.
#[derive(Debug)]
pub struct ConnectionStats {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    /// Milliseconds since the Unix epoch of the last reset.
    reset_at: AtomicU64,
}

impl Default for ConnectionStats {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}

impl ConnectionStats {
    /// Creates zeroed counters stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            reset_at: AtomicU64::new(now_millis()),
        }
    }

    /// Records one outbound message of `bytes` encoded bytes.
    pub fn record_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        {
            metrics::counter!("extend.connection.messages.sent").increment(1);
            metrics::counter!("extend.connection.bytes.sent").increment(bytes as u64);
        }
    }

    /// Records one inbound message of `bytes` encoded bytes.
    pub fn record_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        {
            metrics::counter!("extend.connection.messages.received").increment(1);
            metrics::counter!("extend.connection.bytes.received").increment(bytes as u64);
        }
    }

    /// Messages sent since the last reset.
    #[must_use]
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    /// Messages received since the last reset.
    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Bytes sent since the last reset.
    #[must_use]
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Bytes received since the last reset.
    #[must_use]
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Wall-clock time of the last reset.
    #[must_use]
    pub fn reset_at(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.reset_at.load(Ordering::Relaxed))
    }

    /// Zeroes every counter and restamps the reset time.
    pub fn reset(&self) {
        self.messages_sent.store(0, Ordering::Relaxed);
        self.messages_received.store(0, Ordering::Relaxed);
        self.bytes_sent.store(0, Ordering::Relaxed);
        self.bytes_received.store(0, Ordering::Relaxed);
        self.reset_at.store(now_millis(), Ordering::Relaxed);
    }
}
