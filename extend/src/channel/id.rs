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

//! Channel identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a Channel within its Connection.
///
/// Id `0` is the control channel that every Connection owns. Ids allocated by
/// an acceptor-role Connection are negative, ids allocated by an
/// initiator-role Connection are positive, so both peers can allocate without
/// coordinating.
///
/// # Examples
///
/// ```rust
/// use extend::channel::ChannelId;
///
/// let id = ChannelId::new(-17);
/// assert!(id.is_acceptor_allocated());
/// assert!(ChannelId::CONTROL.is_control());
/// assert_eq!(id.to_string(), "Channel(-17)");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(i32);

impl ChannelId {
    /// The reserved control channel.
    pub const CONTROL: ChannelId = ChannelId(0);

    /// Wraps a raw channel id.
    #[must_use]
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Returns `true` for the reserved control channel.
    #[must_use]
    pub const fn is_control(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if the id lies in the acceptor partition.
    #[must_use]
    pub const fn is_acceptor_allocated(self) -> bool {
        self.0 < 0
    }

    /// Returns `true` if the id lies in the initiator partition.
    #[must_use]
    pub const fn is_initiator_allocated(self) -> bool {
        self.0 > 0
    }
}

impl From<i32> for ChannelId {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl From<ChannelId> for i32 {
    fn from(id: ChannelId) -> Self {
        id.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Channel({})", self.0)
    }
}
