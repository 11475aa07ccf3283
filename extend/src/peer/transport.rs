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

//! Frame transport between Peers.
//!
//! The messaging core never touches sockets. A [`Transport`] accepts encoded
//! frames addressed to a channel id; inbound frames arrive on the receiving
//! half of a [`Link`]. [`MemoryTransport`] connects two in-process Peers.

use crate::channel::ChannelId;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// One encoded message addressed to a Channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The Channel the message belongs to.
    pub channel_id: ChannelId,
    /// The encoded message.
    pub bytes: Vec<u8>,
}

impl Frame {
    /// Creates a frame.
    pub fn new(channel_id: ChannelId, bytes: Vec<u8>) -> Self {
        Self { channel_id, bytes }
    }
}

/// Errors raised while moving frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transport has been closed locally or by the peer.
    #[error("transport closed")]
    Closed,
}

/// Outbound half of a link to a peer.
pub trait Transport: Send + Sync + 'static {
    /// Queues `frame` for the peer. Must not block.
    fn send(&self, frame: Frame) -> Result<(), TransportError>;

    /// Closes the outbound half. The peer's inbound stream ends once the
    /// frames already sent have been delivered.
    fn close(&self);

    /// Returns `true` once closed.
    fn is_closed(&self) -> bool;
}

/// Both halves of a link: where to send, and where inbound frames arrive.
pub struct Link {
    /// Outbound half.
    pub transport: Arc<dyn Transport>,
    /// Inbound frames, in the order the peer sent them.
    pub inbound: mpsc::UnboundedReceiver<Frame>,
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("closed", &self.transport.is_closed())
            .finish_non_exhaustive()
    }
}

/// In-process transport backed by an unbounded Tokio channel.
///
/// ```rust
/// use extend::channel::ChannelId;
/// use extend::peer::{Frame, MemoryTransport};
///
/// let (left, mut right) = MemoryTransport::pair();
/// left.transport.send(Frame::new(ChannelId::CONTROL, vec![1, 2, 3])).unwrap();
/// assert_eq!(right.inbound.try_recv().unwrap().bytes, vec![1, 2, 3]);
/// ```
#[derive(Debug)]
pub struct MemoryTransport {
    outbound: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
}

impl MemoryTransport {
    /// Creates two connected links.
    pub fn pair() -> (Link, Link) {
        let (to_right, right_inbound) = mpsc::unbounded_channel();
        let (to_left, left_inbound) = mpsc::unbounded_channel();
        let left = Link {
            transport: Arc::new(MemoryTransport {
                outbound: Mutex::new(Some(to_right)),
            }),
            inbound: left_inbound,
        };
        let right = Link {
            transport: Arc::new(MemoryTransport {
                outbound: Mutex::new(Some(to_left)),
            }),
            inbound: right_inbound,
        };
        (left, right)
    }
}

impl Transport for MemoryTransport {
    fn send(&self, frame: Frame) -> Result<(), TransportError> {
        match self.outbound.lock().as_ref() {
            Some(outbound) => outbound.send(frame).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    fn close(&self) {
        self.outbound.lock().take();
    }

    fn is_closed(&self) -> bool {
        self.outbound
            .lock()
            .as_ref()
            .is_none_or(|outbound| outbound.is_closed())
    }
}
