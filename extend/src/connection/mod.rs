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

//! Connections and the Channels they multiplex.
//!
//! A [`Connection`] is one link to a peer. It always owns the control
//! channel `0`, keeps a table of live Channels and a table of *pending*
//! Channels created locally and waiting for the peer to accept them, and
//! allocates channel ids from the half of the id space given by its
//! [`Role`].
//!
//! # Opening a Channel
//!
//! Two handshakes exist, both carried by control messages on channel `0`:
//!
//! - **open**: this side asks the peer to attach a Channel to one of its
//!   named receivers ([`Connection::open_channel_internal`]). The peer
//!   allocates the id, opens its end ([`Connection::open_channel_request`])
//!   and replies with the id; this side then opens its end
//!   ([`Connection::open_channel_response`]).
//! - **create/accept**: this side creates a pending Channel and hands its
//!   [`ChannelUri`] to the peer out of band
//!   ([`Connection::create_channel_internal`]). The peer accepts it
//!   ([`Connection::accept_channel_internal`]), this side promotes the
//!   pending Channel ([`Connection::accept_channel_request`]) and the peer
//!   opens its end on the reply ([`Connection::accept_channel_response`]).

mod error;
mod manager;
mod uri;

pub use error::ConnectionError;
pub use manager::{ConnectionManager, Role};
pub use uri::ChannelUri;

use crate::channel::{AccessAdapter, Channel, ChannelId, Continuation, Receiver, Status, Subject};
use crate::error::{ExtendError, RemoteError};
use crate::gate::{CloseIntent, ThreadGate, Wait};
use crate::lifecycle::{Lifecycle, Transition};
use crate::observability::ConnectionStats;
use crate::protocol::control::{
    AcceptChannelRequest, ControlMessageType, NotifyConnectionClosed, OpenChannelRequest,
    PingRequest,
};
use crate::protocol::{MessageFactory, Protocol, ProtocolError, Response};
use crate::serialization::SerializerFormat;
use parking_lot::Mutex;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
#[cfg(feature = "observability")]
use tracing::instrument;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Size of the pending-channel table above which every new pending Channel
/// logs a warning.
pub const MAX_PENDING_CHANNELS: usize = 100;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
        .max(1)
}

/// One link to a peer, owning the Channels multiplexed over it.
pub struct Connection {
    id: Uuid,
    role: Role,
    manager: Weak<dyn ConnectionManager>,
    peer_id: Mutex<Option<Uuid>>,
    member: Mutex<Option<String>>,
    control: Arc<Channel>,
    channels: Mutex<BTreeMap<ChannelId, Arc<Channel>>>,
    pending: Mutex<BTreeMap<ChannelId, Arc<Channel>>>,
    factories: Mutex<HashMap<String, Arc<MessageFactory>>>,
    lifecycle: Lifecycle,
    gate: ThreadGate,
    stats: ConnectionStats,
    /// Epoch millis of the outstanding ping, `0` when none is outstanding.
    ping_sent_at: AtomicU64,
}

impl Connection {
    /// Creates a closed Connection owned by `manager`, with channel `0`
    /// registered.
    pub fn new(manager: &Arc<dyn ConnectionManager>) -> Arc<Self> {
        let id = Uuid::new_v4();
        Arc::new_cyclic(|this: &Weak<Connection>| {
            let control = Channel::new(ChannelId::CONTROL, this.clone(), id);
            let mut channels = BTreeMap::new();
            channels.insert(ChannelId::CONTROL, Arc::clone(&control));
            Self {
                id,
                role: manager.role(),
                manager: Arc::downgrade(manager),
                peer_id: Mutex::new(None),
                member: Mutex::new(None),
                control,
                channels: Mutex::new(channels),
                pending: Mutex::new(BTreeMap::new()),
                factories: Mutex::new(HashMap::new()),
                lifecycle: Lifecycle::new(),
                gate: ThreadGate::new(),
                stats: ConnectionStats::new(),
                ping_sent_at: AtomicU64::new(0),
            }
        })
    }

    /// Process-unique id of this Connection.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Side of the link this Connection is on.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Id of the peer's Connection, known once the open handshake finished.
    #[must_use]
    pub fn peer_id(&self) -> Option<Uuid> {
        *self.peer_id.lock()
    }

    /// Records the peer's Connection id.
    pub fn set_peer_id(&self, peer_id: Uuid) {
        *self.peer_id.lock() = Some(peer_id);
    }

    /// Name the peer introduced itself with.
    #[must_use]
    pub fn member(&self) -> Option<String> {
        self.member.lock().clone()
    }

    /// Records the peer's member name.
    pub fn set_member(&self, member: impl Into<String>) {
        *self.member.lock() = Some(member.into());
    }

    /// The owning manager, while it is alive.
    #[must_use]
    pub fn manager(&self) -> Option<Arc<dyn ConnectionManager>> {
        self.manager.upgrade()
    }

    /// Channel `0`.
    #[must_use]
    pub fn control_channel(&self) -> Arc<Channel> {
        Arc::clone(&self.control)
    }

    /// A live Channel by id.
    #[must_use]
    pub fn channel(&self, id: ChannelId) -> Option<Arc<Channel>> {
        self.channels.lock().get(&id).cloned()
    }

    /// Every live Channel, channel `0` included.
    #[must_use]
    pub fn channels(&self) -> Vec<Arc<Channel>> {
        self.channels.lock().values().cloned().collect()
    }

    /// A pending Channel by id.
    #[must_use]
    pub fn pending_channel(&self, id: ChannelId) -> Option<Arc<Channel>> {
        self.pending.lock().get(&id).cloned()
    }

    /// Number of Channels waiting for the peer to accept them.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Traffic counters.
    #[must_use]
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Zeroes the traffic counters.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Makes `factory` available to Channels created on this Connection,
    /// keyed by its protocol name.
    pub fn set_message_factory(&self, factory: Arc<MessageFactory>) {
        self.factories
            .lock()
            .insert(factory.protocol_name().to_string(), factory);
    }

    /// The negotiated factory for `protocol`.
    #[must_use]
    pub fn message_factory(&self, protocol: &str) -> Option<Arc<MessageFactory>> {
        self.factories.lock().get(protocol).cloned()
    }

    fn require_message_factory(&self, protocol: &str) -> Result<Arc<MessageFactory>, ExtendError> {
        self.message_factory(protocol)
            .ok_or_else(|| ProtocolError::UnknownProtocol(protocol.to_string()).into())
    }

    /// Returns `true` between open and close.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lifecycle.is_open()
    }

    /// Returns `true` once closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }

    fn closed_error(&self) -> ExtendError {
        ConnectionError::ConnectionClosed {
            connection_id: self.id,
        }
        .into()
    }

    fn assert_open(&self) -> Result<(), ExtendError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(self.closed_error())
        }
    }

    /// Wires the control protocol onto channel `0` and opens it, then opens
    /// the Connection.
    ///
    /// The manager is told about the new Connection only once its open
    /// handshake has completed, which is not this method's business.
    #[cfg_attr(
        feature = "observability",
        instrument(skip(self), fields(connection = %self.id, role = %self.role))
    )]
    pub fn open_internal(self: &Arc<Self>) -> Result<(), ExtendError> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        if self.is_open() {
            return Ok(());
        }
        let manager = self.manager().ok_or_else(|| self.closed_error())?;
        let protocol = manager.control_protocol();
        let factory = protocol.message_factory(protocol.current_version())?;
        self.set_message_factory(Arc::clone(&factory));

        self.control.set_message_factory(factory)?;
        self.control.set_serializer(manager.ensure_serializer())?;
        if let Some(receiver) = manager.control_receiver() {
            self.control.set_receiver(receiver)?;
        }
        self.control.open_internal()?;

        match self.lifecycle.open() {
            Transition::Rejected => Err(self.closed_error()),
            Transition::Changed | Transition::Unchanged => {
                debug!(connection = %self.id, role = %self.role, "connection opened");
                Ok(())
            }
        }
    }

    /// Closes the Connection and tells the peer.
    pub fn close(self: &Arc<Self>) -> Result<(), ExtendError> {
        self.close_with(true, None, false)
    }

    /// Closes the Connection because of `cause`.
    ///
    /// Runs inline on the service thread and is handed to the manager
    /// otherwise; with `wait` the hand-off returns only once the close ran.
    pub fn close_with(
        self: &Arc<Self>,
        notify: bool,
        cause: Option<ExtendError>,
        wait: bool,
    ) -> Result<(), ExtendError> {
        if !self.is_open() {
            return Ok(());
        }
        let manager = self.manager().ok_or_else(|| self.closed_error())?;
        if manager.is_service_thread(false) {
            self.close_internal(notify, cause, Wait::Immediate);
            Ok(())
        } else if self.is_active_thread() {
            Err(ExtendError::illegal_state(format!(
                "cannot close connection {} while executing within it",
                self.id
            )))
        } else {
            manager.close_connection(self, notify, cause, wait)
        }
    }

    /// Closes every Channel, then the Connection itself, on the service
    /// thread.
    ///
    /// Application Channels are closed first without notifying the peer;
    /// channel `0` closes last so that the peer can still be told about the
    /// Connection going away. Returns `true` if this call closed the
    /// Connection.
    #[cfg_attr(
        feature = "observability",
        instrument(skip(self, cause), fields(connection = %self.id))
    )]
    pub fn close_internal(self: &Arc<Self>, notify: bool, cause: Option<ExtendError>, wait: Wait) -> bool {
        if !self.is_open() {
            return false;
        }

        let closing: Vec<Arc<Channel>> = {
            let mut channels = self.channels.lock();
            let ids: Vec<ChannelId> = channels.keys().copied().filter(|id| !id.is_control()).collect();
            ids.into_iter().filter_map(|id| channels.remove(&id)).collect()
        };
        for channel in closing {
            channel.close_internal(false, cause.clone(), Wait::Immediate);
        }

        let intent = CloseIntent {
            notify,
            cause: cause.clone(),
        };
        if !self.gate.close_or_defer(wait, Some(intent)) {
            debug!(connection = %self.id, "connection busy, close deferred");
            return false;
        }

        let closed = self.is_open() && {
            if notify {
                self.notify_peer_closed(cause.as_ref());
            }
            self.control.close_internal(false, cause.clone(), Wait::Forever);
            self.pending.lock().clear();
            *self.peer_id.lock() = None;
            self.lifecycle.close() == Transition::Changed
        };
        self.gate.open();
        if !closed {
            return false;
        }

        if let Some(manager) = self.manager() {
            match &cause {
                Some(cause) => manager.on_connection_error(self, cause),
                None => manager.on_connection_closed(self),
            }
        }
        debug!(connection = %self.id, "connection closed");
        true
    }

    fn notify_peer_closed(&self, cause: Option<&ExtendError>) {
        let result = self
            .control
            .create::<NotifyConnectionClosed>(ControlMessageType::NotifyConnectionClosed.type_id())
            .and_then(|mut notice| {
                notice.cause = cause.map(RemoteError::from);
                self.control.send(notice)
            });
        if let Err(error) = result {
            debug!(connection = %self.id, %error, "could not notify peer of connection close");
        }
    }

    /// Enters the Connection's gate.
    pub(crate) fn gate_enter(&self) -> Result<(), ExtendError> {
        if self.gate.enter().is_err() {
            return Err(ConnectionError::ConnectionClosing {
                connection_id: self.id,
            }
            .into());
        }
        if !self.is_open() {
            self.gate_exit();
            return Err(self.closed_error());
        }
        Ok(())
    }

    /// Leaves the Connection's gate and performs a deferred close once the
    /// last thread has left.
    pub(crate) fn gate_exit(&self) {
        let Some(intent) = self.gate.exit() else {
            return;
        };
        let Some(this) = self.control.connection() else {
            return;
        };
        if let Err(error) = this.close_with(intent.notify, intent.cause, false) {
            warn!(connection = %self.id, %error, "deferred connection close failed");
        }
    }

    /// Flags the Connection to be closed by the last thread leaving it.
    pub(crate) fn request_close_on_exit(&self, intent: CloseIntent) {
        self.gate.request_close_on_exit(intent);
    }

    /// Returns `true` if the calling thread is executing inside this
    /// Connection.
    #[must_use]
    pub fn is_active_thread(&self) -> bool {
        self.gate.is_entered_by_current_thread()
    }

    /// Adds a live Channel.
    ///
    /// # Errors
    ///
    /// Fails with [`ProtocolError::DuplicateChannel`] if the id is taken.
    pub fn register_channel(&self, channel: Arc<Channel>) -> Result<(), ExtendError> {
        let mut channels = self.channels.lock();
        if channels.contains_key(&channel.id()) {
            return Err(ProtocolError::DuplicateChannel(channel.id()).into());
        }
        channels.insert(channel.id(), channel);
        Ok(())
    }

    /// Removes a Channel from the live table. Channel `0` stays.
    pub fn unregister_channel(&self, channel: &Channel) {
        if channel.id().is_control() {
            return;
        }
        let mut channels = self.channels.lock();
        if channels
            .get(&channel.id())
            .is_some_and(|registered| std::ptr::eq(Arc::as_ptr(registered), channel))
        {
            channels.remove(&channel.id());
        }
    }

    /// Draws an unused channel id from this Connection's half of the id
    /// space.
    pub fn generate_channel_id(&self) -> ChannelId {
        let sign = self.role.channel_id_sign();
        loop {
            let id = ChannelId::new(rand::random_range(1..i32::MAX) * sign);
            let channels = self.channels.lock();
            let pending = self.pending.lock();
            if !channels.contains_key(&id) && !pending.contains_key(&id) {
                return id;
            }
            trace!(connection = %self.id, channel = %id, "channel id collision, drawing again");
        }
    }

    /// Creates a pending Channel speaking `protocol` and returns the URI the
    /// peer needs to accept it.
    #[cfg_attr(
        feature = "observability",
        instrument(skip(self, protocol, serializer, receiver), fields(connection = %self.id, protocol = protocol.name()))
    )]
    pub fn create_channel_internal(
        self: &Arc<Self>,
        protocol: &Protocol,
        serializer: SerializerFormat,
        receiver: Option<Arc<dyn Receiver>>,
    ) -> Result<ChannelUri, ExtendError> {
        self.assert_open()?;
        let factory = self.require_message_factory(protocol.name())?;
        let id = self.generate_channel_id();
        let channel = Channel::new(id, Arc::downgrade(self), self.id);
        channel.set_message_factory(factory)?;
        channel.set_serializer(serializer)?;
        if let Some(receiver) = receiver {
            channel.set_receiver(receiver)?;
        }

        let count = self.insert_pending(channel)?;
        if count > MAX_PENDING_CHANNELS {
            warn!(
                connection = %self.id,
                count,
                "pending channel table is growing; the peer may not be accepting channels"
            );
        }
        Ok(ChannelUri::new(id, protocol.name()))
    }

    /// Adds `channel` to the pending table and returns the table size.
    /// An id that is already pending is never replaced.
    fn insert_pending(&self, channel: Arc<Channel>) -> Result<usize, ExtendError> {
        let id = channel.id();
        let mut pending = self.pending.lock();
        match pending.entry(id) {
            Entry::Occupied(_) => Err(ProtocolError::DuplicateChannel(id).into()),
            Entry::Vacant(slot) => {
                slot.insert(channel);
                Ok(pending.len())
            }
        }
    }

    /// Promotes the pending Channel `id` after the peer accepted it.
    ///
    /// # Errors
    ///
    /// Channel `0`, ids already live and ids with no pending Channel are
    /// rejected, as is a protocol other than the one the Channel was created
    /// with.
    pub fn accept_channel_request(
        self: &Arc<Self>,
        id: ChannelId,
        protocol: &str,
        subject: Option<Subject>,
        adapter: Option<Arc<dyn AccessAdapter>>,
    ) -> Result<Arc<Channel>, ExtendError> {
        self.assert_open()?;
        if id.is_control() {
            return Err(ProtocolError::ReservedChannel.into());
        }
        if self.channels.lock().contains_key(&id) {
            return Err(ProtocolError::DuplicateChannel(id).into());
        }
        let channel = self.pending_channel(id).ok_or(ProtocolError::NoSuchChannel(id))?;
        if let Some(factory) = channel.message_factory()
            && factory.protocol_name() != protocol
        {
            return Err(ProtocolError::ProtocolMismatch {
                expected: factory.protocol_name().to_string(),
                actual: protocol.to_string(),
            }
            .into());
        }
        // A concurrent accept of the same id may have won the race.
        let channel = self
            .pending
            .lock()
            .remove(&id)
            .ok_or(ProtocolError::NoSuchChannel(id))?;
        if let Some(subject) = subject {
            channel.set_subject(subject)?;
        }
        if let Some(adapter) = adapter {
            channel.set_access_adapter(adapter)?;
        }
        self.register_channel(Arc::clone(&channel))?;
        if let Err(error) = channel.open_internal() {
            self.unregister_channel(&channel);
            return Err(error);
        }
        Ok(channel)
    }

    /// Opens this side of a Channel the peer created and this side accepted.
    pub fn accept_channel_response(
        self: &Arc<Self>,
        id: ChannelId,
        factory: Arc<MessageFactory>,
        serializer: SerializerFormat,
        receiver: Option<Arc<dyn Receiver>>,
        subject: Option<Subject>,
    ) -> Result<Arc<Channel>, ExtendError> {
        self.open_live_channel(id, factory, serializer, receiver, subject, None)
    }

    /// Opens this side of a Channel the peer opened at this side's request.
    pub fn open_channel_response(
        self: &Arc<Self>,
        id: ChannelId,
        factory: Arc<MessageFactory>,
        serializer: SerializerFormat,
        receiver: Option<Arc<dyn Receiver>>,
        subject: Option<Subject>,
    ) -> Result<Arc<Channel>, ExtendError> {
        self.open_live_channel(id, factory, serializer, receiver, subject, None)
    }

    /// Opens a Channel the peer asked for, attached to a local receiver, and
    /// returns the id allocated for it.
    pub fn open_channel_request(
        self: &Arc<Self>,
        protocol: &str,
        serializer: SerializerFormat,
        receiver: Option<Arc<dyn Receiver>>,
        subject: Option<Subject>,
        adapter: Option<Arc<dyn AccessAdapter>>,
    ) -> Result<ChannelId, ExtendError> {
        self.assert_open()?;
        let factory = self.require_message_factory(protocol)?;
        let id = self.generate_channel_id();
        self.open_live_channel(id, factory, serializer, receiver, subject, adapter)
            .map(|channel| channel.id())
    }

    fn open_live_channel(
        self: &Arc<Self>,
        id: ChannelId,
        factory: Arc<MessageFactory>,
        serializer: SerializerFormat,
        receiver: Option<Arc<dyn Receiver>>,
        subject: Option<Subject>,
        adapter: Option<Arc<dyn AccessAdapter>>,
    ) -> Result<Arc<Channel>, ExtendError> {
        self.assert_open()?;
        if id.is_control() {
            return Err(ProtocolError::ReservedChannel.into());
        }
        let channel = Channel::new(id, Arc::downgrade(self), self.id);
        channel.set_message_factory(factory)?;
        channel.set_serializer(serializer)?;
        if let Some(receiver) = receiver {
            channel.set_receiver(receiver)?;
        }
        if let Some(subject) = subject {
            channel.set_subject(subject)?;
        }
        if let Some(adapter) = adapter {
            channel.set_access_adapter(adapter)?;
        }
        self.register_channel(Arc::clone(&channel))?;
        if let Err(error) = channel.open_internal() {
            self.unregister_channel(&channel);
            return Err(error);
        }
        Ok(channel)
    }

    /// Asks the peer to open a Channel speaking `protocol` to its receiver
    /// named `receiver_name`.
    ///
    /// The returned Status resolves once this side's end of the Channel is
    /// open; its Response carries the channel id.
    pub fn open_channel_internal(
        self: &Arc<Self>,
        protocol: &Protocol,
        receiver_name: &str,
        serializer: SerializerFormat,
        receiver: Option<Arc<dyn Receiver>>,
        subject: Option<Subject>,
    ) -> Result<Arc<Status>, ExtendError> {
        self.assert_open()?;
        let factory = self.require_message_factory(protocol.name())?;
        let mut request = self
            .control
            .create::<OpenChannelRequest>(ControlMessageType::OpenChannelRequest.type_id())?;
        request.protocol = protocol.name().to_string();
        request.receiver_name = receiver_name.to_string();
        request.subject = subject.clone();

        let continuation: Continuation = Box::new(
            move |control: &Arc<Channel>, response: &Response| -> Result<(), ExtendError> {
                if response.is_failure() {
                    return Ok(());
                }
                let id: i32 = response
                    .value(control.require_serializer()?)?
                    .ok_or(ProtocolError::MissingField("channel id"))?;
                let connection = control
                    .connection()
                    .ok_or_else(|| ExtendError::illegal_state("connection dropped during channel open"))?;
                connection.open_channel_response(ChannelId::new(id), factory, serializer, receiver, subject)?;
                Ok(())
            },
        );
        self.control.send_request_with(request, Some(continuation))
    }

    /// Accepts a Channel the peer advertised with `uri`.
    ///
    /// The returned Status resolves once this side's end of the Channel is
    /// open.
    pub fn accept_channel_internal(
        self: &Arc<Self>,
        uri: &ChannelUri,
        serializer: SerializerFormat,
        receiver: Option<Arc<dyn Receiver>>,
        subject: Option<Subject>,
    ) -> Result<Arc<Status>, ExtendError> {
        self.assert_open()?;
        if uri.id().is_control() {
            return Err(ProtocolError::ReservedChannel.into());
        }
        let factory = self.require_message_factory(uri.protocol())?;
        let mut request = self
            .control
            .create::<AcceptChannelRequest>(ControlMessageType::AcceptChannelRequest.type_id())?;
        request.channel_id = uri.id().as_i32();
        request.protocol = uri.protocol().to_string();
        request.subject = subject.clone();

        let id = uri.id();
        let continuation: Continuation = Box::new(
            move |control: &Arc<Channel>, response: &Response| -> Result<(), ExtendError> {
                if response.is_failure() {
                    return Ok(());
                }
                let connection = control
                    .connection()
                    .ok_or_else(|| ExtendError::illegal_state("connection dropped during channel accept"))?;
                connection.accept_channel_response(id, factory, serializer, receiver, subject)?;
                Ok(())
            },
        );
        self.control.send_request_with(request, Some(continuation))
    }

    /// Sends a ping unless one is outstanding. Returns `true` if a ping was
    /// sent.
    pub fn ping(self: &Arc<Self>) -> Result<bool, ExtendError> {
        let now = now_millis();
        if self
            .ping_sent_at
            .compare_exchange(0, now, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(false);
        }
        let sent = self
            .control
            .create::<PingRequest>(ControlMessageType::PingRequest.type_id())
            .and_then(|request| {
                let continuation: Continuation = Box::new(
                    |control: &Arc<Channel>, _response: &Response| -> Result<(), ExtendError> {
                        if let Some(connection) = control.connection() {
                            connection.ping_sent_at.store(0, Ordering::Release);
                        }
                        Ok(())
                    },
                );
                self.control.send_request_with(request, Some(continuation))
            });
        match sent {
            Ok(_) => Ok(true),
            Err(error) => {
                self.ping_sent_at.store(0, Ordering::Release);
                Err(error)
            }
        }
    }

    /// When the outstanding ping was sent, if one is outstanding.
    #[must_use]
    pub fn ping_outstanding_since(&self) -> Option<SystemTime> {
        match self.ping_sent_at.load(Ordering::Acquire) {
            0 => None,
            millis => Some(UNIX_EPOCH + Duration::from_millis(millis)),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("peer_id", &self.peer_id())
            .field("state", &self.lifecycle.describe())
            .field("channels", &self.channels.lock().len())
            .field("pending", &self.pending_count())
            .finish()
    }
}
