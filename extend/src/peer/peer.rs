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

//! The [`Peer`] connection manager.

use crate::channel::{Channel, ChannelId, Receiver, Status, Subject};
use crate::codec::Codec;
use crate::connection::{ChannelUri, Connection, ConnectionError, ConnectionManager, Role};
use crate::error::ExtendError;
use crate::gate::Wait;
use crate::peer::PeerConfig;
use crate::peer::service::ServiceThread;
use crate::peer::transport::{Frame, Link, Transport};
use crate::protocol::control::{self, ControlMessageType, OpenConnectionRequest, ProtocolRange};
use crate::protocol::{Message, Protocol, ProtocolError};
use crate::serialization::{Serializer, SerializerFormat};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
#[cfg(feature = "observability")]
use tracing::instrument;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

struct PeerLink {
    connection: Arc<Connection>,
    transport: Arc<dyn Transport>,
}

/// Owns the Connections of one process-side of a link and runs their
/// service thread.
///
/// A Peer is either the acceptor or the initiator of the Connections it
/// owns; the role decides the half of the channel id space its Connections
/// allocate from. Inbound frames are decoded and dispatched on the service
/// thread, one at a time and in arrival order.
///
/// # Examples
///
/// ```rust,no_run
/// use extend::peer::{MemoryTransport, Peer, PeerConfig};
///
/// # fn example() -> Result<(), extend::ExtendError> {
/// let server = Peer::acceptor(PeerConfig::new("server"))?;
/// let client = Peer::initiator(PeerConfig::new("client"))?;
///
/// let (client_link, server_link) = MemoryTransport::pair();
/// server.accept(server_link)?;
/// let connection = client.connect(client_link)?;
/// assert!(connection.is_open());
///
/// client.shutdown();
/// server.shutdown();
/// # Ok(())
/// # }
/// ```
pub struct Peer {
    id: Uuid,
    role: Role,
    config: PeerConfig,
    control: Arc<Protocol>,
    protocols: RwLock<BTreeMap<String, Arc<Protocol>>>,
    receivers: RwLock<HashMap<String, Arc<dyn Receiver>>>,
    connections: Mutex<HashMap<Uuid, PeerLink>>,
    service: Mutex<Option<Arc<ServiceThread>>>,
    codec: Codec,
    this: Weak<Peer>,
}

impl Peer {
    /// Creates a Peer with the given role and starts its service thread.
    pub fn new(role: Role, config: PeerConfig) -> Result<Arc<Self>, ExtendError> {
        let control = Arc::new(control::control_protocol()?);
        let service = ServiceThread::start(&config.service_name)?;
        let peer = Arc::new_cyclic(|this| Self {
            id: Uuid::new_v4(),
            role,
            config,
            control,
            protocols: RwLock::new(BTreeMap::new()),
            receivers: RwLock::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
            service: Mutex::new(Some(service)),
            codec: Codec::new(),
            this: this.clone(),
        });
        info!(peer = %peer.id, role = %role, service = %peer.config.service_name, "peer started");
        Ok(peer)
    }

    /// Creates a Peer that accepts Connections.
    pub fn acceptor(config: PeerConfig) -> Result<Arc<Self>, ExtendError> {
        Self::new(Role::Acceptor, config)
    }

    /// Creates a Peer that initiates Connections.
    pub fn initiator(config: PeerConfig) -> Result<Arc<Self>, ExtendError> {
        Self::new(Role::Initiator, config)
    }

    /// Process-unique id of this Peer.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The configuration this Peer was created with.
    #[must_use]
    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    pub(super) fn arc(&self) -> Result<Arc<Self>, ExtendError> {
        self.this
            .upgrade()
            .ok_or_else(|| ExtendError::illegal_state("peer is being dropped"))
    }

    // ------------------------------------------------------------------
    // Registries
    // ------------------------------------------------------------------

    /// Makes `protocol` available for negotiation on future Connections.
    ///
    /// A protocol registered under a name that is already known replaces
    /// the previous one.
    ///
    /// # Errors
    ///
    /// The control protocol's name is reserved.
    pub fn register_protocol(&self, protocol: Protocol) -> Result<Arc<Protocol>, ExtendError> {
        self.add_protocol(Arc::new(protocol))
    }

    fn add_protocol(&self, protocol: Arc<Protocol>) -> Result<Arc<Protocol>, ExtendError> {
        if protocol.name() == self.control.name() {
            return Err(ExtendError::illegal_argument(format!(
                "protocol name {:?} is reserved",
                protocol.name()
            )));
        }
        debug!(
            peer = %self.id,
            protocol = protocol.name(),
            current = protocol.current_version(),
            supported = protocol.supported_version(),
            "registered protocol"
        );
        self.protocols
            .write()
            .insert(protocol.name().to_string(), Arc::clone(&protocol));
        Ok(protocol)
    }

    /// A registered protocol by name.
    #[must_use]
    pub fn protocol(&self, name: &str) -> Option<Arc<Protocol>> {
        self.protocols.read().get(name).cloned()
    }

    fn require_protocol(&self, name: &str) -> Result<Arc<Protocol>, ExtendError> {
        self.protocol(name)
            .ok_or_else(|| ProtocolError::UnknownProtocol(name.to_string()).into())
    }

    /// Registers a receiver peers can open Channels to, together with its
    /// protocol if that is not registered yet.
    ///
    /// # Errors
    ///
    /// Fails if a receiver with the same name is registered.
    pub fn register_receiver(&self, receiver: Arc<dyn Receiver>) -> Result<(), ExtendError> {
        let name = receiver.name().to_string();
        let mut receivers = self.receivers.write();
        if receivers.contains_key(&name) {
            return Err(ExtendError::illegal_argument(format!(
                "receiver {name:?} is already registered"
            )));
        }
        let protocol = receiver.protocol();
        if self.protocol(protocol.name()).is_none() {
            self.add_protocol(protocol)?;
        }
        debug!(peer = %self.id, receiver = %name, "registered receiver");
        receivers.insert(name, receiver);
        Ok(())
    }

    /// A registered receiver by name.
    #[must_use]
    pub fn receiver(&self, name: &str) -> Option<Arc<dyn Receiver>> {
        self.receivers.read().get(name).cloned()
    }

    pub(crate) fn protocol_ranges(&self) -> Vec<ProtocolRange> {
        self.protocols
            .read()
            .values()
            .map(|protocol| ProtocolRange {
                name: protocol.name().to_string(),
                current: protocol.current_version(),
                supported: protocol.supported_version(),
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Service thread
    // ------------------------------------------------------------------

    fn running_service(&self) -> Option<Arc<ServiceThread>> {
        self.service
            .lock()
            .as_ref()
            .filter(|service| service.is_running())
            .cloned()
    }

    fn require_service(&self) -> Result<Arc<ServiceThread>, ExtendError> {
        self.running_service().ok_or_else(|| {
            ExtendError::illegal_state(format!("peer {} is shut down", self.config.service_name))
        })
    }

    /// Returns `true` until [`shutdown`](Self::shutdown).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running_service().is_some()
    }

    /// Runs `task` on the service thread and waits for its result. Runs
    /// inline when already on the service thread.
    ///
    /// # Errors
    ///
    /// Fails if the Peer is shut down.
    pub fn invoke<R>(&self, task: impl FnOnce() -> R + Send + 'static) -> Result<R, ExtendError>
    where
        R: Send + 'static,
    {
        self.require_service()?.invoke(task)
    }

    fn submit(&self, task: impl FnOnce() + Send + 'static) -> Result<(), ExtendError> {
        self.require_service()?.submit(task)
    }

    fn assert_not_service_thread(&self, operation: &str) -> Result<(), ExtendError> {
        if self.is_service_thread(true) {
            return Err(ExtendError::illegal_state(format!(
                "{operation} would block the service thread"
            )));
        }
        Ok(())
    }

    /// Closes every Connection, notifying the peers, and stops the service
    /// thread. Calling it again does nothing.
    #[cfg_attr(
        feature = "observability",
        instrument(skip(self), fields(peer = %self.id))
    )]
    pub fn shutdown(&self) {
        let Some(service) = self.running_service() else {
            return;
        };
        let connections = self.connections();
        let closed = service.invoke(move || {
            for connection in connections {
                connection.close_internal(true, None, Wait::Immediate);
            }
        });
        if let Err(error) = closed {
            warn!(peer = %self.id, %error, "could not close connections during shutdown");
        }
        service.stop();
        self.service.lock().take();
        info!(peer = %self.id, service = %self.config.service_name, "peer stopped");
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Every Connection this Peer owns.
    #[must_use]
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.connections
            .lock()
            .values()
            .map(|link| Arc::clone(&link.connection))
            .collect()
    }

    /// A Connection by id.
    #[must_use]
    pub fn connection(&self, id: Uuid) -> Option<Arc<Connection>> {
        self.connections
            .lock()
            .get(&id)
            .map(|link| Arc::clone(&link.connection))
    }

    fn transport(&self, connection_id: Uuid) -> Option<Arc<dyn Transport>> {
        self.connections
            .lock()
            .get(&connection_id)
            .map(|link| Arc::clone(&link.transport))
    }

    fn assert_role(&self, role: Role, operation: &str) -> Result<(), ExtendError> {
        if self.role != role {
            return Err(ExtendError::illegal_state(format!(
                "{operation} requires the {role} role but this peer is the {}",
                self.role
            )));
        }
        Ok(())
    }

    /// Takes over the accepting side of `link` and opens a Connection on it.
    ///
    /// The Connection learns the peer's id and negotiates application
    /// protocols once the peer's open request arrives.
    pub fn accept(&self, link: Link) -> Result<Arc<Connection>, ExtendError> {
        self.assert_role(Role::Acceptor, "accept")?;
        self.attach(link)
    }

    /// Opens a Connection over the initiating side of `link` and performs
    /// the open handshake, waiting up to the connect timeout for the peer.
    #[cfg_attr(
        feature = "observability",
        instrument(skip(self, link), fields(peer = %self.id))
    )]
    pub fn connect(&self, link: Link) -> Result<Arc<Connection>, ExtendError> {
        self.assert_role(Role::Initiator, "connect")?;
        self.assert_not_service_thread("connect")?;
        let connection = self.attach(link)?;
        let handshake = self.send_open_connection(&connection).and_then(|status| {
            status
                .wait_for_response(Some(self.config.connect_timeout))
                .map(|_| ())
        });
        if let Err(error) = handshake {
            warn!(connection = %connection.id(), %error, "connection handshake failed");
            if let Err(close) = connection.close_with(false, Some(error.clone()), true) {
                debug!(connection = %connection.id(), error = %close, "close after failed handshake failed");
            }
            return Err(error);
        }
        info!(
            connection = %connection.id(),
            peer_connection = ?connection.peer_id(),
            member = ?connection.member(),
            "connection established"
        );
        Ok(connection)
    }

    fn send_open_connection(
        &self,
        connection: &Arc<Connection>,
    ) -> Result<Arc<Status>, ExtendError> {
        let control = connection.control_channel();
        let mut request = control
            .create::<OpenConnectionRequest>(ControlMessageType::OpenConnectionRequest.type_id())?;
        request.client_id = Some(connection.id());
        request.member = self.config.service_name.clone();
        request.serializer = self.config.serializer.name().to_string();
        request.protocols = self.protocol_ranges();
        let continuation = self.open_connection_continuation()?;
        control.send_request_with(request, Some(continuation))
    }

    fn attach(&self, link: Link) -> Result<Arc<Connection>, ExtendError> {
        let manager: Arc<dyn ConnectionManager> = self.arc()?;
        let connection = Connection::new(&manager);
        let Link { transport, inbound } = link;
        self.connections.lock().insert(
            connection.id(),
            PeerLink {
                connection: Arc::clone(&connection),
                transport: Arc::clone(&transport),
            },
        );

        let opening = Arc::clone(&connection);
        let opened = self
            .invoke(move || opening.open_internal())
            .and_then(|opened| opened)
            .and_then(|()| self.spawn_pump(connection.id(), inbound));
        if let Err(error) = opened {
            self.connections.lock().remove(&connection.id());
            transport.close();
            return Err(error);
        }
        debug!(peer = %self.id, connection = %connection.id(), role = %self.role, "connection attached");
        Ok(connection)
    }

    fn spawn_pump(
        &self,
        connection_id: Uuid,
        mut inbound: mpsc::UnboundedReceiver<Frame>,
    ) -> Result<(), ExtendError> {
        let peer = Weak::clone(&self.this);
        thread::Builder::new()
            .name(format!("{}-inbound", self.config.service_name))
            .spawn(move || {
                while let Some(frame) = inbound.blocking_recv() {
                    let Some(target) = peer.upgrade() else {
                        return;
                    };
                    let service = Arc::clone(&target);
                    if service.submit(move || target.on_frame(connection_id, frame)).is_err() {
                        return;
                    }
                }
                if let Some(target) = peer.upgrade() {
                    let service = Arc::clone(&target);
                    let _ = service.submit(move || target.on_link_closed(connection_id));
                }
            })
            .map(|_| ())
            .map_err(|e| ExtendError::illegal_state(format!("cannot spawn inbound thread: {e}")))
    }

    fn on_link_closed(&self, connection_id: Uuid) {
        let Some(connection) = self.connection(connection_id) else {
            return;
        };
        debug!(connection = %connection_id, "inbound stream ended");
        let cause = ConnectionError::Transport {
            connection_id,
            message: "link closed by peer".to_string(),
        };
        connection.close_internal(false, Some(cause.into()), Wait::Immediate);
    }

    /// Decodes one inbound frame and hands it to its Channel. Runs on the
    /// service thread.
    fn on_frame(&self, connection_id: Uuid, frame: Frame) {
        let Some(connection) = self.connection(connection_id) else {
            trace!(connection = %connection_id, "dropping frame for unknown connection");
            return;
        };
        connection.stats().record_received(frame.bytes.len());
        let Some(channel) = connection.channel(frame.channel_id) else {
            trace!(
                connection = %connection_id,
                channel = %frame.channel_id,
                "dropping frame for unknown channel"
            );
            return;
        };
        match self.codec.decode(&channel, &frame.bytes) {
            Ok(message) => channel.receive(message),
            Err(error) => {
                warn!(
                    connection = %connection_id,
                    channel = %frame.channel_id,
                    %error,
                    "undecodable frame"
                );
                let closed = if frame.channel_id.is_control() {
                    connection.close_with(true, Some(error), false)
                } else {
                    channel.close_with(true, Some(error))
                };
                if let Err(error) = closed {
                    debug!(connection = %connection_id, %error, "close after undecodable frame failed");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    /// Asks the peer to open a Channel speaking `protocol` to its receiver
    /// named `receiver_name`, and waits for this side's end to open.
    pub fn open_channel(
        &self,
        connection: &Arc<Connection>,
        protocol: &str,
        receiver_name: &str,
        receiver: Option<Arc<dyn Receiver>>,
        subject: Option<Subject>,
    ) -> Result<Arc<Channel>, ExtendError> {
        self.assert_not_service_thread("open_channel")?;
        let protocol = self.require_protocol(protocol)?;
        let status = connection.open_channel_internal(
            &protocol,
            receiver_name,
            self.config.serializer.clone(),
            receiver,
            subject,
        )?;
        let response = status.wait_for_response(Some(self.config.connect_timeout))?;
        let control = connection.control_channel();
        let id: i32 = response
            .value(control.require_serializer()?)?
            .ok_or(ProtocolError::MissingField("channel id"))?;
        let id = ChannelId::new(id);
        connection
            .channel(id)
            .ok_or_else(|| ProtocolError::NoSuchChannel(id).into())
    }

    /// Creates a pending Channel the peer can accept with the returned URI.
    pub fn create_channel(
        &self,
        connection: &Arc<Connection>,
        protocol: &str,
        receiver: Option<Arc<dyn Receiver>>,
    ) -> Result<ChannelUri, ExtendError> {
        let protocol = self.require_protocol(protocol)?;
        connection.create_channel_internal(&protocol, self.config.serializer.clone(), receiver)
    }

    /// Accepts a Channel the peer advertised with `uri` and waits for this
    /// side's end to open.
    pub fn accept_channel(
        &self,
        connection: &Arc<Connection>,
        uri: &ChannelUri,
        receiver: Option<Arc<dyn Receiver>>,
        subject: Option<Subject>,
    ) -> Result<Arc<Channel>, ExtendError> {
        self.assert_not_service_thread("accept_channel")?;
        let status = connection.accept_channel_internal(
            uri,
            self.config.serializer.clone(),
            receiver,
            subject,
        )?;
        status.wait_for_response(Some(self.config.connect_timeout))?;
        connection
            .channel(uri.id())
            .ok_or_else(|| ProtocolError::NoSuchChannel(uri.id()).into())
    }

    // ------------------------------------------------------------------
    // Liveness
    // ------------------------------------------------------------------

    /// Pings the peer of `connection` unless a ping is outstanding. Returns
    /// `true` if a ping was sent.
    pub fn ping(&self, connection: &Arc<Connection>) -> Result<bool, ExtendError> {
        connection.ping()
    }

    /// Closes every Connection whose outstanding ping is older than the ping
    /// timeout and returns how many were closed.
    pub fn check_ping_timeouts(&self) -> usize {
        let mut closed = 0;
        for connection in self.connections() {
            let Some(sent) = connection.ping_outstanding_since() else {
                continue;
            };
            let expired = sent
                .elapsed()
                .is_ok_and(|elapsed| elapsed >= self.config.ping_timeout);
            if !expired {
                continue;
            }
            warn!(
                connection = %connection.id(),
                timeout = ?self.config.ping_timeout,
                "ping timed out, closing connection"
            );
            let cause = ConnectionError::Transport {
                connection_id: connection.id(),
                message: "ping timed out".to_string(),
            };
            match connection.close_with(true, Some(cause.into()), true) {
                Ok(()) => closed += 1,
                Err(error) => {
                    debug!(connection = %connection.id(), %error, "close after ping timeout failed");
                }
            }
        }
        closed
    }
}

impl ConnectionManager for Peer {
    fn role(&self) -> Role {
        self.role
    }

    fn service_name(&self) -> &str {
        &self.config.service_name
    }

    fn control_protocol(&self) -> Arc<Protocol> {
        Arc::clone(&self.control)
    }

    fn control_receiver(&self) -> Option<Arc<dyn Receiver>> {
        self.this.upgrade().map(|peer| peer as Arc<dyn Receiver>)
    }

    fn ensure_serializer(&self) -> SerializerFormat {
        self.config.serializer.clone()
    }

    fn request_timeout(&self) -> Option<Duration> {
        self.config.request_timeout
    }

    fn is_service_thread(&self, strict: bool) -> bool {
        match self.running_service() {
            Some(service) => service.is_current(),
            None => !strict,
        }
    }

    fn wait_accepting_clients(&self) -> Result<(), ExtendError> {
        self.require_service().map(|_| ())
    }

    fn post(&self, channel: &Arc<Channel>, message: Box<dyn Message>) -> Result<(), ExtendError> {
        let connection_id = channel.connection_id();
        let closed = || ConnectionError::ConnectionClosed { connection_id };
        let transport = self.transport(connection_id).ok_or_else(closed)?;
        let bytes = self.codec.encode(channel, message.as_ref())?;
        let size = bytes.len();
        transport
            .send(Frame::new(channel.id(), bytes))
            .map_err(|error| ConnectionError::Transport {
                connection_id,
                message: error.to_string(),
            })?;
        if let Some(connection) = channel.connection() {
            connection.stats().record_sent(size);
        }
        trace!(
            connection = %connection_id,
            channel = %channel.id(),
            type_id = message.message_type(),
            bytes = size,
            "posted message"
        );
        Ok(())
    }

    fn close_channel(
        &self,
        channel: &Arc<Channel>,
        notify: bool,
        cause: Option<ExtendError>,
        wait: bool,
    ) -> Result<(), ExtendError> {
        let channel = Arc::clone(channel);
        let task = move || {
            channel.close_internal(notify, cause, Wait::Immediate);
        };
        match self.running_service() {
            Some(service) if wait => service.invoke(task),
            Some(service) => service.submit(task),
            None => {
                task();
                Ok(())
            }
        }
    }

    fn close_connection(
        &self,
        connection: &Arc<Connection>,
        notify: bool,
        cause: Option<ExtendError>,
        wait: bool,
    ) -> Result<(), ExtendError> {
        let connection = Arc::clone(connection);
        let task = move || {
            connection.close_internal(notify, cause, Wait::Immediate);
        };
        match self.running_service() {
            Some(service) if wait => service.invoke(task),
            Some(service) => service.submit(task),
            None => {
                task();
                Ok(())
            }
        }
    }

    fn on_channel_opened(&self, channel: &Arc<Channel>) {
        debug!(connection = %channel.connection_id(), channel = %channel.id(), "channel opened");
    }

    fn on_channel_closed(&self, channel: &Arc<Channel>) {
        debug!(connection = %channel.connection_id(), channel = %channel.id(), "channel closed");
    }

    fn on_connection_closed(&self, connection: &Arc<Connection>) {
        info!(connection = %connection.id(), "connection closed");
        self.detach(connection);
    }

    fn on_connection_error(&self, connection: &Arc<Connection>, cause: &ExtendError) {
        warn!(connection = %connection.id(), error = %cause, "connection closed on error");
        self.detach(connection);
    }
}

impl Peer {
    fn detach(&self, connection: &Connection) {
        if let Some(link) = self.connections.lock().remove(&connection.id()) {
            link.transport.close();
        }
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        if let Some(service) = self.service.get_mut().take() {
            service.stop();
        }
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("config", &self.config)
            .field("protocols", &self.protocols.read().keys().collect::<Vec<_>>())
            .field("connections", &self.connections.lock().len())
            .field("running", &self.is_running())
            .finish()
    }
}
