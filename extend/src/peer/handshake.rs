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

//! Channel-0 requests answered from a Peer's registries.

use crate::channel::{Channel, ChannelId, Continuation, Receiver};
use crate::connection::{Connection, ConnectionManager, Role};
use crate::error::ExtendError;
use crate::peer::Peer;
use crate::protocol::control::{
    self, AcceptChannelRequest, ControlMessageType, OpenChannelRequest, OpenConnectionRequest,
    OpenConnectionResult,
};
use crate::protocol::{Message, Protocol, ProtocolError, Request, Response};
use crate::serialization::Serializer;
use serde::Serialize;
use std::any::type_name;
use std::collections::BTreeMap;
use std::sync::Arc;
#[cfg(feature = "observability")]
use tracing::instrument;
use tracing::{debug, warn};

fn downcast<T: Message>(message: &mut dyn Message) -> Result<&mut T, ExtendError> {
    let type_id = message.message_type();
    message.downcast_mut::<T>().ok_or_else(|| {
        ProtocolError::WrongMessageKind {
            type_id,
            expected: type_name::<T>(),
        }
        .into()
    })
}

fn require_connection(channel: &Channel) -> Result<Arc<Connection>, ExtendError> {
    channel
        .connection()
        .ok_or_else(|| ExtendError::illegal_state(format!("{} has no connection", channel.id())))
}

/// Stores `value` as the successful result of `request`.
fn reply_value<T: Serialize>(
    channel: &Channel,
    request: &mut dyn Request,
    value: &T,
) -> Result<(), ExtendError> {
    let factory = channel.message_factory().ok_or_else(|| {
        ExtendError::illegal_state(format!("{} has no message factory", channel.id()))
    })?;
    let serializer = channel.require_serializer()?;
    request
        .request_header_mut()
        .ensure_response(&factory)?
        .set_value(serializer, value)
}

impl Peer {
    /// Continuation of the initiator's `OpenConnectionRequest`: adopts the
    /// versions the acceptor agreed on.
    pub(super) fn open_connection_continuation(&self) -> Result<Continuation, ExtendError> {
        let peer = Arc::downgrade(&self.arc()?);
        Ok(Box::new(
            move |control: &Arc<Channel>, response: &Response| -> Result<(), ExtendError> {
                if response.is_failure() {
                    return Ok(());
                }
                let result: OpenConnectionResult = response
                    .value(control.require_serializer()?)?
                    .ok_or(ProtocolError::MissingField("open connection result"))?;
                let peer = peer
                    .upgrade()
                    .ok_or_else(|| ExtendError::illegal_state("peer dropped during connection open"))?;
                let connection = require_connection(control)?;
                peer.apply_open_connection_result(&connection, &result)
            },
        ))
    }

    fn apply_open_connection_result(
        &self,
        connection: &Connection,
        result: &OpenConnectionResult,
    ) -> Result<(), ExtendError> {
        for (name, version) in &result.protocols {
            let Some(protocol) = self.protocol(name) else {
                warn!(
                    connection = %connection.id(),
                    protocol = %name,
                    "peer agreed on a protocol this side never offered"
                );
                continue;
            };
            connection.set_message_factory(protocol.message_factory(*version)?);
        }
        connection.set_peer_id(result.connection_id);
        connection.set_member(result.member.clone());
        debug!(
            connection = %connection.id(),
            peer_connection = %result.connection_id,
            protocols = ?result.protocols,
            "applied connection handshake"
        );
        Ok(())
    }

    /// Negotiates every protocol both sides know and replies with this
    /// side's Connection id and the agreed versions.
    #[cfg_attr(
        feature = "observability",
        instrument(skip(self, channel, request), fields(connection = %channel.connection_id(), member = %request.member))
    )]
    fn on_open_connection(
        &self,
        channel: &Arc<Channel>,
        request: &mut OpenConnectionRequest,
    ) -> Result<(), ExtendError> {
        if self.role() != Role::Acceptor {
            return Err(ExtendError::illegal_state(
                "only the accepting side answers an open connection request",
            ));
        }
        let local = self.config().serializer.name();
        if request.serializer != local {
            return Err(ProtocolError::SerializerMismatch {
                local: local.to_string(),
                remote: request.serializer.clone(),
            }
            .into());
        }

        let connection = require_connection(channel)?;
        let mut agreed = BTreeMap::new();
        for range in &request.protocols {
            let Some(protocol) = self.protocol(&range.name) else {
                debug!(connection = %connection.id(), protocol = %range.name, "peer offered an unknown protocol");
                continue;
            };
            let Some(version) = protocol.negotiate(range.current, range.supported) else {
                warn!(
                    connection = %connection.id(),
                    protocol = %range.name,
                    peer_current = range.current,
                    peer_supported = range.supported,
                    current = protocol.current_version(),
                    supported = protocol.supported_version(),
                    "no common protocol version"
                );
                continue;
            };
            connection.set_message_factory(protocol.message_factory(version)?);
            agreed.insert(range.name.clone(), version);
        }
        if let Some(client_id) = request.client_id {
            connection.set_peer_id(client_id);
        }
        connection.set_member(request.member.clone());

        let result = OpenConnectionResult {
            connection_id: connection.id(),
            member: self.config().service_name.clone(),
            protocols: agreed,
        };
        debug!(connection = %connection.id(), protocols = ?result.protocols, "accepted connection handshake");
        reply_value(channel, request, &result)
    }

    /// Opens a Channel to the named receiver and replies with its id.
    fn on_open_channel(
        &self,
        channel: &Arc<Channel>,
        request: &mut OpenChannelRequest,
    ) -> Result<(), ExtendError> {
        let connection = require_connection(channel)?;
        let receiver = self
            .receiver(&request.receiver_name)
            .ok_or_else(|| ProtocolError::UnknownReceiver(request.receiver_name.clone()))?;
        let expected = receiver.protocol();
        if expected.name() != request.protocol {
            return Err(ProtocolError::ProtocolMismatch {
                expected: expected.name().to_string(),
                actual: request.protocol.clone(),
            }
            .into());
        }
        let id = connection.open_channel_request(
            &request.protocol,
            self.config().serializer.clone(),
            Some(receiver),
            request.subject.clone(),
            self.config().access_adapter.clone(),
        )?;
        debug!(
            connection = %connection.id(),
            channel = %id,
            receiver = %request.receiver_name,
            "opened channel at peer request"
        );
        reply_value(channel, request, &id.as_i32())
    }

    /// Promotes the pending Channel the peer accepted.
    fn on_accept_channel(
        &self,
        channel: &Arc<Channel>,
        request: &mut AcceptChannelRequest,
    ) -> Result<(), ExtendError> {
        let connection = require_connection(channel)?;
        let accepted = connection.accept_channel_request(
            ChannelId::new(request.channel_id),
            &request.protocol,
            request.subject.clone(),
            self.config().access_adapter.clone(),
        )?;
        debug!(connection = %connection.id(), channel = %accepted.id(), "peer accepted channel");
        Ok(())
    }
}

impl Receiver for Peer {
    fn name(&self) -> &str {
        control::PROTOCOL_NAME
    }

    fn protocol(&self) -> Arc<Protocol> {
        self.control_protocol()
    }

    fn on_message(&self, channel: &Arc<Channel>, message: &mut dyn Message) -> Result<(), ExtendError> {
        match ControlMessageType::from_type_id(message.message_type()) {
            Some(ControlMessageType::OpenConnectionRequest) => {
                self.on_open_connection(channel, downcast(message)?)
            }
            Some(ControlMessageType::OpenChannelRequest) => self.on_open_channel(channel, downcast(message)?),
            Some(ControlMessageType::AcceptChannelRequest) => {
                self.on_accept_channel(channel, downcast(message)?)
            }
            _ => message.dispatch(channel),
        }
    }
}
