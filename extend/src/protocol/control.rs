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

//! The protocol spoken on channel 0 of every Connection.
//!
//! | Type id | Message                    | Kind     |
//! |---------|----------------------------|----------|
//! | 0       | [`Response`]               | response |
//! | 1       | [`OpenConnectionRequest`]  | request  |
//! | 2       | [`OpenChannelRequest`]     | request  |
//! | 3       | [`AcceptChannelRequest`]   | request  |
//! | 4       | [`PingRequest`]            | request  |
//! | 5       | [`NotifyConnectionClosed`] | message  |
//! | 6       | [`NotifyChannelClosed`]    | message  |
//!
//! Pings and close notifications execute themselves. The handshake requests
//! need the registries of a connection manager and are answered by the
//! manager's channel-0 [`Receiver`](crate::channel::Receiver).

use crate::channel::{Channel, ChannelId, Subject};
use crate::codec::{CodecError, FieldReader, FieldWriter};
use crate::error::{ExtendError, RemoteError};
use crate::protocol::{
    Message, MessageCatalog, MessageConstructor, MessageHeader, Protocol, ProtocolError, Request,
    RequestHeader, Response,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Name of the control protocol.
pub const PROTOCOL_NAME: &str = "Peer";

/// Newest control protocol version.
pub const CURRENT_VERSION: i32 = 1;

/// Oldest control protocol version.
pub const SUPPORTED_VERSION: i32 = 1;

/// Every message kind of the control protocol.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlMessageType {
    /// Generic reply to every control request.
    Response = 0,
    /// Initiator to acceptor handshake.
    OpenConnectionRequest = 1,
    /// Ask the peer to open a Channel to one of its receivers.
    OpenChannelRequest = 2,
    /// Accept a Channel the peer created and advertised by URI.
    AcceptChannelRequest = 3,
    /// Liveness probe.
    PingRequest = 4,
    /// The sender closed the Connection.
    NotifyConnectionClosed = 5,
    /// The sender closed a Channel.
    NotifyChannelClosed = 6,
}

impl ControlMessageType {
    /// All message kinds in type id order.
    pub const ALL: [ControlMessageType; 7] = [
        Self::Response,
        Self::OpenConnectionRequest,
        Self::OpenChannelRequest,
        Self::AcceptChannelRequest,
        Self::PingRequest,
        Self::NotifyConnectionClosed,
        Self::NotifyChannelClosed,
    ];

    /// The wire type id.
    #[must_use]
    pub const fn type_id(self) -> i32 {
        self as i32
    }

    /// Looks a kind up by wire type id.
    #[must_use]
    pub fn from_type_id(type_id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.type_id() == type_id)
    }

    fn constructor(self) -> MessageConstructor {
        match self {
            Self::Response => new_response,
            Self::OpenConnectionRequest => boxed::<OpenConnectionRequest>,
            Self::OpenChannelRequest => boxed::<OpenChannelRequest>,
            Self::AcceptChannelRequest => boxed::<AcceptChannelRequest>,
            Self::PingRequest => boxed::<PingRequest>,
            Self::NotifyConnectionClosed => boxed::<NotifyConnectionClosed>,
            Self::NotifyChannelClosed => boxed::<NotifyChannelClosed>,
        }
    }
}

fn boxed<T: Message + Default>() -> Box<dyn Message> {
    Box::<T>::default()
}

fn new_response() -> Box<dyn Message> {
    Box::new(Response::new(ControlMessageType::Response.type_id()))
}

/// Message catalog of the control protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlCatalog;

impl MessageCatalog for ControlCatalog {
    fn message_constructors(&self, version: i32) -> Option<Vec<MessageConstructor>> {
        (version == CURRENT_VERSION).then(|| {
            ControlMessageType::ALL
                .into_iter()
                .map(ControlMessageType::constructor)
                .collect()
        })
    }

    fn response_type(&self) -> i32 {
        ControlMessageType::Response.type_id()
    }
}

/// Builds the control protocol.
pub fn control_protocol() -> Result<Protocol, ProtocolError> {
    Protocol::new(PROTOCOL_NAME, CURRENT_VERSION, SUPPORTED_VERSION, ControlCatalog)
}

fn handled_by_manager(message: &str) -> ExtendError {
    ExtendError::illegal_state(format!("{message} must be handled by the connection manager"))
}

fn write_cause(output: &mut FieldWriter<'_>, index: i32, cause: Option<&RemoteError>) -> Result<(), CodecError> {
    if let Some(cause) = cause {
        output.write_string(index, cause.kind())?;
        output.write_string(index + 1, cause.message())?;
    }
    Ok(())
}

fn read_cause(input: &mut FieldReader<'_>, index: i32) -> Result<Option<RemoteError>, CodecError> {
    let kind = input.read_string(index)?;
    let message = input.read_string(index + 1)?;
    Ok(kind.map(|kind| RemoteError::new(kind, message.unwrap_or_default())))
}

/// A protocol version range advertised during the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolRange {
    /// Protocol name.
    pub name: String,
    /// Newest version.
    pub current: i32,
    /// Oldest version.
    pub supported: i32,
}

/// Reply payload of an [`OpenConnectionRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenConnectionResult {
    /// Id of the acceptor's Connection.
    pub connection_id: Uuid,
    /// Name of the accepting peer.
    pub member: String,
    /// Negotiated version per protocol.
    pub protocols: BTreeMap<String, i32>,
}

/// Initiator to acceptor handshake.
#[derive(Debug, Default)]
pub struct OpenConnectionRequest {
    header: MessageHeader,
    request: RequestHeader,
    /// Id of the initiator's Connection.
    pub client_id: Option<Uuid>,
    /// Name of the initiating peer.
    pub member: String,
    /// Serializer the initiator uses for payloads.
    pub serializer: String,
    /// Protocols the initiator can speak.
    pub protocols: Vec<ProtocolRange>,
}

impl Message for OpenConnectionRequest {
    fn message_type(&self) -> i32 {
        ControlMessageType::OpenConnectionRequest.type_id()
    }

    fn header(&self) -> &MessageHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut MessageHeader {
        &mut self.header
    }

    fn read_external(&mut self, input: &mut FieldReader<'_>) -> Result<(), CodecError> {
        self.client_id = input
            .read_string(0)?
            .and_then(|id| Uuid::parse_str(&id).ok());
        self.member = input.read_string(1)?.unwrap_or_default();
        self.serializer = input.read_string(2)?.unwrap_or_default();
        self.protocols = input
            .read_nested(3, |list| {
                let count = list.read_i32(0)?.unwrap_or_default();
                let mut protocols = Vec::new();
                for i in 0..count {
                    let base = 1 + i * 3;
                    protocols.push(ProtocolRange {
                        name: list.read_string(base)?.unwrap_or_default(),
                        current: list.read_i32(base + 1)?.unwrap_or_default(),
                        supported: list.read_i32(base + 2)?.unwrap_or_default(),
                    });
                }
                Ok(protocols)
            })?
            .unwrap_or_default();
        Ok(())
    }

    fn write_external(&self, output: &mut FieldWriter<'_>) -> Result<(), CodecError> {
        if let Some(client_id) = self.client_id {
            output.write_string(0, &client_id.to_string())?;
        }
        output.write_string(1, &self.member)?;
        output.write_string(2, &self.serializer)?;
        output.write_nested(3, |list| {
            list.write_i32(0, self.protocols.len() as i32)?;
            for (i, range) in self.protocols.iter().enumerate() {
                let base = 1 + i as i32 * 3;
                list.write_string(base, &range.name)?;
                list.write_i32(base + 1, range.current)?;
                list.write_i32(base + 2, range.supported)?;
            }
            Ok(())
        })
    }

    fn as_request(&self) -> Option<&dyn Request> {
        Some(self)
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

impl Request for OpenConnectionRequest {
    fn request_header(&self) -> &RequestHeader {
        &self.request
    }

    fn request_header_mut(&mut self) -> &mut RequestHeader {
        &mut self.request
    }

    fn process(&mut self, _channel: &Arc<Channel>, _response: &mut Response) -> Result<(), ExtendError> {
        Err(handled_by_manager("OpenConnectionRequest"))
    }
}

/// Asks the peer to open a Channel to one of its named receivers.
///
/// The reply carries the allocated channel id as an `i32` value.
#[derive(Debug, Default)]
pub struct OpenChannelRequest {
    header: MessageHeader,
    request: RequestHeader,
    /// Protocol the Channel will speak.
    pub protocol: String,
    /// Name of the peer receiver to attach.
    pub receiver_name: String,
    /// Identity the Channel acts for.
    pub subject: Option<Subject>,
}

impl Message for OpenChannelRequest {
    fn message_type(&self) -> i32 {
        ControlMessageType::OpenChannelRequest.type_id()
    }

    fn header(&self) -> &MessageHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut MessageHeader {
        &mut self.header
    }

    fn read_external(&mut self, input: &mut FieldReader<'_>) -> Result<(), CodecError> {
        self.protocol = input.read_string(0)?.unwrap_or_default();
        self.receiver_name = input.read_string(1)?.unwrap_or_default();
        self.subject = input.read_string(2)?.map(Subject::new);
        Ok(())
    }

    fn write_external(&self, output: &mut FieldWriter<'_>) -> Result<(), CodecError> {
        output.write_string(0, &self.protocol)?;
        output.write_string(1, &self.receiver_name)?;
        output.write_optional_string(2, self.subject.as_ref().map(Subject::principal))
    }

    fn as_request(&self) -> Option<&dyn Request> {
        Some(self)
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

impl Request for OpenChannelRequest {
    fn request_header(&self) -> &RequestHeader {
        &self.request
    }

    fn request_header_mut(&mut self) -> &mut RequestHeader {
        &mut self.request
    }

    fn process(&mut self, _channel: &Arc<Channel>, _response: &mut Response) -> Result<(), ExtendError> {
        Err(handled_by_manager("OpenChannelRequest"))
    }
}

/// Accepts a Channel the peer created with
/// [`Connection::create_channel_internal`](crate::connection::Connection::create_channel_internal).
#[derive(Debug, Default)]
pub struct AcceptChannelRequest {
    header: MessageHeader,
    request: RequestHeader,
    /// Id from the advertised channel URI.
    pub channel_id: i32,
    /// Protocol from the advertised channel URI.
    pub protocol: String,
    /// Identity the Channel acts for.
    pub subject: Option<Subject>,
}

impl Message for AcceptChannelRequest {
    fn message_type(&self) -> i32 {
        ControlMessageType::AcceptChannelRequest.type_id()
    }

    fn header(&self) -> &MessageHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut MessageHeader {
        &mut self.header
    }

    fn read_external(&mut self, input: &mut FieldReader<'_>) -> Result<(), CodecError> {
        self.channel_id = input.read_i32(0)?.unwrap_or_default();
        self.protocol = input.read_string(1)?.unwrap_or_default();
        self.subject = input.read_string(2)?.map(Subject::new);
        Ok(())
    }

    fn write_external(&self, output: &mut FieldWriter<'_>) -> Result<(), CodecError> {
        output.write_i32(0, self.channel_id)?;
        output.write_string(1, &self.protocol)?;
        output.write_optional_string(2, self.subject.as_ref().map(Subject::principal))
    }

    fn as_request(&self) -> Option<&dyn Request> {
        Some(self)
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

impl Request for AcceptChannelRequest {
    fn request_header(&self) -> &RequestHeader {
        &self.request
    }

    fn request_header_mut(&mut self) -> &mut RequestHeader {
        &mut self.request
    }

    fn process(&mut self, _channel: &Arc<Channel>, _response: &mut Response) -> Result<(), ExtendError> {
        Err(handled_by_manager("AcceptChannelRequest"))
    }
}

/// Liveness probe, answered with an empty Response.
#[derive(Debug, Default)]
pub struct PingRequest {
    header: MessageHeader,
    request: RequestHeader,
}

impl Message for PingRequest {
    fn message_type(&self) -> i32 {
        ControlMessageType::PingRequest.type_id()
    }

    fn header(&self) -> &MessageHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut MessageHeader {
        &mut self.header
    }

    fn as_request(&self) -> Option<&dyn Request> {
        Some(self)
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

impl Request for PingRequest {
    fn request_header(&self) -> &RequestHeader {
        &self.request
    }

    fn request_header_mut(&mut self) -> &mut RequestHeader {
        &mut self.request
    }

    fn process(&mut self, _channel: &Arc<Channel>, _response: &mut Response) -> Result<(), ExtendError> {
        Ok(())
    }
}

/// Tells the peer that the sender closed the Connection.
#[derive(Debug, Default)]
pub struct NotifyConnectionClosed {
    header: MessageHeader,
    /// Why the Connection closed.
    pub cause: Option<RemoteError>,
}

impl Message for NotifyConnectionClosed {
    fn message_type(&self) -> i32 {
        ControlMessageType::NotifyConnectionClosed.type_id()
    }

    fn header(&self) -> &MessageHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut MessageHeader {
        &mut self.header
    }

    fn read_external(&mut self, input: &mut FieldReader<'_>) -> Result<(), CodecError> {
        self.cause = read_cause(input, 0)?;
        Ok(())
    }

    fn write_external(&self, output: &mut FieldWriter<'_>) -> Result<(), CodecError> {
        write_cause(output, 0, self.cause.as_ref())
    }

    fn run(&mut self, channel: &Arc<Channel>) -> Result<(), ExtendError> {
        if let Some(connection) = channel.connection() {
            tracing::debug!(connection = %connection.id(), "peer closed the connection");
            connection.close_with(false, self.cause.take().map(ExtendError::Remote), false)?;
        }
        Ok(())
    }
}

/// Tells the peer that the sender closed a Channel.
#[derive(Debug, Default)]
pub struct NotifyChannelClosed {
    header: MessageHeader,
    /// The closed Channel.
    pub channel_id: i32,
    /// Why the Channel closed.
    pub cause: Option<RemoteError>,
}

impl Message for NotifyChannelClosed {
    fn message_type(&self) -> i32 {
        ControlMessageType::NotifyChannelClosed.type_id()
    }

    fn header(&self) -> &MessageHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut MessageHeader {
        &mut self.header
    }

    fn read_external(&mut self, input: &mut FieldReader<'_>) -> Result<(), CodecError> {
        self.channel_id = input.read_i32(0)?.unwrap_or_default();
        self.cause = read_cause(input, 1)?;
        Ok(())
    }

    fn write_external(&self, output: &mut FieldWriter<'_>) -> Result<(), CodecError> {
        output.write_i32(0, self.channel_id)?;
        write_cause(output, 1, self.cause.as_ref())
    }

    fn run(&mut self, channel: &Arc<Channel>) -> Result<(), ExtendError> {
        let id = ChannelId::new(self.channel_id);
        if id.is_control() {
            tracing::warn!("peer attempted to close the control channel");
            return Ok(());
        }
        let target = channel
            .connection()
            .and_then(|connection| connection.channel(id));
        match target {
            Some(target) => target.close_with(false, self.cause.take().map(ExtendError::Remote)),
            None => {
                tracing::debug!(channel = %id, "peer closed a channel that is not registered");
                Ok(())
            }
        }
    }
}
