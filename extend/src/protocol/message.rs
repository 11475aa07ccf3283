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

//! The [`Message`] trait and per-message header state.

use crate::channel::{Channel, ChannelId};
use crate::codec::{CodecError, FieldReader, FieldWriter};
use crate::error::ExtendError;
use crate::protocol::{ProtocolError, Request, Response, run_request};
use std::any::{Any, type_name};
use std::fmt;
use std::sync::{Arc, Weak};

/// A unit of communication on a Channel.
///
/// Implementations hold a [`MessageHeader`] and serialize their own properties
/// through [`write_external`](Self::write_external) and
/// [`read_external`](Self::read_external). Messages are created by a
/// [`MessageFactory`](crate::protocol::MessageFactory) from their type id, so
/// every implementation must be constructible without arguments.
///
/// # Examples
///
/// ```rust
/// use extend::codec::{CodecError, FieldReader, FieldWriter};
/// use extend::protocol::{Message, MessageHeader};
///
/// #[derive(Debug, Default)]
/// struct Heartbeat {
///     header: MessageHeader,
///     sequence: i64,
/// }
///
/// impl Message for Heartbeat {
///     fn message_type(&self) -> i32 {
///         12
///     }
///
///     fn header(&self) -> &MessageHeader {
///         &self.header
///     }
///
///     fn header_mut(&mut self) -> &mut MessageHeader {
///         &mut self.header
///     }
///
///     fn read_external(&mut self, input: &mut FieldReader<'_>) -> Result<(), CodecError> {
///         self.sequence = input.read_i64(0)?.unwrap_or_default();
///         Ok(())
///     }
///
///     fn write_external(&self, output: &mut FieldWriter<'_>) -> Result<(), CodecError> {
///         output.write_i64(0, self.sequence)
///     }
/// }
/// ```
pub trait Message: Any + Send + fmt::Debug {
    /// The type id of this message within its protocol.
    fn message_type(&self) -> i32;

    /// Shared header state.
    fn header(&self) -> &MessageHeader;

    /// Mutable header state.
    fn header_mut(&mut self) -> &mut MessageHeader;

    /// Whether this message must be executed in arrival order relative to
    /// other in-order messages of its Channel.
    fn is_execute_in_order(&self) -> bool {
        false
    }

    /// Reads this message's properties.
    fn read_external(&mut self, input: &mut FieldReader<'_>) -> Result<(), CodecError> {
        let _ = input;
        Ok(())
    }

    /// Writes this message's properties in ascending index order.
    fn write_external(&self, output: &mut FieldWriter<'_>) -> Result<(), CodecError> {
        let _ = output;
        Ok(())
    }

    /// Executes a received message that is neither a request nor a response.
    fn run(&mut self, channel: &Arc<Channel>) -> Result<(), ExtendError> {
        let _ = channel;
        Ok(())
    }

    /// Returns this message as a [`Request`], if it is one.
    fn as_request(&self) -> Option<&dyn Request> {
        None
    }

    /// Returns this message as a mutable [`Request`], if it is one.
    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        None
    }

    /// Returns this message as a [`Response`], if it is one.
    fn as_response(&self) -> Option<&Response> {
        None
    }
}

impl dyn Message {
    /// Executes the message: requests are processed into their response,
    /// anything else is [`run`](Message::run).
    pub fn dispatch(&mut self, channel: &Arc<Channel>) -> Result<(), ExtendError> {
        match self.as_request_mut() {
            Some(request) => run_request(request, channel),
            None => self.run(channel),
        }
    }

    /// Returns `true` if the message is a `T`.
    #[must_use]
    pub fn is<T: Message>(&self) -> bool {
        let any: &dyn Any = self;
        any.is::<T>()
    }

    /// Downcasts a message reference.
    #[must_use]
    pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
        let any: &dyn Any = self;
        any.downcast_ref()
    }

    /// Downcasts a mutable message reference.
    #[must_use]
    pub fn downcast_mut<T: Message>(&mut self) -> Option<&mut T> {
        let any: &mut dyn Any = self;
        any.downcast_mut()
    }

    /// Downcasts a boxed message, handing it back unchanged on mismatch.
    pub fn downcast<T: Message>(self: Box<Self>) -> Result<Box<T>, Box<dyn Message>> {
        if !self.is::<T>() {
            return Err(self);
        }
        let any: Box<dyn Any> = self;
        Ok(any
            .downcast::<T>()
            .unwrap_or_else(|_| unreachable!("checked {} above", type_name::<T>())))
    }
}

#[derive(Clone)]
struct ChannelBinding {
    id: ChannelId,
    channel: Weak<Channel>,
}

/// Header state common to every message.
#[derive(Clone, Default)]
pub struct MessageHeader {
    impl_version: i32,
    data_version: i32,
    future_data: Vec<u8>,
    channel: Option<ChannelBinding>,
    trace_context: Option<String>,
}

impl MessageHeader {
    /// Creates an empty header.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Version of the message implementation, stamped by the factory.
    #[must_use]
    pub fn impl_version(&self) -> i32 {
        self.impl_version
    }

    pub(crate) fn set_impl_version(&mut self, version: i32) {
        self.impl_version = version;
    }

    /// Version the message was decoded at, or `0` for locally created ones.
    #[must_use]
    pub fn data_version(&self) -> i32 {
        self.data_version
    }

    /// Sets the version the message data was produced at.
    pub fn set_data_version(&mut self, version: i32) {
        self.data_version = version;
    }

    /// Properties the decoder did not recognize, in wire form.
    #[must_use]
    pub fn future_data(&self) -> &[u8] {
        &self.future_data
    }

    /// Replaces the captured unknown properties.
    pub fn set_future_data(&mut self, data: Vec<u8>) {
        self.future_data = data;
    }

    /// Id of the Channel this message is bound to.
    #[must_use]
    pub fn channel_id(&self) -> Option<ChannelId> {
        self.channel.as_ref().map(|binding| binding.id)
    }

    /// The Channel this message is bound to, while it is alive.
    #[must_use]
    pub fn channel(&self) -> Option<Arc<Channel>> {
        self.channel.as_ref().and_then(|binding| binding.channel.upgrade())
    }

    /// Binds the message to `channel`.
    ///
    /// Rebinding to the same Channel is a no-op; binding to another fails.
    pub(crate) fn bind_channel(&mut self, channel: &Arc<Channel>, type_id: i32) -> Result<(), ProtocolError> {
        match &self.channel {
            Some(binding) if binding.channel.ptr_eq(&Arc::downgrade(channel)) => Ok(()),
            Some(binding) => Err(ProtocolError::AlreadyBound {
                type_id,
                channel: binding.id,
            }),
            None => {
                self.channel = Some(ChannelBinding {
                    id: channel.id(),
                    channel: Arc::downgrade(channel),
                });
                Ok(())
            }
        }
    }

    /// Optional tracing context propagated with the message.
    #[must_use]
    pub fn trace_context(&self) -> Option<&str> {
        self.trace_context.as_deref()
    }

    /// Attaches a tracing context.
    pub fn set_trace_context(&mut self, context: impl Into<String>) {
        self.trace_context = Some(context.into());
    }
}

impl fmt::Debug for MessageHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageHeader")
            .field("impl_version", &self.impl_version)
            .field("data_version", &self.data_version)
            .field("future_data", &self.future_data.len())
            .field("channel", &self.channel_id())
            .finish()
    }
}
