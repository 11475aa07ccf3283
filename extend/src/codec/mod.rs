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

//! Message envelope codec.
//!
//! Every message travels as:
//!
//! ```text
//! +-------------------+-------------------+------------------------------+
//! | type id (packed)  | version (packed)  | property stream + end marker |
//! +-------------------+-------------------+------------------------------+
//! ```
//!
//! Requests additionally carry their request id as a packed integer between
//! the version and the property stream.
//!
//! The version written is the larger of the message's data version (the
//! version it was decoded at, if it came from a peer) and its implementation
//! version. Properties the decoding side does not understand are kept as the
//! message's future data and written back out on re-encode, so a message can
//! pass through an older peer without losing fields.

mod error;
mod field;
pub mod packed;

pub use error::CodecError;
pub use field::{FieldReader, FieldWriter};

use crate::channel::Channel;
use crate::error::ExtendError;
use crate::protocol::{Message, MessageFactory};
use crate::serialization::SerializerFormat;
use packed::{read_packed_i32, read_packed_i64, write_packed_i32, write_packed_i64};
use std::sync::Arc;

/// Encodes messages to bytes and decodes bytes to messages for a Channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec;

impl Codec {
    /// Creates a codec.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Encodes `message` with the serializer of `channel`.
    ///
    /// # Errors
    ///
    /// Fails with [`ExtendError::IllegalState`] if the Channel has no
    /// serializer, or with a codec error if the message cannot be written.
    pub fn encode(&self, channel: &Channel, message: &dyn Message) -> Result<Vec<u8>, ExtendError> {
        let serializer = channel
            .serializer()
            .ok_or_else(|| ExtendError::illegal_state(format!("{} has no serializer", channel.id())))?;
        Ok(self.encode_with(serializer, message)?)
    }

    /// Decodes a message addressed to `channel` and binds it to the Channel.
    ///
    /// # Errors
    ///
    /// Fails with [`ExtendError::IllegalState`] if the Channel has no message
    /// factory or serializer, with a protocol error for an unknown message
    /// type, or with a codec error for malformed input.
    pub fn decode(&self, channel: &Arc<Channel>, bytes: &[u8]) -> Result<Box<dyn Message>, ExtendError> {
        let factory = channel.message_factory().ok_or_else(|| {
            ExtendError::illegal_state(format!("{} has no message factory", channel.id()))
        })?;
        let serializer = channel
            .serializer()
            .ok_or_else(|| ExtendError::illegal_state(format!("{} has no serializer", channel.id())))?;
        let mut message = self.decode_with(&factory, serializer, bytes)?;
        let type_id = message.message_type();
        message.header_mut().bind_channel(channel, type_id)?;
        Ok(message)
    }

    /// Encodes `message` using an explicit serializer.
    pub fn encode_with(
        &self,
        serializer: &SerializerFormat,
        message: &dyn Message,
    ) -> Result<Vec<u8>, CodecError> {
        let header = message.header();
        let version = header.data_version().max(header.impl_version());
        let mut out = Vec::with_capacity(64);
        write_packed_i32(&mut out, message.message_type());
        write_packed_i32(&mut out, version);
        if let Some(request) = message.as_request() {
            write_packed_i64(&mut out, request.request_header().id());
        }
        let mut writer = FieldWriter::new(&mut out, serializer, version);
        message.write_external(&mut writer)?;
        writer.write_remainder(header.future_data());
        writer.finish();
        Ok(out)
    }

    /// Decodes a message using an explicit factory and serializer.
    ///
    /// The returned message is not bound to any Channel.
    pub fn decode_with(
        &self,
        factory: &MessageFactory,
        serializer: &SerializerFormat,
        bytes: &[u8],
    ) -> Result<Box<dyn Message>, ExtendError> {
        let mut input = bytes;
        let type_id = read_packed_i32(&mut input)?;
        let version = read_packed_i32(&mut input)?;
        let mut message = factory.create_message(type_id)?;
        message.header_mut().set_data_version(version);
        if let Some(request) = message.as_request_mut() {
            request.request_header_mut().set_id(read_packed_i64(&mut input)?);
        }

        let mut reader = FieldReader::new(input, serializer, version);
        message.read_external(&mut reader)?;
        let remainder = reader.read_remainder()?;
        message.header_mut().set_future_data(remainder);
        Ok(message)
    }
}
