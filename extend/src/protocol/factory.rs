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

//! Type-id to message constructor tables.

use crate::protocol::{Message, ProtocolError, Response};
use std::any::type_name;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Constructs an empty message of one type.
pub type MessageConstructor = fn() -> Box<dyn Message>;

/// Creates messages of one protocol version by type id.
///
/// Factories are built by a [`Protocol`](crate::protocol::Protocol) and
/// cached per version. Every message a factory creates is stamped with the
/// factory's version.
///
/// ```rust
/// use extend::protocol::{Message, MessageFactory, Response};
///
/// fn response() -> Box<dyn Message> {
///     Box::new(Response::new(0))
/// }
///
/// let factory = MessageFactory::new("demo", 3, 0, &[response]).unwrap();
/// let message = factory.create_message(0).unwrap();
/// assert_eq!(message.header().impl_version(), 3);
/// assert!(factory.create_message(9).is_err());
/// ```
#[derive(Clone)]
pub struct MessageFactory {
    protocol: Arc<str>,
    version: i32,
    response_type: i32,
    constructors: BTreeMap<i32, MessageConstructor>,
}

impl MessageFactory {
    /// Builds a factory from a list of constructors.
    ///
    /// Each constructor is invoked once to learn its type id.
    ///
    /// # Errors
    ///
    /// Fails if two constructors report the same type id or if
    /// `response_type` is not among them.
    pub fn new(
        protocol: impl Into<Arc<str>>,
        version: i32,
        response_type: i32,
        constructors: &[MessageConstructor],
    ) -> Result<Self, ProtocolError> {
        let protocol = protocol.into();
        let mut table = BTreeMap::new();
        for constructor in constructors {
            let type_id = constructor().message_type();
            if table.insert(type_id, *constructor).is_some() {
                return Err(ProtocolError::DuplicateMessageType {
                    protocol: protocol.to_string(),
                    version,
                    type_id,
                });
            }
        }
        if !table.contains_key(&response_type) {
            return Err(ProtocolError::UnknownMessageType {
                protocol: protocol.to_string(),
                version,
                type_id: response_type,
            });
        }
        Ok(Self {
            protocol,
            version,
            response_type,
            constructors: table,
        })
    }

    /// Name of the protocol this factory belongs to.
    #[must_use]
    pub fn protocol_name(&self) -> &str {
        &self.protocol
    }

    /// The protocol version messages are created at.
    #[must_use]
    pub fn version(&self) -> i32 {
        self.version
    }

    /// Type id of the protocol's [`Response`].
    #[must_use]
    pub fn response_type(&self) -> i32 {
        self.response_type
    }

    /// Returns `true` if `type_id` is registered.
    #[must_use]
    pub fn contains(&self, type_id: i32) -> bool {
        self.constructors.contains_key(&type_id)
    }

    /// Registered type ids in ascending order.
    pub fn message_types(&self) -> impl Iterator<Item = i32> + '_ {
        self.constructors.keys().copied()
    }

    /// Creates an empty message of the given type.
    pub fn create_message(&self, type_id: i32) -> Result<Box<dyn Message>, ProtocolError> {
        let constructor =
            self.constructors
                .get(&type_id)
                .ok_or_else(|| ProtocolError::UnknownMessageType {
                    protocol: self.protocol.to_string(),
                    version: self.version,
                    type_id,
                })?;
        let mut message = constructor();
        message.header_mut().set_impl_version(self.version);
        Ok(message)
    }

    /// Creates an empty message of the given type as its concrete type.
    pub fn create<T: Message>(&self, type_id: i32) -> Result<Box<T>, ProtocolError> {
        self.create_message(type_id)?
            .downcast::<T>()
            .map_err(|_| ProtocolError::WrongMessageKind {
                type_id,
                expected: type_name::<T>(),
            })
    }

    /// Creates an empty [`Response`].
    pub fn create_response(&self) -> Result<Response, ProtocolError> {
        Ok(*self.create::<Response>(self.response_type)?)
    }
}

impl fmt::Debug for MessageFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageFactory")
            .field("protocol", &self.protocol)
            .field("version", &self.version)
            .field("message_types", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}
