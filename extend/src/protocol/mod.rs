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

//! Protocols, message factories and the message model.
//!
//! A [`Protocol`] is a named, versioned family of messages. For every version
//! in its supported range it lazily builds one [`MessageFactory`] from the
//! constructors supplied by its [`MessageCatalog`], and hands the same factory
//! to every caller asking for that version.
//!
//! Messages come in three kinds:
//!
//! - plain [`Message`]s, executed with [`Message::run`]
//! - [`Request`]s, processed into a [`Response`] that travels back to the
//!   sender
//! - [`Response`]s, which resolve the sender's
//!   [`Status`](crate::channel::Status)
//!
//! The [`control`] module defines the protocol spoken on channel 0.
//!
//! # Examples
//!
//! ```rust
//! use extend::protocol::{Message, MessageCatalog, MessageConstructor, Protocol, Response};
//!
//! struct Catalog;
//!
//! fn response() -> Box<dyn Message> {
//!     Box::new(Response::new(0))
//! }
//!
//! impl MessageCatalog for Catalog {
//!     fn message_constructors(&self, _version: i32) -> Option<Vec<MessageConstructor>> {
//!         Some(vec![response as MessageConstructor])
//!     }
//! }
//!
//! let protocol = Protocol::new("Demo", 2, 1, Catalog).unwrap();
//! let v1 = protocol.message_factory(1).unwrap();
//! assert_eq!(v1.version(), 1);
//! assert!(protocol.message_factory(3).is_err());
//! ```

pub mod control;
mod error;
mod factory;
mod message;
mod request;
mod response;

pub use error::ProtocolError;
pub use factory::{MessageConstructor, MessageFactory};
pub use message::{Message, MessageHeader};
pub use request::{Request, RequestHeader};
pub(crate) use request::run_request;
pub use response::{Response, ResponseResult};

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Supplies the message constructors of a protocol.
pub trait MessageCatalog: Send + Sync + 'static {
    /// Constructors of every message type available at `version`.
    ///
    /// Returning `None` means the protocol cannot build a factory for that
    /// version.
    fn message_constructors(&self, version: i32) -> Option<Vec<MessageConstructor>> {
        let _ = version;
        None
    }

    /// Type id of the protocol's [`Response`].
    fn response_type(&self) -> i32 {
        0
    }
}

/// A named, versioned family of messages.
pub struct Protocol {
    name: String,
    current_version: i32,
    supported_version: i32,
    catalog: Box<dyn MessageCatalog>,
    factories: Mutex<BTreeMap<i32, Arc<MessageFactory>>>,
}

impl Protocol {
    /// Declares a protocol supporting versions `supported..=current`.
    ///
    /// # Errors
    ///
    /// Fails if `supported > current`.
    pub fn new(
        name: impl Into<String>,
        current_version: i32,
        supported_version: i32,
        catalog: impl MessageCatalog,
    ) -> Result<Self, ProtocolError> {
        let name = name.into();
        if supported_version > current_version {
            return Err(ProtocolError::InvalidVersionRange {
                protocol: name,
                current: current_version,
                supported: supported_version,
            });
        }
        Ok(Self {
            name,
            current_version,
            supported_version,
            catalog: Box::new(catalog),
            factories: Mutex::new(BTreeMap::new()),
        })
    }

    /// The protocol name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The newest version this side speaks.
    #[must_use]
    pub fn current_version(&self) -> i32 {
        self.current_version
    }

    /// The oldest version this side still speaks.
    #[must_use]
    pub fn supported_version(&self) -> i32 {
        self.supported_version
    }

    /// Returns `true` if `version` lies in the supported range.
    #[must_use]
    pub fn supports(&self, version: i32) -> bool {
        (self.supported_version..=self.current_version).contains(&version)
    }

    /// Picks the version to speak with a peer advertising
    /// `peer_supported..=peer_current`.
    ///
    /// The newest version both sides speak wins; `None` if the ranges do not
    /// overlap.
    #[must_use]
    pub fn negotiate(&self, peer_current: i32, peer_supported: i32) -> Option<i32> {
        let version = self.current_version.min(peer_current);
        (version >= self.supported_version.max(peer_supported)).then_some(version)
    }

    /// Returns the cached factory for `version`, building it on first use.
    ///
    /// # Errors
    ///
    /// Fails if the version is out of range, the catalog has no constructors
    /// for it, or the constructors are inconsistent.
    pub fn message_factory(&self, version: i32) -> Result<Arc<MessageFactory>, ProtocolError> {
        if !self.supports(version) {
            return Err(ProtocolError::UnsupportedVersion {
                protocol: self.name.clone(),
                version,
                supported: self.supported_version,
                current: self.current_version,
            });
        }

        let mut factories = self.factories.lock();
        if let Some(factory) = factories.get(&version) {
            return Ok(factory.clone());
        }
        let constructors = self.catalog.message_constructors(version).ok_or_else(|| {
            ProtocolError::NoMessageFactory {
                protocol: self.name.clone(),
                version,
            }
        })?;
        let factory = Arc::new(MessageFactory::new(
            self.name.as_str(),
            version,
            self.catalog.response_type(),
            &constructors,
        )?);
        factories.insert(version, factory.clone());
        tracing::debug!(protocol = %self.name, version, "built message factory");
        Ok(factory)
    }
}

impl fmt::Debug for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protocol")
            .field("name", &self.name)
            .field("current_version", &self.current_version)
            .field("supported_version", &self.supported_version)
            .finish()
    }
}
