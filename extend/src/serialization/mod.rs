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

//! Serialization of opaque payloads carried inside messages.
//!
//! Message envelopes are written by the [`codec`](crate::codec) property
//! writer. Application values embedded in those envelopes (request arguments,
//! response results) go through a [`Serializer`]. Two formats ship with the
//! crate:
//!
//! - [`JsonSerializer`]: human-readable, the default for new peers
//! - [`PostcardSerializer`]: compact binary
//!
//! The generic [`Serializer`] trait cannot be stored as a trait object, so
//! Channels hold a [`SerializerFormat`], a closed set of the formats above
//! that dispatches to the concrete serializer.
//!
//! # Examples
//!
//! ```rust
//! use extend::serialization::{SerializerFormat, Serializer};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let format = SerializerFormat::postcard();
//! let bytes = format.serialize(&(7u32, "seven"))?;
//! let (n, s): (u32, String) = format.deserialize(&bytes)?;
//! assert_eq!((n, s.as_str()), (7, "seven"));
//! # Ok(())
//! # }
//! ```

mod error;
mod format;
mod json;
mod postcard;
mod traits;

pub use error::{DeserializationError, SerializationError};
pub use format::SerializerFormat;
pub use self::json::JsonSerializer;
pub use self::postcard::PostcardSerializer;
pub use traits::Serializer;
