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

use crate::serialization::{
    DeserializationError, JsonSerializer, PostcardSerializer, SerializationError, Serializer,
};

/// The serializer attached to a Channel.
///
/// A closed set of the formats shipped with the crate, usable where a
/// `dyn Serializer` would be wanted.
#[derive(Clone, Debug)]
pub enum SerializerFormat {
    /// JSON payloads.
    Json(JsonSerializer),
    /// Postcard payloads.
    Postcard(PostcardSerializer),
}

impl SerializerFormat {
    /// Compact JSON.
    pub fn json() -> Self {
        Self::Json(JsonSerializer::new())
    }

    /// Postcard without a size limit.
    pub fn postcard() -> Self {
        Self::Postcard(PostcardSerializer::new())
    }

    /// Looks a format up by its [`Serializer::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "json" => Some(Self::json()),
            "postcard" => Some(Self::postcard()),
            _ => None,
        }
    }
}

impl Default for SerializerFormat {
    fn default() -> Self {
        Self::json()
    }
}

impl Serializer for SerializerFormat {
    fn serialize<T>(&self, value: &T) -> Result<Vec<u8>, SerializationError>
    where
        T: serde::Serialize + ?Sized,
    {
        match self {
            Self::Json(s) => s.serialize(value),
            Self::Postcard(s) => s.serialize(value),
        }
    }

    fn deserialize<T>(&self, bytes: &[u8]) -> Result<T, DeserializationError>
    where
        T: serde::de::DeserializeOwned,
    {
        match self {
            Self::Json(s) => s.deserialize(bytes),
            Self::Postcard(s) => s.deserialize(bytes),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Json(s) => s.name(),
            Self::Postcard(s) => s.name(),
        }
    }
}
