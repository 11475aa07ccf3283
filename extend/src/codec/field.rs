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

//! Indexed property streams.
//!
//! A message body is a sequence of records followed by an end marker:
//!
//! ```text
//! +----------------+--------------+-----------------+
//! | index (zigzag) | length (u64) | payload (bytes) |   repeated, ascending index
//! +----------------+--------------+-----------------+
//! | -1 (zigzag)                                     |   end marker
//! +-------------------------------------------------+
//! ```
//!
//! Readers ask for properties by index. Properties a reader does not know are
//! left in the stream and captured by [`FieldReader::read_remainder`], which
//! is how a message preserves data written by a newer version of itself.

use crate::codec::CodecError;
use crate::codec::packed::{
    read_packed_i32, read_packed_i64, read_packed_u64, write_packed_i32, write_packed_i64,
    write_packed_u64,
};
use crate::serialization::{Serializer, SerializerFormat};
use serde::Serialize;
use serde::de::DeserializeOwned;

const END_MARKER: i32 = -1;

/// Writes indexed properties of a message body.
pub struct FieldWriter<'a> {
    out: &'a mut Vec<u8>,
    serializer: &'a SerializerFormat,
    version: i32,
    last_index: Option<i32>,
}

impl<'a> FieldWriter<'a> {
    pub(crate) fn new(out: &'a mut Vec<u8>, serializer: &'a SerializerFormat, version: i32) -> Self {
        Self {
            out,
            serializer,
            version,
            last_index: None,
        }
    }

    /// The version the body is being written at.
    #[must_use]
    pub fn version(&self) -> i32 {
        self.version
    }

    fn record(&mut self, index: i32, payload: &[u8]) -> Result<(), CodecError> {
        if index < 0 {
            return Err(CodecError::InvalidIndex(index));
        }
        if let Some(last) = self.last_index
            && index <= last
        {
            return Err(CodecError::PropertyOrder { index, last });
        }
        write_packed_i32(self.out, index);
        write_packed_u64(self.out, payload.len() as u64);
        self.out.extend_from_slice(payload);
        self.last_index = Some(index);
        Ok(())
    }

    /// Writes a 32-bit integer property.
    pub fn write_i32(&mut self, index: i32, value: i32) -> Result<(), CodecError> {
        let mut buf = Vec::with_capacity(5);
        write_packed_i32(&mut buf, value);
        self.record(index, &buf)
    }

    /// Writes a 64-bit integer property.
    pub fn write_i64(&mut self, index: i32, value: i64) -> Result<(), CodecError> {
        let mut buf = Vec::with_capacity(10);
        write_packed_i64(&mut buf, value);
        self.record(index, &buf)
    }

    /// Writes a boolean property.
    pub fn write_bool(&mut self, index: i32, value: bool) -> Result<(), CodecError> {
        self.record(index, &[u8::from(value)])
    }

    /// Writes a UTF-8 string property.
    pub fn write_string(&mut self, index: i32, value: &str) -> Result<(), CodecError> {
        self.record(index, value.as_bytes())
    }

    /// Writes a string property if present.
    pub fn write_optional_string(&mut self, index: i32, value: Option<&str>) -> Result<(), CodecError> {
        match value {
            Some(value) => self.write_string(index, value),
            None => Ok(()),
        }
    }

    /// Writes a raw binary property.
    pub fn write_bytes(&mut self, index: i32, value: &[u8]) -> Result<(), CodecError> {
        self.record(index, value)
    }

    /// Writes a property serialized with the Channel's serializer.
    pub fn write_object<T>(&mut self, index: i32, value: &T) -> Result<(), CodecError>
    where
        T: Serialize + ?Sized,
    {
        let bytes = self
            .serializer
            .serialize(value)
            .map_err(|e| CodecError::Payload {
                index,
                message: e.to_string(),
            })?;
        self.record(index, &bytes)
    }

    /// Writes a nested property stream built by `build`.
    pub fn write_nested<F>(&mut self, index: i32, build: F) -> Result<(), CodecError>
    where
        F: FnOnce(&mut FieldWriter<'_>) -> Result<(), CodecError>,
    {
        let mut buf = Vec::new();
        let mut nested = FieldWriter::new(&mut buf, self.serializer, self.version);
        build(&mut nested)?;
        nested.finish();
        self.record(index, &buf)
    }

    /// Appends previously captured unknown properties verbatim.
    pub(crate) fn write_remainder(&mut self, remainder: &[u8]) {
        self.out.extend_from_slice(remainder);
    }

    /// Writes the end marker.
    pub(crate) fn finish(self) {
        write_packed_i32(self.out, END_MARKER);
    }
}

/// Reads indexed properties of a message body.
///
/// Properties must be requested in ascending index order. Asking for an index
/// that is not present yields `None`; lower-indexed properties that were
/// skipped over are discarded.
pub struct FieldReader<'a> {
    input: &'a [u8],
    serializer: &'a SerializerFormat,
    version: i32,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(input: &'a [u8], serializer: &'a SerializerFormat, version: i32) -> Self {
        Self {
            input,
            serializer,
            version,
        }
    }

    /// The version the body was written at.
    ///
    /// Messages use this to decide which properties a peer could have sent.
    #[must_use]
    pub fn version(&self) -> i32 {
        self.version
    }

    fn next_record(input: &mut &'a [u8]) -> Result<Option<(i32, &'a [u8])>, CodecError> {
        let index = read_packed_i32(input)?;
        if index == END_MARKER {
            return Ok(None);
        }
        if index < 0 {
            return Err(CodecError::InvalidIndex(index));
        }
        let len = usize::try_from(read_packed_u64(input)?).map_err(|_| CodecError::MalformedInteger)?;
        if input.len() < len {
            return Err(CodecError::Truncated {
                needed: len - input.len(),
            });
        }
        let (payload, rest) = input.split_at(len);
        *input = rest;
        Ok(Some((index, payload)))
    }

    fn seek(&mut self, index: i32) -> Result<Option<&'a [u8]>, CodecError> {
        loop {
            let mut cursor = self.input;
            let Some((found, payload)) = Self::next_record(&mut cursor)? else {
                return Ok(None);
            };
            if found > index {
                return Ok(None);
            }
            self.input = cursor;
            if found == index {
                return Ok(Some(payload));
            }
        }
    }

    /// Reads a 32-bit integer property.
    pub fn read_i32(&mut self, index: i32) -> Result<Option<i32>, CodecError> {
        self.seek(index)?
            .map(|mut payload| read_packed_i32(&mut payload))
            .transpose()
    }

    /// Reads a 64-bit integer property.
    pub fn read_i64(&mut self, index: i32) -> Result<Option<i64>, CodecError> {
        self.seek(index)?
            .map(|mut payload| read_packed_i64(&mut payload))
            .transpose()
    }

    /// Reads a boolean property.
    pub fn read_bool(&mut self, index: i32) -> Result<Option<bool>, CodecError> {
        match self.seek(index)? {
            None => Ok(None),
            Some([byte]) => Ok(Some(*byte != 0)),
            Some(other) => Err(CodecError::InvalidLength {
                index,
                len: other.len(),
                expected: "a single byte",
            }),
        }
    }

    /// Reads a UTF-8 string property.
    pub fn read_string(&mut self, index: i32) -> Result<Option<String>, CodecError> {
        self.seek(index)?
            .map(|payload| {
                std::str::from_utf8(payload)
                    .map(str::to_owned)
                    .map_err(|_| CodecError::InvalidUtf8 { index })
            })
            .transpose()
    }

    /// Reads a raw binary property.
    pub fn read_bytes(&mut self, index: i32) -> Result<Option<Vec<u8>>, CodecError> {
        Ok(self.seek(index)?.map(<[u8]>::to_vec))
    }

    /// Reads a property serialized with the Channel's serializer.
    pub fn read_object<T>(&mut self, index: i32) -> Result<Option<T>, CodecError>
    where
        T: DeserializeOwned,
    {
        let serializer = self.serializer;
        self.seek(index)?
            .map(|payload| {
                serializer.deserialize(payload).map_err(|e| CodecError::Payload {
                    index,
                    message: e.to_string(),
                })
            })
            .transpose()
    }

    /// Reads a nested property stream with `read`.
    pub fn read_nested<F, R>(&mut self, index: i32, read: F) -> Result<Option<R>, CodecError>
    where
        F: FnOnce(&mut FieldReader<'_>) -> Result<R, CodecError>,
    {
        let serializer = self.serializer;
        let version = self.version;
        self.seek(index)?
            .map(|payload| read(&mut FieldReader::new(payload, serializer, version)))
            .transpose()
    }

    /// Consumes the rest of the body and returns the unread properties.
    ///
    /// Fails if the end marker is missing or followed by extra bytes.
    pub(crate) fn read_remainder(self) -> Result<Vec<u8>, CodecError> {
        let start = self.input;
        let mut cursor = self.input;
        loop {
            let before = cursor;
            if Self::next_record(&mut cursor)?.is_none() {
                if !cursor.is_empty() {
                    return Err(CodecError::TrailingBytes(cursor.len()));
                }
                let consumed = start.len() - before.len();
                return Ok(start[..consumed].to_vec());
            }
        }
    }
}
