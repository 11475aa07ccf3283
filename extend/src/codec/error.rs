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

//! Codec error types.

use thiserror::Error;

/// Error raised while encoding or decoding a message envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The input ended in the middle of a value.
    #[error("unexpected end of input: {needed} more bytes required")]
    Truncated {
        /// Minimum number of missing bytes.
        needed: usize,
    },

    /// A packed integer used more than ten bytes or overflowed 64 bits.
    #[error("malformed packed integer")]
    MalformedInteger,

    /// A packed value did not fit the requested width.
    #[error("packed value {0} does not fit in 32 bits")]
    Overflow(i64),

    /// A string property was not valid UTF-8.
    #[error("property {index} is not valid UTF-8")]
    InvalidUtf8 {
        /// The property index.
        index: i32,
    },

    /// A fixed-size property had the wrong length.
    #[error("property {index} has length {len}, expected {expected}")]
    InvalidLength {
        /// The property index.
        index: i32,
        /// The length found on the wire.
        len: usize,
        /// Description of the expected value.
        expected: &'static str,
    },

    /// Properties must be written in strictly ascending index order.
    #[error("property {index} written after property {last}")]
    PropertyOrder {
        /// The offending index.
        index: i32,
        /// The previously written index.
        last: i32,
    },

    /// Property indexes must not be negative.
    #[error("negative property index {0}")]
    InvalidIndex(i32),

    /// The message body was not followed by data after the end marker.
    #[error("{0} trailing bytes after message body")]
    TrailingBytes(usize),

    /// A serialized payload property could not be converted.
    #[error("payload property {index}: {message}")]
    Payload {
        /// The property index.
        index: i32,
        /// The underlying serialization error.
        message: String,
    },
}
