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

//! The [`Response`] message.

use crate::codec::{CodecError, FieldReader, FieldWriter};
use crate::error::{ExtendError, RemoteError};
use crate::protocol::{Message, MessageHeader};
use crate::serialization::{Serializer, SerializerFormat};
use serde::Serialize;
use serde::de::DeserializeOwned;

const PROP_REQUEST_ID: i32 = 0;
const PROP_FAILURE: i32 = 1;
const PROP_VALUE: i32 = 2;
const PROP_ERROR_KIND: i32 = 3;
const PROP_ERROR_MESSAGE: i32 = 4;

/// Outcome carried by a [`Response`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseResult {
    /// A serialized result value.
    Value(Vec<u8>),
    /// The error raised while processing the request.
    Error(RemoteError),
}

/// Reply to a [`Request`](crate::protocol::Request), matched by request id.
///
/// Every protocol registers one Response type id with its
/// [`MessageCatalog`](crate::protocol::MessageCatalog); the factory creates
/// Responses with that id.
#[derive(Debug, Clone)]
pub struct Response {
    header: MessageHeader,
    type_id: i32,
    request_id: i64,
    failure: bool,
    result: Option<ResponseResult>,
}

impl Response {
    /// Creates an empty, successful Response with the given message type id.
    #[must_use]
    pub fn new(type_id: i32) -> Self {
        Self {
            header: MessageHeader::new(),
            type_id,
            request_id: 0,
            failure: false,
            result: None,
        }
    }

    /// Id of the request this Response answers.
    #[must_use]
    pub fn request_id(&self) -> i64 {
        self.request_id
    }

    /// Sets the id of the request this Response answers.
    pub fn set_request_id(&mut self, id: i64) {
        self.request_id = id;
    }

    /// Whether the request failed on the peer.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.failure
    }

    /// The carried outcome.
    #[must_use]
    pub fn result(&self) -> Option<&ResponseResult> {
        self.result.as_ref()
    }

    /// Marks the Response as failed with `error`.
    pub fn set_failure(&mut self, error: RemoteError) {
        self.failure = true;
        self.result = Some(ResponseResult::Error(error));
    }

    /// Stores an already serialized result value.
    pub fn set_value_bytes(&mut self, bytes: Vec<u8>) {
        self.failure = false;
        self.result = Some(ResponseResult::Value(bytes));
    }

    /// The serialized result value, if any.
    #[must_use]
    pub fn value_bytes(&self) -> Option<&[u8]> {
        match &self.result {
            Some(ResponseResult::Value(bytes)) => Some(bytes),
            _ => None,
        }
    }

    /// Serializes `value` with `serializer` and stores it as the result.
    pub fn set_value<T>(&mut self, serializer: &SerializerFormat, value: &T) -> Result<(), ExtendError>
    where
        T: Serialize + ?Sized,
    {
        self.set_value_bytes(serializer.serialize(value)?);
        Ok(())
    }

    /// Deserializes the result value with `serializer`.
    ///
    /// Returns `Ok(None)` if the Response carries no value.
    pub fn value<T>(&self, serializer: &SerializerFormat) -> Result<Option<T>, ExtendError>
    where
        T: DeserializeOwned,
    {
        self.value_bytes()
            .map(|bytes| serializer.deserialize(bytes))
            .transpose()
            .map_err(Into::into)
    }

    /// The error a failed Response reports to the requester.
    #[must_use]
    pub fn failure_cause(&self) -> ExtendError {
        let remote = match &self.result {
            Some(ResponseResult::Error(error)) => error.clone(),
            Some(ResponseResult::Value(bytes)) => RemoteError::new(
                "unknown",
                format!("received error: {} byte payload", bytes.len()),
            ),
            None => RemoteError::new("unknown", "received error without detail"),
        };
        ExtendError::Remote(remote)
    }
}

impl Message for Response {
    fn message_type(&self) -> i32 {
        self.type_id
    }

    fn header(&self) -> &MessageHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut MessageHeader {
        &mut self.header
    }

    fn read_external(&mut self, input: &mut FieldReader<'_>) -> Result<(), CodecError> {
        self.request_id = input.read_i64(PROP_REQUEST_ID)?.unwrap_or_default();
        self.failure = input.read_bool(PROP_FAILURE)?.unwrap_or_default();
        let value = input.read_bytes(PROP_VALUE)?;
        let kind = input.read_string(PROP_ERROR_KIND)?;
        let message = input.read_string(PROP_ERROR_MESSAGE)?;
        self.result = match (value, kind) {
            (Some(bytes), _) => Some(ResponseResult::Value(bytes)),
            (None, Some(kind)) => Some(ResponseResult::Error(RemoteError::new(
                kind,
                message.unwrap_or_default(),
            ))),
            (None, None) => None,
        };
        Ok(())
    }

    fn write_external(&self, output: &mut FieldWriter<'_>) -> Result<(), CodecError> {
        output.write_i64(PROP_REQUEST_ID, self.request_id)?;
        output.write_bool(PROP_FAILURE, self.failure)?;
        match &self.result {
            Some(ResponseResult::Value(bytes)) => output.write_bytes(PROP_VALUE, bytes),
            Some(ResponseResult::Error(error)) => {
                output.write_string(PROP_ERROR_KIND, error.kind())?;
                output.write_string(PROP_ERROR_MESSAGE, error.message())
            }
            None => Ok(()),
        }
    }

    fn as_response(&self) -> Option<&Response> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;
    use crate::protocol::MessageFactory;

    fn new_response() -> Box<dyn Message> {
        Box::new(Response::new(0))
    }

    fn factory() -> MessageFactory {
        MessageFactory::new("test", 1, 0, &[new_response]).unwrap()
    }

    #[test]
    fn test_value_round_trip_through_codec() {
        let serializer = SerializerFormat::json();
        let mut response = factory().create_response().unwrap();
        response.set_request_id(41);
        response.set_value(&serializer, "OK").unwrap();

        let bytes = Codec::new().encode_with(&serializer, &response).unwrap();
        let decoded = Codec::new()
            .decode_with(&factory(), &serializer, &bytes)
            .unwrap()
            .downcast::<Response>()
            .unwrap();

        assert_eq!(decoded.request_id(), 41);
        assert!(!decoded.is_failure());
        assert_eq!(
            decoded.value::<String>(&serializer).unwrap().as_deref(),
            Some("OK")
        );
    }

    #[test]
    fn test_failure_round_trip_through_codec() {
        let serializer = SerializerFormat::postcard();
        let mut response = Response::new(0);
        response.set_request_id(7);
        response.set_failure(RemoteError::new("illegal-state", "no such cache"));

        let bytes = Codec::new().encode_with(&serializer, &response).unwrap();
        let decoded = Codec::new()
            .decode_with(&factory(), &serializer, &bytes)
            .unwrap()
            .downcast::<Response>()
            .unwrap();

        assert!(decoded.is_failure());
        match decoded.failure_cause() {
            ExtendError::Remote(error) => {
                assert_eq!(error.kind(), "illegal-state");
                assert_eq!(error.message(), "no such cache");
            }
            other => panic!("unexpected cause {other:?}"),
        }
    }

    #[test]
    fn test_failure_with_value_payload_is_wrapped() {
        let mut response = Response::new(0);
        response.set_value_bytes(vec![1, 2, 3]);
        response.failure = true;
        assert!(
            response
                .failure_cause()
                .to_string()
                .contains("received error: 3 byte payload")
        );
    }

    #[test]
    fn test_empty_response_has_no_value() {
        let response = Response::new(0);
        assert_eq!(response.value::<i32>(&SerializerFormat::json()).unwrap(), None);
    }
}
