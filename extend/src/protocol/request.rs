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

//! Requests: messages that expect a [`Response`].

use crate::channel::{Channel, Status};
use crate::error::ExtendError;
use crate::protocol::{Message, MessageFactory, ProtocolError, Response};
use std::sync::Arc;
use std::time::Duration;

/// A message that is answered by exactly one [`Response`].
///
/// The sending side tracks the request through the [`Status`] attached to its
/// header; the receiving side executes [`process`](Self::process) and sends
/// the filled-in Response back with the same request id.
pub trait Request: Message {
    /// Request-specific header state.
    fn request_header(&self) -> &RequestHeader;

    /// Mutable request-specific header state.
    fn request_header_mut(&mut self) -> &mut RequestHeader;

    /// Executes the request on the receiving peer, filling in `response`.
    ///
    /// Returning an error marks the Response as failed and sends the error to
    /// the requester.
    fn process(&mut self, channel: &Arc<Channel>, response: &mut Response) -> Result<(), ExtendError>;

    /// Per-request timeout override. `None` uses the Channel default.
    fn request_timeout(&self) -> Option<Duration> {
        None
    }
}

/// Header state shared by every [`Request`].
#[derive(Debug, Default)]
pub struct RequestHeader {
    id: i64,
    status: Option<Arc<Status>>,
    response: Option<Response>,
}

impl RequestHeader {
    /// Creates an unregistered request header.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The request id, unique within the sending Channel.
    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    /// The Status tracking this request on the sending side.
    #[must_use]
    pub fn status(&self) -> Option<&Arc<Status>> {
        self.status.as_ref()
    }

    pub(crate) fn set_status(&mut self, status: Arc<Status>) {
        self.status = Some(status);
    }

    /// The Response produced while processing, if any.
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    /// Stores the Response to send back.
    pub fn set_response(&mut self, response: Response) {
        self.response = Some(response);
    }

    /// Removes and returns the stored Response.
    pub fn take_response(&mut self) -> Option<Response> {
        self.response.take()
    }

    /// Returns the stored Response, creating one from `factory` if needed.
    pub fn ensure_response(&mut self, factory: &MessageFactory) -> Result<&mut Response, ProtocolError> {
        if self.response.is_none() {
            self.response = Some(factory.create_response()?);
        }
        self.response
            .as_mut()
            .ok_or(ProtocolError::MissingField("response"))
    }
}

/// Processes `request` into its Response on `channel`.
pub(crate) fn run_request(request: &mut dyn Request, channel: &Arc<Channel>) -> Result<(), ExtendError> {
    let factory = channel.message_factory().ok_or_else(|| {
        ExtendError::illegal_state(format!("{} has no message factory", channel.id()))
    })?;
    let mut response = match request.request_header_mut().take_response() {
        Some(response) => response,
        None => factory.create_response()?,
    };
    let outcome = request.process(channel, &mut response);
    request.request_header_mut().set_response(response);
    outcome
}
