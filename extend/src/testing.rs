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

//! Test fixtures shared by the unit tests.

use crate::channel::{Channel, ChannelId, Receiver};
use crate::codec::{CodecError, FieldReader, FieldWriter};
use crate::connection::{Connection, ConnectionError, ConnectionManager, Role};
use crate::error::ExtendError;
use crate::gate::Wait;
use crate::protocol::control::control_protocol;
use crate::protocol::{
    Message, MessageCatalog, MessageConstructor, MessageHeader, Protocol, Request, RequestHeader,
    Response,
};
use crate::serialization::SerializerFormat;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub(crate) const TEST_PROTOCOL: &str = "Test";

/// Request answered with its own text. The text `"fail"` makes processing
/// fail; `"panic"` makes it panic.
#[derive(Debug, Default)]
pub(crate) struct EchoRequest {
    header: MessageHeader,
    request: RequestHeader,
    pub text: String,
    pub timeout: Option<Duration>,
}

impl EchoRequest {
    pub const TYPE_ID: i32 = 1;
}

impl Message for EchoRequest {
    fn message_type(&self) -> i32 {
        Self::TYPE_ID
    }

    fn header(&self) -> &MessageHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut MessageHeader {
        &mut self.header
    }

    fn read_external(&mut self, input: &mut FieldReader<'_>) -> Result<(), CodecError> {
        self.text = input.read_string(0)?.unwrap_or_default();
        Ok(())
    }

    fn write_external(&self, output: &mut FieldWriter<'_>) -> Result<(), CodecError> {
        output.write_string(0, &self.text)
    }

    fn as_request(&self) -> Option<&dyn Request> {
        Some(self)
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

impl Request for EchoRequest {
    fn request_header(&self) -> &RequestHeader {
        &self.request
    }

    fn request_header_mut(&mut self) -> &mut RequestHeader {
        &mut self.request
    }

    fn process(&mut self, channel: &Arc<Channel>, response: &mut Response) -> Result<(), ExtendError> {
        match self.text.as_str() {
            "fail" => Err(ExtendError::illegal_argument("asked to fail")),
            "panic" => panic!("asked to panic"),
            text => response.set_value(channel.require_serializer()?, &text),
        }
    }

    fn request_timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Unsolicited message that records its text as the `"notice"` attribute
/// of the Channel it runs on.
#[derive(Debug, Default)]
pub(crate) struct Notice {
    header: MessageHeader,
    pub text: String,
}

impl Notice {
    pub const TYPE_ID: i32 = 2;
}

impl Message for Notice {
    fn message_type(&self) -> i32 {
        Self::TYPE_ID
    }

    fn header(&self) -> &MessageHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut MessageHeader {
        &mut self.header
    }

    fn read_external(&mut self, input: &mut FieldReader<'_>) -> Result<(), CodecError> {
        self.text = input.read_string(0)?.unwrap_or_default();
        Ok(())
    }

    fn write_external(&self, output: &mut FieldWriter<'_>) -> Result<(), CodecError> {
        output.write_string(0, &self.text)
    }

    fn run(&mut self, channel: &Arc<Channel>) -> Result<(), ExtendError> {
        if self.text == "fail" {
            return Err(ExtendError::illegal_state("notice failed"));
        }
        channel.set_attribute("notice", Arc::new(self.text.clone()));
        Ok(())
    }
}

pub(crate) fn new_test_response() -> Box<dyn Message> {
    Box::new(Response::new(0))
}

pub(crate) fn new_echo_request() -> Box<dyn Message> {
    Box::<EchoRequest>::default()
}

pub(crate) fn new_notice() -> Box<dyn Message> {
    Box::<Notice>::default()
}

struct TestCatalog;

impl MessageCatalog for TestCatalog {
    fn message_constructors(&self, version: i32) -> Option<Vec<MessageConstructor>> {
        match version {
            1 => Some(vec![new_test_response, new_echo_request]),
            2 => Some(vec![new_test_response, new_echo_request, new_notice]),
            _ => None,
        }
    }
}

/// Protocol `"Test"` with versions 1 and 2; [`Notice`] exists from version 2.
pub(crate) fn test_protocol() -> Protocol {
    test_protocol_versions(2, 1)
}

/// Protocol `"Test"` restricted to `supported..=current`.
pub(crate) fn test_protocol_versions(current: i32, supported: i32) -> Protocol {
    Protocol::new(TEST_PROTOCOL, current, supported, TestCatalog).unwrap()
}

/// Receiver of the test protocol that lets messages run themselves and
/// remembers the Channels attached to it.
pub(crate) struct TestReceiver {
    name: String,
    protocol: Arc<Protocol>,
    channels: Mutex<Vec<Arc<Channel>>>,
}

impl TestReceiver {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            protocol: Arc::new(test_protocol()),
            channels: Mutex::new(Vec::new()),
        })
    }

    pub fn channels(&self) -> Vec<Arc<Channel>> {
        self.channels.lock().clone()
    }
}

impl Receiver for TestReceiver {
    fn name(&self) -> &str {
        &self.name
    }

    fn protocol(&self) -> Arc<Protocol> {
        Arc::clone(&self.protocol)
    }

    fn register_channel(&self, channel: &Arc<Channel>) -> Result<(), ExtendError> {
        self.channels.lock().push(Arc::clone(channel));
        Ok(())
    }

    fn on_message(&self, channel: &Arc<Channel>, message: &mut dyn Message) -> Result<(), ExtendError> {
        message.dispatch(channel)
    }
}

/// Polls `condition` until it holds or `within` elapses.
pub(crate) fn eventually(within: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + within;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// A [`ConnectionManager`] that records what passes through it.
///
/// Posted messages are kept instead of being written anywhere. Closes handed
/// to the manager run inline on the calling thread.
pub(crate) struct TestManager {
    role: Role,
    control: Arc<Protocol>,
    service: AtomicBool,
    strict_service: AtomicBool,
    failing_posts: AtomicBool,
    timeout: Mutex<Option<Duration>>,
    posted: Mutex<Vec<(ChannelId, Box<dyn Message>)>>,
    opened: Mutex<Vec<ChannelId>>,
    closed: Mutex<Vec<ChannelId>>,
    connection_events: Mutex<Vec<Option<String>>>,
}

impl TestManager {
    pub fn new(role: Role) -> Arc<Self> {
        Arc::new(Self {
            role,
            control: Arc::new(control_protocol().unwrap()),
            service: AtomicBool::new(true),
            strict_service: AtomicBool::new(false),
            failing_posts: AtomicBool::new(false),
            timeout: Mutex::new(Some(Duration::from_secs(5))),
            posted: Mutex::new(Vec::new()),
            opened: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
            connection_events: Mutex::new(Vec::new()),
        })
    }

    /// Whether every thread counts as the service thread.
    pub fn set_service_thread(&self, service: bool) {
        self.service.store(service, Ordering::SeqCst);
    }

    /// Whether every thread counts as the service thread in strict checks.
    pub fn set_strict_service_thread(&self, service: bool) {
        self.strict_service.store(service, Ordering::SeqCst);
    }

    /// Makes every post fail as if the link were gone.
    pub fn set_failing_posts(&self, failing: bool) {
        self.failing_posts.store(failing, Ordering::SeqCst);
    }

    pub fn set_request_timeout(&self, timeout: Option<Duration>) {
        *self.timeout.lock() = timeout;
    }

    pub fn take_posted(&self) -> Vec<(ChannelId, Box<dyn Message>)> {
        std::mem::take(&mut *self.posted.lock())
    }

    pub fn posted_count(&self) -> usize {
        self.posted.lock().len()
    }

    /// Waits for a posted message on `channel` and removes it.
    pub fn wait_posted(&self, channel: ChannelId, within: Duration) -> Option<Box<dyn Message>> {
        let deadline = Instant::now() + within;
        loop {
            {
                let mut posted = self.posted.lock();
                if let Some(index) = posted.iter().position(|(id, _)| *id == channel) {
                    return Some(posted.remove(index).1);
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    pub fn opened(&self) -> Vec<ChannelId> {
        self.opened.lock().clone()
    }

    pub fn closed(&self) -> Vec<ChannelId> {
        self.closed.lock().clone()
    }

    /// One entry per Connection close: `None` when clean, the error kind
    /// otherwise.
    pub fn connection_events(&self) -> Vec<Option<String>> {
        self.connection_events.lock().clone()
    }
}

impl ConnectionManager for TestManager {
    fn role(&self) -> Role {
        self.role
    }

    fn service_name(&self) -> &str {
        "test"
    }

    fn control_protocol(&self) -> Arc<Protocol> {
        Arc::clone(&self.control)
    }

    fn control_receiver(&self) -> Option<Arc<dyn Receiver>> {
        None
    }

    fn ensure_serializer(&self) -> SerializerFormat {
        SerializerFormat::json()
    }

    fn request_timeout(&self) -> Option<Duration> {
        *self.timeout.lock()
    }

    fn is_service_thread(&self, strict: bool) -> bool {
        if strict {
            self.strict_service.load(Ordering::SeqCst)
        } else {
            self.service.load(Ordering::SeqCst)
        }
    }

    fn post(&self, channel: &Arc<Channel>, message: Box<dyn Message>) -> Result<(), ExtendError> {
        if self.failing_posts.load(Ordering::SeqCst) {
            return Err(ConnectionError::Transport {
                connection_id: channel.connection_id(),
                message: "link is down".to_string(),
            }
            .into());
        }
        self.posted.lock().push((channel.id(), message));
        Ok(())
    }

    fn close_channel(
        &self,
        channel: &Arc<Channel>,
        notify: bool,
        cause: Option<ExtendError>,
        _wait: bool,
    ) -> Result<(), ExtendError> {
        channel.close_internal(notify, cause, Wait::Immediate);
        Ok(())
    }

    fn close_connection(
        &self,
        connection: &Arc<Connection>,
        notify: bool,
        cause: Option<ExtendError>,
        _wait: bool,
    ) -> Result<(), ExtendError> {
        connection.close_internal(notify, cause, Wait::Immediate);
        Ok(())
    }

    fn on_channel_opened(&self, channel: &Arc<Channel>) {
        self.opened.lock().push(channel.id());
    }

    fn on_channel_closed(&self, channel: &Arc<Channel>) {
        self.closed.lock().push(channel.id());
    }

    fn on_connection_closed(&self, _connection: &Arc<Connection>) {
        self.connection_events.lock().push(None);
    }

    fn on_connection_error(&self, _connection: &Arc<Connection>, cause: &ExtendError) {
        self.connection_events
            .lock()
            .push(Some(cause.kind().to_string()));
    }
}

/// An open Connection owned by a fresh [`TestManager`], with the test
/// protocol at `version` installed.
pub(crate) fn open_connection(role: Role, version: i32) -> (Arc<TestManager>, Arc<Connection>) {
    let manager = TestManager::new(role);
    let dyn_manager: Arc<dyn ConnectionManager> = manager.clone();
    let connection = Connection::new(&dyn_manager);
    connection.open_internal().unwrap();
    connection.set_message_factory(test_protocol().message_factory(version).unwrap());
    (manager, connection)
}

/// Opens a live Channel speaking the test protocol.
pub(crate) fn open_channel(connection: &Arc<Connection>) -> Arc<Channel> {
    let id = connection
        .open_channel_request(TEST_PROTOCOL, SerializerFormat::json(), None, None, None)
        .unwrap();
    connection.channel(id).unwrap()
}

/// Builds the Response `channel` would receive for an echo of `request`.
pub(crate) fn echo_response(channel: &Arc<Channel>, request: &dyn Message) -> Box<dyn Message> {
    let request = request.downcast_ref::<EchoRequest>().unwrap();
    let mut response = channel.message_factory().unwrap().create_response().unwrap();
    response.set_request_id(request.request_header().id());
    response
        .set_value(channel.serializer().unwrap(), &request.text)
        .unwrap();
    Box::new(response)
}
