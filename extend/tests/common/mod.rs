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

//! Shared fixtures for the integration tests: a small key-value protocol and
//! a pair of connected Peers.

#![allow(dead_code)]

use extend::codec::{CodecError, FieldReader, FieldWriter};
use extend::protocol::{
    Message, MessageCatalog, MessageConstructor, MessageHeader, Protocol, Request, RequestHeader,
    Response,
};
use extend::{Channel, Connection, ExtendError, MemoryTransport, Peer, PeerConfig, Receiver};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

pub const LEDGER: &str = "Ledger";
pub const WITHIN: Duration = Duration::from_secs(2);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Stores a value. Replies `true` when an older value was replaced.
#[derive(Debug, Default)]
pub struct Put {
    header: MessageHeader,
    request: RequestHeader,
    pub key: String,
    pub value: String,
}

impl Put {
    pub const TYPE_ID: i32 = 1;
}

impl Message for Put {
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
        self.key = input.read_string(0)?.unwrap_or_default();
        self.value = input.read_string(1)?.unwrap_or_default();
        Ok(())
    }

    fn write_external(&self, output: &mut FieldWriter<'_>) -> Result<(), CodecError> {
        output.write_string(0, &self.key)?;
        output.write_string(1, &self.value)
    }

    fn as_request(&self) -> Option<&dyn Request> {
        Some(self)
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

impl Request for Put {
    fn request_header(&self) -> &RequestHeader {
        &self.request
    }

    fn request_header_mut(&mut self) -> &mut RequestHeader {
        &mut self.request
    }

    fn process(&mut self, _channel: &Arc<Channel>, _response: &mut Response) -> Result<(), ExtendError> {
        Err(ExtendError::illegal_state("puts need a ledger receiver"))
    }
}

/// Reads a value. Replies with no value when the key is unknown.
#[derive(Debug, Default)]
pub struct Get {
    header: MessageHeader,
    request: RequestHeader,
    pub key: String,
}

impl Get {
    pub const TYPE_ID: i32 = 2;
}

impl Message for Get {
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
        self.key = input.read_string(0)?.unwrap_or_default();
        Ok(())
    }

    fn write_external(&self, output: &mut FieldWriter<'_>) -> Result<(), CodecError> {
        output.write_string(0, &self.key)
    }

    fn as_request(&self) -> Option<&dyn Request> {
        Some(self)
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

impl Request for Get {
    fn request_header(&self) -> &RequestHeader {
        &self.request
    }

    fn request_header_mut(&mut self) -> &mut RequestHeader {
        &mut self.request
    }

    fn process(&mut self, _channel: &Arc<Channel>, _response: &mut Response) -> Result<(), ExtendError> {
        Err(ExtendError::illegal_state("gets need a ledger receiver"))
    }
}

/// Holds the receiving thread for `millis`, then echoes `millis`.
#[derive(Debug, Default)]
pub struct Sleep {
    header: MessageHeader,
    request: RequestHeader,
    pub millis: i64,
    pub timeout: Option<Duration>,
}

impl Sleep {
    pub const TYPE_ID: i32 = 3;
}

impl Message for Sleep {
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
        self.millis = input.read_i64(0)?.unwrap_or_default();
        Ok(())
    }

    fn write_external(&self, output: &mut FieldWriter<'_>) -> Result<(), CodecError> {
        output.write_i64(0, self.millis)
    }

    fn as_request(&self) -> Option<&dyn Request> {
        Some(self)
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

impl Request for Sleep {
    fn request_header(&self) -> &RequestHeader {
        &self.request
    }

    fn request_header_mut(&mut self) -> &mut RequestHeader {
        &mut self.request
    }

    fn process(&mut self, channel: &Arc<Channel>, response: &mut Response) -> Result<(), ExtendError> {
        std::thread::sleep(Duration::from_millis(self.millis.max(0) as u64));
        response.set_value(channel.require_serializer()?, &self.millis)
    }

    fn request_timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// One-way notice, available from version 2. The text `"boom"` fails.
#[derive(Debug, Default)]
pub struct Announce {
    header: MessageHeader,
    pub text: String,
}

impl Announce {
    pub const TYPE_ID: i32 = 4;
}

impl Message for Announce {
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
        if self.text == "boom" {
            return Err(ExtendError::illegal_state("announcement exploded"));
        }
        channel.set_attribute("announce", Arc::new(self.text.clone()));
        Ok(())
    }
}

fn new_response() -> Box<dyn Message> {
    Box::new(Response::new(0))
}

fn new_put() -> Box<dyn Message> {
    Box::<Put>::default()
}

fn new_get() -> Box<dyn Message> {
    Box::<Get>::default()
}

fn new_sleep() -> Box<dyn Message> {
    Box::<Sleep>::default()
}

fn new_announce() -> Box<dyn Message> {
    Box::<Announce>::default()
}

struct LedgerCatalog;

impl MessageCatalog for LedgerCatalog {
    fn message_constructors(&self, version: i32) -> Option<Vec<MessageConstructor>> {
        let mut constructors: Vec<MessageConstructor> = vec![new_response, new_put, new_get, new_sleep];
        match version {
            1 => Some(constructors),
            2 => {
                constructors.push(new_announce);
                Some(constructors)
            }
            _ => None,
        }
    }
}

/// The ledger protocol at versions `supported..=current`.
pub fn ledger_protocol(current: i32, supported: i32) -> Protocol {
    Protocol::new(LEDGER, current, supported, LedgerCatalog).unwrap()
}

/// Answers puts and gets from an in-memory map and lets everything else run
/// itself.
pub struct LedgerReceiver {
    name: String,
    protocol: Arc<Protocol>,
    entries: Mutex<BTreeMap<String, String>>,
    channels: Mutex<Vec<Arc<Channel>>>,
    closed: Mutex<Vec<Arc<Channel>>>,
}

impl LedgerReceiver {
    pub fn new(name: &str, protocol: Protocol) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            protocol: Arc::new(protocol),
            entries: Mutex::new(BTreeMap::new()),
            channels: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
        })
    }

    pub fn channels(&self) -> Vec<Arc<Channel>> {
        self.channels.lock().clone()
    }

    pub fn closed(&self) -> Vec<Arc<Channel>> {
        self.closed.lock().clone()
    }

    pub fn entry(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }
}

fn reply<T: serde::Serialize>(
    channel: &Arc<Channel>,
    request: &mut dyn Request,
    value: &T,
) -> Result<(), ExtendError> {
    let factory = channel
        .message_factory()
        .ok_or_else(|| ExtendError::illegal_state("channel has no factory"))?;
    request
        .request_header_mut()
        .ensure_response(&factory)?
        .set_value(channel.require_serializer()?, value)
}

impl Receiver for LedgerReceiver {
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

    fn on_channel_closed(&self, channel: &Arc<Channel>) -> Result<(), ExtendError> {
        self.closed.lock().push(Arc::clone(channel));
        Ok(())
    }

    fn on_message(&self, channel: &Arc<Channel>, message: &mut dyn Message) -> Result<(), ExtendError> {
        if let Some(put) = message.downcast_mut::<Put>() {
            if put.key.is_empty() {
                return Err(ExtendError::illegal_argument("empty key"));
            }
            let replaced = self
                .entries
                .lock()
                .insert(put.key.clone(), put.value.clone())
                .is_some();
            return reply(channel, put, &replaced);
        }
        if let Some(get) = message.downcast_mut::<Get>() {
            return match self.entry(&get.key) {
                Some(value) => reply(channel, get, &value),
                None => Ok(()),
            };
        }
        message.dispatch(channel)
    }
}

/// Two Peers joined by an in-memory link, the server exposing a
/// [`LedgerReceiver`] named `"ledger"`.
pub struct Pair {
    pub server: Arc<Peer>,
    pub client: Arc<Peer>,
    pub server_connection: Arc<Connection>,
    pub client_connection: Arc<Connection>,
    pub ledger: Arc<LedgerReceiver>,
}

impl Pair {
    pub fn new() -> Self {
        Self::with_versions((2, 1), (2, 1))
    }

    /// A pair whose server and client speak the ledger protocol at the given
    /// `(current, supported)` ranges.
    pub fn with_versions(server: (i32, i32), client: (i32, i32)) -> Self {
        init_tracing();
        let server_peer = Peer::acceptor(config("server")).unwrap();
        let ledger = LedgerReceiver::new("ledger", ledger_protocol(server.0, server.1));
        server_peer.register_receiver(ledger.clone()).unwrap();

        let client_peer = Peer::initiator(config("client")).unwrap();
        client_peer
            .register_protocol(ledger_protocol(client.0, client.1))
            .unwrap();
        Self::join(server_peer, client_peer, ledger)
    }

    fn join(server: Arc<Peer>, client: Arc<Peer>, ledger: Arc<LedgerReceiver>) -> Self {
        let (client_link, server_link) = MemoryTransport::pair();
        let server_connection = server.accept(server_link).unwrap();
        let client_connection = client.connect(client_link).unwrap();
        Self {
            server,
            client,
            server_connection,
            client_connection,
            ledger,
        }
    }

    /// Opens a Channel from the client to the server's ledger.
    pub fn open_ledger(&self) -> Arc<Channel> {
        self.client
            .open_channel(&self.client_connection, LEDGER, "ledger", None, None)
            .unwrap()
    }
}

impl Drop for Pair {
    fn drop(&mut self) {
        self.client.shutdown();
        self.server.shutdown();
    }
}

pub fn config(name: &str) -> PeerConfig {
    PeerConfig::new(name)
        .with_connect_timeout(WITHIN)
        .with_request_timeout(Some(WITHIN))
}

pub fn put(channel: &Arc<Channel>, key: &str, value: &str) -> Result<Option<bool>, ExtendError> {
    let mut request = channel.create::<Put>(Put::TYPE_ID)?;
    request.key = key.to_string();
    request.value = value.to_string();
    channel.request_value(request)
}

pub fn get(channel: &Arc<Channel>, key: &str) -> Result<Option<String>, ExtendError> {
    let mut request = channel.create::<Get>(Get::TYPE_ID)?;
    request.key = key.to_string();
    channel.request_value(request)
}

pub fn sleep_request(channel: &Arc<Channel>, millis: i64) -> Box<Sleep> {
    let mut request = channel.create::<Sleep>(Sleep::TYPE_ID).unwrap();
    request.millis = millis;
    request
}

/// Polls `condition` until it holds or `within` elapses.
pub fn eventually(within: Duration, condition: impl Fn() -> bool) -> bool {
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
