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

//! Echo service between two Peers joined by an in-memory link.
//!
//! The client opens a Channel to the server's `"echo"` receiver, sends a few
//! requests, pings the server and closes everything down again.
//!
//! Run it with logging:
//! ```bash
//! RUST_LOG=extend=debug cargo run --example echo
//! ```

use extend::codec::{CodecError, FieldReader, FieldWriter};
use extend::protocol::{
    Message, MessageCatalog, MessageConstructor, MessageHeader, Protocol, Request, RequestHeader,
    Response,
};
use extend::{Channel, ExtendError, MemoryTransport, Peer, PeerConfig, Receiver};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Asks the server to repeat `text`, shouting if requested.
#[derive(Debug, Default)]
struct Echo {
    header: MessageHeader,
    request: RequestHeader,
    text: String,
    shout: bool,
}

impl Echo {
    const TYPE_ID: i32 = 1;
}

impl Message for Echo {
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
        self.shout = input.read_bool(1)?.unwrap_or(false);
        Ok(())
    }

    fn write_external(&self, output: &mut FieldWriter<'_>) -> Result<(), CodecError> {
        output.write_string(0, &self.text)?;
        output.write_bool(1, self.shout)
    }

    fn as_request(&self) -> Option<&dyn Request> {
        Some(self)
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

impl Request for Echo {
    fn request_header(&self) -> &RequestHeader {
        &self.request
    }

    fn request_header_mut(&mut self) -> &mut RequestHeader {
        &mut self.request
    }

    fn process(&mut self, channel: &Arc<Channel>, response: &mut Response) -> Result<(), ExtendError> {
        if self.text.is_empty() {
            return Err(ExtendError::illegal_argument("nothing to echo"));
        }
        let reply = if self.shout {
            self.text.to_uppercase()
        } else {
            self.text.clone()
        };
        response.set_value(channel.require_serializer()?, &reply)
    }
}

fn new_response() -> Box<dyn Message> {
    Box::new(Response::new(0))
}

fn new_echo() -> Box<dyn Message> {
    Box::<Echo>::default()
}

struct EchoCatalog;

impl MessageCatalog for EchoCatalog {
    fn message_constructors(&self, version: i32) -> Option<Vec<MessageConstructor>> {
        (version == 1).then(|| vec![new_response as MessageConstructor, new_echo])
    }
}

fn echo_protocol() -> Result<Protocol, ExtendError> {
    Ok(Protocol::new("Echo", 1, 1, EchoCatalog)?)
}

/// Counts what it serves and lets each request answer itself.
struct EchoReceiver {
    protocol: Arc<Protocol>,
    served: AtomicU64,
}

impl Receiver for EchoReceiver {
    fn name(&self) -> &str {
        "echo"
    }

    fn protocol(&self) -> Arc<Protocol> {
        Arc::clone(&self.protocol)
    }

    fn register_channel(&self, channel: &Arc<Channel>) -> Result<(), ExtendError> {
        println!("server: channel {} opened", channel.id());
        Ok(())
    }

    fn on_channel_closed(&self, channel: &Arc<Channel>) -> Result<(), ExtendError> {
        println!(
            "server: channel {} closed after {} requests",
            channel.id(),
            self.served.load(Ordering::Relaxed)
        );
        Ok(())
    }

    fn on_message(&self, channel: &Arc<Channel>, message: &mut dyn Message) -> Result<(), ExtendError> {
        self.served.fetch_add(1, Ordering::Relaxed);
        message.dispatch(channel)
    }
}

fn echo(channel: &Arc<Channel>, text: &str, shout: bool) -> Result<Option<String>, ExtendError> {
    let mut request = channel.create::<Echo>(Echo::TYPE_ID)?;
    request.text = text.to_string();
    request.shout = shout;
    channel.request_value(request)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Echo Example ===\n");

    let server = Peer::acceptor(PeerConfig::new("echo-server"))?;
    let protocol = Arc::new(echo_protocol()?);
    server.register_receiver(Arc::new(EchoReceiver {
        protocol,
        served: AtomicU64::new(0),
    }))?;

    let client = Peer::initiator(
        PeerConfig::new("echo-client").with_request_timeout(Some(Duration::from_secs(5))),
    )?;
    client.register_protocol(echo_protocol()?)?;

    let (client_link, server_link) = MemoryTransport::pair();
    server.accept(server_link)?;
    let connection = client.connect(client_link)?;
    println!("client: connected as {} to peer {:?}", connection.id(), connection.peer_id());

    let channel = client.open_channel(&connection, "Echo", "echo", None, None)?;
    println!("client: opened channel {}", channel.id());

    for (text, shout) in [("hello", false), ("is anybody out there", true)] {
        let reply = echo(&channel, text, shout)?;
        println!("client: {text:?} -> {reply:?}");
    }

    match echo(&channel, "", false) {
        Err(error) if error.is_remote() => println!("client: server refused: {error}"),
        other => println!("client: unexpected outcome {other:?}"),
    }

    if client.ping(&connection)? {
        println!("client: ping sent");
    }
    println!(
        "client: sent {} messages, received {}",
        connection.stats().messages_sent(),
        connection.stats().messages_received()
    );

    channel.close()?;
    client.shutdown();
    server.shutdown();
    println!("\ndone");
    Ok(())
}
