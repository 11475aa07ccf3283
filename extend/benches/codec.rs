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

//! Codec and round-trip benchmarks
//!
//! Measures:
//! - Encoding and decoding of a request at several payload sizes
//! - Each payload serializer
//! - Request/response round trips between two Peers over an in-memory link

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use extend::codec::{Codec, CodecError, FieldReader, FieldWriter};
use extend::protocol::{
    Message, MessageCatalog, MessageConstructor, MessageHeader, Protocol, Request, RequestHeader,
    Response,
};
use extend::{
    Channel, ExtendError, MemoryTransport, Peer, PeerConfig, Receiver, Serializer, SerializerFormat,
};
use std::hint::black_box;
use std::sync::Arc;

const PROTOCOL: &str = "Bench";

/// Request carrying an opaque payload, answered with its length.
#[derive(Debug, Default)]
struct Blob {
    header: MessageHeader,
    request: RequestHeader,
    label: String,
    data: Vec<u8>,
}

impl Blob {
    const TYPE_ID: i32 = 1;
}

impl Message for Blob {
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
        self.label = input.read_string(0)?.unwrap_or_default();
        self.data = input.read_bytes(1)?.unwrap_or_default();
        Ok(())
    }

    fn write_external(&self, output: &mut FieldWriter<'_>) -> Result<(), CodecError> {
        output.write_string(0, &self.label)?;
        output.write_bytes(1, &self.data)
    }

    fn as_request(&self) -> Option<&dyn Request> {
        Some(self)
    }

    fn as_request_mut(&mut self) -> Option<&mut dyn Request> {
        Some(self)
    }
}

impl Request for Blob {
    fn request_header(&self) -> &RequestHeader {
        &self.request
    }

    fn request_header_mut(&mut self) -> &mut RequestHeader {
        &mut self.request
    }

    fn process(&mut self, channel: &Arc<Channel>, response: &mut Response) -> Result<(), ExtendError> {
        response.set_value(channel.require_serializer()?, &(self.data.len() as i64))
    }
}

fn new_response() -> Box<dyn Message> {
    Box::new(Response::new(0))
}

fn new_blob() -> Box<dyn Message> {
    Box::<Blob>::default()
}

struct BenchCatalog;

impl MessageCatalog for BenchCatalog {
    fn message_constructors(&self, version: i32) -> Option<Vec<MessageConstructor>> {
        (version == 1).then(|| vec![new_response as MessageConstructor, new_blob])
    }
}

fn bench_protocol() -> Protocol {
    Protocol::new(PROTOCOL, 1, 1, BenchCatalog).unwrap()
}

struct Sink {
    protocol: Arc<Protocol>,
}

impl Receiver for Sink {
    fn name(&self) -> &str {
        "sink"
    }

    fn protocol(&self) -> Arc<Protocol> {
        Arc::clone(&self.protocol)
    }

    fn on_message(&self, channel: &Arc<Channel>, message: &mut dyn Message) -> Result<(), ExtendError> {
        message.dispatch(channel)
    }
}

fn blob(size: usize) -> Box<Blob> {
    let factory = bench_protocol().message_factory(1).unwrap();
    let mut blob = factory.create::<Blob>(Blob::TYPE_ID).unwrap();
    blob.label = "payload".to_string();
    blob.data = vec![0xA5; size];
    blob
}

/// Benchmark encoding a request
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_encode");
    let codec = Codec::new();
    let json = SerializerFormat::json();

    for size in [64usize, 1024, 16 * 1024] {
        let message = blob(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &message, |b, message| {
            b.iter(|| codec.encode_with(&json, black_box(message.as_ref())).unwrap());
        });
    }

    group.finish();
}

/// Benchmark decoding a request with each serializer
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_decode");
    let codec = Codec::new();
    let factory = bench_protocol().message_factory(1).unwrap();

    for serializer in [SerializerFormat::json(), SerializerFormat::postcard()] {
        for size in [64usize, 1024, 16 * 1024] {
            let bytes = codec.encode_with(&serializer, blob(size).as_ref()).unwrap();
            group.throughput(Throughput::Bytes(bytes.len() as u64));
            group.bench_with_input(
                BenchmarkId::new(serializer.name(), size),
                &bytes,
                |b, bytes| {
                    b.iter(|| {
                        codec
                            .decode_with(&factory, &serializer, black_box(bytes))
                            .unwrap()
                    });
                },
            );
        }
    }

    group.finish();
}

/// Benchmark request/response round trips between two Peers
fn bench_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip");

    let server = Peer::acceptor(PeerConfig::new("bench-server")).unwrap();
    let protocol = server.register_protocol(bench_protocol()).unwrap();
    server.register_receiver(Arc::new(Sink { protocol })).unwrap();
    let client = Peer::initiator(PeerConfig::new("bench-client")).unwrap();
    client.register_protocol(bench_protocol()).unwrap();

    let (client_link, server_link) = MemoryTransport::pair();
    server.accept(server_link).unwrap();
    let connection = client.connect(client_link).unwrap();
    let channel = client
        .open_channel(&connection, PROTOCOL, "sink", None, None)
        .unwrap();

    for size in [64usize, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let mut request = channel.create::<Blob>(Blob::TYPE_ID).unwrap();
                request.data = vec![0; size];
                let length: Option<i64> = channel.request_value(request).unwrap();
                black_box(length)
            });
        });
    }

    group.finish();
    client.shutdown();
    server.shutdown();
}

criterion_group!(benches, bench_encode, bench_decode, bench_round_trip);
criterion_main!(benches);
