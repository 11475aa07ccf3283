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

//! Tests for Channel request correlation, dispatch and close.

use super::*;
use crate::connection::{ConnectionError, Role};
use crate::error::{ExtendError, RemoteError};
use crate::gate::Wait;
use crate::protocol::control::{ControlMessageType, PingRequest};
use crate::protocol::{Message, Protocol, ProtocolError, Request, Response};
use crate::serialization::SerializerFormat;
use crate::testing::{
    EchoRequest, Notice, TEST_PROTOCOL, TestManager, echo_response, open_channel,
    open_connection, test_protocol,
};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

fn echo(channel: &Arc<Channel>, text: &str) -> Box<EchoRequest> {
    let mut request = channel.create::<EchoRequest>(EchoRequest::TYPE_ID).unwrap();
    request.text = text.to_string();
    request
}

fn inbound_echo(channel: &Arc<Channel>, id: i64, text: &str) -> Box<dyn Message> {
    let mut request = echo(channel, text);
    request.request_header_mut().set_id(id);
    request
}

fn posted_response(manager: &TestManager, channel: ChannelId) -> Response {
    let message = manager.wait_posted(channel, Duration::from_secs(1)).unwrap();
    message.as_response().cloned().unwrap()
}

#[test]
fn test_request_ids_are_sequential() {
    let (manager, connection) = open_connection(Role::Initiator, 1);
    let channel = open_channel(&connection);

    let first = channel.send_request(echo(&channel, "a")).unwrap();
    let second = channel.send_request(echo(&channel, "b")).unwrap();
    assert_eq!(first.request_id(), 1);
    assert_eq!(second.request_id(), 2);
    assert_eq!(channel.pending_request_count(), 2);

    let posted = manager.take_posted();
    assert_eq!(posted.len(), 2);
    assert!(posted.iter().all(|(id, _)| *id == channel.id()));
}

#[test]
fn test_response_resolves_status() {
    let (manager, connection) = open_connection(Role::Initiator, 1);
    let channel = open_channel(&connection);

    let status = channel.send_request(echo(&channel, "OK")).unwrap();
    let request = manager.wait_posted(channel.id(), Duration::from_secs(1)).unwrap();
    channel.receive(echo_response(&channel, request.as_ref()));

    let response = status.wait_for_response(Some(Duration::from_secs(1))).unwrap();
    let value: Option<String> = response.value(channel.require_serializer().unwrap()).unwrap();
    assert_eq!(value.as_deref(), Some("OK"));
    assert!(!channel.has_pending_request(status.request_id()));
}

#[test]
fn test_blocking_request() {
    let (manager, connection) = open_connection(Role::Initiator, 1);
    let channel = open_channel(&connection);

    let responder = {
        let manager = manager.clone();
        let channel = channel.clone();
        thread::spawn(move || {
            let request = manager.wait_posted(channel.id(), Duration::from_secs(2)).unwrap();
            channel.receive(echo_response(&channel, request.as_ref()));
        })
    };

    let value: Option<String> = channel.request_value(echo(&channel, "OK")).unwrap();
    responder.join().unwrap();
    assert_eq!(value.as_deref(), Some("OK"));
    assert_eq!(channel.pending_request_count(), 0);
}

#[test]
fn test_request_times_out() {
    let (_manager, connection) = open_connection(Role::Initiator, 1);
    let channel = open_channel(&connection);

    let started = Instant::now();
    let error = channel
        .request_timeout(echo(&channel, "lost"), Duration::from_millis(50))
        .unwrap_err();
    assert!(error.is_timeout());
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(!channel.has_pending_request(1));
}

#[test]
fn test_request_timeout_override() {
    let (manager, connection) = open_connection(Role::Initiator, 1);
    manager.set_request_timeout(None);
    let channel = open_channel(&connection);

    let mut request = echo(&channel, "lost");
    request.timeout = Some(Duration::from_millis(20));
    let status = channel.send_request(request).unwrap();
    assert_eq!(status.default_timeout(), Some(Duration::from_millis(20)));
    assert!(status.wait_for_response(None).unwrap_err().is_timeout());
}

#[test]
fn test_request_rejected_on_service_thread() {
    let (manager, connection) = open_connection(Role::Initiator, 1);
    manager.set_strict_service_thread(true);
    let channel = open_channel(&connection);

    let error = channel.request(echo(&channel, "x")).unwrap_err();
    assert!(matches!(error, ExtendError::IllegalState(_)));
    assert_eq!(manager.posted_count(), 0);
}

#[test]
fn test_remote_failure_is_returned() {
    let (manager, connection) = open_connection(Role::Initiator, 1);
    let channel = open_channel(&connection);

    let status = channel.send_request(echo(&channel, "x")).unwrap();
    manager.take_posted();
    let mut response = channel.message_factory().unwrap().create_response().unwrap();
    response.set_request_id(status.request_id());
    response.set_failure(RemoteError::new("illegal-argument", "bad input"));
    channel.receive(Box::new(response));

    match status.wait_for_response(Some(Duration::from_secs(1))) {
        Err(ExtendError::Remote(error)) => {
            assert_eq!(error.kind(), "illegal-argument");
            assert_eq!(error.message(), "bad input");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(status.is_cancelled());
}

#[test]
fn test_status_resolves_once() {
    let (manager, connection) = open_connection(Role::Initiator, 1);
    let channel = open_channel(&connection);
    let factory = channel.message_factory().unwrap();

    let cancelled = channel.send_request(echo(&channel, "first")).unwrap();
    assert!(cancelled.cancel(ExtendError::illegal_state("gone")));
    assert!(!cancelled.set_response(factory.create_response().unwrap()));
    assert!(cancelled.is_cancelled());
    assert!(matches!(
        cancelled.wait_for_response(Some(Duration::ZERO)),
        Err(ExtendError::IllegalState(_))
    ));

    let answered = channel.send_request(echo(&channel, "second")).unwrap();
    assert!(answered.set_response(factory.create_response().unwrap()));
    assert!(!answered.cancel(ExtendError::illegal_state("late")));
    assert!(!answered.is_cancelled());
    assert!(answered.wait_for_response(Some(Duration::ZERO)).is_ok());

    let expired = channel.send_request(echo(&channel, "third")).unwrap();
    assert!(expired.wait_for_response(Some(Duration::ZERO)).unwrap_err().is_timeout());
    assert!(!expired.set_response(factory.create_response().unwrap()));
    assert!(expired.is_cancelled());
    assert!(expired.try_response().unwrap().unwrap_err().is_timeout());

    assert_eq!(channel.pending_request_count(), 0);
    manager.take_posted();
}

#[test]
fn test_unsolicited_response_is_ignored() {
    let (manager, connection) = open_connection(Role::Initiator, 1);
    let channel = open_channel(&connection);

    let mut response = channel.message_factory().unwrap().create_response().unwrap();
    response.set_request_id(99);
    channel.receive(Box::new(response));

    assert!(channel.is_open());
    assert_eq!(manager.posted_count(), 0);
}

#[test]
fn test_inbound_request_is_answered() {
    let (manager, connection) = open_connection(Role::Acceptor, 1);
    let channel = open_channel(&connection);

    channel.receive(inbound_echo(&channel, 7, "hello"));

    let response = posted_response(&manager, channel.id());
    assert_eq!(response.request_id(), 7);
    assert!(!response.is_failure());
    let value: Option<String> = response.value(channel.require_serializer().unwrap()).unwrap();
    assert_eq!(value.as_deref(), Some("hello"));
}

#[test]
fn test_failed_inbound_request_returns_failure() {
    let (manager, connection) = open_connection(Role::Acceptor, 1);
    let channel = open_channel(&connection);

    channel.receive(inbound_echo(&channel, 3, "fail"));

    let response = posted_response(&manager, channel.id());
    assert_eq!(response.request_id(), 3);
    assert!(response.is_failure());
    assert!(matches!(
        response.failure_cause(),
        ExtendError::Remote(error) if error.kind() == "illegal-argument"
    ));
    assert!(channel.is_open());
}

#[test]
fn test_unsendable_reply_closes_channel() {
    let (manager, connection) = open_connection(Role::Acceptor, 1);
    let channel = open_channel(&connection);
    manager.set_failing_posts(true);

    channel.receive(inbound_echo(&channel, 7, "hello"));

    assert!(channel.is_closed());
    assert!(connection.channel(channel.id()).is_none());
    assert_eq!(manager.closed(), vec![channel.id()]);
    assert!(connection.is_open());
}

#[test]
fn test_unsendable_control_reply_closes_connection() {
    let (manager, connection) = open_connection(Role::Acceptor, 1);
    let channel = open_channel(&connection);
    let control = connection.control_channel();
    manager.set_failing_posts(true);

    let mut ping = control
        .create::<PingRequest>(ControlMessageType::PingRequest.type_id())
        .unwrap();
    ping.request_header_mut().set_id(11);
    control.receive(ping);

    assert!(connection.is_closed());
    assert!(channel.is_closed());
    assert_eq!(manager.connection_events().len(), 1);
}

#[test]
fn test_unsolicited_message_runs() {
    let (_manager, connection) = open_connection(Role::Acceptor, 2);
    let channel = open_channel(&connection);

    let mut notice = channel.create::<Notice>(Notice::TYPE_ID).unwrap();
    notice.text = "heads up".to_string();
    channel.receive(notice);

    let stored = channel.attribute("notice").unwrap();
    assert_eq!(stored.downcast_ref::<String>().map(String::as_str), Some("heads up"));
}

#[test]
fn test_failing_message_closes_channel() {
    let (manager, connection) = open_connection(Role::Acceptor, 2);
    let channel = open_channel(&connection);
    let status = channel.send_request(echo(&channel, "pending")).unwrap();

    let mut notice = channel.create::<Notice>(Notice::TYPE_ID).unwrap();
    notice.text = "fail".to_string();
    channel.receive(notice);

    assert!(channel.is_closed());
    assert!(connection.channel(channel.id()).is_none());
    assert!(status.is_cancelled());
    assert_eq!(manager.closed(), vec![channel.id()]);
}

#[test]
fn test_panic_closes_channel_and_propagates() {
    let (_manager, connection) = open_connection(Role::Acceptor, 1);
    let channel = open_channel(&connection);

    let message = inbound_echo(&channel, 1, "panic");
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| channel.receive(message)));

    assert!(outcome.is_err());
    assert!(channel.is_closed());
    assert!(connection.is_open());
}

#[test]
fn test_close_cancels_outstanding_requests() {
    let (manager, connection) = open_connection(Role::Initiator, 1);
    let channel = open_channel(&connection);
    let statuses: Vec<_> = (0..3)
        .map(|i| channel.send_request(echo(&channel, &i.to_string())).unwrap())
        .collect();
    manager.take_posted();

    assert!(channel.close_internal(false, None, Wait::Immediate));

    assert!(channel.is_closed());
    assert_eq!(channel.pending_request_count(), 0);
    for status in &statuses {
        let error = status.wait_for_response(Some(Duration::ZERO)).unwrap_err();
        assert!(matches!(
            error,
            ExtendError::Connection(ConnectionError::ChannelClosed { .. })
        ));
    }
    assert!(connection.channel(channel.id()).is_none());
    assert_eq!(manager.closed(), vec![channel.id()]);
    assert_eq!(manager.posted_count(), 0);
}

#[test]
fn test_close_with_cause_cancels_with_cause() {
    let (_manager, connection) = open_connection(Role::Initiator, 1);
    let channel = open_channel(&connection);
    let status = channel.send_request(echo(&channel, "x")).unwrap();

    channel.close_internal(false, Some(ExtendError::Fatal("boom".into())), Wait::Immediate);

    assert!(matches!(
        status.wait_for_response(Some(Duration::ZERO)),
        Err(ExtendError::Fatal(message)) if message == "boom"
    ));
}

#[test]
fn test_close_notifies_peer_over_control_channel() {
    let (manager, connection) = open_connection(Role::Initiator, 1);
    let channel = open_channel(&connection);

    channel.close().unwrap();

    let notice = manager
        .wait_posted(ChannelId::CONTROL, Duration::from_secs(1))
        .unwrap();
    let notice = notice
        .downcast::<crate::protocol::control::NotifyChannelClosed>()
        .unwrap();
    assert_eq!(notice.channel_id, channel.id().as_i32());
    assert!(notice.cause.is_none());
}

#[test]
fn test_close_is_idempotent() {
    let (manager, connection) = open_connection(Role::Initiator, 1);
    let channel = open_channel(&connection);

    assert!(channel.close_internal(false, None, Wait::Immediate));
    assert!(!channel.close_internal(false, None, Wait::Immediate));
    channel.close().unwrap();
    assert_eq!(manager.closed().len(), 1);
}

#[test]
fn test_closed_channel_rejects_requests() {
    let (manager, connection) = open_connection(Role::Initiator, 1);
    let channel = open_channel(&connection);
    channel.close_internal(false, None, Wait::Immediate);

    let error = channel.send_request(echo(&channel, "late")).unwrap_err();
    assert!(error.is_connection_error());
    assert_eq!(manager.posted_count(), 0);
    assert!(channel.open_internal().is_err());
}

#[test]
fn test_control_channel_cannot_be_closed() {
    let (_manager, connection) = open_connection(Role::Initiator, 1);
    let error = connection.control_channel().close().unwrap_err();
    assert!(matches!(error, ExtendError::Protocol(ProtocolError::ReservedChannel)));
    assert!(connection.control_channel().is_open());
}

#[test]
fn test_close_waits_for_occupant() {
    let (_manager, connection) = open_connection(Role::Initiator, 1);
    let channel = open_channel(&connection);

    let entered = Arc::new(Barrier::new(2));
    let (release, released) = mpsc::channel::<()>();
    let occupant = {
        let channel = channel.clone();
        let entered = entered.clone();
        thread::spawn(move || {
            channel.gate_enter().unwrap();
            entered.wait();
            released.recv().unwrap();
            channel.gate_exit();
        })
    };
    entered.wait();

    // The occupant keeps the Channel open; the close is deferred to it.
    assert!(!channel.close_internal(false, None, Wait::Immediate));
    assert!(channel.is_open());
    assert!(connection.channel(channel.id()).is_none());

    let refused = {
        let channel = channel.clone();
        thread::spawn(move || channel.gate_enter()).join().unwrap()
    };
    assert!(refused.unwrap_err().is_closing());

    release.send(()).unwrap();
    occupant.join().unwrap();
    assert!(channel.is_closed());
}

#[test]
fn test_unopened_channel_rejects_entry() {
    let (_manager, connection) = open_connection(Role::Acceptor, 1);
    let uri = connection
        .create_channel_internal(&test_protocol(), SerializerFormat::json(), None)
        .unwrap();
    let pending = connection.pending_channel(uri.id()).unwrap();
    assert!(!pending.is_open());

    assert!(matches!(
        pending.gate_enter(),
        Err(ExtendError::Connection(ConnectionError::ChannelClosed { .. }))
    ));
    assert!(!pending.is_active_thread());
    assert!(!connection.is_active_thread());

    // Nothing was left inside, so the Connection closes without waiting.
    assert!(connection.close_internal(false, None, Wait::Immediate));
    assert!(connection.is_closed());
}

#[test]
fn test_reentrant_send_from_inside_channel() {
    let (manager, connection) = open_connection(Role::Initiator, 1);
    let channel = open_channel(&connection);

    channel.gate_enter().unwrap();
    assert!(channel.is_active_thread());
    channel.send_request(echo(&channel, "nested")).unwrap();
    channel.gate_exit();

    assert!(!channel.is_active_thread());
    assert_eq!(manager.posted_count(), 1);
}

#[test]
fn test_response_requires_active_thread() {
    let (_manager, connection) = open_connection(Role::Initiator, 1);
    let channel = open_channel(&connection);
    let response = channel.message_factory().unwrap().create_response().unwrap();
    assert!(matches!(
        channel.send(Box::new(response)),
        Err(ExtendError::IllegalState(_))
    ));
}

#[test]
fn test_send_request_requires_request() {
    let (_manager, connection) = open_connection(Role::Initiator, 2);
    let channel = open_channel(&connection);
    let notice = channel.create_message(Notice::TYPE_ID).unwrap();
    assert!(matches!(
        channel.send_request_with(notice, None),
        Err(ExtendError::IllegalArgument(_))
    ));
}

#[test]
fn test_continuation_runs_before_resolution() {
    let (manager, connection) = open_connection(Role::Initiator, 1);
    let channel = open_channel(&connection);

    let continuation: Continuation = Box::new(|channel: &Arc<Channel>, response: &Response| -> Result<(), ExtendError> {
        channel.set_attribute("seen", Arc::new(response.request_id()));
        Ok(())
    });
    let status = channel
        .send_request_with(echo(&channel, "x"), Some(continuation))
        .unwrap();
    let request = manager.wait_posted(channel.id(), Duration::from_secs(1)).unwrap();
    channel.receive(echo_response(&channel, request.as_ref()));

    assert!(status.wait_for_response(Some(Duration::ZERO)).is_ok());
    let seen = channel.attribute("seen").unwrap();
    assert_eq!(seen.downcast_ref::<i64>(), Some(&status.request_id()));
}

#[test]
fn test_failing_continuation_cancels_status() {
    let (manager, connection) = open_connection(Role::Initiator, 1);
    let channel = open_channel(&connection);

    let continuation: Continuation =
        Box::new(|_channel: &Arc<Channel>, _response: &Response| -> Result<(), ExtendError> {
            Err(ExtendError::illegal_state("rejected"))
        });
    let status = channel
        .send_request_with(echo(&channel, "x"), Some(continuation))
        .unwrap();
    let request = manager.wait_posted(channel.id(), Duration::from_secs(1)).unwrap();
    channel.receive(echo_response(&channel, request.as_ref()));

    assert!(matches!(
        status.wait_for_response(Some(Duration::ZERO)),
        Err(ExtendError::IllegalState(_))
    ));
    assert!(channel.is_open());
}

#[tokio::test]
async fn test_async_response() {
    let (manager, connection) = open_connection(Role::Initiator, 1);
    let channel = open_channel(&connection);

    let status = channel.send_request(echo(&channel, "async")).unwrap();
    let request = manager.wait_posted(channel.id(), Duration::from_secs(1)).unwrap();
    let responder = {
        let channel = channel.clone();
        thread::spawn(move || channel.receive(echo_response(&channel, request.as_ref())))
    };

    let response = status.response().await.unwrap();
    responder.join().unwrap();
    assert_eq!(response.request_id(), 1);

    let lost = channel.send_request(echo(&channel, "lost")).unwrap();
    assert!(lost
        .response_timeout(Duration::from_millis(20))
        .await
        .unwrap_err()
        .is_timeout());
    assert_eq!(channel.pending_request_count(), 0);
}

#[test]
fn test_settings_are_set_once_before_open() {
    let (_manager, connection) = open_connection(Role::Initiator, 1);
    let channel = open_channel(&connection);

    assert!(matches!(
        channel.set_serializer(SerializerFormat::postcard()),
        Err(ExtendError::IllegalState(_))
    ));

    let fresh = Channel::new(ChannelId::new(11), Arc::downgrade(&connection), connection.id());
    fresh.set_serializer(SerializerFormat::json()).unwrap();
    assert!(matches!(
        fresh.set_serializer(SerializerFormat::postcard()),
        Err(ExtendError::Protocol(ProtocolError::AlreadySet("serializer")))
    ));
    // Without a message factory the Channel cannot open.
    assert!(fresh.open_internal().is_err());
    assert!(!fresh.is_open());
}

struct OtherReceiver;

impl Receiver for OtherReceiver {
    fn name(&self) -> &str {
        "other"
    }

    fn protocol(&self) -> Arc<Protocol> {
        Arc::new(crate::protocol::control::control_protocol().unwrap())
    }

    fn on_message(&self, channel: &Arc<Channel>, message: &mut dyn Message) -> Result<(), ExtendError> {
        message.dispatch(channel)
    }
}

#[test]
fn test_receiver_protocol_must_match() {
    let (_manager, connection) = open_connection(Role::Initiator, 1);
    let channel = Channel::new(ChannelId::new(12), Arc::downgrade(&connection), connection.id());
    channel
        .set_message_factory(test_protocol().message_factory(1).unwrap())
        .unwrap();
    assert!(matches!(
        channel.set_receiver(Arc::new(OtherReceiver)),
        Err(ExtendError::Protocol(ProtocolError::ProtocolMismatch { .. }))
    ));
}

struct DenyGuests;

impl AccessAdapter for DenyGuests {
    fn run_as(
        &self,
        subject: Option<&Subject>,
        action: &mut dyn FnMut() -> Result<(), ExtendError>,
    ) -> Result<(), ExtendError> {
        match subject {
            Some(subject) if subject.principal() != "guest" => action(),
            _ => Err(ExtendError::illegal_state("access denied")),
        }
    }
}

#[test]
fn test_access_adapter_wraps_execution() {
    let (manager, connection) = open_connection(Role::Acceptor, 1);
    let allowed = connection
        .open_channel_request(
            TEST_PROTOCOL,
            SerializerFormat::json(),
            None,
            Some(Subject::new("admin")),
            Some(Arc::new(DenyGuests)),
        )
        .unwrap();
    let denied = connection
        .open_channel_request(
            TEST_PROTOCOL,
            SerializerFormat::json(),
            None,
            Some(Subject::new("guest")),
            Some(Arc::new(DenyGuests)),
        )
        .unwrap();

    let allowed = connection.channel(allowed).unwrap();
    allowed.receive(inbound_echo(&allowed, 1, "hi"));
    assert!(!posted_response(&manager, allowed.id()).is_failure());

    let denied = connection.channel(denied).unwrap();
    denied.receive(inbound_echo(&denied, 1, "hi"));
    assert!(posted_response(&manager, denied.id()).is_failure());
}
