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

//! The Channel: one request/response conversation on a Connection.

use crate::channel::{
    AccessAdapter, ChannelId, Continuation, Receiver, RequestIdGenerator, Status, Subject,
};
use crate::connection::{Connection, ConnectionError, ConnectionManager};
use crate::error::{ExtendError, RemoteError};
use crate::gate::{CloseIntent, GateError, ThreadGate, Wait};
use crate::lifecycle::{Lifecycle, Transition};
use crate::protocol::control::{ControlMessageType, NotifyChannelClosed};
use crate::protocol::{Message, MessageFactory, ProtocolError, Request, Response};
use crate::serialization::SerializerFormat;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
#[cfg(feature = "observability")]
use tracing::instrument;
use tracing::{debug, trace, warn};
use uuid::Uuid;

#[derive(Default)]
struct RequestTable {
    statuses: BTreeMap<i64, Arc<Status>>,
    /// Set once a close began; no further requests are registered.
    closed: bool,
}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

/// A numbered, independently closable conversation multiplexed over a
/// [`Connection`].
///
/// A Channel is created closed, configured once (message factory,
/// serializer, optional receiver, subject and access adapter), opened on the
/// service thread and finally closed. It cannot be reopened.
///
/// Every thread that sends on or receives into a Channel first enters the
/// Connection's gate and then the Channel's gate, so that a close never tears
/// the Channel down under a send in flight.
pub struct Channel {
    id: ChannelId,
    connection_id: Uuid,
    connection: Weak<Connection>,
    message_factory: OnceLock<Arc<MessageFactory>>,
    serializer: OnceLock<SerializerFormat>,
    receiver: OnceLock<Arc<dyn Receiver>>,
    subject: OnceLock<Subject>,
    access_adapter: OnceLock<Arc<dyn AccessAdapter>>,
    lifecycle: Lifecycle,
    requests: Mutex<RequestTable>,
    request_ids: RequestIdGenerator,
    gate: ThreadGate,
    attributes: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl Channel {
    pub(crate) fn new(id: ChannelId, connection: Weak<Connection>, connection_id: Uuid) -> Arc<Self> {
        Arc::new(Self {
            id,
            connection_id,
            connection,
            message_factory: OnceLock::new(),
            serializer: OnceLock::new(),
            receiver: OnceLock::new(),
            subject: OnceLock::new(),
            access_adapter: OnceLock::new(),
            lifecycle: Lifecycle::new(),
            requests: Mutex::new(RequestTable::default()),
            request_ids: RequestIdGenerator::new(),
            gate: ThreadGate::new(),
            attributes: Mutex::new(HashMap::new()),
        })
    }

    /// The Channel's id within its Connection.
    #[must_use]
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// The owning Connection, while it is alive.
    #[must_use]
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.upgrade()
    }

    /// Id of the owning Connection.
    #[must_use]
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// The manager owning the Connection.
    pub fn manager(&self) -> Result<Arc<dyn ConnectionManager>, ExtendError> {
        self.connection()
            .and_then(|connection| connection.manager())
            .ok_or_else(|| self.closed_error())
    }

    fn closed_error(&self) -> ExtendError {
        ConnectionError::ChannelClosed {
            connection_id: self.connection_id,
            channel_id: self.id,
        }
        .into()
    }

    fn closing_error(&self) -> ExtendError {
        ConnectionError::ChannelClosing {
            connection_id: self.connection_id,
            channel_id: self.id,
        }
        .into()
    }

    /// Returns `true` between open and close.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lifecycle.is_open()
    }

    /// Returns `true` once the Channel has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }

    fn ensure_unopened(&self, what: &'static str) -> Result<(), ExtendError> {
        if self.lifecycle.is_new() {
            Ok(())
        } else {
            Err(ExtendError::illegal_state(format!(
                "cannot set the {what} of {} once it has been opened",
                self.id
            )))
        }
    }

    /// The factory creating this Channel's messages.
    #[must_use]
    pub fn message_factory(&self) -> Option<Arc<MessageFactory>> {
        self.message_factory.get().cloned()
    }

    /// Sets the message factory. Allowed once, before open.
    pub fn set_message_factory(&self, factory: Arc<MessageFactory>) -> Result<(), ExtendError> {
        self.ensure_unopened("message factory")?;
        self.message_factory
            .set(factory)
            .map_err(|_| ProtocolError::AlreadySet("message factory").into())
    }

    /// The serializer for payload values.
    #[must_use]
    pub fn serializer(&self) -> Option<&SerializerFormat> {
        self.serializer.get()
    }

    /// The serializer, or an error if none is set.
    pub fn require_serializer(&self) -> Result<&SerializerFormat, ExtendError> {
        self.serializer
            .get()
            .ok_or_else(|| ProtocolError::MissingField("serializer").into())
    }

    /// Sets the serializer. Allowed once, before open.
    pub fn set_serializer(&self, serializer: SerializerFormat) -> Result<(), ExtendError> {
        self.ensure_unopened("serializer")?;
        self.serializer
            .set(serializer)
            .map_err(|_| ProtocolError::AlreadySet("serializer").into())
    }

    /// The receiver handling unsolicited messages.
    #[must_use]
    pub fn receiver(&self) -> Option<&Arc<dyn Receiver>> {
        self.receiver.get()
    }

    /// Sets the receiver. Allowed once, before open.
    ///
    /// # Errors
    ///
    /// Fails with [`ProtocolError::ProtocolMismatch`] if the receiver speaks
    /// another protocol than the Channel's message factory.
    pub fn set_receiver(&self, receiver: Arc<dyn Receiver>) -> Result<(), ExtendError> {
        self.ensure_unopened("receiver")?;
        if let Some(factory) = self.message_factory.get() {
            let expected = receiver.protocol();
            if expected.name() != factory.protocol_name() {
                return Err(ProtocolError::ProtocolMismatch {
                    expected: expected.name().to_string(),
                    actual: factory.protocol_name().to_string(),
                }
                .into());
            }
        }
        self.receiver
            .set(receiver)
            .map_err(|_| ProtocolError::AlreadySet("receiver").into())
    }

    /// The identity this Channel acts for.
    #[must_use]
    pub fn subject(&self) -> Option<&Subject> {
        self.subject.get()
    }

    /// Sets the subject. Allowed once, before open.
    pub fn set_subject(&self, subject: Subject) -> Result<(), ExtendError> {
        self.ensure_unopened("subject")?;
        self.subject
            .set(subject)
            .map_err(|_| ProtocolError::AlreadySet("subject").into())
    }

    /// Sets the adapter wrapping message execution. Allowed once, before
    /// open.
    pub fn set_access_adapter(&self, adapter: Arc<dyn AccessAdapter>) -> Result<(), ExtendError> {
        self.ensure_unopened("access adapter")?;
        self.access_adapter
            .set(adapter)
            .map_err(|_| ProtocolError::AlreadySet("access adapter").into())
    }

    /// Returns the attribute stored under `name`.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.attributes.lock().get(name).cloned()
    }

    /// Stores an attribute, returning the previous value.
    pub fn set_attribute(
        &self,
        name: impl Into<String>,
        value: Arc<dyn Any + Send + Sync>,
    ) -> Option<Arc<dyn Any + Send + Sync>> {
        self.attributes.lock().insert(name.into(), value)
    }

    /// Removes an attribute, returning its value.
    pub fn remove_attribute(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.attributes.lock().remove(name)
    }

    fn require_message_factory(&self) -> Result<&Arc<MessageFactory>, ExtendError> {
        self.message_factory
            .get()
            .ok_or_else(|| ProtocolError::MissingField("message factory").into())
    }

    /// Creates a message of `type_id` with this Channel's factory.
    pub fn create_message(&self, type_id: i32) -> Result<Box<dyn Message>, ExtendError> {
        Ok(self.require_message_factory()?.create_message(type_id)?)
    }

    /// Creates a message of `type_id`, downcast to its concrete type.
    pub fn create<T: Message>(&self, type_id: i32) -> Result<Box<T>, ExtendError> {
        Ok(self.require_message_factory()?.create::<T>(type_id)?)
    }

    /// Opens the Channel. Must be called on the service thread.
    pub fn open(self: &Arc<Self>) -> Result<(), ExtendError> {
        if !self.manager()?.is_service_thread(false) {
            return Err(ExtendError::illegal_state(format!(
                "{} can only be opened on the service thread",
                self.id
            )));
        }
        self.open_internal()
    }

    /// Flips the Channel open and notifies its receiver and manager.
    ///
    /// Opening an open Channel does nothing; opening a closed one fails.
    #[cfg_attr(
        feature = "observability",
        instrument(skip(self), fields(channel = %self.id, connection = %self.connection_id))
    )]
    pub fn open_internal(self: &Arc<Self>) -> Result<(), ExtendError> {
        let connection = self.connection().ok_or_else(|| self.closed_error())?;
        self.require_message_factory()?;
        self.require_serializer()?;

        match self.lifecycle.open() {
            Transition::Changed => {}
            Transition::Unchanged => return Ok(()),
            Transition::Rejected => return Err(self.closed_error()),
        }

        if let Some(receiver) = self.receiver.get()
            && let Err(error) = receiver.register_channel(self)
        {
            warn!(receiver = receiver.name(), %error, "receiver failed to register channel");
        }
        if let Some(manager) = connection.manager() {
            manager.on_channel_opened(self);
        }
        debug!("channel opened");
        Ok(())
    }

    /// Closes the Channel and tells the peer.
    pub fn close(self: &Arc<Self>) -> Result<(), ExtendError> {
        self.close_with(true, None)
    }

    /// Closes the Channel because of `cause`, optionally telling the peer.
    ///
    /// Runs inline on the service thread and is handed to the connection
    /// manager otherwise. Closing a closed Channel does nothing.
    ///
    /// # Errors
    ///
    /// Channel 0 cannot be closed directly, and a thread executing inside the
    /// Channel cannot hand the close off to the service thread.
    pub fn close_with(self: &Arc<Self>, notify: bool, cause: Option<ExtendError>) -> Result<(), ExtendError> {
        if !self.is_open() {
            return Ok(());
        }
        if self.id.is_control() {
            return Err(ProtocolError::ReservedChannel.into());
        }
        let manager = self.manager()?;
        if manager.is_service_thread(false) {
            self.close_internal(notify, cause, Wait::Immediate);
            Ok(())
        } else if self.is_active_thread() {
            Err(ExtendError::illegal_state(format!(
                "cannot close {} while executing within it",
                self.id
            )))
        } else {
            manager.close_channel(self, notify, cause, false)
        }
    }

    /// Closes the Channel on the service thread.
    ///
    /// Every outstanding [`Status`] is cancelled with `cause` (or a
    /// channel-closed error) before the gate is acquired. If the gate cannot
    /// be acquired within `wait`, the close is deferred to the last thread
    /// leaving the Channel; the Channel leaves its Connection's table either
    /// way.
    ///
    /// Returns `true` if this call closed the Channel.
    #[cfg_attr(
        feature = "observability",
        instrument(skip(self, cause), fields(channel = %self.id, connection = %self.connection_id))
    )]
    pub fn close_internal(self: &Arc<Self>, notify: bool, cause: Option<ExtendError>, wait: Wait) -> bool {
        if !self.is_open() {
            return false;
        }

        let drained = {
            let mut table = self.requests.lock();
            table.closed = true;
            std::mem::take(&mut table.statuses)
        };
        if !drained.is_empty() {
            let status_cause = cause.clone().unwrap_or_else(|| self.closed_error());
            debug!(count = drained.len(), "cancelling outstanding requests");
            for status in drained.into_values() {
                status.cancel_detached(status_cause.clone());
            }
        }

        let intent = CloseIntent {
            notify,
            cause: cause.clone(),
        };
        if !self.gate.close_or_defer(wait, Some(intent)) {
            debug!("channel busy, close deferred");
            if let Some(connection) = self.connection() {
                connection.unregister_channel(self);
            }
            return false;
        }

        let receiver = self.receiver.get().cloned();
        let closed = self.is_open() && {
            if let Some(receiver) = &receiver
                && let Err(error) = receiver.unregister_channel(self)
            {
                warn!(receiver = receiver.name(), %error, "receiver failed to unregister channel");
            }
            self.lifecycle.close() == Transition::Changed
        };
        self.gate.open();
        if !closed {
            return false;
        }

        if let Some(receiver) = &receiver
            && let Err(error) = receiver.on_channel_closed(self)
        {
            warn!(receiver = receiver.name(), %error, "receiver failed to handle channel close");
        }

        if notify && !self.id.is_control() {
            self.notify_peer_closed(cause.as_ref());
        }

        if let Some(connection) = self.connection() {
            connection.unregister_channel(self);
            if let Some(manager) = connection.manager() {
                manager.on_channel_closed(self);
            }
        }
        debug!("channel closed");
        true
    }

    fn notify_peer_closed(&self, cause: Option<&ExtendError>) {
        let Some(connection) = self.connection() else {
            return;
        };
        let channel0 = connection.control_channel();
        let result = channel0
            .create::<NotifyChannelClosed>(ControlMessageType::NotifyChannelClosed.type_id())
            .and_then(|mut notice| {
                notice.channel_id = self.id.as_i32();
                notice.cause = cause.map(RemoteError::from);
                channel0.send(notice)
            });
        if let Err(error) = result {
            debug!(channel = %self.id, %error, "could not notify peer of channel close");
        }
    }

    /// Returns `true` if the calling thread is executing inside this Channel.
    #[must_use]
    pub fn is_active_thread(&self) -> bool {
        self.gate.is_entered_by_current_thread()
    }

    /// Enters the Connection's gate, then this Channel's gate.
    ///
    /// # Errors
    ///
    /// Fails with a closing error when a close has been requested and the
    /// calling thread is not already inside, and with a closed error when
    /// the Channel is not open.
    pub fn gate_enter(self: &Arc<Self>) -> Result<(), ExtendError> {
        let connection = self.connection().ok_or_else(|| self.closed_error())?;
        connection.gate_enter()?;
        if let Err(error) = self.gate.enter() {
            connection.gate_exit();
            return Err(match error {
                GateError::Closing | GateError::Closed => self.closing_error(),
            });
        }
        if !self.is_open() {
            self.gate_exit();
            return Err(self.closed_error());
        }
        Ok(())
    }

    /// Leaves this Channel's gate, then the Connection's, and performs a
    /// close that was deferred while the Channel was busy.
    pub fn gate_exit(self: &Arc<Self>) {
        let intent = self.gate.exit();
        if let Some(connection) = self.connection() {
            connection.gate_exit();
        }
        if let Some(intent) = intent
            && let Err(error) = self.close_with(intent.notify, intent.cause)
        {
            warn!(channel = %self.id, %error, "deferred channel close failed");
        }
    }

    /// Entry point for inbound messages decoded for this Channel.
    ///
    /// Messages arriving while the Channel or Connection is closing are
    /// dropped. A failure escaping dispatch flags the Channel (or, for
    /// channel 0, the Connection) for close once it is idle. A panic does the
    /// same and then resumes unwinding.
    pub fn receive(self: &Arc<Self>, message: Box<dyn Message>) {
        let type_id = message.message_type();
        if let Err(error) = self.gate_enter() {
            trace!(channel = %self.id, type_id, %error, "dropping inbound message");
            return;
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch_received(message)));
        let unwinding = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(error)) if error.is_closing() => {
                debug!(channel = %self.id, type_id, %error, "message dropped by a closing connection");
                None
            }
            Ok(Err(error)) => {
                self.fail(type_id, error);
                None
            }
            Err(payload) => {
                self.fail(type_id, ExtendError::Fatal(panic_message(payload.as_ref())));
                Some(payload)
            }
        };

        self.gate_exit();
        if let Some(payload) = unwinding {
            panic::resume_unwind(payload);
        }
    }

    fn fail(&self, type_id: i32, cause: ExtendError) {
        let service = self
            .manager()
            .map(|manager| manager.service_name().to_string())
            .unwrap_or_default();
        warn!(
            channel = %self.id,
            type_id,
            service,
            error = %cause,
            "unhandled failure while processing message"
        );
        let intent = CloseIntent {
            notify: true,
            cause: Some(cause),
        };
        if self.id.is_control() {
            if let Some(connection) = self.connection() {
                connection.request_close_on_exit(intent);
            }
        } else {
            self.gate.request_close_on_exit(intent);
        }
    }

    fn dispatch_received(self: &Arc<Self>, message: Box<dyn Message>) -> Result<(), ExtendError> {
        if message.as_request().is_some() {
            self.reply(message)
        } else if message.as_response().is_some() {
            self.deliver_response(message)
        } else {
            let mut message = message;
            self.execute(message.as_mut())
        }
    }

    /// Executes an inbound request and sends its Response, failed or not.
    fn reply(self: &Arc<Self>, mut message: Box<dyn Message>) -> Result<(), ExtendError> {
        let outcome = self.execute(message.as_mut());
        let factory = self.require_message_factory()?;
        let request = message
            .as_request_mut()
            .ok_or_else(|| ExtendError::illegal_state("reply to a message that is not a request"))?;
        let request_id = request.request_header().id();
        let mut response = match request.request_header_mut().take_response() {
            Some(response) => response,
            None => factory.create_response()?,
        };
        if let Err(error) = outcome {
            debug!(
                channel = %self.id,
                request_id,
                %error,
                "request failed, returning the failure to the peer"
            );
            response.set_failure(RemoteError::from(&error));
        }
        response.set_request_id(request_id);
        self.post(Box::new(response))
    }

    /// Resolves the Status a Response answers. Unsolicited Responses are
    /// ignored.
    fn deliver_response(self: &Arc<Self>, mut message: Box<dyn Message>) -> Result<(), ExtendError> {
        let Some(response) = message.as_response().cloned() else {
            return Ok(());
        };
        let status = self
            .requests
            .lock()
            .statuses
            .get(&response.request_id())
            .cloned();
        let Some(status) = status else {
            trace!(channel = %self.id, request_id = response.request_id(), "ignoring unsolicited response");
            return Ok(());
        };

        let executed = panic::catch_unwind(AssertUnwindSafe(|| {
            self.execute(message.as_mut())?;
            match status.take_continuation() {
                Some(continuation) => continuation(self, &response),
                None => Ok(()),
            }
        }));
        match executed {
            Ok(Ok(())) if response.is_failure() => {
                status.cancel(response.failure_cause());
            }
            Ok(Ok(())) => {
                status.set_response(response);
            }
            Ok(Err(error)) => {
                debug!(channel = %self.id, request_id = status.request_id(), %error, "response handling failed");
                status.cancel(error);
            }
            Err(payload) => {
                status.cancel(ExtendError::Fatal(panic_message(payload.as_ref())));
                panic::resume_unwind(payload);
            }
        }
        Ok(())
    }

    /// Runs `message`, handing unsolicited messages to the receiver when one
    /// is set and wrapping execution in the access adapter when one is
    /// installed.
    fn execute(self: &Arc<Self>, message: &mut dyn Message) -> Result<(), ExtendError> {
        let receiver = if message.as_response().is_some() {
            None
        } else {
            self.receiver.get().cloned()
        };
        let mut action = || match &receiver {
            Some(receiver) => receiver.on_message(self, &mut *message),
            None => message.dispatch(self),
        };
        match self.access_adapter.get() {
            Some(adapter) => adapter.run_as(self.subject.get(), &mut action),
            None => action(),
        }
    }

    fn calculate_request_timeout(&self, request: &dyn Request) -> Option<Duration> {
        let manager = self.manager().ok()?;
        manager.adjust_timeout(manager.request_timeout(), request.request_timeout())
    }

    /// Assigns `request` the next request id and tracks it with a new
    /// [`Status`].
    ///
    /// # Errors
    ///
    /// Fails if the Channel is not open or is closing.
    pub fn register_request(self: &Arc<Self>, request: &mut dyn Request) -> Result<Arc<Status>, ExtendError> {
        let timeout = self.calculate_request_timeout(request);
        let status = {
            let mut table = self.requests.lock();
            if !self.is_open() {
                return Err(self.closed_error());
            }
            if table.closed {
                return Err(self.closing_error());
            }
            let request_id = self.request_ids.next();
            let status = Arc::new(Status::new(self, request_id, request.message_type(), timeout));
            match table.statuses.entry(request_id) {
                Entry::Occupied(_) => {
                    return Err(ExtendError::Fatal(format!(
                        "duplicate request id {request_id} on {}",
                        self.id
                    )));
                }
                Entry::Vacant(slot) => {
                    slot.insert(Arc::clone(&status));
                }
            }
            status
        };
        let header = request.request_header_mut();
        header.set_id(status.request_id());
        header.set_status(Arc::clone(&status));
        Ok(status)
    }

    /// Removes a resolved Status from the request table.
    pub(crate) fn on_request_completed(&self, status: &Status) {
        let mut table = self.requests.lock();
        if let Entry::Occupied(entry) = table.statuses.entry(status.request_id())
            && std::ptr::eq(Arc::as_ptr(entry.get()), status)
        {
            entry.remove();
        }
    }

    /// Number of requests awaiting a Response.
    #[must_use]
    pub fn pending_request_count(&self) -> usize {
        self.requests.lock().statuses.len()
    }

    /// Returns `true` if `request_id` is awaiting a Response.
    #[must_use]
    pub fn has_pending_request(&self, request_id: i64) -> bool {
        self.requests.lock().statuses.contains_key(&request_id)
    }

    /// Sends a message without tracking a Response.
    pub fn send(self: &Arc<Self>, message: Box<dyn Message>) -> Result<(), ExtendError> {
        self.post(message)
    }

    /// Sends `request` and returns the [`Status`] tracking it without
    /// waiting.
    pub fn send_request<R: Request>(self: &Arc<Self>, request: Box<R>) -> Result<Arc<Status>, ExtendError> {
        self.send_request_with(request, None)
    }

    /// Sends `request`, running `continuation` on the receiving thread when
    /// the Response arrives and before the Status resolves.
    pub fn send_request_with(
        self: &Arc<Self>,
        mut request: Box<dyn Message>,
        continuation: Option<Continuation>,
    ) -> Result<Arc<Status>, ExtendError> {
        let type_id = request.message_type();
        let target = request.as_request_mut().ok_or_else(|| {
            ExtendError::illegal_argument(format!("message type {type_id} is not a request"))
        })?;
        let status = self.register_request(target)?;
        if let Some(continuation) = continuation {
            status.set_continuation(continuation);
        }
        self.post(request)?;
        Ok(status)
    }

    /// Sends `request` and blocks until its Response arrives or the default
    /// timeout elapses.
    ///
    /// # Errors
    ///
    /// Fails when called on the service thread, when the request fails on
    /// the peer ([`ExtendError::Remote`]), on timeout, and when the Channel
    /// closes before the Response arrives.
    pub fn request<R: Request>(self: &Arc<Self>, request: Box<R>) -> Result<Arc<Response>, ExtendError> {
        self.request_with(request, None)
    }

    /// Like [`request`](Self::request) with an explicit timeout.
    pub fn request_timeout<R: Request>(
        self: &Arc<Self>,
        request: Box<R>,
        timeout: Duration,
    ) -> Result<Arc<Response>, ExtendError> {
        self.request_with(request, Some(timeout))
    }

    /// Sends `request`, waits for the Response and decodes its value with
    /// the Channel's serializer.
    pub fn request_value<T, R>(self: &Arc<Self>, request: Box<R>) -> Result<Option<T>, ExtendError>
    where
        T: DeserializeOwned,
        R: Request,
    {
        let response = self.request(request)?;
        response.value(self.require_serializer()?)
    }

    fn request_with<R: Request>(
        self: &Arc<Self>,
        request: Box<R>,
        timeout: Option<Duration>,
    ) -> Result<Arc<Response>, ExtendError> {
        let manager = self.manager()?;
        if manager.is_service_thread(true) {
            return Err(ExtendError::illegal_state(
                "request() blocks and cannot be called on the service thread",
            ));
        }
        manager.wait_accepting_clients()?;
        let status = self.send_request(request)?;
        status.wait_for_response(timeout)
    }

    /// The single outbound path.
    ///
    /// Responses are only sent from inside the Channel. Every other message
    /// enters the gates for the duration of the send; if the send fails the
    /// Status of a request is cancelled with the failure.
    fn post(self: &Arc<Self>, message: Box<dyn Message>) -> Result<(), ExtendError> {
        let is_response = message.as_response().is_some();
        let status = message
            .as_request()
            .and_then(|request| request.request_header().status().cloned());

        let result = if is_response {
            if self.is_active_thread() {
                self.bind_and_post(message)
            } else {
                Err(ExtendError::illegal_state(
                    "a response can only be sent while executing within its channel",
                ))
            }
        } else {
            match self.gate_enter() {
                Ok(()) => {
                    let result = self.bind_and_post(message);
                    self.gate_exit();
                    result
                }
                Err(error) => Err(error),
            }
        };

        if let Err(error) = &result
            && let Some(status) = status
        {
            status.cancel(error.clone());
        }
        result
    }

    fn bind_and_post(self: &Arc<Self>, mut message: Box<dyn Message>) -> Result<(), ExtendError> {
        let type_id = message.message_type();
        message.header_mut().bind_channel(self, type_id)?;
        self.manager()?.post(self, message)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("connection", &self.connection_id)
            .field("state", &self.lifecycle.describe())
            .field(
                "protocol",
                &self.message_factory.get().map(|factory| factory.protocol_name()),
            )
            .field("pending_requests", &self.pending_request_count())
            .finish()
    }
}
