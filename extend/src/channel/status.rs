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

//! Tracking of outstanding requests.

use crate::channel::{Channel, ChannelId};
use crate::error::ExtendError;
use crate::protocol::Response;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Work executed on the receiving thread when a request's Response arrives,
/// before the Status is resolved. An error cancels the Status instead.
pub type Continuation =
    Box<dyn FnOnce(&Arc<Channel>, &Response) -> Result<(), ExtendError> + Send + 'static>;

#[derive(Debug)]
enum Outcome {
    Pending,
    Completed(Arc<Response>),
    Cancelled(ExtendError),
}

impl Outcome {
    fn result(&self) -> Option<Result<Arc<Response>, ExtendError>> {
        match self {
            Outcome::Pending => None,
            Outcome::Completed(response) => Some(Ok(response.clone())),
            Outcome::Cancelled(cause) => Some(Err(cause.clone())),
        }
    }
}

/// Completion handle for one outstanding request.
///
/// A Status resolves exactly once, either with a [`Response`] or with a
/// cancellation cause. Waiters may block with
/// [`wait_for_response`](Self::wait_for_response) or await
/// [`response`](Self::response). Resolution removes the request from its
/// Channel's pending table.
pub struct Status {
    channel: Weak<Channel>,
    channel_id: ChannelId,
    request_id: i64,
    request_type: i32,
    default_timeout: Option<Duration>,
    outcome: Mutex<Outcome>,
    resolved: Condvar,
    notify: Notify,
    continuation: Mutex<Option<Continuation>>,
}

impl Status {
    pub(crate) fn new(
        channel: &Arc<Channel>,
        request_id: i64,
        request_type: i32,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            channel: Arc::downgrade(channel),
            channel_id: channel.id(),
            request_id,
            request_type,
            default_timeout,
            outcome: Mutex::new(Outcome::Pending),
            resolved: Condvar::new(),
            notify: Notify::new(),
            continuation: Mutex::new(None),
        }
    }

    /// Id of the tracked request.
    #[must_use]
    pub fn request_id(&self) -> i64 {
        self.request_id
    }

    /// Message type of the tracked request.
    #[must_use]
    pub fn request_type(&self) -> i32 {
        self.request_type
    }

    /// Channel the request was sent on.
    #[must_use]
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Timeout applied when waiting without an explicit one. `None` waits
    /// forever.
    #[must_use]
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    /// Returns `true` once the Status is resolved either way.
    #[must_use]
    pub fn is_done(&self) -> bool {
        !matches!(*self.outcome.lock(), Outcome::Pending)
    }

    /// Returns `true` if the Status was resolved by cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(*self.outcome.lock(), Outcome::Cancelled(_))
    }

    /// The outcome, if resolved.
    #[must_use]
    pub fn try_response(&self) -> Option<Result<Arc<Response>, ExtendError>> {
        self.outcome.lock().result()
    }

    /// Resolves the Status with `response`. Returns `false` if it was already
    /// resolved.
    pub fn set_response(&self, response: Response) -> bool {
        self.resolve(Outcome::Completed(Arc::new(response)), true)
    }

    /// Resolves the Status by cancellation. Returns `false` if it was already
    /// resolved.
    pub fn cancel(&self, cause: ExtendError) -> bool {
        self.resolve(Outcome::Cancelled(cause), true)
    }

    /// Cancels without touching the Channel's pending table, for callers that
    /// already removed the entry.
    pub(crate) fn cancel_detached(&self, cause: ExtendError) -> bool {
        self.resolve(Outcome::Cancelled(cause), false)
    }

    fn resolve(&self, outcome: Outcome, unregister: bool) -> bool {
        {
            let mut current = self.outcome.lock();
            if !matches!(*current, Outcome::Pending) {
                return false;
            }
            *current = outcome;
        }
        self.continuation.lock().take();
        self.resolved.notify_all();
        self.notify.notify_waiters();
        if unregister && let Some(channel) = self.channel.upgrade() {
            channel.on_request_completed(self);
        }
        true
    }

    pub(crate) fn set_continuation(&self, continuation: Continuation) {
        *self.continuation.lock() = Some(continuation);
    }

    pub(crate) fn take_continuation(&self) -> Option<Continuation> {
        self.continuation.lock().take()
    }

    fn timeout_error(&self, timeout: Duration) -> ExtendError {
        ExtendError::Timeout {
            request_id: self.request_id,
            timeout,
        }
    }

    fn expire(&self, timeout: Duration) -> Result<Arc<Response>, ExtendError> {
        let error = self.timeout_error(timeout);
        self.cancel(error.clone());
        // A response that raced the timeout wins.
        self.try_response().unwrap_or(Err(error))
    }

    /// Blocks until the Status resolves or the timeout elapses.
    ///
    /// `None` uses the [default timeout](Self::default_timeout). On expiry the
    /// Status is cancelled with [`ExtendError::Timeout`], which is returned.
    ///
    /// # Errors
    ///
    /// Returns the cancellation cause if the Status was cancelled.
    pub fn wait_for_response(&self, timeout: Option<Duration>) -> Result<Arc<Response>, ExtendError> {
        let timeout = timeout.or(self.default_timeout);
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        {
            let mut outcome = self.outcome.lock();
            loop {
                if let Some(result) = outcome.result() {
                    return result;
                }
                match deadline {
                    None => self.resolved.wait(&mut outcome),
                    Some(deadline) => {
                        if self.resolved.wait_until(&mut outcome, deadline).timed_out() {
                            if let Some(result) = outcome.result() {
                                return result;
                            }
                            break;
                        }
                    }
                }
            }
        }
        self.expire(timeout.unwrap_or_default())
    }

    /// Waits asynchronously until the Status resolves.
    pub async fn response(&self) -> Result<Arc<Response>, ExtendError> {
        loop {
            let notified = self.notify.notified();
            if let Some(result) = self.try_response() {
                return result;
            }
            notified.await;
        }
    }

    /// Waits asynchronously for at most `timeout`, cancelling the Status on
    /// expiry.
    pub async fn response_timeout(&self, timeout: Duration) -> Result<Arc<Response>, ExtendError> {
        match tokio::time::timeout(timeout, self.response()).await {
            Ok(result) => result,
            Err(_) => self.expire(timeout),
        }
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Status")
            .field("channel", &self.channel_id)
            .field("request_id", &self.request_id)
            .field("request_type", &self.request_type)
            .field("outcome", &*self.outcome.lock())
            .finish()
    }
}
