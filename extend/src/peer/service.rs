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

//! The single thread on which a Peer performs Connection and Channel state
//! transitions.

use crate::channel::panic_message;
use crate::error::ExtendError;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock, mpsc as std_mpsc};
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::mpsc;
use tracing::{debug, error};

type Task = Box<dyn FnOnce() + Send + 'static>;

enum Command {
    Run(Task),
    Stop,
}

/// A named thread draining a queue of tasks in submission order.
///
/// A task that panics is logged and the thread carries on with the next one.
pub(crate) struct ServiceThread {
    name: String,
    queue: mpsc::UnboundedSender<Command>,
    thread_id: OnceLock<ThreadId>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ServiceThread {
    /// Spawns the thread.
    pub(crate) fn start(name: &str) -> Result<Arc<Self>, ExtendError> {
        let (queue, mut commands) = mpsc::unbounded_channel::<Command>();
        let service = Arc::new(Self {
            name: name.to_string(),
            queue,
            thread_id: OnceLock::new(),
            handle: Mutex::new(None),
        });

        let thread_name = format!("{name}-service");
        let service_name = name.to_string();
        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                debug!(service = %service_name, "service thread started");
                while let Some(command) = commands.blocking_recv() {
                    let task = match command {
                        Command::Run(task) => task,
                        Command::Stop => break,
                    };
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                        error!(
                            service = %service_name,
                            panic = %panic_message(payload.as_ref()),
                            "service task panicked"
                        );
                    }
                }
                debug!(service = %service_name, "service thread stopped");
            })
            .map_err(|e| ExtendError::illegal_state(format!("cannot spawn service thread: {e}")))?;

        let _ = service.thread_id.set(handle.thread().id());
        *service.handle.lock() = Some(handle);
        Ok(service)
    }

    /// Returns `true` on the service thread itself.
    pub(crate) fn is_current(&self) -> bool {
        self.thread_id.get() == Some(&thread::current().id())
    }

    /// Returns `true` until [`stop`](Self::stop) is called or the thread
    /// exits.
    pub(crate) fn is_running(&self) -> bool {
        !self.queue.is_closed()
    }

    /// Queues `task` without waiting for it.
    pub(crate) fn submit(&self, task: impl FnOnce() + Send + 'static) -> Result<(), ExtendError> {
        self.queue
            .send(Command::Run(Box::new(task)))
            .map_err(|_| self.stopped())
    }

    /// Runs `task` on the service thread and returns its result. Runs inline
    /// when called on the service thread.
    pub(crate) fn invoke<R>(&self, task: impl FnOnce() -> R + Send + 'static) -> Result<R, ExtendError>
    where
        R: Send + 'static,
    {
        if self.is_current() {
            return Ok(task());
        }
        let (reply, result) = std_mpsc::sync_channel(1);
        self.submit(move || {
            let _ = reply.send(task());
        })?;
        result.recv().map_err(|_| self.stopped())
    }

    /// Stops the thread after the tasks already queued and waits for it,
    /// unless called on the service thread itself.
    pub(crate) fn stop(&self) {
        let _ = self.queue.send(Command::Stop);
        if self.is_current() {
            return;
        }
        if let Some(handle) = self.handle.lock().take()
            && handle.join().is_err()
        {
            error!(service = %self.name, "service thread ended with a panic");
        }
    }

    fn stopped(&self) -> ExtendError {
        ExtendError::illegal_state(format!("service thread of {} is not running", self.name))
    }
}
