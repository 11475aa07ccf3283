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

//! Quiescence barrier guarding Channel and Connection lifecycles.
//!
//! A [`ThreadGate`] admits any number of threads concurrently and allows a
//! single thread to *close* it once every other occupant has left. Entry is
//! reentrant per thread, and the closing thread may keep entering while it
//! holds the gate closed. Once a close has begun, or a close has been
//! deferred with [`ThreadGate::close_or_defer`], new threads are refused.
//!
//! A deferred close is handed back to the last occupant: its final
//! [`ThreadGate::exit`] returns the recorded [`CloseIntent`] and the caller is
//! expected to perform the close.
//!
//! ```rust
//! use extend::gate::{CloseIntent, ThreadGate, Wait};
//!
//! let gate = ThreadGate::new();
//! gate.enter().unwrap();
//! // The calling thread is ignored when counting occupants.
//! assert!(gate.close(Wait::Immediate));
//! gate.open();
//! gate.exit();
//! ```

use crate::error::ExtendError;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use thiserror::Error;

/// How long a close attempt may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Do not block.
    Immediate,
    /// Block until every other occupant has left.
    Forever,
    /// Block for at most the given duration.
    For(Duration),
}

impl Wait {
    /// Maps the millisecond convention used on the wire and in configuration:
    /// `0` is [`Wait::Immediate`], any negative value is [`Wait::Forever`].
    #[must_use]
    pub fn from_millis(millis: i64) -> Self {
        match millis {
            0 => Self::Immediate,
            m if m < 0 => Self::Forever,
            m => Self::For(Duration::from_millis(m.unsigned_abs())),
        }
    }
}

/// A close requested while the gate could not be acquired.
#[derive(Debug, Clone)]
pub struct CloseIntent {
    /// Whether the peer should be told about the close.
    pub notify: bool,
    /// The failure that caused the close, if any.
    pub cause: Option<ExtendError>,
}

/// Reason an [`ThreadGate::enter`] was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GateError {
    /// Another thread holds the gate closed.
    #[error("gate is closed")]
    Closed,
    /// A close is in progress or has been deferred.
    #[error("gate is closing")]
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum GateStatus {
    #[default]
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Default)]
struct GateState {
    status: GateStatus,
    active: usize,
    entries: HashMap<ThreadId, usize>,
    closer: Option<ThreadId>,
    close_count: usize,
    pending: Option<CloseIntent>,
}

impl GateState {
    fn others_active(&self, thread: ThreadId) -> usize {
        self.active - usize::from(self.entries.contains_key(&thread))
    }
}

/// Reentrant entry/exit barrier with drain-then-close semantics.
#[derive(Debug, Default)]
pub struct ThreadGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl ThreadGate {
    /// Creates an open gate with no occupants.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters the gate.
    ///
    /// Succeeds immediately for a thread that is already inside or that holds
    /// the gate closed.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Closed`] if another thread holds the gate closed
    /// and [`GateError::Closing`] if a close is underway or deferred.
    pub fn enter(&self) -> Result<(), GateError> {
        let thread = thread::current().id();
        let mut state = self.state.lock();
        if let Some(depth) = state.entries.get_mut(&thread) {
            *depth += 1;
            return Ok(());
        }
        if state.closer != Some(thread) {
            match state.status {
                GateStatus::Open if state.pending.is_some() => return Err(GateError::Closing),
                GateStatus::Open => {}
                GateStatus::Closing => return Err(GateError::Closing),
                GateStatus::Closed => return Err(GateError::Closed),
            }
        }
        state.entries.insert(thread, 1);
        state.active += 1;
        Ok(())
    }

    /// Leaves the gate.
    ///
    /// Returns the deferred [`CloseIntent`] when this call drained the last
    /// occupant of an open gate on which a close was deferred.
    pub fn exit(&self) -> Option<CloseIntent> {
        let thread = thread::current().id();
        let mut state = self.state.lock();
        match state.entries.get_mut(&thread) {
            None => {
                tracing::warn!("gate exit without matching enter");
                return None;
            }
            Some(depth) if *depth > 1 => {
                *depth -= 1;
                return None;
            }
            Some(_) => {
                state.entries.remove(&thread);
                state.active -= 1;
            }
        }
        if state.status == GateStatus::Closing {
            self.changed.notify_all();
        }
        if state.active == 0 && state.status == GateStatus::Open {
            state.pending.clone()
        } else {
            None
        }
    }

    /// Attempts to close the gate, waiting up to `wait` for other occupants
    /// to leave. The calling thread's own entries are not counted.
    ///
    /// Closing is reentrant: a thread already holding the gate closed
    /// succeeds again and must call [`open`](Self::open) once per success.
    pub fn close(&self, wait: Wait) -> bool {
        self.close_or_defer(wait, None)
    }

    /// Like [`close`](Self::close), but if the gate cannot be acquired the
    /// given intent is recorded in the same critical section, so that the
    /// last occupant to leave picks it up.
    pub fn close_or_defer(&self, wait: Wait, intent: Option<CloseIntent>) -> bool {
        let thread = thread::current().id();
        let deadline = match wait {
            Wait::For(duration) => Some(Instant::now() + duration),
            Wait::Immediate | Wait::Forever => None,
        };
        let mut state = self.state.lock();
        if state.closer == Some(thread) && state.status == GateStatus::Closed {
            state.close_count += 1;
            return true;
        }

        let mut expired = false;
        loop {
            let available = match state.status {
                GateStatus::Open => true,
                GateStatus::Closing => state.closer == Some(thread),
                GateStatus::Closed => false,
            };
            if available {
                if state.others_active(thread) == 0 {
                    state.status = GateStatus::Closed;
                    state.closer = Some(thread);
                    state.close_count = 1;
                    return true;
                }
                if wait != Wait::Immediate && state.status == GateStatus::Open {
                    state.status = GateStatus::Closing;
                    state.closer = Some(thread);
                }
            }
            if wait == Wait::Immediate || expired {
                break;
            }
            match deadline {
                None => self.changed.wait(&mut state),
                Some(deadline) => {
                    expired = self.changed.wait_until(&mut state, deadline).timed_out();
                }
            }
        }

        if state.status == GateStatus::Closing && state.closer == Some(thread) {
            state.status = GateStatus::Open;
            state.closer = None;
            self.changed.notify_all();
        }
        if let Some(intent) = intent {
            state.pending = Some(intent);
        }
        false
    }

    /// Reopens a gate closed by the calling thread.
    pub fn open(&self) {
        let thread = thread::current().id();
        let mut state = self.state.lock();
        if state.status != GateStatus::Closed || state.closer != Some(thread) {
            tracing::warn!("gate opened by a thread that does not hold it closed");
            return;
        }
        state.close_count -= 1;
        if state.close_count == 0 {
            state.status = GateStatus::Open;
            state.closer = None;
            self.changed.notify_all();
        }
    }

    /// Records a close to be performed by the last occupant to leave.
    pub fn request_close_on_exit(&self, intent: CloseIntent) {
        self.state.lock().pending = Some(intent);
    }

    /// Returns `true` once a close has been deferred.
    #[must_use]
    pub fn is_close_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    /// Returns `true` if the calling thread is currently inside the gate.
    #[must_use]
    pub fn is_entered_by_current_thread(&self) -> bool {
        self.state
            .lock()
            .entries
            .contains_key(&thread::current().id())
    }

    /// Returns `true` if some thread holds the gate closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().status == GateStatus::Closed
    }

    /// Number of distinct threads inside the gate.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.state.lock().active
    }
}
