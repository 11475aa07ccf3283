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

//! Monotonic new → open → closed state shared by Channels and Connections.

use std::sync::atomic::{AtomicU8, Ordering};

const NEW: u8 = 0;
const OPEN: u8 = 1;
const CLOSED: u8 = 2;

/// Result of a state transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// This call performed the transition.
    Changed,
    /// The target state was already reached.
    Unchanged,
    /// The transition is not allowed from the current state.
    Rejected,
}

#[derive(Debug, Default)]
pub(crate) struct Lifecycle(AtomicU8);

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(NEW))
    }

    pub(crate) fn is_new(&self) -> bool {
        self.0.load(Ordering::Acquire) == NEW
    }

    pub(crate) fn is_open(&self) -> bool {
        self.0.load(Ordering::Acquire) == OPEN
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.0.load(Ordering::Acquire) == CLOSED
    }

    pub(crate) fn open(&self) -> Transition {
        match self
            .0
            .compare_exchange(NEW, OPEN, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Transition::Changed,
            Err(OPEN) => Transition::Unchanged,
            Err(_) => Transition::Rejected,
        }
    }

    pub(crate) fn close(&self) -> Transition {
        match self.0.swap(CLOSED, Ordering::AcqRel) {
            OPEN => Transition::Changed,
            CLOSED => Transition::Unchanged,
            _ => Transition::Changed,
        }
    }

    pub(crate) fn describe(&self) -> &'static str {
        match self.0.load(Ordering::Acquire) {
            NEW => "new",
            OPEN => "open",
            _ => "closed",
        }
    }
}
