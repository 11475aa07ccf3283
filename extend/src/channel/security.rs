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

//! Identity attached to a Channel.

use crate::error::ExtendError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The principal a Channel acts for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    principal: String,
}

impl Subject {
    /// Creates a subject for `principal`.
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
        }
    }

    /// The principal name.
    #[must_use]
    pub fn principal(&self) -> &str {
        &self.principal
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.principal)
    }
}

/// Runs message execution on behalf of a Channel's [`Subject`].
///
/// Installed on a Channel to establish an access-control context around
/// every message the Channel executes.
pub trait AccessAdapter: Send + Sync + 'static {
    /// Runs `action` as `subject`. Returning an error without running the
    /// action denies execution.
    fn run_as(
        &self,
        subject: Option<&Subject>,
        action: &mut dyn FnMut() -> Result<(), ExtendError>,
    ) -> Result<(), ExtendError>;
}
