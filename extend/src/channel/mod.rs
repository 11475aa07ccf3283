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

//! Channels multiplexed over a Connection.
//!
//! A [`Channel`] is a numbered conversation inside a
//! [`Connection`](crate::connection::Connection). Each Channel speaks one
//! protocol through its [`MessageFactory`](crate::protocol::MessageFactory),
//! encodes payload values with one serializer and hands unsolicited messages
//! to an optional [`Receiver`].
//!
//! # Key Features
//!
//! - **Correlation**: requests get a per-Channel id and a [`Status`] that
//!   resolves exactly once with the matching Response or a cancellation cause
//! - **Failure isolation**: a failing or panicking message closes its own
//!   Channel, never its neighbours
//! - **Drain on close**: closing waits for threads executing inside the
//!   Channel, or defers the close to the last one leaving
//!
//! # Channel ids
//!
//! Channel `0` is the control channel of every Connection and can never be
//! closed on its own. Other ids are drawn at random: the accepting side
//! allocates negative ids, the initiating side positive ones, so the two
//! never collide.
//!
//! # Sending
//!
//! ```rust,ignore
//! // Fire and forget.
//! channel.send(notice)?;
//!
//! // Block for the Response.
//! let response = channel.request(request)?;
//!
//! // Or track it asynchronously.
//! let status = channel.send_request(request)?;
//! let response = status.response().await?;
//! ```

#[allow(clippy::module_inception)]
mod channel;
mod id;
mod receiver;
mod request_id;
mod security;
mod status;

pub use channel::Channel;
pub(crate) use channel::panic_message;
pub use id::ChannelId;
pub use receiver::Receiver;
pub use request_id::RequestIdGenerator;
pub use security::{AccessAdapter, Subject};
pub use status::{Continuation, Status};

#[cfg(test)]
mod tests;
