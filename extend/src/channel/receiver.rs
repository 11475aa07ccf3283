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

//! Application hooks attached to a Channel.

use crate::channel::Channel;
use crate::error::ExtendError;
use crate::protocol::{Message, Protocol};
use std::sync::Arc;

/// Handles the messages arriving on the Channels it is attached to.
///
/// A receiver serves exactly one protocol; attaching it to a Channel of a
/// different protocol is rejected. Lifecycle callbacks report failures by
/// returning an error, which the Channel logs and otherwise ignores.
pub trait Receiver: Send + Sync + 'static {
    /// Name under which peers can open Channels to this receiver.
    fn name(&self) -> &str;

    /// The protocol this receiver understands.
    fn protocol(&self) -> Arc<Protocol>;

    /// Called when a Channel using this receiver opens.
    fn register_channel(&self, channel: &Arc<Channel>) -> Result<(), ExtendError> {
        let _ = channel;
        Ok(())
    }

    /// Called while a Channel using this receiver closes.
    fn unregister_channel(&self, channel: &Arc<Channel>) -> Result<(), ExtendError> {
        let _ = channel;
        Ok(())
    }

    /// Called after a Channel using this receiver has closed.
    fn on_channel_closed(&self, channel: &Arc<Channel>) -> Result<(), ExtendError> {
        let _ = channel;
        Ok(())
    }

    /// Handles a received request or plain message.
    ///
    /// Receivers that only observe messages can finish with
    /// `message.dispatch(channel)` to run the message's own behavior.
    fn on_message(&self, channel: &Arc<Channel>, message: &mut dyn Message) -> Result<(), ExtendError>;
}
