use rml_amf0::Amf0Value;
use tracing::warn;

use super::{lock, split_transaction_id};
use super::{DispatchError, DispatchEvent, Dispatcher, ResponseFuture, StatusInfo};
use crate::time::RtmpTimestamp;

impl Dispatcher {
    /// Waits for the next `onStatus` notification on the stream.
    ///
    /// Waiters on a stream are satisfied in the order they were registered.  When a code is
    /// given, a notification carrying any other code fails the waiter with
    /// `DispatchError::UnexpectedStatus`.
    pub fn wait_status(&self, stream_id: u32, code: Option<&str>) -> ResponseFuture<StatusInfo> {
        let mut state = lock(&self.inner.state);
        if let Some(ref reason) = state.disconnect_reason {
            return ResponseFuture::ready(Err(DispatchError::Disconnected(reason.clone())));
        }

        state
            .status_waiters
            .wait(stream_id, code.map(|code| code.to_string()))
    }

    pub(super) fn on_status(
        &self,
        timestamp: RtmpTimestamp,
        stream_id: u32,
        arguments: Vec<Amf0Value>,
    ) {
        // Transaction id, then the command object placeholder, then the information object
        let (_, mut arguments) = split_transaction_id(arguments);
        let info = if arguments.len() > 1 {
            arguments.swap_remove(1)
        } else {
            Amf0Value::Null
        };

        let mut unhandled = None;
        lock(&self.inner.state)
            .status_waiters
            .dispatch(&stream_id, info, |info| unhandled = Some(info));

        if let Some(info) = unhandled {
            warn!(stream_id = stream_id, "Unhandled onStatus: {:?}", info);
            self.raise_event(DispatchEvent::UnhandledStatus {
                timestamp,
                stream_id,
                info,
            });
        }
    }
}
