use crate::messages::SharedObjectEvent;
use crate::time::RtmpTimestamp;
use rml_amf0::Amf0Value;

/// Diagnostics a dispatcher raises so consuming applications can react to traffic that did
/// not match anything the dispatcher was tracking
#[derive(Debug, PartialEq, Clone)]
pub enum DispatchEvent {
    /// The peer sent a `_result` for a transaction we are not waiting on
    UnexpectedCallResult {
        timestamp: RtmpTimestamp,
        stream_id: u32,
        transaction_id: f64,
        arguments: Vec<Amf0Value>,
    },

    /// The peer sent an `_error` for a transaction we are not waiting on
    UnexpectedCallError {
        timestamp: RtmpTimestamp,
        stream_id: u32,
        transaction_id: f64,
        arguments: Vec<Amf0Value>,
    },

    /// The peer sent an `onStatus` notification while nothing was waiting for one on the stream
    UnhandledStatus {
        timestamp: RtmpTimestamp,
        stream_id: u32,
        info: Amf0Value,
    },

    /// The peer sent events for a shared object that is not in use
    UnknownSharedObject {
        timestamp: RtmpTimestamp,
        stream_id: u32,
        name: String,
        events: Vec<SharedObjectEvent>,
    },
}
