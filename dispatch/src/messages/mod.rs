/*!
This module contains the RTMP message types the dispatch layer works with, as well as
functionality for serializing and deserializing these messages into payloads.

Only two message types carry dispatchable content: AMF0 commands (type 20) and AMF0 shared
object updates (type 19).  Everything else is surfaced as `RtmpMessage::Unknown` so the
owner of the connection can deal with it.

`MessagePayload`s have auxiliary data about an RTMP message, such as what message stream it is
meant for, the timestamp for the message and what type of message it is.
*/

mod deserialization_errors;
mod message_payload;
mod serialization_errors;
mod types;

pub use self::deserialization_errors::MessageDeserializationError;
pub use self::message_payload::MessagePayload;
pub use self::serialization_errors::MessageSerializationError;
pub use self::types::amf0_shared_object::{decode_change_data, decode_delete_data};

use crate::time::RtmpTimestamp;
use bytes::Bytes;
use rml_amf0::Amf0Value;

/// Message type id of AMF0 encoded commands
pub const AMF0_COMMAND_TYPE_ID: u8 = 20;

/// Message type id of AMF0 encoded shared object updates
pub const AMF0_SHARED_OBJECT_TYPE_ID: u8 = 19;

/// The kind of action a shared object event represents
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum SharedObjectEventType {
    /// Client subscribes to the named shared object
    Use,

    /// Client unsubscribes from the named shared object
    Release,

    /// Client asks for a slot of the shared object to be changed
    RequestChange,

    /// A slot of the shared object has changed
    Change,

    /// Server confirms a requested change
    Success,

    /// A message broadcast to every subscriber of the shared object
    SendMessage,

    /// Status (error) notification for the shared object
    Status,

    /// The shared object has been cleared
    Clear,

    /// A slot of the shared object has been removed
    Remove,

    /// Client asks for a slot to be removed
    RequestRemove,

    /// Server confirms that a `Use` request succeeded
    UseSuccess,

    /// An event type we do not know about
    Unknown(u8),
}

impl SharedObjectEventType {
    pub fn from_id(id: u8) -> SharedObjectEventType {
        match id {
            1 => SharedObjectEventType::Use,
            2 => SharedObjectEventType::Release,
            3 => SharedObjectEventType::RequestChange,
            4 => SharedObjectEventType::Change,
            5 => SharedObjectEventType::Success,
            6 => SharedObjectEventType::SendMessage,
            7 => SharedObjectEventType::Status,
            8 => SharedObjectEventType::Clear,
            9 => SharedObjectEventType::Remove,
            10 => SharedObjectEventType::RequestRemove,
            11 => SharedObjectEventType::UseSuccess,
            x => SharedObjectEventType::Unknown(x),
        }
    }

    pub fn id(&self) -> u8 {
        match *self {
            SharedObjectEventType::Use => 1,
            SharedObjectEventType::Release => 2,
            SharedObjectEventType::RequestChange => 3,
            SharedObjectEventType::Change => 4,
            SharedObjectEventType::Success => 5,
            SharedObjectEventType::SendMessage => 6,
            SharedObjectEventType::Status => 7,
            SharedObjectEventType::Clear => 8,
            SharedObjectEventType::Remove => 9,
            SharedObjectEventType::RequestRemove => 10,
            SharedObjectEventType::UseSuccess => 11,
            SharedObjectEventType::Unknown(x) => x,
        }
    }
}

/// A single event contained in a shared object message.  The data is left raw since its
/// layout depends on the event type.
#[derive(PartialEq, Debug, Clone)]
pub struct SharedObjectEvent {
    pub event_type: SharedObjectEventType,
    pub data: Bytes,
}

impl SharedObjectEvent {
    /// Creates an event that carries no data
    pub fn empty(event_type: SharedObjectEventType) -> SharedObjectEvent {
        SharedObjectEvent {
            event_type,
            data: Bytes::new(),
        }
    }
}

/// An enumeration of all types of RTMP messages the dispatch layer understands
#[derive(PartialEq, Debug, Clone)]
pub enum RtmpMessage {
    /// This type of message is used when an RTMP message is encountered with a type id that
    /// the dispatch layer does not handle
    Unknown { type_id: u8, data: Bytes },

    /// A command being sent, encoded with amf0 values.  The arguments are every value
    /// following the transaction id, including the (usually null) command object.
    Amf0Command {
        command_name: String,
        transaction_id: f64,
        arguments: Vec<Amf0Value>,
    },

    /// A batch of events for a single named shared object
    Amf0SharedObject {
        name: String,
        version: u32,
        persistent: bool,
        events: Vec<SharedObjectEvent>,
    },
}

impl RtmpMessage {
    pub fn into_message_payload(
        self,
        timestamp: RtmpTimestamp,
        message_stream_id: u32,
    ) -> Result<MessagePayload, MessageSerializationError> {
        MessagePayload::from_rtmp_message(self, timestamp, message_stream_id)
    }

    pub fn get_message_type_id(&self) -> u8 {
        match *self {
            RtmpMessage::Unknown { type_id, .. } => type_id,
            RtmpMessage::Amf0Command { .. } => AMF0_COMMAND_TYPE_ID,
            RtmpMessage::Amf0SharedObject { .. } => AMF0_SHARED_OBJECT_TYPE_ID,
        }
    }
}
