use super::types;
use super::{MessageDeserializationError, MessageSerializationError, RtmpMessage};
use super::{AMF0_COMMAND_TYPE_ID, AMF0_SHARED_OBJECT_TYPE_ID};
use crate::time::RtmpTimestamp;
use bytes::Bytes;

/// Represents a raw RTMP message
#[derive(PartialEq, Debug, Clone)]
pub struct MessagePayload {
    pub timestamp: RtmpTimestamp,
    pub type_id: u8,
    pub message_stream_id: u32,
    pub data: Bytes,
}

impl MessagePayload {
    pub fn to_rtmp_message(&self) -> Result<RtmpMessage, MessageDeserializationError> {
        match self.type_id {
            AMF0_COMMAND_TYPE_ID => types::amf0_command::deserialize(&self.data[..]),
            AMF0_SHARED_OBJECT_TYPE_ID => types::amf0_shared_object::deserialize(self.data.clone()),
            _ => Ok(RtmpMessage::Unknown {
                type_id: self.type_id,
                data: self.data.clone(),
            }),
        }
    }

    pub fn from_rtmp_message(
        message: RtmpMessage,
        timestamp: RtmpTimestamp,
        message_stream_id: u32,
    ) -> Result<MessagePayload, MessageSerializationError> {
        let type_id = message.get_message_type_id();

        let data = match message {
            RtmpMessage::Unknown { type_id: _, data } => data,

            RtmpMessage::Amf0Command {
                command_name,
                transaction_id,
                arguments,
            } => types::amf0_command::serialize(command_name, transaction_id, arguments)?,

            RtmpMessage::Amf0SharedObject {
                name,
                version,
                persistent,
                events,
            } => types::amf0_shared_object::serialize(&name, version, persistent, &events)?,
        };

        Ok(MessagePayload {
            data,
            type_id,
            message_stream_id,
            timestamp,
        })
    }
}
