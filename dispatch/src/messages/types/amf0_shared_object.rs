use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use rml_amf0::Amf0Value;
use std::io::{Cursor, Read};

use crate::messages::{MessageDeserializationError, MessageSerializationError, RtmpMessage};
use crate::messages::{SharedObjectEvent, SharedObjectEventType};

const PERSISTENT_FLAGS: [u8; 8] = [0, 0, 0, 2, 0, 0, 0, 0];
const TRANSIENT_FLAGS: [u8; 8] = [0; 8];

pub fn serialize(
    name: &str,
    version: u32,
    persistent: bool,
    events: &[SharedObjectEvent],
) -> Result<Bytes, MessageSerializationError> {
    let mut bytes = Vec::new();
    write_string(&mut bytes, name)?;
    bytes.write_u32::<BigEndian>(version)?;

    if persistent {
        bytes.extend_from_slice(&PERSISTENT_FLAGS);
    } else {
        bytes.extend_from_slice(&TRANSIENT_FLAGS);
    }

    for event in events {
        if event.data.len() > u32::MAX as usize {
            return Err(MessageSerializationError::EventDataTooLong(event.data.len()));
        }

        bytes.push(event.event_type.id());
        bytes.write_u32::<BigEndian>(event.data.len() as u32)?;
        bytes.extend_from_slice(&event.data[..]);
    }

    Ok(Bytes::from(bytes))
}

pub fn deserialize(data: Bytes) -> Result<RtmpMessage, MessageDeserializationError> {
    let mut cursor = Cursor::new(&data[..]);
    let name = read_string(&mut cursor)?;
    let version = cursor.read_u32::<BigEndian>()?;

    let mut flags = [0_u8; 8];
    cursor.read_exact(&mut flags)?;
    let persistent = flags[3] & PERSISTENT_FLAGS[3] != 0;

    let mut events = Vec::new();
    while (cursor.position() as usize) < data.len() {
        let event_type = SharedObjectEventType::from_id(cursor.read_u8()?);
        let length = cursor.read_u32::<BigEndian>()? as usize;

        let start = cursor.position() as usize;
        let end = match start.checked_add(length) {
            Some(end) if end <= data.len() => end,
            _ => return Err(MessageDeserializationError::InvalidMessageFormat),
        };

        events.push(SharedObjectEvent {
            event_type,
            data: data.slice(start..end),
        });

        cursor.set_position(end as u64);
    }

    Ok(RtmpMessage::Amf0SharedObject {
        name,
        version,
        persistent,
        events,
    })
}

/// Reads the slot name and new value out of the data of a `Change` event.  Only the first
/// slot of the event is read.
pub fn decode_change_data(data: &[u8]) -> Result<(String, Amf0Value), MessageDeserializationError> {
    let mut cursor = Cursor::new(data);
    let key = read_string(&mut cursor)?;
    let mut values = rml_amf0::deserialize(&mut cursor)?;
    if values.is_empty() {
        return Err(MessageDeserializationError::InvalidMessageFormat);
    }

    Ok((key, values.swap_remove(0)))
}

/// Reads the name of the removed slot out of the data of a `Remove` event
pub fn decode_delete_data(data: &[u8]) -> Result<String, MessageDeserializationError> {
    let mut cursor = Cursor::new(data);
    read_string(&mut cursor)
}

fn read_string<R: Read>(reader: &mut R) -> Result<String, MessageDeserializationError> {
    let length = reader.read_u16::<BigEndian>()? as usize;
    let mut buffer = vec![0_u8; length];
    reader.read_exact(&mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}

fn write_string(bytes: &mut Vec<u8>, value: &str) -> Result<(), MessageSerializationError> {
    if value.len() > u16::MAX as usize {
        return Err(MessageSerializationError::StringTooLong(value.len()));
    }

    bytes.write_u16::<BigEndian>(value.len() as u16)?;
    bytes.extend_from_slice(value.as_bytes());
    Ok(())
}
