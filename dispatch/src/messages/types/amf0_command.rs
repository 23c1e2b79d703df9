use bytes::Bytes;
use rml_amf0::Amf0Value;
use std::io::Cursor;

use crate::messages::{MessageDeserializationError, MessageSerializationError, RtmpMessage};

pub fn serialize(
    command_name: String,
    transaction_id: f64,
    mut arguments: Vec<Amf0Value>,
) -> Result<Bytes, MessageSerializationError> {
    let mut values = Vec::with_capacity(arguments.len() + 2);
    values.push(Amf0Value::Utf8String(command_name));
    values.push(Amf0Value::Number(transaction_id));
    values.append(&mut arguments);

    let bytes = rml_amf0::serialize(&values)?;
    Ok(Bytes::from(bytes))
}

pub fn deserialize(data: &[u8]) -> Result<RtmpMessage, MessageDeserializationError> {
    let mut cursor = Cursor::new(data);
    let mut arguments = rml_amf0::deserialize(&mut cursor)?;
    if arguments.len() < 2 {
        return Err(MessageDeserializationError::InvalidMessageFormat);
    }

    let command_name: String;
    let transaction_id: f64;
    {
        let mut arg_iterator = arguments.drain(..2);

        command_name = match arg_iterator.next() {
            Some(Amf0Value::Utf8String(value)) => value,
            _ => return Err(MessageDeserializationError::InvalidMessageFormat),
        };

        transaction_id = match arg_iterator.next() {
            Some(Amf0Value::Number(value)) => value,
            _ => return Err(MessageDeserializationError::InvalidMessageFormat),
        };
    }

    Ok(RtmpMessage::Amf0Command {
        command_name,
        transaction_id,
        arguments,
    })
}

#[cfg(test)]
mod tests {
    use super::{deserialize, serialize};
    use crate::messages::{MessageDeserializationError, RtmpMessage};
    use rml_amf0::Amf0Value;
    use std::collections::HashMap;
    use std::io::Cursor;

    #[test]
    fn can_serialize_message() {
        let mut properties = HashMap::new();
        properties.insert("prop1".to_string(), Amf0Value::Utf8String("abc".to_string()));

        let bytes = serialize(
            "test".to_string(),
            23.0,
            vec![Amf0Value::Object(properties.clone()), Amf0Value::Boolean(true)],
        )
        .unwrap();

        let mut cursor = Cursor::new(&bytes[..]);
        let result = rml_amf0::deserialize(&mut cursor).unwrap();

        let expected = vec![
            Amf0Value::Utf8String("test".to_string()),
            Amf0Value::Number(23.0),
            Amf0Value::Object(properties),
            Amf0Value::Boolean(true),
        ];

        assert_eq!(expected, result);
    }

    #[test]
    fn can_deserialize_message() {
        let values = vec![
            Amf0Value::Utf8String("_result".to_string()),
            Amf0Value::Number(1.0),
            Amf0Value::Null,
            Amf0Value::Utf8String("ok".to_string()),
        ];

        let bytes = rml_amf0::serialize(&values).unwrap();
        let result = deserialize(&bytes[..]).unwrap();

        let expected = RtmpMessage::Amf0Command {
            command_name: "_result".to_string(),
            transaction_id: 1.0,
            arguments: vec![Amf0Value::Null, Amf0Value::Utf8String("ok".to_string())],
        };

        assert_eq!(expected, result);
    }

    #[test]
    fn command_without_arguments_after_transaction_id_is_valid() {
        let values = vec![Amf0Value::Utf8String("ping".to_string()), Amf0Value::Number(0.0)];
        let bytes = rml_amf0::serialize(&values).unwrap();

        match deserialize(&bytes[..]).unwrap() {
            RtmpMessage::Amf0Command { ref arguments, .. } => assert!(arguments.is_empty()),
            x => panic!("Unexpected message: {:?}", x),
        }
    }

    #[test]
    fn command_with_non_numeric_transaction_id_is_rejected() {
        let values = vec![
            Amf0Value::Utf8String("play".to_string()),
            Amf0Value::Utf8String("1".to_string()),
        ];

        let bytes = rml_amf0::serialize(&values).unwrap();
        match deserialize(&bytes[..]) {
            Err(MessageDeserializationError::InvalidMessageFormat) => (),
            x => panic!("Expected invalid message format, got {:?}", x),
        }
    }
}
