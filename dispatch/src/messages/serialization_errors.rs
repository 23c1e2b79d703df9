use rml_amf0::Amf0SerializationError;
use thiserror::Error;

use std::io;

/// Enumeration that represents the various errors that may occur while trying to
/// serialize a RTMP message into a raw RTMP payload.
#[derive(Debug, Error)]
pub enum MessageSerializationError {
    /// A length prefixed string was longer than a 16 bit length can describe
    #[error("Cannot serialize a string of {0} bytes, the maximum is 65535")]
    StringTooLong(usize),

    /// A shared object event carried more data than a 32 bit length can describe
    #[error("Cannot serialize a shared object event with {0} bytes of data")]
    EventDataTooLong(usize),

    /// The values provided could not be serialized into valid AMF0 encoded data
    #[error("The values provided could not be serialized into valid AMF0 encoded data: {0}")]
    Amf0SerializationError(#[from] Amf0SerializationError),

    /// Failed to write the values to the output buffer
    #[error("An IO error occurred while writing the output: {0}")]
    Io(#[from] io::Error),
}
