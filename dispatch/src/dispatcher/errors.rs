use rml_amf0::Amf0Value;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use thiserror::Error;

use super::status_waiters::StatusInfo;
use crate::messages::{MessageDeserializationError, MessageSerializationError};

/// Why the connection a dispatcher was serving went away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The connection was closed cleanly
    ConnectionDone,

    /// The connection was lost, for example due to a socket error
    ConnectionLost(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            DisconnectReason::ConnectionDone => write!(f, "connection was closed cleanly"),
            DisconnectReason::ConnectionLost(ref reason) => write!(f, "connection lost: {}", reason),
        }
    }
}

/// Errors that callers of the dispatcher can observe, either directly or through the futures
/// it hands out.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A status notification arrived with a different code than the waiter expected
    #[error("Expected status '{expected}' but received {info}")]
    UnexpectedStatus { expected: String, info: StatusInfo },

    /// The peer sent something that does not have the shape the protocol requires
    #[error("The peer violated the protocol contract: {0}")]
    ProtocolContract(String),

    /// The peer replied to a call with `_error`
    #[error("The remote call failed: {0}")]
    CallFailed(#[from] CallResultError),

    /// The connection went away before the operation could complete
    #[error("The connection is gone ({0})")]
    Disconnected(DisconnectReason),

    /// A `use` was attempted for a shared object that is already in use on this connection
    #[error("Shared object '{0}' is already in use")]
    SharedObjectAlreadyInUse(String),

    /// A shared object operation was attempted for a name that is not in use
    #[error("Shared object '{0}' is not in use")]
    SharedObjectNotInUse(String),

    /// The shared object a notification belonged to is no longer in use
    #[error("The notification channel was closed before it fired")]
    NotificationClosed,

    /// The dispatcher went away without resolving a response
    #[error("The response was dropped before it was resolved")]
    ResponseDropped,

    /// Encountered when an error occurs while turning an RTMP message into an message payload
    #[error(
        "An error occurred while attempting to turn an RTMP message into a message payload: {0}"
    )]
    MessageSerializationError(#[from] MessageSerializationError),

    /// Encountered when an error occurs while turning a message payload into an RTMP message
    #[error(
        "An error occurred while attempting to turn a message payload into an RTMP message: {0}"
    )]
    MessageDeserializationError(#[from] MessageDeserializationError),
}

/// A structured error that is carried on the wire in an `_error` reply.
///
/// The peer produces one when it rejects a call we made, and local remote method handlers
/// return one to control exactly what `_error` reply is sent.  A fatal error causes the
/// connection to be closed right after the reply has been sent.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResultError {
    arguments: Vec<Amf0Value>,
    fatal: bool,
}

impl CallResultError {
    /// Creates a non-fatal error with the conventional `null, {level, code, description}`
    /// arguments
    pub fn new(code: &str, description: &str) -> CallResultError {
        let mut properties = HashMap::with_capacity(3);
        properties.insert("level".to_string(), Amf0Value::Utf8String("error".to_string()));
        properties.insert("code".to_string(), Amf0Value::Utf8String(code.to_string()));
        properties.insert(
            "description".to_string(),
            Amf0Value::Utf8String(description.to_string()),
        );

        CallResultError {
            arguments: vec![Amf0Value::Null, Amf0Value::Object(properties)],
            fatal: false,
        }
    }

    /// Creates an error that closes the connection once its reply has been sent
    pub fn fatal(code: &str, description: &str) -> CallResultError {
        CallResultError::new(code, description).with_fatal(true)
    }

    /// Wraps the arguments of an `_error` reply as they came off the wire
    pub fn from_arguments(arguments: Vec<Amf0Value>) -> CallResultError {
        CallResultError {
            arguments,
            fatal: false,
        }
    }

    pub fn with_fatal(mut self, fatal: bool) -> CallResultError {
        self.fatal = fatal;
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// The values that follow the transaction id in the `_error` reply
    pub fn arguments(&self) -> &[Amf0Value] {
        &self.arguments
    }

    pub fn into_arguments(self) -> Vec<Amf0Value> {
        self.arguments
    }

    /// The first object among the arguments, which by convention holds the error details
    pub fn info(&self) -> Option<&HashMap<String, Amf0Value>> {
        self.arguments.iter().find_map(|value| match value {
            Amf0Value::Object(properties) => Some(properties),
            _ => None,
        })
    }

    pub fn code(&self) -> Option<&str> {
        self.info_string("code")
    }

    pub fn description(&self) -> Option<&str> {
        self.info_string("description")
    }

    fn info_string(&self, name: &str) -> Option<&str> {
        match self.info()?.get(name) {
            Some(Amf0Value::Utf8String(value)) => Some(value.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for CallResultError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.code(), self.description()) {
            (Some(code), Some(description)) => write!(f, "{}: {}", code, description),
            (Some(code), None) => write!(f, "{}", code),
            _ => write!(f, "{:?}", self.arguments),
        }
    }
}

impl Error for CallResultError {}

/// The ways a locally registered handler can fail
#[derive(Debug, Error)]
pub enum MethodError {
    /// The call should be silently ignored, no reply is sent to the peer
    #[error("Call aborted: {0}")]
    Aborted(String),

    /// Reply with this exact `_error`, and close the connection afterwards if it is fatal
    #[error(transparent)]
    CallResult(#[from] CallResultError),

    /// A nested dispatcher operation failed
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Any other failure
    #[error("{0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_error_carries_conventional_arguments() {
        let error = CallResultError::new("NetStream.Play.StreamNotFound", "no such stream");

        assert_eq!(error.arguments().len(), 2, "Unexpected argument count");
        assert_eq!(error.arguments()[0], Amf0Value::Null);
        assert_eq!(error.code(), Some("NetStream.Play.StreamNotFound"));
        assert_eq!(error.description(), Some("no such stream"));
        assert!(!error.is_fatal(), "Errors should not be fatal by default");
    }

    #[test]
    fn fatal_constructor_marks_error_fatal() {
        let error = CallResultError::fatal("NetConnection.Connect.Rejected", "go away");
        assert!(error.is_fatal());
    }

    #[test]
    fn errors_from_wire_arguments_without_info_still_display() {
        let error = CallResultError::from_arguments(vec![Amf0Value::Number(5.0)]);

        assert_eq!(error.code(), None);
        assert!(!error.to_string().is_empty());
    }
}
