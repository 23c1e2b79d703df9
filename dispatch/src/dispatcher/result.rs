use super::events::DispatchEvent;
use crate::messages::MessagePayload;

/// A single output a dispatcher produces for the connection it serves
#[derive(PartialEq, Debug, Clone)]
pub enum DispatchOutput {
    /// A message that is slated to be sent to the peer.  Messages must be sent in the order
    /// they are received from the dispatcher.
    OutboundMessage(MessagePayload),

    /// An event the dispatcher is raising so consuming applications can perform custom logic
    RaisedEvent(DispatchEvent),

    /// The dispatcher received a message type it does not handle.  This result allows the
    /// consumer application to do something with it if it wants to (special logging)
    UnhandleableMessageReceived(MessagePayload),

    /// A handler failed with a fatal error; the connection should be closed once every
    /// previously returned message has been sent
    CloseConnection,
}
