use rml_amf0::Amf0Value;
use tracing::{trace, warn};

use super::shared_object::{SharedObject, SharedObjectState};
use super::{lock, split_transaction_id, tracked_transaction_id};
use super::{DispatchError, DispatchEvent, Dispatcher, ResponseFuture, ResponseSender};
use crate::messages::{MessagePayload, RtmpMessage, SharedObjectEvent, SharedObjectEventType};
use crate::time::RtmpTimestamp;

const SHARED_OBJECT_VERSION: u32 = 0;

impl Dispatcher {
    /// Calls a method on the peer.  The returned future resolves with the values of the
    /// peer's `_result` reply, or fails with its `_error` reply.
    pub fn call_remote(
        &self,
        stream_id: u32,
        name: &str,
        arguments: Vec<Amf0Value>,
    ) -> ResponseFuture<Vec<Amf0Value>> {
        let mut state = lock(&self.inner.state);
        if let Some(ref reason) = state.disconnect_reason {
            return ResponseFuture::ready(Err(DispatchError::Disconnected(reason.clone())));
        }

        let transaction_id = state.transactions.next_transaction_id(stream_id);
        let payload =
            match self.command_payload(stream_id, name, f64::from(transaction_id), arguments) {
                Ok(payload) => payload,
                Err(error) => return ResponseFuture::ready(Err(error)),
            };

        let (sender, future) = ResponseFuture::channel();
        if let Some(replaced) = state.transactions.track(stream_id, transaction_id, sender) {
            warn!(
                stream_id = stream_id,
                transaction_id = transaction_id,
                "Transaction id was reused while a call was still pending"
            );

            let _ = replaced.send(Err(DispatchError::ProtocolContract(format!(
                "transaction {} on stream {} was reused",
                transaction_id, stream_id
            ))));
        }

        self.send_message(payload);
        future
    }

    /// Invokes a method on the peer without asking for a reply
    pub fn signal_remote(
        &self,
        stream_id: u32,
        name: &str,
        arguments: Vec<Amf0Value>,
    ) -> Result<(), DispatchError> {
        let state = lock(&self.inner.state);
        if let Some(ref reason) = state.disconnect_reason {
            return Err(DispatchError::Disconnected(reason.clone()));
        }

        let payload = self.command_payload(stream_id, name, 0.0, arguments)?;
        self.send_message(payload);
        Ok(())
    }

    /// Starts using a shared object.  Completes once the server confirms the use.
    ///
    /// Fails right away, without sending anything, if a shared object with the same name is
    /// already in use on this connection.
    pub async fn use_shared_object(
        &self,
        stream_id: u32,
        name: &str,
        persistent: bool,
    ) -> Result<SharedObject, DispatchError> {
        let (ready, shared_object) = self.register_shared_object(stream_id, name, persistent)?;
        ready.await?;
        Ok(shared_object)
    }

    /// Stops using a shared object.  Its notifications close once it has been released.
    pub async fn release_shared_object(
        &self,
        stream_id: u32,
        name: &str,
    ) -> Result<(), DispatchError> {
        let mut state = lock(&self.inner.state);
        let persistent = match state.shared_objects.get(name) {
            Some(object) => object.persistent(),
            None => return Err(DispatchError::SharedObjectNotInUse(name.to_string())),
        };

        let payload =
            self.shared_object_payload(stream_id, name, persistent, SharedObjectEventType::Release)?;

        if let Some(object) = state.shared_objects.remove(name) {
            object.fail(DispatchError::SharedObjectNotInUse(name.to_string()));
        }

        self.send_message(payload);
        Ok(())
    }

    /// Applies a batch of shared object events, in order, to the named shared object
    pub fn on_shared_object_event(
        &self,
        timestamp: RtmpTimestamp,
        stream_id: u32,
        name: String,
        events: Vec<SharedObjectEvent>,
    ) {
        {
            let mut state = lock(&self.inner.state);
            if let Some(object) = state.shared_objects.get_mut(&name) {
                for event in &events {
                    object.on_event(event);
                }

                return;
            }
        }

        warn!(
            shared_object = %name,
            "Unexpected shared object event: {:?}",
            events
        );

        self.raise_event(DispatchEvent::UnknownSharedObject {
            timestamp,
            stream_id,
            name,
            events,
        });
    }

    pub(super) fn on_call_result(
        &self,
        timestamp: RtmpTimestamp,
        stream_id: u32,
        arguments: Vec<Amf0Value>,
    ) {
        let (transaction_id, values) = split_transaction_id(arguments);
        match self.resolve_transaction(stream_id, transaction_id) {
            Some(sender) => {
                let _ = sender.send(Ok(values));
            }

            None => {
                warn!(
                    stream_id = stream_id,
                    transaction_id = transaction_id,
                    "Unexpected _result: {:?}",
                    values
                );

                self.raise_event(DispatchEvent::UnexpectedCallResult {
                    timestamp,
                    stream_id,
                    transaction_id,
                    arguments: values,
                });
            }
        }
    }

    pub(super) fn on_call_error(
        &self,
        timestamp: RtmpTimestamp,
        stream_id: u32,
        arguments: Vec<Amf0Value>,
    ) {
        let (transaction_id, values) = split_transaction_id(arguments);
        match self.resolve_transaction(stream_id, transaction_id) {
            Some(sender) => {
                let error = super::CallResultError::from_arguments(values);
                let _ = sender.send(Err(DispatchError::CallFailed(error)));
            }

            None => {
                warn!(
                    stream_id = stream_id,
                    transaction_id = transaction_id,
                    "Unexpected _error: {:?}",
                    values
                );

                self.raise_event(DispatchEvent::UnexpectedCallError {
                    timestamp,
                    stream_id,
                    transaction_id,
                    arguments: values,
                });
            }
        }
    }

    fn resolve_transaction(
        &self,
        stream_id: u32,
        transaction_id: f64,
    ) -> Option<ResponseSender<Vec<Amf0Value>>> {
        let transaction_id = match tracked_transaction_id(transaction_id) {
            Some(id) => id,
            None => {
                trace!("Reply carried untracked transaction id {}", transaction_id);
                return None;
            }
        };

        lock(&self.inner.state)
            .transactions
            .resolve(stream_id, transaction_id)
    }

    fn register_shared_object(
        &self,
        stream_id: u32,
        name: &str,
        persistent: bool,
    ) -> Result<(ResponseFuture<()>, SharedObject), DispatchError> {
        let mut state = lock(&self.inner.state);
        if let Some(ref reason) = state.disconnect_reason {
            return Err(DispatchError::Disconnected(reason.clone()));
        }

        if state.shared_objects.contains_key(name) {
            return Err(DispatchError::SharedObjectAlreadyInUse(name.to_string()));
        }

        let payload =
            self.shared_object_payload(stream_id, name, persistent, SharedObjectEventType::Use)?;

        let (object, ready, shared_object) = SharedObjectState::new(name, persistent);
        state.shared_objects.insert(name.to_string(), object);
        self.send_message(payload);

        Ok((ready, shared_object))
    }

    fn shared_object_payload(
        &self,
        stream_id: u32,
        name: &str,
        persistent: bool,
        event_type: SharedObjectEventType,
    ) -> Result<MessagePayload, DispatchError> {
        let message = RtmpMessage::Amf0SharedObject {
            name: name.to_string(),
            version: SHARED_OBJECT_VERSION,
            persistent,
            events: vec![SharedObjectEvent::empty(event_type)],
        };

        Ok(message.into_message_payload(self.inner.clock.timestamp(), stream_id)?)
    }
}
