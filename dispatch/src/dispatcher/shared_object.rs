use rml_amf0::Amf0Value;
use tracing::{trace, warn};

use super::errors::DispatchError;
use super::response::{Notification, Notifier, ResponseFuture, ResponseSender};
use crate::messages::{
    decode_change_data, decode_delete_data, SharedObjectEvent, SharedObjectEventType,
};

/// A slot of a shared object that the server reported as changed
#[derive(Debug, Clone, PartialEq)]
pub struct SharedObjectChange {
    pub key: String,
    pub value: Amf0Value,
}

/// The application's view of a shared object that is in use.
///
/// Each notification resolves with the occurrence and the subscription for the next one, so
/// a change can only ever be observed once per subscription.  Both notifications close when
/// the shared object is released or the connection goes away.
#[derive(Debug)]
pub struct SharedObject {
    pub name: String,
    pub persistent: bool,
    pub changed: Notification<SharedObjectChange>,
    pub deleted: Notification<String>,
}

/// The dispatcher's bookkeeping for a single shared object in use on the connection
pub(crate) struct SharedObjectState {
    name: String,
    persistent: bool,
    ready: Option<ResponseSender<()>>,
    changed: Notifier<SharedObjectChange>,
    deleted: Notifier<String>,
}

impl SharedObjectState {
    /// Creates the state for a shared object about to be used, along with the future that
    /// resolves once the server confirms the use and the handle given to the application.
    pub(crate) fn new(
        name: &str,
        persistent: bool,
    ) -> (SharedObjectState, ResponseFuture<()>, SharedObject) {
        let (ready, ready_future) = ResponseFuture::channel();
        let (changed, changed_subscription) = Notifier::channel();
        let (deleted, deleted_subscription) = Notifier::channel();

        let state = SharedObjectState {
            name: name.to_string(),
            persistent,
            ready: Some(ready),
            changed,
            deleted,
        };

        let handle = SharedObject {
            name: name.to_string(),
            persistent,
            changed: changed_subscription,
            deleted: deleted_subscription,
        };

        (state, ready_future, handle)
    }

    pub(crate) fn persistent(&self) -> bool {
        self.persistent
    }

    #[cfg(test)]
    pub(crate) fn is_ready(&self) -> bool {
        self.ready.is_none()
    }

    pub(crate) fn on_event(&mut self, event: &SharedObjectEvent) {
        match event.event_type {
            SharedObjectEventType::UseSuccess => self.on_use_success(event),
            SharedObjectEventType::Change => self.on_change(event),
            SharedObjectEventType::Remove => self.on_remove(event),

            SharedObjectEventType::Clear => {
                if !event.data.is_empty() {
                    warn!(
                        shared_object = %self.name,
                        "Clear event carried {} bytes of data, expected none",
                        event.data.len()
                    );
                }
            }

            SharedObjectEventType::SendMessage => {
                trace!(shared_object = %self.name, "Ignoring shared object message");
            }

            other => {
                warn!(
                    shared_object = %self.name,
                    "Unhandled shared object event {:?}",
                    other
                );
            }
        }
    }

    /// Fails a use that was never confirmed.  Subscribers see their notifications close once
    /// the state is dropped.
    pub(crate) fn fail(mut self, error: DispatchError) {
        if let Some(ready) = self.ready.take() {
            let _ = ready.send(Err(error));
        }
    }

    fn on_use_success(&mut self, event: &SharedObjectEvent) {
        if !event.data.is_empty() {
            warn!(
                shared_object = %self.name,
                "Use success event carried {} bytes of data, expected none",
                event.data.len()
            );
        }

        match self.ready.take() {
            Some(ready) => {
                let _ = ready.send(Ok(()));
            }

            None => warn!(
                shared_object = %self.name,
                "Received a repeated use success, ignoring it"
            ),
        }
    }

    fn on_change(&mut self, event: &SharedObjectEvent) {
        match decode_change_data(&event.data[..]) {
            Ok((key, value)) => self.changed.notify(SharedObjectChange { key, value }),
            Err(error) => warn!(
                shared_object = %self.name,
                "Dropping change event that could not be decoded: {}",
                error
            ),
        }
    }

    fn on_remove(&mut self, event: &SharedObjectEvent) {
        match decode_delete_data(&event.data[..]) {
            Ok(key) => self.deleted.notify(key),
            Err(error) => warn!(
                shared_object = %self.name,
                "Dropping delete event that could not be decoded: {}",
                error
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::DisconnectReason;
    use bytes::{BufMut, Bytes, BytesMut};
    use futures::FutureExt;

    fn key_bytes(key: &str) -> BytesMut {
        let mut bytes = BytesMut::new();
        bytes.put_u16(key.len() as u16);
        bytes.put_slice(key.as_bytes());
        bytes
    }

    fn change_event(key: &str, value: Amf0Value) -> SharedObjectEvent {
        let mut data = key_bytes(key);
        data.put_slice(&rml_amf0::serialize(&vec![value]).unwrap());

        SharedObjectEvent {
            event_type: SharedObjectEventType::Change,
            data: data.freeze(),
        }
    }

    fn remove_event(key: &str) -> SharedObjectEvent {
        SharedObjectEvent {
            event_type: SharedObjectEventType::Remove,
            data: key_bytes(key).freeze(),
        }
    }

    #[test]
    fn use_success_fulfills_ready_once() {
        let (mut state, ready, _handle) = SharedObjectState::new("chat", false);
        assert!(!state.is_ready());

        state.on_event(&SharedObjectEvent::empty(SharedObjectEventType::UseSuccess));
        state.on_event(&SharedObjectEvent::empty(SharedObjectEventType::UseSuccess));

        assert!(state.is_ready());
        match ready.now_or_never() {
            Some(Ok(())) => (),
            x => panic!("Expected ready to be fulfilled, got {:?}", x),
        }
    }

    #[test]
    fn change_yields_fresh_subscription_for_later_changes() {
        let (mut state, _ready, handle) = SharedObjectState::new("chat", false);

        state.on_event(&change_event("topic", Amf0Value::Utf8String("rust".to_string())));
        let notified = handle.changed.now_or_never().unwrap().unwrap();
        assert_eq!(notified.value.key, "topic");
        assert_eq!(notified.value.value, Amf0Value::Utf8String("rust".to_string()));

        let mut next = notified.next;
        assert!((&mut next).now_or_never().is_none(), "Fresh subscription saw an old change");

        state.on_event(&change_event("count", Amf0Value::Number(2.0)));
        let notified = next.now_or_never().unwrap().unwrap();
        assert_eq!(notified.value.key, "count");
        assert_eq!(notified.value.value, Amf0Value::Number(2.0));
    }

    #[test]
    fn remove_notifies_deleted_subscription() {
        let (mut state, _ready, handle) = SharedObjectState::new("chat", true);

        state.on_event(&remove_event("topic"));

        let notified = handle.deleted.now_or_never().unwrap().unwrap();
        assert_eq!(notified.value, "topic");
    }

    #[test]
    fn undecodable_change_is_dropped_without_closing_subscription() {
        let (mut state, _ready, handle) = SharedObjectState::new("chat", false);
        let mut changed = handle.changed;

        state.on_event(&SharedObjectEvent {
            event_type: SharedObjectEventType::Change,
            data: Bytes::from_static(&[0, 10, b'a']),
        });
        assert!((&mut changed).now_or_never().is_none());

        state.on_event(&change_event("topic", Amf0Value::Null));
        let notified = changed.now_or_never().unwrap().unwrap();
        assert_eq!(notified.value.key, "topic");
    }

    #[test]
    fn clear_message_and_unknown_events_change_nothing() {
        let (mut state, ready, handle) = SharedObjectState::new("chat", false);
        let mut changed = handle.changed;
        let mut ready = ready;

        state.on_event(&SharedObjectEvent::empty(SharedObjectEventType::Clear));
        state.on_event(&SharedObjectEvent {
            event_type: SharedObjectEventType::Clear,
            data: Bytes::from_static(&[1, 2, 3]),
        });
        state.on_event(&SharedObjectEvent::empty(SharedObjectEventType::SendMessage));
        state.on_event(&SharedObjectEvent::empty(SharedObjectEventType::Unknown(42)));

        assert!((&mut changed).now_or_never().is_none());
        assert!((&mut ready).now_or_never().is_none());
        assert!(!state.is_ready());
    }

    #[test]
    fn failing_state_rejects_ready_and_closes_notifications() {
        let (state, ready, handle) = SharedObjectState::new("chat", false);

        state.fail(DispatchError::Disconnected(DisconnectReason::ConnectionDone));

        match ready.now_or_never() {
            Some(Err(DispatchError::Disconnected(DisconnectReason::ConnectionDone))) => (),
            x => panic!("Expected disconnection, got {:?}", x),
        }

        match handle.changed.now_or_never() {
            Some(Err(DispatchError::NotificationClosed)) => (),
            x => panic!("Expected closed notification, got {:?}", x),
        }
    }
}
