use rml_amf0::Amf0Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;

use super::errors::{DisconnectReason, DispatchError};
use super::response::{ResponseFuture, ResponseSender};

/// The information object carried by an `onStatus` notification
#[derive(Debug, Clone, PartialEq)]
pub struct StatusInfo {
    pub code: String,
    pub properties: HashMap<String, Amf0Value>,
}

impl StatusInfo {
    /// Reads the status information out of an amf0 value.  The value must be an object with a
    /// string `code` property.
    pub fn from_amf0(value: Amf0Value) -> Result<StatusInfo, DispatchError> {
        let properties = match value {
            Amf0Value::Object(properties) => properties,
            x => {
                return Err(DispatchError::ProtocolContract(format!(
                    "status information was not an object: {:?}",
                    x
                )))
            }
        };

        let code = match properties.get("code") {
            Some(Amf0Value::Utf8String(code)) => code.clone(),
            _ => {
                return Err(DispatchError::ProtocolContract(
                    "status information did not contain a code".to_string(),
                ))
            }
        };

        Ok(StatusInfo { code, properties })
    }

    pub fn level(&self) -> Option<&str> {
        self.get_string("level")
    }

    pub fn description(&self) -> Option<&str> {
        self.get_string("description")
    }

    fn get_string(&self, name: &str) -> Option<&str> {
        match self.properties.get(name) {
            Some(Amf0Value::Utf8String(value)) => Some(value.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for StatusInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.description() {
            Some(description) => write!(f, "'{}' ({})", self.code, description),
            None => write!(f, "'{}'", self.code),
        }
    }
}

struct StatusWaiter {
    expected_code: Option<String>,
    sender: ResponseSender<StatusInfo>,
}

/// Correlates pushed status notifications with code that is waiting for them.
///
/// Waiters for the same key are satisfied strictly in the order they were registered, and
/// each incoming notification consumes at most one waiter.
pub struct StatusWaiterQueue<K> {
    waiters: HashMap<K, VecDeque<StatusWaiter>>,
}

impl<K: Hash + Eq> StatusWaiterQueue<K> {
    pub fn new() -> StatusWaiterQueue<K> {
        StatusWaiterQueue {
            waiters: HashMap::new(),
        }
    }

    /// Queues a waiter for the next status notification on the key.  With no expected code any
    /// status code satisfies the waiter.
    pub fn wait(&mut self, key: K, expected_code: Option<String>) -> ResponseFuture<StatusInfo> {
        let (sender, future) = ResponseFuture::channel();
        self.waiters
            .entry(key)
            .or_insert_with(VecDeque::new)
            .push_back(StatusWaiter {
                expected_code,
                sender,
            });

        future
    }

    /// Hands a status notification to the oldest waiter for the key.  If nothing is waiting,
    /// `on_miss` receives the notification instead.
    pub fn dispatch<F>(&mut self, key: &K, info: Amf0Value, on_miss: F)
    where
        F: FnOnce(Amf0Value),
    {
        let StatusWaiter {
            expected_code,
            sender,
        } = match self.pop(key) {
            Some(waiter) => waiter,
            None => return on_miss(info),
        };

        let result = StatusInfo::from_amf0(info).and_then(|info| match expected_code {
            Some(expected) if expected != info.code => {
                Err(DispatchError::UnexpectedStatus { expected, info })
            }

            _ => Ok(info),
        });

        let _ = sender.send(result);
    }

    /// Fails every waiter with the disconnect reason and empties every queue
    pub fn cancel_all(&mut self, reason: &DisconnectReason) {
        for (_, queue) in self.waiters.drain() {
            for waiter in queue {
                let _ = waiter
                    .sender
                    .send(Err(DispatchError::Disconnected(reason.clone())));
            }
        }
    }

    /// Number of waiters queued for the key
    pub fn waiting_count(&self, key: &K) -> usize {
        self.waiters.get(key).map_or(0, |queue| queue.len())
    }

    fn pop(&mut self, key: &K) -> Option<StatusWaiter> {
        let queue = self.waiters.get_mut(key)?;
        let waiter = queue.pop_front();
        if queue.is_empty() {
            self.waiters.remove(key);
        }

        waiter
    }
}

impl<K: Hash + Eq> Default for StatusWaiterQueue<K> {
    fn default() -> Self {
        StatusWaiterQueue::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn status(code: &str) -> Amf0Value {
        let mut properties = HashMap::new();
        properties.insert("code".to_string(), Amf0Value::Utf8String(code.to_string()));
        properties.insert("level".to_string(), Amf0Value::Utf8String("status".to_string()));
        Amf0Value::Object(properties)
    }

    fn no_miss(info: Amf0Value) {
        panic!("Unexpected miss for {:?}", info);
    }

    #[test]
    fn two_events_resolve_two_waiters_fifo() {
        let mut queue = StatusWaiterQueue::new();
        let mut first = queue.wait(5, None);
        let mut second = queue.wait(5, None);

        queue.dispatch(&5, status("NetStream.Play.Reset"), no_miss);
        assert!((&mut second).now_or_never().is_none(), "Second waiter resolved early");

        queue.dispatch(&5, status("NetStream.Play.Start"), no_miss);

        let first = (&mut first).now_or_never().unwrap().unwrap();
        let second = (&mut second).now_or_never().unwrap().unwrap();
        assert_eq!(first.code, "NetStream.Play.Reset");
        assert_eq!(second.code, "NetStream.Play.Start");
    }

    #[test]
    fn mismatched_code_fails_waiter_with_event() {
        let mut queue = StatusWaiterQueue::new();
        let waiter = queue.wait(1, Some("NetStream.Play.Start".to_string()));
        let other = queue.wait(1, Some("NetStream.Play.Stop".to_string()));

        queue.dispatch(&1, status("NetStream.Play.Stop"), no_miss);

        match waiter.now_or_never() {
            Some(Err(DispatchError::UnexpectedStatus { expected, info })) => {
                assert_eq!(expected, "NetStream.Play.Start");
                assert_eq!(info.code, "NetStream.Play.Stop");
            }

            x => panic!("Expected unexpected status error, got {:?}", x),
        }

        assert!(other.now_or_never().is_none(), "Mismatch was retried on the next waiter");
        assert_eq!(queue.waiting_count(&1), 1);
    }

    #[test]
    fn matching_code_fulfills_waiter() {
        let mut queue = StatusWaiterQueue::new();
        let waiter = queue.wait(1, Some("NetStream.Publish.Start".to_string()));

        queue.dispatch(&1, status("NetStream.Publish.Start"), no_miss);

        let info = waiter.now_or_never().unwrap().unwrap();
        assert_eq!(info.level(), Some("status"));
    }

    #[test]
    fn info_without_code_is_a_contract_error() {
        let mut queue = StatusWaiterQueue::new();
        let waiter = queue.wait(1, None);

        queue.dispatch(&1, Amf0Value::Object(HashMap::new()), no_miss);

        match waiter.now_or_never() {
            Some(Err(DispatchError::ProtocolContract(_))) => (),
            x => panic!("Expected protocol contract error, got {:?}", x),
        }
    }

    #[test]
    fn dispatch_without_waiter_calls_miss_handler() {
        let mut queue: StatusWaiterQueue<u32> = StatusWaiterQueue::new();
        let mut missed = Vec::new();

        queue.dispatch(&5, status("NetStream.Play.Start"), |info| missed.push(info));

        assert_eq!(missed, vec![status("NetStream.Play.Start")]);
    }

    #[test]
    fn waiters_on_other_keys_are_not_touched() {
        let mut queue = StatusWaiterQueue::new();
        let waiter = queue.wait(1, None);
        let mut missed = 0;

        queue.dispatch(&2, status("NetStream.Play.Start"), |_| missed += 1);

        assert_eq!(missed, 1);
        assert_eq!(queue.waiting_count(&1), 1);
        drop(waiter);
    }

    #[test]
    fn cancel_all_fails_every_waiter() {
        let mut queue = StatusWaiterQueue::new();
        let first = queue.wait(1, None);
        let second = queue.wait(2, Some("NetStream.Play.Start".to_string()));

        queue.cancel_all(&DisconnectReason::ConnectionDone);

        for waiter in vec![first, second] {
            match waiter.now_or_never() {
                Some(Err(DispatchError::Disconnected(DisconnectReason::ConnectionDone))) => (),
                x => panic!("Expected disconnection, got {:?}", x),
            }
        }

        assert_eq!(queue.waiting_count(&1), 0);
        assert_eq!(queue.waiting_count(&2), 0);
    }
}
