/*!
Connection scoped dispatch of RTMP commands, replies, status notifications and shared object
updates.

A `Dispatcher` is created for each connection.  Incoming message payloads are handed to it as
they are deserialized, and everything it wants the connection to do (send a message, close the
connection, surface a diagnostic event) comes out of the `DispatchOutput` receiver returned
when it was built.  Handles to the dispatcher are cheap to clone and can be used from any task
to call the peer, wait for status notifications or use shared objects.
*/

mod command;
mod config;
mod errors;
mod events;
mod handlers;
mod remote_call;
mod response;
mod result;
mod scheduled_calls;
mod shared_object;
mod status;
mod status_waiters;
mod transaction_tracker;


use futures::FutureExt;
use rml_amf0::Amf0Value;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use self::response::ResponseSender;
use self::shared_object::SharedObjectState;
use crate::messages::{MessagePayload, RtmpMessage};
use crate::time::{RtmpTimestamp, SessionClock};

pub use self::config::DispatcherConfig;
pub use self::errors::{CallResultError, DisconnectReason, DispatchError, MethodError};
pub use self::events::DispatchEvent;
pub use self::handlers::{CallContext, CommandHandler, RemoteMethod};
pub use self::response::{Notification, Notified, ResponseFuture};
pub use self::result::DispatchOutput;
pub use self::scheduled_calls::{CallKey, ScheduledCallRegistry};
pub use self::shared_object::{SharedObject, SharedObjectChange};
pub use self::status_waiters::{StatusInfo, StatusWaiterQueue};
pub use self::transaction_tracker::TransactionTracker;

const CALL_RESULT_COMMAND: &str = "_result";
const CALL_ERROR_COMMAND: &str = "_error";
const ON_STATUS_COMMAND: &str = "onStatus";

/// Locks a mutex, carrying on with the inner value if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum CommandRoute {
    CallResult,
    CallError,
    OnStatus,
    Handler(Arc<dyn CommandHandler>),
}

struct DispatcherState {
    transactions: TransactionTracker<ResponseSender<Vec<Amf0Value>>>,
    status_waiters: StatusWaiterQueue<u32>,
    shared_objects: HashMap<String, SharedObjectState>,
    disconnect_reason: Option<DisconnectReason>,
}

struct DispatcherInner {
    config: DispatcherConfig,
    clock: SessionClock,
    outputs: mpsc::UnboundedSender<DispatchOutput>,
    routes: HashMap<String, CommandRoute>,
    remote_methods: HashMap<String, Arc<dyn RemoteMethod>>,
    scheduled_calls: ScheduledCallRegistry,
    state: Mutex<DispatcherState>,
}

/// Routes the commands of a single RTMP connection and keeps track of everything that is
/// waiting on the peer.
///
/// Incoming commands are matched by name, in order, against the built in reply routes
/// (`_result`, `_error`), the `onStatus` route, the command handlers and finally the remote
/// methods registered on the `DispatcherBuilder`.  Incoming commands are dispatched one at a
/// time, in arrival order, by a tokio task owned by the dispatcher, so a dispatcher must be
/// driven from within a tokio runtime.  A handler that suspends finishes on its own task and
/// does not hold up later commands.
///
/// Outbound messages must be sent to the peer in the order they come out of the output
/// receiver.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

/// Registers the handlers a dispatcher routes incoming commands to
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    command_handlers: HashMap<String, Arc<dyn CommandHandler>>,
    remote_methods: HashMap<String, Arc<dyn RemoteMethod>>,
}

impl DispatcherBuilder {
    pub fn new(config: DispatcherConfig) -> DispatcherBuilder {
        DispatcherBuilder {
            config,
            command_handlers: HashMap::new(),
            remote_methods: HashMap::new(),
        }
    }

    /// Registers a handler for a command the peer sends without expecting a reply
    pub fn command<H: CommandHandler>(mut self, name: &str, handler: H) -> DispatcherBuilder {
        self.command_handlers
            .insert(name.to_string(), Arc::new(handler));
        self
    }

    /// Registers a method the peer can call
    pub fn remote_method<M: RemoteMethod>(mut self, name: &str, method: M) -> DispatcherBuilder {
        self.remote_methods.insert(name.to_string(), Arc::new(method));
        self
    }

    pub fn build(self) -> (Dispatcher, mpsc::UnboundedReceiver<DispatchOutput>) {
        let mut routes = HashMap::new();
        routes.insert(CALL_RESULT_COMMAND.to_string(), CommandRoute::CallResult);
        routes.insert(CALL_ERROR_COMMAND.to_string(), CommandRoute::CallError);
        routes.insert(ON_STATUS_COMMAND.to_string(), CommandRoute::OnStatus);

        for (name, handler) in self.command_handlers {
            if routes.contains_key(&name) {
                warn!(command = %name, "Ignoring command handler for a reserved command name");
                continue;
            }

            routes.insert(name, CommandRoute::Handler(handler));
        }

        let mut remote_methods = self.remote_methods;
        remote_methods.retain(|name, _| match routes.get(name) {
            None => true,
            Some(_) => {
                warn!(method = %name, "Ignoring remote method shadowed by a command route");
                false
            }
        });

        let (sender, receiver) = mpsc::unbounded_channel();
        let inner = DispatcherInner {
            config: self.config,
            clock: SessionClock::start(),
            outputs: sender,
            routes,
            remote_methods,
            scheduled_calls: ScheduledCallRegistry::new(),
            state: Mutex::new(DispatcherState {
                transactions: TransactionTracker::new(),
                status_waiters: StatusWaiterQueue::new(),
                shared_objects: HashMap::new(),
                disconnect_reason: None,
            }),
        };

        let dispatcher = Dispatcher {
            inner: Arc::new(inner),
        };

        (dispatcher, receiver)
    }
}

impl Dispatcher {
    /// Creates a dispatcher without any command handlers or remote methods
    pub fn new(config: DispatcherConfig) -> (Dispatcher, mpsc::UnboundedReceiver<DispatchOutput>) {
        DispatcherBuilder::new(config).build()
    }

    pub fn builder(config: DispatcherConfig) -> DispatcherBuilder {
        DispatcherBuilder::new(config)
    }

    /// Takes in a message payload received from the peer.
    ///
    /// Commands are scheduled for dispatch and shared object updates are applied right away.
    /// Any other kind of message is handed back through `UnhandleableMessageReceived`.
    pub fn handle_payload(&self, payload: MessagePayload) -> Result<(), DispatchError> {
        match payload.to_rtmp_message()? {
            RtmpMessage::Amf0Command {
                command_name,
                transaction_id,
                arguments,
            } => {
                let mut command = Vec::with_capacity(arguments.len() + 2);
                command.push(Amf0Value::Utf8String(command_name));
                command.push(Amf0Value::Number(transaction_id));
                command.extend(arguments);

                self.on_command(payload.timestamp, payload.message_stream_id, command)
            }

            RtmpMessage::Amf0SharedObject { name, events, .. } => {
                self.on_shared_object_event(
                    payload.timestamp,
                    payload.message_stream_id,
                    name,
                    events,
                );

                Ok(())
            }

            RtmpMessage::Unknown { .. } => {
                self.send_output(DispatchOutput::UnhandleableMessageReceived(payload));
                Ok(())
            }
        }
    }

    /// Schedules an incoming command for dispatch.  The first argument must be the command
    /// name, the rest (normally starting with the transaction id) are handed to whatever the
    /// name routes to.
    pub fn on_command(
        &self,
        timestamp: RtmpTimestamp,
        stream_id: u32,
        arguments: Vec<Amf0Value>,
    ) -> Result<(), DispatchError> {
        let mut arguments = arguments.into_iter();
        let name = match arguments.next() {
            Some(Amf0Value::Utf8String(name)) => name,
            x => {
                return Err(DispatchError::ProtocolContract(format!(
                    "command name was not a string: {:?}",
                    x
                )))
            }
        };

        let arguments: Vec<Amf0Value> = arguments.collect();

        // Scheduling under the state lock keeps the call from slipping past a disconnect
        let state = lock(&self.inner.state);
        if let Some(ref reason) = state.disconnect_reason {
            trace!(command = %name, "Ignoring command received after disconnect ({})", reason);
            return Ok(());
        }

        let dispatcher = self.clone();
        self.inner
            .scheduled_calls
            .schedule(self.inner.config.dispatch_delay, async move {
                dispatcher
                    .dispatch_command(name, timestamp, stream_id, arguments)
                    .await;
            });

        Ok(())
    }

    /// Tears down everything that is waiting on the peer.
    ///
    /// Status waiters, scheduled commands that have not fired yet, outstanding calls and
    /// shared objects are all cancelled, and any later call fails right away with the reason.
    /// Only the first call has any effect.
    pub fn connection_lost(&self, reason: DisconnectReason) {
        let (pending_calls, shared_objects) = {
            let mut state = lock(&self.inner.state);
            if state.disconnect_reason.is_some() {
                trace!("Connection already marked as lost, ignoring ({})", reason);
                return;
            }

            debug!("Connection lost, cancelling pending work ({})", reason);
            state.disconnect_reason = Some(reason.clone());
            state.status_waiters.cancel_all(&reason);
            self.inner.scheduled_calls.cancel_all();

            let pending_calls = state.transactions.drain_all();
            let shared_objects: Vec<SharedObjectState> = state
                .shared_objects
                .drain()
                .map(|(_, object)| object)
                .collect();

            (pending_calls, shared_objects)
        };

        for (_, sender) in pending_calls {
            let _ = sender.send(Err(DispatchError::Disconnected(reason.clone())));
        }

        for object in shared_objects {
            object.fail(DispatchError::Disconnected(reason.clone()));
        }
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.inner.state).disconnect_reason.is_none()
    }

    /// Time elapsed since the dispatcher was created, wrapped into an RTMP timestamp
    pub fn session_timestamp(&self) -> RtmpTimestamp {
        self.inner.clock.timestamp()
    }

    /// Number of calls made to the peer that are still waiting on a reply
    pub fn pending_call_count(&self) -> usize {
        lock(&self.inner.state).transactions.pending_count()
    }

    /// Number of incoming commands that are scheduled but have not been dispatched yet
    pub fn scheduled_call_count(&self) -> usize {
        self.inner.scheduled_calls.len()
    }

    async fn dispatch_command(
        &self,
        name: String,
        timestamp: RtmpTimestamp,
        stream_id: u32,
        arguments: Vec<Amf0Value>,
    ) {
        let handler = match self.inner.routes.get(&name) {
            Some(CommandRoute::CallResult) => {
                return self.on_call_result(timestamp, stream_id, arguments)
            }

            Some(CommandRoute::CallError) => {
                return self.on_call_error(timestamp, stream_id, arguments)
            }

            Some(CommandRoute::OnStatus) => return self.on_status(timestamp, stream_id, arguments),
            Some(CommandRoute::Handler(handler)) => handler.clone(),
            None => {
                return self
                    .handle_unknown_command(name, timestamp, stream_id, arguments)
                    .await
            }
        };

        self.run_command(handler, name, timestamp, stream_id, arguments)
            .await;
    }

    async fn run_command(
        &self,
        handler: Arc<dyn CommandHandler>,
        name: String,
        timestamp: RtmpTimestamp,
        stream_id: u32,
        arguments: Vec<Amf0Value>,
    ) {
        let (transaction_id, arguments) = split_transaction_id(arguments);
        let context = CallContext {
            dispatcher: self.clone(),
            timestamp,
            stream_id,
            transaction_id,
        };

        let outcome = AssertUnwindSafe(async move { handler.handle(context, arguments).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => (),
            Ok(Err(error)) => warn!(command = %name, "Command handler failed: {}", error),
            Err(panic) => warn!(
                command = %name,
                "Command handler panicked: {}",
                panic_message(panic.as_ref())
            ),
        }
    }

    fn send_output(&self, output: DispatchOutput) {
        if self.inner.outputs.send(output).is_err() {
            trace!("Dispatch output receiver is gone, dropping output");
        }
    }

    fn send_message(&self, payload: MessagePayload) {
        self.send_output(DispatchOutput::OutboundMessage(payload));
    }

    fn raise_event(&self, event: DispatchEvent) {
        self.send_output(DispatchOutput::RaisedEvent(event));
    }

    fn command_payload(
        &self,
        stream_id: u32,
        name: &str,
        transaction_id: f64,
        arguments: Vec<Amf0Value>,
    ) -> Result<MessagePayload, DispatchError> {
        let message = RtmpMessage::Amf0Command {
            command_name: name.to_string(),
            transaction_id,
            arguments,
        };

        Ok(message.into_message_payload(self.inner.clock.timestamp(), stream_id)?)
    }
}

/// Splits the leading transaction id off of a command's arguments.  Commands without a numeric
/// transaction id are treated as not expecting a reply.
fn split_transaction_id(mut arguments: Vec<Amf0Value>) -> (f64, Vec<Amf0Value>) {
    match arguments.first() {
        Some(&Amf0Value::Number(transaction_id)) => {
            arguments.remove(0);
            (transaction_id, arguments)
        }

        _ => (0.0, arguments),
    }
}

/// The id a transaction is tracked under, if the wire value can be one
fn tracked_transaction_id(transaction_id: f64) -> Option<u32> {
    let is_whole = transaction_id.is_finite() && transaction_id.fract() == 0.0;
    if is_whole && transaction_id >= 1.0 && transaction_id <= f64::from(u32::MAX) {
        Some(transaction_id as u32)
    } else {
        None
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
