use futures::future::BoxFuture;
use rml_amf0::Amf0Value;
use std::future::Future;

use super::errors::MethodError;
use super::Dispatcher;
use crate::time::RtmpTimestamp;

/// Describes the incoming command a handler is being invoked for
#[derive(Clone)]
pub struct CallContext {
    /// The dispatcher that received the command, for handlers that need to talk back to the
    /// peer (calls, status waits, shared objects)
    pub dispatcher: Dispatcher,
    pub timestamp: RtmpTimestamp,
    pub stream_id: u32,

    /// Transaction id of the incoming command.  0 means the peer does not expect a reply.
    pub transaction_id: f64,
}

/// A method the peer can invoke by name.
///
/// The returned value is sent back in a `_result` reply when the peer asked for one.  A
/// `StrictArray` is spread out into multiple reply values, anything else is sent as a single
/// value.  Errors are turned into `_error` replies, see `MethodError` for how.
pub trait RemoteMethod: Send + Sync + 'static {
    fn call(
        &self,
        context: CallContext,
        arguments: Vec<Amf0Value>,
    ) -> BoxFuture<'static, Result<Amf0Value, MethodError>>;
}

impl<F, Fut> RemoteMethod for F
where
    F: Fn(CallContext, Vec<Amf0Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Amf0Value, MethodError>> + Send + 'static,
{
    fn call(
        &self,
        context: CallContext,
        arguments: Vec<Amf0Value>,
    ) -> BoxFuture<'static, Result<Amf0Value, MethodError>> {
        Box::pin(self(context, arguments))
    }
}

/// Handles a named command that is never answered on the wire.  Failures are only logged.
pub trait CommandHandler: Send + Sync + 'static {
    fn handle(
        &self,
        context: CallContext,
        arguments: Vec<Amf0Value>,
    ) -> BoxFuture<'static, Result<(), MethodError>>;
}

impl<F, Fut> CommandHandler for F
where
    F: Fn(CallContext, Vec<Amf0Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), MethodError>> + Send + 'static,
{
    fn handle(
        &self,
        context: CallContext,
        arguments: Vec<Amf0Value>,
    ) -> BoxFuture<'static, Result<(), MethodError>> {
        Box::pin(self(context, arguments))
    }
}
