/*!
This crate provides the command and event dispatching layer of an RTMP connection.

Once a connection's chunk stream has been turned into message payloads, the `Dispatcher` takes
over: it answers and routes incoming AMF0 commands, correlates `_result` and `_error` replies
with the calls that were made to the peer, hands `onStatus` notifications to whoever is
waiting on them and keeps shared objects up to date.

The dispatcher does not do any I/O itself.  Everything it wants sent to the peer is handed out
as message payloads, in the order they need to be sent, through the output receiver returned
when the dispatcher was built.

# Examples

```
use rml_amf0::Amf0Value;
use rml_rtmp_dispatch::dispatcher::{CallContext, DispatcherBuilder, DispatcherConfig, MethodError};

let (dispatcher, outputs) = DispatcherBuilder::new(DispatcherConfig::new())
    .remote_method("getServerTime", |context: CallContext, _arguments: Vec<Amf0Value>| async move {
        Ok::<_, MethodError>(Amf0Value::Number(context.timestamp.value as f64))
    })
    .build();
```
*/

pub mod dispatcher;
pub mod messages;
pub mod time;
