use futures::FutureExt;
use rml_amf0::Amf0Value;
use std::panic::AssertUnwindSafe;
use tracing::{debug, info, trace, warn};

use super::{panic_message, split_transaction_id};
use super::{CallContext, CallResultError, DispatchError, DispatchOutput, Dispatcher};
use super::MethodError;
use super::{CALL_ERROR_COMMAND, CALL_RESULT_COMMAND};
use crate::time::RtmpTimestamp;

impl Dispatcher {
    /// Invokes the remote method registered under the command's name and answers the peer
    /// with its outcome
    pub(super) async fn handle_unknown_command(
        &self,
        name: String,
        timestamp: RtmpTimestamp,
        stream_id: u32,
        arguments: Vec<Amf0Value>,
    ) {
        let (transaction_id, arguments) = split_transaction_id(arguments);
        let outcome = match self.inner.remote_methods.get(&name).cloned() {
            Some(method) => {
                let context = CallContext {
                    dispatcher: self.clone(),
                    timestamp,
                    stream_id,
                    transaction_id,
                };

                let call = async move { method.call(context, arguments).await };
                match AssertUnwindSafe(call).catch_unwind().await {
                    Ok(outcome) => outcome,
                    Err(panic) => Err(MethodError::Failed(panic_message(panic.as_ref()))),
                }
            }

            None => {
                warn!(
                    method = %name,
                    stream_id = stream_id,
                    "Unknown method called: {:?}",
                    arguments
                );

                Err(MethodError::Aborted(format!("unknown method '{}'", name)))
            }
        };

        self.complete_remote_call(&name, stream_id, transaction_id, outcome);
    }

    fn complete_remote_call(
        &self,
        name: &str,
        stream_id: u32,
        transaction_id: f64,
        outcome: Result<Amf0Value, MethodError>,
    ) {
        match outcome {
            Ok(value) => {
                if transaction_id == 0.0 {
                    trace!(method = %name, "Remote call expects no reply");
                    return;
                }

                let values = into_reply_values(value);
                if let Err(error) =
                    self.send_reply(stream_id, CALL_RESULT_COMMAND, transaction_id, values)
                {
                    warn!(method = %name, "Failed to serialize _result reply: {}", error);
                    self.send_failure_reply(stream_id, transaction_id, &error.to_string());
                }
            }

            Err(MethodError::Aborted(reason)) => {
                debug!(method = %name, "Remote call aborted: {}", reason);
            }

            Err(MethodError::CallResult(error)) => {
                info!(method = %name, "Remote call failed: {}", error);

                let fatal = error.is_fatal();
                let values = error.into_arguments();
                let replied =
                    match self.send_reply(stream_id, CALL_ERROR_COMMAND, transaction_id, values) {
                        Ok(()) => true,
                        Err(error) => {
                            warn!(method = %name, "Failed to serialize _error reply: {}", error);
                            self.send_failure_reply(stream_id, transaction_id, &error.to_string())
                        }
                    };

                // Close only after a reply was queued
                if fatal && replied {
                    self.send_output(DispatchOutput::CloseConnection);
                }
            }

            Err(error) => {
                info!(method = %name, "Remote call failed: {}", error);
                self.send_failure_reply(stream_id, transaction_id, &error.to_string());
            }
        }
    }

    fn send_reply(
        &self,
        stream_id: u32,
        command: &str,
        transaction_id: f64,
        values: Vec<Amf0Value>,
    ) -> Result<(), DispatchError> {
        let payload = self.command_payload(stream_id, command, transaction_id, values)?;
        self.send_message(payload);
        Ok(())
    }

    /// Answers with the generic failure `_error`, returning whether the reply was queued
    fn send_failure_reply(&self, stream_id: u32, transaction_id: f64, description: &str) -> bool {
        let code = &self.inner.config.failure_status_code;
        let values = CallResultError::new(code, description).into_arguments();
        match self.send_reply(stream_id, CALL_ERROR_COMMAND, transaction_id, values) {
            Ok(()) => true,
            Err(error) => {
                warn!(stream_id = stream_id, "Failed to serialize _error reply: {}", error);
                false
            }
        }
    }
}

/// A strict array holds several reply values, anything else is a single value
fn into_reply_values(value: Amf0Value) -> Vec<Amf0Value> {
    match value {
        Amf0Value::StrictArray(values) => values,
        value => vec![value],
    }
}
