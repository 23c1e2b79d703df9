use std::time::Duration;

/// The configuration options that govern how a dispatcher operates
#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// How long an incoming command waits before it is handed to its handler.  Commands are
    /// never dispatched inline, even with no delay, and always in arrival order.
    pub dispatch_delay: Duration,

    /// The status code placed in `_error` replies for handler failures that did not provide
    /// their own error
    pub failure_status_code: String,
}

impl DispatcherConfig {
    /// Creates a new dispatcher config with overridable defaults
    pub fn new() -> DispatcherConfig {
        DispatcherConfig {
            dispatch_delay: Duration::from_secs(0),
            failure_status_code: "NetStream.Failed".to_string(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig::new()
    }
}
