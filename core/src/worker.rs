//! Named worker threads that escalate failures to the shutdown flag

use std::io;
use std::thread::{self, JoinHandle};

use tracing::{debug, error};

use crate::error::EngineError;
use crate::shutdown::ShutdownSignal;

/// Spawn a named thread running `body`.
///
/// However `body` ends, the shutdown flag is raised on exit so the other
/// threads wind down too. An error is logged before the flag is raised.
pub fn spawn_worker<F>(
    name: &str,
    shutdown: ShutdownSignal,
    body: F,
) -> io::Result<JoinHandle<Result<(), EngineError>>>
where
    F: FnOnce() -> Result<(), EngineError> + Send + 'static,
{
    let thread_name = name.to_string();
    thread::Builder::new().name(thread_name.clone()).spawn(move || {
        debug!("{thread_name} thread started");
        let result = body();
        match &result {
            Ok(()) => debug!("{thread_name} thread finished"),
            Err(e) => error!("{thread_name} thread failed: {e}"),
        }
        shutdown.request();
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;

    #[test]
    fn test_clean_exit_raises_shutdown() {
        let shutdown = ShutdownSignal::new();
        let handle = spawn_worker("clean", shutdown.clone(), || Ok(())).unwrap();
        assert!(handle.join().unwrap().is_ok());
        assert!(shutdown.is_requested());
    }

    #[test]
    fn test_error_exit_raises_shutdown_and_returns_error() {
        let shutdown = ShutdownSignal::new();
        let handle = spawn_worker("failing", shutdown.clone(), || {
            Err(SinkError::NoDevice.into())
        })
        .unwrap();
        let result = handle.join().unwrap();
        assert!(matches!(result, Err(EngineError::Sink(SinkError::NoDevice))));
        assert!(shutdown.is_requested());
    }

    #[test]
    fn test_thread_is_named() {
        let handle = spawn_worker("named-worker", ShutdownSignal::new(), || {
            assert_eq!(thread::current().name(), Some("named-worker"));
            Ok(())
        })
        .unwrap();
        assert!(handle.join().unwrap().is_ok());
    }
}
