//! Cooperative cancellation for the recording loop.

use crate::errors::TouchReplayError;
use crate::logging::append_run_log;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Cancel `token` on the first Ctrl-C, or SIGTERM on unix.
///
/// The signals are awaited on a dedicated thread with its own current-thread
/// runtime, so callers stay synchronous. Handlers are registered before this
/// returns.
pub fn install_interrupt_handler(token: CancellationToken) -> Result<(), TouchReplayError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| TouchReplayError::Io(e.to_string()))?;
    let signals = {
        let _guard = runtime.enter();
        ShutdownSignals::register()?
    };
    std::thread::Builder::new()
        .name("interrupt-handler".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                if let Some(signal) = signals.wait().await {
                    append_run_log("info", "interrupt.received", json!({ "signal": signal }));
                    token.cancel();
                }
            });
        })
        .map_err(|e| TouchReplayError::Io(e.to_string()))?;
    Ok(())
}

struct ShutdownSignals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    #[cfg(unix)]
    fn register() -> Result<Self, TouchReplayError> {
        use tokio::signal::unix::{signal, SignalKind};
        let terminate =
            signal(SignalKind::terminate()).map_err(|e| TouchReplayError::Io(e.to_string()))?;
        Ok(Self { terminate })
    }

    #[cfg(not(unix))]
    fn register() -> Result<Self, TouchReplayError> {
        Ok(Self {})
    }

    /// Name of the first signal received, or `None` if listening failed.
    #[cfg(unix)]
    async fn wait(mut self) -> Option<&'static str> {
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.ok().map(|()| "interrupt"),
            received = self.terminate.recv() => received.map(|()| "terminate"),
        }
    }

    #[cfg(not(unix))]
    async fn wait(self) -> Option<&'static str> {
        tokio::signal::ctrl_c().await.ok().map(|()| "interrupt")
    }
}
