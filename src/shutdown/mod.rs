//! Graceful shutdown
//!
//! This module handles:
//! - The shutdown state machine
//!   (`Running -> ShutdownRequested -> Checkpointed -> Terminated`)
//! - The cancellation token the scheduler checks before issuing work
//! - Listening for SIGINT (and SIGTERM on unix)

use crate::HarvestError;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// Lifecycle of a run with respect to shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownState {
    /// Normal operation
    Running,

    /// A termination request arrived; no new fetches are issued
    ShutdownRequested,

    /// The forced checkpoint has been written
    Checkpointed,

    /// In-flight work drained and output written
    Terminated,
}

impl ShutdownState {
    /// Returns true if `next` directly follows this state
    pub fn can_transition_to(self, next: ShutdownState) -> bool {
        matches!(
            (self, next),
            (Self::Running, Self::ShutdownRequested)
                | (Self::ShutdownRequested, Self::Checkpointed)
                | (Self::Checkpointed, Self::Terminated)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::ShutdownRequested => "shutdown_requested",
            Self::Checkpointed => "checkpointed",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coordinates a graceful shutdown
///
/// Requesting shutdown cancels the token first, so by the time the forced
/// checkpoint is taken no new fetch can start.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    state: Mutex<ShutdownState>,
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ShutdownState::Running),
            token: CancellationToken::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> ShutdownState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Token cancelled when shutdown is requested
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Returns true once shutdown has been requested
    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Requests shutdown
    ///
    /// Returns true if this call moved the run out of `Running`; later
    /// requests are ignored.
    pub fn request(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != ShutdownState::Running {
            return false;
        }
        *state = ShutdownState::ShutdownRequested;
        self.token.cancel();
        true
    }

    /// Moves to `next`, rejecting anything but the following state
    pub fn transition(&self, next: ShutdownState) -> Result<(), HarvestError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                from: *state,
                to: next,
            });
        }

        tracing::debug!(from = %*state, to = %next, "Shutdown state transition");
        *state = next;
        if next == ShutdownState::ShutdownRequested {
            self.token.cancel();
        }
        Ok(())
    }

    /// Waits for SIGINT or SIGTERM and requests shutdown for each one
    ///
    /// Runs until the process exits; spawn it and abort the handle when the
    /// run ends.
    pub async fn listen_for_signals(self: Arc<Self>) {
        loop {
            let signal = match wait_for_signal().await {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for termination signals");
                    return;
                }
            };

            if self.request() {
                tracing::info!(signal, "Shutdown requested, saving progress");
            } else {
                tracing::warn!(signal, "Shutdown already in progress");
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves with the name of the first termination signal received
#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "SIGINT")
}
