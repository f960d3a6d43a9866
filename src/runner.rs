//! Runner loop that drives an emitter from its connection signals.
//!
//! Signals are received one at a time and dispatched on the emitter the
//! runner owns, so callbacks never overlap.

use std::fmt;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use crate::emitter::StreamEmitter;
use crate::stream::{ConnectError, StreamSignal};

/// Error type for runner operations.
#[derive(thiserror::Error, Debug)]
pub enum RunnerError {
    /// The emitter's signal receiver was already taken.
    #[error("Emitter signal receiver already taken")]
    SignalsTaken,
    /// Opening the stream failed.
    #[error("Failed to start stream: {0}")]
    Connect(#[from] ConnectError),
}

/// How a run finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The cancellation token fired.
    Cancelled,
    /// The stream closed and was not restarted.
    StreamClosed,
}

/// Called after each stream closure has been handled, with the end payload
/// and whether the emitter restarted.
pub type CloseHook = Box<dyn FnMut(&str, bool) + Send>;

/// Owns an emitter and pumps connection signals into it.
pub struct StreamRunner {
    emitter: StreamEmitter,
    signals: UnboundedReceiver<StreamSignal>,
    close_hook: Option<CloseHook>,
}

impl StreamRunner {
    /// Wrap an emitter, taking its signal receiver.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError::SignalsTaken` if the receiver was already taken.
    pub fn new(mut emitter: StreamEmitter) -> Result<Self, RunnerError> {
        let signals = emitter.take_signals().ok_or(RunnerError::SignalsTaken)?;
        Ok(Self {
            emitter,
            signals,
            close_hook: None,
        })
    }

    /// Register a hook that runs once each closure is fully handled, so it
    /// sees whether the restart actually happened.
    pub fn on_close<F>(&mut self, hook: F)
    where
        F: FnMut(&str, bool) + Send + 'static,
    {
        self.close_hook = Some(Box::new(hook));
    }

    #[must_use]
    pub fn emitter(&self) -> &StreamEmitter {
        &self.emitter
    }

    pub fn emitter_mut(&mut self) -> &mut StreamEmitter {
        &mut self.emitter
    }

    #[must_use]
    pub fn into_emitter(self) -> StreamEmitter {
        self.emitter
    }

    /// Start the emitter and dispatch signals until cancelled or the stream
    /// closes without restarting.
    ///
    /// The emitter is stopped on cancellation.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError::Connect` if the initial start fails.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<RunOutcome, RunnerError> {
        self.emitter.start()?;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("Runner cancelled");
                    self.emitter.stop();
                    return Ok(RunOutcome::Cancelled);
                }
                // The emitter keeps a sender alive, so `recv` never yields `None`.
                Some(signal) = self.signals.recv() => {
                    let end_payload = match &signal {
                        StreamSignal::End { payload, .. } => Some(payload.clone()),
                        StreamSignal::Write { .. } => None,
                    };
                    if !self.emitter.dispatch(signal) {
                        continue;
                    }

                    if let Some(payload) = end_payload {
                        let restarted = self.emitter.is_started();
                        if let Some(hook) = self.close_hook.as_mut() {
                            hook(&payload, restarted);
                        }
                        if !restarted {
                            return Ok(RunOutcome::StreamClosed);
                        }
                    }
                }
            }
        }
    }
}

impl fmt::Debug for StreamRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRunner")
            .field("emitter", &self.emitter)
            .field("close_hook", &self.close_hook.is_some())
            .finish_non_exhaustive()
    }
}
