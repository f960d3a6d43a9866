//! Stream emitter: owns the connection lifecycle and republishes stream
//! output to in-process listeners.
//!
//! The emitter is started and stopped explicitly. While started it holds
//! exactly one connection handle. Output arrives through
//! [`StreamEmitter::on_stream_write`] and closure through
//! [`StreamEmitter::on_stream_end`], usually via [`StreamEmitter::dispatch`]
//! from the runner loop.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::broadcast::{Broadcaster, EventPayload, STREAM_END_EVENT, STREAM_WRITE_EVENT};
use crate::naming::camelize;
use crate::stream::{
    decode, ConnectError, LineBuffer, SignalSink, SshConnector, StreamConnector, StreamHandle,
    StreamSignal,
};

/// Lifecycle state of an emitter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    #[default]
    Stopped,
    Started,
}

/// Watches one host/port stream and fans its events out to listeners.
pub struct StreamEmitter {
    host: String,
    port: u16,
    enabled_auto_restart: bool,
    connector: Box<dyn StreamConnector>,
    handle: Option<Box<dyn StreamHandle>>,
    generation: u64,
    restarts: u64,
    signal_tx: UnboundedSender<StreamSignal>,
    signal_rx: Option<UnboundedReceiver<StreamSignal>>,
    lines: LineBuffer,
    broadcaster: Broadcaster,
}

impl StreamEmitter {
    /// Create an emitter that connects with the default SSH client.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, enabled_auto_restart: bool) -> Self {
        Self::with_connector(host, port, enabled_auto_restart, SshConnector::new())
    }

    /// Create an emitter that opens connections through `connector`.
    #[must_use]
    pub fn with_connector<C>(
        host: impl Into<String>,
        port: u16,
        enabled_auto_restart: bool,
        connector: C,
    ) -> Self
    where
        C: StreamConnector + 'static,
    {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Self {
            host: host.into(),
            port,
            enabled_auto_restart,
            connector: Box::new(connector),
            handle: None,
            generation: 0,
            restarts: 0,
            signal_tx,
            signal_rx: Some(signal_rx),
            lines: LineBuffer::default(),
            broadcaster: Broadcaster::new(),
        }
    }

    /// Limit the size of a single buffered stream line.
    #[must_use]
    pub fn max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.lines = LineBuffer::new(max_line_bytes);
        self
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn auto_restart_enabled(&self) -> bool {
        self.enabled_auto_restart
    }

    pub fn set_auto_restart(&mut self, enabled: bool) {
        self.enabled_auto_restart = enabled;
    }

    /// Whether a connection handle is currently held.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.handle.is_some()
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        if self.is_started() {
            LifecycleState::Started
        } else {
            LifecycleState::Stopped
        }
    }

    /// Generation of the most recently opened handle.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of automatic restarts attempted so far.
    #[must_use]
    pub fn restart_count(&self) -> u64 {
        self.restarts
    }

    /// Take the receiving end of the signal channel that connections report
    /// into. Returns `None` after the first call.
    pub fn take_signals(&mut self) -> Option<UnboundedReceiver<StreamSignal>> {
        self.signal_rx.take()
    }

    /// Open the stream connection.
    ///
    /// Does nothing if already started.
    ///
    /// # Errors
    ///
    /// Returns `ConnectError` if the connector fails to open; the emitter
    /// stays stopped.
    pub fn start(&mut self) -> Result<(), ConnectError> {
        if self.handle.is_some() {
            tracing::debug!(host = %self.host, port = self.port, "Stream already started");
            return Ok(());
        }

        self.generation += 1;
        let sink = SignalSink::new(self.generation, self.signal_tx.clone());
        let handle = self.connector.open(&self.host, self.port, sink)?;
        self.handle = Some(handle);

        tracing::info!(
            host = %self.host,
            port = self.port,
            generation = self.generation,
            "Stream started"
        );
        Ok(())
    }

    /// Release the stream connection. Does nothing if already stopped.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            tracing::debug!(host = %self.host, port = self.port, "Stream already stopped");
            return;
        };

        handle.close();
        self.lines.clear();
        tracing::info!(
            host = %self.host,
            port = self.port,
            generation = self.generation,
            "Stream stopped"
        );
    }

    /// Handle a chunk of stream output.
    ///
    /// The chunk is always republished verbatim as `gerritStreamWrite`. Every
    /// line it completes that decodes to a typed record is published under
    /// the camelized type tag.
    pub fn on_stream_write(&mut self, chunk: &str) {
        self.publish(STREAM_WRITE_EVENT, &EventPayload::Text(chunk.to_string()));

        for line in self.lines.push(chunk) {
            match decode(&line) {
                Ok(record) => {
                    let event = camelize(record.kind());
                    tracing::trace!(event = %event, "Publishing stream event");
                    self.publish(&event, &EventPayload::Record(record.into_payload()));
                }
                Err(e) => {
                    tracing::debug!(error = %e, line = %line, "Skipping undecodable stream line");
                }
            }
        }
    }

    /// Handle closure of the stream.
    ///
    /// Stops the emitter, republishes `payload` as `gerritStreamEnd`, then
    /// starts again immediately if auto-restart is enabled.
    pub fn on_stream_end(&mut self, payload: &str) {
        self.stop();
        self.publish(STREAM_END_EVENT, &EventPayload::Text(payload.to_string()));

        if !self.enabled_auto_restart {
            return;
        }

        self.restarts += 1;
        tracing::info!(
            host = %self.host,
            port = self.port,
            restarts = self.restarts,
            "Restarting stream"
        );
        if let Err(e) = self.start() {
            tracing::error!(
                host = %self.host,
                port = self.port,
                error = %e,
                "Stream restart failed"
            );
        }
    }

    /// Route a signal from a connection. Signals from a handle that has
    /// since been released are dropped.
    ///
    /// Returns whether the signal was handled.
    pub fn dispatch(&mut self, signal: StreamSignal) -> bool {
        if !self.is_started() || signal.generation() != self.generation {
            tracing::trace!(
                generation = signal.generation(),
                current = self.generation,
                "Dropping stale stream signal"
            );
            return false;
        }

        match signal {
            StreamSignal::Write { chunk, .. } => self.on_stream_write(&chunk),
            StreamSignal::End { payload, .. } => self.on_stream_end(&payload),
        }
        true
    }

    /// Subscribe to an event by name.
    pub fn subscribe<F>(&mut self, event: impl Into<String>, listener: F)
    where
        F: FnMut(&EventPayload) + Send + 'static,
    {
        self.broadcaster.subscribe(event, listener);
    }

    /// Subscribe to every event.
    pub fn subscribe_all<F>(&mut self, listener: F)
    where
        F: FnMut(&str, &EventPayload) + Send + 'static,
    {
        self.broadcaster.subscribe_all(listener);
    }

    /// Publish `payload` to the listeners of `event`.
    pub fn publish(&mut self, event: &str, payload: &EventPayload) {
        self.broadcaster.publish(event, payload);
    }

    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.broadcaster.listener_count(event)
    }
}

impl fmt::Debug for StreamEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamEmitter")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("enabled_auto_restart", &self.enabled_auto_restart)
            .field("state", &self.state())
            .field("generation", &self.generation)
            .field("broadcaster", &self.broadcaster)
            .finish_non_exhaustive()
    }
}

impl Drop for StreamEmitter {
    fn drop(&mut self) {
        self.stop();
    }
}
