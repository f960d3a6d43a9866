//! Interface between the emitter and whatever produces the stream.
//!
//! A connector opens a handle for a host/port pair and reports output back
//! through a [`SignalSink`]. Each sink is stamped with the generation of the
//! `start()` that created it, so the emitter can ignore anything a released
//! handle still sends.

use tokio::sync::mpsc::UnboundedSender;

/// Error type for opening a stream connection.
#[derive(thiserror::Error, Debug)]
pub enum ConnectError {
    /// The connection binary was not found.
    #[error("Stream binary not found: {0}")]
    NotFound(String),
    /// Permission denied when spawning.
    #[error("Permission denied")]
    PermissionDenied,
    /// The connector needs a tokio runtime and none is running.
    #[error("No tokio runtime available to drive the stream")]
    NoRuntime,
    /// Stream stdout was not captured.
    #[error("Stream stdout not available")]
    NoStdout,
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output reported by an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSignal {
    /// A raw chunk of output.
    Write { generation: u64, chunk: String },
    /// The connection closed; sent at most once per handle.
    End { generation: u64, payload: String },
}

impl StreamSignal {
    /// The generation of the handle that produced this signal.
    #[must_use]
    pub fn generation(&self) -> u64 {
        match self {
            Self::Write { generation, .. } | Self::End { generation, .. } => *generation,
        }
    }
}

/// Callback side of a connection: where a handle delivers its output.
#[derive(Debug, Clone)]
pub struct SignalSink {
    generation: u64,
    tx: UnboundedSender<StreamSignal>,
}

impl SignalSink {
    #[must_use]
    pub fn new(generation: u64, tx: UnboundedSender<StreamSignal>) -> Self {
        Self { generation, tx }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report a chunk of output.
    ///
    /// Returns `false` once the receiving side is gone.
    pub fn write(&self, chunk: impl Into<String>) -> bool {
        self.tx
            .send(StreamSignal::Write {
                generation: self.generation,
                chunk: chunk.into(),
            })
            .is_ok()
    }

    /// Report that the connection closed. Consumes the sink.
    pub fn end(self, payload: impl Into<String>) {
        let _ = self.tx.send(StreamSignal::End {
            generation: self.generation,
            payload: payload.into(),
        });
    }
}

/// An open stream connection.
pub trait StreamHandle: Send {
    /// Release the connection. No signals are expected after this returns,
    /// and any that arrive are ignored by the emitter.
    fn close(self: Box<Self>);
}

/// Opens stream connections.
pub trait StreamConnector: Send {
    /// Open a connection to `host:port`, reporting output through `sink`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectError` if the connection cannot be established
    /// synchronously. Failures after this returns surface as an end signal.
    fn open(
        &mut self,
        host: &str,
        port: u16,
        sink: SignalSink,
    ) -> Result<Box<dyn StreamHandle>, ConnectError>;
}
