//! Re-assembly of newline-terminated lines from arbitrary output chunks.

/// Default upper bound on a single buffered line.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Accumulates raw chunks and yields complete lines.
///
/// Text after the last newline is held until a later chunk terminates it.
/// A line that grows past `max_line_bytes` is dropped up to its newline.
#[derive(Debug)]
pub struct LineBuffer {
    pending: String,
    max_line_bytes: usize,
    discarding: bool,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_BYTES)
    }
}

impl LineBuffer {
    #[must_use]
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            pending: String::new(),
            max_line_bytes,
            discarding: false,
        }
    }

    /// Append a chunk and return every line it completes.
    ///
    /// Returned lines have their terminator removed; blank lines are skipped.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(idx) = rest.find('\n') {
            let (head, tail) = rest.split_at(idx);
            rest = &tail[1..];

            if self.discarding {
                self.discarding = false;
                continue;
            }

            self.pending.push_str(head);
            let mut line = std::mem::take(&mut self.pending);
            if line.len() > self.max_line_bytes {
                tracing::warn!(
                    observed_bytes = line.len(),
                    max_line_bytes = self.max_line_bytes,
                    "Dropping oversized stream line"
                );
                continue;
            }

            if line.ends_with('\r') {
                line.pop();
            }
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }

        if !self.discarding {
            self.pending.push_str(rest);
            if self.pending.len() > self.max_line_bytes {
                tracing::warn!(
                    observed_bytes = self.pending.len(),
                    max_line_bytes = self.max_line_bytes,
                    "Stream line exceeds limit, discarding until newline"
                );
                self.pending.clear();
                self.discarding = true;
            }
        }

        lines
    }

    /// Bytes held for an unterminated line.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop any partial line.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.discarding = false;
    }
}
