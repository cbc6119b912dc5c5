use std::time::{Duration, Instant};

/// In-memory queue of rendered, not-yet-sent line-protocol points for one
/// destination. Mutated only by its owning dispatcher; cleared on every
/// flush attempt, successful or not.
#[derive(Debug)]
pub struct PointBuffer {
    entries: Vec<String>,
    flushed_at: Instant,
}

impl Default for PointBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl PointBuffer {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            flushed_at: Instant::now(),
        }
    }

    /// Pushes a rendered point. Never flushes implicitly.
    pub fn append(&mut self, point: String) {
        self.entries.push(point);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn age(&self) -> Duration {
        self.flushed_at.elapsed()
    }

    /// True when the buffer has reached its size limit or its age limit.
    pub fn should_flush(&self, size_limit: usize, max_age: Duration) -> bool {
        self.entries.len() >= size_limit || self.age() >= max_age
    }

    /// Drains the buffer into one newline-joined payload and resets the
    /// age clock. Returns `None` for an empty buffer: an empty flush must
    /// never reach the transport, but the clock still resets so an idle
    /// destination does not re-trigger the age check on every event.
    pub fn take_payload(&mut self) -> Option<String> {
        self.flushed_at = Instant::now();
        if self.entries.is_empty() {
            return None;
        }
        let payload = self.entries.join("\n");
        self.entries.clear();
        Some(payload)
    }

    #[cfg(test)]
    pub(crate) fn backdate(&mut self, by: Duration) {
        self.flushed_at = Instant::now() - by;
    }
}
