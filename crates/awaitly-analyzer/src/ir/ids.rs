//! Node identifier generation.

/// Monotonic node ID source.
///
/// Owned by whoever drives the analysis, so repeated or concurrent analyses
/// never share a counter. Create a fresh generator (or call [`reset`]) to get
/// identical IDs for identical input.
///
/// [`reset`]: IdGenerator::reset
#[derive(Debug, Default, Clone)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next ID, e.g. `step_4`.
    pub fn next_id(&mut self, prefix: &str) -> String {
        self.next += 1;
        format!("{}_{}", prefix, self.next)
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}
