/// Engine-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Rows per statement when a bulk call does not choose a batch size.
    pub default_batch_size: usize,
    /// Lower bound applied to every bulk batch size.
    pub min_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_batch_size: 500,
            min_batch_size: 50,
        }
    }
}

impl EngineConfig {
    pub fn batch_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_batch_size)
            .max(self.min_batch_size)
            .max(1)
    }
}
