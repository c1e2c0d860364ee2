use std::collections::HashMap;

use tracing::debug;

use crate::source::DisplaySource;

/// Remembers the refresh rate a user picked for each source so that a later
/// resolution change can keep it. Lives only as long as the engine.
#[derive(Debug, Clone, Default)]
pub struct PreferenceStore {
    refresh_hz: HashMap<String, u32>,
}

impl PreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source: &DisplaySource) -> Option<u32> {
        self.refresh_hz.get(source.key()).copied()
    }

    pub fn set(&mut self, source: &DisplaySource, refresh_hz: u32) {
        debug!(
            "Preferred refresh rate for {} is now {}Hz",
            source.key(),
            refresh_hz
        );
        self.refresh_hz.insert(source.key().to_owned(), refresh_hz);
    }

    /// Seeds the preference from the running mode the first time a source is seen.
    pub fn ensure_initialized(&mut self, source: &DisplaySource, current_hz: Option<u32>) {
        if self.refresh_hz.contains_key(source.key()) {
            return;
        }
        if let Some(hz) = current_hz {
            self.set(source, hz);
        }
    }
}
