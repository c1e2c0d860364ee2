use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    error::DisplayError,
    platform::{OutputTechnology, PlatformDisplayApi},
};

/// An adapter's locally unique identifier. Opaque, only compared and passed back to the OS.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdapterLuid {
    pub low: u32,
    pub high: i32,
}

impl fmt::Display for AdapterLuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}:{:08x}", self.high, self.low)
    }
}

/// (adapter, source index): what the hidden DPI calls are keyed by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId {
    pub adapter_id: AdapterLuid,
    pub id: u32,
}

/// One active output path.
///
/// Only valid for the call that produced it: the topology is re-queried on
/// every operation and nothing here is stable across calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySource {
    pub id: SourceId,
    /// GDI device name, e.g. `\\.\DISPLAY1`. Mode calls are keyed by it.
    pub device_name: String,
    pub monitor_friendly_name: Option<String>,
    pub monitor_device_path: Option<String>,
    pub output_technology: Option<OutputTechnology>,
}

impl DisplaySource {
    pub fn new(id: SourceId, device_name: impl Into<String>) -> Self {
        Self {
            id,
            device_name: device_name.into(),
            monitor_friendly_name: None,
            monitor_device_path: None,
            output_technology: None,
        }
    }

    /// Human readable name: the monitor's friendly name, or the device name.
    pub fn label(&self) -> &str {
        self.monitor_friendly_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.device_name)
    }

    /// Key used by the preference store.
    pub fn key(&self) -> &str {
        &self.device_name
    }
}

/// Lists every active display source.
///
/// Clone-mode paths that share a source are reported once.
pub fn list_active_sources<A: PlatformDisplayApi + ?Sized>(
    api: &A,
) -> Result<Vec<DisplaySource>, DisplayError> {
    let sources = api.active_sources().map_err(|code| {
        warn!("Active display topology query failed with status {}", code);
        DisplayError::EnumerationFailure { code }
    })?;
    let mut unique: Vec<DisplaySource> = Vec::with_capacity(sources.len());
    for source in sources {
        if unique.iter().any(|s| s.id == source.id) {
            debug!("Skipping duplicate path for source {:?}", source.id);
            continue;
        }
        unique.push(source);
    }
    debug!(
        "Enumerated {} active sources: {:?}",
        unique.len(),
        unique.iter().map(|s| s.label()).collect::<Vec<_>>()
    );
    Ok(unique)
}

/// Picks the source at a 1-based position in `sources`.
pub fn source_at(sources: &[DisplaySource], index: usize) -> Result<&DisplaySource, DisplayError> {
    if index == 0 {
        return Err(DisplayError::OutOfRange {
            index,
            count: sources.len(),
        });
    }
    sources.get(index - 1).ok_or(DisplayError::OutOfRange {
        index,
        count: sources.len(),
    })
}
