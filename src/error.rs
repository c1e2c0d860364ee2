use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{applier::ApplyState, mode::DisplayMode, platform::Status};

/// The stage of a change that reported a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyStage {
    /// Writing the mode to the persisted configuration without a reset.
    RegistryStage,
    /// The session-wide commit that activates staged changes.
    Commit,
    /// The per-monitor DPI scale call.
    DpiScale,
}

impl fmt::Display for ApplyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ApplyStage::RegistryStage => "registry stage",
            ApplyStage::Commit => "global commit",
            ApplyStage::DpiScale => "DPI scale change",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisplayError {
    #[error("display enumeration failed with status {code}")]
    EnumerationFailure { code: Status },

    #[error("unsupported DPI scale {percent}%")]
    UnsupportedDpi { percent: u32 },

    #[error("display mode {mode} was rejected by the driver (status {code})")]
    ModeTestFailure { mode: DisplayMode, code: Status },

    #[error("display change failed during {stage} (status {code})")]
    ModeApplyFailure { stage: ApplyStage, code: Status },

    #[error("monitor {index} is out of range (1..={count})")]
    OutOfRange { index: usize, count: usize },

    #[error("display {device_name} has no current mode")]
    NoCurrentMode { device_name: String },

    #[error("display {device_name} reports no mode at its current resolution for {refresh_hz}Hz")]
    NoModeForRefresh { device_name: String, refresh_hz: u32 },

    #[error("mode applier must be reset before reuse (state {state:?})")]
    ApplierNotIdle { state: ApplyState },
}

impl DisplayError {
    /// The OS status carried by this error, if any.
    pub fn status(&self) -> Option<Status> {
        match self {
            DisplayError::EnumerationFailure { code }
            | DisplayError::ModeTestFailure { code, .. }
            | DisplayError::ModeApplyFailure { code, .. } => Some(*code),
            _ => None,
        }
    }
}
