//! The narrow boundary between the engine and the operating system.
//!
//! Everything behind [`PlatformDisplayApi`] speaks raw OS status codes and
//! owns any fixed binary layouts; everything in front of it is plain Rust
//! data that can be driven by a fake in tests.

use serde::{Deserialize, Serialize};
use unit_enum::UnitEnum;

use crate::{
    mode::DisplayMode,
    source::{DisplaySource, SourceId},
};

/// A 32-bit status reported by an OS call. Zero is success; anything else is
/// surfaced to the caller as-is.
pub type Status = i32;

pub const STATUS_SUCCESS: Status = 0;

bitflags::bitflags! {
    /// Flags for a single mode-change call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChangeFlags: u32 {
        /// Persist the mode in the registry.
        const UPDATE_REGISTRY = 0x0000_0001;
        /// Dry-run: validate the mode without changing anything.
        const TEST = 0x0000_0002;
        /// Stage the change but don't activate it until a global commit.
        const NO_RESET = 0x1000_0000;
    }
}

/// Which mode to read from the per-device mode enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeIndex {
    /// The mode the device is currently running.
    Current,
    /// The n-th supported mode; enumeration is exhausted at the first miss.
    Index(u32),
}

/// What a mode-change call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeTarget<'a> {
    Device {
        device_name: &'a str,
        mode: &'a DisplayMode,
    },
    /// No device and no mode: activates whatever has been staged session-wide.
    Global,
}

/// The per-monitor scale as the hidden device-info call reports it: signed
/// offsets from the recommended entry of the DPI table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawDpiScale {
    pub min_rel: i32,
    pub cur_rel: i32,
    pub max_rel: i32,
}

pub trait PlatformDisplayApi {
    /// Every currently active display source, in OS order.
    fn active_sources(&self) -> Result<Vec<DisplaySource>, Status>;

    /// Reads one entry of the device's mode list, or `None` once exhausted.
    fn enum_mode(&self, device_name: &str, index: ModeIndex) -> Option<DisplayMode>;

    fn change_mode(&self, target: ChangeTarget<'_>, flags: ChangeFlags) -> Status;

    fn get_dpi_scale(&self, source: SourceId) -> Result<RawDpiScale, Status>;

    /// Submits a scale expressed as an offset from the recommended entry.
    fn set_dpi_scale(&self, source: SourceId, relative: i32) -> Status;
}

/// Well-known results of a mode-change call. Only used to make log lines
/// readable, the raw code is what gets reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, UnitEnum)]
#[repr(i32)]
pub enum DisplayChangeStatus {
    Successful = 0,
    Failed = -1,
    BadMode = -2,
    NotUpdated = -3,
    BadFlags = -4,
    BadParam = -5,
    BadDualView = -6,
    // Must stay last: `Other` takes the next discriminant, which must be unused.
    Restart = 1,
    #[unit_enum(other)]
    Other(i32),
}

impl From<Status> for DisplayChangeStatus {
    fn from(value: Status) -> Self {
        DisplayChangeStatus::from_discriminant(value)
    }
}

impl From<DisplayChangeStatus> for Status {
    fn from(value: DisplayChangeStatus) -> Self {
        value.discriminant()
    }
}

/// The target's connector type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, UnitEnum, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
#[repr(i32)]
pub enum OutputTechnology {
    /// HD15 (VGA) connector.
    Hd15 = 0,
    SVideo = 1,
    CompositeVideo = 2,
    ComponentVideo = 3,
    Dvi = 4,
    Hdmi = 5,
    /// Low Voltage Differential Swing connector.
    Lvds = 6,
    /// Japanese D connector.
    Djpn = 8,
    Sdi = 9,
    DisplayPortExternal = 10,
    DisplayPortEmbedded = 11,
    UdiExternal = 12,
    UdiEmbedded = 13,
    SdtvDongle = 14,
    Miracast = 15,
    IndirectWired = 16,
    IndirectVirtual = 17,
    DisplayPortUsbTunnel = 18,
    /// Connects internally to a display device, e.g. a laptop panel.
    Internal = i32::MIN,
    #[unit_enum(other)]
    Other(i32),
}

impl OutputTechnology {
    pub fn is_internal(self) -> bool {
        matches!(
            self,
            OutputTechnology::Internal
                | OutputTechnology::Lvds
                | OutputTechnology::DisplayPortEmbedded
                | OutputTechnology::UdiEmbedded
        )
    }
}

impl From<i32> for OutputTechnology {
    fn from(value: i32) -> Self {
        OutputTechnology::from_discriminant(value)
    }
}

impl From<OutputTechnology> for i32 {
    fn from(value: OutputTechnology) -> Self {
        value.discriminant()
    }
}
