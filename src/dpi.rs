//! Per-monitor DPI scaling.
//!
//! The OS reports and accepts scales as signed offsets from a "recommended"
//! entry of [`DPI_TABLE`]. The minimum offset is always the full distance from
//! the first table entry down to the recommended one, which is what anchors the
//! relative values to absolute percentages.
//!
//! The table covers every scale current Windows builds offer. Should a future
//! build report a wider span, indices are clamped to the table and a warning is
//! logged; that is an approximation, not a documented OS contract.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    error::{ApplyStage, DisplayError},
    platform::{PlatformDisplayApi, RawDpiScale, STATUS_SUCCESS},
    source::DisplaySource,
};

pub const DPI_TABLE: [u32; 12] = [100, 125, 150, 175, 200, 225, 250, 300, 350, 400, 450, 500];

/// Position of `percent` in [`DPI_TABLE`].
pub fn dpi_index(percent: u32) -> Option<usize> {
    DPI_TABLE.iter().position(|&p| p == percent)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DpiScaleInfo {
    pub min_percent: u32,
    pub max_percent: u32,
    pub current_percent: u32,
    pub recommended_percent: u32,
    /// Offsets from the recommended entry, as reported.
    pub min_rel: i32,
    pub cur_rel: i32,
    pub max_rel: i32,
    #[serde(skip)]
    indices: ScaleIndices,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScaleIndices {
    min: usize,
    max: usize,
    current: usize,
    recommended: usize,
}

/// One entry of the scales a source accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleChoice {
    pub percent: u32,
    pub recommended: bool,
    pub current: bool,
}

impl DpiScaleInfo {
    pub fn from_relative(raw: RawDpiScale) -> Self {
        let recommended = i64::from(raw.min_rel.unsigned_abs());
        let indices = ScaleIndices {
            recommended: clamp_index("recommended", recommended),
            current: clamp_index("current", recommended + i64::from(raw.cur_rel)),
            min: clamp_index("minimum", recommended + i64::from(raw.min_rel)),
            max: clamp_index("maximum", recommended + i64::from(raw.max_rel)),
        };
        let indices = ScaleIndices {
            max: indices.max.max(indices.min),
            ..indices
        };
        Self {
            min_percent: DPI_TABLE[indices.min],
            max_percent: DPI_TABLE[indices.max],
            current_percent: DPI_TABLE[indices.current],
            recommended_percent: DPI_TABLE[indices.recommended],
            min_rel: raw.min_rel,
            cur_rel: raw.cur_rel,
            max_rel: raw.max_rel,
            indices,
        }
    }

    /// Every table entry the source accepts, smallest first.
    pub fn available(&self) -> Vec<ScaleChoice> {
        (self.indices.min..=self.indices.max)
            .map(|index| ScaleChoice {
                percent: DPI_TABLE[index],
                recommended: index == self.indices.recommended,
                current: index == self.indices.current,
            })
            .collect()
    }
}

fn clamp_index(which: &str, index: i64) -> usize {
    let last = DPI_TABLE.len() - 1;
    match usize::try_from(index) {
        Ok(index) if index <= last => index,
        Ok(_) => {
            warn!(
                "{} DPI index {} is past the end of the scale table, clamping to {}%",
                which, index, DPI_TABLE[last]
            );
            last
        }
        Err(_) => {
            warn!(
                "{} DPI index {} is negative, clamping to {}%",
                which, index, DPI_TABLE[0]
            );
            0
        }
    }
}

pub fn scale_info<A: PlatformDisplayApi + ?Sized>(
    api: &A,
    source: &DisplaySource,
) -> Result<DpiScaleInfo, DisplayError> {
    let raw = api.get_dpi_scale(source.id).map_err(|code| {
        warn!("DPI scale query for {} failed with status {}", source.device_name, code);
        DisplayError::EnumerationFailure { code }
    })?;
    let info = DpiScaleInfo::from_relative(raw);
    debug!("DPI scale of {}: {:?} from {:?}", source.device_name, info, raw);
    Ok(info)
}

/// Sets the scale of one source, returning the percentage actually requested
/// after clamping into the range the source accepts.
///
/// Takes effect immediately; there is no staging or commit for DPI changes.
pub fn set_scale<A: PlatformDisplayApi + ?Sized>(
    api: &A,
    source: &DisplaySource,
    percent: u32,
) -> Result<u32, DisplayError> {
    let requested = dpi_index(percent).ok_or(DisplayError::UnsupportedDpi { percent })?;
    let info = scale_info(api, source)?;
    let target = requested.clamp(info.indices.min, info.indices.max);
    if target != requested {
        warn!(
            "{}% is outside {}%..={}% for {}, using {}%",
            percent, info.min_percent, info.max_percent, source.device_name, DPI_TABLE[target]
        );
    }
    // Offsets are relative to the recommended entry as reported, even when
    // that entry lies past the end of the table.
    let relative = (target as i64 - i64::from(info.min_rel.unsigned_abs())) as i32;
    let status = api.set_dpi_scale(source.id, relative);
    if status != STATUS_SUCCESS {
        return Err(DisplayError::ModeApplyFailure {
            stage: ApplyStage::DpiScale,
            code: status,
        });
    }
    info!(
        "Set DPI scale of {} to {}% (relative {})",
        source.device_name, DPI_TABLE[target], relative
    );
    Ok(DPI_TABLE[target])
}
