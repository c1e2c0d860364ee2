use std::collections::HashSet;

use derive_more::IntoIterator;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    platform::{ModeIndex, PlatformDisplayApi},
    preference::PreferenceStore,
    source::DisplaySource,
};

/// Resolutions that get a well-known name in menus.
pub const NAMED_RESOLUTIONS: [(Resolution, &str); 5] = [
    (Resolution::new(1280, 720), "720p"),
    (Resolution::new(1920, 1080), "1080p"),
    (Resolution::new(2560, 1440), "2K"),
    (Resolution::new(3840, 2160), "4K"),
    (Resolution::new(7680, 4320), "8K"),
];

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[display("{width}x{height} @ {refresh_hz}Hz")]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    pub refresh_hz: u32,
}

impl DisplayMode {
    pub fn new(width: u32, height: u32, bits_per_pixel: u32, refresh_hz: u32) -> Self {
        Self {
            width,
            height,
            bits_per_pixel,
            refresh_hz,
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn has_resolution(&self, resolution: Resolution) -> bool {
        self.resolution() == resolution
    }

    fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.refresh_hz > 0
    }

    /// Identity used for deduplication; bit depth is deliberately not part of it.
    fn dedupe_key(&self) -> (u32, u32, u32) {
        (self.width, self.height, self.refresh_hz)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[display("{width}x{height}")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// The aspect ratio reduced to lowest terms, e.g. 16:9 for 2560x1440.
    pub fn aspect_ratio(&self) -> (u32, u32) {
        let divisor = gcd(self.width, self.height);
        if divisor == 0 {
            return (0, 0);
        }
        (self.width / divisor, self.height / divisor)
    }

    pub fn label(&self) -> Option<&'static str> {
        NAMED_RESOLUTIONS
            .iter()
            .find(|(resolution, _)| resolution == self)
            .map(|(_, label)| *label)
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Whether two refresh rates should be shown as the same choice (59 vs 60 Hz).
pub fn refresh_matches(a: u32, b: u32) -> bool {
    a.abs_diff(b) <= 1
}

/// The supported modes of one source, deduplicated and in canonical order:
/// width, height and refresh rate all descending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, IntoIterator)]
#[serde(transparent)]
#[into_iterator(owned, ref)]
pub struct ModeList(Vec<DisplayMode>);

impl ModeList {
    /// Builds the canonical list from modes in the order the OS reported them.
    ///
    /// The first mode seen for a (width, height, refresh) triple wins, so its
    /// bit depth is the one kept.
    pub fn from_reported(reported: impl IntoIterator<Item = DisplayMode>) -> Self {
        let mut seen = HashSet::new();
        let mut modes: Vec<DisplayMode> = reported
            .into_iter()
            .filter(DisplayMode::is_valid)
            .filter(|mode| seen.insert(mode.dedupe_key()))
            .collect();
        modes.sort_by(|a, b| b.dedupe_key().cmp(&a.dedupe_key()));
        Self(modes)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DisplayMode> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[DisplayMode] {
        &self.0
    }

    /// The biggest mode the source supports.
    pub fn largest(&self) -> Option<&DisplayMode> {
        self.0.first()
    }

    pub fn contains(&self, mode: &DisplayMode) -> bool {
        self.0.iter().any(|m| m.dedupe_key() == mode.dedupe_key())
    }

    /// Unique resolutions in canonical order.
    pub fn resolutions(&self) -> Vec<Resolution> {
        let mut resolutions: Vec<Resolution> = Vec::new();
        for mode in &self.0 {
            if resolutions.last() != Some(&mode.resolution()) {
                resolutions.push(mode.resolution());
            }
        }
        resolutions
    }

    /// Unique refresh rates, highest first.
    pub fn refresh_rates(&self) -> Vec<u32> {
        let mut rates: Vec<u32> = self.0.iter().map(|m| m.refresh_hz).collect();
        rates.sort_unstable_by(|a, b| b.cmp(a));
        rates.dedup();
        rates
    }

    /// Splits the resolutions into the ones worth showing up front and the rest.
    ///
    /// Popular ones share the current mode's aspect ratio, followed by any named
    /// resolution the source supports.
    pub fn group_resolutions(&self, current: Option<&DisplayMode>) -> ResolutionGroups {
        let all = self.resolutions();
        let mut popular: Vec<Resolution> = Vec::new();
        if let Some(current) = current {
            let ratio = current.resolution().aspect_ratio();
            popular.extend(all.iter().filter(|r| r.aspect_ratio() == ratio));
        }
        for (named, _) in NAMED_RESOLUTIONS {
            if all.contains(&named) && !popular.contains(&named) {
                popular.push(named);
            }
        }
        let other = all.into_iter().filter(|r| !popular.contains(r)).collect();
        ResolutionGroups { popular, other }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionGroups {
    pub popular: Vec<Resolution>,
    pub other: Vec<Resolution>,
}

/// Enumerates every mode the source reports until the OS signals exhaustion.
pub fn list_modes<A: PlatformDisplayApi + ?Sized>(api: &A, source: &DisplaySource) -> ModeList {
    let mut reported = Vec::new();
    let mut index = 0;
    while let Some(mode) = api.enum_mode(&source.device_name, ModeIndex::Index(index)) {
        reported.push(mode);
        index += 1;
    }
    let modes = ModeList::from_reported(reported);
    debug!(
        "Enumerated {} unique modes ({} reported) for {}",
        modes.len(),
        index,
        source.device_name
    );
    modes
}

/// The mode the source is running right now, if the OS can resolve one.
pub fn current_mode<A: PlatformDisplayApi + ?Sized>(
    api: &A,
    source: &DisplaySource,
) -> Option<DisplayMode> {
    api.enum_mode(&source.device_name, ModeIndex::Current)
        .filter(|mode| mode.width > 0 && mode.height > 0)
}

/// Picks the concrete mode for a resolution request.
///
/// Prefers the remembered refresh rate of `source`, then the highest refresh
/// rate available at that resolution. If the catalog has no such resolution at
/// all, pairs it with the current mode's depth and refresh rate and leaves it
/// to the driver's test stage to reject.
pub fn select_for_resolution(
    modes: &ModeList,
    current: Option<&DisplayMode>,
    preferences: &PreferenceStore,
    source: &DisplaySource,
    resolution: Resolution,
) -> Option<DisplayMode> {
    if let Some(preferred_hz) = preferences.get(source) {
        if let Some(mode) = modes
            .iter()
            .find(|m| m.has_resolution(resolution) && m.refresh_hz == preferred_hz)
        {
            return Some(*mode);
        }
    }
    if let Some(mode) = highest_refresh(modes.iter().filter(|m| m.has_resolution(resolution))) {
        return Some(mode);
    }
    current.map(|current| DisplayMode {
        width: resolution.width,
        height: resolution.height,
        bits_per_pixel: current.bits_per_pixel,
        refresh_hz: current.refresh_hz,
    })
}

/// Picks the concrete mode for a refresh-rate request at the current resolution.
///
/// Falls back to the highest refresh rate the current resolution supports.
pub fn select_for_refresh_rate(
    modes: &ModeList,
    current: &DisplayMode,
    refresh_hz: u32,
) -> Option<DisplayMode> {
    let same_resolution = || {
        modes
            .iter()
            .filter(|m| m.has_resolution(current.resolution()))
    };
    same_resolution()
        .find(|m| m.refresh_hz == refresh_hz)
        .copied()
        .or_else(|| highest_refresh(same_resolution()))
}

/// Highest refresh rate; on a tie the earliest mode wins.
fn highest_refresh<'a>(modes: impl Iterator<Item = &'a DisplayMode>) -> Option<DisplayMode> {
    modes
        .fold(None::<&DisplayMode>, |best, mode| match best {
            Some(best) if best.refresh_hz >= mode.refresh_hz => Some(best),
            _ => Some(mode),
        })
        .copied()
}
