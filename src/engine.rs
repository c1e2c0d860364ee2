use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    applier::{ApplyOutcome, ModeApplier},
    dpi::{self, DpiScaleInfo},
    error::DisplayError,
    mode::{self, DisplayMode, ModeList, Resolution},
    platform::PlatformDisplayApi,
    preference::PreferenceStore,
    source::{self, DisplaySource},
};

/// A mode that was successfully switched to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMode {
    pub source: DisplaySource,
    pub mode: DisplayMode,
    pub outcome: ApplyOutcome,
}

/// Everything worth showing about one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub index: usize,
    pub source: DisplaySource,
    pub current_mode: Option<DisplayMode>,
    pub scale: Option<DpiScaleInfo>,
}

/// A source's mode catalog together with what it is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceModes {
    pub source: DisplaySource,
    pub modes: ModeList,
    pub current_mode: Option<DisplayMode>,
    pub preferred_refresh_hz: Option<u32>,
}

struct Inner<A> {
    api: A,
    preferences: PreferenceStore,
}

/// The facade the presentation layer talks to.
///
/// Every operation holds one lock for its whole duration, so topology queries,
/// catalog reads, mode changes and preference updates never interleave. Monitors
/// are addressed by their 1-based position and the topology is re-queried on
/// every call.
pub struct DisplayEngine<A> {
    inner: Mutex<Inner<A>>,
}

impl<A: PlatformDisplayApi> DisplayEngine<A> {
    pub fn new(api: A) -> Self {
        Self {
            inner: Mutex::new(Inner {
                api,
                preferences: PreferenceStore::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<A>> {
        // A panic mid-operation leaves nothing half-written in the preferences.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn sources(&self) -> Result<Vec<DisplaySource>, DisplayError> {
        source::list_active_sources(&self.lock().api)
    }

    pub fn source(&self, index: usize) -> Result<DisplaySource, DisplayError> {
        self.lock().source(index)
    }

    pub fn summaries(&self) -> Result<Vec<SourceSummary>, DisplayError> {
        let inner = self.lock();
        let sources = source::list_active_sources(&inner.api)?;
        Ok(sources
            .into_iter()
            .enumerate()
            .map(|(i, source)| SourceSummary {
                index: i + 1,
                current_mode: mode::current_mode(&inner.api, &source),
                // Not every source supports per-monitor scaling.
                scale: dpi::scale_info(&inner.api, &source).ok(),
                source,
            })
            .collect())
    }

    pub fn modes(&self, index: usize) -> Result<SourceModes, DisplayError> {
        let inner = self.lock();
        let source = inner.source(index)?;
        Ok(SourceModes {
            modes: mode::list_modes(&inner.api, &source),
            current_mode: mode::current_mode(&inner.api, &source),
            preferred_refresh_hz: inner.preferences.get(&source),
            source,
        })
    }

    pub fn current_mode(&self, index: usize) -> Result<Option<DisplayMode>, DisplayError> {
        let inner = self.lock();
        let source = inner.source(index)?;
        Ok(mode::current_mode(&inner.api, &source))
    }

    pub fn preferred_refresh_rate(&self, index: usize) -> Result<Option<u32>, DisplayError> {
        let inner = self.lock();
        let source = inner.source(index)?;
        Ok(inner.preferences.get(&source))
    }

    /// Switches to `resolution`, keeping the remembered refresh rate when the
    /// resolution supports it.
    pub fn set_resolution(
        &self,
        index: usize,
        resolution: Resolution,
    ) -> Result<AppliedMode, DisplayError> {
        let mut inner = self.lock();
        let source = inner.source(index)?;
        inner.select_resolution(source, resolution)
    }

    /// Switches the refresh rate at the current resolution and remembers it.
    pub fn set_refresh_rate(
        &self,
        index: usize,
        refresh_hz: u32,
    ) -> Result<AppliedMode, DisplayError> {
        let mut inner = self.lock();
        let source = inner.source(index)?;
        let current = mode::current_mode(&inner.api, &source).ok_or_else(|| {
            DisplayError::NoCurrentMode {
                device_name: source.device_name.clone(),
            }
        })?;
        let modes = mode::list_modes(&inner.api, &source);
        let candidate = mode::select_for_refresh_rate(&modes, &current, refresh_hz)
            .ok_or_else(|| DisplayError::NoModeForRefresh {
                device_name: source.device_name.clone(),
                refresh_hz,
            })?;
        inner.preferences.set(&source, refresh_hz);
        inner.apply(source, candidate)
    }

    /// Applies an exact mode when the catalog has it, otherwise behaves like
    /// [`set_resolution`](Self::set_resolution).
    pub fn set_mode(
        &self,
        index: usize,
        width: u32,
        height: u32,
        refresh_hz: u32,
    ) -> Result<AppliedMode, DisplayError> {
        let mut inner = self.lock();
        let source = inner.source(index)?;
        let resolution = Resolution::new(width, height);
        let exact = mode::list_modes(&inner.api, &source)
            .into_iter()
            .find(|m| m.has_resolution(resolution) && m.refresh_hz == refresh_hz);
        match exact {
            Some(candidate) => {
                inner.preferences.set(&source, refresh_hz);
                inner.apply(source, candidate)
            }
            None => {
                debug!(
                    "{}x{} @ {}Hz is not offered by {}, selecting by resolution",
                    width, height, refresh_hz, source.device_name
                );
                inner.select_resolution(source, resolution)
            }
        }
    }

    pub fn scale_info(&self, index: usize) -> Result<DpiScaleInfo, DisplayError> {
        let inner = self.lock();
        let source = inner.source(index)?;
        dpi::scale_info(&inner.api, &source)
    }

    /// Returns the percentage that was applied after clamping.
    pub fn set_scale(&self, index: usize, percent: u32) -> Result<u32, DisplayError> {
        let inner = self.lock();
        let source = inner.source(index)?;
        dpi::set_scale(&inner.api, &source, percent)
    }
}

impl<A: PlatformDisplayApi> Inner<A> {
    fn source(&self, index: usize) -> Result<DisplaySource, DisplayError> {
        let sources = source::list_active_sources(&self.api)?;
        source::source_at(&sources, index).cloned()
    }

    fn select_resolution(
        &mut self,
        source: DisplaySource,
        resolution: Resolution,
    ) -> Result<AppliedMode, DisplayError> {
        let current = mode::current_mode(&self.api, &source);
        self.preferences
            .ensure_initialized(&source, current.map(|m| m.refresh_hz));
        let modes = mode::list_modes(&self.api, &source);
        let candidate = mode::select_for_resolution(
            &modes,
            current.as_ref(),
            &self.preferences,
            &source,
            resolution,
        )
        .ok_or_else(|| DisplayError::NoCurrentMode {
            device_name: source.device_name.clone(),
        })?;
        self.apply(source, candidate)
    }

    fn apply(
        &self,
        source: DisplaySource,
        candidate: DisplayMode,
    ) -> Result<AppliedMode, DisplayError> {
        info!("Switching {} to {}", source.label(), candidate);
        let outcome = ModeApplier::new(&self.api).apply(&source.device_name, &candidate)?;
        Ok(AppliedMode {
            source,
            mode: candidate,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;
    use crate::{
        error::ApplyStage,
        fake::{Call, FakeDisplayApi, source},
        platform::{ChangeFlags, DisplayChangeStatus, RawDpiScale},
    };

    const PRIMARY: &str = r"\\.\DISPLAY1";
    const SECONDARY: &str = r"\\.\DISPLAY2";

    fn mode(width: u32, height: u32, refresh_hz: u32) -> DisplayMode {
        DisplayMode::new(width, height, 32, refresh_hz)
    }

    fn desk() -> FakeDisplayApi {
        let primary = source(1, PRIMARY);
        let secondary = source(2, SECONDARY);
        let mut api = FakeDisplayApi::new();
        api.add_source(primary.clone());
        api.add_source(secondary.clone());
        api.set_reported_modes(
            &primary,
            vec![
                mode(1920, 1080, 60),
                mode(1920, 1080, 144),
                mode(2560, 1440, 60),
                mode(1280, 720, 60),
            ],
        );
        api.set_reported_modes(&secondary, vec![mode(1920, 1080, 60)]);
        api.set_current_mode(PRIMARY, mode(1920, 1080, 60));
        api.set_current_mode(SECONDARY, mode(1920, 1080, 60));
        api.set_dpi(
            &primary,
            RawDpiScale {
                min_rel: -3,
                cur_rel: 0,
                max_rel: 2,
            },
        );
        api
    }

    fn current(engine: &DisplayEngine<FakeDisplayApi>, index: usize) -> DisplayMode {
        engine.current_mode(index).unwrap().unwrap()
    }

    #[test]
    fn refresh_preference_survives_resolution_changes() {
        let engine = DisplayEngine::new(desk());

        let applied = engine.set_refresh_rate(1, 144).unwrap();
        assert_eq!(applied.mode, mode(1920, 1080, 144));
        assert_eq!(applied.outcome, ApplyOutcome::Applied);
        assert_eq!(engine.preferred_refresh_rate(1).unwrap(), Some(144));

        engine.set_resolution(1, Resolution::new(2560, 1440)).unwrap();
        assert_eq!(current(&engine, 1), mode(2560, 1440, 60));
        assert_eq!(engine.preferred_refresh_rate(1).unwrap(), Some(144));

        engine.set_resolution(1, Resolution::new(1920, 1080)).unwrap();
        assert_eq!(current(&engine, 1), mode(1920, 1080, 144));
    }

    #[test]
    fn resolution_change_seeds_preference_from_current_mode() {
        let engine = DisplayEngine::new(desk());
        assert_eq!(engine.preferred_refresh_rate(1).unwrap(), None);
        engine.set_resolution(1, Resolution::new(1920, 1080)).unwrap();
        assert_eq!(engine.preferred_refresh_rate(1).unwrap(), Some(60));
        assert_eq!(current(&engine, 1), mode(1920, 1080, 60));
    }

    #[test]
    fn preferences_are_kept_per_monitor() {
        let engine = DisplayEngine::new(desk());
        engine.set_refresh_rate(1, 144).unwrap();
        assert_eq!(engine.preferred_refresh_rate(2).unwrap(), None);
        let applied = engine.set_refresh_rate(2, 144).unwrap();
        assert_eq!(applied.mode, mode(1920, 1080, 60));
        assert_eq!(applied.source.device_name, SECONDARY);
    }

    #[test]
    fn unsupported_resolution_is_rejected_at_test_stage() {
        let mut api = desk();
        api.test_status = DisplayChangeStatus::BadMode.into();
        let engine = DisplayEngine::new(api);
        let err = engine.set_resolution(1, Resolution::new(1600, 900)).unwrap_err();
        assert_eq!(
            err,
            DisplayError::ModeTestFailure {
                mode: mode(1600, 900, 60),
                code: -2
            }
        );
        assert_eq!(current(&engine, 1), mode(1920, 1080, 60));
    }

    #[test]
    fn refresh_change_without_a_catalog_mode_touches_nothing() {
        let mut api = desk();
        let odd = source(3, r"\\.\DISPLAY3");
        api.add_source(odd.clone());
        api.set_reported_modes(&odd, vec![mode(2560, 1440, 60)]);
        api.set_current_mode(r"\\.\DISPLAY3", mode(1024, 768, 60));
        let engine = DisplayEngine::new(api);
        assert_eq!(
            engine.set_refresh_rate(3, 240).unwrap_err(),
            DisplayError::NoModeForRefresh {
                device_name: r"\\.\DISPLAY3".into(),
                refresh_hz: 240
            }
        );
        assert_eq!(engine.preferred_refresh_rate(3).unwrap(), None);
        assert_eq!(current(&engine, 3), mode(1024, 768, 60));
        let engine = engine.lock();
        assert_eq!(
            engine.api.count(|c| matches!(c, Call::Change { .. })),
            0
        );
    }

    #[test]
    fn refresh_change_needs_a_current_mode() {
        let mut api = desk();
        api.add_source(source(3, r"\\.\DISPLAY3"));
        let engine = DisplayEngine::new(api);
        assert_eq!(
            engine.set_refresh_rate(3, 60).unwrap_err(),
            DisplayError::NoCurrentMode {
                device_name: r"\\.\DISPLAY3".into()
            }
        );
    }

    #[test]
    fn monitor_index_is_checked() {
        let engine = DisplayEngine::new(desk());
        assert_eq!(
            engine.set_scale(5, 150).unwrap_err(),
            DisplayError::OutOfRange { index: 5, count: 2 }
        );
        assert_eq!(
            engine.modes(0).unwrap_err(),
            DisplayError::OutOfRange { index: 0, count: 2 }
        );
    }

    #[test]
    fn exact_mode_falls_back_to_resolution_selection() {
        let engine = DisplayEngine::new(desk());
        let applied = engine.set_mode(1, 2560, 1440, 60).unwrap();
        assert_eq!(applied.mode, mode(2560, 1440, 60));
        assert_eq!(engine.preferred_refresh_rate(1).unwrap(), Some(60));

        let applied = engine.set_mode(1, 1920, 1080, 75).unwrap();
        assert_eq!(applied.mode, mode(1920, 1080, 60));
    }

    #[test]
    fn committed_changes_report_the_fallback() {
        let mut api = desk();
        api.immediate_status = DisplayChangeStatus::Failed.into();
        let engine = DisplayEngine::new(api);
        let applied = engine.set_resolution(1, Resolution::new(1280, 720)).unwrap();
        assert_eq!(applied.outcome, ApplyOutcome::Committed);
        assert_eq!(current(&engine, 1), mode(1280, 720, 60));
    }

    #[test]
    fn commit_failure_is_reported() {
        let mut api = desk();
        api.immediate_status = DisplayChangeStatus::Failed.into();
        api.commit_status = DisplayChangeStatus::Failed.into();
        let engine = DisplayEngine::new(api);
        assert_eq!(
            engine.set_resolution(1, Resolution::new(1280, 720)),
            Err(DisplayError::ModeApplyFailure {
                stage: ApplyStage::Commit,
                code: -1
            })
        );
    }

    #[test]
    fn summaries_cover_every_source() {
        let engine = DisplayEngine::new(desk());
        let summaries = engine.summaries().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].index, 1);
        assert_eq!(summaries[0].current_mode, Some(mode(1920, 1080, 60)));
        assert_eq!(summaries[0].scale.map(|s| s.current_percent), Some(175));
        assert_eq!(summaries[1].source.device_name, SECONDARY);

        let modes = engine.modes(1).unwrap();
        assert_eq!(modes.modes.len(), 4);
        assert_eq!(modes.modes.largest(), Some(&mode(2560, 1440, 60)));
    }

    #[test]
    fn scale_changes_go_through_the_selected_source() {
        let engine = DisplayEngine::new(desk());
        assert_eq!(engine.set_scale(1, 200), Ok(200));
        assert_eq!(engine.scale_info(1).unwrap().current_percent, 200);
    }

    #[test]
    fn engine_serializes_concurrent_callers() {
        let engine = Arc::new(DisplayEngine::new(desk()));
        let handles: Vec<_> = [60, 144, 60, 144]
            .into_iter()
            .map(|hz| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || engine.set_refresh_rate(1, hz).map(|a| a.mode))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }
        let preferred = engine.preferred_refresh_rate(1).unwrap();
        assert_eq!(current(&engine, 1).refresh_hz, preferred.unwrap());

        let inner = engine.lock();
        assert_eq!(
            inner.api.count(|c| matches!(
                c,
                Call::Change {
                    flags,
                    device: Some(_),
                    ..
                } if *flags == ChangeFlags::TEST
            )),
            4
        );
    }
}
