//! In-memory display backend with scripted statuses and a call log.

use std::{cell::RefCell, collections::HashMap};

use crate::{
    mode::DisplayMode,
    platform::{
        ChangeFlags, ChangeTarget, DisplayChangeStatus, ModeIndex, PlatformDisplayApi,
        RawDpiScale, STATUS_SUCCESS, Status,
    },
    source::{AdapterLuid, DisplaySource, SourceId},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ActiveSources,
    EnumMode {
        device: String,
        index: ModeIndex,
    },
    Change {
        device: Option<String>,
        mode: Option<DisplayMode>,
        flags: ChangeFlags,
    },
    GetDpi(SourceId),
    SetDpi {
        source: SourceId,
        relative: i32,
    },
}

#[derive(Debug, Default)]
pub struct FakeDisplayApi {
    pub sources: Vec<DisplaySource>,
    pub topology_status: Status,
    pub test_status: Status,
    pub immediate_status: Status,
    pub registry_status: Status,
    pub commit_status: Status,
    pub get_dpi_status: Status,
    pub set_dpi_status: Status,
    reported: HashMap<String, Vec<DisplayMode>>,
    current: RefCell<HashMap<String, DisplayMode>>,
    staged: RefCell<Vec<(String, DisplayMode)>>,
    dpi: RefCell<HashMap<SourceId, RawDpiScale>>,
    calls: RefCell<Vec<Call>>,
}

pub fn source(id: u32, device_name: &str) -> DisplaySource {
    DisplaySource::new(
        SourceId {
            adapter_id: AdapterLuid {
                low: 0x0001_2345,
                high: 0,
            },
            id,
        },
        device_name,
    )
}

impl FakeDisplayApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&mut self, source: DisplaySource) {
        self.sources.push(source);
    }

    pub fn set_reported_modes(&mut self, source: &DisplaySource, modes: Vec<DisplayMode>) {
        self.reported.insert(source.device_name.clone(), modes);
    }

    pub fn set_current_mode(&self, device_name: &str, mode: DisplayMode) {
        self.current
            .borrow_mut()
            .insert(device_name.to_owned(), mode);
    }

    pub fn current_mode(&self, device_name: &str) -> Option<DisplayMode> {
        self.current.borrow().get(device_name).copied()
    }

    pub fn set_dpi(&self, source: &DisplaySource, raw: RawDpiScale) {
        self.dpi.borrow_mut().insert(source.id, raw);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl PlatformDisplayApi for FakeDisplayApi {
    fn active_sources(&self) -> Result<Vec<DisplaySource>, Status> {
        self.record(Call::ActiveSources);
        if self.topology_status != STATUS_SUCCESS {
            return Err(self.topology_status);
        }
        Ok(self.sources.clone())
    }

    fn enum_mode(&self, device_name: &str, index: ModeIndex) -> Option<DisplayMode> {
        self.record(Call::EnumMode {
            device: device_name.to_owned(),
            index,
        });
        match index {
            ModeIndex::Current => self.current_mode(device_name),
            ModeIndex::Index(i) => self
                .reported
                .get(device_name)
                .and_then(|modes| modes.get(i as usize))
                .copied(),
        }
    }

    fn change_mode(&self, target: ChangeTarget<'_>, flags: ChangeFlags) -> Status {
        match target {
            ChangeTarget::Device { device_name, mode } => {
                self.record(Call::Change {
                    device: Some(device_name.to_owned()),
                    mode: Some(*mode),
                    flags,
                });
                if flags == ChangeFlags::TEST {
                    self.test_status
                } else if flags.is_empty() {
                    if self.immediate_status == STATUS_SUCCESS {
                        self.set_current_mode(device_name, *mode);
                    }
                    self.immediate_status
                } else if flags == ChangeFlags::UPDATE_REGISTRY | ChangeFlags::NO_RESET {
                    if self.registry_status == STATUS_SUCCESS {
                        self.staged
                            .borrow_mut()
                            .push((device_name.to_owned(), *mode));
                    }
                    self.registry_status
                } else {
                    DisplayChangeStatus::BadFlags.into()
                }
            }
            ChangeTarget::Global => {
                self.record(Call::Change {
                    device: None,
                    mode: None,
                    flags,
                });
                if self.commit_status == STATUS_SUCCESS {
                    for (device_name, mode) in self.staged.borrow_mut().drain(..) {
                        self.set_current_mode(&device_name, mode);
                    }
                }
                self.commit_status
            }
        }
    }

    fn get_dpi_scale(&self, source: SourceId) -> Result<RawDpiScale, Status> {
        self.record(Call::GetDpi(source));
        if self.get_dpi_status != STATUS_SUCCESS {
            return Err(self.get_dpi_status);
        }
        Ok(self.dpi.borrow().get(&source).copied().unwrap_or_default())
    }

    fn set_dpi_scale(&self, source: SourceId, relative: i32) -> Status {
        self.record(Call::SetDpi { source, relative });
        if self.set_dpi_status == STATUS_SUCCESS {
            self.dpi.borrow_mut().entry(source).or_default().cur_rel = relative;
        }
        self.set_dpi_status
    }
}
