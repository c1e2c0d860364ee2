//! [`PlatformDisplayApi`] over the Win32 display APIs.

use std::{ffi::OsString, iter, os::windows::ffi::OsStringExt};

use tracing::{debug, warn};
use windows::{
    Win32::{
        Devices::Display::{
            DISPLAYCONFIG_DEVICE_INFO_GET_SOURCE_NAME, DISPLAYCONFIG_DEVICE_INFO_GET_TARGET_NAME,
            DISPLAYCONFIG_DEVICE_INFO_HEADER, DISPLAYCONFIG_DEVICE_INFO_TYPE,
            DISPLAYCONFIG_MODE_INFO, DISPLAYCONFIG_PATH_INFO, DISPLAYCONFIG_SOURCE_DEVICE_NAME,
            DISPLAYCONFIG_TARGET_DEVICE_NAME, DisplayConfigGetDeviceInfo,
            DisplayConfigSetDeviceInfo, GetDisplayConfigBufferSizes, QDC_ONLY_ACTIVE_PATHS,
            QueryDisplayConfig,
        },
        Foundation::{ERROR_INSUFFICIENT_BUFFER, ERROR_SUCCESS, HLOCAL, LUID, LocalFree, WIN32_ERROR},
        Graphics::Gdi::{
            CDS_NORESET, CDS_TEST, CDS_TYPE, CDS_UPDATEREGISTRY, ChangeDisplaySettingsExW,
            DEVMODEW, DISPLAYCONFIG_PATH_ACTIVE, DM_BITSPERPEL, DM_DISPLAYFREQUENCY, DM_PELSHEIGHT,
            DM_PELSWIDTH, ENUM_CURRENT_SETTINGS, ENUM_DISPLAY_SETTINGS_MODE, EnumDisplaySettingsW,
        },
        System::Diagnostics::Debug::{
            FORMAT_MESSAGE_ALLOCATE_BUFFER, FORMAT_MESSAGE_FROM_SYSTEM,
            FORMAT_MESSAGE_IGNORE_INSERTS, FormatMessageW,
        },
    },
    core::{PCWSTR, PWSTR},
};

use crate::{
    mode::DisplayMode,
    platform::{ChangeFlags, ChangeTarget, ModeIndex, PlatformDisplayApi, RawDpiScale, Status},
    source::{AdapterLuid, DisplaySource, SourceId},
};

const _: () = assert!(CDS_TEST.0 == ChangeFlags::TEST.bits());
const _: () = assert!(CDS_UPDATEREGISTRY.0 == ChangeFlags::UPDATE_REGISTRY.bits());
const _: () = assert!(CDS_NORESET.0 == ChangeFlags::NO_RESET.bits());

/// Undocumented device-info types for the per-monitor DPI scale.
const DISPLAYCONFIG_DEVICE_INFO_GET_DPI_SCALE: DISPLAYCONFIG_DEVICE_INFO_TYPE =
    DISPLAYCONFIG_DEVICE_INFO_TYPE(-3);
const DISPLAYCONFIG_DEVICE_INFO_SET_DPI_SCALE: DISPLAYCONFIG_DEVICE_INFO_TYPE =
    DISPLAYCONFIG_DEVICE_INFO_TYPE(-4);

#[repr(C)]
struct DisplayConfigGetDpiScale {
    header: DISPLAYCONFIG_DEVICE_INFO_HEADER,
    min_scale_rel: i32,
    cur_scale_rel: i32,
    max_scale_rel: i32,
}

#[repr(C)]
struct DisplayConfigSetDpiScale {
    header: DISPLAYCONFIG_DEVICE_INFO_HEADER,
    scale_rel: i32,
}

// The OS checks the header size against these exact values.
const _: () = assert!(size_of::<DisplayConfigGetDpiScale>() == 0x20);
const _: () = assert!(size_of::<DisplayConfigSetDpiScale>() == 0x18);

pub fn windows_error_to_string(error: WIN32_ERROR) -> String {
    use winapi::um::winnt::LANG_NEUTRAL;
    use winapi::um::winnt::MAKELANGID;
    use winapi::um::winnt::SUBLANG_DEFAULT;

    let mut error_text: PWSTR = PWSTR(std::ptr::null_mut());
    unsafe {
        let num_chars = FormatMessageW(
            FORMAT_MESSAGE_FROM_SYSTEM
                | FORMAT_MESSAGE_ALLOCATE_BUFFER
                | FORMAT_MESSAGE_IGNORE_INSERTS,
            None,
            error.0,
            MAKELANGID(LANG_NEUTRAL, SUBLANG_DEFAULT).into(),
            PWSTR((&mut error_text) as *mut PWSTR as *mut _),
            0,
            None,
        );
        if num_chars == 0 {
            return format!("0x{:x}", error.0);
        }
        let string = OsString::from_wide(std::slice::from_raw_parts(error_text.0, num_chars as _));
        LocalFree(Some(HLOCAL(error_text.0 as *mut _)));
        format!("0x{:x} {}", error.0, string.display().to_string().trim_end())
    }
}

pub fn wchar_null_terminated_to_string(wchar: &[u16]) -> String {
    let len = wchar.iter().position(|&c| c == 0).unwrap_or(wchar.len());
    OsString::from_wide(&wchar[..len])
        .to_string_lossy()
        .into_owned()
}

fn to_wide_null_terminated(value: &str) -> Vec<u16> {
    value.encode_utf16().chain(iter::once(0)).collect()
}

impl From<LUID> for AdapterLuid {
    fn from(luid: LUID) -> Self {
        Self {
            low: luid.LowPart,
            high: luid.HighPart,
        }
    }
}

impl From<AdapterLuid> for LUID {
    fn from(luid: AdapterLuid) -> Self {
        Self {
            LowPart: luid.low,
            HighPart: luid.high,
        }
    }
}

fn device_info_header<T>(
    kind: DISPLAYCONFIG_DEVICE_INFO_TYPE,
    adapter_id: LUID,
    id: u32,
) -> DISPLAYCONFIG_DEVICE_INFO_HEADER {
    DISPLAYCONFIG_DEVICE_INFO_HEADER {
        r#type: kind,
        // Every packet used here is a few hundred bytes at most.
        size: size_of::<T>() as u32,
        adapterId: adapter_id,
        id,
    }
}

/// Fresh, empty buffers with room for at least the given element counts.
fn display_config_buffers(
    num_paths: u32,
    num_modes: u32,
) -> (Vec<DISPLAYCONFIG_PATH_INFO>, Vec<DISPLAYCONFIG_MODE_INFO>) {
    (
        Vec::with_capacity(num_paths as usize),
        Vec::with_capacity(num_modes as usize),
    )
}

fn query_active_paths() -> Result<Vec<DISPLAYCONFIG_PATH_INFO>, WIN32_ERROR> {
    unsafe {
        loop {
            let mut num_paths = 0;
            let mut num_modes = 0;
            let result =
                GetDisplayConfigBufferSizes(QDC_ONLY_ACTIVE_PATHS, &mut num_paths, &mut num_modes);
            if result != ERROR_SUCCESS {
                warn!(
                    "GetDisplayConfigBufferSizes error: {}",
                    windows_error_to_string(result)
                );
                return Err(result);
            }

            let (mut paths, mut modes) = display_config_buffers(num_paths, num_modes);

            let result = QueryDisplayConfig(
                QDC_ONLY_ACTIVE_PATHS,
                &mut num_paths,
                paths.as_mut_ptr(),
                &mut num_modes,
                modes.as_mut_ptr(),
                None,
            );
            if result == ERROR_INSUFFICIENT_BUFFER {
                debug!("Display topology changed while querying, retrying");
                continue;
            }
            if result != ERROR_SUCCESS {
                warn!("QueryDisplayConfig error: {}", windows_error_to_string(result));
                return Err(result);
            }

            paths.set_len(num_paths as usize);
            paths.retain(|path| path.flags & DISPLAYCONFIG_PATH_ACTIVE != 0);
            return Ok(paths);
        }
    }
}

fn get_source_device_name(
    id: u32,
    adapter_id: LUID,
) -> Result<DISPLAYCONFIG_SOURCE_DEVICE_NAME, Status> {
    let mut device_name = DISPLAYCONFIG_SOURCE_DEVICE_NAME {
        header: device_info_header::<DISPLAYCONFIG_SOURCE_DEVICE_NAME>(
            DISPLAYCONFIG_DEVICE_INFO_GET_SOURCE_NAME,
            adapter_id,
            id,
        ),
        ..Default::default()
    };
    let result = unsafe { DisplayConfigGetDeviceInfo(&mut device_name.header) };
    if result != ERROR_SUCCESS.0 as i32 {
        warn!(
            "DisplayConfigGetDeviceInfo (source name) error: {}",
            windows_error_to_string(WIN32_ERROR(result as u32))
        );
        return Err(result);
    }
    Ok(device_name)
}

fn get_target_device_name(
    id: u32,
    adapter_id: LUID,
) -> Result<DISPLAYCONFIG_TARGET_DEVICE_NAME, Status> {
    let mut device_name = DISPLAYCONFIG_TARGET_DEVICE_NAME {
        header: device_info_header::<DISPLAYCONFIG_TARGET_DEVICE_NAME>(
            DISPLAYCONFIG_DEVICE_INFO_GET_TARGET_NAME,
            adapter_id,
            id,
        ),
        ..Default::default()
    };
    let result = unsafe { DisplayConfigGetDeviceInfo(&mut device_name.header) };
    if result != ERROR_SUCCESS.0 as i32 {
        return Err(result);
    }
    Ok(device_name)
}

fn empty_devmode() -> DEVMODEW {
    DEVMODEW {
        dmSize: size_of::<DEVMODEW>() as u16,
        ..Default::default()
    }
}

fn enum_display_settings(device: &[u16], mode_num: ENUM_DISPLAY_SETTINGS_MODE) -> Option<DEVMODEW> {
    let mut devmode = empty_devmode();
    let found = unsafe { EnumDisplaySettingsW(PCWSTR(device.as_ptr()), mode_num, &mut devmode) };
    found.as_bool().then_some(devmode)
}

/// Production backend. Stateless: every call goes straight to the OS.
#[derive(Debug, Default)]
pub struct WindowsDisplayApi;

impl WindowsDisplayApi {
    pub fn new() -> Self {
        Self
    }
}

impl PlatformDisplayApi for WindowsDisplayApi {
    fn active_sources(&self) -> Result<Vec<DisplaySource>, Status> {
        let paths = query_active_paths().map_err(|e| e.0 as Status)?;
        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            let source_info = path.sourceInfo;
            let target_info = path.targetInfo;
            let source_name = get_source_device_name(source_info.id, source_info.adapterId)?;
            let mut source = DisplaySource::new(
                SourceId {
                    adapter_id: source_info.adapterId.into(),
                    id: source_info.id,
                },
                wchar_null_terminated_to_string(&source_name.viewGdiDeviceName),
            );
            source.output_technology = Some(target_info.outputTechnology.0.into());
            match get_target_device_name(target_info.id, target_info.adapterId) {
                Ok(target_name) => {
                    source.monitor_friendly_name = Some(wchar_null_terminated_to_string(
                        &target_name.monitorFriendlyDeviceName,
                    ))
                    .filter(|name| !name.is_empty());
                    source.monitor_device_path = Some(wchar_null_terminated_to_string(
                        &target_name.monitorDevicePath,
                    ))
                    .filter(|path| !path.is_empty());
                }
                Err(code) => debug!(
                    "No target name for {} (status {})",
                    source.device_name, code
                ),
            }
            sources.push(source);
        }
        Ok(sources)
    }

    fn enum_mode(&self, device_name: &str, index: ModeIndex) -> Option<DisplayMode> {
        let device = to_wide_null_terminated(device_name);
        let mode_num = match index {
            ModeIndex::Current => ENUM_CURRENT_SETTINGS,
            ModeIndex::Index(i) => ENUM_DISPLAY_SETTINGS_MODE(i),
        };
        enum_display_settings(&device, mode_num).map(|devmode| DisplayMode {
            width: devmode.dmPelsWidth,
            height: devmode.dmPelsHeight,
            bits_per_pixel: devmode.dmBitsPerPel,
            refresh_hz: devmode.dmDisplayFrequency,
        })
    }

    fn change_mode(&self, target: ChangeTarget<'_>, flags: ChangeFlags) -> Status {
        let flags = CDS_TYPE(flags.bits());
        let result = match target {
            ChangeTarget::Device { device_name, mode } => {
                let device = to_wide_null_terminated(device_name);
                let mut devmode = enum_display_settings(&device, ENUM_CURRENT_SETTINGS)
                    .unwrap_or_else(empty_devmode);
                devmode.dmPelsWidth = mode.width;
                devmode.dmPelsHeight = mode.height;
                devmode.dmBitsPerPel = mode.bits_per_pixel;
                devmode.dmDisplayFrequency = mode.refresh_hz;
                devmode.dmFields = DM_PELSWIDTH | DM_PELSHEIGHT | DM_BITSPERPEL | DM_DISPLAYFREQUENCY;
                unsafe {
                    ChangeDisplaySettingsExW(
                        PCWSTR(device.as_ptr()),
                        Some(&devmode as *const DEVMODEW),
                        None,
                        flags,
                        None,
                    )
                }
            }
            ChangeTarget::Global => unsafe {
                ChangeDisplaySettingsExW(PCWSTR::null(), None, None, flags, None)
            },
        };
        result.0
    }

    fn get_dpi_scale(&self, source: SourceId) -> Result<RawDpiScale, Status> {
        let mut packet = DisplayConfigGetDpiScale {
            header: device_info_header::<DisplayConfigGetDpiScale>(
                DISPLAYCONFIG_DEVICE_INFO_GET_DPI_SCALE,
                source.adapter_id.into(),
                source.id,
            ),
            min_scale_rel: 0,
            cur_scale_rel: 0,
            max_scale_rel: 0,
        };
        let result = unsafe { DisplayConfigGetDeviceInfo(&mut packet.header) };
        if result != ERROR_SUCCESS.0 as i32 {
            return Err(result);
        }
        Ok(RawDpiScale {
            min_rel: packet.min_scale_rel,
            cur_rel: packet.cur_scale_rel,
            max_rel: packet.max_scale_rel,
        })
    }

    fn set_dpi_scale(&self, source: SourceId, relative: i32) -> Status {
        let packet = DisplayConfigSetDpiScale {
            header: device_info_header::<DisplayConfigSetDpiScale>(
                DISPLAYCONFIG_DEVICE_INFO_SET_DPI_SCALE,
                source.adapter_id.into(),
                source.id,
            ),
            scale_rel: relative,
        };
        unsafe { DisplayConfigSetDeviceInfo(&packet.header) }
    }
}
