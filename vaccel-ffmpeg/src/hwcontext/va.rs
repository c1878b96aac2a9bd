//! libva queries on displays owned by libav.

use std::{
    ffi::{CStr, c_char, c_int, c_void},
    sync::OnceLock,
};

use tracing::debug;
use vaccel_core::hwcontext::RawHandle;

type VaDisplay = *mut c_void;
type VaQueryVendorStringFn = unsafe extern "C" fn(VaDisplay) -> *const c_char;
type VaMaxNumEntrypointsFn = unsafe extern "C" fn(VaDisplay) -> c_int;
type VaQueryConfigEntrypointsFn =
    unsafe extern "C" fn(VaDisplay, c_int, *mut c_int, *mut c_int) -> c_int;

const VA_STATUS_SUCCESS: c_int = 0;
const VA_PROFILE_NONE: c_int = -1;
const VA_ENTRYPOINT_VIDEO_PROC: c_int = 10;

struct LibVa {
    _lib: libloading::Library,
    query_vendor_string: VaQueryVendorStringFn,
    max_num_entrypoints: VaMaxNumEntrypointsFn,
    query_config_entrypoints: VaQueryConfigEntrypointsFn,
}

static LIBVA: OnceLock<Option<LibVa>> = OnceLock::new();

fn libva() -> Option<&'static LibVa> {
    LIBVA
        .get_or_init(|| unsafe {
            let lib = ["libva.so.2", "libva.so"]
                .into_iter()
                .find_map(|name| libloading::Library::new(name).ok());
            let Some(lib) = lib else {
                debug!("libva is not available.");
                return None;
            };

            let query_vendor_string: VaQueryVendorStringFn =
                *lib.get(b"vaQueryVendorString\0").ok()?;
            let max_num_entrypoints: VaMaxNumEntrypointsFn =
                *lib.get(b"vaMaxNumEntrypoints\0").ok()?;
            let query_config_entrypoints: VaQueryConfigEntrypointsFn =
                *lib.get(b"vaQueryConfigEntrypoints\0").ok()?;

            Some(LibVa {
                _lib: lib,
                query_vendor_string,
                max_num_entrypoints,
                query_config_entrypoints,
            })
        })
        .as_ref()
}

pub(super) fn vendor_string(display: RawHandle) -> Option<String> {
    if display.is_null() {
        return None;
    }
    let lib = libva()?;
    let vendor = unsafe { (lib.query_vendor_string)(display.as_ptr()) };
    if vendor.is_null() {
        return None;
    }
    let vendor = unsafe { CStr::from_ptr(vendor) };
    Some(vendor.to_string_lossy().into_owned())
}

pub(super) fn supports_video_proc(display: RawHandle) -> bool {
    if display.is_null() {
        return false;
    }
    let Some(lib) = libva() else {
        return false;
    };

    let max = unsafe { (lib.max_num_entrypoints)(display.as_ptr()) };
    if max <= 0 {
        return false;
    }
    let mut entrypoints = vec![0; max as usize];
    let mut count = 0;
    let status = unsafe {
        (lib.query_config_entrypoints)(
            display.as_ptr(),
            VA_PROFILE_NONE,
            entrypoints.as_mut_ptr(),
            &mut count,
        )
    };
    if status != VA_STATUS_SUCCESS {
        return false;
    }
    entrypoints
        .iter()
        .take(count.clamp(0, max) as usize)
        .any(|entrypoint| *entrypoint == VA_ENTRYPOINT_VIDEO_PROC)
}
