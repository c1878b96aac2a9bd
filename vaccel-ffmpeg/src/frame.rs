use std::ffi::c_void;

use ffmpeg_next::{ffi::AVPixelFormat, frame};
use vaccel_core::{
    BackendCatalog, HwDeviceType,
    compute::FrameSize,
    hwcontext::RawHandle,
    interop::{NativeFrame, NativeSurface},
};

/// `MFX_INFINITE`, stored as the slice of standalone textures.
const MFX_STANDALONE_TEXTURE: usize = 0xFFFF_FFFF;

/// Leading part of `mfxFrameSurface1` up to `Data.MemId`.
#[repr(C)]
struct MfxFrameSurface1 {
    _reserved: [u32; 4],
    /// `mfxFrameInfo`, 68 bytes packed to 4.
    _info: [u32; 17],
    data: MfxFrameData,
}

#[repr(C)]
struct MfxFrameData {
    /// Extension buffers, pitch, time stamp, frame order and plane pointers.
    _header: [u64; 10],
    mem_id: *mut c_void,
}

/// `mfxHDLPair` libav stores behind `MemId`.
#[repr(C)]
struct MfxHdlPair {
    first: *mut c_void,
    second: *mut c_void,
}

/// Decoded or to-be-encoded frame living in device memory.
#[derive(Debug, Clone, Copy)]
pub struct HwFrame<'a>(pub &'a frame::Video);

impl NativeFrame for HwFrame<'_> {
    fn size(&self) -> FrameSize {
        FrameSize {
            width: self.0.width(),
            height: self.0.height(),
        }
    }

    fn surface(&self) -> Option<NativeSurface> {
        let frame = unsafe { &*self.0.as_ptr() };
        if frame.format == AVPixelFormat::AV_PIX_FMT_VAAPI as i32 {
            // data[3] holds the VASurfaceID.
            Some(NativeSurface::VaSurface(frame.data[3] as usize as u32))
        } else if frame.format == AVPixelFormat::AV_PIX_FMT_D3D11 as i32 {
            // data[0] is the texture, data[1] the array slice.
            let texture = RawHandle::from_ptr(frame.data[0]);
            Some(NativeSurface::D3d11Texture {
                texture,
                subresource: texture_slice(texture, frame.data[1] as usize as u32),
            })
        } else if frame.format == AVPixelFormat::AV_PIX_FMT_QSV as i32 {
            let base_type = BackendCatalog::detect().base_type(HwDeviceType::Qsv);
            unsafe { qsv_surface(frame.data[3] as *const MfxFrameSurface1, base_type) }
        } else {
            None
        }
    }
}

/// Resolves the base surface behind an `mfxFrameSurface1` allocated by libav.
///
/// # Safety
/// `surface` must be null or point to a surface of a libav QSV frames context
/// layered on `base_type`.
unsafe fn qsv_surface(
    surface: *const MfxFrameSurface1,
    base_type: HwDeviceType,
) -> Option<NativeSurface> {
    let pair = unsafe { surface.as_ref()?.data.mem_id as *const MfxHdlPair };
    let pair = unsafe { pair.as_ref()? };
    match base_type {
        HwDeviceType::Vaapi => {
            let surface_id = unsafe { (pair.first as *const u32).as_ref()? };
            Some(NativeSurface::VaSurface(*surface_id))
        }
        HwDeviceType::D3d11va => {
            if pair.first.is_null() {
                return None;
            }
            let texture = RawHandle::from_ptr(pair.first);
            let subresource = match pair.second as usize {
                MFX_STANDALONE_TEXTURE => None,
                index => texture_slice(texture, index as u32),
            };
            Some(NativeSurface::D3d11Texture {
                texture,
                subresource,
            })
        }
        _ => None,
    }
}

#[cfg(windows)]
fn texture_slice(texture: RawHandle, index: u32) -> Option<u32> {
    array_slice(crate::hwcontext::texture_array_size(texture), index)
}

#[cfg(not(windows))]
fn texture_slice(_texture: RawHandle, index: u32) -> Option<u32> {
    array_slice(None, index)
}

/// Single slice textures are addressed as standalone textures.
fn array_slice(array_size: Option<u32>, index: u32) -> Option<u32> {
    match array_size {
        Some(1) => None,
        _ => Some(index),
    }
}
