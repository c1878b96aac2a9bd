use std::{
    ffi::{CString, c_int},
    fmt,
    ptr::{self, NonNull},
};

use ffmpeg_next::ffi::{self, AVBufferRef, AVHWDeviceContext, AVHWFramesContext, AVPixelFormat};
use tracing::debug;
use vaccel_core::{
    FramesParams, HwContextApi, HwContextError, HwDeviceType, PixelFormat,
    hwcontext::{
        BindFlags, DeviceCapability, NativeDevice, NativeHandle, NativeTexture, RawHandle,
        TextureDesc,
    },
};

use crate::format::{av_device_type, av_pixel_format, pixel_format};

#[cfg(windows)]
mod d3d11;
#[cfg(windows)]
pub(crate) use d3d11::texture_array_size;
#[cfg(target_os = "linux")]
mod va;

/// Leading fields of the backend specific `hwctx` structs of libav. Only these
/// prefixes are read or written.
mod layout {
    use std::ffi::c_void;

    /// `AVVAAPIDeviceContext`
    #[repr(C)]
    pub struct VaapiDevice {
        pub display: *mut c_void,
    }

    /// `AVD3D11VADeviceContext`
    #[repr(C)]
    pub struct D3d11vaDevice {
        pub device: *mut c_void,
        pub device_context: *mut c_void,
    }

    /// `AVQSVDeviceContext`
    #[repr(C)]
    pub struct QsvDevice {
        pub session: *mut c_void,
    }

    /// `AVD3D11VAFramesContext`
    #[repr(C)]
    pub struct D3d11vaFrames {
        pub texture: *mut c_void,
        pub bind_flags: u32,
        pub misc_flags: u32,
    }
}

fn check(operation: &'static str, code: c_int) -> Result<(), HwContextError> {
    if code < 0 {
        return Err(HwContextError::Native { operation, code });
    }
    Ok(())
}

fn supported(device_type: HwDeviceType) -> Result<HwDeviceType, HwContextError> {
    match device_type {
        HwDeviceType::None => Err(HwContextError::UnsupportedDeviceType(device_type)),
        supported => Ok(supported),
    }
}

/// Reference to an `AVHWDeviceContext` buffer.
pub struct FfmpegDevice {
    ptr: NonNull<AVBufferRef>,
    device_type: HwDeviceType,
}

impl FfmpegDevice {
    fn from_raw(
        ptr: *mut AVBufferRef,
        device_type: HwDeviceType,
        operation: &'static str,
    ) -> Result<Self, HwContextError> {
        NonNull::new(ptr)
            .map(|ptr| Self { ptr, device_type })
            .ok_or(HwContextError::NullContext { operation })
    }

    pub fn as_ptr(&self) -> *mut AVBufferRef {
        self.ptr.as_ptr()
    }

    pub fn device_type(&self) -> HwDeviceType {
        self.device_type
    }

    fn hwctx<T>(&self) -> *mut T {
        unsafe {
            let device = (*self.ptr.as_ptr()).data as *mut AVHWDeviceContext;
            (*device).hwctx as *mut T
        }
    }
}

impl Drop for FfmpegDevice {
    fn drop(&mut self) {
        let mut ptr = self.ptr.as_ptr();
        unsafe { ffi::av_buffer_unref(&mut ptr) };
    }
}

impl fmt::Debug for FfmpegDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FfmpegDevice")
            .field("device_type", &self.device_type)
            .field("handle", &self.handle())
            .finish()
    }
}

impl NativeDevice for FfmpegDevice {
    fn handle(&self) -> NativeHandle {
        unsafe {
            match self.device_type {
                HwDeviceType::Vaapi => {
                    let hwctx = self.hwctx::<layout::VaapiDevice>();
                    NativeHandle::VaDisplay(RawHandle::from_ptr((*hwctx).display))
                }
                HwDeviceType::D3d11va => {
                    let hwctx = self.hwctx::<layout::D3d11vaDevice>();
                    NativeHandle::D3d11 {
                        device: RawHandle::from_ptr((*hwctx).device),
                        context: RawHandle::from_ptr((*hwctx).device_context),
                    }
                }
                HwDeviceType::Qsv | HwDeviceType::None => {
                    let hwctx = self.hwctx::<layout::QsvDevice>();
                    NativeHandle::MfxSession(RawHandle::from_ptr((*hwctx).session))
                }
            }
        }
    }

    fn description(&self) -> Option<String> {
        match self.handle() {
            #[cfg(target_os = "linux")]
            NativeHandle::VaDisplay(display) => va::vendor_string(display),
            #[cfg(windows)]
            NativeHandle::D3d11 { device, .. } => d3d11::adapter_description(device),
            _ => None,
        }
    }

    fn has_capability(&self, capability: DeviceCapability) -> bool {
        match (capability, self.handle()) {
            #[cfg(target_os = "linux")]
            (DeviceCapability::VideoProc, NativeHandle::VaDisplay(display)) => {
                va::supports_video_proc(display)
            }
            _ => false,
        }
    }
}

/// Reference to an `AVHWFramesContext` buffer.
pub struct FfmpegFrames {
    ptr: NonNull<AVBufferRef>,
    device_type: HwDeviceType,
}

impl FfmpegFrames {
    fn from_raw(
        ptr: *mut AVBufferRef,
        device_type: HwDeviceType,
        operation: &'static str,
    ) -> Result<Self, HwContextError> {
        NonNull::new(ptr)
            .map(|ptr| Self { ptr, device_type })
            .ok_or(HwContextError::NullContext { operation })
    }

    pub fn as_ptr(&self) -> *mut AVBufferRef {
        self.ptr.as_ptr()
    }

    /// Reads the parameters of an initialized or codec proposed frames context.
    pub(crate) fn params(&mut self) -> FramesParams {
        let device_type = self.device_type;
        let ctx = self.frames_context();
        let mut params = FramesParams {
            format: pixel_format(ctx.format),
            sw_format: pixel_format(ctx.sw_format),
            width: ctx.width.max(0) as u32,
            height: ctx.height.max(0) as u32,
            initial_pool_size: ctx.initial_pool_size.max(0) as u32,
            ..Default::default()
        };
        if device_type == HwDeviceType::D3d11va {
            let bind_flags = unsafe { (*(ctx.hwctx as *const layout::D3d11vaFrames)).bind_flags };
            params.bind_flags = BindFlags::from_bits(bind_flags);
        }
        params
    }

    pub(crate) fn from_codec_parameters(
        ptr: *mut AVBufferRef,
        device_type: HwDeviceType,
    ) -> Result<Self, HwContextError> {
        Self::from_raw(ptr, device_type, "avcodec_get_hw_frames_parameters")
    }

    fn frames_context(&mut self) -> &mut AVHWFramesContext {
        unsafe { &mut *((*self.ptr.as_ptr()).data as *mut AVHWFramesContext) }
    }
}

impl Drop for FfmpegFrames {
    fn drop(&mut self) {
        let mut ptr = self.ptr.as_ptr();
        unsafe { ffi::av_buffer_unref(&mut ptr) };
    }
}

#[cfg(windows)]
pub use d3d11::D3d11Texture as FfmpegTexture;

/// Textures only exist on D3D11.
#[cfg(not(windows))]
#[derive(Debug)]
pub enum FfmpegTexture {}

#[cfg(not(windows))]
impl NativeTexture for FfmpegTexture {
    fn raw(&self) -> RawHandle {
        match *self {}
    }
}

/// libav hwcontext runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegHwContext;

impl HwContextApi for FfmpegHwContext {
    type Device = FfmpegDevice;
    type Frames = FfmpegFrames;
    type Texture = FfmpegTexture;

    fn create_device(
        &self,
        device_type: HwDeviceType,
        path: Option<&str>,
    ) -> Result<FfmpegDevice, HwContextError> {
        let device_type = supported(device_type)?;
        let path = path
            .map(CString::new)
            .transpose()
            .map_err(|_| HwContextError::Native {
                operation: "av_hwdevice_ctx_create",
                code: -ffmpeg_next::error::EINVAL,
            })?;

        let mut ptr = ptr::null_mut();
        let ret = unsafe {
            ffi::av_hwdevice_ctx_create(
                &mut ptr,
                av_device_type(device_type),
                path.as_ref().map_or(ptr::null(), |path| path.as_ptr()),
                ptr::null_mut(),
                0,
            )
        };
        check("av_hwdevice_ctx_create", ret)?;
        FfmpegDevice::from_raw(ptr, device_type, "av_hwdevice_ctx_create")
    }

    fn wrap_device(
        &self,
        device_type: HwDeviceType,
        handle: RawHandle,
    ) -> Result<FfmpegDevice, HwContextError> {
        let ptr = unsafe { ffi::av_hwdevice_ctx_alloc(av_device_type(device_type)) };
        let device = FfmpegDevice::from_raw(ptr, device_type, "av_hwdevice_ctx_alloc")?;

        match device_type {
            HwDeviceType::Vaapi => unsafe {
                (*device.hwctx::<layout::VaapiDevice>()).display = handle.as_ptr();
            },
            #[cfg(windows)]
            HwDeviceType::D3d11va => unsafe {
                // libav releases the device when the context is freed.
                (*device.hwctx::<layout::D3d11vaDevice>()).device = d3d11::add_ref(handle)?;
            },
            other => return Err(HwContextError::UnsupportedDeviceType(other)),
        }

        check("av_hwdevice_ctx_init", unsafe {
            ffi::av_hwdevice_ctx_init(device.as_ptr())
        })?;
        debug!(%device_type, ?handle, "Wrapped native device.");
        Ok(device)
    }

    fn derive_device(
        &self,
        device_type: HwDeviceType,
        base: &FfmpegDevice,
    ) -> Result<FfmpegDevice, HwContextError> {
        let device_type = supported(device_type)?;
        let mut ptr = ptr::null_mut();
        let ret = unsafe {
            ffi::av_hwdevice_ctx_create_derived(
                &mut ptr,
                av_device_type(device_type),
                base.as_ptr(),
                0,
            )
        };
        check("av_hwdevice_ctx_create_derived", ret)?;
        FfmpegDevice::from_raw(ptr, device_type, "av_hwdevice_ctx_create_derived")
    }

    fn alloc_frames(&self, device: &FfmpegDevice) -> Result<FfmpegFrames, HwContextError> {
        let ptr = unsafe { ffi::av_hwframe_ctx_alloc(device.as_ptr()) };
        FfmpegFrames::from_raw(ptr, device.device_type, "av_hwframe_ctx_alloc")
    }

    fn init_frames(
        &self,
        frames: &mut FfmpegFrames,
        params: &FramesParams,
    ) -> Result<(), HwContextError> {
        let device_type = frames.device_type;
        let ctx = frames.frames_context();
        ctx.format = av_pixel_format(params.format).unwrap_or(AVPixelFormat::AV_PIX_FMT_NONE);
        ctx.sw_format =
            av_pixel_format(params.sw_format).unwrap_or(AVPixelFormat::AV_PIX_FMT_NONE);
        ctx.width = params.width as c_int;
        ctx.height = params.height as c_int;
        ctx.initial_pool_size = params.initial_pool_size as c_int;
        if device_type == HwDeviceType::D3d11va {
            unsafe {
                let hwctx = ctx.hwctx as *mut layout::D3d11vaFrames;
                (*hwctx).bind_flags |= params.bind_flags.bits();
            }
        }

        check("av_hwframe_ctx_init", unsafe {
            ffi::av_hwframe_ctx_init(frames.as_ptr())
        })
    }

    fn derive_frames(
        &self,
        device: &FfmpegDevice,
        base: &FfmpegFrames,
        format: PixelFormat,
    ) -> Result<FfmpegFrames, HwContextError> {
        let format = av_pixel_format(format).unwrap_or(AVPixelFormat::AV_PIX_FMT_NONE);
        let mut ptr = ptr::null_mut();
        let ret = unsafe {
            ffi::av_hwframe_ctx_create_derived(
                &mut ptr,
                format,
                device.as_ptr(),
                base.as_ptr(),
                0,
            )
        };
        check("av_hwframe_ctx_create_derived", ret)?;
        FfmpegFrames::from_raw(ptr, device.device_type, "av_hwframe_ctx_create_derived")
    }

    #[cfg(windows)]
    fn create_texture(
        &self,
        device: &FfmpegDevice,
        desc: &TextureDesc,
    ) -> Result<FfmpegTexture, HwContextError> {
        match device.handle() {
            NativeHandle::D3d11 { device, .. } => d3d11::create_texture(device, desc),
            _ => Err(HwContextError::UnsupportedDeviceType(device.device_type)),
        }
    }

    #[cfg(not(windows))]
    fn create_texture(
        &self,
        _device: &FfmpegDevice,
        _desc: &TextureDesc,
    ) -> Result<FfmpegTexture, HwContextError> {
        Err(HwContextError::Unsupported("D3D11 textures"))
    }

    #[cfg(windows)]
    fn copy_subresource(
        &self,
        device: &FfmpegDevice,
        dst: RawHandle,
        dst_subresource: u32,
        src: RawHandle,
        src_subresource: u32,
    ) -> Result<(), HwContextError> {
        match device.handle() {
            NativeHandle::D3d11 { context, .. } => {
                d3d11::copy_subresource(context, dst, dst_subresource, src, src_subresource)
            }
            _ => Err(HwContextError::UnsupportedDeviceType(device.device_type)),
        }
    }

    #[cfg(not(windows))]
    fn copy_subresource(
        &self,
        _device: &FfmpegDevice,
        _dst: RawHandle,
        _dst_subresource: u32,
        _src: RawHandle,
        _src_subresource: u32,
    ) -> Result<(), HwContextError> {
        Err(HwContextError::Unsupported("D3D11 sub-resource copies"))
    }
}
