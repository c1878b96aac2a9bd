//! `AVCodecContext::get_format` hook driving [`FormatNegotiator`].

use std::{
    ffi::c_void,
    ops::{Deref, DerefMut},
    ptr,
};

use ffmpeg_next::{
    Codec, codec,
    ffi::{self, AVCodecContext, AVPixelFormat},
};
use tracing::{debug, warn};
use vaccel_core::{
    BackendCatalog, DeviceContext, FormatNegotiator, FramesParams, FramesPool, HwCodecContext,
    HwFormatNegotiator, PixelFormat, codec::HwConfig,
};

use crate::{
    format::{av_pixel_format, pixel_format},
    hwcontext::{FfmpegDevice, FfmpegFrames, FfmpegHwContext},
};

struct HookState {
    device: Option<DeviceContext<FfmpegDevice>>,
    hw_configs: Vec<HwConfig>,
    pool: Option<FramesPool<FfmpegHwContext>>,
}

/// State reachable from the codec through `AVCodecContext::opaque`.
///
/// Must outlive the codec context it is installed on.
pub struct HwFormatHook {
    negotiator: HwFormatNegotiator<FfmpegHwContext>,
    state: HookState,
}

impl HwFormatHook {
    /// Attaches `device` to `ctx` and routes its pixel format selection
    /// through the hardware negotiator.
    pub fn install(
        ctx: &mut codec::Context,
        device: &DeviceContext<FfmpegDevice>,
        hw_configs: Vec<HwConfig>,
        catalog: BackendCatalog,
    ) -> Result<Box<Self>, ffmpeg_next::Error> {
        let mut hook = Box::new(Self {
            negotiator: HwFormatNegotiator::new(FfmpegHwContext, catalog),
            state: HookState {
                device: Some(device.clone()),
                hw_configs,
                pool: None,
            },
        });

        unsafe {
            let device_ref = ffi::av_buffer_ref(device.native().as_ptr());
            if device_ref.is_null() {
                return Err(ffmpeg_next::Error::Other {
                    errno: ffmpeg_next::error::ENOMEM,
                });
            }
            let ctx = ctx.as_mut_ptr();
            ffi::av_buffer_unref(&mut (*ctx).hw_device_ctx);
            (*ctx).hw_device_ctx = device_ref;
            (*ctx).opaque = &mut *hook as *mut HwFormatHook as *mut c_void;
            (*ctx).get_format = Some(get_format);
        }
        Ok(hook)
    }

    /// `None` once negotiation gave up on the device.
    pub fn device(&self) -> Option<&DeviceContext<FfmpegDevice>> {
        self.state.device.as_ref()
    }

    pub fn pool(&self) -> Option<&FramesPool<FfmpegHwContext>> {
        self.state.pool.as_ref()
    }

    pub fn pool_mut(&mut self) -> Option<&mut FramesPool<FfmpegHwContext>> {
        self.state.pool.as_mut()
    }
}

unsafe extern "C" fn get_format(
    ctx: *mut AVCodecContext,
    formats: *const AVPixelFormat,
) -> AVPixelFormat {
    let mut raw_formats = Vec::new();
    for index in 0.. {
        let format = unsafe { *formats.add(index) };
        if format == AVPixelFormat::AV_PIX_FMT_NONE {
            break;
        }
        raw_formats.push(format);
    }
    let candidates: Vec<PixelFormat> = raw_formats.iter().copied().map(pixel_format).collect();

    let hook = unsafe { ((*ctx).opaque as *mut HwFormatHook).as_mut() };
    let Some(HwFormatHook { negotiator, state }) = hook else {
        warn!("Codec context has no format hook installed.");
        return raw_formats
            .first()
            .copied()
            .unwrap_or(AVPixelFormat::AV_PIX_FMT_NONE);
    };

    let mut codec_ctx = FfmpegCodecContext { ctx, state };
    let chosen = negotiator.choose_format(&mut codec_ctx, &candidates);
    candidates
        .iter()
        .position(|format| *format == chosen)
        .map(|index| raw_formats[index])
        .unwrap_or(AVPixelFormat::AV_PIX_FMT_NONE)
}

struct FfmpegCodecContext<'a> {
    ctx: *mut AVCodecContext,
    state: &'a mut HookState,
}

impl HwCodecContext<FfmpegHwContext> for FfmpegCodecContext<'_> {
    fn device(&self) -> Option<&DeviceContext<FfmpegDevice>> {
        self.state.device.as_ref()
    }

    fn hw_configs(&self) -> &[HwConfig] {
        &self.state.hw_configs
    }

    fn dimensions(&self) -> (u32, u32) {
        let (width, height) = unsafe { ((*self.ctx).coded_width, (*self.ctx).coded_height) };
        (width.max(0) as u32, height.max(0) as u32)
    }

    fn frames_defaults(
        &self,
        device: &DeviceContext<FfmpegDevice>,
        format: PixelFormat,
    ) -> Option<FramesParams> {
        let av_format = av_pixel_format(format)?;
        let mut frames_ref = ptr::null_mut();
        let ret = unsafe {
            ffi::avcodec_get_hw_frames_parameters(
                self.ctx,
                device.native().as_ptr(),
                av_format,
                &mut frames_ref,
            )
        };
        if ret < 0 {
            debug!("Codec proposes no frame pool parameters for {format:?} (code {ret})");
            return None;
        }

        let mut frames =
            FfmpegFrames::from_codec_parameters(frames_ref, device.device_type()).ok()?;
        let mut params = frames.params();
        // Formats we can't express are left for the defaults.
        if matches!(params.format, PixelFormat::Other(_)) {
            params.format = PixelFormat::None;
        }
        if matches!(params.sw_format, PixelFormat::Other(_)) {
            params.sw_format = PixelFormat::None;
        }
        Some(params)
    }

    fn set_sw_format(&mut self, format: PixelFormat) {
        if let Some(format) = av_pixel_format(format) {
            unsafe { (*self.ctx).sw_pix_fmt = format };
        }
    }

    fn attach_frames(&mut self, pool: FramesPool<FfmpegHwContext>) {
        unsafe {
            ffi::av_buffer_unref(&mut (*self.ctx).hw_frames_ctx);
            (*self.ctx).hw_frames_ctx = ffi::av_buffer_ref(pool.frames().as_ptr());
        }
        self.state.pool = Some(pool);
    }

    fn detach_device(&mut self) {
        unsafe { ffi::av_buffer_unref(&mut (*self.ctx).hw_device_ctx) };
        self.state.device = None;
    }
}

/// Video decoder with an optional hardware device behind it.
pub struct HwDecoder {
    // Closed before the hook its `opaque` points at is freed.
    decoder: ffmpeg_next::decoder::Video,
    hook: Option<Box<HwFormatHook>>,
}

impl HwDecoder {
    /// Opens `codec` on `ctx`. Without a device the decoder runs in software.
    pub fn open(
        mut ctx: codec::Context,
        codec: Codec,
        device: Option<&DeviceContext<FfmpegDevice>>,
        hw_configs: Vec<HwConfig>,
        catalog: BackendCatalog,
    ) -> Result<Self, ffmpeg_next::Error> {
        let hook = device
            .map(|device| HwFormatHook::install(&mut ctx, device, hw_configs, catalog))
            .transpose()?;
        let decoder = ctx.decoder().open_as(codec)?.video()?;
        Ok(Self { decoder, hook })
    }

    pub fn device(&self) -> Option<&DeviceContext<FfmpegDevice>> {
        self.hook.as_ref().and_then(|hook| hook.device())
    }

    pub fn pool_mut(&mut self) -> Option<&mut FramesPool<FfmpegHwContext>> {
        self.hook.as_mut().and_then(|hook| hook.pool_mut())
    }

    pub fn is_hardware(&self) -> bool {
        self.device().is_some()
    }
}

impl Deref for HwDecoder {
    type Target = ffmpeg_next::decoder::Video;

    fn deref(&self) -> &Self::Target {
        &self.decoder
    }
}

impl DerefMut for HwDecoder {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.decoder
    }
}
