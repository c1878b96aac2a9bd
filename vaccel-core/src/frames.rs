use tracing::{debug, info};

use crate::{
    backend::{BackendCatalog, BackendKind},
    catalog::PixelFormat,
    device::DeviceContext,
    hwcontext::{BindFlags, HwContextApi, HwContextError, MiscFlags, NativeTexture, TextureDesc},
};

pub const DEFAULT_SW_FORMAT: PixelFormat = PixelFormat::Nv12;
pub const DEFAULT_POOL_SIZE: u32 = 32;

/// Parameters of a frame pool. `PixelFormat::None` and `0` mean "unset".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramesParams {
    pub format: PixelFormat,
    pub sw_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub initial_pool_size: u32,
    /// Only used by array texture backends.
    pub bind_flags: BindFlags,
}

impl Default for FramesParams {
    fn default() -> Self {
        Self {
            format: PixelFormat::None,
            sw_format: PixelFormat::None,
            width: 0,
            height: 0,
            initial_pool_size: 0,
            bind_flags: BindFlags::empty(),
        }
    }
}

impl FramesParams {
    fn fill_defaults(&mut self, format: PixelFormat) {
        if self.format == PixelFormat::None {
            self.format = format;
        }
        if self.sw_format == PixelFormat::None {
            self.sw_format = DEFAULT_SW_FORMAT;
        }
        if self.initial_pool_size == 0 {
            self.initial_pool_size = DEFAULT_POOL_SIZE;
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FramesError {
    #[error("Failed to allocate hardware frames context: {0}")]
    AllocationFailed(#[source] HwContextError),

    #[error("Failed to initialize hardware frames context: {0}")]
    InitFailed(#[source] HwContextError),

    #[error("Failed to derive hardware frames context: {0}")]
    DeriveFailed(#[source] HwContextError),
}

/// Initialized pool of GPU resident frames.
///
/// Pools are never resized. A stream with new dimensions needs a new pool.
pub struct FramesPool<A: HwContextApi> {
    // Released together with the frames it was created for.
    single_texture: Option<A::Texture>,
    frames: A::Frames,
    params: FramesParams,
    device: DeviceContext<A::Device>,
}

impl<A: HwContextApi> FramesPool<A> {
    pub fn frames(&self) -> &A::Frames {
        &self.frames
    }

    pub fn params(&self) -> &FramesParams {
        &self.params
    }

    pub fn device(&self) -> &DeviceContext<A::Device> {
        &self.device
    }

    /// Texture used to reach single slices of array textures from compute.
    pub fn single_texture(&self) -> Option<&A::Texture> {
        self.single_texture.as_ref()
    }
}

/// Allocates and initializes a frame pool of `width`x`height` frames in `hw_format`.
///
/// `defaults` are parameters proposed by the codec, unset fields are filled in.
/// Layered devices get their frames allocated on the base device and derived
/// afterwards.
pub fn create_frames<A: HwContextApi>(
    api: &A,
    catalog: &BackendCatalog,
    device: &DeviceContext<A::Device>,
    defaults: Option<FramesParams>,
    width: u32,
    height: u32,
    hw_format: PixelFormat,
) -> Result<FramesPool<A>, FramesError> {
    let alloc_device = match device.base() {
        Some(base) => base,
        None => device,
    };
    let layered = !alloc_device.ptr_eq(device);
    let alloc_format = if layered {
        catalog
            .backend(alloc_device.device_type())
            .map(|backend| backend.native_format())
            .unwrap_or(hw_format)
    } else {
        hw_format
    };

    let mut params = defaults.unwrap_or_default();
    params.width = width;
    params.height = height;

    let mut frames = api.alloc_frames(alloc_device.native()).map_err(|err| {
        info!("Failed to create HW frame context: {err}");
        FramesError::AllocationFailed(err)
    })?;
    if layered {
        // Codecs propose the layered format, the base device only allocates its own.
        params.format = alloc_format;
    }
    params.fill_defaults(alloc_format);

    let is_array_texture = catalog
        .backend(alloc_device.device_type())
        .is_some_and(|backend| backend.kind() == BackendKind::ArrayTexture);
    let single_texture = if is_array_texture {
        params.bind_flags |= BindFlags::DECODER | BindFlags::VIDEO_ENCODER;
        let desc = TextureDesc {
            width,
            height,
            format: params.sw_format,
            array_size: 1,
            bind_flags: params.bind_flags | BindFlags::SHADER_RESOURCE,
            misc_flags: MiscFlags::SHARED,
        };
        let texture = api
            .create_texture(alloc_device.native(), &desc)
            .map_err(|err| {
                info!("Failed to create single slice texture: {err}");
                FramesError::AllocationFailed(err)
            })?;
        debug!(texture = ?texture.raw(), "Allocated single slice texture.");
        Some(texture)
    } else {
        None
    };

    api.init_frames(&mut frames, &params).map_err(|err| {
        info!("Failed to initialize HW frame context: {err}");
        FramesError::InitFailed(err)
    })?;

    let frames = if layered {
        let derived = api
            .derive_frames(device.native(), &frames, hw_format)
            .map_err(|err| {
                info!("Failed to create derived HW frame context: {err}");
                FramesError::DeriveFailed(err)
            })?;
        params.format = hw_format;
        derived
    } else {
        frames
    };

    Ok(FramesPool {
        single_texture,
        frames,
        params,
        device: device.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::{HwDeviceType, Platform},
        test_utils::{FakeDevice, FakeHwContext},
    };

    fn device(api: &FakeHwContext, device_type: HwDeviceType) -> DeviceContext<FakeDevice> {
        DeviceContext::new(device_type, api.create_device(device_type, None).unwrap())
    }

    #[test]
    fn fills_defaults_when_unset() {
        let api = FakeHwContext::default().with_device(HwDeviceType::Vaapi, None);
        let catalog = BackendCatalog::for_platform(Platform::Linux);
        let device = device(&api, HwDeviceType::Vaapi);

        let pool = create_frames(&api, &catalog, &device, None, 1920, 1080, PixelFormat::Vaapi)
            .unwrap();

        assert_eq!(
            *pool.params(),
            FramesParams {
                format: PixelFormat::Vaapi,
                sw_format: PixelFormat::Nv12,
                width: 1920,
                height: 1080,
                initial_pool_size: 32,
                bind_flags: BindFlags::empty(),
            }
        );
        assert_eq!(api.initialized_frames(), vec![*pool.params()]);
        assert!(pool.single_texture().is_none());
    }

    #[test]
    fn keeps_codec_supplied_values() {
        let api = FakeHwContext::default().with_device(HwDeviceType::Vaapi, None);
        let catalog = BackendCatalog::for_platform(Platform::Linux);
        let device = device(&api, HwDeviceType::Vaapi);
        let defaults = FramesParams {
            sw_format: PixelFormat::P010,
            initial_pool_size: 20,
            width: 16,
            height: 16,
            ..Default::default()
        };

        let pool = create_frames(
            &api,
            &catalog,
            &device,
            Some(defaults),
            1280,
            720,
            PixelFormat::Vaapi,
        )
        .unwrap();

        assert_eq!(pool.params().sw_format, PixelFormat::P010);
        assert_eq!(pool.params().initial_pool_size, 20);
        assert_eq!((pool.params().width, pool.params().height), (1280, 720));
        assert_eq!(pool.params().format, PixelFormat::Vaapi);
    }

    #[test]
    fn array_texture_backend_gets_single_slice_texture() {
        let api = FakeHwContext::default().with_device(HwDeviceType::D3d11va, None);
        let catalog = BackendCatalog::for_platform(Platform::Windows);
        let device = device(&api, HwDeviceType::D3d11va);

        let pool = create_frames(&api, &catalog, &device, None, 640, 480, PixelFormat::D3d11)
            .unwrap();

        let texture = pool.single_texture().unwrap();
        assert_eq!(
            texture.desc,
            TextureDesc {
                width: 640,
                height: 480,
                format: PixelFormat::Nv12,
                array_size: 1,
                bind_flags: BindFlags::DECODER
                    | BindFlags::VIDEO_ENCODER
                    | BindFlags::SHADER_RESOURCE,
                misc_flags: MiscFlags::SHARED,
            }
        );
        assert_eq!(
            pool.params().bind_flags,
            BindFlags::DECODER | BindFlags::VIDEO_ENCODER
        );

        drop(pool);
        assert_eq!(api.released_textures(), 1);
    }

    #[test]
    fn allocation_failure() {
        let api = FakeHwContext::default()
            .with_device(HwDeviceType::Vaapi, None)
            .fail_frames_alloc();
        let catalog = BackendCatalog::for_platform(Platform::Linux);
        let device = device(&api, HwDeviceType::Vaapi);

        let result = create_frames(&api, &catalog, &device, None, 64, 64, PixelFormat::Vaapi);

        assert!(matches!(result, Err(FramesError::AllocationFailed(_))));
    }

    #[test]
    fn init_failure_releases_single_slice_texture() {
        let api = FakeHwContext::default()
            .with_device(HwDeviceType::D3d11va, None)
            .fail_frames_init();
        let catalog = BackendCatalog::for_platform(Platform::Windows);
        let device = device(&api, HwDeviceType::D3d11va);

        let result = create_frames(&api, &catalog, &device, None, 64, 64, PixelFormat::D3d11);

        assert!(matches!(result, Err(FramesError::InitFailed(_))));
        assert_eq!(api.created_textures(), 1);
        assert_eq!(api.released_textures(), 1);
    }

    #[test]
    fn layered_device_allocates_on_base_and_derives() {
        let api = FakeHwContext::default().with_device(HwDeviceType::Vaapi, None);
        let catalog = BackendCatalog::for_platform(Platform::Linux);
        let base = device(&api, HwDeviceType::Vaapi);
        let native = api.derive_device(HwDeviceType::Qsv, base.native()).unwrap();
        let qsv = DeviceContext::derived(HwDeviceType::Qsv, native, base);

        let pool = create_frames(&api, &catalog, &qsv, None, 1920, 1088, PixelFormat::Qsv)
            .unwrap();

        assert_eq!(api.initialized_frames()[0].format, PixelFormat::Vaapi);
        assert_eq!(pool.frames().device_type, HwDeviceType::Qsv);
        assert_eq!(pool.frames().derived_format, Some(PixelFormat::Qsv));
        assert_eq!(pool.params().format, PixelFormat::Qsv);
        assert!(pool.device().ptr_eq(&qsv));
    }

    #[test]
    fn layered_device_overrides_codec_format_on_base() {
        let api = FakeHwContext::default().with_device(HwDeviceType::Vaapi, None);
        let catalog = BackendCatalog::for_platform(Platform::Linux);
        let base = device(&api, HwDeviceType::Vaapi);
        let native = api.derive_device(HwDeviceType::Qsv, base.native()).unwrap();
        let qsv = DeviceContext::derived(HwDeviceType::Qsv, native, base);
        let defaults = FramesParams {
            format: PixelFormat::Qsv,
            sw_format: PixelFormat::P010,
            ..Default::default()
        };

        let pool = create_frames(
            &api,
            &catalog,
            &qsv,
            Some(defaults),
            1920,
            1088,
            PixelFormat::Qsv,
        )
        .unwrap();

        let initialized = &api.initialized_frames()[0];
        assert_eq!(initialized.format, PixelFormat::Vaapi);
        assert_eq!(initialized.sw_format, PixelFormat::P010);
        assert_eq!(pool.params().format, PixelFormat::Qsv);
    }
}
