use std::fmt::Debug;

use crate::{
    catalog::{HwDeviceType, PixelFormat, Platform},
    compute::SharingKey,
    hwcontext::DeviceCapability,
};

/// Device indices at or above this value are treated as the platform default.
pub const MAX_DEVICE_INDEX: i32 = 100_000;

const VAAPI_RENDER_NODE_BASE: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Frames are surfaces owned by a display connection (VAAPI).
    DisplaySurface,
    /// Frames are slices of array textures (D3D11).
    ArrayTexture,
    /// Session created on top of another backend's device (QSV).
    SessionLayered,
}

/// Static description of one hardware backend.
pub trait Backend: Debug + Send + Sync {
    fn device_type(&self) -> HwDeviceType;

    fn kind(&self) -> BackendKind;

    /// Device type that is created natively before this backend can be used.
    fn base_type(&self, _platform: Platform) -> HwDeviceType {
        self.device_type()
    }

    /// Compute context property carrying this backend's native device.
    fn sharing_key(&self) -> Option<SharingKey> {
        None
    }

    fn device_path(&self, index: u32) -> String {
        index.to_string()
    }

    fn native_format(&self) -> PixelFormat;

    /// Capability the base device must expose before this backend is layered on it.
    fn required_base_capability(&self, _base_type: HwDeviceType) -> Option<DeviceCapability> {
        None
    }

    /// Whether codecs of this backend may advertise their native format without
    /// publishing a hardware configuration.
    fn native_format_without_config(&self) -> bool {
        false
    }
}

#[derive(Debug)]
pub struct VaapiBackend;

impl Backend for VaapiBackend {
    fn device_type(&self) -> HwDeviceType {
        HwDeviceType::Vaapi
    }

    fn kind(&self) -> BackendKind {
        BackendKind::DisplaySurface
    }

    fn sharing_key(&self) -> Option<SharingKey> {
        Some(SharingKey::VA_API_DISPLAY)
    }

    fn device_path(&self, index: u32) -> String {
        format!("/dev/dri/renderD{}", VAAPI_RENDER_NODE_BASE + index)
    }

    fn native_format(&self) -> PixelFormat {
        PixelFormat::Vaapi
    }
}

#[derive(Debug)]
pub struct D3d11Backend;

impl Backend for D3d11Backend {
    fn device_type(&self) -> HwDeviceType {
        HwDeviceType::D3d11va
    }

    fn kind(&self) -> BackendKind {
        BackendKind::ArrayTexture
    }

    fn sharing_key(&self) -> Option<SharingKey> {
        Some(SharingKey::D3D11_DEVICE)
    }

    fn native_format(&self) -> PixelFormat {
        PixelFormat::D3d11
    }
}

#[derive(Debug)]
pub struct QsvBackend;

impl Backend for QsvBackend {
    fn device_type(&self) -> HwDeviceType {
        HwDeviceType::Qsv
    }

    fn kind(&self) -> BackendKind {
        BackendKind::SessionLayered
    }

    fn base_type(&self, platform: Platform) -> HwDeviceType {
        match platform {
            Platform::Windows => HwDeviceType::D3d11va,
            Platform::Linux | Platform::Other => HwDeviceType::Vaapi,
        }
    }

    fn native_format(&self) -> PixelFormat {
        PixelFormat::Qsv
    }

    fn required_base_capability(&self, base_type: HwDeviceType) -> Option<DeviceCapability> {
        // Media SDK needs video processing on the VA display it runs on.
        match base_type {
            HwDeviceType::Vaapi => Some(DeviceCapability::VideoProc),
            _ => None,
        }
    }

    fn native_format_without_config(&self) -> bool {
        true
    }
}

static VAAPI: VaapiBackend = VaapiBackend;
static D3D11: D3d11Backend = D3d11Backend;
static QSV: QsvBackend = QsvBackend;

static BACKENDS: [&dyn Backend; 3] = [&VAAPI, &D3D11, &QSV];

/// Backends known to this crate, bound to the platform they are used on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCatalog {
    platform: Platform,
}

impl BackendCatalog {
    pub fn detect() -> Self {
        Self::for_platform(Platform::detect())
    }

    pub fn for_platform(platform: Platform) -> Self {
        Self { platform }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn backends(&self) -> impl Iterator<Item = &'static dyn Backend> {
        BACKENDS.into_iter()
    }

    pub fn backend(&self, device_type: HwDeviceType) -> Option<&'static dyn Backend> {
        self.backends()
            .find(|backend| backend.device_type() == device_type)
    }

    pub fn backend_for_sharing_key(&self, key: SharingKey) -> Option<&'static dyn Backend> {
        self.backends()
            .find(|backend| backend.sharing_key() == Some(key))
    }

    /// Device type that has to be created natively to get `device_type`.
    pub fn base_type(&self, device_type: HwDeviceType) -> HwDeviceType {
        self.backend(device_type)
            .map(|backend| backend.base_type(self.platform))
            .unwrap_or(device_type)
    }

    /// Order in which backends are tried when any acceleration is requested.
    pub fn any_order(&self) -> &'static [HwDeviceType] {
        match self.platform {
            Platform::Windows => &[HwDeviceType::D3d11va, HwDeviceType::Qsv],
            Platform::Linux | Platform::Other => &[HwDeviceType::Vaapi, HwDeviceType::Qsv],
        }
    }

    /// Device path for `index` on `device_type`, `None` selects the default device.
    pub fn device_path(&self, device_type: HwDeviceType, index: i32) -> Option<String> {
        if !(0..MAX_DEVICE_INDEX).contains(&index) {
            return None;
        }
        let index = index as u32;
        Some(
            self.backend(device_type)
                .map(|backend| backend.device_path(index))
                .unwrap_or_else(|| index.to_string()),
        )
    }
}
