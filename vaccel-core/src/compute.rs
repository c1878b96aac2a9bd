//! GPU compute context used for zero-copy color conversion of decoded surfaces.

use tracing::{debug, info};

use crate::{
    backend::BackendCatalog,
    catalog::HwDeviceType,
    device::DeviceContext,
    hwcontext::{NativeDevice, RawHandle},
};

/// Key of a compute context creation property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SharingKey(isize);

impl SharingKey {
    /// `CL_CONTEXT_VA_API_DISPLAY_INTEL`
    pub const VA_API_DISPLAY: SharingKey = SharingKey(0x4097);
    /// `CL_CONTEXT_D3D11_DEVICE_KHR`
    pub const D3D11_DEVICE: SharingKey = SharingKey(0x401D);

    pub const fn new(raw: isize) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> isize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextProperty {
    pub key: SharingKey,
    pub value: RawHandle,
}

impl ContextProperty {
    /// Parses a zero terminated `key, value, key, value, ..., 0` list.
    pub fn parse_list(raw: &[isize]) -> Vec<ContextProperty> {
        raw.chunks_exact(2)
            .take_while(|pair| pair[0] != 0)
            .map(|pair| ContextProperty {
                key: SharingKey(pair[0]),
                value: RawHandle::new(pair[1] as usize),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    #[error("Compute context is already bound to a device.")]
    AlreadyBound,

    #[error("No compute runtime is available.")]
    Unavailable,

    #[error("Compute runtime cannot share devices through property {0:?}.")]
    UnsupportedSharing(SharingKey),

    #[error("Compute runtime call failed: {0}")]
    Runtime(String),
}

/// Compute runtime able to share memory with media devices.
pub trait ComputeApi {
    /// Compute accessible image that frames are converted into or from.
    type Image;

    fn is_available(&self) -> bool;

    /// Creates a compute context sharing the device described by `sharing`.
    /// Returns the compute device name.
    fn create_context(&self, sharing: ContextProperty) -> Result<String, ComputeError>;

    fn convert_from_va_surface(
        &self,
        display: RawHandle,
        surface: u32,
        size: FrameSize,
        dst: &mut Self::Image,
    ) -> Result<(), ComputeError>;

    fn convert_to_va_surface(
        &self,
        display: RawHandle,
        src: &Self::Image,
        surface: u32,
        size: FrameSize,
    ) -> Result<(), ComputeError>;

    fn convert_from_d3d11_texture(
        &self,
        texture: RawHandle,
        dst: &mut Self::Image,
    ) -> Result<(), ComputeError>;

    fn convert_to_d3d11_texture(
        &self,
        src: &Self::Image,
        texture: RawHandle,
    ) -> Result<(), ComputeError>;
}

/// Compute runtime for builds without GPU compute support.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompute;

impl ComputeApi for NoCompute {
    type Image = ();

    fn is_available(&self) -> bool {
        false
    }

    fn create_context(&self, _sharing: ContextProperty) -> Result<String, ComputeError> {
        Err(ComputeError::Unavailable)
    }

    fn convert_from_va_surface(
        &self,
        _display: RawHandle,
        _surface: u32,
        _size: FrameSize,
        _dst: &mut (),
    ) -> Result<(), ComputeError> {
        Err(ComputeError::Unavailable)
    }

    fn convert_to_va_surface(
        &self,
        _display: RawHandle,
        _src: &(),
        _surface: u32,
        _size: FrameSize,
    ) -> Result<(), ComputeError> {
        Err(ComputeError::Unavailable)
    }

    fn convert_from_d3d11_texture(
        &self,
        _texture: RawHandle,
        _dst: &mut (),
    ) -> Result<(), ComputeError> {
        Err(ComputeError::Unavailable)
    }

    fn convert_to_d3d11_texture(&self, _src: &(), _texture: RawHandle) -> Result<(), ComputeError> {
        Err(ComputeError::Unavailable)
    }
}

#[derive(Debug)]
struct BoundContext {
    properties: Vec<ContextProperty>,
    device_name: Option<String>,
}

/// Process wide compute context state.
///
/// Created empty, bound at most once and only emptied again by an explicit
/// [`ComputeContext::reset`]. A bound context is never rebound to another device.
#[derive(Debug)]
pub struct ComputeContext<C> {
    api: C,
    bound: Option<BoundContext>,
}

impl<C: ComputeApi> ComputeContext<C> {
    pub fn new(api: C) -> Self {
        Self { api, bound: None }
    }

    /// Adopts a compute context created outside of this crate.
    pub fn with_properties(api: C, properties: Vec<ContextProperty>) -> Self {
        Self {
            api,
            bound: Some(BoundContext {
                properties,
                device_name: None,
            }),
        }
    }

    pub fn api(&self) -> &C {
        &self.api
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_none()
    }

    pub fn properties(&self) -> &[ContextProperty] {
        self.bound
            .as_ref()
            .map(|bound| bound.properties.as_slice())
            .unwrap_or_default()
    }

    pub fn property(&self, key: SharingKey) -> Option<RawHandle> {
        self.properties()
            .iter()
            .find(|property| property.key == key)
            .map(|property| property.value)
    }

    pub fn device_name(&self) -> Option<&str> {
        self.bound.as_ref()?.device_name.as_deref()
    }

    pub fn bind(&mut self, sharing: ContextProperty) -> Result<(), ComputeError> {
        if self.bound.is_some() {
            return Err(ComputeError::AlreadyBound);
        }
        if !self.api.is_available() {
            return Err(ComputeError::Unavailable);
        }
        let device_name = self.api.create_context(sharing)?;
        self.bound = Some(BoundContext {
            properties: vec![sharing],
            device_name: Some(device_name),
        });
        Ok(())
    }

    pub fn reset(&mut self) {
        self.bound = None;
    }
}

/// Native device a compute context was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbedDevice {
    pub device_type: HwDeviceType,
    pub handle: RawHandle,
}

/// Returns the first media device shared with `compute`, if any.
pub fn probe<C: ComputeApi>(
    compute: &ComputeContext<C>,
    catalog: &BackendCatalog,
) -> Option<ProbedDevice> {
    compute.properties().iter().find_map(|property| {
        let backend = catalog.backend_for_sharing_key(property.key)?;
        if property.value.is_null() {
            return None;
        }
        Some(ProbedDevice {
            device_type: backend.device_type(),
            handle: property.value,
        })
    })
}

/// Binds an empty compute context to the media device behind `device`.
///
/// Best effort: failures are logged and otherwise ignored.
pub fn bind_device<C: ComputeApi, D: NativeDevice>(
    compute: &mut ComputeContext<C>,
    catalog: &BackendCatalog,
    device: &DeviceContext<D>,
) {
    let Some((device_type, handle)) = device.media_handle() else {
        debug!(device_type = %device.device_type(), "Device has no handle shareable with compute.");
        return;
    };
    let Some(key) = catalog
        .backend(device_type)
        .and_then(|backend| backend.sharing_key())
    else {
        return;
    };

    let label = device_type.label();
    match compute.bind(ContextProperty { key, value: handle }) {
        Ok(()) => info!(
            "Created compute context with {label} video acceleration on device: {}",
            compute.device_name().unwrap_or("unknown")
        ),
        Err(err) => info!("Failed to create compute context with {label} video acceleration: {err}"),
    }
}

/// Backend through which `device` shares memory with `compute`, or `None` when
/// the compute context is bound to a different native device.
pub fn shared_device_type<C: ComputeApi, D: NativeDevice>(
    compute: &ComputeContext<C>,
    catalog: &BackendCatalog,
    device: &DeviceContext<D>,
) -> Option<HwDeviceType> {
    let (device_type, handle) = device.media_handle()?;
    let key = catalog.backend(device_type)?.sharing_key()?;
    match compute.property(key) {
        Some(bound) if bound == handle && !handle.is_null() => Some(device_type),
        _ => None,
    }
}
