use std::{fmt, sync::Arc};

use tracing::{info, warn};

use crate::{
    backend::{BackendCatalog, MAX_DEVICE_INDEX},
    catalog::{HwDeviceType, VideoAcceleration},
    compute::{self, ComputeApi, ComputeContext},
    hwcontext::{HwContextApi, HwContextError, NativeDevice, RawHandle},
};

pub use validator::validate;

mod validator;


/// Shared handle to a native device.
///
/// A derived context keeps its base alive. The derived native object is always
/// released before the base reference is dropped.
pub struct DeviceContext<D> {
    inner: Arc<DeviceContextInner<D>>,
}

struct DeviceContextInner<D> {
    // Drop order follows declaration order, `native` has to go first.
    native: D,
    device_type: HwDeviceType,
    base: Option<DeviceContext<D>>,
}

impl<D> Clone for DeviceContext<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D: NativeDevice> DeviceContext<D> {
    pub fn new(device_type: HwDeviceType, native: D) -> Self {
        Self {
            inner: Arc::new(DeviceContextInner {
                native,
                device_type,
                base: None,
            }),
        }
    }

    pub fn derived(device_type: HwDeviceType, native: D, base: DeviceContext<D>) -> Self {
        Self {
            inner: Arc::new(DeviceContextInner {
                native,
                device_type,
                base: Some(base),
            }),
        }
    }

    pub fn device_type(&self) -> HwDeviceType {
        self.inner.device_type
    }

    pub fn native(&self) -> &D {
        &self.inner.native
    }

    pub fn base(&self) -> Option<&DeviceContext<D>> {
        self.inner.base.as_ref()
    }

    /// Innermost context, the one owning the shareable media device.
    pub fn media_context(&self) -> &DeviceContext<D> {
        match &self.inner.base {
            Some(base) => base.media_context(),
            None => self,
        }
    }

    pub fn media_handle(&self) -> Option<(HwDeviceType, RawHandle)> {
        self.media_context().native().handle().media_handle()
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<D: NativeDevice> fmt::Debug for DeviceContext<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext")
            .field("device_type", &self.device_type())
            .field("handle", &self.native().handle())
            .field("base", &self.base())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceIndex {
    Default,
    Index(u32),
    /// Device was taken over from the compute context.
    FromExistent,
}

impl DeviceIndex {
    /// Indices outside `0..MAX_DEVICE_INDEX` open the default device.
    pub fn from_requested(index: i32) -> Self {
        if (0..MAX_DEVICE_INDEX).contains(&index) {
            DeviceIndex::Index(index as u32)
        } else {
            DeviceIndex::Default
        }
    }

    /// Value reported through integer based video I/O properties.
    pub fn as_raw(self) -> i32 {
        match self {
            DeviceIndex::Default => -1,
            DeviceIndex::FromExistent => -2,
            DeviceIndex::Index(index) => index as i32,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceRequest<'a> {
    pub acceleration: VideoAcceleration,
    /// Negative value selects the platform default device.
    pub device_index: i32,
    /// Substring the device description has to contain, empty for any device.
    pub name_filter: &'a str,
    /// Bind the compute context to the new device if it is still empty.
    pub use_compute: bool,
}

impl DeviceRequest<'_> {
    pub fn new(acceleration: VideoAcceleration) -> Self {
        Self {
            acceleration,
            device_index: -1,
            name_filter: "",
            use_compute: false,
        }
    }
}

#[derive(Debug)]
pub struct NegotiatedDevice<D: NativeDevice> {
    pub device_type: HwDeviceType,
    pub device_index: DeviceIndex,
    pub context: DeviceContext<D>,
}

impl<D: NativeDevice> NegotiatedDevice<D> {
    pub fn acceleration(&self) -> VideoAcceleration {
        self.device_type.acceleration()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Hardware acceleration was not requested.")]
    NotRequested,

    #[error("Failed to create {device_type} device: {source}")]
    CreationFailed {
        device_type: HwDeviceType,
        #[source]
        source: HwContextError,
    },

    #[error("{0} device was rejected during validation.")]
    ValidationRejected(HwDeviceType),

    #[error("Failed to derive {device_type} device: {source}")]
    DeriveFailed {
        device_type: HwDeviceType,
        #[source]
        source: HwContextError,
    },
}

/// Creates a device for `request`. Tries every platform backend in order when
/// any acceleration is requested.
pub fn create_device<A: HwContextApi, C: ComputeApi>(
    api: &A,
    compute: &mut ComputeContext<C>,
    catalog: &BackendCatalog,
    request: &DeviceRequest,
) -> Result<NegotiatedDevice<A::Device>, DeviceError> {
    match request.acceleration {
        VideoAcceleration::None => Err(DeviceError::NotRequested),
        VideoAcceleration::Any => {
            let mut last_err = DeviceError::NotRequested;
            for &device_type in catalog.any_order() {
                match create_device_of_type(api, compute, catalog, device_type, request) {
                    Ok(device) => return Ok(device),
                    Err(err) => last_err = err,
                }
            }
            Err(last_err)
        }
        acceleration => {
            create_device_of_type(api, compute, catalog, acceleration.device_type(), request)
        }
    }
}

/// Creates a device of exactly `device_type`, ignoring `request.acceleration`.
pub fn create_device_of_type<A: HwContextApi, C: ComputeApi>(
    api: &A,
    compute: &mut ComputeContext<C>,
    catalog: &BackendCatalog,
    device_type: HwDeviceType,
    request: &DeviceRequest,
) -> Result<NegotiatedDevice<A::Device>, DeviceError> {
    if device_type == HwDeviceType::None {
        return Err(DeviceError::NotRequested);
    }
    let base_type = catalog.base_type(device_type);

    if let Some(result) = from_existent(api, compute, catalog, device_type, base_type, request) {
        return result;
    }

    let path = catalog.device_path(base_type, request.device_index);
    let path_label = path.as_deref().unwrap_or("'default'");
    let native = api
        .create_device(base_type, path.as_deref())
        .map_err(|source| {
            info!("Failed to create {base_type} video acceleration on device {path_label}: {source}");
            DeviceError::CreationFailed {
                device_type: base_type,
                source,
            }
        })?;
    let base = DeviceContext::new(base_type, native);

    if !validate(&base, device_type, request.name_filter, catalog) {
        return Err(DeviceError::ValidationRejected(device_type));
    }
    info!("Created {base_type} video acceleration context on device {path_label}");

    let context = if device_type != base_type {
        derive(api, device_type, base)?
    } else {
        base
    };

    if compute.is_empty() {
        if request.use_compute && compute.api().is_available() {
            compute::bind_device(compute, catalog, &context);
        }
    } else if compute::shared_device_type(compute, catalog, &context).is_none() {
        info!(
            "Can't bind {} video acceleration context to already created compute context",
            device_type.label()
        );
    }

    Ok(NegotiatedDevice {
        device_type,
        device_index: DeviceIndex::from_requested(request.device_index),
        context,
    })
}

/// Wraps the device the compute context was created with, if it can back `device_type`.
fn from_existent<A: HwContextApi, C: ComputeApi>(
    api: &A,
    compute: &ComputeContext<C>,
    catalog: &BackendCatalog,
    device_type: HwDeviceType,
    base_type: HwDeviceType,
    request: &DeviceRequest,
) -> Option<Result<NegotiatedDevice<A::Device>, DeviceError>> {
    let probed = compute::probe(compute, catalog)?;
    if probed.device_type != device_type && probed.device_type != base_type {
        return None;
    }
    if request.device_index >= 0 {
        warn!(
            device_index = request.device_index,
            "Ignoring device index, device context is already attached to the compute context."
        );
    }

    let result = api
        .wrap_device(probed.device_type, probed.handle)
        .map_err(|source| {
            info!(
                "Failed to wrap {} device of the compute context: {source}",
                probed.device_type
            );
            DeviceError::CreationFailed {
                device_type: probed.device_type,
                source,
            }
        })
        .and_then(|native| {
            let base = DeviceContext::new(probed.device_type, native);
            if probed.device_type != device_type {
                derive(api, device_type, base)
            } else {
                Ok(base)
            }
        })
        .map(|context| {
            info!(
                "Using {} video acceleration context attached to compute context",
                device_type.label()
            );
            NegotiatedDevice {
                device_type,
                device_index: DeviceIndex::FromExistent,
                context,
            }
        });
    Some(result)
}

/// Derives `device_type` from `base`. The base reference is consumed either way,
/// on success it lives on inside the derived context.
fn derive<A: HwContextApi>(
    api: &A,
    device_type: HwDeviceType,
    base: DeviceContext<A::Device>,
) -> Result<DeviceContext<A::Device>, DeviceError> {
    match api.derive_device(device_type, base.native()) {
        Ok(native) => {
            info!("Created derived video acceleration context for {device_type}");
            Ok(DeviceContext::derived(device_type, native, base))
        }
        Err(source) => {
            info!("Failed to create derived video acceleration for {device_type}: {source}");
            Err(DeviceError::DeriveFailed {
                device_type,
                source,
            })
        }
    }
}
