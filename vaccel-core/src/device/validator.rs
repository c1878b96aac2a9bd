use tracing::info;

use crate::{
    backend::BackendCatalog,
    catalog::HwDeviceType,
    device::DeviceContext,
    hwcontext::NativeDevice,
};

/// Decides whether a freshly created device may be used for `requested`.
///
/// `name_filter` is a case-sensitive substring of the device description,
/// an empty filter accepts any device.
pub fn validate<D: NativeDevice>(
    device: &DeviceContext<D>,
    requested: HwDeviceType,
    name_filter: &str,
    catalog: &BackendCatalog,
) -> bool {
    let label = requested.label();
    let media = device.media_context();
    let description = media.native().description();
    let device_name = description.as_deref().unwrap_or_default();

    let required = catalog
        .backend(requested)
        .and_then(|backend| backend.required_base_capability(media.device_type()));
    if let Some(capability) = required {
        if !media.native().has_capability(capability) {
            info!("Skipping {label} video acceleration as {capability:?} is not supported by: {device_name}");
            return false;
        }
    }

    if !name_filter.is_empty() && !device_name.contains(name_filter) {
        info!(
            "Skipping '{label}' video acceleration on the following device name as not matching substring '{name_filter}': {device_name}"
        );
        return false;
    }

    match description {
        Some(name) => info!("Using {label} video acceleration on device: {name}"),
        None => info!("Using {label} video acceleration"),
    }
    true
}
