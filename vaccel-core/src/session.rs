use std::fmt::Display;

use tracing::{debug, info};

use crate::{
    backend::BackendCatalog,
    catalog::{CodecId, HwDeviceType, VideoAcceleration},
    codec::{CodecMatch, CodecRegistry, find_codec},
    compute::{self, ComputeApi, ComputeContext},
    device::{DeviceContext, DeviceIndex, DeviceRequest, create_device_of_type},
    hwcontext::{HwContextApi, NativeDevice},
    selection::{AccelerationCandidates, AccelerationConfig, Candidate, Direction},
};

#[derive(Debug, Clone)]
pub struct SessionRequest<'a> {
    pub codec_id: CodecId,
    pub direction: Direction,
    pub acceleration: VideoAcceleration,
    pub device_index: i32,
    pub use_compute: bool,
    pub config: &'a AccelerationConfig,
}

/// One codec open attempt handed to the caller.
#[derive(Debug)]
pub struct OpenAttempt<'a, D: NativeDevice, H> {
    /// `None` for the software candidate.
    pub device: Option<&'a DeviceContext<D>>,
    pub codec: &'a CodecMatch<H>,
}

#[derive(Debug)]
pub struct Accelerated<T, D: NativeDevice> {
    pub value: T,
    pub acceleration: VideoAcceleration,
    pub device_index: DeviceIndex,
    pub device: Option<DeviceContext<D>>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No usable codec found for {0:?}.")]
    NoCandidate(CodecId),
}

/// Walks the acceleration candidates of `request` until `open` succeeds.
///
/// Candidates whose device can't be created or that have no matching codec are
/// skipped. The software candidate opens the plain software codec.
pub fn open_accelerated<A, C, R, T, E, F>(
    api: &A,
    compute: &mut ComputeContext<C>,
    catalog: &BackendCatalog,
    registry: &R,
    request: &SessionRequest,
    mut open: F,
) -> Result<Accelerated<T, A::Device>, SessionError>
where
    A: HwContextApi,
    C: ComputeApi,
    R: CodecRegistry,
    E: Display,
    F: FnMut(OpenAttempt<'_, A::Device, R::Handle>) -> Result<T, E>,
{
    let candidates = AccelerationCandidates::new(
        request.acceleration,
        request.direction,
        request.config,
        catalog.platform(),
    );
    let disabled = candidates.disabled_codecs().clone();

    for candidate in candidates {
        let device = match &candidate {
            Candidate::Software => None,
            Candidate::Hardware {
                device_type,
                device_filter,
                ..
            } => {
                let device_request = DeviceRequest {
                    acceleration: device_type.acceleration(),
                    device_index: request.device_index,
                    name_filter: device_filter,
                    // Compute is bound only after the codec accepted the device.
                    use_compute: false,
                };
                match create_device_of_type(api, compute, catalog, *device_type, &device_request) {
                    Ok(device) => Some(device),
                    Err(err) => {
                        debug!("Skipping acceleration candidate {candidate}: {err}");
                        continue;
                    }
                }
            }
        };
        let device_type = device
            .as_ref()
            .map(|device| device.device_type)
            .unwrap_or(HwDeviceType::None);

        let Some(codec) = find_codec(
            registry,
            catalog,
            request.codec_id,
            device_type,
            request.direction.category(),
            &disabled,
        ) else {
            debug!(
                "No {:?} codec for {:?} with acceleration candidate {candidate}",
                request.direction, request.codec_id
            );
            continue;
        };

        let attempt = OpenAttempt {
            device: device.as_ref().map(|device| &device.context),
            codec: &codec,
        };
        match open(attempt) {
            Ok(value) => {
                if let Some(device) = &device {
                    if request.use_compute && compute.is_empty() && compute.api().is_available() {
                        compute::bind_device(compute, catalog, &device.context);
                    }
                }
                let (acceleration, device_index, device) = match device {
                    Some(device) => (device.acceleration(), device.device_index, Some(device.context)),
                    None => (VideoAcceleration::None, DeviceIndex::Default, None),
                };
                info!(
                    "Opened codec {} with {acceleration} video acceleration",
                    codec.codec.name
                );
                return Ok(Accelerated {
                    value,
                    acceleration,
                    device_index,
                    device,
                });
            }
            Err(err) => info!("Failed to open codec {}: {err}", codec.codec.name),
        }
    }

    Err(SessionError::NoCandidate(request.codec_id))
}
