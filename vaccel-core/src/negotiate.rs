use tracing::debug;

use crate::{
    backend::BackendCatalog,
    catalog::PixelFormat,
    codec::HwConfig,
    device::DeviceContext,
    frames::{DEFAULT_SW_FORMAT, FramesPool, FramesParams, create_frames},
    hwcontext::HwContextApi,
};

/// Codec context as seen from the pixel format negotiation.
pub trait HwCodecContext<A: HwContextApi> {
    fn device(&self) -> Option<&DeviceContext<A::Device>>;

    /// Hardware configurations published by the opened codec.
    fn hw_configs(&self) -> &[HwConfig];

    fn dimensions(&self) -> (u32, u32);

    /// Frame pool parameters the codec proposes for `format` on `device`.
    fn frames_defaults(
        &self,
        device: &DeviceContext<A::Device>,
        format: PixelFormat,
    ) -> Option<FramesParams>;

    fn set_sw_format(&mut self, format: PixelFormat);

    fn attach_frames(&mut self, pool: FramesPool<A>);

    fn detach_device(&mut self);
}

/// Picks the pixel format a codec should output, from the `candidates` it supports.
///
/// Must always return one of the candidates.
pub trait FormatNegotiator<A: HwContextApi> {
    fn choose_format(
        &self,
        ctx: &mut dyn HwCodecContext<A>,
        candidates: &[PixelFormat],
    ) -> PixelFormat;
}

/// Prefers the hardware format of the attached device and allocates the frame
/// pool it needs. Falls back to the first candidate.
#[derive(Debug, Clone)]
pub struct HwFormatNegotiator<A> {
    api: A,
    catalog: BackendCatalog,
}

impl<A: HwContextApi> HwFormatNegotiator<A> {
    pub fn new(api: A, catalog: BackendCatalog) -> Self {
        Self { api, catalog }
    }
}

impl<A: HwContextApi> FormatNegotiator<A> for HwFormatNegotiator<A> {
    fn choose_format(
        &self,
        ctx: &mut dyn HwCodecContext<A>,
        candidates: &[PixelFormat],
    ) -> PixelFormat {
        let default = candidates.first().copied().unwrap_or(PixelFormat::None);
        let Some(device) = ctx.device().cloned() else {
            return default;
        };

        let configs: Vec<HwConfig> = ctx
            .hw_configs()
            .iter()
            .filter(|config| config.device_type == device.device_type())
            .copied()
            .collect();

        for config in configs {
            for &candidate in candidates.iter().filter(|&&format| format == config.pix_fmt) {
                if config.methods.frames_ctx {
                    ctx.set_sw_format(DEFAULT_SW_FORMAT);
                    let (width, height) = ctx.dimensions();
                    let defaults = ctx.frames_defaults(&device, candidate);
                    match create_frames(
                        &self.api,
                        &self.catalog,
                        &device,
                        defaults,
                        width,
                        height,
                        candidate,
                    ) {
                        Ok(pool) => {
                            ctx.attach_frames(pool);
                            return candidate;
                        }
                        Err(err) => debug!("Frame pool for {candidate:?} unavailable: {err}"),
                    }
                } else if config.methods.device_ctx {
                    return candidate;
                }
            }
        }

        debug!("Can't select HW format, using default format: {default:?}");
        ctx.detach_device();
        default
    }
}
