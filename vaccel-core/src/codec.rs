use std::fmt;

use itertools::Itertools;
use tracing::info;

use crate::{
    backend::BackendCatalog,
    catalog::{CodecId, HwDeviceType, PixelFormat},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecCategory {
    Decoder,
    Encoder,
}

/// Ways a codec can be set up for a hardware configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HwConfigMethods {
    /// Codec manages its frames once a device context is attached.
    pub device_ctx: bool,
    /// Codec needs a frames context supplied from outside.
    pub frames_ctx: bool,
    pub internal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwConfig {
    pub device_type: HwDeviceType,
    pub pix_fmt: PixelFormat,
    pub methods: HwConfigMethods,
}

/// Registered codec. `H` identifies the codec in the runtime it came from.
#[derive(Debug, Clone)]
pub struct CodecInfo<H> {
    pub handle: H,
    pub name: String,
    pub id: CodecId,
    pub category: CodecCategory,
    pub experimental: bool,
    pub pixel_formats: Vec<PixelFormat>,
    pub hw_configs: Vec<HwConfig>,
}

pub trait CodecRegistry {
    type Handle: Clone;

    /// All registered codecs in registration order.
    fn codecs(&self) -> impl Iterator<Item = CodecInfo<Self::Handle>> + '_;
}

#[derive(Debug, Clone)]
pub struct CodecMatch<H> {
    pub codec: CodecInfo<H>,
    pub device_type: HwDeviceType,
    /// `PixelFormat::None` for the software path.
    pub pix_fmt: PixelFormat,
    /// The negotiation callback has to supply a frame pool.
    pub needs_frames_pool: bool,
}

/// Comma separated list of codecs that must not be used with hardware acceleration.
///
/// An entry matches an exact codec name, `.<backend>`, `<codec>.<backend>`,
/// or every hardware codec when it is `hw`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisabledCodecs {
    entries: Vec<String>,
}

impl DisabledCodecs {
    pub fn parse(list: &str) -> Self {
        Self {
            entries: list
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn rejects(&self, codec_name: &str, device_type: HwDeviceType) -> bool {
        let backend_suffix = format!(".{}", device_type.name());
        self.entries.iter().any(|entry| {
            entry == codec_name
                || *entry == backend_suffix
                || entry.strip_prefix(codec_name) == Some(backend_suffix.as_str())
                || entry == "hw"
        })
    }
}

impl fmt::Display for DisabledCodecs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.entries.iter().join(","))
    }
}

/// Finds a codec implementing `codec_id` on `device_type`.
///
/// With `HwDeviceType::None` the first codec of the category is returned.
pub fn find_codec<R: CodecRegistry>(
    registry: &R,
    catalog: &BackendCatalog,
    codec_id: CodecId,
    device_type: HwDeviceType,
    category: CodecCategory,
    disabled: &DisabledCodecs,
) -> Option<CodecMatch<R::Handle>> {
    let native_format = catalog
        .backend(device_type)
        .filter(|backend| backend.native_format_without_config())
        .map(|backend| backend.native_format());

    let candidates = registry
        .codecs()
        .filter(|codec| codec.category == category && codec.id == codec_id && !codec.experimental);

    for codec in candidates {
        if device_type == HwDeviceType::None {
            return Some(CodecMatch {
                codec,
                device_type,
                pix_fmt: PixelFormat::None,
                needs_frames_pool: false,
            });
        }

        if let Some(format) = native_format {
            if codec.pixel_formats.contains(&format) {
                if is_enabled(&codec.name, device_type, disabled) {
                    return Some(CodecMatch {
                        codec,
                        device_type,
                        pix_fmt: format,
                        needs_frames_pool: false,
                    });
                }
                continue;
            }
        }

        let config = codec
            .hw_configs
            .iter()
            .find(|config| config.device_type == device_type)
            .copied();
        if let Some(config) = config {
            if is_enabled(&codec.name, device_type, disabled) {
                return Some(CodecMatch {
                    codec,
                    device_type,
                    pix_fmt: config.pix_fmt,
                    needs_frames_pool: config.methods.frames_ctx && !config.methods.device_ctx,
                });
            }
        }
    }
    None
}

fn is_enabled(codec_name: &str, device_type: HwDeviceType, disabled: &DisabledCodecs) -> bool {
    if disabled.rejects(codec_name, device_type) {
        info!("Skipping codec {codec_name}.{device_type}");
        return false;
    }
    true
}
