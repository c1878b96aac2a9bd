use std::{fmt, str::FromStr, sync::OnceLock};

/// Acceleration requested by the caller of a capture or writer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoAcceleration {
    None,
    /// Any of the hardware backends usable on the current platform.
    Any,
    D3d11,
    Vaapi,
    /// Intel media SDK, driven through the QSV device type.
    Mfx,
}

impl VideoAcceleration {
    pub const HARDWARE: [VideoAcceleration; 3] = [Self::D3d11, Self::Vaapi, Self::Mfx];

    /// Name used to build configuration keys, e.g. `hw_decoders_vaapi`.
    pub fn name(self) -> &'static str {
        match self {
            VideoAcceleration::None => "none",
            VideoAcceleration::Any => "any",
            VideoAcceleration::D3d11 => "d3d11",
            VideoAcceleration::Vaapi => "vaapi",
            VideoAcceleration::Mfx => "mfx",
        }
    }

    /// Native device type of a single hardware backend. `None` and `Any` resolve
    /// to [`HwDeviceType::None`].
    pub fn device_type(self) -> HwDeviceType {
        match self {
            VideoAcceleration::D3d11 => HwDeviceType::D3d11va,
            VideoAcceleration::Vaapi => HwDeviceType::Vaapi,
            VideoAcceleration::Mfx => HwDeviceType::Qsv,
            VideoAcceleration::None | VideoAcceleration::Any => HwDeviceType::None,
        }
    }

    /// Bitmask-like query: `Any` includes every hardware device type.
    pub fn includes(self, device_type: HwDeviceType) -> bool {
        match self {
            VideoAcceleration::Any => device_type != HwDeviceType::None,
            _ => device_type != HwDeviceType::None && self.device_type() == device_type,
        }
    }
}

impl fmt::Display for VideoAcceleration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VideoAcceleration {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(VideoAcceleration::None),
            "any" => Ok(VideoAcceleration::Any),
            "d3d11" => Ok(VideoAcceleration::D3d11),
            "vaapi" => Ok(VideoAcceleration::Vaapi),
            "mfx" | "qsv" => Ok(VideoAcceleration::Mfx),
            _ => Err("Invalid video acceleration type."),
        }
    }
}

/// Device type tag of the native hwcontext layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwDeviceType {
    /// No acceleration.
    None,
    Vaapi,
    D3d11va,
    Qsv,
}

impl HwDeviceType {
    pub const ALL: [HwDeviceType; 3] = [Self::Vaapi, Self::D3d11va, Self::Qsv];

    pub fn name(self) -> &'static str {
        match self {
            HwDeviceType::None => "none",
            HwDeviceType::Vaapi => "vaapi",
            HwDeviceType::D3d11va => "d3d11va",
            HwDeviceType::Qsv => "qsv",
        }
    }

    /// Unknown names resolve to [`HwDeviceType::None`].
    pub fn find_by_name(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|device_type| device_type.name() == name)
            .unwrap_or(HwDeviceType::None)
    }

    pub fn acceleration(self) -> VideoAcceleration {
        match self {
            HwDeviceType::None => VideoAcceleration::None,
            HwDeviceType::Vaapi => VideoAcceleration::Vaapi,
            HwDeviceType::D3d11va => VideoAcceleration::D3d11,
            HwDeviceType::Qsv => VideoAcceleration::Mfx,
        }
    }

    /// Label used in log messages.
    pub fn label(self) -> &'static str {
        match self {
            HwDeviceType::Qsv => "MFX",
            other => other.name(),
        }
    }
}

impl fmt::Display for HwDeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    H263,
    H264,
    Hevc,
    Mpeg2Video,
    Mpeg4,
    Vc1,
    Vp8,
    Vp9,
    Wmv3,
    Av1,
    Mjpeg,
    /// Raw id of a codec this crate has no special knowledge about.
    Other(i32),
}

impl CodecId {
    fn hw_base_name(self) -> Option<&'static str> {
        let name = match self {
            CodecId::H263 => "h263",
            CodecId::H264 => "h264",
            CodecId::Hevc => "hevc",
            CodecId::Mpeg2Video => "mpeg2",
            CodecId::Mpeg4 => "mpeg4",
            CodecId::Vc1 => "vc1",
            CodecId::Vp8 => "vp8",
            CodecId::Vp9 => "vp9",
            CodecId::Wmv3 => "wmv3",
            CodecId::Av1 => "av1",
            CodecId::Mjpeg | CodecId::Other(_) => return None,
        };
        Some(name)
    }
}

/// Canonical name of the hardware codec implementing `codec` on `acceleration`,
/// e.g. `h264_vaapi` or `hevc_qsv`.
pub fn hw_codec_name(codec: CodecId, acceleration: VideoAcceleration) -> Option<String> {
    let suffix = match acceleration {
        VideoAcceleration::Vaapi => "vaapi",
        VideoAcceleration::D3d11 => "d3d11va",
        VideoAcceleration::Mfx => "qsv",
        VideoAcceleration::None | VideoAcceleration::Any => return None,
    };
    codec.hw_base_name().map(|name| format!("{name}_{suffix}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Unset.
    None,
    Nv12,
    P010,
    Yuv420p,
    Bgr24,
    Vaapi,
    D3d11,
    Qsv,
    Other(i32),
}

impl PixelFormat {
    /// Formats whose data lives in device memory.
    pub fn is_hardware(self) -> bool {
        matches!(self, PixelFormat::Vaapi | PixelFormat::D3d11 | PixelFormat::Qsv)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    Linux,
    Other,
}

impl Platform {
    /// Platform of the running process, detected once.
    pub fn detect() -> Platform {
        static PLATFORM: OnceLock<Platform> = OnceLock::new();

        *PLATFORM.get_or_init(|| match std::env::consts::OS {
            "windows" => Platform::Windows,
            "linux" => Platform::Linux,
            _ => Platform::Other,
        })
    }
}
