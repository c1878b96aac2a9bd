//! Seam between the negotiation logic and the native hwcontext runtime.

use std::{fmt, ops};

use crate::{
    catalog::{HwDeviceType, PixelFormat},
    frames::FramesParams,
};

/// Pointer-sized native handle, compared bit for bit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RawHandle(usize);

impl RawHandle {
    pub const NULL: RawHandle = RawHandle(0);

    pub const fn new(value: usize) -> Self {
        Self(value)
    }

    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }

    pub fn as_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    pub fn get(self) -> usize {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeHandle {
    VaDisplay(RawHandle),
    D3d11 {
        device: RawHandle,
        context: RawHandle,
    },
    MfxSession(RawHandle),
}

impl NativeHandle {
    /// Handle that compute runtimes share with the media stack. Session handles
    /// are never shared directly, only through the device they were derived from.
    pub fn media_handle(&self) -> Option<(HwDeviceType, RawHandle)> {
        match *self {
            NativeHandle::VaDisplay(display) => Some((HwDeviceType::Vaapi, display)),
            NativeHandle::D3d11 { device, .. } => Some((HwDeviceType::D3d11va, device)),
            NativeHandle::MfxSession(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceCapability {
    /// `VAEntrypointVideoProc` on `VAProfileNone`.
    VideoProc,
}

/// Native device object created by the hwcontext runtime.
///
/// Dropping the value releases the native reference.
pub trait NativeDevice {
    fn handle(&self) -> NativeHandle;

    /// Human readable adapter or driver name, if the runtime can tell.
    fn description(&self) -> Option<String>;

    fn has_capability(&self, capability: DeviceCapability) -> bool;
}

pub trait NativeTexture {
    fn raw(&self) -> RawHandle;
}

macro_rules! native_flags {
    ($name:ident { $($flag:ident = $value:expr),* $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(u32);

        impl $name {
            $(pub const $flag: $name = $name($value);)*

            pub const fn empty() -> Self {
                Self(0)
            }

            pub const fn from_bits(bits: u32) -> Self {
                Self(bits)
            }

            pub const fn bits(self) -> u32 {
                self.0
            }

            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }
        }

        impl ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }
    };
}

// Values of D3D11_BIND_FLAG.
native_flags!(BindFlags {
    SHADER_RESOURCE = 0x8,
    DECODER = 0x200,
    VIDEO_ENCODER = 0x400,
});

// Values of D3D11_RESOURCE_MISC_FLAG.
native_flags!(MiscFlags { SHARED = 0x2 });

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub array_size: u32,
    pub bind_flags: BindFlags,
    pub misc_flags: MiscFlags,
}

#[derive(Debug, thiserror::Error)]
pub enum HwContextError {
    #[error("{operation} failed with code {code}.")]
    Native { operation: &'static str, code: i32 },

    #[error("{operation} returned a null context.")]
    NullContext { operation: &'static str },

    #[error("Device type {0} is not supported by this runtime.")]
    UnsupportedDeviceType(HwDeviceType),

    #[error("{0} is not supported on this platform.")]
    Unsupported(&'static str),
}

/// Native hwcontext runtime.
pub trait HwContextApi {
    type Device: NativeDevice;
    type Frames;
    type Texture: NativeTexture;

    /// Creates a new native device. `path` is `None` for the platform default.
    fn create_device(
        &self,
        device_type: HwDeviceType,
        path: Option<&str>,
    ) -> Result<Self::Device, HwContextError>;

    /// Wraps a native handle created elsewhere without creating a device.
    fn wrap_device(
        &self,
        device_type: HwDeviceType,
        handle: RawHandle,
    ) -> Result<Self::Device, HwContextError>;

    fn derive_device(
        &self,
        device_type: HwDeviceType,
        base: &Self::Device,
    ) -> Result<Self::Device, HwContextError>;

    fn alloc_frames(&self, device: &Self::Device) -> Result<Self::Frames, HwContextError>;

    fn init_frames(
        &self,
        frames: &mut Self::Frames,
        params: &FramesParams,
    ) -> Result<(), HwContextError>;

    /// Maps initialized `base` frames into the layered `device` in `format`.
    fn derive_frames(
        &self,
        device: &Self::Device,
        base: &Self::Frames,
        format: PixelFormat,
    ) -> Result<Self::Frames, HwContextError>;

    fn create_texture(
        &self,
        device: &Self::Device,
        desc: &TextureDesc,
    ) -> Result<Self::Texture, HwContextError>;

    /// GPU side copy of one texture sub-resource into another.
    fn copy_subresource(
        &self,
        device: &Self::Device,
        dst: RawHandle,
        dst_subresource: u32,
        src: RawHandle,
        src_subresource: u32,
    ) -> Result<(), HwContextError>;
}
