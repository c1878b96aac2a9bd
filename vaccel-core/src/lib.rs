//! Hardware video acceleration negotiation.
//!
//! Selects a hardware backend (VAAPI, D3D11, QSV) for a decode or encode
//! session, reconciles it with an already created compute context, allocates
//! GPU frame pools and moves frames between codec surfaces and compute images.
//! The native layers are reached through the traits in [`hwcontext`],
//! [`compute`], [`codec`] and [`negotiate`].

pub mod backend;
pub mod catalog;
pub mod codec;
pub mod compute;
pub mod device;
pub mod frames;
pub mod hwcontext;
pub mod interop;
pub mod negotiate;
pub mod selection;
pub mod session;

#[cfg(test)]
mod test_utils;

pub use backend::BackendCatalog;
pub use catalog::{CodecId, HwDeviceType, PixelFormat, Platform, VideoAcceleration};
pub use codec::{CodecCategory, CodecMatch, DisabledCodecs, find_codec};
pub use compute::{ComputeApi, ComputeContext, ComputeError};
pub use device::{
    DeviceContext, DeviceError, DeviceIndex, DeviceRequest, NegotiatedDevice, create_device,
};
pub use frames::{FramesError, FramesParams, FramesPool, create_frames};
pub use hwcontext::{HwContextApi, HwContextError};
pub use interop::{copy_from_device, copy_to_device};
pub use negotiate::{FormatNegotiator, HwCodecContext, HwFormatNegotiator};
pub use selection::{AccelerationCandidates, AccelerationConfig, Candidate, Direction};
pub use session::{Accelerated, OpenAttempt, SessionError, SessionRequest, open_accelerated};
