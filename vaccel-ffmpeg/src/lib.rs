//! libav implementation of the `vaccel-core` hwcontext, codec and negotiation traits.

pub mod codec;
pub mod format;
pub mod frame;
pub mod hwcontext;
pub mod negotiate;

pub use codec::FfmpegCodecRegistry;
pub use frame::HwFrame;
pub use hwcontext::{FfmpegDevice, FfmpegFrames, FfmpegHwContext, FfmpegTexture};
pub use negotiate::{HwDecoder, HwFormatHook};
